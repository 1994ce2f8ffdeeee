//! Treasury tier derivation from hold time.

use crate::defines;
use crate::state::{TreasuryLevel, WorldState};
use tracing::instrument;

#[instrument(skip_all, name = "treasury")]
pub fn run_treasury_tick(state: &mut WorldState) {
    let tick = state.tick;
    for (_, territory) in state.territories.iter_mut() {
        let level = match territory.treasury_override {
            Some(level) => level,
            None if territory.is_owned() => {
                defines::treasury_for_hold(tick.saturating_sub(territory.captured_at))
            }
            None => TreasuryLevel::VeryLow,
        };
        territory.treasury = level;
        territory.generation_bonus = defines::treasury_bonus(level);
    }
}
