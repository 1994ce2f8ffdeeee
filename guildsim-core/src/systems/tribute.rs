//! Periodic guild-to-guild tribute transfers.
//!
//! A tribute moves a fixed amount from the source guild's HQ storage to the
//! destination guild's HQ storage every `interval_minutes`. A real source
//! that cannot afford the full amount skips that transfer event entirely. A
//! missing source mints the amount; a missing destination voids it.

use crate::defines::TICKS_PER_MINUTE;
use crate::state::{Warnings, WorldState};
use tracing::instrument;

#[instrument(skip_all, name = "tribute")]
pub fn run_tribute_tick(state: &mut WorldState) {
    let tick = state.tick;
    let due: Vec<u64> = state
        .sorted_tribute_ids()
        .into_iter()
        .filter(|id| {
            let t = &state.tributes[id];
            t.is_active && t.last_transfer + t.interval_minutes * TICKS_PER_MINUTE <= tick
        })
        .collect();

    for id in due {
        let tribute = state.tributes[&id].clone();
        let amount = tribute.transfer_amount();

        if let Some(from) = &tribute.from_guild {
            let Some(hq_name) = state.hq_of(from).map(|t| t.name.clone()) else {
                log::debug!("tribute {}: source {} has no HQ; skipped", id, from);
                mark_transferred(state, id, tick);
                continue;
            };
            let hq = state.territory(&hq_name).expect("HQ territory exists");
            if !hq.storage.current.covers(&amount) {
                log::debug!("tribute {}: {} cannot afford transfer; skipped", id, from);
                mark_transferred(state, id, tick);
                continue;
            }
            let hq = state.territory_mut(&hq_name).expect("HQ territory exists");
            hq.storage.current -= amount;
            log::trace!("tribute {}: {} pays {:.1} total", id, from, amount.total());
        }

        if let Some(to) = &tribute.to_guild {
            if let Some(hq_name) = state.hq_of(to).map(|t| t.name.clone()) {
                let hq = state.territory_mut(&hq_name).expect("HQ territory exists");
                let unclamped = hq.storage.current + amount;
                hq.storage.current = unclamped.min(hq.storage.capacity);
                if unclamped.emeralds > hq.storage.capacity.emeralds {
                    hq.warnings |= Warnings::OVERFLOW_EMERALD;
                }
                if unclamped.gathered_only() != hq.storage.current.gathered_only() {
                    hq.warnings |= Warnings::OVERFLOW_RESOURCES;
                }
            } else {
                log::debug!("tribute {}: destination {} has no HQ; amount voided", id, to);
            }
        }

        mark_transferred(state, id, tick);
    }
}

fn mark_transferred(state: &mut WorldState, id: u64, tick: u64) {
    if let Some(tribute) = state.tributes.get_mut(&id) {
        tribute.last_transfer = tick;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{PerHour, ResourceKind, Resources};
    use crate::state::Tribute;
    use crate::testing::WorldStateBuilder;

    fn two_guild_world() -> WorldState {
        WorldStateBuilder::new()
            .with_guild("Alpha", "ALF")
            .with_guild("Beta", "BET")
            .with_territory("A", "ALF")
            .with_territory("B", "BET")
            .with_hq("A")
            .with_hq("B")
            .build()
    }

    fn add_tribute(state: &mut WorldState, from: Option<&str>, to: Option<&str>) -> u64 {
        let id = state.next_tribute_id;
        state.next_tribute_id += 1;
        state.tributes.insert(
            id,
            Tribute {
                id,
                from_guild: from.map(str::to_string),
                to_guild: to.map(str::to_string),
                amount_per_hour: PerHour(Resources::only(ResourceKind::Emeralds, 60.0)),
                interval_minutes: 1,
                last_transfer: 0,
                is_active: true,
                created_at: 0,
            },
        );
        id
    }

    #[test]
    fn test_spawn_tribute_credits_every_interval() {
        let mut state = two_guild_world();
        add_tribute(&mut state, None, Some("ALF"));

        for tick in 1..=60 {
            state.tick = tick;
            run_tribute_tick(&mut state);
        }
        // 60/h for one minute = exactly 1 emerald, delivered at tick 60.
        assert_eq!(state.territory("A").unwrap().storage.current.emeralds, 1.0);

        for tick in 61..=120 {
            state.tick = tick;
            run_tribute_tick(&mut state);
        }
        assert_eq!(state.territory("A").unwrap().storage.current.emeralds, 2.0);
    }

    #[test]
    fn test_real_source_debits_hq() {
        let mut state = two_guild_world();
        state.territory_mut("B").unwrap().storage.current.emeralds = 10.0;
        add_tribute(&mut state, Some("BET"), Some("ALF"));

        state.tick = 60;
        run_tribute_tick(&mut state);
        assert_eq!(state.territory("B").unwrap().storage.current.emeralds, 9.0);
        assert_eq!(state.territory("A").unwrap().storage.current.emeralds, 1.0);
    }

    #[test]
    fn test_broke_source_skips_transfer() {
        let mut state = two_guild_world();
        add_tribute(&mut state, Some("BET"), Some("ALF"));

        state.tick = 60;
        run_tribute_tick(&mut state);
        assert_eq!(state.territory("A").unwrap().storage.current.emeralds, 0.0);
        // The missed event is consumed, not retried next tick.
        assert_eq!(state.tributes[&1].last_transfer, 60);
    }

    #[test]
    fn test_void_tribute_debits_only() {
        let mut state = two_guild_world();
        state.territory_mut("B").unwrap().storage.current.emeralds = 10.0;
        add_tribute(&mut state, Some("BET"), None);

        state.tick = 60;
        run_tribute_tick(&mut state);
        assert_eq!(state.territory("B").unwrap().storage.current.emeralds, 9.0);
    }

    #[test]
    fn test_inactive_tribute_is_ignored() {
        let mut state = two_guild_world();
        let id = add_tribute(&mut state, None, Some("ALF"));
        state.tributes.get_mut(&id).unwrap().is_active = false;

        state.tick = 600;
        run_tribute_tick(&mut state);
        assert_eq!(state.territory("A").unwrap().storage.current.emeralds, 0.0);
    }

    #[test]
    fn test_overflow_credit_is_discarded() {
        let mut state = two_guild_world();
        {
            let a = state.territory_mut("A").unwrap();
            a.storage.capacity.emeralds = 0.5;
        }
        add_tribute(&mut state, None, Some("ALF"));

        state.tick = 60;
        run_tribute_tick(&mut state);
        let a = state.territory("A").unwrap();
        assert_eq!(a.storage.current.emeralds, 0.5);
        assert!(a.warnings.contains(Warnings::OVERFLOW_EMERALD));
    }
}
