//! Upgrade and bonus upkeep.
//!
//! Each tick a territory pays one second's worth of the per-hour holding
//! cost for every active upgrade and bonus, out of its own storage. A line
//! item the territory cannot pay degrades one effective level and raises
//! the matching usage warning. Recovery toward the configured level is
//! likewise one level per tick.

use crate::defines;
use crate::resources::{ResourceKind, SECONDS_PER_HOUR};
use crate::state::{BonusKind, Territory, UpgradeKind, Warnings, WorldState};
use tracing::instrument;

#[instrument(skip_all, name = "upkeep")]
pub fn run_upkeep_tick(state: &mut WorldState) {
    for name in state.sorted_territory_names() {
        let Some(territory) = state.territory_mut(&name) else {
            continue;
        };
        if !territory.is_owned() {
            continue;
        }

        for kind in UpgradeKind::ALL {
            let target = territory.options.upgrades.get(kind);
            let effective = territory.effective.upgrades.get(kind);
            let level = settle_level(
                territory,
                target,
                effective,
                &defines::UPGRADE_COSTS,
                kind.cost_kind(),
            );
            territory.effective.upgrades.set(kind, level);
        }

        for kind in BonusKind::ALL {
            let def = kind.def();
            let target = territory.options.bonuses.get(kind);
            let effective = territory.effective.bonuses.get(kind);
            let level = settle_level(territory, target, effective, def.costs, def.cost_kind);
            territory.effective.bonuses.set(kind, level);
        }

        // Capacity follows the effective storage bonuses; shrinkage spills.
        let capacity = Territory::capacity_for(territory.storage.base, &territory.effective.bonuses);
        territory.storage.capacity = capacity;
        let clamped = territory.storage.current.min(capacity);
        if clamped.emeralds < territory.storage.current.emeralds {
            territory.warnings |= Warnings::OVERFLOW_EMERALD;
        }
        if clamped.gathered_only() != territory.storage.current.gathered_only() {
            territory.warnings |= Warnings::OVERFLOW_RESOURCES;
        }
        territory.storage.current = clamped;
    }
}

/// Charge one tick of upkeep, returning the level that is actually active:
/// at most one step of recovery toward `target`, at most one step of
/// degradation below the current effective level on failure to pay.
fn settle_level(
    territory: &mut Territory,
    target: u8,
    effective: u8,
    costs: &[f64],
    cost_kind: ResourceKind,
) -> u8 {
    let desired = target.min(effective.saturating_add(1));
    let floor = effective.saturating_sub(1).min(target);
    let mut level = desired;
    loop {
        let cost = costs[level as usize] / SECONDS_PER_HOUR;
        if cost <= territory.storage.current.get(cost_kind) {
            let held = territory.storage.current.get(cost_kind);
            territory.storage.current.set(cost_kind, held - cost);
            return level;
        }
        territory.warnings |= usage_warning(cost_kind);
        log::trace!(
            "{} cannot afford level {} upkeep ({:.4} {})",
            territory.name,
            level,
            cost,
            cost_kind
        );
        if level <= floor {
            return floor;
        }
        level -= 1;
    }
}

fn usage_warning(kind: ResourceKind) -> Warnings {
    match kind {
        ResourceKind::Emeralds => Warnings::USAGE_EMERALD,
        _ => Warnings::USAGE_RESOURCES,
    }
}
