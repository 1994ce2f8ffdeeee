//! Defense configuration: iterative step selection toward a target.
//!
//! A target names minimum core levels, minimum aura/volley levels, and a
//! set-level floor. Steps are chosen one at a time: close core gaps first,
//! then aura/volley gaps, then free steps by pairwise value-per-cost.

use crate::defines;
use crate::resources::{ResourceKind, Resources};
use crate::state::{set_level_of, BonusKind, UpgradeKind, WorldState};
use crate::step;

#[derive(Debug, Clone, Copy)]
pub struct DefenseTarget {
    pub core_min: u8,
    pub aura_volley_min: u8,
    pub set_level_target: u32,
}

/// HQ defense: every core high and a near-maximal set level.
pub const VERY_HIGH: DefenseTarget = DefenseTarget {
    core_min: 4,
    aura_volley_min: 0,
    set_level_target: 49,
};

/// Deterrence on territories that should look defended.
pub const FAKE_HIGH: DefenseTarget = DefenseTarget {
    core_min: 2,
    aura_volley_min: 1,
    set_level_target: 0,
};

/// Baseline deterrence for every territory.
pub const FAKE_MEDIUM: DefenseTarget = DefenseTarget {
    core_min: 1,
    aura_volley_min: 0,
    set_level_target: 4,
};

/// Real defense for the most important territories.
pub const ACTUAL_HIGH: DefenseTarget = DefenseTarget {
    core_min: 4,
    aura_volley_min: 0,
    set_level_target: 31,
};

/// Real defense for the second importance band.
pub const ACTUAL_MEDIUM: DefenseTarget = DefenseTarget {
    core_min: 2,
    aura_volley_min: 0,
    set_level_target: 19,
};

/// Per-resource cost weights derived from the claim net: a drained
/// resource is expensive to spend, an abundant one nearly free.
#[derive(Debug, Clone, Copy)]
pub struct ResourceWeights(Resources);

impl ResourceWeights {
    pub fn from_net(net: Resources) -> Self {
        let mut weights = Resources::ZERO;
        for kind in ResourceKind::ALL {
            let n = net.get(kind);
            let w = if n <= 0.0 {
                10.0
            } else {
                1.0 / (n / 1000.0).max(1.0)
            };
            weights.set(kind, w);
        }
        ResourceWeights(weights)
    }

    fn weigh(&self, kind: ResourceKind, amount: f64) -> f64 {
        amount * self.0.get(kind)
    }
}

/// Value weight of stepping each line, multiplied by its set-level delta.
fn step_weight(item: StepItem) -> f64 {
    match item {
        StepItem::Core(UpgradeKind::Damage) => 1.35,
        StepItem::Core(UpgradeKind::Attack) => 1.25,
        StepItem::Core(UpgradeKind::Defence) => 1.10,
        StepItem::Core(UpgradeKind::Health) => 0.90,
        StepItem::Aura => 1.20,
        StepItem::Volley => 1.15,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepItem {
    Core(UpgradeKind),
    Aura,
    Volley,
}

#[derive(Debug, Clone, Copy)]
struct Step {
    item: StepItem,
    new_level: u8,
    value: f64,
    cost: f64,
}

impl Step {
    fn efficiency(&self) -> f64 {
        self.value / self.cost.max(1e-9)
    }
}

/// Penalty divisor for pushing one core far past the weakest core.
const IMBALANCE_PENALTY: f64 = 5.0;
/// A core may lead the weakest core by this much before the penalty.
const IMBALANCE_SLACK: u8 = 2;

/// Raise a territory's defense options until `target` is met. Levels are
/// only ever raised. Returns true when anything changed.
pub fn apply_defense(
    state: &mut WorldState,
    name: &str,
    target: &DefenseTarget,
    weights: &ResourceWeights,
) -> bool {
    let mut changed = false;
    // Bounded by the total number of raisable levels.
    for _ in 0..128 {
        let Some(territory) = state.territory(name) else {
            return changed;
        };
        let upgrades = territory.options.upgrades;
        let bonuses = territory.options.bonuses;

        let cores_met = UpgradeKind::ALL
            .iter()
            .all(|&k| upgrades.get(k) >= target.core_min);
        let aura_met = bonuses.tower_aura >= target.aura_volley_min;
        let volley_met = bonuses.tower_volley >= target.aura_volley_min;
        let set_met = set_level_of(&upgrades, &bonuses) >= target.set_level_target;
        if cores_met && aura_met && volley_met && set_met {
            return changed;
        }

        let steps = legal_steps(&upgrades, &bonuses, target.core_min, weights);
        if steps.is_empty() {
            log::debug!("{}: no further defense steps available", name);
            return changed;
        }

        let chosen = if !cores_met {
            best_by_efficiency(steps.iter().filter(|s| match s.item {
                StepItem::Core(k) => upgrades.get(k) < target.core_min,
                _ => false,
            }))
        } else if !aura_met || !volley_met {
            best_by_efficiency(steps.iter().filter(|s| match s.item {
                StepItem::Aura => !aura_met,
                StepItem::Volley => !volley_met,
                _ => false,
            }))
        } else {
            best_by_combo(&steps)
        };

        let Some(step) = chosen else {
            return changed;
        };
        let applied = match step.item {
            StepItem::Core(kind) => step::set_upgrade(state, name, kind, step.new_level),
            StepItem::Aura => step::set_bonus(state, name, BonusKind::TowerAura, step.new_level),
            StepItem::Volley => {
                step::set_bonus(state, name, BonusKind::TowerVolley, step.new_level)
            }
        };
        if applied.is_err() {
            return changed;
        }
        changed = true;
    }
    changed
}

fn legal_steps(
    upgrades: &crate::state::UpgradeLevels,
    bonuses: &crate::state::BonusLevels,
    target_core_min: u8,
    weights: &ResourceWeights,
) -> Vec<Step> {
    let core_min_now = upgrades.min_level();
    let core_deficit: u32 = UpgradeKind::ALL
        .iter()
        .map(|&k| (target_core_min.saturating_sub(upgrades.get(k))) as u32)
        .sum();
    let core_sum = upgrades.sum();
    // Aura/volley pull their weight only once the cores carry theirs.
    let aura_volley_scale = if core_sum + core_deficit == 0 {
        1.0
    } else {
        core_sum as f64 / (core_sum + core_deficit) as f64
    };

    let mut steps = Vec::new();
    for kind in UpgradeKind::ALL {
        let level = upgrades.get(kind);
        if level >= defines::MAX_UPGRADE_LEVEL {
            continue;
        }
        let new_level = level + 1;
        let mut value = step_weight(StepItem::Core(kind));
        if new_level > core_min_now + IMBALANCE_SLACK {
            value /= IMBALANCE_PENALTY;
        }
        let cost_kind = kind.cost_kind();
        let cost = weights.weigh(
            cost_kind,
            defines::UPGRADE_COSTS[new_level as usize] - defines::UPGRADE_COSTS[level as usize],
        );
        steps.push(Step {
            item: StepItem::Core(kind),
            new_level,
            value,
            cost,
        });
    }
    for (item, bonus_kind, level) in [
        (StepItem::Aura, BonusKind::TowerAura, bonuses.tower_aura),
        (StepItem::Volley, BonusKind::TowerVolley, bonuses.tower_volley),
    ] {
        let def = bonus_kind.def();
        if level >= def.max_level {
            continue;
        }
        let new_level = level + 1;
        let value = step_weight(item) * defines::AURA_VOLLEY_SET_WEIGHT as f64 * aura_volley_scale;
        let cost = weights.weigh(
            def.cost_kind,
            def.costs[new_level as usize] - def.costs[level as usize],
        );
        steps.push(Step {
            item,
            new_level,
            value,
            cost,
        });
    }
    steps
}

fn best_by_efficiency<'a>(steps: impl Iterator<Item = &'a Step>) -> Option<Step> {
    let mut best: Option<Step> = None;
    for &step in steps {
        if best.map(|b| step.efficiency() > b.efficiency()).unwrap_or(true) {
            best = Some(step);
        }
    }
    best
}

/// Pairwise combo score: a step is judged by the best two-step plan it
/// starts. Ties fall back to the single-step efficiency.
fn best_by_combo(steps: &[Step]) -> Option<Step> {
    if steps.len() == 1 {
        return Some(steps[0]);
    }
    let mut best: Option<(f64, f64, Step)> = None;
    for (i, &first) in steps.iter().enumerate() {
        for (j, &second) in steps.iter().enumerate() {
            if i == j {
                continue;
            }
            let combo = (first.value + second.value) / (first.cost + second.cost).max(1e-9);
            let single = first.efficiency();
            let better = match best {
                None => true,
                Some((bc, bs, _)) => {
                    combo > bc + 1e-12 || ((combo - bc).abs() <= 1e-12 && single > bs)
                }
            };
            if better {
                best = Some((combo, single, first));
            }
        }
    }
    best.map(|(_, _, step)| step)
}
