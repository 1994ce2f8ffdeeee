//! Externalized balance constants: level tables, intervals, treasury tiers.
//!
//! Costs are expressed per hour; the upkeep system divides by 3600 when it
//! charges them each tick.

use crate::resources::{ResourceKind, Resources};
use crate::state::{BonusKind, TreasuryLevel, UpgradeKind};

/// Simulated seconds per tick at the reference rate of 1 TPS.
pub const TICKS_PER_MINUTE: u64 = 60;

/// Default dispatch cadence for the gathered-resource stream, in ticks.
pub const RESOURCE_INTERVAL: u64 = 4;
/// Default dispatch cadence for the emerald stream, in ticks.
pub const EMERALD_INTERVAL: u64 = 4;

/// Default passage tax for foreign traffic.
pub const DEFAULT_TAX: f64 = 0.05;
/// Default passage tax for allied traffic.
pub const DEFAULT_ALLY_TAX: f64 = 0.05;

/// Base storage capacity before storage bonuses.
pub const BASE_STORAGE: Resources = Resources {
    emeralds: 5000.0,
    ores: 300.0,
    wood: 300.0,
    fish: 300.0,
    crops: 300.0,
};

/// Base emerald generation that marks a territory as a city.
pub const CITY_EMERALD_RATE: f64 = 18000.0;

/// Highest core upgrade level.
pub const MAX_UPGRADE_LEVEL: u8 = 11;

/// Per-hour cost of holding a core upgrade at each level, in the upgrade's
/// cost resource.
pub const UPGRADE_COSTS: [f64; 12] = [
    0.0, 5.0, 10.0, 20.0, 40.0, 80.0, 160.0, 320.0, 640.0, 1280.0, 2560.0, 5120.0,
];

impl UpgradeKind {
    /// The resource each core upgrade is paid in.
    pub fn cost_kind(self) -> ResourceKind {
        match self {
            UpgradeKind::Damage => ResourceKind::Ores,
            UpgradeKind::Attack => ResourceKind::Crops,
            UpgradeKind::Health => ResourceKind::Wood,
            UpgradeKind::Defence => ResourceKind::Fish,
        }
    }
}

/// Static description of one bonus line: its level cap, the resource its
/// upkeep is paid in, and the per-hour cost ladder.
pub struct BonusDef {
    pub max_level: u8,
    pub cost_kind: ResourceKind,
    pub costs: &'static [f64],
}

const EFFICIENT_RESOURCE_DEF: BonusDef = BonusDef {
    max_level: 6,
    cost_kind: ResourceKind::Emeralds,
    costs: &[0.0, 100.0, 200.0, 400.0, 800.0, 1600.0, 3200.0],
};

const EFFICIENT_EMERALD_DEF: BonusDef = BonusDef {
    max_level: 3,
    cost_kind: ResourceKind::Ores,
    costs: &[0.0, 50.0, 100.0, 200.0],
};

const RESOURCE_RATE_DEF: BonusDef = BonusDef {
    max_level: 3,
    cost_kind: ResourceKind::Emeralds,
    costs: &[0.0, 50.0, 100.0, 200.0],
};

const EMERALD_RATE_DEF: BonusDef = BonusDef {
    max_level: 3,
    cost_kind: ResourceKind::Ores,
    costs: &[0.0, 25.0, 50.0, 100.0],
};

const LARGER_RESOURCE_STORAGE_DEF: BonusDef = BonusDef {
    max_level: 6,
    cost_kind: ResourceKind::Emeralds,
    costs: &[0.0, 100.0, 200.0, 400.0, 800.0, 1600.0, 3200.0],
};

const LARGER_EMERALD_STORAGE_DEF: BonusDef = BonusDef {
    max_level: 6,
    cost_kind: ResourceKind::Ores,
    costs: &[0.0, 200.0, 400.0, 800.0, 1600.0, 3200.0, 6400.0],
};

const TOWER_AURA_DEF: BonusDef = BonusDef {
    max_level: 3,
    cost_kind: ResourceKind::Emeralds,
    costs: &[0.0, 100.0, 200.0, 400.0],
};

const TOWER_VOLLEY_DEF: BonusDef = BonusDef {
    max_level: 3,
    cost_kind: ResourceKind::Emeralds,
    costs: &[0.0, 50.0, 100.0, 200.0],
};

impl BonusKind {
    pub fn def(self) -> &'static BonusDef {
        match self {
            BonusKind::EfficientResource => &EFFICIENT_RESOURCE_DEF,
            BonusKind::EfficientEmerald => &EFFICIENT_EMERALD_DEF,
            BonusKind::ResourceRate => &RESOURCE_RATE_DEF,
            BonusKind::EmeraldRate => &EMERALD_RATE_DEF,
            BonusKind::LargerResourceStorage => &LARGER_RESOURCE_STORAGE_DEF,
            BonusKind::LargerEmeraldStorage => &LARGER_EMERALD_STORAGE_DEF,
            BonusKind::TowerAura => &TOWER_AURA_DEF,
            BonusKind::TowerVolley => &TOWER_VOLLEY_DEF,
        }
    }
}

/// Production multiplier for each efficient-resource level.
pub const EFFICIENT_RESOURCE_MULT: [f64; 7] = [1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0];
/// Emerald production multiplier for each efficient-emerald level.
pub const EFFICIENT_EMERALD_MULT: [f64; 4] = [1.0, 1.5, 2.0, 2.5];
/// Throughput multiplier for each rate level (both streams).
pub const RATE_MULT: [f64; 4] = [1.0, 1.5, 2.0, 3.0];
/// Capacity multiplier for each storage-bonus level (both stores).
pub const STORAGE_MULT: [f64; 7] = [1.0, 1.5, 2.0, 3.0, 4.0, 5.5, 7.0];

/// Hold-time thresholds, in ticks, above which the next treasury tier is
/// reached: 1 hour, 1 day, 5 days, 12 days.
pub const TREASURY_THRESHOLDS: [u64; 4] = [3_600, 86_400, 432_000, 1_036_800];

/// Generation multiplier per treasury tier.
pub fn treasury_bonus(level: TreasuryLevel) -> f64 {
    match level {
        TreasuryLevel::VeryLow => 1.0,
        TreasuryLevel::Low => 1.05,
        TreasuryLevel::Medium => 1.10,
        TreasuryLevel::High => 1.20,
        TreasuryLevel::VeryHigh => 1.30,
    }
}

/// Treasury tier for a territory held for `held_ticks`.
pub fn treasury_for_hold(held_ticks: u64) -> TreasuryLevel {
    match held_ticks {
        t if t < TREASURY_THRESHOLDS[0] => TreasuryLevel::VeryLow,
        t if t < TREASURY_THRESHOLDS[1] => TreasuryLevel::Low,
        t if t < TREASURY_THRESHOLDS[2] => TreasuryLevel::Medium,
        t if t < TREASURY_THRESHOLDS[3] => TreasuryLevel::High,
        _ => TreasuryLevel::VeryHigh,
    }
}

/// Set-level contribution of one aura or volley level.
pub const AURA_VOLLEY_SET_WEIGHT: u32 = 3;
