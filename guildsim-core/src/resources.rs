//! Resource vector arithmetic.
//!
//! Every economic quantity in the simulation is a five-scalar vector over
//! emeralds and the four gathered resources. Rates come in two units:
//! per-hour (persisted, user-visible) and per-second (internal
//! accumulation). The units are separate wrapper types with explicit
//! conversion, so a per-hour value can never be added to a per-second one.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// One of the five resource scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Emeralds,
    Ores,
    Wood,
    Fish,
    Crops,
}

impl ResourceKind {
    /// Fixed iteration order. Everything that walks the kinds walks them in
    /// this order, so results are deterministic.
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Emeralds,
        ResourceKind::Ores,
        ResourceKind::Wood,
        ResourceKind::Fish,
        ResourceKind::Crops,
    ];

    /// The four non-emerald kinds, in fixed order.
    pub const GATHERED: [ResourceKind; 4] = [
        ResourceKind::Ores,
        ResourceKind::Wood,
        ResourceKind::Fish,
        ResourceKind::Crops,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::Emeralds => "emeralds",
            ResourceKind::Ores => "ores",
            ResourceKind::Wood => "wood",
            ResourceKind::Fish => "fish",
            ResourceKind::Crops => "crops",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A five-scalar resource vector.
///
/// Plain amounts (storage contents, packet payloads) use this type
/// directly; rates wrap it in [`PerHour`] or [`PerSecond`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Resources {
    pub emeralds: f64,
    pub ores: f64,
    pub wood: f64,
    pub fish: f64,
    pub crops: f64,
}

impl Resources {
    pub const ZERO: Resources = Resources {
        emeralds: 0.0,
        ores: 0.0,
        wood: 0.0,
        fish: 0.0,
        crops: 0.0,
    };

    pub fn new(emeralds: f64, ores: f64, wood: f64, fish: f64, crops: f64) -> Self {
        Self {
            emeralds,
            ores,
            wood,
            fish,
            crops,
        }
    }

    /// A vector with a single non-zero component.
    pub fn only(kind: ResourceKind, amount: f64) -> Self {
        let mut r = Resources::ZERO;
        r.set(kind, amount);
        r
    }

    /// The same amount in every component.
    pub fn splat(amount: f64) -> Self {
        Resources::new(amount, amount, amount, amount, amount)
    }

    pub fn get(&self, kind: ResourceKind) -> f64 {
        match kind {
            ResourceKind::Emeralds => self.emeralds,
            ResourceKind::Ores => self.ores,
            ResourceKind::Wood => self.wood,
            ResourceKind::Fish => self.fish,
            ResourceKind::Crops => self.crops,
        }
    }

    pub fn set(&mut self, kind: ResourceKind, amount: f64) {
        match kind {
            ResourceKind::Emeralds => self.emeralds = amount,
            ResourceKind::Ores => self.ores = amount,
            ResourceKind::Wood => self.wood = amount,
            ResourceKind::Fish => self.fish = amount,
            ResourceKind::Crops => self.crops = amount,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, f64)> + '_ {
        ResourceKind::ALL.iter().map(move |&k| (k, self.get(k)))
    }

    /// Component-wise subtraction, optionally clamping each result to zero.
    pub fn sub_clamped(self, other: Resources, clamp: bool) -> Resources {
        let raw = self - other;
        if clamp {
            raw.max(Resources::ZERO)
        } else {
            raw
        }
    }

    pub fn scale(self, factor: f64) -> Resources {
        Resources::new(
            self.emeralds * factor,
            self.ores * factor,
            self.wood * factor,
            self.fish * factor,
            self.crops * factor,
        )
    }

    /// Component-wise product.
    pub fn mul(self, other: Resources) -> Resources {
        Resources::new(
            self.emeralds * other.emeralds,
            self.ores * other.ores,
            self.wood * other.wood,
            self.fish * other.fish,
            self.crops * other.crops,
        )
    }

    pub fn div_scalar(self, divisor: f64) -> Resources {
        self.scale(1.0 / divisor)
    }

    pub fn min(self, other: Resources) -> Resources {
        Resources::new(
            self.emeralds.min(other.emeralds),
            self.ores.min(other.ores),
            self.wood.min(other.wood),
            self.fish.min(other.fish),
            self.crops.min(other.crops),
        )
    }

    pub fn max(self, other: Resources) -> Resources {
        Resources::new(
            self.emeralds.max(other.emeralds),
            self.ores.max(other.ores),
            self.wood.max(other.wood),
            self.fish.max(other.fish),
            self.crops.max(other.crops),
        )
    }

    /// True when every component of `self` is at least the matching
    /// component of `other`.
    pub fn covers(&self, other: &Resources) -> bool {
        ResourceKind::ALL.iter().all(|&k| self.get(k) >= other.get(k))
    }

    pub fn is_zero(&self) -> bool {
        *self == Resources::ZERO
    }

    pub fn total(&self) -> f64 {
        self.emeralds + self.ores + self.wood + self.fish + self.crops
    }

    /// Sum of the four non-emerald components.
    pub fn gathered_total(&self) -> f64 {
        self.ores + self.wood + self.fish + self.crops
    }

    /// The vector with emeralds zeroed out.
    pub fn gathered_only(self) -> Resources {
        Resources { emeralds: 0.0, ..self }
    }

    /// The vector with everything but emeralds zeroed out.
    pub fn emeralds_only(self) -> Resources {
        Resources::only(ResourceKind::Emeralds, self.emeralds)
    }
}

impl Add for Resources {
    type Output = Resources;
    fn add(self, rhs: Resources) -> Resources {
        Resources::new(
            self.emeralds + rhs.emeralds,
            self.ores + rhs.ores,
            self.wood + rhs.wood,
            self.fish + rhs.fish,
            self.crops + rhs.crops,
        )
    }
}

impl AddAssign for Resources {
    fn add_assign(&mut self, rhs: Resources) {
        *self = *self + rhs;
    }
}

impl Sub for Resources {
    type Output = Resources;
    fn sub(self, rhs: Resources) -> Resources {
        Resources::new(
            self.emeralds - rhs.emeralds,
            self.ores - rhs.ores,
            self.wood - rhs.wood,
            self.fish - rhs.fish,
            self.crops - rhs.crops,
        )
    }
}

impl SubAssign for Resources {
    fn sub_assign(&mut self, rhs: Resources) {
        *self = *self - rhs;
    }
}

pub const SECONDS_PER_HOUR: f64 = 3600.0;

/// A rate expressed per hour of simulated time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerHour(pub Resources);

/// A rate expressed per second of simulated time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerSecond(pub Resources);

impl PerHour {
    pub fn per_second(self) -> PerSecond {
        PerSecond(self.0.div_scalar(SECONDS_PER_HOUR))
    }
}

impl PerSecond {
    pub fn per_hour(self) -> PerHour {
        PerHour(self.0.scale(SECONDS_PER_HOUR))
    }
}

impl Add for PerHour {
    type Output = PerHour;
    fn add(self, rhs: PerHour) -> PerHour {
        PerHour(self.0 + rhs.0)
    }
}

impl AddAssign for PerHour {
    fn add_assign(&mut self, rhs: PerHour) {
        self.0 += rhs.0;
    }
}

impl Sub for PerHour {
    type Output = PerHour;
    fn sub(self, rhs: PerHour) -> PerHour {
        PerHour(self.0 - rhs.0)
    }
}

impl Add for PerSecond {
    type Output = PerSecond;
    fn add(self, rhs: PerSecond) -> PerSecond {
        PerSecond(self.0 + rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_clamped() {
        let a = Resources::new(1.0, 2.0, 3.0, 4.0, 5.0);
        let b = Resources::splat(3.0);
        let clamped = a.sub_clamped(b, true);
        assert_eq!(clamped, Resources::new(0.0, 0.0, 0.0, 1.0, 2.0));
        let raw = a.sub_clamped(b, false);
        assert_eq!(raw, Resources::new(-2.0, -1.0, 0.0, 1.0, 2.0));
    }

    #[test]
    fn test_unit_conversion_round_trips() {
        let hourly = PerHour(Resources::new(3600.0, 7200.0, 0.0, 0.0, 36.0));
        let per_sec = hourly.per_second();
        assert_eq!(per_sec.0.emeralds, 1.0);
        assert_eq!(per_sec.0.ores, 2.0);
        assert_eq!(per_sec.0.crops, 0.01);
        assert_eq!(per_sec.per_hour(), hourly);
    }

    #[test]
    fn test_covers() {
        let cap = Resources::splat(10.0);
        assert!(cap.covers(&Resources::splat(10.0)));
        assert!(!cap.covers(&Resources::only(ResourceKind::Wood, 10.5)));
    }

    #[test]
    fn test_kind_access_round_trip() {
        let mut r = Resources::ZERO;
        for (i, &kind) in ResourceKind::ALL.iter().enumerate() {
            r.set(kind, i as f64);
        }
        assert_eq!(r, Resources::new(0.0, 1.0, 2.0, 3.0, 4.0));
        assert_eq!(r.gathered_total(), 10.0);
        assert_eq!(r.total(), 10.0);
    }

    #[test]
    fn test_splits() {
        let r = Resources::new(5.0, 1.0, 2.0, 3.0, 4.0);
        assert_eq!(r.gathered_only() + r.emeralds_only(), r);
    }
}
