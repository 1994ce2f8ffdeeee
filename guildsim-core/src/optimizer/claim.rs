//! Claim structure: classification of a guild's territories and the
//! claim-wide resource balance the optimizer steers by.

use crate::defines;
use crate::graph::{TerritoryGraph, CHEAPEST_MODEL};
use crate::resources::{ResourceKind, Resources, SECONDS_PER_HOUR};
use crate::state::{Tag, Territory, WorldState};
use std::collections::{BTreeMap, BTreeSet};

/// What a territory contributes, judged by its base generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerritoryClass {
    /// High flat emerald output.
    City,
    /// Exactly one gathered resource.
    Single(ResourceKind),
    /// Two gathered resources.
    Double,
    /// Three or more gathered resources.
    Rainbow,
    /// Produces nothing of note.
    Other,
}

pub fn classify(base: &Resources) -> TerritoryClass {
    if (base.emeralds - defines::CITY_EMERALD_RATE).abs() < 1.0 {
        return TerritoryClass::City;
    }
    let produced: Vec<ResourceKind> = ResourceKind::GATHERED
        .iter()
        .copied()
        .filter(|&k| base.get(k) > 0.0)
        .collect();
    match produced.len() {
        0 => TerritoryClass::Other,
        1 => TerritoryClass::Single(produced[0]),
        2 => TerritoryClass::Double,
        _ => TerritoryClass::Rainbow,
    }
}

/// One guild's territories, bucketed for the optimizer. Every bucket is
/// sorted by hop distance to the HQ (then name), nearest first.
#[derive(Debug, Clone)]
pub struct Claim {
    pub guild: Tag,
    pub hq: String,
    /// Every member, name-sorted.
    pub members: Vec<String>,
    pub cities: Vec<String>,
    pub singles: BTreeMap<ResourceKind, Vec<String>>,
    pub doubles: Vec<String>,
    pub rainbows: Vec<String>,
    pub hops: BTreeMap<String, u32>,
}

/// Hop distance used for members the HQ cannot reach.
const UNREACHABLE_HOPS: u32 = u32::MAX / 2;

impl Claim {
    /// Bucket a guild's territories. Fails (with reasons) when the guild
    /// has no HQ or the subset excludes it.
    pub fn build(
        state: &WorldState,
        guild: &str,
        subset: Option<&BTreeSet<String>>,
    ) -> Result<Claim, Vec<String>> {
        let mut members: Vec<String> = state
            .owned_names(guild)
            .into_iter()
            .filter(|n| subset.map(|s| s.contains(n)).unwrap_or(true))
            .collect();
        members.sort();
        if members.is_empty() {
            return Err(vec![format!("guild {} holds no territories to optimize", guild)]);
        }
        let Some(hq) = state.hq_of(guild).map(|t| t.name.clone()) else {
            return Err(vec![format!("guild {} has no HQ", guild)]);
        };
        if !members.contains(&hq) {
            return Err(vec![format!(
                "territory subset for {} does not include the HQ {}",
                guild, hq
            )]);
        }

        let graph = TerritoryGraph::build(state);
        let view = graph.view(state, guild, CHEAPEST_MODEL);
        let reachable = graph.hop_distances(graph.node(&hq).expect("HQ is in the graph"), &view);
        let hops: BTreeMap<String, u32> = members
            .iter()
            .map(|n| {
                (
                    n.clone(),
                    reachable.get(n).copied().unwrap_or(UNREACHABLE_HOPS),
                )
            })
            .collect();

        let mut cities = Vec::new();
        let mut singles: BTreeMap<ResourceKind, Vec<String>> = BTreeMap::new();
        let mut doubles = Vec::new();
        let mut rainbows = Vec::new();
        for name in &members {
            if *name == hq {
                continue;
            }
            let territory = &state.territories[name];
            match classify(&territory.generation.base.0) {
                TerritoryClass::City => cities.push(name.clone()),
                TerritoryClass::Single(kind) => {
                    singles.entry(kind).or_default().push(name.clone())
                }
                TerritoryClass::Double => doubles.push(name.clone()),
                TerritoryClass::Rainbow => rainbows.push(name.clone()),
                TerritoryClass::Other => {}
            }
        }
        let by_hops = |list: &mut Vec<String>| {
            list.sort_by(|a, b| hops[a].cmp(&hops[b]).then_with(|| a.cmp(b)));
        };
        by_hops(&mut cities);
        for list in singles.values_mut() {
            by_hops(list);
        }
        by_hops(&mut doubles);
        by_hops(&mut rainbows);

        Ok(Claim {
            guild: guild.to_string(),
            hq,
            members,
            cities,
            singles,
            doubles,
            rainbows,
            hops,
        })
    }

    /// Structural problems that make an economy unconfigurable.
    pub fn validate(&self, state: &WorldState) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.cities.is_empty() {
            warnings.push(format!("claim of {} has no city", self.guild));
        }
        for kind in ResourceKind::GATHERED {
            let covered = self
                .singles
                .get(&kind)
                .map(|l| !l.is_empty())
                .unwrap_or(false)
                || self
                    .doubles
                    .iter()
                    .chain(self.rainbows.iter())
                    .any(|n| state.territories[n].generation.base.0.get(kind) > 0.0);
            if !covered {
                warnings.push(format!("claim of {} produces no {}", self.guild, kind));
            }
        }
        warnings
    }

    /// Non-HQ producers of one gathered resource, best candidates first:
    /// rainbows, then doubles, then the dedicated set, each rank ordered by
    /// base value over hop distance.
    pub fn producers_of(&self, state: &WorldState, kind: ResourceKind) -> Vec<String> {
        let score = |name: &String| {
            let value = state.territories[name].generation.base.0.get(kind);
            value / self.hops[name].max(1) as f64
        };
        let empty = Vec::new();
        let dedicated = self.singles.get(&kind).unwrap_or(&empty);
        let mut ranked = Vec::new();
        for bucket in [&self.rainbows, &self.doubles, dedicated] {
            let mut tier: Vec<String> = bucket
                .iter()
                .filter(|n| state.territories[*n].generation.base.0.get(kind) > 0.0)
                .cloned()
                .collect();
            tier.sort_by(|a, b| {
                score(b)
                    .partial_cmp(&score(a))
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.cmp(b))
            });
            ranked.extend(tier);
        }
        ranked
    }
}

/// Hourly production of a territory at its configured (options) levels.
pub fn configured_production(territory: &Territory) -> Resources {
    let bonuses = &territory.options.bonuses;
    let base = territory.generation.base.0;
    let res_mult = defines::RATE_MULT[bonuses.resource_rate as usize]
        * defines::EFFICIENT_RESOURCE_MULT[bonuses.efficient_resource as usize]
        * territory.generation_bonus;
    let em_mult = defines::RATE_MULT[bonuses.emerald_rate as usize]
        * defines::EFFICIENT_EMERALD_MULT[bonuses.efficient_emerald as usize]
        * territory.generation_bonus;
    base.gathered_only().scale(res_mult) + base.emeralds_only().scale(em_mult)
}

/// Hourly upkeep of a territory's configured upgrades and bonuses.
pub fn configured_upkeep(territory: &Territory) -> Resources {
    let mut upkeep = Resources::ZERO;
    for kind in crate::state::UpgradeKind::ALL {
        let level = territory.options.upgrades.get(kind);
        let cost_kind = kind.cost_kind();
        upkeep.set(
            cost_kind,
            upkeep.get(cost_kind) + defines::UPGRADE_COSTS[level as usize],
        );
    }
    for kind in crate::state::BonusKind::ALL {
        let def = kind.def();
        let level = territory.options.bonuses.get(kind);
        upkeep.set(
            def.cost_kind,
            upkeep.get(def.cost_kind) + def.costs[level as usize],
        );
    }
    upkeep
}

/// Claim-wide hourly net per resource (production minus upkeep); negative
/// components mean the claim is draining that resource.
pub fn net_balance(state: &WorldState, claim: &Claim) -> Resources {
    let mut net = Resources::ZERO;
    for name in &claim.members {
        let territory = &state.territories[name];
        net += configured_production(territory);
        net -= configured_upkeep(territory);
    }
    net
}

/// Peak generation per second at configured levels, for storage sizing.
pub fn peak_per_second(territory: &Territory) -> Resources {
    configured_production(territory).div_scalar(SECONDS_PER_HOUR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::WorldStateBuilder;

    #[test]
    fn test_classification() {
        assert_eq!(
            classify(&Resources::only(ResourceKind::Emeralds, 18000.0)),
            TerritoryClass::City
        );
        assert_eq!(
            classify(&Resources::only(ResourceKind::Ores, 3600.0)),
            TerritoryClass::Single(ResourceKind::Ores)
        );
        assert_eq!(
            classify(&Resources::new(0.0, 100.0, 100.0, 0.0, 0.0)),
            TerritoryClass::Double
        );
        assert_eq!(
            classify(&Resources::new(9000.0, 100.0, 100.0, 100.0, 0.0)),
            TerritoryClass::Rainbow
        );
        assert_eq!(classify(&Resources::ZERO), TerritoryClass::Other);
    }

    fn claim_world() -> WorldState {
        WorldStateBuilder::new()
            .with_guild("Alpha", "ALF")
            .with_territory("HQ", "ALF")
            .with_territory("City", "ALF")
            .with_territory("OreNear", "ALF")
            .with_territory("OreFar", "ALF")
            .with_territory("Mix", "ALF")
            .with_hq("HQ")
            .with_link("HQ", "City")
            .with_link("HQ", "OreNear")
            .with_link("OreNear", "OreFar")
            .with_link("City", "Mix")
            .with_generation("City", Resources::only(ResourceKind::Emeralds, 18000.0))
            .with_generation("OreNear", Resources::only(ResourceKind::Ores, 3600.0))
            .with_generation("OreFar", Resources::only(ResourceKind::Ores, 7200.0))
            .with_generation(
                "Mix",
                Resources::new(0.0, 0.0, 1800.0, 1800.0, 1800.0),
            )
            .build()
    }

    #[test]
    fn test_buckets_and_hop_order() {
        let state = claim_world();
        let claim = Claim::build(&state, "ALF", None).unwrap();
        assert_eq!(claim.hq, "HQ");
        assert_eq!(claim.cities, vec!["City"]);
        assert_eq!(
            claim.singles[&ResourceKind::Ores],
            vec!["OreNear", "OreFar"]
        );
        assert_eq!(claim.rainbows, vec!["Mix"]);
        assert_eq!(claim.hops["OreFar"], 2);
    }

    #[test]
    fn test_validation_flags_missing_production() {
        let state = claim_world();
        let claim = Claim::build(&state, "ALF", None).unwrap();
        let warnings = claim.validate(&state);
        // Ores, wood, fish, crops are all covered; nothing to report.
        assert!(warnings.iter().all(|w| !w.contains("produces no")));

        // Remove the rainbow: wood/fish/crops become uncovered.
        let subset: BTreeSet<String> = ["HQ", "City", "OreNear", "OreFar"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let claim = Claim::build(&state, "ALF", Some(&subset)).unwrap();
        let warnings = claim.validate(&state);
        assert_eq!(warnings.len(), 3);
    }

    #[test]
    fn test_missing_hq_is_an_error() {
        let mut state = claim_world();
        state.territory_mut("HQ").unwrap().options.is_hq = false;
        assert!(Claim::build(&state, "ALF", None).is_err());
    }

    #[test]
    fn test_producer_ranking() {
        let state = claim_world();
        let claim = Claim::build(&state, "ALF", None).unwrap();
        let producers = claim.producers_of(&state, ResourceKind::Ores);
        // Singles come after rainbows/doubles, ranked by value per hop:
        // OreNear 3600/1, OreFar 7200/2 -> tie broken by name.
        assert_eq!(producers, vec!["OreFar", "OreNear"]);
    }

    #[test]
    fn test_net_balance_counts_upkeep() {
        let mut state = claim_world();
        let claim = Claim::build(&state, "ALF", None).unwrap();
        let before = net_balance(&state, &claim);
        assert_eq!(before.ores, 3600.0 + 7200.0);

        // A damage upgrade at level 1 costs 5 ores per hour.
        state.territory_mut("OreNear").unwrap().options.upgrades.damage = 1;
        let after = net_balance(&state, &claim);
        assert_eq!(after.ores, before.ores - 5.0);
    }
}
