//! Snapshot capture and restore.
//!
//! A snapshot carries the dynamic state of the world: ownership, options,
//! storage, tributes, route pins, and (optionally) in-transit packets. The
//! static map data (base generation, locations, links) comes from the
//! world the snapshot is applied onto; lookup graphs and routes are
//! rebuilt after load, per-name, never from stored pointers.

use crate::routes;
use crate::state::{
    BonusLevels, Links, OwnerRef, Route, RoutingMode, Storage, TaxRate, Territory,
    TerritoryOptions, TransitPacket, TreasuryLevel, Tribute, UpgradeLevels, WorldState, NONE_TAG,
};
use crate::state::{Border, Guild, RuntimeOptions, Tag};
use crate::step::recompute_tribute_rates;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot references unknown territory {name}")]
    UnknownTerritory { name: String },
    #[error("snapshot references unknown guild {tag}")]
    UnknownGuild { tag: Tag },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildRecord {
    pub name: String,
    pub tag: Tag,
    pub allies: BTreeSet<Tag>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerritoryRecord {
    pub name: String,
    pub guild: Tag,
    pub is_hq: bool,
    pub border: Border,
    pub routing_mode: RoutingMode,
    pub tax: TaxRate,
    pub upgrades: UpgradeLevels,
    pub bonuses: BonusLevels,
    pub set_level: u32,
    pub links: Links,
    pub connected_territories: BTreeSet<String>,
    pub treasury_override: Option<TreasuryLevel>,
    pub storage: Storage,
    pub captured_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transit: Option<Vec<TransitPacket>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick_rate: f64,
    pub current_tick: u64,
    pub halted: bool,
    pub guilds: Vec<GuildRecord>,
    pub territories: Vec<TerritoryRecord>,
    pub tributes: Vec<Tribute>,
    pub manual_route_to_hq: BTreeMap<String, Route>,
    pub manual_route_from_hq: BTreeMap<String, Route>,
    pub runtime_options: RuntimeOptions,
}

/// Capture the world into a snapshot document.
pub fn capture(state: &WorldState) -> Snapshot {
    let encode_transit = state.options.encode_in_transit_resources;

    let mut guilds: Vec<GuildRecord> = state
        .guilds
        .values()
        .filter(|g| g.tag != NONE_TAG)
        .map(|g| GuildRecord {
            name: g.name.clone(),
            tag: g.tag.clone(),
            allies: g.allies.clone(),
        })
        .collect();
    guilds.sort_by(|a, b| a.tag.cmp(&b.tag));

    let territories: Vec<TerritoryRecord> = state
        .sorted_territory_names()
        .into_iter()
        .map(|name| {
            let territory = &state.territories[&name];
            TerritoryRecord {
                name: name.clone(),
                guild: territory.guild.tag.clone(),
                is_hq: territory.options.is_hq,
                border: territory.options.border,
                routing_mode: territory.options.routing_mode,
                tax: territory.options.tax,
                upgrades: territory.options.upgrades,
                bonuses: territory.options.bonuses,
                set_level: territory.set_level(),
                links: territory.links.clone(),
                connected_territories: territory.links.neighbors().cloned().collect(),
                treasury_override: territory.treasury_override,
                storage: territory.storage,
                captured_at: territory.captured_at,
                transit: encode_transit.then(|| territory.transit.clone()),
            }
        })
        .collect();

    let tributes: Vec<Tribute> = state
        .sorted_tribute_ids()
        .into_iter()
        .map(|id| state.tributes[&id].clone())
        .collect();

    Snapshot {
        tick_rate: state.tick_rate,
        current_tick: state.tick,
        halted: state.halted,
        guilds,
        territories,
        tributes,
        manual_route_to_hq: state
            .manual_route_to_hq
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        manual_route_from_hq: state
            .manual_route_from_hq
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        runtime_options: state.options.clone(),
    }
}

/// Restore a snapshot onto a world built from the same map files. Routes
/// are recomputed from scratch afterwards.
pub fn apply(state: &mut WorldState, snapshot: &Snapshot) -> Result<(), SnapshotError> {
    for record in &snapshot.territories {
        if !state.territories.contains_key(&record.name) {
            return Err(SnapshotError::UnknownTerritory {
                name: record.name.clone(),
            });
        }
    }

    let mut guilds = crate::state::HashMap::new();
    guilds.insert(NONE_TAG.to_string(), Guild::none());
    for record in &snapshot.guilds {
        guilds.insert(
            record.tag.clone(),
            Guild {
                name: record.name.clone(),
                tag: record.tag.clone(),
                allies: record.allies.clone(),
                tribute_in: Default::default(),
                tribute_out: Default::default(),
            },
        );
    }

    for record in &snapshot.territories {
        let owner = if record.guild == NONE_TAG {
            OwnerRef::none()
        } else {
            let guild = guilds
                .get(&record.guild)
                .ok_or_else(|| SnapshotError::UnknownGuild {
                    tag: record.guild.clone(),
                })?;
            OwnerRef {
                tag: guild.tag.clone(),
                name: guild.name.clone(),
            }
        };
        let territory = state
            .territory_mut(&record.name)
            .expect("territory presence checked above");
        territory.guild = owner;
        territory.options = TerritoryOptions {
            upgrades: record.upgrades,
            bonuses: record.bonuses,
            tax: record.tax,
            routing_mode: record.routing_mode,
            border: record.border,
            is_hq: record.is_hq,
        };
        // Effective levels settle through upkeep; start them configured.
        territory.effective.upgrades = record.upgrades;
        territory.effective.bonuses = record.bonuses;
        territory.links = record.links.clone();
        territory.treasury_override = record.treasury_override;
        territory.captured_at = record.captured_at;
        territory.storage.capacity =
            Territory::capacity_for(territory.storage.base, &record.bonuses);
        territory.storage.current = record.storage.current.min(territory.storage.capacity);
        territory.transit = record.transit.clone().unwrap_or_default();
        territory.routes_to_hq.clear();
        territory.routes_from_hq.clear();
        territory.route_tax = -1.0;
    }

    state.guilds = guilds;
    state.tick = snapshot.current_tick;
    state.tick_rate = snapshot.tick_rate;
    state.halted = snapshot.halted;
    state.options = snapshot.runtime_options.clone();
    state.tributes = snapshot.tributes.iter().map(|t| (t.id, t.clone())).collect();
    state.next_tribute_id = snapshot
        .tributes
        .iter()
        .map(|t| t.id + 1)
        .max()
        .unwrap_or(1);
    state.manual_route_to_hq = snapshot
        .manual_route_to_hq
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    state.manual_route_from_hq = snapshot
        .manual_route_from_hq
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    recompute_tribute_rates(state);
    routes::update_routes(state);
    Ok(())
}

pub fn to_json(snapshot: &Snapshot) -> Result<String, SnapshotError> {
    Ok(serde_json::to_string_pretty(snapshot)?)
}

pub fn from_json(json: &str) -> Result<Snapshot, SnapshotError> {
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::{PerHour, ResourceKind, Resources};
    use crate::routes::update_routes;
    use crate::step;
    use crate::testing::WorldStateBuilder;

    fn populated_world() -> WorldState {
        let mut state = WorldStateBuilder::new()
            .with_guild("Alpha", "ALF")
            .with_guild("Beta", "BET")
            .with_territory("A", "ALF")
            .with_territory("B", "ALF")
            .with_territory("X", "BET")
            .with_hq("A")
            .with_hq("X")
            .with_link("A", "B")
            .with_link("B", "X")
            .with_generation("B", Resources::only(ResourceKind::Ores, 3600.0))
            .build();
        state.tick = 42;
        state.territory_mut("B").unwrap().options.upgrades.damage = 3;
        state.territory_mut("B").unwrap().storage.current.ores = 123.0;
        step::create_tribute(
            &mut state,
            Some("ALF".into()),
            Some("BET".into()),
            PerHour(Resources::only(ResourceKind::Emeralds, 60.0)),
            5,
        )
        .unwrap();
        update_routes(&mut state);
        state
    }

    /// A fresh world as built from the same map files: same territories and
    /// links, no dynamic state.
    fn fresh_world() -> WorldState {
        WorldStateBuilder::new()
            .with_territory("A", crate::state::NONE_TAG)
            .with_territory("B", crate::state::NONE_TAG)
            .with_territory("X", crate::state::NONE_TAG)
            .with_link("A", "B")
            .with_link("B", "X")
            .with_generation("B", Resources::only(ResourceKind::Ores, 3600.0))
            .build()
    }

    #[test]
    fn test_round_trip_preserves_observables() {
        let original = populated_world();
        let saved = capture(&original);

        let mut restored = fresh_world();
        apply(&mut restored, &saved).unwrap();

        assert_eq!(restored.tick, 42);
        assert_eq!(restored.guilds["ALF"].tribute_out.0.emeralds, 60.0);
        let b = restored.territory("B").unwrap();
        assert_eq!(b.guild.tag, "ALF");
        assert_eq!(b.options.upgrades.damage, 3);
        assert_eq!(b.storage.current.ores, 123.0);
        assert_eq!(b.routes_to_hq, original.territory("B").unwrap().routes_to_hq);

        // Capturing again yields an identical document.
        assert_eq!(capture(&restored), saved);
    }

    #[test]
    fn test_json_round_trip() {
        let snapshot = capture(&populated_world());
        let json = to_json(&snapshot).unwrap();
        let parsed = from_json(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn test_transit_encoding_is_optional() {
        let mut state = populated_world();
        state.options.encode_in_transit_resources = false;
        let snapshot = capture(&state);
        assert!(snapshot.territories.iter().all(|t| t.transit.is_none()));
    }

    #[test]
    fn test_unknown_territory_is_rejected() {
        let snapshot = capture(&populated_world());
        let mut empty = WorldState::default();
        assert!(matches!(
            apply(&mut empty, &snapshot),
            Err(SnapshotError::UnknownTerritory { .. })
        ));
    }
}
