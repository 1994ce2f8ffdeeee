//! Static world-definition files: the territory map and the guild roster.
//!
//! The map file stores resource rates as stringified floats; they are
//! parsed once at load. Territory ids are derived from names, never read
//! from disk.

use crate::resources::{PerHour, Resources};
use crate::state::{Guild, Location, Territory, WorldState};
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("malformed file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("territory {territory}: bad {field} value {value:?}")]
    BadNumber {
        territory: String,
        field: &'static str,
        value: String,
    },
    #[error("duplicate guild tag {tag}")]
    DuplicateGuild { tag: String },
}

#[derive(Debug, Deserialize)]
struct TerritoryEntry {
    resources: ResourceStrings,
    #[serde(rename = "tradingRoutes", default)]
    trading_routes: Vec<String>,
    #[serde(default)]
    location: LocationEntry,
}

#[derive(Debug, Default, Deserialize)]
struct ResourceStrings {
    #[serde(default)]
    emeralds: String,
    #[serde(default)]
    ores: String,
    #[serde(default)]
    wood: String,
    #[serde(default)]
    fish: String,
    #[serde(default)]
    crops: String,
}

#[derive(Debug, Default, Deserialize)]
struct LocationEntry {
    #[serde(default)]
    start: [i32; 2],
    #[serde(default)]
    end: [i32; 2],
}

#[derive(Debug, Deserialize)]
struct GuildEntry {
    name: String,
    tag: String,
}

fn parse_rate(territory: &str, field: &'static str, value: &str) -> Result<f64, FileError> {
    if value.is_empty() {
        return Ok(0.0);
    }
    value.parse::<f64>().map_err(|_| FileError::BadNumber {
        territory: territory.to_string(),
        field,
        value: value.to_string(),
    })
}

/// Build a fresh world from the two definition files. All territories
/// start unowned.
pub fn load_world(territory_json: &str, guild_json: &str) -> Result<WorldState, FileError> {
    let entries: BTreeMap<String, TerritoryEntry> = serde_json::from_str(territory_json)?;
    let guild_entries: Vec<GuildEntry> = serde_json::from_str(guild_json)?;

    let mut state = WorldState::default();
    for entry in guild_entries {
        if state.guilds.contains_key(&entry.tag) {
            return Err(FileError::DuplicateGuild { tag: entry.tag });
        }
        state
            .guilds
            .insert(entry.tag.clone(), Guild::new(entry.name, entry.tag));
    }

    for (name, entry) in &entries {
        let base = Resources::new(
            parse_rate(name, "emeralds", &entry.resources.emeralds)?,
            parse_rate(name, "ores", &entry.resources.ores)?,
            parse_rate(name, "wood", &entry.resources.wood)?,
            parse_rate(name, "fish", &entry.resources.fish)?,
            parse_rate(name, "crops", &entry.resources.crops)?,
        );
        let mut territory = Territory::new(
            name.clone(),
            PerHour(base),
            Location {
                start: entry.location.start,
                end: entry.location.end,
            },
        );
        for neighbor in &entry.trading_routes {
            // Links to names absent from the file are kept; the graph
            // layer ignores them.
            territory.links.direct.insert(neighbor.clone());
        }
        state.territories.insert(name.clone(), territory);
    }

    log::info!(
        "loaded {} territories and {} guilds",
        state.territories.len(),
        state.guilds.len() - 1
    );
    Ok(state)
}
