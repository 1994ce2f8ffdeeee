//! One tick of the world, and the mutation front door.
//!
//! `run_tick` advances the world one simulated second through the fixed
//! system order. `execute_command` applies a single [`Command`] with full
//! validation; on error the state is untouched.

use crate::defines;
use crate::input::{Command, RouteDirection};
use crate::metrics::SimMetrics;
use crate::resources::{PerHour, Resources};
use crate::routes;
use crate::state::{
    Border, BonusKind, EffectiveLevels, OwnerRef, Route, RoutingMode, Tag, Territory,
    TerritoryOptions, TreasuryLevel, Tribute, UpgradeKind, Warnings, WorldState, NONE_TAG,
};
use std::collections::BTreeSet;
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("territory not found: {name}")]
    UnknownTerritory { name: String },
    #[error("guild not found: {tag}")]
    UnknownGuild { tag: Tag },
    #[error("territory {name} is not owned by any guild")]
    TerritoryUnowned { name: String },
    #[error("illegal {kind} level {level} (max {max})")]
    IllegalLevel { kind: String, level: u8, max: u8 },
    #[error("invalid tax rate {rate}")]
    InvalidTax { rate: f64 },
    #[error("guild tag {tag} already exists")]
    DuplicateGuild { tag: Tag },
    #[error("guild tag {tag} is reserved")]
    ReservedTag { tag: Tag },
    #[error("tribute not found: {id}")]
    UnknownTribute { id: u64 },
    #[error("invalid tribute: {reason}")]
    InvalidTribute { reason: String },
    #[error("route is not among the current alternatives for {territory}")]
    StaleRoute { territory: String },
}

/// Advance the world by one tick.
#[instrument(skip_all, name = "run_tick")]
pub fn run_tick(state: &mut WorldState, mut metrics: Option<&mut SimMetrics>) {
    let tick_start = Instant::now();
    state.tick += 1;

    // Warning bits describe conditions of the current tick.
    for (_, territory) in state.territories.iter_mut() {
        territory.warnings = Warnings::empty();
    }

    let start = Instant::now();
    crate::systems::run_generation_tick(state);
    if let Some(m) = metrics.as_mut() {
        m.generation_time += start.elapsed();
    }

    let start = Instant::now();
    crate::systems::run_upkeep_tick(state);
    if let Some(m) = metrics.as_mut() {
        m.upkeep_time += start.elapsed();
    }

    let start = Instant::now();
    crate::systems::run_transit_tick(state);
    if let Some(m) = metrics.as_mut() {
        m.transit_time += start.elapsed();
    }

    crate::systems::run_treasury_tick(state);

    let start = Instant::now();
    crate::systems::run_tribute_tick(state);
    if let Some(m) = metrics.as_mut() {
        m.tribute_time += start.elapsed();
    }

    if state.routes_dirty {
        let start = Instant::now();
        routes::update_routes(state);
        if let Some(m) = metrics.as_mut() {
            m.route_time += start.elapsed();
        }
    }

    if let Some(m) = metrics.as_mut() {
        m.total_ticks += 1;
        m.total_time += tick_start.elapsed();
    }
}

/// Apply one command against the world.
pub fn execute_command(state: &mut WorldState, cmd: &Command) -> Result<(), CommandError> {
    match cmd {
        Command::SetGuild { territory, guild } => set_guild(state, territory, guild),
        Command::SetOptions { territory, options } => set_options(state, territory, options),
        Command::SetUpgrade {
            territory,
            kind,
            level,
        } => set_upgrade(state, territory, *kind, *level),
        Command::SetBonus {
            territory,
            kind,
            level,
        } => set_bonus(state, territory, *kind, *level),
        Command::SetTax {
            territory,
            tax,
            ally,
        } => set_tax(state, territory, *tax, *ally),
        Command::SetBorder { territory, border } => set_border(state, territory, *border),
        Command::SetRoutingMode { territory, mode } => set_routing_mode(state, territory, *mode),
        Command::SetHq { territory } => set_hq(state, territory),
        Command::SetTreasuryOverride { territory, level } => {
            set_treasury_override(state, territory, *level)
        }
        Command::ModifyStorage { territory, current } => modify_storage(state, territory, *current),
        Command::SetTradingRoute {
            territory,
            direction,
            route,
        } => set_trading_route(state, territory, *direction, route),
        Command::SetAllies { guild, allies } => set_allies(state, guild, allies),
        Command::CreateGuild { name, tag } => create_guild(state, name, tag),
        Command::DeleteGuild { tag } => delete_guild(state, tag),
        Command::CreateTribute {
            from_guild,
            to_guild,
            amount_per_hour,
            interval_minutes,
        } => create_tribute(
            state,
            from_guild.clone(),
            to_guild.clone(),
            *amount_per_hour,
            *interval_minutes,
        )
        .map(|_| ()),
        Command::EditTribute {
            id,
            amount_per_hour,
            interval_minutes,
        } => edit_tribute(state, *id, *amount_per_hour, *interval_minutes),
        Command::SetTributeActive { id, active } => set_tribute_active(state, *id, *active),
        Command::DeleteTribute { id } => delete_tribute(state, *id),
    }
}

fn require_territory<'a>(
    state: &'a WorldState,
    name: &str,
) -> Result<&'a Territory, CommandError> {
    state
        .territory(name)
        .ok_or_else(|| CommandError::UnknownTerritory {
            name: name.to_string(),
        })
}

fn require_guild_tag(state: &WorldState, tag: &str) -> Result<String, CommandError> {
    state
        .guild(tag)
        .map(|g| g.name.clone())
        .ok_or_else(|| CommandError::UnknownGuild {
            tag: tag.to_string(),
        })
}

/// Transfer a territory to a guild.
///
/// A repeated assignment to the current owner is a no-op. An actual owner
/// change resets the territory to defaults, drops every in-flight packet
/// whose route crossed it, and invalidates cached routes.
pub fn set_guild(state: &mut WorldState, name: &str, tag: &str) -> Result<(), CommandError> {
    require_territory(state, name)?;
    let guild_name = require_guild_tag(state, tag)?;

    if state.territories[name].guild.tag == tag {
        return Ok(());
    }

    // Packets routed through a territory that changed hands are lost: the
    // border they were cleared to cross no longer exists.
    let holders: Vec<String> = state.territories.keys().cloned().collect();
    for holder in holders {
        if let Some(territory) = state.territory_mut(&holder) {
            territory.transit.retain(|p| !p.route.iter().any(|n| n == name));
        }
    }

    let tick = state.tick;
    let territory = state.territory_mut(name).expect("territory checked above");
    let preserved_border = territory.options.border;
    let preserved_mode = territory.options.routing_mode;
    territory.guild = if tag == NONE_TAG {
        OwnerRef::none()
    } else {
        OwnerRef {
            tag: tag.to_string(),
            name: guild_name,
        }
    };
    territory.options = TerritoryOptions {
        border: preserved_border,
        routing_mode: preserved_mode,
        ..TerritoryOptions::default()
    };
    territory.effective = EffectiveLevels::default();
    territory.storage.capacity =
        Territory::capacity_for(territory.storage.base, &territory.effective.bonuses);
    territory.storage.current = Resources::ZERO;
    territory.treasury_override = None;
    territory.treasury = TreasuryLevel::VeryLow;
    territory.generation_bonus = defines::treasury_bonus(TreasuryLevel::VeryLow);
    territory.captured_at = tick;
    territory.generation.accumulator = Resources::ZERO;
    territory.generation.last_resource_tick = tick;
    territory.generation.last_emerald_tick = tick;
    territory.transit.clear();
    territory.routes_to_hq.clear();
    territory.routes_from_hq.clear();
    territory.route_tax = -1.0;

    state.manual_route_to_hq.remove(name);
    state.manual_route_from_hq.remove(name);
    state.routes_dirty = true;
    log::debug!("territory {} assigned to {}", name, tag);
    Ok(())
}

pub fn set_options(
    state: &mut WorldState,
    name: &str,
    options: &TerritoryOptions,
) -> Result<(), CommandError> {
    let territory = require_territory(state, name)?;
    let was = territory.options.clone();
    let owner = territory.guild.tag.clone();
    for kind in UpgradeKind::ALL {
        check_upgrade_level(kind, options.upgrades.get(kind))?;
    }
    for kind in BonusKind::ALL {
        check_bonus_level(kind, options.bonuses.get(kind))?;
    }
    check_tax(options.tax.tax)?;
    check_tax(options.tax.ally)?;
    if options.is_hq && owner == NONE_TAG {
        return Err(CommandError::TerritoryUnowned {
            name: name.to_string(),
        });
    }

    state
        .territory_mut(name)
        .expect("territory checked above")
        .options = options.clone();

    // Becoming the HQ clears the flag everywhere else in the guild.
    if options.is_hq && !was.is_hq {
        for other in state.owned_names(&owner) {
            if other != name {
                if let Some(t) = state.territory_mut(&other) {
                    t.options.is_hq = false;
                }
            }
        }
    }
    if was.border != options.border
        || was.routing_mode != options.routing_mode
        || was.is_hq != options.is_hq
        || was.tax != options.tax
    {
        state.routes_dirty = true;
    }
    Ok(())
}

fn check_upgrade_level(kind: UpgradeKind, level: u8) -> Result<(), CommandError> {
    if level > defines::MAX_UPGRADE_LEVEL {
        return Err(CommandError::IllegalLevel {
            kind: kind.name().to_string(),
            level,
            max: defines::MAX_UPGRADE_LEVEL,
        });
    }
    Ok(())
}

fn check_bonus_level(kind: BonusKind, level: u8) -> Result<(), CommandError> {
    let max = kind.def().max_level;
    if level > max {
        return Err(CommandError::IllegalLevel {
            kind: kind.name().to_string(),
            level,
            max,
        });
    }
    Ok(())
}

fn check_tax(rate: f64) -> Result<(), CommandError> {
    if !(0.0..=1.0).contains(&rate) || rate.is_nan() {
        return Err(CommandError::InvalidTax { rate });
    }
    Ok(())
}

pub fn set_upgrade(
    state: &mut WorldState,
    name: &str,
    kind: UpgradeKind,
    level: u8,
) -> Result<(), CommandError> {
    require_territory(state, name)?;
    check_upgrade_level(kind, level)?;
    let territory = state.territory_mut(name).expect("territory checked above");
    territory.options.upgrades.set(kind, level);
    Ok(())
}

pub fn set_bonus(
    state: &mut WorldState,
    name: &str,
    kind: BonusKind,
    level: u8,
) -> Result<(), CommandError> {
    require_territory(state, name)?;
    check_bonus_level(kind, level)?;
    let territory = state.territory_mut(name).expect("territory checked above");
    territory.options.bonuses.set(kind, level);
    Ok(())
}

pub fn set_tax(state: &mut WorldState, name: &str, tax: f64, ally: f64) -> Result<(), CommandError> {
    require_territory(state, name)?;
    check_tax(tax)?;
    check_tax(ally)?;
    let territory = state.territory_mut(name).expect("territory checked above");
    territory.options.tax.tax = tax;
    territory.options.tax.ally = ally;
    // Taxes feed the cheapest-route cost model.
    state.routes_dirty = true;
    Ok(())
}

pub fn set_border(state: &mut WorldState, name: &str, border: Border) -> Result<(), CommandError> {
    require_territory(state, name)?;
    let territory = state.territory_mut(name).expect("territory checked above");
    if territory.options.border != border {
        territory.options.border = border;
        state.routes_dirty = true;
    }
    Ok(())
}

pub fn set_routing_mode(
    state: &mut WorldState,
    name: &str,
    mode: RoutingMode,
) -> Result<(), CommandError> {
    require_territory(state, name)?;
    let territory = state.territory_mut(name).expect("territory checked above");
    if territory.options.routing_mode != mode {
        territory.options.routing_mode = mode;
        state.routes_dirty = true;
    }
    Ok(())
}

/// Make a territory its guild's headquarters.
///
/// The previous HQ flag of the same guild is cleared in the same call, so
/// there is never a moment with two HQs. Never an error for an owned
/// territory, even if it already is the HQ.
pub fn set_hq(state: &mut WorldState, name: &str) -> Result<(), CommandError> {
    let territory = require_territory(state, name)?;
    if !territory.is_owned() {
        return Err(CommandError::TerritoryUnowned {
            name: name.to_string(),
        });
    }
    let tag = territory.guild.tag.clone();
    let previous = state.hq_of(&tag).map(|t| t.name.clone());
    if previous.as_deref() == Some(name) {
        return Ok(());
    }
    if let Some(previous) = previous {
        if let Some(t) = state.territory_mut(&previous) {
            t.options.is_hq = false;
        }
    }
    if let Some(t) = state.territory_mut(name) {
        t.options.is_hq = true;
    }
    state.routes_dirty = true;
    log::debug!("guild {} HQ moved to {}", tag, name);
    Ok(())
}

pub fn set_treasury_override(
    state: &mut WorldState,
    name: &str,
    level: Option<TreasuryLevel>,
) -> Result<(), CommandError> {
    require_territory(state, name)?;
    let territory = state.territory_mut(name).expect("territory checked above");
    territory.treasury_override = level;
    Ok(())
}

pub fn modify_storage(
    state: &mut WorldState,
    name: &str,
    current: Resources,
) -> Result<(), CommandError> {
    require_territory(state, name)?;
    let territory = state.territory_mut(name).expect("territory checked above");
    territory.storage.current = current
        .max(Resources::ZERO)
        .min(territory.storage.capacity);
    Ok(())
}

/// Pin one of the computed alternative routes as active.
pub fn set_trading_route(
    state: &mut WorldState,
    name: &str,
    direction: RouteDirection,
    route: &Route,
) -> Result<(), CommandError> {
    require_territory(state, name)?;
    let known = {
        let territory = &state.territories[name];
        let list = match direction {
            RouteDirection::ToHq => &territory.routes_to_hq,
            RouteDirection::FromHq => &territory.routes_from_hq,
        };
        list.iter().any(|r| r == route)
    };
    let pins = match direction {
        RouteDirection::ToHq => &mut state.manual_route_to_hq,
        RouteDirection::FromHq => &mut state.manual_route_from_hq,
    };
    if !known {
        pins.remove(name);
        return Err(CommandError::StaleRoute {
            territory: name.to_string(),
        });
    }
    pins.insert(name.to_string(), route.clone());
    // Reorder immediately rather than waiting for the next recompute.
    state.routes_dirty = true;
    Ok(())
}

/// Replace a guild's ally set, keeping the relation symmetric.
pub fn set_allies(
    state: &mut WorldState,
    tag: &str,
    allies: &BTreeSet<Tag>,
) -> Result<(), CommandError> {
    require_guild_tag(state, tag)?;
    for ally in allies {
        require_guild_tag(state, ally)?;
    }
    let old: BTreeSet<Tag> = state.guilds[tag].allies.clone();
    for removed in old.difference(allies) {
        if let Some(g) = state.guilds.get_mut(removed) {
            g.allies.remove(tag);
        }
    }
    for added in allies.difference(&old) {
        if let Some(g) = state.guilds.get_mut(added) {
            g.allies.insert(tag.to_string());
        }
    }
    state.guilds.get_mut(tag).expect("guild checked above").allies =
        allies.iter().filter(|a| *a != tag).cloned().collect();
    state.routes_dirty = true;
    Ok(())
}

pub fn create_guild(state: &mut WorldState, name: &str, tag: &str) -> Result<(), CommandError> {
    if tag == NONE_TAG {
        return Err(CommandError::ReservedTag {
            tag: tag.to_string(),
        });
    }
    if state.guild(tag).is_some() {
        return Err(CommandError::DuplicateGuild {
            tag: tag.to_string(),
        });
    }
    state
        .guilds
        .insert(tag.to_string(), crate::state::Guild::new(name, tag));
    Ok(())
}

/// Delete a guild: its territories become unowned, tributes touching it are
/// cancelled, and ally links to it are dropped.
pub fn delete_guild(state: &mut WorldState, tag: &str) -> Result<(), CommandError> {
    if tag == NONE_TAG {
        return Err(CommandError::ReservedTag {
            tag: tag.to_string(),
        });
    }
    require_guild_tag(state, tag)?;

    for name in state.owned_names(tag) {
        set_guild(state, &name, NONE_TAG)?;
    }
    let tribute_ids: Vec<u64> = state
        .sorted_tribute_ids()
        .into_iter()
        .filter(|id| {
            let t = &state.tributes[id];
            t.from_guild.as_deref() == Some(tag) || t.to_guild.as_deref() == Some(tag)
        })
        .collect();
    for id in tribute_ids {
        state.tributes.remove(&id);
    }
    let other_tags: Vec<Tag> = state.guilds.keys().cloned().collect();
    for other in other_tags {
        if let Some(g) = state.guilds.get_mut(&other) {
            g.allies.remove(tag);
        }
    }
    state.guilds.remove(tag);
    recompute_tribute_rates(state);
    state.routes_dirty = true;
    log::debug!("guild {} deleted", tag);
    Ok(())
}

pub fn create_tribute(
    state: &mut WorldState,
    from_guild: Option<Tag>,
    to_guild: Option<Tag>,
    amount_per_hour: PerHour,
    interval_minutes: u64,
) -> Result<u64, CommandError> {
    if from_guild.is_none() && to_guild.is_none() {
        return Err(CommandError::InvalidTribute {
            reason: "both endpoints are null".to_string(),
        });
    }
    if interval_minutes == 0 {
        return Err(CommandError::InvalidTribute {
            reason: "interval must be at least one minute".to_string(),
        });
    }
    for endpoint in [&from_guild, &to_guild].into_iter().flatten() {
        require_guild_tag(state, endpoint)?;
    }
    let id = state.next_tribute_id;
    state.next_tribute_id += 1;
    state.tributes.insert(
        id,
        Tribute {
            id,
            from_guild,
            to_guild,
            amount_per_hour,
            interval_minutes,
            last_transfer: state.tick,
            is_active: true,
            created_at: state.tick,
        },
    );
    recompute_tribute_rates(state);
    Ok(id)
}

pub fn edit_tribute(
    state: &mut WorldState,
    id: u64,
    amount_per_hour: Option<PerHour>,
    interval_minutes: Option<u64>,
) -> Result<(), CommandError> {
    if interval_minutes == Some(0) {
        return Err(CommandError::InvalidTribute {
            reason: "interval must be at least one minute".to_string(),
        });
    }
    let tribute = state
        .tributes
        .get_mut(&id)
        .ok_or(CommandError::UnknownTribute { id })?;
    if let Some(amount) = amount_per_hour {
        tribute.amount_per_hour = amount;
    }
    if let Some(interval) = interval_minutes {
        tribute.interval_minutes = interval;
    }
    recompute_tribute_rates(state);
    Ok(())
}

pub fn set_tribute_active(state: &mut WorldState, id: u64, active: bool) -> Result<(), CommandError> {
    let tick = state.tick;
    let tribute = state
        .tributes
        .get_mut(&id)
        .ok_or(CommandError::UnknownTribute { id })?;
    if !tribute.is_active && active {
        // Re-enabling restarts the interval from now.
        tribute.last_transfer = tick;
    }
    tribute.is_active = active;
    recompute_tribute_rates(state);
    Ok(())
}

pub fn delete_tribute(state: &mut WorldState, id: u64) -> Result<(), CommandError> {
    state
        .tributes
        .remove(&id)
        .ok_or(CommandError::UnknownTribute { id })?;
    recompute_tribute_rates(state);
    Ok(())
}

/// Refresh each guild's aggregate tribute flow rates.
pub(crate) fn recompute_tribute_rates(state: &mut WorldState) {
    let tags: Vec<Tag> = state.guilds.keys().cloned().collect();
    for tag in tags {
        let mut incoming = PerHour::default();
        let mut outgoing = PerHour::default();
        for (_, tribute) in state.tributes.iter() {
            if !tribute.is_active {
                continue;
            }
            if tribute.to_guild.as_deref() == Some(&tag) {
                incoming += tribute.amount_per_hour;
            }
            if tribute.from_guild.as_deref() == Some(&tag) {
                outgoing += tribute.amount_per_hour;
            }
        }
        if let Some(guild) = state.guilds.get_mut(&tag) {
            guild.tribute_in = incoming;
            guild.tribute_out = outgoing;
        }
    }
}
