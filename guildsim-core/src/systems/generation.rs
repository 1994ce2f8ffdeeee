//! Resource generation and dispatch toward the guild headquarters.
//!
//! Each tick a territory produces one interval's worth of its per-second
//! rate into local storage (capacity-clamped). Production also accrues in
//! the dispatch accumulator; every `interval` ticks the accumulated amount
//! leaves as an in-transit packet along the active route to the HQ. The
//! two streams (gathered resources, emeralds) dispatch independently.

use crate::defines;
use crate::graph;
use crate::resources::{PerHour, Resources};
use crate::state::{Route, Tag, TerritoryName, TransitPacket, Warnings, WorldState};
use rustc_hash::FxHashMap;
use tracing::instrument;

struct PendingDispatch {
    origin: TerritoryName,
    guild: Tag,
    route: Route,
    amount: Resources,
}

#[instrument(skip_all, name = "generation")]
pub fn run_generation_tick(state: &mut WorldState) {
    let tick = state.tick;
    let names = state.sorted_territory_names();
    let mut dispatches: Vec<PendingDispatch> = Vec::new();

    // HQ lookup per guild, resolved before mutating territories.
    let mut hq_by_guild: FxHashMap<Tag, TerritoryName> = FxHashMap::default();
    for (tag, _) in state.guilds.iter() {
        if let Some(hq) = state.hq_of(tag) {
            hq_by_guild.insert(tag.clone(), hq.name.clone());
        }
    }

    for name in &names {
        let Some(territory) = state.territory_mut(name) else {
            continue;
        };
        if !territory.is_owned() {
            continue;
        }

        let eff = territory.effective.bonuses;
        let gen_bonus = territory.generation_bonus;
        let res_mult = defines::RATE_MULT[eff.resource_rate as usize]
            * defines::EFFICIENT_RESOURCE_MULT[eff.efficient_resource as usize]
            * gen_bonus;
        let em_mult = defines::RATE_MULT[eff.emerald_rate as usize]
            * defines::EFFICIENT_EMERALD_MULT[eff.efficient_emerald as usize]
            * gen_bonus;

        let base = territory.generation.base.0;
        territory.generation.current =
            PerHour(base.gathered_only().scale(res_mult) + base.emeralds_only().scale(em_mult));

        let per_second = territory.generation.base.per_second().0;
        let produced = per_second
            .gathered_only()
            .scale(res_mult * territory.generation.resource_interval as f64)
            + per_second
                .emeralds_only()
                .scale(em_mult * territory.generation.emerald_interval as f64);

        let unclamped = territory.storage.current + produced;
        territory.storage.current = unclamped.min(territory.storage.capacity);
        if unclamped.emeralds > territory.storage.capacity.emeralds {
            territory.warnings |= Warnings::OVERFLOW_EMERALD;
        }
        if unclamped.gathered_only() != territory.storage.current.gathered_only() {
            territory.warnings |= Warnings::OVERFLOW_RESOURCES;
        }

        territory.generation.accumulator += produced;

        let is_hq = territory.options.is_hq;
        let guild = territory.guild.tag.clone();
        let route = territory.active_route_to_hq().cloned();

        if tick - territory.generation.last_resource_tick >= territory.generation.resource_interval
        {
            let amount = territory.generation.accumulator.gathered_only();
            territory.generation.accumulator = territory.generation.accumulator.emeralds_only();
            territory.generation.last_resource_tick = tick;
            queue_dispatch(&mut dispatches, name, &guild, &route, amount, is_hq, &hq_by_guild);
        }
        if tick - territory.generation.last_emerald_tick >= territory.generation.emerald_interval {
            let amount = territory.generation.accumulator.emeralds_only();
            territory.generation.accumulator = territory.generation.accumulator.gathered_only();
            territory.generation.last_emerald_tick = tick;
            queue_dispatch(&mut dispatches, name, &guild, &route, amount, is_hq, &hq_by_guild);
        }
    }

    for dispatch in dispatches {
        let next = dispatch.route[1].clone();
        let next_tax = graph::entry_tax(state, &next, &dispatch.guild);
        let destination = dispatch
            .route
            .last()
            .cloned()
            .expect("dispatch routes are non-empty");
        let packet = TransitPacket {
            resources: dispatch.amount,
            origin: dispatch.origin.clone(),
            destination,
            next: Some(next),
            route: dispatch.route,
            route_index: 0,
            next_tax,
            source_guild: dispatch.guild,
            moved: false,
            created_at: tick,
        };
        log::trace!(
            "dispatch from {}: {:.1} total toward {}",
            dispatch.origin,
            packet.resources.total(),
            packet.destination
        );
        if let Some(territory) = state.territory_mut(&dispatch.origin) {
            territory.transit.push(packet);
        }
    }
}

fn queue_dispatch(
    dispatches: &mut Vec<PendingDispatch>,
    origin: &str,
    guild: &Tag,
    route: &Option<Route>,
    amount: Resources,
    is_hq: bool,
    hq_by_guild: &FxHashMap<Tag, TerritoryName>,
) {
    if is_hq || amount.is_zero() {
        // HQ production is already in HQ storage.
        return;
    }
    if !hq_by_guild.contains_key(guild) {
        return;
    }
    let Some(route) = route else {
        log::trace!("{} has no active route; dispatch withheld", origin);
        return;
    };
    if route.len() < 2 {
        return;
    }
    dispatches.push(PendingDispatch {
        origin: origin.to_string(),
        guild: guild.clone(),
        route: route.clone(),
        amount,
    });
}
