//! In-transit packet movement.
//!
//! Each tick every packet advances one hop along its route. Entering a
//! territory whose owner differs from the packet's guild costs the
//! precomputed entry tax. Arrival at the final route entry delivers into
//! destination storage, clamped to capacity. A route that has become
//! impassable drops the packet.

use crate::graph;
use crate::state::{Border, TransitPacket, Warnings, WorldState};
use tracing::instrument;

#[instrument(skip_all, name = "transit")]
pub fn run_transit_tick(state: &mut WorldState) {
    let names = state.sorted_territory_names();

    for name in &names {
        let Some(territory) = state.territory_mut(name) else {
            continue;
        };
        let packets = std::mem::take(&mut territory.transit);
        let mut staying: Vec<TransitPacket> = Vec::new();
        let mut moves: Vec<(String, TransitPacket)> = Vec::new();
        let mut deliveries: Vec<(String, crate::resources::Resources)> = Vec::new();

        for mut packet in packets {
            if packet.moved {
                staying.push(packet);
                continue;
            }
            let Some(next_name) = packet.route.get(packet.route_index + 1).cloned() else {
                // A packet resting at its destination should have been
                // delivered on arrival; treat it as arriving now.
                deliveries.push((packet.destination.clone(), packet.resources));
                continue;
            };
            if !hop_allowed(state, &next_name, &packet) {
                log::warn!(
                    "route of packet from {} broke at {}; {:.1} resources lost",
                    packet.origin,
                    next_name,
                    packet.resources.total()
                );
                continue;
            }

            let owner_differs = state
                .territory(&next_name)
                .map(|t| t.guild.tag != packet.source_guild)
                .unwrap_or(false);
            if owner_differs && packet.next_tax > 0.0 {
                packet.resources = packet.resources.scale(1.0 - packet.next_tax);
            }

            packet.route_index += 1;
            packet.moved = true;

            if packet.route_index == packet.route.len() - 1 {
                deliveries.push((next_name, packet.resources));
            } else {
                let upcoming = packet.route[packet.route_index + 1].clone();
                packet.next_tax = graph::entry_tax(state, &upcoming, &packet.source_guild);
                packet.next = Some(upcoming);
                moves.push((next_name, packet));
            }
        }

        if let Some(territory) = state.territory_mut(name) {
            territory.transit = staying;
        }
        for (target, packet) in moves {
            if let Some(territory) = state.territory_mut(&target) {
                territory.throughput += packet.resources.total();
                territory.transit.push(packet);
            }
        }
        for (target, amount) in deliveries {
            deliver(state, &target, amount);
        }
    }

    for name in &names {
        if let Some(territory) = state.territory_mut(name) {
            for packet in &mut territory.transit {
                packet.moved = false;
            }
        }
    }
}

fn hop_allowed(state: &WorldState, next_name: &str, packet: &TransitPacket) -> bool {
    let Some(next) = state.territory(next_name) else {
        return false;
    };
    next.guild.tag == packet.source_guild || next.options.border == Border::Open
}

fn deliver(state: &mut WorldState, target: &str, amount: crate::resources::Resources) {
    let Some(territory) = state.territory_mut(target) else {
        return;
    };
    territory.throughput += amount.total();
    let unclamped = territory.storage.current + amount;
    territory.storage.current = unclamped.min(territory.storage.capacity);
    if unclamped.emeralds > territory.storage.capacity.emeralds {
        territory.warnings |= Warnings::OVERFLOW_EMERALD;
    }
    if unclamped.gathered_only() != territory.storage.current.gathered_only() {
        territory.warnings |= Warnings::OVERFLOW_RESOURCES;
    }
    log::trace!("delivered {:.1} total into {}", amount.total(), target);
}
