//! Route manager: per-territory alternative routes to and from the guild
//! headquarters, manual pin handling, and the compound route tax.

use crate::graph::{self, TerritoryGraph, CHEAPEST_MODEL};
use crate::state::{Route, RoutingMode, TerritoryName, WorldState, NONE_TAG};

struct RouteUpdate {
    name: TerritoryName,
    routes_to_hq: Vec<Route>,
    routes_from_hq: Vec<Route>,
    route_tax: f64,
    drop_to_pin: bool,
    drop_from_pin: bool,
}

/// Recompute every territory's route set from scratch.
///
/// Idempotent: running it twice in a row yields identical state. Called
/// whenever ownership, borders, routing mode, HQ assignment, allies, or
/// link topology change, and at the end of a tick that queued such a
/// change.
pub fn update_routes(state: &mut WorldState) {
    let graph = TerritoryGraph::build(state);
    let mut updates: Vec<RouteUpdate> = Vec::new();

    let mut tags: Vec<_> = state.guilds.keys().cloned().collect();
    tags.sort();

    for tag in tags {
        if tag == NONE_TAG {
            continue;
        }
        let hq_name = state.hq_of(&tag).map(|t| t.name.clone());
        let owned = state.owned_names(&tag);
        let Some(hq_name) = hq_name else {
            if !owned.is_empty() {
                log::warn!("guild {} has territories but no HQ; routes undefined", tag);
            }
            for name in owned {
                updates.push(RouteUpdate {
                    name,
                    routes_to_hq: Vec::new(),
                    routes_from_hq: Vec::new(),
                    route_tax: -1.0,
                    drop_to_pin: false,
                    drop_from_pin: false,
                });
            }
            continue;
        };

        let view = graph.view(state, &tag, CHEAPEST_MODEL);
        let hq = graph.node(&hq_name).expect("HQ exists in graph");

        for name in owned {
            if name == hq_name {
                updates.push(RouteUpdate {
                    name,
                    routes_to_hq: Vec::new(),
                    routes_from_hq: Vec::new(),
                    route_tax: 0.0,
                    drop_to_pin: false,
                    drop_from_pin: false,
                });
                continue;
            }
            let node = graph.node(&name).expect("territory exists in graph");
            let mode = state.territories[&name].options.routing_mode;
            let (mut to_hq, mut from_hq) = match mode {
                RoutingMode::Cheapest => (
                    graph.all_cheapest_routes(node, hq, &view),
                    graph.all_cheapest_routes(hq, node, &view),
                ),
                RoutingMode::Fastest => (
                    graph.all_fastest_routes(node, hq, &view),
                    graph.all_fastest_routes(hq, node, &view),
                ),
            };

            let drop_to_pin = apply_pin(&mut to_hq, state.manual_route_to_hq.get(&name), &name);
            let drop_from_pin =
                apply_pin(&mut from_hq, state.manual_route_from_hq.get(&name), &name);

            let route_tax = match to_hq.first() {
                Some(active) => graph::route_tax(state, active, &tag),
                None => {
                    log::warn!("territory {} has no route to HQ {}", name, hq_name);
                    -1.0
                }
            };

            updates.push(RouteUpdate {
                name,
                routes_to_hq: to_hq,
                routes_from_hq: from_hq,
                route_tax,
                drop_to_pin,
                drop_from_pin,
            });
        }
    }

    // Territories that are unowned, or whose guild record disappeared,
    // carry no routes.
    let covered: std::collections::HashSet<_> =
        updates.iter().map(|u| u.name.clone()).collect();
    for name in state.sorted_territory_names() {
        if !covered.contains(&name) {
            updates.push(RouteUpdate {
                name,
                routes_to_hq: Vec::new(),
                routes_from_hq: Vec::new(),
                route_tax: -1.0,
                drop_to_pin: false,
                drop_from_pin: false,
            });
        }
    }

    for update in updates {
        if update.drop_to_pin {
            state.manual_route_to_hq.remove(&update.name);
        }
        if update.drop_from_pin {
            state.manual_route_from_hq.remove(&update.name);
        }
        if let Some(territory) = state.territory_mut(&update.name) {
            territory.routes_to_hq = update.routes_to_hq;
            territory.routes_from_hq = update.routes_from_hq;
            territory.route_tax = update.route_tax;
        }
    }

    state.routes_dirty = false;
}

/// Move a pinned route to the front of the alternatives. Returns true when
/// the pin no longer matches any alternative and must be dropped.
fn apply_pin(routes: &mut Vec<Route>, pin: Option<&Route>, territory: &str) -> bool {
    let Some(pin) = pin else { return false };
    match routes.iter().position(|r| r == pin) {
        Some(pos) => {
            let pinned = routes.remove(pos);
            routes.insert(0, pinned);
            false
        }
        None => {
            log::debug!(
                "pinned route for {} is no longer optimal; falling back to default",
                territory
            );
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Border;
    use crate::testing::WorldStateBuilder;

    fn diamond_world() -> WorldState {
        // A (HQ) - {B, C} - D, all owned by ALF.
        WorldStateBuilder::new()
            .with_guild("Alpha", "ALF")
            .with_territory("A", "ALF")
            .with_territory("B", "ALF")
            .with_territory("C", "ALF")
            .with_territory("D", "ALF")
            .with_hq("A")
            .with_link("A", "B")
            .with_link("A", "C")
            .with_link("B", "D")
            .with_link("C", "D")
            .build()
    }

    #[test]
    fn test_diamond_has_two_alternatives_lex_ordered() {
        let mut state = diamond_world();
        update_routes(&mut state);
        let d = state.territory("D").unwrap();
        assert_eq!(
            d.routes_to_hq,
            vec![
                vec!["D".to_string(), "B".to_string(), "A".to_string()],
                vec!["D".to_string(), "C".to_string(), "A".to_string()],
            ]
        );
        assert_eq!(d.route_tax, 0.0);
    }

    #[test]
    fn test_update_routes_is_idempotent() {
        let mut state = diamond_world();
        update_routes(&mut state);
        let once = state.clone();
        update_routes(&mut state);
        assert_eq!(state, once);
    }

    #[test]
    fn test_manual_pin_moves_to_front() {
        let mut state = diamond_world();
        state.manual_route_to_hq.insert(
            "D".into(),
            vec!["D".to_string(), "C".to_string(), "A".to_string()],
        );
        update_routes(&mut state);
        let d = state.territory("D").unwrap();
        assert_eq!(d.routes_to_hq[0], vec!["D", "C", "A"]);
        assert_eq!(d.routes_to_hq.len(), 2);
    }

    #[test]
    fn test_stale_pin_falls_back_and_drops() {
        let mut state = diamond_world();
        state.manual_route_to_hq.insert(
            "D".into(),
            vec!["D".to_string(), "C".to_string(), "A".to_string()],
        );
        update_routes(&mut state);
        // Closing C to foreigners does not matter for the owner, but
        // removing the link invalidates the pinned route entirely.
        state.territory_mut("C").unwrap().links.direct.remove("D");
        state.territory_mut("D").unwrap().links.direct.remove("C");
        update_routes(&mut state);
        let d = state.territory("D").unwrap();
        assert_eq!(d.routes_to_hq, vec![vec!["D", "B", "A"]]);
        assert!(state.manual_route_to_hq.get("D").is_none());
    }

    #[test]
    fn test_no_route_marks_undefined_tax() {
        let mut state = diamond_world();
        // Island: sever D completely.
        for n in ["B", "C"] {
            state.territory_mut(n).unwrap().links.direct.remove("D");
        }
        state.territory_mut("D").unwrap().links.direct.clear();
        update_routes(&mut state);
        let d = state.territory("D").unwrap();
        assert!(d.routes_to_hq.is_empty());
        assert_eq!(d.route_tax, -1.0);
    }

    #[test]
    fn test_foreign_detour_taxed_fastest_vs_cheapest() {
        // Chain A-B-C-D owned plus shortcut A-X-D through a foreign X.
        let mut state = WorldStateBuilder::new()
            .with_guild("Alpha", "ALF")
            .with_guild("Beta", "BET")
            .with_territory("A", "ALF")
            .with_territory("B", "ALF")
            .with_territory("C", "ALF")
            .with_territory("D", "ALF")
            .with_territory("X", "BET")
            .with_hq("A")
            .with_link("A", "B")
            .with_link("B", "C")
            .with_link("C", "D")
            .with_link("A", "X")
            .with_link("X", "D")
            .build();
        state.territory_mut("X").unwrap().options.tax.tax = 0.25;
        state.territory_mut("X").unwrap().options.border = Border::Open;

        update_routes(&mut state);
        let d = state.territory("D").unwrap();
        assert_eq!(d.routes_to_hq[0], vec!["D", "C", "B", "A"]);
        assert_eq!(d.route_tax, 0.0);

        state.territory_mut("D").unwrap().options.routing_mode = RoutingMode::Fastest;
        update_routes(&mut state);
        let d = state.territory("D").unwrap();
        assert_eq!(d.routes_to_hq[0], vec!["D", "X", "A"]);
        assert!((d.route_tax - 0.25).abs() < 1e-9);
    }
}
