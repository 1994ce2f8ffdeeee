//! The territory graph and its cost models.
//!
//! Pathfinding runs over dense u32 indices (names interned in sorted
//! order), which keeps the generic algorithms allocation-light and makes
//! neighbor order, and therefore route enumeration, deterministic.

use crate::resources::Resources;
use crate::state::{Border, Route, Tag, TerritoryName, WorldState};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use territory_pathfinding::{self as pathfinding, Graph};

/// Constants of one edge-cost variant. All variants share the same shape:
/// own-guild edges cost a flat discount, foreign edges cost base 1.0 plus
/// scaled tax plus a flat penalty when the owner is not allied.
#[derive(Debug, Clone, Copy)]
pub struct CostModel {
    pub own_cost: f64,
    pub tax_factor: f64,
    pub foreign_penalty: f64,
}

/// Cost model used by Dijkstra and the other exact searches.
pub const CHEAPEST_MODEL: CostModel = CostModel {
    own_cost: 0.1,
    tax_factor: 10.0,
    foreign_penalty: 5.0,
};

/// Cost model used by the A* search.
pub const ASTAR_MODEL: CostModel = CostModel {
    own_cost: 0.2,
    tax_factor: 8.0,
    foreign_penalty: 3.0,
};

/// Cost model used by flood fill.
pub const FLOOD_MODEL: CostModel = CostModel {
    own_cost: 0.1,
    tax_factor: 5.0,
    foreign_penalty: 2.0,
};

/// Heuristic hop count assigned to nodes the reverse sweep cannot reach.
const UNREACHABLE_HOPS: u32 = 1000;
/// A* heuristic weight per hop. Own-guild edges cost 0.1, so scaling the
/// hop count by the same factor keeps the heuristic admissible.
const HEURISTIC_PER_HOP: f64 = 0.1;

struct NodeInfo {
    guild: Tag,
    border: Border,
    tax: f64,
    ally_tax: f64,
}

/// The world's connectivity, frozen for one batch of route queries.
pub struct TerritoryGraph {
    names: Vec<TerritoryName>,
    index: FxHashMap<TerritoryName, u32>,
    adj: Vec<Vec<u32>>,
    nodes: Vec<NodeInfo>,
}

/// Search context: the guild on whose behalf routes are computed.
pub struct GuildView {
    pub guild: Tag,
    pub allies: BTreeSet<Tag>,
    pub model: CostModel,
    /// Precomputed per-node heuristic values (A* only).
    heuristic: Option<Vec<f64>>,
}

impl TerritoryGraph {
    pub fn build(state: &WorldState) -> Self {
        let names = state.sorted_territory_names();
        let index: FxHashMap<TerritoryName, u32> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i as u32))
            .collect();

        let mut adj: Vec<Vec<u32>> = vec![Vec::new(); names.len()];
        let mut nodes = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            let territory = &state.territories[name];
            nodes.push(NodeInfo {
                guild: territory.guild.tag.clone(),
                border: territory.options.border,
                tax: territory.options.tax.tax,
                ally_tax: territory.options.tax.ally,
            });
            for neighbor in territory.links.neighbors() {
                // Names the map file references but does not define are
                // skipped rather than treated as nodes.
                if let Some(&j) = index.get(neighbor) {
                    adj[i].push(j);
                }
            }
        }
        // Connectivity is symmetric even if a map file lists a link on only
        // one side.
        let pairs: Vec<(u32, u32)> = adj
            .iter()
            .enumerate()
            .flat_map(|(i, ns)| ns.iter().map(move |&j| (i as u32, j)))
            .collect();
        for (i, j) in pairs {
            if !adj[j as usize].contains(&i) {
                adj[j as usize].push(i);
            }
        }
        for list in &mut adj {
            list.sort_unstable();
            list.dedup();
        }

        TerritoryGraph {
            names,
            index,
            adj,
            nodes,
        }
    }

    pub fn view(&self, state: &WorldState, guild: &str, model: CostModel) -> GuildView {
        GuildView {
            guild: guild.to_string(),
            allies: state
                .guild(guild)
                .map(|g| g.allies.clone())
                .unwrap_or_default(),
            model,
            heuristic: None,
        }
    }

    pub fn node(&self, name: &str) -> Option<u32> {
        self.index.get(name).copied()
    }

    pub fn name(&self, node: u32) -> &TerritoryName {
        &self.names[node as usize]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn node_ids(&self) -> Vec<u32> {
        (0..self.names.len() as u32).collect()
    }

    fn passable(&self, node: u32, view: &GuildView) -> bool {
        let info = &self.nodes[node as usize];
        info.guild == view.guild || info.border == Border::Open
    }

    fn names_of(&self, route: &[u32]) -> Route {
        route.iter().map(|&i| self.names[i as usize].clone()).collect()
    }

    /// Reverse hop counts toward `target` across passable territory,
    /// scaled into an admissible A* heuristic.
    fn heuristic_table(&self, target: u32, view: &GuildView) -> Vec<f64> {
        let mut hops = vec![UNREACHABLE_HOPS; self.names.len()];
        let mut queue = std::collections::VecDeque::new();
        hops[target as usize] = 0;
        queue.push_back(target);
        while let Some(current) = queue.pop_front() {
            let d = hops[current as usize];
            for &n in &self.adj[current as usize] {
                if hops[n as usize] == UNREACHABLE_HOPS && self.passable(n, view) {
                    hops[n as usize] = d + 1;
                    queue.push_back(n);
                }
            }
        }
        hops.into_iter()
            .map(|h| f64::from(h) * HEURISTIC_PER_HOP)
            .collect()
    }

    /// Cheapest route under the tax-aware cost model (Dijkstra).
    pub fn cheapest_route(&self, start: u32, goal: u32, view: &GuildView) -> Option<(Route, f64)> {
        pathfinding::dijkstra(self, start, goal, view).map(|(r, c)| (self.names_of(&r), c))
    }

    /// Cheapest route via A* with the reverse-hop heuristic.
    pub fn astar_route(&self, start: u32, goal: u32, view: &GuildView) -> Option<(Route, f64)> {
        let ctx = GuildView {
            guild: view.guild.clone(),
            allies: view.allies.clone(),
            model: ASTAR_MODEL,
            heuristic: Some(self.heuristic_table(goal, view)),
        };
        pathfinding::astar(self, start, goal, &ctx).map(|(r, c)| (self.names_of(&r), c))
    }

    /// Fewest-hop route (BFS), taxes ignored.
    pub fn fastest_route(&self, start: u32, goal: u32, view: &GuildView) -> Option<Route> {
        pathfinding::bfs(self, start, goal, view).map(|r| self.names_of(&r))
    }

    /// Cheapest route via Bellman-Ford. Slower than Dijkstra but a useful
    /// cross-check, since it makes no assumptions about relaxation order.
    pub fn cheapest_route_bellman_ford(
        &self,
        start: u32,
        goal: u32,
        view: &GuildView,
    ) -> Option<(Route, f64)> {
        let nodes = self.node_ids();
        pathfinding::bellman_ford(self, &nodes, start, goal, view)
            .map(|(r, c)| (self.names_of(&r), c))
    }

    /// All-pairs cheapest costs and routes under one guild view.
    pub fn all_pairs(&self, view: &GuildView) -> pathfinding::AllPairs<u32> {
        pathfinding::floyd_warshall(self, &self.node_ids(), view)
    }

    /// Every route tying for minimum cost, deterministically ordered.
    pub fn all_cheapest_routes(&self, start: u32, goal: u32, view: &GuildView) -> Vec<Route> {
        pathfinding::all_cheapest(self, start, goal, view, pathfinding::MAX_ALTERNATIVE_ROUTES)
            .into_iter()
            .map(|r| self.names_of(&r))
            .collect()
    }

    /// Every route tying for minimum length, deterministically ordered.
    pub fn all_fastest_routes(&self, start: u32, goal: u32, view: &GuildView) -> Vec<Route> {
        pathfinding::all_fastest(self, start, goal, view, pathfinding::MAX_ALTERNATIVE_ROUTES)
            .into_iter()
            .map(|r| self.names_of(&r))
            .collect()
    }

    /// Cheapest-cost distances to everything reachable (flood fill model).
    pub fn flood_costs(&self, start: u32, view: &GuildView) -> FxHashMap<TerritoryName, f64> {
        pathfinding::flood_fill(self, start, view)
            .into_iter()
            .map(|(n, c)| (self.names[n as usize].clone(), c))
            .collect()
    }

    /// Hop distances from `start` over passable territory; unreachable
    /// nodes are absent.
    pub fn hop_distances(&self, start: u32, view: &GuildView) -> FxHashMap<TerritoryName, u32> {
        let mut hops: FxHashMap<TerritoryName, u32> = FxHashMap::default();
        let mut seen = vec![false; self.names.len()];
        let mut queue = std::collections::VecDeque::new();
        seen[start as usize] = true;
        hops.insert(self.names[start as usize].clone(), 0);
        queue.push_back((start, 0u32));
        while let Some((current, d)) = queue.pop_front() {
            for &n in &self.adj[current as usize] {
                if !seen[n as usize] && self.passable(n, view) {
                    seen[n as usize] = true;
                    hops.insert(self.names[n as usize].clone(), d + 1);
                    queue.push_back((n, d + 1));
                }
            }
        }
        hops
    }
}

impl Graph<u32, GuildView> for TerritoryGraph {
    fn neighbors(&self, node: u32, context: &GuildView) -> Vec<u32> {
        self.adj[node as usize]
            .iter()
            .copied()
            .filter(|&n| self.passable(n, context))
            .collect()
    }

    fn cost(&self, _from: u32, to: u32, context: &GuildView) -> f64 {
        let info = &self.nodes[to as usize];
        if info.guild == context.guild {
            return context.model.own_cost;
        }
        let allied = context.allies.contains(&info.guild);
        let tax = if allied { info.ally_tax } else { info.tax };
        let penalty = if allied {
            0.0
        } else {
            context.model.foreign_penalty
        };
        1.0 + tax * context.model.tax_factor + penalty
    }

    fn heuristic(&self, from: u32, _target: u32, context: &GuildView) -> f64 {
        context
            .heuristic
            .as_ref()
            .map(|table| table[from as usize])
            .unwrap_or(0.0)
    }
}

/// Compound tax of a route: intermediate territories not owned by the
/// source guild each take their cut, multiplicatively.
pub fn route_tax(state: &WorldState, route: &[TerritoryName], source_guild: &str) -> f64 {
    if route.len() < 3 {
        return 0.0;
    }
    let allies = state
        .guild(source_guild)
        .map(|g| g.allies.clone())
        .unwrap_or_default();
    let mut passthrough = 1.0;
    for name in &route[1..route.len() - 1] {
        let Some(territory) = state.territory(name) else {
            continue;
        };
        if territory.guild.tag == source_guild {
            continue;
        }
        let rate = if allies.contains(&territory.guild.tag) {
            territory.options.tax.ally
        } else {
            territory.options.tax.tax
        };
        passthrough *= 1.0 - rate;
    }
    1.0 - passthrough
}

/// Tax a packet pays when stepping into `entered` territory.
pub fn entry_tax(state: &WorldState, entered: &str, source_guild: &str) -> f64 {
    let Some(territory) = state.territory(entered) else {
        return 0.0;
    };
    if territory.guild.tag == source_guild {
        return 0.0;
    }
    if state.is_friendly(source_guild, &territory.guild.tag) {
        territory.options.tax.ally
    } else {
        territory.options.tax.tax
    }
}

/// Claim-wide production value of a vector under an emerald weighting.
pub fn production_value(base: &Resources, emerald_weight: f64) -> f64 {
    base.gathered_total() + emerald_weight * base.emeralds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::WorldStateBuilder;

    fn chain_world() -> WorldState {
        // A - B - C owned by ALF, X foreign with a closed border.
        WorldStateBuilder::new()
            .with_guild("Alpha", "ALF")
            .with_guild("Beta", "BET")
            .with_territory("A", "ALF")
            .with_territory("B", "ALF")
            .with_territory("C", "ALF")
            .with_territory("X", "BET")
            .with_link("A", "B")
            .with_link("B", "C")
            .with_link("C", "X")
            .build()
    }

    #[test]
    fn test_own_guild_edges_are_discounted() {
        let state = chain_world();
        let graph = TerritoryGraph::build(&state);
        let view = graph.view(&state, "ALF", CHEAPEST_MODEL);
        let (route, cost) = graph
            .cheapest_route(graph.node("A").unwrap(), graph.node("C").unwrap(), &view)
            .unwrap();
        assert_eq!(route, vec!["A", "B", "C"]);
        assert!((cost - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_closed_border_blocks_foreigners() {
        let mut state = chain_world();
        state.territory_mut("X").unwrap().options.border = Border::Closed;
        let graph = TerritoryGraph::build(&state);
        let view = graph.view(&state, "ALF", CHEAPEST_MODEL);
        assert!(graph
            .cheapest_route(graph.node("A").unwrap(), graph.node("X").unwrap(), &view)
            .is_none());
        // The owner itself still passes.
        let beta_view = graph.view(&state, "BET", CHEAPEST_MODEL);
        assert!(graph
            .cheapest_route(graph.node("C").unwrap(), graph.node("X").unwrap(), &beta_view)
            .is_some());
    }

    #[test]
    fn test_foreign_edge_cost_includes_tax_and_penalty() {
        let state = chain_world();
        let graph = TerritoryGraph::build(&state);
        let view = graph.view(&state, "ALF", CHEAPEST_MODEL);
        let (_, cost) = graph
            .cheapest_route(graph.node("C").unwrap(), graph.node("X").unwrap(), &view)
            .unwrap();
        // 1.0 base + 0.05 * 10 tax + 5 foreign penalty.
        assert!((cost - 6.5).abs() < 1e-9);
    }

    #[test]
    fn test_allied_edge_drops_penalty_and_uses_ally_tax() {
        let mut state = chain_world();
        state.guilds.get_mut("ALF").unwrap().allies.insert("BET".into());
        state.territory_mut("X").unwrap().options.tax.ally = 0.01;
        let graph = TerritoryGraph::build(&state);
        let view = graph.view(&state, "ALF", CHEAPEST_MODEL);
        let (_, cost) = graph
            .cheapest_route(graph.node("C").unwrap(), graph.node("X").unwrap(), &view)
            .unwrap();
        assert!((cost - 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_route_tax_skips_own_intermediates() {
        let mut state = chain_world();
        // Make B foreign at 25% so the A->B->C route pays exactly B's cut.
        state.territory_mut("B").unwrap().guild = crate::state::OwnerRef {
            tag: "BET".into(),
            name: "Beta".into(),
        };
        state.territory_mut("B").unwrap().options.tax.tax = 0.25;
        let route: Route = vec!["A".into(), "B".into(), "C".into()];
        assert!((route_tax(&state, &route, "ALF") - 0.25).abs() < 1e-9);

        // Own intermediate contributes nothing.
        let state = chain_world();
        assert_eq!(route_tax(&state, &route, "ALF"), 0.0);
    }

    #[test]
    fn test_route_tax_compounds() {
        let mut state = WorldStateBuilder::new()
            .with_guild("Alpha", "ALF")
            .with_guild("Beta", "BET")
            .with_territory("A", "ALF")
            .with_territory("M", "BET")
            .with_territory("N", "BET")
            .with_territory("D", "ALF")
            .with_link("A", "M")
            .with_link("M", "N")
            .with_link("N", "D")
            .build();
        state.territory_mut("M").unwrap().options.tax.tax = 0.10;
        state.territory_mut("N").unwrap().options.tax.tax = 0.20;
        let route: Route = vec!["A".into(), "M".into(), "N".into(), "D".into()];
        let expected = 1.0 - 0.9 * 0.8;
        assert!((route_tax(&state, &route, "ALF") - expected).abs() < 1e-9);
    }

    #[test]
    fn test_exact_searches_agree() {
        let state = chain_world();
        let graph = TerritoryGraph::build(&state);
        let view = graph.view(&state, "ALF", CHEAPEST_MODEL);
        let a = graph.node("A").unwrap();
        let x = graph.node("X").unwrap();

        let (route, cost) = graph.cheapest_route(a, x, &view).unwrap();
        let (bf_route, bf_cost) = graph.cheapest_route_bellman_ford(a, x, &view).unwrap();
        assert_eq!(route, bf_route);
        assert!((cost - bf_cost).abs() < 1e-9);

        let all = graph.all_pairs(&view);
        assert!((all.distance(a, x).unwrap() - cost).abs() < 1e-9);
        let fw_route: Vec<_> = all
            .path(a, x)
            .unwrap()
            .into_iter()
            .map(|i| graph.name(i).clone())
            .collect();
        assert_eq!(fw_route, route);
    }

    #[test]
    fn test_flood_costs_cover_reachable_nodes() {
        let state = chain_world();
        let graph = TerritoryGraph::build(&state);
        let view = graph.view(&state, "ALF", FLOOD_MODEL);
        let costs = graph.flood_costs(graph.node("A").unwrap(), &view);
        assert_eq!(costs.len(), 4);
        assert_eq!(costs["A"], 0.0);
        // Own territory at 0.1 per hop; X adds tax and the foreign penalty.
        assert!((costs["C"] - 0.2).abs() < 1e-9);
        assert!((costs["X"] - (0.2 + 1.0 + 0.05 * 5.0 + 2.0)).abs() < 1e-9);
    }

    #[test]
    fn test_astar_agrees_with_dijkstra_on_cost_ordering() {
        let state = chain_world();
        let graph = TerritoryGraph::build(&state);
        let view = graph.view(&state, "ALF", CHEAPEST_MODEL);
        let a = graph.node("A").unwrap();
        let c = graph.node("C").unwrap();
        let (d_route, _) = graph.cheapest_route(a, c, &view).unwrap();
        let (a_route, _) = graph.astar_route(a, c, &view).unwrap();
        assert_eq!(d_route, a_route);
    }

    #[test]
    fn test_hop_distances() {
        let state = chain_world();
        let graph = TerritoryGraph::build(&state);
        let view = graph.view(&state, "ALF", CHEAPEST_MODEL);
        let hops = graph.hop_distances(graph.node("A").unwrap(), &view);
        assert_eq!(hops["A"], 0);
        assert_eq!(hops["B"], 1);
        assert_eq!(hops["C"], 2);
        assert_eq!(hops["X"], 3);
    }
}
