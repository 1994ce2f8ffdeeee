//! Chokepoint analysis: how much of a guild's production loses its
//! redundant paths to the headquarters when one territory falls.
//!
//! For every source territory the baseline robustness is the number of
//! internally node-disjoint paths to any HQ across the guild-only
//! subgraph, computed by node splitting and Edmonds-Karp max-flow. Each
//! candidate territory is then scored by the weighted fraction of that
//! robustness it removes when excluded.

use crate::graph::production_value;
use crate::state::WorldState;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, Copy)]
pub struct ChokepointOptions {
    /// Weight of emerald production relative to gathered resources when
    /// valuing a source.
    pub emerald_weight: f64,
    /// Roll each node's weight up through its upstream parent, so a node
    /// carries the production of everything that routes through it.
    pub include_downstream: bool,
}

impl Default for ChokepointOptions {
    fn default() -> Self {
        ChokepointOptions {
            emerald_weight: 0.2,
            include_downstream: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceImpact {
    pub source: String,
    pub baseline: u32,
    pub remaining: u32,
    pub lost: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChokepointScore {
    /// Weighted robustness loss, in [0, 1].
    pub importance: f64,
    pub impacts: Vec<SourceImpact>,
}

/// Score every territory of `guild_tag`. Territories whose exclusion costs
/// nothing are omitted from the result.
pub fn analyze(
    state: &WorldState,
    guild_tag: &str,
    options: ChokepointOptions,
) -> BTreeMap<String, ChokepointScore> {
    let subgraph = GuildSubgraph::build(state, guild_tag, options);
    subgraph.scores()
}

struct GuildSubgraph {
    names: Vec<String>,
    adj: Vec<Vec<usize>>,
    is_hq: Vec<bool>,
    weights: Vec<f64>,
    baselines: Vec<u32>,
}

impl GuildSubgraph {
    fn build(state: &WorldState, guild_tag: &str, options: ChokepointOptions) -> Self {
        let names = state.owned_names(guild_tag);
        let index: BTreeMap<&str, usize> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();

        let mut adj: Vec<Vec<usize>> = vec![Vec::new(); names.len()];
        let mut is_hq = vec![false; names.len()];
        let mut weights = vec![0.0; names.len()];
        for (i, name) in names.iter().enumerate() {
            let territory = &state.territories[name];
            is_hq[i] = territory.options.is_hq;
            weights[i] = production_value(&territory.generation.base.0, options.emerald_weight)
                .max(1.0);
            for neighbor in territory.links.neighbors() {
                if let Some(&j) = index.get(neighbor.as_str()) {
                    if j != i {
                        adj[i].push(j);
                    }
                }
            }
        }
        for list in &mut adj {
            list.sort_unstable();
            list.dedup();
        }
        // Make connectivity symmetric within the subgraph.
        let pairs: Vec<(usize, usize)> = adj
            .iter()
            .enumerate()
            .flat_map(|(i, ns)| ns.iter().map(move |&j| (i, j)))
            .collect();
        for (i, j) in pairs {
            if !adj[j].contains(&i) {
                adj[j].push(i);
                adj[j].sort_unstable();
            }
        }

        let mut subgraph = GuildSubgraph {
            names,
            adj,
            is_hq,
            weights,
            baselines: Vec::new(),
        };
        if options.include_downstream {
            subgraph.roll_up_weights();
        }
        subgraph.baselines = (0..subgraph.names.len())
            .map(|s| {
                if subgraph.is_hq[s] {
                    0
                } else {
                    subgraph.disjoint_paths(s, None)
                }
            })
            .collect();
        subgraph
    }

    /// Multi-source BFS from every HQ assigns each node a hop distance and
    /// a single strictly-closer parent (lexicographic tie-break); weights
    /// then roll up toward the HQs, farthest nodes first.
    fn roll_up_weights(&mut self) {
        let n = self.names.len();
        let mut dist: Vec<Option<u32>> = vec![None; n];
        let mut queue = VecDeque::new();
        for i in 0..n {
            if self.is_hq[i] {
                dist[i] = Some(0);
                queue.push_back(i);
            }
        }
        while let Some(current) = queue.pop_front() {
            let d = dist[current].expect("queued nodes have distances");
            for &next in &self.adj[current] {
                if dist[next].is_none() {
                    dist[next] = Some(d + 1);
                    queue.push_back(next);
                }
            }
        }

        // Neighbor lists are index-sorted and indices are name-sorted, so
        // the first strictly-closer neighbor is the lexicographic parent.
        let parent: Vec<Option<usize>> = (0..n)
            .map(|i| {
                let d = dist[i]?;
                if d == 0 {
                    return None;
                }
                self.adj[i]
                    .iter()
                    .copied()
                    .find(|&p| dist[p] == Some(d - 1))
            })
            .collect();

        let mut order: Vec<usize> = (0..n).filter(|&i| dist[i].is_some()).collect();
        order.sort_by(|&a, &b| dist[b].cmp(&dist[a]).then(a.cmp(&b)));
        for i in order {
            if let Some(p) = parent[i] {
                self.weights[p] += self.weights[i];
            }
        }
    }

    /// Maximum number of internally node-disjoint paths from `source` to
    /// any HQ, optionally with one territory excluded.
    fn disjoint_paths(&self, source: usize, excluded: Option<usize>) -> u32 {
        let n = self.names.len();
        if self.is_hq.iter().all(|&h| !h) {
            return 0;
        }
        // Split nodes: in(i) = 2i, out(i) = 2i + 1; then super terminals.
        let super_source = 2 * n;
        let super_sink = 2 * n + 1;
        let mut network = FlowNetwork::new(2 * n + 2);
        const INF: i64 = 1 << 30;

        for i in 0..n {
            if excluded == Some(i) {
                continue;
            }
            let through = if i == source || self.is_hq[i] { INF } else { 1 };
            network.add_edge(2 * i, 2 * i + 1, through);
            if self.is_hq[i] {
                network.add_edge(2 * i + 1, super_sink, INF);
            }
        }
        network.add_edge(super_source, 2 * source, INF);
        for (u, neighbors) in self.adj.iter().enumerate() {
            if excluded == Some(u) {
                continue;
            }
            for &v in neighbors {
                if excluded == Some(v) {
                    continue;
                }
                network.add_edge(2 * u + 1, 2 * v, INF);
            }
        }

        network.max_flow(super_source, super_sink) as u32
    }

    fn scores(&self) -> BTreeMap<String, ChokepointScore> {
        let n = self.names.len();
        let sources: Vec<usize> = (0..n)
            .filter(|&s| !self.is_hq[s] && self.baselines[s] > 0)
            .collect();
        let candidates: Vec<usize> = (0..n).filter(|&c| !self.is_hq[c]).collect();

        candidates
            .par_iter()
            .filter_map(|&candidate| {
                let mut impacts = Vec::new();
                let mut lost_weight = 0.0;
                let mut total_weight = 0.0;
                for &source in &sources {
                    if source == candidate {
                        continue;
                    }
                    let baseline = self.baselines[source];
                    total_weight += self.weights[source];
                    let remaining = self.disjoint_paths(source, Some(candidate));
                    let lost = baseline.saturating_sub(remaining);
                    if lost == 0 {
                        continue;
                    }
                    lost_weight += lost as f64 / baseline as f64 * self.weights[source];
                    impacts.push(SourceImpact {
                        source: self.names[source].clone(),
                        baseline,
                        remaining,
                        lost,
                    });
                }
                if impacts.is_empty() || total_weight <= 0.0 {
                    return None;
                }
                Some((
                    self.names[candidate].clone(),
                    ChokepointScore {
                        importance: lost_weight / total_weight,
                        impacts,
                    },
                ))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .collect()
    }
}

/// Dense-capacity Edmonds-Karp.
struct FlowNetwork {
    n: usize,
    cap: Vec<i64>,
    adj: Vec<Vec<usize>>,
}

impl FlowNetwork {
    fn new(n: usize) -> Self {
        FlowNetwork {
            n,
            cap: vec![0; n * n],
            adj: vec![Vec::new(); n],
        }
    }

    fn add_edge(&mut self, u: usize, v: usize, capacity: i64) {
        if self.cap[u * self.n + v] == 0 && self.cap[v * self.n + u] == 0 {
            self.adj[u].push(v);
            self.adj[v].push(u);
        }
        self.cap[u * self.n + v] += capacity;
    }

    fn max_flow(&mut self, source: usize, sink: usize) -> i64 {
        let mut total = 0;
        loop {
            // Shortest augmenting path over the residual graph.
            let mut parent: Vec<Option<usize>> = vec![None; self.n];
            parent[source] = Some(source);
            let mut queue = VecDeque::new();
            queue.push_back(source);
            while let Some(u) = queue.pop_front() {
                if u == sink {
                    break;
                }
                for &v in &self.adj[u] {
                    if parent[v].is_none() && self.cap[u * self.n + v] > 0 {
                        parent[v] = Some(u);
                        queue.push_back(v);
                    }
                }
            }
            if parent[sink].is_none() {
                return total;
            }

            let mut bottleneck = i64::MAX;
            let mut v = sink;
            while v != source {
                let u = parent[v].expect("path reconstructed from sink");
                bottleneck = bottleneck.min(self.cap[u * self.n + v]);
                v = u;
            }
            let mut v = sink;
            while v != source {
                let u = parent[v].expect("path reconstructed from sink");
                self.cap[u * self.n + v] -= bottleneck;
                self.cap[v * self.n + u] += bottleneck;
                v = u;
            }
            total += bottleneck;
        }
    }
}
