use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::hash::Hash;

/// Cost tolerance when deciding that two routes tie.
///
/// Costs are sums of small f64 edge weights; routes whose totals differ by
/// less than this are considered equally good.
pub const COST_EPSILON: f64 = 1e-9;

/// A trait for graphs that can be searched.
///
/// `Node`: The type of node identifiers (e.g., a territory index).
/// `Ctx`: A context object passed to cost calculations (e.g., the world
/// state viewed from one guild).
pub trait Graph<Node, Ctx> {
    /// Return the neighbors of a node, in a stable order.
    ///
    /// Route enumeration and tie-breaking are only deterministic if this
    /// order is deterministic.
    fn neighbors(&self, node: Node, context: &Ctx) -> Vec<Node>;

    /// Calculate the cost to move from `from` to `to`.
    /// This allows dynamic weighting based on the provided context.
    fn cost(&self, from: Node, to: Node, context: &Ctx) -> f64;

    /// Calculate the estimated cost (heuristic) from `from` to `target`.
    /// For A*, this must be admissible (never overestimate).
    fn heuristic(&self, from: Node, target: Node, context: &Ctx) -> f64;
}

/// Helper struct for the priority queue.
#[derive(Copy, Clone)]
struct QueueEntry<Node> {
    node: Node,
    cost: f64,     // Actual cost from start (g_score)
    priority: f64, // Estimated total cost (f_score = g + h)
}

impl<Node> PartialEq for QueueEntry<Node> {
    fn eq(&self, other: &Self) -> bool {
        self.priority.total_cmp(&other.priority) == Ordering::Equal
            && self.cost.total_cmp(&other.cost) == Ordering::Equal
    }
}

impl<Node> Eq for QueueEntry<Node> {}

// The priority queue depends on `Ord`. The ordering on costs is flipped so
// the queue becomes a min-heap. `total_cmp` gives f64 a total order.
impl<Node> Ord for QueueEntry<Node> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| other.cost.total_cmp(&self.cost))
    }
}

impl<Node> PartialOrd for QueueEntry<Node> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Breadth-first search: shortest path by hop count, edge costs ignored.
pub fn bfs<Node, Ctx, G>(graph: &G, start: Node, goal: Node, context: &Ctx) -> Option<Vec<Node>>
where
    Node: Copy + Eq + Hash,
    G: Graph<Node, Ctx>,
{
    if start == goal {
        return Some(vec![start]);
    }
    let mut came_from: HashMap<Node, Node> = HashMap::new();
    let mut visited: HashSet<Node> = HashSet::new();
    let mut queue = VecDeque::new();
    visited.insert(start);
    queue.push_back(start);

    while let Some(current) = queue.pop_front() {
        for neighbor in graph.neighbors(current, context) {
            if !visited.insert(neighbor) {
                continue;
            }
            came_from.insert(neighbor, current);
            if neighbor == goal {
                return Some(reconstruct(&came_from, neighbor));
            }
            queue.push_back(neighbor);
        }
    }
    None
}

/// Dijkstra's algorithm: cheapest path under the graph's cost model.
pub fn dijkstra<Node, Ctx, G>(
    graph: &G,
    start: Node,
    goal: Node,
    context: &Ctx,
) -> Option<(Vec<Node>, f64)>
where
    Node: Copy + Eq + Hash,
    G: Graph<Node, Ctx>,
{
    search(graph, start, goal, context, false)
}

/// A*: cheapest path guided by the graph's heuristic.
pub fn astar<Node, Ctx, G>(
    graph: &G,
    start: Node,
    goal: Node,
    context: &Ctx,
) -> Option<(Vec<Node>, f64)>
where
    Node: Copy + Eq + Hash,
    G: Graph<Node, Ctx>,
{
    search(graph, start, goal, context, true)
}

/// Shared heap-based search core for Dijkstra (zero heuristic) and A*.
fn search<Node, Ctx, G>(
    graph: &G,
    start: Node,
    goal: Node,
    context: &Ctx,
    use_heuristic: bool,
) -> Option<(Vec<Node>, f64)>
where
    Node: Copy + Eq + Hash,
    G: Graph<Node, Ctx>,
{
    let mut open_set = BinaryHeap::new();
    let mut came_from: HashMap<Node, Node> = HashMap::new();
    let mut g_score: HashMap<Node, f64> = HashMap::new();
    let mut closed_set: HashSet<Node> = HashSet::new();

    let h0 = if use_heuristic {
        graph.heuristic(start, goal, context)
    } else {
        0.0
    };
    g_score.insert(start, 0.0);
    open_set.push(QueueEntry {
        node: start,
        cost: 0.0,
        priority: h0,
    });

    while let Some(QueueEntry { node: current, .. }) = open_set.pop() {
        // Skip if already processed with a better path
        if !closed_set.insert(current) {
            continue;
        }

        if current == goal {
            return Some((reconstruct(&came_from, current), g_score[&goal]));
        }

        let current_g = g_score[&current];

        for neighbor in graph.neighbors(current, context) {
            if closed_set.contains(&neighbor) {
                continue;
            }

            let tentative_g = current_g + graph.cost(current, neighbor, context);

            if tentative_g < *g_score.get(&neighbor).unwrap_or(&f64::INFINITY) {
                came_from.insert(neighbor, current);
                g_score.insert(neighbor, tentative_g);
                let h = if use_heuristic {
                    graph.heuristic(neighbor, goal, context)
                } else {
                    0.0
                };
                open_set.push(QueueEntry {
                    node: neighbor,
                    cost: tentative_g,
                    priority: tentative_g + h,
                });
            }
        }
    }

    None
}

/// Bellman-Ford over an explicit node list.
///
/// Slower than Dijkstra but tolerant of arbitrary (finite) edge weights.
/// Returns `None` when `goal` is unreachable from `start`.
pub fn bellman_ford<Node, Ctx, G>(
    graph: &G,
    nodes: &[Node],
    start: Node,
    goal: Node,
    context: &Ctx,
) -> Option<(Vec<Node>, f64)>
where
    Node: Copy + Eq + Hash,
    G: Graph<Node, Ctx>,
{
    let mut dist: HashMap<Node, f64> = HashMap::new();
    let mut came_from: HashMap<Node, Node> = HashMap::new();
    dist.insert(start, 0.0);

    for _ in 1..nodes.len().max(2) {
        let mut changed = false;
        for &u in nodes {
            let Some(&du) = dist.get(&u) else { continue };
            for v in graph.neighbors(u, context) {
                let cand = du + graph.cost(u, v, context);
                if cand + COST_EPSILON < *dist.get(&v).unwrap_or(&f64::INFINITY) {
                    dist.insert(v, cand);
                    came_from.insert(v, u);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    let total = *dist.get(&goal)?;
    if start == goal {
        return Some((vec![start], 0.0));
    }
    Some((reconstruct(&came_from, goal), total))
}

/// All-pairs shortest paths (Floyd-Warshall) over an explicit node list.
pub struct AllPairs<Node> {
    nodes: Vec<Node>,
    index: HashMap<Node, usize>,
    dist: Vec<f64>,
    // next[i*n + j]: the node after i on a shortest i -> j path.
    next: Vec<Option<usize>>,
}

impl<Node: Copy + Eq + Hash> AllPairs<Node> {
    pub fn distance(&self, from: Node, to: Node) -> Option<f64> {
        let (&i, &j) = (self.index.get(&from)?, self.index.get(&to)?);
        let d = self.dist[i * self.nodes.len() + j];
        d.is_finite().then_some(d)
    }

    pub fn path(&self, from: Node, to: Node) -> Option<Vec<Node>> {
        let (&i, &j) = (self.index.get(&from)?, self.index.get(&to)?);
        let n = self.nodes.len();
        if !self.dist[i * n + j].is_finite() {
            return None;
        }
        let mut path = vec![self.nodes[i]];
        let mut cur = i;
        while cur != j {
            cur = self.next[cur * n + j]?;
            path.push(self.nodes[cur]);
        }
        Some(path)
    }
}

pub fn floyd_warshall<Node, Ctx, G>(graph: &G, nodes: &[Node], context: &Ctx) -> AllPairs<Node>
where
    Node: Copy + Eq + Hash,
    G: Graph<Node, Ctx>,
{
    let n = nodes.len();
    let index: HashMap<Node, usize> = nodes.iter().enumerate().map(|(i, &x)| (x, i)).collect();
    let mut dist = vec![f64::INFINITY; n * n];
    let mut next: Vec<Option<usize>> = vec![None; n * n];

    for (i, &u) in nodes.iter().enumerate() {
        dist[i * n + i] = 0.0;
        for v in graph.neighbors(u, context) {
            let Some(&j) = index.get(&v) else { continue };
            let c = graph.cost(u, v, context);
            if c < dist[i * n + j] {
                dist[i * n + j] = c;
                next[i * n + j] = Some(j);
            }
        }
    }

    for k in 0..n {
        for i in 0..n {
            let dik = dist[i * n + k];
            if !dik.is_finite() {
                continue;
            }
            for j in 0..n {
                let cand = dik + dist[k * n + j];
                if cand + COST_EPSILON < dist[i * n + j] {
                    dist[i * n + j] = cand;
                    next[i * n + j] = next[i * n + k];
                }
            }
        }
    }

    AllPairs {
        nodes: nodes.to_vec(),
        index,
        dist,
        next,
    }
}

/// Flood fill from `start`: cheapest known cost to every reachable node.
pub fn flood_fill<Node, Ctx, G>(graph: &G, start: Node, context: &Ctx) -> HashMap<Node, f64>
where
    Node: Copy + Eq + Hash,
    G: Graph<Node, Ctx>,
{
    let mut dist: HashMap<Node, f64> = HashMap::new();
    let mut open_set = BinaryHeap::new();
    dist.insert(start, 0.0);
    open_set.push(QueueEntry {
        node: start,
        cost: 0.0,
        priority: 0.0,
    });

    while let Some(QueueEntry {
        node: current,
        cost,
        ..
    }) = open_set.pop()
    {
        if cost > dist[&current] + COST_EPSILON {
            continue; // Stale entry
        }
        for neighbor in graph.neighbors(current, context) {
            let cand = cost + graph.cost(current, neighbor, context);
            if cand + COST_EPSILON < *dist.get(&neighbor).unwrap_or(&f64::INFINITY) {
                dist.insert(neighbor, cand);
                open_set.push(QueueEntry {
                    node: neighbor,
                    cost: cand,
                    priority: cand,
                });
            }
        }
    }
    dist
}

/// Hard cap on enumerated tying routes, so dense meshes cannot explode.
pub const MAX_ALTERNATIVE_ROUTES: usize = 256;

/// Every cheapest route from `start` to `goal`, deterministically ordered.
///
/// Dijkstra, except that relaxations within [`COST_EPSILON`] of the best
/// known distance append to the predecessor set instead of replacing it.
/// A DFS from the goal back over the predecessor sets then enumerates every
/// tying route, capped at `cap`. Results are sorted by (length, node
/// sequence), so callers see a stable ordering across runs.
pub fn all_cheapest<Node, Ctx, G>(
    graph: &G,
    start: Node,
    goal: Node,
    context: &Ctx,
    cap: usize,
) -> Vec<Vec<Node>>
where
    Node: Copy + Eq + Hash + Ord,
    G: Graph<Node, Ctx>,
{
    let mut dist: HashMap<Node, f64> = HashMap::new();
    let mut preds: HashMap<Node, Vec<Node>> = HashMap::new();
    let mut open_set = BinaryHeap::new();
    dist.insert(start, 0.0);
    open_set.push(QueueEntry {
        node: start,
        cost: 0.0,
        priority: 0.0,
    });

    while let Some(QueueEntry {
        node: current,
        cost,
        ..
    }) = open_set.pop()
    {
        if cost > dist[&current] + COST_EPSILON {
            continue;
        }
        for neighbor in graph.neighbors(current, context) {
            let cand = cost + graph.cost(current, neighbor, context);
            let best = *dist.get(&neighbor).unwrap_or(&f64::INFINITY);
            if cand + COST_EPSILON < best {
                dist.insert(neighbor, cand);
                preds.insert(neighbor, vec![current]);
                open_set.push(QueueEntry {
                    node: neighbor,
                    cost: cand,
                    priority: cand,
                });
            } else if (cand - best).abs() <= COST_EPSILON {
                let entry = preds.entry(neighbor).or_default();
                if !entry.contains(&current) {
                    entry.push(current);
                }
            }
        }
    }

    if !dist.contains_key(&goal) {
        return Vec::new();
    }
    enumerate_routes(&preds, start, goal, cap)
}

/// Every fewest-hop route from `start` to `goal`, deterministically ordered.
///
/// BFS version of the predecessor-union idea in [`all_cheapest`].
pub fn all_fastest<Node, Ctx, G>(
    graph: &G,
    start: Node,
    goal: Node,
    context: &Ctx,
    cap: usize,
) -> Vec<Vec<Node>>
where
    Node: Copy + Eq + Hash + Ord,
    G: Graph<Node, Ctx>,
{
    let mut depth: HashMap<Node, usize> = HashMap::new();
    let mut preds: HashMap<Node, Vec<Node>> = HashMap::new();
    let mut queue = VecDeque::new();
    depth.insert(start, 0);
    queue.push_back(start);

    while let Some(current) = queue.pop_front() {
        let d = depth[&current];
        for neighbor in graph.neighbors(current, context) {
            match depth.get(&neighbor) {
                None => {
                    depth.insert(neighbor, d + 1);
                    preds.insert(neighbor, vec![current]);
                    queue.push_back(neighbor);
                }
                Some(&nd) if nd == d + 1 => {
                    let entry = preds.entry(neighbor).or_default();
                    if !entry.contains(&current) {
                        entry.push(current);
                    }
                }
                Some(_) => {}
            }
        }
    }

    if !depth.contains_key(&goal) {
        return Vec::new();
    }
    enumerate_routes(&preds, start, goal, cap)
}

/// Walk the predecessor sets backwards from `goal`, emitting each distinct
/// route start-first. Routes are sorted by (length, node sequence).
fn enumerate_routes<Node>(
    preds: &HashMap<Node, Vec<Node>>,
    start: Node,
    goal: Node,
    cap: usize,
) -> Vec<Vec<Node>>
where
    Node: Copy + Eq + Hash + Ord,
{
    let mut routes: Vec<Vec<Node>> = Vec::new();
    let mut stack: Vec<Node> = vec![goal];
    dfs_routes(preds, start, &mut stack, &mut routes, cap);

    for route in &mut routes {
        route.reverse();
    }
    routes.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    routes
}

fn dfs_routes<Node>(
    preds: &HashMap<Node, Vec<Node>>,
    start: Node,
    stack: &mut Vec<Node>,
    routes: &mut Vec<Vec<Node>>,
    cap: usize,
) where
    Node: Copy + Eq + Hash + Ord,
{
    if routes.len() >= cap {
        return;
    }
    let current = *stack.last().expect("non-empty route stack");
    if current == start {
        routes.push(stack.clone());
        return;
    }
    let Some(parents) = preds.get(&current) else {
        return;
    };
    for &p in parents {
        stack.push(p);
        dfs_routes(preds, start, stack, routes, cap);
        stack.pop();
    }
}

fn reconstruct<Node: Copy + Eq + Hash>(came_from: &HashMap<Node, Node>, goal: Node) -> Vec<Node> {
    let mut path = vec![goal];
    let mut curr = goal;
    while let Some(&prev) = came_from.get(&curr) {
        path.push(prev);
        curr = prev;
    }
    path.reverse();
    path
}
