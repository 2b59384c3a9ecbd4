use std::collections::{HashMap, HashSet, VecDeque};

/// Identity of a node inside a `Graph`: its position in the node arena.
pub type NodeId = usize;

/// An edge tuple: the first entry is the target, the rest are the
/// dependencies that must all be reachable before the target is (AND).
/// Distinct edges sharing a target are alternative ways of reaching it (OR),
/// and an edge with no dependencies makes its target unconditionally
/// reachable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge(Vec<NodeId>);

impl Edge {
    /// Builds an edge from node handles, target first.
    pub fn of(nodes: &[NodeId]) -> Self {
        assert!(!nodes.is_empty(), "an edge needs a target node");
        Edge(nodes.to_vec())
    }

    /// The node this edge proves reachable.
    pub fn target(&self) -> NodeId {
        self.0[0]
    }

    /// The nodes which all have to be reachable first.
    pub fn deps(&self) -> &[NodeId] {
        &self.0[1..]
    }
}

/// A node of the traversal graph. The `uid` doubles as the index into the
/// graph's arena, so ownership is by position and handles are plain integers.
#[derive(Debug)]
pub struct Node {
    uid: NodeId,
    name: String,
    edges: Vec<Edge>,
}

impl Node {
    pub fn uid(&self) -> NodeId {
        self.uid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The edges declared with this node as their target.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }
}

/// Options for `Graph::traverse`. With no `wanted` set every node of the
/// graph is wanted; `dfs` switches the worklist from queue to stack order.
#[derive(Debug, Default)]
pub struct TraverseOptions {
    pub wanted: Option<Vec<NodeId>>,
    pub dfs: bool,
}

/// The outcome of a traversal: the order in which nodes were proven
/// reachable together with a rendering of the edge that proved each, the
/// full proof map, and whether every wanted node was reached. An incomplete
/// traversal is a normal outcome, not an error.
#[derive(Debug)]
pub struct Traversal {
    pub path: Vec<(NodeId, String)>,
    pub seen: HashMap<NodeId, Edge>,
    pub win: bool,
}

/// An arena of named nodes plus the reachability search over their edges.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Graph { nodes: vec![] }
    }

    /// Adds a node and returns its handle, which is also its arena index.
    pub fn node(&mut self, name: &str) -> NodeId {
        let uid = self.nodes.len();
        self.nodes.push(Node {
            uid,
            name: name.to_string(),
            edges: vec![],
        });
        uid
    }

    /// Declares an edge. It is stored on its target node.
    pub fn add_edge(&mut self, edge: Edge) {
        let target = edge.target();
        self.nodes[target].edges.push(edge);
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// The name of the given node.
    pub fn name(&self, uid: NodeId) -> &str {
        &self.nodes[uid].name
    }

    /// Worklist reachability search. Starting from the edges with no
    /// dependencies, keeps proving nodes reachable until every wanted node
    /// has been reached or nothing further can be proven. `seen` maps each
    /// reached node to the first edge that proved it, which makes the
    /// returned path a justification chain usable for spoiler logs.
    pub fn traverse(&self, opts: &TraverseOptions) -> Traversal {
        // Index every edge under each of its dependencies, so that a node
        // becoming reachable cheaply re-examines just the edges mentioning
        // it. Dependency-free edges seed the worklist directly.
        let mut by_dep: HashMap<NodeId, Vec<&Edge>> = HashMap::new();
        let mut seen: HashMap<NodeId, Edge> = HashMap::new();
        let mut worklist: VecDeque<NodeId> = VecDeque::new();

        for node in &self.nodes {
            for edge in node.edges() {
                for &dep in edge.deps() {
                    by_dep.entry(dep).or_default().push(edge);
                }
                if edge.deps().is_empty() && !seen.contains_key(&edge.target()) {
                    seen.insert(edge.target(), edge.clone());
                    worklist.push_back(edge.target());
                }
            }
        }

        let mut want: HashSet<NodeId> = match &opts.wanted {
            Some(wanted) => wanted.iter().copied().collect(),
            None => (0..self.nodes.len()).collect(),
        };
        let mut path = Vec::new();

        while !want.is_empty() {
            let next = if opts.dfs {
                worklist.pop_back()
            } else {
                worklist.pop_front()
            };
            let Some(n) = next else {
                break;
            };

            want.remove(&n);
            path.push((n, self.render(&seen[&n])));

            for &edge in by_dep.get(&n).map(Vec::as_slice).unwrap_or(&[]) {
                let target = edge.target();
                if seen.contains_key(&target) {
                    continue;
                }
                if !edge.deps().iter().all(|dep| seen.contains_key(dep)) {
                    continue;
                }
                seen.insert(target, edge.clone());
                worklist.push_back(target);
            }
        }

        let win = want.is_empty();
        Traversal { path, seen, win }
    }

    // Renders an edge with node names, e.g. "Sword (Start & Key)".
    fn render(&self, edge: &Edge) -> String {
        let target = &self.nodes[edge.target()].name;
        if edge.deps().is_empty() {
            return target.clone();
        }
        let deps = edge
            .deps()
            .iter()
            .map(|&d| self.nodes[d].name.as_str())
            .collect::<Vec<&str>>()
            .join(" & ");
        format!("{} ({})", target, deps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A graph where C is reachable either straight from A or through B.
    fn diamond() -> (Graph, NodeId, NodeId, NodeId) {
        let mut graph = Graph::new();
        let a = graph.node("A");
        let b = graph.node("B");
        let c = graph.node("C");

        graph.add_edge(Edge::of(&[a]));
        graph.add_edge(Edge::of(&[b, a]));
        graph.add_edge(Edge::of(&[c, a]));
        graph.add_edge(Edge::of(&[c, b]));

        (graph, a, b, c)
    }

    // Every path entry must be justified entirely by earlier entries.
    fn assert_sound(traversal: &Traversal) {
        let mut proven: HashSet<NodeId> = HashSet::new();
        for (uid, _) in &traversal.path {
            let edge = traversal.seen.get(uid).expect("path entry without proof");
            assert_eq!(edge.target(), *uid);
            for dep in edge.deps() {
                assert!(proven.contains(dep), "node {} used before being proven", dep);
            }
            proven.insert(*uid);
        }
    }

    #[test]
    fn reaches_through_alternatives() {
        let (graph, a, _, c) = diamond();
        let traversal = graph.traverse(&TraverseOptions {
            wanted: Some(vec![c]),
            dfs: false,
        });

        assert!(traversal.win);
        assert!(traversal.seen.contains_key(&a));
        assert!(traversal.seen.contains_key(&c));
        assert_sound(&traversal);
    }

    #[test]
    fn failure_is_not_an_error() {
        let mut graph = Graph::new();
        let a = graph.node("A");
        let b = graph.node("B");
        let c = graph.node("C");

        graph.add_edge(Edge::of(&[a]));
        // B needs C and C needs B: neither is ever reachable.
        graph.add_edge(Edge::of(&[b, c]));
        graph.add_edge(Edge::of(&[c, b]));

        let traversal = graph.traverse(&TraverseOptions {
            wanted: Some(vec![a, b]),
            dfs: false,
        });

        assert!(!traversal.win);
        assert!(traversal.seen.contains_key(&a));
        assert!(!traversal.seen.contains_key(&b));
    }

    #[test]
    fn and_semantics_require_every_dependency() {
        let mut graph = Graph::new();
        let a = graph.node("A");
        let b = graph.node("B");
        let c = graph.node("C");

        graph.add_edge(Edge::of(&[a]));
        graph.add_edge(Edge::of(&[c, a, b]));

        let traversal = graph.traverse(&TraverseOptions {
            wanted: Some(vec![c]),
            dfs: false,
        });
        assert!(!traversal.win, "C must wait for both A and B");

        graph.add_edge(Edge::of(&[b]));
        let traversal = graph.traverse(&TraverseOptions {
            wanted: Some(vec![c]),
            dfs: false,
        });
        assert!(traversal.win);
        assert_sound(&traversal);
    }

    #[test]
    fn dfs_and_bfs_agree_on_the_outcome() {
        let (graph, ..) = diamond();

        let bfs = graph.traverse(&TraverseOptions::default());
        let dfs = graph.traverse(&TraverseOptions {
            wanted: None,
            dfs: true,
        });

        assert_eq!(bfs.win, dfs.win);
        let mut bfs_keys: Vec<NodeId> = bfs.seen.keys().copied().collect();
        let mut dfs_keys: Vec<NodeId> = dfs.seen.keys().copied().collect();
        bfs_keys.sort();
        dfs_keys.sort();
        assert_eq!(bfs_keys, dfs_keys);
        assert_sound(&bfs);
        assert_sound(&dfs);
    }

    #[test]
    fn path_is_rendered_with_names() {
        let (graph, ..) = diamond();
        let traversal = graph.traverse(&TraverseOptions::default());

        assert!(traversal.win);
        assert_eq!(traversal.path[0].1, "A");
        let rendered: Vec<&str> = traversal.path.iter().map(|(_, r)| r.as_str()).collect();
        assert!(rendered.contains(&"B (A)") || rendered.contains(&"C (A)"));
    }
}
