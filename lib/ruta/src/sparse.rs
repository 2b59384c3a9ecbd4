use crate::bits::Bits;
use crate::errors::FinalizedNodeError;
use std::collections::{HashMap, HashSet};

type Result<T> = std::result::Result<T, FinalizedNodeError>;

/// Description of one route actually stored by `add_route`. The `label` has
/// the composite format `"<target>:<sorted space-joined deps>"`.
#[derive(Debug, Clone, PartialEq)]
pub struct AddedRoute {
    pub target: usize,
    pub deps: Bits,
    pub label: String,
}

// Per-node bookkeeping: whether the node has been frozen, and its current
// alternatives keyed by their canonical label.
#[derive(Debug, Default)]
struct SparseNode {
    finalized: bool,
    routes: HashMap<String, Bits>,
}

/// Tracks, for every node of a fixed-size graph, the minimal alternative sets
/// of other nodes that make it reachable. Routes are added incrementally and
/// kept free of redundancy: for any node, no stored route is a subset or a
/// superset of another.
///
/// Finalizing a node freezes its route set and treats it as ground truth from
/// then on: routes of other nodes that mention it are re-derived with the
/// finalized alternatives spliced in. A node finalized with zero routes is
/// permanently unreachable, and every route depending on it dissolves.
#[derive(Debug)]
pub struct SparseDependencyGraph {
    nodes: Vec<SparseNode>,
}

impl SparseDependencyGraph {
    /// Returns a graph of `size` nodes, indices `0..size-1`, with no routes.
    pub fn new(size: usize) -> Self {
        SparseDependencyGraph {
            nodes: (0..size).map(|_| SparseNode::default()).collect(),
        }
    }

    /// The number of nodes in the graph.
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the given node has been finalized.
    pub fn is_finalized(&self, node: usize) -> bool {
        self.nodes[node].finalized
    }

    /// The routes currently stored for `node`, in no particular order.
    pub fn routes(&self, node: usize) -> Vec<&Bits> {
        self.nodes[node].routes.values().collect()
    }

    /// Adds one route: `edge` holds the target node first and its
    /// dependencies after it. Returns the routes that were actually stored,
    /// which can be none (the route was impossible or redundant), one (the
    /// common case), or several (a finalized dependency fanned out into its
    /// alternatives).
    ///
    /// Dependencies that are already finalized never make it into storage:
    /// they are replaced by their own route members, so stored routes stay
    /// expressed in terms of live nodes.
    pub fn add_route(&mut self, edge: &[usize]) -> Result<Vec<AddedRoute>> {
        assert!(!edge.is_empty(), "a route needs a target node");
        self.add_route_inner(edge[0], Bits::of(&edge[1..]), false)
    }

    /// Finalizes `node`: freezes its route set and re-derives every other
    /// node's routes that mention it. Does nothing if already finalized.
    pub fn finalize(&mut self, node: usize) {
        if self.nodes[node].finalized {
            return;
        }
        self.nodes[node].finalized = true;

        // First pass, read only: collect every stored route anywhere in the
        // graph that has `node` as a member.
        let mut pending: Vec<(usize, String, Bits)> = Vec::new();
        for (target, entry) in self.nodes.iter().enumerate() {
            if target == node {
                continue;
            }
            for (label, route) in entry.routes.iter() {
                if route.has(node) {
                    pending.push((target, label.clone(), route.clone()));
                }
            }
        }

        // Second pass: pull each collected route out and re-add it, which
        // splices the now-finalized alternatives in. Re-derivation is allowed
        // to land on targets that are themselves finalized.
        for (target, label, route) in pending {
            self.nodes[target].routes.remove(&label);
            self.add_route_inner(target, route, true)
                .expect("re-derivation never rejects its target");
        }
    }

    // The working part of `add_route`. `rederive` is only set on the
    // finalize path, where re-adding into a finalized target is legitimate.
    fn add_route_inner(
        &mut self,
        target: usize,
        deps: Bits,
        rederive: bool,
    ) -> Result<Vec<AddedRoute>> {
        if self.nodes[target].finalized && !rederive {
            return Err(FinalizedNodeError { node: target });
        }

        // Substitute finalized dependencies until none are left. Each
        // substitution restarts the scan since it can bring in new members.
        let mut deps = deps;
        'scan: loop {
            for dep in deps.iter().collect::<Vec<usize>>() {
                if dep == target {
                    // Depending on itself makes the route vacuous.
                    return Ok(vec![]);
                }
                if !self.nodes[dep].finalized {
                    continue;
                }

                let routes: Vec<Bits> = self.nodes[dep].routes.values().cloned().collect();
                if routes.is_empty() {
                    // The dependency is finalized as unreachable, and so is
                    // any route through it.
                    return Ok(vec![]);
                }
                if routes.len() == 1 {
                    deps = deps.without(dep).union(&routes[0]);
                    continue 'scan;
                }

                // Several alternatives: add one route per alternative and
                // union the results, deduplicated by label.
                let base = deps.without(dep);
                let mut added = Vec::new();
                let mut labels = HashSet::new();
                for route in routes {
                    for r in self.add_route_inner(target, base.union(&route), rederive)? {
                        if labels.insert(r.label.clone()) {
                            added.push(r);
                        }
                    }
                }
                return Ok(added);
            }
            break;
        }

        // Canonical insertion. An existing subset makes the new route
        // redundant; existing supersets are dominated and dropped.
        let label = route_label(&deps);
        let node = &mut self.nodes[target];
        if node.routes.contains_key(&label) {
            return Ok(vec![]);
        }
        let mut dominated = Vec::new();
        for (existing_label, existing) in node.routes.iter() {
            if deps.contains_all(existing) {
                return Ok(vec![]);
            }
            if existing.contains_all(&deps) {
                dominated.push(existing_label.clone());
            }
        }
        for l in dominated {
            node.routes.remove(&l);
        }
        node.routes.insert(label.clone(), deps.clone());

        Ok(vec![AddedRoute {
            target,
            deps,
            label: format!("{}:{}", target, label),
        }])
    }
}

// Canonical label for a dependency set: members ascending, space-joined.
fn route_label(deps: &Bits) -> String {
    deps.iter()
        .map(|d| d.to_string())
        .collect::<Vec<String>>()
        .join(" ")
}
