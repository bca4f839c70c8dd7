//! Bounded-depth path statistics
//!
//! Diagnostic only: counts the routes from a public method to a third-party
//! target without taking part in path selection. Visited sets are kept per
//! depth, so a method may be revisited at a different distance.

use petgraph::graph::NodeIndex;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

use super::ReachabilityEngine;
use crate::classify::ThirdPartyPredicate;
use crate::model::{MethodSignature, PathStats};

/// Default exploration depth, in path elements
pub const DEFAULT_STATS_DEPTH: usize = 19;

impl<'a, P: ThirdPartyPredicate + ?Sized> ReachabilityEngine<'a, P> {
    /// Count routes from `start` to `target` of at most `max_depth` hops
    ///
    /// `max_depth == 0` selects [`DEFAULT_STATS_DEPTH`]; exploration is always
    /// bounded since per-depth visited sets let cycles repeat. Returns `None`
    /// when no route exists.
    pub fn path_stats(
        &self,
        start: &MethodSignature,
        target: &MethodSignature,
        max_depth: usize,
    ) -> Option<PathStats> {
        let graph = self.graph();
        let start_idx = graph.node(start)?;
        let target_idx = graph.node(target)?;
        let max_depth = if max_depth == 0 { DEFAULT_STATS_DEPTH } else { max_depth };

        let mut total = 0usize;
        let mut shortest = usize::MAX;
        let mut longest = 0usize;
        let mut visited_at: HashMap<usize, HashSet<NodeIndex>> = HashMap::new();
        let mut queue: VecDeque<(NodeIndex, usize)> = VecDeque::new();
        queue.push_back((start_idx, 1));

        while let Some((current, length)) = queue.pop_front() {
            if length > max_depth {
                continue;
            }
            for callee in graph.callees(current) {
                let next_length = length + 1;
                if callee == target_idx {
                    total += 1;
                    shortest = shortest.min(next_length);
                    longest = longest.max(next_length);
                    continue;
                }
                if self.is_third_party(callee) {
                    continue;
                }
                if visited_at.entry(next_length).or_default().insert(callee) {
                    queue.push_back((callee, next_length));
                }
            }
        }

        if total == 0 {
            return None;
        }
        debug!(
            "{} -> {}: {} route(s), lengths {}..={}",
            start, target, total, shortest, longest
        );
        Some(PathStats {
            public_method: start.display_name(),
            third_party_method: target.display_name(),
            total_paths: total,
            shortest_path_length: shortest,
            longest_path_length: longest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{CallGraph, EntryPointSet};

    fn m(name: &str) -> MethodSignature {
        MethodSignature::new("com.acme.App", name, vec![], "void")
    }

    fn lib() -> MethodSignature {
        MethodSignature::new("org.lib.Client", "execute", vec![], "void")
    }

    fn is_lib(method: &MethodSignature) -> bool {
        method.declaring_type.starts_with("org.lib")
    }

    fn graph(edges: &[(MethodSignature, MethodSignature)]) -> CallGraph {
        let mut g = CallGraph::new();
        for (a, b) in edges {
            g.add_call(a, b.clone(), None);
        }
        g
    }

    #[test]
    fn test_diamond_counts_both_routes() {
        let g = graph(&[
            (m("a"), m("b")),
            (m("a"), m("c")),
            (m("b"), lib()),
            (m("c"), m("d")),
            (m("d"), lib()),
        ]);
        let entries = EntryPointSet::new();
        let predicate = is_lib;
        let engine = ReachabilityEngine::new(&g, &entries, &predicate);
        let stats = engine.path_stats(&m("a"), &lib(), DEFAULT_STATS_DEPTH).unwrap();
        assert_eq!(stats.total_paths, 2);
        assert_eq!(stats.shortest_path_length, 3);
        assert_eq!(stats.longest_path_length, 4);
    }

    #[test]
    fn test_depth_bound_and_cycles() {
        let g = graph(&[
            (m("a"), m("b")),
            (m("b"), m("a")),
            (m("b"), m("c")),
            (m("c"), lib()),
        ]);
        let entries = EntryPointSet::new();
        let predicate = is_lib;
        let engine = ReachabilityEngine::new(&g, &entries, &predicate);

        let bounded = engine.path_stats(&m("a"), &lib(), 3).unwrap();
        assert_eq!(bounded.shortest_path_length, 4);
        assert!(bounded.longest_path_length <= 4);

        assert!(engine.path_stats(&m("a"), &lib(), 2).is_none());
        assert!(engine.path_stats(&m("c"), &m("a"), 5).is_none());
    }

    #[test]
    fn test_zero_depth_on_cycle_uses_default_bound() {
        let g = graph(&[(m("a"), m("b")), (m("b"), m("a")), (m("b"), lib())]);
        let entries = EntryPointSet::new();
        let predicate = is_lib;
        let engine = ReachabilityEngine::new(&g, &entries, &predicate);

        let stats = engine.path_stats(&m("a"), &lib(), 0).unwrap();
        let default = engine.path_stats(&m("a"), &lib(), DEFAULT_STATS_DEPTH).unwrap();
        assert_eq!(stats, default);
        assert_eq!(stats.shortest_path_length, 3);
        assert!(stats.longest_path_length <= DEFAULT_STATS_DEPTH + 1);
    }
}
