//! Call graph reachability engine
//!
//! Finds, for every project → third-party call pair, the routes from the
//! nearest public ancestors down to the calling method. The backward search
//! stops at the first entry point on each branch, which keeps the number of
//! emitted paths bounded even on heavily connected graphs.

pub mod stats;

pub use stats::DEFAULT_STATS_DEPTH;

use petgraph::graph::NodeIndex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::{debug, info, trace};

use crate::classify::ThirdPartyPredicate;
use crate::graph::{CallGraph, EntryPointSet, ReverseIndex};
use crate::model::{MethodSignature, ThirdPartyPath};

/// Callee names excluded from the scan (compiler-generated for-each noise)
pub const NOISE_CALLEES: &[&str] = &["iterator"];

/// A project method calling a third-party method
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallPair {
    pub caller: MethodSignature,
    #[serde(rename = "thirdPartyMethod")]
    pub target: MethodSignature,
}

impl CallPair {
    pub fn new(caller: MethodSignature, target: MethodSignature) -> Self {
        Self { caller, target }
    }
}

/// (caller class, target with params) → number of call sites in that class
#[derive(Debug, Clone, Default)]
pub struct MultiplicityIndex {
    counts: HashMap<String, HashMap<String, usize>>,
}

impl MultiplicityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call site of `target` inside `caller`
    pub fn register(&mut self, caller: &MethodSignature, target: &MethodSignature) {
        *self
            .counts
            .entry(caller.declaring_type.clone())
            .or_default()
            .entry(target.with_params())
            .or_insert(0) += 1;
    }

    /// Call sites of `target` across `caller_class`, 0 when never registered
    pub fn count(&self, caller_class: &str, target: &MethodSignature) -> usize {
        self.counts
            .get(caller_class)
            .and_then(|targets| targets.get(&target.with_params()))
            .copied()
            .unwrap_or(0)
    }
}

/// Result of the single pass over every edge
#[derive(Debug, Clone, Default)]
pub struct CallScan {
    /// Distinct pairs in first-seen order
    pub pairs: Vec<CallPair>,
    pub multiplicity: MultiplicityIndex,
    /// Distinct pairs per third-party package
    pub package_counts: BTreeMap<String, usize>,
}

/// Counts static call sites of a target within a caller's body
pub trait CallSiteCounter {
    fn count_call_sites(&self, caller: &MethodSignature, target: &MethodSignature) -> Option<usize>;
}

impl<F> CallSiteCounter for F
where
    F: Fn(&MethodSignature, &MethodSignature) -> Option<usize>,
{
    fn count_call_sites(&self, caller: &MethodSignature, target: &MethodSignature) -> Option<usize> {
        self(caller, target)
    }
}

/// Counter used when no source model is available: every pair counts once
pub struct SingleCallSite;

impl CallSiteCounter for SingleCallSite {
    fn count_call_sites(&self, _: &MethodSignature, _: &MethodSignature) -> Option<usize> {
        None
    }
}

/// Reachability over one immutable call graph
pub struct ReachabilityEngine<'a, P: ThirdPartyPredicate + ?Sized> {
    graph: &'a CallGraph,
    reverse: ReverseIndex,
    entry_points: &'a EntryPointSet,
    classifier: &'a P,
}

impl<'a, P: ThirdPartyPredicate + ?Sized> ReachabilityEngine<'a, P> {
    pub fn new(graph: &'a CallGraph, entry_points: &'a EntryPointSet, classifier: &'a P) -> Self {
        Self {
            graph,
            reverse: graph.reverse_index(),
            entry_points,
            classifier,
        }
    }

    pub fn graph(&self) -> &CallGraph {
        self.graph
    }

    fn is_third_party(&self, idx: NodeIndex) -> bool {
        self.classifier.is_third_party(self.graph.method(idx))
    }

    fn is_entry_point(&self, idx: NodeIndex) -> bool {
        self.entry_points.contains(self.graph.method(idx))
    }

    /// Collect every project → third-party pair and the per-class multiplicity
    pub fn scan_third_party_calls(&self) -> CallScan {
        let mut scan = CallScan::default();
        let mut seen: HashSet<(NodeIndex, NodeIndex)> = HashSet::new();
        let mut skipped_noise = 0usize;

        for (caller, target, _) in self.graph.edges() {
            if !self.is_third_party(target) || self.is_third_party(caller) {
                continue;
            }
            let caller_sig = self.graph.method(caller);
            let target_sig = self.graph.method(target);
            scan.multiplicity.register(caller_sig, target_sig);

            if NOISE_CALLEES.contains(&target_sig.name.as_str()) {
                trace!("Skipping noise callee {}", target_sig);
                skipped_noise += 1;
                continue;
            }
            if seen.insert((caller, target)) {
                *scan
                    .package_counts
                    .entry(target_sig.package().to_string())
                    .or_insert(0) += 1;
                scan.pairs.push(CallPair::new(caller_sig.clone(), target_sig.clone()));
            }
        }

        if skipped_noise > 0 {
            debug!("Skipped {} call sites to noise callees", skipped_noise);
        }
        info!("Found {} distinct third-party call pairs", scan.pairs.len());
        scan
    }

    /// Backward BFS from `start` to its nearest public ancestors
    ///
    /// Each returned route runs entry point first and `start` last. A single
    /// visited set is shared by the whole search, so every node is expanded
    /// at most once and no route repeats a node.
    pub fn nearest_public_routes(&self, start: NodeIndex) -> Vec<Vec<NodeIndex>> {
        let mut routes = Vec::new();
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<Vec<NodeIndex>> = VecDeque::new();

        visited.insert(start);
        queue.push_back(vec![start]);

        while let Some(route) = queue.pop_front() {
            let current = match route.last() {
                Some(&n) => n,
                None => continue,
            };
            for &caller in self.reverse.callers(current) {
                if visited.contains(&caller) || self.is_third_party(caller) {
                    continue;
                }
                visited.insert(caller);

                let mut next = route.clone();
                next.push(caller);
                if self.is_entry_point(caller) {
                    next.reverse();
                    routes.push(next);
                } else {
                    queue.push_back(next);
                }
            }
        }

        routes
    }

    /// Paths for one pair (empty when no entry point reaches the caller)
    pub fn paths_for_pair(&self, pair: &CallPair, counter: &dyn CallSiteCounter) -> Vec<ThirdPartyPath> {
        let (caller, target) = match (self.graph.node(&pair.caller), self.graph.node(&pair.target)) {
            (Some(c), Some(t)) => (c, t),
            _ => return Vec::new(),
        };

        let call_count = counter
            .count_call_sites(&pair.caller, &pair.target)
            .filter(|&n| n > 0)
            .unwrap_or(1);

        let routes = if self.is_entry_point(caller) {
            vec![vec![caller]]
        } else {
            self.nearest_public_routes(caller)
        };

        routes
            .into_iter()
            .filter_map(|mut route| {
                route.push(target);
                let methods = route
                    .into_iter()
                    .map(|idx| self.graph.method(idx).clone())
                    .collect();
                ThirdPartyPath::new(methods, call_count)
            })
            .collect()
    }

    /// Paths for every pair, in pair order
    pub fn find_paths(&self, pairs: &[CallPair], counter: &dyn CallSiteCounter) -> Vec<ThirdPartyPath> {
        let mut paths = Vec::new();
        let mut unreachable = 0usize;
        for pair in pairs {
            let found = self.paths_for_pair(pair, counter);
            if found.is_empty() {
                unreachable += 1;
                trace!("No public method reaches {}", pair.caller);
            }
            debug!(
                "{} -> {}: {} path(s)",
                pair.caller,
                pair.target,
                found.len()
            );
            paths.extend(found);
        }
        info!(
            "Found {} third-party paths ({} pairs unreachable from public methods)",
            paths.len(),
            unreachable
        );
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn m(name: &str) -> MethodSignature {
        MethodSignature::new("com.acme.App", name, vec![], "void")
    }

    fn lib(name: &str) -> MethodSignature {
        MethodSignature::new("org.lib.Client", name, vec![], "void")
    }

    fn is_lib(method: &MethodSignature) -> bool {
        method.declaring_type.starts_with("org.lib")
    }

    fn names(path: &ThirdPartyPath) -> Vec<String> {
        path.path.iter().map(|m| m.name.clone()).collect()
    }

    fn run(edges: &[(MethodSignature, MethodSignature)], public: &[MethodSignature]) -> Vec<ThirdPartyPath> {
        let mut graph = CallGraph::new();
        for (from, to) in edges {
            graph.add_call(from, to.clone(), None);
        }
        let entries: EntryPointSet = public.iter().cloned().collect();
        let predicate = is_lib;
        let engine = ReachabilityEngine::new(&graph, &entries, &predicate);
        let scan = engine.scan_third_party_calls();
        engine.find_paths(&scan.pairs, &SingleCallSite)
    }

    #[test]
    fn test_direct_public_caller() {
        let paths = run(&[(m("a"), lib("execute"))], &[m("a")]);
        assert_eq!(paths.len(), 1);
        assert_eq!(names(&paths[0]), vec!["a", "execute"]);
        assert_eq!(paths[0].entry_point, m("a"));
        assert_eq!(paths[0].direct_caller, m("a"));
    }

    #[test]
    fn test_private_helper_path() {
        let paths = run(&[(m("a"), m("b")), (m("b"), lib("execute"))], &[m("a")]);
        assert_eq!(paths.len(), 1);
        assert_eq!(names(&paths[0]), vec!["a", "b", "execute"]);
        assert_eq!(paths[0].direct_caller, m("b"));
    }

    #[test]
    fn test_two_entry_points_share_caller() {
        let paths = run(
            &[(m("a1"), m("b")), (m("a2"), m("b")), (m("b"), lib("execute"))],
            &[m("a1"), m("a2")],
        );
        assert_eq!(paths.len(), 2);
        for p in &paths {
            assert_eq!(p.direct_caller, m("b"));
            assert_eq!(p.third_party_method, lib("execute"));
        }
        let entries: HashSet<_> = paths.iter().map(|p| p.entry_point.name.clone()).collect();
        assert_eq!(entries, ["a1", "a2"].iter().map(|s| s.to_string()).collect());
    }

    #[test]
    fn test_self_recursion_terminates() {
        let with_loop = run(
            &[(m("a"), m("b")), (m("b"), m("b")), (m("b"), lib("execute"))],
            &[m("a")],
        );
        let without = run(&[(m("a"), m("b")), (m("b"), lib("execute"))], &[m("a")]);
        assert_eq!(with_loop, without);
    }

    #[test]
    fn test_nearest_entry_point_stops_expansion() {
        // outer -> a -> b -> lib: `a` is public, so `outer` is never reached
        let paths = run(
            &[(m("outer"), m("a")), (m("a"), m("b")), (m("b"), lib("execute"))],
            &[m("outer"), m("a")],
        );
        assert_eq!(paths.len(), 1);
        assert_eq!(names(&paths[0]), vec!["a", "b", "execute"]);
    }

    #[test]
    fn test_paths_never_route_through_third_party() {
        // a -> lib.callback -> b -> lib.execute must not produce a path via the library
        let paths = run(
            &[(m("a"), lib("callback")), (lib("callback"), m("b")), (m("b"), lib("execute"))],
            &[m("a")],
        );
        assert_eq!(paths.len(), 1);
        assert_eq!(names(&paths[0]), vec!["a", "callback"]);
    }

    #[test]
    fn test_scan_skips_noise_and_counts_multiplicity() {
        let mut graph = CallGraph::new();
        graph.add_call(&m("a"), lib("execute"), Some(10));
        graph.add_call(&m("a"), lib("execute"), Some(12));
        graph.add_call(&m("b"), lib("execute"), Some(20));
        graph.add_call(&m("b"), lib("iterator"), Some(21));
        let entries = EntryPointSet::new();
        let predicate = is_lib;
        let engine = ReachabilityEngine::new(&graph, &entries, &predicate);
        let scan = engine.scan_third_party_calls();

        assert_eq!(scan.pairs.len(), 2);
        assert!(scan.pairs.iter().all(|p| p.target.name == "execute"));
        assert_eq!(scan.multiplicity.count("com.acme.App", &lib("execute")), 3);
        assert_eq!(scan.multiplicity.count("com.acme.Other", &lib("execute")), 0);
        assert_eq!(scan.package_counts.get("org.lib"), Some(&2));
    }

    #[test]
    fn test_call_counter_is_used() {
        let mut graph = CallGraph::new();
        graph.add_call(&m("a"), lib("execute"), None);
        let entries: EntryPointSet = [m("a")].into_iter().collect();
        let predicate = is_lib;
        let engine = ReachabilityEngine::new(&graph, &entries, &predicate);
        let pair = CallPair::new(m("a"), lib("execute"));
        let counter = |_: &MethodSignature, _: &MethodSignature| Some(3);
        assert_eq!(engine.paths_for_pair(&pair, &counter)[0].call_count, 3);
        let zero = |_: &MethodSignature, _: &MethodSignature| Some(0);
        assert_eq!(engine.paths_for_pair(&pair, &zero)[0].call_count, 1);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn node(i: usize, lib_nodes: usize) -> MethodSignature {
            if i < lib_nodes {
                lib(&format!("l{}", i))
            } else {
                m(&format!("n{}", i))
            }
        }

        proptest! {
            #[test]
            fn test_paths_are_simple_and_end_in_third_party(
                edges in proptest::collection::vec((0usize..12, 0usize..12), 0..40),
                public in proptest::collection::vec(0usize..12, 0..6),
            ) {
                let lib_nodes = 3;
                let edges: Vec<_> = edges
                    .into_iter()
                    .map(|(a, b)| (node(a, lib_nodes), node(b, lib_nodes)))
                    .collect();
                let public: Vec<_> = public.into_iter().map(|i| node(i, lib_nodes)).collect();
                for path in run(&edges, &public) {
                    let unique: HashSet<_> = path.path.iter().collect();
                    prop_assert_eq!(unique.len(), path.path.len());
                    let last = path.path.len() - 1;
                    for (i, method) in path.path.iter().enumerate() {
                        prop_assert_eq!(is_lib(method), i == last);
                    }
                    prop_assert!(public.contains(&path.entry_point));
                }
            }
        }
    }
}
