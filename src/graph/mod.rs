//! Call graph storage and the provider seam
//!
//! Program models implement [`CallGraphProvider`]; the rest of the
//! analysis only ever sees the immutable [`CallGraph`] built from one.

pub mod dump;

pub use dump::CallGraphDump;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::model::MethodSignature;

/// One static call site in a caller's body
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallSite {
    pub target: MethodSignature,
    /// Source line of the invocation, when known
    pub line: Option<usize>,
}

impl CallSite {
    pub fn new(target: MethodSignature, line: Option<usize>) -> Self {
        Self { target, line }
    }
}

/// Supplies the raw call graph of an analyzed program
pub trait CallGraphProvider {
    /// Every method the model knows about (callers and callees)
    fn all_method_signatures(&self) -> BTreeSet<MethodSignature>;

    /// Call sites in a method's body, in source order
    fn calls_from(&self, method: &MethodSignature) -> Vec<CallSite>;

    /// Methods considered public API
    fn entry_points(&self) -> EntryPointSet;
}

/// Methods considered public API for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPointSet {
    methods: HashSet<MethodSignature>,
}

impl EntryPointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, method: &MethodSignature) -> bool {
        self.methods.contains(method)
    }

    pub fn insert(&mut self, method: MethodSignature) -> bool {
        self.methods.insert(method)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MethodSignature> {
        self.methods.iter()
    }
}

impl FromIterator<MethodSignature> for EntryPointSet {
    fn from_iter<I: IntoIterator<Item = MethodSignature>>(iter: I) -> Self {
        Self {
            methods: iter.into_iter().collect(),
        }
    }
}

/// Edge payload: where the call happens in the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CallEdge {
    pub line: Option<usize>,
}

/// Directed multigraph of call sites between methods
///
/// Built once, read-only afterwards. Node indices follow signature order
/// so traversals are deterministic.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    graph: DiGraph<MethodSignature, CallEdge>,
    index: HashMap<MethodSignature, NodeIndex>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from a provider
    pub fn from_provider(provider: &dyn CallGraphProvider) -> Self {
        let mut graph = Self::new();
        let methods = provider.all_method_signatures();
        for method in &methods {
            graph.add_method(method.clone());
        }
        for method in &methods {
            for site in provider.calls_from(method) {
                graph.add_call(method, site.target, site.line);
            }
        }
        graph
    }

    /// Add a node, returning the existing index if already present
    pub fn add_method(&mut self, method: MethodSignature) -> NodeIndex {
        if let Some(&idx) = self.index.get(&method) {
            return idx;
        }
        let idx = self.graph.add_node(method.clone());
        self.index.insert(method, idx);
        idx
    }

    /// Add one call-site edge
    pub fn add_call(&mut self, caller: &MethodSignature, target: MethodSignature, line: Option<usize>) {
        let from = self.add_method(caller.clone());
        let to = self.add_method(target);
        self.graph.add_edge(from, to, CallEdge { line });
    }

    pub fn node(&self, method: &MethodSignature) -> Option<NodeIndex> {
        self.index.get(method).copied()
    }

    pub fn method(&self, idx: NodeIndex) -> &MethodSignature {
        &self.graph[idx]
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    /// All edges as (caller, callee, payload), in insertion order
    pub fn edges(&self) -> impl Iterator<Item = (NodeIndex, NodeIndex, &CallEdge)> + '_ {
        self.graph
            .edge_references()
            .map(|e| (e.source(), e.target(), e.weight()))
    }

    /// Distinct callees of a node, ascending
    pub fn callees(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut callees: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .collect();
        callees.sort();
        callees.dedup();
        callees
    }

    /// Invert the graph once for backward traversal
    pub fn reverse_index(&self) -> ReverseIndex {
        let mut callers: Vec<Vec<NodeIndex>> = vec![Vec::new(); self.graph.node_count()];
        for edge in self.graph.edge_references() {
            callers[edge.target().index()].push(edge.source());
        }
        for list in &mut callers {
            list.sort();
            list.dedup();
        }
        ReverseIndex { callers }
    }

    pub fn inner(&self) -> &DiGraph<MethodSignature, CallEdge> {
        &self.graph
    }
}

/// callee → distinct callers, derived from a [`CallGraph`] in O(E)
#[derive(Debug, Clone, Default)]
pub struct ReverseIndex {
    callers: Vec<Vec<NodeIndex>>,
}

impl ReverseIndex {
    pub fn callers(&self, callee: NodeIndex) -> &[NodeIndex] {
        self.callers
            .get(callee.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
