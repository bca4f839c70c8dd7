//! Backward program slicer
//!
//! Given a method and the call it must reach, keeps the statements that
//! call the target, the statements defining variables those calls read,
//! and every branching statement before them. Control statements are kept
//! unconditionally; this over-approximates control dependence on purpose.

pub mod render;

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::AnalysisResult;
use crate::model::MethodSignature;
use crate::session::AnalysisSession;
use crate::source::ast::{walk_stmts, Stmt, StmtKind};
use crate::source::matcher::CallMatcher;
use crate::source::metrics::{count_call_sites, count_conditions};
use crate::source::{MethodBody, SourceModelProvider};
use render::render_slice;

/// Sliced (or full, on fallback) text of one method toward one call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
    pub method: MethodSignature,
    pub target: MethodSignature,
    pub text: String,
    /// The slice could not be computed and `text` is the whole body
    /// (or empty when no body exists)
    pub fallback: bool,
}

impl Slice {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Where a statement sits: its parent statement (None at the top level),
/// which of the parent's blocks, and the position inside that block
#[derive(Debug, Clone, Copy)]
struct Location {
    parent: Option<usize>,
    block: usize,
    pos: usize,
}

struct TreeIndex<'b> {
    top: &'b [Stmt],
    stmts: HashMap<usize, &'b Stmt>,
    locations: HashMap<usize, Location>,
}

impl<'b> TreeIndex<'b> {
    fn build(top: &'b [Stmt]) -> Self {
        let mut index = TreeIndex {
            top,
            stmts: HashMap::new(),
            locations: HashMap::new(),
        };
        index.add(top, None, 0);
        index
    }

    fn add(&mut self, stmts: &'b [Stmt], parent: Option<usize>, block: usize) {
        for (pos, stmt) in stmts.iter().enumerate() {
            self.stmts.insert(stmt.id, stmt);
            self.locations.insert(stmt.id, Location { parent, block, pos });
            for (i, nested) in stmt.blocks.iter().enumerate() {
                self.add(&nested.stmts, Some(stmt.id), i);
            }
        }
    }

    fn siblings(&self, location: Location) -> &'b [Stmt] {
        match location.parent {
            None => self.top,
            Some(parent) => self
                .stmts
                .get(&parent)
                .and_then(|p| p.blocks.get(location.block))
                .map(|b| b.stmts.as_slice())
                .unwrap_or(&[]),
        }
    }
}

/// Whether a predecessor statement joins the slice; grows `relevant`
fn is_relevant(stmt: &Stmt, relevant: &mut BTreeSet<String>) -> bool {
    let joins = match stmt.kind {
        StmtKind::LocalDecl => stmt.declares.iter().any(|l| relevant.contains(&l.name)),
        StmtKind::Assign => stmt.assigned.as_ref().is_some_and(|v| relevant.contains(v)),
        kind if kind.is_control() => true,
        _ => !stmt.blocks.is_empty() && defines_nested(stmt, relevant),
    };
    if joins {
        relevant.extend(stmt.header_refs());
    }
    joins
}

fn defines(stmt: &Stmt, relevant: &BTreeSet<String>) -> bool {
    stmt.defined_vars().into_iter().any(|v| relevant.contains(v))
}

fn defines_nested(stmt: &Stmt, relevant: &BTreeSet<String>) -> bool {
    let mut found = false;
    for block in &stmt.blocks {
        walk_stmts(&block.stmts, &mut |s| {
            if !found && defines(s, relevant) {
                found = true;
            }
        });
    }
    found
}

/// Ids of the statements to keep, ancestors included; `None` when the body
/// never calls the target
fn backward_slice(body: &MethodBody, matcher: &CallMatcher<'_>) -> Option<HashSet<usize>> {
    let index = TreeIndex::build(&body.statements);
    let mut selected: HashSet<usize> = HashSet::new();
    let mut relevant: BTreeSet<String> = BTreeSet::new();
    let mut worklist: VecDeque<usize> = VecDeque::new();

    walk_stmts(&body.statements, &mut |stmt| {
        if !matcher.in_header(stmt) {
            return;
        }
        selected.insert(stmt.id);
        worklist.push_back(stmt.id);
        for expr in &stmt.exprs {
            expr.walk(&mut |e| {
                if matcher.matches(e) {
                    e.variable_refs(&mut relevant);
                }
            });
        }
    });
    if selected.is_empty() {
        return None;
    }

    let mut visited = HashSet::new();
    while let Some(id) = worklist.pop_front() {
        if !visited.insert(id) {
            continue;
        }
        let Some(location) = index.locations.get(&id).copied() else {
            continue;
        };

        for pred in index.siblings(location)[..location.pos].iter().rev() {
            if selected.contains(&pred.id) || !is_relevant(pred, &mut relevant) {
                continue;
            }
            selected.insert(pred.id);
            worklist.push_back(pred.id);
            // definitions nested in a kept compound statement
            for block in &pred.blocks {
                walk_stmts(&block.stmts, &mut |s| {
                    if defines(s, &relevant) && selected.insert(s.id) {
                        worklist.push_back(s.id);
                    }
                });
            }
        }

        if let Some(parent) = location.parent {
            if let Some(stmt) = index.stmts.get(&parent) {
                relevant.extend(stmt.header_refs());
            }
            selected.insert(parent);
            worklist.push_back(parent);
        }
    }
    trace!("Slice keeps {} statements, relevant vars {:?}", selected.len(), relevant);
    Some(selected)
}

/// Slices methods against a source model, memoized in the session
pub struct Slicer<'a> {
    model: &'a dyn SourceModelProvider,
    session: &'a AnalysisSession,
}

impl<'a> Slicer<'a> {
    pub fn new(model: &'a dyn SourceModelProvider, session: &'a AnalysisSession) -> Self {
        Self { model, session }
    }

    /// Slice of `method` toward its call to `target`
    pub fn slice(&self, method: &MethodSignature, target: &MethodSignature) -> Arc<Slice> {
        let key = (method.clone(), target.clone());
        let cached = self.session.slices.get(&key).map(|s| Arc::clone(&s));
        if let Some(hit) = cached {
            trace!("Slice cache hit for {} -> {}", method, target);
            return hit;
        }
        let slice = Arc::new(self.compute(method, target));
        if slice.fallback {
            self.session.record_slice_fallback();
        }
        self.session.slices.insert(key, Arc::clone(&slice));
        slice
    }

    /// One slice per step of a path: each method toward its successor
    pub fn slice_path(&self, path: &[MethodSignature]) -> Vec<Arc<Slice>> {
        path.windows(2)
            .map(|step| self.slice(&step[0], &step[1]))
            .collect()
    }

    /// Full source of a method, `None` when the model has no body for it
    pub fn full_body(&self, method: &MethodSignature) -> Option<String> {
        match self.model.method_body(method) {
            Ok(body) => Some(body.source.clone()),
            Err(e) => {
                debug!("No source for {}: {}", method, e);
                None
            }
        }
    }

    /// Static call sites of `target` in `method`, 1 when unknown
    pub fn call_count(&self, method: &MethodSignature, target: &MethodSignature) -> usize {
        let key = (method.clone(), target.clone());
        if let Some(count) = self.session.call_counts.get(&key).map(|c| *c) {
            return count;
        }
        let count = match self.model.method_body(method) {
            Ok(body) => count_call_sites(&body, target, self.model).max(1),
            Err(_) => 1,
        };
        self.session.call_counts.insert(key, count);
        count
    }

    /// Branching constructs in a method body, 0 when unknown
    pub fn condition_count(&self, method: &MethodSignature) -> usize {
        if let Some(count) = self.session.conditions.get(method).map(|c| *c) {
            return count;
        }
        let count = self
            .model
            .method_body(method)
            .map(|body| count_conditions(&body))
            .unwrap_or(0);
        self.session.conditions.insert(method.clone(), count);
        count
    }

    fn compute(&self, method: &MethodSignature, target: &MethodSignature) -> Slice {
        let fallback = |text: String| Slice {
            method: method.clone(),
            target: target.clone(),
            text,
            fallback: true,
        };

        let body = match self.model.method_body(method) {
            Ok(body) => body,
            Err(e) => {
                debug!("Cannot slice {}: {}", method, e);
                return fallback(String::new());
            }
        };
        if body.statements.is_empty() {
            debug!("{} has no statements, using the full body", method);
            return fallback(body.source.clone());
        }

        match self.try_slice(&body, target) {
            Ok(Some(text)) => Slice {
                method: method.clone(),
                target: target.clone(),
                text,
                fallback: false,
            },
            Ok(None) => {
                debug!("No call to {} found in {}, using the full body", target, method);
                fallback(body.source.clone())
            }
            Err(e) => {
                debug!("Failed to slice {}: {}, using the full body", method, e);
                fallback(body.source.clone())
            }
        }
    }

    fn try_slice(&self, body: &MethodBody, target: &MethodSignature) -> AnalysisResult<Option<String>> {
        let matcher = CallMatcher::new(target, self.model);
        match backward_slice(body, &matcher) {
            Some(keep) => render_slice(body, &keep).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::JavaProject;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts body lookups on the wrapped model
    struct Counting {
        inner: JavaProject,
        lookups: AtomicUsize,
    }

    impl SourceModelProvider for Counting {
        fn method_body(&self, method: &MethodSignature) -> AnalysisResult<Arc<MethodBody>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.method_body(method)
        }

        fn is_subtype(&self, sub: &str, sup: &str) -> bool {
            self.inner.is_subtype(sub, sup)
        }
    }

    const SOURCE: &str = r#"package com.acme;

public class Flow {
    public void run() {
        int x = 1;
        log();
        if (x > 0) {
            target(x);
        }
    }

    public void chain(String raw) {
        String unused = raw.trim();
        String name = raw.toLowerCase();
        int n = name.length();
        name = name + n;
        helper(name);
        log();
    }

    public void twice(int a, int b) {
        int first = a;
        int second = b;
        int other = 3;
        target(first);
        for (int i = 0; i < other; i++) {
            log();
        }
        target(second);
    }

    public void nested(boolean flag) {
        String value = null;
        try {
            value = load();
        } finally {
            log();
        }
        helper(value);
    }

    public void silent() {
        log();
    }

    void target(int x) {}
    void helper(String s) {}
    String load() { return ""; }
    void log() {}
}
"#;

    fn sig(s: &str) -> MethodSignature {
        s.parse().unwrap()
    }

    fn project() -> JavaProject {
        JavaProject::from_sources(&[("Flow.java", SOURCE)]).unwrap()
    }

    #[test]
    fn test_slice_keeps_definitions_and_control() {
        let project = project();
        let session = AnalysisSession::new();
        let slicer = Slicer::new(&project, &session);
        let slice = slicer.slice(&sig("com.acme.Flow.run()"), &sig("com.acme.Flow.target(int)"));
        assert!(!slice.fallback);
        assert_eq!(
            slice.text,
            "public void run() {\n    int x = 1;\n    if (x > 0) {\n        target(x);\n    }\n}"
        );
    }

    #[test]
    fn test_slice_follows_data_dependencies() {
        let project = project();
        let session = AnalysisSession::new();
        let slicer = Slicer::new(&project, &session);
        let slice = slicer.slice(
            &sig("com.acme.Flow.chain(java.lang.String)"),
            &sig("com.acme.Flow.helper(java.lang.String)"),
        );
        assert_eq!(
            slice.text,
            "public void chain(String raw) {\n    String name = raw.toLowerCase();\n    int n = name.length();\n    name = name + n;\n    helper(name);\n}"
        );
    }

    #[test]
    fn test_multiple_occurrences_are_unioned_in_order() {
        let project = project();
        let session = AnalysisSession::new();
        let slicer = Slicer::new(&project, &session);
        let slice = slicer.slice(&sig("com.acme.Flow.twice(int, int)"), &sig("com.acme.Flow.target(int)"));
        assert_eq!(
            slice.text,
            "public void twice(int a, int b) {\n    int first = a;\n    int second = b;\n    int other = 3;\n    target(first);\n    for (int i = 0; i < other; i++) {\n    }\n    target(second);\n}"
        );
        assert_eq!(slicer.call_count(&sig("com.acme.Flow.twice(int, int)"), &sig("com.acme.Flow.target(int)")), 2);
        assert_eq!(slicer.condition_count(&sig("com.acme.Flow.twice(int, int)")), 1);
    }

    #[test]
    fn test_definitions_inside_compound_statements() {
        let project = project();
        let session = AnalysisSession::new();
        let slicer = Slicer::new(&project, &session);
        let slice = slicer.slice(
            &sig("com.acme.Flow.nested(boolean)"),
            &sig("com.acme.Flow.helper(java.lang.String)"),
        );
        assert_eq!(
            slice.text,
            "public void nested(boolean flag) {\n    String value = null;\n    try {\n        value = load();\n    } finally {\n    }\n    helper(value);\n}"
        );
    }

    #[test]
    fn test_fallbacks_are_counted() {
        let project = project();
        let session = AnalysisSession::new();
        let slicer = Slicer::new(&project, &session);

        let missing_call = slicer.slice(&sig("com.acme.Flow.silent()"), &sig("com.acme.Flow.target(int)"));
        assert!(missing_call.fallback);
        assert_eq!(missing_call.text, "public void silent() {\n    log();\n}");

        let missing_method = slicer.slice(&sig("com.acme.Gone.run()"), &sig("com.acme.Flow.target(int)"));
        assert!(missing_method.fallback);
        assert!(missing_method.is_empty());
        assert_eq!(session.slice_fallbacks(), 2);
    }

    #[test]
    fn test_slices_are_cached_per_pair() {
        let model = Counting {
            inner: project(),
            lookups: AtomicUsize::new(0),
        };
        let session = AnalysisSession::new();
        let slicer = Slicer::new(&model, &session);
        let method = sig("com.acme.Flow.run()");
        let target = sig("com.acme.Flow.target(int)");

        let first = slicer.slice(&method, &target);
        let lookups = model.lookups.load(Ordering::SeqCst);
        let second = slicer.slice(&method, &target);
        assert_eq!(first, second);
        assert_eq!(model.lookups.load(Ordering::SeqCst), lookups);
        assert_eq!(session.cached_slices(), 1);

        session.reset();
        slicer.slice(&method, &target);
        assert!(model.lookups.load(Ordering::SeqCst) > lookups);
    }

    #[test]
    fn test_slice_path_steps() {
        let project = project();
        let session = AnalysisSession::new();
        let slicer = Slicer::new(&project, &session);
        let path = vec![sig("com.acme.Flow.run()"), sig("com.acme.Flow.target(int)")];
        let slices = slicer.slice_path(&path);
        assert_eq!(slices.len(), 1);
        assert_eq!(slices[0].method, path[0]);
    }
}
