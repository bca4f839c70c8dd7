//! End-to-end analysis run
//!
//! classifier → call graph → third-party pairs → coverage filter → paths →
//! slices and metrics → sorted records. Only a failure to build the call
//! graph ends the run early, and it still yields an empty result.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::classify::ThirdPartyClassifier;
use crate::config::AnalysisConfig;
use crate::coverage::CoverageFilter;
use crate::error::{AnalysisError, AnalysisResult};
use crate::graph::{CallGraph, CallGraphDump, CallGraphProvider, EntryPointSet};
use crate::model::{MethodSignature, PathStats};
use crate::reach::{CallPair, MultiplicityIndex, ReachabilityEngine};
use crate::report::{self, CallPairsReport, PathRecord};
use crate::session::{AnalysisSession, CoverageDecision};
use crate::slice::{Slice, Slicer};
use crate::source::{JavaProject, MethodBody, SourceModelProvider};

/// Counters describing one run
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub methods: usize,
    pub calls: usize,
    pub entry_points: usize,
    pub call_pairs: usize,
    /// Pairs left after the coverage filter
    pub uncovered_pairs: usize,
    pub paths: usize,
    /// Paths dropped because a method on them had no source
    pub dropped_paths: usize,
    pub slice_fallbacks: usize,
    /// Set when the call graph could not be built
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub records: Vec<PathRecord>,
    pub pairs: CallPairsReport,
    pub stats: Vec<PathStats>,
    pub coverage_log: Vec<CoverageDecision>,
    pub summary: RunSummary,
}

impl Outcome {
    fn empty(graph_error: String) -> Self {
        Self {
            records: Vec::new(),
            pairs: CallPairsReport {
                total_unique_pairs: 0,
                call_pairs: Vec::new(),
                top_packages: Vec::new(),
            },
            stats: Vec::new(),
            coverage_log: Vec::new(),
            summary: RunSummary {
                graph_error: Some(graph_error),
                ..Default::default()
            },
        }
    }
}

/// Source model used when the Java sources cannot be loaded
struct NoSource;

impl SourceModelProvider for NoSource {
    fn method_body(&self, method: &MethodSignature) -> AnalysisResult<Arc<MethodBody>> {
        Err(AnalysisError::NotFound(method.to_string()))
    }

    fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        sub == sup
    }
}

struct Inputs {
    classifier: ThirdPartyClassifier,
    model: Box<dyn SourceModelProvider>,
    graph: CallGraph,
    entries: EntryPointSet,
}

fn load_classifier(config: &AnalysisConfig) -> Result<ThirdPartyClassifier> {
    let mut classifier = ThirdPartyClassifier::new(&config.project_package);
    if let Some(path) = &config.ignore_file {
        classifier = classifier
            .load_ignore_file(path)
            .with_context(|| format!("Failed to read ignore file {}", path.display()))?;
    }
    Ok(classifier.load_package_map(&config.package_map))
}

/// Classifier, source model and call graph; `Err(message)` when no graph
fn load_inputs(config: &AnalysisConfig) -> Result<std::result::Result<Inputs, String>> {
    let classifier = load_classifier(config)?;
    let project = JavaProject::load(&config.source_root);

    let (model, graph, entries): (Box<dyn SourceModelProvider>, CallGraph, EntryPointSet) =
        match &config.call_graph {
            Some(dump_path) => {
                let dump = match CallGraphDump::load(dump_path) {
                    Ok(dump) => dump,
                    Err(e) => return Ok(Err(e.to_string())),
                };
                let model: Box<dyn SourceModelProvider> = match project {
                    Ok(project) => Box::new(project),
                    Err(e) => {
                        warn!("Java sources unavailable, slices cannot be produced: {}", e);
                        Box::new(NoSource)
                    }
                };
                let graph = CallGraph::from_provider(&dump);
                (model, graph, dump.entry_points())
            }
            None => {
                let project = match project {
                    Ok(project) => project,
                    Err(e) => return Ok(Err(e.to_string())),
                };
                let graph = CallGraph::from_provider(&project);
                let entries = project.entry_points();
                let model: Box<dyn SourceModelProvider> = Box::new(project);
                (model, graph, entries)
            }
        };

    if graph.is_empty() {
        return Ok(Err("call graph has no methods".to_string()));
    }
    info!(
        "Call graph: {} methods, {} calls, {} public entry points",
        graph.node_count(),
        graph.edge_count(),
        entries.len()
    );
    Ok(Ok(Inputs {
        classifier,
        model,
        graph,
        entries,
    }))
}

/// Run the full analysis described by `config`
pub fn run(config: &AnalysisConfig, session: &AnalysisSession) -> Result<Outcome> {
    let inputs = match load_inputs(config)? {
        Ok(inputs) => inputs,
        Err(message) => {
            error!("Call graph construction failed: {}", message);
            return Ok(Outcome::empty(message));
        }
    };
    let Inputs {
        classifier,
        model,
        graph,
        entries,
    } = inputs;

    let engine = ReachabilityEngine::new(&graph, &entries, &classifier);
    let scan = engine.scan_third_party_calls();

    let pairs: Vec<CallPair> = if config.coverage_roots.is_empty() {
        scan.pairs.clone()
    } else {
        CoverageFilter::new(&config.coverage_roots, &scan.multiplicity, session)
            .log_decisions(config.coverage_log)
            .filter_uncovered(&scan.pairs)
    };

    let slicer = Slicer::new(model.as_ref(), session);
    let counter = |caller: &MethodSignature, target: &MethodSignature| -> Option<usize> {
        Some(slicer.call_count(caller, target))
    };
    let paths = engine.find_paths(&pairs, &counter);

    let mut records = Vec::with_capacity(paths.len());
    let mut dropped = 0usize;
    for path in &paths {
        let slices = slicer.slice_path(&path.path);
        if slices.iter().any(|s| s.fallback && s.is_empty()) {
            debug!("Dropping path {}: source missing for a method on it", path.path_id);
            dropped += 1;
            continue;
        }
        let sources = path
            .project_methods()
            .iter()
            .map(|m| slicer.full_body(m).unwrap_or_default())
            .collect();
        let conditions = path
            .project_methods()
            .iter()
            .map(|m| slicer.condition_count(m))
            .sum();
        let dependency = classifier.dependency_for(path.third_party_method.package());
        records.push(PathRecord::new(
            path,
            dependency,
            sources,
            slices.iter().map(|s| s.text.clone()).collect(),
            conditions,
        ));
    }
    report::sort_records(&mut records);

    let stats = if config.stats {
        let mut seen = HashSet::new();
        paths
            .iter()
            .filter(|p| seen.insert((p.entry_point.clone(), p.third_party_method.clone())))
            .filter_map(|p| engine.path_stats(&p.entry_point, &p.third_party_method, config.stats_depth))
            .collect()
    } else {
        Vec::new()
    };

    let summary = RunSummary {
        methods: graph.node_count(),
        calls: graph.edge_count(),
        entry_points: entries.len(),
        call_pairs: scan.pairs.len(),
        uncovered_pairs: pairs.len(),
        paths: records.len(),
        dropped_paths: dropped,
        slice_fallbacks: session.slice_fallbacks(),
        graph_error: None,
    };
    info!(
        "Emitting {} paths ({} dropped, {} slice fallbacks)",
        summary.paths, summary.dropped_paths, summary.slice_fallbacks
    );
    if let (Some(first), Some(last)) = (records.first(), records.last()) {
        info!(
            "Simplest path has {} conditions and {} methods, most complex {} and {}",
            first.condition_count,
            first.path.len(),
            last.condition_count,
            last.path.len()
        );
    }

    Ok(Outcome {
        records,
        pairs: CallPairsReport::from_scan(&scan),
        stats,
        coverage_log: if config.coverage_log {
            session.coverage_log()
        } else {
            Vec::new()
        },
        summary,
    })
}

/// Write every report the configuration asks for, returning the files written
pub fn write_reports(config: &AnalysisConfig, outcome: &Outcome) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    let full = config.full_methods_report();
    report::write_full_methods(&full, &outcome.records)?;
    written.push(full);

    let pairs = config.call_pairs_report();
    report::write_call_pairs(&pairs, &outcome.pairs)?;
    written.push(pairs);

    if config.stats {
        let stats = config.stats_report();
        report::write_path_stats(&stats, &outcome.stats)?;
        written.push(stats);
    }
    if config.coverage_log {
        let coverage = config.coverage_report();
        report::write_json(&coverage, &outcome.coverage_log)?;
        written.push(coverage);
    }
    Ok(written)
}

/// All third-party call pairs, reachable or not
pub fn scan_pairs(config: &AnalysisConfig) -> Result<CallPairsReport> {
    match load_inputs(config)? {
        Ok(inputs) => {
            let engine = ReachabilityEngine::new(&inputs.graph, &inputs.entries, &inputs.classifier);
            Ok(CallPairsReport::from_scan(&engine.scan_third_party_calls()))
        }
        Err(message) => anyhow::bail!("Call graph construction failed: {}", message),
    }
}

/// Slice one method of the project under `source_root` toward `target`
pub fn slice_method(source_root: &Path, method: &MethodSignature, target: &MethodSignature) -> Result<Slice> {
    let project = JavaProject::load(source_root)
        .with_context(|| format!("Failed to load Java sources from {}", source_root.display()))?;
    let session = AnalysisSession::new();
    let slice = Slicer::new(&project, &session).slice(method, target);
    Ok((*slice).clone())
}

/// Coverage decision for a single pair with `call_sites` sites in the caller's class
pub fn check_coverage(
    roots: &[PathBuf],
    caller: &MethodSignature,
    target: &MethodSignature,
    call_sites: usize,
) -> CoverageDecision {
    let mut multiplicity = MultiplicityIndex::new();
    for _ in 0..call_sites {
        multiplicity.register(caller, target);
    }
    let session = AnalysisSession::new();
    let filter = CoverageFilter::new(roots, &multiplicity, &session);
    CoverageDecision {
        caller: caller.with_params(),
        third_party_method: target.with_params(),
        covered: filter.is_covered(caller, target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const API: &str = r#"package com.acme;

import org.lib.Client;

public class Api {
    private final Client client;

    public Api(Client client) {
        this.client = client;
    }

    public void send(String body) {
        if (body.isEmpty()) {
            return;
        }
        deliver(body);
    }

    void deliver(String body) {
        String payload = body.trim();
        client.execute(payload);
    }

    public void ping() {
        client.execute("ping");
    }

    private void unused() {
        client.close();
    }
}
"#;

    fn fixture() -> (TempDir, AnalysisConfig) {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src/com/acme");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("Api.java"), API).unwrap();
        let map = dir.path().join("packages.json");
        std::fs::write(&map, r#"{"org.lib": ["org.lib:client:jar:2.1"]}"#).unwrap();
        let config = AnalysisConfig::new("com.acme", map, dir.path().join("src"))
            .output_dir(dir.path().join("out"));
        (dir, config)
    }

    #[test]
    fn test_run_without_coverage() {
        let (_dir, config) = fixture();
        let session = AnalysisSession::new();
        let outcome = run(&config, &session).unwrap();

        // ping → execute, send → deliver → execute; unused() is not public
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.pairs.total_unique_pairs, 3);

        let first = &outcome.records[0];
        assert_eq!(first.entry_point, "com.acme.Api.ping()");
        assert_eq!(first.condition_count, 0);
        assert_eq!(first.third_party_package.as_deref(), Some("org.lib:client:2.1"));

        let second = &outcome.records[1];
        assert_eq!(
            second.path,
            vec![
                "com.acme.Api.send(java.lang.String)".to_string(),
                "com.acme.Api.deliver(java.lang.String)".to_string(),
                "org.lib.Client.execute(java.lang.String)".to_string(),
            ]
        );
        assert_eq!(second.condition_count, 1);
        assert_eq!(second.method_sources.len(), 2);
        assert_eq!(second.method_slices.len(), 2);
        assert!(second.method_slices[0].contains("deliver(body);"));
        assert!(second.method_slices[1].contains("String payload = body.trim();"));
        assert_eq!(outcome.summary.dropped_paths, 0);
        assert!(outcome.summary.graph_error.is_none());
    }

    #[test]
    fn test_graph_failure_yields_empty_outcome() {
        let (dir, mut config) = fixture();
        config.source_root = dir.path().join("empty");
        std::fs::create_dir(&config.source_root).unwrap();
        let outcome = run(&config, &AnalysisSession::new()).unwrap();
        assert!(outcome.records.is_empty());
        assert!(outcome.summary.graph_error.is_some());
    }

    #[test]
    fn test_reports_written() {
        let (_dir, config) = fixture();
        let config = config.stats(true, 5).coverage_log(true);
        let outcome = run(&config, &AnalysisSession::new()).unwrap();
        let written = write_reports(&config, &outcome).unwrap();
        assert_eq!(written.len(), 4);
        for path in &written {
            assert!(path.is_file(), "{} missing", path.display());
        }
        assert_eq!(outcome.stats.len(), 2);
    }

    #[test]
    fn test_slice_method() {
        let (dir, _config) = fixture();
        let slice = slice_method(
            &dir.path().join("src"),
            &"com.acme.Api.deliver(java.lang.String)".parse().unwrap(),
            &"org.lib.Client.execute(java.lang.String)".parse().unwrap(),
        )
        .unwrap();
        assert!(!slice.fallback);
        assert_eq!(
            slice.text,
            "void deliver(String body) {\n    String payload = body.trim();\n    client.execute(payload);\n}"
        );
    }
}
