//! Analysis session: every cache of one run
//!
//! Components borrow the session instead of keeping process-wide state.
//! Entries become visible to other readers as soon as the writer returns;
//! `reset()` drops everything between independent runs.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::coverage::html::HtmlReport;
use crate::coverage::xml::XmlReport;
use crate::coverage::CallPattern;
use crate::model::MethodSignature;
use crate::slice::Slice;

/// (annotated-source report, caller, target)
pub(crate) type DecisionKey = (PathBuf, MethodSignature, MethodSignature);

/// One logged coverage decision
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageDecision {
    pub caller: String,
    pub third_party_method: String,
    pub covered: bool,
}

#[derive(Debug, Default)]
pub struct AnalysisSession {
    pub(crate) coverage_decisions: DashMap<DecisionKey, bool>,
    pub(crate) html_reports: DashMap<PathBuf, Option<Arc<HtmlReport>>>,
    pub(crate) xml_reports: DashMap<PathBuf, Option<Arc<XmlReport>>>,
    pub(crate) call_lines: DashMap<(PathBuf, CallPattern), Arc<BTreeSet<usize>>>,
    pub(crate) coverage_log: DashMap<(String, String), bool>,
    pub(crate) slices: DashMap<(MethodSignature, MethodSignature), Arc<Slice>>,
    pub(crate) call_counts: DashMap<(MethodSignature, MethodSignature), usize>,
    pub(crate) conditions: DashMap<MethodSignature, usize>,
    slice_fallbacks: AtomicUsize,
}

impl AnalysisSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear every cache and counter
    pub fn reset(&self) {
        self.coverage_decisions.clear();
        self.html_reports.clear();
        self.xml_reports.clear();
        self.call_lines.clear();
        self.coverage_log.clear();
        self.slices.clear();
        self.call_counts.clear();
        self.conditions.clear();
        self.slice_fallbacks.store(0, Ordering::Relaxed);
        debug!("Analysis session caches cleared");
    }

    pub(crate) fn record_slice_fallback(&self) {
        self.slice_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Slices that fell back to the full method body
    pub fn slice_fallbacks(&self) -> usize {
        self.slice_fallbacks.load(Ordering::Relaxed)
    }

    pub fn cached_decisions(&self) -> usize {
        self.coverage_decisions.len()
    }

    pub fn cached_slices(&self) -> usize {
        self.slices.len()
    }

    pub(crate) fn log_decision(&self, caller: &MethodSignature, target: &MethodSignature, covered: bool) {
        self.coverage_log
            .entry((caller.with_params(), target.with_params()))
            .or_insert(covered);
    }

    /// Logged decisions, sorted by caller then target
    pub fn coverage_log(&self) -> Vec<CoverageDecision> {
        let mut entries: Vec<CoverageDecision> = self
            .coverage_log
            .iter()
            .map(|entry| CoverageDecision {
                caller: entry.key().0.clone(),
                third_party_method: entry.key().1.clone(),
                covered: *entry.value(),
            })
            .collect();
        entries.sort();
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_clears_caches_and_counters() {
        let session = AnalysisSession::new();
        let caller: MethodSignature = "com.acme.App.run()".parse().unwrap();
        let target: MethodSignature = "org.lib.Client.send()".parse().unwrap();

        session
            .coverage_decisions
            .insert((PathBuf::from("App.java.html"), caller.clone(), target.clone()), true);
        session.conditions.insert(caller.clone(), 3);
        session.log_decision(&caller, &target, true);
        session.log_decision(&caller, &target, false);
        session.record_slice_fallback();

        assert_eq!(session.cached_decisions(), 1);
        assert_eq!(session.slice_fallbacks(), 1);
        let log = session.coverage_log();
        assert_eq!(log.len(), 1);
        // first decision wins
        assert!(log[0].covered);

        session.reset();
        assert_eq!(session.cached_decisions(), 0);
        assert_eq!(session.slice_fallbacks(), 0);
        assert!(session.coverage_log().is_empty());
        assert!(session.conditions.is_empty());
    }
}
