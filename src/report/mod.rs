//! JSON reports written at the end of a run

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::model::{MethodSignature, PathStats, ThirdPartyPath};
use crate::reach::CallScan;

/// Packages listed in the all-pairs report
pub const TOP_PACKAGES: usize = 10;

/// One emitted path with everything a test generator needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathRecord {
    pub entry_point: String,
    pub third_party_method: String,
    /// `group:artifact:version` providing the target, when known
    pub third_party_package: Option<String>,
    pub path: Vec<String>,
    /// Full body of every project method on the path, in path order
    pub method_sources: Vec<String>,
    /// Each project method sliced toward its successor on the path
    pub method_slices: Vec<String>,
    pub condition_count: usize,
    pub call_count: usize,
    pub path_id: String,
}

impl PathRecord {
    pub fn new(
        path: &ThirdPartyPath,
        dependency: Option<String>,
        method_sources: Vec<String>,
        method_slices: Vec<String>,
        condition_count: usize,
    ) -> Self {
        Self {
            entry_point: path.entry_point.display_name(),
            third_party_method: path.third_party_method.display_name(),
            third_party_package: dependency,
            path: path.path.iter().map(MethodSignature::display_name).collect(),
            method_sources,
            method_slices,
            condition_count,
            call_count: path.call_count,
            path_id: path.path_id.clone(),
        }
    }
}

/// Fewest conditions first, then shortest path; ties keep discovery order
pub fn sort_records(records: &mut [PathRecord]) {
    records.sort_by_key(|r| (r.condition_count, r.path.len()));
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FullMethodsReport<'a> {
    full_methods_paths: &'a [PathRecord],
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairEntry {
    pub caller: String,
    pub third_party_method: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageCount {
    pub package: String,
    pub pairs: usize,
}

/// Every project → third-party pair, reachable from public API or not
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallPairsReport {
    pub total_unique_pairs: usize,
    pub call_pairs: Vec<PairEntry>,
    pub top_packages: Vec<PackageCount>,
}

impl CallPairsReport {
    pub fn from_scan(scan: &CallScan) -> Self {
        let mut call_pairs: Vec<PairEntry> = scan
            .pairs
            .iter()
            .map(|p| PairEntry {
                caller: p.caller.display_name(),
                third_party_method: p.target.display_name(),
            })
            .collect();
        call_pairs.sort();

        Self {
            total_unique_pairs: scan.pairs.len(),
            call_pairs,
            top_packages: top_packages(&scan.package_counts, TOP_PACKAGES),
        }
    }
}

/// Highest counts first, package name breaking ties
fn top_packages(counts: &BTreeMap<String, usize>, limit: usize) -> Vec<PackageCount> {
    let mut ranked: Vec<PackageCount> = counts
        .iter()
        .map(|(package, pairs)| PackageCount {
            package: package.clone(),
            pairs: *pairs,
        })
        .collect();
    ranked.sort_by(|a, b| b.pairs.cmp(&a.pairs).then_with(|| a.package.cmp(&b.package)));
    ranked.truncate(limit);
    ranked
}

/// Pretty-printed JSON, parent directories created as needed
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value).context("Failed to serialize report")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn write_full_methods(path: &Path, records: &[PathRecord]) -> Result<()> {
    write_json(
        path,
        &FullMethodsReport {
            full_methods_paths: records,
        },
    )?;
    info!("Wrote {} paths to {}", records.len(), path.display());
    Ok(())
}

pub fn write_call_pairs(path: &Path, report: &CallPairsReport) -> Result<()> {
    write_json(path, report)?;
    info!(
        "Wrote {} unique third-party call pairs to {}",
        report.total_unique_pairs,
        path.display()
    );
    Ok(())
}

pub fn write_path_stats(path: &Path, stats: &[PathStats]) -> Result<()> {
    write_json(path, stats)?;
    info!("Wrote statistics for {} routes to {}", stats.len(), path.display());
    Ok(())
}
