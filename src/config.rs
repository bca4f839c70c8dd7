//! Run configuration
//!
//! Built by the CLI, validated once, then handed to the pipeline.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::reach::DEFAULT_STATS_DEPTH;

/// Report file prefix when neither the CLI nor the environment sets one
pub const DEFAULT_REPORT_PREFIX: &str = "third_party_apis";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{what} not found: {}", path.display())]
    Missing { what: &'static str, path: PathBuf },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    /// Package prefix of the analyzed project, never third-party
    pub project_package: String,
    /// JSON map of package → dependency coordinates
    pub package_map: PathBuf,
    /// Extra ignore prefixes, one per line
    pub ignore_file: Option<PathBuf>,
    /// Root of the project's Java sources
    pub source_root: PathBuf,
    /// Call graph supplied by an external tool instead of the source model
    pub call_graph: Option<PathBuf>,
    /// JaCoCo report directories; empty disables the coverage filter
    pub coverage_roots: Vec<PathBuf>,
    pub output_dir: PathBuf,
    pub report_prefix: String,
    /// Write `path-stats.json`
    pub stats: bool,
    pub stats_depth: usize,
    /// Write `coverage.json`
    pub coverage_log: bool,
}

impl AnalysisConfig {
    pub fn new(
        project_package: impl Into<String>,
        package_map: impl Into<PathBuf>,
        source_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            project_package: project_package.into(),
            package_map: package_map.into(),
            ignore_file: None,
            source_root: source_root.into(),
            call_graph: None,
            coverage_roots: Vec::new(),
            output_dir: PathBuf::from("."),
            report_prefix: DEFAULT_REPORT_PREFIX.to_string(),
            stats: false,
            stats_depth: DEFAULT_STATS_DEPTH,
            coverage_log: false,
        }
    }

    pub fn ignore_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ignore_file = Some(path.into());
        self
    }

    pub fn call_graph(mut self, path: impl Into<PathBuf>) -> Self {
        self.call_graph = Some(path.into());
        self
    }

    pub fn coverage_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.coverage_roots = roots;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn report_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.report_prefix = prefix.into();
        self
    }

    pub fn stats(mut self, enabled: bool, depth: usize) -> Self {
        self.stats = enabled;
        self.stats_depth = depth;
        self
    }

    pub fn coverage_log(mut self, enabled: bool) -> Self {
        self.coverage_log = enabled;
        self
    }

    /// Check that every input exists before any work starts
    pub fn validate(&self) -> ConfigResult<()> {
        require_file("package map", &self.package_map)?;
        if let Some(ignore) = &self.ignore_file {
            require_file("ignore file", ignore)?;
        }
        if let Some(dump) = &self.call_graph {
            require_file("call graph dump", dump)?;
        }
        if !self.source_root.is_dir() {
            return Err(ConfigError::Missing {
                what: "source root",
                path: self.source_root.clone(),
            });
        }
        for root in &self.coverage_roots {
            if !root.is_dir() {
                return Err(ConfigError::Missing {
                    what: "coverage root",
                    path: root.clone(),
                });
            }
        }
        if self.report_prefix.trim().is_empty() || self.report_prefix.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "report prefix '{}' must be a plain file name prefix",
                self.report_prefix
            )));
        }
        Ok(())
    }

    pub fn full_methods_report(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_full_methods.json", self.report_prefix))
    }

    pub fn call_pairs_report(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_call_pairs.json", self.report_prefix))
    }

    pub fn stats_report(&self) -> PathBuf {
        self.output_dir.join("path-stats.json")
    }

    pub fn coverage_report(&self) -> PathBuf {
        self.output_dir.join("coverage.json")
    }
}

fn require_file(what: &'static str, path: &Path) -> ConfigResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(ConfigError::Missing {
            what,
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, AnalysisConfig) {
        let dir = TempDir::new().unwrap();
        let map = dir.path().join("packages.json");
        std::fs::write(&map, "{}").unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir(&src).unwrap();
        let config = AnalysisConfig::new("com.acme", map, src).output_dir(dir.path());
        (dir, config)
    }

    #[test]
    fn test_valid_config() {
        let (_dir, config) = fixture();
        assert!(config.validate().is_ok());
        assert!(config
            .full_methods_report()
            .ends_with("third_party_apis_full_methods.json"));
    }

    #[test]
    fn test_missing_inputs() {
        let (dir, config) = fixture();
        let err = config
            .clone()
            .coverage_roots(vec![dir.path().join("jacoco")])
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing { what: "coverage root", .. }));

        let err = config
            .clone()
            .call_graph(dir.path().join("graph.json"))
            .validate()
            .unwrap_err();
        assert!(err.to_string().starts_with("call graph dump not found"));

        let mut no_src = config;
        no_src.source_root = dir.path().join("nowhere");
        assert!(no_src.validate().is_err());
    }

    #[test]
    fn test_report_prefix_must_be_a_name() {
        let (_dir, config) = fixture();
        assert!(matches!(
            config.report_prefix("out/x").validate(),
            Err(ConfigError::Invalid(_))
        ));
    }
}
