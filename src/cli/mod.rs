// CLI command definitions

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::DEFAULT_REPORT_PREFIX;
use crate::reach::DEFAULT_STATS_DEPTH;

/// apireach - public API to third-party call path finder
///
/// Finds the routes from a Java project's public methods to the
/// third-party library calls they make, skips calls the test suite already
/// covers, and slices every method on a route down to the statements that
/// lead to the call.
#[derive(Parser, Debug, Clone)]
#[command(name = "apireach")]
#[command(author, version, about)]
pub struct Cli {
    /// Output format
    #[arg(global = true, long, value_enum, default_value_t = OutputFormat::Human)]
    pub output: OutputFormat,

    /// More logging (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(global = true, short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output
    Human,
    /// Compact JSON for programmatic consumption
    Json,
    /// Formatted JSON with indentation
    Pretty,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Find public-API paths to third-party calls and write the reports
    Paths(PathsArgs),

    /// List every project to third-party call pair
    Pairs(PairsArgs),

    /// Slice one method toward one call
    Slice(SliceArgs),

    /// Decide whether one caller's call to a third-party method is covered
    Coverage(CoverageArgs),
}

// ============================================================================
// Arguments
// ============================================================================

/// Inputs shared by the graph-building commands
#[derive(Args, Debug, Clone)]
pub struct ProjectArgs {
    /// Package of the analyzed project (e.g. com.acme)
    #[arg(long)]
    pub package: String,

    /// JSON map of package name to dependency coordinates
    #[arg(long, env = "APIREACH_PACKAGE_MAP")]
    pub package_map: PathBuf,

    /// Root of the project's Java sources
    #[arg(long, env = "APIREACH_SOURCE_ROOT")]
    pub source_root: PathBuf,

    /// Extra ignored package prefixes, one per line
    #[arg(long)]
    pub ignore_file: Option<PathBuf>,

    /// Call graph dump to use instead of the one built from sources
    #[arg(long)]
    pub call_graph: Option<PathBuf>,

    /// Directory for the reports
    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    /// File name prefix of the reports [default: third_party_apis]
    #[arg(long)]
    pub report_prefix: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct PathsArgs {
    #[command(flatten)]
    pub project: ProjectArgs,

    /// JaCoCo report directory (repeatable); covered calls are skipped
    #[arg(long = "coverage-root")]
    pub coverage_roots: Vec<PathBuf>,

    /// Write path-stats.json
    #[arg(long)]
    pub stats: bool,

    /// Maximum route length explored for statistics (0 = default)
    #[arg(long, default_value_t = DEFAULT_STATS_DEPTH)]
    pub stats_depth: usize,

    /// Write coverage.json with every coverage decision
    #[arg(long)]
    pub coverage_log: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PairsArgs {
    #[command(flatten)]
    pub project: ProjectArgs,
}

#[derive(Args, Debug, Clone)]
pub struct SliceArgs {
    /// Root of the project's Java sources
    #[arg(long, env = "APIREACH_SOURCE_ROOT")]
    pub source_root: PathBuf,

    /// Method to slice, as pkg.Class.method(T1, T2)
    #[arg(long)]
    pub method: String,

    /// Called method the slice leads to, as pkg.Class.method(T1, T2)
    #[arg(long)]
    pub target: String,
}

#[derive(Args, Debug, Clone)]
pub struct CoverageArgs {
    /// JaCoCo report directory (repeatable)
    #[arg(long = "coverage-root", required = true)]
    pub coverage_roots: Vec<PathBuf>,

    /// Calling project method, as pkg.Class.method(T1, T2)
    #[arg(long)]
    pub caller: String,

    /// Third-party method, as pkg.Class.method(T1, T2)
    #[arg(long)]
    pub target: String,

    /// Call sites of the target in the caller's class
    #[arg(long, default_value_t = 1)]
    pub call_sites: usize,
}

// ============================================================================
// Utility Functions
// ============================================================================

/// Resolve the report prefix from multiple sources
///
/// Priority: CLI arg > APIREACH_REPORT_PREFIX env var > default "third_party_apis"
pub fn resolve_report_prefix(cli_prefix: Option<String>) -> String {
    match cli_prefix {
        Some(prefix) => prefix,
        None => std::env::var("APIREACH_REPORT_PREFIX")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REPORT_PREFIX.to_string()),
    }
}

// ============================================================================
// Command Handlers
// ============================================================================

pub mod cmds {
    use super::*;
    use crate::config::{AnalysisConfig, ConfigError};
    use crate::model::MethodSignature;
    use crate::output::{self, JsonError, JsonResponse};
    use crate::pipeline;
    use crate::session::AnalysisSession;
    use anyhow::Result;
    use serde::Serialize;

    /// Print `data` in the selected JSON flavour
    fn print_json<T: Serialize>(format: OutputFormat, data: T) {
        let response = JsonResponse::new(data);
        match format {
            OutputFormat::Pretty => println!("{}", response.to_pretty_json()),
            _ => println!("{}", response.to_json()),
        }
    }

    /// Report an error in the selected format and exit
    fn fail(format: OutputFormat, error: JsonError, code: i32) -> ! {
        match format {
            OutputFormat::Human => {
                output::error(&error.message);
                if let Some(hint) = &error.remediation {
                    output::info(&format!("Hint: {}", hint));
                }
            }
            _ => print_json(format, &error),
        }
        std::process::exit(code);
    }

    fn parse_signature(format: OutputFormat, text: &str) -> MethodSignature {
        match text.parse() {
            Ok(sig) => sig,
            Err(_) => fail(format, JsonError::invalid_signature(text), output::EXIT_USAGE),
        }
    }

    fn build_config(args: &ProjectArgs) -> AnalysisConfig {
        let mut config = AnalysisConfig::new(&args.package, &args.package_map, &args.source_root)
            .output_dir(&args.output_dir)
            .report_prefix(resolve_report_prefix(args.report_prefix.clone()));
        if let Some(ignore) = &args.ignore_file {
            config = config.ignore_file(ignore);
        }
        if let Some(dump) = &args.call_graph {
            config = config.call_graph(dump);
        }
        config
    }

    fn validate(format: OutputFormat, config: &AnalysisConfig) {
        match config.validate() {
            Ok(()) => {}
            Err(ConfigError::Missing { what, path }) => fail(
                format,
                JsonError::file_not_found(what, &path.display().to_string()),
                output::EXIT_FILE_NOT_FOUND,
            ),
            Err(e @ ConfigError::Invalid(_)) => fail(
                format,
                JsonError::new("InvalidInput", &e.to_string(), output::E_INVALID_INPUT),
                output::EXIT_VALIDATION,
            ),
        }
    }

    pub fn paths(args: PathsArgs, cli: &Cli) -> Result<()> {
        let config = build_config(&args.project)
            .coverage_roots(args.coverage_roots.clone())
            .stats(args.stats, args.stats_depth)
            .coverage_log(args.coverage_log);
        validate(cli.output, &config);

        let session = AnalysisSession::new();
        let outcome = pipeline::run(&config, &session)?;
        if let Some(message) = &outcome.summary.graph_error {
            fail(
                cli.output,
                JsonError::graph_build(message),
                output::EXIT_ERROR,
            );
        }
        let written = pipeline::write_reports(&config, &outcome)?;

        match cli.output {
            OutputFormat::Human => {
                let s = &outcome.summary;
                output::header("apireach paths");
                println!("  Methods: {} ({} calls)", s.methods, s.calls);
                println!("  Public entry points: {}", s.entry_points);
                println!("  Third-party call pairs: {}", s.call_pairs);
                if !config.coverage_roots.is_empty() {
                    println!("  Not covered by tests: {}", s.uncovered_pairs);
                }
                println!("  Paths: {} ({} dropped without source)", s.paths, s.dropped_paths);
                println!("  Slice fallbacks: {}", s.slice_fallbacks);
                println!();
                for path in &written {
                    output::success(&format!("Wrote {}", path.display()));
                }
            }
            format => print_json(
                format,
                PathsResponse {
                    summary: outcome.summary.clone(),
                    reports: written.iter().map(|p| p.display().to_string()).collect(),
                },
            ),
        }
        Ok(())
    }

    #[derive(Serialize)]
    struct PathsResponse {
        summary: pipeline::RunSummary,
        reports: Vec<String>,
    }

    pub fn pairs(args: PairsArgs, cli: &Cli) -> Result<()> {
        let config = build_config(&args.project);
        validate(cli.output, &config);

        let report = match pipeline::scan_pairs(&config) {
            Ok(report) => report,
            Err(e) => fail(cli.output, JsonError::graph_build(&e.to_string()), output::EXIT_ERROR),
        };
        let path = config.call_pairs_report();
        crate::report::write_call_pairs(&path, &report)?;

        match cli.output {
            OutputFormat::Human => {
                output::header("apireach pairs");
                println!("  Unique third-party call pairs: {}", report.total_unique_pairs);
                if !report.top_packages.is_empty() {
                    println!("  Top third-party packages:");
                    for package in &report.top_packages {
                        println!("    {} - {} unique call pairs", package.package, package.pairs);
                    }
                }
                println!();
                output::success(&format!("Wrote {}", path.display()));
            }
            format => print_json(format, &report),
        }
        Ok(())
    }

    pub fn slice(args: SliceArgs, cli: &Cli) -> Result<()> {
        let method = parse_signature(cli.output, &args.method);
        let target = parse_signature(cli.output, &args.target);
        if !args.source_root.is_dir() {
            fail(
                cli.output,
                JsonError::file_not_found("source root", &args.source_root.display().to_string()),
                output::EXIT_FILE_NOT_FOUND,
            );
        }

        let slice = pipeline::slice_method(&args.source_root, &method, &target)?;
        if slice.fallback && slice.is_empty() {
            fail(cli.output, JsonError::method_not_found(&args.method), output::EXIT_NOT_FOUND);
        }

        match cli.output {
            OutputFormat::Human => {
                if slice.fallback {
                    output::warn(&format!("No call to {} found, showing the full body", args.target));
                }
                println!("{}", slice.text);
            }
            format => print_json(
                format,
                SliceResponse {
                    method: method.display_name(),
                    target: target.display_name(),
                    slice: slice.text,
                    fallback: slice.fallback,
                },
            ),
        }
        Ok(())
    }

    #[derive(Serialize)]
    struct SliceResponse {
        method: String,
        target: String,
        slice: String,
        fallback: bool,
    }

    pub fn coverage(args: CoverageArgs, cli: &Cli) -> Result<()> {
        let caller = parse_signature(cli.output, &args.caller);
        let target = parse_signature(cli.output, &args.target);
        for root in &args.coverage_roots {
            if !root.is_dir() {
                fail(
                    cli.output,
                    JsonError::file_not_found("coverage root", &root.display().to_string()),
                    output::EXIT_FILE_NOT_FOUND,
                );
            }
        }

        let decision = pipeline::check_coverage(&args.coverage_roots, &caller, &target, args.call_sites);
        match cli.output {
            OutputFormat::Human => {
                if decision.covered {
                    output::success(&format!("{} -> {} is covered", decision.caller, decision.third_party_method));
                } else {
                    output::warn(&format!("{} -> {} is not covered", decision.caller, decision.third_party_method));
                }
            }
            format => print_json(format, &decision),
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // Ensure tests don't interfere with each other by clearing env var
    fn clear_env() {
        std::env::remove_var("APIREACH_REPORT_PREFIX");
    }

    // All env cases in one test: the variable is process-wide
    #[test]
    fn test_resolve_report_prefix() {
        clear_env();
        assert_eq!(resolve_report_prefix(None), "third_party_apis");
        assert_eq!(resolve_report_prefix(Some("mine".to_string())), "mine");

        std::env::set_var("APIREACH_REPORT_PREFIX", "from_env");
        assert_eq!(resolve_report_prefix(None), "from_env");
        // CLI arg should override env var
        assert_eq!(resolve_report_prefix(Some("cli".to_string())), "cli");
        clear_env();
    }

    #[test]
    fn test_parse_paths_command() {
        let cli = Cli::try_parse_from([
            "apireach",
            "paths",
            "--package",
            "com.acme",
            "--package-map",
            "map.json",
            "--source-root",
            "src",
            "--coverage-root",
            "a",
            "--coverage-root",
            "b",
            "--stats",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Paths(args) => {
                assert_eq!(args.project.package, "com.acme");
                assert_eq!(args.coverage_roots, vec![PathBuf::from("a"), PathBuf::from("b")]);
                assert!(args.stats);
                assert_eq!(args.stats_depth, DEFAULT_STATS_DEPTH);
                assert!(args.project.report_prefix.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_coverage_requires_root() {
        let result = Cli::try_parse_from([
            "apireach",
            "coverage",
            "--caller",
            "a.A.run()",
            "--target",
            "b.B.go()",
        ]);
        assert!(result.is_err());
    }
}
