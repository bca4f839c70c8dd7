// Error types shared by the analysis components
//
// Per-item failures (a body that cannot be resolved, a report that does not
// parse) are absorbed by the callers and turned into safe defaults. Only
// `GraphBuild` aborts a run.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the analysis library
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A method, type or report could not be located
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed input (source file, coverage report, call graph dump)
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Filesystem failure while reading an input
    #[error("failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The program model could not produce a call graph
    #[error("call graph construction failed: {0}")]
    GraphBuild(String),
}

impl AnalysisError {
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        AnalysisError::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AnalysisError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for "no such thing" results, which callers log at debug
    pub fn is_not_found(&self) -> bool {
        matches!(self, AnalysisError::NotFound(_))
    }
}

/// Result alias used throughout the library
pub type AnalysisResult<T> = Result<T, AnalysisError>;
