// apireach: public API to third-party call path finder
//
// Builds a call graph of a Java project, finds the routes from public
// methods to third-party library calls, drops calls the test suite already
// covers and slices each method on a route down to what leads to the call.

pub mod classify;
pub mod cli;
pub mod config;
pub mod coverage;
pub mod error;
pub mod graph;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod reach;
pub mod report;
pub mod session;
pub mod slice;
pub mod source;

pub use config::AnalysisConfig;
pub use error::{AnalysisError, AnalysisResult};
pub use model::{MethodSignature, ThirdPartyPath};
pub use session::AnalysisSession;
