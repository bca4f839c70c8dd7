//! Call graph loaded from a JSON dump
//!
//! Lets a bytecode-level tool supply the call graph while the Java source
//! model is still used for slicing. Format:
//!
//! ```json
//! { "methods": [ { "class": "com.acme.Api", "name": "run", "params": ["int"],
//!                  "returns": "void", "public": true,
//!                  "calls": [ { "class": "org.lib.Client", "name": "execute",
//!                               "params": [], "returns": "void", "line": 12 } ] } ] }
//! ```

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::info;

use super::{CallGraphProvider, CallSite, EntryPointSet};
use crate::error::{AnalysisError, AnalysisResult};
use crate::model::MethodSignature;

#[derive(Debug, Deserialize)]
struct DumpFile {
    methods: Vec<DumpMethod>,
}

#[derive(Debug, Deserialize)]
struct DumpMethod {
    class: String,
    name: String,
    #[serde(default)]
    params: Vec<String>,
    #[serde(default = "default_return")]
    returns: String,
    #[serde(default)]
    public: bool,
    #[serde(default)]
    calls: Vec<DumpCall>,
}

#[derive(Debug, Deserialize)]
struct DumpCall {
    class: String,
    name: String,
    #[serde(default)]
    params: Vec<String>,
    #[serde(default = "default_return")]
    returns: String,
    #[serde(default)]
    line: Option<usize>,
}

fn default_return() -> String {
    "void".to_string()
}

/// [`CallGraphProvider`] backed by a dumped call graph
#[derive(Debug, Clone, Default)]
pub struct CallGraphDump {
    calls: BTreeMap<MethodSignature, Vec<CallSite>>,
    public: BTreeSet<MethodSignature>,
}

impl CallGraphDump {
    pub fn load(path: &Path) -> AnalysisResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| AnalysisError::io(path, e))?;
        let dump = Self::from_json(&text).map_err(|e| match e {
            AnalysisError::Parse { message, .. } => AnalysisError::parse(path, message),
            other => other,
        })?;
        info!(
            "Loaded call graph dump with {} methods from {}",
            dump.calls.len(),
            path.display()
        );
        Ok(dump)
    }

    pub fn from_json(text: &str) -> AnalysisResult<Self> {
        let file: DumpFile = serde_json::from_str(text)
            .map_err(|e| AnalysisError::parse("<call graph dump>", e.to_string()))?;
        if file.methods.is_empty() {
            return Err(AnalysisError::GraphBuild(
                "call graph dump contains no methods".to_string(),
            ));
        }

        let mut dump = Self::default();
        for method in file.methods {
            let sig = MethodSignature::new(method.class, method.name, method.params, method.returns);
            if method.public {
                dump.public.insert(sig.clone());
            }
            let sites = method
                .calls
                .into_iter()
                .map(|c| {
                    CallSite::new(
                        MethodSignature::new(c.class, c.name, c.params, c.returns),
                        c.line,
                    )
                })
                .collect::<Vec<_>>();
            dump.calls.entry(sig).or_default().extend(sites);
        }
        Ok(dump)
    }
}

impl CallGraphProvider for CallGraphDump {
    fn all_method_signatures(&self) -> BTreeSet<MethodSignature> {
        let mut all: BTreeSet<MethodSignature> = self.calls.keys().cloned().collect();
        for sites in self.calls.values() {
            all.extend(sites.iter().map(|s| s.target.clone()));
        }
        all
    }

    fn calls_from(&self, method: &MethodSignature) -> Vec<CallSite> {
        self.calls.get(method).cloned().unwrap_or_default()
    }

    fn entry_points(&self) -> EntryPointSet {
        self.public.iter().cloned().collect()
    }
}
