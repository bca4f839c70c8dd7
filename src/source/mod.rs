//! Source model: method bodies, types and the Java project loader
//!
//! [`SourceModelProvider`] is the narrow interface the slicer and the
//! source metrics use. [`JavaProject`] implements it (and the call graph
//! provider) from a tree of `.java` files.

pub mod ast;
pub mod java;
pub mod matcher;
pub mod metrics;
pub mod resolve;

pub use resolve::JavaProject;

use std::sync::Arc;

use crate::error::AnalysisResult;
use crate::model::MethodSignature;
use ast::Stmt;

/// A method's declaration and statement tree
#[derive(Debug, Clone)]
pub struct MethodBody {
    pub signature: MethodSignature,
    /// Declaration text up to the opening brace, on one line
    pub header: String,
    /// Full method text, dedented
    pub source: String,
    pub line: usize,
    pub statements: Vec<Stmt>,
}

/// Resolves signatures to bodies and answers subtype questions
pub trait SourceModelProvider {
    /// Body of a method, `NotFound` when the model has no source for it
    fn method_body(&self, method: &MethodSignature) -> AnalysisResult<Arc<MethodBody>>;

    /// Whether `sub` is `sup` or one of its subtypes/implementors
    fn is_subtype(&self, sub: &str, sup: &str) -> bool;
}

/// Strip the first `column` columns of indentation from every line but the first
pub fn dedent(text: &str, column: usize) -> String {
    text.lines()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                return line.trim_end().to_string();
            }
            let indent = line
                .chars()
                .take(column)
                .take_while(|c| c.is_whitespace())
                .map(char::len_utf8)
                .sum::<usize>();
            line[indent..].trim_end().to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedent() {
        let text = "void run() {\n        call();\n            nested();\n    }";
        assert_eq!(
            dedent(text, 4),
            "void run() {\n    call();\n        nested();\n}"
        );
        assert_eq!(dedent("x();", 8), "x();");
    }
}
