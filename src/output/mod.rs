// Output formatting utilities

use is_terminal::IsTerminal;

// Colors for terminal output (when supported)
pub const RED: &str = "\x1b[0;31m";
pub const GREEN: &str = "\x1b[0;32m";
pub const YELLOW: &str = "\x1b[1;33m";
pub const MAGENTA: &str = "\x1b[0;35m";
pub const BOLD: &str = "\x1b[1m";
pub const NC: &str = "\x1b[0m"; // No Color

/// Check if stdout is a terminal (for color output)
#[inline]
pub fn is_terminal() -> bool {
    std::io::stdout().is_terminal()
}

/// Print info message
pub fn info(msg: &str) {
    let color = if is_terminal() { GREEN } else { "" };
    let reset = if is_terminal() { NC } else { "" };
    println!("{}[INFO]{} {}", color, reset, msg);
}

/// Print warning message
pub fn warn(msg: &str) {
    let color = if is_terminal() { YELLOW } else { "" };
    let reset = if is_terminal() { NC } else { "" };
    eprintln!("{}[WARN]{} {}", color, reset, msg);
}

/// Print error message
pub fn error(msg: &str) {
    let color = if is_terminal() { RED } else { "" };
    let reset = if is_terminal() { NC } else { "" };
    eprintln!("{}[ERROR]{} {}", color, reset, msg);
}

/// Print success message
pub fn success(msg: &str) {
    let color = if is_terminal() { MAGENTA } else { "" };
    let reset = if is_terminal() { NC } else { "" };
    println!("{}[OK]{} {}", color, reset, msg);
}

/// Print section header
pub fn header(msg: &str) {
    let bold = if is_terminal() { BOLD } else { "" };
    let reset = if is_terminal() { NC } else { "" };
    println!("{}===>{} {}", bold, reset, msg);
    println!();
}

/// Exit codes
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_FILE_NOT_FOUND: i32 = 4;
pub const EXIT_VALIDATION: i32 = 5;
pub const EXIT_NOT_FOUND: i32 = 6;

// ============================================================================
// Error Codes and Remediation
// ============================================================================

/// Error codes for JSON error responses
pub const E_FILE_NOT_FOUND: &str = "E001";
pub const E_METHOD_NOT_FOUND: &str = "E002";
pub const E_INVALID_SIGNATURE: &str = "E003";
pub const E_GRAPH_BUILD: &str = "E004";
pub const E_INVALID_INPUT: &str = "E006";

/// Common remediation messages
pub const R_HINT_SIGNATURE: &str = "Write methods as pkg.Class.method(T1, T2) with fully qualified parameter types";
pub const R_HINT_SOURCE_ROOT: &str = "Point --source-root at the directory holding the package folders";
pub const R_HINT_PAIRS: &str = "Run 'apireach pairs' to list the methods that call third-party code";

/// JSON output wrapper
#[derive(Debug, Clone, serde::Serialize)]
pub struct JsonResponse<T> {
    pub schema_version: String,
    pub execution_id: String,
    pub tool: String,
    pub timestamp: String,
    pub data: T,
}

impl<T: serde::Serialize> JsonResponse<T> {
    pub fn new(data: T) -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};

        let timestamp = chrono::Utc::now().to_rfc3339();
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let exec_id = format!("{:x}-{}", secs, std::process::id());

        JsonResponse {
            schema_version: "1.0.0".to_string(),
            execution_id: exec_id,
            tool: "apireach".to_string(),
            timestamp,
            data,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Error response format for JSON mode
#[derive(Debug, Clone, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl JsonError {
    pub fn new(category: &str, message: &str, code: &str) -> Self {
        JsonError {
            error: category.to_string(),
            message: message.to_string(),
            code: code.to_string(),
            remediation: None,
        }
    }

    pub fn with_remediation(mut self, remediation: &str) -> Self {
        self.remediation = Some(remediation.to_string());
        self
    }

    /// Missing input file or directory
    pub fn file_not_found(what: &str, path: &str) -> Self {
        let error = Self::new(
            "FileNotFound",
            &format!("{} not found: {}", what, path),
            E_FILE_NOT_FOUND,
        );
        if what == "source root" {
            error.with_remediation(R_HINT_SOURCE_ROOT)
        } else {
            error
        }
    }

    /// Method without source in the project
    pub fn method_not_found(name: &str) -> Self {
        Self::new(
            "MethodNotFound",
            &format!("Method '{}' not found in the project sources", name),
            E_METHOD_NOT_FOUND,
        )
        .with_remediation(R_HINT_PAIRS)
    }

    /// Unparseable method signature argument
    pub fn invalid_signature(text: &str) -> Self {
        Self::new(
            "InvalidSignature",
            &format!("Invalid method signature '{}'", text),
            E_INVALID_SIGNATURE,
        )
        .with_remediation(R_HINT_SIGNATURE)
    }

    /// Call graph could not be built
    pub fn graph_build(message: &str) -> Self {
        Self::new(
            "GraphBuild",
            &format!("Call graph construction failed: {}", message),
            E_GRAPH_BUILD,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_response() {
        let data = vec!["item1", "item2"];
        let response = JsonResponse::new(data);
        let json = response.to_json();
        assert!(json.contains("\"tool\":\"apireach\""));
        assert!(json.contains("\"data\":[\"item1\",\"item2\"]"));
    }

    #[test]
    fn test_json_error_remediation() {
        let json = serde_json::to_string(&JsonError::invalid_signature("oops")).unwrap();
        assert!(json.contains("\"code\":\"E003\""));
        assert!(json.contains("remediation"));

        let plain = serde_json::to_string(&JsonError::graph_build("empty")).unwrap();
        assert!(!plain.contains("remediation"));
    }
}
