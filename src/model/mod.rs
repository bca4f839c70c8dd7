//! Core value types shared by every analysis stage
//!
//! [`MethodSignature`] is the node key of the call graph, the key of every
//! session cache and the unit of output. It is never mutated once built.

pub mod path;

pub use path::{hash_path, PathStats, ThirdPartyPath};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AnalysisError;

/// Synthetic method name of constructors
pub const CONSTRUCTOR: &str = "<init>";
/// Synthetic method name of static initializers
pub const STATIC_INITIALIZER: &str = "<clinit>";
/// Placeholder for types the program model could not determine
pub const UNKNOWN_TYPE: &str = "?";

/// Structural identity of a method
///
/// Parameter and return types are fully qualified where the program model
/// could resolve them, nested types use `$` (`com.acme.Outer$Inner`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodSignature {
    pub declaring_type: String,
    pub name: String,
    pub params: Vec<String>,
    pub return_type: String,
}

impl MethodSignature {
    pub fn new(
        declaring_type: impl Into<String>,
        name: impl Into<String>,
        params: Vec<String>,
        return_type: impl Into<String>,
    ) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            params,
            return_type: return_type.into(),
        }
    }

    pub fn constructor(declaring_type: impl Into<String>, params: Vec<String>) -> Self {
        Self::new(declaring_type, CONSTRUCTOR, params, "void")
    }

    pub fn static_initializer(declaring_type: impl Into<String>) -> Self {
        Self::new(declaring_type, STATIC_INITIALIZER, Vec::new(), "void")
    }

    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR
    }

    pub fn is_static_initializer(&self) -> bool {
        self.name == STATIC_INITIALIZER
    }

    /// Top-level type that holds this method's source (`a.b.Outer` for `a.b.Outer$Inner`)
    pub fn outer_type(&self) -> &str {
        outer_type_of(&self.declaring_type)
    }

    /// Package of the declaring type, empty for the default package
    pub fn package(&self) -> &str {
        package_of(&self.declaring_type)
    }

    /// Simple name of the declaring type (`Inner` for `a.b.Outer$Inner`)
    pub fn simple_type_name(&self) -> &str {
        simple_name_of(&self.declaring_type)
    }

    /// `Type.name(P1, P2)`, the key used for multiplicity bookkeeping
    pub fn with_params(&self) -> String {
        format!(
            "{}.{}({})",
            self.declaring_type,
            self.name,
            self.params.join(", ")
        )
    }

    /// Human-facing name with synthetic `$` segments cleaned up
    pub fn display_name(&self) -> String {
        filter_name(&self.with_params())
    }

    /// JVM method descriptor, e.g. `(ILjava/lang/String;)V`
    pub fn jvm_descriptor(&self) -> String {
        let mut desc = String::from("(");
        for param in &self.params {
            desc.push_str(&type_descriptor(param));
        }
        desc.push(')');
        desc.push_str(&type_descriptor(&self.return_type));
        desc
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.with_params())
    }
}

/// Parses `[return ]pkg.Type.method(P1, P2)`.
///
/// The return type defaults to `void` when omitted.
impl FromStr for MethodSignature {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AnalysisError::parse("<signature>", format!("invalid method signature '{}'", s));
        let s = s.trim();
        let open = s.find('(').ok_or_else(invalid)?;
        if !s.ends_with(')') {
            return Err(invalid());
        }
        let params: Vec<String> = s[open + 1..s.len() - 1]
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();

        let head = &s[..open];
        let (return_type, qualified) = match head.rsplit_once(' ') {
            Some((ret, qualified)) => (ret.trim().to_string(), qualified),
            None => ("void".to_string(), head),
        };
        let (declaring_type, name) = qualified.rsplit_once('.').ok_or_else(invalid)?;
        if declaring_type.is_empty() || name.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(declaring_type, name, params, return_type))
    }
}

// ============================================================================
// Name helpers
// ============================================================================

/// `a.b.Outer` for `a.b.Outer$Inner`
pub fn outer_type_of(type_name: &str) -> &str {
    match type_name.find('$') {
        Some(idx) => &type_name[..idx],
        None => type_name,
    }
}

/// Package portion of a (possibly nested) type name
pub fn package_of(type_name: &str) -> &str {
    match outer_type_of(type_name).rfind('.') {
        Some(idx) => &type_name[..idx],
        None => "",
    }
}

/// Simple name of a (possibly nested) type name
pub fn simple_name_of(type_name: &str) -> &str {
    let after_dot = match type_name.rfind('.') {
        Some(idx) => &type_name[idx + 1..],
        None => type_name,
    };
    match after_dot.rfind('$') {
        Some(idx) => &after_dot[idx + 1..],
        None => after_dot,
    }
}

static ANONYMOUS_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\d+").expect("static regex"));
static NESTED_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$([A-Za-z])").expect("static regex"));

/// Drops anonymous-class markers (`$1`) and turns nested-type `$` into `.`
pub fn filter_name(name: &str) -> String {
    let without_anonymous = ANONYMOUS_SEGMENT.replace_all(name, "");
    NESTED_SEGMENT
        .replace_all(&without_anonymous, ".$1")
        .into_owned()
}

fn type_descriptor(type_name: &str) -> String {
    if let Some(element) = type_name.strip_suffix("[]") {
        return format!("[{}", type_descriptor(element));
    }
    if let Some(element) = type_name.strip_suffix("...") {
        return format!("[{}", type_descriptor(element));
    }
    match type_name {
        "void" => "V".to_string(),
        "boolean" => "Z".to_string(),
        "byte" => "B".to_string(),
        "char" => "C".to_string(),
        "short" => "S".to_string(),
        "int" => "I".to_string(),
        "long" => "J".to_string(),
        "float" => "F".to_string(),
        "double" => "D".to_string(),
        other => format!("L{};", other.replace('.', "/")),
    }
}

/// Number of parameters encoded in a JVM descriptor
pub fn descriptor_arity(desc: &str) -> Option<usize> {
    let inner = desc.strip_prefix('(')?;
    let end = inner.find(')')?;
    let mut chars = inner[..end].chars();
    let mut count = 0;
    while let Some(c) = chars.next() {
        match c {
            '[' => continue,
            'L' => {
                for c in chars.by_ref() {
                    if c == ';' {
                        break;
                    }
                }
                count += 1;
            }
            _ => count += 1,
        }
    }
    Some(count)
}
