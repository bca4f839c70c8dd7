//! Third-party classification
//!
//! A method is third-party when its package is not covered by an ignore
//! prefix (JDK packages, the project itself, user additions) and the
//! package is present in the package → dependency-coordinate map.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::error::{AnalysisError, AnalysisResult};
use crate::model::MethodSignature;

/// Prefixes that are never third-party
pub const DEFAULT_IGNORED_PREFIXES: &[&str] = &["java.", "jdk.", "sun.", "com.sun."];

/// Predicate deciding project code vs third-party dependency
pub trait ThirdPartyPredicate {
    fn is_third_party(&self, method: &MethodSignature) -> bool;
}

impl<F> ThirdPartyPredicate for F
where
    F: Fn(&MethodSignature) -> bool,
{
    fn is_third_party(&self, method: &MethodSignature) -> bool {
        self(method)
    }
}

/// Ignore prefixes plus the package → coordinates table
#[derive(Debug, Clone, Default)]
pub struct ThirdPartyClassifier {
    ignored_prefixes: BTreeSet<String>,
    packages: HashMap<String, Vec<String>>,
}

impl ThirdPartyClassifier {
    /// Classifier with the default JDK prefixes and the project package ignored
    pub fn new(project_package: &str) -> Self {
        let mut ignored_prefixes: BTreeSet<String> = DEFAULT_IGNORED_PREFIXES
            .iter()
            .map(|p| p.to_string())
            .collect();

        let project = project_package.trim();
        if !project.is_empty() {
            let normalized = if project.ends_with('.') {
                project.to_string()
            } else {
                format!("{}.", project)
            };
            ignored_prefixes.insert(normalized);
        }

        Self {
            ignored_prefixes,
            packages: HashMap::new(),
        }
    }

    /// Replace the package table
    pub fn with_packages(mut self, packages: HashMap<String, Vec<String>>) -> Self {
        self.packages = packages;
        self
    }

    /// Add one ignore prefix
    pub fn ignore_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.ignored_prefixes.insert(prefix.into());
        self
    }

    /// Add newline-delimited prefixes from a file (`#` starts a comment line)
    pub fn load_ignore_file(mut self, path: &Path) -> AnalysisResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| AnalysisError::io(path, e))?;
        let before = self.ignored_prefixes.len();
        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            self.ignored_prefixes.insert(line.to_string());
        }
        debug!(
            "Loaded {} ignore prefixes from {}",
            self.ignored_prefixes.len() - before,
            path.display()
        );
        Ok(self)
    }

    /// Load the JSON package map (`{"org.lib": ["g:a:jar:1.0"]}`)
    ///
    /// A missing or unreadable map leaves the table empty, so nothing is
    /// classified as third-party.
    pub fn load_package_map(self, path: &Path) -> Self {
        match read_package_map(path) {
            Ok(packages) => {
                info!(
                    "Loaded package map with {} packages from {}",
                    packages.len(),
                    path.display()
                );
                self.with_packages(packages)
            }
            Err(e) => {
                warn!("Package map unavailable: {}", e);
                self
            }
        }
    }

    pub fn ignored_prefixes(&self) -> impl Iterator<Item = &str> {
        self.ignored_prefixes.iter().map(String::as_str)
    }

    /// Whether a package is excluded by an ignore prefix
    pub fn is_ignored(&self, package: &str) -> bool {
        self.ignored_prefixes.iter().any(|prefix| {
            package.starts_with(prefix.as_str())
                || prefix.strip_suffix('.').is_some_and(|bare| bare == package)
        })
    }

    /// Third-party test on a bare package name
    pub fn is_third_party_package(&self, package: &str) -> bool {
        !package.is_empty() && !self.is_ignored(package) && self.packages.contains_key(package)
    }

    /// `groupId:artifactId:version` of the dependency providing a package
    pub fn dependency_for(&self, package: &str) -> Option<String> {
        let first = self.packages.get(package)?.first()?;
        let parts: Vec<&str> = first.split(':').collect();
        if parts.len() >= 4 {
            Some(format!("{}:{}:{}", parts[0], parts[1], parts[3]))
        } else {
            error!(
                "Invalid dependency format for package '{}': {}",
                package, first
            );
            Some(first.clone())
        }
    }
}

impl ThirdPartyPredicate for ThirdPartyClassifier {
    fn is_third_party(&self, method: &MethodSignature) -> bool {
        self.is_third_party_package(method.package())
    }
}

fn read_package_map(path: &Path) -> AnalysisResult<HashMap<String, Vec<String>>> {
    let text = std::fs::read_to_string(path).map_err(|e| AnalysisError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| AnalysisError::parse(path, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn classifier() -> ThirdPartyClassifier {
        let mut packages = HashMap::new();
        packages.insert(
            "org.apache.http.client".to_string(),
            vec!["org.apache.httpcomponents:httpclient:jar:4.5.14".to_string()],
        );
        packages.insert("com.acme.util".to_string(), vec!["com.acme:util:1.0".to_string()]);
        packages.insert("java.util".to_string(), vec!["jdk:jdk:jar:17".to_string()]);
        ThirdPartyClassifier::new("com.acme").with_packages(packages)
    }

    #[test]
    fn test_third_party_requires_map_entry() {
        let c = classifier();
        let call = MethodSignature::new("org.apache.http.client.HttpClient", "execute", vec![], "?");
        assert!(c.is_third_party(&call));

        let unknown = MethodSignature::new("org.other.Thing", "run", vec![], "void");
        assert!(!c.is_third_party(&unknown));
    }

    #[test]
    fn test_ignored_prefixes_win_over_map() {
        let c = classifier();
        let jdk = MethodSignature::new("java.util.List", "add", vec![], "boolean");
        assert!(!c.is_third_party(&jdk));
        // project package, both as prefix and as the bare package
        let project = MethodSignature::new("com.acme.util.Strings", "trim", vec![], "void");
        assert!(!c.is_third_party(&project));
        assert!(c.is_ignored("com.acme"));
        assert!(!c.is_ignored("com.acmecorp"));
    }

    #[test]
    fn test_dependency_coordinates() {
        let c = classifier();
        assert_eq!(
            c.dependency_for("org.apache.http.client").as_deref(),
            Some("org.apache.httpcomponents:httpclient:4.5.14")
        );
        assert_eq!(c.dependency_for("com.acme.util").as_deref(), Some("com.acme:util:1.0"));
        assert_eq!(c.dependency_for("org.none"), None);
    }

    #[test]
    fn test_ignore_file_and_package_map_loading() {
        let dir = tempfile::TempDir::new().unwrap();
        let ignore = dir.path().join("ignored.txt");
        let mut f = std::fs::File::create(&ignore).unwrap();
        writeln!(f, "# shaded copies").unwrap();
        writeln!(f, "  org.shaded.  ").unwrap();
        writeln!(f).unwrap();
        drop(f);

        let map = dir.path().join("map.json");
        std::fs::write(&map, r#"{"org.shaded.lib": ["a:b:jar:1"], "org.lib": ["x:y:jar:2"]}"#).unwrap();

        let c = ThirdPartyClassifier::new("com.acme")
            .load_ignore_file(&ignore)
            .unwrap()
            .load_package_map(&map);
        assert!(c.ignored_prefixes().any(|p| p == "org.shaded."));
        assert!(!c.is_third_party_package("org.shaded.lib"));
        assert!(c.is_third_party_package("org.lib"));
    }

    #[test]
    fn test_missing_package_map_classifies_nothing() {
        let c = ThirdPartyClassifier::new("com.acme").load_package_map(Path::new("/no/such/map.json"));
        assert!(!c.is_third_party_package("org.lib"));
    }
}
