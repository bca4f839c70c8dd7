//! Path records produced by the reachability engine

use serde::{Deserialize, Serialize};

use super::MethodSignature;

/// A route from a public entry point to one third-party call
///
/// `path` runs entry point first, direct caller second to last and the
/// third-party method last. No element repeats and only the last element is
/// third-party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThirdPartyPath {
    pub path_id: String,
    pub entry_point: MethodSignature,
    pub direct_caller: MethodSignature,
    pub third_party_method: MethodSignature,
    pub path: Vec<MethodSignature>,
    /// Static call sites of the target inside the direct caller, at least 1
    pub call_count: usize,
}

impl ThirdPartyPath {
    /// Build a record from a complete path
    ///
    /// Returns `None` for paths shorter than two elements, which cannot
    /// carry both a caller and a target.
    pub fn new(path: Vec<MethodSignature>, call_count: usize) -> Option<Self> {
        if path.len() < 2 {
            return None;
        }
        let entry_point = path[0].clone();
        let direct_caller = path[path.len() - 2].clone();
        let third_party_method = path[path.len() - 1].clone();
        Some(Self {
            path_id: hash_path(&path),
            entry_point,
            direct_caller,
            third_party_method,
            path,
            call_count: call_count.max(1),
        })
    }

    /// Number of methods on the path, target included
    pub fn len(&self) -> usize {
        self.path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    /// Project methods on the path (everything but the target)
    pub fn project_methods(&self) -> &[MethodSignature] {
        &self.path[..self.path.len() - 1]
    }
}

/// Diagnostics for all bounded-depth routes between one entry point and one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathStats {
    pub public_method: String,
    pub third_party_method: String,
    pub total_paths: usize,
    pub shortest_path_length: usize,
    pub longest_path_length: usize,
}

/// Compute a stable identifier for a path
///
/// BLAKE3 over the element count followed by each length-prefixed signature.
pub fn hash_path(path: &[MethodSignature]) -> String {
    let mut hasher = blake3::Hasher::new();

    hasher.update(&path.len().to_le_bytes());

    for method in path {
        let rendered = method.with_params();
        hasher.update(&rendered.len().to_le_bytes());
        hasher.update(rendered.as_bytes());
        hasher.update(method.return_type.as_bytes());
    }

    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(ty: &str, name: &str) -> MethodSignature {
        MethodSignature::new(ty, name, vec![], "void")
    }

    #[test]
    fn test_new_path_fields() {
        let path = vec![m("a.A", "pub"), m("a.B", "helper"), m("lib.C", "call")];
        let record = ThirdPartyPath::new(path.clone(), 0).unwrap();
        assert_eq!(record.entry_point, path[0]);
        assert_eq!(record.direct_caller, path[1]);
        assert_eq!(record.third_party_method, path[2]);
        assert_eq!(record.call_count, 1);
        assert_eq!(record.project_methods().len(), 2);
        assert_eq!(record.len(), 3);
    }

    #[test]
    fn test_short_path_rejected() {
        assert!(ThirdPartyPath::new(vec![m("a.A", "x")], 1).is_none());
    }

    #[test]
    fn test_hash_path_deterministic_and_order_sensitive() {
        let ab = vec![m("a.A", "x"), m("b.B", "y")];
        let ba = vec![m("b.B", "y"), m("a.A", "x")];
        assert_eq!(hash_path(&ab), hash_path(&ab));
        assert_ne!(hash_path(&ab), hash_path(&ba));
        assert_eq!(hash_path(&ab).len(), 64);
    }
}
