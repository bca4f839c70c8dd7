//! Matching invocation expressions against a target signature

use super::ast::{Creation, Expr, Invocation, Stmt};
use super::SourceModelProvider;
use crate::model::{simple_name_of, MethodSignature, UNKNOWN_TYPE};

/// Decides whether an expression calls one particular method
pub struct CallMatcher<'a> {
    target: &'a MethodSignature,
    model: &'a dyn SourceModelProvider,
}

impl<'a> CallMatcher<'a> {
    pub fn new(target: &'a MethodSignature, model: &'a dyn SourceModelProvider) -> Self {
        Self { target, model }
    }

    pub fn target(&self) -> &MethodSignature {
        self.target
    }

    pub fn matches(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Invoke(inv) => self.matches_invocation(inv),
            Expr::New(creation) => self.matches_creation(creation),
            _ => false,
        }
    }

    /// Whether the statement's own expressions call the target
    pub fn in_header(&self, stmt: &Stmt) -> bool {
        stmt.header_contains_expr(&|e| self.matches(e))
    }

    /// Whether the statement or anything nested in it calls the target
    pub fn anywhere(&self, stmt: &Stmt) -> bool {
        stmt.contains_expr(&|e| self.matches(e))
    }

    fn owner_matches(&self, owner: &str) -> bool {
        owner == self.target.declaring_type || self.model.is_subtype(owner, &self.target.declaring_type)
    }

    fn matches_invocation(&self, inv: &Invocation) -> bool {
        if inv.name != self.target.name {
            return false;
        }
        if let Some(resolved) = &inv.target {
            if same_method(resolved, self.target) {
                return true;
            }
        }
        let owner = inv
            .target
            .as_ref()
            .map(|t| t.declaring_type.as_str())
            .or(inv.receiver_type.as_deref())
            .filter(|t| *t != UNKNOWN_TYPE);
        match owner {
            Some(owner) => {
                self.owner_matches(owner)
                    || inv
                        .receiver_type
                        .as_deref()
                        .is_some_and(|recv| recv != owner && self.owner_matches(recv))
            }
            // unresolved receiver: fall back to name and arity
            None => inv.args.len() == self.target.params.len(),
        }
    }

    fn matches_creation(&self, creation: &Creation) -> bool {
        if !self.target.is_constructor() {
            return false;
        }
        match &creation.target {
            Some(resolved) => {
                resolved.declaring_type == self.target.declaring_type
                    && (same_method(resolved, self.target)
                        || resolved.params.len() == self.target.params.len())
            }
            None => {
                simple_name_of(&creation.type_name) == self.target.simple_type_name()
                    && creation.args.len() == self.target.params.len()
            }
        }
    }
}

/// Same declaring type, name and parameter list; return types are ignored
pub fn same_method(a: &MethodSignature, b: &MethodSignature) -> bool {
    a.declaring_type == b.declaring_type && a.name == b.name && a.params == b.params
}
