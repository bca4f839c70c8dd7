//! Statement and expression tree of a method body
//!
//! A small tagged union produced from the tree-sitter parse. Consumers walk
//! it with the generic helpers at the bottom of this file and a callback
//! instead of subclassing a scanner.

use std::collections::BTreeSet;

use crate::model::MethodSignature;

/// A declared local variable (or parameter)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Local {
    pub name: String,
    pub type_name: String,
}

impl Local {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StmtKind {
    LocalDecl,
    Expression,
    /// Assignment or increment of the variable in `Stmt::assigned`
    Assign,
    If,
    Loop,
    Switch,
    Try,
    Synchronized,
    Block,
    Labeled,
    Return,
    Throw,
    /// Explicit `this(...)` / `super(...)`
    ConstructorCall,
    Other,
}

impl StmtKind {
    /// Branching statements the slicer always keeps
    pub fn is_control(self) -> bool {
        matches!(self, StmtKind::If | StmtKind::Loop | StmtKind::Switch)
    }
}

/// How a nested block is laid out inside its statement's text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStyle {
    /// `{ ... }`; the range covers the text between the braces
    Braced,
    /// Single statement body without braces
    Bare,
    /// Statements following a `case` label
    Group,
}

/// Statements nested in a compound statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Byte range of the block contents, relative to the owning statement's text
    pub start: usize,
    pub end: usize,
    pub style: BlockStyle,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stmt {
    /// Unique within one method body
    pub id: usize,
    pub kind: StmtKind,
    pub line: usize,
    pub column: usize,
    pub text: String,
    /// Variables introduced by this statement
    pub declares: Vec<Local>,
    /// Expressions owned directly by the statement (conditions, initializers, ...)
    pub exprs: Vec<Expr>,
    pub blocks: Vec<Block>,
    /// Name of the assigned variable for `Assign`
    pub assigned: Option<String>,
}

/// A method invocation, or an explicit constructor call named `<init>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub receiver: Option<Box<Expr>>,
    pub name: String,
    pub args: Vec<Expr>,
    pub line: usize,
    /// Static type of the receiver, filled in by type resolution
    pub receiver_type: Option<String>,
    /// Resolved callee, filled in by type resolution
    pub target: Option<MethodSignature>,
}

/// `new T(...)`, optionally with an anonymous class body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Creation {
    pub type_name: String,
    pub args: Vec<Expr>,
    pub line: usize,
    /// Anonymous class method bodies
    pub body: Vec<Stmt>,
    pub target: Option<MethodSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Invoke(Invocation),
    New(Creation),
    Name(String),
    This,
    Super,
    Field { object: Box<Expr>, name: String },
    Assign { target: Box<Expr>, value: Box<Expr> },
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Lambda { params: Vec<String>, body: Vec<Stmt> },
    /// Literal with its static type
    Literal(String),
    Cast { type_name: String, value: Box<Expr> },
    /// Statements embedded in an expression (switch expression arms)
    Block(Vec<Stmt>),
    /// Any other operator; only the operands are kept
    Other(Vec<Expr>),
}

// ============================================================================
// Traversal
// ============================================================================

impl Expr {
    /// Pre-order walk over this expression and every nested one,
    /// including expressions inside embedded statements.
    pub fn walk(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Invoke(inv) => {
                if let Some(recv) = &inv.receiver {
                    recv.walk(f);
                }
                for arg in &inv.args {
                    arg.walk(f);
                }
            }
            Expr::New(creation) => {
                for arg in &creation.args {
                    arg.walk(f);
                }
                walk_exprs(&creation.body, f);
            }
            Expr::Field { object, .. } => object.walk(f),
            Expr::Assign { target, value } => {
                target.walk(f);
                value.walk(f);
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                condition.walk(f);
                then.walk(f);
                otherwise.walk(f);
            }
            Expr::Lambda { body, .. } | Expr::Block(body) => walk_exprs(body, f),
            Expr::Cast { value, .. } => value.walk(f),
            Expr::Other(parts) => {
                for part in parts {
                    part.walk(f);
                }
            }
            Expr::Name(_) | Expr::This | Expr::Super | Expr::Literal(_) => {}
        }
    }

    /// Variables read by this expression
    pub fn variable_refs(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Name(name) => {
                out.insert(name.clone());
            }
            Expr::Field { object, name } => {
                if matches!(**object, Expr::This) {
                    out.insert(name.clone());
                } else {
                    object.variable_refs(out);
                }
            }
            Expr::Invoke(inv) => {
                if let Some(recv) = &inv.receiver {
                    recv.variable_refs(out);
                }
                for arg in &inv.args {
                    arg.variable_refs(out);
                }
            }
            Expr::New(creation) => {
                for arg in &creation.args {
                    arg.variable_refs(out);
                }
            }
            Expr::Assign { target, value } => {
                target.variable_refs(out);
                value.variable_refs(out);
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                condition.variable_refs(out);
                then.variable_refs(out);
                otherwise.variable_refs(out);
            }
            Expr::Lambda { params, body } => {
                let mut inner = BTreeSet::new();
                for stmt in body {
                    stmt.all_refs(&mut inner);
                }
                out.extend(inner.into_iter().filter(|n| !params.contains(n)));
            }
            Expr::Block(body) => {
                for stmt in body {
                    stmt.all_refs(out);
                }
            }
            Expr::Cast { value, .. } => value.variable_refs(out),
            Expr::Other(parts) => {
                for part in parts {
                    part.variable_refs(out);
                }
            }
            Expr::This | Expr::Super | Expr::Literal(_) => {}
        }
    }
}

impl Stmt {
    /// Walk the statement's own expressions and everything nested in its blocks
    pub fn walk_exprs(&self, f: &mut dyn FnMut(&Expr)) {
        for expr in &self.exprs {
            expr.walk(f);
        }
        for block in &self.blocks {
            walk_exprs(&block.stmts, f);
        }
    }

    /// Variables read by the statement header (not its nested blocks)
    pub fn header_refs(&self) -> BTreeSet<String> {
        let mut refs = BTreeSet::new();
        for expr in &self.exprs {
            expr.variable_refs(&mut refs);
        }
        refs
    }

    /// Variables read anywhere in the statement
    pub fn all_refs(&self, out: &mut BTreeSet<String>) {
        for expr in &self.exprs {
            expr.variable_refs(out);
        }
        for block in &self.blocks {
            for stmt in &block.stmts {
                stmt.all_refs(out);
            }
        }
    }

    /// Variables this statement defines: declared locals or the assignment target
    pub fn defined_vars(&self) -> Vec<&str> {
        match self.kind {
            StmtKind::LocalDecl => self.declares.iter().map(|l| l.name.as_str()).collect(),
            StmtKind::Assign => self.assigned.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Whether any expression in the statement (nested blocks included) satisfies `pred`
    pub fn contains_expr(&self, pred: &dyn Fn(&Expr) -> bool) -> bool {
        let mut found = false;
        self.walk_exprs(&mut |e| {
            if !found && pred(e) {
                found = true;
            }
        });
        found
    }

    /// Whether the statement's own expressions (not nested blocks) satisfy `pred`
    pub fn header_contains_expr(&self, pred: &dyn Fn(&Expr) -> bool) -> bool {
        let mut found = false;
        for expr in &self.exprs {
            expr.walk(&mut |e| {
                if !found && pred(e) {
                    found = true;
                }
            });
        }
        found
    }
}

/// Pre-order walk over every expression in a statement list
pub fn walk_exprs(stmts: &[Stmt], f: &mut dyn FnMut(&Expr)) {
    for stmt in stmts {
        stmt.walk_exprs(f);
    }
}

/// Pre-order walk over every statement, descending into nested blocks
pub fn walk_stmts(stmts: &[Stmt], f: &mut dyn FnMut(&Stmt)) {
    for stmt in stmts {
        f(stmt);
        for block in &stmt.blocks {
            walk_stmts(&block.stmts, f);
        }
    }
}

/// Number of statements satisfying `pred`, nested ones included
pub fn count_stmts(stmts: &[Stmt], pred: &dyn Fn(&Stmt) -> bool) -> usize {
    let mut count = 0;
    walk_stmts(stmts, &mut |s| {
        if pred(s) {
            count += 1;
        }
    });
    count
}

/// Number of expressions satisfying `pred`, nested ones included
pub fn count_exprs(stmts: &[Stmt], pred: &dyn Fn(&Expr) -> bool) -> usize {
    let mut count = 0;
    walk_exprs(stmts, &mut |e| {
        if pred(e) {
            count += 1;
        }
    });
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stmt(kind: StmtKind, exprs: Vec<Expr>) -> Stmt {
        Stmt {
            id: 0,
            kind,
            line: 1,
            column: 0,
            text: String::new(),
            declares: Vec::new(),
            exprs,
            blocks: Vec::new(),
            assigned: None,
        }
    }

    fn call(name: &str, args: Vec<Expr>) -> Expr {
        Expr::Invoke(Invocation {
            receiver: None,
            name: name.to_string(),
            args,
            line: 1,
            receiver_type: None,
            target: None,
        })
    }

    #[test]
    fn test_variable_refs_skip_method_names_and_lambda_params() {
        let expr = call(
            "target",
            vec![
                Expr::Name("x".into()),
                Expr::Field {
                    object: Box::new(Expr::This),
                    name: "client".into(),
                },
                Expr::Lambda {
                    params: vec!["item".into()],
                    body: vec![stmt(
                        StmtKind::Expression,
                        vec![call("use", vec![Expr::Name("item".into()), Expr::Name("y".into())])],
                    )],
                },
            ],
        );
        let mut refs = BTreeSet::new();
        expr.variable_refs(&mut refs);
        let refs: Vec<_> = refs.into_iter().collect();
        assert_eq!(refs, vec!["client", "x", "y"]);
    }

    #[test]
    fn test_walkers_descend_into_blocks() {
        let inner = stmt(StmtKind::Expression, vec![call("inner", vec![])]);
        let mut outer = stmt(StmtKind::If, vec![Expr::Name("flag".into())]);
        outer.blocks.push(Block {
            start: 0,
            end: 0,
            style: BlockStyle::Braced,
            stmts: vec![inner],
        });
        let body = vec![outer];

        assert_eq!(count_stmts(&body, &|s| s.kind.is_control()), 1);
        assert_eq!(count_stmts(&body, &|_| true), 2);
        assert_eq!(
            count_exprs(&body, &|e| matches!(e, Expr::Invoke(i) if i.name == "inner")),
            1
        );
        assert!(body[0].contains_expr(&|e| matches!(e, Expr::Invoke(_))));
        assert!(!body[0].header_contains_expr(&|e| matches!(e, Expr::Invoke(_))));
        assert_eq!(body[0].header_refs().into_iter().collect::<Vec<_>>(), vec!["flag"]);
    }
}
