//! Project-wide type resolution and call graph construction
//!
//! [`JavaProject`] ties the parsed compilation units together: it resolves
//! simple type names, types every invocation receiver it can, picks the
//! callee overload and records one call site per invocation. The resolved
//! statement trees are kept as the source model for slicing.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use super::ast::{Expr, Stmt, StmtKind};
use super::java::{parse_java, MethodDecl, ParsedFile, TypeDecl, TypeKind};
use super::{MethodBody, SourceModelProvider};
use crate::error::{AnalysisError, AnalysisResult};
use crate::graph::{CallGraphProvider, CallSite, EntryPointSet};
use crate::model::{simple_name_of, MethodSignature, CONSTRUCTOR, UNKNOWN_TYPE};

const PRIMITIVES: &[&str] = &[
    "void", "boolean", "byte", "char", "short", "int", "long", "float", "double",
];

/// `java.lang` types resolvable without an import
const JAVA_LANG: &[&str] = &[
    "AssertionError", "AutoCloseable", "Boolean", "Byte", "CharSequence", "Character",
    "Class", "ClassCastException", "ClassNotFoundException", "CloneNotSupportedException",
    "Comparable", "Deprecated", "Double", "Enum", "Error", "Exception", "Float",
    "FunctionalInterface", "IllegalArgumentException", "IllegalStateException",
    "IndexOutOfBoundsException", "Integer", "InterruptedException", "Iterable", "Long",
    "Math", "NullPointerException", "Number", "NumberFormatException", "Object",
    "Override", "Process", "ProcessBuilder", "Record", "Runnable", "Runtime",
    "RuntimeException", "SecurityException", "Short", "StrictMath", "String",
    "StringBuffer", "StringBuilder", "SuppressWarnings", "System", "Thread",
    "ThreadLocal", "Throwable", "UnsupportedOperationException", "Void",
];

/// Static fields of JDK types whose type receivers commonly depend on
const KNOWN_STATIC_FIELDS: &[(&str, &str, &str)] = &[
    ("java.lang.System", "out", "java.io.PrintStream"),
    ("java.lang.System", "err", "java.io.PrintStream"),
    ("java.lang.System", "in", "java.io.InputStream"),
];

// ============================================================================
// Index of declared types
// ============================================================================

#[derive(Debug, Clone, Default)]
struct FileScope {
    package: String,
    /// simple name → qualified name as written in a single-type import
    single: HashMap<String, String>,
    on_demand: Vec<String>,
    /// member name → owning class of a single static import
    static_single: HashMap<String, String>,
    static_on_demand: Vec<String>,
}

impl FileScope {
    fn from_file(file: &ParsedFile) -> Self {
        let mut scope = FileScope {
            package: file.package.clone(),
            ..Default::default()
        };
        for import in &file.imports {
            match (import.is_static, import.on_demand) {
                (false, false) => {
                    scope
                        .single
                        .insert(simple_name_of(&import.name).to_string(), import.name.clone());
                }
                (false, true) => scope.on_demand.push(import.name.clone()),
                (true, false) => {
                    if let Some((class, member)) = import.name.rsplit_once('.') {
                        scope.static_single.insert(member.to_string(), class.to_string());
                    }
                }
                (true, true) => scope.static_on_demand.push(import.name.clone()),
            }
        }
        scope
    }
}

#[derive(Debug, Clone)]
struct MethodInfo {
    signature: MethodSignature,
    varargs: bool,
    is_static: bool,
}

#[derive(Debug, Clone)]
struct TypeInfo {
    file: usize,
    enclosing: Option<String>,
    type_params: Vec<String>,
    superclass: Option<String>,
    interfaces: Vec<String>,
    fields: HashMap<String, String>,
    methods: Vec<MethodInfo>,
}

impl TypeInfo {
    fn supertypes(&self) -> impl Iterator<Item = &String> {
        self.superclass.iter().chain(self.interfaces.iter())
    }
}

/// Callee chosen for an invocation
#[derive(Debug, Clone)]
enum Callee {
    Project { signature: MethodSignature, is_static: bool },
    External(MethodSignature),
}

impl Callee {
    fn signature(&self) -> &MethodSignature {
        match self {
            Callee::Project { signature, .. } => signature,
            Callee::External(signature) => signature,
        }
    }
}

/// Where a type name is being resolved
#[derive(Clone, Copy)]
struct TypeCtx<'a> {
    file: usize,
    current: Option<&'a str>,
    type_params: &'a [String],
}

#[derive(Debug, Default)]
struct ProjectIndex {
    types: BTreeMap<String, TypeInfo>,
    scopes: Vec<FileScope>,
    subtypes: HashMap<String, Vec<String>>,
}

impl ProjectIndex {
    fn is_known(&self, fqn: &str) -> bool {
        self.types.contains_key(fqn)
    }

    /// `a.b.Outer.Inner` → `a.b.Outer$Inner` when `a.b.Outer` is a project type
    fn canonical(&self, qualified: &str) -> String {
        if self.is_known(qualified) {
            return qualified.to_string();
        }
        let segments: Vec<&str> = qualified.split('.').collect();
        for split in (1..segments.len()).rev() {
            let prefix = segments[..split].join(".");
            if self.is_known(&prefix) {
                return format!("{}${}", prefix, segments[split..].join("$"));
            }
        }
        qualified.to_string()
    }

    fn resolve_type(&self, raw: &str, ctx: TypeCtx<'_>) -> String {
        let mut base = clean_type(raw);
        let mut dims = 0;
        loop {
            if let Some(stripped) = base.strip_suffix("[]") {
                base = stripped.to_string();
            } else if let Some(stripped) = base.strip_suffix("...") {
                base = stripped.to_string();
            } else {
                break;
            }
            dims += 1;
        }
        let resolved = self.resolve_base(&base, ctx);
        format!("{}{}", resolved, "[]".repeat(dims))
    }

    fn resolve_base(&self, name: &str, ctx: TypeCtx<'_>) -> String {
        if name.is_empty() {
            return UNKNOWN_TYPE.to_string();
        }
        if PRIMITIVES.contains(&name) {
            return name.to_string();
        }
        if ctx.type_params.iter().any(|p| p == name) {
            return "java.lang.Object".to_string();
        }
        if let Some((first, rest)) = name.split_once('.') {
            if let Some(outer) = self.resolve_simple(first, ctx) {
                return format!("{}${}", outer, rest.replace('.', "$"));
            }
            return self.canonical(name);
        }
        self.resolve_simple(name, ctx)
            .unwrap_or_else(|| name.to_string())
    }

    fn resolve_simple(&self, name: &str, ctx: TypeCtx<'_>) -> Option<String> {
        // enclosing types and their member types
        let mut current = ctx.current.map(str::to_string);
        while let Some(fqn) = current {
            if simple_name_of(&fqn) == name {
                return Some(fqn);
            }
            if let Some(member) = self.member_type(&fqn, name) {
                return Some(member);
            }
            current = self.types.get(&fqn).and_then(|t| t.enclosing.clone());
        }

        let scope = self.scopes.get(ctx.file)?;
        if let Some(qualified) = scope.single.get(name) {
            return Some(self.canonical(qualified));
        }

        let same_package = if scope.package.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", scope.package, name)
        };
        if self.is_known(&same_package) {
            return Some(same_package);
        }

        if JAVA_LANG.contains(&name) {
            return Some(format!("java.lang.{}", name));
        }

        for package in &scope.on_demand {
            let candidate = self.canonical(&format!("{}.{}", package, name));
            if self.is_known(&candidate) {
                return Some(candidate);
            }
        }
        scope
            .on_demand
            .iter()
            .find(|p| !self.is_known(&self.canonical(p)))
            .map(|package| format!("{}.{}", package, name))
    }

    /// Member type `name` declared in `owner` or one of its project supertypes
    fn member_type(&self, owner: &str, name: &str) -> Option<String> {
        let mut queue = VecDeque::from([owner.to_string()]);
        let mut seen = HashSet::new();
        while let Some(fqn) = queue.pop_front() {
            if !seen.insert(fqn.clone()) {
                continue;
            }
            let candidate = format!("{}${}", fqn, name);
            if self.is_known(&candidate) {
                return Some(candidate);
            }
            if let Some(info) = self.types.get(&fqn) {
                queue.extend(info.supertypes().cloned());
            }
        }
        None
    }

    /// Type of field `name` visible in `owner` (declared or inherited)
    fn field_type(&self, owner: &str, name: &str) -> Option<String> {
        let mut queue = VecDeque::from([owner.to_string()]);
        let mut seen = HashSet::new();
        while let Some(fqn) = queue.pop_front() {
            if !seen.insert(fqn.clone()) {
                continue;
            }
            match self.types.get(&fqn) {
                Some(info) => {
                    if let Some(t) = info.fields.get(name) {
                        return Some(t.clone());
                    }
                    queue.extend(info.supertypes().cloned());
                }
                None => {
                    if let Some((_, _, t)) = KNOWN_STATIC_FIELDS
                        .iter()
                        .find(|(ty, field, _)| *ty == fqn && *field == name)
                    {
                        return Some(t.to_string());
                    }
                }
            }
        }
        None
    }

    fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        let mut queue = VecDeque::from([sub.to_string()]);
        let mut seen = HashSet::new();
        while let Some(fqn) = queue.pop_front() {
            if fqn == sup {
                return true;
            }
            if !seen.insert(fqn.clone()) {
                continue;
            }
            if let Some(info) = self.types.get(&fqn) {
                queue.extend(info.supertypes().cloned());
            }
        }
        false
    }

    fn select_overload<'t>(
        &self,
        info: &'t TypeInfo,
        name: &str,
        args: &[String],
    ) -> Option<&'t MethodInfo> {
        let compatible: Vec<&MethodInfo> = info
            .methods
            .iter()
            .filter(|m| m.signature.name == name)
            .filter(|m| {
                let arity = m.signature.params.len();
                arity == args.len() || (m.varargs && args.len() + 1 >= arity)
            })
            .collect();
        if compatible.len() <= 1 {
            return compatible.into_iter().next();
        }
        let score = |m: &MethodInfo| {
            m.signature
                .params
                .iter()
                .zip(args)
                .filter(|(param, arg)| types_match(param, arg))
                .count()
        };
        let best = compatible.iter().map(|m| score(m)).max().unwrap_or(0);
        compatible.into_iter().find(|m| score(m) == best)
    }

    /// Breadth-first method lookup through the type hierarchy
    ///
    /// With `project_only` the search never leaves project types and returns
    /// `None` when nothing matches; otherwise the first external supertype
    /// (ultimately `java.lang.Object`) becomes the callee's owner.
    fn lookup_method(&self, owner: &str, name: &str, args: &[String], project_only: bool) -> Option<Callee> {
        let mut queue = VecDeque::from([owner.to_string()]);
        let mut seen = HashSet::new();
        while let Some(fqn) = queue.pop_front() {
            if !seen.insert(fqn.clone()) {
                continue;
            }
            match self.types.get(&fqn) {
                Some(info) => {
                    if let Some(m) = self.select_overload(info, name, args) {
                        return Some(Callee::Project {
                            signature: m.signature.clone(),
                            is_static: m.is_static,
                        });
                    }
                    queue.extend(info.supertypes().cloned());
                    if info.superclass.is_none() && !project_only {
                        queue.push_back("java.lang.Object".to_string());
                    }
                }
                None if project_only => {}
                None => return Some(Callee::External(external_signature(&fqn, name, args))),
            }
        }
        None
    }

    fn lookup_constructor(&self, owner: &str, args: &[String]) -> Option<Callee> {
        match self.types.get(owner) {
            Some(info) => self
                .select_overload(info, CONSTRUCTOR, args)
                .or_else(|| info.methods.iter().find(|m| m.signature.is_constructor()))
                .map(|m| Callee::Project {
                    signature: m.signature.clone(),
                    is_static: false,
                }),
            None => Some(Callee::External(MethodSignature::constructor(
                owner,
                args.iter().map(|a| external_param(a)).collect(),
            ))),
        }
    }

    /// Project methods overriding `method` in (transitive) subtypes
    fn overrides(&self, method: &MethodSignature) -> Vec<MethodSignature> {
        let mut found = Vec::new();
        let mut queue = VecDeque::from([method.declaring_type.clone()]);
        let mut seen = HashSet::new();
        while let Some(fqn) = queue.pop_front() {
            if !seen.insert(fqn.clone()) {
                continue;
            }
            for sub in self.subtypes.get(&fqn).into_iter().flatten() {
                if let Some(info) = self.types.get(sub) {
                    if let Some(m) = info.methods.iter().find(|m| {
                        m.signature.name == method.name && m.signature.params == method.params
                    }) {
                        found.push(m.signature.clone());
                    }
                }
                queue.push_back(sub.clone());
            }
        }
        found
    }
}

fn external_param(arg: &str) -> String {
    if arg == "null" {
        UNKNOWN_TYPE.to_string()
    } else {
        arg.to_string()
    }
}

fn external_signature(owner: &str, name: &str, args: &[String]) -> MethodSignature {
    MethodSignature::new(
        owner,
        name,
        args.iter().map(|a| external_param(a)).collect(),
        UNKNOWN_TYPE,
    )
}

fn unknown_params(signature: &MethodSignature) -> usize {
    signature.params.iter().filter(|p| *p == UNKNOWN_TYPE).count()
}

/// Strip generics, annotations and whitespace from a written type
fn clean_type(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut depth = 0usize;
    for token in raw.split_whitespace().filter(|t| !t.starts_with('@')) {
        for c in token.chars() {
            match c {
                '<' => depth += 1,
                '>' => depth = depth.saturating_sub(1),
                _ if depth == 0 => out.push(c),
                _ => {}
            }
        }
    }
    out
}

fn types_match(param: &str, arg: &str) -> bool {
    if arg == UNKNOWN_TYPE {
        return false;
    }
    if arg == "null" {
        return !PRIMITIVES.contains(&param);
    }
    param == arg || simple_name_of(param) == simple_name_of(arg)
}

// ============================================================================
// Body resolution
// ============================================================================

struct BodyResolver<'p> {
    index: &'p ProjectIndex,
    file: usize,
    current: String,
    type_params: Vec<String>,
    scopes: Vec<HashMap<String, String>>,
    sites: Vec<CallSite>,
    unresolved: usize,
}

impl<'p> BodyResolver<'p> {
    fn new(index: &'p ProjectIndex, current: &str, extra_type_params: &[String]) -> Self {
        let (file, mut type_params) = match index.types.get(current) {
            Some(info) => (info.file, info.type_params.clone()),
            None => (0, Vec::new()),
        };
        let mut enclosing = index.types.get(current).and_then(|t| t.enclosing.clone());
        while let Some(outer) = enclosing {
            if let Some(info) = index.types.get(&outer) {
                type_params.extend(info.type_params.iter().cloned());
                enclosing = info.enclosing.clone();
            } else {
                break;
            }
        }
        type_params.extend(extra_type_params.iter().cloned());
        Self {
            index,
            file,
            current: current.to_string(),
            type_params,
            scopes: vec![HashMap::new()],
            sites: Vec::new(),
            unresolved: 0,
        }
    }

    fn ctx(&self) -> TypeCtx<'_> {
        TypeCtx {
            file: self.file,
            current: Some(&self.current),
            type_params: &self.type_params,
        }
    }

    fn declare(&mut self, name: &str, type_name: &str) {
        let resolved = self.index.resolve_type(type_name, self.ctx());
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), resolved);
        }
    }

    fn declare_resolved(&mut self, name: &str, resolved: String) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), resolved);
        }
    }

    fn local(&self, name: &str) -> Option<String> {
        self.scopes.iter().rev().find_map(|s| s.get(name).cloned())
    }

    fn superclass(&self) -> Option<String> {
        self.index
            .types
            .get(&self.current)
            .and_then(|t| t.superclass.clone())
    }

    /// Static type of a bare name: local, field, or a type reference
    fn name_type(&self, name: &str) -> Option<String> {
        if let Some(t) = self.local(name) {
            return Some(t);
        }
        let mut owner = Some(self.current.clone());
        while let Some(fqn) = owner {
            if let Some(t) = self.index.field_type(&fqn, name) {
                return Some(t);
            }
            owner = self.index.types.get(&fqn).and_then(|t| t.enclosing.clone());
        }
        if name.starts_with(|c: char| c.is_ascii_uppercase()) {
            return self.index.resolve_simple(name, self.ctx());
        }
        None
    }

    fn resolve_block(&mut self, stmts: &mut [Stmt]) {
        self.scopes.push(HashMap::new());
        for stmt in stmts.iter_mut() {
            self.resolve_stmt(stmt);
        }
        self.scopes.pop();
    }

    fn resolve_stmt(&mut self, stmt: &mut Stmt) {
        if stmt.kind == StmtKind::LocalDecl {
            let types: Vec<Option<String>> = stmt.exprs.iter_mut().map(|e| self.resolve_expr(e)).collect();
            for (i, local) in stmt.declares.iter().enumerate() {
                if clean_type(&local.type_name) == "var" {
                    let inferred = types.get(i).cloned().flatten().unwrap_or_else(|| UNKNOWN_TYPE.to_string());
                    self.declare_resolved(&local.name, inferred);
                } else {
                    self.declare(&local.name, &local.type_name);
                }
            }
            return;
        }

        self.scopes.push(HashMap::new());
        for local in &stmt.declares {
            if clean_type(&local.type_name) == "var" {
                self.declare_resolved(&local.name, UNKNOWN_TYPE.to_string());
            } else {
                self.declare(&local.name, &local.type_name);
            }
        }
        for expr in stmt.exprs.iter_mut() {
            self.resolve_expr(expr);
        }
        for block in stmt.blocks.iter_mut() {
            self.resolve_block(&mut block.stmts);
        }
        self.scopes.pop();
    }

    fn record(&mut self, callee: &Callee, line: usize, virtual_dispatch: bool) {
        let signature = callee.signature().clone();
        let overrides = match callee {
            Callee::Project { is_static: false, .. } if virtual_dispatch && !signature.is_constructor() => {
                self.index.overrides(&signature)
            }
            _ => Vec::new(),
        };
        self.sites.push(CallSite::new(signature, Some(line)));
        for over in overrides {
            self.sites.push(CallSite::new(over, Some(line)));
        }
    }

    /// Resolve an expression in place and return its static type
    fn resolve_expr(&mut self, expr: &mut Expr) -> Option<String> {
        match expr {
            Expr::Invoke(inv) => {
                let receiver_type = match inv.receiver.as_deref_mut() {
                    None => Some(self.current.clone()),
                    Some(Expr::This) => Some(self.current.clone()),
                    Some(Expr::Super) => self.superclass(),
                    Some(recv) => {
                        let typed = self.resolve_expr(recv);
                        typed.or_else(|| self.qualified_type(&*recv))
                    }
                };
                let args: Vec<String> = inv
                    .args
                    .iter_mut()
                    .map(|a| self.resolve_expr(a).unwrap_or_else(|| UNKNOWN_TYPE.to_string()))
                    .collect();

                let via_super = matches!(inv.receiver.as_deref(), Some(Expr::Super));
                let callee = if inv.name == CONSTRUCTOR {
                    receiver_type
                        .as_deref()
                        .and_then(|owner| self.index.lookup_constructor(owner, &args))
                } else if inv.receiver.is_none() {
                    self.resolve_unqualified(&inv.name, &args)
                } else {
                    receiver_type
                        .as_deref()
                        .filter(|t| *t != UNKNOWN_TYPE)
                        .and_then(|owner| self.index.lookup_method(owner, &inv.name, &args, false))
                };

                inv.receiver_type = receiver_type;
                match callee {
                    Some(callee) => {
                        self.record(&callee, inv.line, !via_super);
                        let return_type = match &callee {
                            Callee::Project { signature, .. } if signature.return_type != "void" => {
                                Some(signature.return_type.clone())
                            }
                            _ => None,
                        };
                        inv.target = Some(callee.signature().clone());
                        return_type
                    }
                    None => {
                        trace!("Unresolved call {} at line {}", inv.name, inv.line);
                        self.unresolved += 1;
                        None
                    }
                }
            }
            Expr::New(creation) => {
                let args: Vec<String> = creation
                    .args
                    .iter_mut()
                    .map(|a| self.resolve_expr(a).unwrap_or_else(|| UNKNOWN_TYPE.to_string()))
                    .collect();
                let created = self.index.resolve_type(&creation.type_name, self.ctx());
                if let Some(callee) = self.index.lookup_constructor(&created, &args) {
                    self.record(&callee, creation.line, false);
                    creation.target = Some(callee.signature().clone());
                }
                self.resolve_block(&mut creation.body);
                Some(created)
            }
            Expr::Name(name) => self.name_type(name),
            Expr::This => Some(self.current.clone()),
            Expr::Super => self.superclass(),
            Expr::Field { object, name } => {
                let name = name.clone();
                let owner = match self.resolve_expr(object) {
                    Some(t) => Some(t),
                    None => self.qualified_type(&**object),
                };
                match owner {
                    Some(owner) => self
                        .index
                        .field_type(&owner, &name)
                        .or_else(|| self.index.member_type(&owner, &name)),
                    None => None,
                }
            }
            Expr::Assign { target, value } => {
                self.resolve_expr(value);
                self.resolve_expr(target)
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                self.resolve_expr(condition);
                let a = self.resolve_expr(then);
                let b = self.resolve_expr(otherwise);
                a.or(b)
            }
            Expr::Lambda { params, body } => {
                self.scopes.push(HashMap::new());
                for p in params.iter() {
                    self.declare_resolved(p, UNKNOWN_TYPE.to_string());
                }
                self.resolve_block(body);
                self.scopes.pop();
                None
            }
            Expr::Literal(type_name) if type_name == "null" => None,
            Expr::Literal(type_name) => Some(type_name.clone()),
            Expr::Cast { type_name, value } => {
                self.resolve_expr(value);
                Some(self.index.resolve_type(type_name, self.ctx()))
            }
            Expr::Block(stmts) => {
                self.resolve_block(stmts);
                None
            }
            Expr::Other(parts) => {
                for part in parts.iter_mut() {
                    self.resolve_expr(part);
                }
                None
            }
        }
    }

    /// `org.lib.Util` written as a chain of names
    fn qualified_type(&self, expr: &Expr) -> Option<String> {
        let dotted = dotted_name(expr)?;
        let last = dotted.rsplit('.').next().unwrap_or(&dotted);
        if !last.starts_with(|c: char| c.is_ascii_uppercase()) {
            return None;
        }
        Some(self.index.resolve_type(&dotted, self.ctx()))
    }

    fn resolve_unqualified(&self, name: &str, args: &[String]) -> Option<Callee> {
        if let Some(callee) = self.index.lookup_method(&self.current, name, args, true) {
            return Some(callee);
        }
        let mut enclosing = self.index.types.get(&self.current).and_then(|t| t.enclosing.clone());
        while let Some(outer) = enclosing {
            if let Some(callee) = self.index.lookup_method(&outer, name, args, true) {
                return Some(callee);
            }
            enclosing = self.index.types.get(&outer).and_then(|t| t.enclosing.clone());
        }

        if let Some(scope) = self.index.scopes.get(self.file) {
            if let Some(class) = scope.static_single.get(name) {
                let owner = self.index.canonical(class);
                return self.index.lookup_method(&owner, name, args, false);
            }
            for class in &scope.static_on_demand {
                let owner = self.index.canonical(class);
                if let Some(callee) = self.index.lookup_method(&owner, name, args, true) {
                    return Some(callee);
                }
            }
            if let [only] = scope.static_on_demand.as_slice() {
                let owner = self.index.canonical(only);
                if !self.index.is_known(&owner) {
                    return Some(Callee::External(external_signature(&owner, name, args)));
                }
            }
        }

        self.index.lookup_method(&self.current, name, args, false)
    }
}

fn dotted_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Name(n) => Some(n.clone()),
        Expr::Field { object, name } => Some(format!("{}.{}", dotted_name(object)?, name)),
        _ => None,
    }
}

// ============================================================================
// Project
// ============================================================================

/// Java source tree loaded into a call graph and a source model
#[derive(Debug, Default)]
pub struct JavaProject {
    root: PathBuf,
    index: ProjectIndex,
    bodies: BTreeMap<MethodSignature, Arc<MethodBody>>,
    by_name: HashMap<(String, String), Vec<MethodSignature>>,
    declared: BTreeSet<MethodSignature>,
    calls: BTreeMap<MethodSignature, Vec<CallSite>>,
    public: BTreeSet<MethodSignature>,
    headers: HashMap<String, String>,
}

impl JavaProject {
    /// Parse every `.java` file under `root`
    pub fn load(root: &Path) -> AnalysisResult<Self> {
        if !root.is_dir() {
            return Err(AnalysisError::GraphBuild(format!(
                "source root {} is not a directory",
                root.display()
            )));
        }
        let mut paths = Vec::new();
        collect_java_files(root, &mut paths)?;
        paths.sort();
        if paths.is_empty() {
            return Err(AnalysisError::GraphBuild(format!(
                "no Java sources under {}",
                root.display()
            )));
        }

        let mut files = Vec::with_capacity(paths.len());
        for path in &paths {
            let text = match std::fs::read_to_string(path) {
                Ok(t) => t,
                Err(e) => {
                    warn!("Skipping unreadable source {}: {}", path.display(), e);
                    continue;
                }
            };
            match parse_java(path, &text) {
                Ok(file) => files.push(file),
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }
        info!("Parsed {} Java files under {}", files.len(), root.display());
        Ok(Self::from_parsed(root, files))
    }

    /// Build from in-memory sources, `(path, text)` pairs
    pub fn from_sources(sources: &[(&str, &str)]) -> AnalysisResult<Self> {
        let mut files = Vec::with_capacity(sources.len());
        for (path, text) in sources {
            files.push(parse_java(Path::new(path), text)?);
        }
        Ok(Self::from_parsed(Path::new("."), files))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn type_count(&self) -> usize {
        self.index.types.len()
    }

    pub fn method_count(&self) -> usize {
        self.declared.len()
    }

    /// Declaration text of a type, up to its opening brace
    pub fn type_header(&self, fqn: &str) -> Option<&str> {
        self.headers.get(fqn).map(String::as_str)
    }

    fn from_parsed(root: &Path, files: Vec<ParsedFile>) -> Self {
        let mut project = JavaProject {
            root: root.to_path_buf(),
            ..Default::default()
        };
        project.index.scopes = files.iter().map(FileScope::from_file).collect();

        let decls: Vec<(usize, TypeDecl)> = files
            .into_iter()
            .enumerate()
            .flat_map(|(i, f)| f.types.into_iter().map(move |t| (i, t)))
            .collect();

        for (file, decl) in &decls {
            project.headers.insert(decl.fqn.clone(), decl.header.clone());
            project.index.types.insert(
                decl.fqn.clone(),
                TypeInfo {
                    file: *file,
                    enclosing: decl.enclosing.clone(),
                    type_params: decl.type_params.clone(),
                    superclass: None,
                    interfaces: Vec::new(),
                    fields: HashMap::new(),
                    methods: Vec::new(),
                },
            );
        }

        project.resolve_supertypes(&decls);
        project.resolve_members(&decls);
        project.build_bodies(&decls);
        project.unify_external_targets();

        info!(
            "Java model: {} types, {} methods, {} entry points",
            project.index.types.len(),
            project.declared.len(),
            project.public.len()
        );
        project
    }

    fn type_params_of(&self, fqn: &str) -> Vec<String> {
        let mut params = Vec::new();
        let mut current = Some(fqn.to_string());
        while let Some(t) = current {
            match self.index.types.get(&t) {
                Some(info) => {
                    params.extend(info.type_params.iter().cloned());
                    current = info.enclosing.clone();
                }
                None => break,
            }
        }
        params
    }

    fn resolve_supertypes(&mut self, decls: &[(usize, TypeDecl)]) {
        let resolved: Vec<(String, Option<String>, Vec<String>)> = decls
            .iter()
            .map(|(file, decl)| {
                let params = self.type_params_of(&decl.fqn);
                // supertypes are resolved from the enclosing scope
                let ctx = TypeCtx {
                    file: *file,
                    current: decl.enclosing.as_deref(),
                    type_params: &params,
                };
                let superclass = match decl.kind {
                    TypeKind::Enum => Some("java.lang.Enum".to_string()),
                    TypeKind::Record => Some("java.lang.Record".to_string()),
                    _ => decl.superclass.as_deref().map(|s| self.index.resolve_type(s, ctx)),
                };
                let interfaces = decl
                    .interfaces
                    .iter()
                    .map(|i| self.index.resolve_type(i, ctx))
                    .collect();
                (decl.fqn.clone(), superclass, interfaces)
            })
            .collect();

        for (fqn, superclass, interfaces) in resolved {
            for sup in superclass.iter().chain(interfaces.iter()) {
                self.index
                    .subtypes
                    .entry(sup.clone())
                    .or_default()
                    .push(fqn.clone());
            }
            if let Some(info) = self.index.types.get_mut(&fqn) {
                info.superclass = superclass;
                info.interfaces = interfaces;
            }
        }
    }

    fn method_signature(&self, owner: &str, file: usize, method: &MethodDecl) -> MethodSignature {
        let mut params = self.type_params_of(owner);
        params.extend(method.type_params.iter().cloned());
        let ctx = TypeCtx {
            file,
            current: Some(owner),
            type_params: &params,
        };
        MethodSignature::new(
            owner,
            method.name.clone(),
            method
                .params
                .iter()
                .map(|p| self.index.resolve_type(&p.type_name, ctx))
                .collect(),
            self.index.resolve_type(&method.return_type, ctx),
        )
    }

    fn resolve_members(&mut self, decls: &[(usize, TypeDecl)]) {
        let mut resolved = Vec::with_capacity(decls.len());
        for (file, decl) in decls {
            let params = self.type_params_of(&decl.fqn);
            let ctx = TypeCtx {
                file: *file,
                current: Some(&decl.fqn),
                type_params: &params,
            };
            let mut fields: HashMap<String, String> = decl
                .fields
                .iter()
                .map(|f| (f.name.clone(), self.index.resolve_type(&f.type_name, ctx)))
                .collect();
            for component in &decl.record_components {
                fields
                    .entry(component.name.clone())
                    .or_insert_with(|| self.index.resolve_type(&component.type_name, ctx));
            }

            let mut methods: Vec<MethodInfo> = decl
                .methods
                .iter()
                .map(|m| MethodInfo {
                    signature: self.method_signature(&decl.fqn, *file, m),
                    varargs: m.varargs,
                    is_static: m.is_static,
                })
                .collect();

            if let Some(implicit) = implicit_constructor(decl) {
                let signature = MethodSignature::constructor(
                    decl.fqn.clone(),
                    implicit
                        .params
                        .iter()
                        .map(|p| self.index.resolve_type(&p.type_name, ctx))
                        .collect(),
                );
                methods.push(MethodInfo {
                    signature,
                    varargs: false,
                    is_static: false,
                });
            }
            if !decl.static_init.is_empty() {
                methods.push(MethodInfo {
                    signature: MethodSignature::static_initializer(decl.fqn.clone()),
                    varargs: false,
                    is_static: true,
                });
            }
            resolved.push((decl.fqn.clone(), fields, methods));
        }

        for (fqn, fields, methods) in resolved {
            if let Some(info) = self.index.types.get_mut(&fqn) {
                info.fields = fields;
                info.methods = methods;
            }
        }
    }

    /// One signature per external (owner, name, arity)
    ///
    /// External parameter lists come from argument types at each call site,
    /// so calls to the same library method can disagree (`?` where an
    /// argument could not be typed). The most specific variant wins, first
    /// seen on ties.
    fn unify_external_targets(&mut self) {
        let mut canonical: HashMap<(String, String, usize), MethodSignature> = HashMap::new();
        for site in self.calls.values().flatten() {
            let target = &site.target;
            if self.declared.contains(target) {
                continue;
            }
            let key = (target.declaring_type.clone(), target.name.clone(), target.params.len());
            let replace = canonical
                .get(&key)
                .map_or(true, |current| unknown_params(target) < unknown_params(current));
            if replace {
                canonical.insert(key, target.clone());
            }
        }

        let mut merged = 0usize;
        for sites in self.calls.values_mut() {
            for site in sites.iter_mut() {
                if self.declared.contains(&site.target) {
                    continue;
                }
                let key = (
                    site.target.declaring_type.clone(),
                    site.target.name.clone(),
                    site.target.params.len(),
                );
                if let Some(unified) = canonical.get(&key) {
                    if *unified != site.target {
                        site.target = unified.clone();
                        merged += 1;
                    }
                }
            }
        }
        if merged > 0 {
            debug!("Merged {} external call sites into shared signatures", merged);
        }
    }

    fn build_bodies(&mut self, decls: &[(usize, TypeDecl)]) {
        let mut unresolved = 0usize;
        for (_, decl) in decls {
            // instance initializers run inside every constructor
            let mut init_resolver = BodyResolver::new(&self.index, &decl.fqn, &[]);
            let mut instance_init = decl.instance_init.clone();
            init_resolver.resolve_block(&mut instance_init);
            let init_sites = std::mem::take(&mut init_resolver.sites);
            unresolved += init_resolver.unresolved;

            let superclass = self
                .index
                .types
                .get(&decl.fqn)
                .and_then(|t| t.superclass.clone());

            let mut declared_methods: Vec<(MethodSignature, Option<&MethodDecl>)> = Vec::new();
            if let Some(info) = self.index.types.get(&decl.fqn) {
                let mut explicit = decl.methods.iter();
                for m in &info.methods {
                    if m.signature.is_static_initializer() {
                        declared_methods.push((m.signature.clone(), None));
                    } else {
                        declared_methods.push((m.signature.clone(), explicit.next()));
                    }
                }
            }

            for (signature, method) in declared_methods {
                self.declared.insert(signature.clone());
                self.by_name
                    .entry((signature.declaring_type.clone(), signature.name.clone()))
                    .or_default()
                    .push(signature.clone());

                if signature.is_static_initializer() {
                    let mut resolver = BodyResolver::new(&self.index, &decl.fqn, &[]);
                    let mut stmts = decl.static_init.clone();
                    resolver.resolve_block(&mut stmts);
                    unresolved += resolver.unresolved;
                    let sites = std::mem::take(&mut resolver.sites);
                    self.calls.insert(signature.clone(), sites);
                    self.bodies.insert(signature.clone(), Arc::new(static_initializer_body(signature, stmts)));
                    continue;
                }

                let (header, source, line, mut stmts, type_params, params, is_public, explicit_call) =
                    match method {
                        Some(m) => (
                            m.header.clone(),
                            m.source.clone(),
                            m.line,
                            m.body.clone(),
                            m.type_params.clone(),
                            m.params.clone(),
                            m.is_public,
                            m.explicit_constructor_call,
                        ),
                        None => {
                            let implicit = implicit_constructor(decl).unwrap_or_default();
                            (
                                implicit.header.clone(),
                                format!("{} {{\n}}", implicit.header),
                                decl.line,
                                Vec::new(),
                                Vec::new(),
                                implicit.params.clone(),
                                implicit.is_public,
                                false,
                            )
                        }
                    };
                let has_body = method.map(|m| !m.body.is_empty() || m.source.trim_end().ends_with('}')).unwrap_or(true);

                let mut resolver = BodyResolver::new(&self.index, &decl.fqn, &type_params);
                for p in &params {
                    resolver.declare(&p.name, &p.type_name);
                }
                resolver.resolve_block(&mut stmts);
                unresolved += resolver.unresolved;

                let mut sites = Vec::new();
                if signature.is_constructor() {
                    let calls_this = stmts.first().is_some_and(|s| {
                        s.kind == StmtKind::ConstructorCall
                            && s.exprs.iter().any(|e| matches!(e, Expr::Invoke(inv) if matches!(inv.receiver.as_deref(), Some(Expr::This))))
                    });
                    if !explicit_call && decl.kind == TypeKind::Class {
                        if let Some(callee) = superclass
                            .as_deref()
                            .and_then(|s| self.index.lookup_constructor(s, &[]))
                        {
                            sites.push(CallSite::new(callee.signature().clone(), Some(line)));
                        }
                    }
                    if !calls_this {
                        sites.extend(init_sites.iter().cloned());
                    }
                }
                sites.extend(resolver.sites);

                if is_public {
                    self.public.insert(signature.clone());
                }
                self.calls.insert(signature.clone(), sites);
                if has_body {
                    self.bodies.insert(
                        signature.clone(),
                        Arc::new(MethodBody {
                            signature,
                            header,
                            source,
                            line,
                            statements: stmts,
                        }),
                    );
                }
            }
        }
        if unresolved > 0 {
            debug!("{} invocations could not be resolved to a callee", unresolved);
        }
    }

    /// Candidate bodies for a signature, best match first
    fn lookup_body(&self, method: &MethodSignature) -> Option<&Arc<MethodBody>> {
        if let Some(body) = self.bodies.get(method) {
            return Some(body);
        }
        let candidates: Vec<&MethodSignature> = self
            .by_name
            .get(&(method.declaring_type.clone(), method.name.clone()))?
            .iter()
            .filter(|s| self.bodies.contains_key(*s))
            .collect();

        let chosen = candidates
            .iter()
            .find(|s| s.params == method.params)
            .or_else(|| (candidates.len() == 1).then(|| &candidates[0]))
            .or_else(|| {
                candidates.iter().find(|s| {
                    s.params.len() == method.params.len()
                        && s.params.iter().zip(&method.params).all(|(a, b)| types_match(a, b))
                })
            })
            .or_else(|| candidates.iter().find(|s| s.params.len() == method.params.len()))
            .or_else(|| candidates.first())?;
        self.bodies.get(*chosen)
    }
}

#[derive(Debug, Clone, Default)]
struct ImplicitConstructor {
    header: String,
    params: Vec<super::ast::Local>,
    is_public: bool,
}

/// Default (or canonical record) constructor the compiler would generate
fn implicit_constructor(decl: &TypeDecl) -> Option<ImplicitConstructor> {
    let arities: Vec<usize> = decl
        .methods
        .iter()
        .filter(|m| m.is_constructor())
        .map(|m| m.params.len())
        .collect();
    match decl.kind {
        TypeKind::Class | TypeKind::Enum if arities.is_empty() => {
            let is_public = decl.kind == TypeKind::Class && decl.is_public;
            let header = if is_public {
                format!("public {}()", decl.simple_name)
            } else {
                format!("{}()", decl.simple_name)
            };
            Some(ImplicitConstructor {
                header,
                params: Vec::new(),
                is_public,
            })
        }
        TypeKind::Record if !arities.contains(&decl.record_components.len()) => {
            let rendered: Vec<String> = decl
                .record_components
                .iter()
                .map(|c| format!("{} {}", c.type_name, c.name))
                .collect();
            Some(ImplicitConstructor {
                header: format!("public {}({})", decl.simple_name, rendered.join(", ")),
                params: decl.record_components.clone(),
                is_public: decl.is_public,
            })
        }
        _ => None,
    }
}

fn static_initializer_body(signature: MethodSignature, stmts: Vec<Stmt>) -> MethodBody {
    let line = stmts.first().map(|s| s.line).unwrap_or(0);
    let mut source = String::from("static {\n");
    for stmt in &stmts {
        for l in super::dedent(&stmt.text, stmt.column).lines() {
            source.push_str("    ");
            source.push_str(l);
            source.push('\n');
        }
    }
    source.push('}');
    MethodBody {
        signature,
        header: "static".to_string(),
        source,
        line,
        statements: stmts,
    }
}

fn collect_java_files(dir: &Path, out: &mut Vec<PathBuf>) -> AnalysisResult<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| AnalysisError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| AnalysisError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            collect_java_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "java") {
            out.push(path);
        }
    }
    Ok(())
}

// ============================================================================
// Provider implementations
// ============================================================================

impl CallGraphProvider for JavaProject {
    fn all_method_signatures(&self) -> BTreeSet<MethodSignature> {
        let mut all = self.declared.clone();
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

impl SourceModelProvider for JavaProject {
    fn method_body(&self, method: &MethodSignature) -> AnalysisResult<Arc<MethodBody>> {
        self.lookup_body(method)
            .cloned()
            .ok_or_else(|| AnalysisError::NotFound(method.to_string()))
    }

    fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        self.index.is_subtype(sub, sup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"package com.acme;

import org.lib.http.HttpClient;
import org.lib.base.RemoteBase;

public class Service extends RemoteBase {
    private final HttpClient client = new HttpClient();
    private Helper helper;

    public Service(Helper helper) {
        this.helper = helper;
    }

    public void run(String url) {
        helper.prepare(url);
        client.execute(url);
        String trimmed = url.trim();
        connect();
    }

    public void overload(int a) {}
    public void overload(String s) { overload(1); }
}
"#;

    const HELPER: &str = r#"package com.acme;

import java.util.List;

abstract class Helper {
    abstract void prepare(String url);

    static class Impl extends Helper {
        void prepare(String url) {
            List<String> parts = List.of(url);
        }
    }
}
"#;

    const NESTED: &str = r#"package com.acme.util;

import static org.lib.Checks.notNull;

public enum Mode {
    FAST("f"), SLOW("s");

    private final String code;

    Mode(String code) {
        notNull(code);
        this.code = code;
    }
}
"#;

    fn project() -> JavaProject {
        JavaProject::from_sources(&[
            ("Service.java", BASE),
            ("Helper.java", HELPER),
            ("Mode.java", NESTED),
        ])
        .unwrap()
    }

    fn sig(s: &str) -> MethodSignature {
        s.parse().unwrap()
    }

    fn targets(p: &JavaProject, caller: &MethodSignature) -> Vec<String> {
        p.calls_from(caller)
            .into_iter()
            .map(|c| c.target.with_params())
            .collect()
    }

    #[test]
    fn test_types_and_entry_points() {
        let p = project();
        assert_eq!(p.type_count(), 4);
        let entries = p.entry_points();
        assert!(entries.contains(&sig("com.acme.Service.run(java.lang.String)")));
        assert!(entries.contains(&sig("com.acme.Service.<init>(com.acme.Helper)")));
        assert!(!entries.contains(&sig("com.acme.Helper$Impl.prepare(java.lang.String)")));
        assert_eq!(p.type_header("com.acme.Service"), Some("public class Service extends RemoteBase"));
    }

    #[test]
    fn test_calls_resolve_receivers_and_imports() {
        let p = project();
        let run = sig("com.acme.Service.run(java.lang.String)");
        let calls = targets(&p, &run);
        assert!(calls.contains(&"com.acme.Helper.prepare(java.lang.String)".to_string()));
        // virtual dispatch into the project subtype
        assert!(calls.contains(&"com.acme.Helper$Impl.prepare(java.lang.String)".to_string()));
        assert!(calls.contains(&"org.lib.http.HttpClient.execute(java.lang.String)".to_string()));
        assert!(calls.contains(&"java.lang.String.trim()".to_string()));
        // inherited from an external superclass
        assert!(calls.contains(&"org.lib.base.RemoteBase.connect()".to_string()));
    }

    #[test]
    fn test_constructor_edges() {
        let p = project();
        let ctor = sig("com.acme.Service.<init>(com.acme.Helper)");
        let sites = p.calls_from(&ctor);
        let calls: Vec<_> = sites.iter().map(|s| s.target.with_params()).collect();
        assert_eq!(calls[0], "org.lib.base.RemoteBase.<init>()");
        assert_eq!(sites[0].line, Some(10));
        assert!(calls.contains(&"org.lib.http.HttpClient.<init>()".to_string()));

        // implicit default constructor of the nested class
        let impl_ctor = sig("com.acme.Helper$Impl.<init>()");
        assert!(p.all_method_signatures().contains(&impl_ctor));
        assert_eq!(targets(&p, &impl_ctor), vec!["com.acme.Helper.<init>()".to_string()]);
    }

    #[test]
    fn test_static_imports_and_enum_initializer() {
        let p = project();
        let ctor = sig("com.acme.util.Mode.<init>(java.lang.String)");
        assert!(targets(&p, &ctor).contains(&"org.lib.Checks.notNull(java.lang.String)".to_string()));

        let clinit = MethodSignature::static_initializer("com.acme.util.Mode");
        let calls = targets(&p, &clinit);
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c == "com.acme.util.Mode.<init>(java.lang.String)"));
        let body = p.method_body(&clinit).unwrap();
        assert_eq!(body.header, "static");
        assert_eq!(body.statements.len(), 2);
    }

    #[test]
    fn test_overload_selection() {
        let p = project();
        let caller = sig("com.acme.Service.overload(java.lang.String)");
        assert_eq!(targets(&p, &caller), vec!["com.acme.Service.overload(int)".to_string()]);
    }

    #[test]
    fn test_body_lookup_cascade() {
        let p = project();
        let exact = p.method_body(&sig("com.acme.Service.run(java.lang.String)")).unwrap();
        assert_eq!(exact.header, "public void run(String url)");
        // unique by name, parameters ignored
        let by_name = p.method_body(&sig("com.acme.Service.run()")).unwrap();
        assert_eq!(by_name.signature, exact.signature);
        // arity + simple type names
        let by_type = p.method_body(&sig("com.acme.Service.overload(String)")).unwrap();
        assert_eq!(by_type.signature.params, vec!["java.lang.String"]);

        let missing = p.method_body(&sig("com.acme.Nope.run()")).unwrap_err();
        assert!(missing.is_not_found());
        // abstract methods have no body
        assert!(p.method_body(&sig("com.acme.Helper.prepare(java.lang.String)")).is_err());
    }

    #[test]
    fn test_subtypes() {
        let p = project();
        assert!(p.is_subtype("com.acme.Helper$Impl", "com.acme.Helper"));
        assert!(p.is_subtype("com.acme.Service", "org.lib.base.RemoteBase"));
        assert!(!p.is_subtype("com.acme.Helper", "com.acme.Helper$Impl"));
    }

    #[test]
    fn test_external_call_sites_share_one_signature() {
        let p = JavaProject::from_sources(&[(
            "Svc.java",
            r#"package com.acme;

import org.lib.Client;
import org.lib.Factory;
import org.lib.Request;

public class Svc {
    private Client client;

    public void a(Request r) {
        client.execute(r);
    }

    public void b(Factory f) {
        client.execute(f.make());
        client.execute(null, 2);
    }
}
"#,
        )])
        .unwrap();

        let a = targets(&p, &sig("com.acme.Svc.a(org.lib.Request)"));
        assert_eq!(a, vec!["org.lib.Client.execute(org.lib.Request)".to_string()]);
        let b = targets(&p, &sig("com.acme.Svc.b(org.lib.Factory)"));
        assert!(b.contains(&"org.lib.Client.execute(org.lib.Request)".to_string()));
        assert!(b.contains(&"org.lib.Factory.make()".to_string()));
        // a different arity stays a separate target
        assert!(b.contains(&"org.lib.Client.execute(?, int)".to_string()));
        assert!(!b.iter().any(|t| t == "org.lib.Client.execute(?)"));
    }

    #[test]
    fn test_interface_members_are_entry_points() {
        let p = JavaProject::from_sources(&[(
            "Api.java",
            r#"package com.acme;

public interface Api {
    String fetch(String url);

    default String describe() {
        return fetch("x");
    }

    private void hidden() {}
}
"#,
        )])
        .unwrap();
        let entries = p.entry_points();
        assert!(entries.contains(&sig("com.acme.Api.fetch(java.lang.String)")));
        assert!(entries.contains(&sig("com.acme.Api.describe()")));
        assert!(!entries.contains(&sig("com.acme.Api.hidden()")));
    }

    #[test]
    fn test_load_rejects_empty_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = JavaProject::load(dir.path()).unwrap_err();
        assert!(matches!(err, AnalysisError::GraphBuild(_)));
        let err = JavaProject::load(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, AnalysisError::GraphBuild(_)));
    }
}
