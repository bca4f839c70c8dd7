//! Java front end built on tree-sitter
//!
//! Converts one compilation unit into owned declarations whose bodies use
//! the tree in [`super::ast`]. Type names are kept as written; resolution
//! happens afterwards in [`super::resolve`].

use std::path::{Path, PathBuf};
use tracing::debug;
use tree_sitter::{Node, Parser};

use super::ast::{Block, BlockStyle, Creation, Expr, Invocation, Local, Stmt, StmtKind};
use super::dedent;
use crate::error::{AnalysisError, AnalysisResult};
use crate::model::CONSTRUCTOR;

#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub path: PathBuf,
    pub package: String,
    pub imports: Vec<Import>,
    pub types: Vec<TypeDecl>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub name: String,
    pub is_static: bool,
    pub on_demand: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Interface,
    Enum,
    Record,
    Annotation,
}

#[derive(Debug, Clone)]
pub struct TypeDecl {
    /// Fully qualified, nested types joined with `$`
    pub fqn: String,
    pub simple_name: String,
    pub kind: TypeKind,
    pub line: usize,
    pub is_public: bool,
    pub enclosing: Option<String>,
    pub type_params: Vec<String>,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    /// Declaration text up to the opening brace
    pub header: String,
    pub fields: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
    /// Static field initializers, static blocks and enum constants
    pub static_init: Vec<Stmt>,
    /// Instance field initializers and instance initializer blocks
    pub instance_init: Vec<Stmt>,
    pub record_components: Vec<Local>,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub type_name: String,
    pub is_static: bool,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub struct MethodDecl {
    /// Method name, `<init>` for constructors
    pub name: String,
    pub params: Vec<Local>,
    pub varargs: bool,
    pub return_type: String,
    pub type_params: Vec<String>,
    pub is_public: bool,
    pub is_static: bool,
    pub header: String,
    pub source: String,
    pub line: usize,
    pub body: Vec<Stmt>,
    pub explicit_constructor_call: bool,
}

impl MethodDecl {
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR
    }
}

/// Parse one Java compilation unit
pub fn parse_java(path: &Path, text: &str) -> AnalysisResult<ParsedFile> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_java::language())
        .map_err(|e| AnalysisError::parse(path, e.to_string()))?;
    let tree = parser
        .parse(text, None)
        .ok_or_else(|| AnalysisError::parse(path, "parser produced no tree"))?;
    let root = tree.root_node();
    if root.has_error() {
        debug!("{} has syntax errors, using the recovered tree", path.display());
    }

    let mut converter = Converter::new(text);
    let mut file = ParsedFile {
        path: path.to_path_buf(),
        package: String::new(),
        imports: Vec::new(),
        types: Vec::new(),
    };

    for child in named_children(root) {
        match child.kind() {
            "package_declaration" => {
                if let Some(name) = named_children(child)
                    .into_iter()
                    .find(|n| matches!(n.kind(), "scoped_identifier" | "identifier"))
                {
                    file.package = converter.text(name).to_string();
                }
            }
            "import_declaration" => file.imports.push(converter.import(child)),
            kind if is_type_declaration(kind) => {
                let package = file.package.clone();
                converter.type_decl(child, &package, None, &mut file.types);
            }
            _ => {}
        }
    }

    Ok(file)
}

fn is_type_declaration(kind: &str) -> bool {
    matches!(
        kind,
        "class_declaration"
            | "interface_declaration"
            | "enum_declaration"
            | "record_declaration"
            | "annotation_type_declaration"
    )
}

fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

fn fields_named<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor).collect()
}

fn line_of(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

/// Collapse a multi-line declaration header onto one line
fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

struct Converter<'s> {
    src: &'s str,
    next_id: usize,
}

impl<'s> Converter<'s> {
    fn new(src: &'s str) -> Self {
        Self { src, next_id: 0 }
    }

    fn text(&self, node: Node<'_>) -> &'s str {
        &self.src[node.byte_range()]
    }

    fn field_text(&self, node: Node<'_>, field: &str) -> Option<String> {
        node.child_by_field_name(field)
            .map(|n| self.text(n).to_string())
    }

    fn modifiers(&self, node: Node<'_>) -> Vec<&'static str> {
        named_children(node)
            .into_iter()
            .find(|n| n.kind() == "modifiers")
            .map(|mods| {
                children(mods)
                    .into_iter()
                    .map(|m| m.kind())
                    .filter(|k| matches!(*k, "public" | "private" | "protected" | "static" | "abstract" | "default"))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn type_params(&self, node: Node<'_>) -> Vec<String> {
        node.child_by_field_name("type_parameters")
            .map(|tp| {
                named_children(tp)
                    .into_iter()
                    .filter(|n| n.kind() == "type_parameter")
                    .filter_map(|n| named_children(n).into_iter().next())
                    .map(|n| self.text(n).to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn import(&self, node: Node<'_>) -> Import {
        let kids = children(node);
        let name = kids
            .iter()
            .find(|n| matches!(n.kind(), "scoped_identifier" | "identifier"))
            .map(|n| self.text(*n).to_string())
            .unwrap_or_default();
        Import {
            name,
            is_static: kids.iter().any(|n| n.kind() == "static"),
            on_demand: kids.iter().any(|n| n.kind() == "asterisk"),
        }
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn type_decl(
        &mut self,
        node: Node<'_>,
        package: &str,
        enclosing: Option<(&str, TypeKind)>,
        out: &mut Vec<TypeDecl>,
    ) {
        let simple_name = match self.field_text(node, "name") {
            Some(name) => name,
            None => return,
        };
        let fqn = match (enclosing, package.is_empty()) {
            (Some((outer, _)), _) => format!("{}${}", outer, simple_name),
            (None, true) => simple_name.clone(),
            (None, false) => format!("{}.{}", package, simple_name),
        };
        let kind = match node.kind() {
            "interface_declaration" => TypeKind::Interface,
            "enum_declaration" => TypeKind::Enum,
            "record_declaration" => TypeKind::Record,
            "annotation_type_declaration" => TypeKind::Annotation,
            _ => TypeKind::Class,
        };
        let mods = self.modifiers(node);
        let in_interface = matches!(enclosing, Some((_, TypeKind::Interface)));

        let superclass = node
            .child_by_field_name("superclass")
            .and_then(|s| named_children(s).into_iter().next())
            .map(|t| self.text(t).to_string());

        let mut interfaces = Vec::new();
        let interface_lists = node
            .child_by_field_name("interfaces")
            .into_iter()
            .chain(named_children(node).into_iter().filter(|n| n.kind() == "extends_interfaces"));
        for list in interface_lists {
            for type_list in named_children(list) {
                for t in named_children(type_list) {
                    interfaces.push(self.text(t).to_string());
                }
            }
        }

        let body = node.child_by_field_name("body");
        let header_end = body.map(|b| b.start_byte()).unwrap_or_else(|| node.end_byte());
        let header = one_line(&self.src[node.start_byte()..header_end]);

        let record_components = if kind == TypeKind::Record {
            self.parameters(node.child_by_field_name("parameters")).0
        } else {
            Vec::new()
        };

        let mut decl = TypeDecl {
            fqn: fqn.clone(),
            simple_name,
            kind,
            line: line_of(node),
            is_public: mods.contains(&"public") || in_interface,
            enclosing: enclosing.map(|(outer, _)| outer.to_string()),
            type_params: self.type_params(node),
            superclass,
            interfaces,
            header,
            fields: Vec::new(),
            methods: Vec::new(),
            static_init: Vec::new(),
            instance_init: Vec::new(),
            record_components,
        };

        if let Some(body) = body {
            for member in named_children(body) {
                if member.kind() == "enum_body_declarations" {
                    for inner in named_children(member) {
                        self.member(inner, package, &mut decl, out);
                    }
                } else {
                    self.member(member, package, &mut decl, out);
                }
            }
        }

        out.push(decl);
    }

    fn member(&mut self, node: Node<'_>, package: &str, decl: &mut TypeDecl, out: &mut Vec<TypeDecl>) {
        match node.kind() {
            "field_declaration" | "constant_declaration" => self.field(node, decl),
            "method_declaration" => {
                let method = self.method(node, decl.kind);
                decl.methods.push(method);
            }
            "constructor_declaration" | "compact_constructor_declaration" => {
                let mut ctor = self.method(node, decl.kind);
                if node.kind() == "compact_constructor_declaration" {
                    ctor.params = decl.record_components.clone();
                }
                decl.methods.push(ctor);
            }
            "static_initializer" => {
                if let Some(block) = named_children(node).into_iter().find(|n| n.kind() == "block") {
                    if let Some(stmt) = self.stmt(block) {
                        decl.static_init.push(stmt);
                    }
                }
            }
            "block" => {
                if let Some(stmt) = self.stmt(node) {
                    decl.instance_init.push(stmt);
                }
            }
            "enum_constant" => {
                let args = self.arguments(node);
                let body = named_children(node)
                    .into_iter()
                    .find(|n| n.kind() == "class_body")
                    .map(|b| self.anonymous_body(b))
                    .unwrap_or_default();
                let creation = Expr::New(Creation {
                    type_name: decl.simple_name.clone(),
                    args,
                    line: line_of(node),
                    body,
                    target: None,
                });
                let mut stmt = self.new_stmt(node, StmtKind::Expression);
                stmt.exprs.push(creation);
                decl.static_init.push(stmt);
            }
            kind if is_type_declaration(kind) => {
                let enclosing = decl.fqn.clone();
                self.type_decl(node, package, Some((&enclosing, decl.kind)), out);
            }
            _ => {}
        }
    }

    fn field(&mut self, node: Node<'_>, decl: &mut TypeDecl) {
        let type_name = self.field_text(node, "type").unwrap_or_default();
        let is_static = self.modifiers(node).contains(&"static")
            || node.kind() == "constant_declaration"
            || decl.kind == TypeKind::Interface;

        for declarator in fields_named(node, "declarator") {
            let name = match self.field_text(declarator, "name") {
                Some(n) => n,
                None => continue,
            };
            let dims = self.field_text(declarator, "dimensions").unwrap_or_default();
            let full_type = format!("{}{}", type_name, dims);
            decl.fields.push(FieldDecl {
                name: name.clone(),
                type_name: full_type.clone(),
                is_static,
                line: line_of(declarator),
            });

            if let Some(value) = declarator.child_by_field_name("value") {
                let mut stmt = self.new_stmt(node, StmtKind::LocalDecl);
                stmt.declares.push(Local::new(name, full_type));
                stmt.exprs.push(self.expr(value));
                if is_static {
                    decl.static_init.push(stmt);
                } else {
                    decl.instance_init.push(stmt);
                }
            }
        }
    }

    fn method(&mut self, node: Node<'_>, owner: TypeKind) -> MethodDecl {
        let is_ctor = matches!(
            node.kind(),
            "constructor_declaration" | "compact_constructor_declaration"
        );
        let name = if is_ctor {
            CONSTRUCTOR.to_string()
        } else {
            self.field_text(node, "name").unwrap_or_default()
        };
        let mods = self.modifiers(node);
        let (params, varargs) = self.parameters(node.child_by_field_name("parameters"));
        let return_type = if is_ctor {
            "void".to_string()
        } else {
            let dims = self.field_text(node, "dimensions").unwrap_or_default();
            format!("{}{}", self.field_text(node, "type").unwrap_or_default(), dims)
        };

        let body = node.child_by_field_name("body");
        let header = match body {
            Some(b) => one_line(&self.src[node.start_byte()..b.start_byte()]),
            None => one_line(self.text(node).trim_end_matches(';')),
        };

        let mut explicit_constructor_call = false;
        let stmts = match body {
            Some(b) => {
                explicit_constructor_call = named_children(b)
                    .iter()
                    .any(|n| n.kind() == "explicit_constructor_invocation");
                self.stmt_list(b)
            }
            None => Vec::new(),
        };

        MethodDecl {
            name,
            params,
            varargs,
            return_type,
            type_params: self.type_params(node),
            is_public: mods.contains(&"public")
                || (owner == TypeKind::Interface && !mods.contains(&"private")),
            is_static: mods.contains(&"static"),
            header,
            source: dedent(self.text(node), node.start_position().column),
            line: line_of(node),
            body: stmts,
            explicit_constructor_call,
        }
    }

    fn parameters(&self, node: Option<Node<'_>>) -> (Vec<Local>, bool) {
        let mut params = Vec::new();
        let mut varargs = false;
        let node = match node {
            Some(n) => n,
            None => return (params, varargs),
        };
        for child in named_children(node) {
            match child.kind() {
                "formal_parameter" => {
                    let type_name = self.field_text(child, "type").unwrap_or_default();
                    let dims = self.field_text(child, "dimensions").unwrap_or_default();
                    if let Some(name) = self.field_text(child, "name") {
                        params.push(Local::new(name, format!("{}{}", type_name, dims)));
                    }
                }
                "spread_parameter" => {
                    let kids = named_children(child);
                    let type_name = kids
                        .iter()
                        .find(|n| !matches!(n.kind(), "modifiers" | "variable_declarator"))
                        .map(|n| self.text(*n).to_string())
                        .unwrap_or_default();
                    let name = kids
                        .iter()
                        .find(|n| n.kind() == "variable_declarator")
                        .and_then(|d| self.field_text(*d, "name"))
                        .unwrap_or_default();
                    params.push(Local::new(name, format!("{}...", type_name)));
                    varargs = true;
                }
                _ => {}
            }
        }
        (params, varargs)
    }

    /// Methods and initialized fields of an anonymous class body
    fn anonymous_body(&mut self, class_body: Node<'_>) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        for member in named_children(class_body) {
            match member.kind() {
                "method_declaration" => {
                    let body = match member.child_by_field_name("body") {
                        Some(b) => b,
                        None => continue,
                    };
                    let (params, _) = self.parameters(member.child_by_field_name("parameters"));
                    let mut stmt = self.new_stmt(member, StmtKind::Block);
                    stmt.declares = params;
                    stmt.blocks.push(self.block(body, member));
                    stmts.push(stmt);
                }
                "field_declaration" => {
                    let type_name = self.field_text(member, "type").unwrap_or_default();
                    for declarator in fields_named(member, "declarator") {
                        if let (Some(name), Some(value)) = (
                            self.field_text(declarator, "name"),
                            declarator.child_by_field_name("value"),
                        ) {
                            let mut stmt = self.new_stmt(member, StmtKind::LocalDecl);
                            stmt.declares.push(Local::new(name, type_name.clone()));
                            stmt.exprs.push(self.expr(value));
                            stmts.push(stmt);
                        }
                    }
                }
                _ => {}
            }
        }
        stmts
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn new_stmt(&mut self, node: Node<'_>, kind: StmtKind) -> Stmt {
        let id = self.next_id;
        self.next_id += 1;
        Stmt {
            id,
            kind,
            line: line_of(node),
            column: node.start_position().column,
            text: self.text(node).to_string(),
            declares: Vec::new(),
            exprs: Vec::new(),
            blocks: Vec::new(),
            assigned: None,
        }
    }

    fn stmt_list(&mut self, block: Node<'_>) -> Vec<Stmt> {
        named_children(block)
            .into_iter()
            .filter_map(|n| self.stmt(n))
            .collect()
    }

    /// Nested body of `owner`, with its range relative to the owner's text
    fn block(&mut self, body: Node<'_>, owner: Node<'_>) -> Block {
        let base = owner.start_byte();
        if body.kind() == "block" {
            let start = body.start_byte() + 1;
            let end = body.end_byte().saturating_sub(1).max(start);
            Block {
                start: start - base,
                end: end - base,
                style: BlockStyle::Braced,
                stmts: self.stmt_list(body),
            }
        } else {
            Block {
                start: body.start_byte() - base,
                end: body.end_byte() - base,
                style: BlockStyle::Bare,
                stmts: self.stmt(body).into_iter().collect(),
            }
        }
    }

    fn local_declarators(&mut self, node: Node<'_>, stmt: &mut Stmt) {
        let type_name = self.field_text(node, "type").unwrap_or_default();
        for declarator in fields_named(node, "declarator") {
            if let Some(name) = self.field_text(declarator, "name") {
                let dims = self.field_text(declarator, "dimensions").unwrap_or_default();
                stmt.declares.push(Local::new(name, format!("{}{}", type_name, dims)));
            }
            if let Some(value) = declarator.child_by_field_name("value") {
                let value = self.expr(value);
                stmt.exprs.push(value);
            }
        }
    }

    fn stmt(&mut self, node: Node<'_>) -> Option<Stmt> {
        let stmt = match node.kind() {
            "line_comment" | "block_comment" | ";" => return None,
            "local_variable_declaration" => {
                let mut stmt = self.new_stmt(node, StmtKind::LocalDecl);
                self.local_declarators(node, &mut stmt);
                stmt
            }
            "expression_statement" => {
                let inner = named_children(node).into_iter().next()?;
                let assigned = match inner.kind() {
                    "assignment_expression" => inner
                        .child_by_field_name("left")
                        .and_then(|left| self.assigned_name(left)),
                    "update_expression" => named_children(inner)
                        .into_iter()
                        .next()
                        .and_then(|operand| self.assigned_name(operand)),
                    _ => None,
                };
                let kind = if assigned.is_some() {
                    StmtKind::Assign
                } else {
                    StmtKind::Expression
                };
                let mut stmt = self.new_stmt(node, kind);
                stmt.assigned = assigned;
                stmt.exprs.push(self.expr(inner));
                stmt
            }
            "if_statement" => {
                let mut stmt = self.new_stmt(node, StmtKind::If);
                if let Some(cond) = node.child_by_field_name("condition") {
                    stmt.exprs.push(self.expr(cond));
                }
                for field in ["consequence", "alternative"] {
                    if let Some(body) = node.child_by_field_name(field) {
                        let block = self.block(body, node);
                        stmt.blocks.push(block);
                    }
                }
                stmt
            }
            "while_statement" | "do_statement" => {
                let mut stmt = self.new_stmt(node, StmtKind::Loop);
                if let Some(cond) = node.child_by_field_name("condition") {
                    stmt.exprs.push(self.expr(cond));
                }
                if let Some(body) = node.child_by_field_name("body") {
                    let block = self.block(body, node);
                    stmt.blocks.push(block);
                }
                stmt
            }
            "for_statement" => {
                let mut stmt = self.new_stmt(node, StmtKind::Loop);
                for init in fields_named(node, "init") {
                    if init.kind() == "local_variable_declaration" {
                        self.local_declarators(init, &mut stmt);
                    } else {
                        let e = self.expr(init);
                        stmt.exprs.push(e);
                    }
                }
                for field in ["condition", "update"] {
                    for part in fields_named(node, field) {
                        let e = self.expr(part);
                        stmt.exprs.push(e);
                    }
                }
                if let Some(body) = node.child_by_field_name("body") {
                    let block = self.block(body, node);
                    stmt.blocks.push(block);
                }
                stmt
            }
            "enhanced_for_statement" => {
                let mut stmt = self.new_stmt(node, StmtKind::Loop);
                if let (Some(name), Some(type_name)) =
                    (self.field_text(node, "name"), self.field_text(node, "type"))
                {
                    stmt.declares.push(Local::new(name, type_name));
                }
                if let Some(value) = node.child_by_field_name("value") {
                    stmt.exprs.push(self.expr(value));
                }
                if let Some(body) = node.child_by_field_name("body") {
                    let block = self.block(body, node);
                    stmt.blocks.push(block);
                }
                stmt
            }
            "switch_expression" | "switch_statement" => self.switch(node),
            "try_statement" | "try_with_resources_statement" => self.try_stmt(node),
            "synchronized_statement" => {
                let mut stmt = self.new_stmt(node, StmtKind::Synchronized);
                if let Some(lock) = named_children(node)
                    .into_iter()
                    .find(|n| n.kind() == "parenthesized_expression")
                {
                    stmt.exprs.push(self.expr(lock));
                }
                if let Some(body) = node.child_by_field_name("body") {
                    let block = self.block(body, node);
                    stmt.blocks.push(block);
                }
                stmt
            }
            "block" => {
                let mut stmt = self.new_stmt(node, StmtKind::Block);
                let block = self.block(node, node);
                stmt.blocks.push(block);
                stmt
            }
            "labeled_statement" => {
                let mut stmt = self.new_stmt(node, StmtKind::Labeled);
                if let Some(inner) = named_children(node)
                    .into_iter()
                    .find(|n| n.kind() != "identifier")
                {
                    let block = self.block(inner, node);
                    stmt.blocks.push(block);
                }
                stmt
            }
            "return_statement" | "throw_statement" | "yield_statement" => {
                let kind = match node.kind() {
                    "return_statement" => StmtKind::Return,
                    "throw_statement" => StmtKind::Throw,
                    _ => StmtKind::Other,
                };
                let mut stmt = self.new_stmt(node, kind);
                for child in named_children(node) {
                    let e = self.expr(child);
                    stmt.exprs.push(e);
                }
                stmt
            }
            "explicit_constructor_invocation" => {
                let mut stmt = self.new_stmt(node, StmtKind::ConstructorCall);
                let receiver = match node.child_by_field_name("constructor").map(|c| c.kind()) {
                    Some("super") => Expr::Super,
                    _ => Expr::This,
                };
                let args = self.arguments(node);
                stmt.exprs.push(Expr::Invoke(Invocation {
                    receiver: Some(Box::new(receiver)),
                    name: CONSTRUCTOR.to_string(),
                    args,
                    line: line_of(node),
                    receiver_type: None,
                    target: None,
                }));
                stmt
            }
            kind if is_type_declaration(kind) || kind == "local_class_declaration" => {
                self.new_stmt(node, StmtKind::Other)
            }
            _ => {
                let mut stmt = self.new_stmt(node, StmtKind::Other);
                for child in named_children(node) {
                    let e = self.expr(child);
                    stmt.exprs.push(e);
                }
                stmt
            }
        };
        Some(stmt)
    }

    fn assigned_name(&self, left: Node<'_>) -> Option<String> {
        match left.kind() {
            "identifier" => Some(self.text(left).to_string()),
            "field_access" => self.field_text(left, "field"),
            "array_access" => left
                .child_by_field_name("array")
                .and_then(|a| self.assigned_name(a)),
            "parenthesized_expression" => named_children(left)
                .into_iter()
                .next()
                .and_then(|inner| self.assigned_name(inner)),
            _ => None,
        }
    }

    fn switch(&mut self, node: Node<'_>) -> Stmt {
        let mut stmt = self.new_stmt(node, StmtKind::Switch);
        if let Some(cond) = node.child_by_field_name("condition") {
            stmt.exprs.push(self.expr(cond));
        }
        let base = node.start_byte();
        let body = match node.child_by_field_name("body") {
            Some(b) => b,
            None => return stmt,
        };
        for arm in named_children(body) {
            match arm.kind() {
                "switch_block_statement_group" => {
                    let kids = children(arm);
                    let label_end = kids
                        .iter()
                        .filter(|n| matches!(n.kind(), "switch_label" | ":"))
                        .map(|n| n.end_byte())
                        .max()
                        .unwrap_or_else(|| arm.start_byte());
                    let stmts = kids
                        .into_iter()
                        .filter(|n| n.is_named() && n.kind() != "switch_label")
                        .filter_map(|n| self.stmt(n))
                        .collect();
                    stmt.blocks.push(Block {
                        start: label_end - base,
                        end: arm.end_byte() - base,
                        style: BlockStyle::Group,
                        stmts,
                    });
                }
                "switch_rule" => {
                    let arm_body = named_children(arm)
                        .into_iter()
                        .filter(|n| n.kind() != "switch_label")
                        .last();
                    if let Some(arm_body) = arm_body {
                        let block = if arm_body.kind() == "block" {
                            self.block(arm_body, node)
                        } else {
                            Block {
                                start: arm_body.start_byte() - base,
                                end: arm_body.end_byte() - base,
                                style: BlockStyle::Group,
                                stmts: self.stmt(arm_body).into_iter().collect(),
                            }
                        };
                        stmt.blocks.push(block);
                    }
                }
                _ => {}
            }
        }
        stmt
    }

    fn try_stmt(&mut self, node: Node<'_>) -> Stmt {
        let mut stmt = self.new_stmt(node, StmtKind::Try);
        if let Some(resources) = node.child_by_field_name("resources") {
            for resource in named_children(resources) {
                if resource.kind() != "resource" {
                    continue;
                }
                match (self.field_text(resource, "name"), self.field_text(resource, "type")) {
                    (Some(name), Some(type_name)) => stmt.declares.push(Local::new(name, type_name)),
                    _ => {}
                }
                if let Some(value) = resource.child_by_field_name("value") {
                    let e = self.expr(value);
                    stmt.exprs.push(e);
                } else if let Some(inner) = named_children(resource).into_iter().next() {
                    let e = self.expr(inner);
                    stmt.exprs.push(e);
                }
            }
        }
        if let Some(body) = node.child_by_field_name("body") {
            let block = self.block(body, node);
            stmt.blocks.push(block);
        }
        for clause in named_children(node) {
            match clause.kind() {
                "catch_clause" => {
                    if let Some(param) = named_children(clause)
                        .into_iter()
                        .find(|n| n.kind() == "catch_formal_parameter")
                    {
                        let type_name = named_children(param)
                            .into_iter()
                            .find(|n| n.kind() == "catch_type")
                            .map(|t| {
                                self.text(t)
                                    .split('|')
                                    .next()
                                    .unwrap_or_default()
                                    .trim()
                                    .to_string()
                            })
                            .unwrap_or_default();
                        if let Some(name) = self.field_text(param, "name") {
                            stmt.declares.push(Local::new(name, type_name));
                        }
                    }
                    if let Some(body) = clause.child_by_field_name("body") {
                        let block = self.block(body, node);
                        stmt.blocks.push(block);
                    }
                }
                "finally_clause" => {
                    if let Some(body) = named_children(clause).into_iter().find(|n| n.kind() == "block") {
                        let block = self.block(body, node);
                        stmt.blocks.push(block);
                    }
                }
                _ => {}
            }
        }
        stmt
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn arguments(&mut self, node: Node<'_>) -> Vec<Expr> {
        match node.child_by_field_name("arguments") {
            Some(args) => named_children(args)
                .into_iter()
                .filter(|n| !matches!(n.kind(), "line_comment" | "block_comment"))
                .map(|n| self.expr(n))
                .collect(),
            None => Vec::new(),
        }
    }

    fn boxed(&mut self, node: Option<Node<'_>>) -> Box<Expr> {
        Box::new(match node {
            Some(n) => self.expr(n),
            None => Expr::Other(Vec::new()),
        })
    }

    fn expr(&mut self, node: Node<'_>) -> Expr {
        match node.kind() {
            "parenthesized_expression" => match named_children(node).into_iter().next() {
                Some(inner) => self.expr(inner),
                None => Expr::Other(Vec::new()),
            },
            "method_invocation" => {
                let name_node = node.child_by_field_name("name");
                let receiver = node.child_by_field_name("object").map(|o| Box::new(self.expr(o)));
                let args = self.arguments(node);
                Expr::Invoke(Invocation {
                    receiver,
                    name: name_node.map(|n| self.text(n).to_string()).unwrap_or_default(),
                    args,
                    line: name_node.map(line_of).unwrap_or_else(|| line_of(node)),
                    receiver_type: None,
                    target: None,
                })
            }
            "object_creation_expression" => {
                let type_name = self.field_text(node, "type").unwrap_or_default();
                let args = self.arguments(node);
                let body = named_children(node)
                    .into_iter()
                    .find(|n| n.kind() == "class_body")
                    .map(|b| self.anonymous_body(b))
                    .unwrap_or_default();
                Expr::New(Creation {
                    type_name,
                    args,
                    line: line_of(node),
                    body,
                    target: None,
                })
            }
            "identifier" => Expr::Name(self.text(node).to_string()),
            "this" => Expr::This,
            "super" => Expr::Super,
            "field_access" => Expr::Field {
                object: self.boxed(node.child_by_field_name("object")),
                name: self.field_text(node, "field").unwrap_or_default(),
            },
            "assignment_expression" => Expr::Assign {
                target: self.boxed(node.child_by_field_name("left")),
                value: self.boxed(node.child_by_field_name("right")),
            },
            "ternary_expression" => Expr::Conditional {
                condition: self.boxed(node.child_by_field_name("condition")),
                then: self.boxed(node.child_by_field_name("consequence")),
                otherwise: self.boxed(node.child_by_field_name("alternative")),
            },
            "lambda_expression" => self.lambda(node),
            "cast_expression" => Expr::Cast {
                type_name: self.field_text(node, "type").unwrap_or_default(),
                value: self.boxed(node.child_by_field_name("value")),
            },
            "switch_expression" => Expr::Block(vec![self.switch(node)]),
            "string_literal" | "text_block" => Expr::Literal("java.lang.String".to_string()),
            "character_literal" => Expr::Literal("char".to_string()),
            "true" | "false" => Expr::Literal("boolean".to_string()),
            "null_literal" => Expr::Literal("null".to_string()),
            "class_literal" => Expr::Literal("java.lang.Class".to_string()),
            "decimal_integer_literal" | "hex_integer_literal" | "octal_integer_literal"
            | "binary_integer_literal" => {
                let text = self.text(node);
                let type_name = if text.ends_with('L') || text.ends_with('l') {
                    "long"
                } else {
                    "int"
                };
                Expr::Literal(type_name.to_string())
            }
            "decimal_floating_point_literal" | "hex_floating_point_literal" => {
                let text = self.text(node);
                let type_name = if text.ends_with('f') || text.ends_with('F') {
                    "float"
                } else {
                    "double"
                };
                Expr::Literal(type_name.to_string())
            }
            "type_identifier" | "generic_type" | "scoped_type_identifier" | "array_type"
            | "integral_type" | "floating_point_type" | "boolean_type" | "void_type"
            | "type_arguments" | "dimensions" | "line_comment" | "block_comment" => {
                Expr::Other(Vec::new())
            }
            _ => {
                let parts = named_children(node)
                    .into_iter()
                    .map(|child| self.expr(child))
                    .collect();
                Expr::Other(parts)
            }
        }
    }

    fn lambda(&mut self, node: Node<'_>) -> Expr {
        let params = match node.child_by_field_name("parameters") {
            Some(p) if p.kind() == "identifier" => vec![self.text(p).to_string()],
            Some(p) if p.kind() == "formal_parameters" => self
                .parameters(Some(p))
                .0
                .into_iter()
                .map(|l| l.name)
                .collect(),
            Some(p) => named_children(p)
                .into_iter()
                .filter(|n| n.kind() == "identifier")
                .map(|n| self.text(n).to_string())
                .collect(),
            None => Vec::new(),
        };
        let body = match node.child_by_field_name("body") {
            Some(b) if b.kind() == "block" => self.stmt_list(b),
            Some(b) => {
                let mut stmt = self.new_stmt(b, StmtKind::Expression);
                stmt.exprs.push(self.expr(b));
                vec![stmt]
            }
            None => Vec::new(),
        };
        Expr::Lambda { params, body }
    }
}
