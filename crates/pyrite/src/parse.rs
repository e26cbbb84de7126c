use ruff_python_ast::{
    self as ast, Expr as AstExpr, FStringPart as AstFStringPart, InterpolatedStringElement, Number, Stmt,
};
use ruff_python_parser::parse_module;
use ruff_text_size::{Ranged, TextRange};
use thin_vec::ThinVec;

use crate::error::{CodeLoc, CompileError, CompileResult};

/// A compile-time literal.
///
/// Unlike the runtime of the source language, the translator only needs the
/// handful of literal shapes that can reach emitted TL text.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// One piece of an interpolated string literal.
#[derive(Debug, Clone)]
pub enum FStringPart {
    Literal(String),
    Interpolation(ExprLoc),
}

/// Binary operators of the supported SL subset.
///
/// Boolean `and`/`or` and the bitwise family are not part of the subset; the
/// parser rejects them as unsupported constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Operator {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mult,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "//")]
    FloorDiv,
    #[strum(serialize = "**")]
    Pow,
    /// Only valid in annotation position, where it forms a union type.
    #[strum(serialize = "|")]
    BitOr,
}

/// Comparison operators, including identity and containment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum CmpOperator {
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    NotEq,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    LtE,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    GtE,
    #[strum(serialize = "is")]
    Is,
    #[strum(serialize = "is not")]
    IsNot,
    #[strum(serialize = "in")]
    In,
    #[strum(serialize = "not in")]
    NotIn,
}

/// An expression of the ingested SL subset, before inference.
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Literal),
    Name(String),
    Attribute {
        value: Box<ExprLoc>,
        attr: String,
    },
    Call {
        func: Box<ExprLoc>,
        args: Vec<ExprLoc>,
        keywords: Vec<(String, ExprLoc)>,
    },
    BinOp {
        left: Box<ExprLoc>,
        op: Operator,
        right: Box<ExprLoc>,
    },
    Compare {
        left: Box<ExprLoc>,
        op: CmpOperator,
        right: Box<ExprLoc>,
    },
    Not(Box<ExprLoc>),
    List(Vec<ExprLoc>),
    Tuple(Vec<ExprLoc>),
    Dict(Vec<(ExprLoc, ExprLoc)>),
    Subscript {
        value: Box<ExprLoc>,
        index: Box<ExprLoc>,
    },
    Starred(Box<ExprLoc>),
    Lambda {
        params: Vec<String>,
        body: Box<ExprLoc>,
    },
    FString(Vec<FStringPart>),
    IfExp {
        test: Box<ExprLoc>,
        body: Box<ExprLoc>,
        orelse: Box<ExprLoc>,
    },
    ListComp {
        elt: Box<ExprLoc>,
        target: String,
        iter: Box<ExprLoc>,
    },
}

/// An expression with its source location.
#[derive(Debug, Clone)]
pub struct ExprLoc {
    pub loc: CodeLoc,
    pub expr: Expr,
}

impl ExprLoc {
    pub fn new(loc: CodeLoc, expr: Expr) -> Self {
        Self { loc, expr }
    }

    /// Returns the dotted source path for plain name/attribute chains
    /// (`self.base.things` -> `"self.base.things"`).
    ///
    /// Narrowed bindings are keyed by this path in local scopes.
    pub fn path(&self) -> Option<String> {
        match &self.expr {
            Expr::Name(name) => Some(name.clone()),
            Expr::Attribute { value, attr } => Some(format!("{}.{attr}", value.path()?)),
            _ => None,
        }
    }
}

/// A statement node of the ingested SL subset.
#[derive(Debug, Clone)]
pub enum Node {
    Pass,
    Expr(ExprLoc),
    Assign {
        targets: Vec<ExprLoc>,
        value: ExprLoc,
    },
    AnnAssign {
        target: ExprLoc,
        annotation: ExprLoc,
        value: ExprLoc,
    },
    AugAssign {
        target: ExprLoc,
        op: Operator,
        value: ExprLoc,
    },
    Return {
        loc: CodeLoc,
        value: Option<ExprLoc>,
    },
    If {
        test: ExprLoc,
        body: Vec<Node>,
        or_else: Vec<Node>,
    },
    While {
        test: ExprLoc,
        body: Vec<Node>,
    },
    For {
        target: ForTarget,
        iter: ExprLoc,
        body: Vec<Node>,
    },
    Break,
    Continue,
    Raise {
        loc: CodeLoc,
        exc: Option<String>,
    },
    Assert {
        test: ExprLoc,
    },
    FunctionDef(RawFunctionDef),
    ClassDef(RawClassDef),
    ImportFrom {
        loc: CodeLoc,
        module: String,
        names: Vec<String>,
    },
}

/// Loop binding target: a single name or a flat tuple of names.
#[derive(Debug, Clone)]
pub enum ForTarget {
    Name(String),
    Tuple(Vec<String>),
}

/// Per-construct metadata decoded from the decorator surface at ingest time.
///
/// This is the only channel through which external collaborators influence
/// compilation.
#[derive(Debug, Clone, Default)]
pub struct Directives {
    /// `@js` / `@nojs`: include in / exclude from translation.
    pub translate: Option<bool>,
    /// `@js(include=True)`: emit even when not reached from the entry point.
    pub include: bool,
    /// `@js(builtin=True)`: analyze but never emit.
    pub builtin: bool,
    /// `@js(analyze=False)`: skip body analysis.
    pub skip_analysis: bool,
    /// `@js(inline="...")`: call-site rewrite template.
    pub inline: Option<String>,
    /// `@js(source="...")`: full-body replacement, raw TL text.
    pub source: Option<String>,
    /// `@js(append="...")`: TL text emitted after the definition.
    pub append: Option<String>,
}

impl Directives {
    /// Whether the body should be walked by the analyzer at all.
    pub fn analyze_body(&self) -> bool {
        self.inline.is_none() && self.source.is_none() && !self.skip_analysis
    }
}

/// Which hook a `@target.<kind>` definition installs on `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    /// `@target.client`: this function's body replaces the target's body.
    Client,
    /// `@target.source`: this function returns the target's TL body text.
    Source,
    /// `@target.inline`: this function returns the target's call-site template.
    Inline,
}

/// Method-only decorator state collected while decoding a def's decorators.
#[derive(Debug, Default)]
struct MethodFlags {
    is_classmethod: bool,
    is_staticmethod: bool,
    hook_for: Option<(String, HookKind)>,
}

/// A parameter with optional annotation and default.
#[derive(Debug, Clone)]
pub struct RawParam {
    pub name: String,
    pub annotation: Option<ExprLoc>,
    pub default: Option<ExprLoc>,
}

/// A function definition as ingested, before inference.
#[derive(Debug, Clone)]
pub struct RawFunctionDef {
    pub name: String,
    pub loc: CodeLoc,
    pub params: Vec<RawParam>,
    pub vararg: Option<RawParam>,
    pub kwarg: Option<RawParam>,
    pub returns: Option<ExprLoc>,
    pub body: Vec<Node>,
    pub directives: Directives,
    pub is_classmethod: bool,
    pub is_staticmethod: bool,
    /// Set when this definition is a `@target.<kind>` hook rather than a
    /// function in its own right.
    pub hook_for: Option<(String, HookKind)>,
}

/// A class definition as ingested.
#[derive(Debug, Clone)]
pub struct RawClassDef {
    pub name: String,
    pub loc: CodeLoc,
    pub bases: Vec<ExprLoc>,
    pub type_params: Vec<String>,
    pub body: Vec<Node>,
    pub directives: Directives,
}

/// Parses one SL module into IR statements.
pub fn parse_source(code: &str) -> CompileResult<Vec<Node>> {
    Parser::new(code, 0).parse(code)
}

/// Re-parses a single method in isolation.
///
/// A dummy class header is prepended so the method's indentation stays valid,
/// and `first_line` (the 1-indexed line the method starts on in its original
/// file) is folded back into every recorded position.
pub fn parse_isolated_method(source: &str, class_name: &str, first_line: u32) -> CompileResult<RawFunctionDef> {
    let code = format!("class {class_name}:\n{source}");
    let nodes = Parser::new(&code, first_line.saturating_sub(2)).parse(&code)?;
    let Some(Node::ClassDef(class_def)) = nodes.into_iter().next() else {
        return Err(CompileError::unsupported("expected a single method definition", None));
    };
    for node in class_def.body {
        if let Node::FunctionDef(func) = node {
            return Ok(func);
        }
    }
    Err(CompileError::unsupported("expected a single method definition", None))
}

struct Parser {
    /// Byte offset of each newline, for offset to line/column conversion.
    line_ends: Vec<usize>,
    /// Added to every recorded line, for isolated method re-parses.
    line_offset: u32,
}

impl Parser {
    fn new(code: &str, line_offset: u32) -> Self {
        let mut line_ends = vec![];
        for (i, c) in code.char_indices() {
            if c == '\n' {
                line_ends.push(i);
            }
        }
        Self { line_ends, line_offset }
    }

    fn parse(&self, code: &str) -> CompileResult<Vec<Node>> {
        let parsed = match parse_module(code) {
            Ok(parsed) => parsed,
            Err(e) => {
                let loc = self.convert(e.range());
                return Err(CompileError::unsupported(format!("syntax error: {e}"), Some(loc)));
            }
        };
        let module = parsed.into_syntax();
        self.parse_statements(module.body)
    }

    fn convert(&self, range: TextRange) -> CodeLoc {
        let offset = usize::from(range.start());
        let line = self.line_ends.partition_point(|end| *end < offset);
        let col = match line.checked_sub(1) {
            Some(prev) => offset - self.line_ends[prev],
            None => offset + 1,
        };
        CodeLoc::new(line as u32 + 1 + self.line_offset, col as u32)
    }

    fn parse_statements(&self, statements: ThinVec<Stmt>) -> CompileResult<Vec<Node>> {
        let mut nodes = Vec::with_capacity(statements.len());
        for statement in statements {
            if let Some(node) = self.parse_statement(statement)? {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    /// Parses a statement; docstring expression statements are dropped.
    fn parse_statement(&self, statement: Stmt) -> CompileResult<Option<Node>> {
        let node = match statement {
            Stmt::Pass(_) => Node::Pass,
            Stmt::Break(_) => Node::Break,
            Stmt::Continue(_) => Node::Continue,
            Stmt::Expr(e) => {
                if matches!(*e.value, AstExpr::StringLiteral(_)) {
                    return Ok(None);
                }
                Node::Expr(self.parse_expression(*e.value)?)
            }
            Stmt::Return(r) => Node::Return {
                loc: self.convert(r.range()),
                value: r.value.map(|v| self.parse_expression(*v)).transpose()?,
            },
            Stmt::Assign(a) => Node::Assign {
                targets: a
                    .targets
                    .into_iter()
                    .map(|t| self.parse_expression(t))
                    .collect::<CompileResult<_>>()?,
                value: self.parse_expression(*a.value)?,
            },
            Stmt::AnnAssign(a) => {
                let loc = self.convert(a.range());
                let Some(value) = a.value else {
                    return Err(CompileError::unsupported(
                        "annotated declaration without a value",
                        Some(loc),
                    ));
                };
                Node::AnnAssign {
                    target: self.parse_expression(*a.target)?,
                    annotation: self.parse_expression(*a.annotation)?,
                    value: self.parse_expression(*value)?,
                }
            }
            Stmt::AugAssign(a) => Node::AugAssign {
                target: self.parse_expression(*a.target)?,
                op: self.operator(a.op, a.range)?,
                value: self.parse_expression(*a.value)?,
            },
            Stmt::If(i) => {
                let test = self.parse_expression(*i.test)?;
                let body = self.parse_statements(i.body)?;
                let or_else = self.parse_elif_else_clauses(i.elif_else_clauses)?;
                Node::If { test, body, or_else }
            }
            Stmt::While(w) => {
                let loc = self.convert(w.range());
                if !w.orelse.is_empty() {
                    return Err(CompileError::unsupported("while-else", Some(loc)));
                }
                Node::While {
                    test: self.parse_expression(*w.test)?,
                    body: self.parse_statements(w.body)?,
                }
            }
            Stmt::For(f) => {
                let loc = self.convert(f.range());
                if f.is_async {
                    return Err(CompileError::unsupported("async for", Some(loc)));
                }
                if !f.orelse.is_empty() {
                    return Err(CompileError::unsupported("for-else", Some(loc)));
                }
                let target = match *f.target {
                    AstExpr::Name(n) => ForTarget::Name(n.id.to_string()),
                    AstExpr::Tuple(t) => {
                        let mut names = Vec::with_capacity(t.elts.len());
                        for elt in t.elts {
                            match elt {
                                AstExpr::Name(n) => names.push(n.id.to_string()),
                                _ => return Err(CompileError::unsupported("nested loop target", Some(loc))),
                            }
                        }
                        ForTarget::Tuple(names)
                    }
                    _ => return Err(CompileError::unsupported("loop target", Some(loc))),
                };
                Node::For {
                    target,
                    iter: self.parse_expression(*f.iter)?,
                    body: self.parse_statements(f.body)?,
                }
            }
            Stmt::Raise(r) => {
                let loc = self.convert(r.range());
                let exc = match r.exc {
                    None => None,
                    Some(exc) => match *exc {
                        AstExpr::Name(n) => Some(n.id.to_string()),
                        AstExpr::Call(c) => match *c.func {
                            AstExpr::Name(n) => Some(n.id.to_string()),
                            _ => return Err(CompileError::unsupported("raise of a non-name exception", Some(loc))),
                        },
                        _ => return Err(CompileError::unsupported("raise of a non-name exception", Some(loc))),
                    },
                };
                Node::Raise { loc, exc }
            }
            Stmt::Assert(a) => Node::Assert {
                test: self.parse_expression(*a.test)?,
            },
            Stmt::FunctionDef(f) => Node::FunctionDef(self.parse_function_def(f)?),
            Stmt::ClassDef(c) => Node::ClassDef(self.parse_class_def(c)?),
            Stmt::ImportFrom(i) => {
                let loc = self.convert(i.range());
                if i.level != 0 {
                    return Err(CompileError::unsupported("relative import", Some(loc)));
                }
                let Some(module) = &i.module else {
                    return Err(CompileError::unsupported("relative import", Some(loc)));
                };
                let mut names = Vec::with_capacity(i.names.len());
                for alias in &i.names {
                    if alias.asname.is_some() {
                        return Err(CompileError::unsupported("import alias", Some(loc)));
                    }
                    names.push(alias.name.id.to_string());
                }
                Node::ImportFrom {
                    loc,
                    module: module.id.to_string(),
                    names,
                }
            }
            other => {
                let loc = self.convert(other.range());
                return Err(CompileError::unsupported(
                    format!("statement kind {}", statement_label(&other)),
                    Some(loc),
                ));
            }
        };
        Ok(Some(node))
    }

    /// Rebuilds the parser's `elif`/`else` clause list into nested `If` nodes.
    fn parse_elif_else_clauses(&self, clauses: Vec<ast::ElifElseClause>) -> CompileResult<Vec<Node>> {
        let mut tail: Vec<Node> = Vec::new();
        for clause in clauses.into_iter().rev() {
            match clause.test {
                Some(test) => {
                    let test = self.parse_expression(test)?;
                    let body = self.parse_statements(clause.body)?;
                    tail = vec![Node::If {
                        test,
                        body,
                        or_else: tail,
                    }];
                }
                None => {
                    tail = self.parse_statements(clause.body)?;
                }
            }
        }
        Ok(tail)
    }

    fn parse_function_def(&self, function: ast::StmtFunctionDef) -> CompileResult<RawFunctionDef> {
        let loc = self.convert(function.name.range());
        if function.is_async {
            return Err(CompileError::unsupported("async function", Some(loc)));
        }
        let params = &function.parameters;
        if !params.kwonlyargs.is_empty() {
            return Err(CompileError::unsupported("keyword-only parameters", Some(loc)));
        }

        let mut parsed_params = Vec::new();
        for pwd in params.posonlyargs.iter().chain(&params.args) {
            parsed_params.push(self.parse_param(&pwd.parameter, pwd.default.as_deref())?);
        }
        let vararg = match &params.vararg {
            Some(p) => Some(self.parse_param(p, None)?),
            None => None,
        };
        let kwarg = match &params.kwarg {
            Some(p) => Some(self.parse_param(p, None)?),
            None => None,
        };

        let returns = function.returns.map(|r| self.parse_expression(*r)).transpose()?;
        let body = self.parse_statements(function.body)?;

        let mut directives = Directives::default();
        let mut flags = MethodFlags::default();
        for decorator in function.decorator_list {
            self.apply_decorator(decorator.expression, &mut directives, Some(&mut flags), loc)?;
        }
        Ok(RawFunctionDef {
            name: function.name.id.to_string(),
            loc,
            params: parsed_params,
            vararg,
            kwarg,
            returns,
            body,
            directives,
            is_classmethod: flags.is_classmethod,
            is_staticmethod: flags.is_staticmethod,
            hook_for: flags.hook_for,
        })
    }

    fn parse_param(&self, param: &ast::Parameter, default: Option<&AstExpr>) -> CompileResult<RawParam> {
        Ok(RawParam {
            name: param.name.id.to_string(),
            annotation: param
                .annotation
                .as_deref()
                .map(|a| self.parse_expression(a.clone()))
                .transpose()?,
            default: default.map(|d| self.parse_expression(d.clone())).transpose()?,
        })
    }

    fn parse_class_def(&self, class: ast::StmtClassDef) -> CompileResult<RawClassDef> {
        let loc = self.convert(class.name.range());
        let mut type_params = Vec::new();
        if let Some(tp) = class.type_params {
            for param in tp.type_params {
                match param {
                    ast::TypeParam::TypeVar(tv) => type_params.push(tv.name.id.to_string()),
                    _ => return Err(CompileError::unsupported("type parameter kind", Some(loc))),
                }
            }
        }
        let mut bases = Vec::new();
        if let Some(arguments) = class.arguments {
            if !arguments.keywords.is_empty() {
                return Err(CompileError::unsupported("class keyword arguments", Some(loc)));
            }
            for base in arguments.args {
                bases.push(self.parse_expression(base)?);
            }
        }
        if bases.len() > 1 {
            return Err(CompileError::unsupported("multiple inheritance", Some(loc)));
        }
        let body = self.parse_statements(class.body)?;

        let mut directives = Directives::default();
        for decorator in class.decorator_list {
            self.apply_decorator(decorator.expression, &mut directives, None, loc)?;
        }
        Ok(RawClassDef {
            name: class.name.id.to_string(),
            loc,
            bases,
            type_params,
            body,
            directives,
        })
    }

    /// Decodes one decorator into directive metadata.
    ///
    /// The known surface is closed: anything else is an unsupported construct.
    fn apply_decorator(
        &self,
        expr: AstExpr,
        directives: &mut Directives,
        method: Option<&mut MethodFlags>,
        loc: CodeLoc,
    ) -> CompileResult<()> {
        match expr {
            AstExpr::Name(name) => match name.id.as_str() {
                "js" => directives.translate = Some(true),
                "nojs" => directives.translate = Some(false),
                "classmethod" => {
                    let Some(method) = method else {
                        return Err(CompileError::unsupported("@classmethod on a class", Some(loc)));
                    };
                    method.is_classmethod = true;
                }
                "staticmethod" => {
                    let Some(method) = method else {
                        return Err(CompileError::unsupported("@staticmethod on a class", Some(loc)));
                    };
                    method.is_staticmethod = true;
                }
                other => {
                    return Err(CompileError::unsupported(format!("decorator `@{other}`"), Some(loc)));
                }
            },
            AstExpr::Call(call) => {
                let AstExpr::Name(name) = &*call.func else {
                    return Err(CompileError::unsupported("decorator expression", Some(loc)));
                };
                if name.id.as_str() != "js" {
                    return Err(CompileError::unsupported(
                        format!("decorator `@{}(...)`", name.id),
                        Some(loc),
                    ));
                }
                directives.translate = Some(true);
                for keyword in call.arguments.keywords {
                    let Some(arg) = keyword.arg else {
                        return Err(CompileError::unsupported("decorator **kwargs", Some(loc)));
                    };
                    match (arg.id.as_str(), keyword.value) {
                        ("inline", AstExpr::StringLiteral(s)) => directives.inline = Some(s.value.to_string()),
                        ("source", AstExpr::StringLiteral(s)) => directives.source = Some(s.value.to_string()),
                        ("append", AstExpr::StringLiteral(s)) => directives.append = Some(s.value.to_string()),
                        ("include", AstExpr::BooleanLiteral(b)) => directives.include = b.value,
                        ("builtin", AstExpr::BooleanLiteral(b)) => directives.builtin = b.value,
                        ("analyze", AstExpr::BooleanLiteral(b)) => directives.skip_analysis = !b.value,
                        (other, _) => {
                            return Err(CompileError::unsupported(
                                format!("decorator argument `{other}`"),
                                Some(loc),
                            ));
                        }
                    }
                }
            }
            AstExpr::Attribute(attribute) => {
                let AstExpr::Name(target) = &*attribute.value else {
                    return Err(CompileError::unsupported("decorator expression", Some(loc)));
                };
                let kind = match attribute.attr.id.as_str() {
                    "client" => HookKind::Client,
                    "source" => HookKind::Source,
                    "inline" => HookKind::Inline,
                    other => {
                        return Err(CompileError::unsupported(format!("decorator `.{other}`"), Some(loc)));
                    }
                };
                let Some(method) = method else {
                    return Err(CompileError::unsupported("hook decorator on a class", Some(loc)));
                };
                method.hook_for = Some((target.id.to_string(), kind));
            }
            _ => return Err(CompileError::unsupported("decorator expression", Some(loc))),
        }
        Ok(())
    }

    fn operator(&self, op: ast::Operator, range: TextRange) -> CompileResult<Operator> {
        Ok(match op {
            ast::Operator::Add => Operator::Add,
            ast::Operator::Sub => Operator::Sub,
            ast::Operator::Mult => Operator::Mult,
            ast::Operator::Div => Operator::Div,
            ast::Operator::FloorDiv => Operator::FloorDiv,
            ast::Operator::Pow => Operator::Pow,
            ast::Operator::BitOr => Operator::BitOr,
            other => {
                return Err(CompileError::unsupported(
                    format!("operator `{other:?}`"),
                    Some(self.convert(range)),
                ));
            }
        })
    }

    fn parse_expression(&self, expression: AstExpr) -> CompileResult<ExprLoc> {
        let loc = self.convert(expression.range());
        let expr = match expression {
            AstExpr::NoneLiteral(_) => Expr::Literal(Literal::None),
            AstExpr::BooleanLiteral(b) => Expr::Literal(Literal::Bool(b.value)),
            AstExpr::NumberLiteral(n) => match n.value {
                Number::Int(i) => match i.as_i64() {
                    Some(i) => Expr::Literal(Literal::Int(i)),
                    None => {
                        return Err(CompileError::unsupported("integer literal out of range", Some(loc)));
                    }
                },
                Number::Float(f) => Expr::Literal(Literal::Float(f)),
                Number::Complex { .. } => {
                    return Err(CompileError::unsupported("complex literal", Some(loc)));
                }
            },
            AstExpr::StringLiteral(s) => Expr::Literal(Literal::Str(s.value.to_string())),
            AstExpr::FString(f) => {
                let mut parts = Vec::new();
                for part in f.value.iter() {
                    match part {
                        AstFStringPart::Literal(lit) => parts.push(FStringPart::Literal(lit.value.to_string())),
                        AstFStringPart::FString(fstring) => {
                            for element in &fstring.elements {
                                match element {
                                    InterpolatedStringElement::Literal(lit) => {
                                        parts.push(FStringPart::Literal(lit.value.to_string()));
                                    }
                                    InterpolatedStringElement::Interpolation(interp) => {
                                        let inner = self.parse_expression((*interp.expression).clone())?;
                                        parts.push(FStringPart::Interpolation(inner));
                                    }
                                }
                            }
                        }
                    }
                }
                Expr::FString(parts)
            }
            AstExpr::Name(n) => Expr::Name(n.id.to_string()),
            AstExpr::Attribute(a) => Expr::Attribute {
                value: Box::new(self.parse_expression(*a.value)?),
                attr: a.attr.id.to_string(),
            },
            AstExpr::Call(c) => {
                let func = Box::new(self.parse_expression(*c.func)?);
                let args = c
                    .arguments
                    .args
                    .into_vec()
                    .into_iter()
                    .map(|a| self.parse_expression(a))
                    .collect::<CompileResult<Vec<_>>>()?;
                let mut keywords = Vec::new();
                for keyword in c.arguments.keywords {
                    let Some(arg) = keyword.arg else {
                        return Err(CompileError::unsupported("** call argument", Some(loc)));
                    };
                    keywords.push((arg.id.to_string(), self.parse_expression(keyword.value)?));
                }
                Expr::Call { func, args, keywords }
            }
            AstExpr::BinOp(b) => Expr::BinOp {
                left: Box::new(self.parse_expression(*b.left)?),
                op: self.operator(b.op, b.range)?,
                right: Box::new(self.parse_expression(*b.right)?),
            },
            AstExpr::Compare(c) => {
                if c.ops.len() != 1 || c.comparators.len() != 1 {
                    return Err(CompileError::unsupported("chained comparison", Some(loc)));
                }
                let op = match c.ops[0] {
                    ast::CmpOp::Eq => CmpOperator::Eq,
                    ast::CmpOp::NotEq => CmpOperator::NotEq,
                    ast::CmpOp::Lt => CmpOperator::Lt,
                    ast::CmpOp::LtE => CmpOperator::LtE,
                    ast::CmpOp::Gt => CmpOperator::Gt,
                    ast::CmpOp::GtE => CmpOperator::GtE,
                    ast::CmpOp::Is => CmpOperator::Is,
                    ast::CmpOp::IsNot => CmpOperator::IsNot,
                    ast::CmpOp::In => CmpOperator::In,
                    ast::CmpOp::NotIn => CmpOperator::NotIn,
                };
                let mut comparators = c.comparators.into_vec();
                Expr::Compare {
                    left: Box::new(self.parse_expression(*c.left)?),
                    op,
                    right: Box::new(self.parse_expression(comparators.remove(0))?),
                }
            }
            AstExpr::UnaryOp(u) => match u.op {
                ast::UnaryOp::Not => Expr::Not(Box::new(self.parse_expression(*u.operand)?)),
                ast::UnaryOp::USub => match *u.operand {
                    // fold signed number literals so the analyzer only ever
                    // sees plain constants
                    AstExpr::NumberLiteral(n) => match n.value {
                        Number::Int(i) => match i.as_i64() {
                            Some(i) => Expr::Literal(Literal::Int(-i)),
                            None => {
                                return Err(CompileError::unsupported("integer literal out of range", Some(loc)));
                            }
                        },
                        Number::Float(f) => Expr::Literal(Literal::Float(-f)),
                        Number::Complex { .. } => {
                            return Err(CompileError::unsupported("complex literal", Some(loc)));
                        }
                    },
                    _ => return Err(CompileError::unsupported("unary minus", Some(loc))),
                },
                ast::UnaryOp::UAdd => return self.parse_expression(*u.operand),
                ast::UnaryOp::Invert => {
                    return Err(CompileError::unsupported("unary invert", Some(loc)));
                }
            },
            AstExpr::List(l) => Expr::List(
                l.elts
                    .into_iter()
                    .map(|e| self.parse_expression(e))
                    .collect::<CompileResult<_>>()?,
            ),
            AstExpr::Tuple(t) => Expr::Tuple(
                t.elts
                    .into_iter()
                    .map(|e| self.parse_expression(e))
                    .collect::<CompileResult<_>>()?,
            ),
            AstExpr::Dict(d) => {
                let mut items = Vec::with_capacity(d.items.len());
                for item in d.items {
                    let Some(key) = item.key else {
                        return Err(CompileError::unsupported("dict unpacking", Some(loc)));
                    };
                    items.push((self.parse_expression(key)?, self.parse_expression(item.value)?));
                }
                Expr::Dict(items)
            }
            AstExpr::Subscript(s) => Expr::Subscript {
                value: Box::new(self.parse_expression(*s.value)?),
                index: Box::new(self.parse_expression(*s.slice)?),
            },
            AstExpr::Starred(s) => Expr::Starred(Box::new(self.parse_expression(*s.value)?)),
            AstExpr::Lambda(l) => {
                let mut names = Vec::new();
                if let Some(parameters) = l.parameters {
                    for pwd in parameters.posonlyargs.iter().chain(&parameters.args) {
                        names.push(pwd.parameter.name.id.to_string());
                    }
                }
                Expr::Lambda {
                    params: names,
                    body: Box::new(self.parse_expression(*l.body)?),
                }
            }
            AstExpr::If(i) => Expr::IfExp {
                test: Box::new(self.parse_expression(*i.test)?),
                body: Box::new(self.parse_expression(*i.body)?),
                orelse: Box::new(self.parse_expression(*i.orelse)?),
            },
            AstExpr::ListComp(c) => {
                if c.generators.len() != 1 {
                    return Err(CompileError::unsupported("nested comprehension", Some(loc)));
                }
                let mut generators = c.generators;
                let generator = generators.remove(0);
                if !generator.ifs.is_empty() {
                    return Err(CompileError::unsupported("comprehension filter", Some(loc)));
                }
                let AstExpr::Name(target) = generator.target else {
                    return Err(CompileError::unsupported("comprehension target", Some(loc)));
                };
                Expr::ListComp {
                    elt: Box::new(self.parse_expression(*c.elt)?),
                    target: target.id.to_string(),
                    iter: Box::new(self.parse_expression(generator.iter)?),
                }
            }
            other => {
                return Err(CompileError::unsupported(
                    format!("expression kind {}", expression_label(&other)),
                    Some(loc),
                ));
            }
        };
        Ok(ExprLoc::new(loc, expr))
    }
}

fn statement_label(statement: &Stmt) -> &'static str {
    match statement {
        Stmt::Import(_) => "whole-module import",
        Stmt::With(_) => "with",
        Stmt::Try(_) => "try",
        Stmt::Match(_) => "match",
        Stmt::Delete(_) => "del",
        Stmt::Global(_) => "global",
        Stmt::Nonlocal(_) => "nonlocal",
        _ => "unknown",
    }
}

fn expression_label(expression: &AstExpr) -> &'static str {
    match expression {
        AstExpr::BoolOp(_) => "boolean operator",
        AstExpr::Named(_) => "walrus assignment",
        AstExpr::Await(_) => "await",
        AstExpr::Yield(_) | AstExpr::YieldFrom(_) => "yield",
        AstExpr::Set(_) => "set literal",
        AstExpr::SetComp(_) | AstExpr::DictComp(_) | AstExpr::Generator(_) => "comprehension",
        AstExpr::Slice(_) => "slice",
        AstExpr::BytesLiteral(_) => "bytes literal",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_one_indexed() {
        let nodes = parse_source("a = 1\nb = 2\n").unwrap();
        let Node::Assign { value, .. } = &nodes[1] else {
            panic!("expected an assignment");
        };
        assert_eq!(value.loc.line, 2);
        assert_eq!(value.loc.col, 5);
    }

    #[test]
    fn decorator_surface_is_decoded() {
        let nodes = parse_source("@js(inline=\"{self} + {other}\", include=True)\ndef f(self, other: int) -> int:\n    pass\n").unwrap();
        let Node::FunctionDef(def) = &nodes[0] else {
            panic!("expected a function definition");
        };
        assert_eq!(def.directives.translate, Some(true));
        assert!(def.directives.include);
        assert_eq!(def.directives.inline.as_deref(), Some("{self} + {other}"));
        assert!(!def.directives.analyze_body());
    }

    #[test]
    fn negative_number_literals_fold() {
        let nodes = parse_source("x = -3\n").unwrap();
        let Node::Assign { value, .. } = &nodes[0] else {
            panic!("expected an assignment");
        };
        assert!(matches!(value.expr, Expr::Literal(Literal::Int(-3))));
    }
}
