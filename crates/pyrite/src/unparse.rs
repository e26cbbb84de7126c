//! Annotated-SL writeback.
//!
//! Serializes the typed tree back to SL-style text with the inferred
//! annotations spliced in. Method dispatch shows the defining class inline
//! (`a.[int]__eq__!(9)`, the `!` marking a call-site rewriter), which is what
//! the round-trip tests assert against.

use crate::{
    objects::{Const, Context, ObjectId, ObjectKind, StaticValue},
    parse::Literal,
    typed::{ForBinding, TypedExpr, TypedExprKind, TypedFStringPart, TypedNode},
    writer::SourceWriter,
};

/// Serializes every emitted object of `module` back to annotated SL text.
pub fn write_types(cx: &Context, module: ObjectId) -> String {
    let mut writer = TypeWriter {
        cx,
        w: SourceWriter::new(),
    };
    writer.module(module);
    writer.w.finish()
}

struct TypeWriter<'cx> {
    cx: &'cx Context,
    w: SourceWriter,
}

impl TypeWriter<'_> {
    fn module(&mut self, module: ObjectId) {
        let scope = self.cx.objects[module].scope;
        let members: Vec<ObjectId> = self.cx.scopes[scope].names.values().copied().collect();
        for id in members {
            if self.cx.objects[id].container != Some(module) {
                continue;
            }
            match &self.cx.objects[id].kind {
                ObjectKind::Generic(data) => {
                    for concrete in data.cache.values() {
                        if self.cx.objects[*concrete].should_emit() {
                            self.class(*concrete);
                        }
                    }
                }
                ObjectKind::Class(_) if self.cx.objects[id].should_emit() => self.class(id),
                ObjectKind::Function(_) if self.cx.objects[id].should_emit() => self.function(id),
                ObjectKind::Instance(_) if self.cx.objects[id].should_emit() => self.constant(id, "__const__"),
                _ => {}
            }
        }
    }

    fn class(&mut self, class: ObjectId) {
        self.w.blank_line();
        let name = &self.cx.objects[class].name;
        let mut header = format!("class {name}");
        if let Some(base) = self.cx.base_of(class) {
            if self.cx.objects[base].name != "object" {
                header.push_str(&format!("({})", self.cx.objects[base].name));
            }
        }
        header.push(':');
        self.w.fill(&header);
        self.w.indent();

        let members: Vec<ObjectId> = match self.cx.objects[class].as_class() {
            Some(data) => self.cx.scopes[data.internal_scope].names.values().copied().collect(),
            None => Vec::new(),
        };
        for member in members {
            if !self.cx.objects[member].should_emit() {
                continue;
            }
            match &self.cx.objects[member].kind {
                ObjectKind::Function(_) => self.function(member),
                ObjectKind::Instance(_) => self.constant(member, "__static__"),
                _ => {}
            }
        }
        self.w.dedent();
    }

    fn function(&mut self, func: ObjectId) {
        self.w.blank_line();
        let name = &self.cx.objects[func].name;
        let data = self.cx.objects[func].as_function().expect("function object");
        let defaults_start = data.params.len() - data.defaults.len();
        let mut params = Vec::with_capacity(data.params.len());
        for (i, param) in data.params.iter().enumerate() {
            let mut rendered = format!("{}: {}", param.name, self.cx.annotation_str(param.ty));
            if i >= defaults_start {
                rendered.push('=');
                rendered.push_str(&self.expr_str(&data.defaults[i - defaults_start]));
            }
            params.push(rendered);
        }
        if let Some(vararg) = &data.vararg {
            params.push(format!("*{}: {}", vararg.name, self.cx.annotation_str(vararg.ty)));
        }
        if let Some(kwarg) = &data.kwarg {
            params.push(format!("**{}: {}", kwarg.name, self.cx.annotation_str(kwarg.ty)));
        }
        let mut header = format!("def {name}({})", params.join(", "));
        if let Some(ty) = data.return_type {
            header.push_str(&format!(" -> {}", self.cx.annotation_str(ty)));
        }
        header.push(':');
        let body = data.body.clone();
        self.w.fill(&header);
        self.w.indent();
        for node in &body {
            self.node(node);
        }
        self.w.dedent();
    }

    fn constant(&mut self, instance: ObjectId, marker: &str) {
        let Some(data) = self.cx.objects[instance].as_instance() else {
            return;
        };
        let Some(value) = &data.value else { return };
        let name = &self.cx.objects[instance].name;
        let rendered = match value {
            StaticValue::Const(value) => const_str(value),
            StaticValue::New { class, args } => {
                let class_name = &self.cx.objects[*class].name;
                let args: Vec<String> = args.iter().map(const_str).collect();
                format!("{class_name}({})", args.join(", "))
            }
        };
        self.w.fill(&format!("{name}: {marker} = {rendered}"));
    }

    fn node(&mut self, node: &TypedNode) {
        match node {
            TypedNode::Pass => {}
            TypedNode::Break => self.w.fill("break"),
            TypedNode::Continue => self.w.fill("continue"),
            TypedNode::Expr(expr) => {
                let rendered = self.expr_str(expr);
                self.w.fill(&rendered);
            }
            TypedNode::Assert { test } => {
                let rendered = self.expr_str(test);
                self.w.fill(&format!("assert {rendered}"));
            }
            TypedNode::Declare {
                target,
                annotation,
                value,
            } => {
                let target = self.expr_str(target);
                let annotation = self.cx.annotation_str(*annotation);
                let value = self.expr_str(value);
                self.w.fill(&format!("{target}: {annotation} = {value}"));
            }
            TypedNode::Assign { target, value } => {
                let target = self.expr_str(target);
                let value = self.expr_str(value);
                self.w.fill(&format!("{target} = {value}"));
            }
            TypedNode::Return { value } => match value {
                Some(value) => {
                    let rendered = self.expr_str(value);
                    self.w.fill(&format!("return {rendered}"));
                }
                None => self.w.fill("return"),
            },
            TypedNode::Raise { exc } => match exc {
                Some(name) => self.w.fill(&format!("raise {name}")),
                None => self.w.fill("raise"),
            },
            TypedNode::If { test, body, or_else } => self.if_chain(test, body, or_else, "if"),
            TypedNode::While { test, body } => {
                let test = self.expr_str(test);
                self.w.fill(&format!("while {test}:"));
                self.w.indent();
                for node in body {
                    self.node(node);
                }
                self.w.dedent();
            }
            TypedNode::For { target, iter, body } => {
                let binding = match target {
                    ForBinding::Name { name, .. } => name.clone(),
                    ForBinding::Tuple(names) => {
                        names.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>().join(", ")
                    }
                };
                let iter = self.expr_str(iter);
                self.w.fill(&format!("for {binding} in {iter}:"));
                self.w.indent();
                for node in body {
                    self.node(node);
                }
                self.w.dedent();
            }
        }
    }

    fn if_chain(&mut self, test: &TypedExpr, body: &[TypedNode], or_else: &[TypedNode], keyword: &str) {
        let test = self.expr_str(test);
        self.w.fill(&format!("{keyword} {test}:"));
        self.w.indent();
        for node in body {
            self.node(node);
        }
        self.w.dedent();
        match or_else {
            [] => {}
            [TypedNode::If { test, body, or_else }] => self.if_chain(test, body, or_else, "elif"),
            nodes => {
                self.w.fill("else:");
                self.w.indent();
                for node in nodes {
                    self.node(node);
                }
                self.w.dedent();
            }
        }
    }

    fn expr_str(&self, expr: &TypedExpr) -> String {
        match &expr.kind {
            TypedExprKind::Literal(literal) => literal_sl_str(literal),
            TypedExprKind::Name(name) => name.clone(),
            TypedExprKind::Attribute { value, attr } => {
                let rendered = self.expr_str(value);
                // method references show the defining class and whether the
                // call site is rewritten inline
                if let Some(data) = self.cx.objects[expr.referent].as_function() {
                    let owner = data
                        .class
                        .map(|c| self.cx.objects[c].name.clone())
                        .unwrap_or_default();
                    let marker = if data.hook.is_some() { "!" } else { "" };
                    return format!("{rendered}.[{owner}]{attr}{marker}");
                }
                format!("{rendered}.{attr}")
            }
            TypedExprKind::Call { func, args, keywords } => {
                let mut rendered: Vec<String> = args.iter().map(|a| self.expr_str(a)).collect();
                for (name, value) in keywords {
                    rendered.push(format!("{name}={}", self.expr_str(value)));
                }
                format!("{}({})", self.expr_str(func), rendered.join(", "))
            }
            TypedExprKind::Not(operand) => format!("not {}", self.expr_str(operand)),
            TypedExprKind::List(items) => {
                let rendered: Vec<String> = items.iter().map(|i| self.expr_str(i)).collect();
                format!("[{}]", rendered.join(", "))
            }
            TypedExprKind::Tuple(items) => {
                let rendered: Vec<String> = items.iter().map(|i| self.expr_str(i)).collect();
                format!("({})", rendered.join(", "))
            }
            TypedExprKind::Dict(items) => {
                let rendered: Vec<String> = items
                    .iter()
                    .map(|(k, v)| format!("{}: {}", self.expr_str(k), self.expr_str(v)))
                    .collect();
                format!("{{{}}}", rendered.join(", "))
            }
            TypedExprKind::Subscript { value, index } => {
                format!("{}[{}]", self.expr_str(value), self.expr_str(index))
            }
            TypedExprKind::Starred(value) => format!("*{}", self.expr_str(value)),
            TypedExprKind::Lambda { params, body } => {
                format!("lambda {}: {}", params.join(", "), self.expr_str(body))
            }
            TypedExprKind::FString(parts) => {
                let mut out = String::from("f'");
                for part in parts {
                    match part {
                        TypedFStringPart::Literal(text) => out.push_str(text),
                        TypedFStringPart::Interpolation(inner) => {
                            out.push('{');
                            out.push_str(&self.expr_str(inner));
                            out.push('}');
                        }
                    }
                }
                out.push('\'');
                out
            }
            TypedExprKind::IfExp { test, body, orelse } => format!(
                "{} if {} else {}",
                self.expr_str(body),
                self.expr_str(test),
                self.expr_str(orelse)
            ),
            TypedExprKind::ListComp { elt, target, iter } => {
                format!("[{} for {target} in {}]", self.expr_str(elt), self.expr_str(iter))
            }
        }
    }
}

fn literal_sl_str(literal: &Literal) -> String {
    match literal {
        Literal::None => "None".to_string(),
        Literal::Bool(true) => "True".to_string(),
        Literal::Bool(false) => "False".to_string(),
        Literal::Int(i) => i.to_string(),
        Literal::Float(f) => ryu::Buffer::new().format(*f).to_string(),
        Literal::Str(s) => quote_sl(s),
    }
}

fn const_str(value: &Const) -> String {
    match value {
        Const::None => "None".to_string(),
        Const::Bool(true) => "True".to_string(),
        Const::Bool(false) => "False".to_string(),
        Const::Int(i) => i.to_string(),
        Const::Float(f) => ryu::Buffer::new().format(*f).to_string(),
        Const::Str(s) => quote_sl(s),
        Const::List(items) => {
            let rendered: Vec<String> = items.iter().map(const_str).collect();
            format!("[{}]", rendered.join(", "))
        }
        Const::Tuple(items) => {
            let rendered: Vec<String> = items.iter().map(const_str).collect();
            format!("({})", rendered.join(", "))
        }
        Const::Dict(items) => {
            let rendered: Vec<String> = items
                .iter()
                .map(|(k, v)| format!("{}: {}", const_str(k), const_str(v)))
                .collect();
            format!("{{{}}}", rendered.join(", "))
        }
    }
}

fn quote_sl(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}
