//! The TL emitter.
//!
//! Renders the annotated tree into JavaScript source text, honoring call-site
//! rewriters, full-body replacements and per-class epilogues. Only objects
//! flagged reachable (or force-included) are rendered; builtins never are.

use crate::{
    error::CompileResult,
    hooks::{ArgType, RewriteCall},
    objects::{Const, Context, FunctionData, ObjectId, ObjectKind, StaticValue},
    parse::Literal,
    typed::{ForBinding, TypedExpr, TypedExprKind, TypedFStringPart, TypedNode},
    writer::SourceWriter,
};

/// How emitted modules reference each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BundleMode {
    /// Native `import` / `export` statements.
    #[default]
    EsModules,
    /// The registry runtime: `__import_js__` / `__export_js__` wrappers.
    Loader,
}

/// Emits one module's reachable objects as TL source text.
pub fn emit_module(cx: &Context, module: ObjectId, mode: BundleMode) -> CompileResult<String> {
    let mut emitter = Emitter {
        cx,
        mode,
        w: SourceWriter::new(),
    };
    emitter.module(module);
    Ok(emitter.w.finish())
}

struct Emitter<'cx> {
    cx: &'cx Context,
    mode: BundleMode,
    w: SourceWriter,
}

impl<'cx> Emitter<'cx> {
    fn module(&mut self, module: ObjectId) {
        let name = self.cx.objects[module].name.clone();
        self.w.fill(&format!("// {name}"));

        if let ObjectKind::Module(data) = &self.cx.objects[module].kind {
            for (imported_module, objects) in &data.imported {
                let names: Vec<&str> = objects
                    .iter()
                    .filter(|o| self.cx.objects[**o].should_emit())
                    .map(|o| self.cx.objects[*o].name.as_str())
                    .collect();
                if names.is_empty() {
                    continue;
                }
                let joined = names.join(", ");
                match self.mode {
                    BundleMode::EsModules => {
                        self.w
                            .fill(&format!("import {{ {joined} }} from './{imported_module}.js';"));
                    }
                    BundleMode::Loader => {
                        self.w
                            .fill(&format!("const {{ {joined} }} = __import_js__('{imported_module}');"));
                    }
                }
            }
        }

        let scope = self.cx.objects[module].scope;
        let members: Vec<ObjectId> = self.cx.scopes[scope].names.values().copied().collect();
        for id in members {
            if self.cx.objects[id].container != Some(module) {
                continue;
            }
            match &self.cx.objects[id].kind {
                ObjectKind::Generic(data) => {
                    // generic templates are never emitted, only their cached
                    // specializations
                    for concrete in data.cache.values() {
                        if self.cx.objects[*concrete].should_emit() {
                            self.class(*concrete);
                        }
                    }
                }
                ObjectKind::Class(_) if self.cx.objects[id].should_emit() => self.class(id),
                ObjectKind::Function(_) if self.cx.objects[id].should_emit() => self.function(id),
                ObjectKind::Instance(_) if self.cx.objects[id].should_emit() => self.constant(id),
                _ => {}
            }
        }
        self.w.write("\n");
    }

    // --- classes -------------------------------------------------------------

    fn class(&mut self, class: ObjectId) {
        let name = self.cx.objects[class].name.clone();
        self.w.blank_line();
        let export = match self.mode {
            BundleMode::EsModules => "export ",
            BundleMode::Loader => "",
        };
        let mut header = format!("{export}class {name}");
        if let Some(base) = self.cx.base_of(class) {
            if self.cx.objects[base].name != "object" {
                header.push_str(&format!(" extends {}", self.cx.objects[base].name));
            }
        }
        header.push_str(" {");
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
                ObjectKind::Instance(data) => {
                    if let Some(StaticValue::Const(value)) = &data.value {
                        let static_name = &self.cx.objects[member].name;
                        let rendered = self.const_str(value);
                        self.w.fill(&format!("static {static_name} = {rendered};"));
                    }
                }
                _ => {}
            }
        }

        self.w.dedent();
        self.w.fill("}");

        if let Some(append) = &self.cx.objects[class].directives.append {
            self.w.fill(append);
        }
        // custom elements register their kebab-cased tag after the class body
        if self.inherits(class, "CustomElement") && name != "CustomElement" {
            let tag = kebab_case(&name);
            self.w.fill(&format!("customElements.define('{tag}', {name});"));
        }
        if self.mode == BundleMode::Loader {
            self.w.fill(&format!("__export_js__.{name} = {name};"));
        }
    }

    // --- functions -----------------------------------------------------------

    fn function(&mut self, func: ObjectId) {
        let name = self.cx.objects[func].name.clone();
        let data = self.func_data(func);
        let is_method = data.is_method();
        let class = data.class;

        let is_custom_element_init = name == "__init__"
            && class.is_some_and(|c| {
                (self.inherits(c, "CustomElement") || self.inherits(c, "ProxyElement"))
                    && self.cx.objects[c].name != "CustomElement"
            });

        self.w.blank_line();
        let def_str = if is_custom_element_init {
            "_create".to_string()
        } else if name == "__init__" {
            "constructor".to_string()
        } else if is_method {
            if self.func_data(func).is_static() {
                format!("static {name}")
            } else {
                name.clone()
            }
        } else {
            match self.mode {
                BundleMode::EsModules => format!("export function {name}"),
                BundleMode::Loader => format!("function {name}"),
            }
        };

        let params = self.signature(func);
        self.w.fill(&format!("{def_str}({params}) {{"));
        self.w.indent();
        if let Some(source) = &self.func_data(func).source_text {
            for line in dedent_lines(source) {
                if !line.is_empty() {
                    self.w.fill(&line);
                }
            }
        } else {
            let body = self.func_data(func).body.clone();
            for node in &body {
                self.node(node);
            }
            if is_custom_element_init {
                self.w.fill("return this;");
            }
        }
        self.w.dedent();
        self.w.fill("}");

        if is_custom_element_init && class.is_some_and(|c| self.inherits(c, "CustomElement")) {
            self.hydrate_method(func);
        }
        if !is_method && self.mode == BundleMode::Loader {
            self.w.fill(&format!("__export_js__.{name} = {name};"));
        }
    }

    /// Renders a parameter list; trailing defaulted parameters collapse into
    /// a destructured options bag so callers may pass by name.
    fn signature(&mut self, func: ObjectId) -> String {
        let data = self.func_data(func);
        let defaults_start = data.params.len() - data.defaults.len();
        let mut out = String::new();
        let mut in_bag = false;
        for (i, param) in data.params.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            if i >= defaults_start && !in_bag {
                in_bag = true;
                out.push_str("{ ");
            }
            out.push_str(&param.name);
            if i >= defaults_start {
                out.push('=');
                out.push_str(&self.expr_str(&data.defaults[i - defaults_start].clone()));
            }
            if i + 1 == data.params.len() && in_bag {
                out.push_str(" } = {}");
            }
        }
        if let Some(vararg) = &data.vararg {
            if !out.is_empty() {
                out.push_str(", ");
            }
            out.push_str("...");
            out.push_str(&vararg.name);
        }
        out
    }

    fn func_data(&self, func: ObjectId) -> &'cx FunctionData {
        self.cx.objects[func].as_function().expect("emitting a function")
    }

    // --- hydration -----------------------------------------------------------

    /// Custom-element classes get a companion that re-binds DOM-element
    /// attributes by their synthesized per-instance ids and re-attaches event
    /// listeners.
    fn hydrate_method(&mut self, init: ObjectId) {
        self.w.blank_line();
        self.w.fill("_hydrate() {");
        self.w.indent();

        let body = self.func_data(init).body.clone();
        let mut elements: Vec<String> = Vec::new();
        let mut self_id_set = false;
        for node in &body {
            if let TypedNode::Assign { target, value } | TypedNode::Declare { target, value, .. } = node {
                let TypedExprKind::Attribute { value: parent, attr } = &target.kind else {
                    continue;
                };
                if !matches!(&parent.kind, TypedExprKind::Name(n) if n == "self") {
                    continue;
                }
                let Some(value_ty) = self.cx.type_of(value.referent) else {
                    continue;
                };
                if self.inherits(value_ty, "HTMLElement") {
                    if !self_id_set {
                        self_id_set = true;
                        self.w.fill("const self_id = this.get_data('self-id');");
                    }
                    elements.push(attr.clone());
                    self.w
                        .fill(&format!("this.{attr} = document.getElementById(self_id+'-{attr}');"));
                } else if self.inherits(value_ty, "ProxyElement") {
                    if !self_id_set {
                        self_id_set = true;
                        self.w.fill("const self_id = this.get_data('self-id');");
                    }
                    elements.push(attr.clone());
                    let proxy = &self.cx.objects[value_ty].name;
                    self.w.fill(&format!(
                        "this.{attr} = new {proxy}()._hydrate(document.getElementById(self_id+'-{attr}'));"
                    ));
                }
            }
        }
        // event wiring must re-run against the re-bound elements
        for node in &body {
            let TypedNode::Expr(expr) = node else { continue };
            let TypedExprKind::Call { func, .. } = &expr.kind else {
                continue;
            };
            let TypedExprKind::Attribute { value, attr } = &func.kind else {
                continue;
            };
            let on_element = matches!(
                &value.kind,
                TypedExprKind::Attribute { value: parent, attr: element }
                    if matches!(&parent.kind, TypedExprKind::Name(n) if n == "self") && elements.contains(element)
            );
            if attr == "addEventListener" || on_element {
                self.node(node);
            }
        }

        self.w.dedent();
        self.w.fill("}");
    }

    // --- statements ----------------------------------------------------------

    fn node(&mut self, node: &TypedNode) {
        match node {
            TypedNode::Pass | TypedNode::Assert { .. } => {}
            TypedNode::Break => self.w.fill("break;"),
            TypedNode::Continue => self.w.fill("continue;"),
            TypedNode::Expr(expr) => {
                let rendered = self.expr_str(expr);
                self.w.fill(&format!("{rendered};"));
            }
            TypedNode::Declare { target, value, .. } => {
                let target = self.expr_str(target);
                let value = self.expr_str(value);
                self.w.fill(&format!("var {target} = {value};"));
            }
            TypedNode::Assign { target, value } => {
                let target = self.expr_str(target);
                let value = self.expr_str(value);
                self.w.fill(&format!("{target} = {value};"));
            }
            TypedNode::Return { value } => match value {
                Some(value) => {
                    let rendered = self.expr_str(value);
                    self.w.fill(&format!("return {rendered};"));
                }
                None => self.w.fill("return;"),
            },
            TypedNode::Raise { exc } => match exc {
                Some(name) => self.w.fill(&format!("throw '{name}';")),
                None => self.w.fill("throw undefined;"),
            },
            TypedNode::If { test, body, or_else } => {
                let test = self.expr_str(test);
                self.w.fill(&format!("if ({test}) {{"));
                self.block(body);
                let mut rest = or_else;
                loop {
                    match rest.as_slice() {
                        [] => break,
                        [TypedNode::If { test, body, or_else }] => {
                            let test = self.expr_str(test);
                            self.w.write(&format!(" else if ({test}) {{"));
                            self.block(body);
                            rest = or_else;
                        }
                        nodes => {
                            self.w.write(" else {");
                            self.block(nodes);
                            break;
                        }
                    }
                }
            }
            TypedNode::While { test, body } => {
                let test = self.expr_str(test);
                self.w.fill(&format!("while ({test}) {{"));
                self.block(body);
            }
            TypedNode::For { target, iter, body } => {
                let iter = self.expr_str(iter);
                let binding = match target {
                    ForBinding::Name { name, .. } => name.clone(),
                    ForBinding::Tuple(names) => format!(
                        "[{}]",
                        names.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>().join(", ")
                    ),
                };
                self.w.fill(&format!("for (var {binding} of {iter}) {{"));
                self.block(body);
            }
        }
    }

    /// Emits an indented statement block and its closing brace.
    fn block(&mut self, nodes: &[TypedNode]) {
        self.w.indent();
        for node in nodes {
            self.node(node);
        }
        self.w.dedent();
        self.w.fill("}");
    }

    // --- expressions ---------------------------------------------------------

    fn expr_str(&self, expr: &TypedExpr) -> String {
        match &expr.kind {
            TypedExprKind::Literal(literal) => literal_str(literal),
            TypedExprKind::Name(name) => {
                if name == "self" && self.cx.objects[expr.referent].as_instance().is_some() {
                    "this".to_string()
                } else {
                    name.clone()
                }
            }
            TypedExprKind::Attribute { value, attr } => {
                format!("{}.{attr}", self.expr_str(value))
            }
            TypedExprKind::Call { func, args, keywords } => self.call_str(func, args, keywords),
            TypedExprKind::Not(operand) => {
                let rendered = self.expr_str(operand);
                if rendered.contains(' ') {
                    format!("!({rendered})")
                } else {
                    format!("!{rendered}")
                }
            }
            TypedExprKind::List(items) | TypedExprKind::Tuple(items) => {
                let rendered: Vec<String> = items.iter().map(|i| self.call_arg_str(i)).collect();
                format!("[{}]", rendered.join(", "))
            }
            TypedExprKind::Dict(items) => {
                let rendered: Vec<String> = items
                    .iter()
                    .map(|(k, v)| format!("[{}, {}]", self.expr_str(k), self.expr_str(v)))
                    .collect();
                format!("new Map([{}])", rendered.join(", "))
            }
            TypedExprKind::Subscript { value, index } => {
                // subscripts dispatch through the container's `__getitem__`
                let receiver = self.expr_str(value);
                let rendered_index = self.expr_str(index);
                if let Some(getitem) = self.cx.find(value.referent, "__getitem__") {
                    if let Some(rendered) = self.apply_hook(
                        getitem,
                        Some(&receiver),
                        &[rendered_index.clone()],
                        &[self.arg_type(index)],
                    ) {
                        return rendered;
                    }
                }
                format!("{receiver}[{rendered_index}]")
            }
            TypedExprKind::Starred(value) => format!("...{}", self.expr_str(value)),
            TypedExprKind::Lambda { params, body } => {
                format!("({}) => {}", params.join(", "), self.expr_str(body))
            }
            TypedExprKind::FString(parts) => {
                let rendered: Vec<String> = parts
                    .iter()
                    .map(|part| match part {
                        TypedFStringPart::Literal(text) => quote_str(text),
                        TypedFStringPart::Interpolation(inner) => self.expr_str(inner),
                    })
                    .collect();
                rendered.join("+")
            }
            TypedExprKind::IfExp { test, body, orelse } => {
                format!(
                    "({} ? {} : {})",
                    self.expr_str(test),
                    self.expr_str(body),
                    self.expr_str(orelse)
                )
            }
            TypedExprKind::ListComp { elt, target, iter } => {
                format!("{}.map({target} => {})", self.expr_str(iter), self.expr_str(elt))
            }
        }
    }

    fn call_str(&self, func: &TypedExpr, args: &[TypedExpr], keywords: &[(String, TypedExpr)]) -> String {
        // call-site rewriters take precedence over every other call form
        if let Some(rendered) = self.try_rewrite(func, args) {
            return rendered;
        }

        let rendered_args = self.args_str(args, keywords);

        // super(...) / super.method(...)
        if let TypedExprKind::Attribute { value, attr } = &func.kind {
            if let TypedExprKind::Call { func: inner, .. } = &value.kind {
                if matches!(&inner.kind, TypedExprKind::Name(n) if n == "super") {
                    if attr == "__init__" {
                        let base = value.referent;
                        if self.inherits(base, "CustomElement") {
                            return format!("super._create({rendered_args})");
                        }
                        return format!("super({rendered_args})");
                    }
                    return format!("super.{attr}({rendered_args})");
                }
            }
        }

        if self.cx.objects[func.referent].is_class() {
            let rendered_func = self.expr_str(func);
            if self.inherits(func.referent, "CustomElement") {
                return format!("new {rendered_func}()._create({rendered_args})");
            }
            return format!("new {rendered_func}({rendered_args})");
        }

        format!("{}({rendered_args})", self.expr_str(func))
    }

    /// Applies the callee's call-site rewriter, if it has one that accepts
    /// this call.
    fn try_rewrite(&self, func: &TypedExpr, args: &[TypedExpr]) -> Option<String> {
        // classes rewrite through their constructor's hook
        let hook_owner = match &self.cx.objects[func.referent].kind {
            ObjectKind::Function(_) => func.referent,
            ObjectKind::Class(_) => self.cx.find(func.referent, "__init__")?,
            _ => return None,
        };
        self.func_data(hook_owner).hook.as_ref()?;

        let receiver = match &func.kind {
            TypedExprKind::Attribute { value, .. } => Some(self.expr_str(value)),
            _ => None,
        };
        let rendered_args: Vec<String> = args.iter().map(|a| self.call_arg_str(a)).collect();
        let arg_types: Vec<ArgType> = args.iter().map(|a| self.arg_type(a)).collect();
        self.apply_hook(hook_owner, receiver.as_deref(), &rendered_args, &arg_types)
    }

    fn apply_hook(
        &self,
        hook_owner: ObjectId,
        receiver: Option<&str>,
        args: &[String],
        arg_types: &[ArgType],
    ) -> Option<String> {
        let data = self.func_data(hook_owner);
        let hook = data.hook.as_ref()?;
        let params: Vec<String> = data.params.iter().map(|p| p.name.clone()).collect();
        hook.apply(&RewriteCall {
            receiver,
            args,
            arg_types,
            params: &params,
        })
    }

    fn args_str(&self, args: &[TypedExpr], keywords: &[(String, TypedExpr)]) -> String {
        let mut rendered: Vec<String> = args.iter().map(|a| self.call_arg_str(a)).collect();
        if !keywords.is_empty() {
            let pairs: Vec<String> = keywords
                .iter()
                .map(|(name, value)| format!("{name}: {}", self.expr_str(value)))
                .collect();
            rendered.push(format!("{{{}}}", pairs.join(", ")));
        }
        rendered.join(", ")
    }

    /// Method references passed as values keep their receiver identity.
    fn call_arg_str(&self, arg: &TypedExpr) -> String {
        let rendered = self.expr_str(arg);
        if let TypedExprKind::Attribute { value, .. } = &arg.kind {
            if self.cx.objects[arg.referent].is_function() {
                return format!("{rendered}.bind({})", self.expr_str(value));
            }
        }
        rendered
    }

    fn arg_type(&self, arg: &TypedExpr) -> ArgType {
        let ty = self.cx.type_of(arg.referent).unwrap_or(arg.referent);
        let name = self.cx.objects[ty].name.clone();
        let generic = match &self.cx.objects[ty].kind {
            ObjectKind::Class(data) => data.generic_name.clone(),
            _ => name.clone(),
        };
        ArgType { name, generic }
    }

    // --- constants -----------------------------------------------------------

    fn constant(&mut self, instance: ObjectId) {
        let Some(data) = self.cx.objects[instance].as_instance() else {
            return;
        };
        let Some(value) = &data.value else { return };
        let name = &self.cx.objects[instance].name;
        let rendered = match value {
            StaticValue::Const(value) => self.const_str(value),
            StaticValue::New { class, args } => {
                let class_name = &self.cx.objects[*class].name;
                let args: Vec<String> = args.iter().map(|a| self.const_str(a)).collect();
                format!("new {class_name}({})", args.join(", "))
            }
        };
        match self.mode {
            BundleMode::EsModules => self.w.fill(&format!("export const {name} = {rendered};")),
            BundleMode::Loader => {
                self.w.fill(&format!("const {name} = {rendered};"));
                self.w.fill(&format!("__export_js__.{name} = {name};"));
            }
        }
    }

    fn const_str(&self, value: &Const) -> String {
        match value {
            Const::None => "null".to_string(),
            Const::Bool(b) => b.to_string(),
            Const::Int(i) => i.to_string(),
            Const::Float(f) => ryu::Buffer::new().format(*f).to_string(),
            Const::Str(s) => quote_str(s),
            Const::List(items) | Const::Tuple(items) => {
                let rendered: Vec<String> = items.iter().map(|i| self.const_str(i)).collect();
                format!("[{}]", rendered.join(", "))
            }
            Const::Dict(items) => {
                let rendered: Vec<String> = items
                    .iter()
                    .map(|(k, v)| format!("[{}, {}]", self.const_str(k), self.const_str(v)))
                    .collect();
                format!("new Map([{}])", rendered.join(", "))
            }
        }
    }

    // --- helpers -------------------------------------------------------------

    fn inherits(&self, class: ObjectId, ancestor: &str) -> bool {
        self.cx.objects[class].is_class() && self.cx.inherits_from(class, ancestor)
    }
}

fn literal_str(literal: &Literal) -> String {
    match literal {
        Literal::None => "null".to_string(),
        Literal::Bool(b) => b.to_string(),
        Literal::Int(i) => i.to_string(),
        Literal::Float(f) => ryu::Buffer::new().format(*f).to_string(),
        Literal::Str(s) => quote_str(s),
    }
}

/// Single-quoted TL string literal.
pub(crate) fn quote_str(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// CamelCase to kebab-case, for custom element tag names.
fn kebab_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase() || prev.is_ascii_digit() || (prev.is_ascii_uppercase() && next_lower) {
                out.push('-');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// Strips the common leading indentation from replacement body text.
fn dedent_lines(source: &str) -> Vec<String> {
    let lines: Vec<&str> = source.lines().collect();
    let indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|l| if l.len() >= indent { l[indent..].to_string() } else { (*l).to_string() })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::kebab_case;

    #[test]
    fn kebab_case_splits_camel_words() {
        assert_eq!(kebab_case("TodoList"), "todo-list");
        assert_eq!(kebab_case("Counter"), "counter");
        assert_eq!(kebab_case("HTMLButton"), "html-button");
        assert_eq!(kebab_case("Item2View"), "item2-view");
    }
}
