//! Whole-program type inference.
//!
//! Inference runs per function: the parameter list is typed first, then the
//! body walk assigns every expression an object-model referent. Operators are
//! dispatched through their dunder pairs with reflected fallback, so the
//! typed tree contains only method-call nodes by the time the emitter sees
//! it. Steps that hit an un-analyzed construct raise a dependency signal; the
//! driver orders the raised edges topologically and retries to a fixed point.

use indexmap::IndexMap;

use crate::{
    builtins,
    error::{CodeLoc, CompileError, CompileResult, ErrorKind},
    objects::{AnalysisState, ClassDefId, Context, GenericArgs, ObjectId, ObjectKind, Param, ScopeId, ScopeKind},
    parse::{CmpOperator, Expr, ExprLoc, ForTarget, Literal, Node, Operator, RawParam},
    typed::{ForBinding, TypedExpr, TypedExprKind, TypedFStringPart, TypedNode},
};

/// Outcome of one inference step.
///
/// `Pending` is the recoverable dependency signal: it is raised when a step
/// needs a construct that is not analyzed yet, and it must never escape the
/// driver.
#[derive(Debug)]
pub(crate) enum InferError {
    Fatal(CompileError),
    /// The unready class or function this step depends on.
    Pending(ObjectId),
}

impl From<CompileError> for InferError {
    fn from(error: CompileError) -> Self {
        Self::Fatal(error)
    }
}

pub(crate) type InferResult<T> = Result<T, InferError>;

/// Left/reflected dunder pairs for comparison operators.
///
/// `in`/`not in` swap their operands first and have no reflected form.
fn compare_methods(op: CmpOperator) -> (&'static str, Option<&'static str>) {
    match op {
        CmpOperator::Is => ("__is__", Some("__is__")),
        CmpOperator::IsNot => ("__is_not__", Some("__is_not__")),
        CmpOperator::Lt => ("__lt__", Some("__gt__")),
        CmpOperator::LtE => ("__le__", Some("__ge__")),
        CmpOperator::Gt => ("__gt__", Some("__lt__")),
        CmpOperator::GtE => ("__ge__", Some("__le__")),
        CmpOperator::Eq => ("__eq__", Some("__eq__")),
        CmpOperator::NotEq => ("__ne__", Some("__ne__")),
        CmpOperator::In | CmpOperator::NotIn => ("__contains__", None),
    }
}

/// Left/reflected dunder pairs for binary operators.
///
/// `**` maps to the `__mod__` pair, matching the operator table the builtins
/// registry advertises.
fn binop_methods(op: Operator, loc: CodeLoc) -> InferResult<(&'static str, &'static str)> {
    Ok(match op {
        Operator::Add => ("__add__", "__radd__"),
        Operator::Sub => ("__sub__", "__rsub__"),
        Operator::Mult => ("__mul__", "__rmul__"),
        Operator::Div => ("__truediv__", "__rtruediv__"),
        Operator::FloorDiv => ("__floordiv__", "__rfloordiv__"),
        Operator::Pow => ("__mod__", "__rmod__"),
        Operator::BitOr => {
            return Err(CompileError::unsupported("`|` outside an annotation", Some(loc)).into());
        }
    })
}

// --- driver ------------------------------------------------------------------

/// Analyzes every function declared by `module`, retrying on dependency
/// signals until a fixed point.
pub fn annotate_module(cx: &mut Context, module: ObjectId) -> CompileResult<()> {
    let mut worklist = flatten_functions(cx, module);
    loop {
        // func -> constructs it turned out to depend on
        let mut edges: IndexMap<ObjectId, Vec<ObjectId>> = IndexMap::new();
        for func in &worklist {
            match attempt(cx, *func) {
                Ok(()) => {}
                Err(InferError::Pending(dep)) => {
                    edges.insert(*func, flatten_dependency(cx, dep));
                }
                Err(InferError::Fatal(error)) => return Err(error),
            }
        }
        if edges.is_empty() {
            return Ok(());
        }
        worklist = topological_order(cx, &edges)?;
    }
}

/// One reset-and-infer attempt for a single function.
fn attempt(cx: &mut Context, func: ObjectId) -> InferResult<()> {
    reset(cx, func);
    if let ObjectKind::Function(data) = &mut cx.objects[func].kind {
        data.state = AnalysisState::InProgress;
    }
    Infer::new(cx, func).infer_function()?;
    if let ObjectKind::Function(data) = &mut cx.objects[func].kind {
        data.state = AnalysisState::Analyzed;
    }
    Ok(())
}

/// Clears everything a previous attempt recorded so inference is idempotent
/// on re-entry. Only the structurally injected `super` binding is restored;
/// every other name is rediscovered by the walk itself.
fn reset(cx: &mut Context, func: ObjectId) {
    let scope = cx.objects[func].scope;
    cx.scopes[scope].names.clear();
    if let ObjectKind::Function(data) = &mut cx.objects[func].kind {
        data.state = AnalysisState::Unanalyzed;
        data.params.clear();
        data.defaults.clear();
        data.vararg = None;
        data.kwarg = None;
        data.body.clear();
        data.return_type = None;
    }
    cx.rebind_super(func);
}

/// All functions declared by a module (or class), in declaration order.
/// Imported references and generic templates are skipped; specializations
/// enter the worklist through the dependency edges that created them.
pub(crate) fn flatten_functions(cx: &Context, parent: ObjectId) -> Vec<ObjectId> {
    let mut out = Vec::new();
    collect_functions(cx, parent, &mut out);
    out
}

fn collect_functions(cx: &Context, parent: ObjectId, out: &mut Vec<ObjectId>) {
    match &cx.objects[parent].kind {
        ObjectKind::Module(_) => {
            let scope = cx.objects[parent].scope;
            for id in cx.scopes[scope].names.values() {
                if cx.objects[*id].container == Some(parent) {
                    collect_functions(cx, *id, out);
                }
            }
        }
        ObjectKind::Class(data) => {
            for id in cx.scopes[data.internal_scope].names.values() {
                collect_functions(cx, *id, out);
            }
        }
        ObjectKind::Function(_) => out.push(parent),
        _ => {}
    }
}

/// Expands a raised dependency to the functions that must analyze first.
fn flatten_dependency(cx: &Context, dep: ObjectId) -> Vec<ObjectId> {
    match &cx.objects[dep].kind {
        ObjectKind::Function(_) => vec![dep],
        ObjectKind::Class(_) => flatten_functions(cx, dep),
        _ => Vec::new(),
    }
}

/// Orders the retry worklist so dependencies run before their dependents.
///
/// A cycle in the dependency edges means no further progress is possible;
/// the diagnostic lists the functions forming it.
fn topological_order(cx: &Context, edges: &IndexMap<ObjectId, Vec<ObjectId>>) -> CompileResult<Vec<ObjectId>> {
    let mut nodes: Vec<ObjectId> = Vec::new();
    let mut push = |id: ObjectId, nodes: &mut Vec<ObjectId>| {
        if !nodes.contains(&id) {
            nodes.push(id);
        }
    };
    for (func, deps) in edges {
        for dep in deps {
            push(*dep, &mut nodes);
        }
        push(*func, &mut nodes);
    }

    // a function depending on itself is already an unresolvable cycle
    for (func, deps) in edges {
        if deps.contains(func) {
            return Err(CompileError::new(
                ErrorKind::Unsupported,
                format!("dependency cycle between: {}", cx.objects[*func].name),
                None,
            ));
        }
    }

    // one edge per dependency: the dependency orders before the function
    let mut indegree: IndexMap<ObjectId, usize> = nodes.iter().map(|id| (*id, 0)).collect();
    for (func, deps) in edges {
        if let Some(entry) = indegree.get_mut(func) {
            *entry += deps.len();
        }
    }

    let mut order = Vec::with_capacity(nodes.len());
    let mut ready: Vec<ObjectId> = nodes
        .iter()
        .copied()
        .filter(|id| indegree.get(id) == Some(&0))
        .collect();
    let mut cursor = 0;
    while cursor < ready.len() {
        let current = ready[cursor];
        cursor += 1;
        order.push(current);
        for (func, deps) in edges {
            if deps.contains(&current) && *func != current {
                let entry = indegree.get_mut(func).expect("node registered");
                *entry -= 1;
                if *entry == 0 {
                    ready.push(*func);
                }
            }
        }
    }

    if order.len() < nodes.len() {
        let cycle: Vec<&str> = nodes
            .iter()
            .filter(|id| !order.contains(id))
            .map(|id| cx.objects[*id].name.as_str())
            .collect();
        return Err(CompileError::new(
            ErrorKind::Unsupported,
            format!("dependency cycle between: {}", cycle.join(", ")),
            None,
        ));
    }
    Ok(order)
}

// --- the inference walk ------------------------------------------------------

struct Infer<'cx> {
    cx: &'cx mut Context,
    func: ObjectId,
    /// Current scope: the function scope, or a narrowed block scope.
    scope: ScopeId,
}

impl<'cx> Infer<'cx> {
    fn new(cx: &'cx mut Context, func: ObjectId) -> Self {
        let scope = cx.objects[func].scope;
        Self { cx, func, scope }
    }

    fn func_data(&self) -> &crate::objects::FunctionData {
        self.cx.objects[self.func]
            .as_function()
            .expect("inference target is a function")
    }

    fn name_error(&self, message: String, loc: CodeLoc) -> InferError {
        InferError::Fatal(CompileError::name(message, Some(loc)))
    }

    // --- function-level walk -------------------------------------------------

    fn infer_function(&mut self) -> InferResult<()> {
        let def_id = self.func_data().def;
        let def = self.cx.func_def(def_id).clone();
        let class = self.func_data().class;
        let is_classmethod = self.func_data().is_classmethod;
        let is_staticmethod = self.func_data().is_staticmethod;
        let is_method = class.is_some() && !is_staticmethod;

        let mut params = def.params.as_slice();
        if is_method {
            let receiver = if is_classmethod { "cls" } else { "self" };
            let first = params.first().ok_or_else(|| {
                CompileError::mismatch(
                    format!("method `{}` is missing its `{receiver}` parameter", def.name),
                    Some(def.loc),
                )
            })?;
            if first.name != receiver {
                return Err(CompileError::mismatch(
                    format!("first parameter of `{}` should be `{receiver}`", def.name),
                    Some(def.loc),
                )
                .into());
            }
            let class = class.expect("method has a class");
            let bound = if is_classmethod {
                class
            } else {
                self.cx.objects[class]
                    .as_class()
                    .expect("method container is a class")
                    .self_instance
            };
            self.cx.scopes.add(self.scope, receiver, bound);
            params = &params[1..];
        }

        for param in params {
            self.infer_param(param, def.loc)?;
        }
        if let Some(vararg) = &def.vararg {
            // variadics collect into a positional tuple
            let item = match &vararg.annotation {
                Some(annotation) => self.visit_type_annotation(annotation)?,
                None => self.cx.builtin("object").map_err(CompileError::from)?,
            };
            let tuple = self.cx.builtin("tuple").map_err(CompileError::from)?;
            let ty = self.specialize(tuple, &GenericArgs::from_slice(&[item]), def.loc)?;
            self.bind_param(&vararg.name, ty, ParamSlot::VarArg)?;
        }
        if let Some(kwarg) = &def.kwarg {
            // keyword-variadics collect into a string-keyed dict
            let value = match &kwarg.annotation {
                Some(annotation) => self.visit_type_annotation(annotation)?,
                None => self.cx.builtin("object").map_err(CompileError::from)?,
            };
            let key = self.cx.builtin("str").map_err(CompileError::from)?;
            let dict = self.cx.builtin("dict").map_err(CompileError::from)?;
            let ty = self.specialize(dict, &GenericArgs::from_slice(&[key, value]), def.loc)?;
            self.bind_param(&kwarg.name, ty, ParamSlot::KwArg)?;
        }

        let analyze_body = {
            let data = self.func_data();
            self.cx.objects[self.func].directives.analyze_body()
                && data.hook.is_none()
                && data.source_text.is_none()
        };
        if analyze_body {
            let body = self.visit_body(&def.body)?;
            if let ObjectKind::Function(data) = &mut self.cx.objects[self.func].kind {
                data.body = body;
            }
        } else if def.name == "__init__" {
            if let ObjectKind::Function(data) = &mut self.cx.objects[self.func].kind {
                data.return_type = data.class;
            }
        } else if def.returns.is_none() {
            return Err(CompileError::mismatch(
                format!("`{}` needs a return annotation because its body is not analyzed", def.name),
                Some(def.loc),
            )
            .into());
        }

        if let Some(returns) = &def.returns {
            if matches!(&returns.expr, Expr::Literal(Literal::None)) {
                let inferred = self.func_data().return_type;
                if analyze_body && inferred.is_some() {
                    return Err(CompileError::mismatch(
                        format!("`{}` is annotated `-> None` but returns a value", def.name),
                        Some(returns.loc),
                    )
                    .into());
                }
            } else {
                let annotated = self.visit_type_annotation(returns)?;
                let inferred = self.func_data().return_type;
                if analyze_body {
                    if let Some(inferred) = inferred {
                        if self.cx.annotation_str(inferred) != self.cx.annotation_str(annotated) {
                            return Err(CompileError::mismatch(
                                format!(
                                    "`{}` is annotated `-> {}` but returns `{}`",
                                    def.name,
                                    self.cx.annotation_str(annotated),
                                    self.cx.annotation_str(inferred),
                                ),
                                Some(returns.loc),
                            )
                            .into());
                        }
                    }
                }
                if let ObjectKind::Function(data) = &mut self.cx.objects[self.func].kind {
                    data.return_type = Some(annotated);
                }
            }
        }
        Ok(())
    }

    /// Types one declared parameter from its annotation or default value.
    fn infer_param(&mut self, param: &RawParam, def_loc: CodeLoc) -> InferResult<()> {
        let default = param
            .default
            .as_ref()
            .map(|d| self.visit_expr(d))
            .transpose()?;
        let default_ty = match &default {
            Some(expr) => {
                let ty = self.cx.type_of(expr.referent);
                match ty {
                    Some(ty) if self.cx.objects[ty].is_class() => Some(ty),
                    _ => {
                        return Err(CompileError::underspecified(Some(expr.loc)).into());
                    }
                }
            }
            None => None,
        };
        let annotation_ty = param
            .annotation
            .as_ref()
            .map(|a| self.visit_type_annotation(a))
            .transpose()?;
        let Some(ty) = annotation_ty.or(default_ty) else {
            return Err(CompileError::underspecified(Some(
                param.annotation.as_ref().map_or(def_loc, |a| a.loc),
            ))
            .into());
        };
        self.bind_param(&param.name, ty, ParamSlot::Positional)?;
        if let Some(default) = default {
            if let ObjectKind::Function(data) = &mut self.cx.objects[self.func].kind {
                data.defaults.push(default);
            }
        }
        Ok(())
    }

    /// Records a typed parameter and its scope binding.
    fn bind_param(&mut self, name: &str, ty: ObjectId, slot: ParamSlot) -> InferResult<()> {
        let instance = self
            .cx
            .instantiate(ty, name, self.scope, Some(self.func), None, false);
        self.cx.scopes.add(self.scope, name, instance);
        if let ObjectKind::Function(data) = &mut self.cx.objects[self.func].kind {
            let param = Param {
                name: name.to_string(),
                ty,
            };
            match slot {
                ParamSlot::Positional => data.params.push(param),
                ParamSlot::VarArg => data.vararg = Some(param),
                ParamSlot::KwArg => data.kwarg = Some(param),
            }
        }
        Ok(())
    }

    // --- statements ----------------------------------------------------------

    /// Walks a statement list, pushing a narrowed scope after a successful
    /// `assert isinstance(...)` so subsequent statements see the asserted
    /// class.
    fn visit_body(&mut self, nodes: &[Node]) -> InferResult<Vec<TypedNode>> {
        let saved = self.scope;
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            let mut typed = self.visit_node(node)?;
            let narrowing = match typed.last() {
                Some(TypedNode::Assert { test }) => self.narrowing_target(test).map(|n| (n, test.loc)),
                _ => None,
            };
            if let Some(((path, class), loc)) = narrowing {
                let class = self.concrete_narrowing_class(class, loc)?;
                let narrowed = self.cx.scopes.alloc(ScopeKind::Local, Some(self.scope), false);
                let instance = self.cx.instantiate(class, &path, narrowed, Some(self.func), None, false);
                self.cx.scopes.add(narrowed, path, instance);
                self.scope = narrowed;
            }
            out.append(&mut typed);
        }
        self.scope = saved;
        Ok(out)
    }

    fn visit_node(&mut self, node: &Node) -> InferResult<Vec<TypedNode>> {
        Ok(match node {
            Node::Pass => vec![TypedNode::Pass],
            Node::Break => vec![TypedNode::Break],
            Node::Continue => vec![TypedNode::Continue],
            Node::Expr(expr) => vec![TypedNode::Expr(self.visit_expr(expr)?)],
            Node::Assert { test } => vec![TypedNode::Assert {
                test: self.visit_expr(test)?,
            }],
            Node::Raise { exc, .. } => vec![TypedNode::Raise { exc: exc.clone() }],
            Node::Return { value, .. } => {
                let value = value.as_ref().map(|v| self.visit_expr(v)).transpose()?;
                if let Some(value) = &value {
                    let ty = self
                        .cx
                        .type_of(value.referent)
                        .ok_or_else(|| CompileError::underspecified(Some(value.loc)))?;
                    // the function's return type is the join of all returns
                    let current = self.func_data().return_type;
                    let joined = match current {
                        None => Some(ty),
                        Some(current) => self.cx.union_of([current, ty]),
                    };
                    if let ObjectKind::Function(data) = &mut self.cx.objects[self.func].kind {
                        data.return_type = joined;
                    }
                }
                vec![TypedNode::Return { value }]
            }
            Node::Assign { targets, value } => self.visit_assignment(targets, value, None)?,
            Node::AnnAssign {
                target,
                annotation,
                value,
            } => {
                let annotated = self.visit_type_annotation(annotation)?;
                self.visit_assignment(std::slice::from_ref(target), value, Some(annotated))?
            }
            Node::AugAssign { target, op, value } => {
                let lowered = ExprLoc::new(
                    value.loc,
                    Expr::BinOp {
                        left: Box::new(target.clone()),
                        op: *op,
                        right: Box::new(value.clone()),
                    },
                );
                self.visit_assignment(std::slice::from_ref(target), &lowered, None)?
            }
            Node::If { test, body, or_else } => {
                let (test, narrowing) = self.visit_condition(test)?;
                let body = match narrowing {
                    Some((path, class)) => {
                        let saved = self.scope;
                        let narrowed = self.cx.scopes.alloc(ScopeKind::Local, Some(self.scope), false);
                        let instance = self.cx.instantiate(class, &path, narrowed, Some(self.func), None, false);
                        self.cx.scopes.add(narrowed, path, instance);
                        self.scope = narrowed;
                        let body = self.visit_body(body);
                        self.scope = saved;
                        body?
                    }
                    None => self.visit_body(body)?,
                };
                let or_else = self.visit_body(or_else)?;
                vec![TypedNode::If { test, body, or_else }]
            }
            Node::While { test, body } => {
                let (test, _) = self.visit_condition(test)?;
                let body = self.visit_body(body)?;
                vec![TypedNode::While { test, body }]
            }
            Node::For { target, iter, body } => {
                let iter = self.visit_expr(iter)?;
                let binding = self.bind_loop_target(target, &iter)?;
                let body = self.visit_body(body)?;
                vec![TypedNode::For {
                    target: binding,
                    iter,
                    body,
                }]
            }
            Node::FunctionDef(def) => {
                return Err(CompileError::unsupported("nested function definition", Some(def.loc)).into());
            }
            Node::ClassDef(def) => {
                return Err(CompileError::unsupported("nested class definition", Some(def.loc)).into());
            }
            Node::ImportFrom { loc, .. } => {
                return Err(CompileError::unsupported("import inside a function", Some(*loc)).into());
            }
        })
    }

    /// Types a condition, inserting a bool-coercion call when the test is not
    /// already boolean, and detecting `isinstance` narrowing.
    fn visit_condition(&mut self, test: &ExprLoc) -> InferResult<(TypedExpr, Option<(String, ObjectId)>)> {
        let typed = self.visit_expr(test)?;
        let narrowing = self.narrowing_target(&typed);
        let narrowing = match narrowing {
            Some((path, class)) => Some((path, self.concrete_narrowing_class(class, typed.loc)?)),
            None => None,
        };
        let test_ty = self
            .cx
            .type_of(typed.referent)
            .ok_or_else(|| CompileError::underspecified(Some(typed.loc)))?;
        if self.cx.objects[test_ty].name == "bool" {
            return Ok((typed, narrowing));
        }
        let coerced = self.coerce_bool(typed)?;
        Ok((coerced, narrowing))
    }

    /// Wraps an expression in a call to its type's bool-coercion method.
    fn coerce_bool(&mut self, operand: TypedExpr) -> InferResult<TypedExpr> {
        let loc = operand.loc;
        let ty = self
            .cx
            .type_of(operand.referent)
            .ok_or_else(|| CompileError::underspecified(Some(loc)))?;
        let func = self
            .cx
            .find(ty, "__bool__")
            .ok_or_else(|| self.name_error(format!("`{}` has no `__bool__`", self.cx.objects[ty].name), loc))?;
        let return_type = self.function_return_type(func, loc)?;
        Ok(TypedExpr::new(
            loc,
            return_type,
            TypedExprKind::Call {
                func: Box::new(TypedExpr::new(
                    loc,
                    func,
                    TypedExprKind::Attribute {
                        value: Box::new(operand),
                        attr: "__bool__".to_string(),
                    },
                )),
                args: vec![],
                keywords: vec![],
            },
        ))
    }

    /// Recognizes `isinstance(<path>, <Class>)` in an already typed test.
    fn narrowing_target(&self, test: &TypedExpr) -> Option<(String, ObjectId)> {
        let TypedExprKind::Call { func, args, .. } = &test.kind else {
            return None;
        };
        let TypedExprKind::Name(name) = &func.kind else {
            return None;
        };
        if name != "isinstance" || args.len() != 2 {
            return None;
        }
        let path = typed_path(&args[0])?;
        let class = args[1].referent;
        matches!(
            self.cx.objects[class].kind,
            ObjectKind::Class(_) | ObjectKind::Generic(_)
        )
        .then_some((path, class))
    }

    /// A narrowing against a bare generic (`isinstance(x, list)`) narrows to
    /// the object-typed specialization.
    fn concrete_narrowing_class(&mut self, class: ObjectId, loc: CodeLoc) -> InferResult<ObjectId> {
        if !matches!(self.cx.objects[class].kind, ObjectKind::Generic(_)) {
            return Ok(class);
        }
        let object = self.cx.builtin("object").map_err(CompileError::from)?;
        match self.cx.objects[class].name.as_str() {
            "list" => self.specialize(class, &GenericArgs::from_slice(&[object]), loc),
            "dict" => self.specialize(class, &GenericArgs::from_slice(&[object, object]), loc),
            other => Err(CompileError::unsupported(format!("narrowing against generic `{other}`"), Some(loc)).into()),
        }
    }

    /// Binds the loop variable(s) from the iterable's element type.
    fn bind_loop_target(&mut self, target: &ForTarget, iter: &TypedExpr) -> InferResult<ForBinding> {
        let iter_ty = self
            .cx
            .type_of(iter.referent)
            .ok_or_else(|| CompileError::underspecified(Some(iter.loc)))?;
        let args = self.cx.generic_args_of(iter_ty);
        match target {
            ForTarget::Name(name) => {
                let [item] = args.as_slice() else {
                    return Err(CompileError::mismatch(
                        format!("`{}` is not iterable", self.cx.annotation_str(iter_ty)),
                        Some(iter.loc),
                    )
                    .into());
                };
                let item = *item;
                let instance = self.cx.instantiate(item, name, self.scope, Some(self.func), None, false);
                self.cx.scopes.add(self.scope, name.clone(), instance);
                Ok(ForBinding::Name {
                    name: name.clone(),
                    ty: item,
                })
            }
            ForTarget::Tuple(names) => {
                let generic_name = match self.cx.objects[iter_ty].as_class() {
                    Some(data) => data.generic_name.clone(),
                    None => String::new(),
                };
                if !matches!(generic_name.as_str(), "Iterable" | "list") {
                    return Err(CompileError::mismatch(
                        format!("cannot unpack from `{}`", self.cx.annotation_str(iter_ty)),
                        Some(iter.loc),
                    )
                    .into());
                }
                let [item] = args.as_slice() else {
                    return Err(CompileError::underspecified(Some(iter.loc)).into());
                };
                let item_args = self.cx.generic_args_of(*item);
                if item_args.len() != names.len() {
                    return Err(CompileError::mismatch(
                        format!("expected {} loop variables", item_args.len()),
                        Some(iter.loc),
                    )
                    .into());
                }
                let mut bindings = Vec::with_capacity(names.len());
                for (name, ty) in names.iter().zip(item_args) {
                    let instance = self.cx.instantiate(ty, name, self.scope, Some(self.func), None, false);
                    self.cx.scopes.add(self.scope, name.clone(), instance);
                    bindings.push((name.clone(), ty));
                }
                Ok(ForBinding::Tuple(bindings))
            }
        }
    }

    // --- assignment ----------------------------------------------------------

    /// Types a (possibly chained) assignment; chains expand right to left.
    fn visit_assignment(
        &mut self,
        targets: &[ExprLoc],
        value: &ExprLoc,
        annotated: Option<ObjectId>,
    ) -> InferResult<Vec<TypedNode>> {
        let typed_value = self.visit_expr(value)?;
        let value_ty = annotated.or_else(|| self.value_annotation(typed_value.referent));

        let last = targets.last().expect("assignment has a target");
        let mut out = vec![self.make_assignment(last, value_ty, typed_value)?];
        if targets.len() > 1 {
            for i in (0..targets.len() - 1).rev() {
                let chained_value = self.visit_expr(&targets[i + 1])?;
                out.push(self.make_assignment(&targets[i], value_ty, chained_value)?);
            }
        }
        Ok(out)
    }

    /// The annotation a value contributes to a fresh binding, if any.
    fn value_annotation(&self, referent: ObjectId) -> Option<ObjectId> {
        match &self.cx.objects[referent].kind {
            ObjectKind::Class(_) | ObjectKind::Union(_) => Some(referent),
            ObjectKind::Instance(data) => Some(data.class),
            ObjectKind::Function(data) => data.class,
            _ => None,
        }
    }

    fn make_assignment(
        &mut self,
        target: &ExprLoc,
        value_ty: Option<ObjectId>,
        value: TypedExpr,
    ) -> InferResult<TypedNode> {
        match &target.expr {
            Expr::Name(name) => {
                if let Some(existing) = self.cx.scopes.lookup(self.scope, name) {
                    let typed_target = TypedExpr::new(target.loc, existing, TypedExprKind::Name(name.clone()));
                    return Ok(TypedNode::Assign {
                        target: typed_target,
                        value,
                    });
                }
                let Some(value_ty) = value_ty else {
                    return Err(CompileError::underspecified(Some(target.loc)).into());
                };
                // an unspecialized generic template means an empty collection
                // literal without an annotation
                if matches!(self.cx.objects[value_ty].kind, ObjectKind::Generic(_)) {
                    return Err(CompileError::underspecified(Some(target.loc)).into());
                }
                let instance = self
                    .cx
                    .instantiate(value_ty, name, self.scope, Some(self.func), None, false);
                self.cx.scopes.add(self.scope, name.clone(), instance);
                let typed_target = TypedExpr::new(target.loc, instance, TypedExprKind::Name(name.clone()));
                Ok(TypedNode::Declare {
                    target: typed_target,
                    annotation: value_ty,
                    value,
                })
            }
            Expr::Attribute { value: parent, attr } => {
                self.assign_attribute(target, parent, attr, value_ty, value)
            }
            Expr::Subscript { value: container, index } => {
                // `c[k] = v` lowers to the container's `__setitem__`
                let container = self.visit_expr(container)?;
                let index = self.visit_expr(index)?;
                let setitem = self.cx.find(container.referent, "__setitem__").ok_or_else(|| {
                    self.name_error(
                        format!("no `__setitem__` for `{}`", self.describe(container.referent)),
                        target.loc,
                    )
                })?;
                let return_type = self.function_return_type(setitem, target.loc)?;
                Ok(TypedNode::Expr(TypedExpr::new(
                    target.loc,
                    return_type,
                    TypedExprKind::Call {
                        func: Box::new(TypedExpr::new(
                            target.loc,
                            setitem,
                            TypedExprKind::Attribute {
                                value: Box::new(container),
                                attr: "__setitem__".to_string(),
                            },
                        )),
                        args: vec![index, value],
                        keywords: vec![],
                    },
                )))
            }
            _ => Err(CompileError::unsupported("assignment target", Some(target.loc)).into()),
        }
    }

    /// Assignment to `x.a`: existing attributes are re-assigned, new
    /// attributes may only be discovered on the current receiver.
    fn assign_attribute(
        &mut self,
        target: &ExprLoc,
        parent: &ExprLoc,
        attr: &str,
        value_ty: Option<ObjectId>,
        value: TypedExpr,
    ) -> InferResult<TypedNode> {
        let value_ty = value_ty.ok_or_else(|| CompileError::underspecified(Some(target.loc)))?;
        match self.visit_expr(target) {
            Ok(typed_target) => {
                let attr_object = typed_target.referent;
                let attr_class = match self.cx.objects[attr_object].as_instance() {
                    Some(data) => data.class,
                    None => {
                        return Err(
                            CompileError::unsupported("assignment to a non-value attribute", Some(target.loc)).into(),
                        );
                    }
                };
                if attr_class != value_ty {
                    // the attribute may live on a super-instance; the child is
                    // allowed to redefine it on the current self with a new
                    // type, but redefining a same-instance slot is an error
                    let TypedExprKind::Attribute { value: typed_parent, .. } = &typed_target.kind else {
                        return Err(CompileError::unsupported("attribute target", Some(target.loc)).into());
                    };
                    let current_self = typed_parent.referent;
                    let other_self = self.cx.objects[attr_object].container;
                    if self.cx.objects[current_self].name != "self" {
                        return Err(CompileError::mismatch(
                            format!("existing type of `{attr}` does not match"),
                            Some(target.loc),
                        )
                        .into());
                    }
                    if other_self != Some(current_self) {
                        let typed_parent = (**typed_parent).clone();
                        return Ok(self.discover_attribute(target, typed_parent, attr, value_ty, value));
                    }
                    return Err(CompileError::mismatch(
                        format!("existing type of `{attr}` does not match"),
                        Some(target.loc),
                    )
                    .into());
                }
                Ok(TypedNode::Assign {
                    target: typed_target,
                    value,
                })
            }
            Err(InferError::Fatal(error)) if error.kind == ErrorKind::NameResolution => {
                self.discover_on_self(target, parent, attr, value_ty, value, InferError::Fatal(error))
            }
            Err(InferError::Pending(dep)) => {
                self.discover_on_self(target, parent, attr, value_ty, value, InferError::Pending(dep))
            }
            Err(other) => Err(other),
        }
    }

    /// A failed attribute lookup during assignment may be the discovery of a
    /// new instance attribute, but only on the current `self`.
    fn discover_on_self(
        &mut self,
        target: &ExprLoc,
        parent: &ExprLoc,
        attr: &str,
        value_ty: ObjectId,
        value: TypedExpr,
        original: InferError,
    ) -> InferResult<TypedNode> {
        let typed_parent = self.visit_expr(parent)?;
        let is_current_self = self.cx.objects[typed_parent.referent].as_instance().is_some()
            && self.cx.objects[typed_parent.referent].name == "self";
        if !is_current_self {
            return Err(original);
        }
        Ok(self.discover_attribute(target, typed_parent, attr, value_ty, value))
    }

    /// Creates the attribute slot on the receiver and returns the assignment.
    fn discover_attribute(
        &mut self,
        target: &ExprLoc,
        typed_parent: TypedExpr,
        attr: &str,
        value_ty: ObjectId,
        value: TypedExpr,
    ) -> TypedNode {
        let receiver = typed_parent.referent;
        let scope = self.cx.objects[receiver].scope;
        let instance = self.cx.instantiate(value_ty, attr, scope, Some(receiver), None, false);
        if let Some(data) = self.cx.objects[receiver].as_instance() {
            data.attrs.borrow_mut().insert(attr.to_string(), instance);
        }
        let typed_target = TypedExpr::new(
            target.loc,
            instance,
            TypedExprKind::Attribute {
                value: Box::new(typed_parent),
                attr: attr.to_string(),
            },
        );
        TypedNode::Assign {
            target: typed_target,
            value,
        }
    }

    // --- expressions ---------------------------------------------------------

    fn visit_expr(&mut self, expr: &ExprLoc) -> InferResult<TypedExpr> {
        let loc = expr.loc;
        match &expr.expr {
            Expr::Literal(literal) => {
                let type_name = match literal {
                    Literal::None => "NoneType",
                    Literal::Bool(_) => "bool",
                    Literal::Int(_) => "int",
                    Literal::Float(_) => "float",
                    Literal::Str(_) => "str",
                };
                let class = self.cx.builtin(type_name).map_err(CompileError::from)?;
                Ok(TypedExpr::new(loc, class, TypedExprKind::Literal(literal.clone())))
            }
            Expr::Name(name) => self.visit_name(name, loc),
            Expr::Attribute { value, attr } => self.visit_attribute(value, attr, loc),
            Expr::Call { func, args, keywords } => self.visit_call(func, args, keywords, loc),
            Expr::BinOp { left, op, right } => self.visit_binop(left, *op, right, loc),
            Expr::Compare { left, op, right } => self.visit_compare(left, *op, right, loc),
            Expr::Not(operand) => self.visit_not(operand, loc),
            Expr::List(items) => self.visit_list(items, loc),
            Expr::Tuple(items) => self.visit_tuple(items, loc),
            Expr::Dict(items) => self.visit_dict(items, loc),
            Expr::Subscript { value, index } => self.visit_subscript(value, index, loc),
            Expr::Starred(value) => {
                let typed = self.visit_expr(value)?;
                let ty = self
                    .cx
                    .type_of(typed.referent)
                    .ok_or_else(|| CompileError::underspecified(Some(loc)))?;
                let args = self.cx.generic_args_of(ty);
                let item = args
                    .first()
                    .copied()
                    .ok_or_else(|| CompileError::underspecified(Some(loc)))?;
                Ok(TypedExpr::new(loc, item, TypedExprKind::Starred(Box::new(typed))))
            }
            Expr::Lambda { params, body } => {
                let saved = self.scope;
                let lambda_scope = self.cx.scopes.alloc(ScopeKind::Local, Some(self.scope), false);
                let object = self.cx.builtin("object").map_err(CompileError::from)?;
                for param in params {
                    let instance = self.cx.instantiate(object, param, lambda_scope, Some(self.func), None, false);
                    self.cx.scopes.add(lambda_scope, param.clone(), instance);
                }
                self.scope = lambda_scope;
                let body = self.visit_expr(body);
                self.scope = saved;
                Ok(TypedExpr::new(
                    loc,
                    object,
                    TypedExprKind::Lambda {
                        params: params.clone(),
                        body: Box::new(body?),
                    },
                ))
            }
            Expr::FString(parts) => {
                let mut typed_parts = Vec::with_capacity(parts.len());
                for part in parts {
                    typed_parts.push(match part {
                        crate::parse::FStringPart::Literal(text) => TypedFStringPart::Literal(text.clone()),
                        crate::parse::FStringPart::Interpolation(inner) => {
                            TypedFStringPart::Interpolation(self.visit_expr(inner)?)
                        }
                    });
                }
                let str_class = self.cx.builtin("str").map_err(CompileError::from)?;
                Ok(TypedExpr::new(loc, str_class, TypedExprKind::FString(typed_parts)))
            }
            Expr::IfExp { test, body, orelse } => {
                let (test, _) = self.visit_condition(test)?;
                let body = self.visit_expr(body)?;
                let orelse = self.visit_expr(orelse)?;
                let body_ty = self
                    .cx
                    .type_of(body.referent)
                    .ok_or_else(|| CompileError::underspecified(Some(loc)))?;
                let orelse_ty = self
                    .cx
                    .type_of(orelse.referent)
                    .ok_or_else(|| CompileError::underspecified(Some(loc)))?;
                let joined = self
                    .cx
                    .union_of([body_ty, orelse_ty])
                    .ok_or_else(|| CompileError::underspecified(Some(loc)))?;
                Ok(TypedExpr::new(
                    loc,
                    joined,
                    TypedExprKind::IfExp {
                        test: Box::new(test),
                        body: Box::new(body),
                        orelse: Box::new(orelse),
                    },
                ))
            }
            Expr::ListComp { elt, target, iter } => {
                let iter = self.visit_expr(iter)?;
                let iter_ty = self
                    .cx
                    .type_of(iter.referent)
                    .ok_or_else(|| CompileError::underspecified(Some(loc)))?;
                let args = self.cx.generic_args_of(iter_ty);
                let item = args
                    .first()
                    .copied()
                    .ok_or_else(|| CompileError::underspecified(Some(loc)))?;
                let item = match &self.cx.objects[item].kind {
                    ObjectKind::Union(u) => u.members[0],
                    _ => item,
                };
                let instance = self.cx.instantiate(item, target, self.scope, Some(self.func), None, false);
                self.cx.scopes.add(self.scope, target.clone(), instance);
                let elt = self.visit_expr(elt)?;
                // the resulting element type is the element expression's type
                let elt_ty = self
                    .cx
                    .type_of(elt.referent)
                    .ok_or_else(|| CompileError::underspecified(Some(loc)))?;
                let list = self.cx.builtin("list").map_err(CompileError::from)?;
                let result = self.specialize(list, &GenericArgs::from_slice(&[elt_ty]), loc)?;
                Ok(TypedExpr::new(
                    loc,
                    result,
                    TypedExprKind::ListComp {
                        elt: Box::new(elt),
                        target: target.clone(),
                        iter: Box::new(iter),
                    },
                ))
            }
        }
    }

    fn visit_name(&mut self, name: &str, loc: CodeLoc) -> InferResult<TypedExpr> {
        let value = self
            .cx
            .scopes
            .search(self.scope, name)
            .ok_or_else(|| self.name_error(format!("`{name}` is not defined"), loc))?;
        // the receiver of a classmethod is spelled `this` in emitted TL
        let emitted = if name == "cls" && self.func_data().class == Some(value) {
            "this".to_string()
        } else {
            name.to_string()
        };
        Ok(TypedExpr::new(loc, value, TypedExprKind::Name(emitted)))
    }

    fn visit_attribute(&mut self, value: &ExprLoc, attr: &str, loc: CodeLoc) -> InferResult<TypedExpr> {
        let typed_value = self.visit_expr(value)?;
        // a narrowed binding may shadow the whole dotted path
        let full_path = value.path().map(|p| format!("{p}.{attr}"));
        let found = full_path
            .as_ref()
            .and_then(|path| self.cx.scopes.lookup(self.scope, path));
        let attr_object = match found {
            Some(found) => found,
            None => match self.cx.find(typed_value.referent, attr) {
                Some(found) => found,
                None => {
                    // attributes are discovered by the constructor; retry
                    // after it has been analyzed
                    if let Some(data) = self.cx.objects[typed_value.referent].as_instance() {
                        if let Some(init) = self.cx.find(data.class, "__init__") {
                            let analyzed = self.cx.objects[init]
                                .as_function()
                                .is_some_and(|f| f.state == AnalysisState::Analyzed);
                            // a miss inside the constructor itself can never
                            // resolve by retrying
                            if !analyzed && init != self.func {
                                return Err(InferError::Pending(init));
                            }
                        }
                    }
                    return Err(self.name_error(
                        format!("can't find `{attr}` on `{}`", self.describe(typed_value.referent)),
                        loc,
                    ));
                }
            },
        };
        Ok(TypedExpr::new(
            loc,
            attr_object,
            TypedExprKind::Attribute {
                value: Box::new(typed_value),
                attr: attr.to_string(),
            },
        ))
    }

    fn visit_call(
        &mut self,
        func: &ExprLoc,
        args: &[ExprLoc],
        keywords: &[(String, ExprLoc)],
        loc: CodeLoc,
    ) -> InferResult<TypedExpr> {
        // a subscripted generic (`Counter[list[int]](...)`) specializes first
        let typed_func = if let Expr::Subscript { value, .. } = &func.expr {
            let base = self.visit_expr(value)?;
            if matches!(self.cx.objects[base.referent].kind, ObjectKind::Generic(_)) {
                let concrete = self.visit_type_annotation(func)?;
                TypedExpr::new(
                    func.loc,
                    concrete,
                    TypedExprKind::Name(self.cx.objects[concrete].name.clone()),
                )
            } else {
                return Err(CompileError::unsupported("calling a subscript result", Some(loc)).into());
            }
        } else {
            self.visit_expr(func)?
        };

        if let Some(data) = self.cx.objects[typed_func.referent].as_function() {
            if data.state != AnalysisState::Analyzed {
                return Err(InferError::Pending(typed_func.referent));
            }
        }

        let typed_args = args
            .iter()
            .map(|a| self.visit_expr(a))
            .collect::<InferResult<Vec<_>>>()?;
        let typed_keywords = keywords
            .iter()
            .map(|(name, value)| Ok((name.clone(), self.visit_expr(value)?)))
            .collect::<InferResult<Vec<_>>>()?;

        let (referent, typed_func) = match &self.cx.objects[typed_func.referent].kind {
            ObjectKind::Function(data) => {
                let return_type = match data.return_type {
                    Some(ty) => ty,
                    None => self.cx.builtin("NoneType").map_err(CompileError::from)?,
                };
                (return_type, typed_func)
            }
            ObjectKind::Class(_) => {
                // instantiation: the constructor must be analyzed before the
                // new instance's attributes can resolve
                if let Some(init) = self.cx.find(typed_func.referent, "__init__") {
                    let analyzed = self.cx.objects[init]
                        .as_function()
                        .is_some_and(|f| f.state == AnalysisState::Analyzed);
                    if !analyzed {
                        return Err(InferError::Pending(init));
                    }
                }
                (typed_func.referent, typed_func)
            }
            ObjectKind::Generic(_) => {
                // type arguments were not passed; infer them from the
                // annotated constructor parameters
                let arg_types = typed_args
                    .iter()
                    .map(|a| {
                        self.cx
                            .type_of(a.referent)
                            .ok_or_else(|| CompileError::underspecified(Some(a.loc)).into())
                    })
                    .collect::<InferResult<Vec<_>>>()?;
                let concrete = self.specialize_from_call(typed_func.referent, &arg_types, loc)?;
                let name = self.cx.objects[concrete].name.clone();
                (concrete, TypedExpr::new(func.loc, concrete, TypedExprKind::Name(name)))
            }
            _ => {
                return Err(CompileError::unsupported(
                    format!("call of `{}`", self.describe(typed_func.referent)),
                    Some(loc),
                )
                .into());
            }
        };

        Ok(TypedExpr::new(
            loc,
            referent,
            TypedExprKind::Call {
                func: Box::new(typed_func),
                args: typed_args,
                keywords: typed_keywords,
            },
        ))
    }

    fn visit_binop(&mut self, left: &ExprLoc, op: Operator, right: &ExprLoc, loc: CodeLoc) -> InferResult<TypedExpr> {
        let left = self.visit_expr(left)?;
        let right = self.visit_expr(right)?;
        let (left_method, right_method) = binop_methods(op, loc)?;

        let left_recv = self.dispatch_receiver(left.referent, loc)?;
        let right_recv = self.dispatch_receiver(right.referent, loc)?;

        let mut chosen = None;
        if let Some(func) = self.cx.find(left_recv, left_method) {
            if self.param_accepts(func, right_recv, loc)? {
                chosen = Some((func, left.clone(), right.clone()));
            }
        }
        let (func, recv, arg) = match chosen {
            Some(chosen) => chosen,
            None => {
                // the declared operand type rejected the right side, the
                // equivalent of the operator returning NotImplemented
                let func = self.cx.find(right_recv, right_method).ok_or_else(|| {
                    self.name_error(
                        format!("no `{left_method}` / `{right_method}` for `{}`", self.describe(left.referent)),
                        loc,
                    )
                })?;
                (func, right, left)
            }
        };
        self.method_call(func, recv, vec![arg], loc)
    }

    fn visit_compare(
        &mut self,
        left: &ExprLoc,
        op: CmpOperator,
        right: &ExprLoc,
        loc: CodeLoc,
    ) -> InferResult<TypedExpr> {
        let mut left = self.visit_expr(left)?;
        let mut right = self.visit_expr(right)?;
        let is_containment = matches!(op, CmpOperator::In | CmpOperator::NotIn);
        if is_containment {
            // the container dispatches containment
            std::mem::swap(&mut left, &mut right);
        }
        let (left_method, right_method) = compare_methods(op);

        let left_recv = self.dispatch_receiver(left.referent, loc)?;
        let right_recv = self.dispatch_receiver(right.referent, loc)?;

        let mut chosen = None;
        if let Some(func) = self.cx.find(left_recv, left_method) {
            let owner_is_object = self.function_owner_name(func) == Some("object".to_string());
            // equality on the plain object root checks the right side first
            if !owner_is_object && self.param_accepts(func, right_recv, loc)? {
                chosen = Some((func, left.clone(), right.clone()));
            }
        }
        let (func, recv, arg) = match chosen {
            Some(chosen) => chosen,
            None => {
                let Some(right_method) = right_method else {
                    return Err(self.name_error(
                        format!("no `{left_method}` on `{}`", self.describe(left.referent)),
                        loc,
                    ));
                };
                let func = self.cx.find(right_recv, right_method).ok_or_else(|| {
                    self.name_error(
                        format!("no `{left_method}` / `{right_method}` for this comparison"),
                        loc,
                    )
                })?;
                if self.function_owner_name(func) == Some("object".to_string()) {
                    // both sides fell through to the shared root; keep the
                    // original operand order
                    (func, left, right)
                } else {
                    (func, right, left)
                }
            }
        };
        let call = self.method_call(func, recv, vec![arg], loc)?;
        if op == CmpOperator::NotIn {
            let referent = call.referent;
            return Ok(TypedExpr::new(loc, referent, TypedExprKind::Not(Box::new(call))));
        }
        Ok(call)
    }

    fn visit_not(&mut self, operand: &ExprLoc, loc: CodeLoc) -> InferResult<TypedExpr> {
        let typed = self.visit_expr(operand)?;
        let ty = self
            .cx
            .type_of(typed.referent)
            .ok_or_else(|| CompileError::underspecified(Some(loc)))?;
        let bool_typed = if self.cx.objects[ty].name == "bool" {
            typed
        } else {
            self.coerce_bool(typed)?
        };
        let referent = bool_typed.referent;
        Ok(TypedExpr::new(loc, referent, TypedExprKind::Not(Box::new(bool_typed))))
    }

    fn visit_list(&mut self, items: &[ExprLoc], loc: CodeLoc) -> InferResult<TypedExpr> {
        let mut typed_items = Vec::with_capacity(items.len());
        let mut element_types = Vec::new();
        for item in items {
            let typed = self.visit_expr(item)?;
            if let Some(ty) = self.cx.type_of(typed.referent) {
                element_types.push(ty);
            }
            typed_items.push(typed);
        }
        let list = self.cx.builtin("list").map_err(CompileError::from)?;
        let referent = match self.cx.union_of(element_types) {
            // an empty literal keeps the template as its referent; binding it
            // without an annotation is an underspecification error
            None => list,
            Some(element) => self.specialize(list, &GenericArgs::from_slice(&[element]), loc)?,
        };
        Ok(TypedExpr::new(loc, referent, TypedExprKind::List(typed_items)))
    }

    fn visit_tuple(&mut self, items: &[ExprLoc], loc: CodeLoc) -> InferResult<TypedExpr> {
        let mut typed_items = Vec::with_capacity(items.len());
        let mut types = GenericArgs::new();
        for item in items {
            let typed = self.visit_expr(item)?;
            types.push(
                self.cx
                    .type_of(typed.referent)
                    .ok_or_else(|| CompileError::underspecified(Some(typed.loc)))?,
            );
            typed_items.push(typed);
        }
        let tuple = self.cx.builtin("tuple").map_err(CompileError::from)?;
        let referent = self.specialize(tuple, &types, loc)?;
        Ok(TypedExpr::new(loc, referent, TypedExprKind::Tuple(typed_items)))
    }

    fn visit_dict(&mut self, items: &[(ExprLoc, ExprLoc)], loc: CodeLoc) -> InferResult<TypedExpr> {
        let mut typed_items = Vec::with_capacity(items.len());
        let mut key_types = Vec::new();
        let mut value_types = Vec::new();
        for (key, value) in items {
            let key = self.visit_expr(key)?;
            let value = self.visit_expr(value)?;
            if let Some(ty) = self.cx.type_of(key.referent) {
                key_types.push(ty);
            }
            if let Some(ty) = self.cx.type_of(value.referent) {
                value_types.push(ty);
            }
            typed_items.push((key, value));
        }
        let dict = self.cx.builtin("dict").map_err(CompileError::from)?;
        let key_union = self.cx.union_of(key_types);
        let value_union = self.cx.union_of(value_types);
        let referent = match (key_union, value_union) {
            (Some(key), Some(value)) => self.specialize(dict, &GenericArgs::from_slice(&[key, value]), loc)?,
            _ => dict,
        };
        Ok(TypedExpr::new(loc, referent, TypedExprKind::Dict(typed_items)))
    }

    fn visit_subscript(&mut self, value: &ExprLoc, index: &ExprLoc, loc: CodeLoc) -> InferResult<TypedExpr> {
        let typed_value = self.visit_expr(value)?;
        let typed_index = self.visit_expr(index)?;
        let getitem = self.cx.find(typed_value.referent, "__getitem__").ok_or_else(|| {
            self.name_error(
                format!("no `__getitem__` for `{}`", self.describe(typed_value.referent)),
                loc,
            )
        })?;
        let referent = self.function_return_type(getitem, loc)?;
        Ok(TypedExpr::new(
            loc,
            referent,
            TypedExprKind::Subscript {
                value: Box::new(typed_value),
                index: Box::new(typed_index),
            },
        ))
    }

    // --- operator dispatch helpers -------------------------------------------

    /// The instance operator lookup starts from: the referent itself when it
    /// already is a typed value slot, otherwise its class's self-instance.
    fn dispatch_receiver(&self, referent: ObjectId, loc: CodeLoc) -> InferResult<ObjectId> {
        match &self.cx.objects[referent].kind {
            ObjectKind::Instance(_) => Ok(referent),
            ObjectKind::Class(data) => Ok(data.self_instance),
            _ => Err(CompileError::unsupported(
                format!("operator on `{}`", self.describe(referent)),
                Some(loc),
            )
            .into()),
        }
    }

    /// Whether an operator method's declared parameter type accepts the right
    /// operand's class.
    fn param_accepts(&self, func: ObjectId, right_recv: ObjectId, loc: CodeLoc) -> InferResult<bool> {
        let data = self.cx.objects[func]
            .as_function()
            .ok_or_else(|| CompileError::mismatch("operator attribute is not a function", Some(loc)))?;
        // the declared parameter types only exist once the method analyzed
        if data.state != AnalysisState::Analyzed {
            return Err(InferError::Pending(func));
        }
        let Some(param) = data.params.first() else {
            return Ok(false);
        };
        let right_class = self.cx.objects[right_recv]
            .as_instance()
            .map(|i| i.class)
            .unwrap_or(right_recv);
        if param.ty == right_class {
            return Ok(true);
        }
        if let ObjectKind::Union(union) = &self.cx.objects[param.ty].kind {
            return Ok(union.members.contains(&right_class));
        }
        Ok(false)
    }

    /// The class a found method is defined on.
    fn function_owner_name(&self, func: ObjectId) -> Option<String> {
        let class = self.cx.objects[func].as_function()?.class?;
        Some(self.cx.objects[class].name.clone())
    }

    fn function_return_type(&mut self, func: ObjectId, loc: CodeLoc) -> InferResult<ObjectId> {
        let data = self.cx.objects[func]
            .as_function()
            .ok_or_else(|| CompileError::mismatch("expected a function", Some(loc)))?;
        if data.state != AnalysisState::Analyzed {
            return Err(InferError::Pending(func));
        }
        match data.return_type {
            Some(ty) => Ok(ty),
            None => Ok(self.cx.builtin("NoneType").map_err(CompileError::from)?),
        }
    }

    /// Builds the `recv.method(args)` node operator dispatch lowers to.
    fn method_call(
        &mut self,
        func: ObjectId,
        recv: TypedExpr,
        args: Vec<TypedExpr>,
        loc: CodeLoc,
    ) -> InferResult<TypedExpr> {
        let name = self.cx.objects[func].name.clone();
        let referent = self.function_return_type(func, loc)?;
        Ok(TypedExpr::new(
            loc,
            referent,
            TypedExprKind::Call {
                func: Box::new(TypedExpr::new(
                    loc,
                    func,
                    TypedExprKind::Attribute {
                        value: Box::new(recv),
                        attr: name,
                    },
                )),
                args,
                keywords: vec![],
            },
        ))
    }

    // --- annotations and specialization --------------------------------------

    /// Resolves a type annotation expression to a class or union.
    fn visit_type_annotation(&mut self, annotation: &ExprLoc) -> InferResult<ObjectId> {
        match &annotation.expr {
            Expr::Name(_) => {
                let typed = self.visit_expr(annotation)?;
                Ok(typed.referent)
            }
            Expr::Subscript { value, index } => {
                let base = self.visit_expr(value)?;
                if !matches!(self.cx.objects[base.referent].kind, ObjectKind::Generic(_)) {
                    return Err(CompileError::mismatch(
                        format!("`{}` is not a generic class", self.describe(base.referent)),
                        Some(annotation.loc),
                    )
                    .into());
                }
                let mut items = GenericArgs::new();
                match &index.expr {
                    Expr::Tuple(elts) => {
                        for elt in elts {
                            items.push(self.visit_type_annotation(elt)?);
                        }
                    }
                    Expr::Name(_) | Expr::BinOp { .. } | Expr::Subscript { .. } => {
                        items.push(self.visit_type_annotation(index)?);
                    }
                    _ => {
                        return Err(CompileError::unsupported("type argument expression", Some(index.loc)).into());
                    }
                }
                self.specialize(base.referent, &items, annotation.loc)
            }
            Expr::BinOp {
                left,
                op: Operator::BitOr,
                right,
            } => {
                let left = self.visit_type_annotation(left)?;
                let right = self.visit_type_annotation(right)?;
                self.cx
                    .union_of([left, right])
                    .ok_or_else(|| CompileError::underspecified(Some(annotation.loc)).into())
            }
            _ => Err(CompileError::unsupported("type annotation expression", Some(annotation.loc)).into()),
        }
    }

    /// Specializes a generic template, building (and caching) the concrete
    /// class on first use. A fresh specialization raises the dependency
    /// signal so the caller re-enters after the new class analyzes.
    fn specialize(&mut self, generic: ObjectId, args: &GenericArgs, loc: CodeLoc) -> InferResult<ObjectId> {
        let (def_id, params, container) = {
            let object = &self.cx.objects[generic];
            let ObjectKind::Generic(data) = &object.kind else {
                return Err(CompileError::mismatch(
                    format!("`{}` is not a generic class", object.name),
                    Some(loc),
                )
                .into());
            };
            let params: Vec<String> = if object.name == "tuple" {
                (1..=args.len()).map(|i| format!("T{i}")).collect()
            } else {
                data.params.clone()
            };
            (data.def, params, object.container)
        };
        if params.len() != args.len() {
            return Err(CompileError::mismatch(
                format!(
                    "`{}` takes {} type argument(s), got {}",
                    self.cx.objects[generic].name,
                    params.len(),
                    args.len()
                ),
                Some(loc),
            )
            .into());
        }

        let concrete_name = format!(
            "{}__{}",
            self.cx.objects[generic].name,
            args.iter()
                .map(|a| self.cx.structural_name(*a))
                .collect::<Vec<_>>()
                .join("_")
        );
        if let ObjectKind::Generic(data) = &self.cx.objects[generic].kind {
            if let Some(cached) = data.cache.get(&concrete_name) {
                return Ok(*cached);
            }
        }

        let assigned: IndexMap<String, ObjectId> = params.into_iter().zip(args.iter().copied()).collect();
        let module = container.ok_or_else(|| CompileError::mismatch("generic class without a module", Some(loc)))?;
        let concrete = self
            .cx
            .build_class(def_id, module, Some(assigned), Some(concrete_name.clone()))
            .map_err(InferError::Fatal)?;
        if let ObjectKind::Generic(data) = &mut self.cx.objects[generic].kind {
            data.cache.insert(concrete_name, concrete);
        }
        builtins::patch_specialization(self.cx, concrete);
        Err(InferError::Pending(concrete))
    }

    /// Infers a generic's type arguments from constructor argument types,
    /// matching call arguments against annotated `__init__` parameters.
    fn specialize_from_call(&mut self, generic: ObjectId, arg_types: &[ObjectId], loc: CodeLoc) -> InferResult<ObjectId> {
        let (def_id, params) = {
            let ObjectKind::Generic(data) = &self.cx.objects[generic].kind else {
                return Err(CompileError::mismatch("not a generic class", Some(loc)).into());
            };
            (data.def, data.params.clone())
        };
        let init = find_raw_init(self.cx, def_id)
            .ok_or_else(|| CompileError::underspecified(Some(loc)))?;
        let mut by_param: IndexMap<String, ObjectId> = IndexMap::new();
        for (arg_ty, param) in arg_types.iter().zip(init.iter().skip(1)) {
            if let Some(annotation) = &param.annotation {
                if let Expr::Name(type_param) = &annotation.expr {
                    by_param.insert(type_param.clone(), *arg_ty);
                }
            }
        }
        let mut resolved = GenericArgs::new();
        for param in &params {
            let Some(ty) = by_param.get(param) else {
                return Err(CompileError::underspecified(Some(loc)).into());
            };
            resolved.push(*ty);
        }
        self.specialize(generic, &resolved, loc)
    }

    fn describe(&self, object: ObjectId) -> String {
        let o = &self.cx.objects[object];
        match &o.kind {
            ObjectKind::Instance(data) => self.cx.annotation_str(data.class),
            _ => o.name.clone(),
        }
    }
}

/// The `__init__` parameter list of a raw class definition.
fn find_raw_init(cx: &Context, def: ClassDefId) -> Option<Vec<RawParam>> {
    for node in &cx.class_def(def).body {
        if let Node::FunctionDef(func) = node {
            if func.name == "__init__" {
                return Some(func.params.clone());
            }
        }
    }
    None
}

/// Builds the dotted path of a typed name/attribute chain.
fn typed_path(expr: &TypedExpr) -> Option<String> {
    match &expr.kind {
        TypedExprKind::Name(name) => Some(name.clone()),
        TypedExprKind::Attribute { value, attr } => Some(format!("{}.{attr}", typed_path(value)?)),
        _ => None,
    }
}

/// Where a typed parameter is recorded on its function.
#[derive(Debug, Clone, Copy)]
enum ParamSlot {
    Positional,
    VarArg,
    KwArg,
}
