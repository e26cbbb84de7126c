//! Reachability pruning.
//!
//! Starting from a declared entry point, transitively marks every class,
//! function and instance the entry point references. Pruning never mutates
//! bodies; it only populates per-object visit sets, which the emitter then
//! consults. The `tw("...")` style marker contributes its tokens to the entry
//! point's style-class set along the way.

use std::collections::BTreeSet;

use crate::{
    objects::{Context, ObjectId, ObjectKind},
    parse::Literal,
    typed::{TypedExpr, TypedExprKind, TypedFStringPart, TypedNode},
};

/// Marks everything reachable from `entry` and returns the collected
/// style-class set.
///
/// The entry point's own visit set is cleared afterwards so subsequent entry
/// points start fresh.
pub fn prune(cx: &mut Context, entry: ObjectId) -> BTreeSet<String> {
    let mut pruner = Pruner {
        cx,
        entry,
        styles: BTreeSet::new(),
    };
    pruner.enter_function(entry);
    pruner.cx.objects[entry].visited.clear();
    pruner.styles
}

struct Pruner<'cx> {
    cx: &'cx mut Context,
    entry: ObjectId,
    styles: BTreeSet<String>,
}

impl Pruner<'_> {
    fn enter_function(&mut self, func: ObjectId) {
        let class = match self.cx.objects[func].as_function() {
            Some(data) => data.class,
            None => return,
        };
        if let Some(class) = class {
            self.enter_class(class);
        }
        if self.cx.objects[func].visited.contains(&self.entry) {
            return;
        }
        self.cx.objects[func].visited.insert(self.entry);
        // full-body rewriters have no analyzed body to walk
        let body = match self.cx.objects[func].as_function() {
            Some(data) if data.source_text.is_none() => data.body.clone(),
            _ => Vec::new(),
        };
        for node in &body {
            self.visit_node(node);
        }
    }

    /// Entering a class marks it and pulls in every force-included member
    /// along the base chain (including overrides of force-included members).
    fn enter_class(&mut self, class: ObjectId) {
        let mut current = Some(class);
        while let Some(id) = current {
            if !self.cx.objects[id].visited.contains(&self.entry) {
                self.cx.objects[id].visited.insert(self.entry);
                let members: Vec<ObjectId> = match self.cx.objects[id].as_class() {
                    Some(data) => self.cx.scopes[data.internal_scope].names.values().copied().collect(),
                    None => Vec::new(),
                };
                for member in members {
                    if self.cx.objects[member].is_function()
                        && (self.cx.objects[member].directives.include || self.override_has_include(member))
                    {
                        self.enter_function(member);
                    }
                }
            }
            current = self.cx.base_of(id);
        }
    }

    /// Whether a base class declares a force-included member of the same name.
    fn override_has_include(&self, member: ObjectId) -> bool {
        let Some(class) = self.cx.objects[member].as_function().and_then(|f| f.class) else {
            return false;
        };
        let name = self.cx.objects[member].name.clone();
        let mut parent = self.cx.base_of(class);
        while let Some(base) = parent {
            if let Some(inherited) = self.cx.class_find_attr(base, &name, false) {
                if self.cx.objects[inherited].directives.include {
                    return true;
                }
            }
            parent = self.cx.base_of(base);
        }
        false
    }

    fn visit_node(&mut self, node: &TypedNode) {
        match node {
            TypedNode::Pass | TypedNode::Break | TypedNode::Continue | TypedNode::Raise { .. } => {}
            TypedNode::Expr(expr) | TypedNode::Assert { test: expr } => self.visit_expr(expr),
            TypedNode::Assign { target, value } | TypedNode::Declare { target, value, .. } => {
                self.visit_expr(target);
                self.visit_expr(value);
            }
            TypedNode::Return { value } => {
                if let Some(value) = value {
                    self.visit_expr(value);
                }
            }
            TypedNode::If { test, body, or_else } => {
                self.visit_expr(test);
                for node in body.iter().chain(or_else) {
                    self.visit_node(node);
                }
            }
            TypedNode::While { test, body } => {
                self.visit_expr(test);
                for node in body {
                    self.visit_node(node);
                }
            }
            TypedNode::For { iter, body, .. } => {
                self.visit_expr(iter);
                for node in body {
                    self.visit_node(node);
                }
            }
        }
    }

    fn visit_expr(&mut self, expr: &TypedExpr) {
        match &expr.kind {
            TypedExprKind::Literal(_) => {}
            TypedExprKind::Name(name) => self.visit_name(name, expr.referent),
            TypedExprKind::Attribute { value, .. } => {
                match &self.cx.objects[expr.referent].kind {
                    ObjectKind::Function(_) => self.enter_function(expr.referent),
                    ObjectKind::Instance(_) => {
                        self.cx.objects[expr.referent].visited.insert(self.entry);
                    }
                    _ => {}
                }
                self.visit_expr(value);
            }
            TypedExprKind::Call { func, args, keywords } => {
                self.collect_styles(func, args);
                self.visit_callee(func);
                self.visit_expr(func);
                for arg in args {
                    self.visit_expr(arg);
                }
                for (_, value) in keywords {
                    self.visit_expr(value);
                }
            }
            TypedExprKind::Not(inner) | TypedExprKind::Starred(inner) => self.visit_expr(inner),
            TypedExprKind::List(items) | TypedExprKind::Tuple(items) => {
                for item in items {
                    self.visit_expr(item);
                }
            }
            TypedExprKind::Dict(items) => {
                for (key, value) in items {
                    self.visit_expr(key);
                    self.visit_expr(value);
                }
            }
            TypedExprKind::Subscript { value, index } => {
                self.visit_expr(value);
                self.visit_expr(index);
            }
            TypedExprKind::Lambda { body, .. } => self.visit_expr(body),
            TypedExprKind::FString(parts) => {
                for part in parts {
                    if let TypedFStringPart::Interpolation(inner) = part {
                        self.visit_expr(inner);
                    }
                }
            }
            TypedExprKind::IfExp { test, body, orelse } => {
                self.visit_expr(test);
                self.visit_expr(body);
                self.visit_expr(orelse);
            }
            TypedExprKind::ListComp { elt, iter, .. } => {
                self.visit_expr(elt);
                self.visit_expr(iter);
            }
        }
    }

    fn visit_callee(&mut self, func: &TypedExpr) {
        match &self.cx.objects[func.referent].kind {
            ObjectKind::Function(_) => self.enter_function(func.referent),
            ObjectKind::Class(_) => {
                self.enter_class(func.referent);
                if let Some(init) = self.cx.find(func.referent, "__init__") {
                    self.enter_function(init);
                }
            }
            _ => {}
        }
    }

    fn visit_name(&mut self, _name: &str, referent: ObjectId) {
        match &self.cx.objects[referent].kind {
            ObjectKind::Class(_) => {
                self.enter_class(referent);
                if let Some(init) = self.cx.find(referent, "__init__") {
                    self.enter_function(init);
                }
            }
            ObjectKind::Function(_) => self.enter_function(referent),
            ObjectKind::Union(data) => {
                for member in data.members.clone() {
                    self.enter_class(member);
                    if let Some(init) = self.cx.find(member, "__init__") {
                        self.enter_function(init);
                    }
                }
            }
            _ => {
                self.cx.objects[referent].visited.insert(self.entry);
            }
        }
    }

    /// `tw("a b c")` contributes its space-separated tokens to the entry
    /// point's style-class set.
    fn collect_styles(&mut self, func: &TypedExpr, args: &[TypedExpr]) {
        let TypedExprKind::Name(name) = &func.kind else { return };
        if name != "tw" {
            return;
        }
        if let Some(TypedExpr {
            kind: TypedExprKind::Literal(Literal::Str(classes)),
            ..
        }) = args.first()
        {
            for token in classes.split_whitespace() {
                self.styles.insert(token.to_string());
            }
        }
    }
}
