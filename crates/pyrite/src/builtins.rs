//! The builtins registry.
//!
//! The registry is an SL module embedded in the binary and ingested through
//! the exact pipeline user modules take; afterwards a fixed set of its
//! functions gets native call-site rules that can inspect argument types and
//! return the not-applicable sentinel (the reflected-operand fallback).
//!
//! The registry is sealed once loaded: analysis only ever adds concrete
//! specializations of the generic builtins (`list[int]`, `dict[str, str]`).

use crate::{
    error::{CompileError, CompileResult},
    hooks::{NativeRule, Rewriter},
    objects::{Context, ObjectId, ObjectKind},
};

/// The builtins module source, ingested at context construction.
pub const SOURCE: &str = include_str!("builtins.py");

/// The module name the builtins register under.
pub const MODULE_NAME: &str = "builtins";

/// Native rules for int-style numeric operator methods, shared by `int` and
/// `float`.
const NUMERIC_OPS: &[(&str, NativeRule)] = &[
    ("__lt__", NativeRule::IntOp { op: "<", reflected: false, wrap: None }),
    ("__le__", NativeRule::IntOp { op: "<=", reflected: false, wrap: None }),
    ("__gt__", NativeRule::IntOp { op: ">", reflected: false, wrap: None }),
    ("__ge__", NativeRule::IntOp { op: ">=", reflected: false, wrap: None }),
    ("__eq__", NativeRule::IntOp { op: "==", reflected: false, wrap: None }),
    ("__ne__", NativeRule::IntOp { op: "!=", reflected: false, wrap: None }),
    ("__add__", NativeRule::IntOp { op: "+", reflected: false, wrap: None }),
    ("__radd__", NativeRule::IntOp { op: "+", reflected: true, wrap: None }),
    ("__sub__", NativeRule::IntOp { op: "-", reflected: false, wrap: None }),
    ("__rsub__", NativeRule::IntOp { op: "-", reflected: true, wrap: None }),
    ("__mul__", NativeRule::IntOp { op: "*", reflected: false, wrap: None }),
    ("__rmul__", NativeRule::IntOp { op: "*", reflected: true, wrap: None }),
    ("__truediv__", NativeRule::IntOp { op: "/", reflected: false, wrap: None }),
    ("__rtruediv__", NativeRule::IntOp { op: "/", reflected: true, wrap: None }),
    ("__floordiv__", NativeRule::IntOp { op: "/", reflected: false, wrap: Some("Math.floor") }),
    ("__rfloordiv__", NativeRule::IntOp { op: "/", reflected: true, wrap: Some("Math.floor") }),
    ("__mod__", NativeRule::IntOp { op: "**", reflected: false, wrap: None }),
    ("__rmod__", NativeRule::IntOp { op: "**", reflected: true, wrap: None }),
];

/// Installs the native call-site rules the embedded source cannot express.
pub fn patch_native_hooks(cx: &mut Context) -> CompileResult<()> {
    for &(method, rule) in NUMERIC_OPS {
        patch_method(cx, "int", method, rule)?;
    }
    for &(method, rule) in NUMERIC_OPS {
        // floats have no floor division and no `**` pair
        if matches!(method, "__floordiv__" | "__rfloordiv__" | "__mod__" | "__rmod__") {
            continue;
        }
        patch_method(cx, "float", method, rule)?;
    }
    patch_method(cx, "int", "__init__", NativeRule::IntInit)?;
    patch_method(cx, "str", "__init__", NativeRule::StrInit)?;
    patch_function(cx, "len", NativeRule::Len)?;
    patch_function(cx, "isinstance", NativeRule::IsInstance)?;
    patch_function(cx, "print", NativeRule::Print)?;
    Ok(())
}

fn patch_method(cx: &mut Context, class: &str, method: &str, rule: NativeRule) -> CompileResult<()> {
    let class_id = cx.builtin(class)?;
    let function = find_member(cx, class_id, method)
        .ok_or_else(|| CompileError::name(format!("builtin method `{class}.{method}` not found"), None))?;
    set_hook(cx, function, rule);
    Ok(())
}

fn patch_function(cx: &mut Context, name: &str, rule: NativeRule) -> CompileResult<()> {
    let function = cx.builtin(name)?;
    set_hook(cx, function, rule);
    Ok(())
}

/// Finds a directly declared member of a concrete class.
///
/// Generic templates have no member objects of their own; their rules are
/// installed per specialization via `patch_specialization`.
fn find_member(cx: &Context, class: ObjectId, method: &str) -> Option<ObjectId> {
    match &cx.objects[class].kind {
        ObjectKind::Class(_) => cx.class_find_attr(class, method, false),
        _ => None,
    }
}

fn set_hook(cx: &mut Context, function: ObjectId, rule: NativeRule) {
    if let ObjectKind::Function(data) = &mut cx.objects[function].kind {
        data.hook = Some(Rewriter::Native(rule));
    }
}

/// Native rules for members of generic builtins, applied to every freshly
/// built specialization (the template itself has no member objects).
pub fn patch_specialization(cx: &mut Context, class: ObjectId) {
    let (generic_name, is_builtin) = {
        let object = &cx.objects[class];
        let Some(data) = object.as_class() else { return };
        (data.generic_name.clone(), object.directives.builtin)
    };
    if !is_builtin {
        return;
    }
    if generic_name == "list" {
        if let Some(function) = cx.class_find_attr(class, "__add__", false) {
            set_hook(cx, function, NativeRule::ListConcat);
        }
    }
}
