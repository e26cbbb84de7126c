#![doc = include_str!("../../../README.md")]

mod analyze;
mod builtins;
mod bundle;
mod css;
mod emit;
mod error;
mod hooks;
mod html;
mod objects;
mod parse;
mod reach;
mod translate;
mod typed;
mod unparse;
mod writer;

pub use crate::{
    bundle::Bundle,
    css::StyleProcessor,
    emit::BundleMode,
    error::{CodeLoc, CompileError, CompileResult, ErrorKind},
    html::{ElementNode, HtmlChild, page, render},
    translate::{Analysis, DirLoader, EntryPoint, MemLoader, ModuleLoader, Translator},
};

// The lower pipeline layers are exposed for the test suite and for embedding
// hosts that need to inspect the annotated tree.
pub use crate::{
    objects::{Context, ObjectId},
    parse::{Directives, parse_isolated_method, parse_source},
    unparse::write_types,
    writer::SourceWriter,
};
