//! Bundling of emitted modules.
//!
//! Loader mode combines every module into one loadable script: a tiny
//! name-keyed synchronous module registry is prepended, each module body is
//! wrapped in a registration call, and the entry module is imported (and its
//! entry point invoked when force-included). Module mode leaves the emitted
//! files as-is, relying on native import/export syntax.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::{emit::BundleMode, objects::{Context, ObjectId}};

/// The minimal runtime module loader prepended in loader mode.
const REGISTRY_RUNTIME: &str = "\
const modules = new Map();
const define = (name, moduleFactory) => {
  modules.set(name, moduleFactory);
};
const moduleCache = new Map();
const importModule = (name) => {
  if (moduleCache.has(name)) {
    return moduleCache.get(name).exports;
  }
  if (!modules.has(name)) {
    throw new Error(`Module '${name}' does not exist.`);
  }
  const moduleFactory = modules.get(name);
  const module = {exports: {}};
  moduleCache.set(name, module);
  moduleFactory(module.exports, importModule);
  return module.exports;
};
";

/// The combined output of one translation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Bundle {
    /// Module name -> emitted TL source text.
    pub modules: IndexMap<String, String>,
    /// The entry point's accumulated style-class set, sorted.
    pub styles: BTreeSet<String>,
    /// The module containing the entry point.
    pub entry_module: String,
    /// The single loadable artifact (loader mode only).
    pub script: Option<String>,
}

/// Combines emitted modules according to the bundle mode.
pub fn bundle(
    cx: &Context,
    modules: IndexMap<String, String>,
    styles: BTreeSet<String>,
    entry: ObjectId,
    mode: BundleMode,
) -> Bundle {
    let entry_module = entry_module_name(cx, entry);
    let script = match mode {
        BundleMode::EsModules => None,
        BundleMode::Loader => {
            let mut out = String::from(REGISTRY_RUNTIME);
            for (name, source) in &modules {
                if source.trim().is_empty() {
                    continue;
                }
                out.push_str(&format!("define('{name}', function (__export_js__, __import_js__) {{\n"));
                out.push_str(source);
                out.push_str("\n});\n");
            }
            out.push_str(&format!("importModule('{entry_module}')"));
            if cx.objects[entry].directives.include {
                out.push_str(&format!(".{}()", cx.objects[entry].name));
            }
            out.push_str(";\n");
            Some(out)
        }
    };
    Bundle {
        modules,
        styles,
        entry_module,
        script,
    }
}

fn entry_module_name(cx: &Context, entry: ObjectId) -> String {
    let mut current = cx.objects[entry].container;
    while let Some(id) = current {
        if matches!(cx.objects[id].kind, crate::objects::ObjectKind::Module(_)) {
            return cx.objects[id].name.clone();
        }
        current = cx.objects[id].container;
    }
    String::new()
}
