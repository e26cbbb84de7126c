//! The translation pipeline.
//!
//! A `Translator` owns all state of one invocation: the object and scope
//! arenas, the module cache and the builtins registry. Re-invocations (e.g.
//! from a dev server watching files) construct a fresh translator so no
//! stale state survives between runs.

use std::{collections::BTreeSet, path::PathBuf};

use indexmap::IndexMap;

use crate::{
    analyze, builtins,
    bundle::{Bundle, bundle},
    emit::{BundleMode, emit_module},
    error::{CompileError, CompileResult},
    objects::{Context, ObjectId, ObjectKind, StaticValue},
    parse::{Expr, ExprLoc, Node, parse_source},
    reach::prune,
};

/// Provides SL module sources by dotted module name.
pub trait ModuleLoader {
    fn load(&self, module: &str) -> Option<String>;
}

/// Loads modules from one or more filesystem roots (`a.b` -> `a/b.py`).
#[derive(Debug, Clone, Default)]
pub struct DirLoader {
    roots: Vec<PathBuf>,
}

impl DirLoader {
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
        }
    }
}

impl ModuleLoader for DirLoader {
    fn load(&self, module: &str) -> Option<String> {
        let relative: PathBuf = module.split('.').collect();
        for root in &self.roots {
            let path = root.join(&relative).with_extension("py");
            if let Ok(source) = std::fs::read_to_string(&path) {
                return Some(source);
            }
        }
        None
    }
}

/// In-memory module sources, used by tests and embedding hosts.
#[derive(Debug, Clone, Default)]
pub struct MemLoader {
    modules: IndexMap<String, String>,
}

impl MemLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.modules.insert(name.into(), source.into());
        self
    }
}

impl ModuleLoader for MemLoader {
    fn load(&self, module: &str) -> Option<String> {
        self.modules.get(module).cloned()
    }
}

/// The input seed: where translation starts.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EntryPoint {
    /// Dotted module name, discoverable through the configured loader.
    pub module: String,
    /// Entry symbol inside the module.
    pub entry: String,
    /// Positional arguments for server-side invocation of the entry point;
    /// the core carries them through for external collaborators.
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}

impl EntryPoint {
    /// Parses the `module[:entry]` CLI form; the entry defaults to `main`.
    pub fn parse(spec: &str) -> Self {
        let (module, entry) = match spec.split_once(':') {
            Some((module, entry)) => (module, entry),
            None => (spec, "main"),
        };
        Self {
            module: module.to_string(),
            entry: entry.to_string(),
            args: Vec::new(),
        }
    }
}

/// The annotated object model after pruning, ready for emission.
#[derive(Debug)]
pub struct Analysis {
    cx: Context,
    /// The resolved entry-point function.
    pub entry: ObjectId,
    user_modules: Vec<ObjectId>,
    /// The entry point's style-class set, sorted.
    pub styles: BTreeSet<String>,
}

impl Analysis {
    pub fn context(&self) -> &Context {
        &self.cx
    }

    /// The materialized module object for a module name, if any.
    pub fn module(&self, name: &str) -> Option<ObjectId> {
        self.cx.package.get(name).copied()
    }

    /// Serializes a module's annotated tree back to SL-style text.
    pub fn write_types(&self, name: &str) -> Option<String> {
        Some(crate::unparse::write_types(&self.cx, self.module(name)?))
    }

    /// Emits a single module as TL text.
    pub fn emit(&self, name: &str, mode: BundleMode) -> CompileResult<String> {
        let module = self
            .module(name)
            .ok_or_else(|| CompileError::name(format!("module `{name}` not materialized"), None))?;
        emit_module(&self.cx, module, mode)
    }

    /// Emits every user module and combines them per the bundle mode.
    pub fn into_bundle(self, mode: BundleMode) -> CompileResult<Bundle> {
        let mut emitted = IndexMap::new();
        for m in &self.user_modules {
            let name = self.cx.objects[*m].name.clone();
            emitted.insert(name, emit_module(&self.cx, *m, mode)?);
        }
        Ok(bundle(&self.cx, emitted, self.styles.clone(), self.entry, mode))
    }
}

/// One translation run: builtins registry plus module cache plus arenas.
pub struct Translator {
    cx: Context,
    loader: Box<dyn ModuleLoader>,
}

impl Translator {
    /// Constructs a fresh context and loads the builtins registry through the
    /// normal ingest/analyze pipeline.
    pub fn new(loader: impl ModuleLoader + 'static) -> CompileResult<Self> {
        let mut translator = Self {
            cx: Context::new(),
            loader: Box::new(loader),
        };
        let nodes = parse_source(builtins::SOURCE)?;
        let module = translator.build_module(builtins::MODULE_NAME, nodes, true, None)?;
        builtins::patch_native_hooks(&mut translator.cx)?;
        analyze::annotate_module(&mut translator.cx, module)?;
        Ok(translator)
    }

    /// Runs the full pipeline for one seed and consumes the context, so every
    /// invocation starts from a freshly constructed object model.
    pub fn translate(self, seed: &EntryPoint, mode: BundleMode) -> CompileResult<Bundle> {
        self.analyze(seed)?.into_bundle(mode)
    }

    /// Materializes, analyzes and prunes, returning the annotated model for
    /// inspection or emission.
    pub fn analyze(mut self, seed: &EntryPoint) -> CompileResult<Analysis> {
        let module = self.materialize(&seed.module, Some(&seed.entry))?;

        let user_modules: Vec<ObjectId> = self
            .cx
            .package
            .values()
            .copied()
            .filter(|m| Some(*m) != self.cx.builtins_module)
            .collect();
        for m in &user_modules {
            analyze::annotate_module(&mut self.cx, *m)?;
        }

        let scope = self.cx.objects[module].scope;
        let entry = self
            .cx
            .scopes
            .search(scope, &seed.entry)
            .filter(|id| self.cx.objects[*id].is_function())
            .ok_or_else(|| {
                CompileError::name(format!("entry point `{}:{}` not found", seed.module, seed.entry), None)
            })?;
        // the seed designates the entry for emission and bundle invocation
        self.cx.objects[entry].directives.include = true;

        let styles = prune(&mut self.cx, entry);
        Ok(Analysis {
            cx: self.cx,
            entry,
            user_modules,
            styles,
        })
    }

    /// Materializes a module once, recursively materializing its imports.
    fn materialize(&mut self, name: &str, force_translate: Option<&str>) -> CompileResult<ObjectId> {
        if let Some(id) = self.cx.package.get(name) {
            return Ok(*id);
        }
        let source = self
            .loader
            .load(name)
            .ok_or_else(|| CompileError::name(format!("module `{name}` not found on the import path"), None))?;
        let nodes = parse_source(&source)?;
        self.build_module(name, nodes, false, force_translate)
    }

    /// Builds a module's objects from its ingested top-level namespace.
    ///
    /// Only declarations carrying the translate marker become objects (the
    /// builtins module and the designated entry point are marked implicitly);
    /// module-level assignments are lifted as constant instances when their
    /// initializer folds at compile time.
    fn build_module(
        &mut self,
        name: &str,
        nodes: Vec<Node>,
        is_builtins: bool,
        force_translate: Option<&str>,
    ) -> CompileResult<ObjectId> {
        let module = self.cx.new_module(name, is_builtins);
        let module_scope = self.cx.objects[module].scope;

        for node in nodes {
            match node {
                Node::ImportFrom {
                    loc,
                    module: from,
                    names,
                } => {
                    // the compiler's own decorator surface is not a module
                    if from == "pyrite" {
                        continue;
                    }
                    let imported_module = self.materialize(&from, None)?;
                    let imported_scope = self.cx.objects[imported_module].scope;
                    for import_name in names {
                        let object = self.cx.scopes[imported_scope]
                            .names
                            .get(&import_name)
                            .copied()
                            .ok_or_else(|| {
                                CompileError::name(
                                    format!("cannot import `{import_name}` from `{from}`"),
                                    Some(loc),
                                )
                            })?;
                        self.cx.scopes.add(module_scope, import_name.clone(), object);
                        if let ObjectKind::Module(data) = &mut self.cx.objects[module].kind {
                            data.imported.entry(from.clone()).or_default().push(object);
                        }
                    }
                }
                Node::ClassDef(mut def) => {
                    if is_builtins {
                        def.directives.translate = Some(true);
                        def.directives.builtin = true;
                    }
                    if def.directives.translate != Some(true) {
                        continue;
                    }
                    let class_name = def.name.clone();
                    if def.type_params.is_empty() {
                        let def_id = self.cx.add_class_def(def);
                        let class = self.cx.build_class(def_id, module, None, None)?;
                        self.cx.scopes.add(module_scope, class_name, class);
                    } else {
                        let params = def.type_params.clone();
                        let directives = def.directives.clone();
                        let def_id = self.cx.add_class_def(def);
                        let generic = self.cx.objects.alloc(crate::objects::Object {
                            name: class_name.clone(),
                            scope: module_scope,
                            container: Some(module),
                            visited: ahash::AHashSet::new(),
                            directives,
                            kind: ObjectKind::Generic(crate::objects::GenericData {
                                def: def_id,
                                params,
                                cache: IndexMap::new(),
                            }),
                        });
                        self.cx.scopes.add(module_scope, class_name, generic);
                    }
                }
                Node::FunctionDef(mut def) => {
                    if let Some((target, kind)) = def.hook_for.clone() {
                        let function = self.cx.scopes[module_scope].names.get(&target).copied().ok_or_else(
                            || CompileError::name(format!("hook target `{target}` not found"), Some(def.loc)),
                        )?;
                        def.hook_for = None;
                        self.cx.apply_hook(function, kind, def)?;
                        continue;
                    }
                    if is_builtins {
                        def.directives.translate = Some(true);
                        def.directives.builtin = true;
                    }
                    if force_translate == Some(def.name.as_str()) && def.directives.translate.is_none() {
                        def.directives.translate = Some(true);
                    }
                    if def.directives.translate != Some(true) {
                        continue;
                    }
                    self.cx.build_function(def, module, module);
                }
                Node::Assign { targets, value } => {
                    for target in &targets {
                        self.lift_module_static(module, module_scope, target, &value);
                    }
                }
                Node::AnnAssign { target, value, .. } => {
                    self.lift_module_static(module, module_scope, &target, &value);
                }
                // everything else at module level is host-only code the
                // translator does not model
                _ => {}
            }
        }
        Ok(module)
    }

    /// Lifts `NAME = <const-evaluable>` as an exported constant instance, and
    /// `name = SomeClass(...)` as a typed module value. Initializers that do
    /// not fold are simply not part of the translated namespace.
    fn lift_module_static(&mut self, module: ObjectId, module_scope: crate::objects::ScopeId, target: &ExprLoc, value: &ExprLoc) {
        let Expr::Name(name) = &target.expr else { return };

        if let Some(folded) = self.cx.const_eval(module_scope, &value.expr) {
            let Ok(ty) = self.cx.builtin(folded.type_name()) else {
                return;
            };
            if !self.cx.objects[ty].is_class() {
                return;
            }
            let instance = self.cx.instantiate(
                ty,
                name,
                module_scope,
                Some(module),
                Some(StaticValue::Const(folded)),
                true,
            );
            self.cx.scopes.add(module_scope, name.clone(), instance);
            return;
        }

        // `document = Document()` style module values
        if let Expr::Call { func, args, keywords } = &value.expr {
            if !keywords.is_empty() {
                return;
            }
            let Expr::Name(class_name) = &func.expr else { return };
            let Some(class) = self.cx.scopes.search(module_scope, class_name) else {
                return;
            };
            if !self.cx.objects[class].is_class() {
                return;
            }
            let mut folded_args = Vec::with_capacity(args.len());
            for arg in args {
                match self.cx.const_eval(module_scope, &arg.expr) {
                    Some(folded) => folded_args.push(folded),
                    None => return,
                }
            }
            let builtin = self.cx.objects[class].directives.builtin;
            let instance = self.cx.instantiate(
                class,
                name,
                module_scope,
                Some(module),
                Some(StaticValue::New {
                    class,
                    args: folded_args,
                }),
                true,
            );
            // instances of shim classes are themselves never emitted
            self.cx.objects[instance].directives.builtin = builtin;
            self.cx.scopes.add(module_scope, name.clone(), instance);
        }
    }
}
