use std::{
    cell::RefCell,
    ops::{Index, IndexMut},
    rc::Rc,
};

use ahash::AHashSet;
use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::{
    error::{CompileError, CompileResult},
    hooks::Rewriter,
    parse::{Directives, Expr, Literal, Node, RawClassDef, RawFunctionDef},
    typed::TypedExpr,
};

/// Stable index of an object in the arena.
///
/// Objects reference each other exclusively through these indices; the arena
/// owns all object data, which keeps the cyclic class / method / self-instance
/// graph representable without reference counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

impl ObjectId {
    fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("object arena overflow"))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Stable index of a scope in the scope arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

impl ScopeId {
    fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("scope arena overflow"))
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of an ingested function definition kept for (re-)analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuncDefId(u32);

/// Index of an ingested class definition kept for lazy specialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassDefId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Class,
    Function,
    /// A narrowed block scope pushed for a type-test branch.
    Local,
}

/// One name table in the scope tree.
///
/// The table is insertion-ordered; emission iterates it directly, so ordering
/// is part of the deterministic-output contract.
#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub names: IndexMap<String, ObjectId>,
    /// Module scopes outside the builtins module fall back to builtins.
    pub is_builtins: bool,
}

/// Arena of all scopes for one translation.
#[derive(Debug, Default)]
pub struct Scopes {
    scopes: Vec<Scope>,
    /// The shared builtins module scope, consulted after module scopes.
    builtins: Option<ScopeId>,
}

impl Index<ScopeId> for Scopes {
    type Output = Scope;

    fn index(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }
}

impl IndexMut<ScopeId> for Scopes {
    fn index_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.index()]
    }
}

impl Scopes {
    pub fn alloc(&mut self, kind: ScopeKind, parent: Option<ScopeId>, is_builtins: bool) -> ScopeId {
        let id = ScopeId::new(self.scopes.len());
        self.scopes.push(Scope {
            kind,
            parent,
            names: IndexMap::new(),
            is_builtins,
        });
        if is_builtins && self.builtins.is_none() {
            self.builtins = Some(id);
        }
        id
    }

    pub fn add(&mut self, scope: ScopeId, name: impl Into<String>, object: ObjectId) {
        self[scope].names.insert(name.into(), object);
    }

    /// Horizontal lookup: local chain, then module scope, then builtins.
    pub fn search(&self, scope: ScopeId, name: &str) -> Option<ObjectId> {
        let mut current = scope;
        loop {
            let s = &self[current];
            if let Some(id) = s.names.get(name) {
                return Some(*id);
            }
            if s.kind == ScopeKind::Module {
                if s.is_builtins {
                    return None;
                }
                let builtins = self.builtins?;
                return self[builtins].names.get(name).copied();
            }
            current = s.parent?;
        }
    }

    /// Vertical lookup restricted to the current function's scope chain.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<ObjectId> {
        let mut current = scope;
        loop {
            let s = &self[current];
            if !matches!(s.kind, ScopeKind::Function | ScopeKind::Local) {
                return None;
            }
            if let Some(id) = s.names.get(name) {
                return Some(*id);
            }
            current = s.parent?;
        }
    }
}

/// A compile-time-known value, used for lifted module and class statics.
///
/// This is the static stand-in for the original pipeline's evaluate-then-
/// convert-back-to-AST round trip: initializers are folded at module build
/// time and rendered straight from this tree at emission time.
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Const>),
    Tuple(Vec<Const>),
    Dict(Vec<(Const, Const)>),
}

impl Const {
    /// The builtin type name of this value (`"int"`, `"str"`, ...).
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "NoneType",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Dict(_) => "dict",
        }
    }
}

/// The initializer of a lifted static value.
#[derive(Debug, Clone)]
pub enum StaticValue {
    Const(Const),
    /// A module-level instantiation such as `document = Document()`.
    New { class: ObjectId, args: Vec<Const> },
}

/// How far along the inference driver is with a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalysisState {
    #[default]
    Unanalyzed,
    InProgress,
    Analyzed,
}

/// A typed parameter after inference.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: ObjectId,
}

#[derive(Debug)]
pub struct ModuleData {
    /// Inbound cross-module references: module name -> imported objects.
    pub imported: IndexMap<String, Vec<ObjectId>>,
    pub is_builtins: bool,
}

#[derive(Debug)]
pub struct ClassData {
    /// Instance members (methods, discovered attributes, statics).
    pub internal_scope: ScopeId,
    pub base: Option<ObjectId>,
    /// The canonical receiver used as the method-binding template.
    pub self_instance: ObjectId,
    /// Type-parameter name -> concrete type, for specializations.
    pub generic_args: Option<IndexMap<String, ObjectId>>,
    /// The template name (`list` for `list__int`); equals `name` otherwise.
    pub generic_name: String,
    pub def: Option<ClassDefId>,
}

#[derive(Debug)]
pub struct GenericData {
    pub def: ClassDefId,
    pub params: Vec<String>,
    /// Structural name -> concrete specialization.
    pub cache: IndexMap<String, ObjectId>,
}

#[derive(Debug)]
pub struct FunctionData {
    pub def: FuncDefId,
    /// The owning class when this function is a method.
    pub class: Option<ObjectId>,
    pub state: AnalysisState,
    /// Parameters excluding the receiver, typed during inference.
    pub params: Vec<Param>,
    /// Typed default values, aligned with the trailing `params`.
    pub defaults: Vec<TypedExpr>,
    pub vararg: Option<Param>,
    pub kwarg: Option<Param>,
    /// The post-inference body.
    pub body: Vec<crate::typed::TypedNode>,
    /// Inferred return type; `None` means the function returns nothing.
    pub return_type: Option<ObjectId>,
    pub is_classmethod: bool,
    pub is_staticmethod: bool,
    /// Call-site rewriter, from decorator metadata or a native builtin rule.
    pub hook: Option<Rewriter>,
    /// Full-body replacement TL text.
    pub source_text: Option<String>,
}

impl FunctionData {
    pub fn is_method(&self) -> bool {
        self.class.is_some()
    }

    pub fn is_static(&self) -> bool {
        self.is_classmethod || self.is_staticmethod
    }
}

#[derive(Debug)]
pub struct InstanceData {
    pub class: ObjectId,
    /// Attribute map, shared between a self-instance and its re-bound copies.
    pub attrs: Rc<RefCell<IndexMap<String, ObjectId>>>,
    /// Compile-time-known value for lifted statics.
    pub value: Option<StaticValue>,
    /// True for module-level immutables (emitted as exported constants).
    pub is_const: bool,
}

#[derive(Debug)]
pub struct UnionData {
    /// Ordered, deduplicated alternative classes.
    pub members: Vec<ObjectId>,
}

#[derive(Debug)]
pub enum ObjectKind {
    Module(ModuleData),
    Class(ClassData),
    Generic(GenericData),
    Function(FunctionData),
    Instance(InstanceData),
    Union(UnionData),
}

/// The common object abstraction: every semantic entity the analyzer can
/// reference is one of these, stored in the arena.
#[derive(Debug)]
pub struct Object {
    pub name: String,
    /// The scope this object owns (modules, classes, functions) or lives in
    /// (instances).
    pub scope: ScopeId,
    pub container: Option<ObjectId>,
    /// Entry points that reached this object during pruning.
    pub visited: AHashSet<ObjectId>,
    pub directives: Directives,
    pub kind: ObjectKind,
}

impl Object {
    pub fn as_function(&self) -> Option<&FunctionData> {
        match &self.kind {
            ObjectKind::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassData> {
        match &self.kind {
            ObjectKind::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&InstanceData> {
        match &self.kind {
            ObjectKind::Instance(i) => Some(i),
            _ => None,
        }
    }

    pub fn is_class(&self) -> bool {
        matches!(self.kind, ObjectKind::Class(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, ObjectKind::Function(_))
    }

    /// Whether the emitter should render this object: reached by an entry
    /// point or force-included, and not a builtin.
    pub fn should_emit(&self) -> bool {
        (self.directives.include || !self.visited.is_empty()) && !self.directives.builtin
    }
}

/// Arena of all semantic objects for one translation.
#[derive(Debug, Default)]
pub struct Objects(Vec<Object>);

impl Index<ObjectId> for Objects {
    type Output = Object;

    fn index(&self, id: ObjectId) -> &Object {
        &self.0[id.index()]
    }
}

impl IndexMut<ObjectId> for Objects {
    fn index_mut(&mut self, id: ObjectId) -> &mut Object {
        &mut self.0[id.index()]
    }
}

impl Objects {
    pub fn alloc(&mut self, object: Object) -> ObjectId {
        let id = ObjectId::new(self.0.len());
        self.0.push(object);
        id
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// All mutable state of one translation, threaded through the pipeline.
///
/// There are no process-level singletons: the builtins registry, the module
/// cache and both arenas live here, and a fresh context is constructed per
/// invocation.
#[derive(Debug, Default)]
pub struct Context {
    pub objects: Objects,
    pub scopes: Scopes,
    pub func_defs: Vec<RawFunctionDef>,
    pub class_defs: Vec<RawClassDef>,
    /// Materialized modules by name, in materialization order.
    pub package: IndexMap<String, ObjectId>,
    pub builtins_module: Option<ObjectId>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_func_def(&mut self, def: RawFunctionDef) -> FuncDefId {
        let id = FuncDefId(u32::try_from(self.func_defs.len()).expect("function def arena overflow"));
        self.func_defs.push(def);
        id
    }

    pub fn add_class_def(&mut self, def: RawClassDef) -> ClassDefId {
        let id = ClassDefId(u32::try_from(self.class_defs.len()).expect("class def arena overflow"));
        self.class_defs.push(def);
        id
    }

    pub fn func_def(&self, id: FuncDefId) -> &RawFunctionDef {
        &self.func_defs[id.0 as usize]
    }

    pub fn func_def_mut(&mut self, id: FuncDefId) -> &mut RawFunctionDef {
        &mut self.func_defs[id.0 as usize]
    }

    pub fn class_def(&self, id: ClassDefId) -> &RawClassDef {
        &self.class_defs[id.0 as usize]
    }

    /// Searches the builtins scope directly.
    pub fn builtin(&self, name: &str) -> CompileResult<ObjectId> {
        let builtins = self
            .builtins_module
            .ok_or_else(|| CompileError::name("builtins registry not loaded", None))?;
        let scope = self.objects[builtins].scope;
        self.scopes[scope]
            .names
            .get(name)
            .copied()
            .ok_or_else(|| CompileError::name(format!("`{name}` is not a builtin"), None))
    }

    // --- object constructors -------------------------------------------------

    pub fn new_module(&mut self, name: &str, is_builtins: bool) -> ObjectId {
        let scope = self.scopes.alloc(ScopeKind::Module, None, is_builtins);
        let module = self.objects.alloc(Object {
            name: name.to_string(),
            scope,
            container: None,
            visited: AHashSet::new(),
            directives: Directives::default(),
            kind: ObjectKind::Module(ModuleData {
                imported: IndexMap::new(),
                is_builtins,
            }),
        });
        self.package.insert(name.to_string(), module);
        if is_builtins {
            self.builtins_module = Some(module);
        }
        module
    }

    /// Creates a fresh instance of `class` named `name`, sharing the class
    /// self-instance's attribute map (re-bound copy semantics).
    pub fn instantiate(
        &mut self,
        class: ObjectId,
        name: &str,
        scope: ScopeId,
        container: Option<ObjectId>,
        value: Option<StaticValue>,
        is_const: bool,
    ) -> ObjectId {
        let attrs = match &self.objects[class].kind {
            ObjectKind::Class(data) => match &self.objects[data.self_instance].kind {
                ObjectKind::Instance(inst) => Rc::clone(&inst.attrs),
                _ => Rc::new(RefCell::new(IndexMap::new())),
            },
            // union-typed or otherwise classless slots get their own map
            _ => Rc::new(RefCell::new(IndexMap::new())),
        };
        self.objects.alloc(Object {
            name: name.to_string(),
            scope,
            container,
            visited: AHashSet::new(),
            directives: Directives::default(),
            kind: ObjectKind::Instance(InstanceData {
                class,
                attrs,
                value,
                is_const,
            }),
        })
    }

    /// Creates a union over `members`, deduplicated in order; a single-member
    /// union collapses to that member.
    pub fn union_of(&mut self, members: impl IntoIterator<Item = ObjectId>) -> Option<ObjectId> {
        let mut unique: Vec<ObjectId> = Vec::new();
        for member in members {
            // flatten nested unions so member order stays source order
            if let ObjectKind::Union(u) = &self.objects[member].kind {
                for inner in u.members.clone() {
                    if !unique.contains(&inner) {
                        unique.push(inner);
                    }
                }
            } else if !unique.contains(&member) {
                unique.push(member);
            }
        }
        match unique.len() {
            0 => None,
            1 => Some(unique[0]),
            _ => {
                let scope = self.objects[unique[0]].scope;
                let name = self.annotation_join(&unique, " | ");
                Some(self.objects.alloc(Object {
                    name,
                    scope,
                    container: None,
                    visited: AHashSet::new(),
                    directives: Directives::default(),
                    kind: ObjectKind::Union(UnionData { members: unique }),
                }))
            }
        }
    }

    // --- lookup --------------------------------------------------------------

    /// Vertical attribute lookup on an object, following inheritance.
    pub fn find(&self, object: ObjectId, name: &str) -> Option<ObjectId> {
        match &self.objects[object].kind {
            ObjectKind::Instance(data) => self
                .instance_find_attrs(data, name)
                .or_else(|| self.find(data.class, name)),
            ObjectKind::Class(_) => self.class_find_attr(object, name, true),
            ObjectKind::Union(data) => {
                // members must agree on the attribute for the lookup to succeed
                let mut found: Option<ObjectId> = None;
                for member in &data.members {
                    let attr = self.find(*member, name)?;
                    if found.is_some_and(|f| f != attr) {
                        return None;
                    }
                    found = Some(attr);
                }
                found
            }
            _ => None,
        }
    }

    fn instance_find_attrs(&self, data: &InstanceData, name: &str) -> Option<ObjectId> {
        if let Some(id) = data.attrs.borrow().get(name) {
            return Some(*id);
        }
        // fall back to the base chain's self-instances
        let mut class = self.objects[data.class].as_class()?.base;
        while let Some(base) = class {
            let base_data = self.objects[base].as_class()?;
            let base_self = self.objects[base_data.self_instance].as_instance()?;
            if let Some(id) = base_self.attrs.borrow().get(name) {
                return Some(*id);
            }
            class = base_data.base;
        }
        None
    }

    /// Looks `name` up in a class's internal scope, optionally following the
    /// base chain.
    pub fn class_find_attr(&self, class: ObjectId, name: &str, search_bases: bool) -> Option<ObjectId> {
        let data = self.objects[class].as_class()?;
        if let Some(id) = self.scopes[data.internal_scope].names.get(name) {
            return Some(*id);
        }
        if search_bases {
            if let Some(base) = data.base {
                return self.class_find_attr(base, name, true);
            }
        }
        None
    }

    /// The class standing in for `object` when dispatching operators: an
    /// instance's class, or the class itself for class-typed referents.
    pub fn receiver_class(&self, object: ObjectId) -> Option<ObjectId> {
        match &self.objects[object].kind {
            ObjectKind::Instance(data) => Some(data.class),
            ObjectKind::Class(_) => Some(object),
            ObjectKind::Union(data) => data.members.first().copied(),
            _ => None,
        }
    }

    /// The type an expression referent contributes to inference results.
    pub fn type_of(&self, object: ObjectId) -> Option<ObjectId> {
        match &self.objects[object].kind {
            ObjectKind::Instance(data) => Some(data.class),
            ObjectKind::Class(_) | ObjectKind::Union(_) | ObjectKind::Generic(_) => Some(object),
            ObjectKind::Function(data) => data.return_type,
            ObjectKind::Module(_) => None,
        }
    }

    /// The base class of `class`, if any.
    pub fn base_of(&self, class: ObjectId) -> Option<ObjectId> {
        self.objects[class].as_class()?.base
    }

    /// Whether `class` or one of its ancestors is named `ancestor_name`.
    pub fn inherits_from(&self, class: ObjectId, ancestor_name: &str) -> bool {
        let mut current = Some(class);
        while let Some(id) = current {
            if self.objects[id].name == ancestor_name {
                return true;
            }
            current = self.base_of(id);
        }
        false
    }

    /// The generic arguments of a class, empty for plain classes.
    pub fn generic_args_of(&self, class: ObjectId) -> Vec<ObjectId> {
        match &self.objects[class].kind {
            ObjectKind::Class(data) => data
                .generic_args
                .as_ref()
                .map(|args| args.values().copied().collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    // --- annotations ---------------------------------------------------------

    /// Renders an SL-style annotation (`list[str | int]`, `A | B`, `int`).
    pub fn annotation_str(&self, object: ObjectId) -> String {
        match &self.objects[object].kind {
            ObjectKind::Class(data) => {
                if let Some(args) = &data.generic_args {
                    let inner: Vec<String> = args.values().map(|a| self.annotation_str(*a)).collect();
                    format!("{}[{}]", data.generic_name, inner.join(", "))
                } else {
                    self.objects[object].name.clone()
                }
            }
            ObjectKind::Union(data) => self.annotation_join(&data.members, " | "),
            _ => self.objects[object].name.clone(),
        }
    }

    fn annotation_join(&self, members: &[ObjectId], sep: &str) -> String {
        members
            .iter()
            .map(|m| self.annotation_str(*m))
            .collect::<Vec<_>>()
            .join(sep)
    }

    /// The structural name component used to key specialization caches
    /// (`str`, `strUint`, `list__int`).
    pub fn structural_name(&self, object: ObjectId) -> String {
        match &self.objects[object].kind {
            ObjectKind::Union(data) => data
                .members
                .iter()
                .map(|m| self.structural_name(*m))
                .collect::<Vec<_>>()
                .join("U"),
            _ => self.objects[object].name.clone(),
        }
    }

    // --- construction from ingested definitions ------------------------------

    /// Builds a `Function` object from an ingested definition and inserts it
    /// into its container (module scope or class internal scope).
    pub fn build_function(&mut self, def: RawFunctionDef, container: ObjectId, module: ObjectId) -> ObjectId {
        let container_scope = self.objects[container].scope;
        let scope = self.scopes.alloc(ScopeKind::Function, Some(container_scope), false);
        let class = self.objects[container].is_class().then_some(container);

        let hook = def.directives.inline.clone().map(Rewriter::Template);
        let source_text = def.directives.source.clone();
        let name = def.name.clone();
        let directives = def.directives.clone();
        let is_classmethod = def.is_classmethod;
        let is_staticmethod = def.is_staticmethod;
        let def_id = self.add_func_def(def);

        let function = self.objects.alloc(Object {
            name: name.clone(),
            scope,
            container: Some(container),
            visited: AHashSet::new(),
            directives,
            kind: ObjectKind::Function(FunctionData {
                def: def_id,
                class,
                state: AnalysisState::Unanalyzed,
                params: Vec::new(),
                defaults: Vec::new(),
                vararg: None,
                kwarg: None,
                body: Vec::new(),
                return_type: None,
                is_classmethod,
                is_staticmethod,
                hook,
                source_text,
            }),
        });
        self.rebind_super(function);

        match &self.objects[container].kind {
            ObjectKind::Class(data) => {
                let internal = data.internal_scope;
                self.scopes.add(internal, name, function);
            }
            _ => {
                let scope = self.objects[module].scope;
                self.scopes.add(scope, name, function);
            }
        }
        function
    }

    /// (Re-)adds the `super` binding to a method's scope.
    ///
    /// This is the only binding injected structurally rather than discovered
    /// by the body walk, so it is the only one the reset path must restore.
    pub fn rebind_super(&mut self, function: ObjectId) {
        let Some(data) = self.objects[function].as_function() else {
            return;
        };
        let Some(class) = data.class else {
            return;
        };
        let scope = self.objects[function].scope;
        if let Some(base) = self.base_of(class) {
            self.scopes.add(scope, "super", base);
        }
    }

    /// Builds a `Class` object (and its members) from an ingested definition.
    ///
    /// `assigned` carries the type-parameter bindings when this is a concrete
    /// specialization of a generic template.
    pub fn build_class(
        &mut self,
        def_id: ClassDefId,
        module: ObjectId,
        assigned: Option<IndexMap<String, ObjectId>>,
        name_override: Option<String>,
    ) -> CompileResult<ObjectId> {
        let def = self.class_def(def_id);
        let generic_name = def.name.clone();
        let name = name_override.unwrap_or_else(|| def.name.clone());
        let loc = def.loc;
        let directives = def.directives.clone();
        let base_expr = def.bases.first().cloned();
        let body = def.body.clone();

        let module_scope = self.objects[module].scope;
        let class_scope = self.scopes.alloc(ScopeKind::Class, Some(module_scope), false);
        if let Some(args) = &assigned {
            for (param, ty) in args {
                self.scopes.add(class_scope, param.clone(), *ty);
            }
        }
        let internal_scope = self.scopes.alloc(ScopeKind::Class, Some(class_scope), false);

        // single inheritance; a missing base means the shared `object` root,
        // except for the root itself inside the builtins module
        let is_builtins_module = self.objects[module]
            .as_module_data()
            .is_some_and(|data| data.is_builtins);
        let base = match base_expr {
            Some(expr) => match &expr.expr {
                Expr::Name(base_name) => {
                    let base = self
                        .scopes
                        .search(class_scope, base_name)
                        .ok_or_else(|| CompileError::name(format!("base class `{base_name}` not found"), Some(loc)))?;
                    if !self.objects[base].is_class() {
                        return Err(CompileError::unsupported(
                            format!("base `{base_name}` is not a plain class"),
                            Some(loc),
                        ));
                    }
                    Some(base)
                }
                _ => {
                    return Err(CompileError::unsupported("base class expression", Some(loc)));
                }
            },
            None => {
                if is_builtins_module && name == "object" {
                    None
                } else {
                    Some(
                        self.scopes
                            .search(class_scope, "object")
                            .ok_or_else(|| CompileError::name("root class `object` not found", Some(loc)))?,
                    )
                }
            }
        };

        let class = self.objects.alloc(Object {
            name: name.clone(),
            scope: class_scope,
            container: Some(module),
            visited: AHashSet::new(),
            directives: directives.clone(),
            kind: ObjectKind::Class(ClassData {
                internal_scope,
                base,
                self_instance: ObjectId(0), // patched right below
                generic_args: assigned,
                generic_name,
                def: Some(def_id),
            }),
        });
        // the canonical receiver owns the attribute map every re-bound copy
        // will share
        let self_instance = self.objects.alloc(Object {
            name: "self".to_string(),
            scope: class_scope,
            container: Some(class),
            visited: AHashSet::new(),
            directives: Directives::default(),
            kind: ObjectKind::Instance(InstanceData {
                class,
                attrs: Rc::new(RefCell::new(IndexMap::new())),
                value: None,
                is_const: false,
            }),
        });
        if let ObjectKind::Class(data) = &mut self.objects[class].kind {
            data.self_instance = self_instance;
        }

        self.build_class_members(class, module, body, &directives)?;
        Ok(class)
    }

    /// Populates a class's internal scope from its body nodes.
    fn build_class_members(
        &mut self,
        class: ObjectId,
        module: ObjectId,
        body: Vec<Node>,
        class_directives: &Directives,
    ) -> CompileResult<()> {
        for node in body {
            match node {
                Node::Pass => {}
                Node::FunctionDef(def) => {
                    // class members inherit the class's translate marker
                    if def.directives.translate == Some(false) {
                        continue;
                    }
                    if let Some((target, kind)) = def.hook_for.clone() {
                        self.install_hook(class, &target, kind, def)?;
                        continue;
                    }
                    let mut def = def;
                    if class_directives.builtin {
                        def.directives.builtin = true;
                    }
                    self.build_function(def, class, module);
                }
                Node::Assign { targets, value } => {
                    for target in &targets {
                        self.build_class_static(class, target, &value)?;
                    }
                }
                Node::AnnAssign { target, value, .. } => {
                    self.build_class_static(class, &target, &value)?;
                }
                _ => {
                    return Err(CompileError::unsupported("class body statement", None));
                }
            }
        }
        Ok(())
    }

    /// Lifts one class-body static assignment as a constant-valued Instance.
    ///
    /// Only scalar statics are supported: collection statics cannot be typed
    /// without a specialization context.
    fn build_class_static(
        &mut self,
        class: ObjectId,
        target: &crate::parse::ExprLoc,
        value: &crate::parse::ExprLoc,
    ) -> CompileResult<()> {
        let Expr::Name(name) = &target.expr else {
            return Err(CompileError::unsupported("class static target", Some(target.loc)));
        };
        let internal = match self.objects[class].as_class() {
            Some(data) => data.internal_scope,
            None => return Err(CompileError::unsupported("static on a non-class", Some(target.loc))),
        };
        let folded = self
            .const_eval(internal, &value.expr)
            .ok_or_else(|| CompileError::underspecified(Some(value.loc)))?;
        if !matches!(
            folded,
            Const::None | Const::Bool(_) | Const::Int(_) | Const::Float(_) | Const::Str(_)
        ) {
            return Err(CompileError::underspecified(Some(value.loc)));
        }
        let ty = self.builtin(folded.type_name()).map_err(|mut e| {
            e.loc = Some(value.loc);
            e
        })?;
        let name = name.clone();
        let instance = self.instantiate(ty, &name, internal, Some(class), Some(StaticValue::Const(folded)), false);
        self.scopes.add(internal, name, instance);
        Ok(())
    }

    /// Installs a `@target.<kind>` hook definition on a previously declared
    /// member of `class`.
    fn install_hook(
        &mut self,
        class: ObjectId,
        target: &str,
        kind: crate::parse::HookKind,
        def: RawFunctionDef,
    ) -> CompileResult<()> {
        let Some(function) = self.class_find_attr(class, target, false) else {
            return Err(CompileError::name(
                format!("hook target `{target}` not found"),
                Some(def.loc),
            ));
        };
        self.apply_hook(function, kind, def)
    }

    /// Applies a hook definition to a function object.
    pub fn apply_hook(
        &mut self,
        function: ObjectId,
        kind: crate::parse::HookKind,
        def: RawFunctionDef,
    ) -> CompileResult<()> {
        use crate::parse::HookKind;
        match kind {
            HookKind::Client => {
                // the replacement body is analyzed in place of the original
                let def_id = match self.objects[function].as_function() {
                    Some(data) => data.def,
                    None => {
                        return Err(CompileError::unsupported("client hook on a non-function", Some(def.loc)));
                    }
                };
                let original = self.func_def_mut(def_id);
                original.params = def.params;
                original.vararg = def.vararg;
                original.kwarg = def.kwarg;
                original.returns = def.returns;
                original.body = def.body;
            }
            HookKind::Source | HookKind::Inline => {
                // static hook providers must return a single literal
                let text = hook_literal(&def).ok_or_else(|| {
                    CompileError::unsupported("hook provider must return a string literal", Some(def.loc))
                })?;
                let ObjectKind::Function(data) = &mut self.objects[function].kind else {
                    return Err(CompileError::unsupported("hook on a non-function", Some(def.loc)));
                };
                if kind == HookKind::Inline {
                    data.hook = Some(Rewriter::Template(text));
                } else {
                    data.source_text = Some(text);
                }
            }
        }
        Ok(())
    }

    // --- const evaluation ----------------------------------------------------

    /// Folds a compile-time-evaluable initializer expression.
    ///
    /// Supports literals, collections of evaluable values, references to
    /// previously lifted constants, `+` on strings and integers, `js_str`
    /// unwrapping, and instantiations of already-built classes.
    pub fn const_eval(&self, scope: ScopeId, expr: &Expr) -> Option<Const> {
        match expr {
            Expr::Literal(literal) => Some(match literal {
                Literal::None => Const::None,
                Literal::Bool(b) => Const::Bool(*b),
                Literal::Int(i) => Const::Int(*i),
                Literal::Float(f) => Const::Float(*f),
                Literal::Str(s) => Const::Str(s.clone()),
            }),
            Expr::Name(name) => {
                let id = self.scopes.search(scope, name)?;
                match &self.objects[id].kind {
                    ObjectKind::Instance(data) => match &data.value {
                        Some(StaticValue::Const(value)) => Some(value.clone()),
                        _ => None,
                    },
                    _ => None,
                }
            }
            Expr::BinOp {
                left,
                op: crate::parse::Operator::Add,
                right,
            } => {
                let left = self.const_eval(scope, &left.expr)?;
                let right = self.const_eval(scope, &right.expr)?;
                match (left, right) {
                    (Const::Str(a), Const::Str(b)) => Some(Const::Str(a + &b)),
                    (Const::Int(a), Const::Int(b)) => Some(Const::Int(a + b)),
                    _ => None,
                }
            }
            Expr::List(items) => Some(Const::List(self.const_eval_all(scope, items)?)),
            Expr::Tuple(items) => Some(Const::Tuple(self.const_eval_all(scope, items)?)),
            Expr::Dict(items) => {
                let mut pairs = Vec::with_capacity(items.len());
                for (key, value) in items {
                    pairs.push((self.const_eval(scope, &key.expr)?, self.const_eval(scope, &value.expr)?));
                }
                Some(Const::Dict(pairs))
            }
            Expr::Call { func, args, keywords } => {
                if !keywords.is_empty() {
                    return None;
                }
                if let Expr::Name(name) = &func.expr {
                    if name == "js_str" && args.len() == 1 {
                        return self.const_eval(scope, &args[0].expr);
                    }
                }
                None
            }
            _ => None,
        }
    }

    fn const_eval_all(&self, scope: ScopeId, items: &[crate::parse::ExprLoc]) -> Option<Vec<Const>> {
        items.iter().map(|item| self.const_eval(scope, &item.expr)).collect()
    }
}

impl Object {
    fn as_module_data(&self) -> Option<&ModuleData> {
        match &self.kind {
            ObjectKind::Module(m) => Some(m),
            _ => None,
        }
    }
}

/// Extracts the string literal a static hook provider returns.
fn hook_literal(def: &RawFunctionDef) -> Option<String> {
    let mut result = None;
    for node in &def.body {
        if let Node::Return {
            value: Some(value), ..
        } = node
        {
            if let Expr::Literal(Literal::Str(text)) = &value.expr {
                result = Some(text.clone());
            }
        }
    }
    result
}

/// Generic argument lists are tiny; avoid a heap allocation for them.
pub type GenericArgs = SmallVec<[ObjectId; 4]>;
