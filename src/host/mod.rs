//! Host type descriptors: the embedder's types as seen by compiled scripts.
//!
//! A [`HostType`] is an immutable, `Arc`-shared description of a type the
//! embedding program exposes. Members are plain Rust closures. Descriptors
//! are grouped into [`HostModule`]s, which can be registered in the
//! process-wide [`catalog`] so scripts can reference them by name.

pub mod catalog;
pub mod system;

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::runtime::{HostCall, RuntimeError, Value};

static NEXT_TYPE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a host type descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostTypeId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Internal,
}

/// Built-in value shapes that map onto the script's primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Void,
    Bool,
    Int,
    Float,
    String,
    Object,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostTypeKind {
    Class,
    Struct,
    Interface,
    /// Base abstractions such as `ValueType`; never instantiated directly.
    Abstract,
    /// Only static members; cannot be instantiated.
    Static,
    Primitive(Primitive),
}

/// Type signature of a host member parameter, return or field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSig {
    Void,
    Bool,
    Int,
    Float,
    String,
    Object,
    /// Another host type, by full name.
    Named(String),
}

pub type HostFn = Arc<dyn Fn(&mut HostCall<'_>) -> Result<Value, RuntimeError> + Send + Sync>;

/// A callable host member.
#[derive(Clone)]
pub struct HostMethod {
    pub params: Vec<TypeSig>,
    pub ret: TypeSig,
    func: HostFn,
}

impl HostMethod {
    pub fn new<F>(params: Vec<TypeSig>, ret: TypeSig, func: F) -> Self
    where
        F: Fn(&mut HostCall<'_>) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        Self {
            params,
            ret,
            func: Arc::new(func),
        }
    }

    pub(crate) fn invoke(&self, call: &mut HostCall<'_>) -> Result<Value, RuntimeError> {
        (self.func)(call)
    }
}

impl fmt::Debug for HostMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostMethod")
            .field("params", &self.params)
            .field("ret", &self.ret)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct HostField {
    pub name: String,
    pub ty: TypeSig,
}

/// A static read-only value, e.g. `Math.PI`.
#[derive(Debug, Clone)]
pub struct HostConstant {
    pub ty: TypeSig,
    pub value: Value,
}

#[derive(Debug)]
struct HostTypeDef {
    id: HostTypeId,
    name: String,
    namespace: Option<String>,
    module: String,
    visibility: Visibility,
    kind: HostTypeKind,
    fields: Vec<HostField>,
    constructor: Option<HostMethod>,
    static_methods: IndexMap<String, HostMethod>,
    methods: IndexMap<String, HostMethod>,
    constants: IndexMap<String, HostConstant>,
}

/// Shared, immutable host type descriptor. Identity is its [`HostTypeId`].
#[derive(Clone)]
pub struct HostType(Arc<HostTypeDef>);

impl HostType {
    pub fn builder(name: impl Into<String>) -> HostTypeBuilder {
        HostTypeBuilder::new(name)
    }

    pub fn id(&self) -> HostTypeId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.0.namespace.as_deref()
    }

    pub fn full_name(&self) -> String {
        match &self.0.namespace {
            Some(ns) => format!("{ns}.{}", self.0.name),
            None => self.0.name.clone(),
        }
    }

    pub fn module(&self) -> &str {
        &self.0.module
    }

    pub fn is_public(&self) -> bool {
        self.0.visibility == Visibility::Public
    }

    pub fn kind(&self) -> HostTypeKind {
        self.0.kind
    }

    pub fn primitive(&self) -> Option<Primitive> {
        match self.0.kind {
            HostTypeKind::Primitive(p) => Some(p),
            _ => None,
        }
    }

    /// Whether `new T(...)` is possible at all.
    pub fn is_constructible(&self) -> bool {
        matches!(self.0.kind, HostTypeKind::Class | HostTypeKind::Struct)
    }

    pub fn fields(&self) -> &[HostField] {
        &self.0.fields
    }

    pub fn field_slot(&self, name: &str) -> Option<(usize, &HostField)> {
        self.0.fields.iter().enumerate().find(|(_, f)| f.name == name)
    }

    pub fn constructor(&self) -> Option<&HostMethod> {
        self.0.constructor.as_ref()
    }

    pub fn static_method(&self, name: &str) -> Option<&HostMethod> {
        self.0.static_methods.get(name)
    }

    pub fn method(&self, name: &str) -> Option<&HostMethod> {
        self.0.methods.get(name)
    }

    pub fn constant(&self, name: &str) -> Option<&HostConstant> {
        self.0.constants.get(name)
    }

    pub fn static_method_names(&self) -> impl Iterator<Item = &str> {
        self.0.static_methods.keys().map(String::as_str)
    }
}

impl PartialEq for HostType {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for HostType {}

impl Hash for HostType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostType({} #{})", self.full_name(), self.0.id.0)
    }
}

// ── Builder ─────────────────────────────────────────────────────

pub struct HostTypeBuilder {
    name: String,
    namespace: Option<String>,
    module: String,
    visibility: Visibility,
    kind: HostTypeKind,
    fields: Vec<HostField>,
    constructor: Option<HostMethod>,
    static_methods: IndexMap<String, HostMethod>,
    methods: IndexMap<String, HostMethod>,
    constants: IndexMap<String, HostConstant>,
}

impl HostTypeBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            module: "host".into(),
            visibility: Visibility::Public,
            kind: HostTypeKind::Class,
            fields: Vec::new(),
            constructor: None,
            static_methods: IndexMap::new(),
            methods: IndexMap::new(),
            constants: IndexMap::new(),
        }
    }

    pub fn namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = Some(ns.into());
        self
    }

    pub fn module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    pub fn internal(mut self) -> Self {
        self.visibility = Visibility::Internal;
        self
    }

    pub fn kind(mut self, kind: HostTypeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn field(mut self, name: impl Into<String>, ty: TypeSig) -> Self {
        self.fields.push(HostField {
            name: name.into(),
            ty,
        });
        self
    }

    /// The constructor receives the freshly allocated object as `this`.
    pub fn constructor<F>(mut self, params: Vec<TypeSig>, func: F) -> Self
    where
        F: Fn(&mut HostCall<'_>) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        self.constructor = Some(HostMethod::new(params, TypeSig::Void, func));
        self
    }

    pub fn static_method<F>(mut self, name: impl Into<String>, params: Vec<TypeSig>, ret: TypeSig, func: F) -> Self
    where
        F: Fn(&mut HostCall<'_>) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        self.static_methods.insert(name.into(), HostMethod::new(params, ret, func));
        self
    }

    pub fn method<F>(mut self, name: impl Into<String>, params: Vec<TypeSig>, ret: TypeSig, func: F) -> Self
    where
        F: Fn(&mut HostCall<'_>) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), HostMethod::new(params, ret, func));
        self
    }

    pub fn constant(mut self, name: impl Into<String>, ty: TypeSig, value: Value) -> Self {
        self.constants.insert(name.into(), HostConstant { ty, value });
        self
    }

    pub fn build(self) -> HostType {
        let id = HostTypeId(NEXT_TYPE_ID.fetch_add(1, Ordering::Relaxed));
        HostType(Arc::new(HostTypeDef {
            id,
            name: self.name,
            namespace: self.namespace,
            module: self.module,
            visibility: self.visibility,
            kind: self.kind,
            fields: self.fields,
            constructor: self.constructor,
            static_methods: self.static_methods,
            methods: self.methods,
            constants: self.constants,
        }))
    }
}

// ── Modules ─────────────────────────────────────────────────────

#[derive(Debug)]
struct HostModuleDef {
    name: String,
    types: Vec<HostType>,
}

/// A named group of host types, the unit referenced by `references`.
#[derive(Debug, Clone)]
pub struct HostModule(Arc<HostModuleDef>);

impl HostModule {
    /// Builds every type, stamping it with this module's name.
    pub fn new(name: impl Into<String>, types: Vec<HostTypeBuilder>) -> Self {
        let name = name.into();
        let types = types.into_iter().map(|b| b.module(name.clone()).build()).collect();
        Self(Arc::new(HostModuleDef { name, types }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn types(&self) -> &[HostType] {
        &self.0.types
    }

    pub fn find(&self, full_name: &str) -> Option<&HostType> {
        self.0.types.iter().find(|t| t.full_name() == full_name)
    }
}
