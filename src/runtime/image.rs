use serde::{Deserialize, Serialize};

/// Format version written into persisted images.
pub const IMAGE_VERSION: u32 = 1;

/// The complete emitted program: types, code and the host members it uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub version: u32,
    pub name: String,
    pub types: Vec<TypeImage>,
    pub constants: Vec<Constant>,
    /// Full names of the host types referenced by `host_refs`, in artifact order.
    pub host_types: Vec<String>,
    pub host_refs: Vec<HostRef>,
    pub entry_point: Option<MethodRef>,
    /// Source file names, present when debug info was requested.
    pub sources: Vec<String>,
}

impl Image {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: IMAGE_VERSION,
            name: name.into(),
            types: Vec::new(),
            constants: Vec::new(),
            host_types: Vec::new(),
            host_refs: Vec::new(),
            entry_point: None,
            sources: Vec::new(),
        }
    }

    pub fn type_image(&self, index: u32) -> Option<&TypeImage> {
        self.types.get(usize::try_from(index).ok()?)
    }

    /// Indices of types that are not nested in another type.
    pub fn top_level(&self) -> impl Iterator<Item = u32> + '_ {
        self.types
            .iter()
            .enumerate()
            .filter(|(_, t)| t.parent.is_none())
            .filter_map(|(i, _)| u32::try_from(i).ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Class,
    Struct,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeImage {
    pub name: String,
    pub full_name: String,
    pub namespace: Option<String>,
    pub kind: TypeKind,
    pub public: bool,
    pub parent: Option<u32>,
    pub nested: Vec<u32>,
    pub fields: Vec<FieldImage>,
    pub static_fields: Vec<FieldImage>,
    pub methods: Vec<MethodImage>,
    /// Index into `methods` of the instance constructor.
    pub ctor: Option<u16>,
    /// Index into `methods` of the static initializer.
    pub static_init: Option<u16>,
}

impl TypeImage {
    pub fn method(&self, index: u16) -> Option<&MethodImage> {
        self.methods.get(usize::from(index))
    }

    pub fn find_method(&self, name: &str) -> Option<(u16, &MethodImage)> {
        self.methods
            .iter()
            .enumerate()
            .find(|(_, m)| m.name == name && !m.is_special())
            .and_then(|(i, m)| Some((u16::try_from(i).ok()?, m)))
    }

    pub fn field_slot(&self, name: &str) -> Option<(usize, &FieldImage)> {
        self.fields.iter().enumerate().find(|(_, f)| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldImage {
    pub name: String,
    pub public: bool,
    pub ty: TypeTag,
}

/// Value shape of a field, parameter or return, enough to pick a default
/// and to check arguments coming from the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    Void,
    Bool,
    Int,
    Float,
    String,
    Object,
    /// A script type by index.
    Script(u32),
    /// A host type by full name.
    Host(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamImage {
    pub name: String,
    pub ty: TypeTag,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodImage {
    pub name: String,
    pub public: bool,
    pub is_static: bool,
    pub params: Vec<ParamImage>,
    pub ret: TypeTag,
    /// Slots including `this` and parameters.
    pub locals: u16,
    pub code: Vec<Op>,
    /// Source line per op, only with debug info.
    pub lines: Vec<u32>,
}

impl MethodImage {
    pub const CTOR: &'static str = ".ctor";
    pub const CCTOR: &'static str = ".cctor";

    pub fn is_special(&self) -> bool {
        self.name == Self::CTOR || self.name == Self::CCTOR
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodRef {
    pub type_index: u32,
    pub method: u16,
}

/// A host member used by the code, resolved to a binding at link time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostRef {
    /// Index into [`Image::host_types`].
    pub host_type: u32,
    pub member: HostMember,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostMember {
    StaticMethod(String),
    Method(String),
    Constant(String),
    Constructor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constant {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl Constant {
    /// Pool identity; floats compare by bit pattern.
    pub fn same_as(&self, other: &Constant) -> bool {
        match (self, other) {
            (Constant::Float(a), Constant::Float(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }
}

/// Bytecode operations for the stack-based interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    /// Push a constant from the constant pool.
    PushConst(u32),
    PushNull,
    /// Load a local variable onto the stack.
    LoadLocal(u16),
    /// Store top of stack into a local variable slot (structs are copied).
    StoreLocal(u16),
    /// Pop top of stack.
    Pop,
    Dup,

    // Objects
    /// Pop object → push field value.
    LoadField(u16),
    /// Pop value, pop object → store into field.
    StoreField(u16),
    LoadStatic(u32, u16),
    StoreStatic(u32, u16),
    LoadHostConst(u32),

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    /// Pop two values → push their string concatenation.
    Concat,
    IntToFloat,

    // Comparison
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,

    Not,

    // Control flow
    Jump(u32),
    /// Jump if top of stack is false (pop condition).
    JumpIfFalse(u32),

    // Calls: arguments are on the stack, receiver first for instance calls.
    Call(u32, u16, u8),
    CallInstance(u32, u16, u8),
    CallHost(u32, u8),
    CallHostInstance(u32, u8),
    New(u32, u8),
    NewHost(u32, u8),

    Throw,
    /// Return top of stack.
    Return,
    ReturnVoid,
}
