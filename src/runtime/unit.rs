//! The loadable compiled unit and the handles the embedder uses to reach
//! into it.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::engine::{CodeArtifact, EngineError, LoadableUnitFactory};
use crate::host::{HostMethod, HostType};
use crate::options::CompilationOptions;

use super::error::RuntimeError;
use super::image::{HostMember, Image, MethodRef, TypeImage, TypeKind, TypeTag, IMAGE_VERSION};
use super::value::{Class, ObjectRef, Value};
use super::vm::Interpreter;

/// Where `Console.Write*` output goes. Shared so a redirect applies to a
/// unit that is already linked.
pub type SharedOutput = Arc<Mutex<Box<dyn Write + Send>>>;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// Guards applied while running compiled code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_call_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

/// A host member reference resolved at link time.
#[derive(Debug, Clone)]
pub(crate) enum Binding {
    StaticMethod { member: String, method: HostMethod },
    Method { member: String, method: HostMethod },
    Constant(Value),
    Constructor { ty: HostType, ctor: Option<HostMethod> },
}

/// A linked image: code, host bindings and per-type static storage.
pub struct Program {
    image: Image,
    pub(crate) bindings: Vec<Binding>,
    /// One entry per type; `None` until the type is first touched.
    pub(crate) statics: Mutex<Vec<Option<Vec<Value>>>>,
    pub(crate) output: SharedOutput,
    pub(crate) limits: Limits,
}

impl Program {
    /// Resolves every host reference of `image` against `host_types`,
    /// which must line up with `image.host_types`.
    pub fn link(
        image: Image,
        host_types: &[HostType],
        output: SharedOutput,
        limits: Limits,
    ) -> Result<Self, EngineError> {
        if image.version != IMAGE_VERSION {
            return Err(EngineError::Internal(format!(
                "image version {} is not {IMAGE_VERSION}",
                image.version
            )));
        }
        if host_types.len() != image.host_types.len() {
            return Err(EngineError::Internal(format!(
                "image references {} host types but {} were supplied",
                image.host_types.len(),
                host_types.len()
            )));
        }
        for (name, ty) in image.host_types.iter().zip(host_types) {
            if ty.full_name() != *name {
                return Err(EngineError::UnknownHostType(name.clone()));
            }
        }

        let mut bindings = Vec::with_capacity(image.host_refs.len());
        for r in &image.host_refs {
            let ty = usize::try_from(r.host_type)
                .ok()
                .and_then(|i| host_types.get(i))
                .ok_or_else(|| EngineError::Internal(format!("host type #{} out of range", r.host_type)))?;
            let unresolved = |member: &str| EngineError::UnresolvedHostMember {
                type_name: ty.full_name(),
                member: member.to_string(),
            };
            let binding = match &r.member {
                HostMember::StaticMethod(name) => Binding::StaticMethod {
                    member: format!("{}.{name}", ty.full_name()),
                    method: ty.static_method(name).cloned().ok_or_else(|| unresolved(name))?,
                },
                HostMember::Method(name) => Binding::Method {
                    member: format!("{}.{name}", ty.full_name()),
                    method: ty.method(name).cloned().ok_or_else(|| unresolved(name))?,
                },
                HostMember::Constant(name) => {
                    Binding::Constant(ty.constant(name).map(|c| c.value.clone()).ok_or_else(|| unresolved(name))?)
                }
                HostMember::Constructor => {
                    if !ty.is_constructible() {
                        return Err(unresolved(".ctor"));
                    }
                    Binding::Constructor {
                        ty: ty.clone(),
                        ctor: ty.constructor().cloned(),
                    }
                }
            };
            bindings.push(binding);
        }

        let statics = Mutex::new(vec![None; image.types.len()]);
        Ok(Self {
            image,
            bindings,
            statics,
            output,
            limits,
        })
    }

    pub fn image(&self) -> &Image {
        &self.image
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("name", &self.image.name)
            .field("types", &self.image.types.len())
            .field("bindings", &self.bindings.len())
            .finish_non_exhaustive()
    }
}

// ── Loaded unit ─────────────────────────────────────────────────

/// The in-process container an emitted artifact is linked into.
pub struct LoadedUnit {
    name: String,
    limits: Limits,
    output: SharedOutput,
    program: Option<Arc<Program>>,
    resources: IndexMap<String, Vec<u8>>,
}

impl LoadedUnit {
    pub fn new(name: impl Into<String>, limits: Limits) -> Self {
        let stdout: Box<dyn Write + Send> = Box::new(io::stdout());
        Self {
            name: name.into(),
            limits,
            output: Arc::new(Mutex::new(stdout)),
            program: None,
            resources: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Links an artifact into this unit. A unit accepts exactly one.
    pub fn emit(&mut self, artifact: CodeArtifact) -> Result<(), EngineError> {
        if self.program.is_some() {
            return Err(EngineError::Internal(format!("unit `{}' is already linked", self.name)));
        }
        let program = Program::link(
            artifact.image,
            &artifact.host_types,
            Arc::clone(&self.output),
            self.limits,
        )?;
        tracing::debug!(
            unit = %self.name,
            types = program.image.types.len(),
            bindings = program.bindings.len(),
            "linked unit"
        );
        self.program = Some(Arc::new(program));
        Ok(())
    }

    pub fn is_linked(&self) -> bool {
        self.program.is_some()
    }

    pub fn image(&self) -> Option<&Image> {
        self.program.as_deref().map(Program::image)
    }

    /// Top-level types in declaration order; empty until linked.
    pub fn defined_types(&self) -> Vec<TypeHandle> {
        let Some(program) = &self.program else {
            return Vec::new();
        };
        program
            .image
            .top_level()
            .map(|index| TypeHandle::new(Arc::clone(program), index))
            .collect()
    }

    /// Any type, nested or not, by full name.
    pub fn find_type(&self, full_name: &str) -> Option<TypeHandle> {
        let program = self.program.as_ref()?;
        let index = program.image.types.iter().position(|t| t.full_name == full_name)?;
        Some(TypeHandle::new(Arc::clone(program), u32::try_from(index).ok()?))
    }

    pub fn entry_point(&self) -> Option<MethodRef> {
        self.program.as_ref()?.image.entry_point
    }

    /// Runs the entry point, returning its result (`Null` for a void `Main`).
    pub fn run_main(&self) -> Result<Value, RuntimeError> {
        let program = self.program.as_ref().ok_or(RuntimeError::Unloaded)?;
        let entry = program.image.entry_point.ok_or(RuntimeError::NoEntryPoint)?;
        tracing::info!(unit = %self.name, "running entry point");
        Interpreter::new(Arc::clone(program)).invoke(entry.type_index, entry.method, None, Vec::new())
    }

    pub fn add_resource(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.resources.insert(name.into(), bytes);
    }

    pub fn resource(&self, name: &str) -> Option<&[u8]> {
        self.resources.get(name).map(Vec::as_slice)
    }

    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// Sends everything compiled code writes to `writer` from now on.
    pub fn redirect_output<W: Write + Send + 'static>(&self, writer: W) {
        *self.output.lock() = Box::new(writer);
    }
}

impl fmt::Debug for LoadedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedUnit")
            .field("name", &self.name)
            .field("program", &self.program)
            .field("resources", &self.resources.len())
            .finish_non_exhaustive()
    }
}

/// Creates plain in-process units.
#[derive(Debug, Clone, Copy, Default)]
pub struct InProcessFactory {
    limits: Limits,
}

impl InProcessFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: Limits) -> Self {
        Self { limits }
    }
}

impl LoadableUnitFactory for InProcessFactory {
    fn create(&self, name: &str, _options: &CompilationOptions) -> Result<LoadedUnit, EngineError> {
        if name.trim().is_empty() || name.contains(['/', '\\', '\0']) {
            return Err(EngineError::InvalidUnitName(name.to_string()));
        }
        Ok(LoadedUnit::new(name, self.limits))
    }
}

// ── Handles ─────────────────────────────────────────────────────

fn tag_name(program: &Program, tag: &TypeTag) -> String {
    match tag {
        TypeTag::Void => "void".into(),
        TypeTag::Bool => "bool".into(),
        TypeTag::Int => "int".into(),
        TypeTag::Float => "float".into(),
        TypeTag::String => "string".into(),
        TypeTag::Object => "object".into(),
        TypeTag::Script(i) => program
            .image
            .type_image(*i)
            .map_or_else(|| format!("#{i}"), |t| t.full_name.clone()),
        TypeTag::Host(name) => name.clone(),
    }
}

/// Checks a host-supplied argument against a parameter shape.
fn coerce(program: &Arc<Program>, tag: &TypeTag, value: Value) -> Result<Value, RuntimeError> {
    let ok = match (tag, &value) {
        (TypeTag::Float, Value::Int(i)) => {
            #[allow(clippy::cast_precision_loss)]
            let widened = Value::Float(*i as f64);
            return Ok(widened);
        }
        (TypeTag::Object, _)
        | (TypeTag::Bool, Value::Bool(_))
        | (TypeTag::Int, Value::Int(_))
        | (TypeTag::Float, Value::Float(_))
        | (TypeTag::String, Value::Str(_) | Value::Null)
        | (TypeTag::Host(_), Value::Null) => true,
        (TypeTag::Script(i), Value::Null) => program
            .image
            .type_image(*i)
            .is_some_and(|t| t.kind == TypeKind::Class),
        (TypeTag::Script(i), Value::Object(obj)) => match obj.class() {
            Class::Script { program: owner, index } => index == *i && std::ptr::eq(owner.as_ptr(), Arc::as_ptr(program)),
            Class::Host(_) => false,
        },
        (TypeTag::Host(name), Value::Object(obj)) => match obj.class() {
            Class::Host(ty) => ty.full_name() == *name,
            Class::Script { .. } => false,
        },
        _ => false,
    };
    if ok {
        Ok(value.copied())
    } else {
        Err(RuntimeError::TypeMismatch {
            expected: tag_name(program, tag),
            found: value.type_name(),
        })
    }
}

fn check_args(
    program: &Arc<Program>,
    member: &str,
    params: &[TypeTag],
    args: Vec<Value>,
) -> Result<Vec<Value>, RuntimeError> {
    if params.len() != args.len() {
        return Err(RuntimeError::Arity {
            member: member.to_string(),
            expected: params.len(),
            found: args.len(),
        });
    }
    params
        .iter()
        .zip(args)
        .map(|(tag, arg)| coerce(program, tag, arg))
        .collect()
}

/// A compiled type, as seen from the host.
#[derive(Clone)]
pub struct TypeHandle {
    program: Arc<Program>,
    index: u32,
}

impl TypeHandle {
    fn new(program: Arc<Program>, index: u32) -> Self {
        Self { program, index }
    }

    fn def(&self) -> Result<&TypeImage, RuntimeError> {
        self.program
            .image
            .type_image(self.index)
            .ok_or_else(|| RuntimeError::invalid(format!("no type #{}", self.index)))
    }

    pub fn name(&self) -> &str {
        self.def().map_or("", |t| t.name.as_str())
    }

    pub fn full_name(&self) -> &str {
        self.def().map_or("", |t| t.full_name.as_str())
    }

    pub fn namespace(&self) -> Option<&str> {
        self.def().ok()?.namespace.as_deref()
    }

    pub fn is_public(&self) -> bool {
        self.def().is_ok_and(|t| t.public)
    }

    pub fn kind(&self) -> TypeKind {
        self.def().map_or(TypeKind::Class, |t| t.kind)
    }

    pub fn nested_types(&self) -> Vec<TypeHandle> {
        self.def()
            .map(|t| {
                t.nested
                    .iter()
                    .map(|&i| TypeHandle::new(Arc::clone(&self.program), i))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Public methods, static and instance, excluding constructors.
    pub fn method_names(&self) -> Vec<&str> {
        self.def()
            .map(|t| {
                t.methods
                    .iter()
                    .filter(|m| m.public && !m.is_special())
                    .map(|m| m.name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Public instance fields.
    pub fn field_names(&self) -> Vec<&str> {
        self.def()
            .map(|t| t.fields.iter().filter(|f| f.public).map(|f| f.name.as_str()).collect())
            .unwrap_or_default()
    }

    /// Creates an instance through the public constructor.
    pub fn instantiate(&self, args: Vec<Value>) -> Result<Instance, RuntimeError> {
        let def = self.def()?;
        let member = format!("{}..ctor", def.full_name);
        let args = match def.ctor.and_then(|i| def.method(i)) {
            Some(ctor) if ctor.public => {
                let params: Vec<TypeTag> = ctor.params.iter().map(|p| p.ty.clone()).collect();
                check_args(&self.program, &member, &params, args)?
            }
            _ => {
                return Err(RuntimeError::MissingMember {
                    type_name: def.full_name.clone(),
                    member: ".ctor".into(),
                })
            }
        };
        let obj = Interpreter::new(Arc::clone(&self.program)).construct(self.index, args)?;
        Ok(Instance {
            program: Arc::clone(&self.program),
            obj,
        })
    }

    /// Calls a public static method by name.
    pub fn invoke_static(&self, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let def = self.def()?;
        let (index, method) = def
            .find_method(name)
            .filter(|(_, m)| m.public && m.is_static)
            .ok_or_else(|| RuntimeError::MissingMember {
                type_name: def.full_name.clone(),
                member: name.to_string(),
            })?;
        let params: Vec<TypeTag> = method.params.iter().map(|p| p.ty.clone()).collect();
        let args = check_args(&self.program, &format!("{}.{name}", def.full_name), &params, args)?;
        Interpreter::new(Arc::clone(&self.program)).invoke(self.index, index, None, args)
    }
}

impl fmt::Debug for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHandle({})", self.full_name())
    }
}

/// An object of a compiled type held by the host.
#[derive(Clone)]
pub struct Instance {
    program: Arc<Program>,
    obj: ObjectRef,
}

impl Instance {
    fn type_index(&self) -> Result<u32, RuntimeError> {
        match self.obj.class() {
            Class::Script { index, .. } => Ok(index),
            Class::Host(ty) => Err(RuntimeError::invalid(format!("`{}' is a host object", ty.full_name()))),
        }
    }

    pub fn type_name(&self) -> String {
        self.obj.class_name()
    }

    pub fn object(&self) -> &ObjectRef {
        &self.obj
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.obj.clone())
    }

    /// Calls a public instance method by name.
    pub fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let type_index = self.type_index()?;
        let def = self
            .program
            .image
            .type_image(type_index)
            .ok_or_else(|| RuntimeError::invalid(format!("no type #{type_index}")))?;
        let (index, method) = def
            .find_method(name)
            .filter(|(_, m)| m.public && !m.is_static)
            .ok_or_else(|| RuntimeError::MissingMember {
                type_name: def.full_name.clone(),
                member: name.to_string(),
            })?;
        let params: Vec<TypeTag> = method.params.iter().map(|p| p.ty.clone()).collect();
        let args = check_args(&self.program, &format!("{}.{name}", def.full_name), &params, args)?;
        Interpreter::new(Arc::clone(&self.program)).invoke(type_index, index, Some(self.as_value()), args)
    }

    /// Reads a public instance field.
    pub fn field(&self, name: &str) -> Result<Value, RuntimeError> {
        let type_index = self.type_index()?;
        let missing = || RuntimeError::MissingMember {
            type_name: self.type_name(),
            member: name.to_string(),
        };
        let slot = self
            .program
            .image
            .type_image(type_index)
            .and_then(|t| t.field_slot(name))
            .filter(|(_, f)| f.public)
            .map(|(slot, _)| slot)
            .ok_or_else(missing)?;
        self.obj.lock().field(slot).cloned().ok_or_else(missing)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instance({})", self.type_name())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::host::system;
    use crate::imports::ImportSet;
    use crate::script::symbols::{define, LineIndex, ParsedUnit};
    use crate::script::{compiler, lexer, parser, typeck};
    use crate::source::SourceId;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().clone()).unwrap()
        }
    }

    fn load(src: &str) -> LoadedUnit {
        let syntax = parser::parse(lexer::lex(src, &[]).unwrap()).unwrap();
        let mut imports = ImportSet::new();
        imports.import_module(&system::module());
        let (mut symbols, errors) = define(
            vec![ParsedUnit {
                source: SourceId(1),
                name: "t.hs".into(),
                syntax: Some(syntax),
                lines: LineIndex::new(src),
            }],
            &imports,
        );
        assert!(errors.is_empty(), "{errors:?}");
        let errors = typeck::resolve(&mut symbols);
        assert!(errors.is_empty(), "{errors:?}");
        if let Ok(entry) = typeck::find_entry_point(&symbols, "t.hs", None) {
            symbols.entry_point = Some(entry);
        }
        let artifact = compiler::compile(&symbols, "t", false).unwrap();
        let mut unit = LoadedUnit::new("t", Limits::default());
        unit.emit(artifact).unwrap();
        unit
    }

    fn ty(unit: &LoadedUnit, name: &str) -> TypeHandle {
        unit.find_type(name).unwrap()
    }

    #[test]
    fn static_calls_compute() {
        let unit = load(
            "public class M { public static fn Fact(n: int) -> int { if n <= 1 { return 1; } return n * M.Fact(n - 1); } }",
        );
        let v = ty(&unit, "M").invoke_static("Fact", vec![Value::Int(10)]).unwrap();
        assert_eq!(v, Value::Int(3_628_800));
    }

    #[test]
    fn instances_keep_state() {
        let unit = load(
            "public class Counter {
                public let count: int;
                public new(start: int) { this.count = start; }
                public fn Bump() -> int { this.count = this.count + 1; return this.count; }
            }",
        );
        let counter = ty(&unit, "Counter").instantiate(vec![Value::Int(5)]).unwrap();
        counter.call("Bump", vec![]).unwrap();
        assert_eq!(counter.call("Bump", vec![]).unwrap(), Value::Int(7));
        assert_eq!(counter.field("count").unwrap(), Value::Int(7));
        assert_eq!(counter.type_name(), "Counter");
    }

    #[test]
    fn private_members_are_hidden() {
        let unit = load("public class P { let secret: int = 3; fn Hidden() { } public fn Shown() { } }");
        let p = ty(&unit, "P").instantiate(vec![]).unwrap();
        assert!(matches!(p.call("Hidden", vec![]), Err(RuntimeError::MissingMember { .. })));
        assert!(matches!(p.field("secret"), Err(RuntimeError::MissingMember { .. })));
        assert_eq!(ty(&unit, "P").method_names(), vec!["Shown"]);
    }

    #[test]
    fn structs_copy_on_assignment() {
        let unit = load(
            "public struct Pt { public let x: int; }
             public class T {
                public static fn Run() -> int {
                    let a = new Pt { x = 1 };
                    let b = a;
                    b.x = 9;
                    return a.x;
                }
             }",
        );
        assert_eq!(ty(&unit, "T").invoke_static("Run", vec![]).unwrap(), Value::Int(1));
    }

    #[test]
    fn static_initializer_runs_once() {
        let unit = load(
            "public class S {
                static let n: int = 40;
                public static fn Next() -> int { S.n = S.n + 1; return S.n; }
            }",
        );
        let s = ty(&unit, "S");
        assert_eq!(s.invoke_static("Next", vec![]).unwrap(), Value::Int(41));
        assert_eq!(s.invoke_static("Next", vec![]).unwrap(), Value::Int(42));
    }

    #[test]
    fn integer_division_by_zero_faults() {
        let unit = load("public class D { public static fn Div(a: int, b: int) -> int { return a / b; } }");
        let d = ty(&unit, "D");
        assert_eq!(d.invoke_static("Div", vec![Value::Int(7), Value::Int(2)]).unwrap(), Value::Int(3));
        assert_eq!(
            d.invoke_static("Div", vec![Value::Int(1), Value::Int(0)]),
            Err(RuntimeError::DivisionByZero)
        );
    }

    #[test]
    fn runaway_recursion_is_bounded() {
        let unit = load("public class R { public static fn Down(n: int) -> int { return R.Down(n + 1); } }");
        assert_eq!(
            ty(&unit, "R").invoke_static("Down", vec![Value::Int(0)]),
            Err(RuntimeError::StackOverflow(DEFAULT_MAX_CALL_DEPTH))
        );
    }

    #[test]
    fn thrown_exceptions_carry_their_message() {
        let unit = load(
            "using System;
             public class E { public static fn Fail() { throw new Exception(\"boom\"); } }",
        );
        assert_eq!(
            ty(&unit, "E").invoke_static("Fail", vec![]),
            Err(RuntimeError::Thrown {
                type_name: "System.Exception".into(),
                message: "boom".into(),
            })
        );
    }

    #[test]
    fn console_output_is_redirectable() {
        let unit = load(
            "using System;
             class Pet { fn ToString() -> string { return \"a pet\"; } }
             public class Program {
                public static fn Main() {
                    Console.WriteLine(\"n=\" + 3 + \", \" + true);
                    Console.WriteLine(new Pet());
                    Console.Write(Math.Max(1.5, 2));
                }
             }",
        );
        let capture = Capture::default();
        unit.redirect_output(capture.clone());
        assert_eq!(unit.run_main().unwrap(), Value::Null);
        assert_eq!(capture.text(), "n=3, true\na pet\n2");
    }

    #[test]
    fn arguments_are_checked() {
        let unit = load("public class A { public static fn Half(x: float) -> float { return x / 2.0; } }");
        let a = ty(&unit, "A");
        assert_eq!(a.invoke_static("Half", vec![Value::Int(3)]).unwrap(), Value::Float(1.5));
        assert!(matches!(
            a.invoke_static("Half", vec![Value::str("x")]),
            Err(RuntimeError::TypeMismatch { .. })
        ));
        assert!(matches!(a.invoke_static("Half", vec![]), Err(RuntimeError::Arity { .. })));
    }

    #[test]
    fn nested_types_are_reachable() {
        let unit = load("namespace N { public class Outer { public class Inner { } } }");
        let types = unit.defined_types();
        assert_eq!(types.len(), 1);
        assert_eq!(types[0].full_name(), "N.Outer");
        assert_eq!(types[0].namespace(), Some("N"));
        let nested = types[0].nested_types();
        assert_eq!(nested[0].full_name(), "N.Outer.Inner");
    }

    #[test]
    fn factory_rejects_bad_names() {
        let factory = InProcessFactory::new();
        let opts = CompilationOptions::default();
        assert!(factory.create("demo", &opts).is_ok());
        assert!(matches!(factory.create("a/b", &opts), Err(EngineError::InvalidUnitName(_))));
    }

    #[test]
    fn a_unit_links_once() {
        let mut unit = load("public class A { }");
        let artifact = CodeArtifact {
            image: unit.image().unwrap().clone(),
            host_types: Vec::new(),
        };
        assert!(unit.emit(artifact).is_err());
    }
}
