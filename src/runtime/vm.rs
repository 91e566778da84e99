//! Stack-based bytecode interpreter.
//!
//! One [`Interpreter`] runs a call tree on the calling thread. Script
//! methods recurse through [`Interpreter::invoke`]; host members are
//! entered through a [`HostCall`] that can call back into the
//! interpreter for `ToString` and output.

use std::io::Write as _;
use std::sync::Arc;

use crate::host::{HostMethod, HostType, HostTypeKind, TypeSig};

use super::error::RuntimeError;
use super::image::{MethodImage, Op, TypeImage, TypeKind, TypeTag};
use super::unit::{Binding, Program};
use super::value::{Class, Object, ObjectRef, Value};

/// Conversion from the `u32`/`u16` operands to indices. Out-of-range
/// values map past any table so lookups fail instead of wrapping.
fn idx(i: impl TryInto<usize>) -> usize {
    i.try_into().unwrap_or(usize::MAX)
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, RuntimeError> {
    stack.pop().ok_or_else(|| RuntimeError::invalid("stack underflow"))
}

/// Pops `argc` values, first argument first.
fn pop_args(stack: &mut Vec<Value>, argc: u8) -> Result<Vec<Value>, RuntimeError> {
    let argc = usize::from(argc);
    let start = stack
        .len()
        .checked_sub(argc)
        .ok_or_else(|| RuntimeError::invalid("stack underflow"))?;
    Ok(stack.split_off(start))
}

/// Default value of a field of the given shape.
pub(crate) fn default_for(tag: &TypeTag) -> Value {
    match tag {
        TypeTag::Bool => Value::Bool(false),
        TypeTag::Int => Value::Int(0),
        TypeTag::Float => Value::Float(0.0),
        TypeTag::Void | TypeTag::String | TypeTag::Object | TypeTag::Script(_) | TypeTag::Host(_) => Value::Null,
    }
}

fn default_for_sig(sig: &TypeSig) -> Value {
    match sig {
        TypeSig::Bool => Value::Bool(false),
        TypeSig::Int => Value::Int(0),
        TypeSig::Float => Value::Float(0.0),
        TypeSig::Void | TypeSig::String | TypeSig::Object | TypeSig::Named(_) => Value::Null,
    }
}

fn mismatch(expected: &str, found: &Value) -> RuntimeError {
    RuntimeError::TypeMismatch {
        expected: expected.to_string(),
        found: found.type_name(),
    }
}

fn as_bool(value: &Value) -> Result<bool, RuntimeError> {
    value.as_bool().ok_or_else(|| mismatch("bool", value))
}

/// Formats a value that has no `ToString` of its own.
fn plain_display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => format!("{f}"),
        Value::Str(s) => s.to_string(),
        Value::Object(obj) => obj.class_name(),
    }
}

pub(crate) struct Interpreter {
    program: Arc<Program>,
    depth: usize,
}

impl Interpreter {
    pub(crate) fn new(program: Arc<Program>) -> Self {
        Self { program, depth: 0 }
    }

    fn type_image(&self, index: u32) -> Result<&TypeImage, RuntimeError> {
        self.program
            .image()
            .type_image(index)
            .ok_or_else(|| RuntimeError::invalid(format!("no type #{index}")))
    }

    // ── Objects and statics ─────────────────────────────────────

    /// Allocates an instance of a script type with default field values.
    /// No constructor runs.
    pub(crate) fn allocate(&self, type_index: u32) -> Result<ObjectRef, RuntimeError> {
        let ty = self.type_image(type_index)?;
        let fields = ty.fields.iter().map(|f| default_for(&f.ty)).collect();
        let class = Class::Script {
            program: Arc::downgrade(&self.program),
            index: type_index,
        };
        Ok(ObjectRef::new(Object::new(class, ty.kind == TypeKind::Struct, fields)))
    }

    /// Allocates and constructs an instance of a script type.
    pub(crate) fn construct(&mut self, type_index: u32, args: Vec<Value>) -> Result<ObjectRef, RuntimeError> {
        self.ensure_statics(type_index)?;
        let obj = self.allocate(type_index)?;
        if let Some(ctor) = self.type_image(type_index)?.ctor {
            self.invoke(type_index, ctor, Some(Value::Object(obj.clone())), args)?;
        } else if !args.is_empty() {
            return Err(RuntimeError::Arity {
                member: MethodImage::CTOR.into(),
                expected: 0,
                found: args.len(),
            });
        }
        Ok(obj)
    }

    fn construct_host(
        &mut self,
        ty: &HostType,
        ctor: Option<&HostMethod>,
        args: Vec<Value>,
    ) -> Result<ObjectRef, RuntimeError> {
        let fields = ty.fields().iter().map(|f| default_for_sig(&f.ty)).collect();
        let is_struct = ty.kind() == HostTypeKind::Struct;
        let obj = ObjectRef::new(Object::new(Class::Host(ty.clone()), is_struct, fields));
        match ctor {
            Some(ctor) => {
                let member = format!("{}..ctor", ty.full_name());
                self.call_host(ctor, &member, Some(Value::Object(obj.clone())), args)?;
            }
            None if !args.is_empty() => {
                return Err(RuntimeError::Arity {
                    member: ty.full_name(),
                    expected: 0,
                    found: args.len(),
                })
            }
            None => {}
        }
        Ok(obj)
    }

    /// Runs the static initializer the first time a type is touched.
    /// Statics hold their defaults while it runs, so recursive access
    /// during initialization sees them instead of re-entering.
    fn ensure_statics(&mut self, type_index: u32) -> Result<(), RuntimeError> {
        let ty = self.type_image(type_index)?;
        let cctor = ty.static_init;
        let fresh = {
            let mut statics = self.program.statics.lock();
            let slot = statics
                .get_mut(idx(type_index))
                .ok_or_else(|| RuntimeError::invalid(format!("no statics for type #{type_index}")))?;
            if slot.is_some() {
                false
            } else {
                *slot = Some(ty.static_fields.iter().map(|f| default_for(&f.ty)).collect());
                true
            }
        };
        if fresh {
            if let Some(cctor) = cctor {
                tracing::trace!(type_index, "running static initializer");
                self.invoke(type_index, cctor, None, Vec::new())?;
            }
        }
        Ok(())
    }

    fn load_static(&mut self, type_index: u32, slot: u16) -> Result<Value, RuntimeError> {
        self.ensure_statics(type_index)?;
        let statics = self.program.statics.lock();
        statics
            .get(idx(type_index))
            .and_then(Option::as_ref)
            .and_then(|fields| fields.get(usize::from(slot)))
            .cloned()
            .ok_or_else(|| RuntimeError::invalid(format!("no static slot {slot} on type #{type_index}")))
    }

    fn store_static(&mut self, type_index: u32, slot: u16, value: Value) -> Result<(), RuntimeError> {
        self.ensure_statics(type_index)?;
        let mut statics = self.program.statics.lock();
        let dest = statics
            .get_mut(idx(type_index))
            .and_then(Option::as_mut)
            .and_then(|fields| fields.get_mut(usize::from(slot)))
            .ok_or_else(|| RuntimeError::invalid(format!("no static slot {slot} on type #{type_index}")))?;
        *dest = value;
        Ok(())
    }

    // ── Calls ───────────────────────────────────────────────────

    /// Runs a script method. `this` is required for instance methods and
    /// occupies local slot 0.
    pub(crate) fn invoke(
        &mut self,
        type_index: u32,
        method_index: u16,
        this: Option<Value>,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let limit = self.program.limits.max_call_depth;
        if self.depth >= limit {
            return Err(RuntimeError::StackOverflow(limit));
        }

        let program = Arc::clone(&self.program);
        let ty = program
            .image()
            .type_image(type_index)
            .ok_or_else(|| RuntimeError::invalid(format!("no type #{type_index}")))?;
        let method = ty
            .method(method_index)
            .ok_or_else(|| RuntimeError::invalid(format!("no method #{method_index} on `{}'", ty.full_name)))?;

        if ty.static_init != Some(method_index) {
            self.ensure_statics(type_index)?;
        }

        let mut locals = Vec::with_capacity(usize::from(method.locals));
        if !method.is_static {
            match this {
                Some(Value::Null) | None => return Err(RuntimeError::NullReference),
                Some(this) => locals.push(this),
            }
        }
        locals.extend(args.iter().map(Value::copied));
        if locals.len() < usize::from(method.locals) {
            locals.resize(usize::from(method.locals), Value::Null);
        }

        self.depth += 1;
        let result = self.run(method, locals);
        self.depth -= 1;
        result
    }

    #[allow(clippy::cast_precision_loss)]
    fn call_host(
        &mut self,
        method: &HostMethod,
        member: &str,
        this: Option<Value>,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        if args.len() != method.params.len() {
            return Err(RuntimeError::Arity {
                member: member.to_string(),
                expected: method.params.len(),
                found: args.len(),
            });
        }
        let args = args
            .into_iter()
            .zip(&method.params)
            .map(|(arg, sig)| match (arg, sig) {
                (Value::Int(i), TypeSig::Float) => Value::Float(i as f64),
                (arg, _) => arg.copied(),
            })
            .collect();
        let mut call = HostCall {
            interp: self,
            member,
            this,
            args,
        };
        method.invoke(&mut call)
    }

    fn binding(&self, index: u32) -> Result<&Binding, RuntimeError> {
        self.program
            .bindings
            .get(idx(index))
            .ok_or_else(|| RuntimeError::invalid(format!("no host binding #{index}")))
    }

    // ── Text ────────────────────────────────────────────────────

    /// String form of a value, calling a `ToString` member when the
    /// object's type declares one.
    pub(crate) fn display(&mut self, value: &Value) -> Result<String, RuntimeError> {
        let Value::Object(obj) = value else {
            return Ok(plain_display(value));
        };
        match obj.class() {
            Class::Script { index, .. } => {
                let found = self
                    .type_image(index)?
                    .find_method("ToString")
                    .filter(|(_, m)| !m.is_static && m.params.is_empty() && m.ret == TypeTag::String)
                    .map(|(i, _)| i);
                if let Some(method) = found {
                    let text = self.invoke(index, method, Some(value.clone()), Vec::new())?;
                    return Ok(plain_display(&text));
                }
            }
            Class::Host(ty) => {
                if let Some(method) = ty.method("ToString").filter(|m| m.params.is_empty()) {
                    let member = format!("{}.ToString", ty.full_name());
                    let text = self.call_host(method, &member, Some(value.clone()), Vec::new())?;
                    return Ok(plain_display(&text));
                }
            }
        }
        Ok(obj.class_name())
    }

    fn write(&self, text: &str) -> Result<(), RuntimeError> {
        let mut out = self.program.output.lock();
        out.write_all(text.as_bytes())
            .and_then(|()| out.flush())
            .map_err(|e| RuntimeError::Output(e.to_string()))
    }

    fn thrown(&mut self, value: Value) -> RuntimeError {
        let Value::Object(obj) = &value else {
            return RuntimeError::NullReference;
        };
        let type_name = obj.class_name();
        let slot = match obj.class() {
            Class::Host(ty) => ty.field_slot("Message").map(|(slot, _)| slot),
            Class::Script { index, .. } => self
                .type_image(index)
                .ok()
                .and_then(|t| t.field_slot("Message"))
                .map(|(slot, _)| slot),
        };
        let message = slot.and_then(|slot| obj.lock().field(slot).cloned()).unwrap_or_default();
        let message = match self.display(&message) {
            Ok(text) => text,
            Err(e) => return e,
        };
        RuntimeError::Thrown { type_name, message }
    }

    // ── Execution ───────────────────────────────────────────────

    fn run(&mut self, method: &MethodImage, mut locals: Vec<Value>) -> Result<Value, RuntimeError> {
        let program = Arc::clone(&self.program);
        let consts = &program.image().constants;
        let ops = &method.code;
        let mut stack: Vec<Value> = Vec::with_capacity(16);
        let mut ip: usize = 0;

        while let Some(op) = ops.get(ip) {
            ip += 1;
            match *op {
                Op::PushConst(i) => {
                    let c = consts
                        .get(idx(i))
                        .ok_or_else(|| RuntimeError::invalid(format!("no constant #{i}")))?;
                    stack.push(Value::from(c));
                }
                Op::PushNull => stack.push(Value::Null),
                Op::LoadLocal(slot) => {
                    let v = locals
                        .get(usize::from(slot))
                        .cloned()
                        .ok_or_else(|| RuntimeError::invalid(format!("no local {slot}")))?;
                    stack.push(v);
                }
                Op::StoreLocal(slot) => {
                    let v = pop(&mut stack)?.copied();
                    let dest = locals
                        .get_mut(usize::from(slot))
                        .ok_or_else(|| RuntimeError::invalid(format!("no local {slot}")))?;
                    *dest = v;
                }
                Op::Pop => {
                    pop(&mut stack)?;
                }
                Op::Dup => {
                    let top = stack
                        .last()
                        .cloned()
                        .ok_or_else(|| RuntimeError::invalid("stack underflow"))?;
                    stack.push(top);
                }

                Op::LoadField(slot) => {
                    let target = pop(&mut stack)?;
                    let obj = target.as_object().ok_or(RuntimeError::NullReference)?;
                    let v = obj
                        .lock()
                        .field(usize::from(slot))
                        .cloned()
                        .ok_or_else(|| RuntimeError::invalid(format!("no field slot {slot}")))?;
                    stack.push(v);
                }
                Op::StoreField(slot) => {
                    let v = pop(&mut stack)?.copied();
                    let target = pop(&mut stack)?;
                    let obj = target.as_object().ok_or(RuntimeError::NullReference)?;
                    if !obj.lock().set_field(usize::from(slot), v) {
                        return Err(RuntimeError::invalid(format!("no field slot {slot}")));
                    }
                }
                Op::LoadStatic(ty, slot) => {
                    let v = self.load_static(ty, slot)?;
                    stack.push(v);
                }
                Op::StoreStatic(ty, slot) => {
                    let v = pop(&mut stack)?.copied();
                    self.store_static(ty, slot, v)?;
                }
                Op::LoadHostConst(i) => match self.binding(i)? {
                    Binding::Constant(v) => stack.push(v.clone()),
                    other => return Err(RuntimeError::invalid(format!("binding #{i} is {other:?}, not a constant"))),
                },

                Op::Add => arith(&mut stack, i64::wrapping_add, |a, b| a + b)?,
                Op::Sub => arith(&mut stack, i64::wrapping_sub, |a, b| a - b)?,
                Op::Mul => arith(&mut stack, i64::wrapping_mul, |a, b| a * b)?,
                Op::Div => divide(&mut stack, i64::wrapping_div, |a, b| a / b)?,
                Op::Mod => divide(&mut stack, i64::wrapping_rem, |a, b| a % b)?,
                Op::Neg => {
                    let v = pop(&mut stack)?;
                    stack.push(match v {
                        Value::Int(i) => Value::Int(i.wrapping_neg()),
                        Value::Float(f) => Value::Float(-f),
                        other => return Err(mismatch("number", &other)),
                    });
                }
                Op::Concat => {
                    let right = pop(&mut stack)?;
                    let left = pop(&mut stack)?;
                    let text = self.display(&left)? + &self.display(&right)?;
                    stack.push(Value::from(text));
                }
                Op::IntToFloat => {
                    let v = pop(&mut stack)?;
                    let f = v.as_float().ok_or_else(|| mismatch("int", &v))?;
                    stack.push(Value::Float(f));
                }

                Op::Lt => compare(&mut stack, std::cmp::Ordering::is_lt)?,
                Op::Gt => compare(&mut stack, std::cmp::Ordering::is_gt)?,
                Op::Le => compare(&mut stack, std::cmp::Ordering::is_le)?,
                Op::Ge => compare(&mut stack, std::cmp::Ordering::is_ge)?,
                Op::Eq => {
                    let b = pop(&mut stack)?;
                    let a = pop(&mut stack)?;
                    stack.push(Value::Bool(a.loosely_equals(&b)));
                }
                Op::Ne => {
                    let b = pop(&mut stack)?;
                    let a = pop(&mut stack)?;
                    stack.push(Value::Bool(!a.loosely_equals(&b)));
                }
                Op::Not => {
                    let v = pop(&mut stack)?;
                    stack.push(Value::Bool(!as_bool(&v)?));
                }

                Op::Jump(target) => ip = idx(target),
                Op::JumpIfFalse(target) => {
                    if !as_bool(&pop(&mut stack)?)? {
                        ip = idx(target);
                    }
                }

                Op::Call(ty, m, argc) => {
                    let args = pop_args(&mut stack, argc)?;
                    let returns = self.returns_value(ty, m)?;
                    let v = self.invoke(ty, m, None, args)?;
                    if returns {
                        stack.push(v);
                    }
                }
                Op::CallInstance(ty, m, argc) => {
                    let args = pop_args(&mut stack, argc)?;
                    let receiver = pop(&mut stack)?;
                    let returns = self.returns_value(ty, m)?;
                    let v = self.invoke(ty, m, Some(receiver), args)?;
                    if returns {
                        stack.push(v);
                    }
                }
                Op::CallHost(i, argc) => {
                    let args = pop_args(&mut stack, argc)?;
                    let (method, member) = match self.binding(i)? {
                        Binding::StaticMethod { method, member } => (method.clone(), member.clone()),
                        other => return Err(RuntimeError::invalid(format!("binding #{i} is {other:?}, not a static method"))),
                    };
                    let v = self.call_host(&method, &member, None, args)?;
                    if method.ret != TypeSig::Void {
                        stack.push(v);
                    }
                }
                Op::CallHostInstance(i, argc) => {
                    let args = pop_args(&mut stack, argc)?;
                    let receiver = pop(&mut stack)?;
                    if receiver.is_null() {
                        return Err(RuntimeError::NullReference);
                    }
                    let (method, member) = match self.binding(i)? {
                        Binding::Method { method, member } => (method.clone(), member.clone()),
                        other => return Err(RuntimeError::invalid(format!("binding #{i} is {other:?}, not a method"))),
                    };
                    let v = self.call_host(&method, &member, Some(receiver), args)?;
                    if method.ret != TypeSig::Void {
                        stack.push(v);
                    }
                }
                Op::New(ty, argc) => {
                    let args = pop_args(&mut stack, argc)?;
                    let obj = self.construct(ty, args)?;
                    stack.push(Value::Object(obj));
                }
                Op::NewHost(i, argc) => {
                    let args = pop_args(&mut stack, argc)?;
                    let (ty, ctor) = match self.binding(i)? {
                        Binding::Constructor { ty, ctor } => (ty.clone(), ctor.clone()),
                        other => return Err(RuntimeError::invalid(format!("binding #{i} is {other:?}, not a constructor"))),
                    };
                    let obj = self.construct_host(&ty, ctor.as_ref(), args)?;
                    stack.push(Value::Object(obj));
                }

                Op::Throw => {
                    let v = pop(&mut stack)?;
                    return Err(self.thrown(v));
                }
                Op::Return => return pop(&mut stack),
                Op::ReturnVoid => return Ok(Value::Null),
            }
        }
        Ok(Value::Null)
    }

    fn returns_value(&self, type_index: u32, method: u16) -> Result<bool, RuntimeError> {
        let ty = self.type_image(type_index)?;
        let m = ty
            .method(method)
            .ok_or_else(|| RuntimeError::invalid(format!("no method #{method} on `{}'", ty.full_name)))?;
        Ok(m.ret != TypeTag::Void)
    }
}

fn arith(
    stack: &mut Vec<Value>,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> Result<(), RuntimeError> {
    let b = pop(stack)?;
    let a = pop(stack)?;
    let result = match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => Value::Int(int_op(*x, *y)),
        _ => match (a.as_float(), b.as_float()) {
            (Some(x), Some(y)) => Value::Float(float_op(x, y)),
            (None, _) => return Err(mismatch("number", &a)),
            (_, None) => return Err(mismatch("number", &b)),
        },
    };
    stack.push(result);
    Ok(())
}

fn divide(
    stack: &mut Vec<Value>,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
) -> Result<(), RuntimeError> {
    if let [.., Value::Int(_), Value::Int(0)] = stack.as_slice() {
        return Err(RuntimeError::DivisionByZero);
    }
    arith(stack, int_op, float_op)
}

fn compare(stack: &mut Vec<Value>, test: fn(std::cmp::Ordering) -> bool) -> Result<(), RuntimeError> {
    let b = pop(stack)?;
    let a = pop(stack)?;
    let ordering = match (&a, &b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        _ => match (a.as_float(), b.as_float()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            (None, _) => return Err(mismatch("number", &a)),
            (_, None) => return Err(mismatch("number", &b)),
        },
    };
    // NaN compares false both ways.
    stack.push(Value::Bool(ordering.is_some_and(test)));
    Ok(())
}

// ── Host bridge ─────────────────────────────────────────────────

/// The view a host member gets of its invocation.
pub struct HostCall<'a> {
    interp: &'a mut Interpreter,
    member: &'a str,
    this: Option<Value>,
    args: Vec<Value>,
}

impl HostCall<'_> {
    /// `Type.Member` being invoked, for error messages.
    pub fn member(&self) -> &str {
        self.member
    }

    pub fn this(&self) -> Option<&Value> {
        self.this.as_ref()
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn arg(&self, i: usize) -> Result<&Value, RuntimeError> {
        self.args.get(i).ok_or_else(|| RuntimeError::Arity {
            member: self.member.to_string(),
            expected: i + 1,
            found: self.args.len(),
        })
    }

    pub fn str_arg(&self, i: usize) -> Result<&str, RuntimeError> {
        match self.arg(i)? {
            Value::Str(s) => Ok(s),
            Value::Null => Err(RuntimeError::NullReference),
            other => Err(mismatch("string", other)),
        }
    }

    pub fn int_arg(&self, i: usize) -> Result<i64, RuntimeError> {
        let v = self.arg(i)?;
        v.as_int().ok_or_else(|| mismatch("int", v))
    }

    pub fn float_arg(&self, i: usize) -> Result<f64, RuntimeError> {
        let v = self.arg(i)?;
        v.as_float().ok_or_else(|| mismatch("float", v))
    }

    fn this_object(&self) -> Result<&ObjectRef, RuntimeError> {
        self.this
            .as_ref()
            .and_then(Value::as_object)
            .ok_or(RuntimeError::NullReference)
    }

    fn this_slot(&self, name: &str) -> Result<(ObjectRef, usize), RuntimeError> {
        let obj = self.this_object()?;
        let slot = match obj.class() {
            Class::Host(ty) => ty.field_slot(name).map(|(slot, _)| slot),
            Class::Script { index, .. } => self
                .interp
                .type_image(index)?
                .field_slot(name)
                .map(|(slot, _)| slot),
        };
        let slot = slot.ok_or_else(|| RuntimeError::MissingMember {
            type_name: obj.class_name(),
            member: name.to_string(),
        })?;
        Ok((obj.clone(), slot))
    }

    pub fn this_field(&self, name: &str) -> Result<Value, RuntimeError> {
        let (obj, slot) = self.this_slot(name)?;
        let value = obj.lock().field(slot).cloned().unwrap_or_default();
        Ok(value)
    }

    pub fn set_this_field(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        let (obj, slot) = self.this_slot(name)?;
        obj.lock().set_field(slot, value.copied());
        Ok(())
    }

    /// String form of `value` as `Console.WriteLine` would print it.
    pub fn display(&mut self, value: &Value) -> Result<String, RuntimeError> {
        self.interp.display(value)
    }

    /// Writes to the unit's output sink.
    pub fn write(&mut self, text: &str) -> Result<(), RuntimeError> {
        self.interp.write(text)
    }
}
