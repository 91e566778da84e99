use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};

use crate::host::HostType;

use super::image::Constant;
use super::unit::Program;

/// Runtime value on the interpreter stack and in fields.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Object(ObjectRef),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(s.as_ref()))
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".into(),
            Value::Bool(_) => "bool".into(),
            Value::Int(_) => "int".into(),
            Value::Float(_) => "float".into(),
            Value::Str(_) => "string".into(),
            Value::Object(obj) => obj.class_name(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Ints widen to floats.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Struct objects are duplicated; everything else is shared.
    pub(crate) fn copied(&self) -> Value {
        match self {
            Value::Object(obj) if obj.is_struct() => Value::Object(obj.deep_copy()),
            other => other.clone(),
        }
    }

    /// Equality as seen by `==`: numeric widening, string contents,
    /// object identity.
    pub(crate) fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                self.as_float() == other.as_float()
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.loosely_equals(other)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::str(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(Arc::from(v))
    }
}

impl From<&Constant> for Value {
    fn from(c: &Constant) -> Self {
        match c {
            Constant::Int(i) => Value::Int(*i),
            Constant::Float(f) => Value::Float(*f),
            Constant::Bool(b) => Value::Bool(*b),
            Constant::Str(s) => Value::str(s),
        }
    }
}

// ── Objects ─────────────────────────────────────────────────────

/// The runtime class of an object.
#[derive(Clone)]
pub enum Class {
    /// A compiled type. Weak so that objects outliving their unit do not
    /// keep it alive.
    Script { program: Weak<Program>, index: u32 },
    Host(HostType),
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Class::Script { index, .. } => write!(f, "Script({index})"),
            Class::Host(ty) => write!(f, "Host({})", ty.full_name()),
        }
    }
}

#[derive(Debug)]
pub struct Object {
    pub(crate) class: Class,
    pub(crate) is_struct: bool,
    pub(crate) fields: Vec<Value>,
}

impl Object {
    pub(crate) fn new(class: Class, is_struct: bool, fields: Vec<Value>) -> Self {
        Self {
            class,
            is_struct,
            fields,
        }
    }

    pub fn class(&self) -> &Class {
        &self.class
    }

    pub fn field(&self, slot: usize) -> Option<&Value> {
        self.fields.get(slot)
    }

    pub fn set_field(&mut self, slot: usize, value: Value) -> bool {
        match self.fields.get_mut(slot) {
            Some(dest) => {
                *dest = value;
                true
            }
            None => false,
        }
    }
}

/// Shared handle to a heap object.
#[derive(Clone)]
pub struct ObjectRef(Arc<Mutex<Object>>);

impl ObjectRef {
    pub(crate) fn new(object: Object) -> Self {
        Self(Arc::new(Mutex::new(object)))
    }

    pub fn lock(&self) -> MutexGuard<'_, Object> {
        self.0.lock()
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_struct(&self) -> bool {
        self.0.lock().is_struct
    }

    pub fn class(&self) -> Class {
        self.0.lock().class.clone()
    }

    pub fn class_name(&self) -> String {
        match self.class() {
            Class::Host(ty) => ty.full_name(),
            Class::Script { program, index } => program
                .upgrade()
                .and_then(|p| p.image().type_image(index).map(|t| t.full_name.clone()))
                .unwrap_or_else(|| "<unloaded>".into()),
        }
    }

    fn deep_copy(&self) -> ObjectRef {
        let guard = self.0.lock();
        let fields = guard.fields.iter().map(Value::copied).collect();
        ObjectRef::new(Object::new(guard.class.clone(), guard.is_struct, fields))
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_lock() {
            Some(obj) => write!(f, "ObjectRef({:?})", obj.class),
            None => f.write_str("ObjectRef(<locked>)"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn plain(is_struct: bool, fields: Vec<Value>) -> ObjectRef {
        let ty = HostType::builder("Probe").build();
        ObjectRef::new(Object::new(Class::Host(ty), is_struct, fields))
    }

    #[test]
    fn struct_copy_is_independent() {
        let a = plain(true, vec![Value::Int(1)]);
        let b = Value::Object(a.clone()).copied().as_object().cloned().unwrap();
        b.lock().set_field(0, Value::Int(2));
        assert_eq!(a.lock().field(0), Some(&Value::Int(1)));
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn class_objects_are_shared() {
        let a = plain(false, vec![Value::Int(1)]);
        let b = Value::Object(a.clone()).copied().as_object().cloned().unwrap();
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn equality_widens_numbers() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::str("a"), Value::Int(0));
        assert_eq!(Value::Null, Value::Null);
    }
}
