//! The baseline `System` host module.

use std::sync::LazyLock;

use super::{HostModule, HostType, HostTypeBuilder, HostTypeKind, Primitive, TypeSig};
use crate::runtime::{RuntimeError, Value};

pub const MODULE_NAME: &str = "System";
pub const NAMESPACE: &str = "System";

/// Types every session imports before any source is seen.
pub const BASELINE: &[&str] = &[
    "Object",
    "ValueType",
    "Int64",
    "Double",
    "Boolean",
    "String",
    "Void",
    "Array",
    "Exception",
    "Delegate",
    "MulticastDelegate",
    "Enum",
    "Type",
    "Attribute",
    "IEnumerable",
    "IDisposable",
];

/// Types the compiler cannot work without.
pub const PREDEFINED: &[&str] = &["Object", "ValueType", "Int64", "Double", "Boolean", "String", "Void"];

static SYSTEM: LazyLock<HostModule> = LazyLock::new(build_module);

/// The shared `System` module. Every call returns the same descriptors.
pub fn module() -> HostModule {
    SYSTEM.clone()
}

/// The baseline subset of [`module`], in declaration order.
pub fn baseline() -> Vec<HostType> {
    let module = module();
    BASELINE
        .iter()
        .filter_map(|name| module.find(&format!("{NAMESPACE}.{name}")).cloned())
        .collect()
}

fn ty(name: &str) -> HostTypeBuilder {
    HostType::builder(name).namespace(NAMESPACE)
}

fn primitive(name: &str, p: Primitive) -> HostTypeBuilder {
    ty(name).kind(HostTypeKind::Primitive(p))
}

fn abstraction(name: &str) -> HostTypeBuilder {
    ty(name).kind(HostTypeKind::Abstract)
}

fn build_module() -> HostModule {
    HostModule::new(
        MODULE_NAME,
        vec![
            primitive("Object", Primitive::Object),
            abstraction("ValueType"),
            primitive("Int64", Primitive::Int),
            primitive("Double", Primitive::Float),
            primitive("Boolean", Primitive::Bool),
            string_type(),
            primitive("Void", Primitive::Void),
            abstraction("Array"),
            exception_type(),
            abstraction("Delegate"),
            abstraction("MulticastDelegate"),
            abstraction("Enum"),
            abstraction("Type"),
            abstraction("Attribute"),
            ty("IEnumerable").kind(HostTypeKind::Interface),
            ty("IDisposable").kind(HostTypeKind::Interface),
            console_type(),
            math_type(),
            convert_type(),
            environment_type(),
        ],
    )
}

fn string_type() -> HostTypeBuilder {
    primitive("String", Primitive::String)
        .static_method(
            "Concat",
            vec![TypeSig::Object, TypeSig::Object],
            TypeSig::String,
            |call| {
                let a = call.arg(0)?.clone();
                let b = call.arg(1)?.clone();
                let joined = call.display(&a)? + &call.display(&b)?;
                Ok(Value::from(joined))
            },
        )
        .static_method("IsNullOrEmpty", vec![TypeSig::String], TypeSig::Bool, |call| {
            Ok(Value::Bool(call.arg(0)?.as_str().is_none_or(str::is_empty)))
        })
        .static_method("Length", vec![TypeSig::String], TypeSig::Int, |call| {
            let len = call.str_arg(0)?.chars().count();
            Ok(Value::Int(i64::try_from(len).unwrap_or(i64::MAX)))
        })
        .constant("Empty", TypeSig::String, Value::str(""))
}

fn exception_type() -> HostTypeBuilder {
    ty("Exception")
        .field("Message", TypeSig::String)
        .constructor(vec![TypeSig::String], |call| {
            let message = call.arg(0)?.clone();
            call.set_this_field("Message", message)?;
            Ok(Value::Null)
        })
        .method("ToString", vec![], TypeSig::String, |call| {
            let message = call.this_field("Message")?;
            let text = call.display(&message)?;
            Ok(Value::from(format!("System.Exception: {text}")))
        })
}

fn console_type() -> HostTypeBuilder {
    ty("Console")
        .kind(HostTypeKind::Static)
        .static_method("WriteLine", vec![TypeSig::Object], TypeSig::Void, |call| {
            let value = call.arg(0)?.clone();
            let mut text = call.display(&value)?;
            text.push('\n');
            call.write(&text)?;
            Ok(Value::Null)
        })
        .static_method("Write", vec![TypeSig::Object], TypeSig::Void, |call| {
            let value = call.arg(0)?.clone();
            let text = call.display(&value)?;
            call.write(&text)?;
            Ok(Value::Null)
        })
}

fn math_type() -> HostTypeBuilder {
    let unary = |b: HostTypeBuilder, name: &str, f: fn(f64) -> f64| {
        b.static_method(name, vec![TypeSig::Float], TypeSig::Float, move |call| {
            Ok(Value::Float(f(call.float_arg(0)?)))
        })
    };
    let binary = |b: HostTypeBuilder, name: &str, f: fn(f64, f64) -> f64| {
        b.static_method(name, vec![TypeSig::Float, TypeSig::Float], TypeSig::Float, move |call| {
            Ok(Value::Float(f(call.float_arg(0)?, call.float_arg(1)?)))
        })
    };

    let mut math = ty("Math")
        .kind(HostTypeKind::Static)
        .constant("PI", TypeSig::Float, Value::Float(std::f64::consts::PI))
        .constant("E", TypeSig::Float, Value::Float(std::f64::consts::E));
    math = unary(math, "Sqrt", f64::sqrt);
    math = unary(math, "Abs", f64::abs);
    math = unary(math, "Floor", f64::floor);
    math = unary(math, "Ceiling", f64::ceil);
    math = unary(math, "Round", f64::round);
    math = unary(math, "Sin", f64::sin);
    math = unary(math, "Cos", f64::cos);
    math = binary(math, "Pow", f64::powf);
    math = binary(math, "Min", f64::min);
    binary(math, "Max", f64::max)
}

fn convert_type() -> HostTypeBuilder {
    ty("Convert")
        .kind(HostTypeKind::Static)
        .static_method("ToInt64", vec![TypeSig::Float], TypeSig::Int, |call| {
            let f = call.float_arg(0)?;
            if !f.is_finite() {
                return Err(RuntimeError::host("Convert.ToInt64", format!("{f} is not finite")));
            }
            #[allow(clippy::cast_possible_truncation)]
            let n = f.trunc() as i64;
            Ok(Value::Int(n))
        })
        .static_method("ToDouble", vec![TypeSig::Float], TypeSig::Float, |call| {
            Ok(Value::Float(call.float_arg(0)?))
        })
        .static_method("ToString", vec![TypeSig::Object], TypeSig::String, |call| {
            let value = call.arg(0)?.clone();
            Ok(Value::from(call.display(&value)?))
        })
        .static_method("ToBoolean", vec![TypeSig::String], TypeSig::Bool, |call| {
            let s = call.str_arg(0)?;
            match s.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(RuntimeError::host(
                    "Convert.ToBoolean",
                    format!("`{s}' is not a valid boolean"),
                )),
            }
        })
}

fn environment_type() -> HostTypeBuilder {
    ty("Environment")
        .kind(HostTypeKind::Static)
        .constant("NewLine", TypeSig::String, Value::str("\n"))
        .static_method("GetEnvironmentVariable", vec![TypeSig::String], TypeSig::String, |call| {
            Ok(std::env::var(call.str_arg(0)?).map_or(Value::Null, Value::from))
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn module_is_a_singleton() {
        let a = module();
        let b = module();
        assert_eq!(a.types()[0], b.types()[0]);
    }

    #[test]
    fn baseline_excludes_console_and_math() {
        let names: Vec<String> = baseline().iter().map(HostType::full_name).collect();
        assert_eq!(names.len(), BASELINE.len());
        assert!(names.contains(&"System.Exception".to_string()));
        assert!(!names.contains(&"System.Console".to_string()));
    }

    #[test]
    fn primitives_are_tagged() {
        let m = module();
        assert_eq!(m.find("System.Int64").unwrap().primitive(), Some(Primitive::Int));
        assert_eq!(m.find("System.String").unwrap().primitive(), Some(Primitive::String));
        assert!(m.find("System.Console").unwrap().primitive().is_none());
    }
}
