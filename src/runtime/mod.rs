//! Loading and running emitted images in-process.

pub mod error;
pub mod image;
pub mod unit;
pub mod value;
pub mod vm;

pub use error::RuntimeError;
pub use image::{Image, IMAGE_VERSION};
pub use unit::{InProcessFactory, Instance, Limits, LoadedUnit, Program, SharedOutput, TypeHandle};
pub use value::{Class, Object, ObjectRef, Value};
pub use vm::HostCall;
