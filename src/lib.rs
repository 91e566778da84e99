//! Embeddable runtime script compilation.
//!
//! A [`Session`] collects source fragments and host type descriptors, runs
//! them through the compilation pipeline and yields a [`CompiledModule`]
//! whose types can be instantiated and invoked in-process.
//!
//! ```no_run
//! use hostscript::{ScriptBuilder, StartOptions};
//!
//! let mut builder = ScriptBuilder::new();
//! builder.start(StartOptions::default());
//! builder.add_from_text("hello.hs", "public class Hello { }")?;
//! let output = builder.build()?;
//! assert!(output.success);
//! # Ok::<(), hostscript::SessionError>(())
//! ```

pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod host;
pub mod imports;
pub mod module;
pub mod options;
pub mod persist;
pub mod pipeline;
pub mod runtime;
pub mod script;
pub mod session;
pub mod source;

pub use diagnostics::{Diagnostic, Diagnostics, ReportPrinter};
pub use error::{OptionsError, PersistError, SessionError};
pub use host::{HostModule, HostType};
pub use module::CompiledModule;
pub use options::{CompilationOptions, TargetKind};
pub use runtime::{Instance, RuntimeError, TypeHandle, Value};
pub use session::{BuildOutput, ScriptBuilder, Session, StartOptions};
pub use source::SourceId;
