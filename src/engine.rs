//! Capabilities the pipeline needs from a compiler backend and a loader.
//!
//! The pipeline only orchestrates. Parsing, symbol definition, resolution
//! and code emission are delegated to a [`CompilerEngine`]; turning the
//! emitted artifact into something callable is delegated to a
//! [`LoadableUnitFactory`].

use thiserror::Error;

use crate::diagnostics::Diagnostics;
use crate::host::HostType;
use crate::imports::ImportSet;
use crate::options::CompilationOptions;
use crate::runtime::{Image, LoadedUnit};
use crate::source::SourceUnit;

/// Internal failure of an engine or loader. Surfaces as diagnostic 584.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("{0}")]
    Internal(String),

    #[error("host type `{0}' is not imported")]
    UnknownHostType(String),

    #[error("host type `{type_name}' has no member `{member}'")]
    UnresolvedHostMember { type_name: String, member: String },

    #[error("invalid unit name `{0}'")]
    InvalidUnitName(String),

    #[error("artifact does not fit the image format: {0}")]
    Limit(String),
}

/// Emitted program plus the host descriptors its references point at.
#[derive(Debug, Clone)]
pub struct CodeArtifact {
    pub image: Image,
    /// Same order as `image.host_types`.
    pub host_types: Vec<HostType>,
}

/// A compiler front end and code generator.
///
/// Problems in the user's program are reported into `diag`; an `Err` means
/// the engine itself failed.
pub trait CompilerEngine {
    type Syntax;
    type Symbols;

    fn parse(
        &mut self,
        unit: &SourceUnit,
        text: &str,
        options: &CompilationOptions,
        diag: &mut Diagnostics,
    ) -> Self::Syntax;

    fn define(
        &mut self,
        syntax: Vec<Self::Syntax>,
        imports: &ImportSet,
        options: &CompilationOptions,
        diag: &mut Diagnostics,
    ) -> Result<Self::Symbols, EngineError>;

    fn resolve(
        &mut self,
        symbols: &mut Self::Symbols,
        options: &CompilationOptions,
        diag: &mut Diagnostics,
    ) -> Result<(), EngineError>;

    fn emit(
        &mut self,
        symbols: Self::Symbols,
        unit_name: &str,
        options: &CompilationOptions,
        diag: &mut Diagnostics,
    ) -> Result<CodeArtifact, EngineError>;
}

/// Creates the in-process unit that receives an emitted artifact.
pub trait LoadableUnitFactory {
    fn create(&self, name: &str, options: &CompilationOptions) -> Result<LoadedUnit, EngineError>;
}
