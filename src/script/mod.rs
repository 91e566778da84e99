//! The built-in script front end: a C#-shaped language compiled to the
//! runtime's bytecode image.
//!
//! source → lex → parse → define → resolve → emit → [`CodeArtifact`]

#[allow(clippy::wildcard_imports)]
pub mod ast;
pub mod error;
#[allow(clippy::indexing_slicing, clippy::cast_possible_truncation)]
pub mod lexer;
#[allow(clippy::wildcard_imports)]
pub mod parser;
#[allow(clippy::wildcard_imports, clippy::indexing_slicing)]
pub mod symbols;
#[allow(
    clippy::wildcard_imports,
    clippy::indexing_slicing,
    clippy::too_many_arguments,
    clippy::needless_pass_by_value,
)]
pub mod typeck;
pub mod compiler;

use crate::diagnostics::Diagnostics;
use crate::engine::{CodeArtifact, CompilerEngine, EngineError};
use crate::imports::ImportSet;
use crate::options::{CompilationOptions, TargetKind};
use crate::source::{SourceId, SourceUnit};

use error::{report_all, CompileError};
use symbols::{LineIndex, ParsedUnit, Symbols};

/// [`CompilerEngine`] for the built-in language.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptEngine;

impl ScriptEngine {
    pub fn new() -> Self {
        Self
    }
}

fn report_tagged(errors: Vec<(SourceId, CompileError)>, diag: &mut Diagnostics) {
    for (source, err) in errors {
        err.report(source, diag);
    }
}

impl CompilerEngine for ScriptEngine {
    type Syntax = ParsedUnit;
    type Symbols = Symbols;

    fn parse(
        &mut self,
        unit: &SourceUnit,
        text: &str,
        options: &CompilationOptions,
        diag: &mut Diagnostics,
    ) -> ParsedUnit {
        let syntax = match lexer::lex(text, &options.conditional_symbols).and_then(parser::parse) {
            Ok(syntax) => Some(syntax),
            Err(errors) => {
                report_all(&errors, unit.id(), diag);
                None
            }
        };
        ParsedUnit {
            source: unit.id(),
            name: unit.name().to_string(),
            syntax,
            lines: LineIndex::new(text),
        }
    }

    fn define(
        &mut self,
        syntax: Vec<ParsedUnit>,
        imports: &ImportSet,
        _options: &CompilationOptions,
        diag: &mut Diagnostics,
    ) -> Result<Symbols, EngineError> {
        let (symbols, errors) = symbols::define(syntax, imports);
        tracing::debug!(types = symbols.types.len(), "defined script types");
        report_tagged(errors, diag);
        Ok(symbols)
    }

    fn resolve(
        &mut self,
        symbols: &mut Symbols,
        options: &CompilationOptions,
        diag: &mut Diagnostics,
    ) -> Result<(), EngineError> {
        report_tagged(typeck::resolve(symbols), diag);

        if options.target == TargetKind::Executable {
            let program = symbols.units.first().map_or("", |u| u.name.as_str());
            match typeck::find_entry_point(symbols, program, options.main_type.as_deref()) {
                Ok(entry) => symbols.entry_point = Some(entry),
                Err(e) => diag.error(e.code, None, e.message),
            }
        }
        Ok(())
    }

    fn emit(
        &mut self,
        symbols: Symbols,
        unit_name: &str,
        options: &CompilationOptions,
        _diag: &mut Diagnostics,
    ) -> Result<CodeArtifact, EngineError> {
        compiler::compile(&symbols, unit_name, options.generate_debug_info)
    }
}
