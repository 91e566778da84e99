//! The session facade: collect sources and host types, then build once.
//!
//! [`Session`] is the collecting state; [`Session::build`] consumes it, so
//! a built session cannot be reused. [`ScriptBuilder`] wraps the same
//! lifecycle behind `&mut self` for callers that keep one long-lived
//! builder and restart it between builds.

use std::io::{self, Read};
use std::path::Path;

use crate::diagnostics::{Diagnostics, ReportPrinter};
use crate::engine::{CompilerEngine, LoadableUnitFactory};
use crate::error::SessionError;
use crate::host::{system, HostModule, HostType};
use crate::imports::{ImportOutcome, ImportSet};
use crate::module::CompiledModule;
use crate::options::CompilationOptions;
use crate::pipeline::{Job, Pipeline};
use crate::runtime::InProcessFactory;
use crate::script::ScriptEngine;
use crate::source::{SourceEncoding, SourceId, SourceOrigin, SourceSet};

/// How a session is configured when it starts.
#[derive(Default)]
pub struct StartOptions {
    pub options: CompilationOptions,
    pub encoding: SourceEncoding,
    /// Receives each diagnostic as it is recorded.
    pub printer: Option<Box<dyn ReportPrinter>>,
    /// Reject a source whose name was already added.
    pub unique_names: bool,
}

impl StartOptions {
    pub fn new(options: CompilationOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn printer(mut self, printer: impl ReportPrinter + 'static) -> Self {
        self.printer = Some(Box::new(printer));
        self
    }

    pub fn encoding(mut self, encoding: SourceEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}

/// Outcome of [`Session::build`].
#[derive(Debug)]
pub struct BuildOutput {
    pub success: bool,
    pub module: CompiledModule,
}

/// One compilation: sources, imports and options, built at most once.
pub struct Session {
    options: CompilationOptions,
    encoding: SourceEncoding,
    sources: SourceSet,
    imports: ImportSet,
    diagnostics: Diagnostics,
}

impl Session {
    /// Fresh sink, copied options, and an import set holding the baseline
    /// `System` types.
    pub fn start(start: StartOptions) -> Self {
        let StartOptions {
            options,
            encoding,
            printer,
            unique_names,
        } = start;
        let mut diagnostics = match printer {
            Some(printer) => Diagnostics::with_printer(printer),
            None => Diagnostics::new(),
        };
        diagnostics.set_policy(options.warning_policy());

        let mut imports = ImportSet::new();
        let baseline = imports.import_all(&system::baseline());
        tracing::debug!(baseline, target = ?options.target, "session started");

        Self {
            options,
            encoding,
            sources: SourceSet::with_unique_names(unique_names),
            imports,
            diagnostics,
        }
    }

    pub fn options(&self) -> &CompilationOptions {
        &self.options
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn imports(&self) -> &ImportSet {
        &self.imports
    }

    /// Adds a file; it is read when the build reaches it.
    pub fn add_from_file(&mut self, path: impl AsRef<Path>) -> Option<SourceId> {
        self.sources.add_file(path.as_ref())
    }

    pub fn add_from_text(&mut self, name: impl Into<String>, text: impl Into<String>) -> Option<SourceId> {
        self.sources.add(name, SourceOrigin::Text(text.into()))
    }

    /// Adds a unit whose bytes come from `supplier` when the build opens it.
    pub fn add_from_stream<F>(&mut self, name: impl Into<String>, supplier: F) -> Option<SourceId>
    where
        F: FnMut() -> io::Result<Box<dyn Read + Send>> + Send + 'static,
    {
        self.sources.add(name, SourceOrigin::Stream(Box::new(supplier)))
    }

    /// Adds a unit read from `reader`, which can be consumed only once.
    pub fn add_from_reader<R: Read + Send + 'static>(&mut self, name: impl Into<String>, reader: R) -> Option<SourceId> {
        let mut reader = Some(reader);
        self.add_from_stream(name, move || match reader.take() {
            Some(r) => Ok(Box::new(r) as Box<dyn Read + Send>),
            None => Err(io::Error::other("reader was already consumed")),
        })
    }

    pub fn add_conditional_symbol(&mut self, symbol: impl Into<String>) {
        let symbol = symbol.into();
        if !self.options.conditional_symbols.contains(&symbol) {
            self.options.conditional_symbols.push(symbol);
        }
    }

    pub fn import_type(&mut self, ty: &HostType) -> ImportOutcome {
        self.imports.import(ty)
    }

    pub fn import_types<'a>(&mut self, types: impl IntoIterator<Item = &'a HostType>) -> usize {
        self.imports.import_all(types)
    }

    pub fn import_module(&mut self, module: &HostModule) -> usize {
        self.imports.import_module(module)
    }

    pub fn import_namespace(&mut self, ns: &str) -> usize {
        self.imports.import_namespace(ns)
    }

    /// Builds with the built-in script engine and in-process units.
    pub fn build(self) -> BuildOutput {
        self.build_with(ScriptEngine::new(), InProcessFactory::new())
    }

    pub fn build_with<E: CompilerEngine, F: LoadableUnitFactory>(self, engine: E, factory: F) -> BuildOutput {
        let Session {
            options,
            encoding,
            mut sources,
            mut imports,
            mut diagnostics,
        } = self;

        let mut pipeline = Pipeline::new(engine, factory);
        let unit = pipeline.run(
            Job {
                sources: &mut sources,
                imports: &mut imports,
                options: &options,
                encoding,
            },
            &mut diagnostics,
        );

        let errors = diagnostics.error_count();
        let warnings = diagnostics.warning_count();
        let success = errors == 0 && unit.is_some();
        tracing::info!(success, errors, warnings, stage = %pipeline.stage(), "build finished");
        BuildOutput {
            success,
            module: CompiledModule::new(unit, errors, warnings, diagnostics.into_entries()),
        }
    }
}

enum BuilderState {
    NotStarted,
    Collecting(Box<Session>),
    Built,
}

/// Long-lived facade over [`Session`]: `start`, add and import, `build`,
/// then `start` again.
pub struct ScriptBuilder {
    state: BuilderState,
}

impl Default for ScriptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self {
            state: BuilderState::NotStarted,
        }
    }

    /// Starts a new session, discarding any previous one entirely.
    pub fn start(&mut self, start: StartOptions) {
        if matches!(self.state, BuilderState::Collecting(_)) {
            tracing::debug!("discarding unbuilt session");
        }
        self.state = BuilderState::Collecting(Box::new(Session::start(start)));
    }

    pub fn start_with(&mut self, options: CompilationOptions) {
        self.start(StartOptions::new(options));
    }

    pub fn is_started(&self) -> bool {
        matches!(self.state, BuilderState::Collecting(_))
    }

    fn session(&mut self) -> Result<&mut Session, SessionError> {
        match &mut self.state {
            BuilderState::Collecting(session) => Ok(&mut **session),
            BuilderState::NotStarted => Err(SessionError::NotStarted),
            BuilderState::Built => Err(SessionError::AlreadyBuilt),
        }
    }

    pub fn add_from_file(&mut self, path: impl AsRef<Path>) -> Result<SourceId, SessionError> {
        let path = path.as_ref();
        self.session()?
            .add_from_file(path)
            .ok_or_else(|| SessionError::DuplicateSource(path.to_string_lossy().into_owned()))
    }

    pub fn add_from_text(&mut self, name: impl Into<String>, text: impl Into<String>) -> Result<SourceId, SessionError> {
        let name = name.into();
        self.session()?
            .add_from_text(name.clone(), text)
            .ok_or(SessionError::DuplicateSource(name))
    }

    pub fn add_from_stream<F>(&mut self, name: impl Into<String>, supplier: F) -> Result<SourceId, SessionError>
    where
        F: FnMut() -> io::Result<Box<dyn Read + Send>> + Send + 'static,
    {
        let name = name.into();
        self.session()?
            .add_from_stream(name.clone(), supplier)
            .ok_or(SessionError::DuplicateSource(name))
    }

    pub fn add_from_reader<R: Read + Send + 'static>(&mut self, name: impl Into<String>, reader: R) -> Result<SourceId, SessionError> {
        let name = name.into();
        self.session()?
            .add_from_reader(name.clone(), reader)
            .ok_or(SessionError::DuplicateSource(name))
    }

    pub fn add_conditional_symbol(&mut self, symbol: impl Into<String>) -> Result<(), SessionError> {
        self.session()?.add_conditional_symbol(symbol);
        Ok(())
    }

    pub fn import_type(&mut self, ty: &HostType) -> Result<ImportOutcome, SessionError> {
        Ok(self.session()?.import_type(ty))
    }

    pub fn import_types<'a>(&mut self, types: impl IntoIterator<Item = &'a HostType>) -> Result<usize, SessionError> {
        Ok(self.session()?.import_types(types))
    }

    pub fn import_module(&mut self, module: &HostModule) -> Result<usize, SessionError> {
        Ok(self.session()?.import_module(module))
    }

    pub fn import_namespace(&mut self, ns: &str) -> Result<usize, SessionError> {
        Ok(self.session()?.import_namespace(ns))
    }

    /// Builds the current session. The builder must be started again
    /// before the next build.
    pub fn build(&mut self) -> Result<BuildOutput, SessionError> {
        self.build_with(ScriptEngine::new(), InProcessFactory::new())
    }

    pub fn build_with<E: CompilerEngine, F: LoadableUnitFactory>(
        &mut self,
        engine: E,
        factory: F,
    ) -> Result<BuildOutput, SessionError> {
        match std::mem::replace(&mut self.state, BuilderState::Built) {
            BuilderState::Collecting(session) => Ok((*session).build_with(engine, factory)),
            BuilderState::NotStarted => {
                self.state = BuilderState::NotStarted;
                Err(SessionError::NotStarted)
            }
            BuilderState::Built => Err(SessionError::AlreadyBuilt),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn builder_requires_start() {
        let mut builder = ScriptBuilder::new();
        assert_eq!(builder.add_from_text("a.hs", "class A { }"), Err(SessionError::NotStarted));
        assert_eq!(builder.build().unwrap_err(), SessionError::NotStarted);
        assert!(!builder.is_started());
    }

    #[test]
    fn builder_refuses_reuse_after_build() {
        let mut builder = ScriptBuilder::new();
        builder.start(StartOptions::default());
        builder.add_from_text("a.hs", "class A { }").unwrap();
        assert!(builder.build().unwrap().success);
        assert_eq!(builder.add_from_text("b.hs", "class B { }"), Err(SessionError::AlreadyBuilt));
        assert_eq!(builder.build().unwrap_err(), SessionError::AlreadyBuilt);

        builder.start(StartOptions::default());
        builder.add_from_text("b.hs", "class B { }").unwrap();
        assert!(builder.build().unwrap().success);
    }

    #[test]
    fn indices_are_one_based_and_sequential() {
        let mut session = Session::start(StartOptions::default());
        assert_eq!(session.add_from_text("a.hs", ""), Some(SourceId(1)));
        assert_eq!(session.add_from_text("a.hs", ""), Some(SourceId(2)));
        assert_eq!(session.source_count(), 2);
    }

    #[test]
    fn unique_names_policy_rejects_duplicates() {
        let mut builder = ScriptBuilder::new();
        builder.start(StartOptions {
            unique_names: true,
            ..StartOptions::default()
        });
        builder.add_from_text("a.hs", "").unwrap();
        assert_eq!(
            builder.add_from_text("a.hs", ""),
            Err(SessionError::DuplicateSource("a.hs".into()))
        );
    }

    #[test]
    fn baseline_is_imported_at_start() {
        let session = Session::start(StartOptions::default());
        assert_eq!(session.imports().len(), system::BASELINE.len());
        assert!(session.imports().lookup_full("System.Exception").is_some());
        assert!(session.imports().lookup_full("System.Console").is_none());
    }

    #[test]
    fn conditional_symbols_are_deduplicated() {
        let mut session = Session::start(StartOptions::default());
        session.add_conditional_symbol("DEBUG");
        session.add_conditional_symbol("DEBUG");
        assert_eq!(session.options().conditional_symbols, vec!["DEBUG".to_string()]);
    }

    #[test]
    fn reader_sources_are_compiled() {
        let mut session = Session::start(StartOptions::default());
        session.add_from_reader("r.hs", io::Cursor::new(b"public class FromReader { }".to_vec()));
        let out = session.build();
        assert!(out.success, "{:?}", out.module.diagnostics());
        assert_eq!(out.module.types()[0].name(), "FromReader");
    }
}
