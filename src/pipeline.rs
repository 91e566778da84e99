//! The compilation pipeline: sources + imports + options → diagnostics +
//! loaded unit.
//!
//! ```text
//! Init → Parsing → Importing → Defining → Resolving → Emitting → Done
//!   └──────────┴──────────┴──────────┴──────────┴──────────┴──→ Failed
//! ```
//!
//! Each stage runs to completion, reporting into the session's
//! [`Diagnostics`]; the pipeline stops at the first stage that leaves
//! errors behind. Engine failures and panics never escape: they become a
//! single internal-error diagnostic.

use std::any::Any;
use std::fmt;
use std::fs;
use std::hash::Hasher;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::time::Instant;

use rustc_hash::FxHasher;

use crate::diagnostics::{codes, Diagnostics};
use crate::engine::{CompilerEngine, EngineError, LoadableUnitFactory};
use crate::host::{catalog, system};
use crate::imports::ImportSet;
use crate::options::{CompilationOptions, Platform, ResourceData, TargetKind};
use crate::persist;
use crate::runtime::LoadedUnit;
use crate::source::{LoadError, SourceEncoding, SourceSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Parsing,
    Importing,
    Defining,
    Resolving,
    Emitting,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::Parsing => "parsing",
            Stage::Importing => "importing",
            Stage::Defining => "defining",
            Stage::Resolving => "resolving",
            Stage::Emitting => "emitting",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Everything one run reads or fills in, owned by the session.
pub struct Job<'a> {
    pub sources: &'a mut SourceSet,
    pub imports: &'a mut ImportSet,
    pub options: &'a CompilationOptions,
    pub encoding: SourceEncoding,
}

/// Checksum stored on units compiled with debug info.
pub fn checksum(bytes: &[u8]) -> Vec<u8> {
    let mut hasher = FxHasher::default();
    hasher.write(bytes);
    hasher.finish().to_le_bytes().to_vec()
}

const RESERVED_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// The output file name: the supplied one if valid, else the first source's
/// stem plus the target suffix. `Err` carries the diagnostic to report.
pub fn output_name(
    first_source: Option<&str>,
    options: &CompilationOptions,
) -> Result<String, (u32, String)> {
    if let Some(name) = &options.output_name {
        let stem = Path::new(name).file_stem().and_then(|s| s.to_str()).unwrap_or("");
        let reserved = name.chars().any(|c| RESERVED_NAME_CHARS.contains(&c) || c.is_control());
        if stem.trim().is_empty() || reserved {
            return Err((
                codes::BAD_OUTPUT_NAME,
                format!("Invalid output file name `{name}'"),
            ));
        }
        return Ok(name.clone());
    }

    let Some(first) = first_source else {
        return Err((
            codes::NO_OUTPUT_NAME,
            "No source files and no output file name were specified".into(),
        ));
    };
    let stem = Path::new(first)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            (
                codes::BAD_OUTPUT_NAME,
                format!("Cannot derive an output file name from `{first}'"),
            )
        })?;
    Ok(format!("{stem}{}", options.target.suffix()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs an engine call, turning an `Err` or a panic into diagnostic 584.
fn guarded<T>(
    diag: &mut Diagnostics,
    call: impl FnOnce(&mut Diagnostics) -> Result<T, EngineError>,
) -> Option<T> {
    let message = match panic::catch_unwind(AssertUnwindSafe(|| call(&mut *diag))) {
        Ok(Ok(value)) => return Some(value),
        Ok(Err(e)) => e.to_string(),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(%message, "compiler engine panicked");
            message
        }
    };
    diag.error(
        codes::INTERNAL_ERROR,
        None,
        format!("internal compiler error: {message}"),
    );
    None
}

/// Drives a [`CompilerEngine`] through the stages and links the result
/// into a unit from the [`LoadableUnitFactory`].
pub struct Pipeline<E, F> {
    engine: E,
    factory: F,
    stage: Stage,
}

impl<E: CompilerEngine, F: LoadableUnitFactory> Pipeline<E, F> {
    pub fn new(engine: E, factory: F) -> Self {
        Self {
            engine,
            factory,
            stage: Stage::Init,
        }
    }

    /// The stage the last run reached (`Done` or `Failed` once it returns).
    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn enter(&mut self, stage: Stage) -> Instant {
        self.stage = stage;
        tracing::debug!(%stage, "entering stage");
        Instant::now()
    }

    fn leave(&self, started: Instant, diag: &Diagnostics) {
        tracing::debug!(
            stage = %self.stage,
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            errors = diag.error_count(),
            warnings = diag.warning_count(),
            "stage finished"
        );
    }

    fn fail(&mut self, diag: &Diagnostics) -> Option<LoadedUnit> {
        tracing::info!(
            stage = %self.stage,
            errors = diag.error_count(),
            "compilation failed"
        );
        self.stage = Stage::Failed;
        None
    }

    /// Runs every stage. Returns the linked unit only when no errors were
    /// recorded.
    pub fn run(&mut self, job: Job<'_>, diag: &mut Diagnostics) -> Option<LoadedUnit> {
        let Job {
            sources,
            imports,
            options,
            encoding,
        } = job;
        let total = self.enter(Stage::Init);

        if sources.is_empty() && (options.target == TargetKind::Executable || options.resources.is_empty()) {
            diag.error(codes::NO_SOURCES, None, "No files to compile were specified");
            return self.fail(diag);
        }
        if options.platform == Platform::AnyCpu32BitPreferred && options.target == TargetKind::Library {
            diag.error(
                codes::PLATFORM_MISMATCH,
                None,
                "Platform `anycpu32bitpreferred' can only be used with executable targets",
            );
            return self.fail(diag);
        }

        // ── Parsing ──
        let started = self.enter(Stage::Parsing);
        let mut syntax = Vec::with_capacity(sources.len());
        for unit in sources.iter_mut() {
            let loaded = match unit.load(encoding) {
                Ok(loaded) => loaded,
                Err(LoadError::NotFound(e)) => {
                    tracing::debug!(name = unit.name(), error = %e, "source unavailable");
                    diag.error(
                        codes::SOURCE_NOT_FOUND,
                        None,
                        format!("Source file `{}' could not be found", unit.name()),
                    );
                    continue;
                }
                Err(LoadError::Binary) => {
                    diag.error(
                        codes::BINARY_SOURCE,
                        None,
                        format!("Source file `{}' is a binary file and not a text file", unit.name()),
                    );
                    continue;
                }
                Err(LoadError::Encoding { offset }) => {
                    diag.error(
                        codes::BAD_ENCODING,
                        None,
                        format!(
                            "Source file `{}' is not valid {encoding:?} text (byte {offset})",
                            unit.name()
                        ),
                    );
                    continue;
                }
            };

            diag.register_source(unit.id(), unit.name(), &loaded.text);
            let engine = &mut self.engine;
            let parsed = guarded(diag, |d| Ok(engine.parse(unit, &loaded.text, options, d)));
            if let Some(parsed) = parsed {
                syntax.push(parsed);
            }
            if options.generate_debug_info && !diag.has_errors() && unit.checksum().is_none() {
                unit.set_checksum(checksum(&loaded.bytes));
            }
        }
        self.leave(started, diag);
        if diag.has_errors() {
            return self.fail(diag);
        }

        // ── Importing ──
        let started = self.enter(Stage::Importing);
        for name in &options.references {
            match catalog::find(name) {
                Some(module) => {
                    imports.import_module(&module);
                }
                None => diag.error(
                    codes::REFERENCE_NOT_FOUND,
                    None,
                    format!("Metadata file `{name}' could not be found"),
                ),
            }
        }
        if options.load_default_library {
            imports.import_module(&system::module());
        }
        let output = match output_name(sources.first().map(|u| u.name()), options) {
            Ok(name) => Some(name),
            Err((code, message)) => {
                diag.error(code, None, message);
                None
            }
        };
        self.leave(started, diag);
        let Some(output) = output.filter(|_| !diag.has_errors()) else {
            return self.fail(diag);
        };

        // ── Defining ──
        let started = self.enter(Stage::Defining);
        for name in system::PREDEFINED {
            let full = format!("{}.{name}", system::NAMESPACE);
            if imports.lookup_full(&full).is_none() {
                diag.error(
                    codes::PREDEFINED_MISSING,
                    None,
                    format!("Predefined type `{full}' is not defined or imported"),
                );
            }
        }
        if diag.has_errors() {
            self.leave(started, diag);
            return self.fail(diag);
        }
        let unit_name = Path::new(&output)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&output)
            .to_string();
        let factory = &self.factory;
        let Some(mut unit) = guarded(diag, |_| factory.create(&unit_name, options)) else {
            self.leave(started, diag);
            return self.fail(diag);
        };
        let engine = &mut self.engine;
        let imports = &*imports;
        let symbols = guarded(diag, |d| engine.define(syntax, imports, options, d));
        self.leave(started, diag);
        let Some(mut symbols) = symbols.filter(|_| !diag.has_errors()) else {
            return self.fail(diag);
        };

        // ── Resolving ──
        let started = self.enter(Stage::Resolving);
        let engine = &mut self.engine;
        let resolved = guarded(diag, |d| engine.resolve(&mut symbols, options, d));
        self.leave(started, diag);
        if resolved.is_none() || diag.has_errors() {
            return self.fail(diag);
        }

        // ── Emitting ──
        let started = self.enter(Stage::Emitting);
        let engine = &mut self.engine;
        let artifact = guarded(diag, |d| engine.emit(symbols, &unit_name, options, d));
        let Some(artifact) = artifact.filter(|_| !diag.has_errors()) else {
            self.leave(started, diag);
            return self.fail(diag);
        };

        for resource in &options.resources {
            let bytes = match &resource.data {
                ResourceData::Inline { bytes } => bytes.clone(),
                ResourceData::File { path } => match fs::read(path) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        diag.error(
                            codes::RESOURCE_UNREADABLE,
                            None,
                            format!("Error reading resource `{}' -- `{e}'", path.display()),
                        );
                        continue;
                    }
                },
            };
            unit.add_resource(resource.name.clone(), bytes);
        }

        let linked = guarded(diag, |_| unit.emit(artifact));
        if linked.is_none() || diag.has_errors() {
            self.leave(started, diag);
            return self.fail(diag);
        }

        if let Some(image) = unit.image().filter(|_| !options.in_memory) {
            let path = options.output_dir.join(&output);
            match persist::save_image(&path, image) {
                Ok(()) => tracing::info!(path = %path.display(), "image written"),
                Err(e) => diag.error(
                    codes::WRITE_FAILED,
                    None,
                    format!("Could not write to output file `{}' -- `{e}'", path.display()),
                ),
            }
        }
        self.leave(started, diag);
        if diag.has_errors() {
            return self.fail(diag);
        }

        self.stage = Stage::Done;
        tracing::info!(
            unit = %unit_name,
            types = unit.defined_types().len(),
            warnings = diag.warning_count(),
            elapsed_ms = total.elapsed().as_secs_f64() * 1000.0,
            "compilation succeeded"
        );
        Some(unit)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::panic)]
mod tests {
    use super::*;
    use crate::engine::CodeArtifact;
    use crate::runtime::{Image, InProcessFactory};
    use crate::source::{SourceOrigin, SourceUnit};

    /// Records the stages it sees and misbehaves on request.
    #[derive(Default)]
    struct ScriptedEngine {
        calls: Vec<&'static str>,
        panic_in_resolve: bool,
        fail_emit: bool,
        warn_in_define: bool,
    }

    impl CompilerEngine for ScriptedEngine {
        type Syntax = String;
        type Symbols = Vec<String>;

        fn parse(&mut self, unit: &SourceUnit, _text: &str, _o: &CompilationOptions, _d: &mut Diagnostics) -> String {
            self.calls.push("parse");
            unit.name().to_string()
        }

        fn define(
            &mut self,
            syntax: Vec<String>,
            _imports: &ImportSet,
            _o: &CompilationOptions,
            diag: &mut Diagnostics,
        ) -> Result<Vec<String>, EngineError> {
            self.calls.push("define");
            if self.warn_in_define {
                diag.warning(codes::UNUSED_VARIABLE, None, "The variable `x' is assigned but never used");
            }
            Ok(syntax)
        }

        fn resolve(&mut self, _s: &mut Vec<String>, _o: &CompilationOptions, _d: &mut Diagnostics) -> Result<(), EngineError> {
            self.calls.push("resolve");
            if self.panic_in_resolve {
                panic!("resolver exploded");
            }
            Ok(())
        }

        fn emit(
            &mut self,
            _s: Vec<String>,
            unit_name: &str,
            _o: &CompilationOptions,
            _d: &mut Diagnostics,
        ) -> Result<CodeArtifact, EngineError> {
            self.calls.push("emit");
            if self.fail_emit {
                return Err(EngineError::Limit("too many constants".into()));
            }
            Ok(CodeArtifact {
                image: Image::new(unit_name),
                host_types: Vec::new(),
            })
        }
    }

    fn baseline_imports() -> ImportSet {
        let mut imports = ImportSet::new();
        imports.import_all(&system::baseline());
        imports
    }

    fn run(
        engine: ScriptedEngine,
        sources: &mut SourceSet,
        options: &CompilationOptions,
    ) -> (Pipeline<ScriptedEngine, InProcessFactory>, Diagnostics, Option<LoadedUnit>) {
        let mut imports = baseline_imports();
        let mut diag = Diagnostics::new();
        diag.set_policy(options.warning_policy());
        let mut pipeline = Pipeline::new(engine, InProcessFactory::new());
        let unit = pipeline.run(
            Job {
                sources,
                imports: &mut imports,
                options,
                encoding: SourceEncoding::Utf8,
            },
            &mut diag,
        );
        (pipeline, diag, unit)
    }

    fn text_sources(names: &[&str]) -> SourceSet {
        let mut set = SourceSet::new();
        for name in names {
            set.add(*name, SourceOrigin::Text("x".into()));
        }
        set
    }

    #[test]
    fn empty_library_without_resources_is_fatal() {
        let (pipeline, diag, unit) = run(ScriptedEngine::default(), &mut SourceSet::new(), &CompilationOptions::default());
        assert!(unit.is_none());
        assert_eq!(pipeline.stage(), Stage::Failed);
        assert_eq!(diag.entries()[0].code, codes::NO_SOURCES);
        assert!(pipeline.engine.calls.is_empty());
    }

    #[test]
    fn resources_alone_make_a_library() {
        let mut options = CompilationOptions::default();
        options.output_name = Some("assets.lib".into());
        options.resources.push(crate::options::Resource {
            name: "greeting".into(),
            data: ResourceData::Inline { bytes: b"hi".to_vec() },
        });
        let (pipeline, diag, unit) = run(ScriptedEngine::default(), &mut SourceSet::new(), &options);
        assert_eq!(diag.error_count(), 0);
        assert_eq!(pipeline.stage(), Stage::Done);
        let unit = unit.unwrap();
        assert_eq!(unit.name(), "assets");
        assert_eq!(unit.resource("greeting"), Some(&b"hi"[..]));
    }

    #[test]
    fn prefer32bit_library_is_rejected() {
        let options = CompilationOptions {
            platform: Platform::AnyCpu32BitPreferred,
            ..CompilationOptions::default()
        };
        let (_, diag, unit) = run(ScriptedEngine::default(), &mut text_sources(&["a.hs"]), &options);
        assert!(unit.is_none());
        assert_eq!(diag.entries()[0].code, codes::PLATFORM_MISMATCH);
    }

    #[test]
    fn missing_and_binary_units_are_reported_individually() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("tool.hs");
        fs::write(&binary, b"MZ\x90\x00").unwrap();

        let mut sources = SourceSet::new();
        sources.add_file(&dir.path().join("missing.hs"));
        sources.add_file(&binary);
        sources.add("ok.hs", SourceOrigin::Text("x".into()));

        let (pipeline, diag, unit) = run(ScriptedEngine::default(), &mut sources, &CompilationOptions::default());
        assert!(unit.is_none());
        let codes: Vec<u32> = diag.entries().iter().map(|d| d.code).collect();
        assert_eq!(codes, vec![codes::SOURCE_NOT_FOUND, codes::BINARY_SOURCE]);
        // The readable unit was still parsed.
        assert_eq!(pipeline.engine.calls, vec!["parse"]);
    }

    #[test]
    fn engine_panic_becomes_one_internal_error() {
        let engine = ScriptedEngine {
            panic_in_resolve: true,
            ..ScriptedEngine::default()
        };
        let (pipeline, diag, unit) = run(engine, &mut text_sources(&["a.hs"]), &CompilationOptions::default());
        assert!(unit.is_none());
        assert_eq!(diag.error_count(), 1);
        assert_eq!(diag.entries()[0].code, codes::INTERNAL_ERROR);
        assert!(diag.entries()[0].text.contains("resolver exploded"));
        assert_eq!(pipeline.stage(), Stage::Failed);
    }

    #[test]
    fn engine_error_becomes_internal_error() {
        let engine = ScriptedEngine {
            fail_emit: true,
            ..ScriptedEngine::default()
        };
        let (_, diag, unit) = run(engine, &mut text_sources(&["a.hs"]), &CompilationOptions::default());
        assert!(unit.is_none());
        assert_eq!(
            diag.entries()[0].text,
            "internal compiler error: artifact does not fit the image format: too many constants"
        );
    }

    #[test]
    fn stages_run_in_order() {
        let (pipeline, diag, unit) = run(ScriptedEngine::default(), &mut text_sources(&["a.hs", "b.hs"]), &CompilationOptions::default());
        assert_eq!(diag.error_count(), 0);
        assert_eq!(unit.unwrap().name(), "a");
        assert_eq!(pipeline.engine.calls, vec!["parse", "parse", "define", "resolve", "emit"]);
    }

    #[test]
    fn warnings_as_errors_stop_the_build() {
        let engine = ScriptedEngine {
            warn_in_define: true,
            ..ScriptedEngine::default()
        };
        let options = CompilationOptions {
            warnings_as_errors: true,
            ..CompilationOptions::default()
        };
        let (pipeline, diag, unit) = run(engine, &mut text_sources(&["a.hs"]), &options);
        assert!(unit.is_none());
        assert_eq!(diag.error_count(), 1);
        assert_eq!(diag.warning_count(), 0);
        assert!(diag.entries()[0].text.starts_with("Warning as Error: "));
        assert_eq!(pipeline.engine.calls, vec!["parse", "define"]);
    }

    #[test]
    fn unknown_reference_is_reported() {
        let options = CompilationOptions {
            references: vec!["NoSuchModule".into()],
            ..CompilationOptions::default()
        };
        let (_, diag, unit) = run(ScriptedEngine::default(), &mut text_sources(&["a.hs"]), &options);
        assert!(unit.is_none());
        assert_eq!(diag.entries()[0].code, codes::REFERENCE_NOT_FOUND);
        assert!(diag.entries()[0].text.contains("NoSuchModule"));
    }

    #[test]
    fn missing_predefined_types_are_fatal() {
        let mut diag = Diagnostics::new();
        let mut pipeline = Pipeline::new(ScriptedEngine::default(), InProcessFactory::new());
        let unit = pipeline.run(
            Job {
                sources: &mut text_sources(&["a.hs"]),
                imports: &mut ImportSet::new(),
                options: &CompilationOptions::default(),
                encoding: SourceEncoding::Utf8,
            },
            &mut diag,
        );
        assert!(unit.is_none());
        assert_eq!(diag.error_count(), system::PREDEFINED.len());
        assert!(diag.entries().iter().all(|d| d.code == codes::PREDEFINED_MISSING));
    }

    #[test]
    fn debug_builds_checksum_sources() {
        let options = CompilationOptions {
            generate_debug_info: true,
            ..CompilationOptions::default()
        };
        let mut sources = text_sources(&["a.hs"]);
        let (_, diag, _) = run(ScriptedEngine::default(), &mut sources, &options);
        assert_eq!(diag.error_count(), 0);
        let unit = sources.first().unwrap();
        assert_eq!(unit.checksum(), Some(checksum(b"x").as_slice()));
    }

    #[test]
    fn output_names_are_derived_or_validated() {
        let lib = CompilationOptions::default();
        assert_eq!(output_name(Some("dir/hello.hs"), &lib).unwrap(), "hello.lib");

        let exe = CompilationOptions {
            target: TargetKind::Executable,
            ..CompilationOptions::default()
        };
        assert_eq!(output_name(Some("main.hs"), &exe).unwrap(), "main.exe");
        assert_eq!(output_name(None, &lib).unwrap_err().0, codes::NO_OUTPUT_NAME);

        let named = |name: &str| CompilationOptions {
            output_name: Some(name.into()),
            ..CompilationOptions::default()
        };
        assert_eq!(output_name(None, &named("tool.lib")).unwrap(), "tool.lib");
        assert_eq!(output_name(None, &named("bad|name.lib")).unwrap_err().0, codes::BAD_OUTPUT_NAME);
        assert_eq!(output_name(None, &named("  ")).unwrap_err().0, codes::BAD_OUTPUT_NAME);
    }

    #[test]
    fn persisted_builds_write_the_image() {
        let dir = tempfile::tempdir().unwrap();
        let options = CompilationOptions {
            in_memory: false,
            output_dir: dir.path().to_path_buf(),
            ..CompilationOptions::default()
        };
        let (_, diag, unit) = run(ScriptedEngine::default(), &mut text_sources(&["app.hs"]), &options);
        assert_eq!(diag.error_count(), 0);
        assert!(unit.is_some());
        let image = persist::load_image(&dir.path().join("app.lib")).unwrap();
        assert_eq!(image.name, "app");
    }

    #[test]
    fn failed_builds_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = CompilationOptions {
            in_memory: false,
            output_dir: dir.path().to_path_buf(),
            ..CompilationOptions::default()
        };
        options.resources.push(crate::options::Resource {
            name: "missing".into(),
            data: ResourceData::File {
                path: dir.path().join("nope.bin"),
            },
        });
        let (pipeline, diag, unit) = run(ScriptedEngine::default(), &mut text_sources(&["app.hs"]), &options);
        assert!(unit.is_none());
        assert_eq!(pipeline.stage(), Stage::Failed);
        assert_eq!(diag.entries()[0].code, codes::RESOURCE_UNREADABLE);
        assert!(!dir.path().join("app.lib").exists());
    }
}
