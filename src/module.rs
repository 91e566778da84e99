//! The result of one build: diagnostics plus, on success, a loaded unit.

use std::io::Write;

use crate::diagnostics::Diagnostic;
use crate::runtime::image::MethodRef;
use crate::runtime::{LoadedUnit, RuntimeError, TypeHandle, Value};

/// Immutable outcome of a build. A module with errors never holds a unit.
#[derive(Debug)]
pub struct CompiledModule {
    unit: Option<LoadedUnit>,
    error_count: usize,
    warning_count: usize,
    diagnostics: Vec<Diagnostic>,
}

impl CompiledModule {
    pub(crate) fn new(
        unit: Option<LoadedUnit>,
        error_count: usize,
        warning_count: usize,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        let unit = unit.filter(|_| error_count == 0);
        Self {
            unit,
            error_count,
            warning_count,
            diagnostics,
        }
    }

    /// Top-level types of the unit; empty when the build failed.
    pub fn types(&self) -> Vec<TypeHandle> {
        self.unit.as_ref().map(LoadedUnit::defined_types).unwrap_or_default()
    }

    /// Any type by full name, nested types included.
    pub fn find_type(&self, full_name: &str) -> Option<TypeHandle> {
        self.unit.as_ref()?.find_type(full_name)
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn is_loaded(&self) -> bool {
        self.unit.as_ref().is_some_and(LoadedUnit::is_linked)
    }

    pub fn unit(&self) -> Option<&LoadedUnit> {
        self.unit.as_ref()
    }

    pub fn entry_point(&self) -> Option<MethodRef> {
        self.unit.as_ref()?.entry_point()
    }

    pub fn run_main(&self) -> Result<Value, RuntimeError> {
        self.unit.as_ref().ok_or(RuntimeError::Unloaded)?.run_main()
    }

    pub fn resource(&self, name: &str) -> Option<&[u8]> {
        self.unit.as_ref()?.resource(name)
    }

    /// Redirects `Console` output of the loaded unit. No-op when absent.
    pub fn redirect_output<W: Write + Send + 'static>(&self, writer: W) {
        if let Some(unit) = &self.unit {
            unit.redirect_output(writer);
        }
    }
}
