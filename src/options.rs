use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::diagnostics::WarningPolicy;
use crate::error::OptionsError;

// ── Target and platform ─────────────────────────────────────────

/// Kind of unit produced by a build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    #[default]
    Library,
    Executable,
}

impl TargetKind {
    /// File suffix appended to derived output names.
    pub fn suffix(self) -> &'static str {
        match self {
            TargetKind::Library => ".lib",
            TargetKind::Executable => ".exe",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    #[default]
    AnyCpu,
    AnyCpu32BitPreferred,
    X86,
    X64,
}

/// Data embedded into the unit under a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ResourceData {
    File { path: PathBuf },
    Inline { bytes: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    #[serde(flatten)]
    pub data: ResourceData,
}

// ── Compilation options ─────────────────────────────────────────

/// Everything that configures one build.
///
/// Copied into the session at start; the pipeline only ever reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilationOptions {
    pub target: TargetKind,
    pub generate_debug_info: bool,
    /// Explicit output file name; derived from the first source when absent.
    pub output_name: Option<String>,
    pub warnings_as_errors: bool,
    pub warning_level: u8,
    pub disabled_warnings: Vec<u32>,
    /// Import the whole `System` host module, not just the baseline types.
    pub load_default_library: bool,
    /// Host module names resolved through the process-wide catalog.
    pub references: Vec<String>,
    pub in_memory: bool,
    pub output_dir: PathBuf,
    pub platform: Platform,
    /// Restricts the entry point search to one type (full name).
    pub main_type: Option<String>,
    pub conditional_symbols: Vec<String>,
    pub resources: Vec<Resource>,
}

impl Default for CompilationOptions {
    fn default() -> Self {
        Self {
            target: TargetKind::Library,
            generate_debug_info: false,
            output_name: None,
            warnings_as_errors: false,
            warning_level: 4,
            disabled_warnings: Vec::new(),
            load_default_library: false,
            references: Vec::new(),
            in_memory: true,
            output_dir: PathBuf::from("cache"),
            platform: Platform::AnyCpu,
            main_type: None,
            conditional_symbols: Vec::new(),
            resources: Vec::new(),
        }
    }
}

impl CompilationOptions {
    pub fn from_json_str(path: &Path, json: &str) -> Result<Self, OptionsError> {
        let options: Self = serde_json::from_str(json).map_err(|source| OptionsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a JSON file; missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, OptionsError> {
        let json = fs::read_to_string(path).map_err(|source| OptionsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(path, &json)
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.warning_level > 4 {
            return Err(OptionsError::WarningLevel(self.warning_level));
        }
        Ok(())
    }

    pub fn warning_policy(&self) -> WarningPolicy {
        WarningPolicy {
            as_errors: self.warnings_as_errors,
            level: self.warning_level,
            disabled: self.disabled_warnings.clone(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_in_memory_library() {
        let opts = CompilationOptions::default();
        assert_eq!(opts.target, TargetKind::Library);
        assert!(opts.in_memory);
        assert_eq!(opts.warning_level, 4);
        assert!(!opts.load_default_library);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{ "target": "executable", "warnings_as_errors": true }"#;
        let opts = CompilationOptions::from_json_str(Path::new("opts.json"), json).unwrap();
        assert_eq!(opts.target, TargetKind::Executable);
        assert!(opts.warnings_as_errors);
        assert!(opts.in_memory);
        assert_eq!(opts.target.suffix(), ".exe");
    }

    #[test]
    fn resources_roundtrip_through_json() {
        let json = r#"{ "resources": [
            { "name": "greeting", "source": "inline", "bytes": [104, 105] },
            { "name": "logo", "source": "file", "path": "logo.png" }
        ] }"#;
        let opts = CompilationOptions::from_json_str(Path::new("opts.json"), json).unwrap();
        assert_eq!(opts.resources.len(), 2);
        assert_eq!(
            opts.resources[0].data,
            ResourceData::Inline { bytes: b"hi".to_vec() }
        );
    }

    #[test]
    fn out_of_range_warning_level_is_rejected() {
        let json = r#"{ "warning_level": 9 }"#;
        let err = CompilationOptions::from_json_str(Path::new("o.json"), json).unwrap_err();
        assert!(matches!(err, OptionsError::WarningLevel(9)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        fs::write(&path, r#"{ "generate_debug_info": true }"#).unwrap();
        assert!(CompilationOptions::load(&path).unwrap().generate_debug_info);
        assert!(matches!(
            CompilationOptions::load(&dir.path().join("missing.json")),
            Err(OptionsError::Read { .. })
        ));
    }
}
