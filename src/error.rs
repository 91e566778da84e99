//! Error types for the session facade, persistence and option loading.
//!
//! Compiler problems never appear here: those are diagnostics with stable
//! numeric codes. Faults raised while running compiled code are
//! [`crate::runtime::RuntimeError`].

use std::path::PathBuf;

use thiserror::Error;

/// Misuse of the [`crate::ScriptBuilder`] lifecycle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// An operation was attempted before `start`.
    #[error("no compilation session has been started")]
    NotStarted,

    /// An operation was attempted after `build` without a new `start`.
    #[error("the compilation session was already built; call start again")]
    AlreadyBuilt,

    /// The session rejects duplicate source names and this one was taken.
    #[error("a source named `{0}' was already added")]
    DuplicateSource(String),
}

/// Failure writing or reading a persisted image.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported image format version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
}

/// Failure loading [`crate::CompilationOptions`] from a file.
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("cannot read options file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid options file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("warning level {0} is out of range (0..=4)")]
    WarningLevel(u8),
}
