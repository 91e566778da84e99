use thiserror::Error;

/// A fault raised while running compiled code or calling into it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("type `{type_name}' has no accessible member `{member}'")]
    MissingMember { type_name: String, member: String },

    #[error("`{member}' takes {expected} argument(s) but {found} were supplied")]
    Arity {
        member: String,
        expected: usize,
        found: usize,
    },

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("object reference not set to an instance of an object")]
    NullReference,

    #[error("attempted to divide by zero")]
    DivisionByZero,

    #[error("call depth limit of {0} exceeded")]
    StackOverflow(usize),

    #[error("unhandled exception {type_name}: {message}")]
    Thrown { type_name: String, message: String },

    #[error("host member `{member}' failed: {message}")]
    Host { member: String, message: String },

    #[error("the compiled unit is no longer loaded")]
    Unloaded,

    #[error("the unit has no entry point")]
    NoEntryPoint,

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("output error: {0}")]
    Output(String),
}

impl RuntimeError {
    /// Shorthand used by host member implementations.
    pub fn host(member: impl Into<String>, message: impl Into<String>) -> Self {
        RuntimeError::Host {
            member: member.into(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        RuntimeError::InvalidImage(message.into())
    }
}
