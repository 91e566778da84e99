use super::ast::Span;
use crate::diagnostics::{Diagnostics, Location};
use crate::source::SourceId;

/// A front-end message with source location, reported into the session's
/// [`Diagnostics`] once the stage that produced it finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub code: u32,
    pub message: String,
    pub span: Span,
    pub kind: ErrorKind,
    pub is_warning: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lexer,
    Parser,
    Type,
}

impl CompileError {
    fn new(kind: ErrorKind, code: u32, message: impl Into<String>, span: Span) -> Self {
        Self {
            code,
            message: message.into(),
            span,
            kind,
            is_warning: false,
        }
    }

    pub fn lexer(code: u32, message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Lexer, code, message, span)
    }

    pub fn parser(code: u32, message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Parser, code, message, span)
    }

    pub fn type_error(code: u32, message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Type, code, message, span)
    }

    pub fn warning(code: u32, message: impl Into<String>, span: Span) -> Self {
        Self {
            is_warning: true,
            ..Self::new(ErrorKind::Type, code, message, span)
        }
    }

    pub fn report(&self, source: SourceId, diag: &mut Diagnostics) {
        let at = Some(Location::new(source, self.span.start));
        if self.is_warning {
            diag.warning(self.code, at, self.message.clone());
        } else {
            diag.error(self.code, at, self.message.clone());
        }
    }
}

pub fn report_all(errors: &[CompileError], source: SourceId, diag: &mut Diagnostics) {
    for e in errors {
        e.report(source, diag);
    }
}
