//! Compiler message collection: counting, warning policy and printing.

use std::fmt;
use std::io::Write;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::source::SourceId;

/// Stable numeric diagnostic codes.
pub mod codes {
    pub const REFERENCE_NOT_FOUND: u32 = 6;
    pub const ENTRY_POINT_MULTIPLE: u32 = 17;
    pub const OPERATOR_MISMATCH: u32 = 19;
    pub const UNARY_MISMATCH: u32 = 23;
    pub const NO_CONVERSION: u32 = 29;
    pub const THIS_IN_STATIC: u32 = 26;
    pub const THROW_TYPE: u32 = 155;
    pub const MAIN_TYPE_NOT_FOUND: u32 = 1555;
    pub const WRITE_FAILED: u32 = 16;
    pub const DUPLICATE_PARAMETER: u32 = 100;
    pub const DUPLICATE_TYPE: u32 = 101;
    pub const DUPLICATE_MEMBER: u32 = 102;
    pub const UNKNOWN_NAME: u32 = 103;
    pub const DUPLICATE_USING: u32 = 105;
    pub const BAD_MODIFIER: u32 = 106;
    pub const MULTIPLE_PROTECTION: u32 = 107;
    pub const MISSING_MEMBER: u32 = 117;
    pub const TYPE_AS_VALUE: u32 = 119;
    pub const INSTANCE_REQUIRED: u32 = 120;
    pub const INACCESSIBLE: u32 = 122;
    pub const RETURN_VALUE_REQUIRED: u32 = 126;
    pub const RETURN_IN_VOID: u32 = 127;
    pub const DUPLICATE_LOCAL: u32 = 128;
    pub const INVALID_ASSIGN_TARGET: u32 = 131;
    pub const BREAK_OUTSIDE_LOOP: u32 = 139;
    pub const NO_CONSTRUCTORS: u32 = 143;
    pub const NOT_ALL_PATHS_RETURN: u32 = 161;
    pub const UNREACHABLE_CODE: u32 = 162;
    pub const STATIC_VIA_INSTANCE: u32 = 176;
    pub const UNUSED_VARIABLE: u32 = 219;
    pub const NAMESPACE_MEMBER_MISSING: u32 = 234;
    pub const UNKNOWN_TYPE: u32 = 246;
    pub const PREDEFINED_MISSING: u32 = 518;
    pub const INTERNAL_ERROR: u32 = 584;
    pub const ARITY_MISMATCH: u32 = 1501;
    pub const ARGUMENT_MISMATCH: u32 = 1503;
    pub const CONSTRUCTOR_ARITY: u32 = 1729;
    pub const DUPLICATE_MODIFIER: u32 = 1004;
    pub const SYNTAX_UNEXPECTED: u32 = 1525;
    pub const SYNTAX_EXPECTED: u32 = 1003;
    pub const BAD_ESCAPE: u32 = 1009;
    pub const NEWLINE_IN_CONSTANT: u32 = 1010;
    pub const INTEGER_TOO_LARGE: u32 = 1021;
    pub const BAD_DIRECTIVE: u32 = 1024;
    pub const UNTERMINATED_COMMENT: u32 = 1035;
    pub const UNEXPECTED_CHARACTER: u32 = 1056;
    pub const ENDIF_EXPECTED: u32 = 1027;
    pub const UNEXPECTED_DIRECTIVE: u32 = 1028;
    pub const NO_OUTPUT_NAME: u32 = 1562;
    pub const RESOURCE_UNREADABLE: u32 = 1566;
    pub const SOURCE_NOT_FOUND: u32 = 2001;
    pub const NO_SOURCES: u32 = 2008;
    pub const BINARY_SOURCE: u32 = 2015;
    pub const BAD_ENCODING: u32 = 2016;
    pub const BAD_OUTPUT_NAME: u32 = 2021;
    pub const PLATFORM_MISMATCH: u32 = 4023;
    pub const ENTRY_POINT_MISSING: u32 = 5001;
    pub const TOO_COMPLEX: u32 = 8078;
    pub const SLOT_LIMIT: u32 = 8079;

    /// Lowest warning level at which a warning is reported.
    pub fn warning_level(code: u32) -> u8 {
        match code {
            UNREACHABLE_CODE => 2,
            DUPLICATE_USING | UNUSED_VARIABLE => 3,
            _ => 1,
        }
    }
}

/// A position inside a registered source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub source: SourceId,
    pub offset: usize,
}

impl Location {
    pub fn new(source: SourceId, offset: usize) -> Self {
        Self { source, offset }
    }
}

/// One recorded compiler message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub is_warning: bool,
    pub code: u32,
    pub text: String,
    pub file: Option<String>,
    pub line: usize,
    pub column: usize,
}

impl Diagnostic {
    pub fn code_name(&self) -> String {
        format!("SC{:04}", self.code)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{file}({},{}): ", self.line, self.column)?;
        }
        let severity = if self.is_warning { "warning" } else { "error" };
        write!(f, "{severity} {}: {}", self.code_name(), self.text)
    }
}

/// Receives every diagnostic as it is recorded.
pub trait ReportPrinter: Send {
    fn print(&mut self, diagnostic: &Diagnostic);
}

/// Writes one formatted line per diagnostic to a stream.
pub struct StreamPrinter<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> StreamPrinter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> ReportPrinter for StreamPrinter<W> {
    fn print(&mut self, diagnostic: &Diagnostic) {
        // Printing is best effort; the diagnostic is already recorded.
        let _ = writeln!(self.out, "{diagnostic}");
    }
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Default)]
pub struct TracingPrinter;

impl ReportPrinter for TracingPrinter {
    fn print(&mut self, d: &Diagnostic) {
        if d.is_warning {
            tracing::warn!(code = %d.code_name(), file = ?d.file, line = d.line, "{}", d.text);
        } else {
            tracing::error!(code = %d.code_name(), file = ?d.file, line = d.line, "{}", d.text);
        }
    }
}

/// Which warnings survive and how they are counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarningPolicy {
    pub as_errors: bool,
    pub level: u8,
    pub disabled: Vec<u32>,
}

impl Default for WarningPolicy {
    fn default() -> Self {
        Self {
            as_errors: false,
            level: 4,
            disabled: Vec::new(),
        }
    }
}

const WARNING_AS_ERROR_PREFIX: &str = "Warning as Error: ";

struct RegisteredSource {
    name: String,
    text: String,
    line_starts: Vec<usize>,
}

impl RegisteredSource {
    fn new(name: &str, text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            name: name.to_string(),
            text: text.to_string(),
            line_starts,
        }
    }

    /// 1-based (line, column); columns count characters.
    fn line_col(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.text.len());
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let start = self.line_starts.get(line_idx).copied().unwrap_or(0);
        let col = self
            .text
            .get(start..offset)
            .map_or(offset - start, |s| s.chars().count());
        (line_idx + 1, col + 1)
    }
}

/// Append-only diagnostic log owned by one compilation session.
#[derive(Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    errors: usize,
    warnings: usize,
    policy: WarningPolicy,
    sources: IndexMap<SourceId, RegisteredSource>,
    printer: Option<Box<dyn ReportPrinter>>,
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("errors", &self.errors)
            .field("warnings", &self.warnings)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_printer(printer: Box<dyn ReportPrinter>) -> Self {
        Self {
            printer: Some(printer),
            ..Self::default()
        }
    }

    pub fn set_policy(&mut self, policy: WarningPolicy) {
        self.policy = policy;
    }

    /// Make `(source, offset)` locations resolvable for this unit.
    pub fn register_source(&mut self, id: SourceId, name: &str, text: &str) {
        self.sources.insert(id, RegisteredSource::new(name, text));
    }

    pub fn error(&mut self, code: u32, at: Option<Location>, text: impl Into<String>) {
        let (file, line, column) = self.resolve(at);
        self.record(Diagnostic {
            is_warning: false,
            code,
            text: text.into(),
            file,
            line,
            column,
        });
    }

    /// Report a warning, subject to the warning policy.
    pub fn warning(&mut self, code: u32, at: Option<Location>, text: impl Into<String>) {
        if codes::warning_level(code) > self.policy.level || self.policy.disabled.contains(&code) {
            return;
        }
        let (file, line, column) = self.resolve(at);
        let text = text.into();
        let diagnostic = if self.policy.as_errors {
            Diagnostic {
                is_warning: false,
                code,
                text: format!("{WARNING_AS_ERROR_PREFIX}{text}"),
                file,
                line,
                column,
            }
        } else {
            Diagnostic {
                is_warning: true,
                code,
                text,
                file,
                line,
                column,
            }
        };
        self.record(diagnostic);
    }

    /// Append a fully formed diagnostic, count it and print it.
    pub fn record(&mut self, diagnostic: Diagnostic) {
        if diagnostic.is_warning {
            self.warnings += 1;
        } else {
            self.errors += 1;
        }
        if let Some(printer) = self.printer.as_mut() {
            printer.print(&diagnostic);
        }
        self.entries.push(diagnostic);
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<Diagnostic> {
        self.entries
    }

    fn resolve(&self, at: Option<Location>) -> (Option<String>, usize, usize) {
        let Some(loc) = at else {
            return (None, 0, 0);
        };
        match self.sources.get(&loc.source) {
            Some(src) => {
                let (line, col) = src.line_col(loc.offset);
                (Some(src.name.clone()), line, col)
            }
            None => (None, 0, 0),
        }
    }
}
