//! Core error and diagnostic types.

use thiserror::Error;

/// Source location information for error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// Optional file path.
    pub file: Option<String>,
    /// Line number (1-indexed).
    pub line: usize,
    /// Column number (1-indexed).
    pub column: usize,
}

impl SourceLocation {
    /// Create a new source location.
    pub fn new(line: usize, column: usize) -> Self {
        Self {
            file: None,
            line,
            column,
        }
    }

    /// Create a source location with file information.
    pub fn with_file(file: String, line: usize, column: usize) -> Self {
        Self {
            file: Some(file),
            line,
            column,
        }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}:{}:{}", file, self.line, self.column)
        } else {
            write!(f, "{}:{}", self.line, self.column)
        }
    }
}

/// Errors that can occur while driving the streaming engine.
#[derive(Debug, Error)]
pub enum MarkflowError {
    /// UTF-8 encoding error surfaced while decoding appended bytes.
    #[error("Encoding error: {0}")]
    EncodingError(#[from] std::string::FromUtf8Error),
    /// A patch could not be applied to the store (missing target, bad index).
    #[error("Patch apply error at {location}: {message}")]
    PatchApply {
        /// Error message.
        message: String,
        /// Source location, relative to the block/node the patch targeted.
        location: SourceLocation,
    },
    /// MDX compilation failed for a specific block.
    #[error("MDX compile error: {0}")]
    MdxCompile(String),
    /// A store invariant was violated and could not be healed.
    #[error("Store invariant violated: {0}")]
    StoreInvariant(String),
    /// Internal logic error (unexpected state).
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl MarkflowError {
    /// Create a patch-apply error with location.
    pub fn patch_apply(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self::PatchApply {
            message: message.into(),
            location: SourceLocation::new(line, column),
        }
    }
}

/// The phase of the pipeline in which a `DocumentEvent::Error` originated.
///
/// Mirrors the `phase` field of spec.md's `{type:"ERROR", phase, ...}` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPhase {
    /// Parsing/tokenization.
    Parse,
    /// Diff generation.
    Diff,
    /// Patch coalescing.
    Coalesce,
    /// Store application.
    Store,
    /// Scheduler dispatch.
    Scheduler,
    /// An external collaborator (highlighter, sanitizer, MDX compiler).
    External,
}

/// Non-fatal warnings that don't prevent rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseWarning {
    /// Code fence opened but never closed by the time the stream finalized.
    UnclosedCodeFence {
        /// Source location where the fence started.
        location: SourceLocation,
        /// Fence marker character (backtick or tilde).
        marker: char,
        /// Surrounding context for error message.
        context: String,
    },
    /// A table row had a different cell count than the header.
    RaggedTableRow {
        /// Source location of the row.
        location: SourceLocation,
        /// Expected cell count (from the header).
        expected: usize,
        /// Actual cell count found.
        actual: usize,
    },
    /// Other potential warnings for future use.
    SuspiciousMarkup {
        /// Source location where the suspicious markup was found.
        location: SourceLocation,
        /// Warning message.
        message: String,
    },
}

impl ParseWarning {
    /// Get the location of this warning.
    pub fn location(&self) -> &SourceLocation {
        match self {
            ParseWarning::UnclosedCodeFence { location, .. } => location,
            ParseWarning::RaggedTableRow { location, .. } => location,
            ParseWarning::SuspiciousMarkup { location, .. } => location,
        }
    }
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseWarning::UnclosedCodeFence {
                location,
                marker,
                context,
            } => {
                write!(
                    f,
                    "Unclosed code fence ({}): {}, near '{}'",
                    marker, location, context
                )
            }
            ParseWarning::RaggedTableRow {
                location,
                expected,
                actual,
            } => write!(
                f,
                "{}: table row has {} cells, expected {}",
                location, actual, expected
            ),
            ParseWarning::SuspiciousMarkup { location, message } => {
                write!(f, "{}: {}", location, message)
            }
        }
    }
}

/// Recoverable error information, confined to a single block's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoverableError {
    /// Error message.
    pub message: String,
    /// Source location.
    pub location: SourceLocation,
    /// Error severity.
    pub severity: ErrorSeverity,
}

/// Error severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Error that was recovered from (block degraded, not dropped).
    Error,
    /// Warning that doesn't prevent rendering.
    Warning,
}

impl RecoverableError {
    /// Create a new recoverable error.
    pub fn error(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            location: SourceLocation::new(line, column),
            severity: ErrorSeverity::Error,
        }
    }

    /// Create a new warning.
    pub fn warning(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            location: SourceLocation::new(line, column),
            severity: ErrorSeverity::Warning,
        }
    }
}

impl std::fmt::Display for RecoverableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            ErrorSeverity::Error => "error",
            ErrorSeverity::Warning => "warning",
        };
        write!(f, "{} at {}: {}", severity, self.location, self.message)
    }
}

/// Collection of parse diagnostics (warnings and recoverable errors) for one tick.
#[derive(Debug, Clone, Default)]
pub struct ParseDiagnostics {
    /// List of non-fatal warnings.
    pub warnings: Vec<ParseWarning>,
    /// List of recoverable errors.
    pub errors: Vec<RecoverableError>,
}

impl ParseDiagnostics {
    /// Create a new empty diagnostics collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a warning to the diagnostics collection.
    pub fn add_warning(&mut self, warning: ParseWarning) {
        self.warnings.push(warning);
    }

    /// Add a recoverable error to the diagnostics collection.
    pub fn add_error(&mut self, error: RecoverableError) {
        self.errors.push(error);
    }

    /// Check if there are any warnings.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Check if there are any errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Check if there are any diagnostics at all.
    pub fn has_any(&self) -> bool {
        self.has_warnings() || self.has_errors()
    }

    /// Merge another diagnostics collection into this one.
    pub fn extend(&mut self, other: ParseDiagnostics) {
        self.warnings.extend(other.warnings);
        self.errors.extend(other.errors);
    }
}
