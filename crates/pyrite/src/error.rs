use std::fmt;

use strum::{Display, IntoStaticStr};

/// Result type alias for operations that can abort the current translation.
pub type CompileResult<T> = Result<T, CompileError>;

/// A source position within an SL module.
///
/// Lines and columns are 1-indexed the way editors display them. Positions
/// survive into diagnostics only; the emitter does not produce source maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CodeLoc {
    pub line: u32,
    pub col: u32,
}

impl CodeLoc {
    #[must_use]
    pub const fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }

    /// Returns a copy shifted down by `offset` lines.
    ///
    /// Used when a method was re-parsed in isolation under a dummy class
    /// header and its positions must be mapped back to the original file.
    #[must_use]
    pub const fn offset_lines(self, offset: u32) -> Self {
        Self {
            line: self.line + offset,
            col: self.col,
        }
    }
}

impl fmt::Display for CodeLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.col)
    }
}

/// The fatal error categories of the translation pipeline.
///
/// The recoverable dependency signal used inside the inference driver is not
/// part of this enum: it never escapes to the user (see `analyze::InferError`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// A referenced name is not in scope.
    #[strum(serialize = "name resolution failure")]
    NameResolution,
    /// An empty collection or unannotated parameter has no inferable concrete type.
    #[strum(serialize = "type underspecification")]
    Underspecified,
    /// A declared annotation and an inferred value disagree.
    #[strum(serialize = "type mismatch")]
    TypeMismatch,
    /// An AST construct the analyzer or emitter does not model.
    #[strum(serialize = "unsupported construct")]
    Unsupported,
    /// The external style post-processor exited non-zero.
    #[strum(serialize = "external tool failure")]
    ExternalTool,
}

/// A fatal translation error with the offending construct and source line.
///
/// Every kind aborts the current translation; no partial output is written.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
    pub loc: Option<CodeLoc>,
}

impl CompileError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, loc: Option<CodeLoc>) -> Self {
        Self {
            kind,
            message: message.into(),
            loc,
        }
    }

    pub fn name(message: impl Into<String>, loc: Option<CodeLoc>) -> Self {
        Self::new(ErrorKind::NameResolution, message, loc)
    }

    /// The canonical underspecification message, shared by parameters,
    /// empty collection literals and failed generic argument inference.
    pub fn underspecified(loc: Option<CodeLoc>) -> Self {
        Self::new(
            ErrorKind::Underspecified,
            "Concrete type could not be determined from type annotation or value.",
            loc,
        )
    }

    pub fn mismatch(message: impl Into<String>, loc: Option<CodeLoc>) -> Self {
        Self::new(ErrorKind::TypeMismatch, message, loc)
    }

    pub fn unsupported(message: impl Into<String>, loc: Option<CodeLoc>) -> Self {
        Self::new(ErrorKind::Unsupported, message, loc)
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExternalTool, message, None)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.loc {
            Some(loc) => write!(f, "{} at {}: {}", self.kind, loc, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for CompileError {}
