//! Errors surfaced by the structure engine.

use std::fmt;
use std::sync::Arc;

use coil_path::PathError;
use snafu::{Backtrace, Snafu};

/// Where, in the original source text, an error occurred.
///
/// `Include` and `Link` nodes carry one of these from the parser so that
/// error messages can be prefixed with `line N in FILE`, per the engine's
/// user-visible error contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// The file the erroring value originated from, if known.
    pub file: Option<Arc<str>>,
    /// 1-indexed line number.
    pub line: u32,
    /// 1-indexed column number.
    pub column: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) => write!(f, "line {} in {file}", self.line),
            None => write!(f, "line {}", self.line),
        }
    }
}

/// The unified error type for all structure-engine operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub), context(suffix(Ctx)))]
pub enum CoilError {
    /// A path failed to parse or resolve; see [`coil_path::PathError`].
    #[snafu(display("{}{source}", location.as_ref().map(|l| format!("{l}: ")).unwrap_or_default()))]
    Path {
        #[snafu(source)]
        source: PathError,
        location: Option<SourceLocation>,
        backtrace: Backtrace,
    },

    /// A semantic error in the struct engine: cycles, illegal `@extends`,
    /// double-delete, or a prototype used but never defined.
    #[snafu(display("{}{message}", location.as_ref().map(|l| format!("{l}: ")).unwrap_or_default()))]
    Struct {
        message: String,
        location: Option<SourceLocation>,
        backtrace: Backtrace,
    },

    /// An include's target file could not be read, or names itself.
    #[snafu(display("{}{message}", location.as_ref().map(|l| format!("{l}: ")).unwrap_or_default()))]
    File {
        message: String,
        location: Option<SourceLocation>,
        backtrace: Backtrace,
    },

    /// A link's target path resolved to something unusable.
    #[snafu(display("{}{message}", location.as_ref().map(|l| format!("{l}: ")).unwrap_or_default()))]
    Link {
        message: String,
        location: Option<SourceLocation>,
        backtrace: Backtrace,
    },

    /// A key was malformed or used illegally.
    #[snafu(display("{}{message}", location.as_ref().map(|l| format!("{l}: ")).unwrap_or_default()))]
    Key {
        message: String,
        location: Option<SourceLocation>,
        backtrace: Backtrace,
    },

    /// A key or path was looked up and found absent.
    #[snafu(display("{}{message}", location.as_ref().map(|l| format!("{l}: ")).unwrap_or_default()))]
    KeyMissing {
        message: String,
        location: Option<SourceLocation>,
        backtrace: Backtrace,
    },

    /// A value was the wrong kind for the operation attempted on it.
    #[snafu(display("{}{message}", location.as_ref().map(|l| format!("{l}: ")).unwrap_or_default()))]
    Value {
        message: String,
        location: Option<SourceLocation>,
        backtrace: Backtrace,
    },

    /// An invariant failure; should not occur in correct usage of this crate.
    #[snafu(display("internal error: {message}"))]
    Internal {
        message: String,
        backtrace: Backtrace,
    },
}

impl CoilError {
    /// Builds a [`CoilError::Struct`] with no attached source location.
    pub fn struct_error(message: impl Into<String>) -> Self {
        StructCtx {
            message: message.into(),
            location: None,
        }
        .build()
    }

    /// Builds a [`CoilError::Internal`] for a condition that should be
    /// unreachable under the crate's own invariants.
    pub fn internal(message: impl Into<String>) -> Self {
        InternalCtx {
            message: message.into(),
        }
        .build()
    }

    /// Builds a [`CoilError::Value`] with no attached source location, for a
    /// value of the wrong kind being used where a specific kind is required.
    pub fn value_error(message: impl Into<String>) -> Self {
        ValueCtx {
            message: message.into(),
            location: None,
        }
        .build()
    }
}
