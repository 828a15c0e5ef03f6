//! Error taxonomy for the translator back end.
//!
//! Three kinds of failure are distinguished by type rather than by an
//! ad-hoc string: [`TranslateError`] aborts the whole translation and
//! produces no module, [`DwarfError`] degrades a single probe or module,
//! and the runtime-reported strings the emitter itself generates (listed
//! in [`crate::emit::budget`]) are not Rust errors at all — they are C
//! string literals baked into the generated module and surface at
//! `insmod`/probe-fire time, long after this crate has finished running.

use std::fmt;

use crate::types::ast::Token;

/// A diagnostic anchored to the token that caused it, carrying the
/// file/line/column a user would need to find the offending line.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub token: Token,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.token, self.message)
    }
}

/// Fatal, translate-time errors. These stop the pipeline; no C file is
/// emitted when one of these is returned by the driver.
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("{0}")]
    Semantic(Diagnostic),

    #[error("unresolved variable `{name}` referenced at {token}")]
    UnresolvedVariable { name: String, token: Token },

    #[error("type mismatch at {token}: expected {expected:?}, found {found:?}")]
    TypeMismatch {
        token: Token,
        expected: crate::types::ast::Type,
        found: crate::types::ast::Type,
    },

    #[error("`<<<` at {token} requires a stats lvalue and a long rvalue")]
    BadStatsInsert { token: Token },

    #[error("compound assignment `{op}` is not defined for strings at {token}")]
    BadStringCompoundAssign { token: Token, op: String },

    #[error("histogram shape at {token} does not match the declared statistic")]
    HistogramShapeMismatch { token: Token },

    #[error("print call at {token} has {count} arguments, the limit is 32")]
    TooManyPrintArgs { token: Token, count: usize },

    #[error("indentation did not return to zero after driver section {section}")]
    IndentationLeak { section: &'static str },

    #[error(transparent)]
    Dwarf(#[from] DwarfError),
}

impl From<gimli::Error> for DwarfError {
    fn from(source: gimli::Error) -> Self {
        DwarfError::Gimli { path: String::new(), source }
    }
}

/// DWARF/ELF access failures. Most are recoverable at the granularity of
/// one probe or one module;
/// when the caller explicitly named the probe's target, the driver
/// upgrades these to a [`TranslateError`] instead of dropping silently.
#[derive(Debug, thiserror::Error)]
pub enum DwarfError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: object::read::Error,
    },

    #[error("i/o error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("gimli error reading {path}: {source}")]
    Gimli {
        path: String,
        #[source]
        source: gimli::Error,
    },

    #[error("no debug info for {module}; try installing {rpm_hint}")]
    MissingDebugInfo { module: String, rpm_hint: String },

    #[error("function `{name}` is blacklisted and guru mode is off")]
    Blacklisted { name: String },

    #[error("translation interrupted")]
    Interrupted,

    #[error("location expression at {token} would need more than 32 words of stack")]
    LocationStackOverflow { token: Token },

    #[error("location expression at {token} targets a bit-field, which cannot be written")]
    BitFieldWrite { token: Token },

    #[error("location expression at {token} would read a float/complex value, unsupported")]
    FloatComplexRead { token: Token },

    #[error("unsupported machine type {0:#x} for PLT enumeration")]
    UnsupportedMachine(u16),
}

pub type Result<T, E = TranslateError> = std::result::Result<T, E>;
