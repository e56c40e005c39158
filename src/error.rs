//! Crate-wide error taxonomy.
//!
//! Mirrors the teacher's `PsxError`: one `thiserror` enum covering every
//! failure the public API can surface, plus a dedicated [`ParseError`] for
//! the expression language, which is *not* a callback-level error (see
//! spec §7) — a bad trigger string disables the achievement that owns it
//! and is reported through the `log` callback, not returned to a caller.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors returned from the session orchestrator and public runtime API.
///
/// Variant names mirror spec §7's taxonomy of error *kinds*, not the
/// original C library's `RC_*` integer constants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("invalid JSON response: {0}")]
    InvalidJson(String),
    #[error("API failure: {0}")]
    ApiFailure(String),
    #[error("login required")]
    LoginRequired,
    #[error("no game loaded")]
    NoGameLoaded,
    #[error("unknown game")]
    UnknownGame,
    #[error("hardcore disabled")]
    HardcoreDisabled,
    #[error("operation aborted")]
    Aborted,
    #[error("out of memory")]
    OutOfMemory,
    #[error("missing value: {0}")]
    MissingValue(String),
}

/// Kinds of failure the DSL parser (spec §4.B) can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    InvalidOperator,
    InvalidMeasured,
    MultipleMeasured,
    InvalidValueFlag,
    UnknownSize,
    MissingOperand,
    AddressOutOfRange,
    InvalidMeasuredTarget,
    UnbalancedLeaderboard,
    CyclicModifiedMemref,
    UnexpectedEnd,
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ParseErrorKind::InvalidOperator => "invalid operator",
            ParseErrorKind::InvalidMeasured => "invalid measured flag",
            ParseErrorKind::MultipleMeasured => "multiple measured conditions in one group",
            ParseErrorKind::InvalidValueFlag => "flag not allowed in a value expression",
            ParseErrorKind::UnknownSize => "unknown size letter",
            ParseErrorKind::MissingOperand => "missing operand",
            ParseErrorKind::AddressOutOfRange => "address out of range",
            ParseErrorKind::InvalidMeasuredTarget => "invalid measured target",
            ParseErrorKind::UnbalancedLeaderboard => "leaderboard missing a required segment",
            ParseErrorKind::CyclicModifiedMemref => "modified memref graph contains a cycle",
            ParseErrorKind::UnexpectedEnd => "unexpected end of expression",
        };
        f.write_str(s)
    }
}

/// A DSL parse failure: byte offset into the source text plus a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("parse error at offset {offset}: {kind}")]
pub struct ParseError {
    pub offset: usize,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(offset: usize, kind: ParseErrorKind) -> Self {
        ParseError { offset, kind }
    }
}
