//! Error types for rule compilation.

use thiserror::Error;

/// Failure to turn a rule description into an automaton.
///
/// Compilation happens once at start-up; any of these is fatal for the
/// rule set that produced it. Paths are rendered with control names,
/// e.g. `ESC [ ?`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("conflicting rules at {path}: {detail}")]
    Conflict { path: String, detail: String },

    #[error("unreachable rule at {path}: {detail}")]
    Unreachable { path: String, detail: String },

    #[error("invalid dispatch table at {path}: {detail}")]
    InvalidDispatch { path: String, detail: String },
}
