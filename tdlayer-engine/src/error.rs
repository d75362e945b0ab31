//! Errors raised at the engine boundary.

use std::fmt;

/// Failure of a `send` / `receive` / `execute` call on an [`crate::Engine`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineError {
    /// The instance was destroyed; no further I/O is possible.
    Destroyed,
    /// The request could not be handed to the engine (e.g. interior NUL byte).
    InvalidRequest(String),
    /// The engine refused to create a new instance.
    CreateFailed,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Destroyed          => write!(f, "engine destroyed"),
            Self::InvalidRequest(s)  => write!(f, "invalid request: {s}"),
            Self::CreateFailed       => write!(f, "engine instance could not be created"),
        }
    }
}

impl std::error::Error for EngineError {}
