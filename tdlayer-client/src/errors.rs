//! Error types for tdlayer-client.

use std::time::Duration;
use std::{fmt, io};

use tdlayer_engine::EngineError;

use crate::auth::AuthorizationState;
use crate::message::Message;

// ─── TdError ──────────────────────────────────────────────────────────────────

/// An `{"@type":"error"}` reply produced by the engine for a request.
///
/// # Example
/// `{"@type":"error","code":400,"message":"PHONE_CODE_INVALID"}`
/// → `TdError { code: 400, message: "PHONE_CODE_INVALID" }`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TdError {
    /// HTTP-like status code.
    pub code:    i32,
    /// Error text, usually in SCREAMING_SNAKE_CASE.
    pub message: String,
}

impl fmt::Display for TdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TDLib {}: {}", self.code, self.message)
    }
}

impl std::error::Error for TdError {}

impl TdError {
    /// Extract the error carried by `message`, if it is an `error` reply.
    pub fn from_message(message: &Message) -> Option<Self> {
        if message.kind() != Some("error") {
            return None;
        }
        let code = message.get("code")
            .and_then(|v| v.as_i64())
            .and_then(|c| i32::try_from(c).ok())
            .unwrap_or(0);
        let text = message.get("message")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        Some(Self { code, message: text })
    }

    /// Match on the error text, with optional wildcard prefix/suffix `'*'`.
    ///
    /// # Examples
    /// - `err.is("PASSWORD_HASH_INVALID")`: exact match
    /// - `err.is("PHONE_CODE_*")`: starts-with match
    /// - `err.is("*_INVALID")`: ends-with match
    pub fn is(&self, pattern: &str) -> bool {
        if let Some(prefix) = pattern.strip_suffix('*') {
            self.message.starts_with(prefix)
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            self.message.ends_with(suffix)
        } else {
            self.message == pattern
        }
    }
}

// ─── InvocationError ──────────────────────────────────────────────────────────

/// The error type returned from any `Client` method that talks to the engine.
#[derive(Debug)]
pub enum InvocationError {
    /// No matching reply arrived within the deadline.
    Timeout(Duration),
    /// A request could not be serialized or a reply could not be decoded.
    Decode(String),
    /// The engine refused the call (e.g. it was destroyed).
    Engine(EngineError),
    /// The engine answered with an `error` reply.
    Td(TdError),
    /// The client shut down while the request was waiting for its reply.
    Dropped,
    /// The OS random source failed while drawing a correlation token.
    Entropy(getrandom::Error),
    /// The client was started outside a tokio runtime.
    NoRuntime,
}

impl fmt::Display for InvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(d)  => write!(f, "no reply within {d:?}"),
            Self::Decode(s)   => write!(f, "decode error: {s}"),
            Self::Engine(e)   => write!(f, "engine error: {e}"),
            Self::Td(e)       => write!(f, "{e}"),
            Self::Dropped     => write!(f, "request dropped"),
            Self::Entropy(e)  => write!(f, "random source failed: {e}"),
            Self::NoRuntime   => write!(f, "no tokio runtime to run the dispatch loop on"),
        }
    }
}

impl std::error::Error for InvocationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Engine(e) => Some(e),
            Self::Td(e)      => Some(e),
            Self::Entropy(e) => Some(e),
            _                => None,
        }
    }
}

impl From<EngineError> for InvocationError {
    fn from(e: EngineError) -> Self { Self::Engine(e) }
}

impl From<serde_json::Error> for InvocationError {
    fn from(e: serde_json::Error) -> Self { Self::Decode(e.to_string()) }
}

impl From<TdError> for InvocationError {
    fn from(e: TdError) -> Self { Self::Td(e) }
}

impl From<getrandom::Error> for InvocationError {
    fn from(e: getrandom::Error) -> Self { Self::Entropy(e) }
}

impl InvocationError {
    /// Returns `true` if this is the named engine error (supports `'*'` wildcards).
    pub fn is(&self, pattern: &str) -> bool {
        match self {
            Self::Td(e) => e.is(pattern),
            _           => false,
        }
    }

    /// Returns `true` if the call gave up waiting for its reply.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

// ─── AuthError ────────────────────────────────────────────────────────────────

/// Errors returned by [`crate::Client::authorize`] and [`crate::Client::advance`].
#[derive(Debug)]
pub enum AuthError {
    /// The engine is closing, closed or logging out; the flow cannot continue.
    Closed(AuthorizationState),
    /// The credential source failed to produce a value.
    Input(io::Error),
    /// A request made on behalf of the flow failed.
    Invocation(InvocationError),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed(state) => write!(f, "authorization stopped: {state}"),
            Self::Input(e)      => write!(f, "credential input failed: {e}"),
            Self::Invocation(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Closed(_)     => None,
            Self::Input(e)      => Some(e),
            Self::Invocation(e) => Some(e),
        }
    }
}

impl From<InvocationError> for AuthError {
    fn from(e: InvocationError) -> Self { Self::Invocation(e) }
}

impl From<io::Error> for AuthError {
    fn from(e: io::Error) -> Self { Self::Input(e) }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
