//! Typed requests understood by the engine.
//!
//! Only the handful of functions the client itself needs are modelled; any
//! other request can be sent as a [`Message`] or raw JSON.

use serde::Serialize;

use crate::auth::AuthorizationState;
use crate::config::TdlibParameters;
use crate::errors::{InvocationError, TdError};
use crate::message::Message;

// ─── Request / Response ───────────────────────────────────────────────────────

/// A request with a known reply type.
///
/// The `@type` tag comes from the serde container attributes, e.g.
/// `#[serde(tag = "@type", rename = "getAuthorizationState")]`.
pub trait Request: Serialize {
    /// What the engine answers with.
    type Response: Response;

    /// Serialize into an outgoing message.
    fn to_message(&self) -> Result<Message, InvocationError> {
        Message::from_value(serde_json::to_value(self)?)
    }
}

/// A reply decodable from a [`Message`].
pub trait Response: Sized {
    /// Decode `message`. `error` replies never reach this point.
    fn from_message(message: Message) -> Result<Self, InvocationError>;
}

impl Response for Message {
    fn from_message(message: Message) -> Result<Self, InvocationError> { Ok(message) }
}

/// Turn an `error` reply into [`InvocationError::Td`], pass anything else on.
pub(crate) fn check_reply(message: Message) -> Result<Message, InvocationError> {
    match TdError::from_message(&message) {
        Some(e) => Err(InvocationError::Td(e)),
        None    => Ok(message),
    }
}

// ─── Ack ──────────────────────────────────────────────────────────────────────

/// The engine's `ok` object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Ack;

impl Response for Ack {
    fn from_message(message: Message) -> Result<Self, InvocationError> {
        match message.kind() {
            Some("ok") => Ok(Ack),
            other => Err(InvocationError::Decode(format!("expected ok, got {other:?}"))),
        }
    }
}

// ─── Functions ────────────────────────────────────────────────────────────────

/// Ask for the current authorization state.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(tag = "@type", rename = "getAuthorizationState")]
pub struct GetAuthorizationState {}

impl Request for GetAuthorizationState {
    type Response = AuthorizationState;
}

/// Hand the engine its startup parameters.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "@type", rename = "setTdlibParameters")]
pub struct SetTdlibParameters {
    pub parameters: TdlibParameters,
}

impl Request for SetTdlibParameters {
    type Response = Ack;
}

/// Unlock the local database.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "@type", rename = "checkDatabaseEncryptionKey")]
pub struct CheckDatabaseEncryptionKey {
    pub encryption_key: String,
}

impl Request for CheckDatabaseEncryptionKey {
    type Response = Ack;
}

/// Start login with a phone number.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "@type", rename = "setAuthenticationPhoneNumber")]
pub struct SetAuthenticationPhoneNumber {
    pub phone_number: String,
}

impl Request for SetAuthenticationPhoneNumber {
    type Response = Ack;
}

/// Submit the login code.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "@type", rename = "checkAuthenticationCode")]
pub struct CheckAuthenticationCode {
    pub code: String,
}

impl Request for CheckAuthenticationCode {
    type Response = Ack;
}

/// Submit the 2FA password.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "@type", rename = "checkAuthenticationPassword")]
pub struct CheckAuthenticationPassword {
    pub password: String,
}

impl Request for CheckAuthenticationPassword {
    type Response = Ack;
}

/// Change the engine's internal log verbosity. Synchronously executable.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "@type", rename = "setLogVerbosityLevel")]
pub struct SetLogVerbosityLevel {
    pub new_verbosity_level: i32,
}

impl Request for SetLogVerbosityLevel {
    type Response = Ack;
}

/// Log out of the current account.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(tag = "@type", rename = "logOut")]
pub struct LogOut {}

impl Request for LogOut {
    type Response = Ack;
}

/// Close the engine instance gracefully.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(tag = "@type", rename = "close")]
pub struct Close {}

impl Request for Close {
    type Response = Ack;
}

// ─── Tests ────────────────────────────────────────────────────────────────────
