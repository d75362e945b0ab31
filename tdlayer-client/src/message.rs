//! JSON envelope exchanged with the engine.
//!
//! Every request and every reply is a JSON object. Two keys are reserved:
//! `@type` names the kind of object and `@extra` carries the correlation
//! token the engine echoes back on the reply. Everything else is payload.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::InvocationError;

/// Key holding the object kind.
pub const TYPE_KEY: &str = "@type";
/// Key holding the correlation token.
pub const EXTRA_KEY: &str = "@extra";

// ─── Message ──────────────────────────────────────────────────────────────────

/// A JSON object sent to or received from the engine.
///
/// Field order is preserved as received so re-serialising a message yields
/// the same layout.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(Map<String, Value>);

impl Message {
    /// An empty message of the given kind.
    pub fn new(kind: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert(TYPE_KEY.into(), Value::String(kind.into()));
        Self(fields)
    }

    /// Decode a message from raw bytes. Anything but a JSON object is rejected.
    pub fn from_slice(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    /// Wrap a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self, InvocationError> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(InvocationError::Decode(format!("expected a JSON object, got {other}"))),
        }
    }

    /// The `@type` of this message, if present.
    pub fn kind(&self) -> Option<&str> {
        self.0.get(TYPE_KEY).and_then(Value::as_str)
    }

    /// The correlation token, if present and a string.
    pub fn extra(&self) -> Option<&str> {
        self.0.get(EXTRA_KEY).and_then(Value::as_str)
    }

    /// Stamp a correlation token, replacing any previous one.
    pub fn set_extra(&mut self, token: impl Into<String>) {
        self.0.insert(EXTRA_KEY.into(), Value::String(token.into()));
    }

    /// Remove and return the correlation token.
    pub fn take_extra(&mut self) -> Option<Value> {
        self.0.shift_remove(EXTRA_KEY)
    }

    /// Look up a payload field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set a payload field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder form of [`Message::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// All fields, reserved ones included.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Serialize to compact JSON.
    pub fn to_json(&self) -> Result<String, InvocationError> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// Decode this message into a typed structure.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, InvocationError> {
        Ok(serde_json::from_value(Value::Object(self.0))?)
    }

    /// Unwrap into the underlying JSON object.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Message> for Value {
    fn from(m: Message) -> Self { m.into_value() }
}

// ─── Frame ────────────────────────────────────────────────────────────────────

/// A message received from the engine, together with the exact bytes it was
/// decoded from.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// The decoded message.
    pub message: Message,
    /// The payload as returned by `receive`.
    pub raw:     Vec<u8>,
}

impl Frame {
    /// Decode a raw payload.
    pub fn decode(raw: Vec<u8>) -> Result<Self, serde_json::Error> {
        let message = Message::from_slice(&raw)?;
        Ok(Self { message, raw })
    }

    /// The `@type` of the message.
    pub fn kind(&self) -> Option<&str> {
        self.message.kind()
    }
}

// ─── IntoMessage ──────────────────────────────────────────────────────────────

/// Anything the client can turn into a [`Message`] before sending it.
///
/// Raw JSON text is parsed once here, so correlation stamping always works on
/// a structured object regardless of what the caller passed in.
pub trait IntoMessage {
    /// Normalise into a message.
    fn into_message(self) -> Result<Message, InvocationError>;
}

impl IntoMessage for Message {
    fn into_message(self) -> Result<Message, InvocationError> { Ok(self) }
}

impl IntoMessage for &Message {
    fn into_message(self) -> Result<Message, InvocationError> { Ok(self.clone()) }
}

impl IntoMessage for Value {
    fn into_message(self) -> Result<Message, InvocationError> { Message::from_value(self) }
}

impl IntoMessage for &str {
    fn into_message(self) -> Result<Message, InvocationError> {
        Ok(Message::from_slice(self.as_bytes())?)
    }
}

impl IntoMessage for String {
    fn into_message(self) -> Result<Message, InvocationError> { self.as_str().into_message() }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
