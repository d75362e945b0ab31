//! Correlation of replies with the requests that caused them.
//!
//! Every correlated request gets a fresh [`CorrelationToken`] stamped into its
//! `@extra`. The [`Registry`] maps that token to a one-shot slot; the dispatch
//! loop resolves the slot when a reply carrying the same token comes back.
//!
//! A slot is removed exactly once: by the reply, or by the waiting side when it
//! gives up. Whichever comes second finds nothing and does nothing.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::errors::InvocationError;
use crate::message::Frame;

/// Length of a generated token.
const TOKEN_LEN: usize = 20;
const ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

// ─── CorrelationToken ─────────────────────────────────────────────────────────

/// Opaque, unguessable string identifying one in-flight request.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    /// Draw a new random alphanumeric token.
    pub fn generate() -> Result<Self, InvocationError> {
        let mut token = String::with_capacity(TOKEN_LEN);
        let mut buf = [0u8; TOKEN_LEN * 2];
        while token.len() < TOKEN_LEN {
            getrandom::getrandom(&mut buf)?;
            // Reject bytes >= 248 so every symbol is equally likely.
            for &b in buf.iter().filter(|&&b| b < 248) {
                if token.len() == TOKEN_LEN { break; }
                token.push(ALPHABET[(b % 62) as usize] as char);
            }
        }
        Ok(Self(token))
    }

    /// The token text, as stamped into `@extra`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CorrelationToken {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Registry ─────────────────────────────────────────────────────────────────

/// Pending waiters keyed by correlation token.
///
/// The lock is only held to insert or remove one entry; delivery happens
/// after it is released.
#[derive(Default)]
pub struct Registry {
    waiters: Mutex<HashMap<String, oneshot::Sender<Frame>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn waiters(&self) -> MutexGuard<'_, HashMap<String, oneshot::Sender<Frame>>> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a slot for `token`. Returns `None` if the token is already live.
    pub fn register(&self, token: CorrelationToken) -> Option<Pending<'_>> {
        let (tx, rx) = oneshot::channel();
        match self.waiters().entry(token.0.clone()) {
            Entry::Occupied(_) => return None,
            Entry::Vacant(slot) => { slot.insert(tx); }
        }
        Some(Pending { registry: self, token, rx, settled: false })
    }

    /// Open a slot under a freshly generated token.
    pub fn register_new(&self) -> Result<Pending<'_>, InvocationError> {
        loop {
            if let Some(pending) = self.register(CorrelationToken::generate()?) {
                return Ok(pending);
            }
            tracing::warn!("[tdlayer] correlation token collision, drawing a new one");
        }
    }

    /// Deliver `frame` to the waiter for `token`.
    ///
    /// Returns `false` if no waiter was registered or it had already given up.
    pub fn resolve(&self, token: &str, frame: Frame) -> bool {
        let Some(tx) = self.waiters().remove(token) else {
            return false;
        };
        tx.send(frame).is_ok()
    }

    /// Drop the slot for `token`, if any.
    pub fn deregister(&self, token: &str) {
        self.waiters().remove(token);
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.waiters().len()
    }

    /// `true` if no request is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every slot; their waiters fail with [`InvocationError::Dropped`].
    pub fn clear(&self) {
        let drained: Vec<_> = self.waiters().drain().collect();
        if !drained.is_empty() {
            tracing::debug!("[tdlayer] dropping {} pending request(s)", drained.len());
        }
    }
}

// ─── Pending ──────────────────────────────────────────────────────────────────

/// The waiting side of one registered slot.
///
/// Dropping it before the reply arrives removes the slot, so a waiter that is
/// cancelled or times out never leaves an entry behind.
pub struct Pending<'a> {
    registry: &'a Registry,
    token:    CorrelationToken,
    rx:       oneshot::Receiver<Frame>,
    settled:  bool,
}

impl Pending<'_> {
    /// The token this slot answers to.
    pub fn token(&self) -> &CorrelationToken {
        &self.token
    }

    /// Wait for the reply, giving up after `timeout`.
    pub async fn wait(mut self, timeout: Duration) -> Result<Frame, InvocationError> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(frame)) => {
                self.settled = true;
                Ok(frame)
            }
            Ok(Err(_closed)) => {
                self.settled = true;
                Err(InvocationError::Dropped)
            }
            Err(_elapsed) => {
                tracing::debug!("[tdlayer] request {} timed out after {timeout:?}", self.token);
                Err(InvocationError::Timeout(timeout))
            }
        }
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.registry.deregister(self.token.as_str());
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
