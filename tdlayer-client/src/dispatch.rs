//! The dispatch loop: sole reader of the engine.
//!
//! Runs on the blocking pool for the lifetime of the client. Each payload is
//! decoded once and routed to exactly one place:
//!
//! | Payload                         | Destination                      |
//! |---------------------------------|----------------------------------|
//! | not a JSON object               | dropped                          |
//! | string `@extra`                 | matching waiter, else dropped    |
//! | no `@extra`, has `@type`        | update stream (waits while full) |
//! | neither                         | dropped                          |

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tdlayer_engine::{Engine, EngineError};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::message::Frame;
use crate::registry::Registry;

// ─── DispatchExit ─────────────────────────────────────────────────────────────

/// Why the dispatch loop stopped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchExit {
    /// The client asked it to stop.
    Cancelled,
    /// `receive` failed; the engine is unusable.
    Transport(EngineError),
}

impl fmt::Display for DispatchExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled    => write!(f, "cancelled"),
            Self::Transport(e) => write!(f, "transport failed: {e}"),
        }
    }
}

// ─── Route ────────────────────────────────────────────────────────────────────

/// What happened to one received payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Route {
    /// Delivered to the waiter holding its token.
    Resolved,
    /// Carried a token nobody was waiting for.
    Unmatched,
    /// Queued on the update stream.
    Update,
    /// Not decodable, or neither correlated nor typed.
    Dropped,
    /// Cancelled while waiting for room on the update stream.
    Interrupted,
}

// ─── Dispatcher ───────────────────────────────────────────────────────────────

pub(crate) struct Dispatcher {
    pub(crate) engine:   Arc<dyn Engine>,
    pub(crate) registry: Arc<Registry>,
    pub(crate) updates:  mpsc::Sender<Frame>,
    pub(crate) poll:     Duration,
    pub(crate) cancel:   CancellationToken,
    pub(crate) runtime:  Handle,
}

impl Dispatcher {
    /// Drain the engine until cancelled or the transport fails.
    ///
    /// Blocks the calling thread; run it with `spawn_blocking`.
    pub(crate) fn run(self) -> DispatchExit {
        tracing::debug!("[tdlayer] dispatch loop started on {} engine", self.engine.name());
        let exit = loop {
            if self.cancel.is_cancelled() {
                break DispatchExit::Cancelled;
            }
            let raw = match self.engine.receive(self.poll) {
                Ok(Some(raw)) => raw,
                Ok(None)      => continue,
                Err(e)        => {
                    tracing::warn!("[tdlayer] receive failed: {e}");
                    break DispatchExit::Transport(e);
                }
            };
            if self.route(raw) == Route::Interrupted {
                break DispatchExit::Cancelled;
            }
        };
        // Nobody will answer the remaining waiters now.
        self.registry.clear();
        tracing::info!("[tdlayer] dispatch loop stopped: {exit}");
        exit
    }

    pub(crate) fn route(&self, raw: Vec<u8>) -> Route {
        let frame = match Frame::decode(raw) {
            Ok(f)  => f,
            Err(e) => {
                tracing::debug!("[tdlayer] dropping undecodable payload: {e}");
                return Route::Dropped;
            }
        };

        if let Some(token) = frame.message.extra().map(str::to_owned) {
            return if self.registry.resolve(&token, frame) {
                Route::Resolved
            } else {
                tracing::trace!("[tdlayer] no waiter for {token}, dropping reply");
                Route::Unmatched
            };
        }

        if frame.kind().is_none() {
            tracing::trace!("[tdlayer] dropping untyped payload");
            return Route::Dropped;
        }
        self.publish(frame)
    }

    fn publish(&self, frame: Frame) -> Route {
        let frame = match self.updates.try_send(frame) {
            Ok(()) => return Route::Update,
            Err(TrySendError::Closed(_)) => {
                tracing::trace!("[tdlayer] update stream closed, dropping update");
                return Route::Dropped;
            }
            Err(TrySendError::Full(frame)) => frame,
        };

        tracing::debug!("[tdlayer] update stream full, waiting for the consumer");
        let updates = &self.updates;
        let cancel  = &self.cancel;
        self.runtime.block_on(async {
            tokio::select! {
                sent = updates.send(frame) => {
                    if sent.is_ok() { Route::Update } else { Route::Dropped }
                }
                _ = cancel.cancelled() => Route::Interrupted,
            }
        })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
