//! Stream of uncorrelated messages pushed by the engine.
//!
//! Anything the engine sends without an `@extra` token (new messages, option
//! changes, authorization state changes, …) lands here in the order it was
//! received.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::message::Frame;

/// Asynchronous stream of update [`Frame`]s.
///
/// The buffer is bounded ([`crate::Config::update_buffer`]); while it is full
/// the dispatch loop waits, which also holds back replies to pending requests.
pub struct UpdateStream {
    rx: mpsc::Receiver<Frame>,
}

impl UpdateStream {
    pub(crate) fn new(rx: mpsc::Receiver<Frame>) -> Self {
        Self { rx }
    }

    /// Wait for the next update. Returns `None` when the client has shut down.
    pub async fn next(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// Take the next update if one is already buffered.
    pub fn try_next(&mut self) -> Option<Frame> {
        match self.rx.try_recv() {
            Ok(frame) => Some(frame),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Number of updates currently buffered.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// `true` if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
