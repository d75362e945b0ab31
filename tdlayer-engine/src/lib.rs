//! Transport handle abstraction for a tdjson-style engine.
//!
//! The engine is a black box that speaks JSON in both directions:
//! * `send` queues a request,
//! * `receive` blocks up to a timeout and yields one response or update,
//! * `execute` answers the synchronous subset of requests inline,
//! * `destroy` releases the instance.
//!
//! Everything above this crate talks to an [`Engine`] trait object so the
//! correlation and dispatch logic can run against [`MemoryEngine`] in tests
//! and against the real `libtdjson` ([`NativeEngine`], feature `native`) in
//! production.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod memory;
#[cfg(feature = "native")]
pub mod native;

pub use error::EngineError;
pub use memory::MemoryEngine;
#[cfg(feature = "native")]
pub use native::NativeEngine;

use std::time::Duration;

// ─── Engine ───────────────────────────────────────────────────────────────────

/// One instance of the JSON engine.
///
/// Implementations must accept `send` and `execute` from many threads at
/// once. `receive` is only ever called by a single reader.
pub trait Engine: Send + Sync + 'static {
    /// Queue a UTF-8 JSON request. Never waits for the answer.
    fn send(&self, request: &str) -> Result<(), EngineError>;

    /// Wait up to `timeout` for the next inbound payload.
    ///
    /// `Ok(None)` means nothing arrived in time; it is not an error.
    fn receive(&self, timeout: Duration) -> Result<Option<Vec<u8>>, EngineError>;

    /// Run a synchronously executable request and return its answer.
    fn execute(&self, request: &str) -> Result<Option<Vec<u8>>, EngineError>;

    /// Release the instance. Idempotent; every later call fails with
    /// [`EngineError::Destroyed`].
    fn destroy(&self);

    /// Human-readable name of this engine (for log messages).
    fn name(&self) -> &str { "engine" }
}
