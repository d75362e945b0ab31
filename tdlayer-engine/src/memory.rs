//! In-memory engine.
//!
//! [`MemoryEngine`] stands in for the native library: whatever is pushed with
//! [`MemoryEngine::push`] comes out of `receive` in order, and every request
//! handed to `send` can be inspected with [`MemoryEngine::next_sent`].
//! Useful for tests and for exercising a client without `libtdjson`.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::{Engine, EngineError};

type ExecuteHandler = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

#[derive(Default)]
struct State {
    inbox:         VecDeque<Vec<u8>>,
    outbox:        VecDeque<String>,
    destroyed:     bool,
    receive_calls: u64,
}

/// An engine whose inbound traffic is scripted by the caller.
pub struct MemoryEngine {
    state:    Mutex<State>,
    inbound:  Condvar,
    outbound: Condvar,
    execute:  Mutex<Option<ExecuteHandler>>,
}

impl MemoryEngine {
    /// Create an empty engine with no execute handler.
    pub fn new() -> Self {
        Self {
            state:    Mutex::new(State::default()),
            inbound:  Condvar::new(),
            outbound: Condvar::new(),
            execute:  Mutex::new(None),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a payload for the next `receive` call. Any bytes are accepted,
    /// including ones that are not valid JSON.
    pub fn push(&self, payload: impl Into<Vec<u8>>) {
        self.state().inbox.push_back(payload.into());
        self.inbound.notify_one();
    }

    /// Wait up to `timeout` for the next request passed to `send`.
    pub fn next_sent(&self, timeout: Duration) -> Option<String> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state();
        loop {
            if let Some(req) = state.outbox.pop_front() {
                return Some(req);
            }
            let now = Instant::now();
            if now >= deadline || state.destroyed {
                return None;
            }
            state = self.outbound
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Number of `receive` calls made so far, including empty polls.
    pub fn receive_calls(&self) -> u64 {
        self.state().receive_calls
    }

    /// Number of pushed payloads not yet received.
    pub fn pending_inbound(&self) -> usize {
        self.state().inbox.len()
    }

    /// `true` once [`Engine::destroy`] has been called.
    pub fn is_destroyed(&self) -> bool {
        self.state().destroyed
    }

    /// Answer `execute` calls with `handler`. Without a handler, `execute`
    /// returns `Ok(None)`.
    pub fn on_execute<F>(&self, handler: F)
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        *self.execute.lock().unwrap_or_else(PoisonError::into_inner) = Some(Box::new(handler));
    }
}

impl Default for MemoryEngine {
    fn default() -> Self { Self::new() }
}

impl Engine for MemoryEngine {
    fn send(&self, request: &str) -> Result<(), EngineError> {
        let mut state = self.state();
        if state.destroyed {
            return Err(EngineError::Destroyed);
        }
        state.outbox.push_back(request.to_owned());
        drop(state);
        self.outbound.notify_all();
        Ok(())
    }

    fn receive(&self, timeout: Duration) -> Result<Option<Vec<u8>>, EngineError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state();
        state.receive_calls += 1;
        loop {
            if state.destroyed {
                return Err(EngineError::Destroyed);
            }
            if let Some(payload) = state.inbox.pop_front() {
                return Ok(Some(payload));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            state = self.inbound
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn execute(&self, request: &str) -> Result<Option<Vec<u8>>, EngineError> {
        if self.state().destroyed {
            return Err(EngineError::Destroyed);
        }
        let handler = self.execute.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(handler.as_ref().and_then(|h| h(request)).map(String::into_bytes))
    }

    fn destroy(&self) {
        let mut state = self.state();
        if !state.destroyed {
            log::debug!("[memory] destroyed with {} undelivered payload(s)", state.inbox.len());
        }
        state.destroyed = true;
        drop(state);
        self.inbound.notify_all();
        self.outbound.notify_all();
    }

    fn name(&self) -> &str { "memory" }
}
