//! # tdlayer-client
//!
//! Async client over a tdjson-style JSON engine.
//!
//! The engine only offers a blocking, correlation-less `receive`. This crate
//! adds what is needed to use it from many tasks at once:
//! - a background dispatch loop that is the engine's only reader
//! - request/reply correlation through `@extra` tokens, with timeouts
//! - a bounded, ordered stream of everything that is not a reply
//! - typed requests and an authorization sequencer built on top
//!
//! ```rust,no_run
//! use tdlayer_client::{Client, Config, MemoryEngine, StaticCredentials};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::start(MemoryEngine::new(), Config::new(12345, "api-hash")).await?;
//!
//! // Drain updates from the start; the loop stalls while the stream is full.
//! let mut updates = client.updates().expect("first call");
//! let printer = tokio::spawn(async move {
//!     while let Some(update) = updates.next().await {
//!         println!("{:?}", update.kind());
//!     }
//! });
//!
//! let mut creds = StaticCredentials { phone_number: Some("+15550100".into()), ..Default::default() };
//! client.authorize(&mut creds).await?;
//!
//! client.destroy().await;
//! printer.await?;
//! # Ok(()) }
//! ```

#![deny(unsafe_code)]

mod auth;
mod config;
mod dispatch;
mod errors;
pub mod functions;
pub mod message;
pub mod registry;
pub mod update;

pub use auth::{AuthorizationState, Credentials, StaticCredentials};
pub use config::{Config, TdlibParameters};
pub use dispatch::DispatchExit;
pub use errors::{AuthError, InvocationError, TdError};
pub use functions::{Request, Response};
pub use message::{Frame, IntoMessage, Message};
pub use update::UpdateStream;
pub use tdlayer_engine::{Engine, EngineError, MemoryEngine};
#[cfg(feature = "native")]
pub use tdlayer_engine::NativeEngine;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use dispatch::Dispatcher;
use registry::Registry;

// ─── ClientInner ─────────────────────────────────────────────────────────────

struct ClientInner {
    engine:   Arc<dyn Engine>,
    registry: Arc<Registry>,
    config:   Config,
    cancel:   CancellationToken,
    updates:  Mutex<Option<mpsc::Receiver<Frame>>>,
    dispatch: tokio::sync::Mutex<Option<JoinHandle<DispatchExit>>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// The client. Cheap to clone; all clones share one engine and loop.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

impl Client {
    // ── Lifecycle ──────────────────────────────────────────────────────────

    /// Start a client on `engine`.
    ///
    /// Spawns the dispatch loop and sends `setTdlibParameters`. Needs a
    /// tokio runtime (see [`InvocationError::NoRuntime`]). Take [`Client::updates`] and keep
    /// draining it before making requests: a full stream holds back replies.
    pub async fn start<E: Engine>(engine: E, config: Config) -> Result<Self, InvocationError> {
        Self::start_shared(Arc::new(engine), config).await
    }

    /// Like [`Client::start`], for an engine that is already shared.
    ///
    /// Fails with [`InvocationError::NoRuntime`] outside a tokio runtime.
    pub async fn start_shared(engine: Arc<dyn Engine>, config: Config) -> Result<Self, InvocationError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| InvocationError::NoRuntime)?;

        if let Some(level) = config.log_verbosity {
            let req = functions::SetLogVerbosityLevel { new_verbosity_level: level };
            let reply = Self::execute_on(engine.as_ref(), req.to_message()?)?;
            functions::check_reply(reply)?;
            tracing::debug!("[tdlayer] engine log verbosity set to {level}");
        }

        let (update_tx, update_rx) = mpsc::channel(config.update_buffer.max(1));
        let registry = Arc::new(Registry::new());
        let cancel   = CancellationToken::new();

        let dispatcher = Dispatcher {
            engine:   engine.clone(),
            registry: registry.clone(),
            updates:  update_tx,
            poll:     config.poll_timeout,
            cancel:   cancel.clone(),
            runtime:  runtime.clone(),
        };
        let handle = runtime.spawn_blocking(move || dispatcher.run());

        let client = Self {
            inner: Arc::new(ClientInner {
                engine,
                registry,
                config,
                cancel,
                updates:  Mutex::new(Some(update_rx)),
                dispatch: tokio::sync::Mutex::new(Some(handle)),
            }),
        };

        let parameters = functions::SetTdlibParameters {
            parameters: client.inner.config.parameters.clone(),
        };
        client.send(parameters.to_message()?)?;
        tracing::info!("[tdlayer] Client started on {} engine", client.inner.engine.name());
        Ok(client)
    }

    /// Create a native `libtdjson` instance and start a client on it.
    #[cfg(feature = "native")]
    pub async fn connect(config: Config) -> Result<Self, InvocationError> {
        let engine = NativeEngine::create()?;
        Self::start(engine, config).await
    }

    /// Stop the dispatch loop, destroy the engine and fail every pending
    /// request with [`InvocationError::Dropped`].
    ///
    /// Waits up to [`Config::poll_timeout`] for the loop's current poll.
    pub async fn destroy(&self) {
        self.inner.cancel.cancel();
        let handle = self.inner.dispatch.lock().await.take();
        if let Some(handle) = handle {
            match handle.await {
                Ok(exit) => tracing::debug!("[tdlayer] dispatch loop joined: {exit}"),
                Err(e)   => tracing::warn!("[tdlayer] dispatch loop panicked: {e}"),
            }
        }
        self.inner.engine.destroy();
        self.inner.registry.clear();
        tracing::info!("[tdlayer] Client destroyed");
    }

    /// Take the update stream. Only the first call returns `Some`.
    ///
    /// Until it is taken and drained, updates pile up in the buffer.
    pub fn updates(&self) -> Option<UpdateStream> {
        self.inner.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(UpdateStream::new)
    }

    /// Number of requests currently waiting for a reply.
    pub fn pending_requests(&self) -> usize {
        self.inner.registry.len()
    }

    /// The configuration this client was started with.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    // ── Requests ───────────────────────────────────────────────────────────

    /// Send a request without waiting for anything back.
    pub fn send(&self, request: impl IntoMessage) -> Result<(), InvocationError> {
        let message = request.into_message()?;
        tracing::trace!("[tdlayer] → {}", message.kind().unwrap_or("?"));
        self.inner.engine.send(&message.to_json()?)?;
        Ok(())
    }

    /// Send a request and wait up to [`Config::request_timeout`] for its reply.
    pub async fn send_and_catch(&self, request: impl IntoMessage) -> Result<Message, InvocationError> {
        self.send_and_catch_within(request, self.inner.config.request_timeout).await
    }

    /// Send a request and wait up to `timeout` for its reply.
    pub async fn send_and_catch_within(
        &self,
        request: impl IntoMessage,
        timeout: Duration,
    ) -> Result<Message, InvocationError> {
        self.catch(request, timeout).await.map(|frame| frame.message)
    }

    /// Like [`Client::send_and_catch`], returning the reply exactly as the
    /// engine produced it.
    pub async fn send_and_catch_raw(&self, request: impl IntoMessage) -> Result<Vec<u8>, InvocationError> {
        self.send_and_catch_raw_within(request, self.inner.config.request_timeout).await
    }

    /// Like [`Client::send_and_catch_within`], returning the raw reply.
    pub async fn send_and_catch_raw_within(
        &self,
        request: impl IntoMessage,
        timeout: Duration,
    ) -> Result<Vec<u8>, InvocationError> {
        self.catch(request, timeout).await.map(|frame| frame.raw)
    }

    async fn catch(&self, request: impl IntoMessage, timeout: Duration) -> Result<Frame, InvocationError> {
        let mut message = request.into_message()?;
        let pending = self.inner.registry.register_new()?;
        message.set_extra(pending.token().as_str());
        let payload = message.to_json()?;

        tracing::trace!("[tdlayer] → {} ({})", message.kind().unwrap_or("?"), pending.token());
        // On failure `pending` is dropped here, which removes its slot.
        self.inner.engine.send(&payload)?;
        pending.wait(timeout).await
    }

    /// Run a synchronously executable request on the engine directly,
    /// bypassing the dispatch loop.
    pub fn execute(&self, request: impl IntoMessage) -> Result<Message, InvocationError> {
        Self::execute_on(self.inner.engine.as_ref(), request.into_message()?)
    }

    fn execute_on(engine: &dyn Engine, message: Message) -> Result<Message, InvocationError> {
        let reply = engine.execute(&message.to_json()?)?.ok_or_else(|| {
            InvocationError::Decode(format!(
                "no synchronous reply to {}", message.kind().unwrap_or("?")
            ))
        })?;
        Ok(Message::from_slice(&reply)?)
    }

    /// Send a typed request and decode its reply.
    ///
    /// `error` replies are returned as [`InvocationError::Td`].
    pub async fn invoke<R: Request>(&self, request: &R) -> Result<R::Response, InvocationError> {
        R::Response::from_message(self.invoke_message(request).await?)
    }

    pub(crate) async fn invoke_message<R: Request>(&self, request: &R) -> Result<Message, InvocationError> {
        functions::check_reply(self.send_and_catch(request.to_message()?).await?)
    }
}
