//! Authorization sequencing.
//!
//! The engine drives login through a series of `authorizationState*` values.
//! Each `Wait*` state is answered with exactly one request, after which the
//! state is queried again:
//!
//! ```text
//! WaitTdlibParameters ─ setTdlibParameters ──────────┐
//! WaitEncryptionKey   ─ checkDatabaseEncryptionKey ──┤
//! WaitPhoneNumber     ─ setAuthenticationPhoneNumber ┼─▶ getAuthorizationState
//! WaitCode            ─ checkAuthenticationCode ─────┤
//! WaitPassword        ─ checkAuthenticationPassword ─┘
//! Ready                                     → done
//! Closed / Closing / LoggingOut             → stop
//! ```
//!
//! Nothing is retried here; every failure goes back to the caller, who may
//! simply call [`Client::authorize`] again.

use std::{fmt, io};

use crate::errors::{AuthError, InvocationError};
use crate::functions::{
    self, CheckAuthenticationCode, CheckAuthenticationPassword, CheckDatabaseEncryptionKey,
    GetAuthorizationState, Response, SetAuthenticationPhoneNumber, SetTdlibParameters,
};
use crate::message::Message;
use crate::Client;

// ─── AuthorizationState ───────────────────────────────────────────────────────

/// Login progress as reported by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuthorizationState {
    Closed,
    Closing,
    LoggingOut,
    Ready,
    WaitCode,
    WaitEncryptionKey,
    WaitPassword,
    WaitPhoneNumber,
    WaitTdlibParameters,
}

impl AuthorizationState {
    /// Map an `@type` such as `"authorizationStateReady"` to a state.
    pub fn from_type(kind: &str) -> Option<Self> {
        Some(match kind {
            "authorizationStateClosed"              => Self::Closed,
            "authorizationStateClosing"             => Self::Closing,
            "authorizationStateLoggingOut"          => Self::LoggingOut,
            "authorizationStateReady"               => Self::Ready,
            "authorizationStateWaitCode"            => Self::WaitCode,
            "authorizationStateWaitEncryptionKey"   => Self::WaitEncryptionKey,
            "authorizationStateWaitPassword"        => Self::WaitPassword,
            "authorizationStateWaitPhoneNumber"     => Self::WaitPhoneNumber,
            "authorizationStateWaitTdlibParameters" => Self::WaitTdlibParameters,
            _ => return None,
        })
    }

    /// The engine's `@type` for this state.
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Closed              => "authorizationStateClosed",
            Self::Closing             => "authorizationStateClosing",
            Self::LoggingOut          => "authorizationStateLoggingOut",
            Self::Ready               => "authorizationStateReady",
            Self::WaitCode            => "authorizationStateWaitCode",
            Self::WaitEncryptionKey   => "authorizationStateWaitEncryptionKey",
            Self::WaitPassword        => "authorizationStateWaitPassword",
            Self::WaitPhoneNumber     => "authorizationStateWaitPhoneNumber",
            Self::WaitTdlibParameters => "authorizationStateWaitTdlibParameters",
        }
    }

    /// `true` for states the login flow cannot continue from.
    pub fn is_shutdown(self) -> bool {
        matches!(self, Self::Closed | Self::Closing | Self::LoggingOut)
    }
}

impl fmt::Display for AuthorizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

impl Response for AuthorizationState {
    fn from_message(message: Message) -> Result<Self, InvocationError> {
        let kind = message.kind().unwrap_or_default();
        Self::from_type(kind).ok_or_else(|| {
            InvocationError::Decode(format!("unsupported authorization state {kind:?}"))
        })
    }
}

// ─── Credentials ──────────────────────────────────────────────────────────────

/// Source of the values the login flow asks for.
pub trait Credentials {
    /// Phone number in international format.
    fn phone_number(&mut self) -> io::Result<String>;
    /// Login code delivered to the user.
    fn code(&mut self) -> io::Result<String>;
    /// 2FA password; `hint` is the account's password hint, if any.
    fn password(&mut self, hint: Option<&str>) -> io::Result<String>;
}

/// Fixed credentials, for bots, scripts and tests.
#[derive(Clone, Debug, Default)]
pub struct StaticCredentials {
    pub phone_number: Option<String>,
    pub code:         Option<String>,
    pub password:     Option<String>,
}

fn missing(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no {what} configured"))
}

impl Credentials for StaticCredentials {
    fn phone_number(&mut self) -> io::Result<String> {
        self.phone_number.clone().ok_or_else(|| missing("phone number"))
    }

    fn code(&mut self) -> io::Result<String> {
        self.code.clone().ok_or_else(|| missing("login code"))
    }

    fn password(&mut self, _hint: Option<&str>) -> io::Result<String> {
        self.password.clone().ok_or_else(|| missing("password"))
    }
}

// ─── Client: authorization ────────────────────────────────────────────────────

impl Client {
    /// Query the current authorization state.
    pub async fn authorization_state(&self) -> Result<AuthorizationState, InvocationError> {
        self.invoke(&GetAuthorizationState {}).await
    }

    /// Unlock the local database with [`crate::Config::encryption_key`].
    pub async fn check_encryption_key(&self) -> Result<(), InvocationError> {
        let encryption_key = self.inner.config.encryption_key.clone();
        self.invoke(&CheckDatabaseEncryptionKey { encryption_key }).await.map(drop)
    }

    /// Send [`crate::Config::parameters`] and wait for the engine to accept them.
    pub async fn send_tdlib_parameters(&self) -> Result<(), InvocationError> {
        let parameters = self.inner.config.parameters.clone();
        self.invoke(&SetTdlibParameters { parameters }).await.map(drop)
    }

    /// Start login with `phone_number`.
    pub async fn send_phone_number(&self, phone_number: &str) -> Result<(), InvocationError> {
        let phone_number = phone_number.trim().to_string();
        self.invoke(&SetAuthenticationPhoneNumber { phone_number }).await.map(drop)
    }

    /// Submit the login code.
    pub async fn send_code(&self, code: &str) -> Result<(), InvocationError> {
        let code = code.trim().to_string();
        self.invoke(&CheckAuthenticationCode { code }).await.map(drop)
    }

    /// Submit the 2FA password.
    pub async fn send_password(&self, password: &str) -> Result<(), InvocationError> {
        let password = password.to_string();
        self.invoke(&CheckAuthenticationPassword { password }).await.map(drop)
    }

    /// Log out of the current account. The engine moves on to
    /// `LoggingOut` and then `Closed`.
    pub async fn log_out(&self) -> Result<(), InvocationError> {
        self.invoke(&functions::LogOut {}).await.map(drop)
    }

    /// Ask the engine to close gracefully; it ends up in `Closed`.
    pub async fn close(&self) -> Result<(), InvocationError> {
        self.invoke(&functions::Close {}).await.map(drop)
    }

    /// Observe the state once and answer it with at most one request.
    ///
    /// Returns the state that was observed (not the one that follows).
    pub async fn advance<C>(&self, credentials: &mut C) -> Result<AuthorizationState, AuthError>
    where
        C: Credentials + ?Sized,
    {
        let reply = self.invoke_message(&GetAuthorizationState {}).await?;
        let hint = reply.get("password_hint")
            .and_then(|v| v.as_str())
            .filter(|h| !h.is_empty())
            .map(str::to_owned);
        let state = AuthorizationState::from_message(reply)?;
        tracing::debug!("[tdlayer] authorization state: {state}");

        match state {
            AuthorizationState::Ready => {}
            AuthorizationState::Closed
            | AuthorizationState::Closing
            | AuthorizationState::LoggingOut => return Err(AuthError::Closed(state)),
            AuthorizationState::WaitTdlibParameters => self.send_tdlib_parameters().await?,
            AuthorizationState::WaitEncryptionKey   => self.check_encryption_key().await?,
            AuthorizationState::WaitPhoneNumber => {
                let phone = credentials.phone_number()?;
                self.send_phone_number(&phone).await?;
            }
            AuthorizationState::WaitCode => {
                let code = credentials.code()?;
                self.send_code(&code).await?;
            }
            AuthorizationState::WaitPassword => {
                let password = credentials.password(hint.as_deref())?;
                self.send_password(&password).await?;
            }
        }
        Ok(state)
    }

    /// Drive the login flow until the engine reports `Ready`.
    pub async fn authorize<C>(&self, credentials: &mut C) -> Result<(), AuthError>
    where
        C: Credentials + ?Sized,
    {
        loop {
            if self.advance(credentials).await? == AuthorizationState::Ready {
                tracing::info!("[tdlayer] Authorized ✓");
                return Ok(());
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
