//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─── TdlibParameters ──────────────────────────────────────────────────────────

/// Parameters forwarded verbatim to the engine in `setTdlibParameters`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type", rename = "tdlibParameters")]
pub struct TdlibParameters {
    /// Use the test environment instead of production.
    pub use_test_dc:              bool,
    /// Directory for the persistent database.
    pub database_directory:       String,
    /// Directory for downloaded files.
    pub files_directory:          String,
    /// Keep information about downloaded and uploaded files.
    pub use_file_database:        bool,
    /// Keep cached users, basic groups, supergroups and channels.
    pub use_chat_info_database:   bool,
    /// Keep cached chats and messages.
    pub use_message_database:     bool,
    /// Enable secret chats.
    pub use_secret_chats:         bool,
    /// Application identifier from https://my.telegram.org.
    pub api_id:                   i32,
    /// Application secret from https://my.telegram.org.
    pub api_hash:                 String,
    /// IETF language tag of the user's OS language.
    pub system_language_code:     String,
    /// Model of the device the application runs on.
    pub device_model:             String,
    /// Version of the operating system.
    pub system_version:           String,
    /// Application version.
    pub application_version:      String,
    /// Let the engine delete old files automatically.
    pub enable_storage_optimizer: bool,
    /// Keep original file names of downloaded files.
    pub ignore_file_names:        bool,
}

impl Default for TdlibParameters {
    fn default() -> Self {
        Self {
            use_test_dc:              false,
            database_directory:       "tdlib-db".into(),
            files_directory:          "tdlib-files".into(),
            use_file_database:        true,
            use_chat_info_database:   true,
            use_message_database:     true,
            use_secret_chats:         false,
            api_id:                   0,
            api_hash:                 String::new(),
            system_language_code:     "en".into(),
            device_model:             "Server".into(),
            system_version:           std::env::consts::OS.into(),
            application_version:      env!("CARGO_PKG_VERSION").into(),
            enable_storage_optimizer: true,
            ignore_file_names:        false,
        }
    }
}

// ─── Config ───────────────────────────────────────────────────────────────────

/// Configuration for [`crate::Client::start`].
#[derive(Clone, Debug)]
pub struct Config {
    /// Sent as `setTdlibParameters` when the client starts.
    pub parameters:      TdlibParameters,
    /// Answer to `authorizationStateWaitEncryptionKey` (default: empty key).
    pub encryption_key:  String,
    /// How long a correlated request waits for its reply (default: 10 s).
    pub request_timeout: Duration,
    /// Timeout of each `receive` poll in the dispatch loop (default: 10 s).
    ///
    /// Also bounds how long [`crate::Client::destroy`] waits for the loop.
    pub poll_timeout:    Duration,
    /// Capacity of the update stream (default: 100).
    pub update_buffer:   usize,
    /// If set, run `setLogVerbosityLevel` through `execute` at start.
    pub log_verbosity:   Option<i32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            parameters:      TdlibParameters::default(),
            encryption_key:  String::new(),
            request_timeout: Duration::from_secs(10),
            poll_timeout:    Duration::from_secs(10),
            update_buffer:   100,
            log_verbosity:   None,
        }
    }
}

impl Config {
    /// Default configuration with the given application credentials.
    pub fn new(api_id: i32, api_hash: impl Into<String>) -> Self {
        Self {
            parameters: TdlibParameters {
                api_id,
                api_hash: api_hash.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
