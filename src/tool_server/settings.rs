//! Runtime limits shared by sessions, transports, and the supervisor.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Environment variable prefix for [`ManagerSettings::from_env`].
pub const ENV_PREFIX: &str = "CONDUIT_";

/// Tunable limits for the tool server manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerSettings {
    /// Default per-call deadline in milliseconds.
    pub request_timeout_ms: u64,
    /// Deadline for opening a transport and completing the handshake.
    pub connect_timeout_ms: u64,
    /// Maximum outstanding correlated requests per connection.
    pub max_pending_requests: usize,
    /// Maximum accepted length of one inbound frame in bytes.
    pub max_frame_bytes: usize,
    /// Number of diagnostic lines retained per session.
    pub stderr_tail_lines: usize,
    /// Maximum characters kept in argument and result previews.
    pub preview_chars: usize,
    /// Interval at which expired pending requests are swept.
    pub sweep_interval_ms: u64,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            connect_timeout_ms: 30_000,
            max_pending_requests: 256,
            max_frame_bytes: 4 * 1024 * 1024, // 4 MiB
            stderr_tail_lines: 200,
            preview_chars: 512,
            sweep_interval_ms: 1_000,
        }
    }
}

impl ManagerSettings {
    /// Creates a strict configuration with reduced limits.
    ///
    /// Useful for hosts embedding many servers.
    #[must_use]
    pub const fn strict() -> Self {
        Self {
            request_timeout_ms: 10_000,
            connect_timeout_ms: 10_000,
            max_pending_requests: 32,
            max_frame_bytes: 1024 * 1024, // 1 MiB
            stderr_tail_lines: 50,
            preview_chars: 256,
            sweep_interval_ms: 500,
        }
    }

    /// Creates a configuration with short deadlines for tests.
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            request_timeout_ms: 2_000,
            connect_timeout_ms: 5_000,
            sweep_interval_ms: 50,
            ..Self::default()
        }
    }

    /// Overlays `CONDUIT_*` environment variables onto the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] when a variable is present but not a valid
    /// non-negative integer.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlays values obtained from `lookup`, keyed by full variable name.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError`] when a value does not parse.
    pub fn overlay(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, SettingsError> {
        let read = |suffix: &str| -> Result<Option<u64>, SettingsError> {
            let key = format!("{ENV_PREFIX}{suffix}");
            lookup(&key)
                .map(|raw| {
                    raw.trim()
                        .parse::<u64>()
                        .map_err(|_| SettingsError::InvalidValue { key, value: raw })
                })
                .transpose()
        };
        let read_usize = |suffix: &str| -> Result<Option<usize>, SettingsError> {
            read(suffix)?
                .map(|value| {
                    usize::try_from(value).map_err(|_| SettingsError::InvalidValue {
                        key: format!("{ENV_PREFIX}{suffix}"),
                        value: value.to_string(),
                    })
                })
                .transpose()
        };

        if let Some(value) = read("REQUEST_TIMEOUT_MS")? {
            self.request_timeout_ms = value;
        }
        if let Some(value) = read("CONNECT_TIMEOUT_MS")? {
            self.connect_timeout_ms = value;
        }
        if let Some(value) = read_usize("MAX_PENDING_REQUESTS")? {
            self.max_pending_requests = value;
        }
        if let Some(value) = read_usize("MAX_FRAME_BYTES")? {
            self.max_frame_bytes = value;
        }
        if let Some(value) = read_usize("STDERR_TAIL_LINES")? {
            self.stderr_tail_lines = value;
        }
        if let Some(value) = read_usize("PREVIEW_CHARS")? {
            self.preview_chars = value;
        }
        if let Some(value) = read("SWEEP_INTERVAL_MS")? {
            self.sweep_interval_ms = value;
        }
        self.validate()
    }

    fn validate(self) -> Result<Self, SettingsError> {
        if self.request_timeout_ms == 0 {
            return Err(SettingsError::Zero("request_timeout_ms"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(SettingsError::Zero("connect_timeout_ms"));
        }
        if self.max_pending_requests == 0 {
            return Err(SettingsError::Zero("max_pending_requests"));
        }
        if self.sweep_interval_ms == 0 {
            return Err(SettingsError::Zero("sweep_interval_ms"));
        }
        Ok(self)
    }

    /// Returns the default per-call deadline.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Returns the connect and handshake deadline.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Returns the pending-request sweep interval.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Errors returned while loading [`ManagerSettings`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SettingsError {
    /// A variable is not a valid non-negative integer.
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },

    /// A limit that must be positive is zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}
