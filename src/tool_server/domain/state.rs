//! Session lifecycle states and point-in-time status snapshots.

use super::{ParseSessionStateError, ServerId, ServerName, TransportKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a server session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// The server's configuration is disabled; the session never connects.
    Disabled,
    /// No connection is open.
    Disconnected,
    /// A transport `open` is in flight.
    Connecting,
    /// The transport is open and the handshake completed.
    Connected,
    /// The last connection attempt failed or an open connection broke.
    Error,
}

impl SessionState {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }

    /// Returns the initial state for a server with the given enabled flag.
    #[must_use]
    pub const fn initial(enabled: bool) -> Self {
        if enabled {
            Self::Disconnected
        } else {
            Self::Disabled
        }
    }

    /// Returns whether tool invocations are accepted in this state.
    #[must_use]
    pub const fn accepts_invocations(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns whether the state names a live or in-flight connection.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }

    /// Returns whether transition to `target` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Disconnected | Self::Error, Self::Connecting)
                | (Self::Connecting, Self::Connected | Self::Error)
                | (Self::Connected, Self::Error | Self::Disconnected)
                | (Self::Error, Self::Disconnected)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[expect(
    clippy::use_self,
    reason = "`Self::Error` would be ambiguous with the associated error type"
)]
impl TryFrom<&str> for SessionState {
    type Error = ParseSessionStateError;

    fn try_from(value: &str) -> Result<Self, <Self as TryFrom<&str>>::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "disabled" => Ok(SessionState::Disabled),
            "disconnected" => Ok(SessionState::Disconnected),
            "connecting" => Ok(SessionState::Connecting),
            "connected" => Ok(SessionState::Connected),
            "error" => Ok(SessionState::Error),
            _ => Err(ParseSessionStateError(value.to_owned())),
        }
    }
}

/// Point-in-time copy of one session's runtime status.
///
/// Snapshots are detached values; later session changes never show through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    /// Server identifier.
    pub server_id: ServerId,
    /// Server display name.
    pub name: ServerName,
    /// Transport kind.
    pub transport: TransportKind,
    /// Lifecycle state.
    pub state: SessionState,
    /// Detail of the most recent failure, if any.
    pub last_error: Option<String>,
    /// When the current connection reached `connected`.
    pub connected_since: Option<DateTime<Utc>>,
    /// Number of tools in the current catalog.
    pub tool_count: usize,
    /// Whether the server announced a catalog change since the last
    /// discovery.
    pub catalog_stale: bool,
    /// Number of outstanding correlated requests.
    pub pending_requests: usize,
    /// Most recent diagnostic lines (child stderr for process servers).
    pub diagnostics: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(SessionState::Disconnected, SessionState::Connecting, true)]
    #[case(SessionState::Connecting, SessionState::Connected, true)]
    #[case(SessionState::Connecting, SessionState::Error, true)]
    #[case(SessionState::Connected, SessionState::Error, true)]
    #[case(SessionState::Connected, SessionState::Disconnected, true)]
    #[case(SessionState::Error, SessionState::Connecting, true)]
    #[case(SessionState::Error, SessionState::Disconnected, true)]
    #[case(SessionState::Disconnected, SessionState::Connected, false)]
    #[case(SessionState::Connected, SessionState::Connecting, false)]
    #[case(SessionState::Disabled, SessionState::Connecting, false)]
    #[case(SessionState::Disabled, SessionState::Disconnected, false)]
    fn state_transition_matrix(
        #[case] current: SessionState,
        #[case] target: SessionState,
        #[case] expected: bool,
    ) {
        assert_eq!(current.can_transition_to(target), expected);
    }

    #[rstest]
    #[case(true, SessionState::Disconnected)]
    #[case(false, SessionState::Disabled)]
    fn initial_state_follows_enabled_flag(#[case] enabled: bool, #[case] expected: SessionState) {
        assert_eq!(SessionState::initial(enabled), expected);
    }

    #[test]
    fn only_connected_accepts_invocations() {
        let accepting: Vec<_> = [
            SessionState::Disabled,
            SessionState::Disconnected,
            SessionState::Connecting,
            SessionState::Connected,
            SessionState::Error,
        ]
        .into_iter()
        .filter(|state| state.accepts_invocations())
        .collect();

        assert_eq!(accepting, vec![SessionState::Connected]);
    }

    #[test]
    fn state_parses_from_storage_form() {
        assert_eq!(SessionState::try_from(" Connected "), Ok(SessionState::Connected));
        assert!(SessionState::try_from("running").is_err());
    }
}
