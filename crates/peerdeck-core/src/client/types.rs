use crate::protocol::Envelope;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Interval between heartbeat pings once authenticated.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Reason recorded when the server rejects the token without saying why.
pub const DEFAULT_AUTH_ERROR: &str = "Authentication failed";

/// Status of a remote connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Not connected (initial state, and where every attempt ends)
    #[default]
    Disconnected,
    /// Transport opening or waiting for `auth_response`
    Connecting,
    /// Authenticated; heartbeat running
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        };
        f.write_str(label)
    }
}

/// Tunables for a single client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientOptions {
    pub heartbeat_interval: Duration,
    /// Give up on a peer that accepts the transport but never answers `auth`.
    /// `None` waits indefinitely.
    pub handshake_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: HEARTBEAT_INTERVAL,
            handshake_timeout: None,
        }
    }
}

/// Why a `connect()` call failed. Each attempt settles exactly once.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    /// Server answered `auth_response` with `success: false`
    #[error("{0}")]
    Rejected(String),
    /// Transport could not be opened, or dropped before authentication
    #[error("{0}")]
    Transport(String),
    /// Peer sent something other than `auth_response` first
    #[error("Unexpected '{0}' message before authentication")]
    Protocol(String),
    #[error("Authentication timed out")]
    Timeout,
    /// `disconnect()` was called while the attempt was in flight
    #[error("Disconnected")]
    Disconnected,
}

/// Lifecycle and message events sent from a client to its owner.
///
/// `instance` identifies the client object that emitted the event, so an
/// owner that replaced a client can ignore whatever the old one left queued.
#[derive(Clone, Debug, PartialEq)]
pub enum ConnectionEvent {
    Connecting {
        alias: String,
        instance: u64,
    },
    Connected {
        alias: String,
        instance: u64,
    },
    /// `error` is `None` for a voluntary disconnect
    Disconnected {
        alias: String,
        instance: u64,
        error: Option<String>,
    },
    /// Application message received while connected
    Message {
        alias: String,
        instance: u64,
        message: Envelope,
    },
}

impl ConnectionEvent {
    pub fn alias(&self) -> &str {
        match self {
            ConnectionEvent::Connecting { alias, .. }
            | ConnectionEvent::Connected { alias, .. }
            | ConnectionEvent::Disconnected { alias, .. }
            | ConnectionEvent::Message { alias, .. } => alias,
        }
    }

    pub fn instance(&self) -> u64 {
        match self {
            ConnectionEvent::Connecting { instance, .. }
            | ConnectionEvent::Connected { instance, .. }
            | ConnectionEvent::Disconnected { instance, .. }
            | ConnectionEvent::Message { instance, .. } => *instance,
        }
    }
}
