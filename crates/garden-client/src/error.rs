//! Error types for the session, transport and configuration layers.
//!
//! # Classes
//!
//! - transient network failures ([`TransportError`]) end the current
//!   connection and are retried by the supervisor
//! - protocol violations are handled where they occur and only logged
//! - [`SessionError::RoomFull`] and [`SessionError::PlayerNotPresent`] make
//!   the session move on to the next candidate room
//! - [`SessionError::NotConnected`] is returned to callers that try to send
//!   while disconnected
//! - [`SessionError::RetriesExhausted`] is the only terminal error
//!
//! # Example
//!
//! ```rust
//! use garden_client::error::{SessionError, TransportError};
//!
//! fn report(err: &SessionError) {
//!     if err.is_recoverable() {
//!         tracing::warn!(%err, "will retry");
//!     } else {
//!         tracing::error!(%err, "giving up");
//!     }
//! }
//!
//! report(&SessionError::Transport(TransportError::Closed));
//! ```

use thiserror::Error;

/// Errors raised while connecting, probing or running a session.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SessionError {
    /// A send was attempted while the connection is down.
    #[error("not connected to the server")]
    NotConnected,

    /// Every seat of the room's garden is held by another player.
    #[error("room '{room}' is full: all seats are taken by other players")]
    RoomFull {
        /// The probed room.
        room: String,
    },

    /// The server did not authenticate the session cookies for a room.
    #[error("authentication rejected for room '{room}'")]
    AuthenticationFailed {
        /// The room being joined.
        room: String,
    },

    /// The player did not appear in the room's player list in time.
    #[error("player not present in room '{room}'")]
    PlayerNotPresent {
        /// The probed room.
        room: String,
    },

    /// The server answered the probe with something other than a snapshot.
    #[error("unexpected {found} frame from room '{room}' while waiting for a snapshot")]
    UnexpectedFrame {
        /// The probed room.
        room: String,
        /// Description of what arrived instead.
        found: String,
    },

    /// No room to try: no override, no last room and pool search disabled.
    #[error("no room specified and main room search is disabled")]
    NoRoomCandidates,

    /// Every candidate room was tried and none could be joined.
    #[error("no available room among {tried} candidates")]
    NoRoomAvailable {
        /// Number of rooms tried.
        tried: usize,
    },

    /// Network or transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A frame could not be encoded.
    #[error("failed to encode {kind} frame: {source}")]
    Encode {
        /// The outbound message type.
        kind: String,
        /// The underlying `serde_json` error.
        #[source]
        source: serde_json::Error,
    },

    /// The reconnection supervisor gave up.
    #[error("giving up after {attempts} reconnection attempts")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// The failure that ended the last attempt, if any.
        #[source]
        last: Option<Box<SessionError>>,
    },
}

impl SessionError {
    /// Whether the supervisor should retry after this error.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::RetriesExhausted { .. } | Self::NoRoomCandidates)
    }

    /// Whether this error means the connection is (or was) down.
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::Transport(TransportError::Closed)
        )
    }
}

/// Transport-level errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// The peer closed the connection.
    #[error("connection closed")]
    Closed,

    /// Timed out waiting for the server.
    #[error("timed out after {duration_ms}ms waiting for {waiting_for}")]
    Timeout {
        /// Timeout duration in milliseconds.
        duration_ms: u64,
        /// What was being awaited.
        waiting_for: &'static str,
    },

    /// HTTP response error.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Error message or body.
        message: String,
    },

    /// Connection failed.
    #[error("connection failed: {reason}")]
    ConnectionFailed {
        /// Reason for connection failure.
        reason: String,
    },

    /// Reading or writing a frame failed.
    #[error("websocket error: {reason}")]
    WebSocket {
        /// Underlying error message.
        reason: String,
    },
}

/// Errors loading or saving the settings file.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// The settings file has no `cookies` entry.
    #[error("'cookies' missing from {path}; paste the browser session cookies there")]
    MissingCookies {
        /// Settings file path.
        path: String,
    },

    /// Reading or writing the file failed.
    #[error("failed to access {path}: {source}")]
    Io {
        /// Settings file path.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON or has the wrong shape.
    #[error("invalid settings in {path}: {source}")]
    Parse {
        /// Settings file path.
        path: String,
        /// The underlying `serde_json` error.
        #[source]
        source: serde_json::Error,
    },
}

/// Result type alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn recoverability() {
        assert!(SessionError::NotConnected.is_recoverable());
        assert!(SessionError::RoomFull { room: "MG1".into() }.is_recoverable());
        assert!(SessionError::Transport(TransportError::Closed).is_recoverable());
        assert!(!SessionError::NoRoomCandidates.is_recoverable());
        assert!(
            !SessionError::RetriesExhausted {
                attempts: 5,
                last: None
            }
            .is_recoverable()
        );
    }

    #[test]
    fn disconnect_classification() {
        assert!(SessionError::NotConnected.is_disconnect());
        assert!(SessionError::Transport(TransportError::Closed).is_disconnect());
        assert!(!SessionError::PlayerNotPresent { room: "MG2".into() }.is_disconnect());
    }

    #[test]
    fn retries_exhausted_keeps_last_error() {
        let err = SessionError::RetriesExhausted {
            attempts: 3,
            last: Some(Box::new(SessionError::NoRoomAvailable { tried: 15 })),
        };
        assert_eq!(err.to_string(), "giving up after 3 reconnection attempts");
        assert_eq!(
            err.source().map(ToString::to_string).as_deref(),
            Some("no available room among 15 candidates")
        );
    }

    #[test]
    fn display_messages() {
        let err = SessionError::RoomFull { room: "MG4".into() };
        assert_eq!(
            err.to_string(),
            "room 'MG4' is full: all seats are taken by other players"
        );

        let err = TransportError::Timeout {
            duration_ms: 5000,
            waiting_for: "Welcome",
        };
        assert_eq!(err.to_string(), "timed out after 5000ms waiting for Welcome");
    }
}
