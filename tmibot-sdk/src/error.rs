//! Error type for the chat engine.

use std::time::Duration;

use crate::registry::BucketKind;

/// Errors surfaced by [`Bot`](crate::bot::Bot) operations and its read loop.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("TCP connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TLS server name {0:?}")]
    InvalidServerName(String),

    #[error("TLS configuration: {0}")]
    TlsConfig(#[source] tokio_rustls::rustls::Error),

    #[error("TLS handshake with {addr} failed: {source}")]
    Tls {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The gateway closed the stream.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A send was attempted while no connection is live.
    #[error("not connected")]
    NotConnected,

    #[error("bot is already running")]
    AlreadyRunning,

    /// `run` was called after `stop`.
    #[error("bot has been stopped")]
    Stopped,

    /// The gateway sent `RECONNECT`.
    #[error("server requested a reconnect")]
    ReconnectRequested,

    #[error("{bucket} callback {name:?} failed: {source}")]
    Callback {
        bucket: BucketKind,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("{bucket} callback {name:?} timed out after {timeout:?}")]
    CallbackTimeout {
        bucket: BucketKind,
        name: String,
        timeout: Duration,
    },
}

impl Error {
    /// Errors caused by the network rather than by user code or misuse.
    ///
    /// These are the ones a reconnect loop may retry.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Connect { .. }
                | Error::Tls { .. }
                | Error::ConnectionLost(_)
                | Error::Io(_)
                | Error::NotConnected
                | Error::ReconnectRequested
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_classification() {
        assert!(Error::ConnectionLost("EOF".into()).is_transport());
        assert!(Error::ReconnectRequested.is_transport());
        assert!(!Error::Stopped.is_transport());
        let cb = Error::Callback {
            bucket: BucketKind::Listener,
            name: "log".into(),
            source: anyhow::anyhow!("boom"),
        };
        assert!(!cb.is_transport());
        assert_eq!(cb.to_string(), "listener callback \"log\" failed: boom");
    }
}
