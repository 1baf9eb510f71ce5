use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::ofp_connection::HandshakeState;

/// Failures reading or writing OpenFlow messages on a stream.
#[derive(Debug, Error)]
pub enum OfpError {
    #[error("connection closed by peer")]
    Closed,

    #[error("i/o error: {0}")]
    Io(#[source] io::Error),

    #[error("malformed message: {0}")]
    Malformed(String),
}

impl From<io::Error> for OfpError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => OfpError::Closed,
            _ => OfpError::Io(e),
        }
    }
}

/// A switch failed to complete the Hello/Echo/Features negotiation.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("unexpected {got} while {state:?}")]
    UnexpectedMessage {
        state: HandshakeState,
        got: &'static str,
    },

    #[error("handshake not completed ({state:?})")]
    Incomplete { state: HandshakeState },

    #[error("stream error while {state:?}: {source}")]
    Stream {
        state: HandshakeState,
        #[source]
        source: OfpError,
    },
}

impl HandshakeError {
    /// The step during which the handshake failed.
    pub fn state(&self) -> HandshakeState {
        match *self {
            HandshakeError::UnexpectedMessage { state, .. } |
            HandshakeError::Incomplete { state } |
            HandshakeError::Stream { state, .. } => state,
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("switch {0:#x} is not connected")]
    NotFound(u64),

    #[error("no switch is connected")]
    NoSwitches,

    #[error("failed to send to switch {dpid:#x}: {source}")]
    Send {
        dpid: u64,
        #[source]
        source: OfpError,
    },
}

/// Startup and listener failures. These are fatal to the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("start handler failed: {0:#}")]
    Start(anyhow::Error),

    #[error("failed to spawn {what}: {source}")]
    Spawn {
        what: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to accept connection on {addr}: {source}")]
    Accept {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}
