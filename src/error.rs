//! Error types for the relay.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while proxying a connection.
#[derive(Error, Debug)]
pub enum Error {
    /// Cipher transform failed (malformed input for the scheme)
    #[error("cipher error: {0}")]
    Cipher(String),

    /// SOCKS version byte was not 5
    #[error("unsupported SOCKS version: {0:#04x}")]
    UnsupportedVersion(u8),

    /// Command other than CONNECT
    #[error("unsupported SOCKS command: {0:#04x}")]
    UnsupportedCommand(u8),

    /// Address type other than IPv4, domain or IPv6
    #[error("unsupported address type: {0:#04x}")]
    UnsupportedAddressType(u8),

    /// Invalid message format
    #[error("invalid message format: {0}")]
    InvalidMessage(String),

    /// The relay server answered the replayed exchange with unexpected bytes
    #[error("unexpected relay reply: {}", hex::encode(.0))]
    UnexpectedReply(Vec<u8>),

    /// Domain name lookup failed
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        /// Host that was looked up
        host: String,
        /// Underlying lookup error
        source: io::Error,
    },

    /// Dialing the destination failed
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Destination address
        addr: SocketAddr,
        /// Underlying connect error
        source: io::Error,
    },

    /// Network I/O error
    #[error("network error: {0}")]
    Network(#[from] io::Error),

    /// Operation on a stream that was already closed by this side
    #[error("use of closed connection")]
    Closed,

    /// Buffer overflow/underflow
    #[error("buffer error: expected {expected} bytes, got {actual}")]
    Buffer {
        /// Space available
        expected: usize,
        /// Bytes produced
        actual: usize,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A relay task panicked or was cancelled
    #[error("relay task failed: {0}")]
    Task(String),
}

impl Error {
    /// Create a new cipher error
    pub fn cipher(msg: impl Into<String>) -> Self {
        Error::Cipher(msg.into())
    }

    /// Create a new invalid message error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidMessage(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Check if this error is part of a normal teardown.
    ///
    /// End of stream and I/O against a connection this side already closed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Closed => true,
            Error::Network(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof | io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }

    /// Check if the peer reset the connection.
    pub fn is_reset(&self) -> bool {
        matches!(self, Error::Network(e) if e.kind() == io::ErrorKind::ConnectionReset)
    }

    /// Check if this error is a SOCKS protocol violation
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedVersion(_)
                | Error::UnsupportedCommand(_)
                | Error::UnsupportedAddressType(_)
                | Error::InvalidMessage(_)
                | Error::UnexpectedReply(_)
        )
    }
}
