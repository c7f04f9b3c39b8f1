//! Error type for the IRC backend.

use thiserror::Error;

/// Errors produced by `quill-irc`.
#[derive(Debug, Error)]
pub enum IrcError {
    /// Connecting to or talking with the server failed.
    #[error("IRC I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The nick does not follow RFC 2812 rules.
    #[error("invalid nick: {0:?}")]
    InvalidNick(String),

    /// The channel name does not follow RFC 2812 rules.
    #[error("invalid channel name: {0:?}")]
    InvalidChannel(String),

    /// A command was issued while no connection is up.
    #[error("not connected to an IRC server")]
    NotConnected,

    /// `connect` was called on a connection that is already up.
    #[error("already connected to an IRC server")]
    AlreadyConnected,

    /// The background threads of the connection are gone.
    #[error("the IRC connection was closed")]
    ConnectionClosed,
}

/// Result alias for `quill-irc` operations.
pub type Result<T> = std::result::Result<T, IrcError>;
