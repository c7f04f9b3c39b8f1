//! Error type for the language server bridge.

use crate::lsp_client::ClientState;
use thiserror::Error;

/// Errors produced by `quill-lsp`.
#[derive(Debug, Error)]
pub enum LspError {
    /// Reading from or writing to the server failed.
    #[error("langserver I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A message could not be encoded or decoded as JSON.
    #[error("invalid JSON-RPC message: {0}")]
    Json(#[from] serde_json::Error),

    /// The byte stream does not follow `Content-Length` framing.
    #[error("invalid LSP framing: {0}")]
    Framing(String),

    /// An operation was attempted in a client state that does not allow it.
    #[error("cannot {operation} while the client is {state:?}")]
    InvalidState {
        /// What was attempted.
        operation: &'static str,
        /// The state the client was in.
        state: ClientState,
    },

    /// The langserver command could not be split into arguments.
    #[error("invalid langserver command {command:?}: {message}")]
    InvalidCommand {
        /// The configured command line.
        command: String,
        /// Why it was rejected.
        message: String,
    },

    /// The langserver process could not be started.
    #[error("failed to start langserver with command {command:?}: {source}")]
    Spawn {
        /// The configured command line.
        command: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Result alias for `quill-lsp` operations.
pub type Result<T> = std::result::Result<T, LspError>;
