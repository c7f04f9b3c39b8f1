#![warn(missing_docs)]
//! `quill-lsp` - language server support for the quill editor.
//!
//! The crate is layered from the wire up:
//!
//! - [`lsp_transport`]: `Content-Length` framing with an incremental decoder.
//! - [`lsp_client`]: a sans-IO client state machine. It turns editor operations into bytes and
//!   server bytes into [`ClientEvent`]s, and answers server requests on its own.
//! - [`langserver_io`]: non-blocking transports over subprocess pipes or a localhost socket.
//! - [`session`]: one server process, the tabs it serves and its teardown.
//! - [`registry`]: sessions shared between tabs of the same project.
//!
//! Nothing here blocks the caller: the editor polls [`LangServerRegistry::poll`] on a timer.
//!
//! # Example
//!
//! ```
//! use quill_lsp::{Client, ClientState, LspError, LspPosition};
//! use std::path::Path;
//!
//! let mut client = Client::new(Path::new("/tmp/project"), None).unwrap();
//! let initialize = client.send();
//! assert!(initialize.starts_with(b"Content-Length: "));
//!
//! // Nothing but `initialize` may be sent until the server answers it.
//! assert_eq!(client.state(), ClientState::Uninitialized);
//! let err = client.completions("file:///tmp/project/a.py", LspPosition::new(0, 0));
//! assert!(matches!(err, Err(LspError::InvalidState { .. })));
//! ```

pub mod error;
pub mod langserver_io;
pub mod lsp_client;
pub mod lsp_completion;
pub mod lsp_coords;
pub mod lsp_diagnostics;
pub mod lsp_events;
pub mod lsp_transport;
pub mod lsp_uri;
pub mod registry;
pub mod session;

pub use error::{LspError, Result};
pub use langserver_io::{
    CHUNK_SIZE, LangServerIo, LocalhostSocketIo, ReadResult, SubprocessStdio,
};
pub use lsp_client::{Client, ClientState, LspContentChange};
pub use lsp_completion::{
    Completion, completion_documentation, completions_from_items, snippet_to_plain_text,
    typed_prefix_len,
};
pub use lsp_coords::{LspPosition, LspRange, PositionEncoding};
pub use lsp_diagnostics::{EditorDiagnostic, diagnostic_tags, editor_diagnostics, messages_at};
pub use lsp_events::{
    ClientEvent, CompletionItem, LspDiagnostic, LspDiagnosticSeverity, LspMessageType,
};
pub use lsp_transport::{FrameDecoder, encode_lsp_message, write_lsp_message};
pub use lsp_uri::{file_uri_to_path, path_to_file_uri, percent_decode_path, percent_encode_path};
pub use registry::{LangServerRegistry, Spawner};
pub use session::{ExitReport, LangServer, LangServerId, ServerProcess, SessionEvent};
