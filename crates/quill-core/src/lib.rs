#![warn(missing_docs)]
//! Quill Core - headless document model for the quill editor
//!
//! # Overview
//!
//! `quill-core` holds everything the editor knows about a document without drawing it:
//!
//! - **Buffer**: rope-backed text addressed by 1-based lines and 0-based char columns
//! - **Tags**: named, owner-scoped annotations that move with the text
//! - **Change notifications**: every edit is reported to subscribers as a [`BufferChange`]
//! - **Processing edits**: highlighters and language servers describe tag updates as
//!   [`ProcessingEdit`] values instead of mutating the buffer themselves
//! - **Tabs and UI queue**: explicit tab bookkeeping and the single dispatch queue background
//!   threads use to reach the UI thread
//! - **Configuration**: `settings.json`, `filetypes.toml` and project root discovery
//!
//! # Quick Start
//!
//! ```rust
//! use quill_core::{Buffer, LineSpan, Position, ProcessingEdit, TagOwner};
//!
//! let mut buffer = Buffer::new("def f():\n    pass\n");
//! buffer.apply_processing_edits([ProcessingEdit::ReplaceLineTags {
//!     owner: TagOwner::LINE_SYNTAX,
//!     first_line: 1,
//!     last_line: 1,
//!     spans: vec![(1, vec![LineSpan::new(0, 3, "keyword")])],
//! }]);
//!
//! assert_eq!(buffer.tag_names_at(Position::new(1, 1)), vec!["keyword"]);
//!
//! buffer.insert(Position::new(1, 0), "\n").unwrap();
//! assert_eq!(buffer.tag_names_at(Position::new(2, 1)), vec!["keyword"]);
//! ```
//!
//! # Module Description
//!
//! - [`buffer`] - the editable document
//! - [`tags`] - tag ranges and their storage
//! - [`delta`] - change notifications
//! - [`processing`] - derived-state edits
//! - [`tabs`] - open tab list
//! - [`event_loop`] - UI dispatch queue
//! - [`settings`] / [`filetypes`] / [`project`] - configuration

pub mod buffer;
pub mod delta;
pub mod error;
pub mod event_loop;
pub mod files;
pub mod filetypes;
pub mod line_ending;
pub mod position;
pub mod processing;
pub mod project;
pub mod settings;
pub mod tabs;
pub mod tags;

pub use buffer::{Buffer, ChangeCallback, LineTag, SubscriptionId};
pub use delta::{BufferChange, ChangeKind, TextEdit};
pub use error::{CoreError, Result};
pub use event_loop::{UiQueue, UiSender};
pub use files::{LoadedText, load_text, save_text};
pub use filetypes::{
    CommandKind, Filetype, Filetypes, HighlighterKind, LangServerConfig, split_command,
};
pub use line_ending::LineEnding;
pub use position::Position;
pub use processing::{DocumentProcessor, ProcessingEdit};
pub use project::find_project_root;
pub use settings::{Settings, config_dir, ensure_config_dir};
pub use tabs::{TabId, TabManager};
pub use tags::{LineSpan, TagOwner, TagRange, TagStore};
