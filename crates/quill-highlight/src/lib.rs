//! `quill-highlight` - regex-based syntax highlighting for `quill-core` buffers.
//!
//! Highlighting is line oriented: a [`LineTokenizer`] applies ordered pattern rules to a single
//! line, and a [`MultilineScanner`] handles the one construct a single line cannot see
//! (triple-quoted strings). [`HighlightOrchestrator`] decides which of the two to run after each
//! buffer change and writes the results through `quill-core`'s processing interface, so it
//! only ever touches tags owned by [`quill_core::TagOwner::LINE_SYNTAX`] and
//! [`quill_core::TagOwner::MULTILINE_SYNTAX`].

pub mod multiline;
pub mod orchestrator;
pub mod python;
pub mod tokenizer;

pub use multiline::MultilineScanner;
pub use orchestrator::{HighlightOrchestrator, Pending};
pub use python::{python_multiline, python_tokenizer};
pub use tokenizer::{LineTokenizer, TagRule};
