//! Structured buffer change notifications.
//!
//! Every mutation of a [`Buffer`](crate::Buffer) produces one [`BufferChange`]. Consumers such as
//! the highlight orchestrator or the LSP bridge read the edits instead of diffing old and new text.
//!
//! Positions inside a [`TextEdit`] refer to the buffer **before** that edit is applied; edits in a
//! change must be applied in order.

use crate::position::Position;

/// Why the buffer changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Regular insert/delete/replace.
    Edit,
    /// The whole content was replaced (file load, revert).
    Reload,
    /// An undo step was applied.
    Undo,
    /// A redo step was applied.
    Redo,
}

/// A single replacement: the text between `start` and `end` became `new_text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    /// Start of the replaced range (pre-edit).
    pub start: Position,
    /// End of the replaced range (pre-edit, exclusive).
    pub end: Position,
    /// Exact deleted text (may be empty).
    pub old_text: String,
    /// Exact inserted text (may be empty).
    pub new_text: String,
}

impl TextEdit {
    /// Returns `true` if the edit removed or inserted a newline.
    pub fn is_multiline(&self) -> bool {
        self.start.line != self.end.line || self.new_text.contains('\n')
    }

    /// First and last line touched by this edit, in post-edit line numbers.
    pub fn touched_lines(&self) -> (usize, usize) {
        let inserted_lines = self.new_text.matches('\n').count();
        (self.start.line, self.start.line + inserted_lines)
    }
}

/// A change notification delivered to buffer subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferChange {
    /// What kind of operation produced the change.
    pub kind: ChangeKind,
    /// Ordered edits transforming the previous content into the current one.
    pub edits: Vec<TextEdit>,
    /// Buffer version after the change.
    pub version: u64,
}

impl BufferChange {
    /// Returns `true` if any edit spans more than one line.
    pub fn is_multiline(&self) -> bool {
        self.edits.iter().any(TextEdit::is_multiline)
    }
}
