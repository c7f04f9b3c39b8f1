//! The editable buffer.
//!
//! [`Buffer`] stores text in a rope and exposes it through 1-based line / 0-based column
//! [`Position`]s. It also owns the [`TagStore`] so tags move together with the text they
//! annotate, keeps an undo/redo history and notifies subscribers after every change.
//!
//! # Example
//!
//! ```rust
//! use quill_core::{Buffer, ChangeKind, Position};
//! use std::sync::mpsc;
//!
//! let mut buffer = Buffer::new("print(1)\n");
//! let (tx, rx) = mpsc::channel();
//! buffer.subscribe(move |change| {
//!     let _ = tx.send(change.kind);
//! });
//!
//! buffer.insert(Position::new(1, 0), "# ").unwrap();
//! assert_eq!(buffer.line_text(1).as_deref(), Some("# print(1)"));
//! assert_eq!(rx.try_recv().unwrap(), ChangeKind::Edit);
//! ```

use crate::delta::{BufferChange, ChangeKind, TextEdit};
use crate::error::{CoreError, Result};
use crate::line_ending::LineEnding;
use crate::position::Position;
use crate::processing::{DocumentProcessor, ProcessingEdit};
use crate::tags::{TagOwner, TagRange, TagStore};
use ropey::Rope;
use unicode_segmentation::UnicodeSegmentation;

/// Callback invoked after each buffer change.
pub type ChangeCallback = Box<dyn FnMut(&BufferChange) + Send>;

/// Handle returned by [`Buffer::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone)]
struct UndoEntry {
    /// Char offset where the replacement happened.
    start: usize,
    old_text: String,
    new_text: String,
}

/// A tagged line fragment, clipped to one line and expressed in columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineTag<'a> {
    /// Start column
    pub start: usize,
    /// End column (exclusive)
    pub end: usize,
    /// Owner of the underlying range
    pub owner: TagOwner,
    /// Tag name
    pub tag: &'a str,
}

/// Mutable text document with tags, history and change notifications.
pub struct Buffer {
    rope: Rope,
    tags: TagStore,
    undo_stack: Vec<Vec<UndoEntry>>,
    redo_stack: Vec<Vec<UndoEntry>>,
    version: u64,
    saved_version: u64,
    subscribers: Vec<(SubscriptionId, ChangeCallback)>,
    next_subscription: u64,
}

impl Buffer {
    /// Create a buffer holding `text`. CRLF and CR newlines become LF.
    pub fn new(text: &str) -> Self {
        Self {
            rope: Rope::from_str(&LineEnding::normalize(text)),
            tags: TagStore::new(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            version: 0,
            saved_version: 0,
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Full text.
    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    /// Number of chars.
    pub fn len_chars(&self) -> usize {
        self.rope.len_chars()
    }

    /// Number of lines. A trailing newline starts one more (empty) line.
    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    /// Text of `line` (1-based) without its newline.
    pub fn line_text(&self, line: usize) -> Option<String> {
        if line == 0 || line > self.line_count() {
            return None;
        }
        let mut text = self.rope.line(line - 1).to_string();
        if text.ends_with('\n') {
            text.pop();
        }
        Some(text)
    }

    /// Length of `line` in chars, newline excluded.
    pub fn line_len(&self, line: usize) -> Option<usize> {
        if line == 0 || line > self.line_count() {
            return None;
        }
        let slice = self.rope.line(line - 1);
        let mut len = slice.len_chars();
        if len > 0 && slice.char(len - 1) == '\n' {
            len -= 1;
        }
        Some(len)
    }

    /// Text between two positions.
    pub fn text_range(&self, start: Position, end: Position) -> Result<String> {
        let (start, end) = self.offset_range(start, end)?;
        Ok(self.rope.slice(start..end).to_string())
    }

    /// Char offset of `pos`.
    pub fn offset_of(&self, pos: Position) -> Result<usize> {
        let line_len = self
            .line_len(pos.line)
            .ok_or(CoreError::InvalidPosition(pos))?;
        if pos.column > line_len {
            return Err(CoreError::InvalidPosition(pos));
        }
        Ok(self.rope.line_to_char(pos.line - 1) + pos.column)
    }

    /// Position of a char offset (clamped to the end of the buffer).
    pub fn position_of(&self, offset: usize) -> Position {
        let offset = offset.min(self.rope.len_chars());
        let line_idx = self.rope.char_to_line(offset);
        let column = offset - self.rope.line_to_char(line_idx);
        Position::new(line_idx + 1, column)
    }

    /// Clamp `pos` to an existing position.
    pub fn clamp(&self, pos: Position) -> Position {
        let line = pos.line.clamp(1, self.line_count());
        let column = pos.column.min(self.line_len(line).unwrap_or(0));
        Position::new(line, column)
    }

    /// End of the buffer.
    pub fn end(&self) -> Position {
        self.position_of(self.rope.len_chars())
    }

    /// Start of the grapheme cluster that ends at `pos`.
    ///
    /// At column 0 this is the end of the previous line (the newline is one grapheme).
    pub fn previous_grapheme_start(&self, pos: Position) -> Position {
        if pos.column == 0 {
            if pos.line <= 1 {
                return Position::start();
            }
            let prev = pos.line - 1;
            return Position::new(prev, self.line_len(prev).unwrap_or(0));
        }

        let line = self.line_text(pos.line).unwrap_or_default();
        let byte_end = line
            .char_indices()
            .nth(pos.column)
            .map(|(idx, _)| idx)
            .unwrap_or(line.len());
        let column = line[..byte_end]
            .grapheme_indices(true)
            .last()
            .map(|(idx, _)| line[..idx].chars().count())
            .unwrap_or(0);
        Position::new(pos.line, column)
    }

    /// Document version, incremented after each change.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether the buffer changed since the last [`Buffer::mark_saved`].
    pub fn is_modified(&self) -> bool {
        self.version != self.saved_version
    }

    /// Record the current version as saved.
    pub fn mark_saved(&mut self) {
        self.saved_version = self.version;
    }

    /// Insert `text` at `pos`.
    pub fn insert(&mut self, pos: Position, text: &str) -> Result<()> {
        self.replace(pos, pos, text)
    }

    /// Delete the text between `start` and `end`, returning it.
    pub fn delete(&mut self, start: Position, end: Position) -> Result<String> {
        let deleted = self.text_range(start, end)?;
        self.replace(start, end, "")?;
        Ok(deleted)
    }

    /// Replace the text between `start` and `end` with `text`.
    pub fn replace(&mut self, start: Position, end: Position, text: &str) -> Result<()> {
        let (start, end) = self.offset_range(start, end)?;
        if start == end && text.is_empty() {
            return Ok(());
        }

        let text = LineEnding::normalize(text);
        let (edit, entry) = self.apply_raw(start, end, &text);
        self.undo_stack.push(vec![entry]);
        self.redo_stack.clear();
        self.finish_change(ChangeKind::Edit, vec![edit]);
        Ok(())
    }

    /// Replace the whole content (e.g. after loading a file). Clears the undo history.
    pub fn set_text(&mut self, text: &str) {
        let text = LineEnding::normalize(text);
        let (edit, _) = self.apply_raw(0, self.rope.len_chars(), &text);
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.finish_change(ChangeKind::Reload, vec![edit]);
    }

    /// Whether there is anything to undo.
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Whether there is anything to redo.
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Undo the most recent edit. Returns `false` if there was nothing to undo.
    pub fn undo(&mut self) -> bool {
        let Some(step) = self.undo_stack.pop() else {
            return false;
        };

        let mut edits = Vec::with_capacity(step.len());
        for entry in step.iter().rev() {
            let inserted_end = entry.start + entry.new_text.chars().count();
            let (edit, _) = self.apply_raw(entry.start, inserted_end, &entry.old_text);
            edits.push(edit);
        }

        self.redo_stack.push(step);
        self.finish_change(ChangeKind::Undo, edits);
        true
    }

    /// Redo the most recently undone edit. Returns `false` if there was nothing to redo.
    pub fn redo(&mut self) -> bool {
        let Some(step) = self.redo_stack.pop() else {
            return false;
        };

        let mut edits = Vec::with_capacity(step.len());
        for entry in &step {
            let removed_end = entry.start + entry.old_text.chars().count();
            let (edit, _) = self.apply_raw(entry.start, removed_end, &entry.new_text);
            edits.push(edit);
        }

        self.undo_stack.push(step);
        self.finish_change(ChangeKind::Redo, edits);
        true
    }

    /// Subscribe to change notifications.
    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&BufferChange) + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Remove a subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub, _)| *sub != id);
        before != self.subscribers.len()
    }

    /// Tag storage.
    pub fn tags(&self) -> &TagStore {
        &self.tags
    }

    /// Tag `[start, end)` with `tag` on behalf of `owner`.
    pub fn add_tag(
        &mut self,
        owner: TagOwner,
        tag: &str,
        start: Position,
        end: Position,
    ) -> Result<()> {
        let (start, end) = self.offset_range(start, end)?;
        self.tags.add(TagRange::new(start, end, owner, tag));
        Ok(())
    }

    /// Remove `owner`'s tags between two positions.
    pub fn remove_tags(&mut self, owner: TagOwner, start: Position, end: Position) -> Result<()> {
        let (start, end) = self.offset_range(start, end)?;
        self.tags.remove_owner_in_range(owner, start, end);
        Ok(())
    }

    /// Names of the tags active at `pos`, lowest precedence first.
    pub fn tag_names_at(&self, pos: Position) -> Vec<&str> {
        match self.offset_of(pos) {
            Ok(offset) => self.tags.tags_at(offset),
            Err(_) => Vec::new(),
        }
    }

    /// Tags overlapping `line`, clipped to the line and converted to columns.
    pub fn tags_on_line(&self, line: usize) -> Vec<LineTag<'_>> {
        let Some(len) = self.line_len(line) else {
            return Vec::new();
        };
        let line_start = self.rope.line_to_char(line - 1);
        let line_end = line_start + len;

        self.tags
            .query_range(line_start, line_end.max(line_start + 1))
            .into_iter()
            .filter_map(|range| {
                let start = range.start.max(line_start) - line_start;
                let end = range.end.min(line_end) - line_start;
                (start < end).then_some(LineTag {
                    start,
                    end,
                    owner: range.owner,
                    tag: range.tag.as_str(),
                })
            })
            .collect()
    }

    /// Apply derived-state edits (syntax tags, diagnostics).
    pub fn apply_processing_edits<I>(&mut self, edits: I)
    where
        I: IntoIterator<Item = ProcessingEdit>,
    {
        for edit in edits {
            match edit {
                ProcessingEdit::ReplaceLineTags {
                    owner,
                    first_line,
                    last_line,
                    spans,
                } => self.replace_line_tags(owner, first_line, last_line, spans),
                ProcessingEdit::ReplaceOwnerTags { owner, ranges } => {
                    self.tags.remove_owner(owner);
                    let len = self.rope.len_chars();
                    for range in ranges {
                        if range.owner == owner && range.end <= len {
                            self.tags.add(range);
                        }
                    }
                }
                ProcessingEdit::ClearOwnerTags { owner } => {
                    self.tags.remove_owner(owner);
                }
            }
        }
    }

    /// Run a processor and apply its edits.
    pub fn apply_processor<P>(&mut self, processor: &mut P) -> std::result::Result<(), P::Error>
    where
        P: DocumentProcessor,
    {
        let edits = processor.process(self)?;
        self.apply_processing_edits(edits);
        Ok(())
    }

    fn replace_line_tags(
        &mut self,
        owner: TagOwner,
        first_line: usize,
        last_line: usize,
        spans: Vec<(usize, Vec<crate::tags::LineSpan>)>,
    ) {
        let line_count = self.line_count();
        let first_line = first_line.max(1);
        let last_line = last_line.min(line_count);
        if first_line > last_line {
            return;
        }

        // Include the trailing newline so a range split by Return is fully cleared.
        let start = self.rope.line_to_char(first_line - 1);
        let end = if last_line < line_count {
            self.rope.line_to_char(last_line)
        } else {
            self.rope.len_chars()
        };
        self.tags.remove_owner_in_range(owner, start, end);

        for (line, line_spans) in spans {
            if line < first_line || line > last_line {
                continue;
            }
            let Some(len) = self.line_len(line) else {
                continue;
            };
            let line_start = self.rope.line_to_char(line - 1);
            for span in line_spans {
                let end = span.end.min(len);
                if span.start < end {
                    self.tags.add(TagRange::new(
                        line_start + span.start,
                        line_start + end,
                        owner,
                        span.tag,
                    ));
                }
            }
        }
    }

    fn offset_range(&self, start: Position, end: Position) -> Result<(usize, usize)> {
        let start_off = self.offset_of(start)?;
        let end_off = self.offset_of(end)?;
        if end_off < start_off {
            return Err(CoreError::InvalidPosition(end));
        }
        Ok((start_off, end_off))
    }

    fn apply_raw(&mut self, start: usize, end: usize, text: &str) -> (TextEdit, UndoEntry) {
        let start_pos = self.position_of(start);
        let end_pos = self.position_of(end);
        let old_text = self.rope.slice(start..end).to_string();

        if start < end {
            self.rope.remove(start..end);
            self.tags.update_for_deletion(start, end);
        }
        if !text.is_empty() {
            self.rope.insert(start, text);
            self.tags.update_for_insertion(start, text.chars().count());
        }

        let edit = TextEdit {
            start: start_pos,
            end: end_pos,
            old_text: old_text.clone(),
            new_text: text.to_string(),
        };
        let entry = UndoEntry {
            start,
            old_text,
            new_text: text.to_string(),
        };
        (edit, entry)
    }

    fn finish_change(&mut self, kind: ChangeKind, edits: Vec<TextEdit>) {
        self.version += 1;
        let change = BufferChange {
            kind,
            edits,
            version: self.version,
        };
        for (_, callback) in &mut self.subscribers {
            callback(&change);
        }
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_and_offset_conversion() {
        let buffer = Buffer::new("ab\ncde\n");
        assert_eq!(buffer.line_count(), 3);
        assert_eq!(buffer.line_text(2).as_deref(), Some("cde"));
        assert_eq!(buffer.line_text(3).as_deref(), Some(""));
        assert_eq!(buffer.line_text(4), None);
        assert_eq!(buffer.offset_of(Position::new(2, 1)).unwrap(), 4);
        assert_eq!(buffer.position_of(4), Position::new(2, 1));
        assert!(buffer.offset_of(Position::new(1, 3)).is_err());
        assert!(buffer.offset_of(Position::new(0, 0)).is_err());
    }

    #[test]
    fn test_insert_shifts_following_lines() {
        let mut buffer = Buffer::new("one\ntwo");
        buffer.insert(Position::new(1, 3), "\nextra").unwrap();
        assert_eq!(buffer.line_count(), 3);
        assert_eq!(buffer.line_text(3).as_deref(), Some("two"));
        assert!(buffer.is_modified());
        buffer.mark_saved();
        assert!(!buffer.is_modified());
    }

    #[test]
    fn test_previous_grapheme_start_handles_combining_marks() {
        let buffer = Buffer::new("ae\u{301}x\nz");
        assert_eq!(
            buffer.previous_grapheme_start(Position::new(1, 3)),
            Position::new(1, 1)
        );
        assert_eq!(
            buffer.previous_grapheme_start(Position::new(2, 0)),
            Position::new(1, 4)
        );
        assert_eq!(
            buffer.previous_grapheme_start(Position::start()),
            Position::start()
        );
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        use std::sync::{Arc, Mutex};

        let mut buffer = Buffer::new("");
        let count = Arc::new(Mutex::new(0));
        let count_clone = Arc::clone(&count);
        let id = buffer.subscribe(move |_| *count_clone.lock().unwrap() += 1);

        buffer.insert(Position::start(), "a").unwrap();
        assert!(buffer.unsubscribe(id));
        buffer.insert(Position::start(), "b").unwrap();

        assert_eq!(*count.lock().unwrap(), 1);
        assert!(!buffer.unsubscribe(id));
    }
}
