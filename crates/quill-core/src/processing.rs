//! Generic document processing interfaces.
//!
//! Derived buffer state (syntax tags, diagnostics) is produced as [`ProcessingEdit`] values and
//! applied to a [`Buffer`] via [`Buffer::apply_processing_edits`]. Producers never mutate the
//! buffer directly, which keeps every tag owner's writes going through one place.

use crate::Buffer;
use crate::tags::{LineSpan, TagOwner, TagRange};

/// A change to derived buffer state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingEdit {
    /// Remove `owner`'s tags from the given lines (inclusive, 1-based) and add `spans`.
    ///
    /// Each entry of `spans` pairs a line number with the spans tokenized on that line.
    ReplaceLineTags {
        /// Owner whose tags are replaced.
        owner: TagOwner,
        /// First line (1-based).
        first_line: usize,
        /// Last line (inclusive).
        last_line: usize,
        /// New spans, per line.
        spans: Vec<(usize, Vec<LineSpan>)>,
    },
    /// Replace every range of `owner` (char offsets).
    ReplaceOwnerTags {
        /// Owner whose tags are replaced.
        owner: TagOwner,
        /// The full set of ranges for the owner.
        ranges: Vec<TagRange>,
    },
    /// Remove every range of `owner`.
    ClearOwnerTags {
        /// Owner being cleared.
        owner: TagOwner,
    },
}

/// A generic processor that produces [`ProcessingEdit`]s for a buffer.
pub trait DocumentProcessor {
    /// The error type returned by [`DocumentProcessor::process`].
    type Error;

    /// Compute derived state updates to apply to the buffer.
    fn process(&mut self, buffer: &Buffer) -> Result<Vec<ProcessingEdit>, Self::Error>;
}
