//! Deciding when to re-tokenize.
//!
//! Triggers ([`HighlightOrchestrator::on_change`], [`HighlightOrchestrator::on_keystroke`],
//! [`HighlightOrchestrator::request_full`]) only record work in a [`Pending`] value. The event
//! loop calls [`HighlightOrchestrator::flush`] after it finishes handling the current input
//! event, so highlighting never runs in the middle of one and line and full retagging never
//! interleave.

use crate::multiline::MultilineScanner;
use crate::python::{python_multiline, python_tokenizer};
use crate::tokenizer::LineTokenizer;
use quill_core::{
    Buffer, BufferChange, ChangeKind, DocumentProcessor, HighlighterKind, LineSpan,
    ProcessingEdit, TagOwner, TextEdit,
};
use std::collections::BTreeSet;
use std::convert::Infallible;
use tracing::debug;

const TRIPLE_QUOTES: [&str; 2] = ["\"\"\"", "'''"];

/// Highlighting work waiting for the next flush.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Pending {
    /// Nothing to do.
    #[default]
    Idle,
    /// Retag these lines (1-based), and rescan multiline strings if `multiline` is set.
    Lines {
        lines: BTreeSet<usize>,
        multiline: bool,
    },
    /// Retag every line and rescan multiline strings.
    Full,
}

impl Pending {
    fn add_lines(&mut self, new_lines: impl IntoIterator<Item = usize>, new_multiline: bool) {
        match self {
            Self::Full => {}
            Self::Idle => {
                *self = Self::Lines {
                    lines: new_lines.into_iter().collect(),
                    multiline: new_multiline,
                };
            }
            Self::Lines { lines, multiline } => {
                lines.extend(new_lines);
                *multiline |= new_multiline;
            }
        }
    }

    /// Move pending line numbers past `edit` to where those lines are after it.
    ///
    /// Lines inside the replaced range collapse onto the edit's first line.
    fn shift_for_edit(&mut self, edit: &TextEdit) {
        let Self::Lines { lines, .. } = self else {
            return;
        };
        let (start, end) = (edit.start.line, edit.end.line);
        let inserted = edit.new_text.matches('\n').count();
        if inserted == end - start {
            return;
        }
        *lines = lines
            .iter()
            .map(|&line| match line {
                l if l <= start => l,
                l if l <= end => start,
                l => l - (end - start) + inserted,
            })
            .collect();
    }
}

/// Schedules and performs syntax highlighting for one buffer.
#[derive(Debug, Clone)]
pub struct HighlightOrchestrator {
    tokenizer: LineTokenizer,
    multiline: Option<MultilineScanner>,
    pending: Pending,
    multiline_on_quote: bool,
}

impl HighlightOrchestrator {
    pub fn new(tokenizer: LineTokenizer, multiline: Option<MultilineScanner>) -> Self {
        Self {
            tokenizer,
            multiline,
            pending: Pending::Idle,
            multiline_on_quote: true,
        }
    }

    /// Orchestrator for a filetype's highlighter.
    pub fn for_kind(kind: HighlighterKind) -> Result<Self, regex::Error> {
        Ok(match kind {
            HighlighterKind::Python => Self::new(python_tokenizer()?, Some(python_multiline()?)),
            HighlighterKind::None => Self::new(LineTokenizer::empty(), None),
        })
    }

    /// Also rescan multiline strings when a single-line edit involves a triple quote.
    pub fn with_multiline_on_quote(mut self, enabled: bool) -> Self {
        self.multiline_on_quote = enabled;
        self
    }

    pub fn tokenizer(&self) -> &LineTokenizer {
        &self.tokenizer
    }

    pub fn pending(&self) -> &Pending {
        &self.pending
    }

    pub fn is_idle(&self) -> bool {
        self.pending == Pending::Idle
    }

    /// Schedule a full retag (file load, settings change).
    pub fn request_full(&mut self) {
        self.pending = Pending::Full;
    }

    /// Schedule retagging of the line a key was typed on.
    pub fn on_keystroke(&mut self, line: usize) {
        self.pending.add_lines([line], false);
    }

    /// Schedule the work a buffer change calls for.
    ///
    /// `buffer` is the buffer after the change.
    pub fn on_change(&mut self, change: &BufferChange, buffer: &Buffer) {
        match change.kind {
            ChangeKind::Reload | ChangeKind::Undo | ChangeKind::Redo => self.request_full(),
            ChangeKind::Edit => {
                for edit in &change.edits {
                    self.pending.shift_for_edit(edit);
                    let (first, last) = edit.touched_lines();
                    if edit.is_multiline() {
                        self.pending.add_lines(first..=last, true);
                        continue;
                    }

                    let quote_involved = self.multiline_on_quote
                        && (contains_triple_quote(&edit.new_text)
                            || contains_triple_quote(&edit.old_text)
                            || buffer
                                .line_text(first)
                                .is_some_and(|line| contains_triple_quote(&line)));
                    self.pending.add_lines([first], quote_involved);
                }
            }
        }
    }

    /// Perform pending work on `buffer`.
    pub fn flush(&mut self, buffer: &mut Buffer) {
        if self.is_idle() {
            return;
        }
        let Ok(()) = buffer.apply_processor(self);
    }

    /// Retag lines `first..=last` (clamped to the buffer).
    pub fn highlight_lines(&self, buffer: &Buffer, first: usize, last: usize) -> ProcessingEdit {
        let last = last.min(buffer.line_count());
        let spans: Vec<(usize, Vec<LineSpan>)> = (first.max(1)..=last)
            .filter_map(|line| {
                let text = buffer.line_text(line)?;
                let spans = self.tokenizer.tokenize_line(&text);
                (!spans.is_empty()).then_some((line, spans))
            })
            .collect();

        ProcessingEdit::ReplaceLineTags {
            owner: TagOwner::LINE_SYNTAX,
            first_line: first,
            last_line: last,
            spans,
        }
    }

    /// Rescan multiline strings in the whole buffer.
    pub fn highlight_multiline(&self, buffer: &Buffer) -> ProcessingEdit {
        match &self.multiline {
            Some(scanner) => ProcessingEdit::ReplaceOwnerTags {
                owner: TagOwner::MULTILINE_SYNTAX,
                ranges: scanner.tag_ranges(&buffer.text()),
            },
            None => ProcessingEdit::ClearOwnerTags {
                owner: TagOwner::MULTILINE_SYNTAX,
            },
        }
    }
}

impl DocumentProcessor for HighlightOrchestrator {
    type Error = Infallible;

    fn process(&mut self, buffer: &Buffer) -> Result<Vec<ProcessingEdit>, Self::Error> {
        let line_count = buffer.line_count();
        let edits = match std::mem::take(&mut self.pending) {
            Pending::Idle => Vec::new(),
            Pending::Full => {
                debug!(line_count, "full highlight");
                vec![
                    self.highlight_lines(buffer, 1, line_count),
                    self.highlight_multiline(buffer),
                ]
            }
            Pending::Lines { lines, multiline } => {
                // Lines may be gone if a later edit removed them.
                let lines: Vec<usize> = lines.into_iter().filter(|&l| l <= line_count).collect();
                debug!(lines = lines.len(), multiline, "line highlight");

                let mut edits: Vec<ProcessingEdit> = contiguous_runs(&lines)
                    .into_iter()
                    .map(|(first, last)| self.highlight_lines(buffer, first, last))
                    .collect();
                if multiline {
                    edits.push(self.highlight_multiline(buffer));
                }
                edits
            }
        };
        Ok(edits)
    }
}

fn contains_triple_quote(text: &str) -> bool {
    TRIPLE_QUOTES.iter().any(|q| text.contains(q))
}

fn contiguous_runs(sorted_lines: &[usize]) -> Vec<(usize, usize)> {
    let mut runs: Vec<(usize, usize)> = Vec::new();
    for &line in sorted_lines {
        match runs.last_mut() {
            Some((_, last)) if *last + 1 == line => *last = line,
            _ => runs.push((line, line)),
        }
    }
    runs
}
