//! Per-line regex tokenizer.

use quill_core::LineSpan;
use regex::Regex;
use std::collections::BTreeSet;

/// A single (pattern, tag) rule.
#[derive(Debug, Clone)]
pub struct TagRule {
    regex: Regex,
    tag: String,
}

impl TagRule {
    pub fn new(pattern: &str, tag: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            tag: tag.into(),
        })
    }

    /// A rule matching any of `words` as a whole identifier.
    pub fn words<I, S>(words: I, tag: impl Into<String>) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let alternatives: Vec<String> = words
            .into_iter()
            .map(|w| regex::escape(w.as_ref()))
            .collect();
        Self::new(&format!(r"\b(?:{})\b", alternatives.join("|")), tag)
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }
}

/// Applies an ordered list of [`TagRule`]s to single lines.
///
/// Rule order is fixed at construction; spans come out grouped by rule in that order, which is
/// also the order they are added to the buffer and so the visual precedence.
#[derive(Debug, Clone, Default)]
pub struct LineTokenizer {
    rules: Vec<TagRule>,
}

impl LineTokenizer {
    pub fn new(rules: Vec<TagRule>) -> Self {
        Self { rules }
    }

    /// A tokenizer without rules; it never produces spans.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn rules(&self) -> &[TagRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every tag name this tokenizer can produce.
    pub fn tag_names(&self) -> BTreeSet<&str> {
        self.rules.iter().map(TagRule::tag).collect()
    }

    /// Tokenize one line (without its newline). Columns are in chars.
    pub fn tokenize_line(&self, line: &str) -> Vec<LineSpan> {
        let mut spans = Vec::new();
        for rule in &self.rules {
            for m in rule.regex.find_iter(line) {
                if let Some(span) = span_from_match(line, m.start(), m.end(), &rule.tag) {
                    spans.push(span);
                }
            }
        }
        spans
    }
}

fn span_from_match(
    line: &str,
    match_start_byte: usize,
    match_end_byte: usize,
    tag: &str,
) -> Option<LineSpan> {
    if match_start_byte >= match_end_byte || match_end_byte > line.len() {
        return None;
    }

    let start_col = line[..match_start_byte].chars().count();
    let end_col = start_col + line[match_start_byte..match_end_byte].chars().count();
    Some(LineSpan::new(start_col, end_col, tag))
}
