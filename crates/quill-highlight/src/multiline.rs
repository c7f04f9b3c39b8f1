//! Whole-buffer scanner for constructs that span lines.

use quill_core::{TagOwner, TagRange};
use regex::Regex;

/// Finds every match of a DOTALL pattern in the full buffer text.
#[derive(Debug, Clone)]
pub struct MultilineScanner {
    regex: Regex,
    tag: String,
}

impl MultilineScanner {
    pub fn new(pattern: &str, tag: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            tag: tag.into(),
        })
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Char offset spans of all non-empty matches.
    pub fn scan(&self, text: &str) -> Vec<(usize, usize)> {
        let mut spans = Vec::new();
        // Byte to char conversion resumes from the previous match.
        let mut byte_pos = 0;
        let mut char_pos = 0;

        for m in self.regex.find_iter(text) {
            if m.start() == m.end() {
                continue;
            }
            char_pos += text[byte_pos..m.start()].chars().count();
            let start = char_pos;
            char_pos += m.as_str().chars().count();
            byte_pos = m.end();
            spans.push((start, char_pos));
        }
        spans
    }

    /// Scan results as tag ranges owned by [`TagOwner::MULTILINE_SYNTAX`].
    pub fn tag_ranges(&self, text: &str) -> Vec<TagRange> {
        self.scan(text)
            .into_iter()
            .map(|(start, end)| TagRange::new(start, end, TagOwner::MULTILINE_SYNTAX, &self.tag))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::python::python_multiline;

    #[test]
    fn test_triple_quoted_span_covers_newline() {
        let scanner = python_multiline().unwrap();
        assert_eq!(scanner.scan("\"\"\"a\nb\"\"\""), vec![(0, 9)]);
    }

    #[test]
    fn test_offsets_are_chars_across_matches() {
        let scanner = python_multiline().unwrap();
        let text = "ä = '''x'''\nö = \"\"\"\ny\"\"\"";
        assert_eq!(scanner.scan(text), vec![(4, 11), (16, 24)]);
    }

    #[test]
    fn test_unterminated_string_is_not_tagged() {
        let scanner = python_multiline().unwrap();
        assert!(scanner.scan("x = '''\nstill open").is_empty());
    }
}
