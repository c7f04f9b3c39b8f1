//! Diagnostics translated into editor ranges and `DIAGNOSTICS` tags.

use crate::lsp_events::{LspDiagnostic, LspDiagnosticSeverity};
use quill_core::{Buffer, Position, ProcessingEdit, TagOwner, TagRange};

/// A diagnostic in editor coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorDiagnostic {
    /// Start of the range.
    pub start: Position,
    /// End of the range (exclusive).
    pub end: Position,
    /// Severity, if the server gave one.
    pub severity: Option<LspDiagnosticSeverity>,
    /// `source: message`, or just the message.
    pub message: String,
}

impl EditorDiagnostic {
    /// Tag name for this diagnostic. Diagnostics without severity are drawn as warnings.
    pub fn tag_name(&self) -> &'static str {
        self.severity
            .unwrap_or(LspDiagnosticSeverity::Warning)
            .tag_name()
    }
}

/// Translate diagnostics, ordered so that more severe ones come later and are drawn on top.
pub fn editor_diagnostics(diagnostics: &[LspDiagnostic]) -> Vec<EditorDiagnostic> {
    let mut out: Vec<EditorDiagnostic> = diagnostics
        .iter()
        .map(|diagnostic| {
            let (start, end) = diagnostic.range.to_editor();
            let message = match &diagnostic.source {
                Some(source) => format!("{source}: {}", diagnostic.message),
                None => diagnostic.message.clone(),
            };
            EditorDiagnostic {
                start,
                end,
                severity: diagnostic.severity,
                message,
            }
        })
        .collect();

    // Missing severity sorts first, then Hint ... Error.
    out.sort_by_key(|diagnostic| diagnostic.severity.map_or(0, |s| 4 - s as u8));
    out
}

/// Replace the buffer's `DIAGNOSTICS` tags with these diagnostics.
///
/// Positions past the end of the buffer are clamped, since the server may lag behind the
/// latest edits. Zero-width ranges are widened by one character so they stay visible.
pub fn diagnostic_tags(buffer: &Buffer, diagnostics: &[EditorDiagnostic]) -> ProcessingEdit {
    let len = buffer.len_chars();
    let ranges = diagnostics
        .iter()
        .filter_map(|diagnostic| {
            let start = buffer.offset_of(buffer.clamp(diagnostic.start)).ok()?;
            let mut end = buffer.offset_of(buffer.clamp(diagnostic.end)).ok()?;
            if end <= start {
                end = (start + 1).min(len);
            }
            (start < end).then(|| {
                TagRange::new(start, end, TagOwner::DIAGNOSTICS, diagnostic.tag_name())
            })
        })
        .collect();

    ProcessingEdit::ReplaceOwnerTags {
        owner: TagOwner::DIAGNOSTICS,
        ranges,
    }
}

/// The diagnostic messages covering `pos`, most severe first.
pub fn messages_at(diagnostics: &[EditorDiagnostic], pos: Position) -> Vec<&str> {
    diagnostics
        .iter()
        .rev()
        .filter(|diagnostic| {
            diagnostic.start <= pos && pos < diagnostic.end.max(next_col(diagnostic.start))
        })
        .map(|diagnostic| diagnostic.message.as_str())
        .collect()
}

fn next_col(pos: Position) -> Position {
    Position::new(pos.line, pos.column + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsp_coords::{LspPosition, LspRange};
    use pretty_assertions::assert_eq;

    fn lsp_diagnostic(
        line: u32,
        start: u32,
        end: u32,
        severity: Option<LspDiagnosticSeverity>,
        source: Option<&str>,
    ) -> LspDiagnostic {
        LspDiagnostic {
            range: LspRange::new(LspPosition::new(line, start), LspPosition::new(line, end)),
            severity,
            source: source.map(str::to_string),
            message: "msg".to_string(),
        }
    }

    #[test]
    fn test_errors_come_last() {
        let diagnostics = editor_diagnostics(&[
            lsp_diagnostic(0, 0, 1, Some(LspDiagnosticSeverity::Error), Some("pyflakes")),
            lsp_diagnostic(0, 0, 1, Some(LspDiagnosticSeverity::Hint), None),
            lsp_diagnostic(0, 0, 1, None, None),
            lsp_diagnostic(0, 0, 1, Some(LspDiagnosticSeverity::Warning), None),
        ]);

        assert_eq!(
            diagnostics.iter().map(|d| d.severity).collect::<Vec<_>>(),
            vec![
                None,
                Some(LspDiagnosticSeverity::Hint),
                Some(LspDiagnosticSeverity::Warning),
                Some(LspDiagnosticSeverity::Error),
            ]
        );
        assert_eq!(diagnostics[3].message, "pyflakes: msg");
        assert_eq!(diagnostics[3].start, Position::new(1, 0));
    }

    #[test]
    fn test_diagnostic_tags_clamp_and_widen() {
        let mut buffer = Buffer::new("import os\nx\n");
        let diagnostics = editor_diagnostics(&[
            lsp_diagnostic(0, 7, 9, Some(LspDiagnosticSeverity::Warning), None),
            lsp_diagnostic(1, 0, 0, Some(LspDiagnosticSeverity::Error), None),
            lsp_diagnostic(1, 5, 40, Some(LspDiagnosticSeverity::Error), None),
        ]);
        buffer.apply_processing_edits([diagnostic_tags(&buffer, &diagnostics)]);

        let ranges: Vec<_> = buffer
            .tags()
            .ranges_for_owner(TagOwner::DIAGNOSTICS)
            .into_iter()
            .map(|r| (r.start, r.end, r.tag.clone()))
            .collect();
        assert_eq!(
            ranges,
            vec![
                (7, 9, "diagnostic-warning".to_string()),
                (10, 11, "diagnostic-error".to_string()),
                (11, 12, "diagnostic-error".to_string()),
            ]
        );
    }

    #[test]
    fn test_messages_at_position() {
        let diagnostics = editor_diagnostics(&[
            lsp_diagnostic(0, 0, 4, Some(LspDiagnosticSeverity::Warning), Some("a")),
            lsp_diagnostic(0, 2, 3, Some(LspDiagnosticSeverity::Error), Some("b")),
        ]);
        assert_eq!(messages_at(&diagnostics, Position::new(1, 2)), vec!["b: msg", "a: msg"]);
        assert_eq!(messages_at(&diagnostics, Position::new(1, 3)), vec!["a: msg"]);
        assert!(messages_at(&diagnostics, Position::new(2, 0)).is_empty());
    }
}
