//! Typed events produced by the client from server messages.
//!
//! Only the subset of the protocol the editor reacts to is typed here. Everything else is
//! either answered automatically by [`Client`](crate::Client) or logged and dropped.

use crate::lsp_coords::LspRange;
use serde_json::Value;

/// LSP `MessageType` used by `window/showMessage` and `window/logMessage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LspMessageType {
    /// An error message.
    Error,
    /// A warning message.
    Warning,
    /// An informational message.
    Info,
    /// A log message (lowest severity).
    Log,
}

impl LspMessageType {
    /// Convert the numeric LSP `MessageType` into an enum.
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::Error),
            2 => Some(Self::Warning),
            3 => Some(Self::Info),
            4 => Some(Self::Log),
            _ => None,
        }
    }
}

/// Severity levels for `textDocument/publishDiagnostics`.
///
/// Ordered from most to least severe, so sorting ascending puts errors first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LspDiagnosticSeverity {
    /// Error diagnostics.
    Error,
    /// Warning diagnostics.
    Warning,
    /// Informational diagnostics.
    Information,
    /// Hint diagnostics.
    Hint,
}

impl LspDiagnosticSeverity {
    /// Convert the numeric LSP `DiagnosticSeverity` into an enum.
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            1 => Some(Self::Error),
            2 => Some(Self::Warning),
            3 => Some(Self::Information),
            4 => Some(Self::Hint),
            _ => None,
        }
    }

    /// Tag name used for buffer decorations.
    pub fn tag_name(self) -> &'static str {
        match self {
            Self::Error => "diagnostic-error",
            Self::Warning => "diagnostic-warning",
            Self::Information => "diagnostic-information",
            Self::Hint => "diagnostic-hint",
        }
    }
}

/// A single LSP diagnostic item.
#[derive(Debug, Clone, PartialEq)]
pub struct LspDiagnostic {
    /// Diagnostic range.
    pub range: LspRange,
    /// Optional severity.
    pub severity: Option<LspDiagnosticSeverity>,
    /// Optional diagnostic source (e.g. "pyflakes").
    pub source: Option<String>,
    /// Diagnostic message.
    pub message: String,
}

impl LspDiagnostic {
    /// Parse a diagnostic object.
    pub fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            range: LspRange::from_value(value.get("range")?)?,
            severity: value
                .get("severity")
                .and_then(Value::as_u64)
                .and_then(LspDiagnosticSeverity::from_u64),
            source: value
                .get("source")
                .and_then(Value::as_str)
                .map(str::to_string),
            message: value.get("message")?.as_str()?.to_string(),
        })
    }
}

/// The fields of an LSP `CompletionItem` the editor uses.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompletionItem {
    /// Text shown in the completion list.
    pub label: String,
    /// Text to insert, if different from the label.
    pub insert_text: Option<String>,
    /// Text used for filtering.
    pub filter_text: Option<String>,
    /// Text used for sorting.
    pub sort_text: Option<String>,
    /// Plain text or markdown documentation.
    pub documentation: Option<String>,
    /// `insertTextFormat == 2`: `insert_text` is a snippet.
    pub is_snippet: bool,
}

impl CompletionItem {
    /// Parse a completion item object. Items without a label are rejected.
    pub fn from_value(value: &Value) -> Option<Self> {
        let string_field = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        // `documentation` is either a string or `MarkupContent`.
        let documentation = match value.get("documentation") {
            Some(Value::String(doc)) => Some(doc.clone()),
            Some(markup) => markup
                .get("value")
                .and_then(Value::as_str)
                .map(str::to_string),
            None => None,
        };

        Some(Self {
            label: value.get("label")?.as_str()?.to_string(),
            insert_text: string_field("insertText"),
            filter_text: string_field("filterText"),
            sort_text: string_field("sortText"),
            documentation,
            is_snippet: value.get("insertTextFormat").and_then(Value::as_u64) == Some(2),
        })
    }

    /// Parse a completion response result: `CompletionItem[]`, `CompletionList` or `null`.
    pub fn list_from_result(result: &Value) -> Vec<Self> {
        let items = match result {
            Value::Array(items) => items.as_slice(),
            Value::Object(_) => result
                .get("items")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default(),
            _ => &[],
        };
        items.iter().filter_map(Self::from_value).collect()
    }
}

/// Something the editor should react to.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The `initialize` response arrived and `initialized` was sent.
    Initialized {
        /// Server capabilities as sent by the server.
        capabilities: Value,
    },
    /// Response to a completion request.
    Completion {
        /// Id returned by [`Client::completions`](crate::Client::completions).
        id: u64,
        /// Parsed items, in server order.
        items: Vec<CompletionItem>,
    },
    /// `textDocument/publishDiagnostics`
    PublishDiagnostics {
        /// Document URI.
        uri: String,
        /// The full set of diagnostics for that document.
        diagnostics: Vec<LspDiagnostic>,
    },
    /// `window/logMessage`
    LogMessage {
        /// Message severity.
        typ: LspMessageType,
        /// Message text.
        message: String,
    },
    /// `window/showMessage`
    ShowMessage {
        /// Message severity.
        typ: LspMessageType,
        /// Message text.
        message: String,
    },
    /// The `shutdown` response arrived; `exit` should be sent next.
    Shutdown,
    /// A request of ours failed.
    ResponseError {
        /// Request id.
        id: u64,
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
    },
}

impl ClientEvent {
    /// Parse a server notification. Returns `None` for notifications the editor ignores.
    pub fn from_notification(method: &str, params: &Value) -> Option<Self> {
        match method {
            "window/logMessage" | "window/showMessage" => {
                let typ = params
                    .get("type")?
                    .as_u64()
                    .and_then(LspMessageType::from_u64)?;
                let message = params.get("message")?.as_str()?.to_string();
                Some(if method == "window/logMessage" {
                    Self::LogMessage { typ, message }
                } else {
                    Self::ShowMessage { typ, message }
                })
            }
            "textDocument/publishDiagnostics" => {
                let uri = params.get("uri")?.as_str()?.to_string();
                let diagnostics = params
                    .get("diagnostics")?
                    .as_array()?
                    .iter()
                    .filter_map(LspDiagnostic::from_value)
                    .collect();
                Some(Self::PublishDiagnostics { uri, diagnostics })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_completion_item_markup_documentation() {
        let item = CompletionItem::from_value(&json!({
            "label": "print",
            "insertText": "print(${1:x})",
            "insertTextFormat": 2,
            "documentation": {"kind": "markdown", "value": "print(*args)"},
        }))
        .unwrap();
        assert!(item.is_snippet);
        assert_eq!(item.documentation.as_deref(), Some("print(*args)"));

        assert_eq!(CompletionItem::from_value(&json!({"insertText": "x"})), None);
    }

    #[test]
    fn test_completion_list_shapes() {
        let list = json!({"isIncomplete": false, "items": [{"label": "a"}, {"label": "b"}]});
        assert_eq!(CompletionItem::list_from_result(&list).len(), 2);
        assert_eq!(CompletionItem::list_from_result(&json!([{"label": "a"}])).len(), 1);
        assert!(CompletionItem::list_from_result(&Value::Null).is_empty());
    }

    #[test]
    fn test_publish_diagnostics_notification() {
        let event = ClientEvent::from_notification(
            "textDocument/publishDiagnostics",
            &json!({
                "uri": "file:///tmp/a.py",
                "diagnostics": [{
                    "range": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 3}},
                    "severity": 2,
                    "source": "pyflakes",
                    "message": "unused import",
                }],
            }),
        );
        let Some(ClientEvent::PublishDiagnostics { uri, diagnostics }) = event else {
            panic!("expected diagnostics, got {event:?}");
        };
        assert_eq!(uri, "file:///tmp/a.py");
        assert_eq!(diagnostics[0].severity, Some(LspDiagnosticSeverity::Warning));
        assert_eq!(diagnostics[0].source.as_deref(), Some("pyflakes"));
    }

    #[test]
    fn test_unknown_notification_is_ignored() {
        assert_eq!(ClientEvent::from_notification("$/progress", &json!({})), None);
        assert_eq!(
            ClientEvent::from_notification("window/logMessage", &json!({"type": 9, "message": "x"})),
            None
        );
    }
}
