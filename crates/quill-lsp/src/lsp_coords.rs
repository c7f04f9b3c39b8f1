//! Editor <-> protocol coordinates.
//!
//! Editor positions have 1-based lines; LSP positions have 0-based lines. Columns are character
//! counts on both sides: the client asks for the `utf-32` position encoding, so no UTF-16
//! remapping is done. What the server actually agreed to is reported as a [`PositionEncoding`].

use quill_core::Position;
use serde_json::{Value, json};

/// Unit of `character` offsets agreed with the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PositionEncoding {
    /// UTF-16 code units, the protocol default when a server does not say otherwise.
    #[default]
    Utf16,
    /// Unicode scalar values, which is what editor columns count.
    Utf32,
}

impl PositionEncoding {
    /// Read `capabilities.positionEncoding` from an `initialize` result.
    ///
    /// Anything other than `"utf-32"` (including `"utf-8"`) is treated as UTF-16.
    pub fn from_capabilities(capabilities: &Value) -> Self {
        match capabilities.get("positionEncoding").and_then(Value::as_str) {
            Some("utf-32") => Self::Utf32,
            _ => Self::Utf16,
        }
    }
}

/// LSP Position
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LspPosition {
    /// Line number (0-based)
    pub line: u32,
    /// Character offset (0-based)
    pub character: u32,
}

impl LspPosition {
    /// Create a new LSP position.
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }

    /// Convert an editor position.
    pub fn from_editor(pos: Position) -> Self {
        Self {
            line: pos.line.saturating_sub(1) as u32,
            character: pos.column as u32,
        }
    }

    /// Convert to an editor position.
    pub fn to_editor(self) -> Position {
        Position::new(self.line as usize + 1, self.character as usize)
    }

    /// Parse `{ "line": .., "character": .. }`.
    pub fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            line: value.get("line")?.as_u64()? as u32,
            character: value.get("character")?.as_u64()? as u32,
        })
    }

    /// Serialize to the protocol shape.
    pub fn to_value(self) -> Value {
        json!({ "line": self.line, "character": self.character })
    }
}

/// LSP Range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LspRange {
    /// Range start position (inclusive).
    pub start: LspPosition,
    /// Range end position (exclusive).
    pub end: LspPosition,
}

impl LspRange {
    /// Create a new LSP range.
    pub fn new(start: LspPosition, end: LspPosition) -> Self {
        Self { start, end }
    }

    /// Convert an editor range.
    pub fn from_editor(start: Position, end: Position) -> Self {
        Self::new(LspPosition::from_editor(start), LspPosition::from_editor(end))
    }

    /// Convert to editor positions.
    pub fn to_editor(self) -> (Position, Position) {
        (self.start.to_editor(), self.end.to_editor())
    }

    /// Parse `{ "start": .., "end": .. }`.
    pub fn from_value(value: &Value) -> Option<Self> {
        Some(Self::new(
            LspPosition::from_value(value.get("start")?)?,
            LspPosition::from_value(value.get("end")?)?,
        ))
    }

    /// Serialize to the protocol shape.
    pub fn to_value(self) -> Value {
        json!({ "start": self.start.to_value(), "end": self.end.to_value() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_shift_by_one() {
        let pos = Position::new(1, 7);
        let lsp = LspPosition::from_editor(pos);
        assert_eq!(lsp, LspPosition::new(0, 7));
        assert_eq!(lsp.to_editor(), pos);
    }

    #[test]
    fn test_range_value_shape() {
        let range = LspRange::from_editor(Position::new(2, 0), Position::new(3, 4));
        let value = range.to_value();
        assert_eq!(value["start"]["line"], 1);
        assert_eq!(value["end"]["character"], 4);
        assert_eq!(LspRange::from_value(&value), Some(range));
    }
}
