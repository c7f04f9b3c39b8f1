//! Completion responses translated into editor completions.

use crate::lsp_events::CompletionItem;
use quill_core::Position;

/// A completion ready to be shown and applied by the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Text shown in the list.
    pub display_text: String,
    /// Start of the text to replace (the typed prefix).
    pub replace_start: Position,
    /// End of the text to replace (the cursor).
    pub replace_end: Position,
    /// Replacement text.
    pub replace_text: String,
    /// What the user still has to type for this item, used for filtering as they type.
    pub filter_text: String,
    /// Documentation shown next to the list.
    pub documentation: String,
}

/// Number of word characters right before the cursor.
///
/// `line_before_cursor` is the text from the start of the cursor's line up to the cursor.
pub fn typed_prefix_len(line_before_cursor: &str) -> usize {
    line_before_cursor
        .chars()
        .rev()
        .take_while(|&c| c.is_alphanumeric() || c == '_')
        .count()
}

/// Translate the items of a completion response.
///
/// The server-provided prefix handling is ignored: every item replaces the word characters typed
/// before `cursor`. Items are sorted by `sortText`, falling back to the label.
pub fn completions_from_items(
    mut items: Vec<CompletionItem>,
    cursor: Position,
    line_before_cursor: &str,
) -> Vec<Completion> {
    let prefix_len = typed_prefix_len(line_before_cursor);
    let replace_start = Position::new(cursor.line, cursor.column.saturating_sub(prefix_len));

    items.sort_by(|a, b| sort_key(a).cmp(sort_key(b)));
    items
        .into_iter()
        .map(|item| {
            let insert_text = non_empty(&item.insert_text).map(|text| {
                if item.is_snippet {
                    snippet_to_plain_text(text)
                } else {
                    text.to_string()
                }
            });
            let filter_source = non_empty(&item.filter_text)
                .or(insert_text.as_deref())
                .unwrap_or(&item.label);

            Completion {
                filter_text: filter_source.chars().skip(prefix_len).collect(),
                replace_text: insert_text.clone().unwrap_or_else(|| item.label.clone()),
                documentation: completion_documentation(&item),
                display_text: item.label,
                replace_start,
                replace_end: cursor,
            }
        })
        .collect()
}

/// Documentation for an item, starting with its label unless the documentation already does.
pub fn completion_documentation(item: &CompletionItem) -> String {
    match non_empty(&item.documentation) {
        Some(doc) if doc_contains_label(doc, &item.label) => doc.to_string(),
        Some(doc) => format!("{}\n\n{doc}", item.label.trim()),
        None => item.label.clone(),
    }
}

/// Whether `doc` already starts with the label, comparing only up to the `(` of a signature.
fn doc_contains_label(doc: &str, label: &str) -> bool {
    let label = label.trim();
    match label.split_once('(') {
        Some((name, _)) => doc.starts_with(&format!("{name}(")),
        None => doc.starts_with(label),
    }
}

fn sort_key(item: &CompletionItem) -> &str {
    non_empty(&item.sort_text).unwrap_or(&item.label)
}

fn non_empty(text: &Option<String>) -> Option<&str> {
    text.as_deref().filter(|text| !text.is_empty())
}

/// Downgrade an LSP snippet to the text it inserts when every placeholder keeps its default.
///
/// `${1:foo}` becomes `foo`, `${1|a,b|}` becomes `a`, tab stops and variables disappear and
/// `\x` escapes become `x`.
pub fn snippet_to_plain_text(snippet: &str) -> String {
    let chars: Vec<char> = snippet.chars().collect();
    let mut out = String::with_capacity(snippet.len());
    let mut i = 0;
    parse_snippet(&chars, &mut i, &mut out, false);
    out
}

/// Parse until the end or, inside a placeholder, until its closing `}`.
fn parse_snippet(chars: &[char], i: &mut usize, out: &mut String, nested: bool) {
    while *i < chars.len() {
        let c = chars[*i];
        *i += 1;
        match c {
            '\\' => {
                if let Some(&next) = chars.get(*i) {
                    out.push(next);
                    *i += 1;
                }
            }
            '}' if nested => return,
            '$' => match chars.get(*i) {
                Some('{') => {
                    *i += 1;
                    parse_braced(chars, i, out);
                }
                Some(&d) if d.is_ascii_digit() || d == '_' || d.is_ascii_alphabetic() => {
                    while chars
                        .get(*i)
                        .is_some_and(|&c| c == '_' || c.is_ascii_alphanumeric())
                    {
                        *i += 1;
                    }
                }
                _ => out.push('$'),
            },
            other => out.push(other),
        }
    }
}

/// Parse the inside of `${...}`, `i` pointing right after the `{`.
fn parse_braced(chars: &[char], i: &mut usize, out: &mut String) {
    while chars
        .get(*i)
        .is_some_and(|&c| c == '_' || c.is_ascii_alphanumeric())
    {
        *i += 1;
    }

    match chars.get(*i) {
        Some(':') => {
            *i += 1;
            parse_snippet(chars, i, out, true);
        }
        Some('|') => {
            *i += 1;
            let mut first_choice = true;
            while let Some(&c) = chars.get(*i) {
                *i += 1;
                match c {
                    '|' => {
                        if chars.get(*i) == Some(&'}') {
                            *i += 1;
                        }
                        return;
                    }
                    ',' => first_choice = false,
                    c if first_choice => out.push(c),
                    _ => {}
                }
            }
        }
        Some('}') => *i += 1,
        // Variable transforms and other syntax we do not render.
        _ => {
            let mut depth = 1;
            while let Some(&c) = chars.get(*i) {
                *i += 1;
                match c {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            return;
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn item(label: &str) -> CompletionItem {
        CompletionItem {
            label: label.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_typed_prefix_len() {
        assert_eq!(typed_prefix_len("    os.pa"), 2);
        assert_eq!(typed_prefix_len("x = "), 0);
        assert_eq!(typed_prefix_len("größe"), 5);
    }

    #[test]
    fn test_completions_replace_typed_prefix() {
        let items = vec![
            CompletionItem {
                sort_text: Some("b".to_string()),
                ..item("path")
            },
            CompletionItem {
                sort_text: Some("a".to_string()),
                insert_text: Some("pardir".to_string()),
                ..item("pardir")
            },
        ];
        let completions = completions_from_items(items, Position::new(3, 9), "    os.pa");

        assert_eq!(
            completions
                .iter()
                .map(|c| c.display_text.as_str())
                .collect::<Vec<_>>(),
            vec!["pardir", "path"]
        );
        assert_eq!(completions[1].replace_start, Position::new(3, 7));
        assert_eq!(completions[1].replace_end, Position::new(3, 9));
        assert_eq!(completions[1].replace_text, "path");
        assert_eq!(completions[1].filter_text, "th");
        assert_eq!(completions[0].filter_text, "rdir");
    }

    #[test]
    fn test_documentation_gets_label_prefix() {
        let with_doc = |label: &str, doc: &str| CompletionItem {
            documentation: Some(doc.to_string()),
            ..item(label)
        };

        assert_eq!(
            completion_documentation(&with_doc("foo(int x)", "foo(int x, char c)")),
            "foo(int x, char c)"
        );
        assert_eq!(
            completion_documentation(&with_doc("foo", "Does things.")),
            "foo\n\nDoes things."
        );
        assert_eq!(completion_documentation(&item("bar")), "bar");
    }

    #[test]
    fn test_snippet_downgrade() {
        assert_eq!(snippet_to_plain_text("print(${1:value})$0"), "print(value)");
        assert_eq!(snippet_to_plain_text("${1|one,two|} ${2}"), "one ");
        assert_eq!(snippet_to_plain_text("f(${1:a, ${2:b}})"), "f(a, b)");
        assert_eq!(snippet_to_plain_text("\\$x $TM_FILENAME"), "$x ");
        assert_eq!(snippet_to_plain_text("cost: 5$"), "cost: 5$");
    }
}
