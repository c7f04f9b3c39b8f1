//! Drawing the editor with ratatui.

use crate::app::{App, Confirm, InputMode, SELECTION_TAG, Tab};
use quill_core::{Buffer, TagOwner};
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Position as CursorPosition, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs};
use unicode_width::UnicodeWidthChar;

const POPUP_HEIGHT: u16 = 8;
const POPUP_WIDTH: u16 = 40;

/// Style of a tag, `None` for tags that are not drawn.
pub fn style_for_tag(tag: &str) -> Option<Style> {
    let style = Style::default();
    Some(match tag {
        "keyword" => style.fg(Color::LightBlue),
        "exception" => style.fg(Color::LightRed),
        "builtin" => style.fg(Color::Cyan),
        "string" | "multiline-string" => style.fg(Color::Green),
        "comment" => style.fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        "decorator" => style.fg(Color::Magenta),
        "diagnostic-error" => style
            .underline_color(Color::LightRed)
            .add_modifier(Modifier::UNDERLINED),
        "diagnostic-warning" => style
            .underline_color(Color::Yellow)
            .add_modifier(Modifier::UNDERLINED),
        "diagnostic-information" => style
            .underline_color(Color::Blue)
            .add_modifier(Modifier::UNDERLINED),
        "diagnostic-hint" => style
            .underline_color(Color::DarkGray)
            .add_modifier(Modifier::UNDERLINED),
        SELECTION_TAG => style.add_modifier(Modifier::REVERSED),
        _ => return None,
    })
}

// Later layers are patched over earlier ones.
fn layer(owner: TagOwner) -> u8 {
    match owner {
        TagOwner::LINE_SYNTAX => 0,
        TagOwner::MULTILINE_SYNTAX => 1,
        TagOwner::DIAGNOSTICS => 2,
        TagOwner::SELECTION => 3,
        _ => 0,
    }
}

/// Style of every char on `line`.
pub fn line_styles(buffer: &Buffer, line: usize) -> Vec<Style> {
    let len = buffer.line_len(line).unwrap_or(0);
    let mut styles = vec![Style::default(); len];
    let mut tags = buffer.tags_on_line(line);
    tags.sort_by_key(|tag| layer(tag.owner));
    for tag in tags {
        let Some(style) = style_for_tag(tag.tag) else {
            continue;
        };
        for s in &mut styles[tag.start.min(len)..tag.end.min(len)] {
            *s = s.patch(style);
        }
    }
    styles
}

fn char_width(c: char, tab_width: usize) -> usize {
    if c == '\t' {
        tab_width
    } else {
        c.width().unwrap_or(0)
    }
}

/// Spans of `line` starting at char column `scroll_left`, at most `width` cells wide.
pub fn render_line(tab: &Tab, line: usize, width: usize) -> Line<'static> {
    let text = tab.buffer.line_text(line).unwrap_or_default();
    let styles = line_styles(&tab.buffer, line);
    let tab_width = tab.filetype.indent_size.max(1);

    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut current = String::new();
    let mut current_style = Style::default();
    let mut used = 0;
    for (c, style) in text.chars().zip(styles).skip(tab.scroll_left) {
        let w = char_width(c, tab_width);
        if used + w > width {
            break;
        }
        used += w;
        if style != current_style && !current.is_empty() {
            spans.push(Span::styled(std::mem::take(&mut current), current_style));
        }
        current_style = style;
        if c == '\t' {
            current.extend(std::iter::repeat_n(' ', tab_width));
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        spans.push(Span::styled(current, current_style));
    }
    Line::from(spans)
}

/// Screen column of the cursor relative to the text area.
fn cursor_column(tab: &Tab) -> usize {
    let tab_width = tab.filetype.indent_size.max(1);
    tab.buffer
        .line_text(tab.cursor.line)
        .unwrap_or_default()
        .chars()
        .take(tab.cursor.column)
        .skip(tab.scroll_left)
        .map(|c| char_width(c, tab_width))
        .sum()
}

fn gutter_width(app: &App, tab: &Tab) -> u16 {
    if !app.settings().show_line_numbers {
        return 0;
    }
    tab.buffer.line_count().to_string().len() as u16 + 1
}

pub fn render(frame: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Tab bar
            Constraint::Min(1),    // Editor
            Constraint::Length(1), // Status bar
            Constraint::Length(1), // Shortcuts
        ])
        .split(frame.area());

    render_tab_bar(frame, app, chunks[0]);

    let gutter = app.current_tab().map(|tab| gutter_width(app, tab)).unwrap_or(0);
    let text_area = Rect {
        x: chunks[1].x + gutter,
        width: chunks[1].width.saturating_sub(gutter),
        ..chunks[1]
    };
    app.viewport = (text_area.height as usize, text_area.width as usize);
    let (height, width) = app.viewport;
    if let Some(tab) = app.tabs.current_mut() {
        tab.scroll_to_cursor(height, width);
    }

    if let Some(tab) = app.current_tab() {
        render_editor(frame, app, tab, chunks[1], text_area);
    }
    render_status_bar(frame, app, chunks[2]);
    render_shortcuts(frame, app, chunks[3]);
}

fn render_tab_bar(frame: &mut Frame, app: &App, area: Rect) {
    let titles: Vec<String> = app.tabs.iter().map(|(_, tab)| tab.title()).collect();
    let selected = app
        .tabs
        .current_id()
        .and_then(|id| app.tabs.iter().position(|(tab_id, _)| tab_id == id))
        .unwrap_or(0);
    let tabs = Tabs::new(titles)
        .select(selected)
        .style(Style::default().fg(Color::Gray))
        .highlight_style(
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
        );
    frame.render_widget(tabs, area);
}

fn render_editor(frame: &mut Frame, app: &App, tab: &Tab, area: Rect, text_area: Rect) {
    let first = tab.scroll_top;
    let last = (first + area.height as usize).min(tab.buffer.line_count() + 1);
    let width = text_area.width as usize;

    if text_area.x > area.x {
        let digits = (text_area.x - area.x - 1) as usize;
        let numbers: Vec<Line> = (first..last)
            .map(|line| Line::from(format!("{line:>digits$} ")))
            .collect();
        let gutter = Rect {
            width: text_area.x - area.x,
            ..area
        };
        frame.render_widget(
            Paragraph::new(numbers).style(Style::default().fg(Color::DarkGray)),
            gutter,
        );
    }

    let lines: Vec<Line> = (first..last)
        .map(|line| render_line(tab, line, width))
        .collect();
    frame.render_widget(Paragraph::new(lines), text_area);

    let cursor_x = text_area.x + cursor_column(tab) as u16;
    let cursor_y = text_area.y + (tab.cursor.line - tab.scroll_top) as u16;
    if app.mode == InputMode::Normal && app.confirm.is_none() {
        frame.set_cursor_position(CursorPosition::new(cursor_x, cursor_y));
    }

    if tab.completion.is_some() {
        render_completion_popup(frame, tab, area, cursor_x, cursor_y);
    }
}

fn render_completion_popup(frame: &mut Frame, tab: &Tab, area: Rect, x: u16, y: u16) {
    let Some(popup) = &tab.completion else {
        return;
    };
    let Some(typed) = popup.typed_since_request(&tab.buffer, tab.cursor) else {
        return;
    };
    let visible = popup.visible(&typed);
    if visible.is_empty() {
        return;
    }

    let height = POPUP_HEIGHT.min(visible.len() as u16 + 2);
    let width = POPUP_WIDTH.min(area.width);
    // Below the cursor if it fits, above otherwise.
    let top = if y + 1 + height <= area.bottom() {
        y + 1
    } else {
        y.saturating_sub(height).max(area.y)
    };
    let left = x.min(area.right().saturating_sub(width));
    let rect = Rect::new(left, top, width, height);

    let items: Vec<ListItem> = visible
        .iter()
        .map(|item| ListItem::new(item.display_text.clone()))
        .collect();
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL))
        .highlight_style(Style::default().bg(Color::Blue).fg(Color::White));
    let mut state = ListState::default().with_selected(Some(popup.selected));

    frame.render_widget(Clear, rect);
    frame.render_stateful_widget(list, rect, &mut state);
}

fn status_text(app: &App) -> String {
    if let Some(confirm) = app.confirm {
        return match confirm {
            Confirm::Quit => "Save changes before quitting? (y/n, Esc to cancel)".to_string(),
            Confirm::CloseTab(_) => "Save changes before closing? (y/n, Esc to cancel)".to_string(),
        };
    }
    match app.mode {
        InputMode::Open => return format!("Open file: {}", app.input_buffer),
        InputMode::SaveAs => return format!("Save as: {}", app.input_buffer),
        InputMode::Normal => {}
    }
    if !app.status_message.is_empty() {
        return app.status_message.clone();
    }
    let messages = app.diagnostics_at_cursor();
    if let Some(message) = messages.last() {
        return message.lines().next().unwrap_or_default().to_string();
    }

    let Some(tab) = app.current_tab() else {
        return String::new();
    };
    let mut text = format!(
        "{} | {} | Ln {}, Col {}",
        tab.title(),
        tab.filetype.name,
        tab.cursor.line,
        tab.cursor.column + 1
    );
    if let Some(state) = app.langserver_status() {
        text.push_str(&format!(" | langserver: {state}"));
    }
    text
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let status = Paragraph::new(status_text(app)).style(
        Style::default()
            .bg(Color::DarkGray)
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    );
    frame.render_widget(status, area);
}

fn render_shortcuts(frame: &mut Frame, app: &App, area: Rect) {
    let text = if app.confirm.is_some() {
        "y Yes  n No  Esc Cancel"
    } else if app.mode != InputMode::Normal {
        "Enter Confirm  Esc Cancel"
    } else {
        "^S Save  ^O Open  ^T New  ^W Close  ^X Quit  ^Z Undo  ^Y Redo  ^C Copy  ^V Paste  ^Space Complete"
    };
    let shortcuts = Paragraph::new(text).style(Style::default().bg(Color::Blue).fg(Color::White));
    frame.render_widget(shortcuts, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quill_core::{
        Filetypes, HighlighterKind, LineEnding, Position, ProcessingEdit, TagRange,
    };
    use quill_highlight::HighlightOrchestrator;

    fn python_tab(text: &str) -> Tab {
        let mut tab = Tab::new(
            Buffer::new(text),
            None,
            LineEnding::Lf,
            Filetypes::builtin().default_filetype().clone(),
            HighlightOrchestrator::for_kind(HighlighterKind::Python).unwrap(),
        );
        tab.highlighter.request_full();
        tab.highlighter.flush(&mut tab.buffer);
        tab
    }

    #[test]
    fn test_render_line_groups_styles() {
        let tab = python_tab("if x:  # yes\n");
        let line = render_line(&tab, 1, 80);
        let texts: Vec<&str> = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(texts, vec!["if", " x:  ", "# yes"]);
        assert_eq!(line.spans[0].style.fg, Some(Color::LightBlue));
        assert_eq!(line.spans[2].style.fg, Some(Color::DarkGray));
    }

    #[test]
    fn test_selection_is_drawn_over_syntax() {
        let mut tab = python_tab("return 1\n");
        tab.move_to(Position::new(1, 0), false);
        tab.move_to(Position::new(1, 3), true);

        let styles = line_styles(&tab.buffer, 1);
        assert_eq!(styles[0].fg, Some(Color::LightBlue));
        assert!(styles[0].add_modifier.contains(Modifier::REVERSED));
        assert!(!styles[4].add_modifier.contains(Modifier::REVERSED));
    }

    #[test]
    fn test_diagnostics_underline() {
        let mut tab = python_tab("abc\n");
        tab.buffer
            .apply_processing_edits([ProcessingEdit::ReplaceOwnerTags {
                owner: TagOwner::DIAGNOSTICS,
                ranges: vec![TagRange::new(1, 2, TagOwner::DIAGNOSTICS, "diagnostic-error")],
            }]);
        let styles = line_styles(&tab.buffer, 1);
        assert!(!styles[0].add_modifier.contains(Modifier::UNDERLINED));
        assert!(styles[1].add_modifier.contains(Modifier::UNDERLINED));
        assert_eq!(styles[1].underline_color, Some(Color::LightRed));
    }

    #[test]
    fn test_tabs_and_wide_chars_are_measured() {
        let mut tab = python_tab("\t漢字x\n");
        tab.move_to(Position::new(1, 3), false);
        assert_eq!(cursor_column(&tab), 4 + 2 + 2);

        let line = render_line(&tab, 1, 7);
        let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "    漢");
    }

    #[test]
    fn test_unknown_tags_are_not_drawn() {
        assert_eq!(style_for_tag("no-such-tag"), None);
        assert!(style_for_tag(SELECTION_TAG).is_some());
    }
}
