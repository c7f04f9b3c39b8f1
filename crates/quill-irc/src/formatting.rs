//! mIRC style codes, as understood by most clients.
//!
//! Messages carry inline control characters: [`BOLD`], [`UNDERLINE`], [`COLOR`] followed by
//! `N` or `N,M` (foreground and background color numbers) and [`RESET`]. [`parse_styles`] turns
//! such a string into plain-text spans with the style that applies to each.

use crate::validation::NICK_SEARCH;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Turns bold on.
pub const BOLD: char = '\x02';
/// Turns underline on.
pub const UNDERLINE: char = '\x1f';
/// Starts a color code.
pub const COLOR: char = '\x03';
/// Turns every style off.
pub const RESET: char = '\x0f';

/// The 16 standard colors as `#rrggbb`, indexed by color number.
pub const MIRC_COLORS: [&str; 16] = [
    "#ffffff", "#000000", "#00007f", "#009300", "#ff0000", "#7f0000", "#9c009c", "#fc7f00",
    "#ffff00", "#00fc00", "#009393", "#00ffff", "#0000fc", "#ff00ff", "#7f7f7f", "#d2d2d2",
];

/// Colors used for nicks: everything except white, black, grays and yellow.
pub const NICK_COLORS: [u8; 11] = [2, 3, 4, 5, 6, 7, 9, 10, 11, 12, 13];

static STYLE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x02|\x1f|\x03([0-9]{1,2})(?:,([0-9]{1,2}))?|\x0f").expect("valid style regex")
});

/// A run of text with one style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledSpan {
    /// The text, with control codes removed.
    pub text: String,
    /// Foreground color number, `None` for the default color.
    pub fg: Option<u8>,
    /// Background color number, `None` for the default color.
    pub bg: Option<u8>,
    /// Bold.
    pub bold: bool,
    /// Underlined.
    pub underline: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct Style {
    fg: Option<u8>,
    bg: Option<u8>,
    bold: bool,
    underline: bool,
}

impl Style {
    fn span(self, text: &str) -> StyledSpan {
        StyledSpan {
            text: text.to_string(),
            fg: self.fg,
            bg: self.bg,
            bold: self.bold,
            underline: self.underline,
        }
    }
}

// Numbers above 15 are shown in the default color.
fn color_number(digits: &str) -> Option<u8> {
    digits.parse().ok().filter(|n: &u8| usize::from(*n) < MIRC_COLORS.len())
}

/// Split `text` into styled spans. Empty spans are left out.
///
/// ```
/// use quill_irc::parse_styles;
///
/// let spans = parse_styles("plain \x02\x034,1loud\x0f quiet");
/// assert_eq!(spans[1].text, "loud");
/// assert_eq!((spans[1].fg, spans[1].bg, spans[1].bold), (Some(4), Some(1), true));
/// assert_eq!(spans[2].fg, None);
/// ```
pub fn parse_styles(text: &str) -> Vec<StyledSpan> {
    let mut spans = Vec::new();
    let mut style = Style::default();
    let mut last_end = 0;

    for caps in STYLE_REGEX.captures_iter(text) {
        let Some(code) = caps.get(0) else { continue };
        if code.start() > last_end {
            spans.push(style.span(&text[last_end..code.start()]));
        }
        last_end = code.end();

        match code.as_str().chars().next() {
            Some(BOLD) => style.bold = true,
            Some(UNDERLINE) => style.underline = true,
            Some(RESET) => style = Style::default(),
            _ => {
                style.fg = caps.get(1).and_then(|m| color_number(m.as_str()));
                // Without ",M" the background stays as it was.
                if let Some(bg) = caps.get(2) {
                    style.bg = color_number(bg.as_str());
                }
            }
        }
    }
    if last_end < text.len() {
        spans.push(style.span(&text[last_end..]));
    }
    spans
}

/// djb2 over the characters of `nick`. Stable between runs, unlike `std` hashers.
pub fn nick_hash(nick: &str) -> u64 {
    nick.chars().fold(5381u64, |hash, c| {
        hash.wrapping_mul(33).wrapping_add(u64::from(c))
    })
}

/// The color number used for `nick`.
pub fn nick_color(nick: &str) -> u8 {
    NICK_COLORS[(nick_hash(nick) % NICK_COLORS.len() as u64) as usize]
}

/// `nick` wrapped in bold and its color, followed by a reset.
pub fn color_nick(nick: &str) -> String {
    format!("{BOLD}{COLOR}{}{nick}{RESET}", nick_color(nick))
}

/// Wrap every word of `text` that is one of `known_nicks` with [`color_nick`].
pub fn color_known_nicks(text: &str, known_nicks: &HashSet<String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_end = 0;
    for found in NICK_SEARCH.find_iter(text) {
        if known_nicks.contains(found.as_str()) {
            out.push_str(&text[last_end..found.start()]);
            out.push_str(&color_nick(found.as_str()));
            last_end = found.end();
        }
    }
    out.push_str(&text[last_end..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn span(text: &str, fg: Option<u8>, bg: Option<u8>, bold: bool, underline: bool) -> StyledSpan {
        StyledSpan {
            text: text.to_string(),
            fg,
            bg,
            bold,
            underline,
        }
    }

    #[test]
    fn test_plain_text_is_one_span() {
        assert_eq!(parse_styles("hello"), vec![span("hello", None, None, false, false)]);
        assert_eq!(parse_styles(""), vec![]);
    }

    #[test]
    fn test_styles_accumulate_until_reset() {
        let spans = parse_styles("\x02a\x1fb\x0fc");
        assert_eq!(
            spans,
            vec![
                span("a", None, None, true, false),
                span("b", None, None, true, true),
                span("c", None, None, false, false),
            ]
        );
    }

    #[test]
    fn test_colors() {
        let spans = parse_styles("\x0312,8x\x034y\x0399z");
        assert_eq!(
            spans,
            vec![
                span("x", Some(12), Some(8), false, false),
                span("y", Some(4), Some(8), false, false),
                span("z", None, Some(8), false, false),
            ]
        );
    }

    #[test]
    fn test_color_nick_is_stable_and_readable() {
        assert_eq!(nick_color("alice"), nick_color("alice"));
        for nick in ["alice", "bob", "[x]", "somebody_else"] {
            let color = nick_color(nick);
            assert!(![0, 1, 8, 14, 15].contains(&color), "{nick} got {color}");
        }

        let colored = color_nick("bob");
        let spans = parse_styles(&colored);
        assert_eq!(spans, vec![span("bob", Some(nick_color("bob")), None, true, false)]);
    }

    #[test]
    fn test_nick_hash_is_djb2() {
        assert_eq!(nick_hash(""), 5381);
        assert_eq!(nick_hash("a"), 5381 * 33 + 97);
    }

    #[test]
    fn test_color_known_nicks() {
        let known: HashSet<String> = ["bob".to_string()].into_iter().collect();
        let out = color_known_nicks("hi bob, not bobby", &known);
        assert_eq!(out, format!("hi {}, not bobby", color_nick("bob")));
    }
}
