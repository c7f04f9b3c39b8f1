//! Nick and channel name rules from RFC 2812.

use regex::Regex;
use std::sync::LazyLock;

/// A nick: a letter or special character, then up to 15 letters, digits, `-` or specials.
///
/// Longer than RFC 2812 allows because common networks accept 16 characters.
pub const NICK_PATTERN: &str = r"[A-Za-z\[\]\\`_^{|}][A-Za-z0-9\-\[\]\\`_^{|}]{0,15}";

/// A channel: one of `#&+!`, then 1-49 characters other than space, BEL and comma.
///
/// A bare `#` is refused by most networks, so at least one character must follow the prefix.
pub const CHANNEL_PATTERN: &str = r"[#&+!][^ \x07,]{1,49}";

static NICK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^(?:{NICK_PATTERN})$")).expect("valid nick regex"));

static CHANNEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^(?:{CHANNEL_PATTERN})$")).expect("valid channel regex")
});

pub(crate) static NICK_SEARCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(NICK_PATTERN).expect("valid nick regex"));

/// Whether `nick` can be used as a nick.
pub fn is_valid_nick(nick: &str) -> bool {
    NICK_REGEX.is_match(nick)
}

/// Whether `channel` can be joined.
pub fn is_valid_channel(channel: &str) -> bool {
    CHANNEL_REGEX.is_match(channel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nicks() {
        for nick in ["alice", "[away]", "a-b", "x_", "`quote", "abcdefghijklmnop"] {
            assert!(is_valid_nick(nick), "{nick:?}");
        }
        for nick in ["", "1abc", "-dash", "has space", "abcdefghijklmnopq", "ä"] {
            assert!(!is_valid_nick(nick), "{nick:?}");
        }
    }

    #[test]
    fn test_channels() {
        for channel in ["#rust", "##offtopic", "&local", "+modeless", "!ABCDEchan", "#ü"] {
            assert!(is_valid_channel(channel), "{channel:?}");
        }
        let too_long = format!("#{}", "x".repeat(50));
        for channel in ["#", "rust", "#a b", "#a,b", "#bell\x07", too_long.as_str()] {
            assert!(!is_valid_channel(channel), "{channel:?}");
        }
    }
}
