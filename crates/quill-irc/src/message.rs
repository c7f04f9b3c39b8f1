//! Parsing of single protocol lines.

/// Numeric reply sent at the end of the message of the day.
pub const RPL_ENDOFMOTD: &str = "376";
/// Numeric reply carrying part of a channel's nick list.
pub const RPL_NAMREPLY: &str = "353";
/// Numeric reply ending a channel's nick list.
pub const RPL_ENDOFNAMES: &str = "366";

/// One line received from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    /// Nick of a user, name of a server, or `None` when the line had no prefix.
    pub sender: Option<String>,
    /// `false` only for `nick!user@host` prefixes.
    pub sender_is_server: bool,
    /// Command name or three-digit numeric.
    pub command: String,
    /// Arguments; a trailing `:`-argument is one element, spaces included.
    pub args: Vec<String>,
}

impl IrcMessage {
    /// Parse a line with its terminator already removed.
    ///
    /// ```
    /// use quill_irc::IrcMessage;
    ///
    /// let msg = IrcMessage::parse(":bob!b@example.org PRIVMSG #rust :hello there");
    /// assert_eq!(msg.sender.as_deref(), Some("bob"));
    /// assert!(!msg.sender_is_server);
    /// assert_eq!(msg.args, ["#rust", "hello there"]);
    /// ```
    pub fn parse(line: &str) -> Self {
        let mut words = line.split(' ');
        let (sender, sender_is_server) = match line.strip_prefix(':') {
            Some(_) => {
                let prefix = &words.next().unwrap_or_default()[1..];
                match prefix.split_once('!') {
                    Some((nick, _user_and_host)) => (Some(nick.to_string()), false),
                    None => (Some(prefix.to_string()), true),
                }
            }
            None => (None, true),
        };
        let command = words.next().unwrap_or_default().to_string();

        let mut args = Vec::new();
        let rest: Vec<&str> = words.collect();
        for (n, arg) in rest.iter().enumerate() {
            if let Some(first) = arg.strip_prefix(':') {
                let mut trailing = first.to_string();
                for word in &rest[n + 1..] {
                    trailing.push(' ');
                    trailing.push_str(word);
                }
                args.push(trailing);
                break;
            }
            args.push(arg.to_string());
        }

        Self {
            sender,
            sender_is_server,
            command,
            args,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_server_numeric() {
        let msg = IrcMessage::parse(":irc.example.org 353 me = #x :@op +voice plain");
        assert_eq!(
            msg,
            IrcMessage {
                sender: Some("irc.example.org".to_string()),
                sender_is_server: true,
                command: "353".to_string(),
                args: vec![
                    "me".to_string(),
                    "=".to_string(),
                    "#x".to_string(),
                    "@op +voice plain".to_string()
                ],
            }
        );
    }

    #[test]
    fn test_parse_without_prefix() {
        let msg = IrcMessage::parse("NOTICE AUTH :*** Looking up your hostname");
        assert_eq!(msg.sender, None);
        assert!(msg.sender_is_server);
        assert_eq!(msg.command, "NOTICE");
        assert_eq!(msg.args, ["AUTH", "*** Looking up your hostname"]);
    }

    #[test]
    fn test_trailing_argument_keeps_colons_and_empty_text() {
        let msg = IrcMessage::parse(":a!b@c PRIVMSG me :see: this");
        assert_eq!(msg.args, ["me", "see: this"]);

        let msg = IrcMessage::parse(":a!b@c PART #x :");
        assert_eq!(msg.args, ["#x", ""]);
    }

    #[test]
    fn test_user_prefix_keeps_only_nick() {
        let msg = IrcMessage::parse(":alice!~alice@host.example JOIN #x");
        assert_eq!(msg.sender.as_deref(), Some("alice"));
        assert!(!msg.sender_is_server);
        assert_eq!(msg.args, ["#x"]);
    }
}
