//! Events a connection reports to the application.

/// Something that happened on an IRC connection.
///
/// A connection ends with exactly one [`IrcEvent::SelfQuit`] or [`IrcEvent::Disconnected`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcEvent {
    /// We joined `channel`; `nicks` is everyone in it, us included.
    SelfJoined {
        /// The channel.
        channel: String,
        /// Nicks without `@`/`+` prefixes.
        nicks: Vec<String>,
    },
    /// Our nick changed. [`crate::IrcCore::nick`] already returns `new` when this arrives.
    SelfChangedNick {
        /// The previous nick.
        old: String,
        /// The current nick.
        new: String,
    },
    /// We left `channel`.
    SelfParted {
        /// The channel.
        channel: String,
    },
    /// We quit. Nothing follows.
    SelfQuit,
    /// Someone else joined a channel we are on.
    UserJoined {
        /// Their nick.
        nick: String,
        /// The channel.
        channel: String,
    },
    /// Someone else changed their nick.
    UserChangedNick {
        /// The previous nick.
        old: String,
        /// The current nick.
        new: String,
    },
    /// Someone else left a channel.
    UserParted {
        /// Their nick.
        nick: String,
        /// The channel.
        channel: String,
        /// Part message, if any.
        reason: Option<String>,
    },
    /// Someone else disconnected.
    UserQuit {
        /// Their nick.
        nick: String,
        /// Quit message, if any.
        reason: Option<String>,
    },
    /// A message we sent.
    SentPrivmsg {
        /// Channel or nick.
        recipient: String,
        /// The text.
        text: String,
    },
    /// A message sent to us or to a channel we are on.
    ReceivedPrivmsg {
        /// Nick of the sender.
        sender: String,
        /// Channel, or our nick for private messages.
        recipient: String,
        /// The text.
        text: String,
    },
    /// Any other line from the server, e.g. MOTD lines and numerics.
    ServerMessage {
        /// Server name, `None` for lines without a prefix.
        sender: Option<String>,
        /// Command or numeric.
        command: String,
        /// Arguments.
        args: Vec<String>,
    },
    /// A line from a user that is not handled here (KICK, MODE, INVITE, ...).
    UnknownMessage {
        /// Nick of the sender.
        sender: Option<String>,
        /// Command.
        command: String,
        /// Arguments.
        args: Vec<String>,
    },
    /// The connection broke or the server closed it. Nothing follows.
    Disconnected {
        /// What went wrong.
        reason: String,
    },
}

impl IrcEvent {
    /// Whether this is the last event of a connection.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SelfQuit | Self::Disconnected { .. })
    }
}
