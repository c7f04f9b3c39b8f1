#![warn(missing_docs)]
//! `quill-irc` - a small IRC client backend.
//!
//! Each connection runs two threads. The reader blocks on the socket and answers `PING` by
//! itself; the dispatcher interprets every other line and writes the commands queued through
//! [`IrcCore`]. Both talk to each other and to the application only through channels.
//!
//! [`formatting`] handles the mIRC control codes found in message text.

mod backend;
pub mod connection;
pub mod error;
pub mod events;
pub mod formatting;
pub mod message;
pub mod validation;

pub use connection::{IrcConfig, IrcCore, IrcState};
pub use error::{IrcError, Result};
pub use events::IrcEvent;
pub use formatting::{
    BOLD, COLOR, MIRC_COLORS, NICK_COLORS, RESET, StyledSpan, UNDERLINE, color_known_nicks,
    color_nick, nick_color, nick_hash, parse_styles,
};
pub use message::{IrcMessage, RPL_ENDOFMOTD, RPL_ENDOFNAMES, RPL_NAMREPLY};
pub use validation::{CHANNEL_PATTERN, NICK_PATTERN, is_valid_channel, is_valid_nick};
