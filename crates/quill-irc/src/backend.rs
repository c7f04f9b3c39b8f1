//! The two threads behind a connection.
//!
//! The reader blocks on the socket, answers `PING` on its own and forwards every other line to
//! the dispatcher. The dispatcher owns all protocol state and is the only thread that writes
//! commands, so received lines and queued commands are handled in the order they arrived.

use crate::events::IrcEvent;
use crate::message::{IrcMessage, RPL_ENDOFMOTD, RPL_ENDOFNAMES, RPL_NAMREPLY};
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{Receiver, Sender};
use tracing::{debug, warn};

/// Something the application asked the connection to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Join(String),
    Part {
        channel: String,
        reason: Option<String>,
    },
    Privmsg {
        recipient: String,
        text: String,
    },
    ChangeNick(String),
    Quit,
}

/// Everything the dispatcher waits for, on one queue.
#[derive(Debug)]
pub(crate) enum Internal {
    GotMessage(IrcMessage),
    Command(Command),
    ReaderStopped(String),
}

/// Write `parts` joined by spaces as one line.
pub(crate) fn send_line<W: Write>(writer: &mut W, parts: &[&str]) -> io::Result<()> {
    let mut line = parts.join(" ");
    line.push_str("\r\n");
    writer.write_all(line.as_bytes())?;
    writer.flush()
}

/// Body of the reader thread. Returns after telling the dispatcher why reading stopped.
pub(crate) fn reader_loop<R: BufRead, W: Write>(reader: R, pong: W, internal: &Sender<Internal>) {
    let reason = read_lines(reader, pong, internal);
    debug!("IRC reader stopped: {reason}");
    // The dispatcher may already be gone after a quit.
    let _ = internal.send(Internal::ReaderStopped(reason));
}

fn read_lines<R: BufRead, W: Write>(
    mut reader: R,
    mut pong: W,
    internal: &Sender<Internal>,
) -> String {
    let mut raw = Vec::new();
    loop {
        raw.clear();
        match reader.read_until(b'\n', &mut raw) {
            Ok(0) => return "server closed the connection".to_string(),
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return err.to_string(),
        }

        let text = String::from_utf8_lossy(&raw);
        let line = text.trim_end_matches(['\r', '\n']);
        // Empty messages are silently ignored (RFC 2812, 2.3.1).
        if line.is_empty() {
            continue;
        }
        if line.starts_with("PING") {
            if let Err(err) = send_line(&mut pong, &[&line.replacen("PING", "PONG", 1)]) {
                return err.to_string();
            }
            continue;
        }
        if internal
            .send(Internal::GotMessage(IrcMessage::parse(line)))
            .is_err()
        {
            return "dispatcher stopped".to_string();
        }
    }
}

enum Flow {
    Continue,
    Stop(IrcEvent),
}

/// Protocol state of one connection, driven by [`Internal`] events.
pub(crate) struct Dispatcher<W> {
    writer: W,
    nick: String,
    autojoin: Vec<String>,
    // Nicks of channels we joined whose RPL_ENDOFNAMES has not arrived yet.
    names: HashMap<String, Vec<String>>,
    events: Sender<IrcEvent>,
}

impl<W: Write> Dispatcher<W> {
    pub(crate) fn new(
        writer: W,
        nick: String,
        autojoin: Vec<String>,
        events: Sender<IrcEvent>,
    ) -> Self {
        Self {
            writer,
            nick,
            autojoin,
            names: HashMap::new(),
            events,
        }
    }

    /// Handle internal events until the connection ends, then give back the writer.
    ///
    /// The last event emitted is always terminal.
    pub(crate) fn run(mut self, internal: &Receiver<Internal>) -> W {
        let terminal = loop {
            let Ok(event) = internal.recv() else {
                break IrcEvent::Disconnected {
                    reason: "connection dropped".to_string(),
                };
            };
            debug!(?event, "got an internal IRC event");

            let flow = match event {
                Internal::GotMessage(msg) => self.handle_message(&msg),
                Internal::Command(command) => self.handle_command(command),
                Internal::ReaderStopped(reason) => Ok(Flow::Stop(IrcEvent::Disconnected { reason })),
            };
            match flow {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop(event)) => break event,
                Err(err) => {
                    warn!("writing to the IRC server failed: {err}");
                    break IrcEvent::Disconnected {
                        reason: err.to_string(),
                    };
                }
            }
        };
        self.emit(terminal);
        self.writer
    }

    fn emit(&self, event: IrcEvent) {
        if self.events.send(event).is_err() {
            debug!("nobody is listening for IRC events");
        }
    }

    fn handle_message(&mut self, msg: &IrcMessage) -> io::Result<Flow> {
        let sender_nick = msg.sender.clone().unwrap_or_default();
        let from_us = msg.sender.as_deref() == Some(self.nick.as_str());

        match (msg.command.as_str(), msg.args.as_slice()) {
            ("PRIVMSG", [recipient, text]) => self.emit(IrcEvent::ReceivedPrivmsg {
                sender: sender_nick,
                recipient: recipient.clone(),
                text: text.clone(),
            }),
            ("JOIN", [channel, ..]) => {
                if from_us {
                    // SelfJoined waits for the nick list.
                    self.names.insert(channel.clone(), Vec::new());
                } else {
                    self.emit(IrcEvent::UserJoined {
                        nick: sender_nick,
                        channel: channel.clone(),
                    });
                }
            }
            ("PART", [channel, rest @ ..]) => {
                if from_us {
                    self.emit(IrcEvent::SelfParted {
                        channel: channel.clone(),
                    });
                } else {
                    self.emit(IrcEvent::UserParted {
                        nick: sender_nick,
                        channel: channel.clone(),
                        reason: rest.first().cloned(),
                    });
                }
            }
            ("NICK", [new, ..]) => {
                if from_us {
                    let old = std::mem::replace(&mut self.nick, new.clone());
                    self.emit(IrcEvent::SelfChangedNick {
                        old,
                        new: new.clone(),
                    });
                } else {
                    self.emit(IrcEvent::UserChangedNick {
                        old: sender_nick,
                        new: new.clone(),
                    });
                }
            }
            ("QUIT", rest) => {
                if from_us {
                    return Ok(Flow::Stop(IrcEvent::SelfQuit));
                }
                self.emit(IrcEvent::UserQuit {
                    nick: sender_nick,
                    reason: rest.first().cloned(),
                });
            }
            // Servers put extra arguments (our nick, channel type) before these two.
            (RPL_NAMREPLY, [.., channel, names]) if msg.sender_is_server => {
                match self.names.get_mut(channel) {
                    Some(nicks) => nicks.extend(
                        names
                            .split_whitespace()
                            .map(|name| name.trim_start_matches(['@', '+']).to_string()),
                    ),
                    None => self.emit_server_message(msg),
                }
            }
            (RPL_ENDOFNAMES, [.., channel, _]) if msg.sender_is_server => {
                match self.names.remove(channel) {
                    Some(nicks) => self.emit(IrcEvent::SelfJoined {
                        channel: channel.clone(),
                        nicks,
                    }),
                    // A NAMES listing we did not ask for by joining.
                    None => self.emit_server_message(msg),
                }
            }
            _ if msg.sender_is_server => {
                if msg.command == RPL_ENDOFMOTD {
                    for channel in &self.autojoin {
                        send_line(&mut self.writer, &["JOIN", channel])?;
                    }
                }
                self.emit_server_message(msg);
            }
            _ => self.emit(IrcEvent::UnknownMessage {
                sender: msg.sender.clone(),
                command: msg.command.clone(),
                args: msg.args.clone(),
            }),
        }
        Ok(Flow::Continue)
    }

    fn emit_server_message(&self, msg: &IrcMessage) {
        self.emit(IrcEvent::ServerMessage {
            sender: msg.sender.clone(),
            command: msg.command.clone(),
            args: msg.args.clone(),
        });
    }

    fn handle_command(&mut self, command: Command) -> io::Result<Flow> {
        match command {
            Command::Join(channel) => send_line(&mut self.writer, &["JOIN", &channel])?,
            Command::Part {
                channel,
                reason: None,
            } => send_line(&mut self.writer, &["PART", &channel])?,
            Command::Part {
                channel,
                reason: Some(reason),
            } => send_line(&mut self.writer, &["PART", &channel, &format!(":{reason}")])?,
            Command::Privmsg { recipient, text } => {
                send_line(
                    &mut self.writer,
                    &["PRIVMSG", &recipient, &format!(":{text}")],
                )?;
                self.emit(IrcEvent::SentPrivmsg { recipient, text });
            }
            Command::ChangeNick(nick) => send_line(&mut self.writer, &["NICK", &nick])?,
            Command::Quit => {
                send_line(&mut self.writer, &["QUIT"])?;
                return Ok(Flow::Stop(IrcEvent::SelfQuit));
            }
        }
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;
    use std::sync::mpsc;

    fn read_all(input: &[u8]) -> (Vec<u8>, Vec<Internal>) {
        let (tx, rx) = mpsc::channel();
        let mut pong = Vec::new();
        reader_loop(Cursor::new(input.to_vec()), &mut pong, &tx);
        drop(tx);
        (pong, rx.iter().collect())
    }

    fn dispatch(nick: &str, autojoin: &[&str], internal: Vec<Internal>) -> (String, Vec<IrcEvent>) {
        let (internal_tx, internal_rx) = mpsc::channel();
        for event in internal {
            internal_tx.send(event).unwrap();
        }
        internal_tx
            .send(Internal::ReaderStopped("test over".to_string()))
            .unwrap();

        let (event_tx, event_rx) = mpsc::channel();
        let dispatcher = Dispatcher::new(
            Vec::new(),
            nick.to_string(),
            autojoin.iter().map(|s| s.to_string()).collect(),
            event_tx,
        );
        let written = dispatcher.run(&internal_rx);
        (
            String::from_utf8(written).unwrap(),
            event_rx.try_iter().collect(),
        )
    }

    fn got(line: &str) -> Internal {
        Internal::GotMessage(IrcMessage::parse(line))
    }

    fn disconnected() -> IrcEvent {
        IrcEvent::Disconnected {
            reason: "test over".to_string(),
        }
    }

    #[test]
    fn test_ping_is_answered_without_an_event() {
        let (pong, internal) = read_all(b"PING :irc.example.org\r\n");
        assert_eq!(String::from_utf8(pong).unwrap(), "PONG :irc.example.org\r\n");
        assert_eq!(internal.len(), 1);
        assert!(matches!(&internal[0], Internal::ReaderStopped(reason) if reason == "server closed the connection"));
    }

    #[test]
    fn test_reader_accepts_bare_newlines_and_bad_utf8() {
        let (pong, internal) = read_all(b":a!b@c PRIVMSG #x :caf\xe9\n\r\n\n:srv NOTICE me :ok\r\n");
        assert!(pong.is_empty());
        let messages: Vec<&IrcMessage> = internal
            .iter()
            .filter_map(|event| match event {
                Internal::GotMessage(msg) => Some(msg),
                _ => None,
            })
            .collect();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].args, ["#x", "caf\u{FFFD}"]);
        assert_eq!(messages[1].command, "NOTICE");
    }

    #[test]
    fn test_names_are_collected_into_one_join_event() {
        let (_, events) = dispatch(
            "me",
            &[],
            vec![
                got(":me!u@host JOIN #x"),
                got(":srv 353 me = #x :@op +voiced me"),
                got(":srv 353 me = #x :late"),
                got(":srv 366 me #x :End of /NAMES list."),
            ],
        );
        assert_eq!(
            events,
            vec![
                IrcEvent::SelfJoined {
                    channel: "#x".to_string(),
                    nicks: vec![
                        "op".to_string(),
                        "voiced".to_string(),
                        "me".to_string(),
                        "late".to_string()
                    ],
                },
                disconnected(),
            ]
        );
    }

    #[test]
    fn test_names_of_a_channel_we_did_not_join_are_server_messages() {
        let (_, events) = dispatch(
            "me",
            &[],
            vec![
                got(":srv 353 me = #y :alice bob"),
                got(":srv 366 me #y :End of /NAMES list."),
            ],
        );
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], IrcEvent::ServerMessage { command, .. } if command == "353"));
        assert!(matches!(&events[1], IrcEvent::ServerMessage { command, .. } if command == "366"));
        assert_eq!(events[2], disconnected());
    }

    #[test]
    fn test_autojoin_after_motd() {
        let (written, events) = dispatch(
            "me",
            &["#a", "#b"],
            vec![got(":srv 376 me :End of /MOTD command.")],
        );
        assert_eq!(written, "JOIN #a\r\nJOIN #b\r\n");
        assert!(matches!(&events[0], IrcEvent::ServerMessage { command, .. } if command == "376"));
    }

    #[test]
    fn test_nick_changes_and_other_users() {
        let (_, events) = dispatch(
            "me",
            &[],
            vec![
                got(":me!u@h NICK you"),
                got(":me!x@h PART #x :not us anymore"),
                got(":you!u@h PART #x"),
                got(":bob!b@h QUIT :gone"),
                got(":bob!b@h KICK #x you"),
            ],
        );
        assert_eq!(
            events,
            vec![
                IrcEvent::SelfChangedNick {
                    old: "me".to_string(),
                    new: "you".to_string()
                },
                IrcEvent::UserParted {
                    nick: "me".to_string(),
                    channel: "#x".to_string(),
                    reason: Some("not us anymore".to_string()),
                },
                IrcEvent::SelfParted {
                    channel: "#x".to_string()
                },
                IrcEvent::UserQuit {
                    nick: "bob".to_string(),
                    reason: Some("gone".to_string())
                },
                IrcEvent::UnknownMessage {
                    sender: Some("bob".to_string()),
                    command: "KICK".to_string(),
                    args: vec!["#x".to_string(), "you".to_string()],
                },
                disconnected(),
            ]
        );
    }

    #[test]
    fn test_commands_are_written_in_order_and_quit_stops() {
        let (written, events) = dispatch(
            "me",
            &[],
            vec![
                Internal::Command(Command::Join("#x".to_string())),
                Internal::Command(Command::Privmsg {
                    recipient: "#x".to_string(),
                    text: "hi all".to_string(),
                }),
                Internal::Command(Command::Part {
                    channel: "#x".to_string(),
                    reason: Some("bye".to_string()),
                }),
                Internal::Command(Command::ChangeNick("other".to_string())),
                Internal::Command(Command::Quit),
                Internal::Command(Command::Join("#never".to_string())),
            ],
        );
        assert_eq!(
            written,
            "JOIN #x\r\nPRIVMSG #x :hi all\r\nPART #x :bye\r\nNICK other\r\nQUIT\r\n"
        );
        assert_eq!(
            events,
            vec![
                IrcEvent::SentPrivmsg {
                    recipient: "#x".to_string(),
                    text: "hi all".to_string()
                },
                IrcEvent::SelfQuit,
            ]
        );
    }
}
