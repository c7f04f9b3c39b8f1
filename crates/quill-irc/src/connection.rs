//! The handle the application talks to.

use crate::backend::{Command, Dispatcher, Internal, reader_loop, send_line};
use crate::error::{IrcError, Result};
use crate::events::IrcEvent;
use crate::validation::{is_valid_channel, is_valid_nick};
use std::io::BufReader;
use std::net::{Shutdown, TcpStream};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Where and as whom to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcConfig {
    /// Server host name.
    pub host: String,
    /// Server port, usually 6667.
    pub port: u16,
    /// Nick to register with.
    pub nick: String,
    /// User name sent in `USER`.
    pub username: String,
    /// Real name sent in `USER`.
    pub realname: String,
    /// Channels joined once the server has sent its message of the day.
    pub autojoin: Vec<String>,
}

/// Where an [`IrcCore`] is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrcState {
    /// No connection. [`IrcCore::connect`] may be called.
    Disconnected,
    /// Inside [`IrcCore::connect`].
    Connecting,
    /// Registered; commands are accepted.
    Connected,
    /// `QUIT` was queued; waiting for the terminal event.
    Quitting,
}

/// One IRC connection.
///
/// Commands are queued to a dispatcher thread and never block. Events come back through
/// [`IrcCore::try_event`] and [`IrcCore::wait_event`]; taking a terminal event returns the
/// core to [`IrcState::Disconnected`], after which it may connect again.
#[derive(Debug)]
pub struct IrcCore {
    config: IrcConfig,
    nick: String,
    state: IrcState,
    internal: Option<Sender<Internal>>,
    events: Option<Receiver<IrcEvent>>,
    stream: Option<TcpStream>,
}

impl IrcCore {
    /// A disconnected core.
    pub fn new(config: IrcConfig) -> Self {
        let nick = config.nick.clone();
        Self {
            config,
            nick,
            state: IrcState::Disconnected,
            internal: None,
            events: None,
            stream: None,
        }
    }

    /// The configuration this core was created with.
    pub fn config(&self) -> &IrcConfig {
        &self.config
    }

    /// The current nick. Changes once the server confirms a [`IrcCore::change_nick`].
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Current state.
    pub fn state(&self) -> IrcState {
        self.state
    }

    /// Connect, register and start the reader and dispatcher threads.
    ///
    /// Errors are returned right away and leave the core disconnected, so this can simply be
    /// called again. It blocks while the TCP connection is set up.
    pub fn connect(&mut self) -> Result<()> {
        if self.state != IrcState::Disconnected {
            return Err(IrcError::AlreadyConnected);
        }
        if !is_valid_nick(&self.nick) {
            return Err(IrcError::InvalidNick(self.nick.clone()));
        }
        if let Some(channel) = self.config.autojoin.iter().find(|c| !is_valid_channel(c)) {
            return Err(IrcError::InvalidChannel(channel.clone()));
        }

        self.state = IrcState::Connecting;
        match self.open() {
            Ok(()) => {
                info!(
                    host = %self.config.host,
                    port = self.config.port,
                    nick = %self.nick,
                    "connected to IRC server"
                );
                self.state = IrcState::Connected;
                Ok(())
            }
            Err(err) => {
                self.state = IrcState::Disconnected;
                Err(err)
            }
        }
    }

    fn open(&mut self) -> Result<()> {
        let mut stream = TcpStream::connect((self.config.host.as_str(), self.config.port))?;
        // TODO: retry with an alternative nick on 433 (nick in use).
        send_line(&mut stream, &["NICK", &self.nick])?;
        send_line(
            &mut stream,
            &[
                "USER",
                &self.config.username,
                "0",
                "*",
                &format!(":{}", self.config.realname),
            ],
        )?;

        let reader = BufReader::new(stream.try_clone()?);
        let pong = stream.try_clone()?;
        let writer = stream.try_clone()?;
        let (internal_tx, internal_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();

        let reader_tx = internal_tx.clone();
        let spawned = thread::Builder::new()
            .name("irc-reader".to_string())
            .spawn(move || reader_loop(reader, pong, &reader_tx))
            .and_then(|_| {
                let dispatcher = Dispatcher::new(
                    writer,
                    self.nick.clone(),
                    self.config.autojoin.clone(),
                    event_tx,
                );
                thread::Builder::new()
                    .name("irc-dispatcher".to_string())
                    .spawn(move || {
                        let writer = dispatcher.run(&internal_rx);
                        // Wakes up the reader if it is still blocked.
                        if let Err(err) = writer.shutdown(Shutdown::Both) {
                            debug!("closing the IRC socket: {err}");
                        }
                    })
            });
        if let Err(err) = spawned {
            let _ = stream.shutdown(Shutdown::Both);
            return Err(err.into());
        }

        self.internal = Some(internal_tx);
        self.events = Some(event_rx);
        self.stream = Some(stream);
        Ok(())
    }

    /// Join `channel`. A [`IrcEvent::SelfJoined`] follows once the nick list has arrived.
    pub fn join(&self, channel: &str) -> Result<()> {
        if !is_valid_channel(channel) {
            return Err(IrcError::InvalidChannel(channel.to_string()));
        }
        self.command(Command::Join(channel.to_string()))
    }

    /// Leave `channel`, optionally with a part message.
    pub fn part(&self, channel: &str, reason: Option<&str>) -> Result<()> {
        if !is_valid_channel(channel) {
            return Err(IrcError::InvalidChannel(channel.to_string()));
        }
        self.command(Command::Part {
            channel: channel.to_string(),
            reason: reason.map(str::to_string),
        })
    }

    /// Send `text` to a channel or a nick. Every non-empty line becomes its own message.
    pub fn privmsg(&self, recipient: &str, text: &str) -> Result<()> {
        if !is_valid_channel(recipient) && !is_valid_nick(recipient) {
            return Err(IrcError::InvalidNick(recipient.to_string()));
        }
        for line in text.lines().filter(|line| !line.is_empty()) {
            self.command(Command::Privmsg {
                recipient: recipient.to_string(),
                text: line.to_string(),
            })?;
        }
        Ok(())
    }

    /// Ask the server for a new nick. [`IrcCore::nick`] changes when it agrees.
    pub fn change_nick(&self, nick: &str) -> Result<()> {
        if !is_valid_nick(nick) {
            return Err(IrcError::InvalidNick(nick.to_string()));
        }
        self.command(Command::ChangeNick(nick.to_string()))
    }

    /// Send `QUIT`. Part channels first if part messages matter.
    pub fn quit(&mut self) -> Result<()> {
        self.command(Command::Quit)?;
        self.state = IrcState::Quitting;
        Ok(())
    }

    /// The next event, if one is ready.
    pub fn try_event(&mut self) -> Option<IrcEvent> {
        let event = self.events.as_ref()?.try_recv().ok()?;
        self.observe(&event);
        Some(event)
    }

    /// Wait up to `timeout` for the next event.
    pub fn wait_event(&mut self, timeout: Duration) -> Option<IrcEvent> {
        let event = self.events.as_ref()?.recv_timeout(timeout).ok()?;
        self.observe(&event);
        Some(event)
    }

    fn command(&self, command: Command) -> Result<()> {
        if self.state != IrcState::Connected {
            return Err(IrcError::NotConnected);
        }
        let internal = self.internal.as_ref().ok_or(IrcError::NotConnected)?;
        internal
            .send(Internal::Command(command))
            .map_err(|_| IrcError::ConnectionClosed)
    }

    fn observe(&mut self, event: &IrcEvent) {
        match event {
            IrcEvent::SelfChangedNick { new, .. } => self.nick = new.clone(),
            event if event.is_terminal() => {
                info!("IRC connection ended: {event:?}");
                self.state = IrcState::Disconnected;
                self.internal = None;
                self.events = None;
                self.stream = None;
            }
            _ => {}
        }
    }
}

impl Drop for IrcCore {
    fn drop(&mut self) {
        if let Some(stream) = &self.stream {
            // Both threads end once their socket is closed.
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}
