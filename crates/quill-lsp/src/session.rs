//! One running language server and the tabs it serves.
//!
//! A [`LangServer`] is driven entirely by [`LangServer::poll`], which the editor calls on a timer
//! tick: it flushes queued client bytes, reads whatever the server sent and turns client events
//! into [`SessionEvent`]s for the UI.

use crate::error::{LspError, Result};
use crate::langserver_io::{
    LangServerIo, LocalhostSocketIo, ReadResult, SubprocessStdio, spawn_stream_logger,
};
use crate::lsp_client::{Client, ClientState, LspContentChange};
use crate::lsp_completion::{Completion, completions_from_items};
use crate::lsp_coords::{LspPosition, LspRange};
use crate::lsp_diagnostics::{EditorDiagnostic, editor_diagnostics};
use crate::lsp_events::{ClientEvent, LspMessageType};
use crate::lsp_uri::path_to_file_uri;
use quill_core::{BufferChange, LangServerConfig, Position, TabId, split_command};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use tracing::{debug, error, info, warn};

/// Identifies a session: tabs with equal ids share one server process.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LangServerId {
    /// Command line the server was started with.
    pub command: String,
    /// Port, if the server listens on localhost.
    pub port: Option<u16>,
    /// Project the server was started for.
    pub project_root: PathBuf,
}

impl LangServerId {
    /// Id for `config` serving the project at `project_root`.
    pub fn new(config: &LangServerConfig, project_root: impl Into<PathBuf>) -> Self {
        Self {
            command: config.command.clone(),
            port: config.port,
            project_root: project_root.into(),
        }
    }
}

/// How a server process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Signal number, if the process was killed by a signal.
    pub signal: Option<i32>,
}

impl ExitReport {
    /// Human readable description, e.g. `exited with code 0`.
    pub fn describe(&self) -> String {
        match (self.code, self.signal) {
            (Some(code), _) => format!("exited with code {code}"),
            (None, Some(signal)) => match signal_name(signal) {
                Some(name) => format!("was killed by signal {signal} ({name})"),
                None => format!("was killed by signal {signal}"),
            },
            (None, None) => "exited for an unknown reason".to_string(),
        }
    }
}

impl From<ExitStatus> for ExitReport {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

fn signal_name(signal: i32) -> Option<&'static str> {
    Some(match signal {
        1 => "SIGHUP",
        2 => "SIGINT",
        3 => "SIGQUIT",
        6 => "SIGABRT",
        9 => "SIGKILL",
        11 => "SIGSEGV",
        13 => "SIGPIPE",
        15 => "SIGTERM",
        _ => return None,
    })
}

/// The operating system process behind a session.
pub trait ServerProcess {
    /// Process id, sent to the server in `initialize`.
    fn pid(&self) -> u32;

    /// Exit report if the process has exited, without blocking.
    fn try_wait(&mut self) -> io::Result<Option<ExitReport>>;

    /// Kill the process and wait for it.
    fn kill(&mut self) -> io::Result<ExitReport>;
}

impl ServerProcess for Child {
    fn pid(&self) -> u32 {
        self.id()
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitReport>> {
        Ok(Child::try_wait(self)?.map(ExitReport::from))
    }

    fn kill(&mut self) -> io::Result<ExitReport> {
        Child::kill(self)?;
        Ok(Child::wait(self)?.into())
    }
}

/// What the UI should do after a poll.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Completions for a request made with [`LangServer::request_completions`].
    Completions {
        /// Tab the request came from.
        tab: TabId,
        /// Request id that was returned when requesting.
        request_id: u64,
        /// Sorted completions.
        completions: Vec<Completion>,
    },
    /// The full set of diagnostics for a tab.
    Diagnostics {
        /// Tab the diagnostics belong to.
        tab: TabId,
        /// Diagnostics ordered for drawing (most severe last).
        diagnostics: Vec<EditorDiagnostic>,
    },
    /// `window/showMessage`: something the user should see.
    Message {
        /// Severity.
        typ: LspMessageType,
        /// Message text.
        message: String,
    },
}

#[derive(Debug, Clone)]
struct OpenDocument {
    uri: String,
    language_id: String,
}

#[derive(Debug, Clone)]
struct PendingCompletion {
    tab: TabId,
    cursor: Position,
    line_before_cursor: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Liveness {
    Running,
    /// The server's output closed; the process has this many more ticks to exit.
    Closing { ticks_left: u32 },
    Finished,
}

/// A language server process and its LSP session.
pub struct LangServer {
    id: LangServerId,
    process: Box<dyn ServerProcess>,
    io: Box<dyn LangServerIo>,
    client: Client,
    documents: HashMap<TabId, OpenDocument>,
    pending_completions: HashMap<u64, PendingCompletion>,
    next_version: i64,
    detached: bool,
    shutting_down_cleanly: bool,
    liveness: Liveness,
    grace_ticks: u32,
}

impl std::fmt::Debug for LangServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LangServer")
            .field("pid", &self.process.pid())
            .field("id", &self.id)
            .field("tabs", &self.documents.len())
            .field("state", &self.client.state())
            .finish()
    }
}

impl LangServer {
    /// Spawn the server described by `id`.
    ///
    /// Without a port the server speaks LSP on stdin/stdout and its stderr is logged. With a port
    /// both output streams are logged and the session connects to `localhost:port`.
    pub fn start(id: LangServerId, grace_ticks: u32) -> Result<Self> {
        let argv = split_command(&id.command).map_err(|message| LspError::InvalidCommand {
            command: id.command.clone(),
            message,
        })?;
        let Some((program, args)) = argv.split_first() else {
            return Err(LspError::InvalidCommand {
                command: id.command.clone(),
                message: "command is empty".to_string(),
            });
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if id.port.is_none() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        let mut child = command.spawn().map_err(|source| LspError::Spawn {
            command: id.command.clone(),
            source,
        })?;

        let pid = child.id();
        info!(
            pid,
            "langserver process started with command '{}', project root '{}'",
            id.command,
            id.project_root.display()
        );

        let io = match attach_io(&mut child, id.port) {
            Ok(io) => io,
            Err(err) => {
                let _ = ServerProcess::kill(&mut child);
                return Err(err);
            }
        };
        Self::with_io(id, Box::new(child), io, grace_ticks)
    }

    /// Build a session over an existing process and transport.
    pub fn with_io(
        id: LangServerId,
        process: Box<dyn ServerProcess>,
        io: Box<dyn LangServerIo>,
        grace_ticks: u32,
    ) -> Result<Self> {
        let client = Client::new(&id.project_root, Some(process.pid()))?;
        Ok(Self {
            id,
            process,
            io,
            client,
            documents: HashMap::new(),
            pending_completions: HashMap::new(),
            next_version: 0,
            detached: false,
            shutting_down_cleanly: false,
            liveness: Liveness::Running,
            grace_ticks,
        })
    }

    /// Session id.
    pub fn id(&self) -> &LangServerId {
        &self.id
    }

    /// Server process id.
    pub fn pid(&self) -> u32 {
        self.process.pid()
    }

    /// Client lifecycle state.
    pub fn client_state(&self) -> ClientState {
        self.client.state()
    }

    /// Whether the session stopped serving tabs. A detached session only finishes its teardown.
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Whether the server process has ended.
    pub fn is_finished(&self) -> bool {
        self.liveness == Liveness::Finished
    }

    /// Whether `tab` is open in this session.
    pub fn has_tab(&self, tab: TabId) -> bool {
        self.documents.contains_key(&tab)
    }

    /// Number of open tabs.
    pub fn tab_count(&self) -> usize {
        self.documents.len()
    }

    /// Number of completion requests waiting for a response.
    pub fn pending_completion_count(&self) -> usize {
        self.pending_completions.len()
    }

    /// Start serving `tab`. The document is opened right away if the server is initialized,
    /// otherwise once it is (see [`LangServer::poll`]).
    pub fn open_tab(&mut self, tab: TabId, path: &Path, language_id: &str, text: &str) {
        debug!(pid = self.pid(), tab = tab.get(), "tab opened");
        self.documents.insert(
            tab,
            OpenDocument {
                uri: path_to_file_uri(path),
                language_id: language_id.to_string(),
            },
        );
        if self.client.state() == ClientState::Normal {
            self.send_did_open(tab, text);
        }
    }

    /// Stop serving `tab`. When the last tab goes and `may_shutdown` is set, the server is shut
    /// down cleanly, or killed if it never finished initializing.
    pub fn forget_tab(&mut self, tab: TabId, may_shutdown: bool) {
        let pid = self.pid();
        if self.detached {
            debug!(
                pid,
                "a tab was closed, but langserver process is no longer running (maybe it crashed?)"
            );
            return;
        }

        debug!(pid, tab = tab.get(), "tab closed");
        self.documents.remove(&tab);

        if may_shutdown && self.documents.is_empty() {
            info!(pid, "no more open tabs, shutting down");
            self.shutting_down_cleanly = true;
            self.detached = true;

            if self.client.state() == ClientState::Normal {
                if let Err(err) = self.client.shutdown() {
                    error!(pid, "cannot shut down langserver: {err}");
                }
                self.flush_outgoing();
            } else {
                // It was never fully started.
                match self.process.kill() {
                    Ok(report) => debug!(pid, "langserver process {}", report.describe()),
                    Err(err) => error!(pid, "killing langserver process failed: {err}"),
                }
            }
        }
    }

    /// Ask for completions at `cursor` in `tab`. Returns the request id, or `None` if the server
    /// is not ready.
    ///
    /// `line_before_cursor` is the text of the cursor's line up to the cursor.
    pub fn request_completions(
        &mut self,
        tab: TabId,
        cursor: Position,
        line_before_cursor: &str,
    ) -> Option<u64> {
        let pid = self.pid();
        if self.client.state() != ClientState::Normal {
            warn!(
                pid,
                "autocompletions requested but langserver state == {:?}",
                self.client.state()
            );
            return None;
        }
        let uri = self.documents.get(&tab)?.uri.clone();

        match self.client.completions(&uri, LspPosition::from_editor(cursor)) {
            Ok(request_id) => {
                self.pending_completions.insert(
                    request_id,
                    PendingCompletion {
                        tab,
                        cursor,
                        line_before_cursor: line_before_cursor.to_string(),
                    },
                );
                self.flush_outgoing();
                Some(request_id)
            }
            Err(err) => {
                error!(pid, "completion request failed: {err}");
                None
            }
        }
    }

    /// Forward a buffer change of `tab` as an incremental `didChange`.
    ///
    /// Nothing is sent before the server is initialized; it gets the full text in `didOpen`.
    pub fn send_change(&mut self, tab: TabId, change: &BufferChange) {
        let pid = self.pid();
        if self.client.state() != ClientState::Normal {
            debug!(
                pid,
                "not sending change events because langserver state == {:?}",
                self.client.state()
            );
            return;
        }
        let Some(uri) = self.documents.get(&tab).map(|doc| doc.uri.clone()) else {
            return;
        };

        let changes: Vec<LspContentChange> = change
            .edits
            .iter()
            .map(|edit| LspContentChange {
                range: LspRange::from_editor(edit.start, edit.end),
                text: edit.new_text.clone(),
            })
            .collect();
        let version = self.bump_version();
        if let Err(err) = self.client.did_change(&uri, version, &changes) {
            error!(pid, "sending changes failed: {err}");
        }
    }

    /// Mark the session as no longer serving tabs, without shutting it down.
    pub fn detach(&mut self) {
        if !self.detached {
            debug!(pid = self.pid(), "getting removed from langservers");
            self.detached = true;
        }
    }

    /// Drive the session one tick.
    ///
    /// `text_of` returns the current text of a tab; it is needed when the server finishes
    /// initializing and every open tab is sent in `didOpen`.
    pub fn poll<F>(&mut self, mut text_of: F) -> Vec<SessionEvent>
    where
        F: FnMut(TabId) -> Option<String>,
    {
        let mut events = Vec::new();
        match self.liveness {
            Liveness::Finished => return events,
            Liveness::Closing { .. } => {
                self.ensure_process_quits_soon();
                return events;
            }
            Liveness::Running => {}
        }

        self.flush_outgoing();
        match self.io.read() {
            ReadResult::NoData => {}
            ReadResult::Closed => {
                // Communicating with the process is impossible now.
                self.detach();
                self.liveness = Liveness::Closing {
                    ticks_left: self.grace_ticks,
                };
                self.pending_completions.clear();
                self.ensure_process_quits_soon();
            }
            ReadResult::Data(bytes) => {
                debug!(pid = self.pid(), "got {} bytes of data", bytes.len());
                for event in self.client.recv(&bytes) {
                    self.handle_event(event, &mut text_of, &mut events);
                }
                self.flush_outgoing();
            }
        }
        events
    }

    fn handle_event<F>(
        &mut self,
        event: ClientEvent,
        text_of: &mut F,
        out: &mut Vec<SessionEvent>,
    ) where
        F: FnMut(TabId) -> Option<String>,
    {
        let pid = self.pid();
        debug!(pid, "handling event: {event:?}");

        match event {
            ClientEvent::Shutdown => {
                debug!(pid, "langserver sent Shutdown event");
                if let Err(err) = self.client.exit() {
                    error!(pid, "cannot send exit: {err}");
                }
                self.detach();
                return;
            }
            ClientEvent::LogMessage { typ, message } => {
                log_server_message(pid, typ, &message);
                return;
            }
            _ => {}
        }

        // The rest need the session to be serving tabs.
        if self.detached {
            warn!(pid, "ignoring event because langserver is shutting down: {event:?}");
            return;
        }

        match event {
            ClientEvent::Initialized { capabilities } => {
                info!(pid, "langserver initialized, capabilities:\n{capabilities:#}");
                let tabs: Vec<TabId> = self.documents.keys().copied().collect();
                for tab in tabs {
                    match text_of(tab) {
                        Some(text) => self.send_did_open(tab, &text),
                        None => warn!(pid, tab = tab.get(), "no text for open tab"),
                    }
                }
            }
            ClientEvent::Completion { id, items } => {
                let Some(request) = self.pending_completions.remove(&id) else {
                    debug!(pid, request_id = id, "completion response without a request");
                    return;
                };
                if !self.documents.contains_key(&request.tab) {
                    debug!(pid, request_id = id, "completion sent to closed tab");
                    return;
                }
                out.push(SessionEvent::Completions {
                    tab: request.tab,
                    request_id: id,
                    completions: completions_from_items(
                        items,
                        request.cursor,
                        &request.line_before_cursor,
                    ),
                });
            }
            ClientEvent::PublishDiagnostics { uri, diagnostics } => {
                let Some(tab) = self
                    .documents
                    .iter()
                    .find(|(_, doc)| doc.uri == uri)
                    .map(|(&tab, _)| tab)
                else {
                    debug!(pid, "diagnostics sent to closed tab {uri}");
                    return;
                };
                out.push(SessionEvent::Diagnostics {
                    tab,
                    diagnostics: editor_diagnostics(&diagnostics),
                });
            }
            ClientEvent::ShowMessage { typ, message } => {
                log_server_message(pid, typ, &message);
                out.push(SessionEvent::Message { typ, message });
            }
            ClientEvent::ResponseError { id, .. } => {
                self.pending_completions.remove(&id);
            }
            ClientEvent::Shutdown | ClientEvent::LogMessage { .. } => {}
        }
    }

    fn send_did_open(&mut self, tab: TabId, text: &str) {
        let Some(doc) = self.documents.get(&tab).cloned() else {
            return;
        };
        let version = self.bump_version();
        if let Err(err) = self
            .client
            .did_open(&doc.uri, &doc.language_id, version, text)
        {
            error!(pid = self.pid(), "sending didOpen failed: {err}");
        }
    }

    fn bump_version(&mut self) -> i64 {
        let version = self.next_version;
        self.next_version += 1;
        version
    }

    fn flush_outgoing(&mut self) {
        let bytes = self.client.send();
        if bytes.is_empty() {
            return;
        }
        if let Err(err) = self.io.write(&bytes) {
            warn!(pid = self.pid(), "writing to langserver failed: {err}");
        }
    }

    fn ensure_process_quits_soon(&mut self) {
        let pid = self.pid();
        let Liveness::Closing { ticks_left } = self.liveness else {
            return;
        };

        let report = match self.process.try_wait() {
            Ok(Some(report)) => report,
            Ok(None) if ticks_left > 0 => {
                debug!(pid, "langserver process should stop soon");
                self.liveness = Liveness::Closing {
                    ticks_left: ticks_left - 1,
                };
                return;
            }
            Ok(None) => {
                let what_closed = if self.id.port.is_none() {
                    "stdout"
                } else {
                    "socket connection"
                };
                warn!(
                    pid,
                    "killing langserver process {pid} because {what_closed} has closed for some reason"
                );
                match self.process.kill() {
                    Ok(report) => report,
                    Err(err) => {
                        error!(pid, "killing langserver process failed: {err}");
                        self.liveness = Liveness::Finished;
                        return;
                    }
                }
            }
            Err(err) => {
                error!(pid, "cannot check langserver process status: {err}");
                self.liveness = Liveness::Finished;
                return;
            }
        };

        if self.shutting_down_cleanly {
            info!(pid, "langserver process terminated, {}", report.describe());
        } else {
            error!(
                pid,
                "langserver process terminated unexpectedly, {}",
                report.describe()
            );
        }
        self.liveness = Liveness::Finished;
    }
}

fn attach_io(child: &mut Child, port: Option<u16>) -> Result<Box<dyn LangServerIo>> {
    let pid = child.id();
    let missing =
        |what: &str| LspError::Io(io::Error::other(format!("langserver {what} is not piped")));

    if let Some(stderr) = child.stderr.take() {
        spawn_stream_logger(stderr, pid);
    }
    let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;

    match port {
        None => {
            let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
            Ok(Box::new(SubprocessStdio::new(stdin, stdout)))
        }
        Some(port) => {
            // Most servers log to stderr, but watch stdout too.
            spawn_stream_logger(stdout, pid);
            Ok(Box::new(LocalhostSocketIo::connect(port)))
        }
    }
}

fn log_server_message(pid: u32, typ: LspMessageType, message: &str) {
    match typ {
        LspMessageType::Error => error!(pid, "message from langserver: {message}"),
        LspMessageType::Warning => warn!(pid, "message from langserver: {message}"),
        LspMessageType::Info => info!(pid, "message from langserver: {message}"),
        LspMessageType::Log => debug!(pid, "message from langserver: {message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_report_describe() {
        let exited = ExitReport {
            code: Some(0),
            signal: None,
        };
        assert_eq!(exited.describe(), "exited with code 0");

        let killed = ExitReport {
            code: None,
            signal: Some(9),
        };
        assert_eq!(killed.describe(), "was killed by signal 9 (SIGKILL)");

        let odd = ExitReport {
            code: None,
            signal: Some(40),
        };
        assert_eq!(odd.describe(), "was killed by signal 40");
    }

    #[test]
    fn test_start_rejects_empty_command() {
        let id = LangServerId {
            command: "   ".to_string(),
            port: None,
            project_root: PathBuf::from("/tmp"),
        };
        assert!(matches!(
            LangServer::start(id, 10),
            Err(LspError::InvalidCommand { .. })
        ));
    }

    #[test]
    fn test_start_reports_missing_program() {
        let id = LangServerId {
            command: "quill-test-no-such-langserver --stdio".to_string(),
            port: None,
            project_root: PathBuf::from("/tmp"),
        };
        assert!(matches!(
            LangServer::start(id, 10),
            Err(LspError::Spawn { .. })
        ));
    }
}
