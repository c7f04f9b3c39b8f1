//! All running language servers, keyed by [`LangServerId`].
//!
//! The registry maps tabs to sessions. Sessions that detach (last tab closed, server output
//! closed, `shutdown` answered) move to a draining list where they are polled until their
//! process is gone. A later tab with the same id gets a fresh session.

use crate::error::Result;
use crate::session::{LangServer, LangServerId, SessionEvent};
use quill_core::{BufferChange, LangServerConfig, Position, TabId, find_project_root};
use std::collections::HashMap;
use std::path::Path;
use tracing::{error, info};

/// Starts the session for an id.
pub type Spawner = Box<dyn FnMut(&LangServerId) -> Result<LangServer>>;

/// Language server sessions shared between tabs.
pub struct LangServerRegistry {
    sessions: HashMap<LangServerId, LangServer>,
    draining: Vec<LangServer>,
    tab_sessions: HashMap<TabId, LangServerId>,
    spawner: Spawner,
}

impl std::fmt::Debug for LangServerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LangServerRegistry")
            .field("sessions", &self.sessions)
            .field("draining", &self.draining.len())
            .field("tab_sessions", &self.tab_sessions)
            .finish()
    }
}

impl LangServerRegistry {
    /// Registry that spawns real server processes.
    pub fn new(grace_ticks: u32) -> Self {
        Self::with_spawner(Box::new(move |id: &LangServerId| {
            LangServer::start(id.clone(), grace_ticks)
        }))
    }

    /// Registry with a custom way of starting sessions.
    pub fn with_spawner(spawner: Spawner) -> Self {
        Self {
            sessions: HashMap::new(),
            draining: Vec::new(),
            tab_sessions: HashMap::new(),
            spawner,
        }
    }

    /// The session serving `tab`.
    pub fn session_for(&self, tab: TabId) -> Option<&LangServer> {
        self.sessions.get(self.tab_sessions.get(&tab)?)
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of detached sessions still waiting for their process to end.
    pub fn draining_count(&self) -> usize {
        self.draining.len()
    }

    /// Whether nothing is running anymore.
    pub fn is_idle(&self) -> bool {
        self.sessions.is_empty() && self.draining.is_empty()
    }

    /// Move `tab` to the session it should use now, starting one if needed.
    ///
    /// Call this when a tab is opened and whenever its path or langserver configuration
    /// changes. With no path or no configuration the tab ends up without a session. A path
    /// change that keeps the same session closes and reopens the document.
    pub fn switch(
        &mut self,
        tab: TabId,
        path: Option<&Path>,
        config: Option<&LangServerConfig>,
        text: &str,
        path_changed: bool,
    ) {
        let old_id = self.tab_sessions.get(&tab).cloned();
        let new_id = match (path, config) {
            (Some(path), Some(config)) => self.ensure_session(config, path),
            _ => None,
        };

        if old_id == new_id {
            if path_changed
                && let (Some(id), Some(path), Some(config)) = (&new_id, path, config)
                && let Some(session) = self.sessions.get_mut(id)
            {
                info!(pid = session.pid(), "path changed, closing and reopening the tab");
                session.forget_tab(tab, false);
                session.open_tab(tab, path, &config.language_id, text);
            }
            return;
        }

        info!("switching langservers: {old_id:?} --> {new_id:?}");
        if let Some(old_id) = old_id {
            self.tab_sessions.remove(&tab);
            if let Some(session) = self.sessions.get_mut(&old_id) {
                session.forget_tab(tab, true);
            }
        }
        if let (Some(new_id), Some(path), Some(config)) = (new_id, path, config)
            && let Some(session) = self.sessions.get_mut(&new_id)
        {
            session.open_tab(tab, path, &config.language_id, text);
            self.tab_sessions.insert(tab, new_id);
        }
        self.collect_detached();
    }

    /// The tab was closed.
    pub fn close_tab(&mut self, tab: TabId) {
        if let Some(id) = self.tab_sessions.remove(&tab)
            && let Some(session) = self.sessions.get_mut(&id)
        {
            session.forget_tab(tab, true);
        }
        self.collect_detached();
    }

    /// Forward a buffer change of `tab` to its session.
    pub fn on_change(&mut self, tab: TabId, change: &BufferChange) {
        if let Some(session) = self.session_mut(tab) {
            session.send_change(tab, change);
        }
    }

    /// Ask the session of `tab` for completions. See [`LangServer::request_completions`].
    pub fn request_completions(
        &mut self,
        tab: TabId,
        cursor: Position,
        line_before_cursor: &str,
    ) -> Option<u64> {
        self.session_mut(tab)?
            .request_completions(tab, cursor, line_before_cursor)
    }

    /// Poll every session once.
    pub fn poll<F>(&mut self, mut text_of: F) -> Vec<SessionEvent>
    where
        F: FnMut(TabId) -> Option<String>,
    {
        let mut events = Vec::new();
        for session in self.sessions.values_mut() {
            events.extend(session.poll(&mut text_of));
        }
        for session in &mut self.draining {
            session.poll(|_| None);
        }

        self.collect_detached();
        self.draining.retain(|session| !session.is_finished());
        events
    }

    /// Shut down every session by forgetting all tabs.
    pub fn shutdown_all(&mut self) {
        let tabs: Vec<TabId> = self.tab_sessions.keys().copied().collect();
        for tab in tabs {
            self.close_tab(tab);
        }
    }

    fn session_mut(&mut self, tab: TabId) -> Option<&mut LangServer> {
        let id = self.tab_sessions.get(&tab)?;
        self.sessions.get_mut(id)
    }

    /// Id of the live session for `config` at `path`, starting it if needed.
    fn ensure_session(&mut self, config: &LangServerConfig, path: &Path) -> Option<LangServerId> {
        let id = LangServerId::new(config, find_project_root(path));
        if !self.sessions.contains_key(&id) {
            match (self.spawner)(&id) {
                Ok(session) => {
                    self.sessions.insert(id.clone(), session);
                }
                Err(err) => {
                    error!("failed to start langserver with command {:?}: {err}", config.command);
                    return None;
                }
            }
        }
        Some(id)
    }

    fn collect_detached(&mut self) {
        let detached: Vec<LangServerId> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.is_detached())
            .map(|(id, _)| id.clone())
            .collect();

        for id in detached {
            if let Some(session) = self.sessions.remove(&id) {
                self.tab_sessions.retain(|_, tab_id| *tab_id != id);
                self.draining.push(session);
            }
        }
    }
}
