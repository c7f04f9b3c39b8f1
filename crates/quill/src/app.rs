//! Editor state and input handling.
//!
//! [`App`] is the application context: settings, filetypes, open tabs, the UI dispatch queue
//! and the language server registry all live here and are passed around explicitly. Buffers
//! report their changes through the queue; [`App::tick`] drains it once per loop iteration,
//! feeds the highlighters and language servers and then flushes pending highlighting.

use anyhow::Context;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use quill_core::settings::SETTINGS_FILE;
use quill_core::{
    Buffer, BufferChange, Filetype, Filetypes, LineEnding, Position, ProcessingEdit, Settings,
    TabId, TabManager, TagOwner, TagRange, UiQueue, load_text, save_text,
};
use quill_highlight::HighlightOrchestrator;
use quill_lsp::{
    Completion, EditorDiagnostic, LangServerRegistry, LspMessageType, SessionEvent,
    diagnostic_tags, messages_at,
};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Tag drawn for the selected text.
pub const SELECTION_TAG: &str = "sel";

/// Everything background work posts to the UI thread.
#[derive(Debug)]
pub enum UiMessage {
    /// A buffer changed; highlighters and language servers need to hear about it.
    BufferChanged { tab: TabId, change: BufferChange },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Open,
    SaveAs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirm {
    CloseTab(TabId),
    Quit,
}

/// Completions received from a language server, filtered as the user keeps typing.
#[derive(Debug, Clone)]
pub struct CompletionPopup {
    /// Cursor position the completions were requested at.
    pub anchor: Position,
    pub items: Vec<Completion>,
    pub selected: usize,
}

impl CompletionPopup {
    pub fn new(items: Vec<Completion>) -> Option<Self> {
        let anchor = items.first()?.replace_end;
        Some(Self {
            anchor,
            items,
            selected: 0,
        })
    }

    /// Text typed since the request, or `None` if the cursor left the completed word.
    pub fn typed_since_request(&self, buffer: &Buffer, cursor: Position) -> Option<String> {
        if cursor.line != self.anchor.line || cursor.column < self.anchor.column {
            return None;
        }
        buffer.text_range(self.anchor, cursor).ok()
    }

    /// Completions still matching `typed`.
    pub fn visible(&self, typed: &str) -> Vec<&Completion> {
        self.items
            .iter()
            .filter(|item| item.filter_text.starts_with(typed))
            .collect()
    }
}

/// One open file.
pub struct Tab {
    pub buffer: Buffer,
    pub path: Option<PathBuf>,
    pub line_ending: LineEnding,
    pub filetype: Filetype,
    pub highlighter: HighlightOrchestrator,
    pub cursor: Position,
    /// Other end of the selection, if something is selected.
    pub anchor: Option<Position>,
    /// First visible line.
    pub scroll_top: usize,
    /// First visible column.
    pub scroll_left: usize,
    pub diagnostics: Vec<EditorDiagnostic>,
    pub completion: Option<CompletionPopup>,
    pending_completion: Option<u64>,
}

impl Tab {
    pub fn new(
        buffer: Buffer,
        path: Option<PathBuf>,
        line_ending: LineEnding,
        filetype: Filetype,
        highlighter: HighlightOrchestrator,
    ) -> Self {
        Self {
            buffer,
            path,
            line_ending,
            filetype,
            highlighter,
            cursor: Position::start(),
            anchor: None,
            scroll_top: 1,
            scroll_left: 0,
            diagnostics: Vec::new(),
            completion: None,
            pending_completion: None,
        }
    }

    pub fn title(&self) -> String {
        let name = self
            .path
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "New File".to_string());
        if self.buffer.is_modified() {
            format!("*{name}")
        } else {
            name
        }
    }

    /// The selected range in document order, if it is not empty.
    pub fn selection(&self) -> Option<(Position, Position)> {
        let anchor = self.anchor?;
        match anchor.cmp(&self.cursor) {
            std::cmp::Ordering::Less => Some((anchor, self.cursor)),
            std::cmp::Ordering::Greater => Some((self.cursor, anchor)),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn selected_text(&self) -> Option<String> {
        let (start, end) = self.selection()?;
        self.buffer.text_range(start, end).ok()
    }

    fn advance(&self, start: Position, text: &str) -> quill_core::Result<Position> {
        let offset = self.buffer.offset_of(start)? + text.chars().count();
        Ok(self.buffer.position_of(offset))
    }

    /// Insert at the cursor, replacing the selection.
    pub fn insert_text(&mut self, text: &str) -> quill_core::Result<()> {
        let text = LineEnding::normalize(text);
        let start = match self.selection() {
            Some((start, end)) => {
                self.buffer.replace(start, end, &text)?;
                start
            }
            None => {
                self.buffer.insert(self.cursor, &text)?;
                self.cursor
            }
        };
        self.cursor = self.advance(start, &text)?;
        self.set_anchor(None);
        Ok(())
    }

    /// Newline keeping the indentation of the current line.
    pub fn newline(&mut self) -> quill_core::Result<()> {
        let line = self.buffer.line_text(self.cursor.line).unwrap_or_default();
        let indent: String = line
            .chars()
            .take(self.cursor.column)
            .take_while(|c| *c == ' ' || *c == '\t')
            .collect();
        self.insert_text(&format!("\n{indent}"))
    }

    /// Indent to the next indent stop with the filetype's indent style.
    pub fn indent(&mut self) -> quill_core::Result<()> {
        if !self.filetype.tabs2spaces {
            return self.insert_text("\t");
        }
        let size = self.filetype.indent_size.max(1);
        let spaces = size - self.cursor.column % size;
        self.insert_text(&" ".repeat(spaces))
    }

    pub fn delete_selection(&mut self) -> quill_core::Result<bool> {
        let Some((start, end)) = self.selection() else {
            return Ok(false);
        };
        self.buffer.delete(start, end)?;
        self.cursor = start;
        self.set_anchor(None);
        Ok(true)
    }

    pub fn backspace(&mut self) -> quill_core::Result<()> {
        if self.delete_selection()? {
            return Ok(());
        }
        let start = self.buffer.previous_grapheme_start(self.cursor);
        if start != self.cursor {
            self.buffer.delete(start, self.cursor)?;
            self.cursor = start;
        }
        Ok(())
    }

    pub fn delete_forward(&mut self) -> quill_core::Result<()> {
        if self.delete_selection()? {
            return Ok(());
        }
        let end = self.advance(self.cursor, " ")?;
        if end != self.cursor {
            self.buffer.delete(self.cursor, end)?;
        }
        Ok(())
    }

    /// Move the cursor, extending the selection when `selecting`.
    pub fn move_to(&mut self, pos: Position, selecting: bool) {
        let anchor = match (selecting, self.anchor) {
            (true, None) => Some(self.cursor),
            (true, anchor) => anchor,
            (false, _) => None,
        };
        self.cursor = self.buffer.clamp(pos);
        self.set_anchor(anchor);
    }

    pub fn move_left(&mut self, selecting: bool) {
        let pos = self.buffer.previous_grapheme_start(self.cursor);
        self.move_to(pos, selecting);
    }

    pub fn move_right(&mut self, selecting: bool) {
        let pos = match self.advance(self.cursor, " ") {
            Ok(pos) => pos,
            Err(_) => self.buffer.clamp(self.cursor),
        };
        self.move_to(pos, selecting);
    }

    pub fn move_vertically(&mut self, lines: isize, selecting: bool) {
        let line = self
            .cursor
            .line
            .saturating_add_signed(lines)
            .clamp(1, self.buffer.line_count());
        self.move_to(Position::new(line, self.cursor.column), selecting);
    }

    pub fn move_home(&mut self, selecting: bool) {
        self.move_to(Position::new(self.cursor.line, 0), selecting);
    }

    pub fn move_end(&mut self, selecting: bool) {
        let len = self.buffer.line_len(self.cursor.line).unwrap_or(0);
        self.move_to(Position::new(self.cursor.line, len), selecting);
    }

    pub fn undo(&mut self) -> bool {
        let undone = self.buffer.undo();
        self.after_history_step();
        undone
    }

    pub fn redo(&mut self) -> bool {
        let redone = self.buffer.redo();
        self.after_history_step();
        redone
    }

    fn after_history_step(&mut self) {
        self.cursor = self.buffer.clamp(self.cursor);
        self.set_anchor(None);
    }

    /// Replace the word being completed with `item`.
    pub fn accept_completion(&mut self, item: &Completion) -> quill_core::Result<()> {
        let start = self.buffer.clamp(item.replace_start);
        self.buffer.replace(start, self.cursor, &item.replace_text)?;
        self.cursor = self.advance(start, &item.replace_text)?;
        self.set_anchor(None);
        self.completion = None;
        Ok(())
    }

    /// Close the completion popup if the cursor left the word or nothing matches anymore.
    pub fn refresh_completion(&mut self) {
        let Some(popup) = &mut self.completion else {
            return;
        };
        let visible = popup
            .typed_since_request(&self.buffer, self.cursor)
            .map(|typed| popup.visible(&typed).len())
            .unwrap_or(0);
        if visible == 0 {
            self.completion = None;
        } else {
            popup.selected = popup.selected.min(visible - 1);
        }
    }

    /// The completion the popup currently points at.
    pub fn selected_completion(&self) -> Option<Completion> {
        let popup = self.completion.as_ref()?;
        let typed = popup.typed_since_request(&self.buffer, self.cursor)?;
        popup.visible(&typed).get(popup.selected).map(|c| (*c).clone())
    }

    fn set_anchor(&mut self, anchor: Option<Position>) {
        self.anchor = anchor.map(|pos| self.buffer.clamp(pos));
        let ranges = self
            .selection()
            .and_then(|(start, end)| {
                let start = self.buffer.offset_of(start).ok()?;
                let end = self.buffer.offset_of(end).ok()?;
                Some(vec![TagRange::new(
                    start,
                    end,
                    TagOwner::SELECTION,
                    SELECTION_TAG,
                )])
            })
            .unwrap_or_default();
        self.buffer
            .apply_processing_edits([ProcessingEdit::ReplaceOwnerTags {
                owner: TagOwner::SELECTION,
                ranges,
            }]);
    }

    /// Keep the cursor inside a `height` x `width` view.
    pub fn scroll_to_cursor(&mut self, height: usize, width: usize) {
        if height > 0 {
            if self.cursor.line < self.scroll_top {
                self.scroll_top = self.cursor.line;
            } else if self.cursor.line >= self.scroll_top + height {
                self.scroll_top = self.cursor.line + 1 - height;
            }
        }
        if width > 0 {
            if self.cursor.column < self.scroll_left {
                self.scroll_left = self.cursor.column;
            } else if self.cursor.column >= self.scroll_left + width {
                self.scroll_left = self.cursor.column + 1 - width;
            }
        }
    }
}

/// The application context.
pub struct App {
    settings: Settings,
    settings_path: PathBuf,
    save_settings: bool,
    filetypes: Filetypes,
    pub tabs: TabManager<Tab>,
    ui_queue: UiQueue<UiMessage>,
    langservers: LangServerRegistry,
    poll_interval: Duration,
    next_poll: Instant,
    clipboard: String,
    pub status_message: String,
    pub mode: InputMode,
    pub input_buffer: String,
    pub confirm: Option<Confirm>,
    pub should_quit: bool,
    /// Text area size from the last draw: (lines, columns).
    pub viewport: (usize, usize),
}

impl App {
    pub fn new(config_dir: &Path, file: Option<PathBuf>) -> anyhow::Result<Self> {
        let settings_path = config_dir.join(SETTINGS_FILE);
        let (settings, save_settings) = match Settings::load(&settings_path) {
            Ok(settings) => (settings, true),
            Err(err) => {
                // Keep the broken file for the user to fix.
                error!("{err}; using default settings");
                (Settings::default(), false)
            }
        };

        let filetypes = Filetypes::load_or_create(config_dir).unwrap_or_else(|err| {
            error!("{err}; using the built-in filetypes");
            Filetypes::builtin()
        });
        let status_message = match filetypes.problems().len() {
            0 => String::new(),
            n => format!("{n} problem(s) in filetypes.toml, see the log file"),
        };

        let poll_interval = Duration::from_millis(settings.lsp_poll_interval_ms.max(1));
        let langservers = LangServerRegistry::new(settings.lsp_shutdown_grace_ticks);

        let mut app = Self {
            settings,
            settings_path,
            save_settings,
            filetypes,
            tabs: TabManager::new(),
            ui_queue: UiQueue::new(),
            langservers,
            poll_interval,
            next_poll: Instant::now(),
            clipboard: String::new(),
            status_message,
            mode: InputMode::Normal,
            input_buffer: String::new(),
            confirm: None,
            should_quit: false,
            viewport: (0, 0),
        };

        if let Err(err) = app.open_tab(file) {
            error!("{err:#}");
            app.status_message = format!("{err:#}");
            app.open_tab(None)?;
        }
        Ok(app)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn current_tab(&self) -> Option<&Tab> {
        self.tabs.current()
    }

    /// State of the language server serving the current tab, for the status line.
    pub fn langserver_status(&self) -> Option<String> {
        let id = self.tabs.current_id()?;
        let session = self.langservers.session_for(id)?;
        Some(format!("{:?}", session.client_state()))
    }

    /// Diagnostic messages under the cursor of the current tab.
    pub fn diagnostics_at_cursor(&self) -> Vec<&str> {
        match self.tabs.current() {
            Some(tab) => messages_at(&tab.diagnostics, tab.cursor),
            None => Vec::new(),
        }
    }

    fn filetype_for(&self, path: Option<&Path>) -> Filetype {
        match path {
            Some(path) => self.filetypes.guess(path).clone(),
            None => self.filetypes.default_filetype().clone(),
        }
    }

    fn highlighter_for(&self, filetype: &Filetype) -> anyhow::Result<HighlightOrchestrator> {
        let highlighter = HighlightOrchestrator::for_kind(filetype.highlighter)
            .with_context(|| format!("building the {} highlighter", filetype.name))?;
        Ok(highlighter.with_multiline_on_quote(self.settings.highlight_multiline_on_quote))
    }

    /// Open `path` (or an empty buffer) in a new tab and select it.
    pub fn open_tab(&mut self, path: Option<PathBuf>) -> anyhow::Result<TabId> {
        let (text, line_ending) = match &path {
            Some(path) => {
                let loaded = load_text(path)?;
                (loaded.text, loaded.line_ending)
            }
            None => (String::new(), LineEnding::default()),
        };
        let filetype = self.filetype_for(path.as_deref());
        let highlighter = self.highlighter_for(&filetype)?;
        info!(
            path = ?path,
            filetype = %filetype.name,
            "opening tab"
        );

        let id = self.tabs.add(Tab::new(
            Buffer::new(&text),
            path,
            line_ending,
            filetype,
            highlighter,
        ));
        let sender = self.ui_queue.sender();
        if let Some(tab) = self.tabs.get_mut(id) {
            tab.buffer.subscribe(move |change| {
                sender.post(UiMessage::BufferChanged {
                    tab: id,
                    change: change.clone(),
                });
            });
            tab.highlighter.request_full();
            tab.highlighter.flush(&mut tab.buffer);
            self.langservers.switch(
                id,
                tab.path.as_deref(),
                tab.filetype.langserver.as_ref(),
                &text,
                false,
            );
        }
        Ok(id)
    }

    pub fn close_tab(&mut self, id: TabId) {
        if self.tabs.close(id).is_some() {
            self.langservers.close_tab(id);
        }
        if self.tabs.is_empty() {
            self.should_quit = true;
        }
    }

    /// One event loop iteration's worth of background work.
    pub fn tick(&mut self) {
        self.process_ui_queue();
        if Instant::now() >= self.next_poll {
            self.poll_langservers();
            self.next_poll = Instant::now() + self.poll_interval;
        }
    }

    /// How long the event loop may block waiting for input.
    pub fn time_until_tick(&self) -> Duration {
        self.next_poll
            .saturating_duration_since(Instant::now())
            .min(self.poll_interval)
    }

    /// Route queued buffer changes, then run pending highlighting.
    pub fn process_ui_queue(&mut self) {
        for message in self.ui_queue.drain() {
            match message {
                UiMessage::BufferChanged { tab: id, change } => {
                    let Some(tab) = self.tabs.get_mut(id) else {
                        debug!("dropping change of a closed tab");
                        continue;
                    };
                    tab.highlighter.on_change(&change, &tab.buffer);
                    self.langservers.on_change(id, &change);
                }
            }
        }
        for (_, tab) in self.tabs.iter_mut() {
            tab.highlighter.flush(&mut tab.buffer);
        }
    }

    fn poll_langservers(&mut self) {
        let events = self
            .langservers
            .poll(|id| self.tabs.get(id).map(|tab| tab.buffer.text()));

        for event in events {
            match event {
                SessionEvent::Completions {
                    tab,
                    request_id,
                    completions,
                } => self.show_completions(tab, request_id, completions),
                SessionEvent::Diagnostics { tab, diagnostics } => {
                    if let Some(tab) = self.tabs.get_mut(tab) {
                        let edit = diagnostic_tags(&tab.buffer, &diagnostics);
                        tab.buffer.apply_processing_edits([edit]);
                        tab.diagnostics = diagnostics;
                    }
                }
                SessionEvent::Message { typ, message } => {
                    let label = match typ {
                        LspMessageType::Error => "error",
                        LspMessageType::Warning => "warning",
                        LspMessageType::Info | LspMessageType::Log => "info",
                    };
                    self.status_message = format!("langserver {label}: {message}");
                }
            }
        }
    }

    fn show_completions(&mut self, id: TabId, request_id: u64, completions: Vec<Completion>) {
        let Some(tab) = self.tabs.get_mut(id) else {
            return;
        };
        if tab.pending_completion != Some(request_id) {
            debug!(request_id, "ignoring completions of an older request");
            return;
        }
        tab.pending_completion = None;
        tab.completion = CompletionPopup::new(completions);
        tab.refresh_completion();
        if tab.completion.is_none() {
            self.status_message = "No completions".to_string();
        }
    }

    fn request_completions(&mut self) {
        // The server must see every change before the request.
        self.process_ui_queue();
        let Some(id) = self.tabs.current_id() else {
            return;
        };
        let Some(tab) = self.tabs.get_mut(id) else {
            return;
        };
        let line = tab.buffer.line_text(tab.cursor.line).unwrap_or_default();
        let before_cursor: String = line.chars().take(tab.cursor.column).collect();

        match self
            .langservers
            .request_completions(id, tab.cursor, &before_cursor)
        {
            Some(request_id) => {
                tab.pending_completion = Some(request_id);
                tab.completion = None;
            }
            None => self.status_message = "No langserver is ready for this file".to_string(),
        }
    }

    /// Shut down language servers and give them time to exit.
    pub fn shutdown(&mut self) {
        self.langservers.shutdown_all();
        // Enough polls for the grace period plus the shutdown handshake.
        let max_polls = self.settings.lsp_shutdown_grace_ticks as usize + 20;
        for _ in 0..max_polls {
            if self.langservers.is_idle() {
                break;
            }
            self.langservers.poll(|_| None);
            thread::sleep(self.poll_interval);
        }
        if !self.langservers.is_idle() {
            warn!("langservers still running at exit");
        }

        if self.save_settings
            && let Err(err) = self.settings.save(&self.settings_path)
        {
            error!("{err}");
        }
    }

    pub fn handle_paste(&mut self, text: &str) {
        if self.mode != InputMode::Normal {
            self.input_buffer.push_str(text);
            return;
        }
        self.edit_current(|tab| tab.insert_text(text));
    }

    pub fn handle_key_event(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if let Some(confirm) = self.confirm {
            self.handle_confirm_key(confirm, key);
            return;
        }
        if self.mode != InputMode::Normal {
            self.handle_prompt_key(key);
            return;
        }
        if self.handle_completion_key(key) {
            self.after_key();
            return;
        }

        self.status_message.clear();
        let selecting = key.modifiers.contains(KeyModifiers::SHIFT);
        let page = self.viewport.0.max(1) as isize;
        match (key.modifiers, key.code) {
            (KeyModifiers::CONTROL, KeyCode::Char('s')) => {
                self.save_current();
            }
            (mods, KeyCode::Char('s' | 'S'))
                if mods == (KeyModifiers::CONTROL | KeyModifiers::SHIFT) =>
            {
                self.start_prompt(InputMode::SaveAs);
            }
            (KeyModifiers::CONTROL, KeyCode::Char('o')) => self.start_prompt(InputMode::Open),
            (KeyModifiers::CONTROL, KeyCode::Char('t')) => {
                if let Err(err) = self.open_tab(None) {
                    self.status_message = format!("{err:#}");
                }
            }
            (KeyModifiers::CONTROL, KeyCode::Char('w')) => self.request_close_current(),
            (KeyModifiers::CONTROL, KeyCode::Char('x')) => self.request_quit(),
            (KeyModifiers::CONTROL, KeyCode::Char('z')) => {
                if !self.current_mut().is_some_and(Tab::undo) {
                    self.status_message = "Nothing to undo".to_string();
                }
            }
            (KeyModifiers::CONTROL, KeyCode::Char('y')) => {
                if !self.current_mut().is_some_and(Tab::redo) {
                    self.status_message = "Nothing to redo".to_string();
                }
            }
            (KeyModifiers::CONTROL, KeyCode::Char('c')) => self.copy(),
            (KeyModifiers::CONTROL, KeyCode::Char('k')) => {
                self.copy();
                self.edit_current(|tab| tab.delete_selection().map(|_| ()));
            }
            (KeyModifiers::CONTROL, KeyCode::Char('v')) => {
                let text = self.clipboard.clone();
                self.edit_current(|tab| tab.insert_text(&text));
            }
            (KeyModifiers::CONTROL, KeyCode::Char(' ' | 'n')) => self.request_completions(),
            (KeyModifiers::CONTROL, KeyCode::PageUp) | (KeyModifiers::ALT, KeyCode::Left) => {
                self.tabs.select_previous();
            }
            (KeyModifiers::CONTROL, KeyCode::PageDown) | (KeyModifiers::ALT, KeyCode::Right) => {
                self.tabs.select_next();
            }

            (_, KeyCode::Left) => self.with_current(|tab| tab.move_left(selecting)),
            (_, KeyCode::Right) => self.with_current(|tab| tab.move_right(selecting)),
            (_, KeyCode::Up) => self.with_current(|tab| tab.move_vertically(-1, selecting)),
            (_, KeyCode::Down) => self.with_current(|tab| tab.move_vertically(1, selecting)),
            (_, KeyCode::Home) => self.with_current(|tab| tab.move_home(selecting)),
            (_, KeyCode::End) => self.with_current(|tab| tab.move_end(selecting)),
            (_, KeyCode::PageUp) => self.with_current(|tab| tab.move_vertically(-page, selecting)),
            (_, KeyCode::PageDown) => self.with_current(|tab| tab.move_vertically(page, selecting)),

            (_, KeyCode::Backspace) => self.edit_current(Tab::backspace),
            (_, KeyCode::Delete) => self.edit_current(Tab::delete_forward),
            (_, KeyCode::Enter) => self.edit_current(Tab::newline),
            (_, KeyCode::Tab) => self.edit_current(Tab::indent),
            (mods, KeyCode::Char(c))
                if !mods.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
            {
                self.edit_current(|tab| tab.insert_text(c.encode_utf8(&mut [0; 4])));
            }
            _ => {}
        }
        self.after_key();
    }

    fn after_key(&mut self) {
        let (height, width) = self.viewport;
        if let Some(tab) = self.tabs.current_mut() {
            tab.refresh_completion();
            tab.scroll_to_cursor(height, width);
        }
    }

    /// Keys that belong to an open completion popup. Returns `true` if the key was used.
    fn handle_completion_key(&mut self, key: KeyEvent) -> bool {
        let Some(tab) = self.tabs.current_mut() else {
            return false;
        };
        let Some(popup) = &mut tab.completion else {
            return false;
        };
        match key.code {
            KeyCode::Up => {
                popup.selected = popup.selected.saturating_sub(1);
                true
            }
            KeyCode::Down => {
                popup.selected += 1;
                true
            }
            KeyCode::Esc => {
                tab.completion = None;
                true
            }
            KeyCode::Enter | KeyCode::Tab => {
                if let Some(item) = tab.selected_completion()
                    && let Err(err) = tab.accept_completion(&item)
                {
                    error!("applying completion failed: {err}");
                }
                tab.completion = None;
                true
            }
            _ => false,
        }
    }

    fn handle_confirm_key(&mut self, confirm: Confirm, key: KeyEvent) {
        match key.code {
            KeyCode::Char('y' | 'Y') => {
                self.confirm = None;
                match confirm {
                    Confirm::CloseTab(id) => {
                        self.tabs.select(id);
                        if self.save_current() {
                            self.close_tab(id);
                        }
                    }
                    Confirm::Quit => {
                        if self.save_all() {
                            self.should_quit = true;
                        }
                    }
                }
            }
            KeyCode::Char('n' | 'N') => {
                self.confirm = None;
                match confirm {
                    Confirm::CloseTab(id) => self.close_tab(id),
                    Confirm::Quit => self.should_quit = true,
                }
            }
            KeyCode::Esc => {
                self.confirm = None;
                self.status_message.clear();
            }
            _ => {}
        }
    }

    fn start_prompt(&mut self, mode: InputMode) {
        self.mode = mode;
        self.input_buffer = match (mode, self.tabs.current()) {
            (InputMode::SaveAs, Some(tab)) => tab
                .path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            _ => String::new(),
        };
    }

    fn handle_prompt_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.mode = InputMode::Normal;
                self.input_buffer.clear();
            }
            KeyCode::Backspace => {
                self.input_buffer.pop();
            }
            KeyCode::Enter => {
                let mode = std::mem::replace(&mut self.mode, InputMode::Normal);
                let input = std::mem::take(&mut self.input_buffer);
                if input.trim().is_empty() {
                    return;
                }
                let path = PathBuf::from(input.trim());
                match mode {
                    InputMode::Open => {
                        if let Err(err) = self.open_tab(Some(path)) {
                            error!("{err:#}");
                            self.status_message = format!("Opening failed: {err:#}");
                        }
                    }
                    InputMode::SaveAs => {
                        self.save_current_as(path);
                    }
                    InputMode::Normal => {}
                }
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.input_buffer.push(c);
            }
            _ => {}
        }
    }

    fn current_mut(&mut self) -> Option<&mut Tab> {
        self.tabs.current_mut()
    }

    fn with_current(&mut self, f: impl FnOnce(&mut Tab)) {
        if let Some(tab) = self.tabs.current_mut() {
            f(tab);
        }
    }

    fn edit_current(&mut self, f: impl FnOnce(&mut Tab) -> quill_core::Result<()>) {
        if let Some(tab) = self.tabs.current_mut()
            && let Err(err) = f(tab)
        {
            error!("edit failed: {err}");
            self.status_message = err.to_string();
        }
    }

    fn copy(&mut self) {
        if let Some(text) = self.tabs.current().and_then(Tab::selected_text) {
            self.clipboard = text;
        }
    }

    fn request_close_current(&mut self) {
        let Some(id) = self.tabs.current_id() else {
            return;
        };
        if self.tabs.get(id).is_some_and(|tab| tab.buffer.is_modified()) {
            self.confirm = Some(Confirm::CloseTab(id));
            self.status_message = "This file has unsaved changes. Save them? (y/n)".to_string();
        } else {
            self.close_tab(id);
        }
    }

    fn request_quit(&mut self) {
        if self.tabs.iter().any(|(_, tab)| tab.buffer.is_modified()) {
            self.confirm = Some(Confirm::Quit);
            self.status_message = "Some files have unsaved changes. Save them? (y/n)".to_string();
        } else {
            self.should_quit = true;
        }
    }

    /// Save the current tab. Untitled tabs open the "save as" prompt. Returns `true` if saved.
    fn save_current(&mut self) -> bool {
        let Some(tab) = self.tabs.current_mut() else {
            return false;
        };
        let Some(path) = tab.path.clone() else {
            self.start_prompt(InputMode::SaveAs);
            return false;
        };
        match save_text(&path, &tab.buffer.text(), tab.line_ending) {
            Ok(()) => {
                tab.buffer.mark_saved();
                self.status_message = format!("Saved {}", path.display());
                true
            }
            Err(err) => {
                error!("{err}");
                self.status_message = format!("Saving failed: {err}");
                false
            }
        }
    }

    fn save_all(&mut self) -> bool {
        let modified: Vec<TabId> = self
            .tabs
            .iter()
            .filter(|(_, tab)| tab.buffer.is_modified())
            .map(|(id, _)| id)
            .collect();
        for id in modified {
            self.tabs.select(id);
            if !self.save_current() {
                return false;
            }
        }
        true
    }

    /// Give the current tab a new path, then save it there.
    ///
    /// The filetype is guessed again, so the highlighter and language server may change.
    fn save_current_as(&mut self, path: PathBuf) {
        let filetype = self.filetype_for(Some(&path));
        let highlighter = match self.highlighter_for(&filetype) {
            Ok(highlighter) => highlighter,
            Err(err) => {
                self.status_message = format!("{err:#}");
                return;
            }
        };
        let Some(id) = self.tabs.current_id() else {
            return;
        };
        let Some(tab) = self.tabs.get_mut(id) else {
            return;
        };

        if tab.filetype.name != filetype.name {
            info!(from = %tab.filetype.name, to = %filetype.name, "filetype changed");
            tab.highlighter = highlighter;
            tab.highlighter.request_full();
        }
        tab.filetype = filetype;
        tab.path = Some(path);
        self.langservers.switch(
            id,
            tab.path.as_deref(),
            tab.filetype.langserver.as_ref(),
            &tab.buffer.text(),
            true,
        );
        self.save_current();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quill_core::HighlighterKind;

    fn tab(text: &str) -> Tab {
        Tab::new(
            Buffer::new(text),
            None,
            LineEnding::Lf,
            Filetypes::builtin().default_filetype().clone(),
            HighlightOrchestrator::for_kind(HighlighterKind::None).unwrap(),
        )
    }

    fn completion(label: &str, start: Position, end: Position, filter: &str) -> Completion {
        Completion {
            display_text: label.to_string(),
            replace_start: start,
            replace_end: end,
            replace_text: label.to_string(),
            filter_text: filter.to_string(),
            documentation: String::new(),
        }
    }

    #[test]
    fn test_typing_replaces_selection() {
        let mut tab = tab("hello world\n");
        tab.move_to(Position::new(1, 6), false);
        tab.move_end(true);
        assert_eq!(tab.selected_text().as_deref(), Some("world"));
        assert_eq!(tab.buffer.tag_names_at(Position::new(1, 7)), vec![SELECTION_TAG]);

        tab.insert_text("there").unwrap();
        assert_eq!(tab.buffer.text(), "hello there\n");
        assert_eq!(tab.cursor, Position::new(1, 11));
        assert_eq!(tab.selection(), None);
        assert!(tab.buffer.tag_names_at(Position::new(1, 7)).is_empty());
    }

    #[test]
    fn test_newline_keeps_indentation() {
        let mut tab = tab("    if x:\n");
        tab.move_end(false);
        tab.newline().unwrap();
        assert_eq!(tab.buffer.text(), "    if x:\n    \n");
        assert_eq!(tab.cursor, Position::new(2, 4));

        tab.indent().unwrap();
        assert_eq!(tab.cursor, Position::new(2, 8));
    }

    #[test]
    fn test_backspace_joins_lines() {
        let mut tab = tab("ab\ncd");
        tab.move_to(Position::new(2, 0), false);
        tab.backspace().unwrap();
        assert_eq!(tab.buffer.text(), "abcd");
        assert_eq!(tab.cursor, Position::new(1, 2));

        tab.delete_forward().unwrap();
        assert_eq!(tab.buffer.text(), "abd");
    }

    #[test]
    fn test_crlf_paste_is_normalized() {
        let mut tab = tab("");
        tab.insert_text("a\r\nb").unwrap();
        assert_eq!(tab.buffer.text(), "a\nb");
        assert_eq!(tab.cursor, Position::new(2, 1));
    }

    #[test]
    fn test_completion_popup_filters_and_accepts() {
        let mut tab = tab("pri\n");
        tab.move_end(false);
        let anchor = tab.cursor;
        let start = Position::new(1, 0);
        tab.completion = CompletionPopup::new(vec![
            completion("print", start, anchor, "nt"),
            completion("private", start, anchor, "vate"),
        ]);
        tab.refresh_completion();
        assert!(tab.completion.is_some());

        tab.insert_text("v").unwrap();
        tab.refresh_completion();
        let item = tab.selected_completion().unwrap();
        assert_eq!(item.display_text, "private");

        tab.accept_completion(&item).unwrap();
        assert_eq!(tab.buffer.text(), "private\n");
        assert_eq!(tab.cursor, Position::new(1, 7));
        assert!(tab.completion.is_none());
    }

    #[test]
    fn test_completion_popup_closes_when_nothing_matches() {
        let mut tab = tab("x\n");
        tab.move_end(false);
        let anchor = tab.cursor;
        tab.completion = CompletionPopup::new(vec![completion(
            "xyz",
            Position::new(1, 0),
            anchor,
            "yz",
        )]);
        tab.insert_text("q").unwrap();
        tab.refresh_completion();
        assert!(tab.completion.is_none());
    }

    #[test]
    fn test_scroll_follows_cursor() {
        let mut tab = tab(&"line\n".repeat(50));
        tab.move_to(Position::new(30, 0), false);
        tab.scroll_to_cursor(10, 80);
        assert_eq!(tab.scroll_top, 21);
        tab.move_to(Position::new(5, 0), false);
        tab.scroll_to_cursor(10, 80);
        assert_eq!(tab.scroll_top, 5);
    }

    #[test]
    fn test_app_opens_file_and_saves_as() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        std::fs::write(&file, "one\r\ntwo\r\n").unwrap();

        let mut app = App::new(dir.path(), Some(file.clone())).unwrap();
        assert_eq!(app.current_tab().unwrap().buffer.text(), "one\ntwo\n");
        assert!(dir.path().join("filetypes.toml").exists());

        app.handle_paste("zero ");
        app.tick();
        assert_eq!(app.current_tab().unwrap().title(), "*notes.txt");

        let copy = dir.path().join("copy.py");
        app.save_current_as(copy.clone());
        assert_eq!(std::fs::read_to_string(&copy).unwrap(), "zero one\r\ntwo\r\n");
        let tab = app.current_tab().unwrap();
        assert_eq!(tab.title(), "copy.py");
        assert_eq!(tab.filetype.name, "Python");

        app.shutdown();
        assert!(dir.path().join(SETTINGS_FILE).exists());
    }
}
