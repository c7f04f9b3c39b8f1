//! Quill, a small terminal text editor.
//!
//! # Usage
//!
//! ```bash
//! quill [FILE]
//! ```
//!
//! Settings and filetype definitions live in the config directory (`$XDG_CONFIG_HOME/quill` or
//! `~/.config/quill`); `filetypes.toml` is created there on the first start. Logs go to
//! `quill.log` in the same directory, filtered with `QUILL_LOG` (e.g. `QUILL_LOG=debug`).
//!
//! # Keys
//!
//! - `Ctrl+S` save, `Ctrl+Shift+S` save as, `Ctrl+O` open, `Ctrl+T` new tab, `Ctrl+W` close tab
//! - `Ctrl+PageUp`/`Ctrl+PageDown` (or `Alt+Left`/`Alt+Right`) switch tabs
//! - `Ctrl+Z`/`Ctrl+Y` undo/redo, `Ctrl+C`/`Ctrl+K`/`Ctrl+V` copy/cut/paste
//! - `Ctrl+Space` (or `Ctrl+N`) asks the language server for completions
//! - `Ctrl+X` quit

mod app;
mod logging;
mod ui;

use anyhow::Context;
use app::App;
use crossterm::{
    event::{self, DisableBracketedPaste, EnableBracketedPaste, Event},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io::{self, stdout};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

const USAGE: &str = "usage: quill [--help] [--version] [FILE]";

#[derive(Debug, PartialEq, Eq)]
enum CliAction {
    Run(Option<PathBuf>),
    Help,
    Version,
}

fn parse_args<I>(args: I) -> Result<CliAction, String>
where
    I: IntoIterator<Item = String>,
{
    let mut file = None;
    for arg in args {
        match arg.as_str() {
            "-h" | "--help" => return Ok(CliAction::Help),
            "-V" | "--version" => return Ok(CliAction::Version),
            flag if flag.starts_with('-') && flag != "-" => {
                return Err(format!("unknown option {flag}"));
            }
            _ if file.is_some() => return Err("only one file can be given".to_string()),
            _ => file = Some(PathBuf::from(arg)),
        }
    }
    Ok(CliAction::Run(file))
}

fn main() -> anyhow::Result<()> {
    let file = match parse_args(std::env::args().skip(1)) {
        Ok(CliAction::Run(file)) => file,
        Ok(CliAction::Help) => {
            println!("{USAGE}");
            return Ok(());
        }
        Ok(CliAction::Version) => {
            println!("quill {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Err(message) => {
            eprintln!("{message}\n{USAGE}");
            std::process::exit(2);
        }
    };

    let config_dir = quill_core::ensure_config_dir().context("creating the config directory")?;
    let log_file = logging::init(&config_dir)?;
    info!(log_file = %log_file.display(), "starting quill {}", env!("CARGO_PKG_VERSION"));

    let mut app = App::new(&config_dir, file)?;

    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        DisableBracketedPaste,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    app.shutdown();
    if let Err(err) = &result {
        error!("{err}");
    }
    info!("bye");
    result?;
    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        app.tick();
        terminal.draw(|f| ui::render(f, app))?;

        if app.should_quit {
            break;
        }

        let timeout = app.time_until_tick().min(Duration::from_millis(100));
        if event::poll(timeout)? {
            match event::read()? {
                Event::Key(key) => app.handle_key_event(key),
                Event::Paste(text) => app.handle_paste(&text),
                // Redrawn on the next iteration.
                Event::Resize(_, _) => {}
                _ => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(parse_args(args(&[])), Ok(CliAction::Run(None)));
        assert_eq!(
            parse_args(args(&["notes.txt"])),
            Ok(CliAction::Run(Some(PathBuf::from("notes.txt"))))
        );
        assert_eq!(parse_args(args(&["a", "--help"])), Ok(CliAction::Help));
        assert_eq!(parse_args(args(&["-V"])), Ok(CliAction::Version));
    }

    #[test]
    fn test_parse_args_rejects_bad_input() {
        assert!(parse_args(args(&["--frobnicate"])).is_err());
        assert!(parse_args(args(&["a", "b"])).is_err());
    }
}
