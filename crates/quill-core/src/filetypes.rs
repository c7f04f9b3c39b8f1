//! Filetype definitions (`filetypes.toml`).
//!
//! Each table of the file describes one filetype. The `[DEFAULT]` table is special: every key it
//! sets is used for the other tables when they leave that key out, and it is also the filetype of
//! files that match nothing else.
//!
//! An invalid value in a table is reported and replaced by the `[DEFAULT]` value (or, inside
//! `[DEFAULT]` itself, by the built-in value). Invalid TOML syntax rejects the whole file.

use crate::error::{CoreError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{error, info, warn};

/// File name of the filetype definitions inside the config directory.
pub const FILETYPES_FILE: &str = "filetypes.toml";

/// Name of the fallback section.
pub const DEFAULT_SECTION: &str = "DEFAULT";

const DEFAULT_FILETYPES: &str = r#"# Quill's filetype configuration file. Edit it freely; restart Quill to apply
# the changes.
#
# Table names in [square brackets] can be anything you want. The [DEFAULT]
# table is special: if a key is omitted in any other table, the [DEFAULT]
# value is used instead.
#
# Valid keys:
#   filename_patterns   list of patterns like "*.py" or "Makefile.*"
#   highlighter         "python" or "none"
#   tabs2spaces         true or false
#   indent_size         number of spaces or tab width, positive integer
#   max_line_length     positive integer or 0 for no limit
#   compile_command     see below
#   run_command         see below
#   lint_command        see below
#   langserver          { command = "...", language_id = "...", port = 1234 }
#                       port is optional; without it the server speaks over
#                       stdin and stdout
#
# These substitutions are performed on the commands:
#   {file}      path to source file, e.g. "hello world.tar.gz"
#   {no_ext}    {file} without last extension, e.g. "hello world.tar"
#   {no_exts}   {file} without any extensions, e.g. "hello world"
#   {{          literal {
#   }}          literal }
#
# Redirections like > or | don't work. The command is split into an argument
# list before the file names are substituted in, so spaces in file names
# don't cause issues. For example, if {file} is "hello world.txt", then this
#
#   tar -cf {no_ext}.tar {file}
#
# is equivalent to this shell command:
#
#   tar cf "hello world.tar" "hello world.txt"

[DEFAULT]
filename_patterns = []
highlighter = "none"
tabs2spaces = true
indent_size = 4
max_line_length = 0
compile_command = ""
run_command = ""
lint_command = ""

[Python]
filename_patterns = ["*.py", "*.pyw"]
highlighter = "python"
max_line_length = 79
run_command = "python3 {file}"
lint_command = "python3 -m flake8 {file}"
# langserver = { command = "pyls", language_id = "python" }

[C]
filename_patterns = ["*.c", "*.h"]
compile_command = "cc {file} -Wall -Wextra -std=c99 -o @EXE@"
run_command = "@RUNEXE@"

["C++"]
filename_patterns = ["*.cpp", "*.cc", "*.cxx", "*.hpp", "*.hh"]
compile_command = "c++ {file} -Wall -Wextra --std=c++98 -o @EXE@"
run_command = "@RUNEXE@"

[Java]
filename_patterns = ["*.java"]
compile_command = "javac {file}"
run_command = "java {no_ext}"

# almost everyone seems to use 2 space indents in javascript
[JavaScript]
filename_patterns = ["*.js"]
indent_size = 2
run_command = "node {file}"

[Makefile]
filename_patterns = ["Makefile", "makefile", "Makefile.*", "makefile.*"]
# make doesn't work with spaces
tabs2spaces = false
run_command = "make"

[Shell]
filename_patterns = ["*.sh"]
run_command = "bash {file}"

# tcl man pages and many people on wiki.tcl.tk indent with 3 spaces
[Tcl]
filename_patterns = ["*.tcl"]
indent_size = 3
run_command = "tclsh {file}"

[JSON]
filename_patterns = ["*.json"]

[reStructuredText]
filename_patterns = ["*.rst"]

[Markdown]
filename_patterns = ["*.md", "*.markdown"]
"#;

/// Contents written to `filetypes.toml` when it does not exist yet.
pub fn default_filetypes_toml() -> String {
    let (exe, runexe) = if cfg!(windows) {
        ("{no_ext}.exe", "{no_ext}.exe")
    } else {
        ("{no_ext}", "./{no_ext}")
    };
    DEFAULT_FILETYPES
        .replace("@EXE@", exe)
        .replace("@RUNEXE@", runexe)
}

/// Syntax highlighter to use for a filetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HighlighterKind {
    /// No highlighting.
    #[default]
    None,
    /// The built-in Python rule set.
    Python,
}

impl HighlighterKind {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Self::None),
            "python" => Some(Self::Python),
            _ => None,
        }
    }
}

/// Which of a filetype's commands to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// `compile_command`
    Compile,
    /// `run_command`
    Run,
    /// `lint_command`
    Lint,
}

impl CommandKind {
    /// Key of the command in `filetypes.toml`.
    pub fn key(self) -> &'static str {
        match self {
            Self::Compile => "compile_command",
            Self::Run => "run_command",
            Self::Lint => "lint_command",
        }
    }
}

/// How to start the language server of a filetype.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LangServerConfig {
    /// Shell-style command line.
    pub command: String,
    /// LSP `languageId` sent in `didOpen`.
    pub language_id: String,
    /// If set, the server listens on `localhost:port` instead of using stdio.
    #[serde(default)]
    pub port: Option<u16>,
}

/// A resolved filetype with every key filled in.
#[derive(Debug, Clone)]
pub struct Filetype {
    /// Section name.
    pub name: String,
    /// Glob patterns matched against file names.
    pub filename_patterns: Vec<String>,
    /// Highlighter selection.
    pub highlighter: HighlighterKind,
    /// Indent with spaces instead of tabs.
    pub tabs2spaces: bool,
    /// Indent width, always positive.
    pub indent_size: usize,
    /// 0 means no limit.
    pub max_line_length: usize,
    /// Compile command template, empty if none.
    pub compile_command: String,
    /// Run command template, empty if none.
    pub run_command: String,
    /// Lint command template, empty if none.
    pub lint_command: String,
    /// Language server, if configured.
    pub langserver: Option<LangServerConfig>,
    matchers: Vec<Regex>,
}

impl Filetype {
    fn builtin_default() -> Self {
        Self {
            name: DEFAULT_SECTION.to_string(),
            filename_patterns: Vec::new(),
            highlighter: HighlighterKind::None,
            tabs2spaces: true,
            indent_size: 4,
            max_line_length: 0,
            compile_command: String::new(),
            run_command: String::new(),
            lint_command: String::new(),
            langserver: None,
            matchers: Vec::new(),
        }
    }

    /// Whether one of the filename patterns matches `file_name` (a base name).
    pub fn matches(&self, file_name: &str) -> bool {
        self.matchers.iter().any(|re| re.is_match(file_name))
    }

    fn command_template(&self, kind: CommandKind) -> &str {
        match kind {
            CommandKind::Compile => &self.compile_command,
            CommandKind::Run => &self.run_command,
            CommandKind::Lint => &self.lint_command,
        }
    }

    /// Build the argument list of a command for the file called `basename`.
    ///
    /// Returns `Ok(None)` if the filetype has no such command.
    pub fn command(&self, kind: CommandKind, basename: &str) -> Result<Option<Vec<String>>> {
        let template = self.command_template(kind);
        if template.trim().is_empty() {
            return Ok(None);
        }
        expand_command(template, basename)
            .map(Some)
            .map_err(|message| CoreError::FiletypeOption {
                filetype: self.name.clone(),
                option: kind.key(),
                message,
            })
    }
}

/// All loaded filetypes, `[DEFAULT]` first.
#[derive(Debug)]
pub struct Filetypes {
    filetypes: Vec<Filetype>,
    problems: Vec<CoreError>,
}

impl Filetypes {
    /// Parse a `filetypes.toml` document.
    ///
    /// Syntax errors fail; invalid option values are recorded in [`Filetypes::problems`] and
    /// replaced by the fallback value.
    pub fn parse(text: &str) -> Result<Self> {
        let table: toml::Table = text.parse()?;
        let mut problems = Vec::new();

        let empty = toml::Table::new();
        let default_table = match table.get(DEFAULT_SECTION) {
            Some(toml::Value::Table(t)) => t,
            _ => &empty,
        };
        let default = resolve_section(
            DEFAULT_SECTION,
            default_table,
            &Filetype::builtin_default(),
            &mut problems,
        );

        let mut filetypes = vec![default];
        for (name, value) in &table {
            if name == DEFAULT_SECTION {
                continue;
            }
            let toml::Value::Table(section) = value else {
                warn!(key = %name, "ignoring top-level key that is not a table");
                continue;
            };
            let filetype = resolve_section(name, section, &filetypes[0], &mut problems);
            filetypes.push(filetype);
        }

        for problem in &problems {
            error!("{problem}");
        }
        Ok(Self {
            filetypes,
            problems,
        })
    }

    /// The definitions Quill ships with.
    pub fn builtin() -> Self {
        match Self::parse(&default_filetypes_toml()) {
            Ok(filetypes) => filetypes,
            Err(err) => {
                error!("built-in filetypes are invalid: {err}");
                Self {
                    filetypes: vec![Filetype::builtin_default()],
                    problems: vec![err],
                }
            }
        }
    }

    /// Load `filetypes.toml` from `config_dir`, creating it with the defaults if absent.
    ///
    /// A file that cannot be parsed is reported in [`Filetypes::problems`] and the built-in
    /// definitions are used instead.
    pub fn load_or_create(config_dir: &Path) -> Result<Self> {
        let path = config_dir.join(FILETYPES_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "filetypes file not found, creating it");
                let text = default_filetypes_toml();
                fs::write(&path, &text).map_err(|err| CoreError::io(&path, err))?;
                text
            }
            Err(err) => return Err(CoreError::io(&path, err)),
        };

        match Self::parse(&text) {
            Ok(filetypes) => Ok(filetypes),
            Err(err) => {
                error!(path = %path.display(), "{err}; default filetypes will be used instead");
                let mut filetypes = Self::builtin();
                filetypes.problems.push(err);
                Ok(filetypes)
            }
        }
    }

    /// The `[DEFAULT]` filetype.
    pub fn default_filetype(&self) -> &Filetype {
        &self.filetypes[0]
    }

    /// Pick the filetype for `path` by its file name; `[DEFAULT]` if nothing matches.
    pub fn guess(&self, path: &Path) -> &Filetype {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return self.default_filetype();
        };
        self.filetypes[1..]
            .iter()
            .find(|ft| ft.matches(file_name))
            .unwrap_or_else(|| self.default_filetype())
    }

    /// Look up a filetype by section name.
    pub fn by_name(&self, name: &str) -> Option<&Filetype> {
        self.filetypes.iter().find(|ft| ft.name == name)
    }

    /// Iterate in file order, `[DEFAULT]` first.
    pub fn iter(&self) -> impl Iterator<Item = &Filetype> {
        self.filetypes.iter()
    }

    /// Problems found while loading.
    pub fn problems(&self) -> &[CoreError] {
        &self.problems
    }
}

fn resolve_section(
    name: &str,
    section: &toml::Table,
    base: &Filetype,
    problems: &mut Vec<CoreError>,
) -> Filetype {
    let mut filetype = base.clone();
    filetype.name = name.to_string();

    let mut invalid = |option: &'static str, message: String| {
        problems.push(CoreError::FiletypeOption {
            filetype: name.to_string(),
            option,
            message,
        });
    };

    if let Some(value) = section.get("filename_patterns") {
        match parse_patterns(value) {
            Ok((patterns, matchers)) => {
                filetype.filename_patterns = patterns;
                filetype.matchers = matchers;
            }
            Err(message) => invalid("filename_patterns", message),
        }
    }

    if let Some(value) = section.get("highlighter") {
        match value.as_str().and_then(HighlighterKind::parse) {
            Some(kind) => filetype.highlighter = kind,
            None => invalid("highlighter", format!("expected \"python\" or \"none\", got {value}")),
        }
    }

    if let Some(value) = section.get("tabs2spaces") {
        match value.as_bool() {
            Some(flag) => filetype.tabs2spaces = flag,
            None => invalid("tabs2spaces", format!("expected true or false, got {value}")),
        }
    }

    if let Some(value) = section.get("indent_size") {
        match value.as_integer() {
            Some(size) if size > 0 => filetype.indent_size = size as usize,
            _ => invalid("indent_size", format!("expected a positive integer, got {value}")),
        }
    }

    if let Some(value) = section.get("max_line_length") {
        match value.as_integer() {
            Some(len) if len >= 0 => filetype.max_line_length = len as usize,
            _ => invalid(
                "max_line_length",
                format!("expected 0 or a positive integer, got {value}"),
            ),
        }
    }

    for kind in [CommandKind::Compile, CommandKind::Run, CommandKind::Lint] {
        let Some(value) = section.get(kind.key()) else {
            continue;
        };
        let Some(template) = value.as_str() else {
            invalid(kind.key(), format!("expected a string, got {value}"));
            continue;
        };
        if !template.trim().is_empty()
            && let Err(message) = expand_command(template, "whatever")
        {
            invalid(kind.key(), message);
            continue;
        }
        match kind {
            CommandKind::Compile => filetype.compile_command = template.to_string(),
            CommandKind::Run => filetype.run_command = template.to_string(),
            CommandKind::Lint => filetype.lint_command = template.to_string(),
        }
    }

    if let Some(value) = section.get("langserver") {
        match value.clone().try_into::<LangServerConfig>() {
            Ok(config) if config.command.trim().is_empty() => {
                invalid("langserver", "command must not be empty".to_string())
            }
            Ok(config) => filetype.langserver = Some(config),
            Err(err) => invalid("langserver", err.to_string()),
        }
    }

    filetype
}

fn parse_patterns(value: &toml::Value) -> std::result::Result<(Vec<String>, Vec<Regex>), String> {
    let array = value
        .as_array()
        .ok_or_else(|| format!("expected a list of patterns, got {value}"))?;

    let mut patterns = Vec::with_capacity(array.len());
    let mut matchers = Vec::with_capacity(array.len());
    for item in array {
        let pattern = item
            .as_str()
            .ok_or_else(|| format!("expected a pattern string, got {item}"))?;
        let regex = glob_to_regex(pattern).map_err(|err| err.to_string())?;
        patterns.push(pattern.to_string());
        matchers.push(regex);
    }
    Ok((patterns, matchers))
}

/// Translate a shell glob (`*`, `?`, `[...]`, `[!...]`) into an anchored regex.
fn glob_to_regex(glob: &str) -> std::result::Result<Regex, regex::Error> {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::from("^");
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                let mut j = i + 1;
                if j < chars.len() && chars[j] == '!' {
                    j += 1;
                }
                if j < chars.len() && chars[j] == ']' {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += 1;
                }

                if j >= chars.len() {
                    out.push_str(r"\[");
                } else {
                    let mut body: String = chars[i + 1..j].iter().collect();
                    let negated = body.starts_with('!');
                    if negated {
                        body.remove(0);
                    }
                    out.push('[');
                    if negated {
                        out.push('^');
                    }
                    for c in body.chars() {
                        if matches!(c, '\\' | '[' | '&' | '~' | '^') {
                            out.push('\\');
                        }
                        out.push(c);
                    }
                    out.push(']');
                    i = j;
                }
            }
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
        i += 1;
    }

    out.push('$');
    Regex::new(&out)
}

/// Split `template` shell-style and substitute `{file}`, `{no_ext}` and `{no_exts}`.
fn expand_command(template: &str, basename: &str) -> std::result::Result<Vec<String>, String> {
    let no_ext = strip_last_extension(basename);
    let no_exts = strip_all_extensions(basename);
    let vars = [("file", basename), ("no_ext", no_ext), ("no_exts", no_exts)];

    let parts = split_command(template)?;
    if parts.is_empty() {
        return Err("command is empty".to_string());
    }
    parts.iter().map(|part| substitute(part, &vars)).collect()
}

fn strip_last_extension(name: &str) -> &str {
    let leading_dots = name.len() - name.trim_start_matches('.').len();
    match name[leading_dots..].rfind('.') {
        Some(idx) => &name[..leading_dots + idx],
        None => name,
    }
}

fn strip_all_extensions(name: &str) -> &str {
    let leading_dots = name.len() - name.trim_start_matches('.').len();
    match name[leading_dots..].find('.') {
        Some(idx) => &name[..leading_dots + idx],
        None => name,
    }
}

/// Split a command line into words, honoring quotes and backslash escapes.
pub fn split_command(command: &str) -> std::result::Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err("no closing quotation".to_string()),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch @ ('"' | '\\' | '$' | '`')) => current.push(ch),
                            Some(ch) => {
                                current.push('\\');
                                current.push(ch);
                            }
                            None => return Err("no closing quotation".to_string()),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err("no closing quotation".to_string()),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(ch) => current.push(ch),
                    None => return Err("no escaped character".to_string()),
                }
            }
            ch => {
                in_word = true;
                current.push(ch);
            }
        }
    }

    if in_word {
        words.push(current);
    }
    Ok(words)
}

fn substitute(part: &str, vars: &[(&str, &str)]) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(part.len());
    let mut chars = part.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => return Err(format!("unclosed '{{' in {part:?}")),
                    }
                }
                let value = vars
                    .iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| *value)
                    .ok_or_else(|| format!("unknown substitution {{{name}}}"))?;
                out.push_str(value);
            }
            '}' => return Err(format!("single '}}' in {part:?}")),
            ch => out.push(ch),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_translation() {
        let re = glob_to_regex("Makefile.*").unwrap();
        assert!(re.is_match("Makefile.am"));
        assert!(!re.is_match("Makefile"));

        let re = glob_to_regex("*.[ch]").unwrap();
        assert!(re.is_match("main.c"));
        assert!(!re.is_match("main.o"));

        let re = glob_to_regex("[!a]?").unwrap();
        assert!(re.is_match("bx"));
        assert!(!re.is_match("ax"));
    }

    #[test]
    fn test_extension_stripping() {
        assert_eq!(strip_last_extension("hello world.tar.gz"), "hello world.tar");
        assert_eq!(strip_all_extensions("hello world.tar.gz"), "hello world");
        assert_eq!(strip_last_extension(".bashrc"), ".bashrc");
        assert_eq!(strip_all_extensions("Makefile"), "Makefile");
    }

    #[test]
    fn test_split_command_quotes() {
        assert_eq!(
            split_command(r#"cc 'a b.c' "x\"y" c\ d"#).unwrap(),
            vec!["cc", "a b.c", "x\"y", "c d"]
        );
        assert!(split_command("echo 'oops").is_err());
    }

    #[test]
    fn test_substitution_escapes() {
        let vars = [("file", "x.py")];
        assert_eq!(substitute("{{{file}}}", &vars).unwrap(), "{x.py}");
        assert!(substitute("{nope}", &vars).is_err());
        assert!(substitute("a}b", &vars).is_err());
    }
}
