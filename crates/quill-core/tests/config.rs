use pretty_assertions::assert_eq;
use quill_core::{
    CommandKind, CoreError, Filetypes, HighlighterKind, LoadedText, LineEnding, Settings,
    find_project_root, load_text, save_text,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, "").unwrap();
}

#[test]
fn test_project_root_prefers_git_two_levels_up() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().join("repo");
    fs::create_dir_all(root.join(".git")).unwrap();
    touch(&root.join("pkg").join("README.md"));
    let file = root.join("pkg").join("sub").join("main.py");
    touch(&file);

    assert_eq!(find_project_root(&file), root);
}

#[test]
fn test_project_root_uses_nearest_readme_without_git() {
    let tmp = TempDir::new().unwrap();
    let outer = tmp.path().join("outer");
    touch(&outer.join("readme.rst"));
    touch(&outer.join("inner").join(".editorconfig"));
    let file = outer.join("inner").join("deep").join("x.txt");
    touch(&file);

    assert_eq!(find_project_root(&file), outer.join("inner"));
}

#[test]
fn test_project_root_falls_back_to_parent() {
    let tmp = TempDir::new().unwrap();
    let file = tmp.path().join("lonely").join("file.c");
    touch(&file);

    // The temp dir itself may live below a directory with markers; only assert the
    // fallback when nothing above was picked.
    let root = find_project_root(&file);
    assert!(file.starts_with(&root));
}

#[test]
fn test_project_root_of_relative_path_checks_current_dir() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join(".git")).unwrap();
    touch(&tmp.path().join("src").join("foo.py"));
    touch(&tmp.path().join("foo.py"));
    let expected = fs::canonicalize(tmp.path()).unwrap();

    // Only this test relies on the current directory.
    let previous = std::env::current_dir().unwrap();
    std::env::set_current_dir(tmp.path()).unwrap();
    let nested = find_project_root(Path::new("src/foo.py"));
    let top = find_project_root(Path::new("foo.py"));
    std::env::set_current_dir(previous).unwrap();

    assert_eq!(fs::canonicalize(nested).unwrap(), expected);
    assert_eq!(fs::canonicalize(top).unwrap(), expected);
}

#[test]
fn test_filetype_guess_and_default_fallback() {
    let filetypes = Filetypes::builtin();
    assert!(filetypes.problems().is_empty());

    let python = filetypes.guess(Path::new("/src/app.py"));
    assert_eq!(python.name, "Python");
    assert_eq!(python.highlighter, HighlighterKind::Python);
    assert_eq!(python.max_line_length, 79);
    assert!(python.tabs2spaces);

    assert_eq!(filetypes.guess(Path::new("Makefile.am")).name, "Makefile");
    assert!(!filetypes.guess(Path::new("Makefile")).tabs2spaces);
    assert_eq!(filetypes.guess(Path::new("notes.xyz")).name, "DEFAULT");
}

#[test]
fn test_default_section_fills_missing_keys() {
    let filetypes = Filetypes::parse(
        r#"
        [DEFAULT]
        indent_size = 8
        tabs2spaces = false

        [Rust]
        filename_patterns = ["*.rs"]
        tabs2spaces = true
        langserver = { command = "rust-analyzer", language_id = "rust" }
        "#,
    )
    .unwrap();

    let rust = filetypes.guess(Path::new("lib.rs"));
    assert_eq!(rust.indent_size, 8);
    assert!(rust.tabs2spaces);
    let langserver = rust.langserver.as_ref().unwrap();
    assert_eq!(langserver.command, "rust-analyzer");
    assert_eq!(langserver.port, None);
}

#[test]
fn test_invalid_option_falls_back_and_is_reported() {
    let filetypes = Filetypes::parse(
        r#"
        [Weird]
        filename_patterns = ["*.weird"]
        indent_size = 0
        run_command = "run {bogus}"
        "#,
    )
    .unwrap();

    let weird = filetypes.by_name("Weird").unwrap();
    assert_eq!(weird.indent_size, 4);
    assert_eq!(weird.run_command, "");

    let options: Vec<_> = filetypes
        .problems()
        .iter()
        .filter_map(|problem| match problem {
            CoreError::FiletypeOption { option, .. } => Some(*option),
            _ => None,
        })
        .collect();
    assert_eq!(options, vec!["indent_size", "run_command"]);
}

#[test]
fn test_command_substitution_keeps_spaces_in_one_argument() {
    let filetypes = Filetypes::parse(
        r#"
        [Tar]
        filename_patterns = ["*.gz"]
        run_command = "tar -cf {no_ext}.tar {file} {no_exts}"
        "#,
    )
    .unwrap();

    let command = filetypes
        .by_name("Tar")
        .unwrap()
        .command(CommandKind::Run, "hello world.tar.gz")
        .unwrap()
        .unwrap();
    assert_eq!(
        command,
        vec!["tar", "-cf", "hello world.tar.tar", "hello world.tar.gz", "hello world"]
    );
    assert_eq!(
        filetypes
            .by_name("Tar")
            .unwrap()
            .command(CommandKind::Lint, "x")
            .unwrap(),
        None
    );
}

#[test]
fn test_filetypes_file_is_created_on_first_load() {
    let tmp = TempDir::new().unwrap();
    let filetypes = Filetypes::load_or_create(tmp.path()).unwrap();

    assert!(tmp.path().join("filetypes.toml").exists());
    assert!(filetypes.by_name("Python").is_some());
}

#[test]
fn test_broken_filetypes_file_uses_builtin() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("filetypes.toml"), "[Python\n").unwrap();

    let filetypes = Filetypes::load_or_create(tmp.path()).unwrap();
    assert!(filetypes.by_name("Python").is_some());
    assert!(matches!(
        filetypes.problems().last(),
        Some(CoreError::Filetypes(_))
    ));
}

#[test]
fn test_settings_missing_file_and_save_load() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("settings.json");

    let mut settings = Settings::load(&path).unwrap();
    assert_eq!(settings, Settings::default());

    settings.show_line_numbers = false;
    settings.save(&path).unwrap();
    assert_eq!(Settings::load(&path).unwrap(), settings);

    fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        Settings::load(&path),
        Err(CoreError::Settings { .. })
    ));
}

#[test]
fn test_crlf_file_is_normalized_and_written_back() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("dos.txt");
    fs::write(&path, "a\r\nb\r\n").unwrap();

    let loaded = load_text(&path).unwrap();
    assert_eq!(
        loaded,
        LoadedText {
            text: "a\nb\n".to_string(),
            line_ending: LineEnding::Crlf,
        }
    );

    save_text(&path, "a\nc\n", loaded.line_ending).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "a\r\nc\r\n");

    let missing = load_text(&tmp.path().join("new.py")).unwrap();
    assert_eq!(missing.text, "");
}
