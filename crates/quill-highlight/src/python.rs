//! Python rule set.
//!
//! These patterns are deliberately simple and miss corner cases (an escaped quote ends a string
//! early, for example); they are right most of the time.

use crate::multiline::MultilineScanner;
use crate::tokenizer::{LineTokenizer, TagRule};

pub const KEYWORD: &str = "keyword";
pub const EXCEPTION: &str = "exception";
pub const BUILTIN: &str = "builtin";
pub const STRING: &str = "string";
pub const COMMENT: &str = "comment";
pub const DECORATOR: &str = "decorator";
pub const MULTILINE_STRING: &str = "multiline-string";

pub const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

/// Builtin names that are not keywords, exception classes or `_`-prefixed.
pub const BUILTINS: &[&str] = &[
    "BaseException", "BaseExceptionGroup", "Ellipsis", "GeneratorExit", "KeyboardInterrupt",
    "NotImplemented", "SystemExit", "abs", "aiter", "all", "anext", "any", "ascii", "bin", "bool",
    "breakpoint", "bytearray", "bytes", "callable", "chr", "classmethod", "compile", "complex",
    "copyright", "credits", "delattr", "dict", "dir", "divmod", "enumerate", "eval", "exec",
    "exit", "filter", "float", "format", "frozenset", "getattr", "globals", "hasattr", "hash",
    "help", "hex", "id", "input", "int", "isinstance", "issubclass", "iter", "len", "license",
    "list", "locals", "map", "max", "memoryview", "min", "next", "object", "oct", "open", "ord",
    "pow", "print", "property", "quit", "range", "repr", "reversed", "round", "set", "setattr",
    "slice", "sorted", "staticmethod", "str", "sum", "super", "tuple", "type", "vars", "zip",
];

/// Builtin classes deriving from `Exception`.
pub const EXCEPTIONS: &[&str] = &[
    "ArithmeticError", "AssertionError", "AttributeError", "BlockingIOError", "BrokenPipeError",
    "BufferError", "BytesWarning", "ChildProcessError", "ConnectionAbortedError",
    "ConnectionError", "ConnectionRefusedError", "ConnectionResetError", "DeprecationWarning",
    "EOFError", "EncodingWarning", "EnvironmentError", "Exception", "ExceptionGroup",
    "FileExistsError", "FileNotFoundError", "FloatingPointError", "FutureWarning", "IOError",
    "ImportError", "ImportWarning", "IndentationError", "IndexError", "InterruptedError",
    "IsADirectoryError", "KeyError", "LookupError", "MemoryError", "ModuleNotFoundError",
    "NameError", "NotADirectoryError", "NotImplementedError", "OSError", "OverflowError",
    "PendingDeprecationWarning", "PermissionError", "ProcessLookupError", "RecursionError",
    "ReferenceError", "ResourceWarning", "RuntimeError", "RuntimeWarning", "StopAsyncIteration",
    "StopIteration", "SyntaxError", "SyntaxWarning", "SystemError", "TabError", "TimeoutError",
    "TypeError", "UnboundLocalError", "UnicodeDecodeError", "UnicodeEncodeError", "UnicodeError",
    "UnicodeTranslateError", "UnicodeWarning", "UserWarning", "ValueError", "Warning",
    "ZeroDivisionError",
];

const STRING_PATTERN: &str = r#"'.*?'|".*?""#;
const COMMENT_PATTERN: &str = r"#.*$";
// Stops at ( so a decorator call spanning lines only highlights the name.
const DECORATOR_PATTERN: &str = r"^\s*@[^\(]+";
const MULTILINE_PATTERN: &str = r#"(?s)""".*?"""|'''.*?'''"#;

/// The Python line rules, in precedence order.
pub fn python_tokenizer() -> Result<LineTokenizer, regex::Error> {
    Ok(LineTokenizer::new(vec![
        TagRule::words(KEYWORDS.iter().copied(), KEYWORD)?,
        TagRule::words(EXCEPTIONS.iter().copied(), EXCEPTION)?,
        TagRule::words(BUILTINS.iter().copied(), BUILTIN)?,
        TagRule::new(STRING_PATTERN, STRING)?,
        TagRule::new(COMMENT_PATTERN, COMMENT)?,
        TagRule::new(DECORATOR_PATTERN, DECORATOR)?,
    ]))
}

/// Triple-quoted string scanner.
pub fn python_multiline() -> Result<MultilineScanner, regex::Error> {
    MultilineScanner::new(MULTILINE_PATTERN, MULTILINE_STRING)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::LineSpan;

    #[test]
    fn test_lists_do_not_overlap() {
        for name in BUILTINS {
            assert!(!KEYWORDS.contains(name), "{name} is a keyword");
            assert!(!EXCEPTIONS.contains(name), "{name} is an exception");
            assert!(!name.starts_with('_'));
        }
    }

    #[test]
    fn test_python_line() {
        let tokenizer = python_tokenizer().unwrap();
        let spans = tokenizer.tokenize_line("    raise ValueError('bad')  # oops");
        assert_eq!(
            spans,
            vec![
                LineSpan::new(4, 9, KEYWORD),
                LineSpan::new(10, 20, EXCEPTION),
                LineSpan::new(21, 26, STRING),
                LineSpan::new(29, 35, COMMENT),
            ]
        );
    }

    #[test]
    fn test_decorator_stops_at_paren() {
        let tokenizer = python_tokenizer().unwrap();
        let spans = tokenizer.tokenize_line("@functools.lru_cache(maxsize=2)");
        assert_eq!(spans, vec![LineSpan::new(0, 20, DECORATOR)]);
    }
}
