use criterion::{Criterion, black_box, criterion_group, criterion_main};
use quill_core::{Buffer, Position};
use quill_highlight::{HighlightOrchestrator, python_multiline, python_tokenizer};

const SAMPLE_LINES: &[&str] = &[
    "import os, sys",
    "@functools.lru_cache(maxsize=None)",
    "def load(path: str) -> dict:",
    "    \"\"\"Read a JSON file.\"\"\"",
    "    with open(path, 'r', encoding='utf-8') as f:  # text mode",
    "        return json.load(f)",
    "    raise ValueError(f\"bad path {path!r}\")",
    "",
];

fn python_source(line_count: usize) -> String {
    let mut out = String::with_capacity(line_count * 48);
    for i in 0..line_count {
        out.push_str(SAMPLE_LINES[i % SAMPLE_LINES.len()]);
        out.push('\n');
    }
    out
}

fn bench_tokenize_line(c: &mut Criterion) {
    let tokenizer = python_tokenizer().unwrap();
    c.bench_function("tokenize_line/python_sample", |b| {
        b.iter(|| {
            for line in SAMPLE_LINES {
                black_box(tokenizer.tokenize_line(black_box(line)));
            }
        })
    });
}

fn bench_multiline_scan(c: &mut Criterion) {
    let scanner = python_multiline().unwrap();
    let text = python_source(10_000);
    c.bench_function("multiline_scan/10k_lines", |b| {
        b.iter(|| black_box(scanner.scan(black_box(&text))))
    });
}

fn bench_keystroke_flush(c: &mut Criterion) {
    let text = python_source(10_000);
    let mut buffer = Buffer::new(&text);
    let mut orchestrator = HighlightOrchestrator::for_kind(quill_core::HighlighterKind::Python)
        .unwrap()
        .with_multiline_on_quote(false);
    orchestrator.request_full();
    orchestrator.flush(&mut buffer);

    c.bench_function("keystroke_flush/10k_lines", |b| {
        b.iter(|| {
            buffer.insert(Position::new(5_000, 0), "x").unwrap();
            orchestrator.on_keystroke(5_000);
            orchestrator.flush(&mut buffer);
        })
    });
}

criterion_group!(
    benches,
    bench_tokenize_line,
    bench_multiline_scan,
    bench_keystroke_flush
);
criterion_main!(benches);
