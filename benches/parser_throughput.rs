//! Output parser throughput benchmarks.
//!
//! Measures wire splitting and slot decoding on clean, fenced and
//! malformed model output.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use sentinel_core::parser::{decode_slots, parse_raw, ParserLimits};

const SLOTS: &str = r#"{"assessed_severity":"HIGH","reason_ids":["ev-1","ev-2","ev-3"],"action_categories":["REVIEW_PERMISSIONS","UNINSTALL_APP"],"confidence":0.82,"note":"overlay plus accessibility"}"#;

fn wire_inputs() -> Vec<(&'static str, String)> {
    vec![
        ("metrics_prefix", format!("57|212|{SLOTS}")),
        ("no_prefix", SLOTS.to_string()),
        ("error_tag", "ERR|TIMEOUT|decode exceeded 8000 ms".to_string()),
        ("long_digits", format!("123456789012|5|{SLOTS}")),
    ]
}

fn bench_parse_raw(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_raw");
    let limits = ParserLimits::default();

    for (name, input) in wire_inputs() {
        group.throughput(Throughput::Bytes(input.len() as u64));
        group.bench_with_input(BenchmarkId::new("wire", name), &input, |b, inp| {
            b.iter(|| parse_raw(black_box(inp), &limits))
        });
    }

    group.finish();
}

fn bench_decode_slots(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_slots");

    let inputs = [
        ("clean", SLOTS.to_string()),
        ("fenced", format!("```json\n{SLOTS}\n```")),
        ("chatter", format!("Sure! Here is the result:\n{SLOTS}\nLet me know.")),
        ("malformed", "{\"assessed_severity\": \"HIGH\", \"reason_ids\": [".to_string()),
    ];
    for (name, input) in inputs {
        group.throughput(Throughput::Bytes(input.len() as u64));
        group.bench_with_input(BenchmarkId::new("payload", name), &input, |b, inp| {
            b.iter(|| decode_slots(black_box(inp)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse_raw, bench_decode_slots);
criterion_main!(benches);
