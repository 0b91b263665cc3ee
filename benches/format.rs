use bevy_assistant_widget::format_reply;
use criterion::{Criterion, criterion_group, criterion_main};
use serde_json::{Value, json};
use std::hint::black_box;

fn records(n: usize) -> Value {
    let rows: Vec<Value> = (0..n)
        .map(|i| {
            json!({
                "id": i,
                "employee_id": format!("e-{i}"),
                "employee_name": "Ana Lima",
                "from_date": "2025-01-10",
                "to_date": "2025-01-14",
                "reason": "family trip",
                "status": "pending",
            })
        })
        .collect();
    json!({ "sql": "select * from leaves", "reply": rows })
}

fn bench_format(c: &mut Criterion) {
    let small = records(5);
    let large = records(500);
    let unknown = json!({ "status": "ok", "nested": { "a": [1, 2, 3], "b": null } });

    c.bench_function("format records x5", |b| b.iter(|| format_reply(black_box(&small))));
    c.bench_function("format records x500", |b| b.iter(|| format_reply(black_box(&large))));
    c.bench_function("format fallback json", |b| b.iter(|| format_reply(black_box(&unknown))));
}

criterion_group!(benches, bench_format);
criterion_main!(benches);
