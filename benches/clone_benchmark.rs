use allenare_api::models::RoutineStep;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// Build a routine's worth of steps the way legacy documents look on the
/// wire: numbers and numeric strings mixed across the typed fields.
fn legacy_step_docs(count: usize) -> Vec<serde_json::Value> {
    (0..count)
        .map(|i| {
            serde_json::json!({
                "routineID": "source-routine",
                "exerciseID": format!("exercise-{}", i % 40),
                "exerciseNombre": format!("Ejercicio {}", i % 40),
                "exerciseMediaURL": "https://example.com/media.gif",
                "orden": if i % 2 == 0 {
                    serde_json::json!(i)
                } else {
                    serde_json::json!(i.to_string())
                },
                "series": if i % 3 == 0 {
                    serde_json::json!(4)
                } else {
                    serde_json::json!("4")
                },
                "repeticiones": "12",
                "tiempoDescansoSegundos": if i % 2 == 0 {
                    serde_json::json!("60")
                } else {
                    serde_json::json!(60)
                },
            })
        })
        .collect()
}

fn benchmark_clone_payload(c: &mut Criterion) {
    let small = legacy_step_docs(12);
    let large = legacy_step_docs(501); // crosses the 500-op batch boundary

    let mut group = c.benchmark_group("clone_payload");

    group.bench_function("normalize_12_steps", |b| {
        b.iter(|| {
            black_box(&small)
                .iter()
                .map(|doc| serde_json::from_value::<RoutineStep>(doc.clone()).unwrap())
                .collect::<Vec<_>>()
        })
    });

    group.bench_function("normalize_and_clone_501_steps", |b| {
        let steps: Vec<RoutineStep> = large
            .iter()
            .map(|doc| serde_json::from_value(doc.clone()).unwrap())
            .collect();
        b.iter(|| {
            black_box(&steps)
                .iter()
                .map(|s| s.clone_for("target-routine"))
                .collect::<Vec<_>>()
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_clone_payload);
criterion_main!(benches);
