use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use energy_explorer::{
    filter::FilterSpec,
    query::QueryContext,
    schema::RecordSchema,
    source::MemorySource,
};
use serde_json::{Value as JsonValue, json};

fn generate_production(rows: usize) -> Vec<JsonValue> {
    let groups = ["hydro", "wind", "solar", "thermal"];
    let areas = ["NO1", "NO2", "NO3", "NO4", "NO5"];
    (0..rows)
        .map(|i| {
            let month = (i % 12) + 1;
            let day = (i % 28) + 1;
            let hour = i % 24;
            json!({
                "startTime": format!("2021-{month:02}-{day:02}T{hour:02}:00:00+01:00"),
                "endTime": format!("2021-{month:02}-{day:02}T{hour:02}:59:59+01:00"),
                "priceArea": areas[i % areas.len()],
                "productionGroup": groups[i % groups.len()],
                "quantityKwh": (i % 997) as f64 * 1.5,
            })
        })
        .collect()
}

fn context(rows: &[JsonValue]) -> QueryContext {
    QueryContext::new(
        Box::new(MemorySource::from_values("bench", rows.to_vec())),
        RecordSchema::energy(),
    )
}

fn bench_cached_vs_uncached(c: &mut Criterion) {
    let rows = generate_production(50_000);
    let filter = FilterSpec::new()
        .select("priceArea", ["NO1", "NO2"])
        .month_range("Mar 2021", "Jan 2021");

    let mut group = c.benchmark_group("aggregate_production");

    group.bench_function("uncached", |b| {
        b.iter_batched(
            || {
                let ctx = context(&rows);
                ctx.clean_dataset().expect("clean dataset");
                ctx
            },
            |ctx| {
                ctx.aggregate(&filter, "productionGroup", "quantityKwh")
                    .expect("aggregate");
            },
            BatchSize::LargeInput,
        );
    });

    let warm = context(&rows);
    warm.aggregate(&filter, "productionGroup", "quantityKwh")
        .expect("warm aggregate");
    group.bench_function("cached", |b| {
        b.iter(|| {
            warm.aggregate(&filter, "productionGroup", "quantityKwh")
                .expect("aggregate");
        });
    });

    group.bench_function("clean_dataset", |b| {
        b.iter_batched(
            || context(&rows),
            |ctx| {
                ctx.clean_dataset().expect("clean dataset");
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_cached_vs_uncached);
criterion_main!(benches);
