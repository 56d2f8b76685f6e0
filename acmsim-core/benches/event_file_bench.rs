#[macro_use]
extern crate criterion;

use criterion::{black_box, Criterion};

use acmsim_core::events::{Event, EventFile};
use acmsim_core::Simulation;

fn bench_event_file_insert_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_file_throughput");

    for pending in [128usize, 1024, 16384] {
        group.throughput(criterion::Throughput::Elements(pending as u64));
        group.bench_function(format!("pending_{}", pending), |b| {
            b.iter(|| {
                let mut file = EventFile::new();
                for i in 0..pending {
                    // Scatter dates so the heap actually reorders.
                    let date = ((i * 7919) % pending) as f64;
                    file.insert(Event::new(date, |_| Ok(())));
                }
                while let Some(event) = file.extract() {
                    black_box(event.date());
                }
            });
        });
    }
    group.finish();
}

fn bench_periodic_run(c: &mut Criterion) {
    c.bench_function("periodic_run_10k_ticks", |b| {
        b.iter(|| {
            let mut sim = Simulation::new();
            sim.insert(Event::periodic(0.0, 1e-3, |_| Ok(())));
            sim.run_until(black_box(10.0)).unwrap();
            black_box(sim.status());
        })
    });
}

criterion_group!(benches, bench_event_file_insert_extract, bench_periodic_run);
criterion_main!(benches);
