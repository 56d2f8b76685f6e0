#[macro_use]
extern crate criterion;

use criterion::{black_box, BenchmarkId, Criterion};

use acmsim_config::{AcmSimConfig, Algorithm};
use acmsim_simulator::Simulator;

/// One simulated second of the default scenario per scheduler.
fn benchmark_scenario_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenario_second");
    group.sample_size(10);
    for algorithm in [
        Algorithm::Utility,
        Algorithm::KnapsackBounded,
        Algorithm::Batch,
        Algorithm::Drr,
    ] {
        let mut config = AcmSimConfig::default();
        config.scheduler.algorithm = algorithm;
        config.simulation.duration = 1.0;
        config.simulation.trace = false;
        let mut simulator = Simulator::new(&config).unwrap();
        group.bench_with_input(
            BenchmarkId::from_parameter(algorithm),
            &algorithm,
            |b, _| {
                let mut seed = 0;
                b.iter(|| {
                    seed += 1;
                    black_box(simulator.run_once(0, seed).unwrap())
                })
            },
        );
    }
    group.finish();
}

criterion_group!(benches, benchmark_scenario_throughput);
criterion_main!(benches);
