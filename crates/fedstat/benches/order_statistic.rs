use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use fedstat::stats::{BisectionState, FeatureQuery, Percentile, Rank};
use fedstat::{Federation, Participant, ProtocolConfig};
use fedstat_ckks::ckks::CkksParameters;
use rand::{distributions::Uniform, prelude::Distribution, thread_rng};
use std::time::Duration;

fn participants(num_parties: usize, rows: usize) -> Vec<Participant> {
    let par = CkksParameters::default_arc(8).unwrap();
    let dist = Uniform::new(-100.0, 100.0);
    (0..num_parties)
        .map(|id| {
            let values = dist.sample_iter(&mut thread_rng()).take(rows).collect();
            Participant::new(id, &par, vec![values], &mut thread_rng()).unwrap()
        })
        .collect()
}

pub fn bisection(c: &mut Criterion) {
    let mut group = c.benchmark_group("bisection");

    let values = Uniform::new(-100.0, 100.0)
        .sample_iter(&mut thread_rng())
        .take(10_000)
        .collect::<Vec<f64>>();
    group.bench_function("plaintext_counts", |b| {
        b.iter(|| {
            let mut state =
                BisectionState::new(0, Rank::Exact(5_000), 10_000, -128.0, 128.0, 1e-6).unwrap();
            while let Some(m) = state.midpoint() {
                let below = values.iter().filter(|v| **v < m).count() as u64;
                let above = values.iter().filter(|v| **v > m).count() as u64;
                state.update(below, above);
            }
            state.result()
        });
    });
    group.finish();
}

pub fn federated_median(c: &mut Criterion) {
    let mut group = c.benchmark_group("federated_median");
    group.sample_size(10);
    group.warm_up_time(Duration::from_secs(1));
    group.measurement_time(Duration::from_secs(10));

    for num_parties in [2, 4, 8] {
        let mut federation =
            Federation::new(ProtocolConfig::default(), participants(num_parties, 100)).unwrap();
        let query = FeatureQuery::new(Percentile::MEDIAN, -128.0, 128.0, 1e-3).unwrap();
        group.bench_function(BenchmarkId::new("parties", num_parties), |b| {
            b.iter(|| federation.order_statistics(&[query]).unwrap());
        });
    }

    group.finish();
}

criterion_group!(order_statistic, bisection, federated_median);
criterion_main!(order_statistic);
