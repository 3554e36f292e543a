use std::time::{Duration, Instant};

use criterion::{BenchmarkId, Criterion, Throughput};
use futures::future::try_join_all;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use ringmpc::{
    channel::SimpleChannel,
    config::SessionConfig,
    mpc::session::Session,
    ring::{ArrayRef, Field, share_arith, share_bool},
};
use tokio::runtime::Runtime;

const LEN: usize = 1_000;

pub fn conversion_benchmarks(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    for kernel in ["A2B", "B2A", "MulAA"] {
        let mut g = c.benchmark_group(kernel);
        g.throughput(Throughput::Elements(LEN as u64));
        for (field, n) in [(Field::Ring32, 2), (Field::Ring64, 3), (Field::Ring64, 5)] {
            let id = BenchmarkId::from_parameter(format!("{field}, {n} parties"));
            g.bench_function(id, |b| {
                b.to_async(&rt)
                    .iter_custom(|iters| bench_kernel(kernel, field, n, iters));
            });
        }
        g.finish();
    }
}

/// Runs `kernel` on `LEN` elements `iters` times, timing only the kernel calls.
async fn bench_kernel(kernel: &'static str, field: Field, n: usize, iters: u64) -> Duration {
    let v = ArrayRef::random(field, LEN, &mut ChaCha20Rng::seed_from_u64(1));
    let arith = share_arith(&v, n, &mut ChaCha20Rng::seed_from_u64(2));
    let boolean = share_bool(&v, n, &mut ChaCha20Rng::seed_from_u64(3));
    let config = SessionConfig::default().with_seed([1; 32]);

    let mut elapsed = Duration::default();
    for _ in 0..iters {
        let channels = SimpleChannel::channels(n);
        let mut sessions = try_join_all(
            channels
                .into_iter()
                .enumerate()
                .map(|(rank, ch)| Session::bootstrap(ch, rank, n, config.clone())),
        )
        .await
        .expect("bootstrap failed");

        let now = Instant::now();
        // spawn every party on the runtime so that the parties actually use multiple threads
        let handles: Vec<_> = sessions
            .drain(..)
            .enumerate()
            .map(|(rank, mut session)| {
                let operands = match kernel {
                    "B2A" => vec![boolean[rank].clone()],
                    "MulAA" => vec![arith[rank].clone(), arith[rank].clone()],
                    _ => vec![arith[rank].clone()],
                };
                tokio::spawn(async move { session.call(kernel, &operands).await })
            })
            .collect();
        for handle in handles {
            handle
                .await
                .expect("join failed")
                .unwrap_or_else(|err| panic!("{kernel} failed with {err:?}"));
        }
        elapsed += now.elapsed();
    }
    elapsed
}
