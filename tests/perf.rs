#![cfg(all(feature = "memory-store", feature = "memory-cache"))]

use futures::executor::block_on;
use rs_mqtt_auth::{
    Access, AclRequest, AclRule, MemoryCache, MemoryStore, Orchestrator, OrchestratorBuilder,
    Pbkdf2Hasher,
};
use std::hint::black_box;
use std::sync::Arc;
use std::time::{Duration, Instant};

const REPEATS: usize = 5;

fn benchmark_sync<F>(name: &str, iterations: usize, mut op: F)
where
    F: FnMut(),
{
    let mut samples = Vec::with_capacity(REPEATS);

    for _ in 0..REPEATS {
        let start = Instant::now();
        for _ in 0..iterations {
            op();
        }
        samples.push(start.elapsed());
    }

    samples.sort_unstable();
    let median = samples[REPEATS / 2];
    let total_ms = median.as_secs_f64() * 1_000.0;
    let ns_per_op = median.as_secs_f64() * 1_000_000_000.0 / iterations as f64;
    let ops_per_sec = iterations as f64 / median.as_secs_f64();

    println!(
        "{name}: median={total_ms:.3} ms, ns/op={ns_per_op:.1}, ops/s={ops_per_sec:.0} (iters={iterations}, repeats={REPEATS})"
    );
}

fn benchmark_parallel<F>(name: &str, threads: usize, iterations_per_thread: usize, op_factory: F)
where
    F: Fn(usize) -> Box<dyn FnMut() + Send> + Send + Sync + 'static,
{
    let op_factory = Arc::new(op_factory);
    let mut samples = Vec::with_capacity(REPEATS);

    for _ in 0..REPEATS {
        let start = Instant::now();
        let mut joins = Vec::with_capacity(threads);
        for worker in 0..threads {
            let factory = Arc::clone(&op_factory);
            joins.push(std::thread::spawn(move || {
                let mut op = factory(worker);
                for _ in 0..iterations_per_thread {
                    op();
                }
            }));
        }
        for join in joins {
            join.join().expect("thread panicked");
        }
        samples.push(start.elapsed());
    }

    samples.sort_unstable();
    let median = samples[REPEATS / 2];
    let total_ops = threads * iterations_per_thread;
    let total_ms = median.as_secs_f64() * 1_000.0;
    let ns_per_op = median.as_secs_f64() * 1_000_000_000.0 / total_ops as f64;
    let ops_per_sec = total_ops as f64 / median.as_secs_f64();

    println!(
        "{name}: median={total_ms:.3} ms, ns/op={ns_per_op:.1}, ops/s={ops_per_sec:.0} (threads={threads}, total_ops={total_ops}, repeats={REPEATS})"
    );
}

fn setup_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.add_user(
        "perf_user",
        Pbkdf2Hasher::new().iterations(1_000).hash(b"perf_pw"),
        false,
    );
    for i in 0..64 {
        store.add_rule(AclRule::owned(
            "perf_user",
            format!("plant/{i}/+/temperature"),
            Access::Read,
        ));
    }
    store.add_rule(AclRule::shared("devices/%c/#", Access::ReadWrite));
    store
}

fn cached(store: MemoryStore, shards: usize) -> Arc<Orchestrator<MemoryCache>> {
    Arc::new(
        OrchestratorBuilder::new()
            .backend(store.into_backend())
            .cache(
                MemoryCache::new(8_192)
                    .with_shards(shards)
                    .with_ttl(Duration::from_secs(60)),
            )
            .build()
            .unwrap(),
    )
}

fn request(worker: usize) -> AclRequest {
    AclRequest::new(
        "perf_user",
        format!("devices/client-{worker}/state"),
        format!("client-{worker}"),
        Access::Write,
    )
}

#[test]
#[ignore = "manual performance test; run with --ignored --nocapture"]
fn perf_check_acl() {
    let iterations = 200_000;

    let orchestrator = OrchestratorBuilder::new()
        .backend(setup_store().into_backend())
        .build()
        .unwrap();
    let req = request(0);
    benchmark_sync("check_acl_no_cache", iterations / 4, || {
        black_box(block_on(orchestrator.check_acl(&req)));
    });

    let orchestrator = cached(setup_store(), 16);
    assert!(block_on(orchestrator.check_acl(&req)).is_allowed());
    benchmark_sync("check_acl_hot_cache", iterations, || {
        black_box(block_on(orchestrator.check_acl(&req)));
    });

    let threads = std::thread::available_parallelism()
        .map(|n| n.get().min(8))
        .unwrap_or(4);
    let iterations_per_thread = 50_000;

    for shards in [1, threads.min(16)] {
        let orchestrator = cached(setup_store(), shards);
        for worker in 0..threads {
            assert!(block_on(orchestrator.check_acl(&request(worker))).is_allowed());
        }

        benchmark_parallel(
            &format!("check_acl_hot_cache_parallel_shards{shards}"),
            threads,
            iterations_per_thread,
            move |worker| {
                let orchestrator = Arc::clone(&orchestrator);
                let req = request(worker);
                Box::new(move || {
                    black_box(block_on(orchestrator.check_acl(&req)));
                })
            },
        );
    }
}
