//! # Request Bridge Benchmarks
//!
//! | Path | Target |
//! |------|--------|
//! | Correlator register/resolve/wait | < 10µs per request |
//! | Wire encode/decode | < 5µs per message |
//! | Bridge call over in-memory bus | < 1ms per request |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::future::join_all;
use serde_json::json;
use shared_bus::{BusEvent, InMemoryEventBus, Topic};
use std::sync::Arc;
use std::time::Duration;
use sync_bridge::adapter::wire::{decode_response, encode_command, encode_response};
use sync_bridge::testing::spawn_responder;
use sync_bridge::{Bridge, BridgeConfig, CorrelationId, Correlator};
use tokio::runtime::Runtime;
use tokio::time::Instant;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("benchmark runtime")
}

// ============================================================================
// Correlator
// ============================================================================

fn bench_correlator(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("correlator");
    group.measurement_time(Duration::from_secs(5));

    let correlator = Correlator::new(Duration::from_secs(10));
    let mut counter = 0u64;

    group.bench_function("register_resolve_wait", |b| {
        b.to_async(&rt).iter(|| {
            counter += 1;
            let id = CorrelationId::new(format!("bench-{counter}"));
            let correlator = correlator.clone();
            async move {
                let handle = correlator.register(id.clone()).expect("fresh id");
                let deadline = handle.deadline();
                correlator.resolve(&id, json!("HELLO"));
                black_box(correlator.wait(handle, deadline).await.expect("resolved"))
            }
        })
    });

    for pending in [100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(pending as u64));
        group.bench_with_input(
            BenchmarkId::new("evict_expired", pending),
            &pending,
            |b, &pending| {
                b.iter_batched(
                    || {
                        let correlator = Correlator::new(Duration::from_secs(10));
                        let past = Instant::now();
                        let handles: Vec<_> = (0..pending)
                            .map(|i| {
                                correlator
                                    .register_with_deadline(
                                        CorrelationId::new(format!("expired-{i}")),
                                        past,
                                    )
                                    .expect("fresh id")
                            })
                            .collect();
                        (correlator, handles)
                    },
                    |(correlator, handles)| {
                        black_box(correlator.evict_expired());
                        handles
                    },
                    criterion::BatchSize::SmallInput,
                )
            },
        );
    }

    group.finish();
}

// ============================================================================
// Wire format
// ============================================================================

fn bench_wire(c: &mut Criterion) {
    let mut group = c.benchmark_group("wire");

    let id = CorrelationId::new("0192f3a0-7c1e-7d2a-9b4e-5f6a7b8c9d0e");
    let body = json!({ "message": "hello", "items": [1, 2, 3], "nested": { "k": "v" } });
    let response = BusEvent::new(
        Topic::new("resp"),
        id.as_str(),
        encode_response(&id, &body).expect("encodable"),
    );

    group.bench_function("encode_command", |b| {
        b.iter(|| black_box(encode_command(&id, &body).expect("encodable")))
    });
    group.bench_function("decode_response", |b| {
        b.iter(|| black_box(decode_response(&response).expect("decodable")))
    });

    group.finish();
}

// ============================================================================
// Bridge round trip
// ============================================================================

fn bench_bridge_call(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("bridge");
    group.measurement_time(Duration::from_secs(10));

    let bus = Arc::new(InMemoryEventBus::with_capacity(65_536));
    let mut config = BridgeConfig::default();
    config.timeouts.request = Duration::from_secs(5);
    let bridge = Arc::new(Bridge::new(bus.clone(), &config).expect("valid config"));

    let _responder = rt.block_on(async {
        bridge.ensure_subscribed().await.expect("subscribed");
        spawn_responder(
            bus.clone(),
            &config.command_topic(),
            &config.response_topic(),
            Some,
        )
        .await
    });

    group.bench_function("call_single", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(bridge.call(json!("hello")).await.expect("reply")) })
    });

    for concurrency in [10usize, 100] {
        group.throughput(Throughput::Elements(concurrency as u64));
        group.bench_with_input(
            BenchmarkId::new("call_concurrent", concurrency),
            &concurrency,
            |b, &concurrency| {
                b.to_async(&rt).iter(|| async {
                    let calls = (0..concurrency).map(|i| bridge.call(json!(i)));
                    black_box(join_all(calls).await)
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_correlator, bench_wire, bench_bridge_call);
criterion_main!(benches);
