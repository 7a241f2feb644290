//! Acoustic Router Performance Benchmarks
//!
//! Measures the synchronous part of a submit on desktop hardware:
//! - Fragmenting payloads of varying size
//! - Resolving gateways in a populated registry
//! - Encoding operation frames

use acomms_c2_router::{
    fragment, AcousticFrame, GatewayResolver, GatewaySelector, Operation, OperationId,
    OperationKind, SystemRegistry, MAX_FRAGMENT_SIZE,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::RngCore;
use std::sync::Arc;

const RELAY: &str = "acoustic/operation";

fn random_payload(len: usize) -> Vec<u8> {
    let mut payload = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut payload);
    payload
}

/// Benchmark: fragmenting payloads around and above the frame limit
fn bench_fragment(c: &mut Criterion) {
    let mut group = c.benchmark_group("fragment");
    for size in [512usize, 1020, 2500, 16_384] {
        let payload = random_payload(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter(|| black_box(fragment(OperationId(1), payload, MAX_FRAGMENT_SIZE).unwrap()))
        });
    }
    group.finish();
}

/// Benchmark: AnyCapable resolution against registries of varying size
fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_any_capable");
    for systems in [10usize, 100, 1000] {
        let registry = Arc::new(SystemRegistry::new());
        let relay = vec![RELAY.to_string()];
        for i in 0..systems {
            let name = format!("system-{i:04}");
            // One in ten systems is an active relay.
            if i % 10 == 0 {
                registry.observe(&name, Some(&relay), None);
                registry.mark_active(&name);
            } else {
                registry.observe(&name, None, None);
            }
        }
        let resolver = GatewayResolver::new(registry);
        let selector = GatewaySelector::any(RELAY);

        group.bench_with_input(BenchmarkId::from_parameter(systems), &selector, |b, selector| {
            b.iter(|| black_box(resolver.resolve(selector, true)))
        });
    }
    group.finish();
}

/// Benchmark: encoding one full-size unit
fn bench_encode_frame(c: &mut Criterion) {
    let payload = random_payload(MAX_FRAGMENT_SIZE);
    let operation = Operation::new(
        OperationId(1),
        OperationKind::SendMessage,
        "lauv-1",
        GatewaySelector::specific("manta-1"),
        payload.clone(),
        0,
    );
    let units = fragment(operation.id, &payload, MAX_FRAGMENT_SIZE).unwrap();

    c.bench_function("encode_operation_frame", |b| {
        b.iter(|| black_box(AcousticFrame::for_unit(&operation, &units[0]).encode().unwrap()))
    });
}

criterion_group!(benches, bench_fragment, bench_resolve, bench_encode_frame);
criterion_main!(benches);
