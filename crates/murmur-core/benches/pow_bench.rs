//! Benchmarks for the proof-of-work engine and envelope codec
//!
//! Run with: cargo bench -p murmur-core
//!
//! These benchmarks establish baselines for:
//! - Raw nonce throughput
//! - Stamping to typical targets
//! - Receiver-side verification and decoding

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use murmur_core::envelope::{decode_at, encode_public, DecodeOptions};
use murmur_core::pow::{self, PowSearch};
use murmur_core::{derive_channel_key, EnvelopeDraft, Identity};

fn draft(body_len: usize) -> EnvelopeDraft {
    let channel = derive_channel_key("default");
    let mut draft = encode_public(&vec![0x42; body_len], &channel, 600, None).unwrap();
    draft.pow_target = 2.0;
    draft
}

// ============================================================================
// Search Benchmarks
// ============================================================================

fn bench_nonce_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("pow_iterations");
    const ITERATIONS: u64 = 10_000;
    group.throughput(Throughput::Elements(ITERATIONS));

    for body_len in [16usize, 1024, 16 * 1024] {
        let draft = draft(body_len);
        let search = PowSearch::new(f64::INFINITY, Duration::from_secs(60)).max_iterations(ITERATIONS);
        group.bench_with_input(BenchmarkId::from_parameter(body_len), &draft, |b, draft| {
            b.iter(|| black_box(search.run(draft)))
        });
    }
    group.finish();
}

fn bench_stamp_to_target(c: &mut Criterion) {
    let mut group = c.benchmark_group("pow_stamp");
    group.sample_size(20);

    for target in [0.2, 2.0] {
        let draft = draft(64);
        group.bench_with_input(BenchmarkId::from_parameter(target), &target, |b, &target| {
            b.iter(|| black_box(pow::stamp(&draft, target, Duration::from_secs(10))))
        });
    }
    group.finish();
}

// ============================================================================
// Receive Path Benchmarks
// ============================================================================

fn bench_verify_and_decode(c: &mut Criterion) {
    let channel = Arc::new(derive_channel_key("default"));
    let identity = Identity::generate().unwrap();
    let draft = draft(64);
    let stamp = pow::stamp(&draft, 0.2, Duration::from_secs(10));
    let envelope = draft.seal(&stamp);
    let bytes = envelope.to_bytes().unwrap();

    c.bench_function("pow_verify", |b| b.iter(|| black_box(pow::verify(&envelope))));

    let channels = vec![channel];
    let options = DecodeOptions::new(0.01);
    c.bench_function("decode_channel_message", |b| {
        b.iter(|| black_box(decode_at(&bytes, &channels, &identity, &options)))
    });

    let other = Identity::generate().unwrap();
    c.bench_function("decode_not_for_me", |b| {
        b.iter(|| black_box(decode_at(&bytes, &[], &other, &options)))
    });
}

criterion_group!(
    benches,
    bench_nonce_throughput,
    bench_stamp_to_target,
    bench_verify_and_decode
);
criterion_main!(benches);
