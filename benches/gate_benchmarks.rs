//! Performance benchmarks for the webhook intake path.
//!
//! Tracks the per-request cost of the pieces on the hot path:
//! - signature verification across payload sizes
//! - payload parsing
//! - full gate handling of new and duplicate deliveries

#![allow(clippy::unwrap_used)]

use std::{
    hint::black_box,
    sync::atomic::{AtomicU64, Ordering},
};

use bytes::Bytes;
use content_gate_core::{
    crypto::{sign_payload, verify_signature},
    models::ContentChange,
};
use content_gate_testing::{change_payload, signed_notification, test_secret, GateHarness};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use tokio::runtime::Runtime;

fn payload_of_size(size: usize) -> Vec<u8> {
    json!({
        "documentId": "catalog-page",
        "changeType": "updated",
        "body": "x".repeat(size),
    })
    .to_string()
    .into_bytes()
}

fn bench_signature_verification(c: &mut Criterion) {
    let secret = test_secret();
    let mut group = c.benchmark_group("signature");

    for size in [256, 4 * 1024, 64 * 1024, 1024 * 1024] {
        let payload = payload_of_size(size);
        let signature = sign_payload(&payload, &secret).unwrap();

        group.throughput(Throughput::Bytes(payload.len() as u64));
        group.bench_with_input(BenchmarkId::new("verify", size), &payload, |b, payload| {
            b.iter(|| verify_signature(black_box(payload), black_box(&signature), &secret).unwrap());
        });
    }
    group.finish();
}

fn bench_payload_parsing(c: &mut Criterion) {
    let payload = change_payload("catalog-page", "updated");
    let large = payload_of_size(64 * 1024);

    c.bench_function("parse/minimal", |b| {
        b.iter(|| ContentChange::parse(black_box(&payload)).unwrap());
    });
    c.bench_function("parse/64k", |b| {
        b.iter(|| ContentChange::parse(black_box(&large)).unwrap());
    });
}

fn bench_gate(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("gate");

    group.bench_function("new_delivery", |b| {
        let harness = GateHarness::new();
        let counter = AtomicU64::new(0);

        b.to_async(&rt).iter(|| {
            let document = format!("doc-{}", counter.fetch_add(1, Ordering::Relaxed));
            let notification = signed_notification(change_payload(&document, "updated"));
            let gate = harness.gate.clone();
            async move { gate.handle_notification(notification).await.unwrap() }
        });
    });

    group.bench_function("duplicate_delivery", |b| {
        let harness = GateHarness::new();
        let payload = Bytes::from(change_payload("catalog-page", "updated"));
        rt.block_on(harness.gate.handle_notification(signed_notification(payload.clone()))).unwrap();

        b.to_async(&rt).iter(|| {
            let notification = signed_notification(payload.clone());
            let gate = harness.gate.clone();
            async move { gate.handle_notification(notification).await.unwrap() }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_signature_verification, bench_payload_parsing, bench_gate);
criterion_main!(benches);
