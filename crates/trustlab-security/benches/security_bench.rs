// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for chain appends, chain verification, hashing and
// signing in the trustlab-security crate.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use trustlab_core::types::SigningAlgorithm;
use trustlab_security::{ChainedLog, generate_keypair, hash_bytes, sign, verify};

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Appending to an in-memory chain that keeps growing across iterations.
fn bench_chain_append(c: &mut Criterion) {
    c.bench_function("chain_append (in-memory)", |b| {
        let log = ChainedLog::new();
        b.iter(|| {
            log.append(black_box("alice"), black_box("view_dashboard"), black_box(b"{}"))
                .expect("append failed");
        });
    });
}

/// Full chain walk at a few lengths.
fn bench_verify_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify_chain");
    for len in [10usize, 100, 1000] {
        let log = ChainedLog::new();
        for i in 0..len {
            log.append("alice", "event", &i.to_be_bytes())
                .expect("append failed");
        }
        group.bench_function(format!("{len} entries"), |b| {
            b.iter(|| {
                let result = log.verify_chain();
                assert!(result.ok);
                black_box(result);
            });
        });
    }
    group.finish();
}

fn bench_hash(c: &mut Criterion) {
    let sizes: &[(&str, usize)] = &[("1 KiB", 1024), ("100 KiB", 100 * 1024), ("1 MiB", 1024 * 1024)];

    let mut group = c.benchmark_group("hash_sha256");
    for &(label, size) in sizes {
        let data = vec![0xABu8; size];
        group.bench_function(label, |b| {
            b.iter(|| black_box(hash_bytes(black_box(&data))));
        });
    }
    group.finish();
}

/// Sign then verify a config-sized message with each supported algorithm.
fn bench_sign_verify(c: &mut Criterion) {
    let message = br#"{"settings":{"debug":false,"maintenance_mode":false},"version":7}"#;

    let mut group = c.benchmark_group("sign_verify");
    for algorithm in [SigningAlgorithm::Ed25519, SigningAlgorithm::EcdsaP256Sha256] {
        let key = generate_keypair(algorithm).expect("keygen failed");
        group.bench_function(algorithm.as_str(), |b| {
            b.iter(|| {
                let signature = sign(&key, black_box(message)).expect("sign failed");
                assert!(verify(key.public_key(), message, &signature));
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_chain_append,
    bench_verify_chain,
    bench_hash,
    bench_sign_verify,
);
criterion_main!(benches);
