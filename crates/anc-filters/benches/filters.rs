//! Per-block latency budget for NLMS/RLS/Hybrid at the default filter
//! length (§4.5.7: one block of `N=1024 @ 48kHz` must process in
//! strictly less than `N/Fs`; budgets target <=10ms median, <=12ms P99).
//! This benchmark measures where each algorithm sits against that
//! budget — a violation here is a tuning signal, not a test failure
//! (§4.5.7, §9: "budgets, not promises").

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use anc_filters::{Algorithm, FilterBank};

const BLOCK_LEN: usize = 1024;
const FILTER_LENGTH: usize = 512;

fn reference_block() -> Vec<f32> {
    (0..BLOCK_LEN).map(|n| 0.1 * (n as f32 * 0.037).sin()).collect()
}

fn bench_algorithm(c: &mut Criterion, name: &str, algorithm: Algorithm) {
    let mut bank = FilterBank::new(algorithm, 1, FILTER_LENGTH).expect("filter bank construction");
    let block = reference_block();
    let refs: [&[f32]; 1] = [&block];

    // Warm up so the benchmark measures steady-state adaptation, not the
    // zero-initialized transient.
    for _ in 0..20 {
        bank.process_block(&refs, &refs).expect("process_block");
    }

    c.bench_function(name, |b| {
        b.iter(|| {
            bank.process_block(black_box(&refs), black_box(&refs)).expect("process_block");
        });
    });
}

fn bench_nlms(c: &mut Criterion) {
    bench_algorithm(c, "nlms_block_1024_l512", Algorithm::Nlms);
}

fn bench_rls(c: &mut Criterion) {
    bench_algorithm(c, "rls_block_1024_l512", Algorithm::Rls);
}

fn bench_hybrid(c: &mut Criterion) {
    bench_algorithm(c, "hybrid_block_1024_l512", Algorithm::Hybrid);
}

criterion_group!(benches, bench_nlms, bench_rls, bench_hybrid);
criterion_main!(benches);
