use criterion::{criterion_group, criterion_main};


criterion_group!(
    benches,
    allocation_bench::register_benchmarks,
    ledger_bench::register_benchmarks
);
criterion_main!(benches);
