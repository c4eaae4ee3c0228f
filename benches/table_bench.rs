use criterion::{
    BenchmarkId, Criterion, Throughput, {criterion_group, criterion_main},
};
use probetable::Table;

fn fill_probe_drain(keys: u64) {
    let mut table: Table<u64, u64> = Table::with_slots(16).unwrap();
    for key in 0..keys {
        table.insert(key, key.wrapping_mul(31)).unwrap();
    }
    for key in 0..keys {
        assert!(table.get(&key).is_some());
    }
    for key in 0..keys {
        table.remove(&key);
    }
}

fn different_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("probetable");
    for size in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| fill_probe_drain(size as u64))
        });
    }
    group.finish();
}

criterion_group!(benches, different_sizes);
criterion_main!(benches);
