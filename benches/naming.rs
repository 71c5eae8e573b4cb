//! Benchmark for the array naming codec
//!
//! Every create-or-find call encodes at least one name.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use dorado_provisioner::naming::{encode_host_name, encode_lun_name};
use uuid::Uuid;

fn bench_host_names(c: &mut Criterion) {
    let mut group = c.benchmark_group("naming");
    group.throughput(Throughput::Elements(1));

    group.bench_function("host_name_passthrough", |b| {
        b.iter(|| encode_host_name(black_box("compute-07")));
    });

    let long = "compute-node-07.rack-12.datacenter-east.example.internal";
    group.bench_function("host_name_digest", |b| {
        b.iter(|| encode_host_name(black_box(long)));
    });

    group.finish();
}

fn bench_lun_names(c: &mut Criterion) {
    let mut group = c.benchmark_group("naming");
    group.throughput(Throughput::Elements(1));

    let ids: Vec<Uuid> = (0..1000).map(|_| Uuid::new_v4()).collect();
    group.bench_function("lun_name", |b| {
        let mut i = 0usize;
        b.iter(|| {
            i = (i + 1) % ids.len();
            encode_lun_name(black_box(&ids[i]))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_host_names, bench_lun_names);
criterion_main!(benches);
