//! Option dispatch benchmarks
//!
//! Measures the cost of the generic option API against the typed accessors,
//! and the full apply sequence against a real UDP socket.
//!
//! Run with: `cargo bench --bench option_dispatch`

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rudt_transport::{
    ChannelOption, OptionStore, OptionValue, TransportChannelConfig, TransportOption,
    UdpSocketHandle,
};
use std::net::SocketAddr;

/// Benchmark `set_option` for recognized and delegated keys
fn bench_set_option(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_option");
    let config = TransportChannelConfig::detached();

    for option in [
        TransportOption::ProtocolReceiveBufferSize,
        TransportOption::Backlog,
    ] {
        let key = option.key();
        group.bench_with_input(BenchmarkId::from_parameter(key), &key, |b, key| {
            b.iter(|| {
                let accepted = config.set_option(key, OptionValue::Size(black_box(4096)));
                black_box(accepted)
            });
        });
    }

    group.bench_function("delegated/WRITE_SPIN_COUNT", |b| {
        b.iter(|| {
            let accepted =
                config.set_option(&ChannelOption::WRITE_SPIN_COUNT, OptionValue::Int(8));
            black_box(accepted)
        });
    });

    group.bench_function("typed/set_protocol_receive_buffer_size", |b| {
        b.iter(|| config.set_protocol_receive_buffer_size(black_box(4096)));
    });

    group.finish();
}

/// Benchmark `option` lookups and the merged snapshot
fn bench_get_option(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_option");
    let config = TransportChannelConfig::detached();

    group.bench_function("recognized/SO_LINGER", |b| {
        b.iter(|| black_box(config.option(&ChannelOption::SO_LINGER)));
    });

    group.bench_function("delegated/AUTO_READ", |b| {
        b.iter(|| black_box(config.option(&ChannelOption::AUTO_READ)));
    });

    group.bench_function("options_snapshot", |b| {
        b.iter(|| black_box(config.options()));
    });

    group.finish();
}

/// Benchmark config construction with apply against a real socket
fn bench_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply");
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();

    group.bench_function("udp_socket", |b| {
        b.iter_batched(
            || UdpSocketHandle::for_addr(&addr).unwrap(),
            |socket| {
                let config = TransportChannelConfig::new(&socket, true).unwrap();
                black_box(config)
            },
            criterion::BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_set_option, bench_get_option, bench_apply);
criterion_main!(benches);
