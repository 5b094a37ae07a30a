// StrandLink reliability-layer benchmarks using criterion.
//
// Measures:
//   - Payload chunking
//   - RTT estimator update cost
//   - End-to-end transfer over an in-memory loopback link

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

use bytes::Bytes;
use strandlink::chunk;
use strandlink::link::loopback::LoopbackLink;
use strandlink::link::{DiscardListener, LinkLayer};
use strandlink::{
    NullVariant, RttEstimator, SequencedAck, SequencedResponder, TransferConfig,
    TransportProtocol,
};

// ---------------------------------------------------------------------------
// Chunk split
// ---------------------------------------------------------------------------

fn bench_chunk_split(c: &mut Criterion) {
    let sizes: &[usize] = &[64, 1024, 65536];

    let mut group = c.benchmark_group("chunk_split");
    for &size in sizes {
        let payload = Bytes::from(vec![0xABu8; size]);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{size}B")),
            &payload,
            |b, p| {
                b.iter(|| {
                    let chunks = chunk::split(p, 20).unwrap();
                    black_box(chunks.count());
                });
            },
        );
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// RTT update
// ---------------------------------------------------------------------------

fn bench_rtt_update(c: &mut Criterion) {
    c.bench_function("rtt_update_1000_samples", |b| {
        b.iter(|| {
            let mut rtt = RttEstimator::new();
            for i in 0..1000u64 {
                rtt.update(black_box(40 + i % 25));
            }
            black_box(rtt.timeout_ms());
        });
    });
}

// ---------------------------------------------------------------------------
// Loopback transfer
// ---------------------------------------------------------------------------

fn bench_loopback_transfer(c: &mut Criterion) {
    let payload = Bytes::from(vec![0x5Au8; 4096]);

    let mut group = c.benchmark_group("loopback_transfer");
    group.throughput(Throughput::Bytes(payload.len() as u64));

    group.bench_function("null", |b| {
        let (a, peer) = LoopbackLink::pair();
        peer.subscribe_receive_listener(Arc::new(DiscardListener));
        let mut protocol = TransportProtocol::new(
            Arc::new(a),
            Arc::new(DiscardListener),
            NullVariant::new(),
            TransferConfig::default().with_chunk_size(256),
        )
        .unwrap();
        b.iter(|| black_box(protocol.transmit(payload.clone(), false).unwrap()));
    });

    group.bench_function("sequenced", |b| {
        let (a, peer) = LoopbackLink::pair();
        let _responder = SequencedResponder::attach(Arc::new(peer), Arc::new(DiscardListener));
        let mut protocol = TransportProtocol::new(
            Arc::new(a),
            Arc::new(DiscardListener),
            SequencedAck::default(),
            TransferConfig::default().with_chunk_size(256),
        )
        .unwrap();
        b.iter(|| black_box(protocol.transmit(payload.clone(), false).unwrap()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_chunk_split,
    bench_rtt_update,
    bench_loopback_transfer,
);
criterion_main!(benches);
