// ABOUTME: Benchmark suite for frame encode/decode performance
// ABOUTME: Measures the codec across a range of payload sizes up to the maximum frame

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use httpfs::frame::{Frame, PacketType, MAX_PAYLOAD_SIZE};
use std::net::Ipv4Addr;

fn sample_frame(payload_len: usize) -> Frame {
    Frame::new(
        PacketType::Data,
        60,
        Ipv4Addr::new(127, 0, 0, 1),
        9000,
        vec![0x41; payload_len],
    )
    .unwrap()
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode");
    for payload_len in [0usize, 64, 512, MAX_PAYLOAD_SIZE] {
        let frame = sample_frame(payload_len);
        group.bench_with_input(
            BenchmarkId::from_parameter(payload_len),
            &frame,
            |b, frame| b.iter(|| black_box(frame.encode())),
        );
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decode");
    for payload_len in [0usize, 64, 512, MAX_PAYLOAD_SIZE] {
        let encoded = sample_frame(payload_len).encode();
        group.bench_with_input(
            BenchmarkId::from_parameter(payload_len),
            &encoded,
            |b, encoded| b.iter(|| black_box(Frame::decode(encoded).unwrap())),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
