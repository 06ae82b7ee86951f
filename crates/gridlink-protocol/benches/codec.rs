//! Codec benchmarks for gridlink-protocol.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use gridlink_protocol::{frame, FrameCodec, FrameValue, Message, SampleFrame};

fn message(values: usize) -> Message {
    let mut msg = Message::data(1, 42).with_timestamp(1_700_000_000, 0);
    for i in 0..values {
        msg.push_f32(i as f32);
    }
    msg
}

fn bench_binary(c: &mut Criterion) {
    let msg = message(64);
    let encoded = msg.to_bytes().unwrap();

    let mut group = c.benchmark_group("binary");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("encode_64_values", |b| {
        let mut buf = BytesMut::with_capacity(encoded.len());
        b.iter(|| {
            buf.clear();
            black_box(&msg).encode_into(&mut buf).unwrap();
        })
    });
    group.bench_function("decode_64_values", |b| {
        b.iter(|| Message::decode(black_box(&encoded)).unwrap())
    });
    group.finish();
}

fn bench_frames(c: &mut Criterion) {
    let smp = SampleFrame::new(42, (0..64).map(|i| FrameValue::Float(f64::from(i))).collect());
    let encoded = frame::encode(&smp).unwrap();

    let mut group = c.benchmark_group("frame");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("encode_64_values", |b| b.iter(|| frame::encode(black_box(&smp))));
    group.bench_function("decode_64_values", |b| {
        b.iter(|| frame::decode(black_box(&encoded)))
    });
    group.finish();
}

fn bench_frame_batch(c: &mut Criterion) {
    let frames: Vec<_> = (0..16)
        .map(|seq| SampleFrame::new(seq, vec![FrameValue::Float(1.0); 8]))
        .collect();
    let mut codec = FrameCodec::new();

    c.bench_function("frame_batch_16x8_roundtrip", |b| {
        b.iter(|| {
            let encoded = codec.encode_batch(black_box(&frames)).unwrap();
            codec.decode_batch(black_box(&encoded)).unwrap()
        })
    });
}

criterion_group!(benches, bench_binary, bench_frames, bench_frame_batch);
criterion_main!(benches);
