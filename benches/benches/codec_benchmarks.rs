use std::hint::black_box;

use bytes::Bytes;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use logmux::{Codec, JsonCodec, RawCodec};
use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize)]
struct Event {
    id: u64,
    kind: String,
    tags: Vec<String>,
}

fn bench_raw_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("raw_codec");
    for size in [16usize, 256, 4096] {
        let value = Bytes::from(vec![7u8; size]);
        let frame = RawCodec.encode("customer-42", &value).unwrap();
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("encode", size), &value, |b, value| {
            b.iter(|| black_box(RawCodec.encode(black_box("customer-42"), value).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &frame, |b, frame| {
            b.iter(|| black_box(RawCodec.decode(black_box(frame)).unwrap()))
        });
    }
    group.finish();
}

fn bench_json_codec(c: &mut Criterion) {
    let codec = JsonCodec::<Event>::new();
    let event = Event {
        id: 42,
        kind: "order.created".into(),
        tags: vec!["eu".into(), "priority".into()],
    };
    let data = codec.encode("customer-42", &event).unwrap();

    c.bench_function("json_codec_encode", |b| {
        b.iter(|| black_box(codec.encode("customer-42", black_box(&event)).unwrap()))
    });
    c.bench_function("json_codec_decode", |b| {
        b.iter(|| black_box(codec.decode(black_box(&data)).unwrap()))
    });
}

criterion_group!(benches, bench_raw_codec, bench_json_codec);
criterion_main!(benches);
