//! Codec benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use seatsync_protocol::{codec, Frame};
use serde_json::json;

fn bench_encode_update(c: &mut Criterion) {
    let frame = Frame::update("match-1", "0", 42, json!({"move": "clickCell", "args": [4]}));

    c.bench_function("encode_update", |b| {
        b.iter(|| codec::encode(black_box(&frame)).unwrap());
    });
}

fn bench_decode_update(c: &mut Criterion) {
    let frame = Frame::update("match-1", "0", 42, json!({"move": "clickCell", "args": [4]}));
    let encoded = codec::encode(&frame).unwrap();

    c.bench_function("decode_update", |b| {
        b.iter(|| codec::decode(black_box(&encoded)).unwrap());
    });
}

fn bench_decode_json_chat(c: &mut Criterion) {
    let text = codec::encode_json(&Frame::chat("match-1", json!({"text": "good game"}))).unwrap();

    c.bench_function("decode_json_chat", |b| {
        b.iter(|| codec::decode_json(black_box(&text)).unwrap());
    });
}

criterion_group!(
    benches,
    bench_encode_update,
    bench_decode_update,
    bench_decode_json_chat
);
criterion_main!(benches);
