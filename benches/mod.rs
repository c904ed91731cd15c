use criterion::{criterion_group, criterion_main};

mod network;

criterion_group!(
    benches,
    network::application::mqttsn::frame::bench_encode_publish,
    network::application::mqttsn::frame::bench_decode_publish,
    network::application::mqttsn::frame::bench_chunk_roundtrip,
    network::application::mqttsn::frame::bench_nack_format
);
criterion_main!(benches);
