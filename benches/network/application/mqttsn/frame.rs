use criterion::{Criterion, Throughput};
use std::hint::black_box;
use tinysn::network::application::mqttsn::frame::Frame;
use tinysn::network::application::mqttsn::{Flags, QoS};
use tinysn::transfer::nack;
use tinysn::transfer::{CHUNK_PAYLOAD, ChunkHeader, MAX_CHUNK_WIRE};

fn publish_frame(payload: &[u8]) -> Frame<'_> {
    Frame::Publish {
        flags: Flags::publish(QoS::AtLeastOnce),
        topic_id: 7,
        msg_id: 42,
        payload,
    }
}

pub fn bench_encode_publish(c: &mut Criterion) {
    let payload = [0xA5u8; MAX_CHUNK_WIRE];
    let frame = publish_frame(&payload);
    let mut buf = [0u8; 256];

    let mut group = c.benchmark_group("frame");
    group.throughput(Throughput::Bytes(frame.encoded_len() as u64));
    group.bench_function("encode_publish", |b| {
        b.iter(|| black_box(frame.encode(black_box(&mut buf)).unwrap()))
    });
    group.finish();
}

pub fn bench_decode_publish(c: &mut Criterion) {
    let payload = [0xA5u8; MAX_CHUNK_WIRE];
    let frame = publish_frame(&payload);
    let mut buf = [0u8; 256];
    let len = frame.encode(&mut buf).unwrap();

    let mut group = c.benchmark_group("frame");
    group.throughput(Throughput::Bytes(len as u64));
    group.bench_function("decode_publish", |b| {
        b.iter(|| black_box(Frame::decode(black_box(&buf[..len])).unwrap()))
    });
    group.finish();
}

pub fn bench_chunk_roundtrip(c: &mut Criterion) {
    let header = ChunkHeader {
        block_id: 1,
        part_num: 500,
        total_parts: 1000,
        data_len: CHUNK_PAYLOAD as u16,
    };
    let mut buf = [0u8; MAX_CHUNK_WIRE];

    c.bench_function("chunk_header_roundtrip", |b| {
        b.iter(|| {
            header.encode(black_box(&mut buf));
            black_box(ChunkHeader::decode(black_box(&buf)).unwrap())
        })
    });
}

pub fn bench_nack_format(c: &mut Criterion) {
    // A realistic loss pattern: every 16th part of a 458-part block.
    let mut out = heapless::String::new();
    c.bench_function("nack_format_missing", |b| {
        b.iter(|| {
            black_box(nack::format_missing(
                black_box(9),
                458,
                |part| part % 16 != 0,
                &mut out,
            ))
        })
    });
}
