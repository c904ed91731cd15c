//! Full transfer scenarios over the in-process hub: lossless delivery,
//! NACK recovery, boundary sizes, budget enforcement, abandonment.

use crate::mock::{Hub, HubSocket, MemFs, SharedClock};
use rand::{Rng, SeedableRng};
use tinysn::network::application::mqttsn::QoS;
use tinysn::network::application::mqttsn::client::{Client, Options};
use tinysn::network::error::Error;
use tinysn::transfer::receiver::{BlockReceiver, CompletedBlock};
use tinysn::transfer::{
    CHUNK_HEADER_LEN, CHUNK_PAYLOAD, ChunkHeader, Endpoint, Event, TransferConfig,
};

const GATEWAY: &str = "192.0.2.1:1884";

type Ep = Endpoint<HubSocket, SharedClock, MemFs>;

fn endpoint(hub: &Hub, clock: &SharedClock, fs: MemFs, id: &str) -> Ep {
    let mut client = Client::new(hub.socket(), clock.clone(), GATEWAY).unwrap();
    client
        .connect(Options {
            client_id: id,
            keep_alive_seconds: 0,
            clean_session: true,
        })
        .unwrap();
    Endpoint::new(client, fs, TransferConfig::default())
}

/// A sender and a receiver joined by one hub, subscribed for their roles.
fn transfer_pair() -> (Ep, Ep, Hub, SharedClock) {
    let hub = Hub::new();
    let clock = SharedClock::new();
    let mut tx = endpoint(&hub, &clock, MemFs::new(), "tx");
    let mut rx = endpoint(&hub, &clock, MemFs::new(), "rx");
    tx.subscribe_retransmits(QoS::AtLeastOnce).unwrap();
    rx.subscribe_chunks(QoS::AtLeastOnce).unwrap();
    (tx, rx, hub, clock)
}

fn drive_until_complete(ep: &mut Ep, max_iterations: usize) -> Option<CompletedBlock> {
    for _ in 0..max_iterations {
        if let Some(Event::BlockReceived(block)) = ep.service().unwrap() {
            return Some(block);
        }
    }
    None
}

fn drain(ep: &mut Ep, iterations: usize) {
    for _ in 0..iterations {
        let _ = ep.service().unwrap();
    }
}

/// Pseudo-random object with a JPEG signature.
fn jpeg_object(len: usize) -> Vec<u8> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x7A57);
    let mut data: Vec<u8> = (0..len).map(|_| rng.r#gen()).collect();
    data[..3].copy_from_slice(&[0xFF, 0xD8, 0xFF]);
    data
}

#[test]
fn lossless_jpeg_transfer() {
    let (mut tx, mut rx, hub, _clock) = transfer_pair();
    let source = jpeg_object(12_000);

    let block_id = tx.send_bytes(&source, QoS::AtLeastOnce).unwrap();
    assert_eq!(hub.published_on("pico/chunks").len(), 100);

    let block = drive_until_complete(&mut rx, 2_000).expect("transfer completes");
    assert_eq!(block.block_id, block_id);
    assert_eq!(block.size, 12_000);
    assert_eq!(block.parts, 100);
    assert_eq!(block.extension, ".jpg");

    let expected_path = format!("received/block_{}.jpg", block_id);
    assert_eq!(block.path.as_str(), expected_path);

    let written = &rx.filesystem().files[&expected_path];
    assert_eq!(written.len(), source.len());
    assert_eq!(crc32fast::hash(written), crc32fast::hash(&source));

    // Completion summary on the metadata topic.
    let summaries = hub.published_on("pico/block");
    assert_eq!(summaries.len(), 1);
    let summary = String::from_utf8(summaries[0].clone()).unwrap();
    assert!(summary.starts_with(&format!(
        "BLOCK_RECEIVED: ID={}, SIZE=12000, PARTS=100, TYPE=.jpg, TIME=",
        block_id
    )));
}

#[test]
fn nack_recovery_repairs_dropped_chunks() {
    let (mut tx, mut rx, hub, clock) = transfer_pair();
    let source = jpeg_object(12_000);
    hub.drop_chunk_parts(&[7, 15, 16, 17, 42]);

    let block_id = tx.send_bytes(&source, QoS::AtMostOnce).unwrap();

    // Everything that survived transit is consumed; the block stays open.
    drain(&mut rx, 200);
    assert!(rx.receiver.is_active());
    assert_eq!(rx.receiver.progress(), Some((95, 100)));
    assert_eq!(rx.receiver.missing_count(), 5);

    // Three idle seconds later the receiver asks for exactly the holes.
    clock.advance(3_001);
    drain(&mut rx, 1);
    let nacks = hub.published_on("pico/retransmit");
    assert_eq!(nacks.len(), 1);
    assert_eq!(
        String::from_utf8(nacks[0].clone()).unwrap(),
        format!("NACK:BLOCK={},CHUNKS=7,15-17,42", block_id)
    );

    // The sender rebuilds those chunks from its cache...
    let resent = loop {
        match tx.service().unwrap() {
            Some(Event::ChunksResent(n)) => break n,
            _ => {}
        }
    };
    assert_eq!(resent, 5);
    assert_eq!(tx.sender.stats().chunks_resent, 5);

    // ...and the assembly completes, byte-for-byte.
    let block = drive_until_complete(&mut rx, 200).expect("transfer completes");
    assert_eq!(block.size, 12_000);
    let written = &rx.filesystem().files[block.path.as_str()];
    assert_eq!(crc32fast::hash(written), crc32fast::hash(&source));
}

#[test]
fn oversize_object_rejected_before_any_traffic() {
    let (mut tx, _rx, hub, _clock) = transfer_pair();
    let huge = vec![0u8; 100_000];
    assert_eq!(
        tx.send_bytes(&huge, QoS::AtLeastOnce),
        Err(Error::PayloadTooLarge)
    );
    assert!(hub.published_on("pico/chunks").is_empty());
    assert!(!tx.sender.is_active());
}

#[test]
fn empty_object_rejected() {
    let (mut tx, _rx, _hub, _clock) = transfer_pair();
    assert_eq!(tx.send_bytes(&[], QoS::AtMostOnce), Err(Error::Malformed));
    assert!(!tx.sender.is_active());
}

#[test]
fn single_byte_object_is_one_chunk() {
    let (mut tx, mut rx, hub, _clock) = transfer_pair();
    tx.send_bytes(&[0x5A], QoS::AtLeastOnce).unwrap();
    assert_eq!(hub.published_on("pico/chunks").len(), 1);

    let block = drive_until_complete(&mut rx, 50).expect("transfer completes");
    assert_eq!(block.size, 1);
    assert_eq!(block.parts, 1);
    assert_eq!(block.extension, ".bin");
    assert_eq!(
        rx.filesystem().files[block.path.as_str()].as_slice(),
        &[0x5A]
    );
}

#[test]
fn chunk_payload_boundary_sizes() {
    let (mut tx, mut rx, _hub, _clock) = transfer_pair();

    let exactly_one = vec![0x11u8; CHUNK_PAYLOAD];
    tx.send_bytes(&exactly_one, QoS::AtLeastOnce).unwrap();
    let block = drive_until_complete(&mut rx, 50).expect("first transfer");
    assert_eq!(block.parts, 1);
    assert_eq!(block.size as usize, CHUNK_PAYLOAD);

    let one_more = vec![0x22u8; CHUNK_PAYLOAD + 1];
    tx.send_bytes(&one_more, QoS::AtLeastOnce).unwrap();
    let block = drive_until_complete(&mut rx, 50).expect("second transfer");
    assert_eq!(block.parts, 2);
    assert_eq!(block.size as usize, CHUNK_PAYLOAD + 1);
}

#[test]
fn send_file_round_trip() {
    let (mut tx, mut rx, _hub, _clock) = transfer_pair();
    let image = jpeg_object(5_000);
    *tx.filesystem() = MemFs::with_file("images/photo.jpg", &image);

    tx.send_file("images/photo.jpg", QoS::AtLeastOnce).unwrap();
    let block = drive_until_complete(&mut rx, 200).expect("transfer completes");
    assert_eq!(block.extension, ".jpg");
    assert_eq!(
        crc32fast::hash(&rx.filesystem().files[block.path.as_str()]),
        crc32fast::hash(&image)
    );
}

#[test]
fn send_file_size_limits() {
    let (mut tx, _rx, hub, _clock) = transfer_pair();
    *tx.filesystem() = MemFs::with_file("big.bin", &vec![0u8; 59_000]);
    assert_eq!(
        tx.send_file("big.bin", QoS::AtMostOnce),
        Err(Error::PayloadTooLarge)
    );
    assert_eq!(
        tx.send_file("missing.bin", QoS::AtMostOnce),
        Err(Error::IoError)
    );
    assert!(hub.published_on("pico/chunks").is_empty());
}

#[test]
fn stale_nack_resends_nothing() {
    let (mut tx, _rx, _hub, _clock) = transfer_pair();
    tx.send_bytes(&[1, 2, 3], QoS::AtMostOnce).unwrap();

    let result = tx
        .sender
        .handle_nack(&mut tx.client, b"NACK:BLOCK=60001,CHUNKS=1");
    assert_eq!(result, Ok(0));
    assert_eq!(tx.sender.stats().stale_nacks, 1);

    tx.sender.reset();
    assert!(!tx.sender.is_active());
}

#[test]
fn assembly_budget_and_chunk_count_limits() {
    let hub = Hub::new();
    let clock = SharedClock::new();
    let mut client = Client::new(hub.socket(), clock.clone(), GATEWAY).unwrap();
    client
        .connect(Options {
            client_id: "rx",
            keep_alive_seconds: 0,
            clean_session: true,
        })
        .unwrap();
    let mut receiver = BlockReceiver::new(&TransferConfig::default());
    let mut fs = MemFs::new();

    // Distinct block ids so each header starts a fresh assembly.
    let chunk = |total_parts: u16| {
        let mut payload = vec![0u8; CHUNK_HEADER_LEN + 4];
        ChunkHeader {
            block_id: total_parts,
            part_num: 1,
            total_parts,
            data_len: 4,
        }
        .encode(&mut payload);
        payload
    };

    // 458 parts fit the 55 KB budget; 459 do not; 1001 chunks are past the
    // protocol limit entirely.
    assert!(
        receiver
            .process_chunk(&mut client, &mut fs, &chunk(458))
            .is_ok()
    );
    assert!(receiver.is_active());
    assert_eq!(
        receiver.process_chunk(&mut client, &mut fs, &chunk(459)),
        Err(Error::NoMem)
    );
    assert!(!receiver.is_active());
    assert_eq!(
        receiver.process_chunk(&mut client, &mut fs, &chunk(1001)),
        Err(Error::Malformed)
    );
    assert_eq!(receiver.stats().budget_rejections, 1);
}

#[test]
fn duplicate_chunk_is_ignored_silently() {
    let hub = Hub::new();
    let clock = SharedClock::new();
    let mut client = Client::new(hub.socket(), clock.clone(), GATEWAY).unwrap();
    client
        .connect(Options {
            client_id: "rx",
            keep_alive_seconds: 0,
            clean_session: true,
        })
        .unwrap();
    let mut receiver = BlockReceiver::new(&TransferConfig::default());
    let mut fs = MemFs::new();

    let mut payload = vec![0u8; CHUNK_HEADER_LEN + 4];
    ChunkHeader {
        block_id: 3,
        part_num: 1,
        total_parts: 2,
        data_len: 4,
    }
    .encode(&mut payload);

    assert_eq!(
        receiver.process_chunk(&mut client, &mut fs, &payload),
        Ok(None)
    );
    assert_eq!(
        receiver.process_chunk(&mut client, &mut fs, &payload),
        Ok(None)
    );
    assert_eq!(receiver.stats().duplicate_chunks, 1);
    assert_eq!(receiver.progress(), Some((1, 2)));
}

#[test]
fn assembly_abandoned_after_prolonged_silence() {
    let (mut tx, mut rx, hub, clock) = transfer_pair();
    let source = vec![0xCCu8; CHUNK_PAYLOAD + 1];
    // Lose the tail chunk so the assembly can never finish.
    hub.drop_chunk_parts(&[2]);
    tx.send_bytes(&source, QoS::AtMostOnce).unwrap();

    drain(&mut rx, 10);
    assert!(rx.receiver.is_active());

    clock.advance(60_001);
    drain(&mut rx, 1);
    assert!(!rx.receiver.is_active());
    assert_eq!(rx.receiver.stats().blocks_abandoned, 1);
}

#[test]
fn nack_horizon_widens_after_initial_window() {
    let (mut tx, mut rx, hub, clock) = transfer_pair();
    let source = jpeg_object(12_000);
    // The entire tail of the pass is lost: nothing past part 60 arrives.
    let tail: Vec<u16> = (61..=100).collect();
    hub.drop_chunk_parts(&tail);

    let block_id = tx.send_bytes(&source, QoS::AtMostOnce).unwrap();
    drain(&mut rx, 200);
    assert_eq!(rx.receiver.progress(), Some((60, 100)));

    // Stalled, but every part up to the highest seen is present: the
    // receiver holds off, because the sender may still be mid-pass.
    clock.advance(3_001);
    drain(&mut rx, 1);
    assert!(hub.published_on("pico/retransmit").is_empty());

    // Once the initial window has elapsed with over half the block in,
    // the horizon widens to the full block.
    clock.advance(20_000);
    drain(&mut rx, 1);
    let nacks = hub.published_on("pico/retransmit");
    assert_eq!(nacks.len(), 1);
    assert_eq!(
        String::from_utf8(nacks[0].clone()).unwrap(),
        format!("NACK:BLOCK={},CHUNKS=61-100", block_id)
    );

    // Recovery proceeds as usual.
    loop {
        if let Some(Event::ChunksResent(n)) = tx.service().unwrap() {
            assert_eq!(n, 40);
            break;
        }
    }
    let block = drive_until_complete(&mut rx, 400).expect("transfer completes");
    assert_eq!(
        crc32fast::hash(&rx.filesystem().files[block.path.as_str()]),
        crc32fast::hash(&source)
    );
}
