//! Client state-machine scenarios: handshakes, QoS, keep-alive,
//! duplicate suppression, dispatch during ACK waits.

use crate::mock::{FakeClock, GatewayHandle, GatewaySocket, gateway};
use tinysn::network::application::mqttsn::client::{Client, ConnectionState, Options};
use tinysn::network::application::mqttsn::frame::Frame;
use tinysn::network::application::mqttsn::{
    Flags, MSG_CONNECT, MSG_DISCONNECT, MSG_PINGREQ, MSG_PUBACK, MSG_PUBLISH, MSG_PUBREL,
    MSG_REGACK, MSG_REGISTER, QoS,
};
use tinysn::time::Clock;
use tinysn::network::error::Error;

type TestClient = Client<GatewaySocket, FakeClock>;

const GATEWAY: &str = "192.0.2.1:1884";

fn options() -> Options<'static> {
    Options {
        client_id: "test-client",
        keep_alive_seconds: 0,
        clean_session: true,
    }
}

fn client() -> (TestClient, GatewayHandle, FakeClock) {
    let (socket, handle) = gateway();
    let clock = FakeClock::new();
    let client = Client::new(socket, clock.clone(), GATEWAY).unwrap();
    (client, handle, clock)
}

fn connected() -> (TestClient, GatewayHandle, FakeClock) {
    let (mut client, handle, clock) = client();
    client.connect(options()).unwrap();
    (client, handle, clock)
}

#[test]
fn connect_handshake() {
    let (mut client, handle, _clock) = client();
    assert!(!client.is_connected());

    client.connect(options()).unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(handle.count_sent(MSG_CONNECT), 1);

    let connect = &handle.sent_of_type(MSG_CONNECT)[0];
    match Frame::decode(connect).unwrap() {
        Frame::Connect {
            flags,
            duration,
            client_id,
        } => {
            assert!(flags.clean_session);
            assert_eq!(duration, 0);
            assert_eq!(client_id, "test-client");
        }
        other => panic!("unexpected frame {:?}", other),
    }
}

#[test]
fn connect_is_idempotent_while_connected() {
    let (mut client, handle, _clock) = connected();
    client.connect(options()).unwrap();
    assert_eq!(handle.count_sent(MSG_CONNECT), 1);
}

#[test]
fn connect_rejected_surfaces_code() {
    let (mut client, handle, _clock) = client();
    handle.state().connack_code = 3;
    assert_eq!(client.connect(options()), Err(Error::Rejected(3)));
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[test]
fn connect_times_out_against_silent_gateway() {
    let (mut client, handle, clock) = client();
    handle.state().silent = true;
    assert_eq!(client.connect(options()), Err(Error::Timeout));
    // The bounded wait really elapsed.
    assert!(clock.now_ms() >= 5_000);
    // CONNECT was retransmitted on the backoff schedule meanwhile.
    assert!(handle.count_sent(MSG_CONNECT) > 1);
}

#[test]
fn operations_require_connection() {
    let (mut client, _handle, _clock) = client();
    assert_eq!(
        client.publish("a", b"x", QoS::AtMostOnce),
        Err(Error::NotConnected)
    );
    assert_eq!(client.subscribe("a", QoS::AtMostOnce), Err(Error::NotConnected));
    assert_eq!(client.register_topic("a"), Err(Error::NotConnected));
}

#[test]
fn registration_happens_on_first_publish_only() {
    let (mut client, handle, _clock) = connected();

    client
        .publish("sensors/temp", b"21.0", QoS::AtMostOnce)
        .unwrap();
    assert_eq!(handle.count_sent(MSG_REGISTER), 1);
    assert_eq!(handle.count_sent(MSG_PUBLISH), 1);

    // The PUBLISH left with the id the gateway assigned.
    let assigned = handle.state().registry["sensors/temp"];
    let publish = &handle.sent_of_type(MSG_PUBLISH)[0];
    match Frame::decode(publish).unwrap() {
        Frame::Publish {
            topic_id, payload, ..
        } => {
            assert_eq!(topic_id, assigned);
            assert_eq!(payload, b"21.0");
        }
        other => panic!("unexpected frame {:?}", other),
    }

    // Second publish: registry hit, no second REGISTER.
    client
        .publish("sensors/temp", b"21.5", QoS::AtMostOnce)
        .unwrap();
    assert_eq!(handle.count_sent(MSG_REGISTER), 1);
    assert_eq!(handle.count_sent(MSG_PUBLISH), 2);
}

#[test]
fn register_topic_is_idempotent() {
    let (mut client, handle, _clock) = connected();
    let first = client.register_topic("a/b").unwrap();
    let second = client.register_topic("a/b").unwrap();
    assert_eq!(first, second);
    assert_eq!(handle.count_sent(MSG_REGISTER), 1);
}

#[test]
fn qos1_publish_pairs_with_one_puback() {
    let (mut client, handle, _clock) = connected();
    client
        .publish("sensors/temp", b"data", QoS::AtLeastOnce)
        .unwrap();
    assert_eq!(handle.count_sent(MSG_PUBLISH), 1);
}

#[test]
fn qos1_retransmits_same_bytes_until_acked() {
    let (mut client, handle, _clock) = connected();
    handle.state().drop_pubacks = 1;

    client
        .publish("sensors/temp", b"data", QoS::AtLeastOnce)
        .unwrap();

    let publishes = handle.sent_of_type(MSG_PUBLISH);
    assert_eq!(publishes.len(), 2);
    // Retransmission is byte-identical, same msg_id.
    assert_eq!(publishes[0], publishes[1]);
}

#[test]
fn qos1_gives_up_after_retry_budget() {
    let (mut client, handle, clock) = connected();
    handle.state().drop_pubacks = u32::MAX;

    let started = clock.now_ms();
    assert_eq!(
        client.publish("sensors/temp", b"data", QoS::AtLeastOnce),
        Err(Error::DeliveryFailed)
    );
    // Original send plus four retries on a doubling schedule.
    assert_eq!(handle.count_sent(MSG_PUBLISH), 5);
    assert!(clock.now_ms().wrapping_sub(started) >= 31_000);
    assert_eq!(client.stats().delivery_failures, 1);
    assert_eq!(client.stats().retransmissions, 4);
}

#[test]
fn qos2_runs_full_handshake() {
    let (mut client, handle, _clock) = connected();
    client
        .publish("sensors/temp", b"data", QoS::ExactlyOnce)
        .unwrap();

    assert_eq!(handle.count_sent(MSG_PUBLISH), 1);
    assert_eq!(handle.count_sent(MSG_PUBREL), 1);

    let publish = &handle.sent_of_type(MSG_PUBLISH)[0];
    let pubrel = &handle.sent_of_type(MSG_PUBREL)[0];
    let msg_id = match Frame::decode(publish).unwrap() {
        Frame::Publish { msg_id, .. } => msg_id,
        other => panic!("unexpected frame {:?}", other),
    };
    assert_eq!(Frame::decode(pubrel).unwrap(), Frame::Pubrel { msg_id });
}

#[test]
fn qos2_duplicate_pubrec_repeats_pubrel() {
    let (mut client, handle, _clock) = connected();
    // msg_id 1 goes to the REGISTER, msg_id 2 to the QoS 2 publish.
    client.register_topic("sensors/temp").unwrap();

    // Queue a duplicate PUBREC ahead of the gateway's own: the wait loop
    // sees PUBREC twice for the same handshake and must answer each.
    handle.push_frame(&Frame::Pubrec { msg_id: 2 });
    client
        .publish("sensors/temp", b"data", QoS::ExactlyOnce)
        .unwrap();
    assert_eq!(handle.count_sent(MSG_PUBREL), 2);

    // A stray PUBREC for an id with no handshake is ignored.
    handle.push_frame(&Frame::Pubrec { msg_id: 999 });
    assert_eq!(client.poll().unwrap(), None);
    assert_eq!(handle.count_sent(MSG_PUBREL), 2);
}

#[test]
fn subscribe_returns_granted_topic_id_and_resolves_inbound() {
    let (mut client, handle, _clock) = connected();
    let topic_id = client.subscribe("commands/led", QoS::AtLeastOnce).unwrap();
    assert_eq!(topic_id, handle.state().registry["commands/led"]);

    handle.push_frame(&Frame::Publish {
        flags: Flags::publish(QoS::AtMostOnce),
        topic_id,
        msg_id: 0,
        payload: b"on",
    });

    let message = client.poll().unwrap().expect("message");
    assert_eq!(message.topic.as_str(), "commands/led");
    assert_eq!(&message.payload[..], b"on");
    assert_eq!(message.qos, QoS::AtMostOnce);
}

#[test]
fn duplicate_qos1_publish_delivers_once_but_acks_twice() {
    let (mut client, handle, _clock) = connected();
    let topic_id = client.subscribe("commands/led", QoS::AtLeastOnce).unwrap();

    let frame = Frame::Publish {
        flags: Flags::publish(QoS::AtLeastOnce),
        topic_id,
        msg_id: 321,
        payload: b"toggle",
    };
    handle.push_frame(&frame);
    handle.push_frame(&frame);

    assert!(client.poll().unwrap().is_some());
    assert_eq!(client.poll().unwrap(), None);
    // Both copies were acknowledged; only one reached the application.
    assert_eq!(handle.count_sent(MSG_PUBACK), 2);
    assert_eq!(client.stats().duplicates_suppressed, 1);
}

#[test]
fn unknown_topic_id_is_synthesized_not_registered() {
    let (mut client, handle, _clock) = connected();
    handle.push_frame(&Frame::Publish {
        flags: Flags::publish(QoS::AtMostOnce),
        topic_id: 77,
        msg_id: 0,
        payload: b"?",
    });

    let message = client.poll().unwrap().expect("message");
    assert_eq!(message.topic.as_str(), "unknown/77");

    // No binding was created: publishing to that name registers afresh.
    client.publish("unknown/77", b"x", QoS::AtMostOnce).unwrap();
    assert_eq!(handle.count_sent(MSG_REGISTER), 1);
}

#[test]
fn gateway_register_is_recorded_and_acked() {
    let (mut client, handle, _clock) = connected();
    handle.push_frame(&Frame::Register {
        topic_id: 40,
        msg_id: 7,
        topic_name: "alerts/fire",
    });

    assert_eq!(client.poll().unwrap(), None);
    assert_eq!(handle.count_sent(MSG_REGACK), 1);

    handle.push_frame(&Frame::Publish {
        flags: Flags::publish(QoS::AtMostOnce),
        topic_id: 40,
        msg_id: 0,
        payload: b"!",
    });
    let message = client.poll().unwrap().expect("message");
    assert_eq!(message.topic.as_str(), "alerts/fire");
}

#[test]
fn pingreq_from_gateway_is_answered() {
    let (mut client, handle, _clock) = connected();
    handle.push_frame(&Frame::Pingreq);
    assert_eq!(client.poll().unwrap(), None);
    assert_eq!(
        handle.count_sent(tinysn::network::application::mqttsn::MSG_PINGRESP),
        1
    );
}

#[test]
fn keep_alive_pings_at_half_period() {
    let (mut client, handle, clock) = client();
    client
        .connect(Options {
            client_id: "test-client",
            keep_alive_seconds: 20,
            clean_session: true,
        })
        .unwrap();
    assert_eq!(handle.count_sent(MSG_PINGREQ), 0);

    clock.advance(10_001);
    client.poll().unwrap();
    assert_eq!(handle.count_sent(MSG_PINGREQ), 1);
    // PINGRESP consumed on the next poll refreshes liveness.
    client.poll().unwrap();

    // Not yet at the next half-period: no further ping.
    clock.advance(9_000);
    client.poll().unwrap();
    assert_eq!(handle.count_sent(MSG_PINGREQ), 1);

    clock.advance(1_100);
    client.poll().unwrap();
    assert_eq!(handle.count_sent(MSG_PINGREQ), 2);
}

#[test]
fn missing_pingresp_drops_the_session() {
    let (mut client, handle, clock) = client();
    client
        .connect(Options {
            client_id: "test-client",
            keep_alive_seconds: 20,
            clean_session: true,
        })
        .unwrap();
    handle.state().suppress_pingresp = true;

    clock.advance(41_000);
    // This poll notices two keep-alive periods without a PINGRESP.
    client.poll().unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(client.poll(), Err(Error::NotConnected));
}

#[test]
fn publish_during_ack_wait_is_dispatched_then_delivered() {
    let (mut client, handle, _clock) = connected();
    let topic_id = client.subscribe("pico/retransmit", QoS::AtLeastOnce).unwrap();

    // Script: the gateway slips an unrelated PUBLISH in front of the next
    // PUBACK, as happens when NACKs race acknowledged chunk sends.
    let mut raw = [0u8; 256];
    let len = Frame::Publish {
        flags: Flags::publish(QoS::AtMostOnce),
        topic_id,
        msg_id: 0,
        payload: b"NACK:BLOCK=1,CHUNKS=2",
    }
    .encode(&mut raw)
    .unwrap();
    handle.state().publish_before_puback = Some(raw[..len].to_vec());

    client
        .publish("pico/chunks", b"chunk", QoS::AtLeastOnce)
        .unwrap();

    // The mid-wait message was parked, not lost.
    let message = client.poll().unwrap().expect("deferred message");
    assert_eq!(message.topic.as_str(), "pico/retransmit");
    assert_eq!(&message.payload[..], b"NACK:BLOCK=1,CHUNKS=2");
}

#[test]
fn publish_rejects_oversized_payload() {
    let (mut client, _handle, _clock) = connected();
    let payload = [0u8; 249];
    assert_eq!(
        client.publish("t", &payload, QoS::AtMostOnce),
        Err(Error::PayloadTooLarge)
    );
}

#[test]
fn malformed_inbound_is_counted_and_dropped() {
    let (mut client, handle, _clock) = connected();
    handle.push_raw(&[0x09, 0x0C, 0x00]); // length byte lies
    handle.push_raw(&[0x03, 0x42, 0x00]); // unknown type
    assert_eq!(client.poll().unwrap(), None);
    assert_eq!(client.stats().malformed_frames, 2);
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[test]
fn disconnect_clears_pending_but_keeps_registry() {
    let (mut client, handle, _clock) = connected();
    client.publish("sensors/temp", b"x", QoS::AtMostOnce).unwrap();
    assert_eq!(handle.count_sent(MSG_REGISTER), 1);

    client.disconnect().unwrap();
    assert_eq!(handle.count_sent(MSG_DISCONNECT), 1);
    assert_eq!(
        client.publish("sensors/temp", b"x", QoS::AtMostOnce),
        Err(Error::NotConnected)
    );

    // Reconnect: the registry survived, so no fresh REGISTER is needed.
    client.connect(options()).unwrap();
    client.publish("sensors/temp", b"y", QoS::AtMostOnce).unwrap();
    assert_eq!(handle.count_sent(MSG_REGISTER), 1);
}

#[test]
fn peer_disconnect_surfaces_on_next_operation() {
    let (mut client, handle, _clock) = connected();
    handle.push_frame(&Frame::Disconnect { duration: None });
    // The DISCONNECT is consumed here...
    let _ = client.poll();
    // ...and every later operation reports the dead session.
    assert_eq!(
        client.publish("t", b"x", QoS::AtMostOnce),
        Err(Error::NotConnected)
    );
}
