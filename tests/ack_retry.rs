// tests/ack_retry.rs
//
// Drives a Host directly with a scripted peer standing in for the relay:
// the peer never ACKs, so the host must retransmit SessionConfig on its
// timer and eventually give up.

mod common;

use common::{host_config, recv_matching};
use embernet::protocol::MAX_DATAGRAM_SIZE;
use embernet::{Ack, ConnectRequest, Host, MessageIdentifiers as Ids, Packet, Payload, Transport};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

const SESSION_ID: u32 = 555;

fn fake_relay() -> (Transport, SocketAddr) {
    let transport = Transport::bind(
        SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        Duration::from_millis(10),
        MAX_DATAGRAM_SIZE,
    )
    .unwrap();
    let port = transport.local_addr().unwrap().port();
    (transport, SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
}

/// Waits for the host's registration accept and returns the host's socket
/// address, learned from the datagram source.
fn await_registration(relay: &mut Transport) -> SocketAddr {
    let (registration, host_addr) = recv_matching(relay, Duration::from_secs(1), |p| {
        p.header.packet_type == Ids::ID_CONNECT_ACCEPT
    })
    .expect("no host registration");
    match registration.payload {
        Payload::ConnectAccept(accept) => {
            assert_eq!(accept.assigned_client_id, 1);
            assert_eq!(accept.session_id, SESSION_ID);
            assert_ne!(accept.session_token, 0);
        }
        other => panic!("unexpected payload {other:?}"),
    }
    host_addr
}

/// Pumps the host for `duration`, counting SessionConfig datagrams arriving
/// at the fake relay.
fn pump_counting_configs(host: &mut Host, relay: &mut Transport, duration: Duration) -> usize {
    let deadline = Instant::now() + duration;
    let mut configs = 0;
    while Instant::now() < deadline {
        host.process(Instant::now()).unwrap();
        while let Ok(Some(datagram)) = relay.receive() {
            if let Ok(packet) = Packet::decode(&datagram.bytes) {
                if packet.header.packet_type == Ids::ID_SESSION_CONFIG {
                    configs += 1;
                }
            }
        }
    }
    configs
}

#[test]
fn session_config_is_retried_then_abandoned() {
    let (mut relay, relay_addr) = fake_relay();
    let mut host = Host::new(relay_addr, SESSION_ID, host_config()).unwrap();
    let (exhausted_tx, exhausted_rx) = std::sync::mpsc::channel();
    host.on_ack_exhausted(move |client_id, sequence| {
        exhausted_tx.send((client_id, sequence)).unwrap();
    });
    host.start().unwrap();
    let host_addr = await_registration(&mut relay);

    // Admit one client that will never ACK anything.
    let request = Packet::create(
        Payload::ConnectRequest(ConnectRequest::create(1, SESSION_ID, 7, "Mute")),
        0,
        0,
        1,
    );
    relay.send_packet(&request, host_addr).unwrap();

    // ack_timeout 200ms, max retries 3: initial send plus exactly three
    // retransmissions, all comfortably inside a second and a half.
    let configs = pump_counting_configs(&mut host, &mut relay, Duration::from_millis(1500));
    assert_eq!(configs, 4);
    assert_eq!(host.pending_ack_count(), 0);

    let (client_id, _sequence) = exhausted_rx.try_recv().expect("no exhaustion event");
    assert_eq!(client_id, 2);

    host.shutdown();
}

#[test]
fn acked_session_config_is_not_retried() {
    let (mut relay, relay_addr) = fake_relay();
    let mut host = Host::new(relay_addr, SESSION_ID, host_config()).unwrap();
    host.start().unwrap();
    let host_addr = await_registration(&mut relay);

    let request = Packet::create(
        Payload::ConnectRequest(ConnectRequest::create(1, SESSION_ID, 7, "Polite")),
        0,
        0,
        1,
    );
    relay.send_packet(&request, host_addr).unwrap();

    // Wait for the config, then acknowledge it like a well-behaved client.
    let deadline = Instant::now() + Duration::from_secs(1);
    let mut config_seq = None;
    while Instant::now() < deadline && config_seq.is_none() {
        host.process(Instant::now()).unwrap();
        if let Ok(Some(datagram)) = relay.receive() {
            if let Ok(packet) = Packet::decode(&datagram.bytes) {
                if packet.header.packet_type == Ids::ID_SESSION_CONFIG {
                    config_seq = Some(packet.header.sequence);
                }
            }
        }
    }
    let config_seq = config_seq.expect("no SessionConfig");

    let ack = Packet::create(Payload::Ack(Ack::create(vec![config_seq])), 1, 2, 1);
    relay.send_packet(&ack, host_addr).unwrap();

    let configs = pump_counting_configs(&mut host, &mut relay, Duration::from_millis(700));
    assert_eq!(configs, 0);
    assert_eq!(host.pending_ack_count(), 0);

    host.shutdown();
}
