// tests/relay_protocol.rs
//
// Relay admission, routing and protection rules with scripted host/client
// transports. The relay is pumped manually, so every assertion is about
// state the test itself advanced.

mod common;

use common::{recv_matching, relay_config};
use embernet::protocol::MAX_DATAGRAM_SIZE;
use embernet::{
    ConnectAccept, ConnectRequest, DisconnectNotice, GamePacket, MessageIdentifiers as Ids, Packet,
    Payload, Ping, Relay, RelayConfig, Transport,
};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

const SESSION_ID: u32 = 31337;

fn endpoint() -> Transport {
    Transport::bind(
        SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        Duration::from_millis(10),
        MAX_DATAGRAM_SIZE,
    )
    .unwrap()
}

fn relay_with(config: RelayConfig) -> (Relay, SocketAddr) {
    let relay = Relay::new(config).unwrap();
    let port = relay.local_addr().unwrap().port();
    (relay, SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
}

fn pump(relay: &mut Relay, times: usize) {
    for _ in 0..times {
        relay.process(Instant::now()).unwrap();
    }
}

fn register_host(relay: &mut Relay, relay_addr: SocketAddr) -> Transport {
    let host = endpoint();
    let packet = Packet::create(
        Payload::ConnectAccept(ConnectAccept::create(1, SESSION_ID, 0xAA)),
        0,
        1,
        1,
    );
    host.send_packet(&packet, relay_addr).unwrap();
    pump(relay, 2);
    assert_eq!(relay.session_peer_count(SESSION_ID), 1);
    host
}

fn connect_request(name: &str) -> Packet {
    Packet::create(
        Payload::ConnectRequest(ConnectRequest::create(1, SESSION_ID, 7, name)),
        0,
        0,
        1,
    )
}

#[test]
fn admission_flows_through_pending_to_membership() {
    let (mut relay, relay_addr) = relay_with(relay_config());
    let mut host = register_host(&mut relay, relay_addr);

    let mut client = endpoint();
    client.send_packet(&connect_request("Alice"), relay_addr).unwrap();
    pump(&mut relay, 2);

    // The request reaches the host unmodified.
    let (forwarded, _) = recv_matching(&mut host, Duration::from_secs(1), |p| {
        p.header.packet_type == Ids::ID_CONNECT_REQUEST
    })
    .expect("request not forwarded");
    match forwarded.payload {
        Payload::ConnectRequest(request) => assert_eq!(request.desired_name, "Alice"),
        other => panic!("unexpected payload {other:?}"),
    }

    // Host accepts; the relay promotes the pending entry and delivers.
    let accept = Packet::create(
        Payload::ConnectAccept(ConnectAccept::create(2, SESSION_ID, 0xBB)),
        1,
        1,
        0,
    );
    host.send_packet(&accept, relay_addr).unwrap();
    pump(&mut relay, 2);

    let (delivered, _) = recv_matching(&mut client, Duration::from_secs(1), |p| {
        p.header.packet_type == Ids::ID_CONNECT_ACCEPT
    })
    .expect("accept not delivered");
    match delivered.payload {
        Payload::ConnectAccept(accept) => assert_eq!(accept.assigned_client_id, 2),
        other => panic!("unexpected payload {other:?}"),
    }
    assert_eq!(relay.session_peer_count(SESSION_ID), 2);

    // Directed traffic now flows client -> host.
    let game = Packet::create(
        Payload::Game(GamePacket::create(0x20, &b"hello"[..]).unwrap()),
        2,
        2,
        1,
    );
    client.send_packet(&game, relay_addr).unwrap();
    pump(&mut relay, 2);
    assert!(recv_matching(&mut host, Duration::from_secs(1), |p| {
        p.header.packet_type == 0x20
    })
    .is_some());
}

#[test]
fn no_host_means_session_not_found() {
    let (mut relay, relay_addr) = relay_with(relay_config());
    let mut client = endpoint();
    client.send_packet(&connect_request("Alice"), relay_addr).unwrap();
    pump(&mut relay, 2);

    let (deny, _) = recv_matching(&mut client, Duration::from_secs(1), |p| {
        p.header.packet_type == Ids::ID_CONNECT_DENY
    })
    .expect("no deny");
    match deny.payload {
        Payload::ConnectDeny(deny) => assert_eq!(deny.reason, "Session not found"),
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn relay_capacity_denials() {
    let config = RelayConfig {
        max_total_connections: 1,
        ..relay_config()
    };
    let (mut relay, relay_addr) = relay_with(config);
    let _host = register_host(&mut relay, relay_addr);

    // The host consumed the only seat.
    let mut client = endpoint();
    client.send_packet(&connect_request("Alice"), relay_addr).unwrap();
    pump(&mut relay, 2);
    let (deny, _) = recv_matching(&mut client, Duration::from_secs(1), |p| {
        p.header.packet_type == Ids::ID_CONNECT_DENY
    })
    .expect("no deny");
    match deny.payload {
        Payload::ConnectDeny(deny) => assert_eq!(deny.reason, "Relay is full"),
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn pending_queue_has_a_cap() {
    let config = RelayConfig {
        max_pending_connections: 1,
        ..relay_config()
    };
    let (mut relay, relay_addr) = relay_with(config);
    let _host = register_host(&mut relay, relay_addr);

    // First joiner parks in the pending table (the host never answers).
    let first = endpoint();
    first.send_packet(&connect_request("Alice"), relay_addr).unwrap();
    pump(&mut relay, 2);

    let mut second = endpoint();
    second.send_packet(&connect_request("Bob"), relay_addr).unwrap();
    pump(&mut relay, 2);
    let (deny, _) = recv_matching(&mut second, Duration::from_secs(1), |p| {
        p.header.packet_type == Ids::ID_CONNECT_DENY
    })
    .expect("no deny");
    match deny.payload {
        Payload::ConnectDeny(deny) => assert_eq!(deny.reason, "Too many pending connections"),
        other => panic!("unexpected payload {other:?}"),
    }
}

#[test]
fn rate_limiter_drops_floods_before_decode() {
    let config = RelayConfig {
        max_packets_per_second: 5,
        ..relay_config()
    };
    let (mut relay, relay_addr) = relay_with(config);

    let flooder = endpoint();
    for sequence in 0..20u16 {
        let packet = Packet::create(Payload::Ping(Ping::create(1)), sequence, 0, 1);
        flooder.send_packet(&packet, relay_addr).unwrap();
    }
    // Give loopback a moment to land everything, then drain in one sweep.
    std::thread::sleep(Duration::from_millis(50));
    pump(&mut relay, 3);

    let stats = relay.stats();
    assert_eq!(stats.rate_limited, 15);
    // The admitted five came from an unknown peer and were unroutable.
    assert_eq!(stats.unroutable, 5);
}

#[test]
fn bad_magic_is_dropped_and_counted() {
    let (mut relay, relay_addr) = relay_with(relay_config());
    let sender = endpoint();
    sender.send_raw(&[0x00, 0x00, 0x01, 0x0B, 0, 0, 0, 1], relay_addr).unwrap();
    std::thread::sleep(Duration::from_millis(20));
    pump(&mut relay, 2);
    assert_eq!(relay.stats().malformed, 1);
}

#[test]
fn disconnect_notice_is_rebroadcast_and_evicts() {
    let (mut relay, relay_addr) = relay_with(relay_config());
    let mut host = register_host(&mut relay, relay_addr);

    // Bind a client directly with the confirmation-echo path.
    let client = endpoint();
    let bind = Packet::create(
        Payload::ConnectAccept(ConnectAccept::create(2, SESSION_ID, 0xCC)),
        0,
        2,
        0,
    );
    client.send_packet(&bind, relay_addr).unwrap();
    pump(&mut relay, 2);
    assert_eq!(relay.session_peer_count(SESSION_ID), 2);

    let notice = Packet::create(Payload::DisconnectNotice(DisconnectNotice::create()), 1, 2, 0);
    client.send_packet(&notice, relay_addr).unwrap();
    pump(&mut relay, 2);

    assert!(recv_matching(&mut host, Duration::from_secs(1), |p| {
        p.header.packet_type == Ids::ID_DISCONNECT_NOTICE
    })
    .is_some());
    assert_eq!(relay.session_peer_count(SESSION_ID), 1);
}

#[test]
fn silent_clients_are_evicted_by_cleanup() {
    let config = RelayConfig {
        cleanup_interval: Duration::from_millis(50),
        client_timeout: Duration::from_millis(100),
        ..relay_config()
    };
    let (mut relay, relay_addr) = relay_with(config);
    let _host = register_host(&mut relay, relay_addr);

    let client = endpoint();
    let bind = Packet::create(
        Payload::ConnectAccept(ConnectAccept::create(2, SESSION_ID, 0xCC)),
        0,
        2,
        0,
    );
    client.send_packet(&bind, relay_addr).unwrap();
    pump(&mut relay, 2);
    assert_eq!(relay.session_peer_count(SESSION_ID), 2);

    // Say nothing past the timeout; the host is exempt, the client is not.
    let deadline = Instant::now() + Duration::from_millis(400);
    while Instant::now() < deadline && relay.session_peer_count(SESSION_ID) > 1 {
        relay.process(Instant::now()).unwrap();
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(relay.session_peer_count(SESSION_ID), 1);
}
