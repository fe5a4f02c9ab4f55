// tests/routing.rs
//
// Session routing semantics through a live relay: broadcast fan-out,
// directed delivery, and exclusion of the sender.

mod common;

use common::{client_config, host_config, relay_config, spawn_host, spawn_relay, wait_for};
use embernet::{Client, Host};
use std::sync::mpsc;
use std::time::{Duration, Instant};

const SESSION_ID: u32 = 99;
const GAME_ID: u32 = 7;
const MOVE_PACKET: u8 = 0x10;

fn connected_client(
    relay_addr: std::net::SocketAddr,
    name: &str,
) -> (Client, mpsc::Receiver<(u8, u8, Vec<u8>)>) {
    let mut client = Client::new(relay_addr, GAME_ID, client_config()).unwrap();
    let (tx, rx) = mpsc::channel();
    client.on_game_packet(move |from, packet_type, data| {
        tx.send((from, packet_type, data.to_vec())).unwrap();
    });
    client.connect(SESSION_ID, name).unwrap();
    (client, rx)
}

#[test]
fn broadcast_reaches_everyone_but_the_sender() {
    let (relay_addr, relay_stop, relay_thread) = spawn_relay(relay_config());

    let mut host = Host::new(relay_addr, SESSION_ID, host_config()).unwrap();
    let (host_game_tx, host_game_rx) = mpsc::channel();
    host.on_game_packet(move |from, packet_type, data| {
        host_game_tx.send((from, packet_type, data.to_vec())).unwrap();
    });
    let (host_stop, host_thread) = spawn_host(host);

    let (mut alice, alice_rx) = connected_client(relay_addr, "Alice");
    let (mut bob, bob_rx) = connected_client(relay_addr, "Bob");
    let (mut carol, carol_rx) = connected_client(relay_addr, "Carol");
    assert_eq!(alice.client_id(), Some(2));
    assert_eq!(bob.client_id(), Some(3));
    assert_eq!(carol.client_id(), Some(4));

    // Bob (client 3) broadcasts into the session.
    bob.send_game_packet(MOVE_PACKET, &b"jump"[..], 0).unwrap();

    let mut alice_got = None;
    let mut carol_got = None;
    assert!(wait_for(Duration::from_secs(2), || {
        alice.process(Instant::now()).unwrap();
        bob.process(Instant::now()).unwrap();
        carol.process(Instant::now()).unwrap();
        alice_got = alice_got.take().or_else(|| alice_rx.try_recv().ok());
        carol_got = carol_got.take().or_else(|| carol_rx.try_recv().ok());
        alice_got.is_some() && carol_got.is_some()
    }));
    assert_eq!(alice_got.unwrap(), (3, MOVE_PACKET, b"jump".to_vec()));
    assert_eq!(carol_got.unwrap(), (3, MOVE_PACKET, b"jump".to_vec()));

    // The host is a session peer too.
    let host_got = host_game_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(host_got, (3, MOVE_PACKET, b"jump".to_vec()));

    // The sender must not hear its own broadcast.
    assert!(bob_rx.try_recv().is_err());

    for client in [&mut alice, &mut bob, &mut carol] {
        client.disconnect();
    }
    host_stop.request_stop();
    relay_stop.request_stop();
    host_thread.join().unwrap();
    relay_thread.join().unwrap();
}

#[test]
fn directed_packet_reaches_exactly_one_peer() {
    let (relay_addr, relay_stop, relay_thread) = spawn_relay(relay_config());
    let host = Host::new(relay_addr, SESSION_ID, host_config()).unwrap();
    let (host_stop, host_thread) = spawn_host(host);

    let (mut alice, alice_rx) = connected_client(relay_addr, "Alice");
    let (mut bob, bob_rx) = connected_client(relay_addr, "Bob");

    // Alice (2) whispers to Bob (3).
    alice.send_game_packet(MOVE_PACKET, &b"psst"[..], 3).unwrap();

    let mut bob_got = None;
    assert!(wait_for(Duration::from_secs(2), || {
        alice.process(Instant::now()).unwrap();
        bob.process(Instant::now()).unwrap();
        bob_got = bob_got.take().or_else(|| bob_rx.try_recv().ok());
        bob_got.is_some()
    }));
    assert_eq!(bob_got.unwrap(), (2, MOVE_PACKET, b"psst".to_vec()));
    assert!(alice_rx.try_recv().is_err());

    // A destination nobody owns is dropped, not misdelivered.
    alice.send_game_packet(MOVE_PACKET, &b"void"[..], 200).unwrap();
    std::thread::sleep(Duration::from_millis(100));
    alice.process(Instant::now()).unwrap();
    bob.process(Instant::now()).unwrap();
    assert!(bob_rx.try_recv().is_err());
    assert!(alice_rx.try_recv().is_err());

    alice.disconnect();
    bob.disconnect();
    host_stop.request_stop();
    relay_stop.request_stop();
    host_thread.join().unwrap();
    relay_thread.join().unwrap();
}
