// tests/reconnect.rs
//
// Token-based session resumption: same client id, rotated token.

mod common;

use common::{client_config, host_config, relay_config, spawn_host, spawn_relay};
use embernet::{Client, Host};
use std::sync::mpsc;
use std::time::Duration;

const SESSION_ID: u32 = 42;
const GAME_ID: u32 = 7;

#[test]
fn clean_disconnect_then_reconnect_rotates_token() {
    let (relay_addr, relay_stop, relay_thread) = spawn_relay(relay_config());

    let mut host = Host::new(relay_addr, SESSION_ID, host_config()).unwrap();
    let (reconnect_tx, reconnect_rx) = mpsc::channel();
    host.on_client_reconnected(move |client_id, name| {
        reconnect_tx.send((client_id, name)).unwrap();
    });
    let (host_stop, host_thread) = spawn_host(host);

    let mut client = Client::new(relay_addr, GAME_ID, client_config()).unwrap();
    client.connect(SESSION_ID, "Alice").unwrap();
    let original_id = client.client_id().unwrap();
    let original_token = client.session_token().unwrap();
    assert_eq!(original_id, 2);

    client.disconnect();

    client.reconnect().unwrap();
    assert_eq!(client.client_id(), Some(original_id));
    let new_token = client.session_token().unwrap();
    assert_ne!(new_token, original_token);
    assert_ne!(new_token, 0);

    let (client_id, name) = reconnect_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!((client_id, name.as_str()), (2, "Alice"));

    client.disconnect();
    host_stop.request_stop();
    relay_stop.request_stop();
    host_thread.join().unwrap();
    relay_thread.join().unwrap();
}

#[test]
fn reconnect_to_dead_relay_times_out_with_backoff() {
    let (relay_addr, relay_stop, relay_thread) = spawn_relay(relay_config());
    let host = Host::new(relay_addr, SESSION_ID, host_config()).unwrap();
    let (host_stop, host_thread) = spawn_host(host);

    let mut config = client_config();
    config.connection_timeout = Duration::from_millis(100);
    config.max_reconnect_attempts = 2;
    let mut client = Client::new(relay_addr, GAME_ID, config).unwrap();
    client.connect(SESSION_ID, "Alice").unwrap();
    client.disconnect();

    // Tear the world down; every reconnect attempt must now time out.
    host_stop.request_stop();
    relay_stop.request_stop();
    host_thread.join().unwrap();
    relay_thread.join().unwrap();

    let start = std::time::Instant::now();
    assert!(client.reconnect().is_err());
    // Two attempts of 100ms plus backoff sleeps of 50ms and 100ms.
    assert!(start.elapsed() >= Duration::from_millis(250));
}
