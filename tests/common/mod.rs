// tests/common/mod.rs

// Shared across test binaries; not every binary uses every helper.
#![allow(dead_code, unused_imports)]

use embernet::{
    ClientConfig, Host, HostConfig, Packet, Relay, RelayConfig, StopHandle, Transport,
};
use std::net::{Ipv4Addr, SocketAddr};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub fn relay_config() -> RelayConfig {
    RelayConfig {
        port: 0,
        main_loop_sleep: Duration::from_millis(1),
        socket_timeout: Duration::from_millis(10),
        cleanup_interval: Duration::from_millis(200),
        client_timeout: Duration::from_millis(2000),
        pending_connection_timeout: Duration::from_millis(1000),
        ..RelayConfig::default()
    }
}

pub fn host_config() -> HostConfig {
    HostConfig {
        socket_timeout: Duration::from_millis(10),
        processing_loop_sleep: Duration::from_millis(5),
        ack_timeout: Duration::from_millis(200),
        max_ack_retries: 3,
        reliability_delay: Duration::from_millis(20),
        graceful_shutdown_timeout: Duration::from_millis(200),
        ..HostConfig::default()
    }
}

pub fn client_config() -> ClientConfig {
    ClientConfig {
        socket_timeout: Duration::from_millis(10),
        connection_timeout: Duration::from_millis(2000),
        processing_loop_sleep: Duration::from_millis(5),
        ping_interval: Duration::from_millis(500),
        disconnect_notice_delay: Duration::from_millis(20),
        initial_reconnect_delay: Duration::from_millis(50),
        max_reconnect_delay: Duration::from_millis(400),
        max_reconnect_attempts: 5,
        ..ClientConfig::default()
    }
}

/// Starts a relay on an ephemeral port in its own thread. Returns the
/// loopback address clients should dial.
pub fn spawn_relay(config: RelayConfig) -> (SocketAddr, StopHandle, JoinHandle<()>) {
    let mut relay = Relay::new(config).expect("relay bind");
    let port = relay.local_addr().expect("relay addr").port();
    let stop = relay.stop_handle();
    let handle = std::thread::spawn(move || {
        relay.run().expect("relay run");
    });
    (SocketAddr::from((Ipv4Addr::LOCALHOST, port)), stop, handle)
}

/// Moves an already configured host onto its own thread and runs it. Waits
/// long enough for the host's registration to land at the relay, so a
/// client connecting right afterwards cannot race it.
pub fn spawn_host(mut host: Host) -> (StopHandle, JoinHandle<()>) {
    let stop = host.stop_handle();
    let handle = std::thread::spawn(move || {
        host.run().expect("host run");
    });
    std::thread::sleep(Duration::from_millis(150));
    (stop, handle)
}

/// Receives and decodes packets until `predicate` matches one or the
/// deadline passes.
pub fn recv_matching(
    transport: &mut Transport,
    timeout: Duration,
    mut predicate: impl FnMut(&Packet) -> bool,
) -> Option<(Packet, SocketAddr)> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(Some(datagram)) = transport.receive() {
            if let Ok(packet) = Packet::decode(&datagram.bytes) {
                if predicate(&packet) {
                    return Some((packet, datagram.from));
                }
            }
        }
    }
    None
}

/// Polls `condition` until it holds or the deadline passes.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}
