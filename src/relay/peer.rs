// src/relay/peer.rs

use std::net::SocketAddr;
use std::time::Instant;

/// One member of a session as the relay sees it. The relay never learns
/// names or tokens for registered peers; those live at the host.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    pub addr: SocketAddr,
    pub client_id: u8,
    pub session_id: u32,
    pub last_seen: Instant,
    pub is_host: bool,
}

/// A connection request the relay forwarded to a host and is still waiting
/// to see answered.
#[derive(Debug, Clone)]
pub struct PendingConnection {
    pub addr: SocketAddr,
    pub session_id: u32,
    pub desired_name: String,
    pub requested_at: Instant,
}
