// src/lib.rs

//! EmberNet: a UDP session relay protocol for multiplayer games.
//!
//! Three endpoints speak one little-endian wire format: a payload-agnostic
//! [`Relay`] routes datagrams between sessions, a [`Host`] coordinates each
//! session (client ids, session tokens, ACK-backed config delivery,
//! reconnects), and a [`Client`] joins through the relay and heartbeats the
//! host. An opt-in [`ReliabilityManager`] adds at-least-once delivery for
//! application payloads, and the relay shields itself with per-peer token
//! buckets.
//!
//! Transport security is out of scope: datagrams are plaintext, and session
//! tokens only guard against client-id hijacking by strangers, not against
//! an on-path attacker.

pub mod client;
pub mod config;
pub mod generic;
pub mod host;
pub mod protocol;
pub mod relay;
pub mod transport;
pub mod utils;

pub use client::{Client, ClientEvents};
pub use config::{ClientConfig, ConfigError, HostConfig, RelayConfig};
pub use generic::{
    ClientError, DuplicateFilter, EndpointState, HostError, LifecycleError, RateLimiter,
    RateLimiterSettings, RelayError, ReliabilityManager, ReliabilityTick, StopHandle,
    TransportError,
};
pub use host::{Host, HostEvents, HostStats};
pub use protocol::{
    Ack, ConnectAccept, ConnectDeny, ConnectRequest, DisconnectNotice, GamePacket,
    MessageIdentifiers, Packet, PacketError, PacketHeader, PacketTypeEntry, PacketTypeRegistry,
    Payload, Ping, Pong, ReconnectRequest, SessionConfig,
};
pub use relay::{Relay, RelayEvents, RelayStats};
pub use transport::{RawDatagram, Transport};
