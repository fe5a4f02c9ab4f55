// src/host/mod.rs

//! Authoritative per-session coordinator. The host owns the client table,
//! issues and rotates session tokens, pushes session config with ACK-backed
//! retries, and adjudicates reconnects. It talks to the world exclusively
//! through its relay.

use crate::config::HostConfig;
use crate::generic::error::HostError;
use crate::generic::lifecycle::{EndpointState, Lifecycle, StopHandle};
use crate::protocol::{
    Ack, ConnectAccept, ConnectDeny, ConnectRequest, DisconnectNotice, GamePacket, Packet,
    PacketHeader, PacketTypeEntry, PacketTypeRegistry, Payload, Ping, Pong, ReconnectRequest,
    SessionConfig, DEST_BROADCAST, HOST_CLIENT_ID, MAX_CLIENT_ID, MAX_DATAGRAM_SIZE,
    MAX_REGISTRY_ENTRIES, PROTOCOL_VERSION,
};
use crate::transport::Transport;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{debug, info, warn};

const MAX_PACKETS_PER_TICK: usize = 256;

/// A connected client as the host tracks it.
#[derive(Debug, Clone)]
struct ClientRecord {
    name: String,
    token: u64,
    last_seen: Instant,
}

/// A cleanly departed client whose token is still valid for reconnection.
#[derive(Debug, Clone)]
struct DisconnectedClient {
    name: String,
    token: u64,
    disconnected_at: Instant,
}

/// A control packet awaiting acknowledgement, retried on a timer.
#[derive(Debug, Clone)]
struct PendingAck {
    client_id: u8,
    bytes: Vec<u8>,
    last_sent: Instant,
    retry_count: u32,
}

/// Work scheduled for a later tick; used for the post-accept config push.
#[derive(Debug, Clone, Copy)]
struct DeferredConfigSend {
    client_id: u8,
    due: Instant,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HostStats {
    pub accepted: u64,
    pub denied: u64,
    pub reconnected: u64,
    pub retransmissions: u64,
    pub acks_exhausted: u64,
    pub malformed: u64,
}

/// Event slots, fired synchronously from the processing loop.
#[derive(Default)]
pub struct HostEvents {
    pub(crate) on_client_connected: Option<Box<dyn FnMut(u8, String) + Send>>,
    pub(crate) on_client_disconnected: Option<Box<dyn FnMut(u8, String) + Send>>,
    pub(crate) on_client_reconnected: Option<Box<dyn FnMut(u8, String) + Send>>,
    pub(crate) on_ping: Option<Box<dyn FnMut(u8, u64) + Send>>,
    pub(crate) on_game_packet: Option<Box<dyn FnMut(u8, u8, Bytes) + Send>>,
    pub(crate) on_ack_exhausted: Option<Box<dyn FnMut(u8, u16) + Send>>,
}

/// Session tokens are opaque but never zero, so "no token" stays
/// representable everywhere.
fn fresh_token() -> u64 {
    loop {
        let token = rand::random::<u64>();
        if token != 0 {
            return token;
        }
    }
}

pub struct Host {
    config: HostConfig,
    transport: Transport,
    relay_addr: SocketAddr,
    session_id: u32,
    host_token: u64,
    clients: HashMap<u8, ClientRecord>,
    disconnected: HashMap<u8, DisconnectedClient>,
    next_client_id: u8,
    next_sequence: u16,
    pending_acks: BTreeMap<u16, PendingAck>,
    deferred_config: Vec<DeferredConfigSend>,
    registry: Vec<PacketTypeEntry>,
    lifecycle: Lifecycle,
    events: HostEvents,
    stats: HostStats,
}

impl Host {
    /// Binds an ephemeral socket toward the relay. Nothing is sent until
    /// [`Host::start`].
    pub fn new(
        relay_addr: SocketAddr,
        session_id: u32,
        config: HostConfig,
    ) -> Result<Self, HostError> {
        config.validate()?;
        let transport = Transport::bind_ephemeral(config.socket_timeout, MAX_DATAGRAM_SIZE)?;
        Ok(Self {
            config,
            transport,
            relay_addr,
            session_id,
            host_token: fresh_token(),
            clients: HashMap::new(),
            disconnected: HashMap::new(),
            next_client_id: HOST_CLIENT_ID + 1,
            next_sequence: 0,
            pending_acks: BTreeMap::new(),
            deferred_config: Vec::new(),
            registry: Vec::new(),
            lifecycle: Lifecycle::new(),
            events: HostEvents::default(),
            stats: HostStats::default(),
        })
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn stats(&self) -> HostStats {
        self.stats
    }

    pub fn state(&self) -> EndpointState {
        self.lifecycle.state()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.lifecycle.stop_handle()
    }

    /// Snapshot of the connected-clients table, `client_id -> name`.
    pub fn connected_clients(&self) -> HashMap<u8, String> {
        self.clients.iter().map(|(&id, record)| (id, record.name.clone())).collect()
    }

    pub fn pending_ack_count(&self) -> usize {
        self.pending_acks.len()
    }

    pub fn on_client_connected(&mut self, f: impl FnMut(u8, String) + Send + 'static) {
        self.events.on_client_connected = Some(Box::new(f));
    }

    pub fn on_client_disconnected(&mut self, f: impl FnMut(u8, String) + Send + 'static) {
        self.events.on_client_disconnected = Some(Box::new(f));
    }

    pub fn on_client_reconnected(&mut self, f: impl FnMut(u8, String) + Send + 'static) {
        self.events.on_client_reconnected = Some(Box::new(f));
    }

    pub fn on_ping(&mut self, f: impl FnMut(u8, u64) + Send + 'static) {
        self.events.on_ping = Some(Box::new(f));
    }

    pub fn on_game_packet(&mut self, f: impl FnMut(u8, u8, Bytes) + Send + 'static) {
        self.events.on_game_packet = Some(Box::new(f));
    }

    pub fn on_ack_exhausted(&mut self, f: impl FnMut(u8, u16) + Send + 'static) {
        self.events.on_ack_exhausted = Some(Box::new(f));
    }

    pub fn on_lifecycle_transition(
        &mut self,
        f: impl FnMut(EndpointState, EndpointState) + Send + 'static,
    ) {
        self.lifecycle.set_observer(f);
    }

    /// Advertises an application packet type to future clients. Descriptive
    /// only; the host never dispatches on these entries.
    pub fn register_packet_type(&mut self, entry: PacketTypeEntry) -> Result<(), HostError> {
        if self.registry.len() >= MAX_REGISTRY_ENTRIES {
            return Err(HostError::Packet(crate::protocol::PacketError::OversizedCollection {
                what: "packet type registry",
                len: self.registry.len() + 1,
                max: MAX_REGISTRY_ENTRIES,
            }));
        }
        self.registry.retain(|e| e.packet_id != entry.packet_id);
        self.registry.push(entry);
        Ok(())
    }

    /// Registers this host with the relay by announcing itself as client 1
    /// of its session.
    pub fn start(&mut self) -> Result<(), HostError> {
        self.lifecycle.begin_start()?;
        let accept = ConnectAccept::create(HOST_CLIENT_ID, self.session_id, self.host_token);
        self.send_control(Payload::ConnectAccept(accept), HOST_CLIENT_ID)?;
        self.lifecycle.mark_running();
        info!(session_id = self.session_id, relay = %self.relay_addr, "host registered with relay");
        Ok(())
    }

    /// Starts if needed, then alternates packet processing and sleep until a
    /// stop is requested, finishing with a graceful shutdown.
    pub fn run(&mut self) -> Result<(), HostError> {
        if self.lifecycle.state() == EndpointState::Created {
            self.start()?;
        }
        while !self.lifecycle.should_stop() {
            if let Err(e) = self.process(Instant::now()) {
                warn!(error = %e, "fatal host error");
                self.lifecycle.mark_failed();
                self.transport.close();
                return Err(e);
            }
            std::thread::sleep(self.config.processing_loop_sleep);
        }
        self.shutdown();
        Ok(())
    }

    /// One tick: drain the socket, flush deferred config pushes, retry
    /// unacknowledged packets, expire stale reconnect tokens.
    pub fn process(&mut self, now: Instant) -> Result<(), HostError> {
        for _ in 0..MAX_PACKETS_PER_TICK {
            match self.transport.receive()? {
                Some(datagram) => self.handle_datagram(&datagram.bytes, now),
                None => break,
            }
        }
        self.flush_deferred_config(now);
        self.retry_pending_acks(now);
        let token_timeout = self.config.session_token_timeout;
        self.disconnected
            .retain(|_, record| now.duration_since(record.disconnected_at) <= token_timeout);
        Ok(())
    }

    /// Broadcasts a disconnect, drains outstanding ACKs for a bounded grace
    /// period, then closes the socket. Safe to call twice.
    pub fn shutdown(&mut self) {
        if matches!(self.lifecycle.state(), EndpointState::Stopped | EndpointState::Failed) {
            return;
        }
        self.lifecycle.request_stop();

        let notice = Packet::create(
            Payload::DisconnectNotice(DisconnectNotice::create()),
            self.next_seq(),
            HOST_CLIENT_ID,
            DEST_BROADCAST,
        );
        if let Err(e) = self.transport.send_packet(&notice, self.relay_addr) {
            debug!(error = %e, "failed to send shutdown notice");
        }

        let deadline = Instant::now() + self.config.graceful_shutdown_timeout;
        while !self.pending_acks.is_empty() && Instant::now() < deadline {
            if self.process(Instant::now()).is_err() {
                break;
            }
            std::thread::sleep(self.config.processing_loop_sleep);
        }

        self.transport.close();
        self.lifecycle.mark_stopped();
        info!(session_id = self.session_id, "host stopped");
    }

    /// Sends an application payload to one connected client.
    pub fn send_to_client(
        &mut self,
        client_id: u8,
        packet_type: u8,
        data: impl Into<Bytes>,
    ) -> Result<(), HostError> {
        if !self.clients.contains_key(&client_id) {
            return Err(HostError::SessionNotFound(client_id));
        }
        let game = GamePacket::create(packet_type, data)?;
        self.send_control(Payload::Game(game), client_id)
    }

    /// Sends an application payload to every peer in the session.
    pub fn broadcast(&mut self, packet_type: u8, data: impl Into<Bytes>) -> Result<(), HostError> {
        let game = GamePacket::create(packet_type, data)?;
        self.send_control(Payload::Game(game), DEST_BROADCAST)
    }

    /// Expels a client: targeted DisconnectNotice, record moved to the
    /// reconnectable table.
    pub fn kick(&mut self, client_id: u8) -> Result<(), HostError> {
        if !self.clients.contains_key(&client_id) {
            return Err(HostError::SessionNotFound(client_id));
        }
        self.send_control(Payload::DisconnectNotice(DisconnectNotice::create()), client_id)?;
        self.retire_client(client_id, Instant::now());
        Ok(())
    }

    fn next_seq(&mut self) -> u16 {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        sequence
    }

    fn send_control(&mut self, payload: Payload, destination_id: u8) -> Result<(), HostError> {
        let packet = Packet::create(payload, self.next_seq(), HOST_CLIENT_ID, destination_id);
        self.transport.send_packet(&packet, self.relay_addr)?;
        Ok(())
    }

    fn send_deny(&mut self, reason: String, destination_id: u8) {
        self.stats.denied += 1;
        if let Err(e) = self.send_control(Payload::ConnectDeny(ConnectDeny::create(reason)), destination_id)
        {
            debug!(error = %e, "failed to send ConnectDeny");
        }
    }

    fn handle_datagram(&mut self, bytes: &[u8], now: Instant) {
        let packet = match Packet::decode(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.malformed += 1;
                debug!(error = %e, "host dropping undecodable packet");
                return;
            }
        };

        if let Some(record) = self.clients.get_mut(&packet.header.client_id) {
            record.last_seen = now;
        }

        match packet.payload {
            Payload::ConnectRequest(request) => self.handle_connect_request(request, now),
            Payload::ReconnectRequest(request) => self.handle_reconnect_request(request, now),
            Payload::Ack(ack) => self.handle_ack(ack),
            Payload::Ping(ping) => self.handle_ping(ping, &packet.header),
            Payload::DisconnectNotice(_) => self.handle_disconnect(&packet.header, now),
            Payload::Game(game) => {
                if let Some(f) = self.events.on_game_packet.as_mut() {
                    f(packet.header.client_id, game.packet_type, game.data);
                }
            }
            other => {
                debug!(packet_type = other.packet_type(), "host ignoring unexpected control packet");
            }
        }
    }

    fn handle_connect_request(&mut self, request: ConnectRequest, now: Instant) {
        if request.target_session_id != self.session_id {
            debug!(
                requested = request.target_session_id,
                ours = self.session_id,
                "connect request for a different session, ignoring"
            );
            return;
        }
        if request.version != PROTOCOL_VERSION {
            self.send_deny(
                format!("Unsupported protocol version {}", request.version),
                DEST_BROADCAST,
            );
            return;
        }
        if request.desired_name.is_empty() {
            self.send_deny("Name must not be empty".to_string(), DEST_BROADCAST);
            return;
        }
        if self.clients.values().any(|record| record.name == request.desired_name) {
            info!(name = %request.desired_name, "rejecting duplicate name");
            self.send_deny("Name already in use".to_string(), DEST_BROADCAST);
            return;
        }
        if self.next_client_id > MAX_CLIENT_ID {
            self.send_deny("Session is full".to_string(), DEST_BROADCAST);
            return;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;
        let token = fresh_token();
        self.clients.insert(
            client_id,
            ClientRecord { name: request.desired_name.clone(), token, last_seen: now },
        );

        let accept = ConnectAccept::create(client_id, self.session_id, token);
        // Destination 0: the relay intercepts the accept to promote the
        // pending connection before the client ever owns its id.
        if let Err(e) = self.send_control(Payload::ConnectAccept(accept), DEST_BROADCAST) {
            warn!(client_id, error = %e, "failed to send ConnectAccept");
        }
        self.deferred_config.push(DeferredConfigSend {
            client_id,
            due: now + self.config.reliability_delay,
        });

        self.stats.accepted += 1;
        info!(client_id, name = %request.desired_name, "client accepted");
        if let Some(f) = self.events.on_client_connected.as_mut() {
            f(client_id, request.desired_name);
        }
    }

    fn handle_reconnect_request(&mut self, request: ReconnectRequest, now: Instant) {
        let client_id = request.previous_client_id;
        let Some(record) = self.disconnected.remove(&client_id) else {
            self.send_deny("Session expired or not found".to_string(), client_id);
            return;
        };
        if record.token != request.session_token {
            warn!(client_id, "reconnect with invalid session token");
            // The real owner may still come back; keep the record.
            self.disconnected.insert(client_id, record);
            self.send_deny("Invalid session token".to_string(), client_id);
            return;
        }
        if now.duration_since(record.disconnected_at) > self.config.session_token_timeout {
            self.send_deny("Session timeout exceeded".to_string(), client_id);
            return;
        }

        // Token rotation: the old token dies with this accept.
        let token = fresh_token();
        self.clients.insert(
            client_id,
            ClientRecord { name: record.name.clone(), token, last_seen: now },
        );
        let accept = ConnectAccept::create(client_id, self.session_id, token);
        if let Err(e) = self.send_control(Payload::ConnectAccept(accept), client_id) {
            warn!(client_id, error = %e, "failed to send reconnect ConnectAccept");
        }
        self.stats.reconnected += 1;
        info!(client_id, name = %record.name, "client reconnected");
        if let Some(f) = self.events.on_client_reconnected.as_mut() {
            f(client_id, record.name);
        }
    }

    fn handle_ack(&mut self, ack: Ack) {
        for sequence in ack.acknowledged_sequences {
            if self.pending_acks.remove(&sequence).is_some() {
                debug!(sequence, "pending packet acknowledged");
            }
        }
    }

    fn handle_ping(&mut self, ping: Ping, header: &PacketHeader) {
        let pong = Pong::create(ping.timestamp_ms);
        if let Err(e) = self.send_control(Payload::Pong(pong), header.client_id) {
            debug!(error = %e, "failed to send Pong");
        }
        if let Some(f) = self.events.on_ping.as_mut() {
            f(header.client_id, ping.timestamp_ms);
        }
    }

    fn handle_disconnect(&mut self, header: &PacketHeader, now: Instant) {
        if self.clients.contains_key(&header.client_id) {
            self.retire_client(header.client_id, now);
        }
    }

    /// Moves a connected client into the disconnected table, keeping its
    /// token alive for the reconnect window, and drops its pending work.
    fn retire_client(&mut self, client_id: u8, now: Instant) {
        let Some(record) = self.clients.remove(&client_id) else { return };
        self.pending_acks.retain(|_, pending| pending.client_id != client_id);
        self.deferred_config.retain(|entry| entry.client_id != client_id);
        self.disconnected.insert(
            client_id,
            DisconnectedClient { name: record.name.clone(), token: record.token, disconnected_at: now },
        );
        info!(client_id, name = %record.name, "client disconnected");
        if let Some(f) = self.events.on_client_disconnected.as_mut() {
            f(client_id, record.name);
        }
    }

    /// Sends the session parameters (ACK-tracked) and the current registry
    /// snapshot to clients whose post-accept delay has elapsed.
    fn flush_deferred_config(&mut self, now: Instant) {
        let due: Vec<u8> = self
            .deferred_config
            .iter()
            .filter(|entry| now >= entry.due)
            .map(|entry| entry.client_id)
            .collect();
        if due.is_empty() {
            return;
        }
        self.deferred_config.retain(|entry| now < entry.due);

        for client_id in due {
            if !self.clients.contains_key(&client_id) {
                continue;
            }

            let config = SessionConfig::create(
                PROTOCOL_VERSION,
                self.config.tick_rate,
                self.config.max_packet_size,
            );
            let sequence = self.next_seq();
            let packet =
                Packet::create(Payload::SessionConfig(config), sequence, HOST_CLIENT_ID, client_id);
            match packet.encode() {
                Ok(bytes) => {
                    if let Err(e) = self.transport.send_raw(&bytes, self.relay_addr) {
                        debug!(client_id, error = %e, "failed to send SessionConfig");
                    }
                    self.pending_acks.insert(
                        sequence,
                        PendingAck { client_id, bytes, last_sent: now, retry_count: 0 },
                    );
                }
                Err(e) => warn!(client_id, error = %e, "failed to encode SessionConfig"),
            }

            let registry = PacketTypeRegistry::create(self.registry.clone());
            if let Err(e) = self.send_control(Payload::PacketTypeRegistry(registry), client_id) {
                debug!(client_id, error = %e, "failed to send PacketTypeRegistry");
            }
        }
    }

    /// Timed retransmission of everything awaiting an ACK; entries that
    /// exhaust their retries are abandoned and reported.
    fn retry_pending_acks(&mut self, now: Instant) {
        let mut exhausted: Vec<(u16, u8)> = Vec::new();
        for (&sequence, pending) in self.pending_acks.iter_mut() {
            if now.duration_since(pending.last_sent) < self.config.ack_timeout {
                continue;
            }
            if pending.retry_count >= self.config.max_ack_retries {
                exhausted.push((sequence, pending.client_id));
                continue;
            }
            pending.retry_count += 1;
            pending.last_sent = now;
            self.stats.retransmissions += 1;
            debug!(sequence, client_id = pending.client_id, retry = pending.retry_count, "retransmitting");
            if let Err(e) = self.transport.send_raw(&pending.bytes, self.relay_addr) {
                debug!(error = %e, "retransmission failed");
            }
        }
        for (sequence, client_id) in exhausted {
            warn!(sequence, client_id, "no ACK after retries, giving up on packet");
            self.pending_acks.remove(&sequence);
            self.stats.acks_exhausted += 1;
            if let Some(f) = self.events.on_ack_exhausted.as_mut() {
                f(client_id, sequence);
            }
        }
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.transport.close();
    }
}
