// src/relay/mod.rs

//! Payload-agnostic UDP router. The relay maps peers to sessions, admits
//! connections on behalf of hosts, forwards everything else by destination
//! id without ever inspecting game payloads, and throttles abusive sources
//! before they reach the decoder.

mod peer;

pub use peer::{PeerInfo, PendingConnection};

use crate::config::RelayConfig;
use crate::generic::error::RelayError;
use crate::generic::lifecycle::{EndpointState, Lifecycle, StopHandle};
use crate::generic::rate_limiter::RateLimiterTable;
use crate::protocol::{
    ConnectAccept, ConnectDeny, Packet, PacketError, PacketHeader, Payload, ReconnectRequest,
    DEST_BROADCAST, HOST_CLIENT_ID, MAX_DATAGRAM_SIZE,
};
use crate::transport::Transport;
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Packets pulled off the socket in one `process` call before the relay
/// yields to cleanup work.
const MAX_PACKETS_PER_TICK: usize = 500;

/// Drop counters and routing totals, readable while the relay runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayStats {
    pub packets_received: u64,
    pub packets_forwarded: u64,
    pub rate_limited: u64,
    pub malformed: u64,
    pub unroutable: u64,
    pub denied: u64,
}

/// Event slots fired synchronously from `process`. Callbacks must not block
/// and cannot reenter the relay.
#[derive(Default)]
pub struct RelayEvents {
    pub(crate) on_session_created: Option<Box<dyn FnMut(u32) + Send>>,
    pub(crate) on_session_closed: Option<Box<dyn FnMut(u32) + Send>>,
    pub(crate) on_peer_joined: Option<Box<dyn FnMut(u32, u8, SocketAddr) + Send>>,
    pub(crate) on_peer_left: Option<Box<dyn FnMut(u32, u8) + Send>>,
}

pub struct Relay {
    config: RelayConfig,
    transport: Transport,
    lifecycle: Lifecycle,
    sessions: HashMap<u32, Vec<PeerInfo>>,
    hosts: HashMap<u32, SocketAddr>,
    pending: HashMap<SocketAddr, PendingConnection>,
    limiters: RateLimiterTable,
    last_cleanup: Instant,
    next_sequence: u16,
    stats: RelayStats,
    events: RelayEvents,
}

impl Relay {
    /// Binds the relay socket on the configured port.
    pub fn new(config: RelayConfig) -> Result<Self, RelayError> {
        config.validate()?;
        let transport = Transport::bind(
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port)),
            config.socket_timeout,
            MAX_DATAGRAM_SIZE,
        )?;
        let limiters = RateLimiterTable::new(config.rate_limiter_settings(), config.max_rate_limiters);
        Ok(Self {
            config,
            transport,
            lifecycle: Lifecycle::new(),
            sessions: HashMap::new(),
            hosts: HashMap::new(),
            pending: HashMap::new(),
            limiters,
            last_cleanup: Instant::now(),
            next_sequence: 0,
            stats: RelayStats::default(),
            events: RelayEvents::default(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.transport.local_addr()?)
    }

    pub fn stats(&self) -> RelayStats {
        self.stats
    }

    pub fn state(&self) -> EndpointState {
        self.lifecycle.state()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.lifecycle.stop_handle()
    }

    pub fn session_peer_count(&self, session_id: u32) -> usize {
        self.sessions.get(&session_id).map(Vec::len).unwrap_or(0)
    }

    pub fn on_session_created(&mut self, f: impl FnMut(u32) + Send + 'static) {
        self.events.on_session_created = Some(Box::new(f));
    }

    pub fn on_session_closed(&mut self, f: impl FnMut(u32) + Send + 'static) {
        self.events.on_session_closed = Some(Box::new(f));
    }

    pub fn on_peer_joined(&mut self, f: impl FnMut(u32, u8, SocketAddr) + Send + 'static) {
        self.events.on_peer_joined = Some(Box::new(f));
    }

    pub fn on_peer_left(&mut self, f: impl FnMut(u32, u8) + Send + 'static) {
        self.events.on_peer_left = Some(Box::new(f));
    }

    pub fn on_lifecycle_transition(
        &mut self,
        f: impl FnMut(EndpointState, EndpointState) + Send + 'static,
    ) {
        self.lifecycle.set_observer(f);
    }

    /// Runs the main loop until a stop is requested, then shuts down.
    pub fn run(&mut self) -> Result<(), RelayError> {
        self.lifecycle.begin_start()?;
        self.lifecycle.mark_running();
        info!(addr = ?self.transport.local_addr().ok(), "relay running");

        while !self.lifecycle.should_stop() {
            if let Err(e) = self.process(Instant::now()) {
                warn!(error = %e, "fatal relay error");
                self.lifecycle.mark_failed();
                self.transport.close();
                return Err(e);
            }
            std::thread::sleep(self.config.main_loop_sleep);
        }

        self.shutdown();
        Ok(())
    }

    /// One scheduler turn: drain the socket (bounded), then run cleanup if
    /// it is due. Callable directly by embedders that own the loop.
    pub fn process(&mut self, now: Instant) -> Result<(), RelayError> {
        for _ in 0..MAX_PACKETS_PER_TICK {
            match self.transport.receive()? {
                Some(datagram) => self.handle_datagram(&datagram.bytes, datagram.from, now),
                None => break,
            }
        }

        if now.duration_since(self.last_cleanup) >= self.config.cleanup_interval {
            self.cleanup(now);
            self.last_cleanup = now;
        }
        Ok(())
    }

    /// Drops all routing state and closes the socket. Session state does not
    /// survive a relay restart by design.
    pub fn shutdown(&mut self) {
        self.lifecycle.request_stop();
        let session_ids: Vec<u32> = self.sessions.keys().copied().collect();
        for session_id in session_ids {
            self.close_session(session_id);
        }
        self.pending.clear();
        self.limiters.retain(|_| false);
        self.transport.close();
        self.lifecycle.mark_stopped();
        info!("relay stopped");
    }

    fn close_session(&mut self, session_id: u32) {
        self.sessions.remove(&session_id);
        self.hosts.remove(&session_id);
        if let Some(f) = self.events.on_session_closed.as_mut() {
            f(session_id);
        }
    }

    fn handle_datagram(&mut self, bytes: &[u8], from: SocketAddr, now: Instant) {
        self.stats.packets_received += 1;

        // The gate runs before any decoding so a flood costs one hash lookup.
        if !self.limiters.check(from, now) {
            self.stats.rate_limited += 1;
            return;
        }

        let packet = match Packet::decode(bytes) {
            Ok(packet) => packet,
            Err(PacketError::BadMagic(found)) => {
                self.stats.malformed += 1;
                warn!(%from, found, "dropping packet with invalid magic");
                return;
            }
            Err(e) => {
                self.stats.malformed += 1;
                debug!(%from, error = %e, "dropping undecodable packet");
                return;
            }
        };

        self.touch_peer(from, now);

        match &packet.payload {
            Payload::ConnectRequest(_) => self.handle_connect_request(&packet, bytes, from, now),
            Payload::ConnectAccept(accept) => {
                let accept = *accept;
                self.handle_connect_accept(accept, &packet.header, bytes, from, now);
            }
            Payload::ConnectDeny(_) => self.handle_connect_deny(&packet.header, bytes, from),
            Payload::ReconnectRequest(request) => {
                let request = *request;
                self.handle_reconnect_request(request, bytes, from, now);
            }
            Payload::DisconnectNotice(_) => self.handle_disconnect_notice(bytes, from),
            _ => self.route(&packet.header, bytes, from),
        }
    }

    /// Refreshes liveness bookkeeping for a registered source address.
    fn touch_peer(&mut self, addr: SocketAddr, now: Instant) {
        for peers in self.sessions.values_mut() {
            if let Some(peer) = peers.iter_mut().find(|p| p.addr == addr) {
                peer.last_seen = now;
                return;
            }
        }
    }

    fn find_session_for_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.sessions
            .iter()
            .find(|(_, peers)| peers.iter().any(|p| p.addr == addr))
            .map(|(session_id, _)| *session_id)
    }

    fn total_peers(&self) -> usize {
        self.sessions.values().map(Vec::len).sum()
    }

    fn send_deny(&mut self, reason: &str, to: SocketAddr) {
        self.stats.denied += 1;
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        let packet = Packet::create(
            Payload::ConnectDeny(ConnectDeny::create(reason)),
            sequence,
            0,
            DEST_BROADCAST,
        );
        if let Err(e) = self.transport.send_packet(&packet, to) {
            debug!(%to, error = %e, "failed to send ConnectDeny");
        }
    }

    fn forward(&mut self, bytes: &[u8], to: SocketAddr) {
        match self.transport.send_raw(bytes, to) {
            Ok(()) => self.stats.packets_forwarded += 1,
            Err(e) => debug!(%to, error = %e, "failed to forward packet"),
        }
    }

    fn handle_connect_request(
        &mut self,
        packet: &Packet,
        bytes: &[u8],
        from: SocketAddr,
        now: Instant,
    ) {
        let Payload::ConnectRequest(ref request) = packet.payload else { return };

        if self.total_peers() >= self.config.max_total_connections {
            self.send_deny("Relay is full", from);
            return;
        }
        if self.session_peer_count(request.target_session_id) >= self.config.max_clients_per_session
        {
            self.send_deny("Session is full", from);
            return;
        }
        if !self.pending.contains_key(&from)
            && self.pending.len() >= self.config.max_pending_connections
        {
            self.send_deny("Too many pending connections", from);
            return;
        }
        let Some(&host_addr) = self.hosts.get(&request.target_session_id) else {
            debug!(session_id = request.target_session_id, %from, "connect request for unknown session");
            self.send_deny("Session not found", from);
            return;
        };

        info!(
            name = %request.desired_name,
            session_id = request.target_session_id,
            %from,
            "forwarding connect request to host"
        );
        self.pending.insert(
            from,
            PendingConnection {
                addr: from,
                session_id: request.target_session_id,
                desired_name: request.desired_name.clone(),
                requested_at: now,
            },
        );
        self.forward(bytes, host_addr);
    }

    fn handle_connect_accept(
        &mut self,
        accept: ConnectAccept,
        header: &PacketHeader,
        bytes: &[u8],
        from: SocketAddr,
        now: Instant,
    ) {
        let is_host_answer = self.hosts.get(&accept.session_id) == Some(&from);

        if is_host_answer {
            if accept.assigned_client_id == HOST_CLIENT_ID {
                // Host refreshing its own registration.
                self.register_peer(accept.session_id, HOST_CLIENT_ID, from, now, true);
                return;
            }
            if header.destination_id == DEST_BROADCAST {
                // Admission answer: promote the oldest pending entry for the
                // session. Accepts therefore resolve in request order when
                // two clients race to join.
                let oldest = self
                    .pending
                    .values()
                    .filter(|p| p.session_id == accept.session_id)
                    .min_by_key(|p| p.requested_at)
                    .map(|p| p.addr);
                match oldest {
                    Some(client_addr) => {
                        self.pending.remove(&client_addr);
                        self.register_peer(
                            accept.session_id,
                            accept.assigned_client_id,
                            client_addr,
                            now,
                            false,
                        );
                        self.forward(bytes, client_addr);
                    }
                    None => {
                        debug!(session_id = accept.session_id, "accept with no pending connection");
                        self.stats.unroutable += 1;
                    }
                }
            } else {
                // Reconnect answer, addressed to an already-bound client id.
                self.route(header, bytes, from);
            }
            return;
        }

        if accept.assigned_client_id == HOST_CLIENT_ID {
            // A new host introducing itself for its session.
            let created = !self.sessions.contains_key(&accept.session_id);
            self.hosts.insert(accept.session_id, from);
            self.register_peer(accept.session_id, HOST_CLIENT_ID, from, now, true);
            info!(session_id = accept.session_id, %from, "host registered");
            if created {
                if let Some(f) = self.events.on_session_created.as_mut() {
                    f(accept.session_id);
                }
            }
        } else {
            // Confirmation echo from a freshly accepted client: (re)bind its
            // source address to the assigned id.
            self.register_peer(accept.session_id, accept.assigned_client_id, from, now, false);
        }
    }

    /// A broadcast-addressed deny from a host is for whichever pending join
    /// it refused: deliver it to the oldest pending entry and drop that
    /// entry. Denies addressed to a bound client id (refused reconnects)
    /// route like any other packet.
    fn handle_connect_deny(&mut self, header: &PacketHeader, bytes: &[u8], from: SocketAddr) {
        let Some(session_id) = self
            .hosts
            .iter()
            .find(|&(_, &addr)| addr == from)
            .map(|(&session_id, _)| session_id)
        else {
            debug!(%from, "ConnectDeny from non-host source, dropping");
            return;
        };

        if header.destination_id != DEST_BROADCAST {
            self.route(header, bytes, from);
            return;
        }

        let oldest = self
            .pending
            .values()
            .filter(|p| p.session_id == session_id)
            .min_by_key(|p| p.requested_at)
            .map(|p| p.addr);
        match oldest {
            Some(client_addr) => {
                self.pending.remove(&client_addr);
                self.forward(bytes, client_addr);
            }
            None => {
                debug!(session_id, "ConnectDeny with no pending connection");
                self.stats.unroutable += 1;
            }
        }
    }

    fn handle_reconnect_request(
        &mut self,
        request: ReconnectRequest,
        bytes: &[u8],
        from: SocketAddr,
        now: Instant,
    ) {
        let Some(&host_addr) = self.hosts.get(&request.target_session_id) else {
            self.send_deny("Session not found", from);
            return;
        };
        // Rebind the returning client's id to wherever it talks from now;
        // the host's accept will be routed to this address.
        self.register_peer(request.target_session_id, request.previous_client_id, from, now, false);
        self.forward(bytes, host_addr);
    }

    fn handle_disconnect_notice(&mut self, bytes: &[u8], from: SocketAddr) {
        let Some(session_id) = self.find_session_for_addr(from) else {
            debug!(%from, "DisconnectNotice from unknown peer");
            return;
        };

        let targets: Vec<SocketAddr> = self
            .sessions
            .get(&session_id)
            .map(|peers| peers.iter().filter(|p| p.addr != from).map(|p| p.addr).collect())
            .unwrap_or_default();
        for target in targets {
            self.forward(bytes, target);
        }

        self.remove_peer(session_id, from);
        self.pending.remove(&from);
        self.limiters.remove(&from);
    }

    /// Forwards anything that is not admission control: broadcast fans out
    /// to every other session peer, anything else goes to exactly the peer
    /// owning the destination id.
    fn route(&mut self, header: &PacketHeader, bytes: &[u8], from: SocketAddr) {
        let Some(session_id) = self.find_session_for_addr(from) else {
            debug!(%from, packet_type = header.packet_type, "packet from unknown sender, dropping");
            self.stats.unroutable += 1;
            return;
        };

        let targets: Vec<SocketAddr> = {
            let peers = &self.sessions[&session_id];
            if header.destination_id == DEST_BROADCAST {
                peers.iter().filter(|p| p.addr != from).map(|p| p.addr).collect()
            } else {
                match peers.iter().find(|p| p.client_id == header.destination_id) {
                    Some(peer) => vec![peer.addr],
                    None => {
                        debug!(
                            session_id,
                            destination_id = header.destination_id,
                            "no peer for destination, dropping"
                        );
                        self.stats.unroutable += 1;
                        return;
                    }
                }
            }
        };
        for target in targets {
            self.forward(bytes, target);
        }
    }

    /// Inserts or rebinds a peer. A peer address is unique relay-wide: any
    /// previous peer bound to `addr`, and any previous binding of the id
    /// within the session, is replaced.
    fn register_peer(
        &mut self,
        session_id: u32,
        client_id: u8,
        addr: SocketAddr,
        now: Instant,
        is_host: bool,
    ) {
        for peers in self.sessions.values_mut() {
            peers.retain(|p| p.addr != addr);
        }
        let peers = self.sessions.entry(session_id).or_default();
        peers.retain(|p| p.client_id != client_id);
        peers.push(PeerInfo { addr, client_id, session_id, last_seen: now, is_host });
        if !is_host {
            if let Some(f) = self.events.on_peer_joined.as_mut() {
                f(session_id, client_id, addr);
            }
        }
    }

    fn remove_peer(&mut self, session_id: u32, addr: SocketAddr) {
        let mut removed = None;
        if let Some(peers) = self.sessions.get_mut(&session_id) {
            if let Some(index) = peers.iter().position(|p| p.addr == addr) {
                removed = Some(peers.swap_remove(index));
            }
        }
        if let Some(peer) = removed {
            info!(session_id, client_id = peer.client_id, "peer left session");
            if let Some(f) = self.events.on_peer_left.as_mut() {
                f(session_id, peer.client_id);
            }
        }
        if self.session_peer_count(session_id) == 0 && self.sessions.contains_key(&session_id) {
            info!(session_id, "session empty, removing");
            self.close_session(session_id);
        }
    }

    /// Periodic eviction: silent non-host peers, stale pending entries, and
    /// limiter entries for addresses the relay no longer knows.
    fn cleanup(&mut self, now: Instant) {
        let mut timed_out: Vec<(u32, SocketAddr)> = Vec::new();
        for (&session_id, peers) in &self.sessions {
            for peer in peers {
                if !peer.is_host
                    && now.duration_since(peer.last_seen) >= self.config.client_timeout
                {
                    timed_out.push((session_id, peer.addr));
                }
            }
        }
        for (session_id, addr) in timed_out {
            debug!(session_id, %addr, "peer timed out");
            self.remove_peer(session_id, addr);
        }

        let pending_timeout = self.config.pending_connection_timeout;
        self.pending.retain(|_, pending| now.duration_since(pending.requested_at) < pending_timeout);

        let mut known: std::collections::HashSet<SocketAddr> =
            self.pending.keys().copied().collect();
        for peers in self.sessions.values() {
            known.extend(peers.iter().map(|p| p.addr));
        }
        self.limiters.retain(|addr| known.contains(addr));
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.transport.close();
    }
}
