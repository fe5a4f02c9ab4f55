// src/client/mod.rs

//! Joining endpoint. Connects to a session through the relay, keeps the
//! heartbeat alive, dispatches inbound packets to callback slots, and can
//! resume a dropped session with its stored token under exponential backoff.

use crate::config::ClientConfig;
use crate::generic::error::ClientError;
use crate::generic::lifecycle::{EndpointState, Lifecycle, StopHandle};
use crate::protocol::{
    Ack, ConnectAccept, ConnectRequest, DisconnectNotice, GamePacket, Packet, PacketHeader,
    PacketTypeRegistry, Payload, Ping, Pong, ReconnectRequest, SessionConfig, DEST_BROADCAST,
    HOST_CLIENT_ID, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION,
};
use crate::transport::Transport;
use crate::utils::monotonic_ms;
use bytes::Bytes;
use std::net::SocketAddr;
use std::time::Instant;
use tracing::{debug, info, warn};

const MAX_PACKETS_PER_TICK: usize = 256;

/// Everything a reconnect needs to resume the session.
#[derive(Debug, Clone, Copy)]
struct SessionIdentity {
    client_id: u8,
    session_id: u32,
    session_token: u64,
}

/// Event slots fired synchronously from [`Client::process`]. Callbacks must
/// not block and cannot reenter the client.
#[derive(Default)]
pub struct ClientEvents {
    pub(crate) on_pong: Option<Box<dyn FnMut(u64, u64) + Send>>,
    pub(crate) on_session_config: Option<Box<dyn FnMut(SessionConfig) + Send>>,
    pub(crate) on_packet_type_registry: Option<Box<dyn FnMut(PacketTypeRegistry) + Send>>,
    pub(crate) on_disconnect_notice: Option<Box<dyn FnMut(u8) + Send>>,
    pub(crate) on_game_packet: Option<Box<dyn FnMut(u8, u8, Bytes) + Send>>,
    pub(crate) on_wrong_destination: Option<Box<dyn FnMut(PacketHeader) + Send>>,
    pub(crate) on_unhandled: Option<Box<dyn FnMut(PacketHeader) + Send>>,
}

pub struct Client {
    config: ClientConfig,
    transport: Transport,
    relay_addr: SocketAddr,
    game_identifier: u32,
    lifecycle: Lifecycle,
    identity: Option<SessionIdentity>,
    next_sequence: u16,
    last_ping: Instant,
    events: ClientEvents,
}

impl Client {
    /// Prepares a client aimed at `relay_addr`. Nothing touches the network
    /// until [`Client::connect`].
    pub fn new(
        relay_addr: SocketAddr,
        game_identifier: u32,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        let transport = Transport::bind_ephemeral(config.socket_timeout, MAX_DATAGRAM_SIZE)?;
        Ok(Self {
            config,
            transport,
            relay_addr,
            game_identifier,
            lifecycle: Lifecycle::new(),
            identity: None,
            next_sequence: 0,
            last_ping: Instant::now(),
            events: ClientEvents::default(),
        })
    }

    pub fn client_id(&self) -> Option<u8> {
        self.identity.map(|identity| identity.client_id)
    }

    pub fn session_id(&self) -> Option<u32> {
        self.identity.map(|identity| identity.session_id)
    }

    pub fn session_token(&self) -> Option<u64> {
        self.identity.map(|identity| identity.session_token)
    }

    pub fn is_connected(&self) -> bool {
        self.identity.is_some() && self.lifecycle.is_running()
    }

    pub fn state(&self) -> EndpointState {
        self.lifecycle.state()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.lifecycle.stop_handle()
    }

    pub fn on_pong(&mut self, f: impl FnMut(u64, u64) + Send + 'static) {
        self.events.on_pong = Some(Box::new(f));
    }

    pub fn on_session_config(&mut self, f: impl FnMut(SessionConfig) + Send + 'static) {
        self.events.on_session_config = Some(Box::new(f));
    }

    pub fn on_packet_type_registry(&mut self, f: impl FnMut(PacketTypeRegistry) + Send + 'static) {
        self.events.on_packet_type_registry = Some(Box::new(f));
    }

    pub fn on_disconnect_notice(&mut self, f: impl FnMut(u8) + Send + 'static) {
        self.events.on_disconnect_notice = Some(Box::new(f));
    }

    pub fn on_game_packet(&mut self, f: impl FnMut(u8, u8, Bytes) + Send + 'static) {
        self.events.on_game_packet = Some(Box::new(f));
    }

    pub fn on_wrong_destination(&mut self, f: impl FnMut(PacketHeader) + Send + 'static) {
        self.events.on_wrong_destination = Some(Box::new(f));
    }

    pub fn on_unhandled(&mut self, f: impl FnMut(PacketHeader) + Send + 'static) {
        self.events.on_unhandled = Some(Box::new(f));
    }

    pub fn on_lifecycle_transition(
        &mut self,
        f: impl FnMut(EndpointState, EndpointState) + Send + 'static,
    ) {
        self.lifecycle.set_observer(f);
    }

    fn next_seq(&mut self) -> u16 {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        sequence
    }

    fn send(&mut self, payload: Payload, destination_id: u8) -> Result<(), ClientError> {
        let client_id = self.identity.map(|identity| identity.client_id).unwrap_or(0);
        let packet = Packet::create(payload, self.next_seq(), client_id, destination_id);
        self.transport.send_packet(&packet, self.relay_addr)?;
        Ok(())
    }

    /// Joins `session_id` as `name`. Blocks until the handshake resolves or
    /// the connection timeout passes.
    pub fn connect(&mut self, session_id: u32, name: &str) -> Result<(), ClientError> {
        self.lifecycle.begin_start()?;

        let request =
            ConnectRequest::create(PROTOCOL_VERSION, session_id, self.game_identifier, name);
        if let Err(e) = self.send(Payload::ConnectRequest(request), HOST_CLIENT_ID) {
            self.fail_connect();
            return Err(e);
        }

        match self.await_accept(session_id) {
            Ok(accept) => {
                self.identity = Some(SessionIdentity {
                    client_id: accept.assigned_client_id,
                    session_id: accept.session_id,
                    session_token: accept.session_token,
                });
                // Confirmation echo: lets the relay bind this socket's
                // address to the id we were just assigned.
                let confirm = ConnectAccept::create(
                    accept.assigned_client_id,
                    accept.session_id,
                    accept.session_token,
                );
                if let Err(e) = self.send(Payload::ConnectAccept(confirm), DEST_BROADCAST) {
                    self.fail_connect();
                    return Err(e);
                }
                self.lifecycle.mark_running();
                self.last_ping = Instant::now();
                info!(
                    client_id = accept.assigned_client_id,
                    session_id = accept.session_id,
                    "connected"
                );
                Ok(())
            }
            Err(e) => {
                self.fail_connect();
                Err(e)
            }
        }
    }

    fn fail_connect(&mut self) {
        self.identity = None;
        self.lifecycle.request_stop();
        self.lifecycle.mark_stopped();
    }

    /// Receive loop of the connect/reconnect handshake: waits for an accept
    /// or deny for our session, ignoring unrelated traffic.
    fn await_accept(&mut self, session_id: u32) -> Result<ConnectAccept, ClientError> {
        let deadline = Instant::now() + self.config.connection_timeout;
        while Instant::now() < deadline {
            let Some(datagram) = self.transport.receive()? else { continue };
            let packet = match Packet::decode(&datagram.bytes) {
                Ok(packet) => packet,
                Err(e) => {
                    debug!(error = %e, "ignoring undecodable packet during handshake");
                    continue;
                }
            };
            match packet.payload {
                Payload::ConnectAccept(accept) if accept.session_id == session_id => {
                    return Ok(accept);
                }
                Payload::ConnectDeny(deny) => {
                    info!(reason = %deny.reason, "connection denied");
                    return Err(ClientError::Denied { reason: deny.reason });
                }
                _ => debug!("ignoring packet during handshake"),
            }
        }
        warn!(session_id, "connection attempt timed out");
        Err(ClientError::ConnectionTimeout)
    }

    /// One tick: drain the socket, dispatch to callbacks, heartbeat.
    pub fn process(&mut self, now: Instant) -> Result<(), ClientError> {
        for _ in 0..MAX_PACKETS_PER_TICK {
            match self.transport.receive()? {
                Some(datagram) => self.handle_datagram(&datagram.bytes, now),
                None => break,
            }
        }

        if self.config.auto_ping
            && self.identity.is_some()
            && now.duration_since(self.last_ping) >= self.config.ping_interval
        {
            self.last_ping = now;
            let ping = Ping::create(monotonic_ms());
            if let Err(e) = self.send(Payload::Ping(ping), HOST_CLIENT_ID) {
                debug!(error = %e, "heartbeat send failed");
            }
        }
        Ok(())
    }

    /// Alternates processing and sleep until a stop is requested, then
    /// performs the disconnect handshake.
    pub fn run(&mut self) -> Result<(), ClientError> {
        while !self.lifecycle.should_stop() {
            if let Err(e) = self.process(Instant::now()) {
                warn!(error = %e, "fatal client error");
                self.lifecycle.mark_failed();
                self.transport.close();
                return Err(e);
            }
            std::thread::sleep(self.config.processing_loop_sleep);
        }
        self.disconnect();
        Ok(())
    }

    fn handle_datagram(&mut self, bytes: &[u8], _now: Instant) {
        let packet = match Packet::decode(bytes) {
            Ok(packet) => packet,
            Err(e) => {
                debug!(error = %e, "client dropping undecodable packet");
                return;
            }
        };
        let header = packet.header;

        if let Some(identity) = self.identity {
            if header.destination_id != DEST_BROADCAST
                && header.destination_id != identity.client_id
            {
                debug!(
                    destination_id = header.destination_id,
                    client_id = identity.client_id,
                    "packet for someone else"
                );
                if let Some(f) = self.events.on_wrong_destination.as_mut() {
                    f(header);
                }
                return;
            }
        }

        match packet.payload {
            Payload::Pong(pong) => {
                let rtt = monotonic_ms().saturating_sub(pong.original_timestamp_ms);
                if let Some(f) = self.events.on_pong.as_mut() {
                    f(rtt, pong.original_timestamp_ms);
                }
            }
            Payload::SessionConfig(config) => {
                // The host retries until this ACK lands.
                let ack = Ack::create(vec![header.sequence]);
                if let Err(e) = self.send(Payload::Ack(ack), HOST_CLIENT_ID) {
                    debug!(error = %e, "failed to ACK SessionConfig");
                }
                self.transport.set_max_packet_size(config.max_packet_size as usize);
                if let Some(f) = self.events.on_session_config.as_mut() {
                    f(config);
                }
            }
            Payload::PacketTypeRegistry(registry) => {
                if let Some(f) = self.events.on_packet_type_registry.as_mut() {
                    f(registry);
                }
            }
            Payload::Ping(ping) => {
                let pong = Pong::create(ping.timestamp_ms);
                if let Err(e) = self.send(Payload::Pong(pong), header.client_id) {
                    debug!(error = %e, "failed to answer Ping");
                }
            }
            Payload::DisconnectNotice(_) => {
                info!(from = header.client_id, "peer disconnected");
                if let Some(f) = self.events.on_disconnect_notice.as_mut() {
                    f(header.client_id);
                }
            }
            Payload::Game(game) => {
                if let Some(f) = self.events.on_game_packet.as_mut() {
                    f(header.client_id, game.packet_type, game.data);
                }
            }
            _ => {
                debug!(packet_type = header.packet_type, "unhandled packet");
                if let Some(f) = self.events.on_unhandled.as_mut() {
                    f(header);
                }
            }
        }
    }

    /// Sends an application payload into the session. `destination_id` 0
    /// broadcasts, 1 addresses the host, anything else a specific client.
    pub fn send_game_packet(
        &mut self,
        packet_type: u8,
        data: impl Into<Bytes>,
        destination_id: u8,
    ) -> Result<(), ClientError> {
        if self.identity.is_none() {
            return Err(ClientError::NotConnected);
        }
        let game = GamePacket::create(packet_type, data)?;
        self.send(Payload::Game(game), destination_id)
    }

    pub fn send_ping(&mut self) -> Result<(), ClientError> {
        if self.identity.is_none() {
            return Err(ClientError::NotConnected);
        }
        self.last_ping = Instant::now();
        self.send(Payload::Ping(Ping::create(monotonic_ms())), HOST_CLIENT_ID)
    }

    /// Resumes the stored session with its token: fresh socket per attempt,
    /// exponential backoff between attempts, immediate give-up on a deny.
    pub fn reconnect(&mut self) -> Result<(), ClientError> {
        let identity = self.identity.ok_or(ClientError::NotConnected)?;

        let mut delay = self.config.initial_reconnect_delay;
        for attempt in 1..=self.config.max_reconnect_attempts {
            if self.lifecycle.state() == EndpointState::Stopping {
                return Err(ClientError::Stopping);
            }
            info!(attempt, client_id = identity.client_id, "reconnect attempt");

            // A fresh transport: the old socket (and possibly its NAT
            // binding) may be long gone.
            self.transport.close();
            self.transport =
                Transport::bind_ephemeral(self.config.socket_timeout, MAX_DATAGRAM_SIZE)?;

            let request = ReconnectRequest::create(
                identity.session_token,
                identity.session_id,
                identity.client_id,
            );
            let packet = Packet::create(
                Payload::ReconnectRequest(request),
                self.next_seq(),
                identity.client_id,
                HOST_CLIENT_ID,
            );
            self.transport.send_packet(&packet, self.relay_addr)?;

            match self.await_accept(identity.session_id) {
                Ok(accept) => {
                    self.identity = Some(SessionIdentity {
                        client_id: accept.assigned_client_id,
                        session_id: accept.session_id,
                        // Rotated token; the one we just used is dead.
                        session_token: accept.session_token,
                    });
                    self.last_ping = Instant::now();
                    self.lifecycle.mark_running();
                    info!(client_id = accept.assigned_client_id, "reconnected");
                    return Ok(());
                }
                Err(ClientError::ConnectionTimeout) => {
                    debug!(attempt, "reconnect attempt timed out");
                    std::thread::sleep(delay);
                    delay = (delay * 2).min(self.config.max_reconnect_delay);
                }
                Err(e) => return Err(e),
            }
        }
        Err(ClientError::ConnectionTimeout)
    }

    /// Clean departure: notify the session, give the relay a moment to
    /// propagate, release the socket. Idempotent.
    pub fn disconnect(&mut self) {
        if matches!(self.lifecycle.state(), EndpointState::Stopped | EndpointState::Failed) {
            return;
        }
        self.lifecycle.request_stop();
        if self.identity.is_some() && !self.transport.is_closed() {
            if let Err(e) =
                self.send(Payload::DisconnectNotice(DisconnectNotice::create()), DEST_BROADCAST)
            {
                debug!(error = %e, "failed to send DisconnectNotice");
            }
            std::thread::sleep(self.config.disconnect_notice_delay);
        }
        self.transport.close();
        self.lifecycle.mark_stopped();
        info!("client stopped");
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.transport.close();
    }
}
