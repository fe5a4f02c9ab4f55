// src/transport/mod.rs

//! Blocking UDP transport with a bounded receive timeout. One transport, one
//! endpoint: the socket is exclusively owned and closed exactly once.

use crate::generic::error::TransportError;
use crate::protocol::{Packet, MAX_DATAGRAM_SIZE};
use bytes::Bytes;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::debug;

/// Raw datagram as it came off the socket, before any decoding.
#[derive(Debug, Clone)]
pub struct RawDatagram {
    pub bytes: Bytes,
    pub from: SocketAddr,
}

pub struct Transport {
    socket: UdpSocket,
    recv_buffer: Box<[u8]>,
    max_packet_size: usize,
    closed: bool,
}

impl Transport {
    /// Binds to `addr` and arms the receive timeout. The receive buffer is
    /// sized for a maximal UDP datagram regardless of `max_packet_size`,
    /// which only gates sends.
    pub fn bind(
        addr: SocketAddr,
        read_timeout: Duration,
        max_packet_size: usize,
    ) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr).map_err(|e| {
            if e.kind() == ErrorKind::AddrInUse {
                TransportError::BindFailed(format!("something else is already bound to {addr}"))
            } else {
                TransportError::BindFailed(format!("failed to bind {addr}: {e}"))
            }
        })?;
        socket.set_read_timeout(Some(read_timeout)).map_err(TransportError::Io)?;
        Ok(Self {
            socket,
            recv_buffer: vec![0u8; MAX_DATAGRAM_SIZE].into_boxed_slice(),
            max_packet_size: max_packet_size.min(MAX_DATAGRAM_SIZE),
            closed: false,
        })
    }

    /// Binds to an OS-assigned port on all interfaces.
    pub fn bind_ephemeral(
        read_timeout: Duration,
        max_packet_size: usize,
    ) -> Result<Self, TransportError> {
        Self::bind(
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
            read_timeout,
            max_packet_size,
        )
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::Io)
    }

    pub fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    /// Applies a negotiated send limit, e.g. from a received `SessionConfig`.
    pub fn set_max_packet_size(&mut self, max_packet_size: usize) {
        self.max_packet_size = max_packet_size.min(MAX_DATAGRAM_SIZE);
    }

    /// Receives one datagram, blocking up to the configured timeout.
    /// A quiet socket yields `Ok(None)`, not an error.
    pub fn receive(&mut self) -> Result<Option<RawDatagram>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        match self.socket.recv_from(&mut self.recv_buffer) {
            Ok((len, from)) => {
                Ok(Some(RawDatagram { bytes: Bytes::copy_from_slice(&self.recv_buffer[..len]), from }))
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            // ICMP port-unreachable surfaces as a connection error on some
            // platforms; for UDP that is noise, not a dead socket.
            Err(e) if matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::ConnectionRefused) => {
                debug!(error = %e, "ignoring connection error on UDP receive");
                Ok(None)
            }
            Err(e) => Err(TransportError::RecvFailed(e.to_string())),
        }
    }

    /// Encodes and sends one packet. Encodes larger than the configured
    /// limit are refused before touching the socket.
    pub fn send_packet(&self, packet: &Packet, to: SocketAddr) -> Result<(), TransportError> {
        let bytes = packet.encode()?;
        self.send_raw(&bytes, to)
    }

    /// Sends pre-encoded bytes; the relay forwards datagrams verbatim.
    pub fn send_raw(&self, bytes: &[u8], to: SocketAddr) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        if bytes.len() > self.max_packet_size {
            return Err(TransportError::Oversized { len: bytes.len(), max: self.max_packet_size });
        }
        self.socket
            .send_to(bytes, to)
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }

    /// Marks the transport closed. Idempotent; the socket itself is
    /// released when the transport drops.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("local_addr", &self.socket.local_addr().ok())
            .field("max_packet_size", &self.max_packet_size)
            .field("closed", &self.closed)
            .finish()
    }
}
