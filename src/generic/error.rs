// src/generic/error.rs

use crate::config::ConfigError;
use crate::generic::lifecycle::EndpointState;
use crate::protocol::PacketError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("socket IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to bind socket: {0}")]
    BindFailed(String),
    #[error("failed to send packet: {0}")]
    SendFailed(String),
    #[error("failed to receive packet: {0}")]
    RecvFailed(String),
    #[error("transport is closed")]
    Closed,
    #[error("packet of {len} bytes exceeds the {max} byte send limit")]
    Oversized { len: usize, max: usize },
    #[error(transparent)]
    Packet(#[from] PacketError),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("endpoint was already started")]
    AlreadyStarted,
    #[error("invalid lifecycle transition {from:?} -> {to:?}")]
    InvalidTransition { from: EndpointState, to: EndpointState },
}

#[derive(Error, Debug)]
pub enum RelayError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

#[derive(Error, Debug)]
pub enum HostError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("no session peer with client id {0}")]
    SessionNotFound(u8),
    #[error(transparent)]
    Packet(#[from] PacketError),
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("connection denied: {reason}")]
    Denied { reason: String },
    #[error("timed out waiting for a reply from the relay")]
    ConnectionTimeout,
    #[error("not connected to a session")]
    NotConnected,
    #[error("endpoint is stopping")]
    Stopping,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Packet(#[from] PacketError),
}
