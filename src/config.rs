// src/config.rs

//! Validated configuration for the three endpoints. Defaults mirror the
//! protocol's reference deployment; everything is overridable before the
//! endpoint is constructed, nothing is reloadable afterwards.

use crate::generic::rate_limiter::RateLimiterSettings;
use crate::protocol::{MAX_CLIENT_ID, MAX_DATAGRAM_SIZE};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must not be zero")]
    Zero { field: &'static str },
    #[error("{field} is {value}, maximum is {max}")]
    TooLarge { field: &'static str, value: usize, max: usize },
}

fn nonzero_duration(field: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value.is_zero() {
        return Err(ConfigError::Zero { field });
    }
    Ok(())
}

/// Relay tuning. One struct per relay; the relay validates on construction.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub port: u16,
    pub main_loop_sleep: Duration,
    pub socket_timeout: Duration,
    pub cleanup_interval: Duration,
    pub client_timeout: Duration,
    pub pending_connection_timeout: Duration,
    pub max_packets_per_second: u32,
    pub max_clients_per_session: usize,
    pub max_total_connections: usize,
    pub max_pending_connections: usize,
    pub max_rate_limiters: usize,
    pub flood_window: Duration,
    pub flood_threshold: u32,
    pub throttle_penalty_divisor: u32,
    pub token_refill_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: 7777,
            main_loop_sleep: Duration::from_millis(1),
            socket_timeout: Duration::from_millis(100),
            cleanup_interval: Duration::from_millis(5000),
            client_timeout: Duration::from_millis(15000),
            pending_connection_timeout: Duration::from_millis(10000),
            max_packets_per_second: 100,
            max_clients_per_session: 32,
            max_total_connections: 256,
            max_pending_connections: 64,
            max_rate_limiters: 1024,
            flood_window: Duration::from_millis(10000),
            flood_threshold: 10,
            throttle_penalty_divisor: 2,
            token_refill_interval: Duration::from_millis(1000),
        }
    }
}

impl RelayConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        nonzero_duration("main_loop_sleep", self.main_loop_sleep)?;
        nonzero_duration("socket_timeout", self.socket_timeout)?;
        nonzero_duration("cleanup_interval", self.cleanup_interval)?;
        nonzero_duration("client_timeout", self.client_timeout)?;
        nonzero_duration("pending_connection_timeout", self.pending_connection_timeout)?;
        nonzero_duration("flood_window", self.flood_window)?;
        nonzero_duration("token_refill_interval", self.token_refill_interval)?;
        if self.max_packets_per_second == 0 {
            return Err(ConfigError::Zero { field: "max_packets_per_second" });
        }
        if self.throttle_penalty_divisor == 0 {
            return Err(ConfigError::Zero { field: "throttle_penalty_divisor" });
        }
        if self.flood_threshold == 0 {
            return Err(ConfigError::Zero { field: "flood_threshold" });
        }
        if self.max_clients_per_session == 0 {
            return Err(ConfigError::Zero { field: "max_clients_per_session" });
        }
        // Client ids span 2..=254, so a session can never seat more than
        // 253 clients.
        if self.max_clients_per_session >= MAX_CLIENT_ID as usize {
            return Err(ConfigError::TooLarge {
                field: "max_clients_per_session",
                value: self.max_clients_per_session,
                max: MAX_CLIENT_ID as usize - 1,
            });
        }
        if self.max_total_connections == 0 {
            return Err(ConfigError::Zero { field: "max_total_connections" });
        }
        if self.max_pending_connections == 0 {
            return Err(ConfigError::Zero { field: "max_pending_connections" });
        }
        if self.max_rate_limiters == 0 {
            return Err(ConfigError::Zero { field: "max_rate_limiters" });
        }
        Ok(())
    }

    pub(crate) fn rate_limiter_settings(&self) -> RateLimiterSettings {
        RateLimiterSettings {
            capacity: self.max_packets_per_second,
            refill_interval: self.token_refill_interval,
            flood_window: self.flood_window,
            flood_threshold: self.flood_threshold,
            throttle_penalty_divisor: self.throttle_penalty_divisor,
        }
    }
}

/// Host endpoint tuning, including the session parameters pushed to clients
/// in the `SessionConfig` packet.
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub socket_timeout: Duration,
    pub processing_loop_sleep: Duration,
    pub ack_timeout: Duration,
    pub max_ack_retries: u32,
    /// Pause between accepting a client and pushing its session config.
    pub reliability_delay: Duration,
    pub graceful_shutdown_timeout: Duration,
    /// How long a disconnected client's token stays reusable.
    pub session_token_timeout: Duration,
    pub tick_rate: u16,
    pub max_packet_size: u16,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            socket_timeout: Duration::from_millis(100),
            processing_loop_sleep: Duration::from_millis(10),
            ack_timeout: Duration::from_millis(2000),
            max_ack_retries: 5,
            reliability_delay: Duration::from_millis(50),
            graceful_shutdown_timeout: Duration::from_millis(2000),
            session_token_timeout: Duration::from_millis(300000),
            tick_rate: 60,
            max_packet_size: 1024,
        }
    }
}

impl HostConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        nonzero_duration("socket_timeout", self.socket_timeout)?;
        nonzero_duration("processing_loop_sleep", self.processing_loop_sleep)?;
        nonzero_duration("ack_timeout", self.ack_timeout)?;
        nonzero_duration("session_token_timeout", self.session_token_timeout)?;
        if self.max_ack_retries == 0 {
            return Err(ConfigError::Zero { field: "max_ack_retries" });
        }
        if self.tick_rate == 0 {
            return Err(ConfigError::Zero { field: "tick_rate" });
        }
        if self.max_packet_size == 0 {
            return Err(ConfigError::Zero { field: "max_packet_size" });
        }
        if self.max_packet_size as usize > MAX_DATAGRAM_SIZE {
            return Err(ConfigError::TooLarge {
                field: "max_packet_size",
                value: self.max_packet_size as usize,
                max: MAX_DATAGRAM_SIZE,
            });
        }
        Ok(())
    }
}

/// Client endpoint tuning.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub socket_timeout: Duration,
    pub connection_timeout: Duration,
    pub processing_loop_sleep: Duration,
    /// Automatic heartbeat toward the host; disable for manual pinging.
    pub auto_ping: bool,
    pub ping_interval: Duration,
    /// Grace between sending a DisconnectNotice and closing the socket.
    pub disconnect_notice_delay: Duration,
    pub initial_reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_timeout: Duration::from_millis(100),
            connection_timeout: Duration::from_millis(10000),
            processing_loop_sleep: Duration::from_millis(10),
            auto_ping: true,
            ping_interval: Duration::from_millis(5000),
            disconnect_notice_delay: Duration::from_millis(50),
            initial_reconnect_delay: Duration::from_millis(1000),
            max_reconnect_delay: Duration::from_millis(30000),
            max_reconnect_attempts: 5,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        nonzero_duration("socket_timeout", self.socket_timeout)?;
        nonzero_duration("connection_timeout", self.connection_timeout)?;
        nonzero_duration("processing_loop_sleep", self.processing_loop_sleep)?;
        nonzero_duration("ping_interval", self.ping_interval)?;
        nonzero_duration("initial_reconnect_delay", self.initial_reconnect_delay)?;
        nonzero_duration("max_reconnect_delay", self.max_reconnect_delay)?;
        if self.max_reconnect_attempts == 0 {
            return Err(ConfigError::Zero { field: "max_reconnect_attempts" });
        }
        Ok(())
    }
}
