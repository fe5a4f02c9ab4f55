// src/generic/rate_limiter.rs

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::debug;

/// Tuning knobs shared by every per-peer bucket in a table.
#[derive(Debug, Clone, Copy)]
pub struct RateLimiterSettings {
    /// Tokens per refill interval; one inbound packet costs one token.
    pub capacity: u32,
    pub refill_interval: Duration,
    pub flood_window: Duration,
    /// Violations within the flood window before throttling kicks in.
    pub flood_threshold: u32,
    /// Capacity divisor while throttled.
    pub throttle_penalty_divisor: u32,
}

/// Token bucket for one peer, with progressive throttling: a peer that keeps
/// pushing past its budget has its capacity cut until the flood window
/// (measured from the first violation) elapses.
#[derive(Debug)]
pub struct RateLimiter {
    settings: RateLimiterSettings,
    tokens: u32,
    last_refill: Instant,
    first_violation: Option<Instant>,
    violations: u32,
    throttled: bool,
}

impl RateLimiter {
    pub fn new(settings: RateLimiterSettings, now: Instant) -> Self {
        Self {
            settings,
            tokens: settings.capacity,
            last_refill: now,
            first_violation: None,
            violations: 0,
            throttled: false,
        }
    }

    fn effective_capacity(&self) -> u32 {
        if self.throttled {
            (self.settings.capacity / self.settings.throttle_penalty_divisor).max(1)
        } else {
            self.settings.capacity
        }
    }

    pub fn is_throttled(&self) -> bool {
        self.throttled
    }

    /// Accounts for one inbound packet. Returns false when the packet must
    /// be dropped.
    pub fn try_consume(&mut self, now: Instant) -> bool {
        if let Some(first) = self.first_violation {
            if now.duration_since(first) >= self.settings.flood_window {
                self.first_violation = None;
                self.violations = 0;
                self.throttled = false;
            }
        }

        let elapsed = now.duration_since(self.last_refill);
        if elapsed >= self.settings.refill_interval {
            let capacity = self.effective_capacity();
            let intervals =
                (elapsed.as_micros() / self.settings.refill_interval.as_micros().max(1)) as u32;
            self.tokens = self.tokens.saturating_add(intervals.saturating_mul(capacity)).min(capacity);
            self.last_refill = now;
        }

        if self.tokens > 0 {
            self.tokens -= 1;
            return true;
        }

        self.violations += 1;
        let first = *self.first_violation.get_or_insert(now);
        if !self.throttled
            && self.violations >= self.settings.flood_threshold
            && now.duration_since(first) < self.settings.flood_window
        {
            self.throttled = true;
            self.tokens = self.tokens.min(self.effective_capacity());
        }
        false
    }
}

/// Per-source limiter table owned by the relay. Bounded: once full, packets
/// from unknown sources are refused without creating an entry, so a spoofed
/// address flood cannot balloon relay memory.
pub struct RateLimiterTable {
    settings: RateLimiterSettings,
    limiters: HashMap<SocketAddr, RateLimiter>,
    max_entries: usize,
}

impl RateLimiterTable {
    pub fn new(settings: RateLimiterSettings, max_entries: usize) -> Self {
        Self { settings, limiters: HashMap::new(), max_entries }
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }

    /// Gate for one inbound datagram. False means drop.
    pub fn check(&mut self, addr: SocketAddr, now: Instant) -> bool {
        if !self.limiters.contains_key(&addr) {
            if self.limiters.len() >= self.max_entries {
                debug!(%addr, "rate limiter table full, dropping packet from new source");
                return false;
            }
            self.limiters.insert(addr, RateLimiter::new(self.settings, now));
        }
        self.limiters
            .get_mut(&addr)
            .map(|limiter| limiter.try_consume(now))
            .unwrap_or(false)
    }

    pub fn remove(&mut self, addr: &SocketAddr) {
        self.limiters.remove(addr);
    }

    /// Drops every limiter whose address fails the predicate; the relay
    /// passes "is this address active or pending" during cleanup.
    pub fn retain(&mut self, mut keep: impl FnMut(&SocketAddr) -> bool) {
        self.limiters.retain(|addr, _| keep(addr));
    }
}
