// src/generic/reliability.rs

use crate::protocol::{GamePacket, Packet, PacketError, Payload};
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};
use tracing::warn;

/// True when `a` is ahead of `b` in the cyclic 16-bit sequence space
/// (standard serial-number distance, ties and wraps resolved at 2^15).
pub fn sequence_newer_than(a: u16, b: u16) -> bool {
    (a.wrapping_sub(b) as i16) > 0
}

/// One payload still waiting for its acknowledgement.
#[derive(Debug, Clone)]
struct PendingReliable {
    encoded: Bytes,
    last_sent: Instant,
    retry_count: u32,
}

/// What a [`ReliabilityManager::tick`] wants the caller to do: re-emit the
/// listed datagrams, and treat the listed sequences as permanently lost.
#[derive(Debug, Default)]
pub struct ReliabilityTick {
    pub resend: Vec<(u16, Bytes)>,
    pub failed: Vec<u16>,
}

/// Opt-in at-least-once delivery for caller-opaque game payloads. Keeps its
/// own sequence namespace, detached from any endpoint's control sequences:
/// the manager wraps payloads, remembers the encoded bytes, and on every
/// tick re-issues whatever has been unacknowledged for too long, until the
/// retry budget runs out.
///
/// The manager owns no socket. `send` returns the bytes for the caller to
/// put on the wire, which keeps the manager usable from any endpoint.
pub struct ReliabilityManager {
    next_sequence: u16,
    pending: BTreeMap<u16, PendingReliable>,
    ack_timeout: Duration,
    max_retries: u32,
}

impl ReliabilityManager {
    pub fn new(ack_timeout: Duration, max_retries: u32) -> Self {
        Self { next_sequence: 0, pending: BTreeMap::new(), ack_timeout, max_retries }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Wraps `payload` in a game packet, records it for retransmission and
    /// returns `(sequence, encoded bytes)` for the caller to emit once.
    pub fn send(
        &mut self,
        packet_type: u8,
        payload: Bytes,
        client_id: u8,
        destination_id: u8,
        now: Instant,
    ) -> Result<(u16, Bytes), PacketError> {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        let packet = Packet::create(
            Payload::Game(GamePacket::create(packet_type, payload)?),
            sequence,
            client_id,
            destination_id,
        );
        let encoded = Bytes::from(packet.encode()?);
        self.pending.insert(
            sequence,
            PendingReliable { encoded: encoded.clone(), last_sent: now, retry_count: 0 },
        );
        Ok((sequence, encoded))
    }

    /// Removes every pending entry named by the acknowledgement.
    pub fn handle_ack(&mut self, acknowledged: &[u16]) {
        for sequence in acknowledged {
            self.pending.remove(sequence);
        }
    }

    /// Scans for overdue entries: due ones with retries left are re-armed
    /// and returned for resending, exhausted ones are dropped and reported.
    pub fn tick(&mut self, now: Instant) -> ReliabilityTick {
        let mut outcome = ReliabilityTick::default();
        let mut exhausted = Vec::new();

        for (&sequence, entry) in self.pending.iter_mut() {
            if now.duration_since(entry.last_sent) < self.ack_timeout {
                continue;
            }
            if entry.retry_count >= self.max_retries {
                exhausted.push(sequence);
                continue;
            }
            entry.last_sent = now;
            entry.retry_count += 1;
            outcome.resend.push((sequence, entry.encoded.clone()));
        }

        for sequence in exhausted {
            warn!(sequence, "reliable packet never acknowledged, giving up");
            self.pending.remove(&sequence);
            outcome.failed.push(sequence);
        }
        outcome
    }
}

/// Receiver-side duplicate suppression: one high-water sequence per source.
/// A packet is fresh only if its sequence is cyclically newer than the
/// watermark, so retransmits of already-delivered payloads are swallowed.
#[derive(Debug, Default)]
pub struct DuplicateFilter {
    last_seen: HashMap<u8, u16>,
}

impl DuplicateFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true (and advances the watermark) when `(source, sequence)`
    /// has not been delivered before.
    pub fn observe(&mut self, source: u8, sequence: u16) -> bool {
        match self.last_seen.get_mut(&source) {
            None => {
                self.last_seen.insert(source, sequence);
                true
            }
            Some(watermark) => {
                if sequence_newer_than(sequence, *watermark) {
                    *watermark = sequence;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn forget(&mut self, source: u8) {
        self.last_seen.remove(&source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(timeout_ms: u64, retries: u32) -> ReliabilityManager {
        ReliabilityManager::new(Duration::from_millis(timeout_ms), retries)
    }

    #[test]
    fn test_send_allocates_sequences_and_tracks() {
        let now = Instant::now();
        let mut reliability = manager(2000, 5);
        let (seq_a, bytes) = reliability.send(0x10, Bytes::from_static(b"a"), 2, 1, now).unwrap();
        let (seq_b, _) = reliability.send(0x10, Bytes::from_static(b"b"), 2, 1, now).unwrap();
        assert_eq!(seq_a, 0);
        assert_eq!(seq_b, 1);
        assert_eq!(reliability.pending_count(), 2);

        let decoded = Packet::decode(&bytes).unwrap();
        assert_eq!(decoded.header.sequence, seq_a);
        assert!(matches!(decoded.payload, Payload::Game(_)));
    }

    #[test]
    fn test_ack_clears_pending() {
        let now = Instant::now();
        let mut reliability = manager(2000, 5);
        let (seq, _) = reliability.send(0x10, Bytes::from_static(b"a"), 2, 1, now).unwrap();
        reliability.handle_ack(&[seq]);
        assert_eq!(reliability.pending_count(), 0);
        let outcome = reliability.tick(now + Duration::from_secs(60));
        assert!(outcome.resend.is_empty());
        assert!(outcome.failed.is_empty());
    }

    #[test]
    fn test_retry_schedule_and_give_up() {
        let t0 = Instant::now();
        let mut reliability = manager(100, 3);
        let (seq, _) = reliability.send(0x10, Bytes::from_static(b"a"), 2, 1, t0).unwrap();

        let mut resends = 0;
        let mut t = t0;
        let mut failed = Vec::new();
        for _ in 0..10 {
            t += Duration::from_millis(150);
            let outcome = reliability.tick(t);
            resends += outcome.resend.len();
            failed.extend(outcome.failed);
        }
        assert_eq!(resends, 3);
        assert_eq!(failed, vec![seq]);
        assert_eq!(reliability.pending_count(), 0);
    }

    #[test]
    fn test_not_due_entries_left_alone() {
        let t0 = Instant::now();
        let mut reliability = manager(2000, 5);
        reliability.send(0x10, Bytes::from_static(b"a"), 2, 1, t0).unwrap();
        let outcome = reliability.tick(t0 + Duration::from_millis(500));
        assert!(outcome.resend.is_empty());
        assert_eq!(reliability.pending_count(), 1);
    }

    #[test]
    fn test_duplicate_filter_basics() {
        let mut filter = DuplicateFilter::new();
        assert!(filter.observe(2, 5));
        assert!(!filter.observe(2, 5));
        assert!(!filter.observe(2, 3));
        assert!(filter.observe(2, 6));
        // Other sources keep their own watermark.
        assert!(filter.observe(3, 1));
    }

    #[test]
    fn test_duplicate_filter_wraparound() {
        let mut filter = DuplicateFilter::new();
        assert!(filter.observe(2, 0xFFFE));
        assert!(filter.observe(2, 0xFFFF));
        // 0 is the successor of 0xFFFF in the cyclic space.
        assert!(filter.observe(2, 0));
        assert!(!filter.observe(2, 0xFFFF));
        assert!(filter.observe(2, 1));
    }

    #[test]
    fn test_sequence_distance() {
        assert!(sequence_newer_than(1, 0));
        assert!(!sequence_newer_than(0, 1));
        assert!(!sequence_newer_than(7, 7));
        assert!(sequence_newer_than(0, 0x8001));
        assert!(!sequence_newer_than(0, 0x7FFF));
    }
}
