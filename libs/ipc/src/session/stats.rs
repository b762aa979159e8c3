//! Per-session counters
//!
//! Lock-free atomics written by the session actor and readable from any
//! handle. Peak values let callers verify the single-write invariant and
//! observe queue pressure after the fact.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct SessionStats {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    writes_started: AtomicU64,
    writes_in_flight: AtomicUsize,
    peak_writes_in_flight: AtomicUsize,
    queue_depth: AtomicUsize,
    peak_queue_depth: AtomicUsize,
    empty_messages_dropped: AtomicU64,
}

/// Point-in-time copy of [`SessionStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStatsSnapshot {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub writes_started: u64,
    pub writes_in_flight: usize,
    pub peak_writes_in_flight: usize,
    pub queue_depth: usize,
    pub peak_queue_depth: usize,
    pub empty_messages_dropped: u64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_write_started(&self) {
        self.writes_started.fetch_add(1, Ordering::Release);
        let in_flight = self.writes_in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_writes_in_flight.fetch_max(in_flight, Ordering::AcqRel);
    }

    #[inline]
    pub(crate) fn record_write_finished(&self, bytes: usize, ok: bool) {
        self.writes_in_flight.fetch_sub(1, Ordering::AcqRel);
        if ok {
            self.messages_sent.fetch_add(1, Ordering::Release);
            self.bytes_sent.fetch_add(bytes as u64, Ordering::Release);
        }
    }

    #[inline]
    pub(crate) fn record_receive(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Release);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Release);
    }

    #[inline]
    pub(crate) fn record_queue_depth(&self, depth: usize) {
        self.queue_depth.store(depth, Ordering::Release);
        self.peak_queue_depth.fetch_max(depth, Ordering::AcqRel);
    }

    #[inline]
    pub(crate) fn record_empty_dropped(&self) {
        self.empty_messages_dropped.fetch_add(1, Ordering::Release);
    }

    pub fn snapshot(&self) -> SessionStatsSnapshot {
        SessionStatsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Acquire),
            messages_received: self.messages_received.load(Ordering::Acquire),
            bytes_sent: self.bytes_sent.load(Ordering::Acquire),
            bytes_received: self.bytes_received.load(Ordering::Acquire),
            writes_started: self.writes_started.load(Ordering::Acquire),
            writes_in_flight: self.writes_in_flight.load(Ordering::Acquire),
            peak_writes_in_flight: self.peak_writes_in_flight.load(Ordering::Acquire),
            queue_depth: self.queue_depth.load(Ordering::Acquire),
            peak_queue_depth: self.peak_queue_depth.load(Ordering::Acquire),
            empty_messages_dropped: self.empty_messages_dropped.load(Ordering::Acquire),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peaks_survive_drain() {
        let stats = SessionStats::new();
        stats.record_queue_depth(1);
        stats.record_queue_depth(3);
        stats.record_queue_depth(0);

        stats.record_write_started();
        stats.record_write_finished(10, true);
        stats.record_write_started();
        stats.record_write_finished(5, false);

        let snap = stats.snapshot();
        assert_eq!(snap.queue_depth, 0);
        assert_eq!(snap.peak_queue_depth, 3);
        assert_eq!(snap.writes_started, 2);
        assert_eq!(snap.writes_in_flight, 0);
        assert_eq!(snap.peak_writes_in_flight, 1);
        assert_eq!(snap.messages_sent, 1);
        assert_eq!(snap.bytes_sent, 10);
    }
}
