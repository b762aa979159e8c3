//! Outbound message queue
//!
//! FIFO of frames waiting to be written. The head entry is the one currently
//! being written (or the next to go); it stays in the queue until its write
//! completes. `writing` is the busy flag: a write may only begin while it is
//! clear, so there is never more than one write in flight per session.

use bytes::Bytes;
use std::collections::VecDeque;

/// Conversion from a serializer's output into an owned frame.
///
/// `None` and zero-length buffers both mean "nothing to send".
pub trait IntoFrame {
    fn into_frame(self) -> Option<Bytes>;
}

impl IntoFrame for Bytes {
    fn into_frame(self) -> Option<Bytes> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

impl IntoFrame for Vec<u8> {
    fn into_frame(self) -> Option<Bytes> {
        Bytes::from(self).into_frame()
    }
}

impl IntoFrame for String {
    fn into_frame(self) -> Option<Bytes> {
        Bytes::from(self).into_frame()
    }
}

impl IntoFrame for &'static [u8] {
    fn into_frame(self) -> Option<Bytes> {
        Bytes::from_static(self).into_frame()
    }
}

impl IntoFrame for &'static str {
    fn into_frame(self) -> Option<Bytes> {
        Bytes::from_static(self.as_bytes()).into_frame()
    }
}

impl<T: IntoFrame> IntoFrame for Option<T> {
    fn into_frame(self) -> Option<Bytes> {
        self.and_then(IntoFrame::into_frame)
    }
}

/// One encoded frame owned by the queue until its write completes.
///
/// The payload is handed to the writer when its write begins; the length is
/// kept for accounting once the write completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    payload: Bytes,
    len: usize,
}

impl OutboundMessage {
    /// Run a serializer and keep its output, or `None` for an empty frame
    pub fn from_serializer<F, T>(serializer: F) -> Option<Self>
    where
        F: FnOnce() -> T,
        T: IntoFrame,
    {
        serializer().into_frame().map(|payload| Self {
            len: payload.len(),
            payload,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Pending frames for a single session
#[derive(Debug, Default)]
pub struct OutboundQueue {
    entries: VecDeque<OutboundMessage>,
    writing: bool,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail
    pub fn push(&mut self, message: OutboundMessage) {
        self.entries.push_back(message);
    }

    /// Mark the head as in flight and move its payload out for the writer.
    /// Returns `None` while a write is already in flight or when there is
    /// nothing to send. The head stays queued until [`complete_write`].
    ///
    /// [`complete_write`]: OutboundQueue::complete_write
    pub fn begin_write(&mut self) -> Option<Bytes> {
        if self.writing {
            return None;
        }
        let head = self.entries.front_mut()?;
        self.writing = true;
        Some(std::mem::take(&mut head.payload))
    }

    /// Remove the head after its write succeeded and clear the busy flag
    pub fn complete_write(&mut self) -> Option<OutboundMessage> {
        debug_assert!(self.writing, "write completion without a write in flight");
        self.writing = false;
        self.entries.pop_front()
    }

    /// Drop every pending entry; returns how many were discarded
    pub fn abandon(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        self.writing = false;
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(body: &'static str) -> OutboundMessage {
        OutboundMessage::from_serializer(|| body).unwrap()
    }

    #[test]
    fn test_empty_frames_are_rejected() {
        assert!(OutboundMessage::from_serializer(|| Vec::<u8>::new()).is_none());
        assert!(OutboundMessage::from_serializer(|| "").is_none());
        assert!(OutboundMessage::from_serializer(|| None::<Bytes>).is_none());
        assert!(OutboundMessage::from_serializer(|| Some(Bytes::new())).is_none());
        assert!(OutboundMessage::from_serializer(|| Some(vec![1u8])).is_some());
    }

    #[test]
    fn test_serializer_runs_once() {
        let mut calls = 0;
        let message = OutboundMessage::from_serializer(|| {
            calls += 1;
            String::from("payload")
        })
        .unwrap();
        assert_eq!(calls, 1);
        assert_eq!(message.len(), 7);
    }

    #[test]
    fn test_back_to_back_sends_drain_in_order() {
        let mut queue = OutboundQueue::new();

        queue.push(msg("first"));
        assert_eq!(queue.begin_write().unwrap().as_ref(), b"first");

        // Second send while the first write is in flight
        queue.push(msg("second"));
        assert_eq!(queue.len(), 2);
        assert!(queue.begin_write().is_none());

        assert_eq!(queue.complete_write().unwrap().len(), 5);
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.begin_write().unwrap().as_ref(), b"second");
        assert_eq!(queue.complete_write().unwrap().len(), 6);
        assert_eq!(queue.len(), 0);
        assert!(queue.begin_write().is_none());
    }

    #[test]
    fn test_single_write_in_flight() {
        let mut queue = OutboundQueue::new();
        for body in ["a", "b", "c", "d"] {
            queue.push(msg(body));
        }

        let mut order = Vec::new();
        while let Some(payload) = queue.begin_write() {
            order.push(payload.to_vec());
            assert!(queue.begin_write().is_none());
            queue.complete_write();
        }

        assert_eq!(order, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_payload_moves_to_writer_without_copy() {
        let body = b"owned frame".to_vec();
        let origin = body.as_ptr();

        let mut queue = OutboundQueue::new();
        queue.push(OutboundMessage::from_serializer(|| body).unwrap());

        // The queue keeps no reference, so the writer's Vec can reuse it
        let payload = queue.begin_write().unwrap();
        assert_eq!(payload.as_ptr(), origin);
        let frame = Vec::from(payload);
        assert_eq!(frame, b"owned frame".to_vec());

        // Length survives for completion accounting
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.complete_write().unwrap().len(), 11);
    }

    #[test]
    fn test_abandon_clears_busy_flag() {
        let mut queue = OutboundQueue::new();
        queue.push(msg("x"));
        queue.push(msg("y"));
        queue.begin_write();

        assert_eq!(queue.abandon(), 2);
        assert!(queue.begin_write().is_none());
        queue.push(msg("z"));
        assert_eq!(queue.begin_write().unwrap().as_ref(), b"z");
    }
}
