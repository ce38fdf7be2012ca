//! Windowed segment transmit and reassembly bookkeeping.
//!
//! Both sides index segments by their position in the message; sequence
//! numbers on the wire are that position as an octet, so a message is
//! limited to 256 segments.

use std::ops::Range;

pub(crate) const MAX_SEGMENT_COUNT: usize = 256;

/// Splits `data` into chunks of at most `segment_len` octets.
pub(crate) fn split(data: &[u8], segment_len: usize) -> Vec<Vec<u8>> {
    if data.is_empty() {
        return vec![Vec::new()];
    }
    data.chunks(segment_len.max(1)).map(<[u8]>::to_vec).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AckOutcome {
    /// Not for the current window.
    Ignored,
    /// Send the segments in [`SegmentSender::window`].
    SendWindow,
    Complete,
}

/// Sender side: which segments are acknowledged and which go next.
#[derive(Debug, Clone)]
pub(crate) struct SegmentSender {
    segments: Vec<Vec<u8>>,
    window_start: usize,
    window: usize,
    max_window: usize,
    sent_to: usize,
}

impl SegmentSender {
    /// The first window is always the first segment alone; the peer's
    /// Segment-ACK sets the size of the ones after it.
    pub(crate) fn new(segments: Vec<Vec<u8>>, max_window: u8) -> Self {
        Self {
            segments,
            window_start: 0,
            window: 1,
            max_window: usize::from(max_window.max(1)),
            sent_to: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.segments.len()
    }

    pub(crate) fn segment(&self, index: usize) -> &[u8] {
        self.segments.get(index).map_or(&[], Vec::as_slice)
    }

    /// Starts the whole message over from segment zero.
    pub(crate) fn restart(&mut self) {
        self.window_start = 0;
        self.window = 1;
        self.sent_to = 0;
    }

    /// Segments to (re)send now; records them as sent.
    pub(crate) fn window(&mut self) -> Range<usize> {
        let end = (self.window_start + self.window).min(self.segments.len());
        self.sent_to = self.sent_to.max(end);
        self.window_start..end
    }

    /// Applies a positive or negative Segment-ACK naming `sequence` as the
    /// last segment received in order.
    pub(crate) fn ack(&mut self, sequence: u8, actual_window: u8) -> AckOutcome {
        let acked = usize::from(sequence);
        if acked + 1 < self.window_start || acked >= self.sent_to {
            return AckOutcome::Ignored;
        }
        self.window_start = acked + 1;
        self.window = usize::from(actual_window).clamp(1, self.max_window);
        if self.window_start >= self.segments.len() {
            AckOutcome::Complete
        } else {
            AckOutcome::SendWindow
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Received {
    /// In order, mid-window: no acknowledgement yet.
    Pending,
    /// In order and closes a window: acknowledge this sequence number.
    Ack(u8),
    /// Out of order: negative-acknowledge the last good sequence number.
    Nak(u8),
    /// The final segment: acknowledge it and hand up the message.
    Complete(u8),
    /// More segments than we said we accept.
    Overflow,
}

/// Receiver side: reassembles segments arriving in order.
#[derive(Debug, Clone)]
pub(crate) struct SegmentReceiver {
    data: Vec<u8>,
    last_sequence: u8,
    window_first: u8,
    window: u8,
    count: usize,
    limit: usize,
}

impl SegmentReceiver {
    /// Starts from segment zero, which is acknowledged on its own.
    pub(crate) fn start(first: &[u8], proposed_window: u8, local_window: u8, limit: Option<usize>) -> Self {
        Self {
            data: first.to_vec(),
            last_sequence: 0,
            window_first: 1,
            window: proposed_window.min(local_window).clamp(1, 127),
            count: 1,
            limit: limit.unwrap_or(MAX_SEGMENT_COUNT).min(MAX_SEGMENT_COUNT),
        }
    }

    pub(crate) fn actual_window(&self) -> u8 {
        self.window
    }

    pub(crate) fn last_sequence(&self) -> u8 {
        self.last_sequence
    }

    pub(crate) fn segment(&mut self, sequence: u8, more_follows: bool, data: &[u8]) -> Received {
        if sequence != self.last_sequence.wrapping_add(1) {
            return Received::Nak(self.last_sequence);
        }
        if self.count >= self.limit {
            return Received::Overflow;
        }
        self.data.extend_from_slice(data);
        self.last_sequence = sequence;
        self.count += 1;
        if !more_follows {
            return Received::Complete(sequence);
        }
        if sequence.wrapping_sub(self.window_first).wrapping_add(1) >= self.window {
            self.window_first = sequence.wrapping_add(1);
            return Received::Ack(sequence);
        }
        Received::Pending
    }

    pub(crate) fn into_data(self) -> Vec<u8> {
        self.data
    }
}
