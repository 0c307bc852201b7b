//! Pending-request queue correlating transport bytes with in-flight requests.
//!
//! The protocol carries no request identifiers, so arrival order is the only
//! correlation: every byte read from the transport belongs to the oldest slot
//! still waiting. Each slot runs a small state machine:
//! - `WaitingForAck`: need 2 bytes
//! - `WaitingForHeader`: need 2 bytes, then re-arms as `WaitingForData`
//!   when the header carries the `0xBB` marker
//! - `WaitingForData`: need exactly the header's declared length
//!
//! Bytes that arrive while no slot is waiting are discarded and counted as
//! desync. A cancelled slot is removed outright, so whatever the sensor still
//! sends for it lands in that discard path instead of the next request.
//! A late reply that only arrives after the next slot is queued cannot be
//! told apart from that slot's own reply.
//!
//! # Example
//!
//! ```
//! use bno055_uart::protocol::PendingQueue;
//!
//! let mut queue = PendingQueue::new();
//! let (_id, mut rx) = queue.enqueue_ack();
//!
//! // Reply split across two transport reads
//! queue.push(&[0xEE]);
//! queue.push(&[0x01]);
//!
//! assert_eq!(rx.try_recv().unwrap(), [0xEE, 0x01]);
//! assert!(queue.is_empty());
//! ```

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use tokio::sync::oneshot;

use super::wire_format::{READ_MARKER, REPLY_HEADER_SIZE};

/// Identifier of a queued slot, unique per queue.
pub type SlotId = u64;

/// Receivers for the two phases of a register read.
#[derive(Debug)]
pub struct ReadReceivers {
    pub header: oneshot::Receiver<[u8; REPLY_HEADER_SIZE]>,
    pub data: oneshot::Receiver<Bytes>,
}

#[derive(Debug)]
enum State {
    WaitingForAck {
        sink: oneshot::Sender<[u8; REPLY_HEADER_SIZE]>,
    },
    WaitingForHeader {
        header_sink: oneshot::Sender<[u8; REPLY_HEADER_SIZE]>,
        data_sink: oneshot::Sender<Bytes>,
    },
    WaitingForData {
        sink: oneshot::Sender<Bytes>,
        expected: usize,
    },
}

impl State {
    fn expected(&self) -> usize {
        match self {
            State::WaitingForAck { .. } | State::WaitingForHeader { .. } => REPLY_HEADER_SIZE,
            State::WaitingForData { expected, .. } => *expected,
        }
    }
}

#[derive(Debug)]
struct Slot {
    id: SlotId,
    buffer: BytesMut,
    state: State,
}

/// FIFO of requests awaiting transport bytes.
#[derive(Debug, Default)]
pub struct PendingQueue {
    slots: VecDeque<Slot>,
    next_id: SlotId,
    /// Bytes discarded since the last `take_discarded`.
    discarded: usize,
    discarded_total: u64,
    closed: bool,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a slot for a 2-byte write acknowledgment.
    pub fn enqueue_ack(&mut self) -> (SlotId, oneshot::Receiver<[u8; REPLY_HEADER_SIZE]>) {
        let (sink, rx) = oneshot::channel();
        let id = self.push_slot(State::WaitingForAck { sink });
        (id, rx)
    }

    /// Queue a slot for a read header followed by its data.
    pub fn enqueue_read(&mut self) -> (SlotId, ReadReceivers) {
        let (header_sink, header) = oneshot::channel();
        let (data_sink, data) = oneshot::channel();
        let id = self.push_slot(State::WaitingForHeader {
            header_sink,
            data_sink,
        });
        (id, ReadReceivers { header, data })
    }

    fn push_slot(&mut self, state: State) -> SlotId {
        self.next_id = self.next_id.wrapping_add(1);
        let id = self.next_id;
        if self.closed {
            // Sinks drop here, the receivers observe a closed channel
            return id;
        }
        self.slots.push_back(Slot {
            id,
            buffer: BytesMut::with_capacity(state.expected()),
            state,
        });
        id
    }

    /// Deliver bytes read from the transport.
    ///
    /// Returns the number of bytes that no slot claimed.
    pub fn push(&mut self, mut data: &[u8]) -> usize {
        while !data.is_empty() {
            let Some(mut slot) = self.slots.pop_front() else {
                break;
            };

            let wanted = slot.state.expected() - slot.buffer.len();
            let take = wanted.min(data.len());
            slot.buffer.extend_from_slice(&data[..take]);
            data = &data[take..];

            if slot.buffer.len() < slot.state.expected() {
                // Still incomplete, keep it at the head
                self.slots.push_front(slot);
                break;
            }

            if let Some(rearmed) = Self::complete(slot) {
                self.slots.push_front(rearmed);
            }
        }

        let discarded = data.len();
        if discarded > 0 {
            self.discarded += discarded;
            self.discarded_total += discarded as u64;
            tracing::warn!(
                "Discarding {} unexpected bytes: {:02X?}",
                discarded,
                data
            );
        }
        discarded
    }

    /// Resolve a full slot. Returns the slot again if it moved on to a
    /// second phase.
    fn complete(slot: Slot) -> Option<Slot> {
        let Slot { id, buffer, state } = slot;

        match state {
            State::WaitingForAck { sink } => {
                tracing::trace!("Slot {} ack {:02X?}", id, &buffer[..]);
                let _ = sink.send([buffer[0], buffer[1]]);
                None
            }
            State::WaitingForHeader {
                header_sink,
                data_sink,
            } => {
                let header = [buffer[0], buffer[1]];
                tracing::trace!("Slot {} header {:02X?}", id, header);
                let _ = header_sink.send(header);

                if header[0] != READ_MARKER {
                    // Rejected read, no data follows
                    return None;
                }

                let expected = header[1] as usize;
                if expected == 0 {
                    let _ = data_sink.send(Bytes::new());
                    return None;
                }

                Some(Slot {
                    id,
                    buffer: BytesMut::with_capacity(expected),
                    state: State::WaitingForData {
                        sink: data_sink,
                        expected,
                    },
                })
            }
            State::WaitingForData { sink, .. } => {
                tracing::trace!("Slot {} data complete ({} bytes)", id, buffer.len());
                let _ = sink.send(buffer.freeze());
                None
            }
        }
    }

    /// Remove a slot (timeout or caller cancellation).
    ///
    /// Returns how many bytes the slot had collected in its current phase,
    /// or `None` if it was already resolved.
    pub fn cancel(&mut self, id: SlotId) -> Option<usize> {
        let pos = self.slots.iter().position(|s| s.id == id)?;
        let slot = self.slots.remove(pos)?;
        tracing::debug!("Cancelled slot {} after {} bytes", id, slot.buffer.len());
        Some(slot.buffer.len())
    }

    #[inline]
    pub fn contains(&self, id: SlotId) -> bool {
        self.slots.iter().any(|s| s.id == id)
    }

    /// Drop every slot and refuse new ones. Waiting receivers, and those
    /// of any slot queued afterwards, observe a closed channel.
    pub fn close(&mut self) {
        if !self.slots.is_empty() {
            tracing::debug!("Failing {} pending slots", self.slots.len());
        }
        self.slots.clear();
        self.closed = true;
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Bytes discarded since the previous call.
    pub fn take_discarded(&mut self) -> usize {
        std::mem::take(&mut self.discarded)
    }

    /// Bytes discarded over the queue's lifetime.
    #[inline]
    pub fn discarded_total(&self) -> u64 {
        self.discarded_total
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Current phase of the head slot, for debugging.
    #[cfg(test)]
    fn head_state_name(&self) -> Option<&'static str> {
        self.slots.front().map(|s| match s.state {
            State::WaitingForAck { .. } => "WaitingForAck",
            State::WaitingForHeader { .. } => "WaitingForHeader",
            State::WaitingForData { .. } => "WaitingForData",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_in_one_push() {
        let mut queue = PendingQueue::new();
        let (_, mut rx) = queue.enqueue_ack();

        assert_eq!(queue.push(&[0xEE, 0x01]), 0);
        assert_eq!(rx.try_recv().unwrap(), [0xEE, 0x01]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_read_header_and_data_back_to_back() {
        let mut queue = PendingQueue::new();
        let (_, mut rx) = queue.enqueue_read();

        assert_eq!(queue.push(&[0xBB, 0x01, 0xA0]), 0);

        assert_eq!(rx.header.try_recv().unwrap(), [0xBB, 0x01]);
        assert_eq!(&rx.data.try_recv().unwrap()[..], &[0xA0]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_read_rearms_for_declared_length() {
        let mut queue = PendingQueue::new();
        let (_, mut rx) = queue.enqueue_read();

        queue.push(&[0xBB, 0x03]);
        assert_eq!(rx.header.try_recv().unwrap(), [0xBB, 0x03]);
        assert_eq!(queue.head_state_name(), Some("WaitingForData"));

        queue.push(&[0x01, 0x02]);
        assert!(rx.data.try_recv().is_err());

        queue.push(&[0x03]);
        assert_eq!(&rx.data.try_recv().unwrap()[..], &[0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_rejected_header_awaits_no_data() {
        let mut queue = PendingQueue::new();
        let (_, mut rx) = queue.enqueue_read();

        // Trailing byte has no owner once the header is rejected
        assert_eq!(queue.push(&[0xFF, 0x01, 0xA0]), 1);

        assert_eq!(rx.header.try_recv().unwrap(), [0xFF, 0x01]);
        assert!(matches!(
            rx.data.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_zero_length_read() {
        let mut queue = PendingQueue::new();
        let (_, mut rx) = queue.enqueue_read();

        queue.push(&[0xBB, 0x00]);
        assert!(rx.data.try_recv().unwrap().is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_fifo_order_single_chunk() {
        let mut queue = PendingQueue::new();
        let (_, mut r1) = queue.enqueue_read();
        let (_, mut r2) = queue.enqueue_read();

        queue.push(&[0xBB, 0x01, 0x11, 0xBB, 0x01, 0x22]);

        assert_eq!(&r1.data.try_recv().unwrap()[..], &[0x11]);
        assert_eq!(&r2.data.try_recv().unwrap()[..], &[0x22]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut queue = PendingQueue::new();
        let (_, mut ack) = queue.enqueue_ack();
        let (_, mut read) = queue.enqueue_read();

        for byte in [0xEE, 0x01, 0xBB, 0x02, 0xCA, 0xFE] {
            assert_eq!(queue.push(&[byte]), 0);
        }

        assert_eq!(ack.try_recv().unwrap(), [0xEE, 0x01]);
        assert_eq!(&read.data.try_recv().unwrap()[..], &[0xCA, 0xFE]);
    }

    #[test]
    fn test_empty_queue_discards() {
        let mut queue = PendingQueue::new();

        assert_eq!(queue.push(&[0xEE, 0x01]), 2);
        assert_eq!(queue.take_discarded(), 2);
        assert_eq!(queue.take_discarded(), 0);
        assert_eq!(queue.discarded_total(), 2);
    }

    #[test]
    fn test_cancel_reports_partial_bytes() {
        let mut queue = PendingQueue::new();
        let (id, _rx) = queue.enqueue_read();

        queue.push(&[0xBB, 0x04, 0x01]);

        assert_eq!(queue.cancel(id), Some(1));
        assert!(!queue.contains(id));
        assert_eq!(queue.cancel(id), None);
    }

    #[test]
    fn test_late_bytes_after_cancel_not_misattributed() {
        let mut queue = PendingQueue::new();
        let (stale, _stale_rx) = queue.enqueue_read();
        queue.cancel(stale);

        // Late reply for the cancelled slot arrives before the next request
        assert_eq!(queue.push(&[0xBB, 0x01, 0x55]), 3);

        let (_, mut rx) = queue.enqueue_read();
        queue.push(&[0xBB, 0x01, 0xA0]);
        assert_eq!(&rx.data.try_recv().unwrap()[..], &[0xA0]);
    }

    #[test]
    fn test_close_fails_waiting_and_later_slots() {
        let mut queue = PendingQueue::new();
        let (_, mut ack) = queue.enqueue_ack();

        queue.close();

        assert!(queue.is_empty());
        assert!(matches!(
            ack.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));

        let (_, mut late) = queue.enqueue_read();
        assert!(queue.is_empty());
        assert!(matches!(
            late.header.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }

    #[test]
    fn test_slot_ids_are_unique() {
        let mut queue = PendingQueue::new();
        let (a, _) = queue.enqueue_ack();
        let (b, _) = queue.enqueue_read();
        assert_ne!(a, b);
        assert_eq!(queue.len(), 2);
    }
}
