//! The services a connection consumes, and simple implementations of them.
//!
//! A [`Connection`] does not own its buffers, its timers or the link. These are reached through
//! the capability traits of this module, bundled into an [`Io`] for each call. The provided
//! implementations are sufficient for a traffic generator that keeps everything in memory:
//! [`SendQueue`] and [`RecvQueue`] are ring buffers, [`Outbox`] records every segment and
//! [`Events`] records lifecycle notifications.
//!
//! [`Connection`]: ../struct.Connection.html
//! [`Io`]: ../struct.Io.html
//! [`SendQueue`]: struct.SendQueue.html
//! [`RecvQueue`]: struct.RecvQueue.html
//! [`Outbox`]: struct.Outbox.html
//! [`Events`]: struct.Events.html
use alloc::collections::VecDeque;
use alloc::vec::Vec;

use crate::storage::{Reassembled, SegmentQueue};
use crate::time::Instant;
use crate::wire::{EcnCodepoint, TcpRepr, TcpSeqNumber};

use super::error::{DropReason, TransmitError};
use super::timer::TimerService;

/// A contiguous range of buffered bytes, possibly split by the end of a ring buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Region<'a> {
    /// The first part of the range.
    pub head: &'a [u8],
    /// The part continuing after `head`.
    pub tail: &'a [u8],
}

/// A segment ready for transmission.
#[derive(Clone, Copy, Debug)]
pub struct OutSegment<'a> {
    /// The complete header, checksum excluded.
    pub header: TcpRepr,
    /// The payload.
    pub payload: Region<'a>,
    /// The ECN codepoint to put into the IP header.
    pub ecn: EcnCodepoint,
}

/// A segment handed to the input engine.
#[derive(Clone, Copy, Debug)]
pub struct InSegment<'a> {
    /// The parsed header.
    pub header: TcpRepr,
    /// The payload following the header.
    pub payload: &'a [u8],
    /// The ECN codepoint of the enclosing IP header.
    pub ecn: EcnCodepoint,
}

/// Transmits finished segments.
pub trait SegmentSink {
    /// Frame and send one segment.
    fn send(&mut self, segment: OutSegment<'_>) -> Result<(), TransmitError>;
}

/// The byte stream waiting to be sent or acknowledged.
///
/// Offset 0 always corresponds to `snd_una`. Bytes are only removed by `drop_acked`.
pub trait SendBuffer {
    /// The number of bytes in the buffer, sent or not.
    fn queued_bytes(&self) -> usize;

    /// The number of bytes that can still be appended.
    fn available_space(&self) -> usize;

    /// Append data, returning how many bytes were accepted.
    fn append(&mut self, data: &[u8]) -> usize;

    /// Remove acknowledged bytes from the front.
    fn drop_acked(&mut self, bytes: usize);

    /// Access `len` bytes starting at `offset`.
    ///
    /// The region is shorter when fewer bytes are buffered.
    fn fetch_region(&self, offset: usize, len: usize) -> Region<'_>;
}

/// The in-order byte stream delivered to the user.
pub trait RecvBuffer {
    /// The number of bytes that can still be appended.
    fn available_space(&self) -> usize;

    /// The capacity of the buffer, also called its high-water mark.
    fn capacity(&self) -> usize;

    /// Append in-order data, returning how many bytes were accepted.
    fn append(&mut self, data: &[u8]) -> usize;
}

/// Orders data that arrived out of sequence.
pub trait Reassembly {
    /// Queue a segment and deliver everything that became contiguous with `rcv_nxt`.
    ///
    /// Returns the number of bytes appended to `recv` and if a FIN was reached.
    fn insert(
        &mut self,
        rcv_nxt: TcpSeqNumber,
        seq: TcpSeqNumber,
        data: &[u8],
        fin: bool,
        recv: &mut dyn RecvBuffer,
    ) -> Reassembled;

    /// Deliver queued segments that are now contiguous with `rcv_nxt`.
    fn flush(&mut self, rcv_nxt: TcpSeqNumber, recv: &mut dyn RecvBuffer) -> Reassembled;

    /// Check if no data is queued.
    fn is_empty(&self) -> bool;

    /// Drop all queued data.
    fn clear(&mut self);
}

/// Receives notifications about the lifetime of a connection.
pub trait Lifecycle {
    /// The connection reached `CLOSED`, with the reason if it was dropped.
    fn on_state_closed(&mut self, reason: Option<DropReason>);

    /// A listening connection accepted a SYN and answered it.
    fn on_half_open_accept(&mut self, syn: &TcpRepr);
}

/// All services of one call into a connection.
pub struct Io<'a> {
    /// The current time.
    pub now: Instant,
    /// Arms and cancels the timers of the connection.
    pub timers: &'a mut dyn TimerService,
    /// Takes outgoing segments.
    pub sink: &'a mut dyn SegmentSink,
    /// Data to send.
    pub send: &'a mut dyn SendBuffer,
    /// Received data.
    pub recv: &'a mut dyn RecvBuffer,
    /// Out-of-order data.
    pub reassembly: &'a mut dyn Reassembly,
    /// Lifecycle notifications.
    pub events: &'a mut dyn Lifecycle,
}

/// A bounded ring buffer for data to send.
#[derive(Clone, Debug, Default)]
pub struct SendQueue {
    data: VecDeque<u8>,
    capacity: usize,
}

/// A bounded ring buffer for received data.
#[derive(Clone, Debug, Default)]
pub struct RecvQueue {
    data: VecDeque<u8>,
    capacity: usize,
}

/// A sink that keeps every segment.
///
/// Segments are copied out so they can be delivered to another connection later, possibly out
/// of order or not at all.
#[derive(Clone, Debug, Default)]
pub struct Outbox {
    /// The segments in order of transmission.
    pub segments: VecDeque<Transmitted>,
    /// Fail the next transmissions with this error instead of recording them.
    pub fail_with: Option<TransmitError>,
}

/// A segment recorded by an `Outbox`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transmitted {
    /// The header as sent.
    pub header: TcpRepr,
    /// A copy of the payload.
    pub payload: Vec<u8>,
    /// The ECN codepoint of the IP header.
    pub ecn: EcnCodepoint,
}

/// Records lifecycle notifications.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Events {
    /// Set when the connection was closed, holding the reason of the drop if any.
    pub closed: Option<Option<DropReason>>,
    /// The number of SYNs accepted by a listening connection.
    pub accepted: usize,
}

impl Region<'_> {
    /// The number of bytes in the region.
    pub fn len(&self) -> usize {
        self.head.len() + self.tail.len()
    }

    /// Check if the region is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the region into the front of `buffer`.
    ///
    /// # Panics
    /// When `buffer` is shorter than the region.
    pub fn copy_to(&self, buffer: &mut [u8]) {
        let (head, tail) = buffer[..self.len()].split_at_mut(self.head.len());
        head.copy_from_slice(self.head);
        tail.copy_from_slice(self.tail);
    }
}

impl SendQueue {
    /// A queue holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        SendQueue {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }
}

impl RecvQueue {
    /// A queue holding at most `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        RecvQueue {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// The number of bytes ready to be read.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if nothing can be read.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Move received data into `buffer`, returning the number of bytes read.
    ///
    /// The connection should be told with `Connection::window_update` afterwards so that it may
    /// advertise the reopened window.
    pub fn read(&mut self, buffer: &mut [u8]) -> usize {
        let count = buffer.len().min(self.data.len());
        for (dst, src) in buffer.iter_mut().zip(self.data.drain(..count)) {
            *dst = src;
        }
        count
    }
}

impl Transmitted {
    /// View the recorded segment as an incoming one.
    pub fn as_input(&self) -> InSegment<'_> {
        InSegment {
            header: self.header,
            payload: &self.payload,
            ecn: self.ecn,
        }
    }
}

impl Outbox {
    /// Take the oldest recorded segment.
    pub fn pop(&mut self) -> Option<Transmitted> {
        self.segments.pop_front()
    }

    /// The number of recorded segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Check if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl SendBuffer for SendQueue {
    fn queued_bytes(&self) -> usize {
        self.data.len()
    }

    fn available_space(&self) -> usize {
        self.capacity - self.data.len()
    }

    fn append(&mut self, data: &[u8]) -> usize {
        let count = data.len().min(self.available_space());
        self.data.extend(&data[..count]);
        count
    }

    fn drop_acked(&mut self, bytes: usize) {
        let bytes = bytes.min(self.data.len());
        self.data.drain(..bytes);
    }

    fn fetch_region(&self, offset: usize, len: usize) -> Region<'_> {
        let (front, back) = self.data.as_slices();
        let end = offset.saturating_add(len).min(self.data.len());
        let offset = offset.min(end);
        let split = front.len();
        let head = &front[offset.min(split)..end.min(split)];
        let tail = &back[offset.saturating_sub(split)..end.saturating_sub(split)];
        Region { head, tail }
    }
}

impl RecvBuffer for RecvQueue {
    fn available_space(&self) -> usize {
        self.capacity - self.data.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn append(&mut self, data: &[u8]) -> usize {
        let count = data.len().min(self.available_space());
        self.data.extend(&data[..count]);
        count
    }
}

impl Reassembly for SegmentQueue {
    fn insert(
        &mut self,
        rcv_nxt: TcpSeqNumber,
        seq: TcpSeqNumber,
        data: &[u8],
        fin: bool,
        recv: &mut dyn RecvBuffer,
    ) -> Reassembled {
        if !SegmentQueue::insert(self, rcv_nxt, seq, data, fin) {
            return Reassembled::default();
        }
        Reassembly::flush(self, rcv_nxt, recv)
    }

    fn flush(&mut self, rcv_nxt: TcpSeqNumber, recv: &mut dyn RecvBuffer) -> Reassembled {
        let mut accepted = 0;
        let mut result = self.drain_ready(rcv_nxt, |data| {
            accepted += recv.append(data) as u32;
        });
        // The window guarantees the space, anything else is data we never acknowledge.
        if accepted < result.delivered {
            net_debug!("tcp: receive buffer overrun by {} bytes", result.delivered - accepted);
            result.delivered = accepted;
            result.fin = false;
        }
        result
    }

    fn is_empty(&self) -> bool {
        SegmentQueue::is_empty(self)
    }

    fn clear(&mut self) {
        SegmentQueue::clear(self)
    }
}

impl SegmentSink for Outbox {
    fn send(&mut self, segment: OutSegment<'_>) -> Result<(), TransmitError> {
        if let Some(err) = self.fail_with {
            return Err(err);
        }
        let mut payload = Vec::with_capacity(segment.payload.len());
        payload.extend_from_slice(segment.payload.head);
        payload.extend_from_slice(segment.payload.tail);
        self.segments.push_back(Transmitted {
            header: segment.header,
            payload,
            ecn: segment.ecn,
        });
        Ok(())
    }
}

impl Lifecycle for Events {
    fn on_state_closed(&mut self, reason: Option<DropReason>) {
        self.closed = Some(reason);
    }

    fn on_half_open_accept(&mut self, _: &TcpRepr) {
        self.accepted += 1;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn send_queue_regions() {
        let mut queue = SendQueue::new(8);
        assert_eq!(queue.append(b"abcdef"), 6);
        queue.drop_acked(4);
        assert_eq!(queue.append(b"ghijklmn"), 6);
        assert_eq!(queue.queued_bytes(), 8);
        assert_eq!(queue.available_space(), 0);

        let region = queue.fetch_region(1, 5);
        let mut out = [0; 5];
        region.copy_to(&mut out);
        assert_eq!(&out, b"fghij");

        assert_eq!(queue.fetch_region(6, 10).len(), 2);
        assert!(queue.fetch_region(9, 3).is_empty());
    }

    #[test]
    fn recv_queue_read() {
        let mut queue = RecvQueue::new(4);
        assert_eq!(queue.append(b"abcdef"), 4);
        assert_eq!(RecvBuffer::available_space(&queue), 0);
        let mut out = [0; 3];
        assert_eq!(queue.read(&mut out), 3);
        assert_eq!(&out, b"abc");
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn reassembly_overrun_withholds_fin() {
        let mut queue = SegmentQueue::new(4);
        let mut recv = RecvQueue::new(2);
        let seq = TcpSeqNumber::from_u32;
        let result = Reassembly::insert(&mut queue, seq(0), seq(0), b"abc", true, &mut recv);
        assert_eq!(result, Reassembled { delivered: 2, fin: false });
    }

    #[test]
    fn outbox_failure() {
        let mut outbox = Outbox::default();
        outbox.fail_with = Some(TransmitError::NoBuffer);
        let segment = OutSegment {
            header: TcpRepr {
                src_port: 1,
                dst_port: 2,
                seq_number: TcpSeqNumber(0),
                ack_number: TcpSeqNumber(0),
                flags: Default::default(),
                window_len: 0,
                urgent_at: 0,
                options: Default::default(),
            },
            payload: Region::default(),
            ecn: EcnCodepoint::NotEct,
        };
        assert_eq!(outbox.send(segment), Err(TransmitError::NoBuffer));
        outbox.fail_with = None;
        assert_eq!(outbox.send(segment), Ok(()));
        assert_eq!(outbox.len(), 1);
    }
}
