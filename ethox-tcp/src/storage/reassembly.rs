use alloc::vec::Vec;

use crate::wire::TcpSeqNumber;

/// A queue of received segments that are not yet in sequence.
///
/// Segments are kept ordered by their starting sequence number and never overlap. A new segment
/// is cut where queued data begins or ends, queued segments that it covers completely are
/// replaced.
#[derive(Clone, Debug, Default)]
pub struct SegmentQueue {
    segments: Vec<Queued>,
    limit: usize,
}

/// The outcome of delivering data from the queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Reassembled {
    /// Number of bytes that became contiguous and were delivered.
    pub delivered: u32,
    /// A FIN was delivered with the final segment.
    pub fin: bool,
}

#[derive(Clone, Debug)]
struct Queued {
    start: TcpSeqNumber,
    data: Vec<u8>,
    fin: bool,
}

impl Queued {
    fn end(&self) -> TcpSeqNumber {
        self.start + self.data.len() as u32
    }
}

impl SegmentQueue {
    /// A queue holding at most `limit` segments.
    pub fn new(limit: usize) -> Self {
        SegmentQueue {
            segments: Vec::new(),
            limit,
        }
    }

    /// Check if no segment is queued.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The number of queued segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// The number of queued bytes.
    pub fn queued_bytes(&self) -> usize {
        self.segments.iter().map(|seg| seg.data.len()).sum()
    }

    /// Drop all queued segments.
    pub fn clear(&mut self) {
        self.segments.clear();
    }

    /// Queue a segment.
    ///
    /// Returns `false` when the segment was dropped since the queue is full. The segment starting
    /// at `rcv_nxt` is always accepted since it will be delivered immediately after.
    pub fn insert(
        &mut self,
        rcv_nxt: TcpSeqNumber,
        seq: TcpSeqNumber,
        data: &[u8],
        fin: bool,
    ) -> bool {
        let mut start = seq;
        let mut data = data;
        // Everything before the next expected byte is duplicate.
        if start < rcv_nxt {
            let dup = (rcv_nxt - start) as usize;
            if dup >= data.len() && !(fin && dup == data.len()) {
                return true;
            }
            let dup = dup.min(data.len());
            data = &data[dup..];
            start = rcv_nxt;
        }
        if data.is_empty() && !fin {
            return true;
        }

        if self.segments.len() >= self.limit && start != rcv_nxt {
            net_debug!("tcp: reassembly queue full, dropping segment at {}", start);
            return false;
        }

        let index = self.segments.iter()
            .position(|seg| seg.start > start)
            .unwrap_or(self.segments.len());

        // Trim against the preceding segment.
        if let Some(prev) = index.checked_sub(1).map(|i| &self.segments[i]) {
            let prev_end = prev.end();
            if prev_end > start {
                let overlap = (prev_end - start) as usize;
                if overlap > data.len() || (overlap == data.len() && !fin) {
                    return true;
                }
                data = &data[overlap..];
                start = prev_end;
            }
        }

        let end = start + data.len() as u32;
        // Trim the head of following segments, removing those that are fully covered.
        while index < self.segments.len() {
            let next = &self.segments[index];
            if next.start >= end {
                break;
            }
            let overlap = (end - next.start) as usize;
            if overlap >= next.data.len() && !(next.fin && overlap == next.data.len()) {
                self.segments.remove(index);
                continue;
            }
            data = &data[..(next.start - start) as usize];
            break;
        }

        if data.is_empty() && !fin {
            return true;
        }

        self.segments.insert(index, Queued {
            start,
            data: data.to_vec(),
            fin: fin && start + data.len() as u32 == end,
        });
        true
    }

    /// Deliver all segments that are now contiguous with `rcv_nxt`.
    ///
    /// Each contiguous chunk is handed to `deliver` in order. Delivery stops after a FIN.
    pub fn drain_ready(
        &mut self,
        rcv_nxt: TcpSeqNumber,
        mut deliver: impl FnMut(&[u8]),
    ) -> Reassembled {
        let mut result = Reassembled::default();
        let mut next = rcv_nxt;
        let mut taken = 0;
        for seg in self.segments.iter() {
            if seg.start != next {
                break;
            }
            deliver(&seg.data);
            result.delivered += seg.data.len() as u32;
            next = seg.end();
            taken += 1;
            if seg.fin {
                result.fin = true;
                break;
            }
        }
        self.segments.drain(..taken);
        if result.fin {
            // Nothing can follow the FIN.
            self.segments.clear();
        }
        result
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn seq(n: u32) -> TcpSeqNumber {
        TcpSeqNumber::from_u32(n)
    }

    fn collect(queue: &mut SegmentQueue, at: u32) -> (Vec<u8>, Reassembled) {
        let mut out = Vec::new();
        let result = queue.drain_ready(seq(at), |data| out.extend_from_slice(data));
        (out, result)
    }

    #[test]
    fn in_order_after_gap() {
        let mut queue = SegmentQueue::new(16);
        assert!(queue.insert(seq(0), seq(4), b"efgh", false));
        assert!(!queue.is_empty());
        let (out, result) = collect(&mut queue, 0);
        assert!(out.is_empty());
        assert_eq!(result.delivered, 0);

        assert!(queue.insert(seq(0), seq(0), b"abcd", false));
        let (out, result) = collect(&mut queue, 0);
        assert_eq!(out, b"abcdefgh");
        assert_eq!(result, Reassembled { delivered: 8, fin: false });
        assert!(queue.is_empty());
    }

    #[test]
    fn overlap_is_trimmed() {
        let mut queue = SegmentQueue::new(16);
        queue.insert(seq(0), seq(2), b"CD", false);
        queue.insert(seq(0), seq(0), b"abcdef", false);
        queue.insert(seq(0), seq(8), b"IJKLM", false);
        queue.insert(seq(0), seq(7), b"hijk", false);
        let (out, result) = collect(&mut queue, 0);
        assert_eq!(out, b"abcdef");
        assert_eq!(result.delivered, 6);
        // The segment at 7 was cut where the queued one begins.
        assert_eq!(queue.queued_bytes(), 6);
    }

    #[test]
    fn covered_segments_removed() {
        let mut queue = SegmentQueue::new(16);
        queue.insert(seq(0), seq(3), b"d", false);
        queue.insert(seq(0), seq(5), b"f", false);
        queue.insert(seq(0), seq(1), b"bcdefg", false);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.queued_bytes(), 6);
    }

    #[test]
    fn fin_ends_delivery() {
        let mut queue = SegmentQueue::new(16);
        queue.insert(seq(100), seq(102), b"yz", true);
        queue.insert(seq(100), seq(100), b"wx", false);
        let (out, result) = collect(&mut queue, 100);
        assert_eq!(out, b"wxyz");
        assert_eq!(result, Reassembled { delivered: 4, fin: true });
    }

    #[test]
    fn bare_fin_queued() {
        let mut queue = SegmentQueue::new(16);
        queue.insert(seq(0), seq(2), b"", true);
        queue.insert(seq(0), seq(0), b"ab", false);
        let (out, result) = collect(&mut queue, 0);
        assert_eq!(out, b"ab");
        assert!(result.fin);
    }

    #[test]
    fn wraps_sequence_space() {
        let mut queue = SegmentQueue::new(16);
        queue.insert(seq(0xFFFF_FFFE), seq(0), b"cd", false);
        queue.insert(seq(0xFFFF_FFFE), seq(0xFFFF_FFFE), b"ab", false);
        let (out, _) = collect(&mut queue, 0xFFFF_FFFE);
        assert_eq!(out, b"abcd");
    }

    #[test]
    fn limit_spares_next_expected() {
        let mut queue = SegmentQueue::new(1);
        assert!(queue.insert(seq(0), seq(10), b"k", false));
        assert!(!queue.insert(seq(0), seq(20), b"u", false));
        assert!(queue.insert(seq(0), seq(0), b"a", false));
    }
}
