//! Selective acknowledgement state of both directions.
//!
//! The sender keeps a [`Scoreboard`] of holes, the ranges between `snd_una` and the highest
//! sequence number acknowledged selectively (`fack`) that the receiver has not reported. The
//! receiver keeps a [`SackReport`], the blocks it reports in its own acknowledgements.
//!
//! [`Scoreboard`]: struct.Scoreboard.html
//! [`SackReport`]: struct.SackReport.html
use alloc::vec::Vec;

use crate::wire::{SackBlock, TcpSeqNumber, MAX_SACK_BLOCKS};

/// A range of unacknowledged data below `fack`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Hole {
    /// The first missing sequence number.
    pub start: TcpSeqNumber,
    /// The sequence number following the range.
    pub end: TcpSeqNumber,
    /// The next sequence number to retransmit, within `[start, end]`.
    pub rxmit: TcpSeqNumber,
}

/// The sender side scoreboard.
///
/// Holes are ordered by sequence number, pairwise disjoint and lie within `[snd_una, fack)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scoreboard {
    holes: Vec<Hole>,
    /// Index of the first hole that may still need a retransmission.
    nexthole: Option<usize>,
    max_holes: usize,
    /// One beyond the highest selectively acknowledged sequence number.
    pub(crate) fack: TcpSeqNumber,
    /// Bytes retransmitted from holes and not yet covered.
    pub(crate) sack_bytes_rexmit: u32,
    /// Bytes above `snd_una` reported by the receiver.
    pub(crate) sacked_bytes: u32,
    /// Bytes newly acknowledged, cumulatively or selectively, by the last ACK.
    pub(crate) delivered_data: u32,
    /// The highest block end of the last ACK.
    pub(crate) last_sack_ack: Option<TcpSeqNumber>,
    /// Data in flight when recovery started.
    pub(crate) recover_fs: u32,
    /// Bytes delivered during proportional rate reduction.
    pub(crate) prr_delivered: u32,
    /// Bytes sent during recovery.
    pub(crate) prr_out: u32,
    /// Number of times a hole could not be recorded since the scoreboard was full.
    pub(crate) overflows: u32,
}

/// The blocks a receiver reports, most recent first.
///
/// A duplicate report (RFC 2883) is sent once in front of the regular blocks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SackReport {
    blocks: [Option<SackBlock>; MAX_SACK_BLOCKS],
    dsack: Option<SackBlock>,
}

impl Scoreboard {
    /// An empty scoreboard tracking at most `max_holes` holes.
    pub(crate) fn new(max_holes: usize) -> Self {
        Scoreboard {
            holes: Vec::new(),
            nexthole: None,
            max_holes,
            fack: TcpSeqNumber::default(),
            sack_bytes_rexmit: 0,
            sacked_bytes: 0,
            delivered_data: 0,
            last_sack_ack: None,
            recover_fs: 0,
            prr_delivered: 0,
            prr_out: 0,
            overflows: 0,
        }
    }

    /// Check if there is no hole.
    pub fn is_empty(&self) -> bool {
        self.holes.is_empty()
    }

    /// The current holes in sequence order.
    pub fn holes(&self) -> &[Hole] {
        &self.holes
    }

    /// Bytes selectively acknowledged above `snd_una`.
    pub fn sacked_bytes(&self) -> u32 {
        self.sacked_bytes
    }

    /// Bytes retransmitted from holes.
    pub fn retransmitted_bytes(&self) -> u32 {
        self.sack_bytes_rexmit
    }

    /// The estimate of data in flight of RFC 6675.
    pub(crate) fn pipe(&self, snd_una: TcpSeqNumber, snd_max: TcpSeqNumber) -> u32 {
        let flight = i64::from(snd_max.saturating_since(snd_una))
            + i64::from(self.sack_bytes_rexmit)
            - i64::from(self.sacked_bytes);
        flight.max(0) as u32
    }

    /// Forget every hole, for example after a retransmit timeout.
    pub(crate) fn free(&mut self) {
        self.holes.clear();
        self.nexthole = None;
        self.sack_bytes_rexmit = 0;
    }

    fn insert_hole(&mut self, at: usize, start: TcpSeqNumber, end: TcpSeqNumber) -> bool {
        if self.holes.len() >= self.max_holes {
            self.overflows = self.overflows.saturating_add(1);
            net_debug!("tcp: sack scoreboard full with {} holes", self.holes.len());
            return false;
        }
        self.holes.insert(at, Hole { start, end, rxmit: start });
        self.nexthole = match self.nexthole {
            None => Some(at),
            Some(next) if next >= at => Some(next + 1),
            other => other,
        };
        true
    }

    fn remove_hole(&mut self, at: usize) {
        self.holes.remove(at);
        self.nexthole = match self.nexthole {
            // The following hole takes its place.
            Some(next) if next == at => if at < self.holes.len() { Some(at) } else { None },
            Some(next) if next > at => Some(next - 1),
            other => other,
        };
    }

    /// Process the cumulative and selective acknowledgement of a segment.
    ///
    /// The range `[snd_una, ack)` is treated as one more block if holes exist. Blocks outside of
    /// `(snd_una, snd_max]` or below `ack` are ignored. Returns if the scoreboard changed.
    pub(crate) fn do_ack(
        &mut self,
        snd_una: TcpSeqNumber,
        snd_max: TcpSeqNumber,
        ack: TcpSeqNumber,
        sacks: impl Iterator<Item=SackBlock>,
    ) -> bool {
        let mut blocks = [SackBlock::default(); MAX_SACK_BLOCKS + 1];
        let mut count = 0;
        let mut changed = false;
        let mut delivered: u32 = 0;
        let mut left_edge_delta = 0;

        if snd_una < ack && !self.holes.is_empty() {
            left_edge_delta = ack.saturating_since(snd_una);
            blocks[count] = SackBlock { start: snd_una, end: ack };
            count += 1;
        }
        for sack in sacks.take(MAX_SACK_BLOCKS) {
            if sack.end > sack.start
                && sack.start > snd_una
                && sack.start > ack
                && sack.start < snd_max
                && sack.end > snd_una
                && sack.end <= snd_max
            {
                blocks[count] = sack;
                count += 1;
            }
        }
        if count == 0 {
            return false;
        }

        // At most five blocks, sort them by their end.
        for i in 0..count {
            for j in i + 1..count {
                if blocks[i].end > blocks[j].end {
                    blocks.swap(i, j);
                }
            }
        }

        if self.holes.is_empty() {
            self.fack = snd_una.max(ack);
            self.sacked_bytes = 0;
        }

        // Walk blocks and holes from their tails in a single pass.
        let mut remaining = count;
        let highest = blocks[count - 1];
        self.last_sack_ack = Some(highest.end);
        if self.fack < highest.start {
            let tail = self.holes.len();
            if self.insert_hole(tail, self.fack, highest.start) {
                delivered += (highest.end - highest.start) as u32;
                self.fack = highest.end;
                remaining -= 1;
                changed = true;
            } else {
                // Skip the blocks beyond fack, still trim with the rest.
                while remaining > 0 && self.fack < blocks[remaining - 1].start {
                    remaining -= 1;
                }
                if remaining > 0 && self.fack < blocks[remaining - 1].end {
                    delivered += blocks[remaining - 1].end.saturating_since(self.fack);
                    self.fack = blocks[remaining - 1].end;
                    changed = true;
                }
            }
        } else if self.fack < highest.end {
            delivered += highest.end.saturating_since(self.fack);
            self.fack = highest.end;
            changed = true;
        }

        let mut cur = self.holes.len().checked_sub(1);
        while remaining > 0 {
            let index = match cur {
                Some(index) => index,
                None => break,
            };
            let block = blocks[remaining - 1];
            let hole = self.holes[index];
            if block.start >= hole.end {
                remaining -= 1;
                continue;
            }
            if block.end <= hole.start {
                cur = index.checked_sub(1);
                continue;
            }

            self.sack_bytes_rexmit = self.sack_bytes_rexmit
                .saturating_sub(hole.rxmit.saturating_since(hole.start));
            changed = true;
            if block.start <= hole.start {
                if block.end >= hole.end {
                    // The whole hole is covered.
                    delivered += hole.end.saturating_since(hole.start);
                    self.remove_hole(index);
                    cur = index.checked_sub(1);
                    continue;
                }
                delivered += block.end.saturating_since(hole.start);
                let hole = &mut self.holes[index];
                hole.start = block.end;
                hole.rxmit = hole.rxmit.max(hole.start);
            } else if block.end >= hole.end {
                delivered += hole.end.saturating_since(block.start);
                let hole = &mut self.holes[index];
                hole.end = block.start;
                hole.rxmit = hole.rxmit.min(hole.end);
            } else if self.insert_hole(index + 1, block.end, hole.end) {
                // Split around a block in the middle of the hole.
                if hole.rxmit > block.end {
                    self.holes[index + 1].rxmit = hole.rxmit;
                    self.sack_bytes_rexmit += hole.rxmit.saturating_since(block.end);
                }
                let hole = &mut self.holes[index];
                hole.end = block.start;
                hole.rxmit = hole.rxmit.min(hole.end);
                delivered += block.end.saturating_since(block.start);
            }

            let hole = self.holes[index];
            self.sack_bytes_rexmit += hole.rxmit.saturating_since(hole.start);
            if block.start <= hole.start {
                cur = index.checked_sub(1);
            } else {
                remaining -= 1;
            }
        }

        self.delivered_data = delivered;
        self.sacked_bytes = (self.sacked_bytes + delivered).saturating_sub(left_edge_delta);
        changed
    }

    /// The next hole with data left to retransmit, by index.
    pub(crate) fn next_hole(&mut self) -> Option<usize> {
        let start = self.nexthole?;
        let found = (start..self.holes.len())
            .find(|&index| self.holes[index].rxmit < self.holes[index].end)?;
        self.nexthole = Some(found);
        Some(found)
    }

    /// Access a hole by index.
    pub(crate) fn hole(&self, index: usize) -> Hole {
        self.holes[index]
    }

    /// Account a retransmission of `len` bytes from a hole.
    pub(crate) fn retransmitted(&mut self, index: usize, len: u32) {
        self.holes[index].rxmit += len;
        self.sack_bytes_rexmit += len;
    }

    /// Undo `retransmitted` after the transmission failed.
    pub(crate) fn retransmit_failed(&mut self, index: usize, len: u32) {
        self.holes[index].rxmit -= len;
        self.sack_bytes_rexmit = self.sack_bytes_rexmit.saturating_sub(len);
    }

    /// Skip over data already acknowledged selectively.
    ///
    /// Returns the `snd_nxt` to use, which moves to the start of the next hole when it lies in
    /// a selectively acknowledged range, or to `fack` beyond the last hole.
    pub(crate) fn adjust(&self, snd_nxt: TcpSeqNumber) -> TcpSeqNumber {
        let mut cur = match self.holes.first() {
            Some(hole) => *hole,
            None => return snd_nxt,
        };
        if snd_nxt >= self.fack {
            return snd_nxt;
        }
        for next in self.holes.iter().skip(1) {
            if snd_nxt < cur.end {
                return snd_nxt;
            }
            if snd_nxt >= next.start {
                cur = *next;
            } else {
                return next.start;
            }
        }
        if snd_nxt < cur.end {
            return snd_nxt;
        }
        self.fack
    }
}

impl SackReport {
    /// The blocks to put into the next acknowledgement, the duplicate report first.
    pub fn blocks(&self) -> [Option<SackBlock>; MAX_SACK_BLOCKS] {
        let mut out = [None; MAX_SACK_BLOCKS];
        let reports = self.dsack.iter().chain(self.blocks.iter().flatten());
        for (slot, block) in out.iter_mut().zip(reports) {
            *slot = Some(*block);
        }
        out
    }

    /// Check if anything would be reported.
    pub fn is_empty(&self) -> bool {
        self.dsack.is_none() && self.blocks[0].is_none()
    }

    /// The number of regular blocks.
    pub fn len(&self) -> usize {
        self.blocks.iter().flatten().count()
    }

    /// Record that `[start, end)` was received out of order.
    ///
    /// Blocks overlapping the new one are merged into it, blocks that `rcv_nxt` reached are
    /// dropped. The new block becomes the first one.
    pub(crate) fn update(&mut self, rcv_nxt: TcpSeqNumber, start: TcpSeqNumber, end: TcpSeqNumber) {
        let mut head = SackBlock { start, end };
        let mut saved = [None; MAX_SACK_BLOCKS];
        let mut num_saved = 0;
        for block in self.blocks.iter().flatten() {
            if block.start >= block.end || block.start <= rcv_nxt {
                continue;
            }
            if head.start <= block.end && head.end >= block.start {
                head.start = head.start.min(block.start);
                head.end = head.end.max(block.end);
            } else {
                saved[num_saved] = Some(*block);
                num_saved += 1;
            }
        }

        let mut blocks = [None; MAX_SACK_BLOCKS];
        let mut len = 0;
        if head.start > rcv_nxt {
            blocks[0] = Some(head);
            len = 1;
        }
        for block in saved.iter().flatten() {
            if len == MAX_SACK_BLOCKS {
                break;
            }
            blocks[len] = Some(*block);
            len += 1;
        }
        self.blocks = blocks;
    }

    /// Report the duplicate range `[start, end)` once.
    pub(crate) fn duplicate(&mut self, start: TcpSeqNumber, end: TcpSeqNumber) {
        if start < end {
            self.dsack = Some(SackBlock { start, end });
        }
    }

    /// Drop the duplicate report and every block `rcv_nxt` has reached.
    pub(crate) fn clean_dsack(&mut self, rcv_nxt: TcpSeqNumber) {
        self.dsack = None;
        let mut blocks = [None; MAX_SACK_BLOCKS];
        let kept = self.blocks.iter()
            .flatten()
            .filter(|block| block.start < block.end && block.start > rcv_nxt);
        for (slot, block) in blocks.iter_mut().zip(kept) {
            *slot = Some(*block);
        }
        self.blocks = blocks;
    }

    /// Forget all blocks.
    pub(crate) fn clear(&mut self) {
        *self = SackReport::default();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn seq(n: u32) -> TcpSeqNumber {
        TcpSeqNumber::from_u32(n)
    }

    fn block(start: u32, end: u32) -> SackBlock {
        SackBlock { start: seq(start), end: seq(end) }
    }

    fn hole(start: u32, end: u32, rxmit: u32) -> Hole {
        Hole { start: seq(start), end: seq(end), rxmit: seq(rxmit) }
    }

    #[test]
    fn first_block_opens_hole() {
        let mut board = Scoreboard::new(128);
        let changed = board.do_ack(seq(1000), seq(3000), seq(1000),
            [block(1500, 2000)].iter().cloned());
        assert!(changed);
        assert_eq!(board.holes(), &[hole(1000, 1500, 1000)]);
        assert_eq!(board.fack, seq(2000));
        assert_eq!(board.sacked_bytes(), 500);
        assert_eq!(board.delivered_data, 500);
        assert_eq!(board.pipe(seq(1000), seq(3000)), 1500);
    }

    #[test]
    fn block_at_una_ignored() {
        let mut board = Scoreboard::new(128);
        assert!(!board.do_ack(seq(1000), seq(2000), seq(1000),
            [block(1000, 1500)].iter().cloned()));
        assert!(board.is_empty());
    }

    #[test]
    fn split_and_merge() {
        let mut board = Scoreboard::new(128);
        board.do_ack(seq(0), seq(10_000), seq(0), [block(8000, 9000)].iter().cloned());
        board.do_ack(seq(0), seq(10_000), seq(0),
            [block(4000, 5000), block(8000, 9000)].iter().cloned());
        assert_eq!(board.holes(), &[hole(0, 4000, 0), hole(5000, 8000, 5000)]);
        assert_eq!(board.sacked_bytes(), 2000);

        // A cumulative ack into the first hole trims it.
        board.do_ack(seq(0), seq(10_000), seq(1000), [].iter().cloned());
        assert_eq!(board.holes()[0], hole(1000, 4000, 1000));
        assert_eq!(board.sacked_bytes(), 2000);

        // Filling the second hole removes it.
        board.do_ack(seq(1000), seq(10_000), seq(1000),
            [block(5000, 9000)].iter().cloned());
        assert_eq!(board.holes(), &[hole(1000, 4000, 1000)]);
        assert_eq!(board.sacked_bytes(), 5000);
    }

    #[test]
    fn retransmit_cursor() {
        let mut board = Scoreboard::new(128);
        board.do_ack(seq(0), seq(4000), seq(0),
            [block(1000, 2000), block(3000, 4000)].iter().cloned());
        assert_eq!(board.holes().len(), 2);

        let first = board.next_hole().unwrap();
        assert_eq!(board.hole(first), hole(0, 1000, 0));
        board.retransmitted(first, 1000);
        assert_eq!(board.retransmitted_bytes(), 1000);

        let second = board.next_hole().unwrap();
        assert_eq!(board.hole(second).start, seq(2000));
        board.retransmitted(second, 1000);
        assert_eq!(board.next_hole(), None);

        board.retransmit_failed(second, 1000);
        assert_eq!(board.next_hole(), Some(second));
    }

    #[test]
    fn split_keeps_retransmitted_part() {
        let mut board = Scoreboard::new(128);
        board.do_ack(seq(0), seq(5000), seq(0), [block(4000, 5000)].iter().cloned());
        let index = board.next_hole().unwrap();
        board.retransmitted(index, 3000);
        board.do_ack(seq(0), seq(5000), seq(0),
            [block(1000, 2000), block(4000, 5000)].iter().cloned());
        assert_eq!(board.holes(), &[hole(0, 1000, 1000), hole(2000, 4000, 3000)]);
        assert_eq!(board.retransmitted_bytes(), 2000);
    }

    #[test]
    fn capped_holes() {
        let mut board = Scoreboard::new(1);
        board.do_ack(seq(0), seq(10_000), seq(0), [block(2000, 3000)].iter().cloned());
        board.do_ack(seq(0), seq(10_000), seq(0),
            [block(5000, 6000), block(2000, 3000)].iter().cloned());
        assert_eq!(board.holes().len(), 1);
        assert_eq!(board.overflows, 1);
    }

    #[test]
    fn adjust_skips_sacked() {
        let mut board = Scoreboard::new(128);
        board.do_ack(seq(0), seq(5000), seq(0),
            [block(1000, 2000), block(3000, 4000)].iter().cloned());
        assert_eq!(board.adjust(seq(500)), seq(500));
        assert_eq!(board.adjust(seq(1500)), seq(2000));
        assert_eq!(board.adjust(seq(3500)), seq(4000));
        assert_eq!(board.adjust(seq(4500)), seq(4500));
    }

    #[test]
    fn report_most_recent_first() {
        let mut report = SackReport::default();
        report.update(seq(100), seq(200), seq(300));
        report.update(seq(100), seq(400), seq(500));
        report.update(seq(100), seq(300), seq(400));
        // The last segment bridged both blocks.
        assert_eq!(report.blocks(), [Some(block(200, 500)), None, None, None]);

        report.update(seq(100), seq(600), seq(700));
        report.duplicate(seq(50), seq(100));
        assert_eq!(report.blocks(), [
            Some(block(50, 100)),
            Some(block(600, 700)),
            Some(block(200, 500)),
            None,
        ]);

        report.clean_dsack(seq(500));
        assert_eq!(report.blocks(), [Some(block(600, 700)), None, None, None]);
        report.clear();
        assert!(report.is_empty());
    }

    #[test]
    fn report_keeps_four() {
        let mut report = SackReport::default();
        for i in 0..6 {
            report.update(seq(0), seq(100 * (i + 1)), seq(100 * (i + 1) + 50));
        }
        assert_eq!(report.len(), 4);
        assert_eq!(report.blocks()[0], Some(block(600, 650)));
    }
}
