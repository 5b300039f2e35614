//! The input engine.
//!
//! Processes one incoming segment against a connection. A segment that is acceptable updates the
//! sequence, window and congestion state and may trigger the output engine, everything else ends
//! in one of the `Disposition` variants: dropped silently, answered with a reset, or answered
//! with an acknowledgement that resynchronizes the peer.
//!
//! Segments that continue an established transfer in the obvious way are handled by header
//! prediction before the general path is taken. Both paths have the same effect.
use crate::time::{ticks_since, Ticks};
use crate::wire::{EcnCodepoint, TcpFlags, TcpOptions, TcpRepr, TcpSeqNumber};

use super::config::EcnMode;
use super::congestion::{AckKind, Signal, MAX_WIN};
use super::connection::{Connection, Control, State, MAX_WINSHIFT};
use super::error::DropReason;
use super::io::{InSegment, Io};
use super::timer::Timer;

/// Timestamps recorded longer ago than 24 days are not compared against.
const PAWS_IDLE: Ticks = 24 * 24 * 60 * 60 * 1000;

/// How processing of a segment ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Disposition {
    /// The segment was processed, answers were sent or scheduled.
    Accept,
    /// Discard the segment without an answer.
    DropSilently,
    /// Discard the segment and answer with a reset, unless it was a reset itself.
    DropWithReset,
    /// Discard the segment but send an acknowledgement.
    DropAfterAck,
}

/// The working copy of an incoming segment.
///
/// Sequence number, flags and payload are trimmed to the receive window while the segment is
/// processed. The header stays as received, it is needed to answer with a reset.
struct Segment<'a> {
    header: TcpRepr,
    received: u32,
    seq: TcpSeqNumber,
    ack: TcpSeqNumber,
    flags: TcpFlags,
    /// The window offered by the segment, scaled.
    tiwin: u32,
    options: TcpOptions,
    data: &'a [u8],
    ecn: EcnCodepoint,
    /// Output should run once the segment was processed.
    needoutput: bool,
}

impl<'a> Segment<'a> {
    fn new(segment: InSegment<'a>) -> Self {
        let header = segment.header;
        Segment {
            header,
            received: segment.payload.len() as u32,
            seq: header.seq_number,
            ack: header.ack_number,
            flags: header.flags,
            tiwin: u32::from(header.window_len),
            options: header.options.for_segment(header.flags.syn()),
            data: segment.payload,
            ecn: segment.ecn,
            needoutput: false,
        }
    }

    fn len(&self) -> u32 {
        self.data.len() as u32
    }

    fn trim_front(&mut self, count: u32) {
        let count = (count as usize).min(self.data.len());
        self.data = &self.data[count..];
        self.seq += count as u32;
    }

    fn trim_back(&mut self, count: u32) {
        let keep = self.data.len().saturating_sub(count as usize);
        self.data = &self.data[..keep];
    }
}

impl Connection {
    /// Process an incoming segment.
    ///
    /// The segment must belong to this connection, finding the connection by its addresses and
    /// ports is up to the caller. Answers are handed to the segment sink of `io` before this
    /// returns, timers are armed through its timer service.
    pub fn input(&mut self, segment: InSegment<'_>, io: &mut Io<'_>) {
        self.stats.rcvtotal += 1;
        let mut seg = Segment::new(segment);
        net_trace!("tcp {}->{}: recv {} len {} in {:?}",
            self.local_port, self.remote_port, seg.header, seg.received, self.state);

        let disposition = match self.state {
            State::Closed => Disposition::DropWithReset,
            State::Listen => self.input_listen(&mut seg, io),
            State::TimeWait => self.input_time_wait(&seg, io),
            _ => self.do_segment(&mut seg, io),
        };

        match disposition {
            Disposition::Accept | Disposition::DropSilently => (),
            Disposition::DropAfterAck => {
                // An unacceptable ACK of our SYN-ACK may come from an old connection.
                if self.state == State::SynReceived
                    && seg.flags.ack()
                    && (self.send.unacked > seg.ack || seg.ack > self.send.max)
                {
                    self.drop_with_reset(&seg.header, seg.received, io);
                } else {
                    self.flags.insert(Control::ACKNOW);
                    self.try_output(io);
                }
            },
            Disposition::DropWithReset => self.drop_with_reset(&seg.header, seg.received, io),
        }
    }

    /// A listening connection accepts a SYN and answers it.
    fn input_listen(&mut self, seg: &mut Segment<'_>, io: &mut Io) -> Disposition {
        let now = io.now.ticks();
        if seg.flags.rst() {
            self.close_connection(Some(DropReason::ConnectionRefused), io);
            return Disposition::DropSilently;
        }
        if (seg.flags & (TcpFlags::RST | TcpFlags::ACK | TcpFlags::SYN)) == TcpFlags::ACK {
            if seg.ack == self.send.initial_seq + 1 {
                return self.accept_retry(seg, io);
            }
            self.stats.badsyn += 1;
            return Disposition::DropWithReset;
        }
        if !seg.flags.syn() {
            self.stats.badsyn += 1;
            return Disposition::DropSilently;
        }
        if seg.flags.ack() {
            self.stats.badsyn += 1;
            return Disposition::DropWithReset;
        }
        if seg.flags.fin() && self.config.drop_synfin {
            self.stats.badsyn += 1;
            self.stats.synfin_drop += 1;
            return Disposition::DropSilently;
        }

        self.rcvtime = now;
        self.negotiate(seg, now);
        if seg.flags.contains(TcpFlags::ECE | TcpFlags::CWR) && self.config.ecn != EcnMode::Off {
            self.flags.insert(Control::ECN_PERMIT | Control::ECN_SND_ECE);
            self.stats.ecn_shs += 1;
        }

        self.set_state(State::SynReceived);
        self.recv_seq_init(seg.seq);
        let iss = self.send.initial_seq;
        self.send_seq_init(iss);
        self.send.window = seg.tiwin;
        self.send.max_window = seg.tiwin;
        self.send.wl1 = seg.seq;

        let scale = if self.flags.contains(Control::RCVD_SCALE) { self.recv.request_scale } else { 0 };
        self.recv.window = self.recv_space(io).min(MAX_WIN << scale);
        self.recv.advertised += self.recv.window;

        self.stats.accepts += 1;
        io.events.on_half_open_accept(&seg.header);
        io.timers.arm(Timer::Keepalive, self.config.keep_init);
        self.flags.insert(Control::ACKNOW);
        self.try_output(io);
        Disposition::Accept
    }

    /// The acknowledgement of a SYN-ACK sent from `iss` by an earlier incarnation of the listener.
    ///
    /// The handshake is resumed as if the SYN had been answered by this connection, options of
    /// the lost SYN are not known.
    fn accept_retry(&mut self, seg: &mut Segment<'_>, io: &mut Io) -> Disposition {
        self.set_state(State::SynReceived);
        self.recv_seq_init(seg.seq - 1);
        let iss = self.send.initial_seq;
        self.send_seq_init(iss);
        self.send.next = iss + 1;
        self.send.max = iss + 1;
        self.send.wl1 = self.recv.initial_seq;
        self.recv.window = self.recv_space(io).min(MAX_WIN);
        self.recv.advertised += self.recv.window;
        self.recv.last_ack_sent = self.recv.next;
        self.flags.remove(Control::REQ_SCALE | Control::REQ_TSTMP);

        self.stats.accepts += 1;
        io.events.on_half_open_accept(&seg.header);
        io.timers.arm(Timer::Keepalive, self.config.keep_init);
        self.do_segment(seg, io)
    }

    /// Both sides closed, only a retransmitted FIN needs another acknowledgement.
    ///
    /// Resets are ignored to protect the quiet time (RFC 1337).
    fn input_time_wait(&mut self, seg: &Segment<'_>, io: &mut Io) -> Disposition {
        if seg.flags.rst() || !seg.flags.ack() {
            return Disposition::DropSilently;
        }
        if seg.flags.fin() && seg.seq + seg.len() + 1 == self.recv.next {
            self.rcvtime = io.now.ticks();
            io.timers.arm(Timer::TwoMsl, self.config.two_msl());
            return Disposition::DropAfterAck;
        }
        if seg.len() > 0 || seg.flags.syn() {
            return Disposition::DropAfterAck;
        }
        Disposition::DropSilently
    }

    /// Adopt the options of a SYN we answer or that answers ours.
    fn negotiate(&mut self, seg: &Segment<'_>, now: Ticks) {
        let options = seg.options;
        match options.window_scale {
            Some(shift) if self.flags.contains(Control::REQ_SCALE) => {
                self.flags.insert(Control::RCVD_SCALE);
                self.send.scale = shift.min(MAX_WINSHIFT);
            },
            _ => self.flags.remove(Control::REQ_SCALE),
        }
        match options.timestamp {
            Some(ts) if self.flags.contains(Control::REQ_TSTMP) => {
                self.flags.insert(Control::RCVD_TSTMP);
                self.ts_recent = ts.tsval;
                self.ts_recent_age = now;
            },
            _ => self.flags.remove(Control::REQ_TSTMP),
        }
        if !options.sack_permitted {
            self.flags.remove(Control::SACK_PERMIT);
        }
        self.set_mss(options.mss.map_or(0, u32::from));
    }

    /// The state machine for every state from `SynSent` to `LastAck`.
    fn do_segment(&mut self, seg: &mut Segment<'_>, io: &mut Io) -> Disposition {
        let now = io.now.ticks();

        if seg.flags.syn() && seg.flags.fin() && self.config.drop_synfin {
            self.stats.synfin_drop += 1;
            return Disposition::DropSilently;
        }
        if self.state == State::SynSent
            && seg.flags.ack()
            && (seg.ack <= self.send.initial_seq || seg.ack > self.send.max)
        {
            return Disposition::DropWithReset;
        }

        self.rcvtime = now;
        // The window of a SYN is never scaled.
        if !seg.flags.syn() {
            seg.tiwin <<= self.send.scale;
        }

        if self.flags.contains(Control::ECN_PERMIT) {
            if seg.flags.cwr() {
                self.flags.remove(Control::ECN_SND_ECE);
                self.flags.insert(Control::ACKNOW);
            }
            match seg.ecn {
                EcnCodepoint::Ce => {
                    self.flags.insert(Control::ECN_SND_ECE | Control::ACKNOW);
                    self.stats.ecn_ce += 1;
                    self.cc_ecn_packet(now, true);
                },
                EcnCodepoint::Ect0 => self.stats.ecn_ect0 += 1,
                EcnCodepoint::Ect1 => self.stats.ecn_ect1 += 1,
                EcnCodepoint::NotEct => (),
            }
            if seg.flags.ece() && !seg.flags.syn() {
                self.cc_cong_signal(now, seg.ack, Signal::Ecn);
            }
        }

        // Echoed timestamps are relative to our clock.
        let ack = seg.ack;
        if let Some(ts) = seg.options.timestamp.as_mut() {
            if ts.tsecr != 0 {
                ts.tsecr = ts.tsecr.wrapping_sub(self.ts_offset);
                if ticks_since(now, ts.tsecr) < 0 {
                    ts.tsecr = 0;
                } else if self.flags.contains(Control::PREVVALID)
                    && self.badrxtwin != 0
                    && ticks_since(ts.tsecr, self.badrxtwin) < 0
                {
                    self.cc_cong_signal(now, ack, Signal::RtoErr);
                }
            }
        }

        if self.state == State::SynSent && seg.flags.syn() {
            if !seg.flags.ack()
                && seg.flags.contains(TcpFlags::ECE | TcpFlags::CWR)
                && self.config.ecn != EcnMode::Off
            {
                self.flags.insert(Control::ECN_PERMIT | Control::ECN_SND_ECE);
                self.stats.ecn_shs += 1;
            }
            self.negotiate(seg, now);
            self.send.window = seg.tiwin;
            self.send.max_window = self.send.max_window.max(seg.tiwin);
        }

        if self.flags.contains(Control::RCVD_TSTMP)
            && seg.options.timestamp.is_none()
            && !seg.flags.rst()
        {
            self.stats.rcvbadopt += 1;
            return Disposition::DropSilently;
        }

        if let Err(disposition) = self.predict(seg, io) {
            return disposition;
        }

        let advertised = self.recv.advertised.saturating_since(self.recv.next);
        self.recv.window = self.recv_space(io).max(advertised);

        if self.state == State::SynReceived
            && seg.flags.ack()
            && (seg.ack <= self.send.unacked || seg.ack > self.send.max)
        {
            return Disposition::DropWithReset;
        }

        if self.state == State::SynSent {
            return match self.syn_sent(seg, io) {
                Ok(()) => self.step6(seg, io),
                Err(disposition) => disposition,
            };
        }

        if let Err(disposition) = self.validate(seg, io) {
            return disposition;
        }

        if !seg.flags.ack() {
            return if self.state == State::SynReceived || self.flags.contains(Control::NEEDSYN) {
                self.step6(seg, io)
            } else if self.flags.contains(Control::ACKNOW) {
                Disposition::DropAfterAck
            } else {
                Disposition::DropSilently
            };
        }

        let incforsyn = if self.state == State::SynReceived {
            self.complete_handshake(seg, io)
        } else {
            false
        };

        match self.ack_received(seg, io, incforsyn) {
            Ok(()) => self.step6(seg, io),
            Err(disposition) => disposition,
        }
    }

    /// Header prediction.
    ///
    /// Ends processing early with `Accept` for a pure acknowledgement of new data or for the
    /// next in-order data, while nothing else is going on.
    fn predict(&mut self, seg: &Segment<'_>, io: &mut Io) -> Result<(), Disposition> {
        let now = io.now.ticks();
        let header_flags = TcpFlags::SYN | TcpFlags::FIN | TcpFlags::RST | TcpFlags::URG | TcpFlags::ACK;
        let timestamp = seg.options.timestamp;
        let predictable = self.state == State::Established
            && seg.seq == self.recv.next
            && (seg.flags & header_flags) == TcpFlags::ACK
            && self.send.next == self.send.max
            && seg.tiwin != 0
            && seg.tiwin == self.send.window
            && !self.flags.intersects(Control::NEEDSYN | Control::NEEDFIN)
            && io.reassembly.is_empty()
            && timestamp.map_or(true, |ts| ticks_since(ts.tsval, self.ts_recent) >= 0);
        if !predictable {
            return Ok(());
        }

        if let Some(ts) = timestamp {
            if seg.seq <= self.recv.last_ack_sent {
                self.ts_recent_age = now;
                self.ts_recent = ts.tsval;
            }
        }

        if seg.len() == 0 {
            let acceptable = seg.ack > self.send.unacked
                && seg.ack <= self.send.max
                && !self.window.in_recovery()
                && !seg.options.has_sack()
                && self.scoreboard.is_empty()
                && self.window.cwnd >= self.send.window;
            if !acceptable {
                return Ok(());
            }

            self.stats.predack += 1;
            if timestamp.is_none()
                && self.rtt.rxtshift == 1
                && self.flags.contains(Control::PREVVALID)
                && ticks_since(now, self.badrxtwin) < 0
            {
                self.cc_cong_signal(now, seg.ack, Signal::RtoErr);
            }
            self.rtt_from_ack(seg, now);

            let acked = seg.ack.saturating_since(self.send.unacked);
            self.stats.rcvackpack += 1;
            self.stats.rcvackbyte += u64::from(acked);
            io.send.drop_acked(acked as usize);
            if self.send.unacked > self.recover && seg.ack <= self.recover {
                self.recover = seg.ack - 1;
            }
            self.cc_ack_received(now, seg.ack, AckKind::Ack);
            self.send.unacked = seg.ack;
            self.send.wl2 = seg.ack;
            self.dupacks = 0;

            if self.send.unacked == self.send.max {
                io.timers.cancel(Timer::Retransmit);
            } else if !io.timers.is_armed(Timer::Persist) {
                io.timers.arm(Timer::Retransmit, self.rtt.rxtcur);
            }
            if io.send.queued_bytes() > 0 {
                self.try_output(io);
            }
            self.check_delack(io);
            return Err(Disposition::Accept);
        }

        if seg.ack == self.send.unacked && seg.len() <= self.recv_space(io) {
            if self.flags.contains(Control::SACK_PERMIT) && !self.report.is_empty() {
                self.report.clear();
            }
            self.stats.preddat += 1;
            self.recv.next += seg.len();
            self.send.wl1 = seg.seq;
            self.recv.urgent = self.recv.next;
            self.stats.rcvpack += 1;
            self.stats.rcvbyte += u64::from(seg.len());
            if !self.flags.contains(Control::READ_CLOSED) {
                io.recv.append(seg.data);
            }
            if self.delay_ack(seg.len(), io) && !self.flags.contains(Control::ACKNOW) {
                self.flags.insert(Control::DELACK);
            } else {
                self.flags.insert(Control::ACKNOW);
                self.try_output(io);
            }
            self.check_delack(io);
            return Err(Disposition::Accept);
        }

        Ok(())
    }

    /// The answer to our SYN, or a SYN of a simultaneous open.
    fn syn_sent(&mut self, seg: &mut Segment<'_>, io: &mut Io) -> Result<(), Disposition> {
        let now = io.now.ticks();
        if seg.flags.ack() && seg.flags.rst() {
            self.drop_connection(DropReason::ConnectionRefused, io);
            return Err(Disposition::DropSilently);
        }
        if seg.flags.rst() || !seg.flags.syn() {
            return Err(Disposition::DropSilently);
        }

        self.recv_seq_init(seg.seq);
        if seg.flags.ack() {
            self.stats.connects += 1;
            if self.flags.contains(Control::RCVD_SCALE | Control::REQ_SCALE) {
                self.recv.scale = self.recv.request_scale;
            }
            self.recv.advertised += self.recv.window.min(MAX_WIN << self.recv.scale);
            // Our SYN is acknowledged.
            self.send.unacked += 1;
            if self.delay_ack(seg.len(), io) && seg.len() != 0 {
                io.timers.arm(Timer::DelayedAck, self.config.delack_time);
            } else {
                self.flags.insert(Control::ACKNOW);
            }
            if seg.flags.ece() && !seg.flags.cwr() && self.config.ecn == EcnMode::Enabled {
                self.flags.insert(Control::ECN_PERMIT);
                self.stats.ecn_shs += 1;
            }
            if self.flags.contains(Control::NEEDFIN) {
                self.set_state(State::FinWait1);
                self.flags.remove(Control::NEEDFIN);
                seg.flags.remove(TcpFlags::SYN);
            } else {
                self.set_state(State::Established);
                self.cc_conn_init(now);
                io.timers.arm(Timer::Keepalive, self.config.keep_idle);
            }
        } else {
            // Simultaneous open, the SYN-ACK follows.
            self.flags.insert(Control::ACKNOW | Control::NEEDSYN);
            io.timers.cancel(Timer::Retransmit);
            self.set_state(State::SynReceived);
        }

        // Data follows the SYN.
        seg.seq += 1;
        if seg.len() > self.recv.window {
            let excess = seg.len() - self.recv.window;
            seg.trim_back(excess);
            seg.flags.remove(TcpFlags::FIN);
            self.stats.rcvpackafterwin += 1;
            self.stats.rcvbyteafterwin += u64::from(excess);
        }
        self.send.wl1 = seg.seq - 1;
        self.recv.urgent = seg.seq;

        if seg.flags.ack() {
            self.process_ack(seg, io, false)?;
        }
        Ok(())
    }

    /// Resets, SYNs, PAWS and the receive window.
    fn validate(&mut self, seg: &mut Segment<'_>, io: &mut Io) -> Result<(), Disposition> {
        let now = io.now.ticks();

        if seg.flags.rst() {
            let last_ack = self.recv.last_ack_sent;
            let in_window = (seg.seq >= last_ack && seg.seq < last_ack + self.recv.window)
                || (self.recv.window == 0 && seg.seq == last_ack);
            if !in_window {
                self.stats.badrst += 1;
            } else if self.config.insecure_rst || seg.seq == last_ack {
                let reason = if self.state == State::SynReceived {
                    DropReason::ConnectionRefused
                } else {
                    DropReason::ConnectionReset
                };
                self.stats.drops += 1;
                self.close_connection(Some(reason), io);
            } else {
                self.stats.badrstwin += 1;
                self.challenge_ack(io);
            }
            return Err(Disposition::DropSilently);
        }

        if seg.flags.syn() && self.state != State::SynSent && self.state != State::SynReceived {
            self.stats.badsyn += 1;
            self.challenge_ack(io);
            return Err(Disposition::DropSilently);
        }

        if let Some(ts) = seg.options.timestamp {
            if self.ts_recent != 0 && ticks_since(ts.tsval, self.ts_recent) < 0 {
                if now.wrapping_sub(self.ts_recent_age) > PAWS_IDLE {
                    // The recorded timestamp is too old to be compared with.
                    self.ts_recent = 0;
                } else {
                    self.stats.rcvduppack += 1;
                    self.stats.rcvdupbyte += u64::from(seg.len());
                    self.stats.pawsdrop += 1;
                    net_debug!("tcp {}->{}: paws drop of {}", self.local_port, self.remote_port, seg.seq);
                    return Err(if seg.len() > 0 {
                        Disposition::DropAfterAck
                    } else {
                        Disposition::DropSilently
                    });
                }
            }
        }

        if self.state == State::SynReceived && seg.seq < self.recv.initial_seq {
            return Err(Disposition::DropWithReset);
        }

        // Drop what was received before.
        let mut todrop = self.recv.next - seg.seq;
        if todrop > 0 {
            if seg.flags.syn() {
                seg.flags.remove(TcpFlags::SYN | TcpFlags::URG);
                seg.seq += 1;
                todrop -= 1;
            }
            let len = seg.len() as i32;
            if todrop > len || (todrop == len && !seg.flags.fin()) {
                // A complete duplicate, acknowledge it to resynchronize the peer.
                seg.flags.remove(TcpFlags::FIN);
                self.flags.insert(Control::ACKNOW);
                todrop = len;
                self.stats.rcvduppack += 1;
                self.stats.rcvdupbyte += todrop as u64;
            } else {
                self.stats.rcvpartduppack += 1;
                self.stats.rcvpartdupbyte += todrop as u64;
            }
            if todrop > 0 && self.flags.contains(Control::SACK_PERMIT) {
                self.report.duplicate(seg.seq, seg.seq + todrop as u32);
                self.flags.insert(Control::ACKNOW);
            }
            seg.trim_front(todrop as u32);
        }

        if self.flags.contains(Control::READ_CLOSED) && self.state > State::CloseWait && seg.len() > 0 {
            self.close_connection(None, io);
            self.stats.rcvafterclose += 1;
            return Err(Disposition::DropWithReset);
        }

        // Drop what lies beyond the window.
        let todrop = (seg.seq + seg.len()) - (self.recv.next + self.recv.window);
        if todrop > 0 {
            self.stats.rcvpackafterwin += 1;
            if todrop as u32 >= seg.len() {
                self.stats.rcvbyteafterwin += u64::from(seg.len());
                if self.recv.window == 0 && seg.seq == self.recv.next {
                    // A probe of our zero window.
                    self.flags.insert(Control::ACKNOW);
                    self.stats.rcvwinprobe += 1;
                } else {
                    return Err(Disposition::DropAfterAck);
                }
            } else {
                self.stats.rcvbyteafterwin += todrop as u64;
            }
            seg.trim_back(todrop as u32);
            seg.flags.remove(TcpFlags::PSH | TcpFlags::FIN);
        }

        // Only a segment covering our last acknowledgement updates the timestamp to echo.
        if let Some(ts) = seg.options.timestamp {
            let end = seg.seq + seg.len() + u32::from(seg.flags.syn() || seg.flags.fin());
            if seg.seq <= self.recv.last_ack_sent && self.recv.last_ack_sent <= end {
                self.ts_recent_age = now;
                self.ts_recent = ts.tsval;
            }
        }

        Ok(())
    }

    /// Our SYN-ACK was acknowledged.
    ///
    /// Returns if the acknowledgement also covers our SYN, which is then accounted for in the
    /// acknowledgement processing.
    fn complete_handshake(&mut self, seg: &Segment<'_>, io: &mut Io) -> bool {
        let now = io.now.ticks();
        self.stats.connects += 1;
        if self.flags.contains(Control::RCVD_SCALE | Control::REQ_SCALE) {
            self.recv.scale = self.recv.request_scale;
        }
        self.send.window = seg.tiwin;
        if self.flags.contains(Control::NEEDFIN) {
            self.set_state(State::FinWait1);
            self.flags.remove(Control::NEEDFIN);
        } else {
            self.set_state(State::Established);
            self.cc_conn_init(now);
            io.timers.arm(Timer::Keepalive, self.config.keep_idle);
        }

        let incforsyn = seg.ack > self.send.unacked && !self.flags.contains(Control::NEEDSYN);
        // Deliver data that arrived before the handshake completed.
        if seg.len() == 0 && !seg.flags.fin() {
            let delivered = io.reassembly.flush(self.recv.next, &mut *io.recv).delivered;
            self.recv.next += delivered;
        }
        self.send.wl1 = seg.seq - 1;
        incforsyn
    }

    /// The acknowledgement field, duplicate acknowledgements and recovery.
    fn ack_received(&mut self, seg: &mut Segment<'_>, io: &mut Io, incforsyn: bool)
        -> Result<(), Disposition>
    {
        let now = io.now.ticks();
        if seg.ack > self.send.max {
            self.stats.rcvacktoomuch += 1;
            return Err(Disposition::DropAfterAck);
        }

        let sack = self.flags.contains(Control::SACK_PERMIT);
        let sack_changed = if sack && (seg.options.has_sack() || !self.scoreboard.is_empty()) {
            let changed = self.scoreboard.do_ack(
                self.send.unacked, self.send.max, seg.ack, seg.options.sack_blocks());
            self.stats.sack_sboverflow = u64::from(self.scoreboard.overflows);
            changed
        } else {
            self.scoreboard.sacked_bytes = 0;
            false
        };

        if seg.ack <= self.send.unacked {
            if seg.len() == 0 && (seg.tiwin == self.send.window || sack) {
                self.duplicate_ack(seg, io, sack_changed)?;
            }
            return Ok(());
        }

        self.dupacks = 0;
        if sack && seg.options.has_sack() && sack_changed {
            self.dupacks += 1;
        }

        if self.window.fast_recovery {
            if seg.ack < self.recover {
                if !sack {
                    self.newreno_partial_ack(seg, io);
                } else if self.config.do_prr {
                    self.prr_partial_ack(io);
                } else {
                    self.sack_partial_ack(seg, io);
                }
            } else {
                self.cc_post_recovery(now, seg.ack);
            }
        }

        if self.flags.contains(Control::NEEDSYN) {
            // The SYN of a simultaneous open is acknowledged.
            self.flags.remove(Control::NEEDSYN);
            self.send.unacked += 1;
            if self.flags.contains(Control::RCVD_SCALE | Control::REQ_SCALE) {
                self.recv.scale = self.recv.request_scale;
            }
        }

        self.process_ack(seg, io, incforsyn)
    }

    /// Count a duplicate acknowledgement, entering fast retransmit at the threshold.
    ///
    /// Ends processing when a retransmission or limited transmit was triggered.
    fn duplicate_ack(&mut self, seg: &Segment<'_>, io: &mut Io, sack_changed: bool)
        -> Result<(), Disposition>
    {
        let now = io.now.ticks();
        let sack = self.flags.contains(Control::SACK_PERMIT);
        if seg.flags.fin() && !self.state.has_received_fin() {
            self.dupacks = 0;
            return Ok(());
        }
        if self.state != State::FinWait2 {
            self.stats.rcvdupack += 1;
        }
        if seg.ack != self.send.unacked || (sack && !sack_changed) {
            return Ok(());
        }
        if !io.timers.is_armed(Timer::Retransmit) {
            self.dupacks = 0;
            return Ok(());
        }

        let maxseg = self.maxseg();
        let thresh = self.config.rexmt_thresh;
        self.dupacks += 1;

        if self.dupacks > thresh || self.window.fast_recovery {
            self.cc_ack_received(now, seg.ack, AckKind::DupAck);
            if self.config.do_prr && self.window.fast_recovery && sack {
                self.window.cwnd = self.prr_window(maxseg);
            } else if sack && self.window.fast_recovery {
                let awnd = self.recovery_pipe();
                if awnd < self.window.ssthresh {
                    self.window.cwnd = (self.window.cwnd + maxseg).min(self.window.ssthresh);
                }
            } else {
                self.window.cwnd += maxseg;
            }
            self.try_output(io);
            return Err(Disposition::DropSilently);
        }

        if self.dupacks == thresh {
            let onxt = self.send.next;
            if self.config.do_prr || sack {
                if self.window.fast_recovery {
                    self.dupacks = 0;
                    return Ok(());
                }
            } else if seg.ack <= self.recover {
                // Still covered by the last recovery.
                self.dupacks = 0;
                return Ok(());
            }

            net_debug!("tcp {}->{}: fast retransmit at {}", self.local_port, self.remote_port, seg.ack);
            self.cc_cong_signal(now, seg.ack, Signal::DupAck);
            self.cc_ack_received(now, seg.ack, AckKind::DupAck);
            io.timers.cancel(Timer::Retransmit);
            self.rtt.rtttime = 0;
            if self.config.do_prr {
                self.scoreboard.prr_delivered = self.scoreboard.sacked_bytes;
                self.scoreboard.recover_fs = self.send.next.saturating_since(self.send.unacked).max(1);
            }
            if sack {
                self.stats.sack_recovery_episode += 1;
                self.recover = self.send.next;
                self.window.cwnd = maxseg;
                self.try_output(io);
                return Err(Disposition::DropSilently);
            }

            self.send.next = seg.ack;
            self.window.cwnd = maxseg;
            self.try_output(io);
            // Inflate by the segments that left the network.
            let inflight = self.dupacks.saturating_sub(self.snd_limited);
            self.window.cwnd = self.window.ssthresh + maxseg * inflight;
            if onxt > self.send.next {
                self.send.next = onxt;
            }
            return Err(Disposition::DropSilently);
        }

        if self.config.rfc3042 {
            // Limited transmit, new data for the first duplicate acknowledgements.
            self.cc_ack_received(now, seg.ack, AckKind::DupAck);
            let oldcwnd = self.window.cwnd;
            let oldmax = self.send.max;
            if self.dupacks == 1 {
                self.snd_limited = 0;
            }
            let outstanding = self.send.next.saturating_since(self.send.unacked);
            self.window.cwnd = outstanding + self.dupacks.saturating_sub(self.snd_limited) * maxseg;
            if io.send.queued_bytes() as u64 > u64::from(outstanding) {
                self.try_output(io);
            }
            let sent = self.send.max.saturating_since(oldmax);
            if sent > maxseg {
                self.snd_limited = 2;
            } else if sent > 0 {
                self.snd_limited += 1;
            }
            self.window.cwnd = oldcwnd;
            return Err(Disposition::DropSilently);
        }

        Ok(())
    }

    /// Data in flight during a SACK recovery.
    fn recovery_pipe(&self) -> u32 {
        if self.config.rfc6675_pipe {
            self.scoreboard.pipe(self.send.unacked, self.send.max)
        } else {
            let beyond_fack = i64::from(self.send.next - self.scoreboard.fack);
            (beyond_fack + i64::from(self.scoreboard.sack_bytes_rexmit)).max(0) as u32
        }
    }

    /// The congestion window allowed by proportional rate reduction (RFC 6937).
    fn prr_window(&mut self, maxseg: u32) -> u32 {
        let del_data = self.scoreboard.delivered_data;
        let pipe = i64::from(self.recovery_pipe());
        self.scoreboard.prr_delivered = self.scoreboard.prr_delivered.saturating_add(del_data);

        let ssthresh = i64::from(self.window.ssthresh);
        let delivered = i64::from(self.scoreboard.prr_delivered);
        let out = i64::from(self.scoreboard.prr_out);
        let snd_cnt = if pipe >= ssthresh {
            if self.scoreboard.recover_fs == 0 {
                self.scoreboard.recover_fs = self.send.next.saturating_since(self.send.unacked).max(1);
            }
            let recover_fs = i64::from(self.scoreboard.recover_fs);
            (delivered * ssthresh + recover_fs - 1) / recover_fs - out
        } else {
            let limit = if self.config.prr_conservative {
                delivered - out
            } else {
                (delivered - out).max(i64::from(del_data)) + i64::from(maxseg)
            };
            (ssthresh - pipe).min(limit)
        };

        let maxseg = i64::from(maxseg);
        let snd_cnt = snd_cnt.max(0) / maxseg;
        let cwnd = i64::from(self.send.next - self.recover)
            + i64::from(self.scoreboard.sack_bytes_rexmit)
            + snd_cnt * maxseg;
        cwnd.max(maxseg).min(i64::from(u32::max_value())) as u32
    }

    /// A partial acknowledgement during NewReno recovery retransmits the next segment.
    fn newreno_partial_ack(&mut self, seg: &Segment<'_>, io: &mut Io) {
        let onxt = self.send.next;
        let ocwnd = self.window.cwnd;
        let maxseg = self.maxseg();
        let acked = seg.ack.saturating_since(self.send.unacked);

        io.timers.cancel(Timer::Retransmit);
        self.rtt.rtttime = 0;
        self.send.next = seg.ack;
        // Exactly one segment fits.
        self.window.cwnd = maxseg + acked;
        self.flags.insert(Control::ACKNOW);
        self.try_output(io);

        self.window.cwnd = ocwnd;
        if onxt > self.send.next {
            self.send.next = onxt;
        }
        // Deflate by the acknowledged data, then allow one new segment.
        self.window.cwnd = self.window.cwnd.saturating_sub(acked) + maxseg;
    }

    /// A partial acknowledgement during SACK recovery.
    fn sack_partial_ack(&mut self, seg: &Segment<'_>, io: &mut Io) {
        io.timers.cancel(Timer::Retransmit);
        self.rtt.rtttime = 0;
        let acked = seg.ack.saturating_since(self.send.unacked);
        let segments = if acked / self.t_maxseg >= 2 { 2 } else { 1 };
        let cwnd = i64::from(self.scoreboard.sack_bytes_rexmit)
            + i64::from(self.send.next - self.recover)
            + i64::from(segments * self.t_maxseg);
        let cwnd = cwnd.min(i64::from(self.window.ssthresh)).max(i64::from(self.maxseg()));
        self.window.cwnd = cwnd as u32;
        self.flags.insert(Control::ACKNOW);
        self.try_output(io);
    }

    /// A partial acknowledgement during recovery with proportional rate reduction.
    fn prr_partial_ack(&mut self, io: &mut Io) {
        io.timers.cancel(Timer::Retransmit);
        self.rtt.rtttime = 0;
        let maxseg = self.maxseg();
        self.window.cwnd = self.prr_window(maxseg);
        self.flags.insert(Control::ACKNOW);
        self.try_output(io);
    }

    /// Take a round trip sample from the acknowledgement if one is available.
    fn rtt_from_ack(&mut self, seg: &Segment<'_>, now: Ticks) {
        match seg.options.timestamp {
            Some(ts) if ts.tsecr != 0 => {
                let rtt = ticks_since(now, ts.tsecr).max(0) as Ticks;
                self.rtt.note_low(rtt);
                self.rtt.sample(rtt + 1);
            },
            _ if self.rtt.rtttime != 0 && seg.ack > self.rtt.rtseq => {
                let rtt = ticks_since(now, self.rtt.rtttime).max(0) as Ticks;
                self.rtt.note_low(rtt);
                self.rtt.sample(rtt);
            },
            _ => return,
        }
        self.stats.rttupdated += 1;
        self.softerror = None;
    }

    /// Acknowledgement of new data.
    fn process_ack(&mut self, seg: &mut Segment<'_>, io: &mut Io, incforsyn: bool)
        -> Result<(), Disposition>
    {
        let now = io.now.ticks();
        if incforsyn {
            self.send.unacked += 1;
        }
        let acked = seg.ack.saturating_since(self.send.unacked);
        self.stats.rcvackpack += 1;

        // The peer acknowledged the original transmission, the timeout was spurious.
        let tsecr = seg.options.timestamp.map_or(0, |ts| ts.tsecr);
        if tsecr != 0
            && self.rtt.rxtshift == 1
            && self.flags.contains(Control::PREVVALID)
            && self.badrxtwin != 0
            && ticks_since(tsecr, self.badrxtwin) < 0
        {
            self.cc_cong_signal(now, seg.ack, Signal::RtoErr);
        }

        self.rtt_from_ack(seg, now);

        if seg.ack == self.send.max {
            io.timers.cancel(Timer::Retransmit);
            seg.needoutput = true;
        } else if !io.timers.is_armed(Timer::Persist) {
            io.timers.arm(Timer::Retransmit, self.rtt.rxtcur);
        }

        if acked == 0 {
            return Ok(());
        }

        self.cc_ack_received(now, seg.ack, AckKind::Ack);

        let queued = io.send.queued_bytes().min(u32::max_value() as usize) as u32;
        let ourfinisacked = if acked > queued {
            // The surplus is our FIN.
            self.stats.rcvackbyte += u64::from(queued);
            self.send.window = self.send.window.saturating_sub(queued);
            io.send.drop_acked(queued as usize);
            true
        } else {
            self.stats.rcvackbyte += u64::from(acked);
            self.send.window = self.send.window.saturating_sub(acked);
            io.send.drop_acked(acked as usize);
            false
        };

        if !self.window.in_recovery()
            && self.send.unacked > self.recover
            && seg.ack <= self.recover
        {
            self.recover = seg.ack - 1;
        }
        if self.window.in_recovery() && seg.ack >= self.recover {
            self.window.exit_recovery();
        }
        self.send.unacked = seg.ack;
        if self.flags.contains(Control::SACK_PERMIT) && self.send.unacked > self.recover {
            self.recover = self.send.unacked;
        }
        if self.send.next < self.send.unacked {
            self.send.next = self.send.unacked;
        }

        if !ourfinisacked {
            return Ok(());
        }
        match self.state {
            State::FinWait1 => {
                // Nobody reads anymore, do not wait for the peer forever.
                if self.flags.contains(Control::READ_CLOSED) {
                    io.timers.arm(Timer::TwoMsl, self.config.two_msl());
                }
                self.set_state(State::FinWait2);
            },
            State::Closing => self.enter_time_wait(io),
            State::LastAck => {
                self.close_connection(None, io);
                return Err(Disposition::DropSilently);
            },
            _ => (),
        }
        Ok(())
    }

    /// Window update, data and FIN.
    fn step6(&mut self, seg: &mut Segment<'_>, io: &mut Io) -> Disposition {
        let newer_window = self.send.wl1 < seg.seq
            || (self.send.wl1 == seg.seq
                && (self.send.wl2 < seg.ack
                    || (self.send.wl2 == seg.ack && seg.tiwin > self.send.window)));
        if seg.flags.ack() && newer_window {
            if seg.len() == 0 && self.send.wl2 == seg.ack && seg.tiwin > self.send.window {
                self.stats.rcvwinupd += 1;
            }
            self.send.window = seg.tiwin;
            self.send.wl1 = seg.seq;
            self.send.wl2 = seg.ack;
            self.send.max_window = self.send.max_window.max(self.send.window);
            seg.needoutput = true;
        }

        if self.recv.next > self.recv.urgent {
            self.recv.urgent = self.recv.next;
        }

        let fin = if (seg.len() > 0 || seg.flags.fin()) && !self.state.has_received_fin() {
            self.receive_data(seg, io)
        } else {
            false
        };
        if fin {
            self.receive_fin(io);
        }

        if seg.needoutput || self.flags.contains(Control::ACKNOW) {
            self.try_output(io);
        }
        self.check_delack(io);
        Disposition::Accept
    }

    /// Deliver data in order or queue it, returns if the FIN of the peer was reached.
    fn receive_data(&mut self, seg: &Segment<'_>, io: &mut Io) -> bool {
        let start = seg.seq;
        let len = seg.len();
        let fin;

        if seg.seq == self.recv.next && io.reassembly.is_empty() && self.state.is_established() {
            if self.delay_ack(len, io) && !self.flags.contains(Control::ACKNOW) {
                self.flags.insert(Control::DELACK);
            } else {
                self.flags.insert(Control::ACKNOW);
            }
            let accepted = if self.flags.contains(Control::READ_CLOSED) {
                len
            } else {
                io.recv.append(seg.data) as u32
            };
            if accepted < len {
                net_debug!("tcp {}->{}: receive buffer overrun by {} bytes",
                    self.local_port, self.remote_port, len - accepted);
            }
            self.recv.next += accepted;
            self.stats.rcvpack += 1;
            self.stats.rcvbyte += u64::from(accepted);
            fin = seg.flags.fin() && accepted == len;
        } else {
            let rcv_nxt = self.recv.next;
            if seg.seq != rcv_nxt {
                self.stats.rcvoopack += 1;
                self.stats.rcvoobyte += u64::from(len);
            }
            let result = io.reassembly.insert(rcv_nxt, seg.seq, seg.data, seg.flags.fin(), &mut *io.recv);
            self.recv.next += result.delivered;
            fin = result.fin;
            self.flags.insert(Control::ACKNOW);
        }

        if self.flags.contains(Control::SACK_PERMIT) && len > 0 {
            self.report.update(self.recv.next, start, start + len);
        }
        fin
    }

    /// The peer closed its direction.
    fn receive_fin(&mut self, io: &mut Io) {
        if !self.state.has_received_fin() {
            if self.flags.contains(Control::NEEDSYN) {
                self.flags.insert(Control::DELACK);
            } else {
                self.flags.insert(Control::ACKNOW);
            }
            self.recv.next += 1;
        }
        match self.state {
            State::SynReceived | State::Established => self.set_state(State::CloseWait),
            State::FinWait1 => self.set_state(State::Closing),
            State::FinWait2 => self.enter_time_wait(io),
            _ => (),
        }
    }

    pub(crate) fn enter_time_wait(&mut self, io: &mut Io) {
        self.set_state(State::TimeWait);
        for &timer in Timer::ALL.iter() {
            io.timers.cancel(timer);
        }
        io.timers.arm(Timer::TwoMsl, self.config.two_msl());
    }

    /// Check if the acknowledgement of `len` bytes may be delayed.
    fn delay_ack(&self, len: u32, io: &Io) -> bool {
        !io.timers.is_armed(Timer::DelayedAck)
            && !self.flags.contains(Control::RXWIN0SENT)
            && len <= self.t_maxseg
            && (self.config.delack_enabled || self.flags.contains(Control::NEEDSYN))
    }

    /// Answer a suspicious segment with our current state (RFC 5961).
    fn challenge_ack(&mut self, io: &mut Io) {
        net_debug!("tcp {}->{}: challenge ack", self.local_port, self.remote_port);
        self.stats.challenge_ack += 1;
        self.respond(self.recv.next, self.send.next, TcpFlags::ACK, io);
        self.recv.last_ack_sent = self.recv.next;
    }

    /// Answer a segment with a reset, never a reset itself.
    fn drop_with_reset(&mut self, header: &TcpRepr, len: u32, io: &mut Io) {
        if header.flags.rst() {
            return;
        }
        net_debug!("tcp {}->{}: reset in answer to {}", self.local_port, self.remote_port, header);
        if header.flags.ack() {
            self.respond(TcpSeqNumber::default(), header.ack_number, TcpFlags::RST, io);
        } else {
            let ack = header.seq_number + header.sequence_len(len as usize);
            self.respond(ack, TcpSeqNumber::default(), TcpFlags::RST | TcpFlags::ACK, io);
        }
    }
}

#[cfg(test)]
mod test {
    use crate::wire::TcpTimestamp;
    use super::super::config::Config;
    use super::super::tests::{segment, Endpoint};
    use super::super::timer::TimerService;
    use super::*;

    fn config() -> Config {
        Config {
            mss_default: 1000,
            do_rfc1323: false,
            do_sack: false,
            ..Config::default()
        }
    }

    /// A listener that answered a SYN with sequence number 5000 from 1000.
    fn half_open() -> Endpoint {
        let mut server = Endpoint::new(config(), 80, 49152);
        server.conn.listen(TcpSeqNumber(5000)).unwrap();
        server.input(segment(TcpSeqNumber(1000), TcpSeqNumber(0), TcpFlags::SYN, b""));
        server
    }

    /// An established connection, ours is 5001 and the peer's is 1001.
    fn established() -> Endpoint {
        let mut server = half_open();
        server.outbox.segments.clear();
        server.input(segment(TcpSeqNumber(1001), TcpSeqNumber(5001), TcpFlags::ACK, b""));
        assert_eq!(server.conn.state(), State::Established);
        server
    }

    #[test]
    fn listen_answers_syn() {
        let mut server = half_open();
        assert_eq!(server.conn.state(), State::SynReceived);
        assert_eq!(server.events.accepted, 1);
        let synack = server.outbox.pop().unwrap();
        assert_eq!(synack.header.flags, TcpFlags::SYN | TcpFlags::ACK);
        assert_eq!(synack.header.seq_number, TcpSeqNumber(5000));
        assert_eq!(synack.header.ack_number, TcpSeqNumber(1001));
        assert_eq!(synack.header.options.mss, Some(1000));
        assert!(server.timers.is_armed(Timer::Retransmit));
        assert!(server.timers.is_armed(Timer::Keepalive));
    }

    #[test]
    fn listen_resets_ack() {
        let mut server = Endpoint::new(config(), 80, 49152);
        server.conn.listen(TcpSeqNumber(5000)).unwrap();
        server.input(segment(TcpSeqNumber(1000), TcpSeqNumber(777), TcpFlags::ACK, b""));
        let reset = server.outbox.pop().unwrap();
        assert_eq!(reset.header.flags, TcpFlags::RST);
        assert_eq!(reset.header.seq_number, TcpSeqNumber(777));
        assert_eq!(server.conn.state(), State::Listen);

        // Segments without SYN are dropped silently.
        server.input(segment(TcpSeqNumber(1000), TcpSeqNumber(0), TcpFlags::empty(), b""));
        assert!(server.outbox.is_empty());
        assert_eq!(server.conn.stats().badsyn, 2);
    }

    #[test]
    fn listen_resumes_half_open() {
        let mut server = Endpoint::new(config(), 80, 49152);
        server.conn.listen(TcpSeqNumber(5000)).unwrap();
        server.input(segment(TcpSeqNumber(1001), TcpSeqNumber(5001), TcpFlags::ACK, b"ab"));
        assert_eq!(server.conn.state(), State::Established);
        assert_eq!(server.events.accepted, 1);
        assert_eq!(server.conn.recv_state().next, TcpSeqNumber(1003));
        assert_eq!(server.recv.len(), 2);
    }

    #[test]
    fn closed_answers_with_reset() {
        let mut server = Endpoint::new(config(), 80, 49152);
        server.input(segment(TcpSeqNumber(1000), TcpSeqNumber(0), TcpFlags::SYN, b"ab"));
        let reset = server.outbox.pop().unwrap();
        assert_eq!(reset.header.flags, TcpFlags::RST | TcpFlags::ACK);
        // SYN and two bytes of data.
        assert_eq!(reset.header.ack_number, TcpSeqNumber(1003));

        // Never answer a reset.
        server.input(segment(TcpSeqNumber(1000), TcpSeqNumber(0), TcpFlags::RST, b""));
        assert!(server.outbox.is_empty());
    }

    #[test]
    fn handshake_completes() {
        let server = established();
        assert_eq!(server.conn.stats().connects, 1);
        assert_eq!(server.conn.send_state().unacked, TcpSeqNumber(5001));
        assert!(!server.timers.is_armed(Timer::Retransmit));
    }

    #[test]
    fn in_order_data_is_predicted() {
        let mut server = established();
        server.input(segment(TcpSeqNumber(1001), TcpSeqNumber(5001), TcpFlags::ACK, b"hello"));
        assert_eq!(server.conn.stats().preddat, 1);
        assert_eq!(server.conn.recv_state().next, TcpSeqNumber(1006));
        assert_eq!(server.recv.len(), 5);
        // The first segment is acknowledged with a delay.
        assert!(server.outbox.is_empty());
        assert!(server.timers.is_armed(Timer::DelayedAck));

        // The second one at once.
        server.input(segment(TcpSeqNumber(1006), TcpSeqNumber(5001), TcpFlags::ACK, b"world"));
        let ack = server.outbox.pop().unwrap();
        assert_eq!(ack.header.ack_number, TcpSeqNumber(1011));
        assert!(!server.timers.is_armed(Timer::DelayedAck));
    }

    #[test]
    fn out_of_order_data_is_queued() {
        let mut server = established();
        server.input(segment(TcpSeqNumber(1006), TcpSeqNumber(5001), TcpFlags::ACK, b"world"));
        assert_eq!(server.conn.stats().rcvoopack, 1);
        // A duplicate acknowledgement asks for the missing data.
        let dupack = server.outbox.pop().unwrap();
        assert_eq!(dupack.header.ack_number, TcpSeqNumber(1001));

        server.input(segment(TcpSeqNumber(1001), TcpSeqNumber(5001), TcpFlags::ACK, b"hello"));
        assert_eq!(server.conn.recv_state().next, TcpSeqNumber(1011));
        let mut buffer = [0; 10];
        assert_eq!(server.recv.read(&mut buffer), 10);
        assert_eq!(&buffer, b"helloworld");
    }

    #[test]
    fn reset_in_window_is_challenged() {
        let mut server = established();
        server.input(segment(TcpSeqNumber(1500), TcpSeqNumber(5001), TcpFlags::RST, b""));
        assert_eq!(server.conn.state(), State::Established);
        assert_eq!(server.conn.stats().challenge_ack, 1);
        let challenge = server.outbox.pop().unwrap();
        assert_eq!(challenge.header.flags, TcpFlags::ACK);
        assert_eq!(challenge.header.ack_number, TcpSeqNumber(1001));

        // Outside of the window it is ignored.
        server.input(segment(TcpSeqNumber(900), TcpSeqNumber(5001), TcpFlags::RST, b""));
        assert_eq!(server.conn.stats().badrst, 1);
        assert!(server.outbox.is_empty());

        // At the expected sequence number it is accepted.
        server.input(segment(TcpSeqNumber(1001), TcpSeqNumber(5001), TcpFlags::RST, b""));
        assert_eq!(server.conn.state(), State::Closed);
        assert_eq!(server.events.closed, Some(Some(DropReason::ConnectionReset)));
    }

    #[test]
    fn syn_when_synchronized_is_challenged() {
        let mut server = established();
        server.input(segment(TcpSeqNumber(3000), TcpSeqNumber(0), TcpFlags::SYN, b""));
        assert_eq!(server.conn.state(), State::Established);
        assert_eq!(server.conn.stats().badsyn, 1);
        assert_eq!(server.conn.stats().challenge_ack, 1);
        assert_eq!(server.outbox.len(), 1);
    }

    #[test]
    fn ack_of_unsent_data() {
        let mut server = established();
        server.input(segment(TcpSeqNumber(1001), TcpSeqNumber(9000), TcpFlags::ACK, b""));
        assert_eq!(server.conn.stats().rcvacktoomuch, 1);
        let ack = server.outbox.pop().unwrap();
        assert_eq!(ack.header.seq_number, TcpSeqNumber(5001));
    }

    #[test]
    fn duplicate_data_is_acknowledged() {
        let mut server = established();
        server.input(segment(TcpSeqNumber(1001), TcpSeqNumber(5001), TcpFlags::ACK, b"hello"));
        server.outbox.segments.clear();
        server.input(segment(TcpSeqNumber(1001), TcpSeqNumber(5001), TcpFlags::ACK | TcpFlags::PSH, b"hello"));
        assert_eq!(server.conn.stats().rcvduppack, 1);
        assert_eq!(server.conn.stats().rcvdupbyte, 5);
        let ack = server.outbox.pop().unwrap();
        assert_eq!(ack.header.ack_number, TcpSeqNumber(1006));
        assert_eq!(server.recv.len(), 5);
    }

    #[test]
    fn missing_timestamp_dropped() {
        let config = Config { do_rfc1323: true, ..config() };
        let mut server = Endpoint::new(config, 80, 49152);
        server.conn.listen(TcpSeqNumber(5000)).unwrap();
        let mut syn = segment(TcpSeqNumber(1000), TcpSeqNumber(0), TcpFlags::SYN, b"");
        syn.header.options.timestamp = Some(TcpTimestamp { tsval: 10, tsecr: 0 });
        server.input(syn);
        assert!(server.conn.timestamps());

        server.input(segment(TcpSeqNumber(1001), TcpSeqNumber(5001), TcpFlags::ACK, b""));
        assert_eq!(server.conn.stats().rcvbadopt, 1);
        assert_eq!(server.conn.state(), State::SynReceived);
    }
}
