//! The output engine.
//!
//! Decides if a segment should be sent at all, then builds it: flags derived from the state,
//! options, the payload range of the send buffer and the advertised window. Afterwards the
//! sequence variables and the retransmit or persist timer are updated. When more than one segment
//! worth of data may be sent the engine loops until the window is used up.
use crate::time::ticks_since;
use crate::wire::{EcnCodepoint, TcpFlags, TcpOptions, TcpRepr, TcpSeqNumber, TcpTimestamp};

use super::config::EcnMode;
use super::congestion::MAX_WIN;
use super::connection::{Connection, Control, State};
use super::error::TransmitError;
use super::io::{Io, OutSegment};
use super::timer::Timer;

/// Length of a padded timestamp option.
const TIMESTAMP_LEN: i64 = 12;

impl Connection {
    /// Send whatever the state, the windows and the send buffer permit.
    ///
    /// Sends at most as many segments as the congestion and peer window allow, and a pure
    /// acknowledgement or window update when one is due. Errors of the segment sink are
    /// returned unless they are transient: when the sink lacks buffers the congestion window is
    /// reduced to one segment, an unreachable network is remembered as a soft error of a
    /// synchronized connection.
    pub fn output(&mut self, io: &mut Io) -> Result<(), TransmitError> {
        let now = io.now.ticks();

        let idle = self.send.max == self.send.unacked;
        let rxtcur = self.rtt.rxtcur as i32;
        if idle && (ticks_since(now, self.rcvtime) >= rxtcur
            || (self.sndtime != 0 && ticks_since(now, self.sndtime) >= rxtcur))
        {
            self.cc_after_idle(now);
        }

        loop {
            if self.flags.contains(Control::SACK_PERMIT) && self.send.next < self.send.max {
                self.send.next = self.scoreboard.adjust(self.send.next);
            }

            let mut sendalot = false;
            let queued = io.send.queued_bytes() as i64;
            let mut off = i64::from(self.send.next - self.send.unacked);
            let mut sendwin = self.send.window.min(self.window.cwnd);
            let mut flags = self.state.outflags();
            let mut len: i64 = 0;

            // Retransmit from the first hole that still needs it.
            let mut sack_rxmit = None;
            let mut sack_bytes_rxmt = 0;
            if self.flags.contains(Control::SACK_PERMIT) && self.window.fast_recovery {
                sack_bytes_rxmt = self.scoreboard.sack_bytes_rexmit;
                if let Some(index) = self.scoreboard.next_hole() {
                    let hole = self.scoreboard.hole(index);
                    let cwin = i64::from(self.send.window.min(self.window.cwnd))
                        - i64::from(sack_bytes_rxmt);
                    let cwin = cwin.max(0);
                    let candidate = if hole.end > self.recover {
                        if hole.rxmit >= self.recover {
                            None
                        } else {
                            Some(cwin.min(i64::from(self.recover - hole.rxmit)))
                        }
                    } else {
                        Some(cwin.min(i64::from(hole.end - hole.rxmit)))
                    };
                    if let Some(candidate) = candidate {
                        len = candidate;
                        off = i64::from(hole.rxmit - self.send.unacked);
                        if len > 0 {
                            sack_rxmit = Some(index);
                            sendalot = true;
                            self.stats.sack_rexmits += 1;
                            self.stats.sack_rexmit_bytes += len.min(i64::from(self.maxseg())) as u64;
                        }
                    }
                }
            }

            if self.flags.contains(Control::NEEDFIN) {
                flags.insert(TcpFlags::FIN);
            }
            if self.flags.contains(Control::NEEDSYN) {
                flags.insert(TcpFlags::SYN);
            }

            // A window probe sends one byte into a zero window.
            if self.flags.contains(Control::FORCEDATA) {
                if sendwin == 0 {
                    if off < queued {
                        flags.remove(TcpFlags::FIN);
                    }
                    sendwin = 1;
                } else {
                    io.timers.cancel(Timer::Persist);
                    self.rtt.rxtshift = 0;
                }
            }

            if sack_rxmit.is_none() {
                if sack_bytes_rxmt == 0 {
                    len = queued.min(i64::from(sendwin)) - off;
                } else {
                    len = queued.min(i64::from(self.send.window)) - off;
                    if len > 0 {
                        let cwin = i64::from(self.window.cwnd)
                            - i64::from(self.send.next - self.recover)
                            - i64::from(sack_bytes_rxmt);
                        len = len.min(cwin.max(0));
                    }
                }
            }

            // The SYN occupies the first sequence number, data follows it.
            if flags.syn() && self.send.next > self.send.unacked {
                if self.state != State::SynReceived {
                    flags.remove(TcpFlags::SYN);
                }
                off -= 1;
                len += 1;
            }

            if len <= 0 {
                len = 0;
                // Zero window with data waiting, probe it.
                if sendwin == 0 && self.state.is_established() && off < queued {
                    io.timers.cancel(Timer::Retransmit);
                    self.rtt.rxtshift = 0;
                    self.send.next = self.send.unacked;
                    if !io.timers.is_armed(Timer::Persist) {
                        self.set_persist(io);
                    }
                }
            }

            let end = match sack_rxmit {
                Some(index) => self.scoreboard.hole(index).rxmit + len as u32,
                None => self.send.next + len as u32,
            };
            if end < self.send.unacked + queued as u32 {
                flags.remove(TcpFlags::FIN);
            }

            let hiwat = io.recv.capacity().min(u32::max_value() as usize) as i64;
            let mut recwin = i64::from(self.recv_space(io))
                .min(i64::from(MAX_WIN) << self.recv.scale);
            let t_maxseg = i64::from(self.t_maxseg);

            let should_send = self.should_send(
                io, flags, len, off, queued, recwin, hiwat, idle, sack_rxmit.is_some());
            if !should_send {
                return Ok(());
            }

            if flags.syn() {
                self.send.next = self.send.initial_seq;
            }

            let mut options = TcpOptions::default();
            if flags.syn() {
                options.mss = Some(self.config.mss_default.min(u32::from(u16::max_value())) as u16);
                if self.flags.contains(Control::REQ_SCALE) {
                    options.window_scale = Some(self.recv.request_scale);
                }
            }
            if self.flags.contains(Control::RCVD_TSTMP)
                || (flags.syn() && self.flags.contains(Control::REQ_TSTMP))
            {
                options.timestamp = Some(TcpTimestamp {
                    tsval: self.ts_now(now),
                    tsecr: self.ts_recent,
                });
                if self.rtt.rxtshift == 1 {
                    self.badrxtwin = now;
                }
            }
            if self.flags.contains(Control::SACK_PERMIT) {
                if flags.syn() {
                    options.sack_permitted = true;
                } else if self.state.is_established() && !self.report.is_empty() {
                    options.sack_blocks = self.report.blocks();
                }
            }
            let optlen = options.len() as i64;

            if len + optlen > t_maxseg {
                flags.remove(TcpFlags::FIN);
                if optlen >= t_maxseg {
                    self.stats.snderr += 1;
                    return Err(TransmitError::MessageTooLarge);
                }
                len = t_maxseg - optlen;
                sendalot = true;
            }

            let forced_probe = self.flags.contains(Control::FORCEDATA) && len == 1;
            if len > 0 {
                if forced_probe {
                    self.stats.sndprobe += 1;
                } else if self.send.next < self.send.max || sack_rxmit.is_some() {
                    self.stats.sndrexmitpack += 1;
                    self.stats.sndrexmitbyte += len as u64;
                } else {
                    self.stats.sndpack += 1;
                    self.stats.sndbyte += len as u64;
                }
                if off + len == queued && !flags.syn() {
                    flags.insert(TcpFlags::PSH);
                }
            } else if self.flags.contains(Control::ACKNOW) {
                self.stats.sndacks += 1;
            } else if flags.intersects(TcpFlags::SYN | TcpFlags::FIN | TcpFlags::RST) {
                self.stats.sndctrl += 1;
            } else {
                self.stats.sndwinup += 1;
            }

            // A FIN sent again must carry its original sequence number.
            if flags.fin() && self.flags.contains(Control::SENTFIN) && self.send.next == self.send.max {
                self.send.next -= 1;
            }

            let mut ecn = EcnCodepoint::NotEct;
            if self.state == State::SynSent && self.config.ecn == EcnMode::Enabled {
                if self.rtt.rxtshift == 0 || self.rtt.rxtshift <= self.config.ecn_max_retries {
                    flags.insert(TcpFlags::ECE | TcpFlags::CWR);
                }
            }
            if self.state == State::SynReceived && self.flags.contains(Control::ECN_SND_ECE) {
                flags.insert(TcpFlags::ECE);
                self.flags.remove(Control::ECN_SND_ECE);
            }
            if self.state == State::Established && self.flags.contains(Control::ECN_PERMIT) {
                let new_data = len > 0
                    && self.send.next >= self.send.max
                    && sack_rxmit.is_none()
                    && !(forced_probe && self.send.unacked < self.send.max);
                if new_data {
                    ecn = EcnCodepoint::Ect0;
                    self.stats.ecn_ect0 += 1;
                    if self.flags.contains(Control::ECN_SND_CWR) {
                        flags.insert(TcpFlags::CWR);
                        self.flags.remove(Control::ECN_SND_CWR);
                    }
                }
                if self.flags.contains(Control::ECN_SND_ECE) {
                    flags.insert(TcpFlags::ECE);
                }
            }

            let seq = match sack_rxmit {
                None if len > 0
                    || flags.intersects(TcpFlags::SYN | TcpFlags::FIN)
                    || io.timers.is_armed(Timer::Persist) => self.send.next,
                None => self.send.max,
                Some(index) => {
                    let rxmit = self.scoreboard.hole(index).rxmit;
                    self.scoreboard.retransmitted(index, len as u32);
                    rxmit
                },
            };
            if self.window.in_recovery() {
                self.scoreboard.prr_out += len as u32;
            }

            if flags.rst() {
                recwin = 0;
            } else {
                if recwin < hiwat / 4 && recwin < t_maxseg {
                    recwin = 0;
                }
                let advertised = i64::from(self.recv.advertised - self.recv.next);
                if recwin < advertised {
                    recwin = advertised;
                }
            }
            let window = if flags.syn() {
                i64::from(self.recv_space(io)).min(i64::from(MAX_WIN))
            } else {
                let granularity = 1i64 << self.recv.scale;
                let rounded = (recwin + granularity - 1) & !(granularity - 1);
                (rounded >> self.recv.scale).min(i64::from(MAX_WIN))
            };
            if window == 0 {
                self.flags.insert(Control::RXWIN0SENT);
            } else {
                self.flags.remove(Control::RXWIN0SENT);
            }
            if self.send.urgent <= self.send.next {
                self.send.urgent = self.send.unacked;
            }

            let header = TcpRepr {
                src_port: self.local_port,
                dst_port: self.remote_port,
                seq_number: seq,
                ack_number: if flags.ack() { self.recv.next } else { TcpSeqNumber::default() },
                flags,
                window_len: window as u16,
                urgent_at: 0,
                options,
            };
            let data_off = off.max(0) as usize;
            let payload = io.send.fetch_region(data_off, len as usize);
            net_trace!("tcp {}->{}: send {} len {}", self.local_port, self.remote_port, header, len);
            let result = io.sink.send(OutSegment { header, payload, ecn });

            // Advance the sequence variables, a probe into a persisting window excepted.
            if !self.flags.contains(Control::FORCEDATA) || !io.timers.is_armed(Timer::Persist) {
                let startseq = self.send.next;
                if flags.syn() {
                    self.send.next += 1;
                }
                if flags.fin() {
                    self.send.next += 1;
                    self.flags.insert(Control::SENTFIN);
                }
                if sack_rxmit.is_none() {
                    self.send.next += len as u32;
                    if self.send.next > self.send.max {
                        self.send.max = self.send.next;
                        self.sndtime = now;
                        if self.rtt.rtttime == 0 {
                            self.rtt.start_timing(now, startseq);
                            self.stats.segstimed += 1;
                        }
                    }
                }

                let outstanding = match sack_rxmit {
                    Some(_) => self.send.next != self.send.max,
                    None => self.send.next != self.send.unacked,
                };
                if !io.timers.is_armed(Timer::Retransmit) && outstanding {
                    if io.timers.is_armed(Timer::Persist) {
                        io.timers.cancel(Timer::Persist);
                        self.rtt.rxtshift = 0;
                    }
                    io.timers.arm(Timer::Retransmit, self.rtt.rxtcur);
                } else if len == 0
                    && queued > 0
                    && !io.timers.is_armed(Timer::Retransmit)
                    && !io.timers.is_armed(Timer::Persist)
                {
                    self.rtt.rxtshift = 0;
                    self.set_persist(io);
                }
            } else {
                let mut xlen = len as u32;
                if flags.syn() {
                    xlen += 1;
                }
                if flags.fin() {
                    xlen += 1;
                    self.flags.insert(Control::SENTFIN);
                }
                if self.send.next + xlen > self.send.max {
                    self.send.max = self.send.next + xlen;
                }
            }

            if result.is_ok()
                && self.state.is_established()
                && self.flags.contains(Control::SACK_PERMIT)
                && !self.report.is_empty()
            {
                self.report.clean_dsack(self.recv.next);
            }

            if let Err(err) = result {
                self.stats.snderr += 1;
                let persisting = self.flags.contains(Control::FORCEDATA)
                    && io.timers.is_armed(Timer::Persist);
                if !persisting && !flags.syn() && err != TransmitError::PermissionDenied {
                    match sack_rxmit {
                        Some(index) => self.scoreboard.retransmit_failed(index, len as u32),
                        None => self.send.next -= len as u32,
                    }
                }
                return match err {
                    TransmitError::PermissionDenied => {
                        self.softerror = Some(err);
                        Err(err)
                    },
                    TransmitError::NoBuffer => {
                        self.window.cwnd = self.t_maxseg;
                        Ok(())
                    },
                    TransmitError::Unreachable | TransmitError::NetworkDown
                        if self.state.is_synchronized() =>
                    {
                        self.softerror = Some(err);
                        Ok(())
                    },
                    err => Err(err),
                };
            }

            self.stats.sndtotal += 1;
            let right_edge = self.recv.next + recwin as u32;
            if right_edge > self.recv.advertised {
                self.recv.advertised = right_edge;
            }
            self.recv.last_ack_sent = self.recv.next;
            self.flags.remove(Control::ACKNOW);
            self.flags.remove(Control::DELACK);
            io.timers.cancel(Timer::DelayedAck);

            if !sendalot {
                return Ok(());
            }
        }
    }

    /// Decide if a segment is due, arming the timers of a sender that waits.
    fn should_send(
        &mut self,
        io: &mut Io,
        flags: TcpFlags,
        len: i64,
        off: i64,
        queued: i64,
        recwin: i64,
        hiwat: i64,
        idle: bool,
        sack_rxmit: bool,
    ) -> bool {
        let t_maxseg = i64::from(self.t_maxseg);

        // Sender silly window avoidance.
        if len > 0 {
            let tslen = if self.flags.contains(Control::RCVD_TSTMP) { TIMESTAMP_LEN } else { 0 };
            let max_window = i64::from(self.send.max_window);
            if len >= t_maxseg
                || tslen + len >= t_maxseg
                || ((idle || self.flags.contains(Control::NODELAY)) && len + off >= queued)
                || self.flags.contains(Control::FORCEDATA)
                || (max_window > 0 && len >= max_window / 2)
                || self.send.next < self.send.max
                || sack_rxmit
            {
                return true;
            }
        }

        // Window updates, only when they open the window considerably.
        if recwin > 0
            && !self.flags.intersects(Control::NEEDSYN | Control::DELACK)
            && !self.state.has_received_fin()
        {
            let scale = self.recv.scale;
            let oldwin = if self.recv.advertised > self.recv.next {
                i64::from(self.recv.advertised - self.recv.next)
            } else {
                0
            };
            let adv = if recwin > oldwin { recwin - oldwin } else { 0 };
            if oldwin >> scale < (adv + oldwin) >> scale {
                if adv >= 2 * t_maxseg
                    && (adv >= hiwat / 4
                        || recwin <= hiwat / 8
                        || hiwat <= 8 * t_maxseg
                        || adv >= i64::from(MAX_WIN) << scale)
                {
                    return true;
                }
                if 2 * adv >= hiwat {
                    return true;
                }
            }
        }

        if self.flags.contains(Control::ACKNOW)
            || flags.rst()
            || (flags.syn() && !self.flags.contains(Control::NEEDSYN))
            || self.send.urgent > self.send.unacked
            || (flags.fin()
                && (!self.flags.contains(Control::SENTFIN) || self.send.next == self.send.unacked))
        {
            return true;
        }

        let armed = io.timers.is_armed(Timer::Retransmit) || io.timers.is_armed(Timer::Persist);
        if self.flags.contains(Control::SACK_PERMIT) && self.send.max > self.send.unacked && !armed {
            io.timers.arm(Timer::Retransmit, self.rtt.rxtcur);
            return false;
        }
        if queued > 0 && !armed {
            self.rtt.rxtshift = 0;
            self.set_persist(io);
        }
        false
    }
}
