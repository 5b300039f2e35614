//! Handlers of expired timers.
use super::congestion::Signal;
use super::connection::{Connection, Control, State, BACKOFF, SYN_BACKOFF, TOTAL_BACKOFF};
use super::error::DropReason;
use super::io::Io;
use super::rtt::MAX_RXT_SHIFT;
use super::timer::Timer;
use crate::wire::TcpFlags;

impl Connection {
    /// Handle the expiration of `timer`.
    ///
    /// The timer service must have disarmed the timer already, the handler may arm it again. An
    /// expiration on a closed connection is ignored.
    pub fn on_timer(&mut self, timer: Timer, io: &mut Io<'_>) {
        if self.state == State::Closed {
            return;
        }
        net_trace!("tcp {}->{}: {:?} timer expired in {:?}",
            self.local_port, self.remote_port, timer, self.state);
        match timer {
            Timer::Retransmit => self.retransmit_timeout(io),
            Timer::Persist => self.persist_timeout(io),
            Timer::Keepalive => self.keepalive_timeout(io),
            Timer::TwoMsl => self.two_msl_timeout(io),
            Timer::DelayedAck => self.delack_timeout(io),
        }
    }

    fn delack_timeout(&mut self, io: &mut Io) {
        self.flags.insert(Control::ACKNOW);
        self.stats.delack += 1;
        self.try_output(io);
    }

    /// Ends `TIME_WAIT`, or a `FIN_WAIT_2` nobody reads from anymore.
    fn two_msl_timeout(&mut self, io: &mut Io) {
        let now = io.now.ticks();
        self.scoreboard.free();
        let limit = if self.state == State::FinWait2 {
            self.config.keep_max_idle()
        } else {
            self.config.two_msl()
        };
        let idle = self.idle_time(now);
        if idle < limit {
            io.timers.arm(Timer::TwoMsl, limit - idle);
        } else {
            self.close_connection(None, io);
        }
    }

    fn keepalive_timeout(&mut self, io: &mut Io) {
        let now = io.now.ticks();
        let idle = self.idle_time(now);
        // Segments do not move the timer, it may not be due yet.
        if self.state >= State::Established && idle < self.config.keep_idle {
            io.timers.arm(Timer::Keepalive, self.config.keep_idle - idle);
            return;
        }

        self.stats.keeptimeo += 1;
        if self.state < State::Established {
            // The handshake did not complete in time.
            self.stats.keepdrops += 1;
            self.drop_connection(DropReason::TimedOut, io);
            return;
        }

        if self.config.keepalive && self.state <= State::Closing {
            if idle >= self.config.keep_idle.saturating_add(self.config.keep_max_idle()) {
                self.stats.keepdrops += 1;
                self.drop_connection(DropReason::TimedOut, io);
                return;
            }
            // An old sequence number forces the peer to answer, with a reset if it forgot us.
            self.stats.keepprobe += 1;
            self.respond(self.recv.next, self.send.unacked - 1, TcpFlags::ACK, io);
            io.timers.arm(Timer::Keepalive, self.config.keep_intvl);
        } else {
            io.timers.arm(Timer::Keepalive, self.config.keep_idle);
        }
    }

    /// Probe a zero window, dropping the connection when the peer stays silent for too long.
    fn persist_timeout(&mut self, io: &mut Io) {
        let now = io.now.ticks();
        let idle = self.idle_time(now);
        self.stats.persisttimeo += 1;

        let max_idle = match self.config.max_persist_idle {
            0 => self.config.keep_idle,
            max_idle => max_idle,
        };
        let backoff_limit = self.rtt.rexmtval().saturating_mul(TOTAL_BACKOFF);
        if self.rtt.rxtshift == MAX_RXT_SHIFT && (idle >= max_idle || idle >= backoff_limit) {
            self.stats.persistdrop += 1;
            self.drop_connection(DropReason::TimedOut, io);
            return;
        }
        // The user closed, give up much sooner.
        if self.state > State::CloseWait && idle >= self.config.persist_max {
            self.stats.persistdrop += 1;
            self.drop_connection(DropReason::TimedOut, io);
            return;
        }

        self.set_persist(io);
        self.flags.insert(Control::FORCEDATA);
        self.try_output(io);
        self.flags.remove(Control::FORCEDATA);
    }

    /// Back off and retransmit from `snd_una`.
    fn retransmit_timeout(&mut self, io: &mut Io) {
        let now = io.now.ticks();
        self.scoreboard.free();

        self.rtt.rxtshift += 1;
        if self.rtt.rxtshift > MAX_RXT_SHIFT {
            self.rtt.rxtshift = MAX_RXT_SHIFT;
            self.stats.timeoutdrop += 1;
            self.drop_connection(DropReason::TimedOut, io);
            return;
        }

        if self.state != State::SynSent && self.rtt.rxtshift == 1 {
            // Remember the window to undo a spurious timeout.
            self.prev.cwnd = self.window.cwnd;
            self.prev.ssthresh = self.window.ssthresh;
            self.prev.recover = self.recover;
            if self.window.fast_recovery {
                self.flags.insert(Control::WASFRECOVERY);
            } else {
                self.flags.remove(Control::WASFRECOVERY);
            }
            if self.window.cong_recovery {
                self.flags.insert(Control::WASCRECOVERY);
            } else {
                self.flags.remove(Control::WASCRECOVERY);
            }
            // With timestamps the output engine records the time of the retransmission instead.
            if !self.flags.contains(Control::RCVD_TSTMP) {
                self.badrxtwin = now.wrapping_add((self.rtt.srtt.max(0) >> 6) as u32);
            }
            self.flags.insert(Control::PREVVALID);
        } else {
            self.flags.remove(Control::PREVVALID);
        }

        let shift = self.rtt.rxtshift as usize;
        let rexmt = match self.state {
            State::SynSent | State::Listen | State::SynReceived =>
                self.config.rexmit_initial.saturating_mul(SYN_BACKOFF[shift]),
            _ => self.rtt.rexmtval().saturating_mul(BACKOFF[shift]),
        };
        self.rtt.rxtcur = self.rtt.range(rexmt, self.rtt.rttmin);
        self.stats.rexmttimeo += 1;
        net_debug!("tcp {}->{}: retransmit timeout, backoff {} to {}",
            self.local_port, self.remote_port, self.rtt.rxtshift, self.rtt.rxtcur);

        self.send.next = self.send.unacked;
        self.recover = self.send.max;
        self.flags.insert(Control::ACKNOW);
        // A sample of this window would include the timeout.
        self.rtt.rtttime = 0;

        self.cc_cong_signal(now, self.send.unacked, Signal::Rto);
        if self.state == State::SynSent {
            // Limits the initial window once the handshake completes.
            self.window.cwnd = 1;
        }
        self.try_output(io);
    }
}
