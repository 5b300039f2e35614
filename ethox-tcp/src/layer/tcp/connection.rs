use crate::time::{ticks_since, Instant, Ticks};
use crate::wire::{TcpFlags, TcpOptions, TcpRepr, TcpSeqNumber, TcpTimestamp};

use super::config::{Config, ConfigError};
use super::congestion::{AckKind, CongestionControl, Context, Signal, Window, MAX_WIN};
use super::error::{DropReason, TransmitError, UserError};
use super::io::{Io, OutSegment, Region};
use super::rtt::RttEstimator;
use super::sack::{SackReport, Scoreboard};
use super::stats::Stats;
use super::timer::Timer;

/// The largest window shift of RFC 7323.
pub(crate) const MAX_WINSHIFT: u8 = 14;

/// The upper bound on option bytes in a header.
const MAX_TCP_OPTLEN: u32 = 40;

/// The segment size assumed by the initial window formula of RFC 6928.
const INITIAL_WINDOW_MSS: u32 = 1460;

/// The connection control block.
///
/// Contains the current state machine state, the sequence variables of both directions, the
/// congestion and round trip estimation state as well as the negotiated options. The buffers,
/// timers and the link are not part of the control block, they are reached through the [`Io`]
/// passed to each call.
///
/// A connection starts out `Closed`. It is opened actively with `connect`, passively with
/// `listen`, and driven afterwards by `input`, `on_timer` and the user calls.
///
/// [`Io`]: struct.Io.html
#[derive(Clone, Debug)]
pub struct Connection {
    /// The current state of the state machine.
    pub(crate) state: State,

    /// Control flags, see `Control`.
    pub(crate) flags: Control,

    /// The tunables, fixed at creation.
    pub(crate) config: Config,

    /// The port of this side, used when answering segments.
    pub(crate) local_port: u16,

    /// The port of the peer.
    pub(crate) remote_port: u16,

    /// The sending state.
    ///
    /// In RFC793 this is referred to as `SND`.
    pub(crate) send: Send,

    /// The receiving state.
    ///
    /// In RFC793 this is referred to as `RCV`.
    pub(crate) recv: Receive,

    /// Congestion window and threshold, shared with the congestion control algorithm.
    pub(crate) window: Window,

    /// The sequence number that ends the current recovery.
    ///
    /// Initially set to the initial sequence number (ISS).
    pub(crate) recover: TcpSeqNumber,

    /// Consecutive duplicate acknowledgements.
    pub(crate) dupacks: u32,

    /// Segments sent by limited transmit, at most two.
    pub(crate) snd_limited: u32,

    /// The congestion control algorithm.
    pub(crate) cc: CongestionControl,

    /// Round trip estimation and retransmit timeout.
    pub(crate) rtt: RttEstimator,

    /// The timestamp to echo in our next segment.
    pub(crate) ts_recent: u32,

    /// The tick at which `ts_recent` was recorded.
    pub(crate) ts_recent_age: Ticks,

    /// Added to the clock for our timestamp values.
    pub(crate) ts_offset: u32,

    /// The segment size negotiated with the peer, before options.
    pub(crate) t_maxseg: u32,

    /// The tick at which the last segment was received.
    pub(crate) rcvtime: Ticks,

    /// The tick at which new data was last sent, zero before that.
    pub(crate) sndtime: Ticks,

    /// Holes in the data acknowledged by the peer.
    pub(crate) scoreboard: Scoreboard,

    /// Out-of-order data we report to the peer.
    pub(crate) report: SackReport,

    /// The congestion state before the first retransmit timeout.
    pub(crate) prev: Snapshot,

    /// Acknowledgements echoing a timestamp before this tick reveal a spurious timeout.
    pub(crate) badrxtwin: Ticks,

    /// The last transmission error of a synchronized connection.
    pub(crate) softerror: Option<TransmitError>,

    /// The reason the connection was dropped.
    pub(crate) error: Option<DropReason>,

    /// The event counters.
    pub(crate) stats: Stats,
}

/// The sending state of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Send {
    /// The next not yet acknowledged sequence number.
    ///
    /// In RFC793 this is referred to as `SND.UNA`.
    pub unacked: TcpSeqNumber,

    /// The next sequence number to use for transmission.
    ///
    /// Moves back to `unacked` for a retransmission. In RFC793 this is referred to as `SND.NXT`.
    pub next: TcpSeqNumber,

    /// The highest sequence number sent so far.
    ///
    /// Never decreases, unlike `next`.
    pub max: TcpSeqNumber,

    /// The send window size indicated by the receiver.
    ///
    /// Must not send packet containing a sequence number beyond `unacked + window`. In RFC793 this
    /// is referred to as `SND.WND`.
    pub window: u32,

    /// The send urgent pointer.
    ///
    /// In RFC793 this is referred to as `SND.UP`.
    pub urgent: TcpSeqNumber,

    /// Sequence number of the segment used for the last window update.
    ///
    /// In RFC793 this is referred to as `SND.WL1`.
    pub wl1: TcpSeqNumber,

    /// Acknowledgement number of the segment used for the last window update.
    ///
    /// In RFC793 this is referred to as `SND.WL2`.
    pub wl2: TcpSeqNumber,

    /// The initial sequence number.
    ///
    /// In RFC793 this is referred to as `ISS`.
    pub initial_seq: TcpSeqNumber,

    /// The largest window the peer ever offered.
    pub max_window: u32,

    /// The window shift of the peer.
    pub scale: u8,
}

/// The receiving state of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Receive {
    /// The next expected sequence number.
    ///
    /// In RFC793 this is referred to as `RCV.NXT`.
    pub next: TcpSeqNumber,

    /// The receive window size.
    ///
    /// In RFC793 this is referred to as `RCV.WND`.
    pub window: u32,

    /// The receive urgent pointer.
    ///
    /// In RFC793 this is referred to as `RCV.UP`.
    pub urgent: TcpSeqNumber,

    /// The initial receive sequence number.
    ///
    /// In RFC793 this is referred to as `IRS`.
    pub initial_seq: TcpSeqNumber,

    /// The right edge of the window we advertised.
    ///
    /// Our window never shrinks below it.
    pub advertised: TcpSeqNumber,

    /// The acknowledgement number of our last segment.
    pub last_ack_sent: TcpSeqNumber,

    /// Our window shift, in effect after the handshake.
    pub scale: u8,

    /// The window shift we request in our SYN.
    pub request_scale: u8,
}

/// State enum of the statemachine.
///
/// The variants are ordered the way the states follow each other in the usual lifetime of a
/// connection. Comparisons rely on this order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    /// Marker state of a connection that is not open, or no longer.
    Closed,

    /// A listening connection.
    ///
    /// Akin to an open server socket. Turned into SynReceived when a SYN arrives.
    Listen,

    /// An open connection request.
    SynSent,

    /// Connection request we intend to answer, waiting on ack.
    SynReceived,

    /// An open connection.
    Established,

    /// Other side closed its connection.
    CloseWait,

    /// Closed our side of the connection.
    FinWait1,

    /// Closed both sides but we don't know the other knows.
    Closing,

    /// Connection closed after other side closed its already.
    LastAck,

    /// Closing connection nicely, initiated by us and acknowledged.
    FinWait2,

    /// Both sides recognized connection as closed.
    TimeWait,
}

/// Control flags of a connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub(crate) struct Control(u32);

/// The congestion state saved by the first retransmit timeout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub(crate) struct Snapshot {
    pub(crate) cwnd: u32,
    pub(crate) ssthresh: u32,
    pub(crate) recover: TcpSeqNumber,
}

impl State {
    /// Check if a SYN was received and answered, `SynReceived` and later.
    pub fn is_synchronized(self) -> bool {
        self >= State::SynReceived
    }

    /// Check if the handshake completed.
    pub fn is_established(self) -> bool {
        self >= State::Established
    }

    /// Check if the peer closed its direction.
    pub fn has_received_fin(self) -> bool {
        match self {
            State::CloseWait | State::Closing | State::LastAck | State::TimeWait => true,
            _ => false,
        }
    }

    /// The flags of any segment sent in this state.
    pub(crate) fn outflags(self) -> TcpFlags {
        match self {
            State::Closed => TcpFlags::RST | TcpFlags::ACK,
            State::Listen => TcpFlags::empty(),
            State::SynSent => TcpFlags::SYN,
            State::SynReceived => TcpFlags::SYN | TcpFlags::ACK,
            State::Established | State::CloseWait | State::FinWait2 | State::TimeWait => TcpFlags::ACK,
            State::FinWait1 | State::Closing | State::LastAck => TcpFlags::FIN | TcpFlags::ACK,
        }
    }
}

impl Control {
    /// Acknowledge immediately.
    pub(crate) const ACKNOW: Control = Control(1 << 0);
    /// An acknowledgement is being delayed.
    pub(crate) const DELACK: Control = Control(1 << 1);
    /// Send small segments without waiting.
    pub(crate) const NODELAY: Control = Control(1 << 2);
    /// Our FIN was sent.
    pub(crate) const SENTFIN: Control = Control(1 << 3);
    /// We requested window scaling.
    pub(crate) const REQ_SCALE: Control = Control(1 << 4);
    /// The peer sent a window scale.
    pub(crate) const RCVD_SCALE: Control = Control(1 << 5);
    /// We requested timestamps.
    pub(crate) const REQ_TSTMP: Control = Control(1 << 6);
    /// The peer sent a timestamp.
    pub(crate) const RCVD_TSTMP: Control = Control(1 << 7);
    /// Selective acknowledgements are requested, and permitted after the handshake.
    pub(crate) const SACK_PERMIT: Control = Control(1 << 8);
    /// Our SYN still needs an acknowledgement.
    pub(crate) const NEEDSYN: Control = Control(1 << 9);
    /// A FIN is to be sent once the handshake completes.
    pub(crate) const NEEDFIN: Control = Control(1 << 10);
    /// Send a window probe even into a zero window.
    pub(crate) const FORCEDATA: Control = Control(1 << 11);
    /// `Snapshot` holds valid values.
    pub(crate) const PREVVALID: Control = Control(1 << 12);
    /// Fast recovery was in progress at the first timeout.
    pub(crate) const WASFRECOVERY: Control = Control(1 << 13);
    /// Congestion recovery was in progress at the first timeout.
    pub(crate) const WASCRECOVERY: Control = Control(1 << 14);
    /// Our last segment advertised a zero window.
    pub(crate) const RXWIN0SENT: Control = Control(1 << 15);
    /// ECN was negotiated.
    pub(crate) const ECN_PERMIT: Control = Control(1 << 16);
    /// Send CWR with the next new data.
    pub(crate) const ECN_SND_CWR: Control = Control(1 << 17);
    /// Echo ECE until the peer sends CWR.
    pub(crate) const ECN_SND_ECE: Control = Control(1 << 18);
    /// The user will not read anymore, incoming data is discarded.
    pub(crate) const READ_CLOSED: Control = Control(1 << 19);

    pub(crate) fn contains(self, other: Control) -> bool {
        self.0 & other.0 == other.0
    }

    pub(crate) fn intersects(self, other: Control) -> bool {
        self.0 & other.0 != 0
    }

    pub(crate) fn insert(&mut self, other: Control) {
        self.0 |= other.0;
    }

    pub(crate) fn remove(&mut self, other: Control) {
        self.0 &= !other.0;
    }
}

impl core::ops::BitOr for Control {
    type Output = Control;

    fn bitor(self, other: Control) -> Control {
        Control(self.0 | other.0)
    }
}

impl Connection {
    /// Create a closed connection between two ports.
    pub fn new(config: Config, local_port: u16, remote_port: u16, now: Instant)
        -> Result<Self, ConfigError>
    {
        config.validate()?;
        let now = now.ticks();

        let mut flags = Control::default();
        if config.do_rfc1323 {
            flags.insert(Control::REQ_SCALE | Control::REQ_TSTMP);
        }
        if config.do_sack {
            flags.insert(Control::SACK_PERMIT);
        }
        if config.no_delay {
            flags.insert(Control::NODELAY);
        }

        let max_window = MAX_WIN << MAX_WINSHIFT;
        Ok(Connection {
            state: State::Closed,
            flags,
            config,
            local_port,
            remote_port,
            send: Send {
                unacked: TcpSeqNumber::default(),
                next: TcpSeqNumber::default(),
                max: TcpSeqNumber::default(),
                window: 0,
                urgent: TcpSeqNumber::default(),
                wl1: TcpSeqNumber::default(),
                wl2: TcpSeqNumber::default(),
                initial_seq: TcpSeqNumber::default(),
                max_window: 0,
                scale: 0,
            },
            recv: Receive {
                next: TcpSeqNumber::default(),
                window: 0,
                urgent: TcpSeqNumber::default(),
                initial_seq: TcpSeqNumber::default(),
                advertised: TcpSeqNumber::default(),
                last_ack_sent: TcpSeqNumber::default(),
                scale: 0,
                request_scale: request_scale(config.recv_buffer),
            },
            window: Window {
                cwnd: max_window,
                ssthresh: max_window,
                ..Window::default()
            },
            recover: TcpSeqNumber::default(),
            dupacks: 0,
            snd_limited: 0,
            cc: CongestionControl::new(config.congestion, now),
            rtt: RttEstimator::new(config.rexmit_initial, config.rexmit_min, config.rexmit_max),
            ts_recent: 0,
            ts_recent_age: 0,
            ts_offset: 0,
            t_maxseg: config.mss_default,
            rcvtime: now,
            sndtime: 0,
            scoreboard: Scoreboard::new(config.sack_max_holes),
            report: SackReport::default(),
            prev: Snapshot::default(),
            badrxtwin: 0,
            softerror: None,
            error: None,
            stats: Stats::default(),
        })
    }

    /// Open the connection actively, sending a SYN with sequence number `iss`.
    ///
    /// Initial sequence numbers should come from an `IsnGenerator`.
    pub fn connect(&mut self, iss: TcpSeqNumber, io: &mut Io) -> Result<(), UserError> {
        if self.state != State::Closed {
            return Err(UserError::NotClosed);
        }
        self.stats.connattempt += 1;
        self.set_state(State::SynSent);
        self.send_seq_init(iss);
        io.timers.arm(Timer::Keepalive, self.config.keep_init);
        self.try_output(io);
        Ok(())
    }

    /// Wait for a SYN, answering it with sequence number `iss`.
    pub fn listen(&mut self, iss: TcpSeqNumber) -> Result<(), UserError> {
        if self.state != State::Closed {
            return Err(UserError::NotClosed);
        }
        self.send.initial_seq = iss;
        self.set_state(State::Listen);
        Ok(())
    }

    /// Queue data for transmission.
    ///
    /// Returns the number of bytes accepted by the send buffer, which may be less than offered.
    /// Data queued before the handshake completes goes out with the first acknowledgement.
    pub fn send(&mut self, data: &[u8], io: &mut Io) -> Result<usize, UserError> {
        match self.state {
            State::Closed | State::Listen => return Err(UserError::Closed),
            _ if self.state > State::CloseWait || self.flags.contains(Control::NEEDFIN) => {
                return Err(UserError::WriteClosed)
            },
            _ => (),
        }
        let accepted = io.send.append(data);
        if accepted > 0 && self.state.is_established() {
            self.try_output(io);
        }
        Ok(accepted)
    }

    /// Close the sending direction, the FIN follows the queued data.
    pub fn shutdown_write(&mut self, io: &mut Io) -> Result<(), UserError> {
        self.user_closed(io)
    }

    /// Close both directions.
    ///
    /// Data arriving afterwards is discarded. Once the peer acknowledged our FIN, the wait for
    /// its FIN is bounded by the keepalive budget.
    pub fn close(&mut self, io: &mut Io) -> Result<(), UserError> {
        self.flags.insert(Control::READ_CLOSED);
        self.user_closed(io)?;
        if self.state == State::FinWait2 && !io.timers.is_armed(Timer::TwoMsl) {
            io.timers.arm(Timer::TwoMsl, self.config.keep_max_idle());
        }
        Ok(())
    }

    /// Drop the connection, sending a reset if it was synchronized.
    pub fn abort(&mut self, io: &mut Io) {
        if self.state != State::Closed {
            self.drop_connection(DropReason::Aborted, io);
        }
    }

    /// Tell the connection that the user read from the receive buffer.
    ///
    /// A window update is sent if the reopened window is worth advertising.
    pub fn window_update(&mut self, io: &mut Io) {
        if self.state.is_synchronized() {
            self.try_output(io);
        }
    }

    /// The current state of the state machine.
    pub fn state(&self) -> State {
        self.state
    }

    /// The event counters.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// The tunables of this connection.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The sending state.
    pub fn send_state(&self) -> &Send {
        &self.send
    }

    /// The receiving state.
    pub fn recv_state(&self) -> &Receive {
        &self.recv
    }

    /// The congestion window and threshold.
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// The round trip estimator.
    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }

    /// The SACK scoreboard of the data we sent.
    pub fn scoreboard(&self) -> &Scoreboard {
        &self.scoreboard
    }

    /// The SACK blocks we report to the peer.
    pub fn sack_report(&self) -> &SackReport {
        &self.report
    }

    /// The congestion control algorithm.
    pub fn congestion(&self) -> &CongestionControl {
        &self.cc
    }

    /// The negotiated segment size, before options.
    pub fn mss(&self) -> u32 {
        self.t_maxseg
    }

    /// The recovery point.
    pub fn recover(&self) -> TcpSeqNumber {
        self.recover
    }

    /// Consecutive duplicate acknowledgements.
    pub fn dupacks(&self) -> u32 {
        self.dupacks
    }

    /// Check if ECN was negotiated.
    pub fn ecn_permitted(&self) -> bool {
        self.flags.contains(Control::ECN_PERMIT)
    }

    /// Check if selective acknowledgements were negotiated.
    pub fn sack_permitted(&self) -> bool {
        self.flags.contains(Control::SACK_PERMIT) && self.state.is_synchronized()
    }

    /// Check if timestamps were negotiated.
    pub fn timestamps(&self) -> bool {
        self.flags.contains(Control::RCVD_TSTMP)
    }

    /// The reason the connection was dropped, if it was.
    pub fn error(&self) -> Option<DropReason> {
        self.error
    }

    /// The last transmission error while synchronized.
    pub fn soft_error(&self) -> Option<TransmitError> {
        self.softerror
    }

    /// Move to another state.
    pub(crate) fn set_state(&mut self, state: State) {
        net_trace!("tcp {}->{}: {:?} -> {:?}", self.local_port, self.remote_port, self.state, state);
        self.state = state;
    }

    pub(crate) fn send_seq_init(&mut self, iss: TcpSeqNumber) {
        self.send.initial_seq = iss;
        self.send.unacked = iss;
        self.send.next = iss;
        self.send.max = iss;
        self.send.urgent = iss;
        self.recover = iss;
    }

    pub(crate) fn recv_seq_init(&mut self, irs: TcpSeqNumber) {
        self.recv.initial_seq = irs;
        self.recv.next = irs + 1;
        self.recv.advertised = irs + 1;
    }

    /// Our timestamp clock.
    pub(crate) fn ts_now(&self, now: Ticks) -> u32 {
        now.wrapping_add(self.ts_offset)
    }

    /// The payload that fits into a segment once options are accounted for.
    pub(crate) fn maxseg(&self) -> u32 {
        let mut optlen: u32;
        if self.state.is_established() {
            optlen = if self.flags.contains(Control::RCVD_TSTMP) { 12 } else { 0 };
            if self.flags.contains(Control::SACK_PERMIT) {
                let blocks = self.report.blocks().iter().flatten().count() as u32;
                if blocks > 0 {
                    optlen += 2 + 8 * blocks;
                    optlen = (optlen + 3) & !3;
                }
            }
        } else {
            optlen = if self.flags.contains(Control::REQ_TSTMP) { 12 } else { 4 };
            if self.flags.contains(Control::REQ_SCALE) {
                optlen += 4;
            }
            if self.flags.contains(Control::SACK_PERMIT) {
                optlen += 4;
            }
        }
        self.t_maxseg.saturating_sub(optlen.min(MAX_TCP_OPTLEN)).max(1)
    }

    /// Adopt the segment size offered by the peer, zero when it offered none.
    pub(crate) fn set_mss(&mut self, offer: u32) {
        self.t_maxseg = if offer == 0 {
            self.config.mss_default
        } else {
            offer.max(self.config.min_mss).min(self.config.mss_default)
        };
    }

    /// The initial congestion window for a segment size.
    ///
    /// Never larger than the largest window the peer could advertise.
    pub(crate) fn initial_window(&self, maxseg: u32) -> u32 {
        let segments = self.config.initcwnd_segments;
        let window = if segments != 0 {
            segments.saturating_mul(maxseg)
                .min(maxseg.saturating_mul(2).max(segments.saturating_mul(INITIAL_WINDOW_MSS)))
        } else if maxseg > 2190 {
            maxseg.saturating_mul(2)
        } else if maxseg > 1095 {
            3 * maxseg
        } else {
            4 * maxseg
        };
        window.min(MAX_WIN << MAX_WINSHIFT)
    }

    /// The space left in the receive buffer, as a window.
    pub(crate) fn recv_space(&self, io: &Io) -> u32 {
        if self.flags.contains(Control::READ_CLOSED) {
            // Data is discarded anyways, keep the window open.
            return io.recv.capacity().min(u32::max_value() as usize) as u32;
        }
        io.recv.available_space().min(u32::max_value() as usize) as u32
    }

    fn cc_context(&self, now: Ticks, bytes_this_ack: u32) -> Context {
        let maxseg = self.maxseg();
        Context {
            now,
            maxseg,
            snd_wnd: self.send.window,
            snd_scale: self.send.scale,
            bytes_this_ack,
            segments: 1,
            abc_l_var: self.config.abc_l_var,
            all_sent: self.send.next == self.send.max,
            cwnd_limited: self.window.cwnd <= self.send.window,
            pipe: 0,
            srtt: self.rtt.srtt,
            rtt_samples: self.rtt.updated,
            rxtshift: self.rtt.rxtshift,
            initial_window: self.initial_window(maxseg),
        }
    }

    /// The estimate of data in flight.
    pub(crate) fn pipe(&self, ack: TcpSeqNumber) -> u32 {
        if self.config.rfc6675_pipe {
            self.scoreboard.pipe(self.send.unacked, self.send.max)
        } else {
            self.send.max.saturating_since(ack)
        }
    }

    /// Set the initial congestion window once the handshake completes.
    pub(crate) fn cc_conn_init(&mut self, now: Ticks) {
        let maxseg = self.maxseg();
        if self.window.cwnd == 1 {
            // The SYN was retransmitted.
            self.window.cwnd = maxseg;
        } else {
            self.window.cwnd = self.initial_window(maxseg);
        }
        let ctx = self.cc_context(now, 0);
        self.cc.conn_init(&mut self.window, &ctx);
    }

    pub(crate) fn cc_ack_received(&mut self, now: Ticks, ack: TcpSeqNumber, kind: AckKind) {
        let bytes_this_ack = ack.saturating_since(self.send.unacked);
        let ctx = self.cc_context(now, bytes_this_ack);
        if kind == AckKind::Ack {
            if self.window.cwnd > self.window.ssthresh {
                let limit = ctx.segments.saturating_mul(ctx.abc_l_var).saturating_mul(ctx.maxseg);
                self.window.bytes_acked += bytes_this_ack.min(limit);
                if self.window.bytes_acked >= self.window.cwnd {
                    self.window.bytes_acked -= self.window.cwnd;
                    self.window.sent_awnd = true;
                }
            } else {
                self.window.sent_awnd = false;
                self.window.bytes_acked = 0;
            }
        }
        self.cc.ack_received(&mut self.window, &ctx, kind);
    }

    pub(crate) fn cc_cong_signal(&mut self, now: Ticks, ack: TcpSeqNumber, signal: Signal) {
        let ecn = self.flags.contains(Control::ECN_PERMIT);
        match signal {
            Signal::DupAck => if !self.window.fast_recovery {
                self.recover = self.send.max;
                if ecn {
                    self.flags.insert(Control::ECN_SND_CWR);
                }
            },
            Signal::Ecn => if !self.window.cong_recovery || ack >= self.recover {
                self.window.cong_recovery = false;
                self.stats.ecn_rcwnd += 1;
                self.recover = self.send.max + 1;
                if ecn {
                    self.flags.insert(Control::ECN_SND_CWR);
                }
            },
            Signal::Rto => {
                self.dupacks = 0;
                self.window.bytes_acked = 0;
                self.window.exit_recovery();
                if ecn {
                    self.flags.insert(Control::ECN_SND_CWR);
                }
            },
            Signal::RtoErr => {
                self.stats.sndrexmitbad += 1;
                self.window.cwnd = self.prev.cwnd;
                self.window.ssthresh = self.prev.ssthresh;
                self.recover = self.prev.recover;
                if self.flags.contains(Control::WASFRECOVERY) {
                    self.window.fast_recovery = true;
                }
                if self.flags.contains(Control::WASCRECOVERY) {
                    self.window.cong_recovery = true;
                }
                self.send.next = self.send.max;
                self.flags.remove(Control::PREVVALID);
                self.badrxtwin = 0;
                net_debug!("tcp {}->{}: spurious timeout undone", self.local_port, self.remote_port);
            },
        }
        let ctx = self.cc_context(now, ack.saturating_since(self.send.unacked));
        self.cc.cong_signal(&mut self.window, &ctx, signal);
    }

    pub(crate) fn cc_post_recovery(&mut self, now: Ticks, ack: TcpSeqNumber) {
        let mut ctx = self.cc_context(now, ack.saturating_since(self.send.unacked));
        ctx.pipe = self.pipe(ack);
        self.cc.post_recovery(&mut self.window, &ctx);
        self.window.bytes_acked = 0;
        self.scoreboard.prr_out = 0;
    }

    pub(crate) fn cc_after_idle(&mut self, now: Ticks) {
        let ctx = self.cc_context(now, 0);
        self.cc.after_idle(&mut self.window, &ctx);
    }

    pub(crate) fn cc_ecn_packet(&mut self, now: Ticks, congestion_experienced: bool) {
        let ctx = self.cc_context(now, 0);
        self.cc.ecn_packet(&mut self.window, &ctx, congestion_experienced);
    }

    /// The user closed the sending direction.
    pub(crate) fn user_closed(&mut self, io: &mut Io) -> Result<(), UserError> {
        match self.state {
            State::Closed => return Err(UserError::Closed),
            State::Listen | State::SynSent => {
                self.close_connection(None, io);
                return Ok(());
            },
            State::SynReceived => self.flags.insert(Control::NEEDFIN),
            State::Established => self.set_state(State::FinWait1),
            State::CloseWait => self.set_state(State::LastAck),
            _ => return Ok(()),
        }
        self.try_output(io);
        Ok(())
    }

    /// Drop the connection, informing a synchronized peer with a reset.
    pub(crate) fn drop_connection(&mut self, reason: DropReason, io: &mut Io) {
        if self.state.is_synchronized() {
            self.set_state(State::Closed);
            self.try_output(io);
            self.stats.drops += 1;
        } else {
            self.stats.conndrops += 1;
        }
        let reason = match (reason, self.softerror) {
            (DropReason::TimedOut, Some(err)) => DropReason::Transmit(err),
            (reason, _) => reason,
        };
        self.close_connection(Some(reason), io);
    }

    /// Release all resources, moving to `Closed`.
    pub(crate) fn close_connection(&mut self, reason: Option<DropReason>, io: &mut Io) {
        net_debug!("tcp {}->{}: closed in {:?}, reason {:?}",
            self.local_port, self.remote_port, self.state, reason);
        self.stats.closed += 1;
        self.set_state(State::Closed);
        for &timer in Timer::ALL.iter() {
            io.timers.cancel(timer);
        }
        self.scoreboard.free();
        self.report.clear();
        io.reassembly.clear();
        self.error = reason;
        io.events.on_state_closed(reason);
    }

    /// Send a bare control segment outside of the output engine.
    pub(crate) fn respond(
        &mut self,
        ack: TcpSeqNumber,
        seq: TcpSeqNumber,
        flags: TcpFlags,
        io: &mut Io,
    ) {
        let now = io.now.ticks();
        let space = self.recv_space(io);
        let window = if flags.rst() {
            0
        } else {
            space.min(MAX_WIN << self.recv.scale) >> self.recv.scale
        };

        let mut options = TcpOptions::default();
        if flags.syn() {
            options.mss = Some(self.config.mss_default.min(u32::from(u16::max_value())) as u16);
            if self.flags.contains(Control::REQ_SCALE) {
                options.window_scale = Some(self.recv.request_scale);
            }
            if self.flags.contains(Control::SACK_PERMIT) {
                options.sack_permitted = true;
            }
        }
        if self.flags.contains(Control::RCVD_TSTMP) {
            options.timestamp = Some(TcpTimestamp {
                tsval: self.ts_now(now),
                tsecr: self.ts_recent,
            });
        }

        let header = TcpRepr {
            src_port: self.local_port,
            dst_port: self.remote_port,
            seq_number: seq,
            ack_number: if flags.ack() { ack } else { TcpSeqNumber::default() },
            flags,
            window_len: window as u16,
            urgent_at: 0,
            options,
        };
        if flags.ack() {
            self.stats.sndacks += 1;
        }
        if flags.intersects(TcpFlags::SYN | TcpFlags::FIN | TcpFlags::RST) {
            self.stats.sndctrl += 1;
        }
        self.stats.sndtotal += 1;

        let segment = OutSegment {
            header,
            payload: Region::default(),
            ecn: Default::default(),
        };
        if let Err(err) = io.sink.send(segment) {
            self.stats.snderr += 1;
            net_debug!("tcp {}->{}: response not sent: {}", self.local_port, self.remote_port, err);
        }
    }

    /// Run the output engine, remembering but otherwise ignoring errors.
    pub(crate) fn try_output(&mut self, io: &mut Io) {
        if let Err(err) = self.output(io) {
            net_debug!("tcp {}->{}: output failed: {}", self.local_port, self.remote_port, err);
        }
    }

    /// Arm the persist timer with the backed off interval.
    pub(crate) fn set_persist(&mut self, io: &mut Io) {
        let base = ((self.rtt.srtt >> 2) + self.rtt.rttvar) >> 1;
        self.flags.remove(Control::PREVVALID);
        let base = base.max(0) as Ticks;
        let shift = self.rtt.rxtshift.min(BACKOFF.len() as u32 - 1) as usize;
        let timeout = base.saturating_mul(BACKOFF[shift])
            .max(self.config.persist_min)
            .min(self.config.persist_max);
        io.timers.arm(Timer::Persist, timeout);
        if self.rtt.rxtshift < super::rtt::MAX_RXT_SHIFT {
            self.rtt.rxtshift += 1;
        }
    }

    /// Send an acknowledgement that was held back but should go out now.
    pub(crate) fn check_delack(&mut self, io: &mut Io) {
        if self.flags.contains(Control::DELACK) {
            self.flags.remove(Control::DELACK);
            io.timers.arm(Timer::DelayedAck, self.config.delack_time);
        }
    }

    /// Ticks since the last segment arrived.
    pub(crate) fn idle_time(&self, now: Ticks) -> Ticks {
        ticks_since(now, self.rcvtime).max(0) as Ticks
    }
}

/// Exponential backoff of the retransmit and persist timers.
pub(crate) const BACKOFF: [Ticks; 6] = [1, 2, 4, 8, 16, 32];

/// Slower backoff of SYN retransmissions.
pub(crate) const SYN_BACKOFF: [Ticks; 6] = [1, 1, 1, 2, 2, 3];

/// The sum of `BACKOFF` up to the last retransmission, as a multiple of the timeout.
pub(crate) const TOTAL_BACKOFF: Ticks = 511;

/// The window shift needed to offer a buffer of `space` bytes.
fn request_scale(space: usize) -> u8 {
    let mut scale = 0;
    while scale < MAX_WINSHIFT && (MAX_WIN as usize) << scale < space {
        scale += 1;
    }
    scale
}

#[cfg(test)]
mod test {
    use super::*;

    fn connection(config: Config) -> Connection {
        Connection::new(config, 49152, 80, Instant::from_millis(0)).unwrap()
    }

    #[test]
    fn states_are_ordered() {
        assert!(State::SynReceived.is_synchronized());
        assert!(!State::SynSent.is_synchronized());
        assert!(State::FinWait2.is_established());
        assert!(State::TimeWait > State::CloseWait);
        assert!(State::Closing.has_received_fin());
        assert!(!State::FinWait2.has_received_fin());
        assert_eq!(State::LastAck.outflags(), TcpFlags::FIN | TcpFlags::ACK);
        assert_eq!(State::Listen.outflags(), TcpFlags::empty());
    }

    #[test]
    fn scale_for_buffer() {
        assert_eq!(request_scale(32 * 1024), 0);
        assert_eq!(request_scale(65536), 1);
        assert_eq!(request_scale(1 << 20), 5);
        assert_eq!(request_scale(usize::max_value()), 14);
    }

    #[test]
    fn invalid_config_rejected() {
        let config = Config { min_mss: 0, ..Config::default() };
        assert_eq!(
            Connection::new(config, 1, 2, Instant::from_millis(0)).unwrap_err(),
            ConfigError::MssRange);
    }

    #[test]
    fn option_overhead() {
        let mut conn = connection(Config { mss_default: 1460, ..Config::default() });
        // Before the handshake: timestamps, scale and SACK-permitted are requested.
        assert_eq!(conn.maxseg(), 1460 - 20);
        conn.state = State::Established;
        conn.flags = Control::RCVD_TSTMP | Control::SACK_PERMIT;
        assert_eq!(conn.maxseg(), 1448);
        conn.report.update(TcpSeqNumber(0), TcpSeqNumber(100), TcpSeqNumber(200));
        // 12 for the timestamp, 10 for one block, padded.
        assert_eq!(conn.maxseg(), 1460 - 24);
    }

    #[test]
    fn mss_clamped() {
        let mut conn = connection(Config { mss_default: 1460, min_mss: 216, ..Config::default() });
        conn.set_mss(9000);
        assert_eq!(conn.mss(), 1460);
        conn.set_mss(100);
        assert_eq!(conn.mss(), 216);
        conn.set_mss(0);
        assert_eq!(conn.mss(), 1460);
    }

    #[test]
    fn initial_windows() {
        let conn = connection(Config { initcwnd_segments: 10, ..Config::default() });
        assert_eq!(conn.initial_window(1460), 14600);
        // Large segments are bounded by two segments.
        assert_eq!(conn.initial_window(9000), 18000);
        let conn = connection(Config { initcwnd_segments: 0, ..Config::default() });
        assert_eq!(conn.initial_window(4000), 8000);
        assert_eq!(conn.initial_window(1460), 4380);
        assert_eq!(conn.initial_window(536), 2144);
    }

    #[test]
    fn huge_initial_window_saturates() {
        let conn = connection(Config { initcwnd_segments: 5_000_000, ..Config::default() });
        assert_eq!(conn.initial_window(1000), MAX_WIN << MAX_WINSHIFT);
        let conn = connection(Config { initcwnd_segments: 0, ..Config::default() });
        assert_eq!(conn.initial_window(u32::max_value()), MAX_WIN << MAX_WINSHIFT);
    }

    #[test]
    fn huge_byte_counting_limit_saturates() {
        let config = Config {
            mss_default: 1000,
            initcwnd_segments: 2,
            abc_l_var: u32::max_value(),
            ..Config::default()
        };
        let mut conn = connection(config);
        conn.state = State::Established;
        conn.send.unacked = TcpSeqNumber(0);
        conn.send.next = TcpSeqNumber(4000);
        conn.send.max = TcpSeqNumber(4000);
        conn.send.window = 1 << 16;
        conn.window.cwnd = 2000;
        conn.window.ssthresh = 1000;
        conn.cc_ack_received(0, TcpSeqNumber(3000), AckKind::Ack);
        // Congestion avoidance counts all of the acknowledged bytes.
        assert_eq!(conn.window.bytes_acked, 1000);
        assert!(conn.window.cwnd > 2000);
    }
}
