//! Congestion control algorithms.
//!
//! The engine owns the congestion window and the slow start threshold in a [`Window`] and asks
//! the active algorithm to adjust them on a fixed set of events: acknowledgements, congestion
//! signals, the end of a recovery phase, connection setup and restart after idle. Everything the
//! algorithm may want to know about the connection at that moment is passed in a [`Context`].
//!
//! The set of algorithms is closed, [`CongestionControl`] holds the private state of the selected
//! one.
//!
//! [`Window`]: struct.Window.html
//! [`Context`]: struct.Context.html
//! [`CongestionControl`]: enum.CongestionControl.html
mod cubic;
mod newreno;

pub use self::cubic::Cubic;
pub use self::newreno::NewReno;

use crate::time::Ticks;
use super::config::Algorithm;

/// The largest unscaled window.
pub const MAX_WIN: u32 = 65535;

/// A congestion event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Signal {
    /// The duplicate acknowledgement threshold was reached.
    DupAck,
    /// The peer echoed a congestion experienced mark.
    Ecn,
    /// The retransmit timer expired.
    Rto,
    /// The last retransmit timeout was found to be spurious.
    RtoErr,
}

/// The kind of an acknowledgement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AckKind {
    /// New data was acknowledged.
    Ack,
    /// A duplicate acknowledgement.
    DupAck,
    /// An acknowledgement below the recovery point.
    PartialAck,
}

/// The congestion state shared between the engine and the algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Window {
    /// The congestion window in bytes.
    pub cwnd: u32,
    /// The slow start threshold in bytes.
    pub ssthresh: u32,
    /// Bytes acknowledged since the last increase in congestion avoidance.
    pub bytes_acked: u32,
    /// A whole window was acknowledged in congestion avoidance.
    pub sent_awnd: bool,
    /// In fast recovery after duplicate acknowledgements.
    pub fast_recovery: bool,
    /// In congestion recovery after an ECN signal.
    pub cong_recovery: bool,
}

/// A snapshot of the connection for one event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Context {
    /// The current tick.
    pub now: Ticks,
    /// The effective segment size.
    pub maxseg: u32,
    /// The send window of the peer.
    pub snd_wnd: u32,
    /// The window scale of the peer.
    pub snd_scale: u8,
    /// Bytes acknowledged by the current segment.
    pub bytes_this_ack: u32,
    /// Segments covered by the current acknowledgement.
    pub segments: u32,
    /// Slow start increase limit in segments.
    pub abc_l_var: u32,
    /// No retransmission is in progress, `snd_nxt == snd_max`.
    pub all_sent: bool,
    /// The congestion window limits the transmission, not the peer window.
    pub cwnd_limited: bool,
    /// The estimate of data in flight.
    pub pipe: u32,
    /// The smoothed round trip time, scaled by 32.
    pub srtt: i32,
    /// Number of round trip samples.
    pub rtt_samples: u32,
    /// Number of consecutive retransmit timeouts.
    pub rxtshift: u32,
    /// The initial congestion window.
    pub initial_window: u32,
}

/// The selected algorithm with its private state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CongestionControl {
    /// RFC 5681 with RFC 6582 recovery.
    NewReno(NewReno),
    /// RFC 8312.
    Cubic(Cubic),
}

impl Window {
    /// Check if any recovery is in progress.
    pub fn in_recovery(&self) -> bool {
        self.fast_recovery || self.cong_recovery
    }

    pub(crate) fn enter_recovery(&mut self) {
        self.fast_recovery = true;
        self.cong_recovery = true;
    }

    pub(crate) fn exit_recovery(&mut self) {
        self.fast_recovery = false;
        self.cong_recovery = false;
    }
}

impl Context {
    /// The largest window the peer can advertise.
    pub fn max_window(&self) -> u32 {
        MAX_WIN << self.snd_scale.min(14)
    }
}

impl CongestionControl {
    /// Instantiate an algorithm.
    pub fn new(algorithm: Algorithm, now: Ticks) -> Self {
        match algorithm {
            Algorithm::NewReno => CongestionControl::NewReno(NewReno::default()),
            Algorithm::Cubic => CongestionControl::Cubic(Cubic::new(now)),
        }
    }

    /// The name of the algorithm.
    pub fn name(&self) -> &'static str {
        match self {
            CongestionControl::NewReno(_) => "newreno",
            CongestionControl::Cubic(_) => "cubic",
        }
    }

    /// React to an acknowledgement.
    pub fn ack_received(&mut self, window: &mut Window, ctx: &Context, kind: AckKind) {
        match self {
            CongestionControl::NewReno(algo) => algo.ack_received(window, ctx, kind),
            CongestionControl::Cubic(algo) => algo.ack_received(window, ctx, kind),
        }
    }

    /// React to a congestion signal.
    pub fn cong_signal(&mut self, window: &mut Window, ctx: &Context, signal: Signal) {
        match self {
            CongestionControl::NewReno(algo) => algo.cong_signal(window, ctx, signal),
            CongestionControl::Cubic(algo) => algo.cong_signal(window, ctx, signal),
        }
    }

    /// Set the window when the recovery point was acknowledged.
    pub fn post_recovery(&mut self, window: &mut Window, ctx: &Context) {
        match self {
            CongestionControl::NewReno(algo) => algo.post_recovery(window, ctx),
            CongestionControl::Cubic(algo) => algo.post_recovery(window, ctx),
        }
    }

    /// The connection was established with an initial window.
    pub fn conn_init(&mut self, window: &mut Window, ctx: &Context) {
        match self {
            CongestionControl::NewReno(_) => (),
            CongestionControl::Cubic(algo) => algo.conn_init(window, ctx),
        }
    }

    /// Transmission resumes after an idle period.
    pub fn after_idle(&mut self, window: &mut Window, ctx: &Context) {
        match self {
            CongestionControl::NewReno(algo) => algo.after_idle(window, ctx),
            CongestionControl::Cubic(algo) => algo.after_idle(window, ctx),
        }
    }

    /// A segment arrived on an ECN capable connection.
    ///
    /// Neither algorithm reacts to single marks, only to the echo of the peer.
    pub fn ecn_packet(&mut self, _: &mut Window, _: &Context, _congestion_experienced: bool) {
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const MSS: u32 = 1000;

    fn context() -> Context {
        Context {
            now: 1,
            maxseg: MSS,
            snd_wnd: 1 << 20,
            snd_scale: 7,
            bytes_this_ack: MSS,
            segments: 1,
            abc_l_var: 2,
            all_sent: true,
            cwnd_limited: true,
            pipe: 0,
            srtt: 0,
            rtt_samples: 0,
            rxtshift: 0,
            initial_window: 10 * MSS,
        }
    }

    /// The window never drops below one segment and the threshold never below two.
    #[test]
    fn window_floor() {
        for &algorithm in &[Algorithm::NewReno, Algorithm::Cubic] {
            let mut ctx = context();
            let mut cc = CongestionControl::new(algorithm, ctx.now);
            let mut window = Window { cwnd: 2 * MSS, ssthresh: u32::max_value(), ..Window::default() };
            cc.conn_init(&mut window, &ctx);

            let events = [
                Signal::Rto, Signal::DupAck, Signal::Ecn, Signal::Rto, Signal::Rto,
                Signal::DupAck, Signal::Ecn,
            ];
            for &signal in events.iter() {
                ctx.now += 100;
                ctx.pipe = 0;
                if signal == Signal::Rto {
                    ctx.rxtshift += 1;
                    window.exit_recovery();
                }
                cc.cong_signal(&mut window, &ctx, signal);
                assert!(window.cwnd >= MSS, "{} {:?}: {:?}", cc.name(), signal, window);
                assert!(window.ssthresh >= 2 * MSS, "{} {:?}: {:?}", cc.name(), signal, window);
                if window.in_recovery() {
                    cc.post_recovery(&mut window, &ctx);
                    window.exit_recovery();
                    assert!(window.cwnd >= MSS);
                }
                cc.ack_received(&mut window, &ctx, AckKind::Ack);
                assert!(window.cwnd >= MSS);
            }
        }
    }

    #[test]
    fn ecn_enters_congestion_recovery_once() {
        let ctx = context();
        let mut cc = CongestionControl::new(Algorithm::NewReno, ctx.now);
        let mut window = Window { cwnd: 20 * MSS, ssthresh: u32::max_value(), ..Window::default() };
        cc.cong_signal(&mut window, &ctx, Signal::Ecn);
        assert!(window.cong_recovery);
        assert!(!window.fast_recovery);
        assert_eq!(window.cwnd, 10 * MSS);
        cc.cong_signal(&mut window, &ctx, Signal::Ecn);
        assert_eq!(window.cwnd, 10 * MSS);
    }
}
