//! Round trip time estimation and the retransmit timeout.
//!
//! The estimator keeps the smoothed round trip time scaled by 32 and the smoothed mean deviation
//! scaled by 16, in ticks. The update is the fixed point form of the RFC 6298 filter with gains of
//! 1/8 and 1/4, the timeout is `srtt + 4 * rttvar` clamped to the configured bounds.
use crate::time::Ticks;
use crate::wire::TcpSeqNumber;

/// Fractional bits of `srtt`.
pub(crate) const RTT_SHIFT: u32 = 5;
/// Fractional bits of `rttvar`.
pub(crate) const RTTVAR_SHIFT: u32 = 4;
/// Fractional bits kept during the update.
const DELTA_SHIFT: u32 = 2;

/// The most consecutive retransmit timeouts before the connection is dropped.
pub(crate) const MAX_RXT_SHIFT: u32 = 5;
/// After this many backoffs the smoothed values are no longer trusted.
const RTT_INVALIDATE: u32 = MAX_RXT_SHIFT / 4;

/// The state of the round trip estimator of one connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RttEstimator {
    /// Smoothed round trip time, scaled by 32. Zero until the first sample.
    pub(crate) srtt: i32,
    /// Smoothed mean deviation, scaled by 16.
    pub(crate) rttvar: i32,
    /// The current, possibly backed off, retransmit timeout.
    pub(crate) rxtcur: Ticks,
    /// Lower bound of the timeout.
    pub(crate) rttmin: Ticks,
    /// Upper bound of the timeout.
    pub(crate) rttmax: Ticks,
    /// Number of consecutive timeouts.
    pub(crate) rxtshift: u32,
    /// Tick at which the timed segment was sent, zero when nothing is timed.
    pub(crate) rtttime: Ticks,
    /// Sequence number of the timed segment.
    pub(crate) rtseq: TcpSeqNumber,
    /// Number of samples taken.
    pub(crate) updated: u32,
    /// The smallest sample observed.
    pub(crate) rttlow: Ticks,
}

impl RttEstimator {
    /// An estimator before any sample, timing out after `initial` ticks.
    pub(crate) fn new(initial: Ticks, min: Ticks, max: Ticks) -> Self {
        RttEstimator {
            srtt: 0,
            // The first timeout is `initial` since srtt starts at zero.
            rttvar: ((initial as i32) << RTTVAR_SHIFT) / 4,
            rxtcur: initial,
            rttmin: min,
            rttmax: max,
            rxtshift: 0,
            rtttime: 0,
            rtseq: TcpSeqNumber::default(),
            updated: 0,
            rttlow: 0,
        }
    }

    /// The smoothed round trip time in ticks.
    pub fn srtt(&self) -> Ticks {
        (self.srtt >> RTT_SHIFT) as Ticks
    }

    /// The smoothed mean deviation in ticks.
    pub fn rttvar(&self) -> Ticks {
        (self.rttvar >> RTTVAR_SHIFT) as Ticks
    }

    /// The current retransmit timeout, including backoff.
    pub fn rto(&self) -> Ticks {
        self.rxtcur
    }

    /// The number of consecutive timeouts.
    pub fn backoff_shift(&self) -> u32 {
        self.rxtshift
    }

    /// The number of samples taken so far.
    pub fn samples(&self) -> u32 {
        self.updated
    }

    /// The unbacked timeout, `srtt + 4 * rttvar` but at least the minimum.
    pub(crate) fn rexmtval(&self) -> Ticks {
        let value = ((self.srtt >> (RTT_SHIFT - DELTA_SHIFT)) + self.rttvar) >> DELTA_SHIFT;
        self.rttmin.max(value.max(0) as Ticks)
    }

    /// Clamp a timeout to `[min, rttmax]`.
    pub(crate) fn range(&self, value: Ticks, min: Ticks) -> Ticks {
        value.max(min).min(self.rttmax)
    }

    /// Start timing a segment if none is being timed.
    pub(crate) fn start_timing(&mut self, now: Ticks, seq: TcpSeqNumber) {
        if self.rtttime == 0 {
            // Zero is the marker for an idle timer.
            self.rtttime = now.max(1);
            self.rtseq = seq;
        }
    }

    /// Feed a round trip sample of `rtt` ticks.
    ///
    /// Resets the backoff and stops timing. The caller clears any soft error.
    pub(crate) fn sample(&mut self, rtt: Ticks) {
        let rtt = rtt.min(i32::max_value() as Ticks >> RTT_SHIFT) as i32;
        self.updated = self.updated.saturating_add(1);
        if self.srtt != 0 && self.rxtshift <= RTT_INVALIDATE {
            // Adjust to origin zero, keeping DELTA_SHIFT fractional bits.
            let mut delta = ((rtt - 1) << DELTA_SHIFT) - (self.srtt >> (RTT_SHIFT - DELTA_SHIFT));
            self.srtt += delta;
            if self.srtt <= 0 {
                self.srtt = 1;
            }
            delta = delta.abs() - (self.rttvar >> (RTTVAR_SHIFT - DELTA_SHIFT));
            self.rttvar += delta;
            if self.rttvar <= 0 {
                self.rttvar = 1;
            }
        } else {
            // The first measurement, the deviation is half the sample.
            self.srtt = rtt << RTT_SHIFT;
            self.rttvar = rtt << (RTTVAR_SHIFT - 1);
        }
        self.rtttime = 0;
        self.rxtshift = 0;
        let floor = self.rttmin.max(rtt as Ticks + 2);
        self.rxtcur = self.range(self.rexmtval(), floor);
    }

    /// Remember the lowest raw sample.
    pub(crate) fn note_low(&mut self, rtt: Ticks) {
        if self.rttlow == 0 || self.rttlow > rtt {
            self.rttlow = rtt;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn estimator() -> RttEstimator {
        RttEstimator::new(1000, 30, 64_000)
    }

    #[test]
    fn initial_timeout() {
        let rtt = estimator();
        assert_eq!(rtt.rexmtval(), 1000);
        assert_eq!(rtt.rto(), 1000);
        assert_eq!(rtt.srtt(), 0);
    }

    #[test]
    fn first_sample() {
        let mut rtt = estimator();
        rtt.rxtshift = 3;
        rtt.rtttime = 7;
        rtt.sample(101);
        assert_eq!(rtt.srtt(), 101);
        assert_eq!(rtt.rttvar(), 50);
        // srtt + 4 * rttvar, with the fixed point rounding.
        assert_eq!(rtt.rto(), 303);
        assert_eq!(rtt.backoff_shift(), 0);
        assert_eq!(rtt.rtttime, 0);
        assert_eq!(rtt.samples(), 1);
    }

    #[test]
    fn smoothing_converges() {
        let mut rtt = estimator();
        for _ in 0..64 {
            rtt.sample(41);
        }
        assert_eq!(rtt.srtt(), 40);
        // Deviation decays toward zero, the floor then dominates.
        assert!(rtt.rto() >= 42);
        assert!(rtt.rto() <= 45);
    }

    #[test]
    fn timeout_respects_bounds() {
        let mut rtt = RttEstimator::new(1000, 200, 64_000);
        for _ in 0..64 {
            rtt.sample(2);
        }
        assert_eq!(rtt.rto(), 200);
        rtt.sample(60_000);
        assert_eq!(rtt.rto(), 64_000);
    }

    #[test]
    fn start_timing_once() {
        let mut rtt = estimator();
        rtt.start_timing(0, TcpSeqNumber(5));
        assert_eq!(rtt.rtttime, 1);
        rtt.start_timing(10, TcpSeqNumber(9));
        assert_eq!(rtt.rtseq, TcpSeqNumber(5));
    }
}
