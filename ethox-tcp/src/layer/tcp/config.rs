//! Tunables of the protocol engine.
//!
//! All durations are in ticks of one millisecond. A `Config` is fixed when a connection is
//! created and never changes afterwards, connections do not share it.
use core::fmt;

use crate::time::Ticks;

/// Selects the congestion control algorithm of new connections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// RFC 5681 slow start and congestion avoidance with RFC 6582 recovery.
    NewReno,
    /// RFC 8312 CUBIC.
    Cubic,
}

/// Explicit congestion notification negotiation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EcnMode {
    /// Never negotiate ECN.
    Off,
    /// Request ECN on active opens and accept it on passive opens.
    Enabled,
    /// Only accept ECN when the peer requests it.
    AcceptOnly,
}

/// The complete set of tunables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Config {
    /// Negotiate window scaling and timestamps (RFC 7323).
    pub do_rfc1323: bool,
    /// Negotiate selective acknowledgements (RFC 2018).
    pub do_sack: bool,
    /// The MSS assumed when the peer does not offer one, and the largest we accept.
    pub mss_default: u32,
    /// The smallest MSS we accept from a peer.
    pub min_mss: u32,
    /// Initial congestion window in segments. Zero selects the RFC 6928 formula.
    pub initcwnd_segments: u32,
    /// Number of duplicate ACKs that trigger a fast retransmit.
    pub rexmt_thresh: u32,
    /// Time allowed for the handshake to complete.
    pub keep_init: Ticks,
    /// Idle time before the first keepalive probe.
    pub keep_idle: Ticks,
    /// Interval between keepalive probes.
    pub keep_intvl: Ticks,
    /// Number of unanswered keepalive probes before the connection is dropped.
    pub keep_cnt: u32,
    /// Idle time after which a fully backed-off persist probe drops the connection.
    pub max_persist_idle: Ticks,
    /// Delay of a delayed ACK.
    pub delack_time: Ticks,
    /// Delay acknowledgements of in-order data.
    pub delack_enabled: bool,
    /// Disable the Nagle algorithm.
    pub no_delay: bool,
    /// The most holes the SACK scoreboard tracks.
    pub sack_max_holes: usize,
    /// Use proportional rate reduction (RFC 6937) during SACK recovery.
    pub do_prr: bool,
    /// Use the conservative reduction bound of PRR.
    pub prr_conservative: bool,
    /// Estimate the data in flight as in RFC 6675 instead of `snd_max - snd_fack`.
    pub rfc6675_pipe: bool,
    /// Limited transmit (RFC 3042).
    pub rfc3042: bool,
    /// Explicit congestion notification.
    pub ecn: EcnMode,
    /// SYN retransmits that still carry the ECN setup flags.
    pub ecn_max_retries: u32,
    /// Appropriate byte counting limit in slow start, in segments (RFC 3465).
    pub abc_l_var: u32,
    /// The retransmit timeout before the first RTT sample.
    pub rexmit_initial: Ticks,
    /// Lower bound of the retransmit timeout.
    pub rexmit_min: Ticks,
    /// Upper bound of the retransmit timeout.
    pub rexmit_max: Ticks,
    /// Lower bound of the persist timeout.
    pub persist_min: Ticks,
    /// Upper bound of the persist timeout.
    pub persist_max: Ticks,
    /// Maximum segment lifetime. `TIME_WAIT` lasts twice as long.
    pub msl: Ticks,
    /// Capacity of the receive buffer, its high-water mark.
    pub recv_buffer: usize,
    /// Capacity of the send buffer.
    pub send_buffer: usize,
    /// Accept any in-window reset instead of requiring an exact match (pre RFC 5961).
    pub insecure_rst: bool,
    /// Silently drop segments carrying both SYN and FIN.
    pub drop_synfin: bool,
    /// The congestion control algorithm.
    pub congestion: Algorithm,
    /// Probe idle connections with keepalives.
    pub keepalive: bool,
}

/// An inconsistency found by `Config::validate`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConfigError {
    /// `min_mss` is larger than `mss_default` or zero.
    MssRange,
    /// A buffer was configured with zero capacity.
    EmptyBuffer,
    /// `rexmit_min` is larger than `rexmit_max`.
    RexmitRange,
    /// `persist_min` is larger than `persist_max`.
    PersistRange,
    /// Fast retransmit can not trigger on zero duplicate ACKs.
    RexmtThresh,
    /// Slow start can not grow with a byte counting limit of zero segments.
    AbcLimit,
}

impl Config {
    /// Check that the tunables are consistent with each other.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_mss == 0 || self.min_mss > self.mss_default {
            return Err(ConfigError::MssRange);
        }
        if self.recv_buffer == 0 || self.send_buffer == 0 {
            return Err(ConfigError::EmptyBuffer);
        }
        if self.rexmit_min > self.rexmit_max {
            return Err(ConfigError::RexmitRange);
        }
        if self.persist_min > self.persist_max {
            return Err(ConfigError::PersistRange);
        }
        if self.rexmt_thresh == 0 {
            return Err(ConfigError::RexmtThresh);
        }
        if self.abc_l_var == 0 {
            return Err(ConfigError::AbcLimit);
        }
        Ok(())
    }

    /// The duration of `TIME_WAIT`.
    pub fn two_msl(&self) -> Ticks {
        self.msl.saturating_mul(2)
    }

    /// The idle budget spent on keepalive probes after `keep_idle`.
    pub fn keep_max_idle(&self) -> Ticks {
        self.keep_intvl.saturating_mul(self.keep_cnt)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            do_rfc1323: true,
            do_sack: true,
            mss_default: 536,
            min_mss: 216,
            initcwnd_segments: 10,
            rexmt_thresh: 3,
            keep_init: 75_000,
            keep_idle: 7_200_000,
            keep_intvl: 75_000,
            keep_cnt: 8,
            max_persist_idle: 0,
            delack_time: 100,
            delack_enabled: true,
            no_delay: false,
            sack_max_holes: 128,
            do_prr: true,
            prr_conservative: false,
            rfc6675_pipe: false,
            rfc3042: true,
            ecn: EcnMode::Off,
            ecn_max_retries: 1,
            abc_l_var: 2,
            rexmit_initial: 1_000,
            rexmit_min: 30,
            rexmit_max: 64_000,
            persist_min: 5_000,
            persist_max: 60_000,
            msl: 30_000,
            recv_buffer: 32 * 1024,
            send_buffer: 32 * 1024,
            insecure_rst: false,
            drop_synfin: true,
            congestion: Algorithm::NewReno,
            keepalive: false,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::MssRange => write!(f, "minimum mss outside of (0, mss_default]"),
            ConfigError::EmptyBuffer => write!(f, "buffer without capacity"),
            ConfigError::RexmitRange => write!(f, "rexmit_min exceeds rexmit_max"),
            ConfigError::PersistRange => write!(f, "persist_min exceeds persist_max"),
            ConfigError::RexmtThresh => write!(f, "zero duplicate ack threshold"),
            ConfigError::AbcLimit => write!(f, "zero byte counting limit"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_is_valid() {
        let config = Config::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.two_msl(), 60_000);
        assert_eq!(config.keep_max_idle(), 600_000);
    }

    #[test]
    fn rejects_inconsistent() {
        let config = Config { min_mss: 1000, .. Config::default() };
        assert_eq!(config.validate(), Err(ConfigError::MssRange));
        let config = Config { recv_buffer: 0, .. Config::default() };
        assert_eq!(config.validate(), Err(ConfigError::EmptyBuffer));
        let config = Config { rexmit_min: 100_000, .. Config::default() };
        assert_eq!(config.validate(), Err(ConfigError::RexmitRange));
        let config = Config { rexmt_thresh: 0, .. Config::default() };
        assert_eq!(config.validate(), Err(ConfigError::RexmtThresh));
        let config = Config { abc_l_var: 0, .. Config::default() };
        assert_eq!(config.validate(), Err(ConfigError::AbcLimit));
    }

    #[test]
    fn large_windows_are_valid() {
        // The engine saturates instead of rejecting them.
        let config = Config {
            initcwnd_segments: 5_000_000,
            abc_l_var: u32::max_value(),
            .. Config::default()
        };
        assert_eq!(config.validate(), Ok(()));
    }
}
