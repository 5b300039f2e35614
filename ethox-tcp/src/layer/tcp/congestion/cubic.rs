//! CUBIC congestion control (RFC 8312).
//!
//! All arithmetic is fixed point with `CUBIC_SHIFT` fractional bits. Time is measured in ticks of
//! one millisecond, `K` in seconds.
use crate::time::{ticks_since, Ticks};
use super::{AckKind, Context, NewReno, Signal, Window};

const CUBIC_SHIFT: u32 = 8;
const CUBIC_SHIFT_4: u32 = 32;
/// Multiplicative decrease, 0.7.
const CUBIC_BETA: u64 = 179;
/// 1 - beta.
const ONE_SUB_CUBIC_BETA: u64 = 77;
/// 3 * (1 - beta) / (1 + beta), with 0.3 for 1 - beta.
const THREE_X_PT3: u64 = 231;
/// 2 - 0.3.
const TWO_SUB_PT3: u64 = 435;
/// The scaling constant C, 0.4.
const CUBIC_C_FACTOR: i64 = 102;
/// Fast convergence factor, (1 + beta) / 2.
const CUBIC_FC_FACTOR: u64 = 217;
/// Round trip samples before the minimum is trusted.
const CUBIC_MIN_RTT_SAMPLES: u32 = 8;
/// Ticks per second.
const HZ: i64 = 1000;
/// The largest `t - K` whose cube does not overflow.
const CUBED_ROOT_MAX_ULONG: i64 = 448_845;

const FLAG_CONG_EVENT: u8 = 1 << 0;
const FLAG_IN_SLOWSTART: u8 = 1 << 1;
const FLAG_IN_APPLIMIT: u8 = 1 << 2;
const FLAG_RTO_EVENT: u8 = 1 << 3;

/// The private state of CUBIC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Cubic {
    /// Time to reach `max_cwnd` from the last reduction, seconds scaled by `CUBIC_SHIFT`.
    k: i64,
    sum_rtt_ticks: i64,
    /// The window before the last reduction, `W_max`.
    max_cwnd: u64,
    prev_max_cwnd: u64,
    /// `prev_max_cwnd` as of the first timeout, for rollback.
    prev_max_cwnd_cp: u64,
    flags: u8,
    min_rtt_ticks: i32,
    mean_rtt_ticks: i32,
    epoch_ack_count: i32,
    /// Start of the current epoch.
    t_last_cong: Ticks,
    t_last_cong_prev: Ticks,
}

impl Cubic {
    /// A fresh state, the first epoch starting `now`.
    pub fn new(now: Ticks) -> Self {
        Cubic {
            k: 0,
            sum_rtt_ticks: 0,
            max_cwnd: 0,
            prev_max_cwnd: 0,
            prev_max_cwnd_cp: 0,
            flags: 0,
            min_rtt_ticks: 0,
            mean_rtt_ticks: 1,
            epoch_ack_count: 0,
            t_last_cong: now,
            t_last_cong_prev: now,
        }
    }

    /// The window before the last reduction.
    pub fn w_max(&self) -> u64 {
        self.max_cwnd
    }

    /// The time of the last reduction.
    pub fn epoch_start(&self) -> Ticks {
        self.t_last_cong
    }

    pub(crate) fn ack_received(&mut self, window: &mut Window, ctx: &Context, kind: AckKind) {
        self.record_rtt(ctx);

        if kind != AckKind::Ack || window.in_recovery() {
            return;
        }
        if !ctx.cwnd_limited {
            self.flags |= FLAG_IN_APPLIMIT;
            return;
        }

        if window.cwnd <= window.ssthresh || self.min_rtt_ticks == 0 {
            self.flags |= FLAG_IN_SLOWSTART;
            NewReno.ack_received(window, ctx, kind);
            return;
        }

        if self.flags & FLAG_RTO_EVENT != 0 && self.flags & FLAG_IN_SLOWSTART != 0 {
            // Reset the epoch after a timeout, slow start ended at ssthresh.
            self.flags &= !(FLAG_RTO_EVENT | FLAG_IN_SLOWSTART);
            self.max_cwnd = u64::from(window.cwnd);
            self.k = 0;
        } else if self.flags & (FLAG_IN_SLOWSTART | FLAG_IN_APPLIMIT) != 0 {
            self.flags &= !(FLAG_IN_SLOWSTART | FLAG_IN_APPLIMIT);
            self.t_last_cong = ctx.now;
            self.k = cubic_k(self.max_cwnd / u64::from(ctx.maxseg.max(1)));
        }

        let mut since_cong = ticks_since(ctx.now, self.t_last_cong);
        if since_cong < 0 {
            // The epoch is older than the tick space, keep it at the maximum.
            since_cong = i32::max_value();
            self.t_last_cong = ctx.now.wrapping_sub(i32::max_value() as Ticks);
        }

        let w_tf = tf_cwnd(since_cong, self.mean_rtt_ticks, self.max_cwnd, ctx.maxseg);
        let w_cubic = cubic_cwnd(
            since_cong.saturating_add(self.mean_rtt_ticks),
            self.max_cwnd,
            ctx.maxseg,
            self.k);

        window.sent_awnd = false;
        let cwnd = u64::from(window.cwnd);
        if w_cubic < w_tf {
            // TCP friendly region.
            if cwnd < w_tf {
                window.cwnd = clamp_window(w_tf);
            }
        } else if cwnd < w_cubic {
            // Concave or convex region.
            window.cwnd = clamp_window(w_cubic);
        }

        // Growth beyond W_max before any congestion event raises it.
        if self.flags & FLAG_CONG_EVENT == 0 && self.max_cwnd < u64::from(window.cwnd) {
            self.max_cwnd = u64::from(window.cwnd);
            self.k = cubic_k(self.max_cwnd / u64::from(ctx.maxseg.max(1)));
        }
    }

    pub(crate) fn cong_signal(&mut self, window: &mut Window, ctx: &Context, signal: Signal) {
        let mss = ctx.maxseg.max(1);
        match signal {
            Signal::DupAck => if !window.fast_recovery {
                if !window.cong_recovery {
                    self.ssthresh_update(window, mss);
                    self.flags |= FLAG_CONG_EVENT;
                    self.t_last_cong = ctx.now;
                    self.k = cubic_k(self.max_cwnd / u64::from(mss));
                }
                window.enter_recovery();
            },
            Signal::Ecn => if !window.cong_recovery {
                self.ssthresh_update(window, mss);
                self.flags |= FLAG_CONG_EVENT;
                self.t_last_cong = ctx.now;
                self.k = cubic_k(self.max_cwnd / u64::from(mss));
                window.cwnd = window.ssthresh;
                window.cong_recovery = true;
            },
            Signal::Rto => {
                if ctx.rxtshift == 1 {
                    self.t_last_cong_prev = self.t_last_cong;
                    self.prev_max_cwnd_cp = self.prev_max_cwnd;
                }
                self.flags |= FLAG_CONG_EVENT | FLAG_RTO_EVENT;
                self.prev_max_cwnd = self.max_cwnd;
                let reduced = (u64::from(window.cwnd) * CUBIC_BETA) >> CUBIC_SHIFT;
                window.ssthresh = clamp_window(reduced).max(2 * mss);
                window.cwnd = mss;
            },
            Signal::RtoErr => {
                self.flags &= !(FLAG_CONG_EVENT | FLAG_RTO_EVENT);
                self.max_cwnd = self.prev_max_cwnd;
                self.prev_max_cwnd = self.prev_max_cwnd_cp;
                self.t_last_cong = self.t_last_cong_prev;
                self.k = cubic_k(self.max_cwnd / u64::from(mss));
            },
        }
    }

    pub(crate) fn conn_init(&mut self, window: &mut Window, _: &Context) {
        // Until the first congestion event the initial window is the best guess for W_max.
        self.max_cwnd = u64::from(window.cwnd);
    }

    pub(crate) fn post_recovery(&mut self, window: &mut Window, ctx: &Context) {
        if window.fast_recovery {
            let mss = ctx.maxseg.max(1);
            window.cwnd = if ctx.pipe < window.ssthresh {
                ctx.pipe.max(mss) + mss
            } else {
                let reduced = (self.max_cwnd * CUBIC_BETA) >> CUBIC_SHIFT;
                clamp_window(reduced).max(2 * mss)
            };
        }

        // Averaged over the epoch.
        if self.epoch_ack_count > 0 && self.sum_rtt_ticks >= i64::from(self.epoch_ack_count) {
            self.mean_rtt_ticks = (self.sum_rtt_ticks / i64::from(self.epoch_ack_count)) as i32;
        }
        self.epoch_ack_count = 0;
        self.sum_rtt_ticks = 0;
    }

    pub(crate) fn after_idle(&mut self, window: &mut Window, ctx: &Context) {
        self.max_cwnd = self.max_cwnd.max(u64::from(window.cwnd));
        self.k = cubic_k(self.max_cwnd / u64::from(ctx.maxseg.max(1)));
        NewReno.after_idle(window, ctx);
        self.t_last_cong = ctx.now;
    }

    fn record_rtt(&mut self, ctx: &Context) {
        if ctx.rtt_samples < CUBIC_MIN_RTT_SAMPLES {
            return;
        }
        let srtt_ticks = ctx.srtt >> 5;
        if srtt_ticks < self.min_rtt_ticks || self.min_rtt_ticks == 0 {
            self.min_rtt_ticks = srtt_ticks.max(1);
            if self.min_rtt_ticks > self.mean_rtt_ticks {
                self.mean_rtt_ticks = self.min_rtt_ticks;
            }
        }
        self.sum_rtt_ticks += i64::from(srtt_ticks);
        self.epoch_ack_count += 1;
    }

    fn ssthresh_update(&mut self, window: &mut Window, mss: u32) {
        let mut cwnd = u64::from(window.cwnd);
        // Fast convergence, release bandwidth to newer flows.
        if cwnd < self.max_cwnd {
            cwnd = (cwnd * CUBIC_FC_FACTOR) >> CUBIC_SHIFT;
        }
        self.prev_max_cwnd = self.max_cwnd;
        self.max_cwnd = cwnd;

        let ssthresh = if self.flags & FLAG_CONG_EVENT == 0 {
            // The first reduction aligns the concave region with half the window.
            self.max_cwnd = (cwnd * CUBIC_BETA) >> CUBIC_SHIFT;
            cwnd >> 1
        } else {
            (cwnd * CUBIC_BETA) >> CUBIC_SHIFT
        };
        window.ssthresh = clamp_window(ssthresh).max(2 * mss);
    }
}

fn clamp_window(window: u64) -> u32 {
    window.min(u64::from(u32::max_value())) as u32
}

/// Compute `K`, the time to regain `wmax_pkts` segments, in seconds scaled by `CUBIC_SHIFT`.
///
/// The cube root is approximated by a polynomial on a rebased argument.
fn cubic_k(wmax_pkts: u64) -> i64 {
    let mut s = ((wmax_pkts.min(1 << 40) * ONE_SUB_CUBIC_BETA) << CUBIC_SHIFT) as i64
        / CUBIC_C_FACTOR;
    let mut p = 0;
    // Rebase s into [1/8, 1) with CUBIC_SHIFT fractional bits.
    while s >= 256 {
        s >>= 3;
        p += 1;
    }
    let k = ((s * 275) >> CUBIC_SHIFT) + 98 - (((s * s * 120) >> CUBIC_SHIFT) >> CUBIC_SHIFT);
    k << p
}

/// The window of the cubic function `C(t - K)^3 + W_max`, in bytes.
fn cubic_cwnd(ticks_since_cong: i32, wmax: u64, smss: u32, k: i64) -> u64 {
    let t = ((i64::from(ticks_since_cong) << CUBIC_SHIFT) - k * HZ) / HZ;
    if t > CUBED_ROOT_MAX_ULONG {
        return u64::from(i32::max_value() as u32);
    }
    if t < -CUBED_ROOT_MAX_ULONG {
        return 0;
    }
    let cube = i128::from(t) * i128::from(t) * i128::from(t);
    let cwnd = ((cube * i128::from(CUBIC_C_FACTOR) * i128::from(smss)) >> CUBIC_SHIFT_4)
        + i128::from(wmax);
    if cwnd < 0 {
        0
    } else {
        cwnd.min(i128::from(u64::max_value())) as u64
    }
}

/// The window of standard TCP after the same time, in bytes.
fn tf_cwnd(ticks_since_cong: i32, rtt_ticks: i32, wmax: u64, smss: u32) -> u64 {
    let since = ticks_since_cong.max(0) as u64;
    let rtt = rtt_ticks.max(1) as u64;
    ((wmax * CUBIC_BETA)
        + (((THREE_X_PT3 * since * u64::from(smss)) << CUBIC_SHIFT) / TWO_SUB_PT3 / rtt))
        >> CUBIC_SHIFT
}
