use super::{AckKind, Context, Signal, Window};

/// Slow start, congestion avoidance and fast recovery after RFC 5681 and RFC 6582.
///
/// The algorithm has no state of its own, everything lives in the `Window`. Growth uses
/// appropriate byte counting (RFC 3465): slow start grows by the acknowledged bytes up to
/// `abc_l_var` segments, congestion avoidance by one segment per acknowledged window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct NewReno;

impl NewReno {
    pub(crate) fn ack_received(&mut self, window: &mut Window, ctx: &Context, kind: AckKind) {
        if kind != AckKind::Ack || window.in_recovery() || !ctx.cwnd_limited {
            return;
        }

        let increase = if window.cwnd > window.ssthresh {
            if window.sent_awnd {
                window.sent_awnd = false;
                ctx.maxseg
            } else {
                0
            }
        } else if ctx.all_sent {
            let limit = ctx.segments.max(1).saturating_mul(ctx.abc_l_var).saturating_mul(ctx.maxseg);
            ctx.bytes_this_ack.min(limit)
        } else {
            // Retransmitting after a timeout, grow carefully.
            ctx.bytes_this_ack.min(ctx.maxseg)
        };

        if increase > 0 {
            window.cwnd = window.cwnd.saturating_add(increase).min(ctx.max_window());
        }
    }

    pub(crate) fn cong_signal(&mut self, window: &mut Window, ctx: &Context, signal: Signal) {
        let mss = ctx.maxseg.max(1);
        let half = (ctx.snd_wnd.min(window.cwnd) / 2 / mss).max(2) * mss;

        match signal {
            Signal::DupAck => if !window.fast_recovery {
                if !window.cong_recovery {
                    window.ssthresh = half;
                }
                window.enter_recovery();
            },
            Signal::Ecn => if !window.cong_recovery {
                window.ssthresh = half;
                window.cwnd = half;
                window.cong_recovery = true;
            },
            Signal::Rto => {
                window.ssthresh = half;
                window.cwnd = mss;
            },
            Signal::RtoErr => (),
        }
    }

    pub(crate) fn post_recovery(&mut self, window: &mut Window, ctx: &Context) {
        if !window.fast_recovery {
            return;
        }
        // Avoid a burst when little data is in flight.
        window.cwnd = if ctx.pipe < window.ssthresh {
            ctx.pipe.max(ctx.maxseg) + ctx.maxseg
        } else {
            window.ssthresh
        };
    }

    pub(crate) fn after_idle(&mut self, window: &mut Window, ctx: &Context) {
        window.ssthresh = window.ssthresh.max(window.cwnd - (window.cwnd >> 2));
        window.cwnd = window.cwnd.min(ctx.initial_window);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const MSS: u32 = 1460;

    fn context() -> Context {
        Context {
            maxseg: MSS,
            snd_wnd: 1 << 20,
            bytes_this_ack: MSS,
            segments: 1,
            abc_l_var: 2,
            all_sent: true,
            cwnd_limited: true,
            initial_window: 10 * MSS,
            ..Context::default()
        }
    }

    #[test]
    fn slow_start_byte_counting() {
        let mut reno = NewReno::default();
        let mut window = Window { cwnd: 10 * MSS, ssthresh: u32::max_value(), ..Window::default() };
        let mut ctx = context();

        ctx.bytes_this_ack = 4 * MSS;
        reno.ack_received(&mut window, &ctx, AckKind::Ack);
        // Limited to abc_l_var segments.
        assert_eq!(window.cwnd, 12 * MSS);

        ctx.all_sent = false;
        reno.ack_received(&mut window, &ctx, AckKind::Ack);
        assert_eq!(window.cwnd, 13 * MSS);

        reno.ack_received(&mut window, &ctx, AckKind::DupAck);
        assert_eq!(window.cwnd, 13 * MSS);

        ctx.cwnd_limited = false;
        reno.ack_received(&mut window, &ctx, AckKind::Ack);
        assert_eq!(window.cwnd, 13 * MSS);
    }

    #[test]
    fn avoidance_one_segment_per_window() {
        let mut reno = NewReno::default();
        let mut window = Window { cwnd: 20 * MSS, ssthresh: 10 * MSS, ..Window::default() };
        let ctx = context();
        reno.ack_received(&mut window, &ctx, AckKind::Ack);
        assert_eq!(window.cwnd, 20 * MSS);
        window.sent_awnd = true;
        reno.ack_received(&mut window, &ctx, AckKind::Ack);
        assert_eq!(window.cwnd, 21 * MSS);
        assert!(!window.sent_awnd);
    }

    #[test]
    fn fast_recovery() {
        let mut reno = NewReno::default();
        let mut window = Window { cwnd: 20 * MSS, ssthresh: u32::max_value(), ..Window::default() };
        let mut ctx = context();
        reno.cong_signal(&mut window, &ctx, Signal::DupAck);
        assert!(window.fast_recovery && window.cong_recovery);
        assert_eq!(window.ssthresh, 10 * MSS);

        // Growth is suspended during recovery.
        reno.ack_received(&mut window, &ctx, AckKind::Ack);
        assert_eq!(window.cwnd, 20 * MSS);

        ctx.pipe = 3 * MSS;
        reno.post_recovery(&mut window, &ctx);
        assert_eq!(window.cwnd, 4 * MSS);

        window.cwnd = 20 * MSS;
        ctx.pipe = 15 * MSS;
        reno.post_recovery(&mut window, &ctx);
        assert_eq!(window.cwnd, 10 * MSS);
    }

    #[test]
    fn timeout_and_idle() {
        let mut reno = NewReno::default();
        let mut window = Window { cwnd: 3 * MSS, ssthresh: u32::max_value(), ..Window::default() };
        let ctx = context();
        reno.cong_signal(&mut window, &ctx, Signal::Rto);
        assert_eq!(window.cwnd, MSS);
        assert_eq!(window.ssthresh, 2 * MSS);

        let mut window = Window { cwnd: 40 * MSS, ssthresh: 8 * MSS, ..Window::default() };
        reno.after_idle(&mut window, &ctx);
        assert_eq!(window.cwnd, 10 * MSS);
        assert_eq!(window.ssthresh, 30 * MSS);
    }
}
