//! The named timers of a connection.
//!
//! A connection never waits by itself. It arms and cancels its timers through a [`TimerService`]
//! and expects [`Connection::on_timer`] to be called once one of them expires. Arming an armed
//! timer moves its deadline, cancelling a disarmed one does nothing.
//!
//! [`TimerTable`] is a service for a single connection that simply remembers the deadlines. A
//! traffic generator with many connections would use a timing wheel instead.
//!
//! [`TimerService`]: trait.TimerService.html
//! [`Connection::on_timer`]: ../struct.Connection.html#method.on_timer
//! [`TimerTable`]: struct.TimerTable.html
use crate::time::{Expiration, Instant, Ticks};

/// Identifies one of the timers of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Timer {
    /// Retransmit unacknowledged data, or the SYN.
    Retransmit,
    /// Probe a zero window.
    Persist,
    /// Probe an idle connection, also bounds the handshake.
    Keepalive,
    /// Ends `TIME_WAIT`, and `FIN_WAIT_2` after the user closed.
    TwoMsl,
    /// Send an acknowledgement that was held back.
    DelayedAck,
}

/// Arms and cancels timers on behalf of a connection.
pub trait TimerService {
    /// Expire `timer` after `ticks`, replacing an earlier deadline.
    fn arm(&mut self, timer: Timer, ticks: Ticks);

    /// Disarm `timer`.
    fn cancel(&mut self, timer: Timer);

    /// Check if `timer` is armed.
    fn is_armed(&self, timer: Timer) -> bool;
}

/// The deadlines of one connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimerTable {
    now: Instant,
    deadlines: [Expiration; Timer::COUNT],
}

impl Timer {
    const COUNT: usize = 5;

    /// All timers, in order of precedence when they expire at the same time.
    pub const ALL: [Timer; Timer::COUNT] = [
        Timer::Retransmit,
        Timer::Persist,
        Timer::Keepalive,
        Timer::TwoMsl,
        Timer::DelayedAck,
    ];

    fn index(self) -> usize {
        match self {
            Timer::Retransmit => 0,
            Timer::Persist => 1,
            Timer::Keepalive => 2,
            Timer::TwoMsl => 3,
            Timer::DelayedAck => 4,
        }
    }
}

impl TimerTable {
    /// A table without armed timers.
    pub fn new(now: Instant) -> Self {
        TimerTable {
            now,
            deadlines: [Expiration::Never; Timer::COUNT],
        }
    }

    /// Advance the clock that new deadlines are relative to.
    pub fn update(&mut self, now: Instant) {
        self.now = now;
    }

    /// The deadline of a timer.
    pub fn deadline(&self, timer: Timer) -> Expiration {
        self.deadlines[timer.index()]
    }

    /// The earliest armed deadline.
    pub fn next_deadline(&self) -> Expiration {
        self.deadlines.iter().copied().min().unwrap_or(Expiration::Never)
    }

    /// Take the earliest timer expired at the current time.
    ///
    /// The timer is disarmed before it is returned, the handler may arm it again.
    pub fn pop_expired(&mut self) -> Option<Timer> {
        let now = self.now;
        let (timer, _) = Timer::ALL.iter()
            .map(|&timer| (timer, self.deadlines[timer.index()]))
            .filter(|(_, deadline)| deadline.is_due(now))
            .min_by_key(|&(_, deadline)| deadline)?;
        self.deadlines[timer.index()] = Expiration::Never;
        Some(timer)
    }
}

impl TimerService for TimerTable {
    fn arm(&mut self, timer: Timer, ticks: Ticks) {
        self.deadlines[timer.index()] = Expiration::When(self.now.after_ticks(ticks));
    }

    fn cancel(&mut self, timer: Timer) {
        self.deadlines[timer.index()] = Expiration::Never;
    }

    fn is_armed(&self, timer: Timer) -> bool {
        self.deadlines[timer.index()] != Expiration::Never
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn expire_in_order() {
        let mut table = TimerTable::new(Instant::from_millis(0));
        table.arm(Timer::DelayedAck, 100);
        table.arm(Timer::Retransmit, 200);
        table.arm(Timer::Keepalive, 100);
        assert_eq!(table.next_deadline(), Expiration::When(Instant::from_millis(100)));

        table.update(Instant::from_millis(50));
        assert_eq!(table.pop_expired(), None);

        table.update(Instant::from_millis(250));
        // Equal deadlines expire in order of precedence.
        assert_eq!(table.pop_expired(), Some(Timer::Keepalive));
        assert_eq!(table.pop_expired(), Some(Timer::DelayedAck));
        assert_eq!(table.pop_expired(), Some(Timer::Retransmit));
        assert_eq!(table.pop_expired(), None);
        assert_eq!(table.next_deadline(), Expiration::Never);
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut table = TimerTable::new(Instant::from_millis(0));
        table.cancel(Timer::Persist);
        assert!(!table.is_armed(Timer::Persist));
        table.arm(Timer::Persist, 10);
        assert!(table.is_armed(Timer::Persist));
        table.cancel(Timer::Persist);
        table.cancel(Timer::Persist);
        assert!(!table.is_armed(Timer::Persist));
        assert_eq!(table, TimerTable::new(Instant::from_millis(0)));
    }

    #[test]
    fn rearm_during_handling() {
        let mut table = TimerTable::new(Instant::from_millis(0));
        table.arm(Timer::Retransmit, 10);
        table.update(Instant::from_millis(10));
        let fired = table.pop_expired();
        assert_eq!(fired, Some(Timer::Retransmit));
        // A handler arming its own timer schedules it from the current time.
        table.arm(Timer::Retransmit, 20);
        assert_eq!(table.pop_expired(), None);
        assert_eq!(table.deadline(Timer::Retransmit), Expiration::When(Instant::from_millis(30)));
    }
}
