/*! Time structures.

The engine measures everything in ticks of one millisecond. Two representations exist:

 - [Instant] is an absolute point in time, supplied by the caller on each call.
 - [Ticks] are the wrapping 32-bit tick counter derived from it, used for timestamps, RTT
   samples and idle times just as a kernel `ticks` variable would.

Timer deadlines are kept as an [Expiration], which orders `Never` after every point in time.

[Instant]: struct.Instant.html
[Ticks]: type.Ticks.html
[Expiration]: enum.Expiration.html
*/
use core::{cmp, fmt, ops};
pub use core::time::Duration;

/// A wrapping count of milliseconds.
///
/// Differences between two tick values must be computed with wrapping arithmetic and interpreted
/// as signed when their order is not known, see [`ticks_since`].
///
/// [`ticks_since`]: fn.ticks_since.html
pub type Ticks = u32;

/// A representation of an absolute time value.
///
/// The `Instant` type is a wrapper around a `i64` value that represents a number of
/// milliseconds, monotonically increasing since an arbitrary moment in time, such as the start
/// of the traffic generator.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Instant {
    /// The number of milliseconds since the arbitrary epoch.
    pub millis: i64,
}

/// An expiration time, inversion of `Option`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    /// Expires at the given instant.
    When(Instant),
    /// Never expires.
    Never,
}

use Expiration::{When, Never};

impl Instant {
    /// Create a new `Instant` from a number of milliseconds.
    pub fn from_millis<T: Into<i64>>(millis: T) -> Instant {
        Instant { millis: millis.into() }
    }

    /// Create a new `Instant` from a number of seconds.
    pub fn from_secs<T: Into<i64>>(secs: T) -> Instant {
        Instant { millis: secs.into() * 1000 }
    }

    /// The fractional number of milliseconds that have passed since the beginning of time.
    pub fn millis(&self) -> i64 {
        self.millis % 1000
    }

    /// The number of whole seconds that have passed since the beginning of time.
    pub fn secs(&self) -> i64 {
        self.millis / 1000
    }

    /// The total number of milliseconds that have passed since the beginning of time.
    pub fn total_millis(&self) -> i64 {
        self.millis
    }

    /// The wrapping tick counter at this instant.
    pub fn ticks(&self) -> Ticks {
        self.millis as Ticks
    }

    /// The instant a number of ticks later.
    pub fn after_ticks(self, ticks: Ticks) -> Instant {
        Instant::from_millis(self.millis + i64::from(ticks))
    }
}

/// The signed number of ticks from `earlier` to `now`.
///
/// Values that are more than half the tick space apart are interpreted as lying in the past,
/// which is the usual modular comparison for kernel tick counters.
pub fn ticks_since(now: Ticks, earlier: Ticks) -> i32 {
    now.wrapping_sub(earlier) as i32
}

/// Convert a duration into whole ticks, saturating at the largest tick value.
pub fn duration_ticks(duration: Duration) -> Ticks {
    let millis = duration.as_millis();
    if millis > u128::from(Ticks::max_value()) {
        Ticks::max_value()
    } else {
        millis as Ticks
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:03}s", self.secs(), self.millis())
    }
}

impl ops::Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        Instant::from_millis(self.millis + rhs.as_millis() as i64)
    }
}

impl ops::AddAssign<Duration> for Instant {
    fn add_assign(&mut self, rhs: Duration) {
        self.millis += rhs.as_millis() as i64;
    }
}

impl ops::Sub<Duration> for Instant {
    type Output = Instant;

    fn sub(self, rhs: Duration) -> Instant {
        Instant::from_millis(self.millis - rhs.as_millis() as i64)
    }
}

impl ops::Sub<Instant> for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Duration {
        Duration::from_millis((self.millis - rhs.millis).abs() as u64)
    }
}

impl Default for Expiration {
    fn default() -> Self {
        Expiration::Never
    }
}

impl Expiration {
    /// Check if the deadline has been reached at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        match self {
            When(at) => *at <= now,
            Never => false,
        }
    }
}

impl From<Option<Instant>> for Expiration {
    fn from(opt: Option<Instant>) -> Self {
        match opt {
            Some(instant) => When(instant),
            None => Never,
        }
    }
}

impl From<Expiration> for Option<Instant> {
    fn from(opt: Expiration) -> Self {
        match opt {
            When(instant) => Some(instant),
            Never => None,
        }
    }
}

impl cmp::PartialOrd<Self> for Expiration {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl cmp::Ord for Expiration {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        match (*self, *other) {
            (Never, Never) => cmp::Ordering::Equal,
            (Never, When(_)) => cmp::Ordering::Greater,
            (When(_), Never) => cmp::Ordering::Less,
            (When(ref a), When(ref b)) => a.cmp(b),
        }
    }
}
