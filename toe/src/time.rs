/*! Time structures.

The engine never reads a clock on its own. Every call to [`Toe::poll`] passes the current time and
all timers compare against that value, which keeps tests deterministic.

 - [`Instant`] is used to represent absolute time.
 - [`Duration`] is used to represent relative time.
 - [`Expiration`] is the earliest point at which polling has timer work to do.

[`Toe::poll`]: ../struct.Toe.html#method.poll
*/
use core::{cmp, fmt, ops};
pub use core::time::Duration;

/// A representation of an absolute time value.
///
/// A number of milliseconds, monotonically increasing since an arbitrary moment in time such as
/// the start of the engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Instant {
    millis: i64,
}

/// An expiration time, inversion of `Option`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    /// Work becomes due at this instant.
    When(Instant),
    /// Nothing is scheduled.
    Never,
}

use Expiration::{When, Never};

impl Instant {
    /// The instant at which the engine starts.
    pub const ZERO: Instant = Instant { millis: 0 };

    /// Create a new `Instant` from a number of milliseconds.
    pub fn from_millis<T: Into<i64>>(millis: T) -> Instant {
        Instant { millis: millis.into() }
    }

    /// Create a new `Instant` from a number of seconds.
    pub fn from_secs<T: Into<i64>>(secs: T) -> Instant {
        Instant { millis: secs.into() * 1000 }
    }

    /// The number of whole seconds that have passed since the beginning of time.
    pub fn secs(&self) -> i64 {
        self.millis / 1000
    }

    /// The total number of milliseconds that have passed since the beginning of time.
    pub fn total_millis(&self) -> i64 {
        self.millis
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:03}s", self.secs(), self.millis % 1000)
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

impl ops::Sub<Instant> for Instant {
    type Output = Duration;

    /// The absolute distance between two instants.
    fn sub(self, rhs: Instant) -> Duration {
        Duration::from_millis((self.millis - rhs.millis).abs() as u64)
    }
}

impl Default for Expiration {
    fn default() -> Self {
        Expiration::Never
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

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn instant_ops() {
        assert_eq!(Instant::from_millis(4) + Duration::from_millis(6), Instant::from_millis(10));
        assert_eq!(Instant::from_millis(7) - Instant::from_millis(5), Duration::from_millis(2));
        assert_eq!(Instant::from_millis(5) - Instant::from_millis(7), Duration::from_millis(2));
        assert_eq!(Instant::from_secs(3), Instant::from_millis(3000));
    }

    #[test]
    fn display() {
        assert_eq!(format!("{}", Instant::from_millis(5674)), "5.674s");
        assert_eq!(format!("{}", Instant::from_millis(5004)), "5.004s");
    }

    #[test]
    fn expiration_order() {
        let soon = Expiration::When(Instant::from_millis(1));
        let later = Expiration::When(Instant::from_millis(2));
        assert!(soon < later);
        assert!(later < Expiration::Never);
        assert_eq!(soon.min(Expiration::Never), soon);
    }
}
