//! Monotonic time for wait timeouts
//!
//! A wait measures its own elapsed time with a [`Clock`]. Hosts use
//! [`StdClock`]; embedded users can back a clock with any free running
//! timer, as long as it doesn't move backwards.

use core::time::Duration;

/// A monotonic time source
pub trait Clock {
    /// Time elapsed since an arbitrary, fixed epoch
    fn now(&self) -> Duration;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Duration {
        (**self).now()
    }
}

/// A [`Clock`] backed by [`std::time::Instant`]
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    epoch: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    /// A clock that reads zero now
    pub fn new() -> Self {
        StdClock {
            epoch: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}
