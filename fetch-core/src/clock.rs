/// Monotonic time and cooperative scheduling
/// Every wait in the crate goes through `poll_until` so the yield hook runs on each pass

use std::time::{Duration, Instant};

/// Source of monotonic milliseconds plus the scheduler hooks used by polling loops
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin
    fn now_ms(&self) -> u64;

    /// Block for a fixed hold time (power sequencing only)
    fn sleep_ms(&self, ms: u64);

    /// Give the surrounding scheduler a chance to run (feeds watchdogs on device)
    fn yield_now(&self);

    fn elapsed_since(&self, start_ms: u64) -> u64 {
        self.now_ms().saturating_sub(start_ms)
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }

    fn sleep_ms(&self, ms: u64) {
        (**self).sleep_ms(ms)
    }

    fn yield_now(&self) {
        (**self).yield_now()
    }
}

/// Outcome of a bounded wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll<T> {
    Ready(T),
    TimedOut,
}

impl<T> Poll<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            Poll::Ready(value) => Some(value),
            Poll::TimedOut => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Poll::Ready(_))
    }
}

/// Run `step` until it yields a value or `timeout_ms` elapses.
///
/// The step is always evaluated at least once, and the clock's yield hook
/// runs after every pass that produced nothing.
pub fn poll_until<C, T, F>(clock: &C, timeout_ms: u64, mut step: F) -> Poll<T>
where
    C: Clock + ?Sized,
    F: FnMut() -> Option<T>,
{
    let start = clock.now_ms();
    loop {
        if let Some(value) = step() {
            return Poll::Ready(value);
        }
        if clock.elapsed_since(start) >= timeout_ms {
            return Poll::TimedOut;
        }
        clock.yield_now();
    }
}

/// Host clock backed by `std::time::Instant`
pub struct StdClock {
    origin: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn sleep_ms(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }

    fn yield_now(&self) {
        std::thread::yield_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualClock;

    #[test]
    fn test_poll_returns_first_value() {
        let clock = ManualClock::new();
        let mut calls = 0;
        let result = poll_until(&clock, 100, || {
            calls += 1;
            if calls == 3 { Some(calls) } else { None }
        });
        assert_eq!(result, Poll::Ready(3));
        assert_eq!(clock.yields(), 2);
    }

    #[test]
    fn test_poll_times_out_at_bound() {
        let clock = ManualClock::new();
        let result: Poll<()> = poll_until(&clock, 250, || None);
        assert_eq!(result, Poll::TimedOut);
        assert_eq!(clock.now_ms(), 250);
    }

    #[test]
    fn test_zero_timeout_still_checks_once() {
        let clock = ManualClock::new();
        assert_eq!(poll_until(&clock, 0, || Some(7)), Poll::Ready(7));
        assert!(!poll_until::<_, (), _>(&clock, 0, || None).is_ready());
    }

    #[test]
    fn test_std_clock_is_monotonic() {
        let clock = StdClock::new();
        let a = clock.now_ms();
        clock.sleep_ms(2);
        assert!(clock.now_ms() >= a + 2);
    }
}
