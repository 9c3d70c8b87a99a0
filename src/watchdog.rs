//! This module contains the type definitions necessary to support the
//! monitoring functionality for the analysis engine.
//!
//! # Best-Effort Monitoring
//!
//! Note that the monitoring provided by the watchdog is a best-effort
//! approach. The engine polls it once every few worklist iterations, so a
//! stop request takes effect at the next poll point rather than immediately.
//!
//! An aborted run yields reduced precision (fewer or no facts), never a wrong
//! fact, so coarse-grained polling is sufficient here.

use std::{
    fmt::Debug,
    rc::Rc,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use crate::constant::DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS;

/// A dynamically dispatched [`Watchdog`] instance.
pub type DynWatchdog = Rc<dyn Watchdog>;

/// The interface to an object that can be polled to see if the engine needs
/// to abort its analysis.
///
/// The interface is simple, but it can encapsulate arbitrary logic as far as
/// the engine is concerned, allowing the client to implement complex stop
/// logic.
pub trait Watchdog
where
    Self: Debug,
{
    /// Checks if the engine should halt its analysis and return a timed-out
    /// status.
    #[must_use]
    fn should_stop(&self) -> bool;

    /// Gets the number of worklist iterations the engine should wait before
    /// polling the watchdog.
    #[must_use]
    fn poll_every(&self) -> usize;
}

/// An implementation of the [`Watchdog`] trait that does not place any
/// restrictions on the execution of the engine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LazyWatchdog;

impl LazyWatchdog {
    /// Wraps `self` into an [`Rc`].
    #[must_use]
    pub fn in_rc(self) -> Rc<dyn Watchdog> {
        Rc::new(self)
    }
}

impl Watchdog for LazyWatchdog {
    fn should_stop(&self) -> bool {
        false
    }

    fn poll_every(&self) -> usize {
        // Something ridiculously huge so it basically never gets checked.
        1_000_000_000_000
    }
}

/// A watchdog that tells the engine when to stop based on a flag in the form
/// of an atomic boolean.
///
/// By default, it requests that the engine poll for watchdog status every
/// [`DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS`]. This is configurable by calling
/// [`Self::polling_every`].
#[derive(Clone, Debug)]
pub struct FlagWatchdog {
    /// The flag that should be mutated externally to stop the engine by this
    /// watchdog.
    flag: Arc<AtomicBool>,

    /// The number of worklist iterations the engine should wait before
    /// polling the watchdog.
    poll_loop_iterations: usize,
}

impl FlagWatchdog {
    /// Constructs a new `FlagWatchdog` wrapping the provided `flag`.
    #[must_use]
    pub fn new(flag: Arc<AtomicBool>) -> Self {
        let poll_loop_iterations = DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS;
        Self {
            flag,
            poll_loop_iterations,
        }
    }

    /// Specifies the number of worklist iterations that the engine should
    /// wait before polling the watchdog for status.
    #[must_use]
    pub fn polling_every(mut self, iterations: usize) -> Self {
        self.poll_loop_iterations = iterations;
        self
    }

    /// Wraps the watchdog into an [`Rc`].
    #[must_use]
    pub fn in_rc(self) -> Rc<dyn Watchdog> {
        Rc::new(self)
    }
}

impl Watchdog for FlagWatchdog {
    fn should_stop(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    fn poll_every(&self) -> usize {
        self.poll_loop_iterations
    }
}

/// A watchdog that tells the engine to stop once a wall-clock deadline has
/// passed.
///
/// Cancellation is cooperative and coarse: the deadline is checked once per
/// poll interval, so the engine may overrun the deadline by up to one
/// interval's worth of work.
#[derive(Clone, Debug)]
pub struct DeadlineWatchdog {
    /// The instant after which the engine should stop.
    deadline: Instant,

    /// The number of worklist iterations the engine should wait before
    /// polling the watchdog.
    poll_loop_iterations: usize,
}

impl DeadlineWatchdog {
    /// Constructs a new `DeadlineWatchdog` that requests a stop once
    /// `deadline` has passed.
    #[must_use]
    pub fn new(deadline: Instant) -> Self {
        let poll_loop_iterations = DEFAULT_WATCHDOG_POLL_LOOP_ITERATIONS;
        Self {
            deadline,
            poll_loop_iterations,
        }
    }

    /// Specifies the number of worklist iterations that the engine should
    /// wait before polling the watchdog for status.
    #[must_use]
    pub fn polling_every(mut self, iterations: usize) -> Self {
        self.poll_loop_iterations = iterations;
        self
    }

    /// Wraps the watchdog into an [`Rc`].
    #[must_use]
    pub fn in_rc(self) -> Rc<dyn Watchdog> {
        Rc::new(self)
    }
}

impl Watchdog for DeadlineWatchdog {
    fn should_stop(&self) -> bool {
        Instant::now() >= self.deadline
    }

    fn poll_every(&self) -> usize {
        self.poll_loop_iterations
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::{Duration, Instant},
    };

    use crate::watchdog::{DeadlineWatchdog, FlagWatchdog, LazyWatchdog, Watchdog};

    #[test]
    fn lazy_watchdog_never_stops() {
        assert!(!LazyWatchdog.should_stop());
    }

    #[test]
    fn flag_watchdog_stops_when_flag_is_set() {
        let flag = Arc::new(AtomicBool::new(false));
        let watchdog = FlagWatchdog::new(flag.clone()).polling_every(1);

        assert!(!watchdog.should_stop());
        flag.store(true, Ordering::Relaxed);
        assert!(watchdog.should_stop());
        assert_eq!(watchdog.poll_every(), 1);
    }

    #[test]
    fn deadline_watchdog_stops_after_deadline() {
        let expired = DeadlineWatchdog::new(Instant::now() - Duration::from_secs(1));
        assert!(expired.should_stop());

        let distant = DeadlineWatchdog::new(Instant::now() + Duration::from_secs(3600));
        assert!(!distant.should_stop());
    }
}
