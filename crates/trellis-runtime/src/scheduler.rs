#![forbid(unsafe_code)]

//! Cooperative scheduler: a microtask queue plus delayed timers.
//!
//! Nothing here runs on its own. The host drives the scheduler by calling
//! [`Scheduler::drain_microtasks`] at the end of a turn and
//! [`Scheduler::run_due`] (or [`Scheduler::advance`] with a
//! [`ManualClock`]) when time passes.
//!
//! # Invariants
//!
//! 1. Microtasks run in FIFO order; a microtask queued during a drain runs
//!    in the same drain.
//! 2. Timers fire in due order, ties broken by creation order.
//! 3. Microtasks are drained after every timer callback.
//! 4. No borrow is held while a callback runs.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::rc::Rc;

use web_time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Clocks
// ---------------------------------------------------------------------------

/// Source of the current time.
pub trait Clock {
    fn now(&self) -> Instant;

    /// Move time forward. Only manual clocks honour this.
    fn advance(&self, _by: Duration) -> bool {
        false
    }
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<Instant>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: Cell::new(Instant::now()),
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }

    fn advance(&self, by: Duration) -> bool {
        self.now.set(self.now.get() + by);
        true
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

type Callback = Box<dyn FnOnce()>;

/// Handle for cancelling a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    due: Instant,
    seq: u64,
}

impl TimerHandle {
    #[must_use]
    pub fn due(&self) -> Instant {
        self.due
    }
}

pub struct Scheduler {
    clock: Rc<dyn Clock>,
    microtasks: RefCell<VecDeque<Callback>>,
    timers: RefCell<BTreeMap<(Instant, u64), Callback>>,
    next_seq: Cell<u64>,
}

impl Scheduler {
    #[must_use]
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            microtasks: RefCell::new(VecDeque::new()),
            timers: RefCell::new(BTreeMap::new()),
            next_seq: Cell::new(0),
        }
    }

    /// A scheduler driven by [`SystemClock`].
    #[must_use]
    pub fn system() -> Self {
        Self::new(Rc::new(SystemClock))
    }

    /// A scheduler driven by a fresh [`ManualClock`].
    #[must_use]
    pub fn manual() -> Self {
        Self::new(Rc::new(ManualClock::new()))
    }

    #[must_use]
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    // -- microtasks --------------------------------------------------------

    pub fn queue_microtask(&self, task: impl FnOnce() + 'static) {
        self.microtasks.borrow_mut().push_back(Box::new(task));
    }

    #[must_use]
    pub fn pending_microtasks(&self) -> usize {
        self.microtasks.borrow().len()
    }

    /// Run microtasks until the queue is empty. Returns how many ran.
    pub fn drain_microtasks(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.microtasks.borrow_mut().pop_front();
            let Some(task) = next else {
                break;
            };
            task();
            ran += 1;
        }
        ran
    }

    // -- timers ------------------------------------------------------------

    /// Run `callback` once `delay` has elapsed.
    pub fn set_timeout(&self, delay: Duration, callback: impl FnOnce() + 'static) -> TimerHandle {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        let due = self.clock.now() + delay;
        self.timers
            .borrow_mut()
            .insert((due, seq), Box::new(callback));
        tracing::trace!(delay_ms = delay.as_millis() as u64, seq, "timer scheduled");
        TimerHandle { due, seq }
    }

    /// Cancel a timer. Returns `false` if it already fired or was cancelled.
    pub fn clear_timeout(&self, handle: TimerHandle) -> bool {
        self.timers
            .borrow_mut()
            .remove(&(handle.due, handle.seq))
            .is_some()
    }

    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    /// When the earliest timer is due.
    #[must_use]
    pub fn next_due(&self) -> Option<Instant> {
        self.timers.borrow().keys().next().map(|(due, _)| *due)
    }

    /// Fire every timer that is due now. Returns how many fired.
    pub fn run_due(&self) -> usize {
        let mut fired = 0;
        loop {
            let now = self.clock.now();
            let next = {
                let mut timers = self.timers.borrow_mut();
                match timers.first_key_value() {
                    Some(((due, _), _)) if *due <= now => timers.pop_first(),
                    _ => None,
                }
            };
            let Some((_, callback)) = next else {
                break;
            };
            callback();
            self.drain_microtasks();
            fired += 1;
        }
        fired
    }

    /// Advance a manual clock by `by`, then fire due timers and drain
    /// microtasks.
    pub fn advance(&self, by: Duration) -> usize {
        self.clock.advance(by);
        self.drain_microtasks();
        self.run_due()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::system()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("microtasks", &self.microtasks.borrow().len())
            .field("timers", &self.timers.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> Rc<RefCell<Vec<&'static str>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn microtasks_fifo_and_reentrant() {
        let s = Rc::new(Scheduler::manual());
        let l = log();
        let (l1, l2, s2) = (Rc::clone(&l), Rc::clone(&l), Rc::clone(&s));
        s.queue_microtask(move || {
            l1.borrow_mut().push("a");
            let l3 = Rc::clone(&l1);
            s2.queue_microtask(move || l3.borrow_mut().push("c"));
        });
        s.queue_microtask(move || l2.borrow_mut().push("b"));
        assert_eq!(s.drain_microtasks(), 3);
        assert_eq!(*l.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn timers_fire_in_due_order() {
        let s = Scheduler::manual();
        let l = log();
        let (l1, l2, l3) = (Rc::clone(&l), Rc::clone(&l), Rc::clone(&l));
        s.set_timeout(Duration::from_millis(20), move || l1.borrow_mut().push("late"));
        s.set_timeout(Duration::from_millis(10), move || l2.borrow_mut().push("early"));
        s.set_timeout(Duration::from_millis(10), move || l3.borrow_mut().push("early2"));
        assert_eq!(s.advance(Duration::from_millis(5)), 0);
        assert_eq!(s.advance(Duration::from_millis(5)), 2);
        assert_eq!(*l.borrow(), vec!["early", "early2"]);
        assert_eq!(s.advance(Duration::from_millis(10)), 1);
        assert_eq!(s.pending_timers(), 0);
    }

    #[test]
    fn cleared_timer_never_fires() {
        let s = Scheduler::manual();
        let l = log();
        let l1 = Rc::clone(&l);
        let h = s.set_timeout(Duration::from_millis(1), move || l1.borrow_mut().push("x"));
        assert!(s.clear_timeout(h));
        assert!(!s.clear_timeout(h));
        s.advance(Duration::from_millis(5));
        assert!(l.borrow().is_empty());
    }

    #[test]
    fn system_clock_does_not_advance() {
        let clock = SystemClock;
        assert!(!clock.advance(Duration::from_secs(1)));
    }
}
