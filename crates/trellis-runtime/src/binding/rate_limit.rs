#![forbid(unsafe_code)]

//! Debounce and throttle for one binding operation.
//!
//! A [`RateLimiter`] governs exactly one [`LimitedOp`]; other operations
//! pass straight through. Timers run on the shared [`Scheduler`], so a
//! [`ManualClock`](crate::scheduler::ManualClock) makes them deterministic.
//!
//! | Kind | Behavior |
//! |------|----------|
//! | debounce | run the latest action once `delay` passes with no new call |
//! | throttle | run at most once per `delay`; the latest skipped call runs at the window's end |

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use web_time::{Duration, Instant};

use crate::scheduler::{Scheduler, TimerHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitKind {
    Debounce,
    Throttle,
}

/// The binding operation a limiter wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitedOp {
    UpdateTarget,
    UpdateSource,
    CallSource,
}

type Action = Box<dyn FnOnce()>;

pub struct RateLimiter {
    kind: RateLimitKind,
    op: LimitedOp,
    delay: Duration,
    scheduler: Rc<Scheduler>,
    timer: Cell<Option<TimerHandle>>,
    pending: RefCell<Option<Action>>,
    last_run: Cell<Option<Instant>>,
    self_ref: Weak<Self>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(kind: RateLimitKind, op: LimitedOp, delay: Duration, scheduler: Rc<Scheduler>) -> Rc<Self> {
        Rc::new_cyclic(|self_ref| Self {
            kind,
            op,
            delay,
            scheduler,
            timer: Cell::new(None),
            pending: RefCell::new(None),
            last_run: Cell::new(None),
            self_ref: self_ref.clone(),
        })
    }

    #[must_use]
    pub fn kind(&self) -> RateLimitKind {
        self.kind
    }

    #[must_use]
    pub fn op(&self) -> LimitedOp {
        self.op
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.borrow().is_some()
    }

    pub fn run(&self, op: LimitedOp, action: Action) {
        if op != self.op {
            action();
            return;
        }
        match self.kind {
            RateLimitKind::Debounce => {
                self.clear_timer();
                *self.pending.borrow_mut() = Some(action);
                self.arm(self.delay);
            }
            RateLimitKind::Throttle => {
                let now = self.scheduler.now();
                let elapsed = self.last_run.get().map(|t| now.saturating_duration_since(t));
                let window_open = elapsed.is_none_or(|e| e >= self.delay);
                if window_open && self.timer.get().is_none() {
                    self.last_run.set(Some(now));
                    action();
                } else {
                    *self.pending.borrow_mut() = Some(action);
                    if self.timer.get().is_none() {
                        self.arm(self.delay.saturating_sub(elapsed.unwrap_or_default()));
                    }
                }
            }
        }
    }

    /// Drop any pending action and its timer.
    pub fn cancel(&self) {
        self.clear_timer();
        self.pending.borrow_mut().take();
    }

    fn arm(&self, delay: Duration) {
        let me = self.self_ref.clone();
        let handle = self.scheduler.set_timeout(delay, move || {
            if let Some(me) = me.upgrade() {
                me.fire();
            }
        });
        self.timer.set(Some(handle));
    }

    fn clear_timer(&self) {
        if let Some(handle) = self.timer.take() {
            self.scheduler.clear_timeout(handle);
        }
    }

    fn fire(&self) {
        self.timer.set(None);
        self.last_run.set(Some(self.scheduler.now()));
        let action = self.pending.borrow_mut().take();
        if let Some(action) = action {
            action();
        }
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("kind", &self.kind)
            .field("op", &self.op)
            .field("delay", &self.delay)
            .field("pending", &self.has_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Rc<RefCell<Vec<u32>>>, impl Fn(u32) -> Action) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        (log, move |n| {
            let l = Rc::clone(&l);
            Box::new(move || l.borrow_mut().push(n)) as Action
        })
    }

    #[test]
    fn debounce_runs_latest_after_quiet_period() {
        let scheduler = Rc::new(Scheduler::manual());
        let limiter = RateLimiter::new(
            RateLimitKind::Debounce,
            LimitedOp::UpdateSource,
            Duration::from_millis(100),
            Rc::clone(&scheduler),
        );
        let (log, action) = recorder();
        limiter.run(LimitedOp::UpdateSource, action(1));
        scheduler.advance(Duration::from_millis(50));
        limiter.run(LimitedOp::UpdateSource, action(2));
        scheduler.advance(Duration::from_millis(50));
        assert!(log.borrow().is_empty());
        scheduler.advance(Duration::from_millis(50));
        assert_eq!(*log.borrow(), vec![2]);
    }

    #[test]
    fn other_ops_pass_through() {
        let scheduler = Rc::new(Scheduler::manual());
        let limiter = RateLimiter::new(
            RateLimitKind::Debounce,
            LimitedOp::UpdateSource,
            Duration::from_millis(100),
            scheduler,
        );
        let (log, action) = recorder();
        limiter.run(LimitedOp::UpdateTarget, action(7));
        assert_eq!(*log.borrow(), vec![7]);
    }

    #[test]
    fn throttle_runs_first_then_trailing() {
        let scheduler = Rc::new(Scheduler::manual());
        let limiter = RateLimiter::new(
            RateLimitKind::Throttle,
            LimitedOp::UpdateTarget,
            Duration::from_millis(100),
            Rc::clone(&scheduler),
        );
        let (log, action) = recorder();
        limiter.run(LimitedOp::UpdateTarget, action(1));
        limiter.run(LimitedOp::UpdateTarget, action(2));
        limiter.run(LimitedOp::UpdateTarget, action(3));
        assert_eq!(*log.borrow(), vec![1]);
        scheduler.advance(Duration::from_millis(100));
        assert_eq!(*log.borrow(), vec![1, 3]);
    }

    #[test]
    fn cancel_drops_pending() {
        let scheduler = Rc::new(Scheduler::manual());
        let limiter = RateLimiter::new(
            RateLimitKind::Debounce,
            LimitedOp::CallSource,
            Duration::from_millis(10),
            Rc::clone(&scheduler),
        );
        let (log, action) = recorder();
        limiter.run(LimitedOp::CallSource, action(1));
        limiter.cancel();
        scheduler.advance(Duration::from_millis(20));
        assert!(log.borrow().is_empty());
        assert_eq!(scheduler.pending_timers(), 0);
    }
}
