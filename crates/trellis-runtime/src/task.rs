#![forbid(unsafe_code)]

//! Completion handles for lifecycle phases and composition swaps.
//!
//! A [`Task`] is pending, done or cancelled. Continuations registered with
//! [`Task::on_complete`] run synchronously when the task completes, or
//! immediately if it already has. A cancelled task never runs them.
//!
//! # Invariants
//!
//! 1. A task leaves `Pending` at most once.
//! 2. An aggregate from [`Task::all`] can be cancelled only while none of
//!    its sub-tasks has completed.
//! 3. Completing a task releases its continuations and canceller.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use trellis_core::Promise;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Done,
    Cancelled,
}

type Continuation = Box<dyn FnOnce()>;
type Canceller = Box<dyn Fn() -> bool>;

struct TaskInner {
    status: Cell<TaskStatus>,
    continuations: RefCell<Vec<Continuation>>,
    canceller: RefCell<Option<Canceller>>,
}

#[derive(Clone)]
pub struct Task(Rc<TaskInner>);

impl Task {
    fn with_status(status: TaskStatus) -> Self {
        Self(Rc::new(TaskInner {
            status: Cell::new(status),
            continuations: RefCell::new(Vec::new()),
            canceller: RefCell::new(None),
        }))
    }

    /// The done sentinel.
    #[must_use]
    pub fn completed() -> Self {
        Self::with_status(TaskStatus::Done)
    }

    /// A pending task completed by [`Task::complete`].
    #[must_use]
    pub fn pending() -> Self {
        Self::with_status(TaskStatus::Pending)
    }

    /// Completes when `promise` settles, fulfilled or rejected. Cancelling
    /// it detaches from the promise.
    #[must_use]
    pub fn from_promise(promise: &Promise) -> Self {
        let task = Self::pending().with_canceller(|| true);
        let settled = task.clone();
        promise.then(move |_| settled.complete());
        task
    }

    /// Completes when every task in `tasks` has.
    #[must_use]
    pub fn all(tasks: Vec<Task>) -> Self {
        let outstanding: Vec<Task> = tasks.into_iter().filter(|t| !t.done()).collect();
        if outstanding.is_empty() {
            return Self::completed();
        }
        let aggregate = Self::pending();
        let remaining = Rc::new(Cell::new(outstanding.len()));
        let any_completed = Rc::new(Cell::new(false));
        for task in &outstanding {
            let agg = aggregate.clone();
            let remaining = Rc::clone(&remaining);
            let any_completed = Rc::clone(&any_completed);
            task.on_complete(move || {
                any_completed.set(true);
                remaining.set(remaining.get() - 1);
                if remaining.get() == 0 {
                    agg.complete();
                }
            });
        }
        let subs = outstanding;
        aggregate.set_canceller(Box::new(move || {
            if any_completed.get() || !subs.iter().all(Task::can_cancel) {
                return false;
            }
            for task in &subs {
                task.cancel();
            }
            true
        }));
        aggregate
    }

    /// Install the cancellation hook. It returns whether cancellation
    /// succeeded; it may run only while the task is pending.
    #[must_use]
    pub fn with_canceller(self, canceller: impl Fn() -> bool + 'static) -> Self {
        self.set_canceller(Box::new(canceller));
        self
    }

    fn set_canceller(&self, canceller: Canceller) {
        *self.0.canceller.borrow_mut() = Some(canceller);
    }

    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.0.status.get()
    }

    #[must_use]
    pub fn done(&self) -> bool {
        self.status() == TaskStatus::Done
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.status() == TaskStatus::Cancelled
    }

    #[must_use]
    pub fn can_cancel(&self) -> bool {
        self.status() == TaskStatus::Pending && self.0.canceller.borrow().is_some()
    }

    /// Attempt cancellation. Returns `true` if the task is now cancelled.
    pub fn cancel(&self) -> bool {
        if self.status() != TaskStatus::Pending {
            return self.is_cancelled();
        }
        let canceller = self.0.canceller.borrow_mut().take();
        let Some(canceller) = canceller else {
            return false;
        };
        if canceller() {
            self.0.status.set(TaskStatus::Cancelled);
            self.0.continuations.borrow_mut().clear();
            true
        } else {
            *self.0.canceller.borrow_mut() = Some(canceller);
            false
        }
    }

    /// Mark the task done and run its continuations. No-op unless pending.
    pub fn complete(&self) {
        if self.status() != TaskStatus::Pending {
            return;
        }
        self.0.status.set(TaskStatus::Done);
        self.0.canceller.borrow_mut().take();
        loop {
            let batch = std::mem::take(&mut *self.0.continuations.borrow_mut());
            if batch.is_empty() {
                break;
            }
            for continuation in batch {
                continuation();
            }
        }
    }

    /// Run `f` once the task completes (immediately if it already has).
    pub fn on_complete(&self, f: impl FnOnce() + 'static) {
        match self.status() {
            TaskStatus::Done => f(),
            TaskStatus::Pending => self.0.continuations.borrow_mut().push(Box::new(f)),
            TaskStatus::Cancelled => {}
        }
    }

    /// A task completing after `self` and then the task `next` returns.
    #[must_use]
    pub fn then(&self, next: impl FnOnce() -> Task + 'static) -> Task {
        if self.done() {
            return next();
        }
        let chained = Self::pending();
        let outer = chained.clone();
        self.on_complete(move || {
            let inner = next();
            inner.on_complete(move || outer.complete());
        });
        let upstream = self.clone();
        chained.with_canceller(move || upstream.cancel())
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("status", &self.status())
            .field("continuations", &self.0.continuations.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_runs_continuation_immediately() {
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let task = Task::completed();
        task.on_complete(move || h.set(h.get() + 1));
        assert_eq!(hits.get(), 1);
        assert!(task.done());
        assert!(!task.can_cancel());
    }

    #[test]
    fn from_promise_completes_on_settle() {
        let p = Promise::pending();
        let task = Task::from_promise(&p);
        assert!(!task.done());
        p.reject("nope");
        assert!(task.done());
    }

    #[test]
    fn all_waits_for_every_task() {
        let a = Task::pending();
        let b = Task::pending();
        let agg = Task::all(vec![a.clone(), b.clone(), Task::completed()]);
        a.complete();
        assert!(!agg.done());
        b.complete();
        assert!(agg.done());
    }

    #[test]
    fn all_cancellable_only_before_any_completion() {
        let p1 = Promise::pending();
        let p2 = Promise::pending();
        let agg = Task::all(vec![Task::from_promise(&p1), Task::from_promise(&p2)]);
        assert!(agg.can_cancel());
        p1.resolve(1);
        assert!(!agg.cancel());
        assert_eq!(agg.status(), TaskStatus::Pending);

        let p3 = Promise::pending();
        let agg = Task::all(vec![Task::from_promise(&p3)]);
        assert!(agg.cancel());
        assert!(agg.is_cancelled());
        p3.resolve(1);
        assert!(agg.is_cancelled());
    }

    #[test]
    fn cancelled_task_drops_continuations() {
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let task = Task::pending().with_canceller(|| true);
        task.on_complete(move || h.set(1));
        assert!(task.cancel());
        task.complete();
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn then_chains() {
        let first = Task::pending();
        let second = Task::pending();
        let s = second.clone();
        let chained = first.then(move || s);
        first.complete();
        assert!(!chained.done());
        second.complete();
        assert!(chained.done());
    }

    #[test]
    fn uncancellable_task_stays_pending() {
        let task = Task::pending();
        assert!(!task.cancel());
        assert_eq!(task.status(), TaskStatus::Pending);
    }
}
