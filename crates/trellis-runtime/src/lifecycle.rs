#![forbid(unsafe_code)]

//! Lifecycle coordinator.
//!
//! Serializes and batches the bind / attach / detach / unbind phases of a
//! component tree. Work is parked on FIFO queues and drained when the
//! outermost `end_*` call of a phase returns:
//!
//! | Phase | `end_*` drains (in order) |
//! |-------|---------------------------|
//! | bind | connect, flush, bound |
//! | attach | flush, mount, attached |
//! | detach | flush, unmount, detached |
//! | unbind | unbound |
//!
//! The flush queue is also drained by a microtask scheduled on the first
//! flush enqueue of a turn; later enqueues in the same turn piggyback.
//!
//! # Invariants
//!
//! 1. Enqueue is idempotent: an item already waiting on a queue is not
//!    queued again.
//! 2. Within a queue, items run in enqueue order.
//! 3. Items enqueued during a drain run in the same drain, after the
//!    current batch (the drain re-loops until the queue is empty).
//! 4. Nested `begin_*`/`end_*` pairs drain only at depth zero.
//! 5. Flush runs before bound and attached callbacks of the same batch;
//!    mount runs after attaching and before attached.
//!
//! # Async gates
//!
//! A component awaiting a promise registers a [`Task`] for the phase with
//! [`Lifecycle::register_task`]. The outermost `end_*` then returns an
//! aggregate task and defers the drain until every gate has completed.
//!
//! # Failure Modes
//!
//! A failing item does not stop the drain; the first error is returned
//! once the queue is empty. Errors from the microtask-driven flush have no
//! caller and are logged.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashSet;
use trellis_core::LifecycleFlags;

use crate::error::{Error, Result};
use crate::scheduler::Scheduler;
use crate::task::Task;

// ---------------------------------------------------------------------------
// Queue item traits
// ---------------------------------------------------------------------------

/// Receives the deferred flush of accumulated changes.
pub trait Flushable {
    fn flush(&self, flags: LifecycleFlags) -> Result<()>;
}

/// A binding whose dependency connection was deferred to the end of a
/// bind batch.
pub trait DeferredConnect {
    fn connect(&self, flags: LifecycleFlags) -> Result<()>;
}

/// Phase callbacks. Each queue calls only its own method.
pub trait LifecycleHooks {
    fn bound(&self, _flags: LifecycleFlags) {}
    fn attached(&self, _flags: LifecycleFlags) {}
    fn detached(&self, _flags: LifecycleFlags) {}
    fn unbound(&self, _flags: LifecycleFlags) {}
}

/// Moves rendered nodes in and out of the host tree.
pub trait Mountable {
    fn mount(&self, flags: LifecycleFlags);
    /// Returns `false` if the nodes were already detached.
    fn unmount(&self, flags: LifecycleFlags) -> bool;
}

/// The batched phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Bind,
    Attach,
    Detach,
    Unbind,
}

impl Phase {
    fn index(self) -> usize {
        match self {
            Self::Bind => 0,
            Self::Attach => 1,
            Self::Detach => 2,
            Self::Unbind => 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

struct Queue<T: ?Sized> {
    name: &'static str,
    items: RefCell<VecDeque<Rc<T>>>,
    queued: RefCell<FxHashSet<usize>>,
}

fn identity<T: ?Sized>(item: &Rc<T>) -> usize {
    Rc::as_ptr(item).cast::<()>() as usize
}

impl<T: ?Sized> Queue<T> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            items: RefCell::new(VecDeque::new()),
            queued: RefCell::new(FxHashSet::default()),
        }
    }

    fn enqueue(&self, item: Rc<T>) -> bool {
        if !self.queued.borrow_mut().insert(identity(&item)) {
            return false;
        }
        self.items.borrow_mut().push_back(item);
        tracing::trace!(queue = self.name, len = self.len(), "enqueued");
        true
    }

    fn len(&self) -> usize {
        self.items.borrow().len()
    }

    fn take_batch(&self) -> Vec<Rc<T>> {
        self.queued.borrow_mut().clear();
        self.items.borrow_mut().drain(..).collect()
    }

    /// Run `f` over every item, re-looping until nothing is left. Returns
    /// how many items ran.
    fn drain(&self, mut f: impl FnMut(&T)) -> usize {
        let mut ran = 0;
        loop {
            let batch = self.take_batch();
            if batch.is_empty() {
                break;
            }
            ran += batch.len();
            for item in &batch {
                f(item);
            }
        }
        if ran > 0 {
            tracing::debug!(queue = self.name, items = ran, "lifecycle queue drained");
        }
        ran
    }
}

fn keep_first(first: &mut Option<Error>, result: Result<()>) {
    if let Err(e) = result {
        first.get_or_insert(e);
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

pub struct Lifecycle {
    scheduler: Rc<Scheduler>,
    flush: Queue<dyn Flushable>,
    connect: Queue<dyn DeferredConnect>,
    bound: Queue<dyn LifecycleHooks>,
    mount: Queue<dyn Mountable>,
    attached: Queue<dyn LifecycleHooks>,
    unmount: Queue<dyn Mountable>,
    detached: Queue<dyn LifecycleHooks>,
    unbound: Queue<dyn LifecycleHooks>,
    depth: [Cell<u32>; 4],
    gates: [RefCell<Vec<Task>>; 4],
    flush_scheduled: Cell<bool>,
    self_ref: Weak<Lifecycle>,
}

impl Lifecycle {
    #[must_use]
    pub fn new(scheduler: Rc<Scheduler>) -> Rc<Self> {
        Rc::new_cyclic(|self_ref| Self {
            scheduler,
            flush: Queue::new("flush"),
            connect: Queue::new("connect"),
            bound: Queue::new("bound"),
            mount: Queue::new("mount"),
            attached: Queue::new("attached"),
            unmount: Queue::new("unmount"),
            detached: Queue::new("detached"),
            unbound: Queue::new("unbound"),
            depth: Default::default(),
            gates: Default::default(),
            flush_scheduled: Cell::new(false),
            self_ref: self_ref.clone(),
        })
    }

    #[must_use]
    pub fn scheduler(&self) -> &Rc<Scheduler> {
        &self.scheduler
    }

    // -- flush -------------------------------------------------------------

    /// Queue `item` for the next flush. The first enqueue of a turn
    /// schedules the flush microtask.
    pub fn enqueue_flush(&self, item: Rc<dyn Flushable>) -> bool {
        if !self.flush.enqueue(item) {
            return false;
        }
        if !self.flush_scheduled.replace(true) {
            let lifecycle = self.self_ref.clone();
            self.scheduler.queue_microtask(move || {
                if let Some(lifecycle) = lifecycle.upgrade() {
                    lifecycle.flush_scheduled.set(false);
                    if let Err(error) = lifecycle.process_flush_queue(LifecycleFlags::NONE) {
                        tracing::error!(%error, "scheduled flush failed");
                    }
                }
            });
        }
        true
    }

    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.flush.len()
    }

    /// Drain the flush queue now.
    pub fn process_flush_queue(&self, flags: LifecycleFlags) -> Result<()> {
        let flags = flags | LifecycleFlags::FROM_FLUSH;
        let mut first = None;
        self.flush.drain(|item| keep_first(&mut first, item.flush(flags)));
        first.map_or(Ok(()), Err)
    }

    // -- connect -----------------------------------------------------------

    pub fn enqueue_connect(&self, item: Rc<dyn DeferredConnect>) -> bool {
        self.connect.enqueue(item)
    }

    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connect.len()
    }

    pub fn process_connect_queue(&self, flags: LifecycleFlags) -> Result<()> {
        let mut first = None;
        self.connect.drain(|item| keep_first(&mut first, item.connect(flags)));
        first.map_or(Ok(()), Err)
    }

    // -- phase queues ------------------------------------------------------

    pub fn enqueue_bound(&self, item: Rc<dyn LifecycleHooks>) -> bool {
        self.bound.enqueue(item)
    }

    pub fn enqueue_mount(&self, item: Rc<dyn Mountable>) -> bool {
        self.mount.enqueue(item)
    }

    pub fn enqueue_attached(&self, item: Rc<dyn LifecycleHooks>) -> bool {
        self.attached.enqueue(item)
    }

    pub fn enqueue_unmount(&self, item: Rc<dyn Mountable>) -> bool {
        self.unmount.enqueue(item)
    }

    pub fn enqueue_detached(&self, item: Rc<dyn LifecycleHooks>) -> bool {
        self.detached.enqueue(item)
    }

    pub fn enqueue_unbound(&self, item: Rc<dyn LifecycleHooks>) -> bool {
        self.unbound.enqueue(item)
    }

    // -- begin / end -------------------------------------------------------

    #[must_use]
    pub fn depth(&self, phase: Phase) -> u32 {
        self.depth[phase.index()].get()
    }

    /// Register an async gate for the current batch of `phase`.
    pub fn register_task(&self, phase: Phase, task: Task) {
        if !task.done() {
            self.gates[phase.index()].borrow_mut().push(task);
        }
    }

    fn begin(&self, phase: Phase) {
        let depth = &self.depth[phase.index()];
        depth.set(depth.get() + 1);
    }

    fn end(&self, phase: Phase, flags: LifecycleFlags) -> Result<Task> {
        let depth = &self.depth[phase.index()];
        let current = depth.get().saturating_sub(1);
        depth.set(current);
        if current > 0 {
            return Ok(Task::completed());
        }
        let gates = std::mem::take(&mut *self.gates[phase.index()].borrow_mut());
        if gates.is_empty() {
            self.process(phase, flags)?;
            return Ok(Task::completed());
        }
        tracing::debug!(?phase, gates = gates.len(), "phase deferred on async gates");
        let lifecycle = self.self_ref.clone();
        Ok(Task::all(gates).then(move || {
            if let Some(lifecycle) = lifecycle.upgrade() {
                if let Err(error) = lifecycle.process(phase, flags) {
                    tracing::error!(%error, ?phase, "deferred phase failed");
                }
            }
            Task::completed()
        }))
    }

    fn process(&self, phase: Phase, flags: LifecycleFlags) -> Result<()> {
        match phase {
            Phase::Bind => self.process_bind_queue(flags),
            Phase::Attach => self.process_attach_queue(flags),
            Phase::Detach => self.process_detach_queue(flags),
            Phase::Unbind => {
                self.process_unbind_queue(flags);
                Ok(())
            }
        }
    }

    pub fn begin_bind(&self) {
        self.begin(Phase::Bind);
    }

    pub fn end_bind(&self, flags: LifecycleFlags) -> Result<Task> {
        self.end(Phase::Bind, flags)
    }

    pub fn begin_attach(&self) {
        self.begin(Phase::Attach);
    }

    pub fn end_attach(&self, flags: LifecycleFlags) -> Result<Task> {
        self.end(Phase::Attach, flags)
    }

    pub fn begin_detach(&self) {
        self.begin(Phase::Detach);
    }

    pub fn end_detach(&self, flags: LifecycleFlags) -> Result<Task> {
        self.end(Phase::Detach, flags)
    }

    pub fn begin_unbind(&self) {
        self.begin(Phase::Unbind);
    }

    pub fn end_unbind(&self, flags: LifecycleFlags) -> Result<Task> {
        self.end(Phase::Unbind, flags)
    }

    /// connect, then flush, then bound.
    pub fn process_bind_queue(&self, flags: LifecycleFlags) -> Result<()> {
        let connected = self.process_connect_queue(flags);
        let flushed = self.process_flush_queue(flags);
        self.bound.drain(|item| item.bound(flags));
        connected.and(flushed)
    }

    /// flush, then mount, then attached.
    pub fn process_attach_queue(&self, flags: LifecycleFlags) -> Result<()> {
        let flushed = self.process_flush_queue(flags);
        self.mount.drain(|item| item.mount(flags));
        self.attached.drain(|item| item.attached(flags));
        flushed
    }

    /// flush, then unmount, then detached.
    pub fn process_detach_queue(&self, flags: LifecycleFlags) -> Result<()> {
        let flushed = self.process_flush_queue(flags);
        self.unmount.drain(|item| {
            item.unmount(flags);
        });
        self.detached.drain(|item| item.detached(flags));
        flushed
    }

    pub fn process_unbind_queue(&self, flags: LifecycleFlags) {
        self.unbound.drain(|item| item.unbound(flags));
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("flush", &self.flush.len())
            .field("connect", &self.connect.len())
            .field("bound", &self.bound.len())
            .field("mount", &self.mount.len())
            .field("attached", &self.attached.len())
            .field("unmount", &self.unmount.len())
            .field("detached", &self.detached.len())
            .field("unbound", &self.unbound.len())
            .field("bind_depth", &self.depth(Phase::Bind))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::Promise;

    type Log = Rc<RefCell<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        log: Log,
    }

    impl Recorder {
        fn new(name: &'static str, log: &Log) -> Rc<Self> {
            Rc::new(Self {
                name,
                log: Rc::clone(log),
            })
        }

        fn push(&self, what: &str) {
            self.log.borrow_mut().push(format!("{}:{what}", self.name));
        }
    }

    impl Flushable for Recorder {
        fn flush(&self, flags: LifecycleFlags) -> Result<()> {
            assert!(flags.contains(LifecycleFlags::FROM_FLUSH));
            self.push("flush");
            Ok(())
        }
    }

    impl LifecycleHooks for Recorder {
        fn bound(&self, _flags: LifecycleFlags) {
            self.push("bound");
        }
        fn attached(&self, _flags: LifecycleFlags) {
            self.push("attached");
        }
        fn detached(&self, _flags: LifecycleFlags) {
            self.push("detached");
        }
        fn unbound(&self, _flags: LifecycleFlags) {
            self.push("unbound");
        }
    }

    impl Mountable for Recorder {
        fn mount(&self, _flags: LifecycleFlags) {
            self.push("mount");
        }
        fn unmount(&self, _flags: LifecycleFlags) -> bool {
            self.push("unmount");
            true
        }
    }

    fn setup() -> (Rc<Scheduler>, Rc<Lifecycle>, Log) {
        let scheduler = Rc::new(Scheduler::manual());
        let lifecycle = Lifecycle::new(Rc::clone(&scheduler));
        (scheduler, lifecycle, Rc::new(RefCell::new(Vec::new())))
    }

    #[test]
    fn enqueue_is_idempotent() {
        let (_, lc, log) = setup();
        let p = Recorder::new("a", &log);
        assert!(lc.enqueue_flush(p.clone()));
        assert!(!lc.enqueue_flush(p.clone()));
        assert_eq!(lc.flush_count(), 1);
        lc.process_flush_queue(LifecycleFlags::NONE).expect("flush");
        assert_eq!(*log.borrow(), vec!["a:flush"]);
        assert!(lc.enqueue_flush(p), "requeue after drain");
    }

    #[test]
    fn first_flush_enqueue_schedules_one_microtask() {
        let (scheduler, lc, log) = setup();
        lc.enqueue_flush(Recorder::new("a", &log));
        lc.enqueue_flush(Recorder::new("b", &log));
        assert_eq!(scheduler.pending_microtasks(), 1);
        scheduler.drain_microtasks();
        assert_eq!(*log.borrow(), vec!["a:flush", "b:flush"]);
        lc.enqueue_flush(Recorder::new("c", &log));
        assert_eq!(scheduler.pending_microtasks(), 1);
    }

    struct Refeeder {
        lifecycle: Weak<Lifecycle>,
        remaining: Cell<u32>,
        self_ref: Weak<Refeeder>,
    }

    impl Flushable for Refeeder {
        fn flush(&self, _flags: LifecycleFlags) -> Result<()> {
            let left = self.remaining.get();
            if left > 0 {
                self.remaining.set(left - 1);
                if let (Some(lc), Some(me)) = (self.lifecycle.upgrade(), self.self_ref.upgrade()) {
                    lc.enqueue_flush(me);
                }
            }
            Ok(())
        }
    }

    #[test]
    fn drain_reloops_for_self_feeding_items() {
        let (_, lc, _) = setup();
        let feeder = Rc::new_cyclic(|w| Refeeder {
            lifecycle: Rc::downgrade(&lc),
            remaining: Cell::new(3),
            self_ref: w.clone(),
        });
        lc.enqueue_flush(feeder.clone());
        lc.process_flush_queue(LifecycleFlags::NONE).expect("flush");
        assert_eq!(feeder.remaining.get(), 0);
        assert_eq!(lc.flush_count(), 0);
    }

    #[test]
    fn nested_bind_drains_once_at_outermost_end() {
        let (_, lc, log) = setup();
        lc.begin_bind();
        lc.begin_bind();
        lc.enqueue_bound(Recorder::new("inner", &log));
        lc.end_bind(LifecycleFlags::NONE).expect("end");
        assert!(log.borrow().is_empty());
        lc.enqueue_bound(Recorder::new("outer", &log));
        let task = lc.end_bind(LifecycleFlags::NONE).expect("end");
        assert!(task.done());
        assert_eq!(*log.borrow(), vec!["inner:bound", "outer:bound"]);
        assert_eq!(lc.depth(Phase::Bind), 0);
    }

    #[test]
    fn flush_precedes_bound_and_mount_precedes_attached() {
        let (_, lc, log) = setup();
        let p = Recorder::new("p", &log);
        lc.begin_bind();
        lc.enqueue_bound(p.clone());
        lc.enqueue_flush(p.clone());
        lc.end_bind(LifecycleFlags::NONE).expect("bind");
        lc.begin_attach();
        lc.enqueue_attached(p.clone());
        lc.enqueue_mount(p.clone());
        lc.enqueue_flush(p.clone());
        lc.end_attach(LifecycleFlags::NONE).expect("attach");
        assert_eq!(
            *log.borrow(),
            vec!["p:flush", "p:bound", "p:flush", "p:mount", "p:attached"]
        );
    }

    #[test]
    fn detach_and_unbind_order() {
        let (_, lc, log) = setup();
        let p = Recorder::new("p", &log);
        lc.begin_detach();
        lc.enqueue_detached(p.clone());
        lc.enqueue_unmount(p.clone());
        lc.end_detach(LifecycleFlags::NONE).expect("detach");
        lc.begin_unbind();
        lc.enqueue_unbound(p);
        lc.end_unbind(LifecycleFlags::NONE).expect("unbind");
        assert_eq!(*log.borrow(), vec!["p:unmount", "p:detached", "p:unbound"]);
    }

    #[test]
    fn async_gate_defers_bound() {
        let (_, lc, log) = setup();
        let gate = Promise::pending();
        lc.begin_bind();
        lc.register_task(Phase::Bind, Task::from_promise(&gate));
        lc.enqueue_bound(Recorder::new("p", &log));
        let task = lc.end_bind(LifecycleFlags::NONE).expect("end");
        assert!(!task.done());
        assert!(log.borrow().is_empty());
        gate.resolve(true);
        assert!(task.done());
        assert_eq!(*log.borrow(), vec!["p:bound"]);
    }

    #[test]
    #[tracing_test::traced_test]
    fn deferred_phase_is_logged() {
        let (_, lc, _) = setup();
        let gate = Promise::pending();
        lc.begin_attach();
        lc.register_task(Phase::Attach, Task::from_promise(&gate));
        let task = lc.end_attach(LifecycleFlags::NONE).expect("end");
        assert!(logs_contain("phase deferred on async gates"));
        gate.resolve(true);
        assert!(task.done());
    }

    struct Failing;

    impl Flushable for Failing {
        fn flush(&self, _flags: LifecycleFlags) -> Result<()> {
            Err(crate::error::LifecycleError::UnboundLocation.into())
        }
    }

    #[test]
    fn failing_item_does_not_stop_drain() {
        let (_, lc, log) = setup();
        lc.enqueue_flush(Rc::new(Failing));
        lc.enqueue_flush(Recorder::new("after", &log));
        let err = lc.process_flush_queue(LifecycleFlags::NONE).unwrap_err();
        assert_eq!(err.code(), "TRL-301");
        assert_eq!(*log.borrow(), vec!["after:flush"]);
    }
}
