#![forbid(unsafe_code)]

//! Per-binding bookkeeping: observed dependencies and applied behaviors.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use trellis_core::{BindingMode, CollectionSubscriber, PropertySubscriber};

use super::rate_limit::{LimitedOp, RateLimiter};
use crate::error::EvalError;
use crate::observation::{CollectionObserver, PropertyObserver};

// ---------------------------------------------------------------------------
// ObserverSlots
// ---------------------------------------------------------------------------

enum Slot {
    Property {
        observer: Rc<dyn PropertyObserver>,
        version: u32,
    },
    Collection {
        observer: Rc<CollectionObserver>,
        version: u32,
    },
}

impl Slot {
    fn version(&self) -> u32 {
        match self {
            Self::Property { version, .. } | Self::Collection { version, .. } => *version,
        }
    }
}

/// The dependencies a binding is subscribed to, each stamped with the
/// connect cycle that last touched it.
///
/// Four slots are stored inline; most bindings observe fewer.
pub struct ObserverSlots {
    property_subscriber: Weak<dyn PropertySubscriber>,
    collection_subscriber: Weak<dyn CollectionSubscriber>,
    slots: RefCell<SmallVec<[Slot; 4]>>,
    version: Cell<u32>,
}

impl ObserverSlots {
    #[must_use]
    pub fn new(
        property_subscriber: Weak<dyn PropertySubscriber>,
        collection_subscriber: Weak<dyn CollectionSubscriber>,
    ) -> Self {
        Self {
            property_subscriber,
            collection_subscriber,
            slots: RefCell::new(SmallVec::new()),
            version: Cell::new(0),
        }
    }

    /// Start a connect cycle. Dependencies observed from now on carry the
    /// new version.
    pub fn begin_cycle(&self) -> u32 {
        let v = self.version.get().wrapping_add(1);
        self.version.set(v);
        v
    }

    #[must_use]
    pub fn version(&self) -> u32 {
        self.version.get()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn observe_property(&self, observer: Rc<dyn PropertyObserver>) {
        let current = self.version.get();
        {
            let mut slots = self.slots.borrow_mut();
            for slot in slots.iter_mut() {
                if let Slot::Property { observer: o, version } = slot {
                    if std::ptr::addr_eq(Rc::as_ptr(o), Rc::as_ptr(&observer)) {
                        *version = current;
                        return;
                    }
                }
            }
            slots.push(Slot::Property {
                observer: Rc::clone(&observer),
                version: current,
            });
        }
        observer.subscribe(self.property_subscriber.clone());
    }

    pub fn observe_collection(&self, observer: Rc<CollectionObserver>) {
        let current = self.version.get();
        {
            let mut slots = self.slots.borrow_mut();
            for slot in slots.iter_mut() {
                if let Slot::Collection { observer: o, version } = slot {
                    if Rc::ptr_eq(o, &observer) {
                        *version = current;
                        return;
                    }
                }
            }
            slots.push(Slot::Collection {
                observer: Rc::clone(&observer),
                version: current,
            });
        }
        observer.subscribe(self.collection_subscriber.clone());
    }

    /// Unsubscribe from every dependency the current cycle did not touch.
    pub fn unobserve_stale(&self) -> usize {
        let current = self.version.get();
        let stale: SmallVec<[Slot; 4]> = {
            let mut slots = self.slots.borrow_mut();
            let (keep, stale): (SmallVec<[Slot; 4]>, SmallVec<[Slot; 4]>) =
                slots.drain(..).partition(|s| s.version() == current);
            *slots = keep;
            stale
        };
        let count = stale.len();
        for slot in stale {
            self.release(slot);
        }
        count
    }

    /// Unsubscribe from everything.
    pub fn clear(&self) {
        let all = std::mem::take(&mut *self.slots.borrow_mut());
        for slot in all {
            self.release(slot);
        }
    }

    fn release(&self, slot: Slot) {
        match slot {
            Slot::Property { observer, .. } => {
                observer.unsubscribe(&self.property_subscriber);
            }
            Slot::Collection { observer, .. } => {
                observer.unsubscribe(&self.collection_subscriber);
            }
        }
    }
}

impl fmt::Debug for ObserverSlots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverSlots")
            .field("len", &self.len())
            .field("version", &self.version.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// BehaviorSlots
// ---------------------------------------------------------------------------

/// What binding behaviors have changed on a binding. Every field is reset
/// by the behavior's own `unbind`.
#[derive(Default)]
pub struct BehaviorSlots {
    applied: RefCell<SmallVec<[Rc<str>; 2]>>,
    mode: Cell<Option<BindingMode>>,
    limiter: RefCell<Option<Rc<RateLimiter>>>,
    update_events: RefCell<Option<Vec<Rc<str>>>>,
    self_only: Cell<bool>,
    signals: RefCell<SmallVec<[Rc<str>; 1]>>,
}

impl BehaviorSlots {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `name` as applied.
    pub fn apply(&self, name: &Rc<str>) -> Result<(), EvalError> {
        let mut applied = self.applied.borrow_mut();
        if applied.iter().any(|n| n == name) {
            return Err(EvalError::BehaviorAlreadyApplied { name: Rc::clone(name) });
        }
        applied.push(Rc::clone(name));
        Ok(())
    }

    pub fn release(&self, name: &str) {
        self.applied.borrow_mut().retain(|n| &**n != name);
    }

    #[must_use]
    pub fn is_applied(&self, name: &str) -> bool {
        self.applied.borrow().iter().any(|n| &**n == name)
    }

    // -- mode --------------------------------------------------------------

    #[must_use]
    pub fn mode(&self) -> Option<BindingMode> {
        self.mode.get()
    }

    pub fn set_mode(&self, mode: Option<BindingMode>) {
        self.mode.set(mode);
    }

    // -- rate limiting -----------------------------------------------------

    pub fn set_limiter(&self, limiter: Option<Rc<RateLimiter>>) {
        let previous = std::mem::replace(&mut *self.limiter.borrow_mut(), limiter);
        if let Some(previous) = previous {
            previous.cancel();
        }
    }

    #[must_use]
    pub fn limiter(&self) -> Option<Rc<RateLimiter>> {
        self.limiter.borrow().clone()
    }

    /// Run `action` now, or through the installed limiter if it governs
    /// `op`.
    pub fn rate_limit(&self, op: LimitedOp, action: impl FnOnce() + 'static) {
        match self.limiter() {
            Some(limiter) => limiter.run(op, Box::new(action)),
            None => action(),
        }
    }

    // -- events ------------------------------------------------------------

    pub fn set_update_events(&self, events: Option<Vec<Rc<str>>>) {
        *self.update_events.borrow_mut() = events;
    }

    #[must_use]
    pub fn update_events(&self) -> Option<Vec<Rc<str>>> {
        self.update_events.borrow().clone()
    }

    pub fn set_self_only(&self, self_only: bool) {
        self.self_only.set(self_only);
    }

    #[must_use]
    pub fn self_only(&self) -> bool {
        self.self_only.get()
    }

    // -- signals -----------------------------------------------------------

    pub fn add_signal(&self, name: Rc<str>) {
        self.signals.borrow_mut().push(name);
    }

    pub fn take_signals(&self) -> SmallVec<[Rc<str>; 1]> {
        std::mem::take(&mut *self.signals.borrow_mut())
    }
}

impl fmt::Debug for BehaviorSlots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorSlots")
            .field("applied", &self.applied.borrow())
            .field("mode", &self.mode.get())
            .field("rate_limited", &self.limiter.borrow().is_some())
            .field("self_only", &self.self_only.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::ObserverKind;
    use trellis_core::{LifecycleFlags, Value};

    struct Sink;

    impl PropertySubscriber for Sink {
        fn handle_change(&self, _: &Value, _: &Value, _: LifecycleFlags) {}
    }

    impl CollectionSubscriber for Sink {
        fn handle_collection_change(&self, _: &trellis_core::IndexMap, _: LifecycleFlags) {}
    }

    #[derive(Default)]
    struct Spy {
        subscribed: Cell<i32>,
    }

    impl PropertyObserver for Spy {
        fn kind(&self) -> ObserverKind {
            ObserverKind::Primitive
        }

        fn get_value(&self) -> Value {
            Value::Undefined
        }

        fn set_value(&self, _: Value, _: LifecycleFlags) {}

        fn subscribe(&self, _: Weak<dyn PropertySubscriber>) -> bool {
            self.subscribed.set(self.subscribed.get() + 1);
            true
        }

        fn unsubscribe(&self, _: &Weak<dyn PropertySubscriber>) -> bool {
            self.subscribed.set(self.subscribed.get() - 1);
            true
        }
    }

    fn slots(sink: &Rc<Sink>) -> ObserverSlots {
        let p: Weak<dyn PropertySubscriber> = Rc::downgrade(sink) as Weak<dyn PropertySubscriber>;
        let c: Weak<dyn CollectionSubscriber> = Rc::downgrade(sink) as Weak<dyn CollectionSubscriber>;
        ObserverSlots::new(p, c)
    }

    #[test]
    fn same_observer_occupies_one_slot() {
        let sink = Rc::new(Sink);
        let s = slots(&sink);
        let spy = Rc::new(Spy::default());
        s.begin_cycle();
        s.observe_property(spy.clone());
        s.observe_property(spy.clone());
        assert_eq!(s.len(), 1);
        assert_eq!(spy.subscribed.get(), 1);
    }

    #[test]
    fn stale_slots_are_dropped_after_cycle() {
        let sink = Rc::new(Sink);
        let s = slots(&sink);
        let a = Rc::new(Spy::default());
        let b = Rc::new(Spy::default());
        s.begin_cycle();
        s.observe_property(a.clone());
        s.observe_property(b.clone());
        s.begin_cycle();
        s.observe_property(a.clone());
        assert_eq!(s.unobserve_stale(), 1);
        assert_eq!((a.subscribed.get(), b.subscribed.get()), (1, 0));
        s.clear();
        assert!(s.is_empty());
        assert_eq!(a.subscribed.get(), 0);
    }

    #[test]
    fn behavior_names_apply_once() {
        let b = BehaviorSlots::new();
        let name: Rc<str> = Rc::from("debounce");
        b.apply(&name).expect("first");
        assert_eq!(b.apply(&name).map_err(|e| e.code()), Err("TRL-205"));
        b.release(&name);
        assert!(!b.is_applied("debounce"));
        b.apply(&name).expect("again");
    }
}
