#![forbid(unsafe_code)]

//! Polling fallback for properties that cannot be intercepted.
//!
//! A [`DirtyCheckProperty`] remembers the last value it reported. The
//! [`DirtyChecker`] sweeps every tracked property on a fixed delay and
//! notifies the ones whose value moved. Sweeps are scheduled only while at
//! least one property has subscribers.
//!
//! # Failure Modes
//!
//! A property whose object has been dropped reads as `undefined` and is
//! pruned on the next sweep; sweeps never fail.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use trellis_core::{LifecycleFlags, ObjectRef, PropertySubscriber, Publisher, Value, WeakObjectRef};

use super::{ObserverKind, PropertyObserver};
use crate::config::DirtyCheckSettings;
use crate::error::EvalError;
use crate::scheduler::{Scheduler, TimerHandle};

// ---------------------------------------------------------------------------
// DirtyChecker
// ---------------------------------------------------------------------------

pub struct DirtyChecker {
    scheduler: Rc<Scheduler>,
    settings: DirtyCheckSettings,
    tracked: RefCell<Vec<Weak<DirtyCheckProperty>>>,
    timer: Cell<Option<TimerHandle>>,
    self_ref: Weak<Self>,
}

impl DirtyChecker {
    #[must_use]
    pub fn new(scheduler: Rc<Scheduler>, settings: DirtyCheckSettings) -> Rc<Self> {
        Rc::new_cyclic(|self_ref| Self {
            scheduler,
            settings,
            tracked: RefCell::new(Vec::new()),
            timer: Cell::new(None),
            self_ref: self_ref.clone(),
        })
    }

    #[must_use]
    pub fn settings(&self) -> &DirtyCheckSettings {
        &self.settings
    }

    pub fn create_property(&self, object: &ObjectRef, key: &str) -> Result<Rc<DirtyCheckProperty>, EvalError> {
        if self.settings.throw_on_use {
            tracing::warn!(property = key, "dirty checking requested but disallowed");
            return Err(EvalError::DirtyCheckDisallowed { property: Rc::from(key) });
        }
        tracing::warn!(property = key, "property cannot be intercepted; falling back to dirty checking");
        Ok(Rc::new_cyclic(|self_ref| DirtyCheckProperty {
            object: object.downgrade(),
            key: Rc::from(key),
            old_value: RefCell::new(object.get_untracked(key)),
            subscribers: Publisher::new(),
            checker: self.self_ref.clone(),
            self_ref: self_ref.clone(),
        }))
    }

    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.tracked.borrow().len()
    }

    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.timer.get().is_some()
    }

    fn add(&self, property: Weak<DirtyCheckProperty>) {
        self.tracked.borrow_mut().push(property);
        self.schedule();
    }

    fn remove(&self, property: &Weak<DirtyCheckProperty>) {
        let empty = {
            let mut tracked = self.tracked.borrow_mut();
            tracked.retain(|p| !p.ptr_eq(property));
            tracked.is_empty()
        };
        if empty {
            if let Some(handle) = self.timer.take() {
                self.scheduler.clear_timeout(handle);
            }
        }
    }

    fn schedule(&self) {
        if self.settings.disabled || self.timer.get().is_some() || self.tracked.borrow().is_empty() {
            return;
        }
        let me = self.self_ref.clone();
        let handle = self.scheduler.set_timeout(self.settings.interval, move || {
            if let Some(me) = me.upgrade() {
                me.timer.set(None);
                me.check_now();
                me.schedule();
            }
        });
        self.timer.set(Some(handle));
    }

    /// Sweep every tracked property now. Returns how many had changed.
    pub fn check_now(&self) -> usize {
        let snapshot: Vec<Rc<DirtyCheckProperty>> = {
            let mut tracked = self.tracked.borrow_mut();
            tracked.retain(|p| p.upgrade().is_some_and(|p| p.is_alive()));
            tracked.iter().filter_map(Weak::upgrade).collect()
        };
        let changed = snapshot.iter().filter(|p| p.check()).count();
        tracing::debug!(tracked = snapshot.len(), changed, "dirty-check sweep");
        changed
    }
}

impl fmt::Debug for DirtyChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirtyChecker")
            .field("settings", &self.settings)
            .field("tracked", &self.tracked.borrow().len())
            .field("scheduled", &self.timer.get().is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// DirtyCheckProperty
// ---------------------------------------------------------------------------

pub struct DirtyCheckProperty {
    object: WeakObjectRef,
    key: Rc<str>,
    old_value: RefCell<Value>,
    subscribers: Publisher<dyn PropertySubscriber>,
    checker: Weak<DirtyChecker>,
    self_ref: Weak<DirtyCheckProperty>,
}

impl DirtyCheckProperty {
    fn is_alive(&self) -> bool {
        self.object.upgrade().is_some()
    }

    fn current(&self) -> Value {
        self.object
            .upgrade()
            .map_or(Value::Undefined, |o| o.get_untracked(&self.key))
    }

    /// Notify if the value moved since the last check.
    fn check(&self) -> bool {
        let new_value = self.current();
        let old_value = self.old_value.replace(new_value.clone());
        if new_value.strict_eq(&old_value) {
            return false;
        }
        self.subscribers
            .notify(|s| s.handle_change(&new_value, &old_value, LifecycleFlags::UPDATE_TARGET_INSTANCE));
        true
    }
}

impl PropertyObserver for DirtyCheckProperty {
    fn kind(&self) -> ObserverKind {
        ObserverKind::DirtyCheck
    }

    fn get_value(&self) -> Value {
        self.current()
    }

    fn set_value(&self, value: Value, _flags: LifecycleFlags) {
        if let Some(object) = self.object.upgrade() {
            object.set(&self.key, value);
        }
    }

    fn subscribe(&self, subscriber: Weak<dyn PropertySubscriber>) -> bool {
        let first = !self.subscribers.has_subscribers();
        let added = self.subscribers.subscribe(subscriber);
        if first && added {
            *self.old_value.borrow_mut() = self.current();
            if let Some(checker) = self.checker.upgrade() {
                checker.add(self.self_ref.clone());
            }
        }
        added
    }

    fn unsubscribe(&self, subscriber: &Weak<dyn PropertySubscriber>) -> bool {
        let removed = self.subscribers.unsubscribe(subscriber);
        if removed && !self.subscribers.has_subscribers() {
            if let Some(checker) = self.checker.upgrade() {
                checker.remove(&self.self_ref);
            }
        }
        removed
    }
}

impl fmt::Debug for DirtyCheckProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirtyCheckProperty")
            .field("key", &self.key)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use trellis_core::Accessor;

    #[derive(Default)]
    struct Count(Cell<u32>);

    impl PropertySubscriber for Count {
        fn handle_change(&self, _: &Value, _: &Value, _: LifecycleFlags) {
            self.0.set(self.0.get() + 1);
        }
    }

    fn backed() -> ObjectRef {
        let obj = ObjectRef::from_pairs([("raw", 1)]);
        obj.define_accessor(
            "x",
            Accessor::new(|o| o.get("raw"), |o, v| o.set("raw", v)).non_configurable(),
        );
        obj
    }

    #[test]
    fn sweep_notifies_changed_properties_on_interval() {
        let scheduler = Rc::new(Scheduler::manual());
        let checker = DirtyChecker::new(Rc::clone(&scheduler), DirtyCheckSettings::default());
        let obj = backed();
        let property = checker.create_property(&obj, "x").expect("allowed");
        let count = Rc::new(Count::default());
        property.subscribe(Rc::downgrade(&count) as Weak<dyn PropertySubscriber>);
        assert!(checker.is_scheduled());

        obj.set("raw", 2);
        scheduler.advance(Duration::from_millis(60));
        assert_eq!(count.0.get(), 0);
        scheduler.advance(Duration::from_millis(60));
        assert_eq!(count.0.get(), 1);
        assert!(checker.is_scheduled());
        scheduler.advance(Duration::from_millis(120));
        assert_eq!(count.0.get(), 1);
    }

    #[test]
    fn no_sweep_without_subscribers() {
        let scheduler = Rc::new(Scheduler::manual());
        let checker = DirtyChecker::new(Rc::clone(&scheduler), DirtyCheckSettings::default());
        let obj = backed();
        let property = checker.create_property(&obj, "x").expect("allowed");
        let count = Rc::new(Count::default());
        let weak = Rc::downgrade(&count) as Weak<dyn PropertySubscriber>;
        property.subscribe(weak.clone());
        property.unsubscribe(&weak);
        assert!(!checker.is_scheduled());
        assert_eq!(scheduler.pending_timers(), 0);
    }

    #[test]
    fn disabled_checker_only_sweeps_on_demand() {
        let scheduler = Rc::new(Scheduler::manual());
        let settings = DirtyCheckSettings {
            disabled: true,
            ..DirtyCheckSettings::default()
        };
        let checker = DirtyChecker::new(Rc::clone(&scheduler), settings);
        let obj = backed();
        let property = checker.create_property(&obj, "x").expect("allowed");
        let count = Rc::new(Count::default());
        property.subscribe(Rc::downgrade(&count) as Weak<dyn PropertySubscriber>);
        assert!(!checker.is_scheduled());
        obj.set("raw", 5);
        assert_eq!(checker.check_now(), 1);
        assert_eq!(count.0.get(), 1);
    }

    #[test]
    fn vanished_targets_are_pruned() {
        let scheduler = Rc::new(Scheduler::manual());
        let checker = DirtyChecker::new(Rc::clone(&scheduler), DirtyCheckSettings::default());
        let property = {
            let obj = backed();
            checker.create_property(&obj, "x").expect("allowed")
        };
        let count = Rc::new(Count::default());
        property.subscribe(Rc::downgrade(&count) as Weak<dyn PropertySubscriber>);
        assert_eq!(checker.check_now(), 0);
        assert_eq!(checker.tracked_count(), 0);
    }
}
