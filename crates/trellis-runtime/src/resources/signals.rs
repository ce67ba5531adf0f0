#![forbid(unsafe_code)]

//! Named signals that force subscribed bindings to re-evaluate.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;
use trellis_core::{LifecycleFlags, PropertySubscriber, Publisher, Value};

#[derive(Default)]
pub struct SignalDispatcher {
    signals: RefCell<FxHashMap<Rc<str>, Rc<Publisher<dyn PropertySubscriber>>>>,
}

impl SignalDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_signal_listener(&self, name: &str, listener: Weak<dyn PropertySubscriber>) -> bool {
        let publisher = Rc::clone(
            self.signals
                .borrow_mut()
                .entry(Rc::from(name))
                .or_insert_with(|| Rc::new(Publisher::new())),
        );
        publisher.subscribe(listener)
    }

    pub fn remove_signal_listener(&self, name: &str, listener: &Weak<dyn PropertySubscriber>) -> bool {
        let publisher = self.signals.borrow().get(name).cloned();
        publisher.is_some_and(|p| p.unsubscribe(listener))
    }

    #[must_use]
    pub fn listener_count(&self, name: &str) -> usize {
        self.signals.borrow().get(name).map_or(0, |p| p.len())
    }

    /// Notify every listener of `name`. Unknown signals are a no-op.
    pub fn dispatch_signal(&self, name: &str, flags: LifecycleFlags) {
        let publisher = self.signals.borrow().get(name).cloned();
        let Some(publisher) = publisher else {
            return;
        };
        tracing::debug!(signal = name, listeners = publisher.len(), "dispatch signal");
        publisher.notify(|s| {
            s.handle_change(
                &Value::Undefined,
                &Value::Undefined,
                flags | LifecycleFlags::UPDATE_TARGET_INSTANCE,
            );
        });
    }
}

impl fmt::Debug for SignalDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let signals = self.signals.borrow();
        let mut names: Vec<&str> = signals.keys().map(|k| &**k).collect();
        names.sort_unstable();
        f.debug_struct("SignalDispatcher").field("signals", &names).finish()
    }
}
