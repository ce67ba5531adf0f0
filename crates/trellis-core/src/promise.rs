#![forbid(unsafe_code)]

//! Single-threaded one-shot settle primitive.
//!
//! A [`Promise`] starts pending and settles at most once, either fulfilled
//! or rejected. Reactions registered with [`Promise::then`] run
//! synchronously at settle time, in registration order, or immediately if
//! the promise has already settled. This is the only suspension point the
//! composition machinery relies on.
//!
//! # Failure Modes
//!
//! - Settling twice: the second settle is ignored and reported as `false`.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::value::Value;

/// Final state of a promise.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Fulfilled(Value),
    Rejected(Value),
}

type Reaction = Box<dyn FnOnce(&Settlement)>;

struct PromiseInner {
    settled: RefCell<Option<Settlement>>,
    reactions: RefCell<Vec<Reaction>>,
}

/// A shared handle to a pending or settled value.
#[derive(Clone)]
pub struct Promise(Rc<PromiseInner>);

impl Promise {
    /// A new pending promise.
    #[must_use]
    pub fn pending() -> Self {
        Self(Rc::new(PromiseInner {
            settled: RefCell::new(None),
            reactions: RefCell::new(Vec::new()),
        }))
    }

    /// An already-fulfilled promise.
    #[must_use]
    pub fn resolved(value: impl Into<Value>) -> Self {
        let p = Self::pending();
        p.resolve(value);
        p
    }

    /// An already-rejected promise.
    #[must_use]
    pub fn rejected(reason: impl Into<Value>) -> Self {
        let p = Self::pending();
        p.reject(reason);
        p
    }

    /// Fulfill the promise. Returns `false` if it had already settled.
    pub fn resolve(&self, value: impl Into<Value>) -> bool {
        self.settle(Settlement::Fulfilled(value.into()))
    }

    /// Reject the promise. Returns `false` if it had already settled.
    pub fn reject(&self, reason: impl Into<Value>) -> bool {
        self.settle(Settlement::Rejected(reason.into()))
    }

    fn settle(&self, settlement: Settlement) -> bool {
        {
            let mut slot = self.0.settled.borrow_mut();
            if slot.is_some() {
                return false;
            }
            *slot = Some(settlement.clone());
        }
        // Reactions may register further reactions; drain until empty.
        loop {
            let reactions = std::mem::take(&mut *self.0.reactions.borrow_mut());
            if reactions.is_empty() {
                break;
            }
            for reaction in reactions {
                reaction(&settlement);
            }
        }
        true
    }

    /// Register a reaction to settlement.
    pub fn then(&self, reaction: impl FnOnce(&Settlement) + 'static) {
        let settled = self.0.settled.borrow().clone();
        match settled {
            Some(s) => reaction(&s),
            None => self.0.reactions.borrow_mut().push(Box::new(reaction)),
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.0.settled.borrow().is_none()
    }

    #[must_use]
    pub fn settlement(&self) -> Option<Settlement> {
        self.0.settled.borrow().clone()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("settled", &*self.0.settled.borrow())
            .field("pending_reactions", &self.0.reactions.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn reactions_run_on_resolve() {
        let p = Promise::pending();
        let seen = Rc::new(RefCell::new(None));
        let s = Rc::clone(&seen);
        p.then(move |settlement| *s.borrow_mut() = Some(settlement.clone()));
        assert!(seen.borrow().is_none());
        assert!(p.resolve(5));
        assert_eq!(*seen.borrow(), Some(Settlement::Fulfilled(Value::from(5))));
    }

    #[test]
    fn then_after_settle_runs_immediately() {
        let p = Promise::resolved("x");
        let hit = Rc::new(Cell::new(false));
        let h = Rc::clone(&hit);
        p.then(move |_| h.set(true));
        assert!(hit.get());
    }

    #[test]
    fn settles_once() {
        let p = Promise::pending();
        assert!(p.reject("err"));
        assert!(!p.resolve(1));
        assert_eq!(p.settlement(), Some(Settlement::Rejected(Value::str("err"))));
    }

    #[test]
    fn reaction_order_is_registration_order() {
        let p = Promise::pending();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let l = Rc::clone(&log);
            p.then(move |_| l.borrow_mut().push(i));
        }
        p.resolve(Value::Undefined);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }
}
