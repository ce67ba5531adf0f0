#![forbid(unsafe_code)]

//! Bindings connect an expression evaluated in a [`Scope`] to a target.
//!
//! Every binding follows the same state machine:
//!
//! ```text
//! none --bind--> binding --> bound --unbind--> unbinding --> none
//! ```
//!
//! While bound, a change from either side re-evaluates the source,
//! compares it with the target's current value and writes only on
//! inequality. Unless the binding is one-time it then re-runs `connect`,
//! stamping every dependency it touches with a fresh version; slots left
//! with an old stamp are unsubscribed ([`ObserverSlots`]).
//!
//! Binding again while bound to the same scope is a no-op. Binding to a
//! different scope unbinds fully first. A failed bind leaves the binding
//! unbound, with every behavior it managed to apply released again.
//!
//! # Traits
//!
//! | Trait | Role |
//! |-------|------|
//! | [`Binding`] | the container and kind every binding exposes |
//! | [`Connectable`] | receives dependencies declared by `connect` |
//! | [`BehaviorHost`] | the surface binding behaviors reconfigure |
//! | [`Bindable`] | what views and controllers bind and unbind |

pub mod call;
pub mod interpolation;
pub mod let_binding;
pub mod listener;
pub mod property;
pub mod rate_limit;
pub mod reference;
mod slots;

use std::rc::{Rc, Weak};

use trellis_core::{BindingMode, LifecycleFlags, PropertySubscriber, Value};
use trellis_expr::Expr;

use crate::container::Container;
use crate::error::{EvalError, Result};
use crate::expression::Evaluate;
use crate::scope::Scope;

pub use call::CallBinding;
pub use interpolation::InterpolationBinding;
pub use let_binding::LetBinding;
pub use listener::ListenerBinding;
pub use property::PropertyBinding;
pub use rate_limit::{LimitedOp, RateLimitKind, RateLimiter};
pub use reference::RefBinding;
pub use slots::{BehaviorSlots, ObserverSlots};

/// Which binding implementation a behavior is being applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// A property binding with its declared mode.
    Property(BindingMode),
    Interpolation,
    Listener,
    Call,
    Ref,
    Let,
}

/// Surface shared by every binding.
pub trait Binding {
    fn container(&self) -> &Rc<Container>;
    fn kind(&self) -> BindingKind;
}

/// A binding that receives the dependencies declared by `connect`.
pub trait Connectable: Binding {
    fn slots(&self) -> &ObserverSlots;

    fn observe_property(
        &self,
        _flags: LifecycleFlags,
        object: &Value,
        key: &str,
    ) -> std::result::Result<(), EvalError> {
        let observer = self.container().observer_locator().get_observer(object, key)?;
        self.slots().observe_property(observer);
        Ok(())
    }

    fn observe_collection(
        &self,
        _flags: LifecycleFlags,
        collection: &Value,
    ) -> std::result::Result<(), EvalError> {
        if let Some(observer) = self.container().observer_locator().get_collection_observer(collection) {
            self.slots().observe_collection(observer);
        }
        Ok(())
    }
}

/// The surface binding behaviors reconfigure.
pub trait BehaviorHost: Binding {
    fn behaviors(&self) -> &BehaviorSlots;

    /// Receiver for signal notifications, if this binding re-evaluates on
    /// demand.
    fn signal_subscriber(&self) -> Option<Weak<dyn PropertySubscriber>> {
        None
    }

    /// The mode in effect: a behavior override or the declared mode.
    fn effective_mode(&self) -> Option<BindingMode> {
        match self.kind() {
            BindingKind::Property(mode) => Some(self.behaviors().mode().unwrap_or(mode)),
            _ => None,
        }
    }
}

/// Anything a view binds and unbinds as a unit.
pub trait Bindable {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()>;
    fn unbind(&self, flags: LifecycleFlags) -> Result<()>;
    fn is_bound(&self) -> bool;
}

/// Bind `source`'s converters and behaviors, then run `rest`. If `rest`
/// fails the source is unbound again.
pub(crate) fn bind_source(
    source: &Expr,
    flags: LifecycleFlags,
    scope: &Scope,
    host: &dyn BehaviorHost,
    rest: impl FnOnce() -> Result<()>,
) -> Result<()> {
    if source.has_bind() {
        source.bind(flags, scope, host)?;
    }
    rest().inspect_err(|_| {
        if source.has_unbind() {
            source.unbind(flags, scope, host);
        }
    })
}
