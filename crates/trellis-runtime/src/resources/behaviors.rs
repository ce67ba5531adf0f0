#![forbid(unsafe_code)]

//! Built-in binding behaviors.
//!
//! | Name | Applies to | Effect |
//! |------|-----------|--------|
//! | `debounce:ms` | any | delay the limited operation until `ms` (200) pass quietly |
//! | `throttle:ms` | any | run the limited operation at most once per `ms` (200) |
//! | `oneTime` `toView` `fromView` `twoWay` | property bindings | override the binding mode |
//! | `updateTrigger:'blur':...` | bindings that update their source | replace the target's change events |
//! | `signal:'name':...` | re-evaluating bindings | refresh when a named signal is dispatched |
//! | `self` | listeners | ignore events bubbled up from descendants |
//!
//! The limited operation is `CallSource` for listeners, `UpdateSource` for
//! bindings whose effective mode writes back, and `UpdateTarget` otherwise.

use std::rc::Rc;

use trellis_core::{BindingMode, LifecycleFlags, Value};
use web_time::Duration;

use super::{BindingBehavior, Resource};
use crate::binding::{BehaviorHost, BindingKind, LimitedOp, RateLimitKind, RateLimiter};
use crate::error::EvalError;
use crate::scope::Scope;

const DEFAULT_DELAY_MS: u64 = 200;

/// Every built-in behavior, ready to register.
#[must_use]
pub fn defaults() -> Vec<Resource> {
    vec![
        Resource::behavior("debounce", RateLimitBehavior(RateLimitKind::Debounce)),
        Resource::behavior("throttle", RateLimitBehavior(RateLimitKind::Throttle)),
        Resource::behavior("oneTime", ModeBehavior(BindingMode::ONE_TIME)),
        Resource::behavior("toView", ModeBehavior(BindingMode::TO_VIEW)),
        Resource::behavior("fromView", ModeBehavior(BindingMode::FROM_VIEW)),
        Resource::behavior("twoWay", ModeBehavior(BindingMode::TWO_WAY)),
        Resource::behavior("updateTrigger", UpdateTriggerBehavior),
        Resource::behavior("signal", SignalBehavior),
        Resource::behavior("self", SelfBehavior),
    ]
}

fn invalid(name: &str, reason: &'static str) -> EvalError {
    EvalError::InvalidBehaviorUse {
        name: Rc::from(name),
        reason,
    }
}

fn string_args(args: &[Value]) -> Vec<Rc<str>> {
    args.iter()
        .filter(|a| !a.is_nullish())
        .map(|a| Rc::from(a.to_display_string()))
        .collect()
}

// ---------------------------------------------------------------------------
// debounce / throttle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct RateLimitBehavior(pub RateLimitKind);

impl RateLimitBehavior {
    fn name(self) -> &'static str {
        match self.0 {
            RateLimitKind::Debounce => "debounce",
            RateLimitKind::Throttle => "throttle",
        }
    }

    fn limited_op(binding: &dyn BehaviorHost) -> LimitedOp {
        match binding.kind() {
            BindingKind::Listener => LimitedOp::CallSource,
            BindingKind::Property(_) if binding.effective_mode().is_some_and(BindingMode::updates_source) => {
                LimitedOp::UpdateSource
            }
            _ => LimitedOp::UpdateTarget,
        }
    }
}

impl BindingBehavior for RateLimitBehavior {
    fn bind(
        &self,
        _flags: LifecycleFlags,
        _scope: &Scope,
        binding: &dyn BehaviorHost,
        args: &[Value],
    ) -> Result<(), EvalError> {
        let delay = args
            .first()
            .map(Value::to_number)
            .filter(|ms| ms.is_finite() && *ms >= 0.0)
            .map_or(Duration::from_millis(DEFAULT_DELAY_MS), |ms| Duration::from_millis(ms as u64));
        if binding.behaviors().limiter().is_some() {
            return Err(invalid(self.name(), "a binding takes one rate limiter"));
        }
        let op = Self::limited_op(binding);
        let scheduler = Rc::clone(binding.container().scheduler());
        tracing::trace!(kind = ?self.0, ?op, ?delay, "rate limiter installed");
        binding
            .behaviors()
            .set_limiter(Some(RateLimiter::new(self.0, op, delay, scheduler)));
        Ok(())
    }

    fn unbind(&self, _flags: LifecycleFlags, _scope: &Scope, binding: &dyn BehaviorHost) {
        binding.behaviors().set_limiter(None);
    }
}

// ---------------------------------------------------------------------------
// binding mode overrides
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct ModeBehavior(pub BindingMode);

impl BindingBehavior for ModeBehavior {
    fn bind(
        &self,
        _flags: LifecycleFlags,
        _scope: &Scope,
        binding: &dyn BehaviorHost,
        _args: &[Value],
    ) -> Result<(), EvalError> {
        if !matches!(binding.kind(), BindingKind::Property(_)) {
            return Err(invalid("mode", "only property bindings have a mode"));
        }
        binding.behaviors().set_mode(Some(self.0));
        Ok(())
    }

    fn unbind(&self, _flags: LifecycleFlags, _scope: &Scope, binding: &dyn BehaviorHost) {
        binding.behaviors().set_mode(None);
    }
}

// ---------------------------------------------------------------------------
// updateTrigger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct UpdateTriggerBehavior;

impl BindingBehavior for UpdateTriggerBehavior {
    fn bind(
        &self,
        _flags: LifecycleFlags,
        _scope: &Scope,
        binding: &dyn BehaviorHost,
        args: &[Value],
    ) -> Result<(), EvalError> {
        let events = string_args(args);
        if events.is_empty() {
            return Err(invalid("updateTrigger", "at least one event name is required"));
        }
        if !binding.effective_mode().is_some_and(BindingMode::updates_source) {
            return Err(invalid("updateTrigger", "the binding never updates its source"));
        }
        binding.behaviors().set_update_events(Some(events));
        Ok(())
    }

    fn unbind(&self, _flags: LifecycleFlags, _scope: &Scope, binding: &dyn BehaviorHost) {
        binding.behaviors().set_update_events(None);
    }
}

// ---------------------------------------------------------------------------
// signal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct SignalBehavior;

impl BindingBehavior for SignalBehavior {
    fn bind(
        &self,
        _flags: LifecycleFlags,
        _scope: &Scope,
        binding: &dyn BehaviorHost,
        args: &[Value],
    ) -> Result<(), EvalError> {
        let names = string_args(args);
        if names.is_empty() {
            return Err(invalid("signal", "at least one signal name is required"));
        }
        let Some(subscriber) = binding.signal_subscriber() else {
            return Err(invalid("signal", "binding cannot receive signals"));
        };
        let signaler = binding.container().signaler();
        for name in names {
            signaler.add_signal_listener(&name, subscriber.clone());
            binding.behaviors().add_signal(name);
        }
        Ok(())
    }

    fn unbind(&self, _flags: LifecycleFlags, _scope: &Scope, binding: &dyn BehaviorHost) {
        let Some(subscriber) = binding.signal_subscriber() else {
            return;
        };
        let signaler = binding.container().signaler();
        for name in binding.behaviors().take_signals() {
            signaler.remove_signal_listener(&name, &subscriber);
        }
    }
}

// ---------------------------------------------------------------------------
// self
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct SelfBehavior;

impl BindingBehavior for SelfBehavior {
    fn bind(
        &self,
        _flags: LifecycleFlags,
        _scope: &Scope,
        binding: &dyn BehaviorHost,
        _args: &[Value],
    ) -> Result<(), EvalError> {
        if binding.kind() != BindingKind::Listener {
            return Err(invalid("self", "only listener bindings can use it"));
        }
        binding.behaviors().set_self_only(true);
        Ok(())
    }

    fn unbind(&self, _flags: LifecycleFlags, _scope: &Scope, binding: &dyn BehaviorHost) {
        binding.behaviors().set_self_only(false);
    }
}
