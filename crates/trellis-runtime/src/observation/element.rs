#![forbid(unsafe_code)]

//! Observers and accessors for host nodes.
//!
//! | Key | Node | Type | Kind |
//! |-----|------|------|------|
//! | `value` | input, textarea, select | [`InputObserver`] | `ValueAttribute` |
//! | `checked` | input | [`InputObserver`] | `Checked` |
//! | `class` | any element | [`ElementAccessor`] | `ClassAttribute` |
//! | `style` | any element | [`ElementAccessor`] | `StyleAttribute` |
//! | `style.<prop>` | any element | [`ElementAccessor`] | `StyleProperty` |
//! | `data-*`, `aria-*`, other dashed names | any element | [`ElementAccessor`] | `DataAttribute` |
//! | anything else | any node | [`ElementAccessor`] | `ElementProperty` |
//!
//! Writes outside a bind or flush are deferred: the accessor records the
//! new value and queues itself on the lifecycle flush queue, so several
//! writes in one turn touch the node once.
//!
//! Input observers listen to the node's events while subscribed and report
//! user edits with `UPDATE_SOURCE_EXPRESSION`.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use trellis_core::{
    Event, EventListener, LifecycleFlags, Node, PropertySubscriber, Publisher, Value, WeakNode,
};

use super::{ObserverKind, PropertyObserver};
use crate::error::Result;
use crate::lifecycle::{Flushable, Lifecycle};

const IMMEDIATE: LifecycleFlags = LifecycleFlags::FROM_BIND.union(LifecycleFlags::FROM_FLUSH);

/// Pick the observer for `key` on `node`.
pub(crate) fn create(node: &Node, key: &str, lifecycle: &Rc<Lifecycle>) -> Rc<dyn PropertyObserver> {
    let tag = node.node_name();
    let is_input = tag == "input";
    match key {
        "value" if is_input || tag == "textarea" || tag == "select" => {
            InputObserver::new(node, ObserverKind::ValueAttribute, lifecycle)
        }
        "checked" if is_input => InputObserver::new(node, ObserverKind::Checked, lifecycle),
        "class" => ElementAccessor::new(node, key, ObserverKind::ClassAttribute, lifecycle),
        "style" => ElementAccessor::new(node, key, ObserverKind::StyleAttribute, lifecycle),
        k if k.starts_with("style.") => ElementAccessor::new(node, key, ObserverKind::StyleProperty, lifecycle),
        k if k.starts_with("data-") || k.starts_with("aria-") || k.contains('-') => {
            ElementAccessor::new(node, key, ObserverKind::DataAttribute, lifecycle)
        }
        _ => ElementAccessor::new(node, key, ObserverKind::ElementProperty, lifecycle),
    }
}

/// Class names named by a binding value: a whitespace-separated string, an
/// array of names, or an object whose truthy keys are the names.
fn class_names(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s.split_whitespace().map(str::to_owned).collect(),
        Value::Array(a) => a.to_vec().iter().flat_map(class_names).collect(),
        Value::Object(o) => o
            .keys()
            .into_iter()
            .filter(|k| o.get_untracked(k).is_truthy())
            .map(|k| k.to_string())
            .collect(),
        _ => Vec::new(),
    }
}

/// Style declarations named by a binding value: `a: b; c: d` text or an
/// object of property/value pairs.
fn style_pairs(value: &Value) -> Vec<(String, String)> {
    match value {
        Value::String(s) => s
            .split(';')
            .filter_map(|decl| {
                let (k, v) = decl.split_once(':')?;
                let (k, v) = (k.trim(), v.trim());
                (!k.is_empty()).then(|| (k.to_owned(), v.to_owned()))
            })
            .collect(),
        Value::Object(o) => o
            .keys()
            .into_iter()
            .filter_map(|k| {
                let v = o.get_untracked(&k);
                (!v.is_nullish()).then(|| (k.to_string(), v.to_display_string()))
            })
            .collect(),
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// ElementAccessor
// ---------------------------------------------------------------------------

/// Batched writer for one aspect of a node. Never notifies.
pub struct ElementAccessor {
    node: WeakNode,
    key: Rc<str>,
    kind: ObserverKind,
    current: RefCell<Value>,
    old: RefCell<Value>,
    // Classes or style properties this accessor set, so a later write can
    // remove the ones it no longer names.
    owned: RefCell<Vec<String>>,
    lifecycle: Weak<Lifecycle>,
    self_ref: Weak<Self>,
}

impl ElementAccessor {
    fn new(node: &Node, key: &str, kind: ObserverKind, lifecycle: &Rc<Lifecycle>) -> Rc<dyn PropertyObserver> {
        Rc::new_cyclic(|self_ref| Self {
            node: node.downgrade(),
            key: Rc::from(key),
            kind,
            current: RefCell::new(Value::Undefined),
            old: RefCell::new(Value::Undefined),
            owned: RefCell::new(Vec::new()),
            lifecycle: Rc::downgrade(lifecycle),
            self_ref: self_ref.clone(),
        })
    }

    fn write(&self, value: &Value) {
        let Some(node) = self.node.upgrade() else {
            return;
        };
        match self.kind {
            ObserverKind::ClassAttribute => {
                let names = class_names(value);
                let mut owned = self.owned.borrow_mut();
                for stale in owned.iter().filter(|c| !names.contains(c)) {
                    node.remove_class(stale);
                }
                for name in &names {
                    node.add_class(name);
                }
                *owned = names;
            }
            ObserverKind::StyleAttribute => {
                let pairs = style_pairs(value);
                let mut owned = self.owned.borrow_mut();
                for stale in owned.iter().filter(|p| !pairs.iter().any(|(k, _)| k == *p)) {
                    node.remove_style(stale);
                }
                for (k, v) in &pairs {
                    node.set_style(k, v);
                }
                *owned = pairs.into_iter().map(|(k, _)| k).collect();
            }
            ObserverKind::StyleProperty => {
                let property = self.key.trim_start_matches("style.");
                if value.is_nullish() {
                    node.remove_style(property);
                } else {
                    node.set_style(property, &value.to_display_string());
                }
            }
            ObserverKind::DataAttribute => {
                if value.is_nullish() {
                    node.remove_attribute(&self.key);
                } else {
                    node.set_attribute(&self.key, &value.to_display_string());
                }
            }
            _ => node.set_property(&self.key, value.clone()),
        }
    }
}

impl Flushable for ElementAccessor {
    fn flush(&self, _flags: LifecycleFlags) -> Result<()> {
        let current = self.current.borrow().clone();
        let changed = !current.strict_eq(&self.old.borrow());
        if changed {
            self.write(&current);
            *self.old.borrow_mut() = current;
        }
        Ok(())
    }
}

impl PropertyObserver for ElementAccessor {
    fn kind(&self) -> ObserverKind {
        self.kind
    }

    fn get_value(&self) -> Value {
        let Some(node) = self.node.upgrade() else {
            return Value::Undefined;
        };
        {
            let pending = self.current.borrow();
            if !pending.strict_eq(&self.old.borrow()) {
                return pending.clone();
            }
        }
        match self.kind {
            ObserverKind::ClassAttribute => Value::from(node.get_attribute("class").unwrap_or_default()),
            ObserverKind::StyleAttribute => Value::from(node.style_text()),
            ObserverKind::StyleProperty => node
                .get_style(self.key.trim_start_matches("style."))
                .map_or(Value::Undefined, Value::from),
            ObserverKind::DataAttribute => node.get_attribute(&self.key).map_or(Value::Null, Value::from),
            _ => node.get_property(&self.key),
        }
    }

    fn set_value(&self, value: Value, flags: LifecycleFlags) {
        *self.current.borrow_mut() = value.clone();
        if flags.intersects(IMMEDIATE) {
            self.write(&value);
            *self.old.borrow_mut() = value;
            return;
        }
        if let (Some(lifecycle), Some(me)) = (self.lifecycle.upgrade(), self.self_ref.upgrade()) {
            lifecycle.enqueue_flush(me);
        }
    }
}

impl fmt::Debug for ElementAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementAccessor")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("current", &self.current.borrow())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// InputObserver
// ---------------------------------------------------------------------------

/// Two-way observer for form controls (`value` and `checked`).
///
/// A `checked` binding to an array keeps the array's membership of the
/// element's `model` (or `value`) in sync with the checkbox state.
pub struct InputObserver {
    node: WeakNode,
    kind: ObserverKind,
    current: RefCell<Value>,
    old: RefCell<Value>,
    events: RefCell<Vec<Rc<str>>>,
    listener: RefCell<Option<EventListener>>,
    subscribers: Publisher<dyn PropertySubscriber>,
    lifecycle: Weak<Lifecycle>,
    self_ref: Weak<Self>,
}

impl InputObserver {
    fn new(node: &Node, kind: ObserverKind, lifecycle: &Rc<Lifecycle>) -> Rc<dyn PropertyObserver> {
        let events: Vec<Rc<str>> = match kind {
            ObserverKind::Checked => vec![Rc::from("change")],
            _ => vec![Rc::from("change"), Rc::from("input")],
        };
        let current = match kind {
            ObserverKind::Checked => node.get_property("checked"),
            _ => node.get_property("value"),
        };
        Rc::new_cyclic(|self_ref| Self {
            node: node.downgrade(),
            kind,
            old: RefCell::new(current.clone()),
            current: RefCell::new(current),
            events: RefCell::new(events),
            listener: RefCell::new(None),
            subscribers: Publisher::new(),
            lifecycle: Rc::downgrade(lifecycle),
            self_ref: self_ref.clone(),
        })
    }

    fn model_of(node: &Node) -> Value {
        match node.get_property("model") {
            Value::Undefined => node.get_property("value"),
            model => model,
        }
    }

    fn write(&self, value: &Value) {
        let Some(node) = self.node.upgrade() else {
            return;
        };
        match self.kind {
            ObserverKind::Checked => {
                let checked = match value {
                    Value::Array(items) => items.index_of(&Self::model_of(&node)).is_some(),
                    v => v.is_truthy(),
                };
                node.set_property("checked", checked);
            }
            _ => {
                let text = if value.is_nullish() {
                    String::new()
                } else {
                    value.to_display_string()
                };
                node.set_property("value", text);
            }
        }
    }

    fn handle_event(&self, _event: &Event) {
        let Some(node) = self.node.upgrade() else {
            return;
        };
        let previous = self.current.borrow().clone();
        let new_value = match (self.kind, &previous) {
            (ObserverKind::Checked, Value::Array(items)) => {
                let model = Self::model_of(&node);
                let checked = node.get_property("checked").is_truthy();
                match (checked, items.index_of(&model)) {
                    (true, None) => {
                        items.push(model);
                    }
                    (false, Some(index)) => {
                        items.splice(index as isize, Some(1), Vec::new());
                    }
                    _ => return,
                }
                previous.clone()
            }
            (ObserverKind::Checked, _) => Value::Bool(node.get_property("checked").is_truthy()),
            _ => node.get_property("value"),
        };
        if !matches!(previous, Value::Array(_)) && new_value.strict_eq(&previous) {
            return;
        }
        *self.current.borrow_mut() = new_value.clone();
        *self.old.borrow_mut() = new_value.clone();
        tracing::trace!(kind = ?self.kind, "input changed by user");
        self.subscribers
            .notify(|s| s.handle_change(&new_value, &previous, LifecycleFlags::UPDATE_SOURCE_EXPRESSION));
    }

    fn listen(&self) {
        let Some(node) = self.node.upgrade() else {
            return;
        };
        let me = self.self_ref.clone();
        let listener: EventListener = Rc::new(move |event: &Event| {
            if let Some(me) = me.upgrade() {
                me.handle_event(event);
            }
        });
        for event in self.events.borrow().iter() {
            node.add_event_listener(event, Rc::clone(&listener));
        }
        *self.listener.borrow_mut() = Some(listener);
    }

    fn stop_listening(&self) {
        let listener = self.listener.borrow_mut().take();
        if let (Some(node), Some(listener)) = (self.node.upgrade(), listener) {
            for event in self.events.borrow().iter() {
                node.remove_event_listener(event, &listener);
            }
        }
    }
}

impl Flushable for InputObserver {
    fn flush(&self, _flags: LifecycleFlags) -> Result<()> {
        let current = self.current.borrow().clone();
        let changed = !current.strict_eq(&self.old.borrow());
        if changed {
            self.write(&current);
            *self.old.borrow_mut() = current;
        }
        Ok(())
    }
}

impl PropertyObserver for InputObserver {
    fn kind(&self) -> ObserverKind {
        self.kind
    }

    fn get_value(&self) -> Value {
        {
            let pending = self.current.borrow();
            if !pending.strict_eq(&self.old.borrow()) {
                return pending.clone();
            }
        }
        match (self.kind, self.node.upgrade()) {
            (ObserverKind::ValueAttribute, Some(node)) => node.get_property("value"),
            _ => self.current.borrow().clone(),
        }
    }

    fn set_value(&self, value: Value, flags: LifecycleFlags) {
        *self.current.borrow_mut() = value.clone();
        if flags.intersects(IMMEDIATE) {
            self.write(&value);
            *self.old.borrow_mut() = value;
            return;
        }
        if let (Some(lifecycle), Some(me)) = (self.lifecycle.upgrade(), self.self_ref.upgrade()) {
            lifecycle.enqueue_flush(me);
        }
    }

    fn subscribe(&self, subscriber: Weak<dyn PropertySubscriber>) -> bool {
        let first = !self.subscribers.has_subscribers();
        let added = self.subscribers.subscribe(subscriber);
        if first && added {
            self.listen();
        }
        added
    }

    fn unsubscribe(&self, subscriber: &Weak<dyn PropertySubscriber>) -> bool {
        let removed = self.subscribers.unsubscribe(subscriber);
        if removed && !self.subscribers.has_subscribers() {
            self.stop_listening();
        }
        removed
    }

    fn set_update_events(&self, events: &[Rc<str>]) -> bool {
        let listening = self.listener.borrow().is_some();
        if listening {
            self.stop_listening();
        }
        *self.events.borrow_mut() = events.to_vec();
        if listening {
            self.listen();
        }
        true
    }
}

impl fmt::Debug for InputObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputObserver")
            .field("kind", &self.kind)
            .field("events", &self.events.borrow())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
