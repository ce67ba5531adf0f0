#![forbid(unsafe_code)]

//! `repeat.for="local of items"`.
//!
//! One view per item, each bound to a scope whose binding context holds the
//! declared local and whose override context carries the contextual
//! properties:
//!
//! | Property | Value |
//! |----------|-------|
//! | `$index` | position |
//! | `$first` | position is 0 |
//! | `$last` | position is `$length - 1` |
//! | `$middle` | neither first nor last |
//! | `$even` / `$odd` | parity of `$index` |
//! | `$length` | item count |
//!
//! # Reconciliation
//!
//! Array mutations arrive once per flush as an [`IndexMap`]. Views whose
//! slot did not change keep their scope and only see contextual updates.
//! Moved views are rebound to a fresh scope, new slots get new views, and
//! views of deleted items are detached, unbound and released. The DOM is
//! then reordered by moving only views outside a longest increasing run of
//! previous positions.
//!
//! Replacing `items`, or any change to a map, set or number, reuses views
//! by position: the tail beyond the new length is detached and unbound
//! first, surviving views are rebound, and missing ones are created.
//!
//! # Failure Modes
//!
//! A view that fails to render is skipped; the first error is returned
//! after the remaining items are processed.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use trellis_core::{
    ArrayRef, CollectionSubscriber, IndexMap, LifecycleFlags, ObjectRef, PropertySubscriber, Value,
};
use trellis_expr::{BindingType, Expr};

use super::ControllerBase;
use crate::binding::Bindable;
use crate::element::keep_first;
use crate::error::{Error, EvalError, Result};
use crate::expression::Evaluate;
use crate::lifecycle::Flushable;
use crate::observation::{CollectionObserver, PropertyObserver};
use crate::scope::{OverrideContext, Scope};
use crate::templating::{Attachable, AttributeContext, AttributeController, Instruction, MountTarget, View};

pub struct Repeat {
    base: ControllerBase,
    view_model: ObjectRef,
    for_of: Rc<Expr>,
    observer: Rc<dyn PropertyObserver>,
    collection: RefCell<Option<Rc<CollectionObserver>>>,
    views: RefCell<Vec<Rc<View>>>,
    items_changed: Cell<bool>,
    self_ref: Weak<Repeat>,
}

impl Repeat {
    pub(crate) fn create(ctx: AttributeContext<'_>) -> Result<Rc<dyn AttributeController>> {
        let base = ControllerBase::new("repeat", &ctx)?;
        let from = ctx
            .instructions
            .iter()
            .find_map(|ins| match ins {
                Instruction::IteratorBinding { from, .. } => Some(from),
                _ => None,
            })
            .ok_or_else(|| EvalError::NotIterable {
                expression: "repeat without an iterator binding".to_owned(),
            })?;
        let for_of = ctx.container.parser().parse(from, BindingType::IsIterator)?;
        let view_model = ObjectRef::new();
        let observer = base.observe(&view_model, "items")?;
        Ok(Rc::new_cyclic(|self_ref| Self {
            base,
            view_model,
            for_of,
            observer,
            collection: RefCell::new(None),
            views: RefCell::new(Vec::new()),
            items_changed: Cell::new(false),
            self_ref: self_ref.clone(),
        }))
    }

    /// The item views, in order.
    #[must_use]
    pub fn views(&self) -> Vec<Rc<View>> {
        self.views.borrow().clone()
    }

    fn items(&self) -> Vec<Value> {
        match self.observer.get_value() {
            Value::Array(items) => items.to_vec(),
            Value::Map(map) => map
                .entries()
                .into_iter()
                .map(|(k, v)| Value::Array(ArrayRef::from_vec(vec![k, v])))
                .collect(),
            Value::Set(set) => set.values(),
            Value::Number(n) if n.is_finite() && n > 0.0 => {
                (0..n as usize).map(|i| Value::Number(i as f64)).collect()
            }
            Value::Undefined | Value::Null | Value::Number(_) => Vec::new(),
            other => {
                tracing::warn!(items = %other.to_display_string(), "repeat over a value that is not iterable");
                Vec::new()
            }
        }
    }

    /// Follow the collection currently in `items`.
    fn observe_collection(&self) {
        let next = self
            .base
            .container()
            .observer_locator()
            .get_collection_observer(&self.observer.get_value());
        let previous = self.collection.borrow().clone();
        if let (Some(previous), Some(next)) = (&previous, &next) {
            if Rc::ptr_eq(previous, next) {
                return;
            }
        }
        let subscriber: Weak<dyn CollectionSubscriber> = self.self_ref.clone();
        if let Some(previous) = previous {
            previous.unsubscribe(&subscriber);
        }
        if let Some(next) = &next {
            next.subscribe(subscriber);
        }
        *self.collection.borrow_mut() = next;
    }

    fn forget_collection(&self) {
        if let Some(previous) = self.collection.borrow_mut().take() {
            let subscriber: Weak<dyn CollectionSubscriber> = self.self_ref.clone();
            previous.unsubscribe(&subscriber);
        }
    }

    /// A scope for the item at `index`.
    fn item_scope(&self, parent: &Scope, item: Value, index: usize, len: usize) -> Result<Scope> {
        let binding_context = ObjectRef::binding_context();
        self.for_of.declare(&binding_context, item)?;
        let scope = Scope::from_parent(parent, Value::Object(binding_context));
        set_contextual(scope.override_context(), index, len);
        Ok(scope)
    }

    fn create_view(
        &self,
        parent: &Scope,
        item: Value,
        index: usize,
        len: usize,
        flags: LifecycleFlags,
    ) -> Result<Rc<View>> {
        let view = self.base.factory().create()?;
        view.hold(MountTarget::Location(self.base.location().clone()));
        view.bind(flags, &self.item_scope(parent, item, index, len)?)?;
        Ok(view)
    }

    /// Attach `fresh` views inside one batch so they mount together.
    fn attach_all(&self, fresh: &[Rc<View>], flags: LifecycleFlags, first: &mut Option<Error>) {
        if !self.base.is_attached() || fresh.is_empty() {
            return;
        }
        let lifecycle = self.base.container().lifecycle();
        lifecycle.begin_attach();
        for view in fresh {
            keep_first(first, view.attach(flags));
        }
        keep_first(first, lifecycle.end_attach(flags).map(drop));
    }

    /// Reuse views by position for a wholly new item list.
    fn refresh(&self, flags: LifecycleFlags) -> Result<()> {
        let Some(scope) = self.base.scope() else {
            return Ok(());
        };
        self.observe_collection();
        let items = self.items();
        let len = items.len();
        let mut views = std::mem::take(&mut *self.views.borrow_mut());
        let mut first = None;
        while views.len() > len {
            if let Some(view) = views.pop() {
                keep_first(&mut first, self.base.hide(&view, flags));
                view.release();
            }
        }
        let mut fresh = Vec::new();
        for (index, item) in items.into_iter().enumerate() {
            if let Some(view) = views.get(index).cloned() {
                let rebound = self
                    .item_scope(&scope, item, index, len)
                    .and_then(|scope| view.bind(flags, &scope));
                keep_first(&mut first, rebound);
                continue;
            }
            match self.create_view(&scope, item, index, len, flags) {
                Ok(view) => {
                    fresh.push(Rc::clone(&view));
                    views.push(view);
                }
                Err(error) => keep_first(&mut first, Err(error)),
            }
        }
        tracing::debug!(views = views.len(), created = fresh.len(), "repeat refreshed");
        *self.views.borrow_mut() = views;
        self.attach_all(&fresh, flags, &mut first);
        first.map_or(Ok(()), Err)
    }

    /// Apply a batched array mutation.
    fn apply(&self, index_map: &IndexMap, flags: LifecycleFlags) -> Result<()> {
        let Some(scope) = self.base.scope() else {
            return Ok(());
        };
        let items = self.items();
        if items.len() != index_map.len() {
            return self.refresh(flags);
        }
        let len = items.len();
        let previous = std::mem::take(&mut *self.views.borrow_mut());
        let mut kept = vec![false; previous.len()];
        for &entry in index_map.entries() {
            if let Some(slot) = usize::try_from(entry).ok().and_then(|e| kept.get_mut(e)) {
                *slot = true;
            }
        }
        let mut first = None;
        for (view, _) in previous.iter().zip(&kept).rev().filter(|(_, kept)| !**kept) {
            keep_first(&mut first, self.base.hide(view, flags));
            view.release();
        }

        let mut views = Vec::with_capacity(len);
        let mut sources = Vec::with_capacity(len);
        let mut fresh = Vec::new();
        for (index, (&entry, item)) in index_map.entries().iter().zip(items).enumerate() {
            let source = usize::try_from(entry).ok().filter(|&e| e < previous.len());
            match source {
                Some(source) if source == index => {
                    if let Some(scope) = previous[source].scope() {
                        set_contextual(scope.override_context(), index, len);
                    }
                    views.push(Rc::clone(&previous[source]));
                    sources.push(entry);
                }
                Some(source) => {
                    let view = Rc::clone(&previous[source]);
                    let rebound = self
                        .item_scope(&scope, item, index, len)
                        .and_then(|scope| view.bind(flags, &scope));
                    keep_first(&mut first, rebound);
                    views.push(view);
                    sources.push(entry);
                }
                None => match self.create_view(&scope, item, index, len, flags) {
                    Ok(view) => {
                        fresh.push(Rc::clone(&view));
                        views.push(view);
                        sources.push(-1);
                    }
                    Err(error) => keep_first(&mut first, Err(error)),
                },
            }
        }
        tracing::debug!(
            views = views.len(),
            created = fresh.len(),
            removed = kept.iter().filter(|k| !**k).count(),
            "repeat applied collection change"
        );
        *self.views.borrow_mut() = views.clone();
        self.attach_all(&fresh, flags, &mut first);
        if self.base.is_attached() {
            self.reorder(&views, &sources);
        }
        first.map_or(Ok(()), Err)
    }

    /// Move every view not on the longest increasing run of previous
    /// positions before its successor.
    fn reorder(&self, views: &[Rc<View>], sources: &[i32]) {
        let stays = longest_increasing(sources);
        let mut anchor = self.base.location().anchor().clone();
        for (view, stays) in views.iter().zip(stays).rev() {
            if !stays {
                view.move_before(&anchor);
            }
            if let Some(node) = view.nodes().first() {
                anchor = node.clone();
            }
        }
    }
}

fn set_contextual(oc: &OverrideContext, index: usize, len: usize) {
    let first = index == 0;
    let last = index + 1 == len;
    let even = index % 2 == 0;
    oc.set("$index", index as f64);
    oc.set("$first", first);
    oc.set("$last", last);
    oc.set("$middle", !first && !last);
    oc.set("$even", even);
    oc.set("$odd", !even);
    oc.set("$length", len as f64);
}

/// Marks the positions of one longest strictly increasing subsequence of
/// `sources`. Negative entries never belong to it.
fn longest_increasing(sources: &[i32]) -> Vec<bool> {
    let mut tails: Vec<usize> = Vec::new();
    let mut previous: Vec<Option<usize>> = vec![None; sources.len()];
    for (i, &source) in sources.iter().enumerate() {
        if source < 0 {
            continue;
        }
        let at = tails.partition_point(|&t| sources[t] < source);
        if at > 0 {
            previous[i] = Some(tails[at - 1]);
        }
        if at == tails.len() {
            tails.push(i);
        } else {
            tails[at] = i;
        }
    }
    let mut stays = vec![false; sources.len()];
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        stays[i] = true;
        cursor = previous[i];
    }
    stays
}

impl PropertySubscriber for Repeat {
    fn handle_change(&self, _: &Value, _: &Value, _: LifecycleFlags) {
        if !self.base.is_bound() || self.items_changed.replace(true) {
            return;
        }
        if let Some(me) = self.self_ref.upgrade() {
            self.base.container().lifecycle().enqueue_flush(me);
        }
    }
}

impl CollectionSubscriber for Repeat {
    fn handle_collection_change(&self, index_map: &IndexMap, flags: LifecycleFlags) {
        // A pending replacement supersedes mutations of the old collection.
        if !self.base.is_bound() || self.items_changed.get() {
            return;
        }
        let result = match self.observer.get_value() {
            Value::Array(_) => self.apply(index_map, flags),
            _ => self.refresh(flags),
        };
        if let Err(error) = result {
            tracing::error!(%error, "repeat failed to apply a collection change");
        }
    }
}

impl Flushable for Repeat {
    fn flush(&self, flags: LifecycleFlags) -> Result<()> {
        if self.items_changed.replace(false) {
            self.refresh(flags)
        } else {
            Ok(())
        }
    }
}

impl Bindable for Repeat {
    fn bind(&self, flags: LifecycleFlags, scope: &Scope) -> Result<()> {
        if !self.base.enter(scope) {
            return Ok(());
        }
        let subscriber: Weak<dyn PropertySubscriber> = self.self_ref.clone();
        self.observer.subscribe(subscriber);
        self.items_changed.set(false);
        self.refresh(flags)
    }

    fn unbind(&self, flags: LifecycleFlags) -> Result<()> {
        if !self.base.leave() {
            return Ok(());
        }
        let subscriber: Weak<dyn PropertySubscriber> = self.self_ref.clone();
        self.observer.unsubscribe(&subscriber);
        self.forget_collection();
        self.items_changed.set(false);
        let views = std::mem::take(&mut *self.views.borrow_mut());
        let mut first = None;
        for view in views.iter().rev() {
            keep_first(&mut first, view.unbind(flags));
            view.release();
        }
        first.map_or(Ok(()), Err)
    }

    fn is_bound(&self) -> bool {
        self.base.is_bound()
    }
}

impl Attachable for Repeat {
    fn attach(&self, flags: LifecycleFlags) -> Result<()> {
        self.base.set_attached(true);
        let mut first = None;
        for view in self.views() {
            keep_first(&mut first, view.attach(flags));
        }
        first.map_or(Ok(()), Err)
    }

    fn detach(&self, flags: LifecycleFlags) -> Result<()> {
        self.base.set_attached(false);
        let mut first = None;
        for view in self.views().iter().rev() {
            keep_first(&mut first, view.detach(flags));
        }
        first.map_or(Ok(()), Err)
    }
}

impl AttributeController for Repeat {
    fn view_model(&self) -> &ObjectRef {
        &self.view_model
    }

    fn bindable(self: Rc<Self>) -> Rc<dyn Bindable> {
        self
    }

    fn attachable(self: Rc<Self>) -> Rc<dyn Attachable> {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for Repeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repeat")
            .field("base", &self.base)
            .field("views", &self.views.borrow().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::controllers::test_support::{Page, text_template};
    use trellis_core::{MapRef, Node};

    fn names(names: &[&str]) -> ArrayRef {
        ArrayRef::from_vec(
            names
                .iter()
                .map(|n| Value::Object(ObjectRef::from_pairs([("name", *n)])))
                .collect(),
        )
    }

    fn repeat_page(items: Value, body: &str) -> Page {
        Page::single(
            Instruction::template_controller("repeat", text_template("item", body), vec![Instruction::iterator(
                "item of items",
            )]),
            ObjectRef::from_pairs([("items", items)]),
        )
    }

    #[test]
    fn renders_one_view_per_item() {
        let page = repeat_page(Value::Array(names(&["item-0", "item-1"])), "item.name");
        assert_eq!(page.text(), "item-0item-1");
    }

    #[test]
    fn replacing_items_reconciles_on_flush() {
        let page = repeat_page(Value::Array(names(&["item-0", "item-1"])), "item.name");
        let empty = ArrayRef::from_vec(Vec::new());
        page.view_model.set("items", Value::Array(empty.clone()));
        page.settle();
        assert_eq!(page.text(), "");
        empty.push(Value::Object(ObjectRef::from_pairs([("name", "item-0")])));
        page.settle();
        assert_eq!(page.text(), "item-0");
    }

    #[test]
    fn mutations_batch_into_one_reconciliation() {
        let items = names(&["a", "b", "c"]);
        let page = repeat_page(Value::Array(items.clone()), "item.name");
        items.push(Value::Object(ObjectRef::from_pairs([("name", "d")])));
        let _removed = items.splice(0, Some(1), Vec::new());
        items.reverse();
        assert_eq!(page.text(), "abc", "nothing changes before the flush");
        page.settle();
        assert_eq!(page.text(), "dcb");
    }

    #[test]
    fn unchanged_items_keep_their_views() {
        let items = names(&["a", "b", "c"]);
        let page = repeat_page(Value::Array(items.clone()), "item.name");
        let before: Vec<Node> = page.host.children();
        items.push(Value::Object(ObjectRef::from_pairs([("name", "d")])));
        page.settle();
        assert_eq!(page.text(), "abcd");
        let after = page.host.children();
        for node in before.iter().filter(|n| n.text_content().len() == 1) {
            assert!(after.iter().any(|a| a.ptr_eq(node)), "{} was recreated", node.text_content());
        }
    }

    #[test]
    fn sorting_moves_views_into_place() {
        let items = ArrayRef::from_vec(["c", "a", "d", "b"].iter().map(|s| Value::from(*s)).collect());
        let page = repeat_page(Value::Array(items.clone()), "item");
        items.sort();
        page.settle();
        assert_eq!(page.text(), "abcd");
        items.reverse();
        page.settle();
        assert_eq!(page.text(), "dcba");
    }

    #[test]
    fn contextual_properties_follow_positions() {
        let items = ArrayRef::from_vec(["x", "y", "z"].iter().map(|s| Value::from(*s)).collect());
        let page = repeat_page(
            Value::Array(items.clone()),
            "$index + ':' + $first + ':' + $last + ':' + $even + ' '",
        );
        assert_eq!(
            page.text(),
            "0:true:false:true 1:false:false:false 2:false:true:true "
        );
        let _removed = items.splice(0, Some(1), Vec::new());
        page.settle();
        assert_eq!(page.text(), "0:true:false:true 1:false:true:false ");
    }

    #[test]
    fn iterates_numbers_maps_and_sets() {
        let page = repeat_page(Value::Number(3.0), "item");
        assert_eq!(page.text(), "012");
        let map = MapRef::new();
        map.set(Value::from("k"), Value::from("v"));
        let page = repeat_page(Value::Map(map.clone()), "item[0] + '=' + item[1]");
        assert_eq!(page.text(), "k=v");
        map.set(Value::from("j"), Value::from("w"));
        page.settle();
        assert_eq!(page.text(), "k=vj=w");
    }

    #[test]
    fn outer_scope_is_reachable_from_items() {
        let page = Page::single(
            Instruction::template_controller(
                "repeat",
                text_template("item", "prefix + item"),
                vec![Instruction::iterator("item of items")],
            ),
            ObjectRef::from_pairs([
                ("items", Value::Array(ArrayRef::from_vec(vec![Value::from("1"), Value::from("2")]))),
                ("prefix", Value::from("#")),
            ]),
        );
        assert_eq!(page.text(), "#1#2");
    }

    #[test]
    fn stop_unbinds_every_item() {
        let items = names(&["a", "b"]);
        let page = repeat_page(Value::Array(items.clone()), "item.name");
        page.stop();
        assert_eq!(page.text(), "");
        items.push(Value::Object(ObjectRef::from_pairs([("name", "c")])));
        page.settle();
        assert_eq!(page.text(), "");
    }

    #[test]
    fn longest_increasing_skips_new_slots() {
        assert_eq!(longest_increasing(&[2, 0, 1, -1, 3]), vec![false, true, true, false, true]);
        assert_eq!(longest_increasing(&[]), Vec::<bool>::new());
        assert_eq!(longest_increasing(&[-1, -1]), vec![false, false]);
    }
}
