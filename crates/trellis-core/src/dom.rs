#![forbid(unsafe_code)]

//! Minimal in-memory host node model.
//!
//! [`Node`] implements the primitive operations the runtime consumes from a
//! host environment: creating element, text, comment and fragment nodes,
//! inserting and removing them, attribute/class/style mutation, element
//! properties such as `value` and `checked`, and event listeners with
//! bubbling dispatch.
//!
//! # Conventions
//!
//! - Tag names are stored lowercase.
//! - Appending or inserting a fragment moves its children and leaves the
//!   fragment empty.
//! - The `class` and `style` attributes are views over the class list and
//!   the style map.
//!
//! # Failure Modes
//!
//! | Situation | Behavior |
//! |-----------|----------|
//! | `insert_before` with a reference that is not a child | appends |
//! | removing a node that has no parent | no-op |
//! | reading a missing property | `undefined` |

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

use crate::object::ObjectRef;
use crate::value::{FunctionRef, Value};

/// Kind of host node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Element,
    Text,
    Comment,
    Fragment,
}

/// Event callback.
pub type EventListener = Rc<dyn Fn(&Event)>;

struct NodeInner {
    node_type: NodeType,
    name: Rc<str>,
    data: RefCell<String>,
    parent: RefCell<Weak<NodeInner>>,
    children: RefCell<Vec<Node>>,
    attributes: RefCell<Vec<(Rc<str>, Rc<str>)>>,
    classes: RefCell<Vec<Rc<str>>>,
    style: RefCell<Vec<(Rc<str>, Rc<str>)>>,
    properties: RefCell<FxHashMap<Rc<str>, Value>>,
    listeners: RefCell<Vec<(Rc<str>, EventListener)>>,
    observers: RefCell<FxHashMap<Rc<str>, Rc<dyn Any>>>,
}

/// A shared handle to a host node.
#[derive(Clone)]
pub struct Node(Rc<NodeInner>);

/// A non-owning handle to a [`Node`].
#[derive(Clone)]
pub struct WeakNode(Weak<NodeInner>);

impl WeakNode {
    #[must_use]
    pub fn upgrade(&self) -> Option<Node> {
        self.0.upgrade().map(Node)
    }
}

impl fmt::Debug for WeakNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(node) => write!(f, "WeakNode({node:?})"),
            None => f.write_str("WeakNode(<dropped>)"),
        }
    }
}

impl Node {
    fn create(node_type: NodeType, name: &str, data: &str) -> Self {
        Self(Rc::new(NodeInner {
            node_type,
            name: Rc::from(name),
            data: RefCell::new(data.to_owned()),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
            attributes: RefCell::new(Vec::new()),
            classes: RefCell::new(Vec::new()),
            style: RefCell::new(Vec::new()),
            properties: RefCell::new(FxHashMap::default()),
            listeners: RefCell::new(Vec::new()),
            observers: RefCell::new(FxHashMap::default()),
        }))
    }

    #[must_use]
    pub fn element(tag: &str) -> Self {
        Self::create(NodeType::Element, &tag.to_ascii_lowercase(), "")
    }

    #[must_use]
    pub fn text(data: &str) -> Self {
        Self::create(NodeType::Text, "#text", data)
    }

    #[must_use]
    pub fn comment(data: &str) -> Self {
        Self::create(NodeType::Comment, "#comment", data)
    }

    #[must_use]
    pub fn fragment() -> Self {
        Self::create(NodeType::Fragment, "#document-fragment", "")
    }

    // -- identity and predicates ---------------------------------------------

    #[must_use]
    pub fn node_type(&self) -> NodeType {
        self.0.node_type
    }

    #[must_use]
    pub fn is_element(&self) -> bool {
        self.0.node_type == NodeType::Element
    }

    #[must_use]
    pub fn is_text(&self) -> bool {
        self.0.node_type == NodeType::Text
    }

    #[must_use]
    pub fn is_comment(&self) -> bool {
        self.0.node_type == NodeType::Comment
    }

    #[must_use]
    pub fn is_fragment(&self) -> bool {
        self.0.node_type == NodeType::Fragment
    }

    /// Lowercase tag name for elements, `#text` / `#comment` /
    /// `#document-fragment` otherwise.
    #[must_use]
    pub fn node_name(&self) -> &str {
        &self.0.name
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakNode {
        WeakNode(Rc::downgrade(&self.0))
    }

    // -- tree ----------------------------------------------------------------

    #[must_use]
    pub fn parent(&self) -> Option<Node> {
        self.0.parent.borrow().upgrade().map(Node)
    }

    /// Snapshot of the child list.
    #[must_use]
    pub fn children(&self) -> Vec<Node> {
        self.0.children.borrow().clone()
    }

    #[must_use]
    pub fn child_count(&self) -> usize {
        self.0.children.borrow().len()
    }

    #[must_use]
    pub fn first_child(&self) -> Option<Node> {
        self.0.children.borrow().first().cloned()
    }

    #[must_use]
    pub fn last_child(&self) -> Option<Node> {
        self.0.children.borrow().last().cloned()
    }

    fn index_in_parent(&self) -> Option<(Node, usize)> {
        let parent = self.parent()?;
        let index = parent
            .0
            .children
            .borrow()
            .iter()
            .position(|c| c.ptr_eq(self))?;
        Some((parent, index))
    }

    #[must_use]
    pub fn next_sibling(&self) -> Option<Node> {
        let (parent, index) = self.index_in_parent()?;
        let sibling = parent.0.children.borrow().get(index + 1).cloned();
        sibling
    }

    #[must_use]
    pub fn previous_sibling(&self) -> Option<Node> {
        let (parent, index) = self.index_in_parent()?;
        let sibling = index
            .checked_sub(1)
            .and_then(|i| parent.0.children.borrow().get(i).cloned());
        sibling
    }

    /// Detach this node from its parent.
    pub fn remove(&self) {
        if let Some((parent, index)) = self.index_in_parent() {
            parent.0.children.borrow_mut().remove(index);
        }
        *self.0.parent.borrow_mut() = Weak::new();
    }

    /// Remove `child` if it is a child of this node.
    pub fn remove_child(&self, child: &Node) -> bool {
        let is_child = child.parent().is_some_and(|p| p.ptr_eq(self));
        if is_child {
            child.remove();
        }
        is_child
    }

    /// Nodes to insert for `node`: a fragment's children, or the node itself.
    fn take_insertables(node: &Node) -> Vec<Node> {
        if node.is_fragment() {
            let children = std::mem::take(&mut *node.0.children.borrow_mut());
            for child in &children {
                *child.0.parent.borrow_mut() = Weak::new();
            }
            children
        } else {
            node.remove();
            vec![node.clone()]
        }
    }

    pub fn append_child(&self, child: &Node) {
        self.insert_before(child, None);
    }

    /// Insert `child` before `reference` (or append when `None` or when the
    /// reference is not a child of this node).
    pub fn insert_before(&self, child: &Node, reference: Option<&Node>) {
        if child.ptr_eq(self) {
            return;
        }
        let nodes = Self::take_insertables(child);
        for node in &nodes {
            *node.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        }
        let mut children = self.0.children.borrow_mut();
        let at = reference
            .and_then(|r| children.iter().position(|c| c.ptr_eq(r)))
            .unwrap_or(children.len());
        children.splice(at..at, nodes);
    }

    /// Put `replacement` where this node is, detaching this node.
    pub fn replace_with(&self, replacement: &Node) {
        if let Some(parent) = self.parent() {
            parent.insert_before(replacement, Some(self));
            self.remove();
        }
    }

    /// Pre-order descendants (excluding this node).
    #[must_use]
    pub fn descendants(&self) -> Vec<Node> {
        let mut out = Vec::new();
        fn walk(node: &Node, out: &mut Vec<Node>) {
            for child in node.0.children.borrow().iter() {
                out.push(child.clone());
                walk(child, out);
            }
        }
        walk(self, &mut out);
        out
    }

    /// Pre-order descendant elements carrying `class`.
    #[must_use]
    pub fn query_class(&self, class: &str) -> Vec<Node> {
        self.descendants()
            .into_iter()
            .filter(|n| n.has_class(class))
            .collect()
    }

    /// Copy this node (and its subtree when `deep`). Listeners and observers
    /// are not copied.
    #[must_use]
    pub fn clone_node(&self, deep: bool) -> Node {
        let copy = Self::create(self.0.node_type, &self.0.name, &self.0.data.borrow());
        copy.0.attributes.borrow_mut().clone_from(&self.0.attributes.borrow());
        copy.0.classes.borrow_mut().clone_from(&self.0.classes.borrow());
        copy.0.style.borrow_mut().clone_from(&self.0.style.borrow());
        copy.0.properties.borrow_mut().clone_from(&self.0.properties.borrow());
        if deep {
            for child in self.0.children.borrow().iter() {
                copy.append_child(&child.clone_node(true));
            }
        }
        copy
    }

    // -- text ----------------------------------------------------------------

    /// Character data of a text or comment node.
    #[must_use]
    pub fn data(&self) -> String {
        self.0.data.borrow().clone()
    }

    pub fn set_data(&self, data: &str) {
        data.clone_into(&mut self.0.data.borrow_mut());
    }

    /// Concatenated text of all descendant text nodes.
    #[must_use]
    pub fn text_content(&self) -> String {
        match self.0.node_type {
            NodeType::Text | NodeType::Comment => self.data(),
            NodeType::Element | NodeType::Fragment => {
                let mut out = String::new();
                for node in self.descendants() {
                    if node.is_text() {
                        out.push_str(&node.0.data.borrow());
                    }
                }
                out
            }
        }
    }

    pub fn set_text_content(&self, text: &str) {
        match self.0.node_type {
            NodeType::Text | NodeType::Comment => self.set_data(text),
            NodeType::Element | NodeType::Fragment => {
                for child in self.children() {
                    child.remove();
                }
                if !text.is_empty() {
                    self.append_child(&Node::text(text));
                }
            }
        }
    }

    // -- attributes, classes, style ------------------------------------------

    #[must_use]
    pub fn get_attribute(&self, name: &str) -> Option<String> {
        match name {
            "class" => {
                let classes = self.0.classes.borrow();
                (!classes.is_empty()).then(|| classes.iter().map(|c| &**c).collect::<Vec<_>>().join(" "))
            }
            "style" => {
                let style = self.style_text();
                (!style.is_empty()).then_some(style)
            }
            _ => self
                .0
                .attributes
                .borrow()
                .iter()
                .find(|(k, _)| &**k == name)
                .map(|(_, v)| v.to_string()),
        }
    }

    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.get_attribute(name).is_some()
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        match name {
            "class" => {
                *self.0.classes.borrow_mut() = value.split_whitespace().map(Rc::from).collect();
            }
            "style" => {
                let mut style = self.0.style.borrow_mut();
                style.clear();
                for decl in value.split(';') {
                    if let Some((prop, val)) = decl.split_once(':') {
                        let prop = prop.trim();
                        if !prop.is_empty() {
                            style.push((Rc::from(prop), Rc::from(val.trim())));
                        }
                    }
                }
            }
            _ => {
                let mut attrs = self.0.attributes.borrow_mut();
                match attrs.iter_mut().find(|(k, _)| &**k == name) {
                    Some(slot) => slot.1 = Rc::from(value),
                    None => attrs.push((Rc::from(name), Rc::from(value))),
                }
            }
        }
    }

    pub fn remove_attribute(&self, name: &str) {
        match name {
            "class" => self.0.classes.borrow_mut().clear(),
            "style" => self.0.style.borrow_mut().clear(),
            _ => self.0.attributes.borrow_mut().retain(|(k, _)| &**k != name),
        }
    }

    /// Attribute names in insertion order (excluding `class` and `style`).
    #[must_use]
    pub fn attribute_names(&self) -> Vec<String> {
        self.0
            .attributes
            .borrow()
            .iter()
            .map(|(k, _)| k.to_string())
            .collect()
    }

    pub fn add_class(&self, class: &str) {
        let mut classes = self.0.classes.borrow_mut();
        if !classes.iter().any(|c| &**c == class) {
            classes.push(Rc::from(class));
        }
    }

    pub fn remove_class(&self, class: &str) {
        self.0.classes.borrow_mut().retain(|c| &**c != class);
    }

    #[must_use]
    pub fn has_class(&self, class: &str) -> bool {
        self.0.classes.borrow().iter().any(|c| &**c == class)
    }

    #[must_use]
    pub fn classes(&self) -> Vec<String> {
        self.0.classes.borrow().iter().map(|c| c.to_string()).collect()
    }

    pub fn set_style(&self, property: &str, value: &str) {
        let mut style = self.0.style.borrow_mut();
        match style.iter_mut().find(|(k, _)| &**k == property) {
            Some(slot) => slot.1 = Rc::from(value),
            None => style.push((Rc::from(property), Rc::from(value))),
        }
    }

    pub fn remove_style(&self, property: &str) {
        self.0.style.borrow_mut().retain(|(k, _)| &**k != property);
    }

    #[must_use]
    pub fn get_style(&self, property: &str) -> Option<String> {
        self.0
            .style
            .borrow()
            .iter()
            .find(|(k, _)| &**k == property)
            .map(|(_, v)| v.to_string())
    }

    /// Serialized `style` attribute (`a: b; c: d`).
    #[must_use]
    pub fn style_text(&self) -> String {
        self.0
            .style
            .borrow()
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    // -- properties ----------------------------------------------------------

    /// Read an element property. `textContent`, `nodeName` and `tagName` are
    /// computed; `value` defaults to `""` and `checked` to `false`.
    #[must_use]
    pub fn get_property(&self, name: &str) -> Value {
        match name {
            "textContent" => Value::from(self.text_content()),
            "nodeName" | "tagName" => Value::from(self.0.name.to_ascii_uppercase()),
            "className" => Value::from(self.get_attribute("class").unwrap_or_default()),
            _ => {
                let stored = self.0.properties.borrow().get(name).cloned();
                match (stored, name) {
                    (Some(v), _) => v,
                    (None, "value") => Value::str(""),
                    (None, "checked") => Value::Bool(false),
                    (None, _) => Value::Undefined,
                }
            }
        }
    }

    pub fn set_property(&self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        match name {
            "textContent" => self.set_text_content(&value.to_display_string()),
            "className" => self.set_attribute("class", &value.to_display_string()),
            _ => {
                self.0.properties.borrow_mut().insert(Rc::from(name), value);
            }
        }
    }

    // -- events --------------------------------------------------------------

    pub fn add_event_listener(&self, event_type: &str, listener: EventListener) {
        self.0
            .listeners
            .borrow_mut()
            .push((Rc::from(event_type), listener));
    }

    /// Remove a listener by identity.
    pub fn remove_event_listener(&self, event_type: &str, listener: &EventListener) -> bool {
        let mut listeners = self.0.listeners.borrow_mut();
        match listeners
            .iter()
            .position(|(t, l)| &**t == event_type && Rc::ptr_eq(l, listener))
        {
            Some(index) => {
                listeners.remove(index);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.0
            .listeners
            .borrow()
            .iter()
            .filter(|(t, _)| &**t == event_type)
            .count()
    }

    /// Dispatch a bubbling event of `event_type` at this node.
    pub fn dispatch_event(&self, event_type: &str) -> Event {
        let event = Event::new(event_type, self.clone(), Value::Undefined);
        self.dispatch(&event);
        event
    }

    /// Dispatch `event`: listeners on the target first, then each ancestor,
    /// until propagation is stopped.
    pub fn dispatch(&self, event: &Event) {
        let mut current = Some(self.clone());
        while let Some(node) = current {
            let listeners: Vec<EventListener> = node
                .0
                .listeners
                .borrow()
                .iter()
                .filter(|(t, _)| **t == *event.0.event_type)
                .map(|(_, l)| Rc::clone(l))
                .collect();
            *event.0.current_target.borrow_mut() = Some(node.clone());
            for listener in listeners {
                listener(event);
            }
            if event.0.propagation_stopped.get() || !event.0.bubbles {
                break;
            }
            current = node.parent();
        }
        *event.0.current_target.borrow_mut() = None;
    }

    // -- observer cache ------------------------------------------------------

    #[must_use]
    pub fn cached_observer(&self, key: &str) -> Option<Rc<dyn Any>> {
        self.0.observers.borrow().get(key).cloned()
    }

    pub fn cache_observer(&self, key: &str, observer: Rc<dyn Any>) -> Rc<dyn Any> {
        Rc::clone(
            self.0
                .observers
                .borrow_mut()
                .entry(Rc::from(key))
                .or_insert(observer),
        )
    }

    // -- serialization -------------------------------------------------------

    /// Serialize to markup (attributes in insertion order, `class` and
    /// `style` first).
    #[must_use]
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        match self.0.node_type {
            NodeType::Text => out.push_str(&self.0.data.borrow()),
            NodeType::Comment => {
                out.push_str("<!--");
                out.push_str(&self.0.data.borrow());
                out.push_str("-->");
            }
            NodeType::Fragment => {
                for child in self.0.children.borrow().iter() {
                    child.write_html(out);
                }
            }
            NodeType::Element => {
                out.push('<');
                out.push_str(&self.0.name);
                for name in ["class", "style"] {
                    if let Some(v) = self.get_attribute(name) {
                        out.push_str(&format!(" {name}=\"{v}\""));
                    }
                }
                for (k, v) in self.0.attributes.borrow().iter() {
                    out.push_str(&format!(" {k}=\"{v}\""));
                }
                out.push('>');
                for child in self.0.children.borrow().iter() {
                    child.write_html(out);
                }
                out.push_str("</");
                out.push_str(&self.0.name);
                out.push('>');
            }
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.node_type {
            NodeType::Element => write!(f, "<{}>", self.0.name),
            NodeType::Text => write!(f, "#text({:?})", self.0.data.borrow()),
            NodeType::Comment => write!(f, "<!--{}-->", self.0.data.borrow()),
            NodeType::Fragment => write!(f, "#fragment[{}]", self.child_count()),
        }
    }
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

struct EventInner {
    event_type: Rc<str>,
    target: Node,
    current_target: RefCell<Option<Node>>,
    detail: Value,
    bubbles: bool,
    default_prevented: Cell<bool>,
    propagation_stopped: Cell<bool>,
}

/// A dispatched host event.
#[derive(Clone)]
pub struct Event(Rc<EventInner>);

impl Event {
    /// A bubbling event.
    #[must_use]
    pub fn new(event_type: &str, target: Node, detail: Value) -> Self {
        Self(Rc::new(EventInner {
            event_type: Rc::from(event_type),
            target,
            current_target: RefCell::new(None),
            detail,
            bubbles: true,
            default_prevented: Cell::new(false),
            propagation_stopped: Cell::new(false),
        }))
    }

    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.0.event_type
    }

    #[must_use]
    pub fn target(&self) -> &Node {
        &self.0.target
    }

    /// The node whose listeners are currently running.
    #[must_use]
    pub fn current_target(&self) -> Option<Node> {
        self.0.current_target.borrow().clone()
    }

    #[must_use]
    pub fn detail(&self) -> &Value {
        &self.0.detail
    }

    pub fn prevent_default(&self) {
        self.0.default_prevented.set(true);
    }

    #[must_use]
    pub fn default_prevented(&self) -> bool {
        self.0.default_prevented.get()
    }

    pub fn stop_propagation(&self) {
        self.0.propagation_stopped.set(true);
    }

    /// Expose the event to expressions (`$event.target`, `$event.type`,
    /// `$event.preventDefault()`).
    #[must_use]
    pub fn to_value(&self) -> Value {
        let obj = ObjectRef::with_class("Event");
        obj.set("type", Value::String(Rc::clone(&self.0.event_type)));
        obj.set("target", Value::Node(self.0.target.clone()));
        obj.set("currentTarget", Value::from(self.current_target()));
        obj.set("detail", self.0.detail.clone());
        let event = self.clone();
        obj.set(
            "preventDefault",
            FunctionRef::new("preventDefault", move |_, _| {
                event.prevent_default();
                Value::Undefined
            }),
        );
        let event = self.clone();
        obj.set(
            "stopPropagation",
            FunctionRef::new("stopPropagation", move |_, _| {
                event.stop_propagation();
                Value::Undefined
            }),
        );
        Value::Object(obj)
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("type", &self.0.event_type)
            .field("target", &self.0.target)
            .field("default_prevented", &self.default_prevented())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_text_content() {
        let div = Node::element("DIV");
        div.append_child(&Node::text("a"));
        div.append_child(&Node::comment("skip"));
        let span = Node::element("span");
        span.append_child(&Node::text("b"));
        div.append_child(&span);
        assert_eq!(div.node_name(), "div");
        assert_eq!(div.text_content(), "ab");
        assert_eq!(div.to_html(), "<div>a<!--skip--><span>b</span></div>");
    }

    #[test]
    fn fragment_children_move_on_insert() {
        let frag = Node::fragment();
        frag.append_child(&Node::text("1"));
        frag.append_child(&Node::text("2"));
        let host = Node::element("div");
        let end = Node::comment("end");
        host.append_child(&end);
        host.insert_before(&frag, Some(&end));
        assert_eq!(frag.child_count(), 0);
        assert_eq!(host.child_count(), 3);
        assert_eq!(host.text_content(), "12");
        assert!(host.last_child().is_some_and(|n| n.ptr_eq(&end)));
    }

    #[test]
    fn reparenting_detaches_from_old_parent() {
        let a = Node::element("a");
        let b = Node::element("b");
        let t = Node::text("x");
        a.append_child(&t);
        b.append_child(&t);
        assert_eq!(a.child_count(), 0);
        assert!(t.parent().is_some_and(|p| p.ptr_eq(&b)));
    }

    #[test]
    fn siblings_and_replace() {
        let host = Node::element("div");
        let first = Node::text("1");
        let marker = Node::element("au-m");
        host.append_child(&first);
        host.append_child(&marker);
        assert!(first.next_sibling().is_some_and(|n| n.ptr_eq(&marker)));
        assert!(marker.previous_sibling().is_some_and(|n| n.ptr_eq(&first)));
        let replacement = Node::comment("au-loc");
        marker.replace_with(&replacement);
        assert!(marker.parent().is_none());
        assert!(first.next_sibling().is_some_and(|n| n.ptr_eq(&replacement)));
    }

    #[test]
    fn class_and_style_attributes() {
        let el = Node::element("div");
        el.set_attribute("class", "a  b");
        el.add_class("c");
        el.add_class("a");
        assert_eq!(el.get_attribute("class").as_deref(), Some("a b c"));
        el.set_attribute("style", "color: red; width:10px");
        assert_eq!(el.get_style("width").as_deref(), Some("10px"));
        el.set_style("color", "blue");
        assert_eq!(el.style_text(), "color: blue; width: 10px");
    }

    #[test]
    fn property_defaults() {
        let input = Node::element("input");
        assert_eq!(input.get_property("value"), Value::str(""));
        assert_eq!(input.get_property("checked"), Value::Bool(false));
        input.set_property("value", "hi");
        assert_eq!(input.get_property("value"), Value::str("hi"));
        assert_eq!(input.get_property("tagName"), Value::str("INPUT"));
    }

    #[test]
    fn events_bubble_and_stop() {
        let outer = Node::element("div");
        let inner = Node::element("button");
        outer.append_child(&inner);
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        inner.add_event_listener("click", Rc::new(move |e: &Event| {
            l.borrow_mut().push(format!("inner:{}", e.event_type()));
        }));
        let l = Rc::clone(&log);
        let outer_listener: EventListener = Rc::new(move |e: &Event| {
            let current = e.current_target().map(|n| n.node_name().to_owned());
            l.borrow_mut().push(format!("outer:{}", current.unwrap_or_default()));
            e.stop_propagation();
        });
        outer.add_event_listener("click", Rc::clone(&outer_listener));
        inner.dispatch_event("click");
        assert_eq!(*log.borrow(), vec!["inner:click", "outer:div"]);
        assert!(outer.remove_event_listener("click", &outer_listener));
        assert_eq!(outer.listener_count("click"), 0);
    }

    #[test]
    fn clone_node_deep_copies_tree_not_listeners() {
        let el = Node::element("p");
        el.add_class("au");
        el.append_child(&Node::text("t"));
        el.add_event_listener("x", Rc::new(|_| {}));
        let copy = el.clone_node(true);
        assert!(!copy.ptr_eq(&el));
        assert!(copy.has_class("au"));
        assert_eq!(copy.text_content(), "t");
        assert_eq!(copy.listener_count("x"), 0);
    }

    #[test]
    fn query_class_in_document_order() {
        let root = Node::element("div");
        let a = Node::element("a");
        a.add_class("au");
        let b = Node::element("b");
        b.add_class("au");
        let inner = Node::element("i");
        inner.add_class("au");
        a.append_child(&inner);
        root.append_child(&a);
        root.append_child(&b);
        let found = root.query_class("au");
        assert_eq!(found.len(), 3);
        assert!(found[0].ptr_eq(&a) && found[1].ptr_eq(&inner) && found[2].ptr_eq(&b));
    }

    #[test]
    fn event_value_exposes_prevent_default() {
        let el = Node::element("form");
        let event = Event::new("submit", el, Value::Undefined);
        let value = event.to_value();
        let obj = value.as_object().expect("object");
        let prevent = obj.get("preventDefault");
        prevent.as_function().expect("fn").call(&value, &[]);
        assert!(event.default_prevented());
        assert_eq!(obj.get("type"), Value::str("submit"));
    }
}
