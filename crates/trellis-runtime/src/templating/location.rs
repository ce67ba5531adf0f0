#![forbid(unsafe_code)]

//! Where views go, and the nodes a view owns.

use std::fmt;

use trellis_core::Node;

/// A pair of `au-start`/`au-end` comments marking a slot in the host tree.
/// Views held at a location are inserted before its end comment.
#[derive(Clone)]
pub struct RenderLocation {
    start: Node,
    end: Node,
}

impl RenderLocation {
    /// A detached location.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Node::comment("au-start"),
            end: Node::comment("au-end"),
        }
    }

    /// A location occupying `marker`'s place. The marker is removed.
    #[must_use]
    pub fn replace(marker: &Node) -> Self {
        let location = Self::new();
        if let Some(parent) = marker.parent() {
            parent.insert_before(&location.start, Some(marker));
            marker.replace_with(&location.end);
        }
        location
    }

    #[must_use]
    pub fn start(&self) -> &Node {
        &self.start
    }

    /// The node views are inserted before.
    #[must_use]
    pub fn anchor(&self) -> &Node {
        &self.end
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.end.parent().is_some()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.end.ptr_eq(&other.end)
    }
}

impl Default for RenderLocation {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RenderLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderLocation")
            .field("connected", &self.is_connected())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// NodeSequence
// ---------------------------------------------------------------------------

/// The top-level nodes of a rendered template.
///
/// While unmounted the nodes live in the sequence's own fragment. Once
/// mounted they are siblings in the host tree, delimited by `first` and
/// `last`; anything inserted between them (a nested view at an inner
/// location) moves with them.
pub struct NodeSequence {
    fragment: Node,
    first: Option<Node>,
    last: Option<Node>,
}

impl NodeSequence {
    /// Take ownership of `fragment`'s current children.
    #[must_use]
    pub fn from_fragment(fragment: Node) -> Self {
        let first = fragment.first_child();
        let last = fragment.last_child();
        Self { fragment, first, last }
    }

    #[must_use]
    pub fn first(&self) -> Option<&Node> {
        self.first.as_ref()
    }

    #[must_use]
    pub fn last(&self) -> Option<&Node> {
        self.last.as_ref()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.first.is_none()
    }

    /// The nodes, in order, wherever they currently are.
    #[must_use]
    pub fn nodes(&self) -> Vec<Node> {
        let (Some(first), Some(last)) = (&self.first, &self.last) else {
            return Vec::new();
        };
        let mut out = vec![first.clone()];
        let mut current = first.clone();
        while !current.ptr_eq(last) {
            match current.next_sibling() {
                Some(next) => {
                    out.push(next.clone());
                    current = next;
                }
                None => break,
            }
        }
        out
    }

    /// Whether the nodes are in the host tree rather than the fragment.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.first
            .as_ref()
            .and_then(Node::parent)
            .is_some_and(|p| !p.ptr_eq(&self.fragment))
    }

    /// Insert the nodes before `anchor`, moving them if already mounted.
    pub fn insert_before(&self, anchor: &Node) {
        let Some(parent) = anchor.parent() else {
            return;
        };
        if self.is_mounted() {
            for node in self.nodes() {
                parent.insert_before(&node, Some(anchor));
            }
        } else {
            parent.insert_before(&self.fragment, Some(anchor));
        }
    }

    /// Append the nodes to `host`.
    pub fn append_to(&self, host: &Node) {
        if self.is_mounted() {
            for node in self.nodes() {
                host.append_child(&node);
            }
        } else {
            host.append_child(&self.fragment);
        }
    }

    /// Move the nodes back into the fragment. Returns `false` if they were
    /// not mounted.
    pub fn remove(&self) -> bool {
        if !self.is_mounted() {
            return false;
        }
        for node in self.nodes() {
            self.fragment.append_child(&node);
        }
        true
    }
}

impl fmt::Debug for NodeSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSequence")
            .field("len", &self.nodes().len())
            .field("mounted", &self.is_mounted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_with_marker() -> (Node, Node) {
        let host = Node::element("div");
        let marker = Node::element("au-m");
        host.append_child(&Node::text("a"));
        host.append_child(&marker);
        host.append_child(&Node::text("z"));
        (host, marker)
    }

    fn sequence(texts: &[&str]) -> NodeSequence {
        let fragment = Node::fragment();
        for t in texts {
            fragment.append_child(&Node::text(t));
        }
        NodeSequence::from_fragment(fragment)
    }

    #[test]
    fn location_replaces_marker_with_comment_pair() {
        let (host, marker) = host_with_marker();
        let location = RenderLocation::replace(&marker);
        assert!(marker.parent().is_none());
        assert!(location.is_connected());
        assert_eq!(host.to_html(), "<div>a<!--au-start--><!--au-end-->z</div>");
    }

    #[test]
    fn mount_unmount_and_move() {
        let (host, marker) = host_with_marker();
        let location = RenderLocation::replace(&marker);
        let one = sequence(&["1", "2"]);
        let two = sequence(&["3"]);
        one.insert_before(location.anchor());
        two.insert_before(location.anchor());
        assert_eq!(host.text_content(), "a123z");
        assert!(one.is_mounted());

        one.insert_before(location.anchor());
        assert_eq!(host.text_content(), "a312z");

        assert!(two.remove());
        assert!(!two.remove());
        assert_eq!(host.text_content(), "a12z");
        two.insert_before(one.first().expect("first"));
        assert_eq!(host.text_content(), "a312z");
    }

    #[test]
    fn empty_sequence_is_inert() {
        let seq = sequence(&[]);
        let host = Node::element("div");
        seq.append_to(&host);
        assert!(seq.is_empty());
        assert!(!seq.remove());
        assert_eq!(host.child_count(), 0);
    }
}
