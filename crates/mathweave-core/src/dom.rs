//! Minimal host element tree.
//!
//! The math item lifecycle runs against a host document; this module models the
//! slice of one that the lifecycle needs: elements with tags, ordered attributes
//! and children, text nodes, a hidden flag standing in for visual suppression,
//! fragment parsing, and escaped serialization.
//!
//! A document built with [`Document::with_custom_elements`] additionally records
//! lifecycle reactions for defined tags (creation and attachment), which is the
//! feature the dual-mode runtime probes for. A plain [`Document::new`] document
//! records nothing and relies on manual upgrade walks.

use std::collections::HashSet;

use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use smol_str::SmolStr;

use crate::error::CoreError;

/// Index of a node in the document arena. Stable for the node's lifetime;
/// never reused after removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Lifecycle phase recorded for defined custom tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// The element was constructed.
    Created,
    /// The element became connected to the document.
    Attached,
}

/// One pending lifecycle reaction.
#[derive(Clone, Copy, Debug)]
pub struct Reaction {
    pub node: NodeId,
    pub phase: LifecyclePhase,
}

#[derive(Debug, Clone)]
struct ElementData {
    tag: SmolStr,
    attrs: Vec<(SmolStr, String)>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    hidden: bool,
}

#[derive(Debug, Clone)]
struct TextData {
    text: String,
    parent: Option<NodeId>,
}

#[derive(Debug, Clone)]
enum Slot {
    Element(ElementData),
    Text(TextData),
    Free,
}

struct CustomElements {
    defined: HashSet<SmolStr>,
    reactions: Vec<Reaction>,
    notifier: Option<std::rc::Rc<dyn Fn()>>,
}

/// The host document: an arena of element and text nodes under a single root.
pub struct Document {
    nodes: Vec<Slot>,
    root: NodeId,
    custom: Option<CustomElements>,
}

const EMPTY_CHILDREN: &[NodeId] = &[];

impl Document {
    /// A document without custom-element support (simulated-binding host).
    pub fn new() -> Self {
        Self::build(None)
    }

    /// A document that records lifecycle reactions for defined tags
    /// (native-binding host).
    pub fn with_custom_elements() -> Self {
        Self::build(Some(CustomElements {
            defined: HashSet::new(),
            reactions: Vec::new(),
            notifier: None,
        }))
    }

    fn build(custom: Option<CustomElements>) -> Self {
        let root_data = ElementData {
            tag: SmolStr::new_static("document"),
            attrs: Vec::new(),
            children: Vec::new(),
            parent: None,
            hidden: false,
        };
        Self {
            nodes: vec![Slot::Element(root_data)],
            root: NodeId(0),
            custom,
        }
    }

    /// Parse a markup fragment into a fresh document (no custom-element
    /// support), appended under the root.
    pub fn from_fragment(markup: &str) -> Result<Self, CoreError> {
        let mut doc = Self::new();
        let root = doc.root();
        doc.append_fragment(root, markup)?;
        Ok(doc)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn supports_custom_elements(&self) -> bool {
        self.custom.is_some()
    }

    /// Register a tag for lifecycle reactions. Existing elements with that tag
    /// are upgraded: a creation reaction each, plus an attachment reaction for
    /// connected ones, in document order. No-op without custom-element support.
    pub fn define(&mut self, tag: &str) {
        let already = match &mut self.custom {
            None => return,
            Some(custom) => !custom.defined.insert(SmolStr::new(tag)),
        };
        if already {
            return;
        }
        for el in self.elements_by_tag(tag) {
            self.record(el, LifecyclePhase::Created);
            if self.is_connected(el) {
                self.record(el, LifecyclePhase::Attached);
            }
        }
    }

    /// Install the callback invoked whenever the reaction queue becomes
    /// non-empty. The callback must not touch the document; it is expected to
    /// schedule a drain on the event loop.
    pub fn set_reaction_notifier(&mut self, notifier: std::rc::Rc<dyn Fn()>) {
        if let Some(custom) = &mut self.custom {
            custom.notifier = Some(notifier);
        }
    }

    /// Drain all pending lifecycle reactions.
    pub fn take_reactions(&mut self) -> Vec<Reaction> {
        match &mut self.custom {
            Some(custom) => std::mem::take(&mut custom.reactions),
            None => Vec::new(),
        }
    }

    fn record(&mut self, node: NodeId, phase: LifecyclePhase) {
        let Some(tag) = self.tag(node).map(SmolStr::new) else {
            return;
        };
        let notifier = {
            let Some(custom) = &mut self.custom else {
                return;
            };
            if !custom.defined.contains(&tag) {
                return;
            }
            let was_empty = custom.reactions.is_empty();
            custom.reactions.push(Reaction { node, phase });
            if was_empty {
                custom.notifier.clone()
            } else {
                None
            }
        };
        if let Some(notify) = notifier {
            notify();
        }
    }

    pub fn create_element(&mut self, tag: impl Into<SmolStr>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Slot::Element(ElementData {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
            parent: None,
            hidden: false,
        }));
        self.record(id, LifecyclePhase::Created);
        id
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Slot::Text(TextData {
            text: text.into(),
            parent: None,
        }));
        id
    }

    /// Append `child` as the last child of `parent`, detaching it from any
    /// previous parent first. Records attachment reactions for defined tags in
    /// the appended subtree when `parent` is connected.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(old) = self.parent(child) {
            if let Some(Slot::Element(data)) = self.nodes.get_mut(old.0) {
                data.children.retain(|&c| c != child);
            }
        }
        match self.nodes.get_mut(child.0) {
            Some(Slot::Element(data)) => data.parent = Some(parent),
            Some(Slot::Text(data)) => data.parent = Some(parent),
            _ => return,
        }
        if let Some(Slot::Element(data)) = self.nodes.get_mut(parent.0) {
            data.children.push(child);
        }
        if self.custom.is_some() && self.is_connected(parent) {
            for el in self.subtree_elements(child) {
                self.record(el, LifecyclePhase::Attached);
            }
        }
    }

    /// Remove `child` from `parent` and free its whole subtree.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(Slot::Element(data)) = self.nodes.get_mut(parent.0) {
            data.children.retain(|&c| c != child);
        }
        self.free(child);
    }

    fn free(&mut self, node: NodeId) {
        let children = self.children(node).to_vec();
        for c in children {
            self.free(c);
        }
        if let Some(slot) = self.nodes.get_mut(node.0) {
            *slot = Slot::Free;
        }
    }

    /// Whether the node is still alive (not removed).
    pub fn contains(&self, node: NodeId) -> bool {
        !matches!(self.nodes.get(node.0), Some(Slot::Free) | None)
    }

    /// Whether the node is reachable from the document root.
    pub fn is_connected(&self, node: NodeId) -> bool {
        let mut cur = node;
        loop {
            if cur == self.root {
                return true;
            }
            match self.parent(cur) {
                Some(p) => cur = p,
                None => return false,
            }
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        match self.nodes.get(node.0) {
            Some(Slot::Element(data)) => data.parent,
            Some(Slot::Text(data)) => data.parent,
            _ => None,
        }
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        matches!(self.nodes.get(node.0), Some(Slot::Element(_)))
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match self.nodes.get(node.0) {
            Some(Slot::Element(data)) => Some(data.tag.as_str()),
            _ => None,
        }
    }

    /// Text content of a text node.
    pub fn text(&self, node: NodeId) -> Option<&str> {
        match self.nodes.get(node.0) {
            Some(Slot::Text(data)) => Some(data.text.as_str()),
            _ => None,
        }
    }

    pub fn attr(&self, el: NodeId, name: &str) -> Option<&str> {
        match self.nodes.get(el.0) {
            Some(Slot::Element(data)) => data
                .attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    /// Attributes of an element, in authored order.
    pub fn attrs(&self, el: NodeId) -> &[(SmolStr, String)] {
        match self.nodes.get(el.0) {
            Some(Slot::Element(data)) => &data.attrs,
            _ => &[],
        }
    }

    pub fn set_attr(&mut self, el: NodeId, name: impl Into<SmolStr>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(Slot::Element(data)) = self.nodes.get_mut(el.0) {
            if let Some(entry) = data.attrs.iter_mut().find(|(k, _)| *k == name) {
                entry.1 = value;
            } else {
                data.attrs.push((name, value));
            }
        }
    }

    pub fn has_class(&self, el: NodeId, class: &str) -> bool {
        self.attr(el, "class")
            .map(|list| list.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        match self.nodes.get(node.0) {
            Some(Slot::Element(data)) => &data.children,
            _ => EMPTY_CHILDREN,
        }
    }

    pub fn child_elements(&self, node: NodeId) -> Vec<NodeId> {
        self.children(node)
            .iter()
            .copied()
            .filter(|&c| self.is_element(c))
            .collect()
    }

    pub fn set_hidden(&mut self, node: NodeId, hidden: bool) {
        if let Some(Slot::Element(data)) = self.nodes.get_mut(node.0) {
            data.hidden = hidden;
        }
    }

    pub fn is_hidden(&self, node: NodeId) -> bool {
        match self.nodes.get(node.0) {
            Some(Slot::Element(data)) => data.hidden,
            _ => false,
        }
    }

    /// Concatenated text of all descendant text nodes.
    pub fn inner_text(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        if let Some(text) = self.text(node) {
            out.push_str(text);
        }
        for &c in self.children(node) {
            self.collect_text(c, out);
        }
    }

    /// Serialized markup of the node's children.
    pub fn inner_markup(&self, node: NodeId) -> String {
        let mut out = String::new();
        for &c in self.children(node) {
            self.write_node(c, &mut out);
        }
        out
    }

    /// Serialized markup of the node itself.
    pub fn outer_markup(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_node(node, &mut out);
        out
    }

    fn write_node(&self, node: NodeId, out: &mut String) {
        match self.nodes.get(node.0) {
            Some(Slot::Text(data)) => out.push_str(&escape(data.text.as_str())),
            Some(Slot::Element(data)) => {
                out.push('<');
                out.push_str(&data.tag);
                for (name, value) in &data.attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape(value.as_str()));
                    out.push('"');
                }
                out.push('>');
                for &c in &data.children {
                    self.write_node(c, out);
                }
                out.push_str("</");
                out.push_str(&data.tag);
                out.push('>');
            }
            _ => {}
        }
    }

    /// Replace the node's children with a single text node.
    pub fn set_text_content(&mut self, el: NodeId, text: impl Into<String>) {
        for c in self.children(el).to_vec() {
            self.remove_child(el, c);
        }
        let t = self.create_text(text);
        self.append_child(el, t);
    }

    /// Parse a markup fragment and append its top-level nodes under `parent`.
    /// Returns the top-level node ids in document order.
    pub fn append_fragment(
        &mut self,
        parent: NodeId,
        markup: &str,
    ) -> Result<Vec<NodeId>, CoreError> {
        let mut reader = Reader::from_str(markup);
        let mut stack: Vec<NodeId> = vec![parent];
        let mut top = Vec::new();
        loop {
            match reader.read_event() {
                Err(err) => return Err(CoreError::MalformedMarkup(err.to_string())),
                Ok(Event::Start(start)) => {
                    let el = self.parse_element(&start)?;
                    let cur = *stack.last().unwrap_or(&parent);
                    self.append_child(cur, el);
                    if stack.len() == 1 {
                        top.push(el);
                    }
                    stack.push(el);
                }
                Ok(Event::Empty(start)) => {
                    let el = self.parse_element(&start)?;
                    let cur = *stack.last().unwrap_or(&parent);
                    self.append_child(cur, el);
                    if stack.len() == 1 {
                        top.push(el);
                    }
                }
                Ok(Event::End(_)) => {
                    if stack.len() <= 1 {
                        return Err(CoreError::MalformedMarkup(
                            "end tag without matching start tag".into(),
                        ));
                    }
                    stack.pop();
                }
                Ok(Event::Text(t)) => {
                    let text = t
                        .unescape()
                        .map_err(|err| CoreError::MalformedMarkup(err.to_string()))?;
                    if !text.is_empty() {
                        let node = self.create_text(text.into_owned());
                        let cur = *stack.last().unwrap_or(&parent);
                        self.append_child(cur, node);
                        if stack.len() == 1 {
                            top.push(node);
                        }
                    }
                }
                Ok(Event::CData(c)) => {
                    let text = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    let node = self.create_text(text);
                    let cur = *stack.last().unwrap_or(&parent);
                    self.append_child(cur, node);
                    if stack.len() == 1 {
                        top.push(node);
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
            }
        }
        if stack.len() != 1 {
            return Err(CoreError::MalformedMarkup("unclosed element".into()));
        }
        Ok(top)
    }

    fn parse_element(
        &mut self,
        start: &quick_xml::events::BytesStart<'_>,
    ) -> Result<NodeId, CoreError> {
        let tag = std::str::from_utf8(start.name().as_ref())
            .map_err(|err| CoreError::MalformedMarkup(err.to_string()))?
            .to_string();
        let el = self.create_element(SmolStr::new(tag));
        for attr in start.attributes() {
            let attr = attr.map_err(|err| CoreError::MalformedMarkup(err.to_string()))?;
            let name = std::str::from_utf8(attr.key.as_ref())
                .map_err(|err| CoreError::MalformedMarkup(err.to_string()))?
                .to_string();
            let value = attr
                .unescape_value()
                .map_err(|err| CoreError::MalformedMarkup(err.to_string()))?
                .into_owned();
            self.set_attr(el, SmolStr::new(name), value);
        }
        Ok(el)
    }

    /// Deep-copy `node` (and its subtree) under `new_parent`.
    pub fn clone_into(&mut self, node: NodeId, new_parent: NodeId) -> Option<NodeId> {
        match self.nodes.get(node.0).cloned() {
            Some(Slot::Element(data)) => {
                let copy = self.create_element(data.tag.clone());
                for (name, value) in &data.attrs {
                    self.set_attr(copy, name.clone(), value.clone());
                }
                self.set_hidden(copy, data.hidden);
                for c in data.children {
                    self.clone_into(c, copy);
                }
                self.append_child(new_parent, copy);
                Some(copy)
            }
            Some(Slot::Text(data)) => {
                let copy = self.create_text(data.text);
                self.append_child(new_parent, copy);
                Some(copy)
            }
            _ => None,
        }
    }

    /// Deep-copy all children of `from` under `to`.
    pub fn clone_children(&mut self, from: NodeId, to: NodeId) {
        for c in self.children(from).to_vec() {
            self.clone_into(c, to);
        }
    }

    /// All elements in the subtree rooted at `node` (including `node` when it
    /// is an element), preorder.
    pub fn subtree_elements(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            if self.is_element(n) {
                out.push(n);
            }
            for &c in self.children(n).iter().rev() {
                stack.push(c);
            }
        }
        out
    }

    /// Elements with the given tag, document order.
    pub fn elements_by_tag(&self, tag: &str) -> Vec<NodeId> {
        self.subtree_elements(self.root)
            .into_iter()
            .filter(|&el| self.tag(el) == Some(tag))
            .collect()
    }

    /// Elements carrying the given class, document order.
    pub fn elements_by_class(&self, class: &str) -> Vec<NodeId> {
        self.subtree_elements(self.root)
            .into_iter()
            .filter(|&el| self.has_class(el, class))
            .collect()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_round_trips_through_serialization() {
        let doc = Document::from_fragment(r#"<eq class="math-ui"><math><mi>x</mi></math></eq>"#)
            .expect("parse failed");
        let eq = doc.elements_by_class("math-ui")[0];
        assert_eq!(
            doc.inner_markup(eq),
            "<math><mi>x</mi></math>".to_string()
        );
        assert_eq!(
            doc.outer_markup(eq),
            r#"<eq class="math-ui"><math><mi>x</mi></math></eq>"#
        );
    }

    #[test]
    fn text_is_escaped_on_serialization() {
        let mut doc = Document::new();
        let root = doc.root();
        let el = doc.create_element("x");
        doc.append_child(root, el);
        doc.set_text_content(el, "a < b & c");
        assert_eq!(doc.outer_markup(el), "<x>a &lt; b &amp; c</x>");
    }

    #[test]
    fn malformed_fragment_is_an_error() {
        assert!(Document::from_fragment("<a><b></a>").is_err());
        assert!(Document::from_fragment("<a>").is_err());
    }

    #[test]
    fn defined_tags_record_reactions_in_document_order() {
        let mut doc = Document::with_custom_elements();
        let root = doc.root();
        doc.append_fragment(root, "<math-item></math-item><math-item></math-item>")
            .expect("parse failed");
        doc.define("math-item");
        let reactions = doc.take_reactions();
        // two elements, created + attached each
        assert_eq!(reactions.len(), 4);
        assert_eq!(reactions[0].phase, LifecyclePhase::Created);
        assert_eq!(reactions[1].phase, LifecyclePhase::Attached);
        assert!(doc.take_reactions().is_empty());
    }

    #[test]
    fn appending_a_defined_element_records_creation_and_attachment() {
        let mut doc = Document::with_custom_elements();
        doc.define("math-source");
        let root = doc.root();
        let el = doc.create_element("math-source");
        doc.append_child(root, el);
        let phases: Vec<_> = doc.take_reactions().iter().map(|r| r.phase).collect();
        assert_eq!(
            phases,
            vec![LifecyclePhase::Created, LifecyclePhase::Attached]
        );
    }

    #[test]
    fn undefined_tags_record_nothing() {
        let mut doc = Document::with_custom_elements();
        doc.define("math-item");
        let root = doc.root();
        let el = doc.create_element("div");
        doc.append_child(root, el);
        assert!(doc.take_reactions().is_empty());
    }

    #[test]
    fn removal_frees_the_subtree() {
        let mut doc = Document::new();
        let root = doc.root();
        let top = doc
            .append_fragment(root, "<a><b><c></c></b></a>")
            .expect("parse failed")[0];
        let b = doc.children(top)[0];
        doc.remove_child(root, top);
        assert!(!doc.contains(top));
        assert!(!doc.contains(b));
    }
}
