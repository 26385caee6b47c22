//! Detached, index-addressed HTML tree used as the conversion working copy.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Removing a node only
//! unlinks it from its parent, so handles collected before a mutation stay valid
//! and can be checked with [`DocumentTree::is_attached`].

mod parse;
mod serialize;

use std::fmt;

pub const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";
pub const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";
pub const MATHML_NAMESPACE: &str = "http://www.w3.org/1998/Math/MathML";
pub const XLINK_NAMESPACE: &str = "http://www.w3.org/1999/xlink";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Html,
    Svg,
    MathMl,
}

impl Namespace {
    pub fn from_uri(uri: &str) -> Self {
        match uri {
            SVG_NAMESPACE => Self::Svg,
            MATHML_NAMESPACE => Self::MathMl,
            _ => Self::Html,
        }
    }

    pub const fn uri(self) -> &'static str {
        match self {
            Self::Html => HTML_NAMESPACE,
            Self::Svg => SVG_NAMESPACE,
            Self::MathMl => MATHML_NAMESPACE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub namespace: Namespace,
    attrs: Vec<(String, String)>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_namespace(name, Namespace::Html)
    }

    pub fn with_namespace(name: impl Into<String>, namespace: Namespace) -> Self {
        Self {
            name: name.into(),
            namespace,
            attrs: Vec::new(),
        }
    }

    /// Case-insensitive tag name check.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = value,
            None => self.attrs.push((name, value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let index = self.attrs.iter().position(|(key, _)| key == name)?;
        Some(self.attrs.remove(index).1)
    }

    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or_default().split_ascii_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|candidate| candidate == class)
    }

    pub fn add_class(&mut self, class: &str) {
        if self.has_class(class) {
            return;
        }
        let joined = match self.attr("class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {class}", existing.trim()),
            _ => class.to_string(),
        };
        self.set_attr("class", joined);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Element(Element),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct DocumentTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl DocumentTree {
    /// Create an empty tree whose root is an HTML element named `container`.
    pub fn new(container: &str) -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Element(Element::new(container)),
                parent: None,
                children: Vec::new(),
            }],
            root: NodeId(0),
        }
    }

    /// Parse an HTML fragment into a fresh tree rooted at `container`.
    pub fn from_fragment(container: &str, html: &str) -> Self {
        let mut tree = Self::new(container);
        let root = tree.root;
        tree.append_html(root, html);
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0].data
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.0].data {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes[id.0].data {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].data {
            NodeData::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn set_text(&mut self, id: NodeId, value: impl Into<String>) {
        if let NodeData::Text(text) = &mut self.nodes[id.0].data {
            *text = value.into();
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|element| element.attr(name))
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        if let Some(element) = self.element_mut(id) {
            element.set_attr(name, value);
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> Option<String> {
        self.element_mut(id)
            .and_then(|element| element.remove_attr(name))
    }

    pub fn is_element(&self, id: NodeId, name: &str) -> bool {
        self.element(id).is_some_and(|element| element.is(name))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].children.first().copied()
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].children.last().copied()
    }

    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |current| self.parent(*current))
    }

    /// Whether the node is still reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        id == self.root || self.ancestors(id).any(|ancestor| ancestor == self.root)
    }

    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.push(NodeData::Element(Element::new(name)))
    }

    pub fn create_element_ns(&mut self, name: &str, namespace: Namespace) -> NodeId {
        self.push(NodeData::Element(Element::with_namespace(name, namespace)))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeData::Text(text.into()))
    }

    pub fn create_comment(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeData::Comment(text.into()))
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) {
        let first = self.first_child(parent);
        self.insert_before(parent, child, first);
    }

    /// Insert `child` before `reference`, or at the end when there is no reference.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        self.detach(child);
        let index = reference
            .and_then(|reference| self.index_in_parent(parent, reference))
            .unwrap_or(self.nodes[parent.0].children.len());
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(index, child);
    }

    /// Put `replacement` where `old` was. Returns false when `old` has no parent.
    pub fn replace(&mut self, old: NodeId, replacement: NodeId) -> bool {
        let Some(parent) = self.parent(old) else {
            return false;
        };
        self.detach(replacement);
        let Some(index) = self.index_in_parent(parent, old) else {
            return false;
        };
        self.nodes[parent.0].children[index] = replacement;
        self.nodes[replacement.0].parent = Some(parent);
        self.nodes[old.0].parent = None;
        true
    }

    /// Unlink a node from its parent. Detached nodes are left as they are.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|child| *child != id);
        }
    }

    /// Remove a node (and its subtree) from the document.
    pub fn remove(&mut self, id: NodeId) {
        if id != self.root {
            self.detach(id);
        }
    }

    fn index_in_parent(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.nodes[parent.0]
            .children
            .iter()
            .position(|candidate| *candidate == child)
    }

    /// Move every child of `from` to the end of `to`.
    pub fn move_children(&mut self, from: NodeId, to: NodeId) {
        let children = std::mem::take(&mut self.nodes[from.0].children);
        for child in children {
            self.nodes[child.0].parent = Some(to);
            self.nodes[to.0].children.push(child);
        }
    }

    /// Deep-copy a subtree of this tree. The copy starts detached.
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        let data = self.nodes[id.0].data.clone();
        let copy = self.push(data);
        let children = self.nodes[id.0].children.clone();
        for child in children {
            let child_copy = self.clone_subtree(child);
            self.append_child(copy, child_copy);
        }
        copy
    }

    /// Append deep copies of the children of `from` to `to`.
    pub fn append_child_copies(&mut self, from: NodeId, to: NodeId) {
        let children = self.nodes[from.0].children.clone();
        for child in children {
            let copy = self.clone_subtree(child);
            self.append_child(to, copy);
        }
    }

    /// Deep-copy a subtree from another tree. The copy starts detached.
    pub fn import_subtree(&mut self, source: &DocumentTree, id: NodeId) -> NodeId {
        let copy = self.push(source.data(id).clone());
        for child in source.children(id) {
            let child_copy = self.import_subtree(source, *child);
            self.append_child(copy, child_copy);
        }
        copy
    }

    /// Parse `html` as a fragment and append the resulting nodes to `parent`.
    pub fn append_html(&mut self, parent: NodeId, html: &str) {
        parse::append_fragment(self, parent, html);
    }

    /// Concatenated text of the subtree.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id.0].data {
            NodeData::Text(text) => out.push_str(text),
            NodeData::Element(_) => {
                for child in &self.nodes[id.0].children {
                    self.collect_text(*child, out);
                }
            }
            NodeData::Comment(_) => {}
        }
    }

    /// Replace all children of `id` with a single text node.
    pub fn set_text_content(&mut self, id: NodeId, text: impl Into<String>) {
        let children = std::mem::take(&mut self.nodes[id.0].children);
        for child in children {
            self.nodes[child.0].parent = None;
        }
        let text = self.create_text(text);
        self.append_child(id, text);
    }

    /// Descendants of `scope` in document order, excluding `scope` itself.
    pub fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(scope).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// Element descendants of `scope` matching `predicate`, in document order.
    pub fn select<F>(&self, scope: NodeId, predicate: F) -> Vec<NodeId>
    where
        F: Fn(&Element) -> bool,
    {
        self.descendants(scope)
            .into_iter()
            .filter(|id| self.element(*id).is_some_and(&predicate))
            .collect()
    }

    pub fn select_first<F>(&self, scope: NodeId, predicate: F) -> Option<NodeId>
    where
        F: Fn(&Element) -> bool,
    {
        self.descendants(scope)
            .into_iter()
            .find(|id| self.element(*id).is_some_and(&predicate))
    }

    pub fn outer_html(&self, id: NodeId) -> String {
        serialize::outer_html(self, id)
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        serialize::inner_html(self, id)
    }

    /// XML serialization of a subtree, as used for standalone SVG documents.
    pub fn to_xml(&self, id: NodeId) -> String {
        serialize::to_xml(self, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DocumentTree {
        DocumentTree::from_fragment(
            "div",
            r#"<p class="lead intro">Hello <a class="internal-link" href="Note">Note</a></p><ul><li>One</li><li>Two</li></ul>"#,
        )
    }

    #[test]
    fn parses_fragment_under_container() {
        let tree = sample();
        let root = tree.root();
        assert_eq!(tree.children(root).len(), 2);
        assert!(tree.is_element(tree.children(root)[0], "p"));
        assert_eq!(tree.text_content(root), "Hello NoteOneTwo");
    }

    #[test]
    fn select_matches_classes_in_document_order() {
        let tree = sample();
        let items = tree.select(tree.root(), |el| el.is("li"));
        assert_eq!(items.len(), 2);
        assert_eq!(tree.text_content(items[0]), "One");
        let lead = tree.select_first(tree.root(), |el| el.has_class("intro"));
        assert!(lead.is_some());
    }

    #[test]
    fn replace_keeps_position_and_detaches_old() {
        let mut tree = sample();
        let link = tree
            .select_first(tree.root(), |el| el.has_class("internal-link"))
            .expect("link present");
        let span = tree.create_element("span");
        let text = tree.create_text("Note");
        tree.append_child(span, text);
        assert!(tree.replace(link, span));
        assert!(!tree.is_attached(link));
        assert_eq!(
            tree.outer_html(tree.root()),
            r#"<div><p class="lead intro">Hello <span>Note</span></p><ul><li>One</li><li>Two</li></ul></div>"#
        );
    }

    #[test]
    fn remove_is_tolerant_of_detached_nodes() {
        let mut tree = sample();
        let list = tree
            .select_first(tree.root(), |el| el.is("ul"))
            .expect("list present");
        tree.remove(list);
        tree.remove(list);
        let item = tree.children(list)[0];
        assert!(!tree.is_attached(item));
        assert!(tree.select(tree.root(), |el| el.is("li")).is_empty());
    }

    #[test]
    fn clone_subtree_is_independent() {
        let mut tree = sample();
        let list = tree
            .select_first(tree.root(), |el| el.is("ul"))
            .expect("list present");
        let copy = tree.clone_subtree(list);
        let root = tree.root();
        tree.append_child(root, copy);
        let first_copy_item = tree.children(copy)[0];
        tree.set_text_content(first_copy_item, "Uno");
        assert_eq!(tree.text_content(list), "OneTwo");
        assert_eq!(tree.text_content(copy), "UnoTwo");
    }

    #[test]
    fn add_class_does_not_duplicate() {
        let mut element = Element::new("a");
        element.add_class("footnote-link");
        element.add_class("footnote-link");
        assert_eq!(element.attr("class"), Some("footnote-link"));
    }
}
