use indexmap::IndexMap;
use thiserror::Error;

use crate::parser;
use crate::selector::{SelectorError, SelectorList};

/// Elements that never have children or an end tag.
pub(crate) const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr",
];

/// Elements whose content is kept as raw text.
pub(crate) const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Handle to a node inside the [`Document`] that created it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Errors raised by document mutations.
#[derive(Debug, Error)]
pub enum DomError {
    #[error("node {0:?} is not an element")]
    NotAnElement(NodeId),
    #[error("cannot insert node {child:?} into its own subtree at {parent:?}")]
    HierarchyRequest { parent: NodeId, child: NodeId },
    #[error(transparent)]
    Selector(#[from] SelectorError),
}

/// Tag name plus attributes in source order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub attributes: IndexMap<String, String>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attributes: IndexMap::new(),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|candidate| candidate == class)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attribute("class").unwrap_or_default().split_ascii_whitespace()
    }

    pub fn is_void(&self) -> bool {
        VOID_ELEMENTS.contains(&self.tag.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeData {
    Document,
    Element(Element),
    Text(String),
    Comment(String),
}

#[derive(Clone, Debug)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed document tree.
///
/// Nodes are never freed; detached subtrees simply become unreachable from
/// the root. A page view is short-lived, so the arena only grows by the
/// fragments swapped in during that view.
#[derive(Clone, Debug)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Document,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    /// Parse a full page (or any markup) into a new document.
    pub fn parse(markup: &str) -> Self {
        let mut document = Self::new();
        let root = document.root();
        for node in parser::parse_fragment(&mut document, markup) {
            document.attach(root, node, None);
        }
        document
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub(crate) fn push_node(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.node(id).data
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.node(id).data {
            NodeData::Element(element) => Some(element),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut Element, DomError> {
        match &mut self.node_mut(id).data {
            NodeData::Element(element) => Ok(element),
            _ => Err(DomError::NotAnElement(id)),
        }
    }

    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|element| element.tag.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id).iter().copied().filter(|child| self.element(*child).is_some())
    }

    /// Iterates `id` and then each of its ancestors up to the root.
    pub fn ancestors_inclusive(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(id), move |current| self.parent(*current))
    }

    /// Whether `id` is reachable from the document root.
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.ancestors_inclusive(id).any(|node| node == self.root())
    }

    /// Descendants of `id` in tree order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id).and_then(|element| element.attribute(name))
    }

    pub fn has_attribute(&self, id: NodeId, name: &str) -> bool {
        self.attribute(id, name).is_some()
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: impl Into<String>) -> Result<(), DomError> {
        self.element_mut(id)?
            .attributes
            .insert(name.to_ascii_lowercase(), value.into());
        Ok(())
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<(), DomError> {
        self.element_mut(id)?.attributes.shift_remove(name);
        Ok(())
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.element(id).is_some_and(|element| element.has_class(class))
    }

    /// Reads a `data-*` attribute, e.g. `dataset(id, "page")` for `data-page`.
    pub fn dataset(&self, id: NodeId, key: &str) -> Option<&str> {
        self.attribute(id, &format!("data-{key}"))
    }

    pub fn is_disabled(&self, id: NodeId) -> bool {
        self.has_attribute(id, "disabled")
    }

    pub fn set_disabled(&mut self, id: NodeId, disabled: bool) -> Result<(), DomError> {
        if disabled {
            self.set_attribute(id, "disabled", "")
        } else {
            self.remove_attribute(id, "disabled")
        }
    }

    /// Current value of a form control.
    ///
    /// The `value` attribute doubles as the live value of inputs; textareas
    /// use their text. A select reports its last selected option, or its first
    /// option when none is selected.
    pub fn value(&self, id: NodeId) -> Option<String> {
        match self.tag_name(id)? {
            "textarea" => Some(self.text_content(id)),
            "select" => {
                let options: Vec<NodeId> = self
                    .descendants(id)
                    .into_iter()
                    .filter(|node| self.tag_name(*node) == Some("option"))
                    .collect();
                let chosen = options
                    .iter()
                    .rev()
                    .find(|option| self.has_attribute(**option, "selected"))
                    .or_else(|| options.first())?;
                Some(self.option_value(*chosen))
            }
            "option" => Some(self.option_value(id)),
            _ => Some(self.attribute(id, "value").unwrap_or_default().to_string()),
        }
    }

    pub(crate) fn option_value(&self, option: NodeId) -> String {
        self.attribute(option, "value")
            .map(str::to_string)
            .unwrap_or_else(|| self.text_content(option).trim().to_string())
    }

    pub fn set_value(&mut self, id: NodeId, value: impl Into<String>) -> Result<(), DomError> {
        if self.tag_name(id) == Some("textarea") {
            self.set_text_content(id, value);
            return Ok(());
        }
        self.set_attribute(id, "value", value)
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push_node(NodeData::Element(Element::new(tag)))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push_node(NodeData::Text(text.into()))
    }

    fn attach(&mut self, parent: NodeId, child: NodeId, at: Option<usize>) {
        self.node_mut(child).parent = Some(parent);
        let children = &mut self.node_mut(parent).children;
        match at {
            Some(index) => {
                let index = index.min(children.len());
                children.insert(index, child);
            }
            None => children.push(child),
        }
    }

    /// Removes `id` from its parent, keeping the subtree intact.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.node(id).parent {
            self.node_mut(parent).children.retain(|child| *child != id);
            self.node_mut(id).parent = None;
        }
    }

    fn check_hierarchy(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        if self.ancestors_inclusive(parent).any(|node| node == child) {
            return Err(DomError::HierarchyRequest { parent, child });
        }
        if matches!(self.node(parent).data, NodeData::Text(_) | NodeData::Comment(_)) {
            return Err(DomError::NotAnElement(parent));
        }
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.check_hierarchy(parent, child)?;
        self.detach(child);
        self.attach(parent, child, None);
        Ok(())
    }

    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.check_hierarchy(parent, child)?;
        self.detach(child);
        self.attach(parent, child, Some(0));
        Ok(())
    }

    pub fn text_content(&self, id: NodeId) -> String {
        match &self.node(id).data {
            NodeData::Text(text) => text.clone(),
            NodeData::Comment(_) => String::new(),
            _ => self
                .descendants(id)
                .into_iter()
                .filter_map(|node| match &self.node(node).data {
                    NodeData::Text(text) => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }

    /// Replaces all children of `id` with a single text node.
    pub fn set_text_content(&mut self, id: NodeId, text: impl Into<String>) {
        if let NodeData::Text(existing) = &mut self.node_mut(id).data {
            *existing = text.into();
            return;
        }
        self.clear_children(id);
        let text_node = self.create_text(text);
        self.attach(id, text_node, None);
    }

    fn clear_children(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.node_mut(id).children);
        for child in children {
            self.node_mut(child).parent = None;
        }
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        let raw = self
            .tag_name(id)
            .is_some_and(|tag| RAW_TEXT_ELEMENTS.contains(&tag));
        for child in self.children(id) {
            self.serialize_into(*child, raw, &mut out);
        }
        out
    }

    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.serialize_into(id, false, &mut out);
        out
    }

    /// Replaces the children of `id` with the parsed `markup`.
    ///
    /// The old children are detached before the new ones are attached, so the
    /// overwrite is complete. Returns the inserted top-level nodes.
    pub fn set_inner_html(&mut self, id: NodeId, markup: &str) -> Result<Vec<NodeId>, DomError> {
        if matches!(self.node(id).data, NodeData::Text(_) | NodeData::Comment(_)) {
            return Err(DomError::NotAnElement(id));
        }
        let inserted = match self.tag_name(id) {
            Some(tag) if RAW_TEXT_ELEMENTS.contains(&tag) => vec![self.create_text(markup)],
            _ => parser::parse_fragment(self, markup),
        };
        self.clear_children(id);
        for node in &inserted {
            self.attach(id, *node, None);
        }
        Ok(inserted)
    }

    fn serialize_into(&self, id: NodeId, raw_text: bool, out: &mut String) {
        match &self.node(id).data {
            NodeData::Document => {
                for child in self.children(id) {
                    self.serialize_into(*child, false, out);
                }
            }
            NodeData::Text(text) if raw_text => out.push_str(text),
            NodeData::Text(text) => out.push_str(&escape_text(text)),
            NodeData::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(comment);
                out.push_str("-->");
            }
            NodeData::Element(element) => {
                out.push('<');
                out.push_str(&element.tag);
                for (name, value) in &element.attributes {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_attribute(value));
                    out.push('"');
                }
                out.push('>');
                if element.is_void() {
                    return;
                }
                let raw = RAW_TEXT_ELEMENTS.contains(&element.tag.as_str());
                for child in self.children(id) {
                    self.serialize_into(*child, raw, out);
                }
                out.push_str("</");
                out.push_str(&element.tag);
                out.push('>');
            }
        }
    }

    pub fn get_element_by_id(&self, element_id: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .find(|node| self.attribute(*node, "id") == Some(element_id))
    }

    pub fn matches(&self, id: NodeId, selector: &SelectorList) -> bool {
        selector.matches(self, id)
    }

    /// First descendant of `scope` matching `selector`, in tree order.
    pub fn query_selector(&self, scope: NodeId, selector: &str) -> Result<Option<NodeId>, SelectorError> {
        let selector: SelectorList = selector.parse()?;
        Ok(self.select_first(scope, &selector))
    }

    pub fn query_selector_all(&self, scope: NodeId, selector: &str) -> Result<Vec<NodeId>, SelectorError> {
        let selector: SelectorList = selector.parse()?;
        Ok(self.select_all(scope, &selector))
    }

    pub fn select_first(&self, scope: NodeId, selector: &SelectorList) -> Option<NodeId> {
        self.descendants(scope)
            .into_iter()
            .find(|node| selector.matches(self, *node))
    }

    pub fn select_all(&self, scope: NodeId, selector: &SelectorList) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|node| selector.matches(self, *node))
            .collect()
    }

    /// Nearest inclusive ancestor of `id` matching `selector`.
    pub fn closest(&self, id: NodeId, selector: &SelectorList) -> Option<NodeId> {
        self.ancestors_inclusive(id).find(|node| selector.matches(self, *node))
    }
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attribute(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;")
}
