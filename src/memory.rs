//! An arena-backed [`Dom`] for hosts without a browser, e.g. tests and server-side rendering.

use crate::{
	dom::{Dom, NodeKind},
	DomError,
};
use std::borrow::Cow;
use tracing::trace;

/// Handle to a node in a [`MemoryDom`]. Only meaningful for the [`MemoryDom`] that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemoryNode(usize);

#[derive(Debug)]
struct NodeData {
	kind: NodeKind,
	name: String,
	data: String,
	attributes: Vec<(String, String)>,
	parent: Option<MemoryNode>,
	children: Vec<MemoryNode>,
	forgotten: bool,
}

/// An in-memory node tree.
///
/// Every [`Dom::insert_before`] of a node that already had a parent is counted as a move,
/// which makes the cost of reconciliation observable.
///
/// # Panics
///
/// All methods taking a [`MemoryNode`] may panic if it was created by another [`MemoryDom`].
/// Forgotten nodes stay usable.
#[derive(Debug, Default)]
pub struct MemoryDom {
	nodes: Vec<NodeData>,
	moves: usize,
}

impl MemoryDom {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	fn push(&mut self, kind: NodeKind, name: String, data: String) -> MemoryNode {
		let node = MemoryNode(self.nodes.len());
		self.nodes.push(NodeData {
			kind,
			name,
			data,
			attributes: Vec::new(),
			parent: None,
			children: Vec::new(),
			forgotten: false,
		});
		node
	}

	/// Creates a detached node that's none of element, text or comment, to act as tree root.
	pub fn create_root(&mut self) -> MemoryNode {
		self.push(NodeKind::Other, "#document-fragment".to_owned(), String::new())
	}

	pub fn create_comment(&mut self, data: &str) -> MemoryNode {
		self.push(NodeKind::Comment, "#comment".to_owned(), data.to_owned())
	}

	/// Creates an element with the given attributes and appends it to `parent`.
	pub fn append_element(&mut self, parent: MemoryNode, name: &str, attributes: &[(&str, &str)]) -> MemoryNode {
		let element = self.push(NodeKind::Element, name.to_ascii_uppercase(), String::new());
		self.nodes[element.0].attributes = attributes.iter().map(|&(name, value)| (name.to_owned(), value.to_owned())).collect();
		self.attach(parent, element, None);
		element
	}

	/// Creates a text node and appends it to `parent`.
	pub fn append_text(&mut self, parent: MemoryNode, data: &str) -> MemoryNode {
		let text = self.push(NodeKind::Text, "#text".to_owned(), data.to_owned());
		self.attach(parent, text, None);
		text
	}

	/// How many already-attached nodes were relocated by [`Dom::insert_before`] so far.
	#[must_use]
	pub fn moves(&self) -> usize {
		self.moves
	}

	pub fn reset_moves(&mut self) {
		self.moves = 0
	}

	/// Whether [`Dom::forget`] was called for `node`. Forgotten nodes stay in the arena.
	#[must_use]
	pub fn is_forgotten(&self, node: MemoryNode) -> bool {
		self.nodes[node.0].forgotten
	}

	/// Serializes `node` and its descendants in an HTML-like notation. Attribute values and text are not escaped.
	#[must_use]
	pub fn outer_html(&self, node: MemoryNode) -> String {
		let mut html = String::new();
		self.write_html(node, &mut html);
		html
	}

	#[must_use]
	pub fn inner_html(&self, node: MemoryNode) -> String {
		let mut html = String::new();
		for &child in &self.nodes[node.0].children {
			self.write_html(child, &mut html)
		}
		html
	}

	fn write_html(&self, node: MemoryNode, html: &mut String) {
		let data = &self.nodes[node.0];
		match data.kind {
			NodeKind::Text => html.push_str(&data.data),
			NodeKind::Comment => html.push_str(&format!("<!--{}-->", data.data)),
			NodeKind::Element => {
				let name = data.name.to_ascii_lowercase();
				html.push_str(&format!("<{}", name));
				for (name, value) in &data.attributes {
					html.push_str(&format!(" {}=\"{}\"", name, value));
				}
				html.push('>');
				for &child in &data.children {
					self.write_html(child, html)
				}
				html.push_str(&format!("</{}>", name));
			}
			NodeKind::Other => {
				for &child in &data.children {
					self.write_html(child, html)
				}
			}
		}
	}

	fn attach(&mut self, parent: MemoryNode, node: MemoryNode, anchor: Option<MemoryNode>) {
		let siblings = &mut self.nodes[parent.0].children;
		let index = anchor.and_then(|anchor| siblings.iter().position(|&sibling| sibling == anchor)).unwrap_or(siblings.len());
		siblings.insert(index, node);
		self.nodes[node.0].parent = Some(parent);
	}

	fn unlink(&mut self, node: MemoryNode) -> Option<MemoryNode> {
		let parent = self.nodes[node.0].parent.take()?;
		self.nodes[parent.0].children.retain(|&child| child != node);
		Some(parent)
	}

	fn is_inclusive_ancestor(&self, ancestor: MemoryNode, mut node: MemoryNode) -> bool {
		loop {
			if node == ancestor {
				return true;
			}
			match self.nodes[node.0].parent {
				Some(parent) => node = parent,
				None => return false,
			}
		}
	}
}

impl Dom for MemoryDom {
	type Node = MemoryNode;

	fn kind(&self, node: MemoryNode) -> NodeKind {
		self.nodes[node.0].kind
	}

	fn node_name(&self, node: MemoryNode) -> Cow<'_, str> {
		Cow::Borrowed(&self.nodes[node.0].name)
	}

	fn parent(&self, node: MemoryNode) -> Option<MemoryNode> {
		self.nodes[node.0].parent
	}

	fn first_child(&self, node: MemoryNode) -> Option<MemoryNode> {
		self.nodes[node.0].children.first().copied()
	}

	fn next_sibling(&self, node: MemoryNode) -> Option<MemoryNode> {
		let parent = self.nodes[node.0].parent?;
		let siblings = &self.nodes[parent.0].children;
		let index = siblings.iter().position(|&sibling| sibling == node)?;
		siblings.get(index + 1).copied()
	}

	fn child_nodes(&self, parent: MemoryNode) -> Vec<MemoryNode> {
		self.nodes[parent.0].children.clone()
	}

	fn insert_before(&mut self, parent: MemoryNode, node: MemoryNode, anchor: Option<MemoryNode>) -> Result<(), DomError> {
		if let Some(anchor) = anchor {
			if self.nodes[anchor.0].parent != Some(parent) {
				return Err(DomError::NotAChild);
			}
			if anchor == node {
				return Ok(());
			}
		}
		if self.is_inclusive_ancestor(node, parent) {
			return Err(DomError::HierarchyRequest);
		}

		if self.unlink(node).is_some() {
			self.moves += 1;
			trace!(?node, ?parent, ?anchor, "Moved node.");
		}
		self.attach(parent, node, anchor);
		Ok(())
	}

	fn remove_child(&mut self, parent: MemoryNode, node: MemoryNode) -> Result<(), DomError> {
		if self.nodes[node.0].parent != Some(parent) {
			return Err(DomError::NotAChild);
		}
		self.unlink(node);
		Ok(())
	}

	fn create_element(&mut self, name: &str) -> Result<MemoryNode, DomError> {
		if name.is_empty() {
			return Err(DomError::Backend("empty element name".to_owned()));
		}
		Ok(self.push(NodeKind::Element, name.to_ascii_uppercase(), String::new()))
	}

	fn create_text(&mut self, data: &str) -> Result<MemoryNode, DomError> {
		Ok(self.push(NodeKind::Text, "#text".to_owned(), data.to_owned()))
	}

	fn text_data(&self, node: MemoryNode) -> Option<Cow<'_, str>> {
		let data = &self.nodes[node.0];
		match data.kind {
			NodeKind::Text | NodeKind::Comment => Some(Cow::Borrowed(&data.data)),
			NodeKind::Element | NodeKind::Other => None,
		}
	}

	fn set_text_data(&mut self, node: MemoryNode, data: &str) -> Result<(), DomError> {
		let node = &mut self.nodes[node.0];
		match node.kind {
			NodeKind::Text | NodeKind::Comment => {
				node.data.clear();
				node.data.push_str(data);
				Ok(())
			}
			NodeKind::Element | NodeKind::Other => Err(DomError::NotCharacterData),
		}
	}

	fn split_text(&mut self, node: MemoryNode, at: usize) -> Result<MemoryNode, DomError> {
		let data = &mut self.nodes[node.0];
		if data.kind != NodeKind::Text {
			return Err(DomError::NotCharacterData);
		}
		if !data.data.is_char_boundary(at) {
			return Err(DomError::InvalidOffset { offset: at, len: data.data.len() });
		}
		let tail = data.data.split_off(at);
		let parent = data.parent;

		let new_node = self.push(NodeKind::Text, "#text".to_owned(), tail);
		if let Some(parent) = parent {
			let anchor = self.next_sibling(node);
			self.attach(parent, new_node, anchor);
		}
		Ok(new_node)
	}

	fn attribute_names(&self, node: MemoryNode) -> Vec<String> {
		self.nodes[node.0].attributes.iter().map(|(name, _)| name.clone()).collect()
	}

	fn get_attribute(&self, node: MemoryNode, name: &str) -> Option<String> {
		self.nodes[node.0]
			.attributes
			.iter()
			.find(|(n, _)| n == name)
			.map(|(_, value)| value.clone())
	}

	fn set_attribute(&mut self, node: MemoryNode, name: &str, value: &str) -> Result<(), DomError> {
		let node = &mut self.nodes[node.0];
		if node.kind != NodeKind::Element {
			return Err(DomError::NotAnElement);
		}
		match node.attributes.iter_mut().find(|(n, _)| n == name) {
			Some((_, existing)) => *existing = value.to_owned(),
			None => node.attributes.push((name.to_owned(), value.to_owned())),
		}
		Ok(())
	}

	fn forget(&mut self, node: MemoryNode) {
		self.nodes[node.0].forgotten = true
	}

	fn remove_attribute(&mut self, node: MemoryNode, name: &str) -> Result<(), DomError> {
		let node = &mut self.nodes[node.0];
		if node.kind != NodeKind::Element {
			return Err(DomError::NotAnElement);
		}
		node.attributes.retain(|(n, _)| n != name);
		Ok(())
	}
}
