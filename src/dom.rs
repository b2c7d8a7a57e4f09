//! The minimal DOM surface that claiming, reordering and hydrated insertion need.
//!
//! Nodes are referred to by small [`Copy`] handles, so that per-node metadata (like claim order)
//! can live in side tables instead of on the (externally owned) nodes themselves.

use crate::DomError;
use core::{fmt::Debug, hash::Hash};
use std::borrow::Cow;

/// The kinds of node that hydration distinguishes between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
	Element,
	Text,
	Comment,
	/// Document, doctype, fragment etc.
	Other,
}

/// A mutable node tree with identity-comparable node handles.
///
/// Element names are reported the way [***nodeName***](https://developer.mozilla.org/en-US/docs/Web/API/Node/nodeName)
/// does it for HTML documents, i.e. in upper case (`"DIV"`, `"HEAD"`), with `"#text"` and `"#comment"` for character data.
pub trait Dom {
	/// A cheap handle that identifies one node for the lifetime of this [`Dom`].
	type Node: Copy + Eq + Hash + Debug;

	fn kind(&self, node: Self::Node) -> NodeKind;
	fn node_name(&self, node: Self::Node) -> Cow<'_, str>;

	fn parent(&self, node: Self::Node) -> Option<Self::Node>;
	fn first_child(&self, node: Self::Node) -> Option<Self::Node>;
	fn next_sibling(&self, node: Self::Node) -> Option<Self::Node>;
	fn child_nodes(&self, parent: Self::Node) -> Vec<Self::Node>;

	/// Inserts (or moves) `node` into `parent` right before `anchor`, or at the end if `anchor` is [`None`].
	///
	/// # Errors
	///
	/// Iff `anchor` isn't a child of `parent` or the backend refuses the insertion.
	fn insert_before(&mut self, parent: Self::Node, node: Self::Node, anchor: Option<Self::Node>) -> Result<(), DomError>;

	/// # Errors
	///
	/// Iff `node` isn't a child of `parent`.
	fn remove_child(&mut self, parent: Self::Node, node: Self::Node) -> Result<(), DomError>;

	/// # Errors
	///
	/// Iff the backend can't create an element with this name.
	fn create_element(&mut self, name: &str) -> Result<Self::Node, DomError>;

	/// # Errors
	///
	/// Iff the backend can't create the text node.
	fn create_text(&mut self, data: &str) -> Result<Self::Node, DomError>;

	/// The data of a text or comment node, [`None`] for anything else.
	fn text_data(&self, node: Self::Node) -> Option<Cow<'_, str>>;

	/// # Errors
	///
	/// Iff `node` is neither text nor comment.
	fn set_text_data(&mut self, node: Self::Node, data: &str) -> Result<(), DomError>;

	/// Splits a text node at byte offset `at`, keeping the head in `node` and returning a new node with the tail.
	///
	/// If `node` has a parent, the new node is inserted right after it.
	///
	/// # Errors
	///
	/// Iff `node` is not a text node or `at` is not a character boundary within its data.
	fn split_text(&mut self, node: Self::Node, at: usize) -> Result<Self::Node, DomError>;

	/// Attribute names of an element in document order, empty for anything else.
	fn attribute_names(&self, node: Self::Node) -> Vec<String>;
	fn get_attribute(&self, node: Self::Node, name: &str) -> Option<String>;

	/// # Errors
	///
	/// Iff `node` is not an element or the backend rejects the attribute.
	fn set_attribute(&mut self, node: Self::Node, name: &str, value: &str) -> Result<(), DomError>;

	/// Removing an attribute that isn't present is not an error.
	///
	/// # Errors
	///
	/// Iff `node` is not an element.
	fn remove_attribute(&mut self, node: Self::Node, name: &str) -> Result<(), DomError>;

	/// # Errors
	///
	/// See [`Dom::insert_before`].
	fn append_child(&mut self, parent: Self::Node, node: Self::Node) -> Result<(), DomError> {
		self.insert_before(parent, node, None)
	}

	/// Removes `node` from its parent, if it has one.
	///
	/// # Errors
	///
	/// See [`Dom::remove_child`].
	fn detach(&mut self, node: Self::Node) -> Result<(), DomError> {
		match self.parent(node) {
			Some(parent) => self.remove_child(parent, node),
			None => Ok(()),
		}
	}

	/// Releases whatever this [`Dom`] keeps around for `node`. The handle must not be used afterwards.
	///
	/// If the same node is encountered again, it may be issued a new handle.
	fn forget(&mut self, node: Self::Node) {
		let _ = node;
	}
}
