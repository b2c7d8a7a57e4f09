//! Browser bindings: a [`Dom`] over live `web_sys` nodes, event listeners
//! and a [`Microtask`] queue on the JavaScript event loop.

use crate::{
	dom::{Dom, NodeKind},
	microtask::Microtask,
	scheduler::{hook, Hook},
	DomError,
};
use core::{
	cell::{Cell, RefCell},
	convert::TryInto,
	fmt,
};
use hashbrown::HashMap;
use js_sys::Map;
use std::borrow::Cow;
use tracing::{error, instrument, trace};
use wasm_bindgen::{closure::Closure, JsCast, JsValue, UnwrapThrowExt};

/// Handle to a live DOM node, issued by one [`WebDom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WebNode(u32);

/// Attached to a [***Document***](https://developer.mozilla.org/en-US/docs/Web/API/Document),
/// this hands out stable [`WebNode`] handles for the nodes it encounters.
///
/// Handles are assigned through a [***Map***](https://developer.mozilla.org/en-US/docs/Web/JavaScript/Reference/Global_Objects/Map)
/// keyed by node identity, so the nodes themselves are never modified.
/// Nodes stay referenced until their handle is [forgotten](`Dom::forget`) or the [`WebDom`] is dropped.
#[derive(Debug)]
pub struct WebDom {
	document: web_sys::Document,
	nodes: RefCell<HashMap<u32, web_sys::Node>>,
	next_id: Cell<u32>,
	ids: Map,
}

fn backend_error(error: JsValue) -> DomError {
	DomError::Backend(format!("{:?}", error))
}

impl WebDom {
	#[must_use]
	pub fn new(document: web_sys::Document) -> Self {
		Self {
			document,
			nodes: RefCell::new(HashMap::new()),
			next_id: Cell::new(0),
			ids: Map::new(),
		}
	}

	/// Attaches to the current window's document, if there is one.
	#[must_use]
	pub fn for_window() -> Option<Self> {
		web_sys::window()?.document().map(Self::new)
	}

	#[must_use]
	pub fn document(&self) -> &web_sys::Document {
		&self.document
	}

	/// The handle for `node`, issuing a new one on first sight.
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	pub fn node(&self, node: &web_sys::Node) -> WebNode {
		if let Some(id) = self.ids.get(node.as_ref()).as_f64() {
			return WebNode(id as u32);
		}

		let id = WebNode(self.next_id.get());
		self.next_id.set(id.0.checked_add(1).expect_throw("claim-dom: Too many (more than 4G) node handles"));
		self.nodes.borrow_mut().insert(id.0, node.clone());
		self.ids.set(node.as_ref(), &JsValue::from(id.0));
		trace!(?id, "Issued node handle.");
		id
	}

	/// How many nodes currently have a handle.
	#[must_use]
	pub fn handle_count(&self) -> usize {
		self.nodes.borrow().len()
	}

	/// # Panics
	///
	/// Iff `node` was issued by another [`WebDom`] or has been [forgotten](`Dom::forget`).
	#[must_use]
	pub fn get(&self, node: WebNode) -> web_sys::Node {
		self.nodes
			.borrow()
			.get(&node.0)
			.cloned()
			.expect_throw("claim-dom: Forgotten `WebNode` or `WebNode` from another `WebDom`")
	}

	fn element(&self, node: WebNode) -> Result<web_sys::Element, DomError> {
		self.get(node).dyn_into::<web_sys::Element>().map_err(|_| DomError::NotAnElement)
	}

	fn character_data(&self, node: WebNode) -> Result<web_sys::CharacterData, DomError> {
		self.get(node).dyn_into::<web_sys::CharacterData>().map_err(|_| DomError::NotCharacterData)
	}
}

impl Dom for WebDom {
	type Node = WebNode;

	fn kind(&self, node: WebNode) -> NodeKind {
		match self.get(node).node_type() {
			web_sys::Node::ELEMENT_NODE => NodeKind::Element,
			web_sys::Node::TEXT_NODE => NodeKind::Text,
			web_sys::Node::COMMENT_NODE => NodeKind::Comment,
			_ => NodeKind::Other,
		}
	}

	fn node_name(&self, node: WebNode) -> Cow<'_, str> {
		Cow::Owned(self.get(node).node_name())
	}

	fn parent(&self, node: WebNode) -> Option<WebNode> {
		self.get(node).parent_node().map(|parent| self.node(&parent))
	}

	fn first_child(&self, node: WebNode) -> Option<WebNode> {
		self.get(node).first_child().map(|child| self.node(&child))
	}

	fn next_sibling(&self, node: WebNode) -> Option<WebNode> {
		self.get(node).next_sibling().map(|sibling| self.node(&sibling))
	}

	fn child_nodes(&self, parent: WebNode) -> Vec<WebNode> {
		let child_nodes = self.get(parent).child_nodes();
		(0..child_nodes.length()).filter_map(|i| child_nodes.get(i)).map(|child| self.node(&child)).collect()
	}

	fn insert_before(&mut self, parent: WebNode, node: WebNode, anchor: Option<WebNode>) -> Result<(), DomError> {
		let anchor = anchor.map(|anchor| self.get(anchor));
		self.get(parent).insert_before(&self.get(node), anchor.as_ref()).map(drop).map_err(backend_error)
	}

	fn remove_child(&mut self, parent: WebNode, node: WebNode) -> Result<(), DomError> {
		let node = self.get(node);
		let parent = self.get(parent);
		if node.parent_node().as_ref() != Some(&parent) {
			return Err(DomError::NotAChild);
		}
		parent.remove_child(&node).map(drop).map_err(backend_error)
	}

	fn create_element(&mut self, name: &str) -> Result<WebNode, DomError> {
		let element = self.document.create_element(name).map_err(backend_error)?;
		Ok(self.node(element.as_ref()))
	}

	fn create_text(&mut self, data: &str) -> Result<WebNode, DomError> {
		let text = self.document.create_text_node(data);
		Ok(self.node(text.as_ref()))
	}

	fn text_data(&self, node: WebNode) -> Option<Cow<'_, str>> {
		self.character_data(node).ok().map(|data| Cow::Owned(data.data()))
	}

	fn set_text_data(&mut self, node: WebNode, data: &str) -> Result<(), DomError> {
		self.character_data(node)?.set_data(data);
		Ok(())
	}

	fn split_text(&mut self, node: WebNode, at: usize) -> Result<WebNode, DomError> {
		let text = self.get(node).dyn_into::<web_sys::Text>().map_err(|_| DomError::NotCharacterData)?;
		let data = text.data();
		let head = data.get(..at).ok_or(DomError::InvalidOffset { offset: at, len: data.len() })?;
		// DOM offsets count UTF-16 code units.
		let offset: u32 = head
			.encode_utf16()
			.count()
			.try_into()
			.map_err(|_| DomError::InvalidOffset { offset: at, len: data.len() })?;
		let tail = text.split_text(offset).map_err(backend_error)?;
		Ok(self.node(tail.as_ref()))
	}

	fn attribute_names(&self, node: WebNode) -> Vec<String> {
		match self.element(node) {
			Ok(element) => {
				let attributes = element.attributes();
				(0..attributes.length()).filter_map(|i| attributes.item(i)).map(|attribute| attribute.name()).collect()
			}
			Err(_) => Vec::new(),
		}
	}

	fn get_attribute(&self, node: WebNode, name: &str) -> Option<String> {
		self.element(node).ok()?.get_attribute(name)
	}

	fn set_attribute(&mut self, node: WebNode, name: &str, value: &str) -> Result<(), DomError> {
		self.element(node)?.set_attribute(name, value).map_err(backend_error)
	}

	fn remove_attribute(&mut self, node: WebNode, name: &str) -> Result<(), DomError> {
		self.element(node)?.remove_attribute(name).map_err(backend_error)
	}

	fn forget(&mut self, node: WebNode) {
		if let Some(forgotten) = self.nodes.borrow_mut().remove(&node.0) {
			self.ids.delete(forgotten.as_ref());
			trace!(?node, "Forgot node handle.");
		}
	}
}

/// Options for [`WebDom::listen`], as accepted by
/// [***addEventListener***](https://developer.mozilla.org/en-US/docs/Web/API/EventTarget/addEventListener).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ListenerOptions {
	pub capture: bool,
	pub once: bool,
	pub passive: bool,
}

/// An event listener added through [`WebDom::listen`]. Dropping it removes the listener.
#[must_use = "Dropping a `Listener` removes it right away."]
pub struct Listener {
	target: web_sys::EventTarget,
	event: String,
	capture: bool,
	handler: Closure<dyn FnMut(web_sys::Event)>,
}
impl fmt::Debug for Listener {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Listener")
			.field("event", &self.event)
			.field("capture", &self.capture)
			.finish_non_exhaustive()
	}
}
impl Listener {
	/// Turns this listener into a teardown [`Hook`] that removes it, e.g. to return from an on-mount hook.
	pub fn into_hook(self) -> Hook {
		let listener = RefCell::new(Some(self));
		hook(move |_| drop(listener.borrow_mut().take()))
	}
}
impl Drop for Listener {
	fn drop(&mut self) {
		match self
			.target
			.remove_event_listener_with_callback_and_bool(&self.event, self.handler.as_ref().unchecked_ref(), self.capture)
		{
			Ok(()) => trace!(event = self.event.as_str(), "Removed event listener."),
			Err(error) => error!(event = self.event.as_str(), ?error, "Failed to remove event listener."),
		}
	}
}

impl WebDom {
	/// Adds `handler` as `event` listener to `node`. The listener stays until the returned [`Listener`] is dropped.
	///
	/// # Errors
	///
	/// Iff the browser refuses to add the listener.
	#[instrument(skip(self, handler))]
	pub fn listen(&self, node: WebNode, event: &str, options: ListenerOptions, handler: impl FnMut(web_sys::Event) + 'static) -> Result<Listener, DomError> {
		let target: web_sys::EventTarget = self.get(node).into();
		let handler = Closure::wrap(Box::new(handler) as Box<dyn FnMut(web_sys::Event)>);

		let mut web_options = web_sys::AddEventListenerOptions::new();
		web_options.capture(options.capture).once(options.once).passive(options.passive);
		target
			.add_event_listener_with_callback_and_add_event_listener_options(event, handler.as_ref().unchecked_ref(), &web_options)
			.map_err(backend_error)?;
		trace!("Added event listener.");

		Ok(Listener {
			target,
			event: event.to_owned(),
			capture: options.capture,
			handler,
		})
	}
}

/// Runs tasks as promise continuations, i.e. at the next microtask checkpoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebMicrotasks;
impl Microtask for WebMicrotasks {
	fn queue(&self, task: Box<dyn FnOnce()>) {
		wasm_bindgen_futures::spawn_local(async move { task() })
	}
}
