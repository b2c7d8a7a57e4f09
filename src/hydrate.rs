//! Hydrated mounting: claiming server-rendered children and inserting nodes without disturbing ones
//! that are already where they belong.

use crate::{
	claim::{ClaimList, ClaimTable},
	dom::Dom,
	reorder::reorder_claimed_children,
	DomError,
};
use hashbrown::{HashMap, HashSet};
use tracing::{debug, instrument, trace};

/// Owns a [`Dom`] together with the claim state of one hydration.
#[derive(Debug)]
pub struct Hydrator<D: Dom> {
	dom: D,
	claims: ClaimTable<D::Node>,
	hydrating: bool,
	/// Containers whose claimed children were already reordered during the current hydration.
	reordered: HashSet<D::Node>,
	/// Per container: the first child that hydrated appends haven't passed yet. [`None`] means the end.
	actual_end_child: HashMap<D::Node, Option<D::Node>>,
}

impl<D: Dom> Hydrator<D> {
	#[must_use]
	pub fn new(dom: D) -> Self {
		Self {
			dom,
			claims: ClaimTable::new(),
			hydrating: false,
			reordered: HashSet::new(),
			actual_end_child: HashMap::new(),
		}
	}

	#[must_use]
	pub fn dom(&self) -> &D {
		&self.dom
	}

	pub fn dom_mut(&mut self) -> &mut D {
		&mut self.dom
	}

	#[must_use]
	pub fn into_dom(self) -> D {
		self.dom
	}

	#[must_use]
	pub fn claims(&self) -> &ClaimTable<D::Node> {
		&self.claims
	}

	pub fn start_hydrating(&mut self) {
		debug!("Hydration started.");
		self.hydrating = true
	}

	/// Ends hydration. Later inserts behave like plain (non-hydrating) mounts,
	/// and a later hydration reorders each container again.
	pub fn end_hydrating(&mut self) {
		debug!(claimed = self.claims.len(), reordered_containers = self.reordered.len(), "Hydration ended.");
		self.hydrating = false;
		self.reordered.clear();
		self.actual_end_child.clear();
	}

	#[must_use]
	pub fn is_hydrating(&self) -> bool {
		self.hydrating
	}

	/// Whether the claimed children of `container` were already reordered during the current hydration.
	#[must_use]
	pub fn is_reordered(&self, container: D::Node) -> bool {
		self.reordered.contains(&container)
	}

	/// Snapshots the current children of `parent` for claiming.
	#[must_use]
	pub fn children(&self, parent: D::Node) -> ClaimList<D::Node> {
		ClaimList::from_children(&self.dom, parent)
	}

	/// Runs a component's claim pass over the children of `target`, then detaches whatever wasn't claimed.
	///
	/// Hydration stays active afterwards, so that the following mount can use [`Hydrator::insert_hydration`].
	/// Call [`Hydrator::end_hydrating`] once that's done.
	///
	/// # Errors
	///
	/// Iff `claim` fails, in which case no nodes are detached.
	#[instrument(skip(self, claim))]
	pub fn claim_children<R>(&mut self, target: D::Node, claim: impl FnOnce(&mut Self, &mut ClaimList<D::Node>) -> Result<R, DomError>) -> Result<R, DomError> {
		self.start_hydrating();
		let mut nodes = self.children(target);
		let result = claim(self, &mut nodes)?;
		nodes.detach_remaining(&mut self.dom);
		Ok(result)
	}

	/// # Errors
	///
	/// See [`ClaimList::claim_element`].
	pub fn claim_element(&mut self, nodes: &mut ClaimList<D::Node>, name: &str, attributes: &[&str]) -> Result<D::Node, DomError> {
		nodes.claim_element(&mut self.dom, &mut self.claims, name, attributes)
	}

	/// # Errors
	///
	/// See [`ClaimList::claim_text`].
	pub fn claim_text(&mut self, nodes: &mut ClaimList<D::Node>, data: &str) -> Result<D::Node, DomError> {
		nodes.claim_text(&mut self.dom, &mut self.claims, data)
	}

	/// # Errors
	///
	/// See [`ClaimList::claim_text`].
	pub fn claim_space(&mut self, nodes: &mut ClaimList<D::Node>) -> Result<D::Node, DomError> {
		nodes.claim_space(&mut self.dom, &mut self.claims)
	}

	fn reorder_once(&mut self, target: D::Node) {
		if self.reordered.insert(target) {
			let moves = reorder_claimed_children(&mut self.dom, &self.claims, target);
			debug!(?target, moves, "Reordered claimed children.");
		}
	}

	/// Appends `node` to `target`.
	///
	/// While hydrating, the claimed children of `target` are first reordered (once per container),
	/// after which `node` is only moved if it isn't already next in line.
	/// Otherwise, `node` is only moved if it isn't already the last child of `target`.
	///
	/// # Errors
	///
	/// Iff the insertion fails.
	#[instrument(skip(self))]
	pub fn append_hydration(&mut self, target: D::Node, node: D::Node) -> Result<(), DomError> {
		if !self.hydrating {
			return if self.dom.parent(node) != Some(target) || self.dom.next_sibling(node).is_some() {
				self.dom.append_child(target, node)
			} else {
				trace!("Already in place.");
				Ok(())
			};
		}

		self.reorder_once(target);

		let mut end = match self.actual_end_child.get(&target).copied() {
			None => self.dom.first_child(target),
			Some(Some(end)) if self.dom.parent(end) != Some(target) => self.dom.first_child(target),
			Some(end) => end,
		};
		// Nodes of undefined order (only expected in `<head>`) are stepped over.
		while let Some(unordered) = end.filter(|&end| !self.claims.is_claimed(end)) {
			end = self.dom.next_sibling(unordered);
		}

		if Some(node) == end {
			trace!("Already next in line.");
			end = self.dom.next_sibling(node);
		} else if self.claims.is_claimed(node) || self.dom.parent(node) != Some(target) {
			self.dom.insert_before(target, node, end)?;
		}
		self.actual_end_child.insert(target, end);
		Ok(())
	}

	/// Inserts `node` into `target` before `anchor`, deferring to [`Hydrator::append_hydration`]
	/// for anchorless inserts during hydration.
	///
	/// # Errors
	///
	/// Iff the insertion fails.
	#[instrument(skip(self))]
	pub fn insert_hydration(&mut self, target: D::Node, node: D::Node, anchor: Option<D::Node>) -> Result<(), DomError> {
		if self.hydrating && anchor.is_none() {
			self.append_hydration(target, node)
		} else if self.dom.parent(node) != Some(target) || self.dom.next_sibling(node) != anchor {
			self.dom.insert_before(target, node, anchor)
		} else {
			trace!("Already in place.");
			Ok(())
		}
	}

	/// Removes `node` from its parent, if any.
	///
	/// # Errors
	///
	/// Iff the removal fails.
	pub fn detach(&mut self, node: D::Node) -> Result<(), DomError> {
		self.dom.detach(node)
	}

	/// Sets an attribute if it differs, or removes it for [`None`].
	///
	/// # Errors
	///
	/// Iff `node` isn't an element or the backend refuses.
	pub fn attr(&mut self, node: D::Node, name: &str, value: Option<&str>) -> Result<(), DomError> {
		match value {
			None => self.dom.remove_attribute(node, name),
			Some(value) if self.dom.get_attribute(node, name).as_deref() != Some(value) => self.dom.set_attribute(node, name, value),
			Some(_) => Ok(()),
		}
	}
}
