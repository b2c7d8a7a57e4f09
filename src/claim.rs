//! Matching server-rendered nodes to the nodes a client-side render expects.
//!
//! Each successful claim assigns the node the next `claim_order` of its [`ClaimList`].
//! The orders are kept in a [`ClaimTable`] side table keyed by node handle,
//! so the nodes themselves are never annotated.

use crate::{
	dom::{Dom, NodeKind},
	DomError,
};
use core::{fmt::Debug, hash::Hash};
use hashbrown::HashMap;
use tracing::{instrument, trace, warn};

/// Node handle → `claim_order`.
#[derive(Debug, Clone)]
pub struct ClaimTable<N: Copy + Eq + Hash> {
	orders: HashMap<N, u32>,
}
impl<N: Copy + Eq + Hash + Debug> Default for ClaimTable<N> {
	fn default() -> Self {
		Self::new()
	}
}
impl<N: Copy + Eq + Hash + Debug> ClaimTable<N> {
	#[must_use]
	pub fn new() -> Self {
		Self { orders: HashMap::new() }
	}

	/// [`None`] iff `node` was never claimed.
	#[must_use]
	pub fn get(&self, node: N) -> Option<u32> {
		self.orders.get(&node).copied()
	}

	#[must_use]
	pub fn is_claimed(&self, node: N) -> bool {
		self.orders.contains_key(&node)
	}

	/// Records the claim order of `node`.
	///
	/// A node is claimed at most once. Reassignment indicates a bug in the caller and is logged.
	pub fn assign(&mut self, node: N, claim_order: u32) {
		if let Some(previous) = self.orders.insert(node, claim_order) {
			warn!(?node, previous, claim_order, "Node was claimed more than once.");
		}
	}

	pub fn forget(&mut self, node: N) -> Option<u32> {
		self.orders.remove(&node)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.orders.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.orders.is_empty()
	}

	pub fn clear(&mut self) {
		self.orders.clear()
	}
}

/// Bookkeeping for one [`ClaimList`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClaimInfo {
	/// Where the previous (non-text) claim was found. The next search starts here.
	pub last_index: usize,
	/// How many nodes were claimed from (or created for) this list so far; the next `claim_order`.
	pub total_claimed: u32,
}

/// What claiming did to a matched node's slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processed<N> {
	/// The node was taken out of the list.
	Consumed,
	/// The node was taken, but the given node (e.g. a split-off text remainder) stays claimable in its place.
	Replaced(N),
}

/// Snapshot of a container's unclaimed children, shrinking as they are claimed.
#[derive(Debug, Clone)]
pub struct ClaimList<N> {
	nodes: Vec<N>,
	info: ClaimInfo,
}

impl<N: Copy + Eq + Hash + Debug> ClaimList<N> {
	#[must_use]
	pub fn new(nodes: Vec<N>) -> Self {
		Self { nodes, info: ClaimInfo::default() }
	}

	#[must_use]
	pub fn from_children<D: Dom<Node = N>>(dom: &D, parent: N) -> Self {
		Self::new(dom.child_nodes(parent))
	}

	#[must_use]
	pub fn nodes(&self) -> &[N] {
		&self.nodes
	}

	#[must_use]
	pub fn info(&self) -> ClaimInfo {
		self.info
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	/// Claims the first node matching `predicate`, preferring nodes at or after the previous claim.
	///
	/// The search runs forward from [`ClaimInfo::last_index`] and then backward from right before it.
	/// A match is handed to `process`, which decides whether it leaves the list.
	/// If nothing matches, `create` supplies a fresh node instead.
	///
	/// Either way the returned node is assigned the next claim order.
	///
	/// With `dont_update_last_index`, the search start is kept as is (adjusted only for removals before it).
	///
	/// # Errors
	///
	/// Iff `process` or `create` fail. The list is left unchanged in that case.
	pub fn claim_node<D: Dom<Node = N>>(
		&mut self,
		dom: &mut D,
		claims: &mut ClaimTable<N>,
		mut predicate: impl FnMut(&D, N) -> bool,
		mut process: impl FnMut(&mut D, N) -> Result<Processed<N>, DomError>,
		create: impl FnOnce(&mut D) -> Result<N, DomError>,
		dont_update_last_index: bool,
	) -> Result<N, DomError> {
		let start = self.info.last_index.min(self.nodes.len());

		for i in start..self.nodes.len() {
			let node = self.nodes[i];
			if !predicate(dom, node) {
				continue;
			}

			match process(dom, node)? {
				Processed::Consumed => {
					self.nodes.remove(i);
				}
				Processed::Replaced(replacement) => self.nodes[i] = replacement,
			}
			if !dont_update_last_index {
				self.info.last_index = i;
			}
			trace!(?node, index = i, "Claimed node after the previous claim.");
			return Ok(self.assign(claims, node));
		}

		for i in (0..start).rev() {
			let node = self.nodes[i];
			if !predicate(dom, node) {
				continue;
			}

			let processed = process(dom, node)?;
			match processed {
				Processed::Consumed => {
					self.nodes.remove(i);
				}
				Processed::Replaced(replacement) => self.nodes[i] = replacement,
			}
			if !dont_update_last_index {
				self.info.last_index = i;
			} else if processed == Processed::Consumed {
				self.info.last_index = self.info.last_index.saturating_sub(1);
			}
			trace!(?node, index = i, "Claimed node before the previous claim.");
			return Ok(self.assign(claims, node));
		}

		let node = create(dom)?;
		trace!(?node, "Nothing to claim. Created a new node.");
		Ok(self.assign(claims, node))
	}

	fn assign(&mut self, claims: &mut ClaimTable<N>, node: N) -> N {
		claims.assign(node, self.info.total_claimed);
		self.info.total_claimed += 1;
		node
	}

	/// Claims an element by (upper case) node name, removing all attributes not listed in `attributes`.
	///
	/// # Errors
	///
	/// Iff attribute removal or element creation fail.
	#[instrument(skip(self, dom, claims))]
	pub fn claim_element<D: Dom<Node = N>>(&mut self, dom: &mut D, claims: &mut ClaimTable<N>, name: &str, attributes: &[&str]) -> Result<N, DomError> {
		self.claim_node(
			dom,
			claims,
			|dom, node| dom.node_name(node) == name,
			|dom, node| {
				for attribute in dom.attribute_names(node) {
					if !attributes.contains(&attribute.as_str()) {
						trace!(?node, attribute = attribute.as_str(), "Removing unexpected attribute.");
						dom.remove_attribute(node, &attribute)?;
					}
				}
				Ok(Processed::Consumed)
			},
			|dom| dom.create_element(name),
			false,
		)
	}

	/// Claims a text node, splitting off and leaving behind any excess if its data starts with `data`
	/// and overwriting it otherwise.
	///
	/// Text claims don't move the search start.
	///
	/// # Errors
	///
	/// Iff splitting, overwriting or creating the text node fail.
	#[instrument(skip(self, dom, claims, data), fields(len = data.len()))]
	pub fn claim_text<D: Dom<Node = N>>(&mut self, dom: &mut D, claims: &mut ClaimTable<N>, data: &str) -> Result<N, DomError> {
		if cfg!(feature = "dangerous-logging") {
			trace!(data, "Claiming text.");
		}
		self.claim_node(
			dom,
			claims,
			|dom, node| dom.kind(node) == NodeKind::Text,
			|dom, node| {
				let existing_len = match dom.text_data(node) {
					Some(existing) if existing.starts_with(data) => Some(existing.len()),
					_ => None,
				};
				match existing_len {
					Some(len) if len != data.len() => Ok(Processed::Replaced(dom.split_text(node, data.len())?)),
					Some(_) => Ok(Processed::Consumed),
					None => {
						dom.set_text_data(node, data)?;
						Ok(Processed::Consumed)
					}
				}
			},
			|dom| dom.create_text(data),
			true,
		)
	}

	/// # Errors
	///
	/// See [`ClaimList::claim_text`].
	pub fn claim_space<D: Dom<Node = N>>(&mut self, dom: &mut D, claims: &mut ClaimTable<N>) -> Result<N, DomError> {
		self.claim_text(dom, claims, " ")
	}

	/// Detaches and [forgets](`Dom::forget`) every node that's still unclaimed, consuming the list.
	///
	/// Failures are logged and the affected node is kept.
	#[instrument(skip(self, dom), fields(remaining = self.nodes.len()))]
	pub fn detach_remaining<D: Dom<Node = N>>(self, dom: &mut D) {
		for node in self.nodes {
			match dom.detach(node) {
				Ok(()) => dom.forget(node),
				Err(error) => warn!(?node, %error, "Failed to detach unclaimed node."),
			}
		}
	}
}
