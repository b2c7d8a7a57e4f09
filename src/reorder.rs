//! Minimal-move reordering of claimed children.
//!
//! Nodes that don't move keep their relative order, so any set of unmoved nodes is an increasing
//! subsequence of claim orders. The fewest moves therefore leave exactly a longest increasing
//! subsequence (LIS) in place and reinsert everything else around it.

use crate::{claim::ClaimTable, dom::Dom};
use tracing::{error, instrument, trace, trace_span};

/// First index in `low..high` whose key is greater than `value`, or `high` if there is none.
///
/// `key` must be non-decreasing over the range.
pub fn upper_bound(mut low: usize, mut high: usize, key: impl Fn(usize) -> u32, value: u32) -> usize {
	while low < high {
		let mid = low + ((high - low) >> 1);
		if key(mid) <= value {
			low = mid + 1
		} else {
			high = mid
		}
	}
	low
}

/// Indices (ascending) of one longest increasing subsequence of `keys`.
#[must_use]
pub fn longest_increasing_subsequence(keys: &[u32]) -> Vec<usize> {
	split_at_lis(keys).0
}

/// Splits `0..keys.len()` into an ascending LIS and the (descending) rest.
fn split_at_lis(keys: &[u32]) -> (Vec<usize>, Vec<usize>) {
	// `m[len]`: index of the smallest key that ends an increasing subsequence of length `len`.
	// `m[0]` is never read.
	let mut m = vec![0_usize; keys.len() + 1];
	// Predecessor index + 1, with 0 for none.
	let mut p = vec![0_usize; keys.len()];
	let mut longest = 0;

	for (i, &current) in keys.iter().enumerate() {
		// Longest subsequence that `current` can extend. Fast path for extending the overall longest one.
		let extends = if longest > 0 && keys[m[longest]] <= current {
			longest
		} else {
			upper_bound(1, longest, |len| keys[m[len]], current) - 1
		};
		p[i] = if extends == 0 { 0 } else { m[extends] + 1 };
		// `current` is necessarily the smallest tail for this length, otherwise a longer subsequence would have been found.
		m[extends + 1] = i;
		longest = longest.max(extends + 1);
	}

	let mut lis = Vec::with_capacity(longest);
	let mut rest = Vec::with_capacity(keys.len() - longest);
	let mut unvisited = keys.len();
	let mut cur = if longest == 0 { 0 } else { m[longest] + 1 };
	while cur != 0 {
		let index = cur - 1;
		lis.push(index);
		rest.extend((index + 1..unvisited).rev());
		unvisited = index;
		cur = p[index];
	}
	rest.extend((0..unvisited).rev());
	lis.reverse();

	(lis, rest)
}

/// Moves the claimed children of `container` into claim order with as few insertions as possible.
///
/// Children without a claim order don't take part and are never moved themselves,
/// though claimed nodes may be moved across them. This is always the case in `<head>`,
/// where unclaimed nodes from elsewhere are expected to remain.
///
/// Returns how many nodes were moved. Calling this again right away moves nothing.
///
/// DOM failures are logged and the affected node is skipped; this never fails as a whole.
#[instrument(skip(dom, claims))]
pub fn reorder_claimed_children<D: Dom>(dom: &mut D, claims: &ClaimTable<D::Node>, container: D::Node) -> usize {
	let all_children = dom.child_nodes(container);
	let child_count = all_children.len();
	let children: Vec<(D::Node, u32)> = all_children
		.into_iter()
		.filter_map(|child| claims.get(child).map(|claim_order| (child, claim_order)))
		.collect();
	if children.len() != child_count && dom.node_name(container) != "HEAD" {
		trace!(unclaimed = child_count - children.len(), "Skipping unclaimed children outside of <head>.");
	}
	if children.is_empty() {
		return 0;
	}

	let keys: Vec<u32> = children.iter().map(|&(_, claim_order)| claim_order).collect();
	let (lis, mut to_move) = {
		let span = trace_span!("Computing LIS", children = keys.len());
		let _enter = span.enter();
		split_at_lis(&keys)
	};
	trace!(lis = lis.len(), to_move = to_move.len());

	// In claim order, anchors are found in one forward sweep over the LIS.
	to_move.sort_unstable_by_key(|&i| keys[i]);

	let mut moves = 0;
	let mut j = 0;
	for i in to_move {
		while j < lis.len() && keys[i] >= keys[lis[j]] {
			j += 1
		}
		let (node, claim_order) = children[i];
		let anchor = lis.get(j).map(|&k| children[k].0);
		match dom.insert_before(container, node, anchor) {
			Ok(()) => {
				trace!(?node, claim_order, ?anchor, "Moved claimed node.");
				moves += 1
			}
			Err(error) => error!(?node, claim_order, %error, "Failed to move claimed node."),
		}
	}
	moves
}
