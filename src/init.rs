//! Starting a root component: registration, claiming (or creating) its nodes, mounting and the first flush.

use crate::{
	claim::ClaimList,
	dom::Dom,
	hydrate::Hydrator,
	scheduler::{Component, ComponentId, Scheduler},
	DomError, InitError,
};
use core::cell::RefCell;
use tracing::{debug, instrument, warn};

/// Where [`init`] puts a root component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target<N> {
	/// The container that receives the component's nodes.
	pub node: N,
	/// Whether to claim the container's server-rendered children instead of creating all nodes anew.
	pub hydrate: bool,
}

/// Registers `component` and mounts it into `target`, then flushes once.
///
/// When hydrating, `claim` runs over the target's current children (anything it leaves unclaimed is detached).
/// Otherwise it runs over an empty list, so every node it asks for is created.
///
/// `mount` then inserts the claimed nodes, normally through [`Hydrator::insert_hydration`], and may mount
/// child components. Hydration ends before the flush, so on-mount and after-update hooks see the final DOM.
///
/// `hydrator` is only borrowed while `claim` and `mount` run, so patch closures and lifecycle hooks may borrow it.
///
/// # Errors
///
/// Iff `claim` or `mount` fail, in which case the component is destroyed again,
/// or iff the first flush fails, in which case it stays mounted.
#[instrument(skip(scheduler, hydrator, component, claim, mount))]
pub fn init<D: Dom, R>(
	scheduler: &Scheduler,
	hydrator: &RefCell<Hydrator<D>>,
	target: Target<D::Node>,
	component: Component,
	claim: impl FnOnce(&mut Hydrator<D>, &mut ClaimList<D::Node>) -> Result<R, DomError>,
	mount: impl FnOnce(&Scheduler, &mut Hydrator<D>, D::Node, &R) -> Result<(), DomError>,
) -> Result<(ComponentId, R), InitError> {
	let id = scheduler.register(component);

	let claimed = scheduler.with_current_component(id, || {
		let mut hydrator = hydrator.borrow_mut();
		if target.hydrate {
			hydrator.claim_children(target.node, claim)
		} else {
			claim(&mut *hydrator, &mut ClaimList::new(Vec::new()))
		}
	});
	let claimed = match claimed {
		Ok(claimed) => claimed,
		Err(error) => return Err(abort(scheduler, hydrator, id, error)),
	};

	let mut mounted = Ok(());
	scheduler.with_current_component(id, || scheduler.mount(id, |scheduler| mounted = mount(scheduler, &mut *hydrator.borrow_mut(), target.node, &claimed)));
	if let Err(error) = mounted {
		return Err(abort(scheduler, hydrator, id, error));
	}

	hydrator.borrow_mut().end_hydrating();
	scheduler.flush()?;
	debug!(%id, "Initialized component.");
	Ok((id, claimed))
}

fn abort<D: Dom>(scheduler: &Scheduler, hydrator: &RefCell<Hydrator<D>>, component: ComponentId, error: DomError) -> InitError {
	warn!(%component, %error, "Initialization failed. Destroying the component.");
	hydrator.borrow_mut().end_hydrating();
	scheduler.destroy(component);
	InitError::Dom { component, source: error }
}
