//! Batched component updates.
//!
//! State mutations only [mark](`Scheduler::make_dirty`) their component. The first mark since the
//! last flush queues one [microtask](`crate::microtask::Microtask`), so any number of synchronous
//! mutations collapse into a single [`Scheduler::flush`].
//!
//! A flush runs its callbacks in this order, repeating while callbacks dirty more components:
//!
//! 1. per dirty component, in queue order: update closure, before-update hooks, patch.
//!    Components dirtied meanwhile are processed in the same pass.
//! 2. binding callbacks, last registered first (children before parents).
//! 3. after-update hooks in registration order (parents before children), except on initial mount,
//!    where children are mounted first and so also run first.
//!    Each hook runs at most once per flush, even if its component is updated again.
//!
//! Afterwards, [`Scheduler::tick`] callbacks run.
//!
//! # Reentrancy
//!
//! The flush cursor is a field, not a local. A [`Scheduler::flush`] call made while components are
//! being patched returns immediately, and the outer flush continues with whatever was queued meanwhile.

use crate::{microtask::Microtask, FlushError, PatchError};
use core::{
	any::{type_name, Any},
	cell::{Cell, RefCell},
	fmt, mem,
};
use hashbrown::HashMap;
use std::rc::{Rc, Weak};
use tracing::{debug, error, instrument, trace, trace_span, warn};

/// Identifies a component registered with one [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);
impl fmt::Display for ComponentId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "component #{}", self.0)
	}
}

/// A lifecycle callback. Its identity (the allocation) is what after-update de-duplication goes by.
pub type Hook = Rc<dyn Fn(&Scheduler)>;

/// An on-mount callback, optionally returning a teardown hook that runs on destroy.
pub type MountHook = Rc<dyn Fn(&Scheduler) -> Option<Hook>>;

/// Receives a field's new value whenever it changes outside of [`Scheduler::set_props`].
pub type BoundFn = Rc<dyn Fn(&Scheduler, &dyn Any)>;

type PatchFn = Box<dyn FnMut(&Scheduler, &DirtyMask) -> Result<(), PatchError>>;
type UpdateFn = Box<dyn FnMut(&Scheduler)>;
type OnceCallback = Box<dyn FnOnce(&Scheduler)>;

/// Wraps a closure as [`Hook`].
pub fn hook(f: impl Fn(&Scheduler) + 'static) -> Hook {
	Rc::new(f)
}

fn hook_key(hook: &Hook) -> *const () {
	Rc::as_ptr(hook).cast::<()>()
}

/// Whether `new` differs from `old`.
///
/// Values that aren't equal to themselves (like `NaN`) are considered equal to each other.
#[allow(clippy::eq_op)]
pub fn safe_not_equal<T: PartialEq + ?Sized>(old: &T, new: &T) -> bool {
	if old == old {
		old != new
	} else {
		new == new
	}
}

/// Which fields of a component changed since its last patch, 31 per word.
///
/// A first word of all ones (which no combination of fields can produce) means the component is clean,
/// i.e. not queued for the next flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtyMask(Vec<u32>);
impl Default for DirtyMask {
	fn default() -> Self {
		Self::clean()
	}
}
impl DirtyMask {
	const BITS: usize = 31;
	const CLEAN: u32 = u32::MAX;

	#[must_use]
	pub fn clean() -> Self {
		Self(vec![Self::CLEAN])
	}

	#[must_use]
	pub fn is_clean(&self) -> bool {
		self.0.first() == Some(&Self::CLEAN)
	}

	#[must_use]
	pub fn contains(&self, field: usize) -> bool {
		!self.is_clean()
			&& self
				.0
				.get(field / Self::BITS)
				.map_or(false, |word| word & (1 << (field % Self::BITS)) != 0)
	}

	/// Dirty field indices in ascending order.
	pub fn fields(&self) -> impl Iterator<Item = usize> + '_ {
		let words: &[u32] = if self.is_clean() { &[] } else { &self.0 };
		words
			.iter()
			.enumerate()
			.flat_map(|(w, &word)| (0..Self::BITS).filter(move |&bit| word & (1 << bit) != 0).map(move |bit| w * Self::BITS + bit))
	}

	fn queue(&mut self) {
		for word in &mut self.0 {
			*word = 0
		}
	}

	fn mark(&mut self, field: usize) {
		let word = field / Self::BITS;
		if self.0.len() <= word {
			self.0.resize(word + 1, 0)
		}
		self.0[word] |= 1 << (field % Self::BITS)
	}
}

/// Everything the scheduler needs to know about a component.
pub struct Component {
	patch: PatchFn,
	update: Option<UpdateFn>,
	bound: HashMap<usize, BoundFn>,
	before_update: Vec<Hook>,
	after_update: Vec<Hook>,
	on_mount: Vec<MountHook>,
	on_destroy: Vec<Hook>,
}
impl fmt::Debug for Component {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Component")
			.field("update", &self.update.is_some())
			.field("bound", &self.bound.len())
			.field("before_update", &self.before_update.len())
			.field("after_update", &self.after_update.len())
			.field("on_mount", &self.on_mount.len())
			.field("on_destroy", &self.on_destroy.len())
			.finish_non_exhaustive()
	}
}
impl Component {
	/// `patch` brings the component's DOM up to date with the fields in the [`DirtyMask`].
	pub fn new(patch: impl FnMut(&Scheduler, &DirtyMask) -> Result<(), PatchError> + 'static) -> Self {
		Self {
			patch: Box::new(patch),
			update: None,
			bound: HashMap::new(),
			before_update: Vec::new(),
			after_update: Vec::new(),
			on_mount: Vec::new(),
			on_destroy: Vec::new(),
		}
	}

	/// Recomputes derived values. Runs on registration and before each patch.
	#[must_use]
	pub fn with_update(mut self, update: impl FnMut(&Scheduler) + 'static) -> Self {
		self.update = Some(Box::new(update));
		self
	}

	/// Binds `field` to a parent: `callback` receives each new value that [`Scheduler::invalidate`] stores,
	/// except while the parent itself is [setting props](`Scheduler::set_props`).
	///
	/// Binding the same field again replaces the previous callback.
	#[must_use]
	pub fn bind<T: 'static>(mut self, field: usize, callback: impl Fn(&Scheduler, &T) + 'static) -> Self {
		let bound: BoundFn = Rc::new(move |scheduler: &Scheduler, value: &dyn Any| match value.downcast_ref::<T>() {
			Some(value) => callback(scheduler, value),
			None => error!(field, expected = type_name::<T>(), "Bound field changed to a value of another type."),
		});
		self.bound.insert(field, bound);
		self
	}

	#[must_use]
	pub fn before_update(mut self, hook: Hook) -> Self {
		self.before_update.push(hook);
		self
	}

	#[must_use]
	pub fn after_update(mut self, hook: Hook) -> Self {
		self.after_update.push(hook);
		self
	}

	#[must_use]
	pub fn on_mount(mut self, hook: impl Fn(&Scheduler) -> Option<Hook> + 'static) -> Self {
		self.on_mount.push(Rc::new(hook));
		self
	}

	#[must_use]
	pub fn on_destroy(mut self, hook: Hook) -> Self {
		self.on_destroy.push(hook);
		self
	}
}

struct Slot {
	dirty: DirtyMask,
	ready: bool,
	update: Option<UpdateFn>,
	/// Taken out while running.
	patch: Option<PatchFn>,
	bound: HashMap<usize, BoundFn>,
	skip_bound: bool,
	before_update: Vec<Hook>,
	after_update: Vec<Hook>,
	on_mount: Vec<MountHook>,
	on_destroy: Vec<Hook>,
}

/// The update queue and lifecycle callback registries of one component tree.
///
/// Single-threaded. Callbacks are always taken out of their registry before they run,
/// so they may freely call back into the scheduler.
pub struct Scheduler {
	this: Weak<Scheduler>,
	microtasks: Box<dyn Microtask>,
	next_id: Cell<u64>,
	components: RefCell<HashMap<ComponentId, Slot>>,
	dirty_components: RefCell<Vec<ComponentId>>,
	/// Progress into `dirty_components`. Non-zero exactly while components are being updated.
	flush_index: Cell<usize>,
	update_scheduled: Cell<bool>,
	binding_callbacks: RefCell<Vec<OnceCallback>>,
	render_callbacks: RefCell<Vec<Hook>>,
	flush_callbacks: RefCell<Vec<OnceCallback>>,
	/// Holds on to the hooks so that their addresses stay unique until cleared.
	seen_callbacks: RefCell<HashMap<*const (), Hook>>,
	current_component: Cell<Option<ComponentId>>,
}

impl fmt::Debug for Scheduler {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Scheduler")
			.field("components", &self.components.borrow().len())
			.field("dirty_components", &self.dirty_components.borrow())
			.field("flush_index", &self.flush_index.get())
			.field("update_scheduled", &self.update_scheduled.get())
			.field("binding_callbacks", &self.binding_callbacks.borrow().len())
			.field("render_callbacks", &self.render_callbacks.borrow().len())
			.field("flush_callbacks", &self.flush_callbacks.borrow().len())
			.field("current_component", &self.current_component.get())
			.finish_non_exhaustive()
	}
}

impl Scheduler {
	/// Creates a scheduler that defers flushes through `microtasks`.
	pub fn new(microtasks: impl Microtask + 'static) -> Rc<Self> {
		Rc::new_cyclic(|this| Self {
			this: this.clone(),
			microtasks: Box::new(microtasks),
			next_id: Cell::new(0),
			components: RefCell::new(HashMap::new()),
			dirty_components: RefCell::new(Vec::new()),
			flush_index: Cell::new(0),
			update_scheduled: Cell::new(false),
			binding_callbacks: RefCell::new(Vec::new()),
			render_callbacks: RefCell::new(Vec::new()),
			flush_callbacks: RefCell::new(Vec::new()),
			seen_callbacks: RefCell::new(HashMap::new()),
			current_component: Cell::new(None),
		})
	}

	fn with_slot<R>(&self, component: ComponentId, f: impl FnOnce(&mut Slot) -> R) -> Option<R> {
		self.components.borrow_mut().get_mut(&component).map(f)
	}

	/// The component whose update or registration is currently running, if any.
	#[must_use]
	pub fn current_component(&self) -> Option<ComponentId> {
		self.current_component.get()
	}

	#[must_use]
	pub fn is_registered(&self, component: ComponentId) -> bool {
		self.components.borrow().contains_key(&component)
	}

	/// How many components are queued for the next (or current) flush.
	#[must_use]
	pub fn pending_updates(&self) -> usize {
		self.dirty_components.borrow().len()
	}

	#[must_use]
	pub fn is_update_scheduled(&self) -> bool {
		self.update_scheduled.get()
	}

	/// Registers a component: runs its update closure and before-update hooks once,
	/// after which [`Scheduler::invalidate`] starts marking it dirty.
	#[instrument(skip(self, component))]
	pub fn register(&self, component: Component) -> ComponentId {
		let id = ComponentId(self.next_id.get());
		self.next_id.set(id.0 + 1);

		let Component {
			patch,
			update,
			bound,
			before_update,
			after_update,
			on_mount,
			on_destroy,
		} = component;
		self.components.borrow_mut().insert(
			id,
			Slot {
				dirty: DirtyMask::clean(),
				ready: false,
				update,
				patch: Some(patch),
				bound,
				skip_bound: false,
				before_update,
				after_update,
				on_mount,
				on_destroy,
			},
		);

		let parent = self.current_component.replace(Some(id));
		self.run_update_closure(id);
		self.with_slot(id, |slot| slot.ready = true);
		self.run_before_update(id);
		self.current_component.set(parent);

		debug!(%id, "Registered component.");
		id
	}

	/// Mounts a registered component.
	///
	/// `mount_fragment` inserts the component's nodes and may mount child components.
	/// Afterwards, the component's on-mount and after-update hooks are queued for the next flush,
	/// which places them after those of any children mounted meanwhile.
	///
	/// This doesn't flush by itself.
	#[instrument(skip(self, mount_fragment))]
	pub fn mount(&self, component: ComponentId, mount_fragment: impl FnOnce(&Scheduler)) {
		mount_fragment(self);

		let after_update = match self.with_slot(component, |slot| slot.after_update.clone()) {
			Some(after_update) => after_update,
			None => return warn!("Component was destroyed while mounting."),
		};
		self.add_render_callback(hook(move |scheduler| scheduler.run_on_mount(component)));
		for hook in after_update {
			self.add_render_callback(hook)
		}
	}

	fn run_on_mount(&self, component: ComponentId) {
		let on_mount = self.with_slot(component, |slot| mem::take(&mut slot.on_mount)).unwrap_or_default();
		let teardown: Vec<Hook> = on_mount.iter().filter_map(|hook| hook(self)).collect();
		if self.is_registered(component) {
			self.with_slot(component, move |slot| slot.on_destroy.extend(teardown));
		} else {
			trace!(%component, "Destroyed while mounting. Tearing down right away.");
			for hook in teardown {
				hook(self)
			}
		}
	}

	/// Destroys a component: runs its still-pending after-update hooks, then its on-destroy hooks.
	///
	/// The component is never scheduled again. Destroying it twice does nothing.
	#[instrument(skip(self))]
	pub fn destroy(&self, component: ComponentId) {
		let after_update = match self.with_slot(component, |slot| slot.after_update.clone()) {
			Some(after_update) => after_update,
			None => return trace!("Already destroyed."),
		};
		self.flush_render_callbacks(&after_update);

		let on_destroy = self.with_slot(component, |slot| mem::take(&mut slot.on_destroy)).unwrap_or_default();
		for hook in on_destroy {
			hook(self)
		}

		let slot = self.components.borrow_mut().remove(&component);
		drop(slot);
		debug!("Destroyed component.");
	}

	/// Marks `field` of `component` as changed, queueing the component and a flush if it was clean.
	///
	/// Marks on destroyed components are ignored.
	#[instrument(level = "trace", skip(self))]
	pub fn make_dirty(&self, component: ComponentId, field: usize) {
		let newly_queued = {
			let mut components = self.components.borrow_mut();
			let slot = match components.get_mut(&component) {
				Some(slot) => slot,
				None => return warn!("Ignoring dirty mark of destroyed or unknown component."),
			};
			let newly_queued = slot.dirty.is_clean();
			if newly_queued {
				slot.dirty.queue()
			}
			slot.dirty.mark(field);
			newly_queued
		};

		if newly_queued {
			self.dirty_components.borrow_mut().push(component);
			self.schedule_update();
		}
	}

	/// Stores `value` in `slot` and marks `field` dirty if the value changed (see [`safe_not_equal`]).
	///
	/// A change is also passed to the field's [bound](`Component::bind`) callback, unless props are being set.
	///
	/// Returns whether it changed. Components are only marked once registration has finished.
	pub fn invalidate<T: PartialEq + 'static>(&self, component: ComponentId, field: usize, slot: &mut T, value: T) -> bool {
		if !safe_not_equal(&*slot, &value) {
			return false;
		}
		*slot = value;

		let (ready, bound) = match self.components.borrow().get(&component) {
			Some(data) => (data.ready, if data.skip_bound { None } else { data.bound.get(&field).cloned() }),
			None => (false, None),
		};
		if let Some(bound) = bound {
			trace!(%component, field, "Propagating to binding.");
			bound(self, &*slot);
		}
		if ready {
			self.make_dirty(component, field)
		}
		true
	}

	/// Runs `set` (which is expected to [invalidate](`Scheduler::invalidate`) fields of `component`)
	/// without echoing the new values back through bound callbacks.
	#[instrument(skip(self, set))]
	pub fn set_props(&self, component: ComponentId, set: impl FnOnce(&Scheduler)) {
		let previous = match self.with_slot(component, |slot| mem::replace(&mut slot.skip_bound, true)) {
			Some(previous) => previous,
			None => return warn!("Ignoring props of destroyed or unknown component."),
		};
		set(self);
		self.with_slot(component, |slot| slot.skip_bound = previous);
	}

	/// Runs `f` with `component` as [current component](`Scheduler::current_component`).
	pub(crate) fn with_current_component<R>(&self, component: ComponentId, f: impl FnOnce() -> R) -> R {
		let parent = self.current_component.replace(Some(component));
		let result = f();
		self.current_component.set(parent);
		result
	}

	/// Queues a flush unless one is pending already.
	pub fn schedule_update(&self) {
		if self.update_scheduled.replace(true) {
			return;
		}

		trace!("Scheduling flush.");
		let this = self.this.clone();
		self.microtasks.queue(Box::new(move || {
			if let Some(scheduler) = this.upgrade() {
				if let Err(error) = scheduler.flush() {
					error!(%error, "Deferred flush failed.");
				}
			}
		}))
	}

	/// Queues `callback` to run once the next flush is complete, and makes sure there is one.
	pub fn tick(&self, callback: impl FnOnce(&Scheduler) + 'static) {
		self.flush_callbacks.borrow_mut().push(Box::new(callback));
		self.schedule_update()
	}

	pub fn add_render_callback(&self, hook: Hook) {
		self.render_callbacks.borrow_mut().push(hook)
	}

	/// Queues a one-shot binding callback for the current (or next) flush.
	pub fn add_binding_callback(&self, callback: impl FnOnce(&Scheduler) + 'static) {
		self.binding_callbacks.borrow_mut().push(Box::new(callback))
	}

	/// Runs and dequeues those pending after-update callbacks that are in `hooks`.
	pub fn flush_render_callbacks(&self, hooks: &[Hook]) {
		let pending = mem::take(&mut *self.render_callbacks.borrow_mut());
		let (targets, kept): (Vec<Hook>, Vec<Hook>) = pending.into_iter().partition(|pending| hooks.iter().any(|hook| hook_key(hook) == hook_key(pending)));
		*self.render_callbacks.borrow_mut() = kept;
		for target in targets {
			target(self)
		}
	}

	/// Updates all dirty components and runs the resulting lifecycle callbacks.
	///
	/// # Errors
	///
	/// Iff a patch closure fails. Any pending updates and callbacks (except [`Scheduler::tick`] callbacks)
	/// are discarded and the queued components are reset to clean before the error is returned.
	/// If [`Scheduler::tick`] callbacks are waiting, another flush is scheduled for them.
	#[instrument(skip(self))]
	pub fn flush(&self) -> Result<(), FlushError> {
		if self.flush_index.get() != 0 {
			trace!(flush_index = self.flush_index.get(), "Already updating components. The running flush will continue.");
			return Ok(());
		}

		let saved_component = self.current_component.get();
		loop {
			{
				let span = trace_span!("Updating dirty components");
				let _enter = span.enter();
				loop {
					let index = self.flush_index.get();
					let next = self.dirty_components.borrow().get(index).copied();
					let component = match next {
						Some(component) => component,
						None => break,
					};
					self.flush_index.set(index + 1);
					self.current_component.set(Some(component));
					if let Err(error) = self.update(component) {
						self.abort_flush(saved_component);
						return Err(error);
					}
				}
			}
			self.current_component.set(None);
			let updated = mem::take(&mut *self.dirty_components.borrow_mut());
			self.flush_index.set(0);
			trace!(updated = updated.len(), "Updated components.");

			while let Some(callback) = self.pop_binding_callback() {
				callback(self)
			}

			let mut i = 0;
			while let Some(callback) = self.render_callback(i) {
				i += 1;
				if self.mark_seen(&callback) {
					callback(self)
				}
			}
			let ran = mem::take(&mut *self.render_callbacks.borrow_mut());
			drop(ran);

			if self.dirty_components.borrow().is_empty() {
				break;
			}
			trace!("After-update callbacks dirtied more components. Flushing again.");
		}

		while let Some(callback) = self.pop_flush_callback() {
			callback(self)
		}
		self.update_scheduled.set(false);
		let seen = mem::take(&mut *self.seen_callbacks.borrow_mut());
		drop(seen);
		self.current_component.set(saved_component);
		Ok(())
	}

	fn update(&self, component: ComponentId) -> Result<(), FlushError> {
		if !self.is_registered(component) {
			trace!(%component, "Skipping destroyed component.");
			return Ok(());
		}

		self.run_update_closure(component);
		self.run_before_update(component);

		let (dirty, patch) = match self.with_slot(component, |slot| (mem::take(&mut slot.dirty), slot.patch.take())) {
			Some(taken) => taken,
			None => return Ok(()),
		};
		match patch {
			Some(mut patch) => {
				let span = trace_span!("Patching", %component, ?dirty);
				let _enter = span.enter();
				let result = patch(self, &dirty);
				self.with_slot(component, move |slot| slot.patch = Some(patch));
				result.map_err(|source| FlushError::Patch { component, source })?;
			}
			None => warn!(%component, "Patch is already running. Skipping."),
		}

		let after_update = self.with_slot(component, |slot| slot.after_update.clone()).unwrap_or_default();
		for hook in after_update {
			self.add_render_callback(hook)
		}
		Ok(())
	}

	fn run_update_closure(&self, component: ComponentId) {
		if let Some(mut update) = self.with_slot(component, |slot| slot.update.take()).flatten() {
			update(self);
			self.with_slot(component, move |slot| slot.update = Some(update));
		}
	}

	fn run_before_update(&self, component: ComponentId) {
		let before_update = self.with_slot(component, |slot| slot.before_update.clone()).unwrap_or_default();
		for hook in before_update {
			hook(self)
		}
	}

	fn pop_binding_callback(&self) -> Option<OnceCallback> {
		self.binding_callbacks.borrow_mut().pop()
	}

	fn pop_flush_callback(&self) -> Option<OnceCallback> {
		self.flush_callbacks.borrow_mut().pop()
	}

	fn render_callback(&self, index: usize) -> Option<Hook> {
		self.render_callbacks.borrow().get(index).cloned()
	}

	/// Returns whether `callback` wasn't seen yet during this flush.
	fn mark_seen(&self, callback: &Hook) -> bool {
		let mut seen = self.seen_callbacks.borrow_mut();
		if seen.contains_key(&hook_key(callback)) {
			false
		} else {
			seen.insert(hook_key(callback), Rc::clone(callback));
			true
		}
	}

	fn abort_flush(&self, saved_component: Option<ComponentId>) {
		let queued = mem::take(&mut *self.dirty_components.borrow_mut());
		{
			let mut components = self.components.borrow_mut();
			for component in &queued {
				if let Some(slot) = components.get_mut(component) {
					slot.dirty = DirtyMask::clean()
				}
			}
		}
		self.flush_index.set(0);
		self.update_scheduled.set(false);

		let bindings = mem::take(&mut *self.binding_callbacks.borrow_mut());
		let renders = mem::take(&mut *self.render_callbacks.borrow_mut());
		let seen = mem::take(&mut *self.seen_callbacks.borrow_mut());
		warn!(
			discarded_updates = queued.len(),
			discarded_bindings = bindings.len(),
			discarded_renders = renders.len(),
			"Flush aborted."
		);
		drop((bindings, renders, seen));

		self.current_component.set(saved_component);
		if !self.flush_callbacks.borrow().is_empty() {
			trace!("Rescheduling for pending tick callbacks.");
			self.schedule_update()
		}
	}
}
