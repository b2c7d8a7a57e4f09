//! Deferral of scheduled flushes to the end of the current synchronous execution.

use core::cell::RefCell;
use std::{collections::VecDeque, fmt, rc::Rc};
use tracing::trace;

/// Runs tasks once the current synchronous execution has finished.
///
/// Tasks must run in submission order, and never synchronously from within [`Microtask::queue`].
pub trait Microtask {
	fn queue(&self, task: Box<dyn FnOnce()>);
}

impl<M: Microtask + ?Sized> Microtask for Rc<M> {
	fn queue(&self, task: Box<dyn FnOnce()>) {
		(**self).queue(task)
	}
}

/// A host-driven queue: tasks run only when [`ManualMicrotasks::run_pending`] is called.
///
/// Useful outside of browsers and to step through scheduling in tests.
#[derive(Default)]
pub struct ManualMicrotasks {
	tasks: RefCell<VecDeque<Box<dyn FnOnce()>>>,
}
impl fmt::Debug for ManualMicrotasks {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ManualMicrotasks").field("pending", &self.pending()).finish()
	}
}
impl ManualMicrotasks {
	#[must_use]
	pub fn new() -> Rc<Self> {
		Rc::new(Self::default())
	}

	#[must_use]
	pub fn pending(&self) -> usize {
		self.tasks.borrow().len()
	}

	/// Runs queued tasks until the queue is empty, including ones queued meanwhile.
	///
	/// Returns how many tasks ran.
	pub fn run_pending(&self) -> usize {
		let mut count = 0;
		loop {
			let task = self.tasks.borrow_mut().pop_front();
			match task {
				Some(task) => {
					task();
					count += 1
				}
				None => break,
			}
		}
		trace!(count, "Ran microtasks.");
		count
	}
}
impl Microtask for ManualMicrotasks {
	fn queue(&self, task: Box<dyn FnOnce()>) {
		self.tasks.borrow_mut().push_back(task)
	}
}
