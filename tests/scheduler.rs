use claim_dom::{
	microtask::ManualMicrotasks,
	scheduler::{hook, safe_not_equal, Component, ComponentId, DirtyMask, Scheduler},
	FlushError, PatchError,
};
use std::{
	cell::{Cell, RefCell},
	error::Error as _,
	rc::Rc,
};

mod tracing_;

fn setup() -> (Rc<ManualMicrotasks>, Rc<Scheduler>) {
	tracing_::init();
	let microtasks = ManualMicrotasks::new();
	let scheduler = Scheduler::new(Rc::clone(&microtasks));
	(microtasks, scheduler)
}

type Log = Rc<RefCell<Vec<String>>>;

fn log() -> Log {
	Rc::default()
}

fn entries(log: &Log) -> Vec<String> {
	log.borrow().clone()
}

fn logging_patch(log: &Log, entry: &'static str) -> impl FnMut(&Scheduler, &DirtyMask) -> Result<(), PatchError> {
	let log = Rc::clone(log);
	move |_, _| {
		log.borrow_mut().push(entry.to_owned());
		Ok(())
	}
}

fn logging_hook(log: &Log, entry: &'static str) -> claim_dom::scheduler::Hook {
	let log = Rc::clone(log);
	hook(move |_| log.borrow_mut().push(entry.to_owned()))
}

#[test]
fn clean_mask_has_no_fields() {
	let mask = DirtyMask::clean();
	assert!(mask.is_clean());
	assert!(!mask.contains(0));
	assert_eq!(mask.fields().count(), 0);
}

#[test]
fn synchronous_marks_collapse_into_one_patch() {
	let (microtasks, scheduler) = setup();
	let seen_fields = Rc::new(RefCell::new(Vec::new()));
	let component = scheduler.register(Component::new({
		let seen_fields = Rc::clone(&seen_fields);
		move |_, dirty| {
			seen_fields.borrow_mut().push(dirty.fields().collect::<Vec<_>>());
			Ok(())
		}
	}));

	scheduler.make_dirty(component, 0);
	scheduler.make_dirty(component, 1);
	scheduler.make_dirty(component, 0);
	scheduler.make_dirty(component, 40);
	assert_eq!(scheduler.pending_updates(), 1);
	assert_eq!(microtasks.pending(), 1);
	assert!(seen_fields.borrow().is_empty());

	assert_eq!(microtasks.run_pending(), 1);

	assert_eq!(*seen_fields.borrow(), [vec![0, 1, 40]]);
	assert_eq!(scheduler.pending_updates(), 0);
	assert!(!scheduler.is_update_scheduled());
}

#[test]
fn after_update_mutation_flushes_again_in_the_same_call() {
	let (microtasks, scheduler) = setup();
	let patches = Rc::new(Cell::new(0));
	let hook_calls = Rc::new(Cell::new(0));
	let id = Rc::new(Cell::new(None::<ComponentId>));

	let component = scheduler.register(
		Component::new({
			let patches = Rc::clone(&patches);
			move |_, _| {
				patches.set(patches.get() + 1);
				Ok(())
			}
		})
		.after_update({
			let hook_calls = Rc::clone(&hook_calls);
			let id = Rc::clone(&id);
			hook(move |scheduler| {
				hook_calls.set(hook_calls.get() + 1);
				scheduler.make_dirty(id.get().unwrap(), 0)
			})
		}),
	);
	id.set(Some(component));

	scheduler.make_dirty(component, 0);
	scheduler.flush().unwrap();

	assert_eq!(patches.get(), 2);
	assert_eq!(hook_calls.get(), 1);
	assert_eq!(scheduler.pending_updates(), 0);

	microtasks.run_pending();
	assert_eq!(patches.get(), 2);
}

#[test]
fn failed_patch_resets_and_propagates() {
	let (microtasks, scheduler) = setup();
	let log = log();
	let a = scheduler.register(Component::new(logging_patch(&log, "a")));
	let b = scheduler.register(Component::new(|_, _| Err(PatchError::new("boom"))));
	let c = scheduler.register(Component::new(logging_patch(&log, "c")));

	scheduler.make_dirty(a, 0);
	scheduler.make_dirty(b, 0);
	scheduler.make_dirty(c, 0);
	let error = scheduler.flush().unwrap_err();

	assert!(matches!(error, FlushError::Patch { component, .. } if component == b));
	assert_eq!(error.source().unwrap().to_string(), "boom");
	assert_eq!(scheduler.pending_updates(), 0);
	assert!(!scheduler.is_update_scheduled());
	assert_eq!(entries(&log), ["a"]);

	// Nothing is stuck: `c` can be queued again.
	scheduler.make_dirty(c, 0);
	assert_eq!(scheduler.pending_updates(), 1);
	microtasks.run_pending();
	assert_eq!(entries(&log), ["a", "c"]);
}

#[test]
fn deferred_flush_failure_is_contained() {
	let (microtasks, scheduler) = setup();
	let component = scheduler.register(Component::new(|_, _| Err(PatchError::new("boom"))));

	scheduler.make_dirty(component, 3);
	microtasks.run_pending();

	assert_eq!(scheduler.pending_updates(), 0);
	assert!(!scheduler.is_update_scheduled());
}

#[test]
fn callback_order_on_mount_and_update() {
	let (microtasks, scheduler) = setup();
	let log = log();

	let parent = scheduler.register(
		Component::new({
			let log = Rc::clone(&log);
			move |scheduler, _| {
				log.borrow_mut().push("parent patch".to_owned());
				let log = Rc::clone(&log);
				scheduler.add_binding_callback(move |_| log.borrow_mut().push("parent binding".to_owned()));
				Ok(())
			}
		})
		.before_update(logging_hook(&log, "parent before"))
		.after_update(logging_hook(&log, "parent after")),
	);
	let child = scheduler.register(
		Component::new({
			let log = Rc::clone(&log);
			move |scheduler, _| {
				log.borrow_mut().push("child patch".to_owned());
				let log = Rc::clone(&log);
				scheduler.add_binding_callback(move |_| log.borrow_mut().push("child binding".to_owned()));
				Ok(())
			}
		})
		.before_update(logging_hook(&log, "child before"))
		.after_update(logging_hook(&log, "child after")),
	);
	assert_eq!(entries(&log), ["parent before", "child before"]);
	log.borrow_mut().clear();

	scheduler.mount(parent, |scheduler| scheduler.mount(child, |_| ()));
	scheduler.flush().unwrap();
	assert_eq!(entries(&log), ["child after", "parent after"]);
	log.borrow_mut().clear();

	scheduler.make_dirty(parent, 0);
	scheduler.make_dirty(child, 0);
	microtasks.run_pending();
	assert_eq!(
		entries(&log),
		[
			"parent before",
			"parent patch",
			"child before",
			"child patch",
			"child binding",
			"parent binding",
			"parent after",
			"child after",
		]
	);
}

#[test]
fn nested_flush_defers_to_the_running_one() {
	let (_microtasks, scheduler) = setup();
	let log = log();
	let b = scheduler.register(Component::new(logging_patch(&log, "b")));
	let nested_result = Rc::new(Cell::new(None));
	let a = scheduler.register(Component::new({
		let log = Rc::clone(&log);
		let nested_result = Rc::clone(&nested_result);
		move |scheduler, _| {
			log.borrow_mut().push("a".to_owned());
			scheduler.make_dirty(b, 0);
			nested_result.set(Some(scheduler.flush().is_ok()));
			log.borrow_mut().push("a done".to_owned());
			Ok(())
		}
	}));

	scheduler.make_dirty(a, 0);
	scheduler.flush().unwrap();

	assert_eq!(nested_result.get(), Some(true));
	assert_eq!(entries(&log), ["a", "a done", "b"]);
	assert_eq!(scheduler.pending_updates(), 0);
}

#[test]
fn mount_teardown_and_destroy() {
	let (_microtasks, scheduler) = setup();
	let log = log();
	let component = scheduler.register(
		Component::new(logging_patch(&log, "patch"))
			.on_mount({
				let log = Rc::clone(&log);
				move |_| {
					log.borrow_mut().push("mounted".to_owned());
					Some(logging_hook(&log, "teardown"))
				}
			})
			.on_destroy(logging_hook(&log, "destroyed")),
	);

	scheduler.mount(component, |_| ());
	scheduler.flush().unwrap();
	scheduler.destroy(component);
	scheduler.destroy(component);

	assert_eq!(entries(&log), ["mounted", "destroyed", "teardown"]);
	assert!(!scheduler.is_registered(component));

	scheduler.make_dirty(component, 0);
	assert_eq!(scheduler.pending_updates(), 0);
}

#[test]
fn destroy_runs_pending_after_update_hooks_once() {
	let (microtasks, scheduler) = setup();
	let log = log();
	let component = scheduler.register(Component::new(logging_patch(&log, "patch")).after_update(logging_hook(&log, "after")));

	scheduler.mount(component, |_| ());
	scheduler.destroy(component);
	scheduler.flush().unwrap();
	microtasks.run_pending();

	assert_eq!(entries(&log), ["after"]);
}

#[test]
fn tick_runs_after_the_flush() {
	let (microtasks, scheduler) = setup();
	let log = log();
	let component = scheduler.register(Component::new(logging_patch(&log, "patch")));

	scheduler.make_dirty(component, 0);
	scheduler.tick({
		let log = Rc::clone(&log);
		move |_| log.borrow_mut().push("tick".to_owned())
	});
	assert_eq!(microtasks.pending(), 1);
	microtasks.run_pending();
	assert_eq!(entries(&log), ["patch", "tick"]);

	scheduler.tick({
		let log = Rc::clone(&log);
		move |_| log.borrow_mut().push("idle tick".to_owned())
	});
	microtasks.run_pending();
	assert_eq!(entries(&log), ["patch", "tick", "idle tick"]);
}

#[test]
fn invalidate_marks_changes_after_registration() {
	let (_microtasks, scheduler) = setup();
	let raised = Rc::new(RefCell::new(0_u32));
	let percentage = Rc::new(RefCell::new(0_u32));

	let component = scheduler.register(Component::new(|_, _| Ok(())).with_update({
		let raised = Rc::clone(&raised);
		let percentage = Rc::clone(&percentage);
		move |scheduler| {
			let id = scheduler.current_component().unwrap();
			let value = *raised.borrow() * 100 / 1000;
			scheduler.invalidate(id, 1, &mut *percentage.borrow_mut(), value);
		}
	}));
	assert_eq!(scheduler.pending_updates(), 0);
	assert_eq!(scheduler.current_component(), None);

	assert!(!scheduler.invalidate(component, 0, &mut *raised.borrow_mut(), 0));
	assert_eq!(scheduler.pending_updates(), 0);

	assert!(scheduler.invalidate(component, 0, &mut *raised.borrow_mut(), 250));
	assert_eq!(scheduler.pending_updates(), 1);
	scheduler.flush().unwrap();
	assert_eq!(*percentage.borrow(), 25);
}

#[test]
fn non_reflexive_values_count_as_unchanged() {
	assert!(!safe_not_equal(&f64::NAN, &f64::NAN));
	assert!(safe_not_equal(&f64::NAN, &0.5));
	assert!(safe_not_equal(&0.5, &f64::NAN));
	assert!(!safe_not_equal("a", "a"));

	let (_microtasks, scheduler) = setup();
	let component = scheduler.register(Component::new(|_, _| Ok(())));
	let mut ratio = f64::NAN;

	assert!(!scheduler.invalidate(component, 0, &mut ratio, f64::NAN));
	assert_eq!(scheduler.pending_updates(), 0);

	assert!(scheduler.invalidate(component, 0, &mut ratio, 0.25));
	assert_eq!(scheduler.pending_updates(), 1);
}

#[test]
fn bound_fields_propagate_except_while_setting_props() {
	let (_microtasks, scheduler) = setup();
	let propagated = Rc::new(RefCell::new(Vec::new()));
	let child = scheduler.register(Component::new(|_, _| Ok(())).bind(0, {
		let propagated = Rc::clone(&propagated);
		move |_, value: &u32| propagated.borrow_mut().push(*value)
	}));
	let mut value = 0_u32;

	assert!(scheduler.invalidate(child, 0, &mut value, 5));
	assert!(scheduler.invalidate(child, 1, &mut value, 6));
	assert_eq!(*propagated.borrow(), [5]);

	scheduler.set_props(child, |scheduler| {
		assert!(scheduler.invalidate(child, 0, &mut value, 7));
	});
	assert_eq!(value, 7);
	assert_eq!(*propagated.borrow(), [5]);
	assert_eq!(scheduler.pending_updates(), 1);

	assert!(scheduler.invalidate(child, 0, &mut value, 8));
	assert_eq!(*propagated.borrow(), [5, 8]);
}

#[test]
fn bound_fields_propagate_during_registration() {
	let (_microtasks, scheduler) = setup();
	let propagated = Rc::new(Cell::new(None));
	let doubled = Rc::new(RefCell::new(0_u32));

	scheduler.register(
		Component::new(|_, _| Ok(()))
			.with_update({
				let doubled = Rc::clone(&doubled);
				move |scheduler| {
					let id = scheduler.current_component().unwrap();
					scheduler.invalidate(id, 2, &mut *doubled.borrow_mut(), 42);
				}
			})
			.bind(2, {
				let propagated = Rc::clone(&propagated);
				move |_, value: &u32| propagated.set(Some(*value))
			}),
	);

	assert_eq!(propagated.get(), Some(42));
	assert_eq!(scheduler.pending_updates(), 0);
}

#[test]
fn tick_survives_a_failed_deferred_flush() {
	let (microtasks, scheduler) = setup();
	let component = scheduler.register(Component::new(|_, _| Err(PatchError::new("boom"))));
	let ticked = Rc::new(Cell::new(false));

	scheduler.make_dirty(component, 0);
	scheduler.tick({
		let ticked = Rc::clone(&ticked);
		move |_| ticked.set(true)
	});
	microtasks.run_pending();

	assert!(ticked.get());
	assert_eq!(microtasks.pending(), 0);
	assert!(!scheduler.is_update_scheduled());
	assert_eq!(scheduler.pending_updates(), 0);
}
