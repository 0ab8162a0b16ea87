use std::rc::Rc;

use fxhash::FxHashSet;

use crate::runtime::{Runtime, Task};
use crate::watcher::Watcher;
use crate::{Error, WatcherId};

/// Watcher queue and the deferred-callback list.
#[derive(Default)]
pub(crate) struct Scheduler {
	queue: Vec<Rc<Watcher>>,
	has: FxHashSet<WatcherId>,
	/// A watcher flush is scheduled and has not started yet.
	waiting: bool,
	callbacks: Vec<Task>,
	/// A callback drain is sitting in the microtask queue.
	pending: bool,
}

impl Runtime {
	/// Queues `watcher` for the next flush. A watcher is queued at most
	/// once per flush; the first queued watcher schedules the flush.
	pub(crate) fn queue_watcher(&self, watcher: Rc<Watcher>) {
		let schedule = {
			let mut scheduler = self.scheduler().borrow_mut();
			if !scheduler.has.insert(watcher.id()) {
				return;
			}

			tracing::trace!(watcher = %watcher.id(), "queued");
			scheduler.queue.push(watcher);
			!std::mem::replace(&mut scheduler.waiting, true)
		};

		if schedule {
			let runtime = self.downgrade();
			self.next_tick(move || {
				if let Some(runtime) = runtime.upgrade() {
					runtime.flush_watchers();
				}
			});
		}
	}

	/// Runs `callback` after the current reactive cycle settles.
	///
	/// Callbacks run in FIFO order from the same deferred drain as the
	/// watcher flush, so a callback registered after a state change runs
	/// after the re-render it caused.
	pub fn next_tick(&self, callback: impl FnOnce() + 'static) {
		let schedule = {
			let mut scheduler = self.scheduler().borrow_mut();
			scheduler.callbacks.push(Box::new(callback));
			!std::mem::replace(&mut scheduler.pending, true)
		};

		if schedule {
			let runtime = self.downgrade();
			self.enqueue_microtask(Box::new(move || {
				if let Some(runtime) = runtime.upgrade() {
					runtime.flush_callbacks();
				}
			}));
		}
	}

	/// Number of watchers waiting for the next flush.
	pub fn queued_watchers(&self) -> usize {
		self.scheduler().borrow().queue.len()
	}

	fn flush_callbacks(&self) {
		let callbacks = {
			let mut scheduler = self.scheduler().borrow_mut();
			scheduler.pending = false;
			std::mem::take(&mut scheduler.callbacks)
		};

		for callback in callbacks {
			callback();
		}
	}

	/// Runs a snapshot of the queue in creation order. Anything queued while
	/// the snapshot runs waits for the next flush. A watcher stays marked as
	/// queued until its own turn, so a notification that lands before it
	/// runs is absorbed by that run.
	fn flush_watchers(&self) {
		let mut snapshot = {
			let mut scheduler = self.scheduler().borrow_mut();
			scheduler.waiting = false;
			std::mem::take(&mut scheduler.queue)
		};

		snapshot.sort_by_key(|watcher| watcher.id());
		tracing::trace!(watchers = snapshot.len(), "flush");

		for watcher in snapshot {
			self.scheduler().borrow_mut().has.remove(&watcher.id());
			if let Err(error) = watcher.run() {
				self.report(watcher.id(), error);
			}
		}
	}

	fn report(&self, watcher: WatcherId, error: Error) {
		match &self.config().error_handler {
			Some(handler) => handler(watcher, &error),
			None => tracing::error!(%watcher, %error, "watcher failed during flush"),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::cell::RefCell;

	use super::*;
	use crate::{Config, Value, Var};

	type Log = Rc<RefCell<Vec<String>>>;

	fn logging_watcher(runtime: &Runtime, var: &Var, log: &Log, name: &'static str) -> Rc<Watcher> {
		Watcher::render(
			runtime,
			Box::new({
				let (var, log) = (var.clone(), log.clone());
				move || {
					log.borrow_mut().push(name.to_string());
					Ok(var.get())
				}
			}),
		)
		.unwrap()
	}

	#[test]
	fn batches_many_writes_into_one_run() {
		let runtime = Runtime::new();
		let log = Log::default();
		let a = Var::new(&runtime, 0);
		let b = Var::new(&runtime, 0);

		let _watcher = Watcher::render(
			&runtime,
			Box::new({
				let (a, b, log) = (a.clone(), b.clone(), log.clone());
				move || {
					log.borrow_mut().push("render".into());
					a.get();
					Ok(b.get())
				}
			}),
		)
		.unwrap();

		a.set(1);
		b.set(1);
		a.set(2);
		assert_eq!(runtime.queued_watchers(), 1);

		runtime.tick();
		assert_eq!(log.borrow().len(), 2);
	}

	#[test]
	fn flush_runs_in_creation_order() {
		let runtime = Runtime::new();
		let log = Log::default();
		let a = Var::new(&runtime, 0);
		let b = Var::new(&runtime, 0);

		let _first = logging_watcher(&runtime, &a, &log, "first");
		let _second = logging_watcher(&runtime, &b, &log, "second");
		log.borrow_mut().clear();

		b.set(1);
		a.set(1);
		runtime.tick();

		assert_eq!(*log.borrow(), vec!["first", "second"]);
	}

	#[test]
	fn requeue_during_flush_waits_for_next_flush() {
		let runtime = Runtime::new();
		let log = Log::default();
		let a = Var::new(&runtime, 0);
		let b = Var::new(&runtime, 0);

		// Reading `a` and writing `b` during a run.
		let _writer = Watcher::render(
			&runtime,
			Box::new({
				let (a, b, log) = (a.clone(), b.clone(), log.clone());
				move || {
					log.borrow_mut().push("writer".into());
					let next = a.get().as_number().unwrap_or_default();
					b.set(next);
					Ok(Value::Null)
				}
			}),
		)
		.unwrap();
		let _reader = logging_watcher(&runtime, &b, &log, "reader");
		log.borrow_mut().clear();

		a.set(5);
		assert_eq!(runtime.queued_watchers(), 1);

		runtime.next_tick({
			let log = log.clone();
			move || log.borrow_mut().push("tick".into())
		});

		runtime.tick();
		assert_eq!(*log.borrow(), vec!["writer", "tick", "reader"]);
	}

	#[test]
	fn failing_watcher_does_not_stop_the_flush() {
		let errors = Rc::new(RefCell::new(Vec::new()));
		let runtime = Runtime::with_config(Config::new().error_handler({
			let errors = errors.clone();
			move |watcher, error| errors.borrow_mut().push((watcher, error.to_string()))
		}));
		let log = Log::default();
		let a = Var::new(&runtime, 0);

		let broken = Watcher::user(
			&runtime,
			Box::new({
				let a = a.clone();
				move || match a.get().as_number() {
					Some(n) if n > 0.0 => Err(Error::custom("broken")),
					_ => Ok(Value::Null),
				}
			}),
			Box::new(|_: &Value, _: &Value| {}),
			Default::default(),
		)
		.unwrap();
		let _healthy = logging_watcher(&runtime, &a, &log, "healthy");
		log.borrow_mut().clear();

		a.set(1);
		runtime.tick();

		assert_eq!(*log.borrow(), vec!["healthy"]);
		assert_eq!(*errors.borrow(), vec![(broken.id(), "broken".to_string())]);
		assert_eq!(runtime.tracking_depth(), 0);
	}

	#[test]
	fn callbacks_run_fifo_in_one_tick() {
		let runtime = Runtime::new();
		let log = Log::default();

		for name in ["a", "b", "c"] {
			let log = log.clone();
			runtime.next_tick(move || log.borrow_mut().push(name.into()));
		}

		assert_eq!(runtime.tick(), 1);
		assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
	}

	#[test]
	fn notification_before_its_turn_is_absorbed() {
		let runtime = Runtime::new();
		let log = Log::default();
		let a = Var::new(&runtime, 0);
		let b = Var::new(&runtime, 0);

		let _writer = Watcher::render(
			&runtime,
			Box::new({
				let (a, b) = (a.clone(), b.clone());
				move || {
					let next = a.get().as_number().unwrap_or_default();
					b.set(next * 10.0);
					Ok(Value::Null)
				}
			}),
		)
		.unwrap();
		let _reader = Watcher::render(
			&runtime,
			Box::new({
				let (a, b, log) = (a.clone(), b.clone(), log.clone());
				move || {
					a.get();
					log.borrow_mut().push(format!("reader {}", b.get()));
					Ok(Value::Null)
				}
			}),
		)
		.unwrap();
		log.borrow_mut().clear();

		a.set(1);
		assert_eq!(runtime.queued_watchers(), 2);

		runtime.tick();
		assert_eq!(*log.borrow(), vec!["reader 10"]);
		assert_eq!(runtime.queued_watchers(), 0);
		assert!(!runtime.has_pending_work());
	}
}
