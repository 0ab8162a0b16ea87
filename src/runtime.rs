use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use crate::dep::{Dep, DepId};
use crate::evaluation::Frame;
use crate::observer::{self, Observer};
use crate::scheduler::Scheduler;
use crate::{Config, Subscriber, TickStrategy, Value, WatcherId};

pub(crate) type Task = Box<dyn FnOnce()>;

/// Owner of everything the reactive core shares: id counters,
/// the evaluation stack, the scheduler queues and the microtask queue.
///
/// Cloning a `Runtime` creates a new handle to the same state.
/// Separate runtimes never observe each other.
#[derive(Clone)]
pub struct Runtime {
	inner: Rc<RuntimeInner>,
}

pub(crate) struct RuntimeInner {
	config: Config,
	tick: TickStrategy,
	next_dep: Cell<u64>,
	next_watcher: Cell<u64>,
	stack: RefCell<Vec<Frame>>,
	scheduler: RefCell<Scheduler>,
	microtasks: RefCell<VecDeque<Task>>,
	host_scheduled: Cell<bool>,
}

#[derive(Clone)]
pub(crate) struct WeakRuntime(Weak<RuntimeInner>);

impl WeakRuntime {
	pub fn upgrade(&self) -> Option<Runtime> {
		self.0.upgrade().map(|inner| Runtime { inner })
	}
}

impl Default for Runtime {
	fn default() -> Self {
		Runtime::new()
	}
}

impl Runtime {
	pub fn new() -> Self {
		Self::with_config(Config::default())
	}

	pub fn with_config(config: Config) -> Self {
		let tick = config.tick.resolve();
		Runtime {
			inner: Rc::new(RuntimeInner {
				config,
				tick,
				next_dep: Cell::new(0),
				next_watcher: Cell::new(0),
				stack: RefCell::new(Vec::new()),
				scheduler: RefCell::new(Scheduler::default()),
				microtasks: RefCell::new(VecDeque::new()),
				host_scheduled: Cell::new(false),
			}),
		}
	}

	pub fn config(&self) -> &Config {
		&self.inner.config
	}

	/// The strategy actually in use after fallbacks.
	pub fn tick_strategy(&self) -> TickStrategy {
		self.inner.tick
	}

	#[inline]
	pub fn observe(&self, value: &Value) -> Option<Rc<Observer>> {
		observer::observe(self, value)
	}

	/// True while some watcher is evaluating.
	pub fn is_tracking(&self) -> bool {
		!self.inner.stack.borrow().is_empty()
	}

	/// Number of nested evaluations currently on the stack.
	pub fn tracking_depth(&self) -> usize {
		self.inner.stack.borrow().len()
	}

	pub fn ptr_eq(&self, other: &Runtime) -> bool {
		Rc::ptr_eq(&self.inner, &other.inner)
	}

	/// Runs queued tasks until the queue is empty, including tasks
	/// queued by the tasks themselves. Returns how many ran.
	pub fn tick(&self) -> usize {
		let mut ran = 0;
		loop {
			let task = self.inner.microtasks.borrow_mut().pop_front();
			let Some(task) = task else {
				break;
			};

			task();
			ran += 1;
		}

		self.inner.host_scheduled.set(false);
		ran
	}

	pub fn has_pending_work(&self) -> bool {
		!self.inner.microtasks.borrow().is_empty()
	}

	pub(crate) fn scheduler(&self) -> &RefCell<Scheduler> {
		&self.inner.scheduler
	}

	pub(crate) fn downgrade(&self) -> WeakRuntime {
		WeakRuntime(Rc::downgrade(&self.inner))
	}

	pub(crate) fn next_dep_id(&self) -> DepId {
		let id = self.inner.next_dep.get();
		self.inner.next_dep.set(id + 1);
		DepId::new(id)
	}

	pub(crate) fn next_watcher_id(&self) -> WatcherId {
		let id = self.inner.next_watcher.get();
		self.inner.next_watcher.set(id + 1);
		WatcherId::new(id)
	}

	pub(crate) fn push_frame(&self, frame: Frame) -> usize {
		let mut stack = self.inner.stack.borrow_mut();
		stack.push(frame);
		stack.len()
	}

	/// Pops every frame at or above `depth`, returning the one at `depth`.
	pub(crate) fn pop_frame(&self, depth: usize) -> Option<Frame> {
		let mut stack = self.inner.stack.borrow_mut();
		if stack.len() < depth || depth == 0 {
			return None;
		}

		stack.truncate(depth);
		stack.pop()
	}

	/// Records `dep` against the innermost evaluation and subscribes
	/// its watcher when it was not already subscribed.
	pub(crate) fn track(&self, dep: &Rc<Dep>) {
		let watcher = {
			let mut stack = self.inner.stack.borrow_mut();
			let Some(frame) = stack.last_mut() else {
				return;
			};

			if !frame.dependencies.insert(dep.clone()) {
				return;
			}

			frame.watcher.clone()
		};

		if !watcher.depends_on(dep.id()) {
			tracing::trace!(dep = %dep.id(), watcher = %watcher.id(), "subscribe");
			dep.add_sub(&(watcher as Rc<dyn Subscriber>));
		}
	}

	pub(crate) fn enqueue_microtask(&self, task: Task) {
		self.inner.microtasks.borrow_mut().push_back(task);
		if self.inner.tick == TickStrategy::Microtask && !self.inner.host_scheduled.replace(true) {
			self.schedule_host_tick();
		}
	}

	#[cfg(target_arch = "wasm32")]
	fn schedule_host_tick(&self) {
		let runtime = self.downgrade();
		crate::microtask::queue(move || {
			if let Some(runtime) = runtime.upgrade() {
				runtime.tick();
			}
		});
	}

	#[cfg(not(target_arch = "wasm32"))]
	fn schedule_host_tick(&self) {
		// `TickStrategy::resolve` never keeps `Microtask` on this target.
	}
}

impl Debug for Runtime {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Runtime")
			.field("tick", &self.inner.tick)
			.field("tracking_depth", &self.tracking_depth())
			.field("pending_tasks", &self.inner.microtasks.borrow().len())
			.finish()
	}
}
