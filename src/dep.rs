use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::runtime::{Runtime, WeakRuntime};
use crate::{Subscriber, WatcherId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DepId(u64);

impl DepId {
	pub(crate) fn new(id: u64) -> Self {
		DepId(id)
	}

	pub fn get(self) -> u64 {
		self.0
	}
}

impl std::fmt::Display for DepId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "dep#{}", self.0)
	}
}

/// Subscriber registry for one observable slot (a property)
/// or one container (an observed object or list).
pub struct Dep {
	id: DepId,
	runtime: WeakRuntime,
	subs: RefCell<SmallVec<[(WatcherId, Weak<dyn Subscriber>); 4]>>,
}

impl Dep {
	pub fn new(runtime: &Runtime) -> Rc<Self> {
		Rc::new(Dep {
			id: runtime.next_dep_id(),
			runtime: runtime.downgrade(),
			subs: RefCell::new(SmallVec::new()),
		})
	}

	pub fn id(&self) -> DepId {
		self.id
	}

	/// Adds `sub` unless a subscriber with the same id is already present.
	pub fn add_sub(&self, sub: &Rc<dyn Subscriber>) {
		let id = sub.id();
		let mut subs = self.subs.borrow_mut();
		if subs.iter().any(|(existing, _)| *existing == id) {
			return;
		}

		subs.push((id, Rc::downgrade(sub)));
	}

	pub fn remove_sub(&self, id: WatcherId) {
		self.subs.borrow_mut().retain(|(existing, _)| *existing != id);
	}

	pub fn has_sub(&self, id: WatcherId) -> bool {
		self.subs.borrow().iter().any(|(existing, _)| *existing == id)
	}

	pub fn sub_count(&self) -> usize {
		self.subs.borrow().len()
	}

	/// Registers the watcher currently evaluating on this dep's runtime.
	/// Outside of an evaluation this does nothing.
	pub fn depend(self: &Rc<Self>) {
		if let Some(runtime) = self.runtime.upgrade() {
			runtime.track(self);
		}
	}

	/// Calls `update` on every live subscriber, in subscription order.
	pub fn notify(&self) {
		let subs = {
			let mut subs = self.subs.borrow_mut();
			subs.retain(|(_, sub)| sub.strong_count() > 0);
			subs.iter()
				.filter_map(|(_, sub)| sub.upgrade())
				.collect::<SmallVec<[Rc<dyn Subscriber>; 4]>>()
		};

		tracing::trace!(dep = %self.id, subs = subs.len(), "notify");
		for sub in subs {
			sub.update();
		}
	}
}

impl Debug for Dep {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Dep")
			.field("id", &self.id)
			.field("subs", &self.sub_count())
			.finish()
	}
}
