use std::collections::BTreeMap;
use std::rc::Rc;

use crate::dep::{Dep, DepId};
use crate::WatcherId;

/// The set of dependency cells one evaluation read, keyed by id.
#[derive(Default)]
pub struct Dependencies {
	based_on: BTreeMap<DepId, Rc<Dep>>,
}

impl Dependencies {
	pub fn new() -> Self {
		Self {
			based_on: BTreeMap::new(),
		}
	}

	/// Returns `false` when `dep` was already recorded.
	pub fn insert(&mut self, dep: Rc<Dep>) -> bool {
		if self.based_on.contains_key(&dep.id()) {
			return false;
		}

		self.based_on.insert(dep.id(), dep);
		true
	}

	pub fn contains(&self, id: DepId) -> bool {
		self.based_on.contains_key(&id)
	}

	pub fn len(&self) -> usize {
		self.based_on.len()
	}

	pub fn is_empty(&self) -> bool {
		self.based_on.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &Rc<Dep>> {
		self.based_on.values()
	}

	/// Unsubscribes `subscriber` from every dependency.
	pub fn drop(&mut self, subscriber: WatcherId) {
		for dep in self.based_on.values() {
			dep.remove_sub(subscriber)
		}
		self.based_on.clear();
	}

	/// Replaces the recorded set with `next` and unsubscribes
	/// `subscriber` from every dependency it no longer reads.
	pub fn swap(&mut self, next: Dependencies, subscriber: WatcherId) {
		let prev = std::mem::replace(&mut self.based_on, next.based_on);

		// Diff the keys
		prev.iter()
			.filter(|(id, _)| !self.based_on.contains_key(id))
			.for_each(|(_, dep)| dep.remove_sub(subscriber));
	}
}
