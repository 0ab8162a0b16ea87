use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt::Debug;
use std::rc::Rc;

use fxhash::FxHashSet;

use crate::dep::DepId;
use crate::observer::Observer;
use crate::runtime::Runtime;
use crate::value::fmt_container;
use crate::Value;

/// The observed sequence type.
///
/// The seven mutating operations perform the plain `Vec` operation, then,
/// if the list is observed, observe every inserted element and notify the
/// list's container dep. Reads are untracked; a watcher depends on a list
/// through the field that holds it.
pub struct List {
	body: Rc<ListBody>,
}

struct ListBody {
	items: RefCell<Vec<Value>>,
	observer: RefCell<Option<Rc<Observer>>>,
}

impl Clone for List {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

impl Default for List {
	fn default() -> Self {
		List::new()
	}
}

impl From<Vec<Value>> for List {
	fn from(items: Vec<Value>) -> Self {
		List {
			body: Rc::new(ListBody {
				items: RefCell::new(items),
				observer: RefCell::new(None),
			}),
		}
	}
}

impl<V: Into<Value>> FromIterator<V> for List {
	fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
		List::from(iter.into_iter().map(Into::into).collect::<Vec<_>>())
	}
}

impl List {
	pub fn new() -> Self {
		List::from(Vec::new())
	}

	pub fn ptr_eq(&self, other: &List) -> bool {
		Rc::ptr_eq(&self.body, &other.body)
	}

	pub fn observer(&self) -> Option<Rc<Observer>> {
		self.body.observer.borrow().clone()
	}

	pub fn len(&self) -> usize {
		self.body.items.borrow().len()
	}

	pub fn is_empty(&self) -> bool {
		self.body.items.borrow().is_empty()
	}

	pub fn get(&self, index: usize) -> Option<Value> {
		self.body.items.borrow().get(index).cloned()
	}

	pub fn to_vec(&self) -> Vec<Value> {
		self.body.items.borrow().clone()
	}

	/// Iterates over a snapshot of the elements.
	pub fn iter(&self) -> std::vec::IntoIter<Value> {
		self.to_vec().into_iter()
	}

	/// Appends `value`, returning the new length.
	pub fn push(&self, value: impl Into<Value>) -> usize {
		let value = value.into();
		let len = {
			let mut items = self.body.items.borrow_mut();
			items.push(value.clone());
			items.len()
		};
		self.mutated(&[value]);
		len
	}

	pub fn pop(&self) -> Option<Value> {
		let popped = self.body.items.borrow_mut().pop();
		self.mutated(&[]);
		popped
	}

	pub fn shift(&self) -> Option<Value> {
		let shifted = {
			let mut items = self.body.items.borrow_mut();
			if items.is_empty() {
				None
			} else {
				Some(items.remove(0))
			}
		};
		self.mutated(&[]);
		shifted
	}

	/// Prepends `value`, returning the new length.
	pub fn unshift(&self, value: impl Into<Value>) -> usize {
		let value = value.into();
		let len = {
			let mut items = self.body.items.borrow_mut();
			items.insert(0, value.clone());
			items.len()
		};
		self.mutated(&[value]);
		len
	}

	pub fn reverse(&self) {
		self.body.items.borrow_mut().reverse();
		self.mutated(&[]);
	}

	/// Stable sort by [`Value::sort_cmp`].
	pub fn sort(&self) {
		self.sort_by(Value::sort_cmp)
	}

	pub fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> Ordering) {
		self.body.items.borrow_mut().sort_by(compare);
		self.mutated(&[]);
	}

	/// Removes up to `delete` elements starting at `start` and inserts
	/// `insert` in their place. Out of range arguments are clamped.
	/// Returns the removed elements.
	pub fn splice(
		&self,
		start: usize,
		delete: usize,
		insert: impl IntoIterator<Item = Value>,
	) -> Vec<Value> {
		let insert = insert.into_iter().collect::<Vec<_>>();
		let removed = {
			let mut items = self.body.items.borrow_mut();
			let start = start.min(items.len());
			let end = start.saturating_add(delete).min(items.len());
			items.splice(start..end, insert.iter().cloned()).collect::<Vec<_>>()
		};
		self.mutated(&insert);
		removed
	}

	fn mutated(&self, inserted: &[Value]) {
		let Some(observer) = self.observer() else {
			return;
		};

		if let Some(runtime) = observer.runtime() {
			for value in inserted {
				runtime.observe(value);
			}
		}

		observer.dep().notify();
	}

	/// Records the container dep of every observed element, recursing
	/// into nested lists. Containers already in `seen` are skipped.
	pub(crate) fn depend_items(&self, seen: &mut FxHashSet<DepId>) {
		for item in self.to_vec() {
			if let Some(observer) = item.observer() {
				if !seen.insert(observer.dep().id()) {
					continue;
				}
				observer.dep().depend();
			}

			if let Value::Array(list) = &item {
				list.depend_items(seen);
			}
		}
	}

	pub(crate) fn addr(&self) -> usize {
		Rc::as_ptr(&self.body) as usize
	}

	pub(crate) fn observe_with(&self, runtime: &Runtime) -> Rc<Observer> {
		if let Some(observer) = self.observer() {
			return observer;
		}

		let observer = Rc::new(Observer::new(runtime));
		*self.body.observer.borrow_mut() = Some(observer.clone());

		for item in self.to_vec() {
			runtime.observe(&item);
		}

		tracing::trace!(dep = %observer.dep().id(), len = self.len(), "observed list");
		observer
	}
}

impl Debug for List {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		fmt_container(self.addr(), f, "[..]", |f| {
			f.debug_list().entries(self.to_vec().iter()).finish()
		})
	}
}
