use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use fxhash::FxHashSet;

use crate::dep::Dep;
use crate::runtime::{Runtime, WeakRuntime};
use crate::Value;

/// A reactive cell: one value slot paired with its own [`Dep`].
///
/// Every field of an observed [`Object`](crate::Object) is a `Var`;
/// a `Var` can also be used on its own.
pub struct Var {
	body: Rc<VarBody>,
}

struct VarBody {
	value: RefCell<Value>,
	dep: Rc<Dep>,
	runtime: WeakRuntime,
}

impl Clone for Var {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

impl Var {
	/// Observes `value` (deeply) and wraps it in a new cell.
	pub fn new(runtime: &Runtime, value: impl Into<Value>) -> Self {
		let value = value.into();
		runtime.observe(&value);
		Var {
			body: Rc::new(VarBody {
				value: RefCell::new(value),
				dep: Dep::new(runtime),
				runtime: runtime.downgrade(),
			}),
		}
	}

	pub fn dep(&self) -> &Rc<Dep> {
		&self.body.dep
	}

	/// Reads the value, recording it as a dependency of the evaluating
	/// watcher. A container value also records its own container dep,
	/// and a list records the container deps of every nested element.
	pub fn get(&self) -> Value {
		let value = self.body.value.borrow().clone();
		let Some(runtime) = self.body.runtime.upgrade() else {
			return value;
		};

		if runtime.is_tracking() {
			self.body.dep.depend();
			if let Some(observer) = value.observer() {
				observer.dep().depend();
				if let Value::Array(list) = &value {
					let mut seen = FxHashSet::default();
					seen.insert(observer.dep().id());
					list.depend_items(&mut seen);
				}
			}
		}

		value
	}

	/// Reads the value without tracking.
	pub fn get_once(&self) -> Value {
		self.body.value.borrow().clone()
	}

	#[inline]
	pub fn set(&self, value: impl Into<Value>) {
		let _ = self.replace(value);
	}

	/// Writes `value` and returns the previous one. Writing a value that is
	/// [`same`](Value::same) as the current one notifies nobody.
	pub fn replace(&self, value: impl Into<Value>) -> Value {
		let value = value.into();
		if self.body.value.borrow().same(&value) {
			return value;
		}

		if let Some(runtime) = self.body.runtime.upgrade() {
			runtime.observe(&value);
		}

		let old = std::mem::replace(&mut *self.body.value.borrow_mut(), value);
		self.body.dep.notify();
		old
	}

	pub fn update(&self, func: impl FnOnce(&mut Value)) {
		let mut value = self.get_once();
		func(&mut value);
		self.set(value)
	}
}

impl Debug for Var {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		self.body.value.borrow().fmt(f)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{Object, WatcherKind};
	use crate::watcher::Watcher;

	#[test]
	fn equal_write_does_not_notify() {
		let runtime = Runtime::new();
		let var = Var::new(&runtime, 1);

		let watcher = Watcher::user(
			&runtime,
			Box::new({
				let var = var.clone();
				move || Ok(var.get())
			}),
			Box::new(|_: &Value, _: &Value| {}),
			Default::default(),
		)
		.unwrap();
		assert_eq!(watcher.kind(), WatcherKind::User);

		var.set(1);
		assert!(!runtime.has_pending_work());

		var.set(2);
		assert!(runtime.has_pending_work());
	}

	#[test]
	fn new_value_is_observed() {
		let runtime = Runtime::new();
		let var = Var::new(&runtime, Value::Null);

		let object = Object::new();
		object.set("a", 1);
		var.set(object.clone());

		assert!(object.observer().is_some());
	}

	#[test]
	fn replace_returns_previous() {
		let runtime = Runtime::new();
		let var = Var::new(&runtime, "a");
		assert_eq!(var.replace("b"), Value::from("a"));
		assert_eq!(var.get_once(), Value::from("b"));
	}
}
