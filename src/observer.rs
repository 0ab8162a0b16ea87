use std::fmt::Debug;
use std::rc::Rc;

use crate::dep::Dep;
use crate::runtime::{Runtime, WeakRuntime};
use crate::Value;

/// Marker attached to an observed object or list. Its dep stands for
/// "this container changed shape" (fields added or removed, elements
/// inserted, removed or reordered).
pub struct Observer {
	dep: Rc<Dep>,
	runtime: WeakRuntime,
}

impl Observer {
	pub(crate) fn new(runtime: &Runtime) -> Self {
		Observer {
			dep: Dep::new(runtime),
			runtime: runtime.downgrade(),
		}
	}

	pub fn dep(&self) -> &Rc<Dep> {
		&self.dep
	}

	pub(crate) fn runtime(&self) -> Option<Runtime> {
		self.runtime.upgrade()
	}
}

impl Debug for Observer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Observer").field("dep", &self.dep).finish()
	}
}

/// Makes `value` reactive, recursively.
///
/// Primitives are never wrapped and yield `None`. Observing a container
/// twice returns the observer created the first time.
pub fn observe(runtime: &Runtime, value: &Value) -> Option<Rc<Observer>> {
	match value {
		Value::Object(object) => Some(object.observe_with(runtime)),
		Value::Array(list) => Some(list.observe_with(runtime)),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{value, List, Object};

	#[test]
	fn primitives_are_not_wrapped() {
		let runtime = Runtime::new();
		assert!(observe(&runtime, &Value::from(1)).is_none());
		assert!(observe(&runtime, &Value::Null).is_none());
		assert!(observe(&runtime, &Value::from("text")).is_none());
	}

	#[test]
	fn observing_twice_returns_same_observer() {
		let runtime = Runtime::new();
		let value = value!({ "a": 1 });

		let first = observe(&runtime, &value).unwrap();
		let second = observe(&runtime, &value).unwrap();
		assert!(Rc::ptr_eq(&first, &second));
	}

	#[test]
	fn observation_is_deep() {
		let runtime = Runtime::new();
		let inner = Object::from_iter([("b", Value::from(1))]);
		let nested = List::from(vec![Value::from(Object::new())]);
		let value = Value::from(Object::from_iter([
			("inner", Value::from(inner.clone())),
			("list", Value::from(nested.clone())),
		]));

		observe(&runtime, &value);

		assert!(inner.observer().is_some());
		assert!(nested.observer().is_some());
		assert!(nested.get(0).unwrap().observer().is_some());
	}

	#[test]
	fn self_referencing_object_terminates() {
		let runtime = Runtime::new();
		let object = Object::new();
		object.set("me", object.clone());

		let observer = observe(&runtime, &Value::from(object.clone()));
		assert!(observer.is_some());
		assert!(object.get_once("me").observer().is_some());
	}
}
