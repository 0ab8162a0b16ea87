use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::rc::Rc;

use crate::observer::Observer;
use crate::runtime::Runtime;
use crate::value::fmt_container;
use crate::{Value, Var};

/// A keyed state container. Until it is observed its fields are plain
/// values; observation turns every field into a [`Var`].
pub struct Object {
	body: Rc<ObjectBody>,
}

struct ObjectBody {
	fields: RefCell<BTreeMap<Rc<str>, Slot>>,
	observer: RefCell<Option<Rc<Observer>>>,
}

#[derive(Clone)]
enum Slot {
	Plain(Value),
	Reactive(Var),
}

impl Slot {
	fn get_once(&self) -> Value {
		match self {
			Slot::Plain(value) => value.clone(),
			Slot::Reactive(var) => var.get_once(),
		}
	}
}

impl Clone for Object {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

impl Default for Object {
	fn default() -> Self {
		Object::new()
	}
}

impl Object {
	pub fn new() -> Self {
		Object {
			body: Rc::new(ObjectBody {
				fields: RefCell::new(BTreeMap::new()),
				observer: RefCell::new(None),
			}),
		}
	}

	pub fn ptr_eq(&self, other: &Object) -> bool {
		Rc::ptr_eq(&self.body, &other.body)
	}

	pub fn observer(&self) -> Option<Rc<Observer>> {
		self.body.observer.borrow().clone()
	}

	fn slot(&self, key: &str) -> Option<Slot> {
		self.body.fields.borrow().get(key).cloned()
	}

	/// Reads a field, tracking it when the object is observed.
	/// Missing fields read as [`Value::Null`].
	pub fn get(&self, key: &str) -> Value {
		match self.slot(key) {
			Some(Slot::Reactive(var)) => var.get(),
			Some(Slot::Plain(value)) => value,
			None => Value::Null,
		}
	}

	pub fn get_once(&self, key: &str) -> Value {
		self.slot(key).map(|slot| slot.get_once()).unwrap_or_default()
	}

	/// The reactive cell behind `key`, once the object is observed.
	pub fn var(&self, key: &str) -> Option<Var> {
		match self.slot(key)? {
			Slot::Reactive(var) => Some(var),
			Slot::Plain(_) => None,
		}
	}

	/// Writes a field. On an observed object a new key becomes a reactive
	/// field and the container dep is notified.
	pub fn set(&self, key: &str, value: impl Into<Value>) {
		let value = value.into();
		let slot = self.slot(key);
		if let Some(Slot::Reactive(var)) = &slot {
			var.set(value);
			return;
		}

		let runtime = self.observer().and_then(|observer| observer.runtime());
		match runtime {
			Some(runtime) => {
				let var = Var::new(&runtime, value);
				self.body
					.fields
					.borrow_mut()
					.insert(Rc::from(key), Slot::Reactive(var));
				if slot.is_none() {
					self.notify_shape();
				}
			}
			None => {
				self.body
					.fields
					.borrow_mut()
					.insert(Rc::from(key), Slot::Plain(value));
			}
		}
	}

	pub fn remove(&self, key: &str) -> Option<Value> {
		let removed = self.body.fields.borrow_mut().remove(key)?;
		self.notify_shape();
		Some(removed.get_once())
	}

	pub fn contains_key(&self, key: &str) -> bool {
		self.body.fields.borrow().contains_key(key)
	}

	pub fn keys(&self) -> Vec<Rc<str>> {
		self.body.fields.borrow().keys().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.body.fields.borrow().len()
	}

	pub fn is_empty(&self) -> bool {
		self.body.fields.borrow().is_empty()
	}

	fn notify_shape(&self) {
		if let Some(observer) = self.observer() {
			observer.dep().notify();
		}
	}

	pub(crate) fn observe_with(&self, runtime: &Runtime) -> Rc<Observer> {
		if let Some(observer) = self.observer() {
			return observer;
		}

		// The marker goes on first so that cycles stop here.
		let observer = Rc::new(Observer::new(runtime));
		*self.body.observer.borrow_mut() = Some(observer.clone());

		let plain = self
			.body
			.fields
			.borrow()
			.iter()
			.filter_map(|(key, slot)| match slot {
				Slot::Plain(value) => Some((key.clone(), value.clone())),
				Slot::Reactive(_) => None,
			})
			.collect::<Vec<_>>();

		for (key, value) in plain {
			let var = Var::new(runtime, value);
			self.body.fields.borrow_mut().insert(key, Slot::Reactive(var));
		}

		tracing::trace!(dep = %observer.dep().id(), fields = self.len(), "observed object");
		observer
	}
}

impl<K, V> FromIterator<(K, V)> for Object
where
	K: Into<Rc<str>>,
	V: Into<Value>,
{
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		let object = Object::new();
		{
			let mut fields = object.body.fields.borrow_mut();
			for (key, value) in iter {
				fields.insert(key.into(), Slot::Plain(value.into()));
			}
		}
		object
	}
}

impl Debug for Object {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let addr = Rc::as_ptr(&self.body) as usize;
		fmt_container(addr, f, "{..}", |f| {
			let fields = self
				.body
				.fields
				.borrow()
				.iter()
				.map(|(key, slot)| (key.clone(), slot.get_once()))
				.collect::<Vec<_>>();
			f.debug_map().entries(fields).finish()
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::value;

	#[test]
	fn plain_fields_become_reactive_on_observe() {
		let runtime = Runtime::new();
		let object = Object::from_iter([("a", 1)]);
		assert!(object.var("a").is_none());

		runtime.observe(&Value::from(object.clone()));
		assert!(object.var("a").is_some());
		assert_eq!(object.get_once("a"), Value::from(1));
	}

	#[test]
	fn new_key_on_observed_object_notifies_shape() {
		let runtime = Runtime::new();
		let value = value!({ "a": 1 });
		let object = value.as_object().unwrap().clone();
		let observer = runtime.observe(&value).unwrap();

		let seen = std::rc::Rc::new(std::cell::Cell::new(0));
		let _watcher = crate::Watcher::user(
			&runtime,
			Box::new({
				let observer = observer.clone();
				move || {
					observer.dep().depend();
					Ok(Value::Null)
				}
			}),
			Box::new({
				let seen = seen.clone();
				move |_: &Value, _: &Value| seen.set(seen.get() + 1)
			}),
			crate::WatchOptions::new().deep(true),
		)
		.unwrap();

		object.set("b", 2);
		assert!(object.var("b").is_some());
		runtime.tick();
		assert_eq!(seen.get(), 1);

		object.remove("a");
		runtime.tick();
		assert_eq!(seen.get(), 2);
	}

	#[test]
	fn missing_field_reads_null() {
		let object = Object::new();
		assert!(object.get("nope").is_null());
	}

	#[test]
	fn self_referencing_debug_terminates() {
		let object = Object::new();
		object.set("me", object.clone());
		assert_eq!(format!("{object:?}"), r#"{"me": {..}}"#);
	}
}
