use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use fxhash::FxHashSet;

use crate::dep::DepId;
use crate::dependencies::Dependencies;
use crate::evaluation::Evaluation;
use crate::runtime::{Runtime, WeakRuntime};
use crate::{Error, Subscriber, Value, WatcherId};

pub type Getter = Box<dyn Fn() -> Result<Value, Error>>;
pub type Callback = Box<dyn Fn(&Value, &Value)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherKind {
	/// Re-renders a component and patches the result. Eager.
	Render,
	/// Backs a computed property. Lazy: a change only marks it dirty.
	Computed,
	/// An explicit watch expression with a callback. Eager.
	User,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
	pub deep: bool,
	pub immediate: bool,
}

impl WatchOptions {
	pub fn new() -> Self {
		Self::default()
	}

	/// Also depend on everything nested inside the watched value.
	pub fn deep(mut self, deep: bool) -> Self {
		self.deep = deep;
		self
	}

	/// Fire the callback once at registration.
	pub fn immediate(mut self, immediate: bool) -> Self {
		self.immediate = immediate;
		self
	}
}

/// A tracked computation. Each evaluation rebuilds the set of deps it
/// read; deps that were not read again drop the subscription.
pub struct Watcher {
	id: WatcherId,
	kind: WatcherKind,
	runtime: WeakRuntime,
	getter: Getter,
	callback: Option<Callback>,
	deep: bool,
	value: RefCell<Value>,
	dirty: Cell<bool>,
	dependencies: RefCell<Dependencies>,
	this: Weak<Watcher>,
}

impl Watcher {
	fn build(
		runtime: &Runtime,
		kind: WatcherKind,
		getter: Getter,
		callback: Option<Callback>,
		deep: bool,
	) -> Rc<Self> {
		Rc::new_cyclic(|this| Watcher {
			id: runtime.next_watcher_id(),
			kind,
			runtime: runtime.downgrade(),
			getter,
			callback,
			deep,
			value: RefCell::new(Value::Null),
			dirty: Cell::new(kind == WatcherKind::Computed),
			dependencies: RefCell::new(Dependencies::new()),
			this: this.clone(),
		})
	}

	/// Creates a render watcher and evaluates it once.
	pub fn render(runtime: &Runtime, getter: Getter) -> Result<Rc<Self>, Error> {
		let watcher = Self::build(runtime, WatcherKind::Render, getter, None, false);
		tracing::debug!(watcher = %watcher.id, "render watcher created");
		watcher.get()?;
		Ok(watcher)
	}

	/// Creates a lazy watcher. Nothing is evaluated until the first
	/// [`Watcher::value`].
	pub fn computed(runtime: &Runtime, getter: Getter) -> Rc<Self> {
		Self::build(runtime, WatcherKind::Computed, getter, None, false)
	}

	/// Creates a user watcher and evaluates it once to record the
	/// initial value.
	pub fn user(
		runtime: &Runtime,
		getter: Getter,
		callback: Callback,
		options: WatchOptions,
	) -> Result<Rc<Self>, Error> {
		let watcher = Self::build(
			runtime,
			WatcherKind::User,
			getter,
			Some(callback),
			options.deep,
		);

		let value = watcher.get()?;
		*watcher.value.borrow_mut() = value.clone();
		if options.immediate {
			if let Some(callback) = &watcher.callback {
				callback(&value, &Value::Null);
			}
		}

		Ok(watcher)
	}

	#[inline]
	pub fn id(&self) -> WatcherId {
		self.id
	}

	#[inline]
	pub fn kind(&self) -> WatcherKind {
		self.kind
	}

	pub fn is_dirty(&self) -> bool {
		self.dirty.get()
	}

	pub fn depends_on(&self, dep: DepId) -> bool {
		self.dependencies.borrow().contains(dep)
	}

	pub fn dependency_count(&self) -> usize {
		self.dependencies.borrow().len()
	}

	fn runtime(&self) -> Result<Runtime, Error> {
		self.runtime.upgrade().ok_or(Error::Dropped)
	}

	/// Evaluates the getter with this watcher on top of the evaluation
	/// stack and replaces the recorded dependency set.
	pub fn get(&self) -> Result<Value, Error> {
		let runtime = self.runtime()?;
		let this = self.this.upgrade().ok_or(Error::Dropped)?;

		let evaluation = Evaluation::enter(&runtime, this);
		let result = (self.getter)().inspect(|value| {
			if self.deep {
				traverse(value, &mut FxHashSet::default());
			}
		});
		let collected = evaluation.finish();

		self.dependencies.borrow_mut().swap(collected, self.id);
		result
	}

	/// Recomputes a lazy watcher's cached value and clears `dirty`.
	/// On failure the watcher stays dirty.
	pub fn evaluate(&self) -> Result<(), Error> {
		let value = self.get()?;
		*self.value.borrow_mut() = value;
		self.dirty.set(false);
		Ok(())
	}

	/// The current value. A dirty computed watcher is evaluated first,
	/// and if another watcher is evaluating, it inherits this watcher's
	/// dependencies.
	pub fn value(&self) -> Result<Value, Error> {
		if self.kind == WatcherKind::Computed {
			if self.dirty.get() {
				self.evaluate()?;
			}

			if self.runtime()?.is_tracking() {
				self.propagate_dependencies();
			}
		}

		Ok(self.value.borrow().clone())
	}

	/// Records every dep this watcher read against the watcher currently
	/// on top of the evaluation stack.
	pub fn propagate_dependencies(&self) {
		let deps = self.dependencies.borrow().iter().cloned().collect::<Vec<_>>();
		for dep in deps {
			dep.depend();
		}
	}

	/// Re-runs the watcher as the scheduler does.
	pub fn run(&self) -> Result<(), Error> {
		match self.kind {
			WatcherKind::Computed => self.evaluate(),
			WatcherKind::Render => self.get().map(|_| ()),
			WatcherKind::User => {
				let value = self.get()?;
				let old = self.value.replace(value.clone());
				if !value.same(&old) || value.is_container() || self.deep {
					if let Some(callback) = &self.callback {
						callback(&value, &old);
					}
				}
				Ok(())
			}
		}
	}

	/// Unsubscribes from every dependency. The watcher stays usable
	/// and resubscribes on its next evaluation.
	pub fn teardown(&self) {
		self.dependencies.borrow_mut().drop(self.id);
	}
}

impl Subscriber for Watcher {
	fn id(&self) -> WatcherId {
		self.id
	}

	fn update(&self) {
		if self.kind == WatcherKind::Computed {
			self.dirty.set(true);
			return;
		}

		if let (Some(runtime), Some(this)) = (self.runtime.upgrade(), self.this.upgrade()) {
			runtime.queue_watcher(this);
		}
	}
}

impl Drop for Watcher {
	fn drop(&mut self) {
		self.dependencies.get_mut().drop(self.id);
	}
}

impl Debug for Watcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Watcher")
			.field("id", &self.id)
			.field("kind", &self.kind)
			.field("dirty", &self.dirty.get())
			.field("deps", &self.dependency_count())
			.finish()
	}
}

/// Reads every field and container dep reachable from `value`.
fn traverse(value: &Value, seen: &mut FxHashSet<DepId>) {
	let Some(observer) = value.observer() else {
		return;
	};

	if !seen.insert(observer.dep().id()) {
		return;
	}

	observer.dep().depend();
	match value {
		Value::Object(object) => {
			for key in object.keys() {
				traverse(&object.get(&key), seen);
			}
		}
		Value::Array(list) => {
			for item in list.iter() {
				traverse(&item, seen);
			}
		}
		_ => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{value, Var};

	fn counter() -> (Rc<Cell<usize>>, impl Fn()) {
		let count = Rc::new(Cell::new(0));
		let bump = {
			let count = count.clone();
			move || count.set(count.get() + 1)
		};
		(count, bump)
	}

	#[test]
	fn computed_is_lazy_and_cached() {
		let runtime = Runtime::new();
		let a = Var::new(&runtime, 2);
		let (calls, bump) = counter();

		let double = Watcher::computed(
			&runtime,
			Box::new({
				let a = a.clone();
				move || {
					bump();
					Ok(Value::from(a.get().as_number().unwrap_or_default() * 2.0))
				}
			}),
		);
		assert_eq!(calls.get(), 0);

		assert_eq!(double.value().unwrap(), Value::from(4));
		assert_eq!(double.value().unwrap(), Value::from(4));
		assert_eq!(calls.get(), 1);

		a.set(5);
		assert!(double.is_dirty());
		assert_eq!(calls.get(), 1);
		assert!(!runtime.has_pending_work());

		assert_eq!(double.value().unwrap(), Value::from(10));
		assert_eq!(calls.get(), 2);
	}

	#[test]
	fn stale_dependencies_are_dropped() {
		let runtime = Runtime::new();
		let flag = Var::new(&runtime, true);
		let a = Var::new(&runtime, "a");
		let b = Var::new(&runtime, "b");

		let watcher = Watcher::render(
			&runtime,
			Box::new({
				let (flag, a, b) = (flag.clone(), a.clone(), b.clone());
				move || {
					if flag.get().as_bool().unwrap_or_default() {
						Ok(a.get())
					} else {
						Ok(b.get())
					}
				}
			}),
		)
		.unwrap();
		assert!(watcher.depends_on(a.dep().id()));
		assert!(a.dep().has_sub(watcher.id()));

		flag.set(false);
		runtime.tick();

		assert!(!watcher.depends_on(a.dep().id()));
		assert!(!a.dep().has_sub(watcher.id()));
		assert!(b.dep().has_sub(watcher.id()));

		a.set("changed");
		assert!(!runtime.has_pending_work());
	}

	#[test]
	fn failed_evaluation_restores_stack() {
		let runtime = Runtime::new();
		let a = Var::new(&runtime, 1);

		let broken = Watcher::computed(
			&runtime,
			Box::new({
				let a = a.clone();
				move || {
					a.get();
					Err(Error::custom("boom"))
				}
			}),
		);

		assert!(broken.value().is_err());
		assert!(broken.is_dirty());
		assert_eq!(runtime.tracking_depth(), 0);

		let healthy = Watcher::computed(
			&runtime,
			Box::new({
				let a = a.clone();
				move || Ok(a.get())
			}),
		);
		assert_eq!(healthy.value().unwrap(), Value::from(1));
		assert!(a.dep().has_sub(healthy.id()));
	}

	#[test]
	fn panicking_evaluation_restores_stack() {
		let runtime = Runtime::new();
		let watcher = Watcher::computed(
			&runtime,
			Box::new(|| -> Result<Value, Error> { panic!("boom") }),
		);

		let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| watcher.value()));
		assert!(result.is_err());
		assert_eq!(runtime.tracking_depth(), 0);
	}

	#[test]
	fn computed_propagates_to_outer_watcher() {
		let runtime = Runtime::new();
		let a = Var::new(&runtime, 1);

		let computed = Watcher::computed(
			&runtime,
			Box::new({
				let a = a.clone();
				move || Ok(a.get())
			}),
		);

		let (renders, bump) = counter();
		let render = Watcher::render(
			&runtime,
			Box::new({
				let computed = computed.clone();
				move || {
					bump();
					computed.value()
				}
			}),
		)
		.unwrap();

		assert!(render.depends_on(a.dep().id()));
		assert!(a.dep().has_sub(computed.id()));

		a.set(2);
		runtime.tick();
		assert_eq!(renders.get(), 2);
		assert_eq!(computed.value().unwrap(), Value::from(2));
	}

	#[test]
	fn user_watcher_receives_new_and_old() {
		let runtime = Runtime::new();
		let a = Var::new(&runtime, 1);
		let seen = Rc::new(RefCell::new(Vec::new()));

		let _watcher = Watcher::user(
			&runtime,
			Box::new({
				let a = a.clone();
				move || Ok(a.get())
			}),
			Box::new({
				let seen = seen.clone();
				move |new: &Value, old: &Value| seen.borrow_mut().push((new.clone(), old.clone()))
			}),
			WatchOptions::new().immediate(true),
		)
		.unwrap();

		a.set(2);
		runtime.tick();

		assert_eq!(
			*seen.borrow(),
			vec![
				(Value::from(1), Value::Null),
				(Value::from(2), Value::from(1)),
			]
		);
	}

	#[test]
	fn deep_watcher_sees_nested_changes() {
		let runtime = Runtime::new();
		let state = Var::new(&runtime, value!({ "user": { "name": "ann" } }));
		let (calls, bump) = counter();

		let _watcher = Watcher::user(
			&runtime,
			Box::new({
				let state = state.clone();
				move || Ok(state.get())
			}),
			Box::new(move |_: &Value, _: &Value| bump()),
			WatchOptions::new().deep(true),
		)
		.unwrap();

		let user = state.get_once().as_object().unwrap().get_once("user");
		user.as_object().unwrap().set("name", "bob");
		runtime.tick();

		assert_eq!(calls.get(), 1);
	}
}
