use std::cell::{Cell, OnceCell, Ref, RefCell};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use enclose::enclose;

use crate::patch::{Mount, Patcher};
use crate::runtime::Runtime;
use crate::watcher::Getter;
use crate::{Backend, Error, Handle, Object, VNode, Value, WatchOptions, Watcher};

static NEXT_CID: AtomicU64 = AtomicU64::new(1);

type DataFn = Rc<dyn Fn() -> Value>;
type ComputedFn = Rc<dyn Fn(&Component) -> Result<Value, Error>>;
type WatchFn = Rc<dyn Fn(&Component, &Value, &Value)>;
type RenderFn = Rc<dyn Fn(&Component) -> Result<VNode, Error>>;
type Hook = Rc<dyn Fn(&Component)>;

/// What a watch entry observes.
#[derive(Clone)]
pub enum WatchSource {
	/// A dotted path into the component state, e.g. `user.name`.
	Path(Rc<str>),
	Getter(ComputedFn),
}

impl From<&str> for WatchSource {
	fn from(path: &str) -> Self {
		WatchSource::Path(Rc::from(path))
	}
}

impl WatchSource {
	pub fn getter(getter: impl Fn(&Component) -> Result<Value, Error> + 'static) -> Self {
		WatchSource::Getter(Rc::new(getter))
	}
}

/// Declarative description of a component type.
///
/// Every `ComponentOptions` value gets its own component id, so two
/// definitions sharing a name never match as the same node.
#[derive(Clone)]
pub struct ComponentOptions {
	cid: u64,
	name: Rc<str>,
	data: Option<DataFn>,
	computed: Vec<(Rc<str>, ComputedFn)>,
	watch: Vec<(WatchSource, WatchFn, WatchOptions)>,
	render: Option<RenderFn>,
	before_setup: Vec<Hook>,
	after_setup: Vec<Hook>,
}

impl ComponentOptions {
	pub fn new(name: &str) -> Self {
		ComponentOptions {
			cid: NEXT_CID.fetch_add(1, Ordering::Relaxed),
			name: Rc::from(name),
			data: None,
			computed: Vec::new(),
			watch: Vec::new(),
			render: None,
			before_setup: Vec::new(),
			after_setup: Vec::new(),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Tag used by component nodes of this type.
	pub fn tag(&self) -> String {
		format!("component-{}-{}", self.cid, self.name)
	}

	/// Factory for the initial state. It must produce an object.
	pub fn data(mut self, data: impl Fn() -> Value + 'static) -> Self {
		self.data = Some(Rc::new(data));
		self
	}

	pub fn computed(
		mut self,
		name: &str,
		getter: impl Fn(&Component) -> Result<Value, Error> + 'static,
	) -> Self {
		self.computed.push((Rc::from(name), Rc::new(getter)));
		self
	}

	pub fn watch(
		mut self,
		source: impl Into<WatchSource>,
		callback: impl Fn(&Component, &Value, &Value) + 'static,
		options: WatchOptions,
	) -> Self {
		self.watch.push((source.into(), Rc::new(callback), options));
		self
	}

	pub fn render(mut self, render: impl Fn(&Component) -> Result<VNode, Error> + 'static) -> Self {
		self.render = Some(Rc::new(render));
		self
	}

	/// Runs before the state exists.
	pub fn before_setup(mut self, hook: impl Fn(&Component) + 'static) -> Self {
		self.before_setup.push(Rc::new(hook));
		self
	}

	/// Runs once state, computed properties and watchers are in place.
	pub fn after_setup(mut self, hook: impl Fn(&Component) + 'static) -> Self {
		self.after_setup.push(Rc::new(hook));
		self
	}
}

impl Debug for ComponentOptions {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ComponentOptions")
			.field("cid", &self.cid)
			.field("name", &self.name)
			.field("computed", &self.computed.len())
			.field("watch", &self.watch.len())
			.finish()
	}
}

/// A live component: observed state, its computed and user watchers,
/// and the render watcher that keeps the backend in sync once mounted.
pub struct Component {
	options: Rc<ComponentOptions>,
	runtime: Runtime,
	patcher: Patcher,
	state: OnceCell<Object>,
	computed: RefCell<BTreeMap<Rc<str>, Rc<Watcher>>>,
	watchers: RefCell<Vec<Rc<Watcher>>>,
	render_watcher: OnceCell<Rc<Watcher>>,
	vnode: RefCell<Option<VNode>>,
	target: Cell<Option<Handle>>,
	root: Cell<Option<Handle>>,
	this: Weak<Component>,
}

impl Component {
	pub fn new(
		runtime: &Runtime,
		backend: Rc<dyn Backend>,
		options: Rc<ComponentOptions>,
	) -> Result<Rc<Self>, Error> {
		let component = Rc::new_cyclic(|this| Component {
			options: options.clone(),
			runtime: runtime.clone(),
			patcher: Patcher::new(runtime, backend),
			state: OnceCell::new(),
			computed: RefCell::new(BTreeMap::new()),
			watchers: RefCell::new(Vec::new()),
			render_watcher: OnceCell::new(),
			vnode: RefCell::new(None),
			target: Cell::new(None),
			root: Cell::new(None),
			this: this.clone(),
		});

		for hook in &options.before_setup {
			hook(&component);
		}

		let data = match &options.data {
			Some(data) => data(),
			None => Value::Object(Object::new()),
		};
		let Value::Object(state) = data else {
			return Err(Error::InvalidState);
		};
		state.observe_with(runtime);
		let _ = component.state.set(state);

		for (name, getter) in &options.computed {
			let this = component.this.clone();
			let watcher = Watcher::computed(
				runtime,
				Box::new(enclose!((getter) move || {
					let this = this.upgrade().ok_or(Error::Dropped)?;
					getter(&this)
				})),
			);
			component.computed.borrow_mut().insert(name.clone(), watcher);
		}

		for (source, callback, watch) in &options.watch {
			let getter = component.source_getter(source.clone());
			component.watch_with(getter, callback.clone(), *watch)?;
		}

		for hook in &options.after_setup {
			hook(&component);
		}

		tracing::debug!(name = %options.name, "component created");
		Ok(component)
	}

	pub fn name(&self) -> &str {
		&self.options.name
	}

	pub fn options(&self) -> &Rc<ComponentOptions> {
		&self.options
	}

	pub fn runtime(&self) -> &Runtime {
		&self.runtime
	}

	/// The observed state object. `None` only inside `before_setup` hooks.
	pub fn state(&self) -> Option<&Object> {
		self.state.get()
	}

	/// Reads a dotted path from the state, tracking every step.
	/// Missing segments read as [`Value::Null`].
	pub fn get(&self, path: &str) -> Value {
		match self.state.get() {
			Some(state) => resolve(Value::Object(state.clone()), path.split('.'), true),
			None => Value::Null,
		}
	}

	/// Writes a dotted path. Every segment but the last must resolve to
	/// an object or list.
	pub fn set(&self, path: &str, value: impl Into<Value>) -> Result<(), Error> {
		let state = self.state.get().ok_or(Error::InvalidState)?;
		let value = value.into();
		let (parent, key) = match path.rsplit_once('.') {
			Some((parent, key)) => (
				resolve(Value::Object(state.clone()), parent.split('.'), false),
				key,
			),
			None => (Value::Object(state.clone()), path),
		};

		match (parent, key.parse::<usize>()) {
			(Value::Object(object), _) => object.set(key, value),
			(Value::Array(list), Ok(index)) if index < list.len() => {
				list.splice(index, 1, [value]);
			}
			_ => return Err(Error::custom(format!("cannot assign to `{path}`"))),
		}

		Ok(())
	}

	/// Current value of a computed property, re-evaluated if dirty.
	pub fn computed(&self, name: &str) -> Result<Value, Error> {
		let watcher = self
			.computed
			.borrow()
			.get(name)
			.cloned()
			.ok_or_else(|| Error::UnknownComputed(Rc::from(name)))?;
		watcher.value()
	}

	/// Registers a user watcher on an arbitrary expression.
	pub fn watch(
		&self,
		getter: impl Fn(&Component) -> Result<Value, Error> + 'static,
		callback: impl Fn(&Component, &Value, &Value) + 'static,
		options: WatchOptions,
	) -> Result<Rc<Watcher>, Error> {
		let getter = self.source_getter(WatchSource::getter(getter));
		self.watch_with(getter, Rc::new(callback), options)
	}

	/// Registers a user watcher on a dotted state path.
	pub fn watch_path(
		&self,
		path: &str,
		callback: impl Fn(&Component, &Value, &Value) + 'static,
		options: WatchOptions,
	) -> Result<Rc<Watcher>, Error> {
		let getter = self.source_getter(WatchSource::from(path));
		self.watch_with(getter, Rc::new(callback), options)
	}

	fn source_getter(&self, source: WatchSource) -> Getter {
		let this = self.this.clone();
		match source {
			WatchSource::Path(path) => Box::new(move || match this.upgrade() {
				Some(this) => Ok(this.get(&path)),
				None => Ok(Value::Null),
			}),
			WatchSource::Getter(getter) => Box::new(move || match this.upgrade() {
				Some(this) => getter(&this),
				None => Ok(Value::Null),
			}),
		}
	}

	fn watch_with(
		&self,
		getter: Getter,
		callback: WatchFn,
		options: WatchOptions,
	) -> Result<Rc<Watcher>, Error> {
		let this = self.this.clone();
		let watcher = Watcher::user(
			&self.runtime,
			getter,
			Box::new(move |new: &Value, old: &Value| {
				if let Some(this) = this.upgrade() {
					callback(&this, new, old);
				}
			}),
			options,
		)?;

		self.watchers.borrow_mut().push(watcher.clone());
		Ok(watcher)
	}

	/// Mounts onto `target`, which the rendered root replaces.
	pub fn mount(&self, target: Handle) -> Result<Handle, Error> {
		self.target.set(Some(target));
		self.start()
	}

	/// Renders into a subtree that is not attached anywhere yet.
	pub fn mount_detached(&self) -> Result<Handle, Error> {
		self.start()
	}

	fn start(&self) -> Result<Handle, Error> {
		if self.render_watcher.get().is_some() {
			return Err(Error::custom(format!("component `{}` is already mounted", self.name())));
		}

		let this = self.this.clone();
		let watcher = Watcher::render(
			&self.runtime,
			// A child removed from its parent may still have a render queued.
			Box::new(move || match this.upgrade() {
				Some(this) => this.update().map(|_| Value::Null),
				None => Ok(Value::Null),
			}),
		)?;
		let _ = self.render_watcher.set(watcher);

		self.root.get().ok_or(Error::Unmounted)
	}

	/// One render pass: render, then patch against the previous tree or
	/// the mount target.
	fn update(&self) -> Result<Handle, Error> {
		let render = self.options.render.clone().ok_or_else(|| {
			Error::custom(format!("component `{}` has no render function", self.name()))
		})?;

		let mut vnode = render(self)?;
		vnode.validate()?;

		// A failed patch leaves no tree to diff against. The last root is
		// replaced whole while it is still attached.
		let previous = self.vnode.borrow_mut().take();
		let old = match previous {
			Some(previous) => Mount::VNode(previous),
			None => self
				.target
				.get()
				.or_else(|| self.attached_root())
				.map_or(Mount::Detached, Mount::Handle),
		};

		let root = self.patcher.patch(old, &mut vnode)?;
		tracing::debug!(name = %self.options.name, ?root, "patched");

		self.target.set(None);
		self.root.set(Some(root));
		*self.vnode.borrow_mut() = Some(vnode);
		Ok(root)
	}

	fn attached_root(&self) -> Option<Handle> {
		self.root
			.get()
			.filter(|root| self.patcher.backend().parent(*root).is_some())
	}

	/// Queues a re-render even though no dependency changed.
	pub fn force_update(&self) {
		if let Some(watcher) = self.render_watcher.get() {
			self.runtime.queue_watcher(watcher.clone());
		}
	}

	pub fn next_tick(&self, callback: impl FnOnce() + 'static) {
		self.runtime.next_tick(callback);
	}

	/// Backend handle of the rendered root, once mounted.
	pub fn root(&self) -> Option<Handle> {
		self.root.get()
	}

	/// The tree retained from the last successful render.
	pub fn vnode(&self) -> Ref<'_, Option<VNode>> {
		self.vnode.borrow()
	}

	pub fn render_watcher(&self) -> Option<&Rc<Watcher>> {
		self.render_watcher.get()
	}
}

impl Debug for Component {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Component")
			.field("name", &self.options.name)
			.field("root", &self.root.get())
			.field("watchers", &self.watchers.borrow().len())
			.finish()
	}
}

fn resolve<'a>(value: Value, path: impl Iterator<Item = &'a str>, tracked: bool) -> Value {
	path.fold(value, |value, segment| match value {
		Value::Object(object) if tracked => object.get(segment),
		Value::Object(object) => object.get_once(segment),
		Value::Array(list) => segment
			.parse::<usize>()
			.ok()
			.and_then(|index| list.get(index))
			.unwrap_or_default(),
		_ => Value::Null,
	})
}
