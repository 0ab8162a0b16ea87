pub mod macros;

mod backend;
mod component;
mod config;
mod dep;
mod dependencies;
mod error;
mod evaluation;
mod list;
mod memory;
mod object;
mod observer;
mod patch;
mod runtime;
mod scheduler;
mod value;
mod var;
mod vnode;
mod watcher;

#[cfg(target_arch = "wasm32")]
mod microtask;

pub use backend::{Backend, Handle};
pub use component::{Component, ComponentOptions, WatchSource};
pub use config::{Config, ErrorHandler, TickStrategy};
pub use dep::{Dep, DepId};
pub use dependencies::Dependencies;
pub use error::Error;
pub use evaluation::Evaluation;
pub use list::List;
pub use memory::{MemoryBackend, Op};
pub use object::Object;
pub use observer::{observe, Observer};
pub use patch::{Mount, Patcher};
pub use runtime::Runtime;
pub use value::Value;
pub use var::Var;
pub use vnode::{ComponentSlot, Key, Props, VNode};
pub use watcher::{Callback, Getter, WatchOptions, Watcher, WatcherKind};

/// Something a [`Dep`] can notify.
#[cfg_attr(test, mockall::automock)]
pub trait Subscriber: 'static {
	/// Creation-order identity, used to deduplicate subscriptions
	/// and to order scheduler flushes.
	fn id(&self) -> WatcherId;

	/// Called synchronously when a dependency changed.
	fn update(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WatcherId(u64);

impl WatcherId {
	pub fn new(id: u64) -> Self {
		WatcherId(id)
	}

	pub fn get(self) -> u64 {
		self.0
	}
}

impl std::fmt::Display for WatcherId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "#{}", self.0)
	}
}
