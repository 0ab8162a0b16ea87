use std::fmt::Debug;
use std::rc::Rc;

use crate::{Error, WatcherId};

/// How the runtime defers its flushes until the current
/// synchronous block has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickStrategy {
	/// Host microtasks (`queueMicrotask`). Only available on `wasm32`.
	Microtask,
	/// Tasks wait in the runtime until [`Runtime::tick`](crate::Runtime::tick)
	/// drains them.
	Manual,
}

impl TickStrategy {
	pub fn is_available(self) -> bool {
		match self {
			TickStrategy::Microtask => cfg!(target_arch = "wasm32"),
			TickStrategy::Manual => true,
		}
	}

	/// Picks the first available strategy, starting from `self`.
	pub(crate) fn resolve(self) -> Self {
		if self.is_available() {
			return self;
		}

		tracing::warn!(
			requested = ?self,
			"tick strategy unavailable, falling back to manual ticks"
		);
		TickStrategy::Manual
	}
}

impl Default for TickStrategy {
	fn default() -> Self {
		if TickStrategy::Microtask.is_available() {
			TickStrategy::Microtask
		} else {
			TickStrategy::Manual
		}
	}
}

pub type ErrorHandler = Rc<dyn Fn(WatcherId, &Error)>;

#[derive(Clone, Default)]
pub struct Config {
	pub tick: TickStrategy,
	pub error_handler: Option<ErrorHandler>,
}

impl Config {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn tick(mut self, tick: TickStrategy) -> Self {
		self.tick = tick;
		self
	}

	/// Receives every error raised by a watcher while the scheduler flushes.
	/// Without a handler those errors are logged.
	pub fn error_handler(mut self, handler: impl Fn(WatcherId, &Error) + 'static) -> Self {
		self.error_handler = Some(Rc::new(handler));
		self
	}
}

impl Debug for Config {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Config")
			.field("tick", &self.tick)
			.field("error_handler", &self.error_handler.is_some())
			.finish()
	}
}
