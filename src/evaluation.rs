use std::rc::Rc;

use crate::dependencies::Dependencies;
use crate::runtime::Runtime;
use crate::watcher::Watcher;

/// One entry of the runtime's evaluation stack.
pub(crate) struct Frame {
	pub(crate) watcher: Rc<Watcher>,
	pub(crate) dependencies: Dependencies,
}

/// Scoped membership of a watcher on the evaluation stack.
///
/// While the guard lives its watcher is the target every
/// [`Dep::depend`](crate::Dep::depend) records against. The frame is
/// popped by [`Evaluation::finish`] or, if the evaluation bails out
/// early or unwinds, when the guard is dropped.
pub struct Evaluation {
	runtime: Runtime,
	depth: usize,
	finished: bool,
}

impl Evaluation {
	pub(crate) fn enter(runtime: &Runtime, watcher: Rc<Watcher>) -> Self {
		let depth = runtime.push_frame(Frame {
			watcher,
			dependencies: Dependencies::new(),
		});

		Evaluation {
			runtime: runtime.clone(),
			depth,
			finished: false,
		}
	}

	pub fn depth(&self) -> usize {
		self.depth
	}

	/// Pops the frame and hands back what it collected.
	pub fn finish(mut self) -> Dependencies {
		self.finished = true;
		self.runtime
			.pop_frame(self.depth)
			.map(|frame| frame.dependencies)
			.unwrap_or_default()
	}
}

impl Drop for Evaluation {
	fn drop(&mut self) {
		if !self.finished {
			self.runtime.pop_frame(self.depth);
		}
	}
}
