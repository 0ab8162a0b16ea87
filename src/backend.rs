/// Opaque identity of one backend node. Minted by the backend;
/// a live [`VNode`](crate::VNode) owns at most one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
	pub fn new(raw: u64) -> Self {
		Handle(raw)
	}

	pub fn raw(self) -> u64 {
		self.0
	}
}

/// The output surface the patcher mutates.
///
/// Methods take `&self`: a child component mounts (and patches) while
/// its parent's patch is still running.
pub trait Backend {
	fn create_element(&self, tag: &str) -> Handle;

	fn create_text(&self, text: &str) -> Handle;

	fn set_text(&self, node: Handle, text: &str);

	fn set_attribute(&self, node: Handle, name: &str, value: &str);

	fn remove_attribute(&self, node: Handle, name: &str);

	fn set_style(&self, node: Handle, name: &str, value: &str);

	fn remove_style(&self, node: Handle, name: &str);

	fn parent(&self, node: Handle) -> Option<Handle>;

	fn next_sibling(&self, node: Handle) -> Option<Handle>;

	/// Inserts `child` before `anchor`, or appends it when `anchor` is `None`.
	/// A child that is already attached somewhere is moved.
	fn insert_before(&self, parent: Handle, child: Handle, anchor: Option<Handle>);

	fn remove_child(&self, parent: Handle, child: Handle);

	/// Puts `new` where `old` is and detaches `old`.
	fn replace_child(&self, parent: Handle, new: Handle, old: Handle);
}
