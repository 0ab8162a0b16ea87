use std::rc::Rc;

use fxhash::FxHashMap;

use crate::runtime::Runtime;
use crate::vnode::{Key, Props, VNode};
use crate::{Backend, Error, Handle};

/// What a new tree is patched against.
pub enum Mount {
	/// A pre-existing backend node, replaced by the new tree on first render.
	Handle(Handle),
	/// Nothing: build a detached subtree.
	Detached,
	/// The tree produced by the previous render.
	VNode(VNode),
}

impl From<Handle> for Mount {
	fn from(handle: Handle) -> Self {
		Mount::Handle(handle)
	}
}

impl From<VNode> for Mount {
	fn from(vnode: VNode) -> Self {
		Mount::VNode(vnode)
	}
}

/// Reconciles virtual trees against a [`Backend`].
#[derive(Clone)]
pub struct Patcher {
	runtime: Runtime,
	backend: Rc<dyn Backend>,
}

impl Patcher {
	pub fn new(runtime: &Runtime, backend: Rc<dyn Backend>) -> Self {
		Patcher {
			runtime: runtime.clone(),
			backend,
		}
	}

	pub fn backend(&self) -> &Rc<dyn Backend> {
		&self.backend
	}

	/// Makes the backend match `vnode` and returns the handle of its root.
	/// `vnode` takes ownership of every backend node it ends up describing.
	pub fn patch(&self, old: impl Into<Mount>, vnode: &mut VNode) -> Result<Handle, Error> {
		vnode.validate()?;

		match old.into() {
			Mount::Handle(elm) => {
				let parent = self.backend.parent(elm).ok_or(Error::Detached(elm))?;
				let created = self.create_elm(vnode)?;
				let next = self.backend.next_sibling(elm);
				self.backend.insert_before(parent, created, next);
				self.backend.remove_child(parent, elm);
				tracing::debug!(?created, replaced = ?elm, "mounted");
				Ok(created)
			}
			Mount::Detached => self.create_elm(vnode),
			Mount::VNode(old) => self.patch_vnode(old, vnode),
		}
	}

	fn create_elm(&self, vnode: &mut VNode) -> Result<Handle, Error> {
		if let Some(slot) = vnode.component.as_mut() {
			let elm = slot.init(&self.runtime, &self.backend)?;
			vnode.elm = Some(elm);
			return Ok(elm);
		}

		let elm = match (&vnode.tag, &vnode.text) {
			(Some(tag), _) => {
				let elm = self.backend.create_element(tag);
				self.patch_props(elm, &Props::default(), &vnode.props);
				for child in vnode.children.iter_mut() {
					let child = self.create_elm(child)?;
					self.backend.insert_before(elm, child, None);
				}
				elm
			}
			(None, Some(text)) => self.backend.create_text(text),
			(None, None) => {
				return Err(Error::MalformedNode {
					path: String::from("?"),
					reason: "node has neither a tag nor text",
				})
			}
		};

		vnode.elm = Some(elm);
		Ok(elm)
	}

	fn patch_vnode(&self, old: VNode, vnode: &mut VNode) -> Result<Handle, Error> {
		let old_elm = old.elm().ok_or(Error::Unmounted)?;

		if !old.same_node(vnode) {
			let parent = self.backend.parent(old_elm).ok_or(Error::Detached(old_elm))?;
			let elm = self.create_elm(vnode)?;
			self.backend.replace_child(parent, elm, old_elm);
			return Ok(elm);
		}

		vnode.elm = Some(old_elm);

		if let (Some(slot), Some(old_slot)) = (vnode.component.as_mut(), old.component) {
			slot.instance = old_slot.instance;
			return Ok(old_elm);
		}

		if vnode.is_text() {
			if old.text != vnode.text {
				if let Some(text) = &vnode.text {
					self.backend.set_text(old_elm, text);
				}
			}
			return Ok(old_elm);
		}

		self.patch_props(old_elm, &old.props, &vnode.props);

		match (old.children.is_empty(), vnode.children.is_empty()) {
			(false, false) => self.update_children(old_elm, old.children, &mut vnode.children)?,
			(true, false) => {
				for child in vnode.children.iter_mut() {
					let child = self.create_elm(child)?;
					self.backend.insert_before(old_elm, child, None);
				}
			}
			(false, true) => {
				for child in old.children.iter().filter_map(VNode::elm) {
					self.backend.remove_child(old_elm, child);
				}
			}
			(true, true) => {}
		}

		Ok(old_elm)
	}

	/// Removed style keys are cleared and removed attributes dropped;
	/// everything in `props` is (re)applied.
	fn patch_props(&self, elm: Handle, old: &Props, props: &Props) {
		for (name, _) in old.style() {
			if props.style_value(name).is_none() {
				self.backend.remove_style(elm, name);
			}
		}

		for (name, _) in old.attrs() {
			if props.attr(name).is_none() {
				self.backend.remove_attribute(elm, name);
			}
		}

		for (name, value) in props.style() {
			self.backend.set_style(elm, name, value);
		}

		for (name, value) in props.attrs() {
			self.backend.set_attribute(elm, name, value);
		}
	}

	/// Four-pointer reconciliation of two sibling lists.
	///
	/// Ends are exclusive. Old slots become `None` once their node has
	/// been moved out of order.
	fn update_children(
		&self,
		parent: Handle,
		old_children: Vec<VNode>,
		children: &mut [VNode],
	) -> Result<(), Error> {
		let mut old = old_children.into_iter().map(Some).collect::<Vec<_>>();
		let (mut old_start, mut old_end) = (0, old.len());
		let (mut new_start, mut new_end) = (0, children.len());
		let mut keyed: Option<FxHashMap<Key, usize>> = None;

		while old_start < old_end && new_start < new_end {
			let Some(old_start_vnode) = &old[old_start] else {
				old_start += 1;
				continue;
			};
			let Some(old_end_vnode) = &old[old_end - 1] else {
				old_end -= 1;
				continue;
			};

			let old_start_elm = old_start_vnode.elm();
			let old_end_elm = old_end_vnode.elm();

			if old_start_vnode.same_node(&children[new_start]) {
				if let Some(node) = old[old_start].take() {
					self.patch_vnode(node, &mut children[new_start])?;
				}
				old_start += 1;
				new_start += 1;
			} else if old_end_vnode.same_node(&children[new_end - 1]) {
				if let Some(node) = old[old_end - 1].take() {
					self.patch_vnode(node, &mut children[new_end - 1])?;
				}
				old_end -= 1;
				new_end -= 1;
			} else if old_end_vnode.same_node(&children[new_start]) {
				// Tail moved to the head.
				if let Some(node) = old[old_end - 1].take() {
					let elm = self.patch_vnode(node, &mut children[new_start])?;
					self.backend.insert_before(parent, elm, old_start_elm);
				}
				old_end -= 1;
				new_start += 1;
			} else if old_start_vnode.same_node(&children[new_end - 1]) {
				// Head moved to the tail.
				if let Some(node) = old[old_start].take() {
					let elm = self.patch_vnode(node, &mut children[new_end - 1])?;
					let anchor = old_end_elm.and_then(|elm| self.backend.next_sibling(elm));
					self.backend.insert_before(parent, elm, anchor);
				}
				old_start += 1;
				new_end -= 1;
			} else {
				let keyed = keyed.get_or_insert_with(|| key_to_index(&old));
				let found = children[new_start]
					.key
					.as_ref()
					.and_then(|key| keyed.get(key).copied())
					.filter(|index| {
						old[*index]
							.as_ref()
							.is_some_and(|node| node.same_node(&children[new_start]))
					});

				match found.and_then(|index| old[index].take()) {
					Some(node) => {
						tracing::trace!(key = ?node.key, "moved out of order");
						if let Some(elm) = node.elm() {
							self.backend.insert_before(parent, elm, old_start_elm);
						}
						self.patch_vnode(node, &mut children[new_start])?;
					}
					None => {
						let elm = self.create_elm(&mut children[new_start])?;
						self.backend.insert_before(parent, elm, old_start_elm);
					}
				}
				new_start += 1;
			}
		}

		if new_start < new_end {
			let anchor = children.get(new_end).and_then(VNode::elm);
			for child in &mut children[new_start..new_end] {
				let elm = self.create_elm(child)?;
				self.backend.insert_before(parent, elm, anchor);
			}
		}

		if old_start < old_end {
			for node in old[old_start..old_end].iter().flatten() {
				if let Some(elm) = node.elm() {
					self.backend.remove_child(parent, elm);
				}
			}
		}

		Ok(())
	}
}

fn key_to_index(children: &[Option<VNode>]) -> FxHashMap<Key, usize> {
	children
		.iter()
		.enumerate()
		.filter_map(|(index, child)| Some((child.as_ref()?.key.clone()?, index)))
		.collect()
}
