use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Write;

use fxhash::FxHashMap;

use crate::{Backend, Handle};

/// One recorded backend call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
	CreateElement { node: Handle, tag: String },
	CreateText { node: Handle, text: String },
	SetText { node: Handle, text: String },
	SetAttribute { node: Handle, name: String, value: String },
	RemoveAttribute { node: Handle, name: String },
	SetStyle { node: Handle, name: String, value: String },
	RemoveStyle { node: Handle, name: String },
	/// A detached node was attached.
	Insert { parent: Handle, child: Handle, anchor: Option<Handle> },
	/// An attached node changed position.
	Move { parent: Handle, child: Handle, anchor: Option<Handle> },
	Remove { parent: Handle, child: Handle },
	Replace { parent: Handle, new: Handle, old: Handle },
}

impl Op {
	pub fn is_create(&self) -> bool {
		matches!(self, Op::CreateElement { .. } | Op::CreateText { .. })
	}

	pub fn is_move(&self) -> bool {
		matches!(self, Op::Move { .. })
	}

	pub fn is_remove(&self) -> bool {
		matches!(self, Op::Remove { .. })
	}
}

#[derive(Debug)]
enum NodeKind {
	Element {
		tag: String,
		attributes: BTreeMap<String, String>,
		style: BTreeMap<String, String>,
	},
	Text(String),
}

#[derive(Debug)]
struct Node {
	kind: NodeKind,
	parent: Option<Handle>,
	children: Vec<Handle>,
}

#[derive(Default)]
struct Arena {
	nodes: FxHashMap<Handle, Node>,
	next: u64,
	log: Vec<Op>,
}

impl Arena {
	fn alloc(&mut self, kind: NodeKind) -> Handle {
		self.next += 1;
		let handle = Handle::new(self.next);
		self.nodes.insert(
			handle,
			Node {
				kind,
				parent: None,
				children: Vec::new(),
			},
		);
		handle
	}

	fn detach(&mut self, child: Handle) {
		let parent = self.nodes.get_mut(&child).and_then(|node| node.parent.take());
		if let Some(parent) = parent.and_then(|parent| self.nodes.get_mut(&parent)) {
			parent.children.retain(|c| *c != child);
		}
	}
}

/// In-memory node tree that records every call it receives.
#[derive(Default)]
pub struct MemoryBackend {
	arena: RefCell<Arena>,
}

impl MemoryBackend {
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a container element with an empty placeholder inside,
	/// returning `(container, placeholder)`. Mount onto the placeholder.
	pub fn mount_point(&self) -> (Handle, Handle) {
		let container = self.create_element("root");
		let placeholder = self.create_element("mount");
		self.insert_before(container, placeholder, None);
		self.clear_log();
		(container, placeholder)
	}

	pub fn ops(&self) -> Vec<Op> {
		self.arena.borrow().log.clone()
	}

	pub fn take_ops(&self) -> Vec<Op> {
		std::mem::take(&mut self.arena.borrow_mut().log)
	}

	pub fn clear_log(&self) {
		self.arena.borrow_mut().log.clear();
	}

	pub fn children(&self, node: Handle) -> Vec<Handle> {
		self.arena
			.borrow()
			.nodes
			.get(&node)
			.map(|node| node.children.clone())
			.unwrap_or_default()
	}

	pub fn tag(&self, node: Handle) -> Option<String> {
		match &self.arena.borrow().nodes.get(&node)?.kind {
			NodeKind::Element { tag, .. } => Some(tag.clone()),
			NodeKind::Text(_) => None,
		}
	}

	/// Text content: the text itself, or the concatenated text of descendants.
	pub fn text(&self, node: Handle) -> String {
		let arena = self.arena.borrow();
		let mut out = String::new();
		collect_text(&arena, node, &mut out);
		out
	}

	pub fn attribute(&self, node: Handle, name: &str) -> Option<String> {
		match &self.arena.borrow().nodes.get(&node)?.kind {
			NodeKind::Element { attributes, .. } => attributes.get(name).cloned(),
			NodeKind::Text(_) => None,
		}
	}

	pub fn style(&self, node: Handle, name: &str) -> Option<String> {
		match &self.arena.borrow().nodes.get(&node)?.kind {
			NodeKind::Element { style, .. } => style.get(name).cloned(),
			NodeKind::Text(_) => None,
		}
	}

	/// Serializes `node` and its subtree, e.g. `<ul><li id="a">a</li></ul>`.
	pub fn markup(&self, node: Handle) -> String {
		let arena = self.arena.borrow();
		let mut out = String::new();
		write_markup(&arena, node, &mut out);
		out
	}

	fn record(&self, op: Op) {
		self.arena.borrow_mut().log.push(op);
	}

	fn with_element(
		&self,
		node: Handle,
		func: impl FnOnce(&mut BTreeMap<String, String>, &mut BTreeMap<String, String>),
	) {
		let mut arena = self.arena.borrow_mut();
		match arena.nodes.get_mut(&node).map(|node| &mut node.kind) {
			Some(NodeKind::Element {
				attributes, style, ..
			}) => func(attributes, style),
			_ => tracing::warn!(?node, "not an element"),
		}
	}
}

fn collect_text(arena: &Arena, node: Handle, out: &mut String) {
	let Some(node) = arena.nodes.get(&node) else {
		return;
	};

	match &node.kind {
		NodeKind::Text(text) => out.push_str(text),
		NodeKind::Element { .. } => {
			for child in &node.children {
				collect_text(arena, *child, out);
			}
		}
	}
}

fn write_markup(arena: &Arena, node: Handle, out: &mut String) {
	let Some(node) = arena.nodes.get(&node) else {
		return;
	};

	match &node.kind {
		NodeKind::Text(text) => out.push_str(text),
		NodeKind::Element {
			tag,
			attributes,
			style,
		} => {
			let _ = write!(out, "<{tag}");
			for (name, value) in attributes {
				let _ = write!(out, " {name}=\"{value}\"");
			}
			if !style.is_empty() {
				out.push_str(" style=\"");
				for (name, value) in style {
					let _ = write!(out, "{name}:{value};");
				}
				out.push('"');
			}
			out.push('>');
			for child in &node.children {
				write_markup(arena, *child, out);
			}
			let _ = write!(out, "</{tag}>");
		}
	}
}

impl Backend for MemoryBackend {
	fn create_element(&self, tag: &str) -> Handle {
		let mut arena = self.arena.borrow_mut();
		let node = arena.alloc(NodeKind::Element {
			tag: tag.to_string(),
			attributes: BTreeMap::new(),
			style: BTreeMap::new(),
		});
		arena.log.push(Op::CreateElement {
			node,
			tag: tag.to_string(),
		});
		node
	}

	fn create_text(&self, text: &str) -> Handle {
		let mut arena = self.arena.borrow_mut();
		let node = arena.alloc(NodeKind::Text(text.to_string()));
		arena.log.push(Op::CreateText {
			node,
			text: text.to_string(),
		});
		node
	}

	fn set_text(&self, node: Handle, text: &str) {
		{
			let mut arena = self.arena.borrow_mut();
			match arena.nodes.get_mut(&node).map(|node| &mut node.kind) {
				Some(NodeKind::Text(current)) => *current = text.to_string(),
				_ => tracing::warn!(?node, "not a text node"),
			}
		}
		self.record(Op::SetText {
			node,
			text: text.to_string(),
		});
	}

	fn set_attribute(&self, node: Handle, name: &str, value: &str) {
		self.with_element(node, |attributes, _| {
			attributes.insert(name.to_string(), value.to_string());
		});
		self.record(Op::SetAttribute {
			node,
			name: name.to_string(),
			value: value.to_string(),
		});
	}

	fn remove_attribute(&self, node: Handle, name: &str) {
		self.with_element(node, |attributes, _| {
			attributes.remove(name);
		});
		self.record(Op::RemoveAttribute {
			node,
			name: name.to_string(),
		});
	}

	fn set_style(&self, node: Handle, name: &str, value: &str) {
		self.with_element(node, |_, style| {
			style.insert(name.to_string(), value.to_string());
		});
		self.record(Op::SetStyle {
			node,
			name: name.to_string(),
			value: value.to_string(),
		});
	}

	fn remove_style(&self, node: Handle, name: &str) {
		self.with_element(node, |_, style| {
			style.remove(name);
		});
		self.record(Op::RemoveStyle {
			node,
			name: name.to_string(),
		});
	}

	fn parent(&self, node: Handle) -> Option<Handle> {
		self.arena.borrow().nodes.get(&node)?.parent
	}

	fn next_sibling(&self, node: Handle) -> Option<Handle> {
		let arena = self.arena.borrow();
		let parent = arena.nodes.get(&node)?.parent?;
		let siblings = &arena.nodes.get(&parent)?.children;
		let index = siblings.iter().position(|c| *c == node)?;
		siblings.get(index + 1).copied()
	}

	fn insert_before(&self, parent: Handle, child: Handle, anchor: Option<Handle>) {
		let mut arena = self.arena.borrow_mut();
		let attached = arena
			.nodes
			.get(&child)
			.map(|node| node.parent.is_some())
			.unwrap_or(false);
		arena.detach(child);

		let Some(node) = arena.nodes.get_mut(&parent) else {
			tracing::warn!(?parent, "unknown parent");
			return;
		};

		let index = anchor
			.and_then(|anchor| node.children.iter().position(|c| *c == anchor))
			.unwrap_or(node.children.len());
		node.children.insert(index, child);

		if let Some(node) = arena.nodes.get_mut(&child) {
			node.parent = Some(parent);
		}

		arena.log.push(if attached {
			Op::Move {
				parent,
				child,
				anchor,
			}
		} else {
			Op::Insert {
				parent,
				child,
				anchor,
			}
		});
	}

	fn remove_child(&self, parent: Handle, child: Handle) {
		let mut arena = self.arena.borrow_mut();
		arena.detach(child);
		arena.log.push(Op::Remove { parent, child });
	}

	fn replace_child(&self, parent: Handle, new: Handle, old: Handle) {
		let mut arena = self.arena.borrow_mut();
		arena.detach(new);

		let Some(index) = arena
			.nodes
			.get(&parent)
			.and_then(|node| node.children.iter().position(|c| *c == old))
		else {
			tracing::warn!(?parent, ?old, "replaced node is not a child");
			return;
		};

		if let Some(node) = arena.nodes.get_mut(&parent) {
			node.children[index] = new;
		}
		if let Some(node) = arena.nodes.get_mut(&old) {
			node.parent = None;
		}
		if let Some(node) = arena.nodes.get_mut(&new) {
			node.parent = Some(parent);
		}

		arena.log.push(Op::Replace { parent, new, old });
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn insert_of_attached_node_is_a_move() {
		let backend = MemoryBackend::new();
		let (root, placeholder) = backend.mount_point();
		let a = backend.create_text("a");

		backend.insert_before(root, a, Some(placeholder));
		backend.insert_before(root, a, None);

		let ops = backend.ops();
		assert!(matches!(ops[1], Op::Insert { .. }));
		assert!(ops[2].is_move());
		assert_eq!(backend.children(root), vec![placeholder, a]);
		assert_eq!(backend.next_sibling(placeholder), Some(a));
	}

	#[test]
	fn markup_includes_attributes_and_style() {
		let backend = MemoryBackend::new();
		let div = backend.create_element("div");
		let text = backend.create_text("hi");
		backend.set_attribute(div, "id", "x");
		backend.set_style(div, "color", "red");
		backend.insert_before(div, text, None);

		assert_eq!(backend.markup(div), r#"<div id="x" style="color:red;">hi</div>"#);
		assert_eq!(backend.text(div), "hi");
	}
}
