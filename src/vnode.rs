use std::fmt::Debug;
use std::rc::Rc;

use crate::component::{Component, ComponentOptions};
use crate::runtime::Runtime;
use crate::{Backend, Error, Handle};

/// Identity hint for reordering siblings. Never used to compare content.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
	Str(Rc<str>),
	Int(i64),
}

impl From<&str> for Key {
	fn from(value: &str) -> Self {
		Key::Str(Rc::from(value))
	}
}

impl From<String> for Key {
	fn from(value: String) -> Self {
		Key::Str(Rc::from(value))
	}
}

impl From<i64> for Key {
	fn from(value: i64) -> Self {
		Key::Int(value)
	}
}

impl From<i32> for Key {
	fn from(value: i32) -> Self {
		Key::Int(value.into())
	}
}

impl From<usize> for Key {
	fn from(value: usize) -> Self {
		Key::Int(value as i64)
	}
}

/// Attributes and style declarations, both kept in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Props {
	attrs: Vec<(Rc<str>, Rc<str>)>,
	style: Vec<(Rc<str>, Rc<str>)>,
}

fn upsert(entries: &mut Vec<(Rc<str>, Rc<str>)>, name: &str, value: &str) {
	match entries.iter_mut().find(|(existing, _)| &**existing == name) {
		Some((_, current)) => *current = Rc::from(value),
		None => entries.push((Rc::from(name), Rc::from(value))),
	}
}

fn lookup<'a>(entries: &'a [(Rc<str>, Rc<str>)], name: &str) -> Option<&'a str> {
	entries
		.iter()
		.find(|(existing, _)| &**existing == name)
		.map(|(_, value)| &**value)
}

impl Props {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_empty(&self) -> bool {
		self.attrs.is_empty() && self.style.is_empty()
	}

	pub fn set_attr(&mut self, name: &str, value: &str) {
		upsert(&mut self.attrs, name, value)
	}

	pub fn remove_attr(&mut self, name: &str) {
		self.attrs.retain(|(existing, _)| &**existing != name)
	}

	pub fn attr(&self, name: &str) -> Option<&str> {
		lookup(&self.attrs, name)
	}

	pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
		self.attrs.iter().map(|(name, value)| (&**name, &**value))
	}

	pub fn set_style(&mut self, name: &str, value: &str) {
		upsert(&mut self.style, name, value)
	}

	pub fn style_value(&self, name: &str) -> Option<&str> {
		lookup(&self.style, name)
	}

	pub fn style(&self) -> impl Iterator<Item = (&str, &str)> {
		self.style.iter().map(|(name, value)| (&**name, &**value))
	}
}

/// Component data carried by a component node: the options to build the
/// child from and, once patched, the live instance.
pub struct ComponentSlot {
	options: Rc<ComponentOptions>,
	pub(crate) instance: Option<Rc<Component>>,
}

impl ComponentSlot {
	pub fn options(&self) -> &Rc<ComponentOptions> {
		&self.options
	}

	pub fn instance(&self) -> Option<&Rc<Component>> {
		self.instance.as_ref()
	}

	/// Instantiation hook, run the first time the node is patched.
	pub(crate) fn init(
		&mut self,
		runtime: &Runtime,
		backend: &Rc<dyn Backend>,
	) -> Result<Handle, Error> {
		let instance = Component::new(runtime, backend.clone(), self.options.clone())?;
		let root = instance.mount_detached()?;
		self.instance = Some(instance);
		Ok(root)
	}
}

/// Description of the desired output for one render pass.
///
/// Element nodes have a `tag`, text nodes have `text` and nothing else.
/// Once patched a node records the backend handle it owns.
#[derive(Default)]
pub struct VNode {
	pub tag: Option<Rc<str>>,
	pub key: Option<Key>,
	pub props: Props,
	pub children: Vec<VNode>,
	pub text: Option<Rc<str>>,
	pub component: Option<ComponentSlot>,
	pub(crate) elm: Option<Handle>,
}

impl VNode {
	pub fn element(tag: &str) -> Self {
		VNode {
			tag: Some(Rc::from(tag)),
			..Default::default()
		}
	}

	pub fn text(text: impl AsRef<str>) -> Self {
		VNode {
			text: Some(Rc::from(text.as_ref())),
			..Default::default()
		}
	}

	/// A node that instantiates `options` as a child component.
	pub fn component(options: &Rc<ComponentOptions>) -> Self {
		VNode {
			tag: Some(Rc::from(options.tag())),
			component: Some(ComponentSlot {
				options: options.clone(),
				instance: None,
			}),
			..Default::default()
		}
	}

	pub fn key(mut self, key: impl Into<Key>) -> Self {
		self.key = Some(key.into());
		self
	}

	/// Sets an attribute. `key` becomes the node key and `style` is parsed
	/// as `name: value; ...` declarations.
	pub fn attr(mut self, name: &str, value: impl AsRef<str>) -> Self {
		let value = value.as_ref();
		match name {
			"key" => self.key = Some(Key::from(value)),
			"style" => {
				for declaration in value.split(';') {
					if let Some((name, value)) = declaration.split_once(':') {
						self.props.set_style(name.trim(), value.trim());
					}
				}
			}
			_ => self.props.set_attr(name, value),
		}
		self
	}

	pub fn style(mut self, name: &str, value: impl AsRef<str>) -> Self {
		self.props.set_style(name, value.as_ref());
		self
	}

	pub fn child(mut self, child: VNode) -> Self {
		self.children.push(child);
		self
	}

	pub fn children(mut self, children: impl IntoIterator<Item = VNode>) -> Self {
		self.children.extend(children);
		self
	}

	pub fn is_text(&self) -> bool {
		self.tag.is_none() && self.text.is_some()
	}

	/// Tag and key equality: the only test for reuse versus replacement.
	pub fn same_node(&self, other: &VNode) -> bool {
		self.tag == other.tag && self.key == other.key
	}

	/// The backend node this vnode currently owns. For a component node
	/// that is the child's current root.
	pub fn elm(&self) -> Option<Handle> {
		match self.component.as_ref().and_then(|slot| slot.instance.as_ref()) {
			Some(instance) => instance.root(),
			None => self.elm,
		}
	}

	/// Checks the whole tree. Patching validates first so that a
	/// malformed tree never leaves a half-built backend subtree.
	pub fn validate(&self) -> Result<(), Error> {
		self.validate_at(&mut String::from("root"))
	}

	fn validate_at(&self, path: &mut String) -> Result<(), Error> {
		let malformed = |path: &String, reason| Error::MalformedNode {
			path: path.clone(),
			reason,
		};

		match (&self.tag, &self.text) {
			(None, None) => return Err(malformed(path, "node has neither a tag nor text")),
			(Some(_), Some(_)) => return Err(malformed(path, "node has both a tag and text")),
			(None, Some(_)) => {
				if !self.children.is_empty() {
					return Err(malformed(path, "text node has children"));
				}
				if !self.props.is_empty() {
					return Err(malformed(path, "text node has props"));
				}
				if self.component.is_some() {
					return Err(malformed(path, "text node has component data"));
				}
			}
			(Some(_), None) => {}
		}

		for (index, child) in self.children.iter().enumerate() {
			let len = path.len();
			path.push('/');
			path.push_str(&index.to_string());
			child.validate_at(path)?;
			path.truncate(len);
		}

		Ok(())
	}
}

impl Debug for VNode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if let Some(text) = &self.text {
			return f.debug_tuple("Text").field(text).finish();
		}

		let mut debug = f.debug_struct("VNode");
		debug.field("tag", &self.tag);
		if let Some(key) = &self.key {
			debug.field("key", key);
		}
		if !self.props.is_empty() {
			debug.field("props", &self.props);
		}
		if !self.children.is_empty() {
			debug.field("children", &self.children);
		}
		debug.field("elm", &self.elm).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn key_and_style_are_reserved() {
		let node = VNode::element("li")
			.attr("key", "a")
			.attr("style", "color: red; margin:0")
			.attr("id", "x");

		assert_eq!(node.key, Some(Key::from("a")));
		assert_eq!(node.props.attr("key"), None);
		assert_eq!(node.props.style_value("color"), Some("red"));
		assert_eq!(node.props.style_value("margin"), Some("0"));
		assert_eq!(node.props.attr("id"), Some("x"));
	}

	#[test]
	fn same_node_ignores_content() {
		let a = VNode::element("li").key("a").child(VNode::text("one"));
		let b = VNode::element("li").key("a").attr("id", "other");
		assert!(a.same_node(&b));
		assert!(!a.same_node(&VNode::element("li").key("b")));
		assert!(!a.same_node(&VNode::element("p").key("a")));
		assert!(VNode::text("x").same_node(&VNode::text("y")));
	}

	#[test]
	fn validate_reports_path() {
		let node = VNode::element("ul").child(VNode::element("li")).child(
			VNode::element("li").child(VNode::default()),
		);

		match node.validate() {
			Err(Error::MalformedNode { path, .. }) => assert_eq!(path, "root/1/0"),
			other => panic!("unexpected {other:?}"),
		}
	}

	#[test]
	fn validate_rejects_text_with_children() {
		let node = VNode::text("a").child(VNode::text("b"));
		assert!(node.validate().is_err());
	}
}
