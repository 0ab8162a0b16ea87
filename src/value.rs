use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

use fxhash::FxHashSet;

use crate::list::List;
use crate::object::Object;
use crate::observer::Observer;

/// Dynamic state value. Objects and lists are shared handles,
/// so cloning a `Value` never copies a container.
#[derive(Clone, Default)]
pub enum Value {
	#[default]
	Null,
	Bool(bool),
	Number(f64),
	String(Rc<str>),
	Object(Object),
	Array(List),
}

impl Value {
	/// Identity test used to decide whether a write is a change:
	/// primitives by value, containers by reference.
	pub fn same(&self, other: &Value) -> bool {
		match (self, other) {
			(Value::Null, Value::Null) => true,
			(Value::Bool(a), Value::Bool(b)) => a == b,
			(Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
			(Value::String(a), Value::String(b)) => a == b,
			(Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
			(Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
			_ => false,
		}
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Value::Null)
	}

	pub fn is_container(&self) -> bool {
		matches!(self, Value::Object(_) | Value::Array(_))
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Value::Bool(b) => Some(*b),
			_ => None,
		}
	}

	pub fn as_number(&self) -> Option<f64> {
		match self {
			Value::Number(n) => Some(*n),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::String(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_object(&self) -> Option<&Object> {
		match self {
			Value::Object(object) => Some(object),
			_ => None,
		}
	}

	pub fn as_list(&self) -> Option<&List> {
		match self {
			Value::Array(list) => Some(list),
			_ => None,
		}
	}

	/// The observer attached to this container, if it has been observed.
	pub fn observer(&self) -> Option<Rc<Observer>> {
		match self {
			Value::Object(object) => object.observer(),
			Value::Array(list) => list.observer(),
			_ => None,
		}
	}

	/// Ordering used by [`List::sort`]: nulls, then booleans, numbers
	/// and strings; containers compare equal to each other.
	pub fn sort_cmp(&self, other: &Value) -> Ordering {
		fn rank(value: &Value) -> u8 {
			match value {
				Value::Null => 0,
				Value::Bool(_) => 1,
				Value::Number(_) => 2,
				Value::String(_) => 3,
				Value::Object(_) | Value::Array(_) => 4,
			}
		}

		match (self, other) {
			(Value::Bool(a), Value::Bool(b)) => a.cmp(b),
			(Value::Number(a), Value::Number(b)) => a.total_cmp(b),
			(Value::String(a), Value::String(b)) => a.cmp(b),
			_ => rank(self).cmp(&rank(other)),
		}
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Value::Number(a), Value::Number(b)) => a == b,
			_ => self.same(other),
		}
	}
}

impl Display for Value {
	/// Text form used when a value is interpolated into a text node.
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Value::Null => Ok(()),
			Value::Bool(b) => write!(f, "{b}"),
			Value::Number(n) if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 => {
				write!(f, "{}", *n as i64)
			}
			Value::Number(n) => write!(f, "{n}"),
			Value::String(s) => f.write_str(s),
			Value::Object(_) => f.write_str("[object]"),
			Value::Array(list) => fmt_container(list.addr(), f, "", |f| {
				for (i, item) in list.to_vec().iter().enumerate() {
					if i > 0 {
						f.write_str(",")?;
					}
					write!(f, "{item}")?;
				}
				Ok(())
			}),
		}
	}
}

impl Debug for Value {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Value::Null => f.write_str("null"),
			Value::Bool(b) => Debug::fmt(b, f),
			Value::Number(n) => Debug::fmt(n, f),
			Value::String(s) => Debug::fmt(s, f),
			Value::Object(object) => Debug::fmt(object, f),
			Value::Array(list) => Debug::fmt(list, f),
		}
	}
}

thread_local! {
	static FORMATTING: RefCell<FxHashSet<usize>> = RefCell::default();
}

/// Formats a container unless it is already being formatted further up
/// the stack, in which case `cycle` is written instead.
pub(crate) fn fmt_container(
	addr: usize,
	f: &mut Formatter<'_>,
	cycle: &str,
	body: impl FnOnce(&mut Formatter<'_>) -> std::fmt::Result,
) -> std::fmt::Result {
	if !FORMATTING.with(|active| active.borrow_mut().insert(addr)) {
		return f.write_str(cycle);
	}

	let result = body(f);
	FORMATTING.with(|active| active.borrow_mut().remove(&addr));
	result
}

impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Value::Bool(value)
	}
}

macro_rules! impl_from_number {
	($($ty:ty),*) => {
		$(
			impl From<$ty> for Value {
				fn from(value: $ty) -> Self {
					Value::Number(value as f64)
				}
			}
		)*
	};
}

impl_from_number!(i32, i64, u32, u64, usize, f32, f64);

impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Value::String(Rc::from(value))
	}
}

impl From<String> for Value {
	fn from(value: String) -> Self {
		Value::String(Rc::from(value))
	}
}

impl From<Rc<str>> for Value {
	fn from(value: Rc<str>) -> Self {
		Value::String(value)
	}
}

impl From<Object> for Value {
	fn from(value: Object) -> Self {
		Value::Object(value)
	}
}

impl From<List> for Value {
	fn from(value: List) -> Self {
		Value::Array(value)
	}
}

impl From<Vec<Value>> for Value {
	fn from(value: Vec<Value>) -> Self {
		Value::Array(List::from(value))
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(value: Option<T>) -> Self {
		value.map(Into::into).unwrap_or_default()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn same_compares_primitives_by_value() {
		assert!(Value::from(1).same(&Value::from(1.0)));
		assert!(Value::from("a").same(&Value::from(String::from("a"))));
		assert!(Value::Number(f64::NAN).same(&Value::Number(f64::NAN)));
		assert!(!Value::from(1).same(&Value::from("1")));
	}

	#[test]
	fn same_compares_containers_by_reference() {
		let a = Object::new();
		let b = Object::new();
		assert!(Value::from(a.clone()).same(&Value::from(a)));
		assert!(!Value::from(Object::new()).same(&Value::from(b)));
	}

	#[test]
	fn display_formats_integers_without_fraction() {
		assert_eq!(Value::from(3).to_string(), "3");
		assert_eq!(Value::from(1.5).to_string(), "1.5");
		assert_eq!(Value::Null.to_string(), "");
	}

	#[test]
	fn debug_shows_nested_structure() {
		let value = crate::value!({ "a": [1, true, "x", null] });
		assert_eq!(format!("{value:?}"), r#"{"a": [1.0, true, "x", null]}"#);
	}
}
