use std::rc::Rc;

use crate::backend::Handle;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// A virtual node that is neither an element nor a text node,
	/// or a text node carrying element-only data.
	#[error("malformed virtual node at `{path}`: {reason}")]
	MalformedNode { path: String, reason: &'static str },

	#[error("backend node {0:?} is not attached to a parent")]
	Detached(Handle),

	#[error("virtual node was never patched into the backend")]
	Unmounted,

	#[error("component state must be an object")]
	InvalidState,

	#[error("component or runtime was dropped")]
	Dropped,

	#[error("unknown computed property `{0}`")]
	UnknownComputed(Rc<str>),

	#[error("{0}")]
	Custom(String),
}

impl Error {
	pub fn custom(message: impl Into<String>) -> Self {
		Error::Custom(message.into())
	}
}
