pub use enclose::*;

/// Builds a plain [`Value`](crate::Value) from a JSON-like literal.
///
/// ```
/// let todo = revue::value!({ "title": "write docs", "tags": ["a", "b"], "done": false });
/// assert_eq!(todo.as_object().unwrap().get_once("done"), revue::Value::from(false));
/// ```
#[macro_export]
macro_rules! value {
	(null) => {
		$crate::Value::Null
	};
	([ $($elem:tt),* $(,)? ]) => {
		$crate::Value::Array($crate::List::from(vec![ $( $crate::value!($elem) ),* ]))
	};
	({ $($key:literal : $val:tt),* $(,)? }) => {
		$crate::Value::Object(
			<$crate::Object as ::std::iter::FromIterator<(&str, $crate::Value)>>::from_iter(
				vec![ $( ($key, $crate::value!($val)) ),* ]
			)
		)
	};
	($other:expr) => {
		$crate::Value::from($other)
	};
}

/// Boxes a watcher getter, cloning the listed captures first.
///
/// `getter!((a, b) => a.get())` is shorthand for a
/// `Box<dyn Fn() -> Result<Value, Error>>` that clones `a` and `b` into
/// the closure and wraps the body's value in `Ok`.
#[macro_export]
macro_rules! getter {
	(( $($d_tt:tt)* ) => $($b:tt)*) => {
		::std::boxed::Box::new($crate::macros::enclose!(($( $d_tt )*)
			move || -> ::std::result::Result<$crate::Value, $crate::Error> {
				::std::result::Result::Ok($crate::Value::from({ $($b)* }))
			}
		))
	};
	(=> $($b:tt)*) => {
		::std::boxed::Box::new(move || -> ::std::result::Result<$crate::Value, $crate::Error> {
			::std::result::Result::Ok($crate::Value::from({ $($b)* }))
		})
	};
}
