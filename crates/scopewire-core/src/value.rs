//! Dynamically typed values stored in observable containers
//!
//! Containers hold [`Value`]s: plain JSON-like data, nested observable
//! containers, or callable [`ScopeFunction`]s that expressions can invoke.
//! Plain data compares structurally while containers and functions compare by
//! identity, which is the equality used to suppress no-op updates.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CallbackError;
use crate::observer::Observer;

/// Key addressing one entry of a container.
///
/// Mapping containers use names (indices are stringified), sequence
/// containers use indices (numeric names are parsed).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
	/// Named entry of a mapping
	Name(String),
	/// Position in a sequence
	Index(usize),
}

impl Key {
	/// Returns the index this key addresses, parsing numeric names.
	pub fn as_index(&self) -> Option<usize> {
		match self {
			Self::Index(index) => Some(*index),
			Self::Name(name) => name.parse().ok(),
		}
	}

	/// Returns the name if this is a [`Key::Name`].
	pub fn as_name(&self) -> Option<&str> {
		match self {
			Self::Name(name) => Some(name),
			Self::Index(_) => None,
		}
	}
}

impl fmt::Display for Key {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Name(name) => f.write_str(name),
			Self::Index(index) => write!(f, "{index}"),
		}
	}
}

impl From<&str> for Key {
	fn from(name: &str) -> Self {
		Self::Name(name.to_string())
	}
}

impl From<&String> for Key {
	fn from(name: &String) -> Self {
		Self::Name(name.clone())
	}
}

impl From<String> for Key {
	fn from(name: String) -> Self {
		Self::Name(name)
	}
}

impl From<usize> for Key {
	fn from(index: usize) -> Self {
		Self::Index(index)
	}
}

impl From<&Key> for Key {
	fn from(key: &Key) -> Self {
		key.clone()
	}
}

type FunctionBody = dyn Fn(&[Value]) -> Result<Value, CallbackError>;

/// A callable stored in a scope and invoked from expressions or `onEvent`.
#[derive(Clone)]
pub struct ScopeFunction(Rc<FunctionBody>);

impl ScopeFunction {
	/// Wraps a function that receives the call arguments and returns a value.
	///
	/// # Example
	///
	/// ```
	/// use scopewire_core::value::{ScopeFunction, Value};
	///
	/// let double = ScopeFunction::new(|args| {
	///     let n = args.first().and_then(Value::as_f64).unwrap_or_default();
	///     Ok(Value::from(n * 2.0))
	/// });
	/// assert_eq!(double.call(&[Value::from(21)]).unwrap(), Value::from(42));
	/// ```
	pub fn new<F>(body: F) -> Self
	where
		F: Fn(&[Value]) -> Result<Value, CallbackError> + 'static,
	{
		Self(Rc::new(body))
	}

	/// Wraps a function without a meaningful return value.
	pub fn action<F>(body: F) -> Self
	where
		F: Fn(&[Value]) + 'static,
	{
		Self(Rc::new(move |args: &[Value]| {
			body(args);
			Ok(Value::Null)
		}))
	}

	/// Invokes the function.
	pub fn call(&self, args: &[Value]) -> Result<Value, CallbackError> {
		(self.0)(args)
	}

	/// Returns true if both handles wrap the same function.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.0, &other.0)
	}
}

impl fmt::Debug for ScopeFunction {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("ScopeFunction(..)")
	}
}

/// A value stored in an observable container.
#[derive(Debug, Clone, Default)]
pub enum Value {
	/// Absent value
	#[default]
	Null,
	/// Boolean
	Bool(bool),
	/// Number (all numbers are `f64`)
	Number(f64),
	/// String
	String(String),
	/// Plain list
	List(Vec<Value>),
	/// Plain insertion-ordered map
	Map(IndexMap<String, Value>),
	/// Nested observable container (shared handle)
	Container(Observer),
	/// Callable
	Function(ScopeFunction),
}

impl Value {
	/// Name of the variant, used in diagnostics.
	pub fn type_name(&self) -> &'static str {
		match self {
			Self::Null => "null",
			Self::Bool(_) => "bool",
			Self::Number(_) => "number",
			Self::String(_) => "string",
			Self::List(_) => "list",
			Self::Map(_) => "map",
			Self::Container(_) => "container",
			Self::Function(_) => "function",
		}
	}

	/// Returns true for [`Value::Null`].
	pub fn is_null(&self) -> bool {
		matches!(self, Self::Null)
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Self::Bool(b) => Some(*b),
			_ => None,
		}
	}

	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Self::Number(n) => Some(*n),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::String(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_container(&self) -> Option<&Observer> {
		match self {
			Self::Container(observer) => Some(observer),
			_ => None,
		}
	}

	pub fn as_function(&self) -> Option<&ScopeFunction> {
		match self {
			Self::Function(function) => Some(function),
			_ => None,
		}
	}

	/// Truthiness used by `!`, `&&` and `||` in expressions.
	///
	/// `null`, `false`, `0`, `NaN` and the empty string are falsy; everything
	/// else, including empty lists and containers, is truthy.
	pub fn is_truthy(&self) -> bool {
		match self {
			Self::Null => false,
			Self::Bool(b) => *b,
			Self::Number(n) => *n != 0.0 && !n.is_nan(),
			Self::String(s) => !s.is_empty(),
			Self::List(_) | Self::Map(_) | Self::Container(_) | Self::Function(_) => true,
		}
	}

	/// Reads one member of a compound value.
	///
	/// Maps and containers are indexed by name, lists by numeric index.
	/// `length` is available on lists and sequence containers.
	pub fn member(&self, name: &str) -> Option<Value> {
		match self {
			Self::Map(map) => map.get(name).cloned(),
			Self::List(items) => match name.parse::<usize>() {
				Ok(index) => items.get(index).cloned(),
				Err(_) if name == "length" => Some(Self::from(items.len())),
				Err(_) => None,
			},
			Self::Container(observer) => observer.get(name).or_else(|| {
				(name == "length" && observer.is_sequence()).then(|| Self::from(observer.len()))
			}),
			_ => None,
		}
	}

	/// Follows a dotted path (`a.b.c`) through nested values.
	pub fn lookup_path(&self, path: &str) -> Option<Value> {
		let mut current = self.clone();
		for segment in path.split('.') {
			current = current.member(segment)?;
		}
		Some(current)
	}

	/// Text used when a value is written into the document.
	///
	/// `null` renders as the empty string and integral numbers render
	/// without a fractional part.
	pub fn to_display_string(&self) -> String {
		match self {
			Self::Null => String::new(),
			Self::Bool(b) => b.to_string(),
			Self::Number(n) => format_number(*n),
			Self::String(s) => s.clone(),
			Self::Function(_) => "[function]".to_string(),
			compound => compound.to_json().to_string(),
		}
	}

	/// Converts to a JSON value. Containers contribute their current plain
	/// snapshot; functions become `null`.
	pub fn to_json(&self) -> serde_json::Value {
		match self {
			Self::Null | Self::Function(_) => serde_json::Value::Null,
			Self::Bool(b) => serde_json::Value::Bool(*b),
			Self::Number(n) => number_to_json(*n),
			Self::String(s) => serde_json::Value::String(s.clone()),
			Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
			Self::Map(map) => serde_json::Value::Object(
				map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
			),
			Self::Container(observer) => observer.snapshot().to_json(),
		}
	}
}

fn format_number(n: f64) -> String {
	if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
		format!("{}", n as i64)
	} else {
		format!("{n}")
	}
}

fn number_to_json(n: f64) -> serde_json::Value {
	if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
		serde_json::Value::from(n as i64)
	} else {
		serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Null, Self::Null) => true,
			(Self::Bool(a), Self::Bool(b)) => a == b,
			(Self::Number(a), Self::Number(b)) => a == b,
			(Self::String(a), Self::String(b)) => a == b,
			(Self::List(a), Self::List(b)) => a == b,
			(Self::Map(a), Self::Map(b)) => a == b,
			(Self::Container(a), Self::Container(b)) => a.ptr_eq(b),
			(Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
			_ => false,
		}
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_display_string())
	}
}

impl Serialize for Value {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self {
			Self::Null | Self::Function(_) => serializer.serialize_unit(),
			Self::Bool(b) => serializer.serialize_bool(*b),
			Self::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
				serializer.serialize_i64(*n as i64)
			}
			Self::Number(n) => serializer.serialize_f64(*n),
			Self::String(s) => serializer.serialize_str(s),
			Self::List(items) => {
				let mut seq = serializer.serialize_seq(Some(items.len()))?;
				for item in items {
					seq.serialize_element(item)?;
				}
				seq.end()
			}
			Self::Map(entries) => {
				let mut map = serializer.serialize_map(Some(entries.len()))?;
				for (k, v) in entries {
					map.serialize_entry(k, v)?;
				}
				map.end()
			}
			Self::Container(observer) => observer.snapshot().serialize(serializer),
		}
	}
}

impl<'de> Deserialize<'de> for Value {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		serde_json::Value::deserialize(deserializer).map(Self::from)
	}
}

impl From<serde_json::Value> for Value {
	fn from(json: serde_json::Value) -> Self {
		match json {
			serde_json::Value::Null => Self::Null,
			serde_json::Value::Bool(b) => Self::Bool(b),
			serde_json::Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
			serde_json::Value::String(s) => Self::String(s),
			serde_json::Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
			serde_json::Value::Object(map) => {
				Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
			}
		}
	}
}

impl From<bool> for Value {
	fn from(b: bool) -> Self {
		Self::Bool(b)
	}
}

impl From<f64> for Value {
	fn from(n: f64) -> Self {
		Self::Number(n)
	}
}

impl From<i32> for Value {
	fn from(n: i32) -> Self {
		Self::Number(f64::from(n))
	}
}

impl From<i64> for Value {
	fn from(n: i64) -> Self {
		Self::Number(n as f64)
	}
}

impl From<u32> for Value {
	fn from(n: u32) -> Self {
		Self::Number(f64::from(n))
	}
}

impl From<usize> for Value {
	fn from(n: usize) -> Self {
		Self::Number(n as f64)
	}
}

impl From<&str> for Value {
	fn from(s: &str) -> Self {
		Self::String(s.to_string())
	}
}

impl From<String> for Value {
	fn from(s: String) -> Self {
		Self::String(s)
	}
}

impl From<Vec<Value>> for Value {
	fn from(items: Vec<Value>) -> Self {
		Self::List(items)
	}
}

impl From<IndexMap<String, Value>> for Value {
	fn from(map: IndexMap<String, Value>) -> Self {
		Self::Map(map)
	}
}

impl From<Observer> for Value {
	fn from(observer: Observer) -> Self {
		Self::Container(observer)
	}
}

impl From<&Observer> for Value {
	fn from(observer: &Observer) -> Self {
		Self::Container(observer.clone())
	}
}

impl From<ScopeFunction> for Value {
	fn from(function: ScopeFunction) -> Self {
		Self::Function(function)
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(value: Option<T>) -> Self {
		value.map_or(Self::Null, Into::into)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;

	#[rstest]
	#[case(Value::from(1.0), "1")]
	#[case(Value::from(1.25), "1.25")]
	#[case(Value::from(-3), "-3")]
	#[case(Value::Null, "")]
	#[case(Value::from(true), "true")]
	#[case(Value::from("EURUSD"), "EURUSD")]
	fn test_display_string(#[case] value: Value, #[case] expected: &str) {
		assert_eq!(value.to_display_string(), expected);
	}

	#[rstest]
	#[case(Value::Null, false)]
	#[case(Value::from(0), false)]
	#[case(Value::from(f64::NAN), false)]
	#[case(Value::from(""), false)]
	#[case(Value::from("0"), true)]
	#[case(Value::List(Vec::new()), true)]
	fn test_truthiness(#[case] value: Value, #[case] expected: bool) {
		assert_eq!(value.is_truthy(), expected);
	}

	#[rstest]
	fn test_containers_compare_by_identity() {
		// Arrange
		let a = Observer::mapping();
		let b = Observer::mapping();

		// Assert
		assert_eq!(Value::from(&a), Value::from(&a));
		assert_ne!(Value::from(&a), Value::from(&b));
	}

	#[rstest]
	fn test_from_json_preserves_order_and_nesting() {
		// Arrange
		let json = json!({ "b": 1, "a": [true, null, "x"] });

		// Act
		let value = Value::from(json.clone());

		// Assert
		let Value::Map(map) = &value else {
			panic!("expected a map, got {value:?}");
		};
		assert_eq!(map.keys().collect::<Vec<_>>(), vec!["b", "a"]);
		assert_eq!(value.to_json(), json);
	}

	#[rstest]
	fn test_lookup_path_through_lists_and_maps() {
		// Arrange
		let value = Value::from(json!({ "rates": [{ "pair": "EURUSD" }] }));

		// Act / Assert
		assert_eq!(value.lookup_path("rates.0.pair"), Some(Value::from("EURUSD")));
		assert_eq!(value.lookup_path("rates.length"), Some(Value::from(1)));
		assert_eq!(value.lookup_path("rates.3.pair"), None);
	}

	#[rstest]
	fn test_serialize_container_as_snapshot() {
		// Arrange
		let rates = Observer::mapping();
		rates.set("EURUSD", 1.5);
		rates.set("$hidden", 1);

		// Act
		let json = serde_json::to_value(Value::from(&rates)).unwrap();

		// Assert
		assert_eq!(json, json!({ "EURUSD": 1.5 }));
	}

	#[rstest]
	#[case(Key::from("3"), Some(3))]
	#[case(Key::from(4_usize), Some(4))]
	#[case(Key::from("x"), None)]
	fn test_key_as_index(#[case] key: Key, #[case] expected: Option<usize>) {
		assert_eq!(key.as_index(), expected);
	}
}
