//! Binding scopes
//!
//! A [`Scope`] is a mapping [`Observer`] used as the data context of a
//! document subtree. Scopes form a chain through their parent links: a
//! controller scope is a child of the enclosing scope, and every item
//! rendered by a repeat gets its own child scope. Name resolution walks that
//! chain, so a nested scope sees the values and functions of its ancestors.

mod expression;

pub use expression::Expression;

use std::fmt;
use std::ops::Deref;

use crate::error::{ExpressionError, ObserverError};
use crate::observer::Observer;
use crate::value::Value;

/// A mapping container acting as a data context.
#[derive(Clone, Default)]
pub struct Scope(Observer);

impl Scope {
	/// Creates a root scope.
	pub fn new() -> Self {
		Self(Observer::mapping())
	}

	/// Creates a scope whose parent is `parent`.
	pub fn child_of(parent: &Scope) -> Self {
		Self(Observer::with_parent(parent))
	}

	/// Uses an existing container as a scope. The container must be a mapping.
	pub fn from_observer(observer: Observer) -> Result<Self, ObserverError> {
		if observer.is_sequence() {
			return Err(ObserverError::NotAMapping);
		}
		Ok(Self(observer))
	}

	/// The underlying container.
	pub fn observer(&self) -> &Observer {
		&self.0
	}

	/// The parent scope, if the parent container is a mapping.
	pub fn parent_scope(&self) -> Option<Scope> {
		self.0.parent().and_then(|parent| Self::from_observer(parent).ok())
	}

	/// Finds the nearest scope in the chain (starting with this one) that
	/// stores `name` directly.
	pub fn resolve_owner(&self, name: &str) -> Option<Scope> {
		let mut current = Some(self.clone());
		while let Some(scope) = current {
			if scope.has_key(name) {
				return Some(scope);
			}
			current = scope.parent_scope();
		}
		None
	}

	/// Resolves a possibly dotted name against this scope and its ancestors.
	///
	/// The first segment selects the owning scope; the rest of the path is
	/// read from there.
	pub fn lookup(&self, name: &str) -> Option<Value> {
		let head = name.split_once('.').map_or(name, |(head, _)| head);
		if head == crate::observer::PARENT_KEY {
			return self.get(name);
		}
		self.resolve_owner(head)?.get(name)
	}

	/// Writes `value` to a possibly dotted path.
	///
	/// A plain name is written to the scope that already owns it, or to this
	/// scope if no ancestor does. A dotted path is written into the nested
	/// container it names; plain maps and lists are values and cannot be
	/// written through.
	pub fn assign(&self, path: &str, value: Value) -> Result<(), ExpressionError> {
		match path.split_once('.') {
			None => {
				self.resolve_owner(path).unwrap_or_else(|| self.clone()).set(path, value);
				Ok(())
			}
			Some((head, rest)) => {
				let base = self
					.lookup(head)
					.ok_or_else(|| ExpressionError::UnknownName(head.to_string()))?;
				assign_into(&base, rest, value).ok_or_else(|| ExpressionError::NotAssignable(path.to_string()))
			}
		}
	}

	/// Compiles a statement list into an [`Expression`].
	///
	/// # Example
	///
	/// ```
	/// use scopewire_core::scope::Scope;
	/// use scopewire_core::value::Value;
	///
	/// let scope = Scope::new();
	/// scope.set("count", 1);
	///
	/// let increment = Scope::compile_expression("count = count + 1").unwrap();
	/// increment.eval(&scope).unwrap();
	/// assert_eq!(scope.get("count"), Some(Value::from(2)));
	/// ```
	pub fn compile_expression(source: &str) -> Result<Expression, ExpressionError> {
		Expression::compile(source)
	}

	/// Compiles and evaluates `source` against this scope.
	pub fn eval(&self, source: &str) -> Result<Value, ExpressionError> {
		Expression::compile(source)?.eval(self)
	}
}

fn assign_into(base: &Value, path: &str, value: Value) -> Option<()> {
	let container = base.as_container()?;
	match path.split_once('.') {
		None => {
			container.set(path, value);
			Some(())
		}
		Some((head, rest)) => assign_into(&container.get(head)?, rest, value),
	}
}

impl Deref for Scope {
	type Target = Observer;

	fn deref(&self) -> &Observer {
		&self.0
	}
}

impl From<Scope> for Value {
	fn from(scope: Scope) -> Self {
		Value::Container(scope.0)
	}
}

impl From<&Scope> for Value {
	fn from(scope: &Scope) -> Self {
		Value::Container(scope.0.clone())
	}
}

impl fmt::Debug for Scope {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Scope").field(&self.0).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	fn test_lookup_walks_parent_chain() {
		// Arrange
		let root = Scope::new();
		root.set("title", "Rates");
		let child = Scope::child_of(&root);
		child.set("$index", 0);

		// Act / Assert
		assert_eq!(child.lookup("title"), Some(Value::from("Rates")));
		assert_eq!(child.lookup("$index"), Some(Value::from(0)));
		assert_eq!(root.lookup("$index"), None);
	}

	#[rstest]
	fn test_lookup_prefers_nearest_owner() {
		// Arrange
		let root = Scope::new();
		root.set("item", "outer");
		let child = Scope::child_of(&root);
		child.set("item", "inner");

		// Act / Assert
		assert_eq!(child.lookup("item"), Some(Value::from("inner")));
	}

	#[rstest]
	fn test_assign_writes_to_owning_scope() {
		// Arrange
		let root = Scope::new();
		root.set("selected", "");
		let child = Scope::child_of(&root);

		// Act
		child.assign("selected", Value::from("EURUSD")).unwrap();
		child.assign("local", Value::from(1)).unwrap();

		// Assert
		assert_eq!(root.get("selected"), Some(Value::from("EURUSD")));
		assert!(!child.has_key("selected"));
		assert_eq!(child.get("local"), Some(Value::from(1)));
	}

	#[rstest]
	fn test_assign_into_nested_container() {
		// Arrange
		let root = Scope::new();
		let rates = Observer::mapping();
		root.set("rates", &rates);

		// Act
		root.assign("rates.EURUSD", Value::from(1.1)).unwrap();

		// Assert
		assert_eq!(rates.get("EURUSD"), Some(Value::from(1.1)));
	}

	#[rstest]
	fn test_assign_into_plain_value_fails() {
		// Arrange
		let root = Scope::new();
		root.set("plain", Value::Map(Default::default()));

		// Act
		let result = root.assign("plain.x", Value::from(1));

		// Assert
		assert_eq!(result, Err(ExpressionError::NotAssignable("plain.x".to_string())));
	}

	#[rstest]
	fn test_from_observer_requires_mapping() {
		assert_eq!(
			Scope::from_observer(Observer::sequence()).err(),
			Some(ObserverError::NotAMapping)
		);
	}
}
