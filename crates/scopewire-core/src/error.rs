//! Error types for scopewire-core

use std::fmt;
use thiserror::Error;

/// Storage mode of an [`Observer`](crate::observer::Observer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerMode {
	/// Keyed, insertion-ordered values
	Mapping,
	/// Contiguously indexed values
	Sequence,
}

impl fmt::Display for ContainerMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Mapping => f.write_str("mapping"),
			Self::Sequence => f.write_str("sequence"),
		}
	}
}

/// Error type for container operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ObserverError {
	/// A structural operation was called on a container of the wrong mode,
	/// e.g. `push` on a mapping.
	#[error("`{operation}` is not supported on a {mode} container")]
	InvalidOperationKind {
		/// Name of the rejected operation
		operation: &'static str,
		/// Mode of the container the operation was called on
		mode: ContainerMode,
	},

	/// The container was converted into a scope but is not a mapping.
	#[error("a scope must be backed by a mapping container")]
	NotAMapping,
}

/// Failure reported by an event listener or a scope function.
///
/// Listeners never propagate this to the code that triggered them; the
/// emitter logs it and continues with the next listener.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct CallbackError {
	message: String,
}

impl CallbackError {
	/// Creates a callback error with the given message.
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
		}
	}

	/// Returns the error message.
	pub fn message(&self) -> &str {
		&self.message
	}
}

/// Error type for compiling and evaluating scope expressions
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExpressionError {
	/// The expression source could not be parsed
	#[error("parse error at {position}: {message}")]
	Parse {
		/// Byte offset in the expression source
		position: usize,
		/// Description of the problem
		message: String,
	},

	/// A name is not defined on the scope or any of its parents
	#[error("`{0}` is not defined")]
	UnknownName(String),

	/// A called value is not a function
	#[error("`{0}` is not a function")]
	NotCallable(String),

	/// The left-hand side of an assignment cannot be written to
	#[error("cannot assign to `{0}`")]
	NotAssignable(String),

	/// A scope function returned an error
	#[error("function call failed: {0}")]
	Function(#[from] CallbackError),

	/// A container method rejected the call
	#[error(transparent)]
	Observer(#[from] ObserverError),
}

/// Result type for container operations
pub type Result<T> = std::result::Result<T, ObserverError>;
