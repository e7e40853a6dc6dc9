//! Error types for scopewire-pages

use scopewire_core::{ExpressionError, ObserverError};
use thiserror::Error;

/// Error type for document operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomError {
	/// The node was released or belongs to a freed slot
	#[error("node no longer exists")]
	StaleNode,

	/// Nodes from two different documents were combined
	#[error("nodes belong to different documents")]
	WrongDocument,

	/// The reference node is not a child of the target
	#[error("node is not a child of the target")]
	NotAChild,

	/// The insertion would create an invalid tree
	#[error("invalid hierarchy: {0}")]
	HierarchyRequest(&'static str),

	/// HTML could not be parsed
	#[error("HTML parse error at {position}: {message}")]
	Parse {
		/// Byte offset in the input
		position: usize,
		/// Description of the problem
		message: String,
	},
}

/// Error type for directive phases
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DirectiveError {
	/// The attribute value cannot be interpreted by the directive
	#[error("invalid parameter `{parameter}`: {message}")]
	InvalidParameter {
		/// Attribute value as written
		parameter: String,
		/// What is wrong with it
		message: String,
	},

	/// An expression failed to compile or evaluate
	#[error(transparent)]
	Expression(#[from] ExpressionError),

	/// A document operation failed
	#[error(transparent)]
	Dom(#[from] DomError),

	/// A container operation failed
	#[error(transparent)]
	Observer(#[from] ObserverError),

	/// Failure reported by a custom directive
	#[error("{0}")]
	Custom(String),
}

/// Failure reported by a controller handler
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ControllerError {
	message: String,
}

impl ControllerError {
	/// Creates a controller error with the given message.
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
		}
	}
}

impl From<ObserverError> for ControllerError {
	fn from(error: ObserverError) -> Self {
		Self::new(error.to_string())
	}
}

/// Error type for the persistent store
#[derive(Debug, Error)]
pub enum StorageError {
	/// A stored value is not valid JSON
	#[error("stored value for `{key}` cannot be decoded: {source}")]
	Decode {
		/// Storage key
		key: String,
		/// Underlying JSON error
		#[source]
		source: serde_json::Error,
	},

	/// A value could not be encoded
	#[error("value for `{key}` cannot be encoded: {source}")]
	Encode {
		/// Storage key
		key: String,
		/// Underlying JSON error
		#[source]
		source: serde_json::Error,
	},

	/// The backend rejected an operation
	#[error("storage backend error: {0}")]
	Backend(String),
}

/// Error type for loading [`Settings`](crate::settings::Settings)
#[derive(Debug, Error)]
pub enum SettingsError {
	/// The TOML document is malformed
	#[error("failed to parse settings: {0}")]
	Parse(#[from] toml::de::Error),

	/// A setting has an unusable value
	#[error("invalid setting: {0}")]
	Validation(String),
}

/// Fault recorded while compiling a document subtree
#[derive(Debug, Error)]
pub enum PagesError {
	/// An element names a controller that is not registered
	#[error("unknown controller `{0}`")]
	UnknownController(String),

	/// A controller handler failed
	#[error("controller `{name}` failed: {source}")]
	Controller {
		/// Registered controller name
		name: String,
		/// Reported failure
		#[source]
		source: ControllerError,
	},

	/// A directive phase failed
	#[error("directive `{name}` failed: {source}")]
	Directive {
		/// Directive name (camelCase)
		name: String,
		/// Reported failure
		#[source]
		source: DirectiveError,
	},

	/// A document operation failed
	#[error(transparent)]
	Dom(#[from] DomError),

	/// A storage operation failed
	#[error(transparent)]
	Storage(#[from] StorageError),

	/// Settings could not be loaded
	#[error(transparent)]
	Settings(#[from] SettingsError),
}

/// Result type for scopewire-pages
pub type Result<T> = std::result::Result<T, PagesError>;
