//! Persistent store container
//!
//! [`Storage`] is an observable mapping whose values are mirrored, JSON
//! encoded, into a string key/value [`StorageBackend`]. Listeners observe the
//! in-memory [`Observer`] as usual; writes reported by another party (another
//! window sharing the backend, for instance) are fed back through
//! [`Storage::handle_storage_event`] so listeners see them too.
//!
//! ## Example
//!
//! ```
//! use scopewire_pages::storage::{MemoryBackend, Storage};
//! use scopewire_core::Value;
//!
//! let backend = MemoryBackend::new();
//! let storage = Storage::new(backend.clone());
//!
//! storage.set("theme", "dark").unwrap();
//! assert_eq!(backend.raw("theme").as_deref(), Some("\"dark\""));
//! assert_eq!(storage.get("theme").unwrap(), Some(Value::from("dark")));
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use scopewire_core::{Observer, Value};

use crate::error::StorageError;

/// String key/value persistence used by [`Storage`]
pub trait StorageBackend {
	/// Returns the stored string for `key`, if any.
	fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

	/// Stores `value` under `key`, replacing any previous value.
	fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

	/// Removes `key`. Removing a missing key is not an error.
	fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory [`StorageBackend`]
///
/// Clones share the same entries, which makes it convenient to inspect what
/// a [`Storage`] wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
	entries: Rc<RefCell<IndexMap<String, String>>>,
}

impl MemoryBackend {
	pub fn new() -> Self {
		Self::default()
	}

	/// Raw stored string for `key`.
	pub fn raw(&self, key: &str) -> Option<String> {
		self.entries.borrow().get(key).cloned()
	}

	pub fn len(&self) -> usize {
		self.entries.borrow().len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.borrow().is_empty()
	}
}

impl StorageBackend for MemoryBackend {
	fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
		Ok(self.raw(key))
	}

	fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
		self.entries.borrow_mut().insert(key.to_string(), value.to_string());
		Ok(())
	}

	fn remove_item(&self, key: &str) -> Result<(), StorageError> {
		self.entries.borrow_mut().shift_remove(key);
		Ok(())
	}
}

/// Observable mapping persisted through a [`StorageBackend`]
///
/// Without a backend the store behaves like a plain mapping container.
#[derive(Clone)]
pub struct Storage {
	container: Observer,
	backend: Option<Rc<dyn StorageBackend>>,
}

impl Storage {
	/// Creates a store persisted through `backend`.
	pub fn new<B: StorageBackend + 'static>(backend: B) -> Self {
		Self {
			container: Observer::mapping(),
			backend: Some(Rc::new(backend)),
		}
	}

	/// Creates a store that only keeps values in memory.
	pub fn without_backend() -> Self {
		tracing::warn!("storage has no backend; values will not be persisted");
		Self {
			container: Observer::mapping(),
			backend: None,
		}
	}

	/// Observable container holding the current values.
	pub fn container(&self) -> &Observer {
		&self.container
	}

	pub fn has_backend(&self) -> bool {
		self.backend.is_some()
	}

	/// Reads `key`.
	///
	/// With a backend the stored string is decoded, so values written by
	/// another party are visible even before their notification arrives.
	///
	/// # Errors
	///
	/// Returns [`StorageError::Decode`] if the stored string is not JSON, or
	/// the backend's own error.
	pub fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
		let Some(backend) = &self.backend else {
			return Ok(self.container.get(key));
		};
		match backend.get_item(key)? {
			Some(raw) => decode(key, &raw).map(Some),
			None => Ok(None),
		}
	}

	/// Writes `value` to the backend, then to the container.
	///
	/// # Errors
	///
	/// Returns [`StorageError::Encode`] or the backend's error; the container
	/// is left untouched in that case.
	pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), StorageError> {
		let value = value.into();
		if let Some(backend) = &self.backend {
			let encoded = serde_json::to_string(&value).map_err(|source| StorageError::Encode {
				key: key.to_string(),
				source,
			})?;
			backend.set_item(key, &encoded)?;
		}
		self.container.set(key, value);
		Ok(())
	}

	/// Removes `key` from the backend and the container.
	pub fn remove(&self, key: &str) -> Result<Option<Value>, StorageError> {
		if let Some(backend) = &self.backend {
			backend.remove_item(key)?;
		}
		Ok(self.container.del(key))
	}

	/// Applies a change made to the backend by another party.
	///
	/// `new_value` is the raw stored string, or `None` when the key was
	/// removed. The container is updated and its listeners notified; the
	/// backend is not written again.
	///
	/// # Errors
	///
	/// Returns [`StorageError::Decode`] if `new_value` is not JSON; the
	/// container keeps its previous value.
	pub fn handle_storage_event(&self, key: &str, new_value: Option<&str>) -> Result<(), StorageError> {
		match new_value {
			Some(raw) => {
				let value = decode(key, raw)?;
				tracing::debug!(key, "applying external storage change");
				self.container.set(key, value);
			}
			None => {
				tracing::debug!(key, "applying external storage removal");
				self.container.del(key);
			}
		}
		Ok(())
	}
}

fn decode(key: &str, raw: &str) -> Result<Value, StorageError> {
	serde_json::from_str::<serde_json::Value>(raw)
		.map(Value::from)
		.map_err(|source| {
			tracing::warn!(key, error = %source, "stored value is not valid JSON");
			StorageError::Decode {
				key: key.to_string(),
				source,
			}
		})
}

impl fmt::Debug for Storage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Storage")
			.field("keys", &self.container.len())
			.field("has_backend", &self.backend.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::{fixture, rstest};
	use scopewire_core::ChangeEvent;
	use tracing_test::traced_test;

	#[fixture]
	fn backend() -> MemoryBackend {
		MemoryBackend::new()
	}

	#[rstest]
	fn test_set_mirrors_json_into_backend(backend: MemoryBackend) {
		// Arrange
		let storage = Storage::new(backend.clone());

		// Act
		storage.set("volume", 0.5).unwrap();
		storage.set("pairs", Value::from(vec![Value::from("EUR/USD")])).unwrap();

		// Assert
		assert_eq!(backend.raw("volume").as_deref(), Some("0.5"));
		assert_eq!(backend.raw("pairs").as_deref(), Some(r#"["EUR/USD"]"#));
		assert_eq!(storage.container().get("volume"), Some(Value::from(0.5)));
	}

	#[rstest]
	fn test_get_decodes_from_backend(backend: MemoryBackend) {
		// Arrange
		backend.set_item("user", r#"{"name":"ada"}"#).unwrap();
		let storage = Storage::new(backend);

		// Act
		let value = storage.get("user").unwrap().unwrap();

		// Assert
		assert_eq!(value.lookup_path("name"), Some(Value::from("ada")));
		assert_eq!(storage.get("missing").unwrap(), None);
	}

	#[rstest]
	#[traced_test]
	fn test_get_reports_undecodable_value(backend: MemoryBackend) {
		// Arrange
		backend.set_item("broken", "{not json").unwrap();
		let storage = Storage::new(backend);

		// Act
		let result = storage.get("broken");

		// Assert
		assert!(matches!(result, Err(StorageError::Decode { ref key, .. }) if key == "broken"));
		assert!(logs_contain("stored value is not valid JSON"));
	}

	#[rstest]
	fn test_storage_event_notifies_without_writing_back(backend: MemoryBackend) {
		// Arrange
		let storage = Storage::new(backend.clone());
		let seen = Rc::new(RefCell::new(Vec::new()));
		let log = seen.clone();
		let _subscription = storage.container().observe_key("theme", move |event: &ChangeEvent| {
			log.borrow_mut().push(event.new_value().cloned());
		});

		// Act
		storage.handle_storage_event("theme", Some(r#""light""#)).unwrap();

		// Assert
		assert_eq!(*seen.borrow(), vec![Some(Value::from("light"))]);
		assert_eq!(backend.raw("theme"), None);
	}

	#[rstest]
	fn test_storage_event_removal_deletes_key(backend: MemoryBackend) {
		// Arrange
		let storage = Storage::new(backend);
		storage.set("theme", "dark").unwrap();

		// Act
		storage.handle_storage_event("theme", None).unwrap();

		// Assert
		assert_eq!(storage.container().get("theme"), None);
	}

	#[rstest]
	fn test_undecodable_storage_event_keeps_previous_value(backend: MemoryBackend) {
		// Arrange
		let storage = Storage::new(backend);
		storage.set("theme", "dark").unwrap();

		// Act
		let result = storage.handle_storage_event("theme", Some("dark"));

		// Assert
		assert!(result.is_err());
		assert_eq!(storage.container().get("theme"), Some(Value::from("dark")));
	}

	#[rstest]
	fn test_remove_clears_backend_and_container(backend: MemoryBackend) {
		// Arrange
		let storage = Storage::new(backend.clone());
		storage.set("theme", "dark").unwrap();

		// Act
		let removed = storage.remove("theme").unwrap();

		// Assert
		assert_eq!(removed, Some(Value::from("dark")));
		assert!(backend.is_empty());
		assert_eq!(storage.get("theme").unwrap(), None);
	}

	#[rstest]
	#[traced_test]
	fn test_without_backend_reads_container() {
		// Arrange
		let storage = Storage::without_backend();

		// Act
		storage.set("theme", "dark").unwrap();

		// Assert
		assert_eq!(storage.get("theme").unwrap(), Some(Value::from("dark")));
		assert!(logs_contain("storage has no backend"));
	}
}
