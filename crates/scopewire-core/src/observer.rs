//! Observable containers
//!
//! An [`Observer`] wraps either an insertion-ordered mapping or a contiguous
//! sequence and turns every mutation made through its accessor API into a
//! typed [`ChangeEvent`].
//!
//! ## Channels
//!
//! - `change` receives every event of the container
//! - `change.<key>` receives events for one key (splices only go to `change`)
//! - `change.child` receives events re-fired by direct children, see below
//!
//! ## Bubbling
//!
//! A container may be linked to a parent container. Every event emitted by
//! the child is re-fired unchanged on the parent's `change.child` channel,
//! one level up. The link is non-owning: dropping the parent silently stops
//! bubbling.
//!
//! ## Example
//!
//! ```
//! use scopewire_core::observer::{Change, Observer};
//! use scopewire_core::value::Value;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let rates = Observer::sequence_from([10, 20, 30]);
//! let seen = Rc::new(RefCell::new(Vec::new()));
//!
//! let log = seen.clone();
//! let _subscription = rates.observe(move |event| {
//!     if let Change::Splice { removed, .. } = &event.change {
//!         log.borrow_mut().push(removed.clone());
//!     }
//! });
//!
//! rates.splice(1, 1, [Value::from(99)]).unwrap();
//! assert_eq!(rates.snapshot().to_json(), serde_json::json!([10, 99, 30]));
//! assert_eq!(seen.borrow().len(), 1);
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::error::{ContainerMode, ObserverError, Result};
use crate::events::{EventEmitter, ListenerOutcome, Subscription};
use crate::value::{Key, Value};

/// Channel receiving every event of a container
pub const CHANGE: &str = "change";

/// Channel receiving events bubbled up from child containers
pub const CHILD_CHANNEL: &str = "change.child";

/// Pseudo-key resolving to the parent container
pub const PARENT_KEY: &str = "$parent";

/// Keys starting with this character are hidden from plain snapshots
pub const RESERVED_SIGIL: char = '$';

/// Returns the per-key channel name for `key`.
///
/// A mapping key literally named `child` shares its channel with
/// [`CHILD_CHANNEL`].
pub fn key_channel(key: &Key) -> String {
	format!("{CHANGE}.{key}")
}

/// What a mutation did
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
	/// A key or index was created
	Add { new: Value },
	/// An existing entry changed
	Update { new: Value, old: Value },
	/// A mapping key was removed
	Delete { old: Value },
	/// Bulk structural edit of a sequence
	Splice {
		start: usize,
		removed: Vec<Value>,
		inserted: Vec<Value>,
	},
}

/// Discriminant of [`Change`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
	Add,
	Update,
	Delete,
	Splice,
}

/// Payload emitted for every mutation of an [`Observer`].
#[derive(Debug, Clone)]
pub struct ChangeEvent {
	/// Affected key; `None` for splices, which span the whole collection
	pub name: Option<Key>,
	/// Container that emitted the event
	pub container: Observer,
	/// The mutation
	pub change: Change,
}

impl ChangeEvent {
	pub fn kind(&self) -> ChangeKind {
		match self.change {
			Change::Add { .. } => ChangeKind::Add,
			Change::Update { .. } => ChangeKind::Update,
			Change::Delete { .. } => ChangeKind::Delete,
			Change::Splice { .. } => ChangeKind::Splice,
		}
	}

	/// Value after the mutation, for `Add` and `Update`
	pub fn new_value(&self) -> Option<&Value> {
		match &self.change {
			Change::Add { new } | Change::Update { new, .. } => Some(new),
			_ => None,
		}
	}

	/// Value before the mutation, for `Update` and `Delete`
	pub fn old_value(&self) -> Option<&Value> {
		match &self.change {
			Change::Update { old, .. } | Change::Delete { old } => Some(old),
			_ => None,
		}
	}

	/// Items removed by a splice
	pub fn removed(&self) -> &[Value] {
		match &self.change {
			Change::Splice { removed, .. } => removed,
			_ => &[],
		}
	}

	/// Number of items a splice inserted
	pub fn inserted_count(&self) -> usize {
		match &self.change {
			Change::Splice { inserted, .. } => inserted.len(),
			_ => 0,
		}
	}
}

/// Options for [`Observer::set_with`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
	/// Emit an update even if the value did not change
	pub force: bool,
}

impl SetOptions {
	pub fn forced() -> Self {
		Self { force: true }
	}
}

/// Where [`Observer::add_with`] places a value in a sequence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AddMethod {
	#[default]
	Push,
	Unshift,
}

/// Options for [`Observer::add_with`]
#[derive(Debug, Clone, Copy, Default)]
pub struct AddOptions {
	pub method: AddMethod,
}

type Transform = Rc<dyn Fn(Value) -> Value>;

/// Options for [`Observer::add_bulk`]
#[derive(Clone, Default)]
pub struct BulkOptions {
	transform: Option<Transform>,
}

impl BulkOptions {
	/// Maps every value before it is inserted.
	pub fn with_transform<F>(mut self, transform: F) -> Self
	where
		F: Fn(Value) -> Value + 'static,
	{
		self.transform = Some(Rc::new(transform));
		self
	}
}

impl fmt::Debug for BulkOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("BulkOptions")
			.field("transform", &self.transform.is_some())
			.finish()
	}
}

enum Values {
	Mapping(IndexMap<String, Value>),
	Sequence(Vec<Value>),
}

impl Values {
	fn mode(&self) -> ContainerMode {
		match self {
			Self::Mapping(_) => ContainerMode::Mapping,
			Self::Sequence(_) => ContainerMode::Sequence,
		}
	}

	fn get(&self, key: &Key) -> Option<&Value> {
		match (self, key) {
			(Self::Mapping(map), Key::Name(name)) => map.get(name.as_str()),
			(Self::Mapping(map), Key::Index(index)) => map.get(index.to_string().as_str()),
			(Self::Sequence(items), key) => key.as_index().and_then(|index| items.get(index)),
		}
	}

	fn get_mut(&mut self, key: &Key) -> Option<&mut Value> {
		match (self, key) {
			(Self::Mapping(map), key) => map.get_mut(key.to_string().as_str()),
			(Self::Sequence(items), key) => key.as_index().and_then(|index| items.get_mut(index)),
		}
	}

	fn len(&self) -> usize {
		match self {
			Self::Mapping(map) => map.len(),
			Self::Sequence(items) => items.len(),
		}
	}
}

struct ObserverInner {
	values: RefCell<Values>,
	parent: RefCell<Weak<ObserverInner>>,
	emitter: EventEmitter<ChangeEvent>,
	disposed: Cell<bool>,
}

/// An observable mapping or sequence.
///
/// `Observer` is a cheap handle; clones refer to the same container.
#[derive(Clone)]
pub struct Observer {
	inner: Rc<ObserverInner>,
}

impl Observer {
	fn with_values(values: Values) -> Self {
		Self {
			inner: Rc::new(ObserverInner {
				values: RefCell::new(values),
				parent: RefCell::new(Weak::new()),
				emitter: EventEmitter::new(),
				disposed: Cell::new(false),
			}),
		}
	}

	/// Creates an empty mapping container.
	pub fn mapping() -> Self {
		Self::with_values(Values::Mapping(IndexMap::new()))
	}

	/// Creates an empty sequence container.
	pub fn sequence() -> Self {
		Self::with_values(Values::Sequence(Vec::new()))
	}

	/// Creates an empty mapping container linked to `parent`.
	pub fn with_parent(parent: &Observer) -> Self {
		let observer = Self::mapping();
		observer.set_parent(Some(parent));
		observer
	}

	/// Creates a mapping pre-populated with `entries`, in order.
	pub fn mapping_from<K, V, I>(entries: I) -> Self
	where
		K: Into<String>,
		V: Into<Value>,
		I: IntoIterator<Item = (K, V)>,
	{
		let observer = Self::mapping();
		for (key, value) in entries {
			observer.add(key.into(), value);
		}
		observer
	}

	/// Creates a sequence pre-populated with `items`, in order.
	pub fn sequence_from<V, I>(items: I) -> Self
	where
		V: Into<Value>,
		I: IntoIterator<Item = V>,
	{
		Self::with_values(Values::Sequence(items.into_iter().map(Into::into).collect()))
	}

	/// Wraps a plain value: lists become sequences, maps become mappings and
	/// containers are returned as-is. Other values have no container form.
	pub fn from_value(value: Value) -> Option<Self> {
		match value {
			Value::List(items) => Some(Self::sequence_from(items)),
			Value::Map(map) => Some(Self::with_values(Values::Mapping(map))),
			Value::Container(observer) => Some(observer),
			_ => None,
		}
	}

	/// Storage mode, fixed at construction
	pub fn mode(&self) -> ContainerMode {
		self.inner.values.borrow().mode()
	}

	pub fn is_sequence(&self) -> bool {
		self.mode() == ContainerMode::Sequence
	}

	pub fn len(&self) -> usize {
		self.inner.values.borrow().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Keys in order: names for mappings, indices for sequences.
	pub fn keys(&self) -> Vec<Key> {
		match &*self.inner.values.borrow() {
			Values::Mapping(map) => map.keys().cloned().map(Key::Name).collect(),
			Values::Sequence(items) => (0..items.len()).map(Key::Index).collect(),
		}
	}

	pub fn values(&self) -> Vec<Value> {
		match &*self.inner.values.borrow() {
			Values::Mapping(map) => map.values().cloned().collect(),
			Values::Sequence(items) => items.clone(),
		}
	}

	/// Entries in order, as `(key, value)` pairs.
	pub fn entries(&self) -> Vec<(Key, Value)> {
		match &*self.inner.values.borrow() {
			Values::Mapping(map) => map
				.iter()
				.map(|(k, v)| (Key::Name(k.clone()), v.clone()))
				.collect(),
			Values::Sequence(items) => items
				.iter()
				.cloned()
				.enumerate()
				.map(|(i, v)| (Key::Index(i), v))
				.collect(),
		}
	}

	/// Returns true if `key` is stored directly in this container.
	pub fn has_key(&self, key: impl Into<Key>) -> bool {
		self.inner.values.borrow().get(&key.into()).is_some()
	}

	/// Reads a value.
	///
	/// Names may contain dots (`"rates.EURUSD"`) to reach into nested
	/// containers, maps and lists. `"$parent"` resolves to the parent
	/// container. A missing or non-traversable intermediate is logged and
	/// yields `None`.
	pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
		let key = key.into();
		if let Key::Name(name) = &key {
			if name == PARENT_KEY {
				return self.parent().map(Value::Container);
			}
			if let Some((head, rest)) = name.split_once('.') {
				return self.get_nested(head, rest);
			}
		}
		self.inner.values.borrow().get(&key).cloned()
	}

	/// Reads a value stored directly in this container. Unlike
	/// [`Observer::get`], dots and `"$parent"` are taken literally.
	pub fn get_own(&self, key: impl Into<Key>) -> Option<Value> {
		let key = self.canonical_key(key.into());
		self.inner.values.borrow().get(&key).cloned()
	}

	fn get_nested(&self, head: &str, rest: &str) -> Option<Value> {
		let Some(base) = self.get(head) else {
			tracing::debug!(path = %format!("{head}.{rest}"), "get: `{head}` is not defined");
			return None;
		};
		match &base {
			Value::Container(nested) => nested.get(rest),
			Value::Map(_) | Value::List(_) => base.lookup_path(rest),
			other => {
				tracing::debug!(
					path = %format!("{head}.{rest}"),
					found = other.type_name(),
					"get: intermediate value cannot be traversed"
				);
				None
			}
		}
	}

	/// Reads a value, falling back to `default` when it is absent.
	pub fn get_or(&self, key: impl Into<Key>, default: impl Into<Value>) -> Value {
		self.get(key).unwrap_or_else(|| default.into())
	}

	/// Stores `value` under `key`.
	///
	/// Unknown keys are added (see [`Observer::add`]). Storing a value equal
	/// to the current one emits nothing.
	pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) {
		self.set_with(key, value, SetOptions::default());
	}

	/// [`Observer::set`] with options.
	pub fn set_with(&self, key: impl Into<Key>, value: impl Into<Value>, options: SetOptions) {
		let key = self.canonical_key(key.into());
		let value = value.into();
		if self.assign_parent_key(&key, &value) {
			return;
		}

		let old = match self.inner.values.borrow_mut().get_mut(&key) {
			Some(slot) if *slot == value && !options.force => return,
			Some(slot) => Some(std::mem::replace(slot, value.clone())),
			None => None,
		};

		match old {
			Some(old) => self.emit(Some(key), Change::Update { new: value, old }),
			None => {
				self.add(key, value);
			}
		}
	}

	/// Adds a value and returns the key it was stored under.
	///
	/// Sequences ignore `key` and append; the resulting index is returned.
	/// On a mapping an existing key degrades to [`Observer::set`].
	pub fn add(&self, key: impl Into<Key>, value: impl Into<Value>) -> Key {
		self.add_with(key, value, AddOptions::default())
	}

	/// [`Observer::add`] with options.
	pub fn add_with(&self, key: impl Into<Key>, value: impl Into<Value>, options: AddOptions) -> Key {
		let key = self.canonical_key(key.into());
		let value = value.into();
		if self.assign_parent_key(&key, &value) {
			return key;
		}

		let inserted = {
			let mut values = self.inner.values.borrow_mut();
			match &mut *values {
				Values::Sequence(items) => match options.method {
					AddMethod::Push => {
						items.push(value.clone());
						Some(Key::Index(items.len() - 1))
					}
					AddMethod::Unshift => {
						items.insert(0, value.clone());
						Some(Key::Index(0))
					}
				},
				Values::Mapping(map) => {
					let name = key.to_string();
					if map.contains_key(&name) {
						None
					} else {
						map.insert(name.clone(), value.clone());
						Some(Key::Name(name))
					}
				}
			}
		};

		match inserted {
			Some(key) => {
				self.emit(Some(key.clone()), Change::Add { new: value });
				key
			}
			None => {
				self.set(key.clone(), value);
				key
			}
		}
	}

	/// Removes an entry and returns its value.
	///
	/// Sequences delegate to [`Observer::splice`]. Unknown keys are ignored.
	pub fn del(&self, key: impl Into<Key>) -> Option<Value> {
		let key = self.canonical_key(key.into());
		if self.is_sequence() {
			let index = key.as_index().filter(|&index| index < self.len())?;
			return self.splice_sequence(index, 1, Vec::new())?.into_iter().next();
		}

		let old = match &mut *self.inner.values.borrow_mut() {
			Values::Mapping(map) => map.shift_remove(key.to_string().as_str())?,
			Values::Sequence(_) => return None,
		};
		self.emit(Some(key), Change::Delete { old: old.clone() });
		Some(old)
	}

	/// Appends a value to a sequence and returns the new length.
	pub fn push(&self, value: impl Into<Value>) -> Result<usize> {
		self.require_sequence("push")?;
		self.add_with(Key::Index(0), value, AddOptions::default());
		Ok(self.len())
	}

	/// Prepends a value to a sequence and returns the new length.
	pub fn unshift(&self, value: impl Into<Value>) -> Result<usize> {
		self.require_sequence("unshift")?;
		self.add_with(
			Key::Index(0),
			value,
			AddOptions {
				method: AddMethod::Unshift,
			},
		);
		Ok(self.len())
	}

	/// Removes and returns the last item of a sequence.
	pub fn pop(&self) -> Result<Option<Value>> {
		self.require_sequence("pop")?;
		match self.len() {
			0 => Ok(None),
			len => Ok(self.splice_sequence(len - 1, 1, Vec::new()).and_then(|r| r.into_iter().next())),
		}
	}

	/// Removes and returns the first item of a sequence.
	pub fn shift(&self) -> Result<Option<Value>> {
		self.require_sequence("shift")?;
		if self.is_empty() {
			return Ok(None);
		}
		Ok(self.splice_sequence(0, 1, Vec::new()).and_then(|r| r.into_iter().next()))
	}

	/// Removes `delete_count` items at `start`, inserts `items` there and
	/// returns the removed items.
	///
	/// `start` is clamped to the length. Exactly one `Splice` event is emitted,
	/// even if nothing was removed or inserted.
	pub fn splice<I>(&self, start: usize, delete_count: usize, items: I) -> Result<Vec<Value>>
	where
		I: IntoIterator<Item = Value>,
	{
		self.splice_sequence(start, delete_count, items.into_iter().collect())
			.ok_or(ObserverError::InvalidOperationKind {
				operation: "splice",
				mode: ContainerMode::Mapping,
			})
	}

	fn splice_sequence(&self, start: usize, delete_count: usize, inserted: Vec<Value>) -> Option<Vec<Value>> {
		let (start, removed) = {
			let mut values = self.inner.values.borrow_mut();
			let Values::Sequence(items) = &mut *values else {
				return None;
			};
			let start = start.min(items.len());
			let end = start.saturating_add(delete_count).min(items.len());
			let removed: Vec<Value> = items.splice(start..end, inserted.iter().cloned()).collect();
			(start, removed)
		};

		self.emit(
			None,
			Change::Splice {
				start,
				removed: removed.clone(),
				inserted,
			},
		);
		Some(removed)
	}

	/// Inserts every entry of `source` (a list, map or container).
	///
	/// Sequences append everything with a single splice; mappings add entry
	/// by entry.
	pub fn add_bulk(&self, source: impl Into<Value>, options: BulkOptions) {
		let entries: Vec<(Key, Value)> = match source.into() {
			Value::List(items) => items
				.into_iter()
				.enumerate()
				.map(|(i, v)| (Key::Index(i), v))
				.collect(),
			Value::Map(map) => map.into_iter().map(|(k, v)| (Key::Name(k), v)).collect(),
			Value::Container(observer) => observer.entries(),
			other => {
				tracing::debug!(found = other.type_name(), "add_bulk: source is not a collection");
				return;
			}
		};
		let transform = |value: Value| match &options.transform {
			Some(transform) => transform(value),
			None => value,
		};

		if self.is_sequence() {
			let len = self.len();
			let items = entries.into_iter().map(|(_, v)| transform(v)).collect();
			self.splice_sequence(len, 0, items);
		} else {
			for (key, value) in entries {
				self.add(key, transform(value));
			}
		}
	}

	/// Subscribes to every event of this container.
	pub fn observe<F, R>(&self, callback: F) -> Subscription
	where
		F: Fn(&ChangeEvent) -> R + 'static,
		R: ListenerOutcome,
	{
		self.inner.emitter.on(CHANGE, callback)
	}

	/// Subscribes to events of one key.
	///
	/// A dotted name subscribes on the nested container named by the first
	/// segment. If that value is missing or not observable, the fault is
	/// logged and a detached subscription is returned.
	pub fn observe_key<F, R>(&self, name: &str, callback: F) -> Subscription
	where
		F: Fn(&ChangeEvent) -> R + 'static,
		R: ListenerOutcome,
	{
		if let Some((head, rest)) = name.split_once('.') {
			return match self.get(head) {
				Some(Value::Container(nested)) => nested.observe_key(rest, callback),
				Some(other) => {
					tracing::debug!(path = name, found = other.type_name(), "observe: value is not observable");
					Subscription::detached()
				}
				None => {
					tracing::debug!(path = name, "observe: `{head}` is not defined");
					Subscription::detached()
				}
			};
		}
		let channel = key_channel(&self.canonical_key(Key::from(name)));
		self.inner.emitter.on(&channel, callback)
	}

	/// Subscribes the same callback to several keys.
	pub fn observe_keys<F, R>(&self, names: &[&str], callback: F) -> Vec<Subscription>
	where
		F: Fn(&ChangeEvent) -> R + 'static,
		R: ListenerOutcome,
	{
		let callback = Rc::new(callback);
		names
			.iter()
			.map(|name| {
				let callback = Rc::clone(&callback);
				self.observe_key(name, move |event: &ChangeEvent| callback(event))
			})
			.collect()
	}

	/// Subscribes to events bubbled up from child containers.
	pub fn observe_children<F, R>(&self, callback: F) -> Subscription
	where
		F: Fn(&ChangeEvent) -> R + 'static,
		R: ListenerOutcome,
	{
		self.inner.emitter.on(CHILD_CHANNEL, callback)
	}

	/// Extracts the plain contents.
	///
	/// A sequence is drained: its items are returned and removed with one
	/// splice, so observers see a single `Splice` event. A mapping returns a
	/// shallow copy without reserved (`$`-prefixed) keys.
	pub fn to_plain_value(&self) -> Value {
		if self.is_sequence() {
			let len = self.len();
			return Value::List(self.splice_sequence(0, len, Vec::new()).unwrap_or_default());
		}
		self.snapshot()
	}

	/// Non-destructive plain copy of the contents, without reserved keys.
	pub fn snapshot(&self) -> Value {
		match &*self.inner.values.borrow() {
			Values::Sequence(items) => Value::List(items.clone()),
			Values::Mapping(map) => Value::Map(
				map.iter()
					.filter(|(k, _)| !k.starts_with(RESERVED_SIGIL))
					.map(|(k, v)| (k.clone(), v.clone()))
					.collect(),
			),
		}
	}

	/// Parent container, if linked and still alive.
	pub fn parent(&self) -> Option<Observer> {
		self.inner
			.parent
			.borrow()
			.upgrade()
			.map(|inner| Observer { inner })
	}

	/// Links this container to `parent` for bubbling, or unlinks it.
	pub fn set_parent(&self, parent: Option<&Observer>) {
		*self.inner.parent.borrow_mut() = parent.map_or_else(Weak::new, |p| Rc::downgrade(&p.inner));
	}

	/// Returns true if both handles refer to the same container.
	pub fn ptr_eq(&self, other: &Observer) -> bool {
		Rc::ptr_eq(&self.inner, &other.inner)
	}

	/// The emitter carrying this container's channels.
	pub fn emitter(&self) -> &EventEmitter<ChangeEvent> {
		&self.inner.emitter
	}

	/// Removes every listener, severs the parent link and drops the stored
	/// values without emitting events.
	pub fn dispose(&self) {
		if self.inner.disposed.replace(true) {
			return;
		}
		self.inner.emitter.clear();
		self.set_parent(None);
		match &mut *self.inner.values.borrow_mut() {
			Values::Mapping(map) => map.clear(),
			Values::Sequence(items) => items.clear(),
		}
	}

	pub fn is_disposed(&self) -> bool {
		self.inner.disposed.get()
	}

	fn canonical_key(&self, key: Key) -> Key {
		match (self.is_sequence(), key) {
			(true, Key::Name(name)) => match name.parse() {
				Ok(index) => Key::Index(index),
				Err(_) => Key::Name(name),
			},
			(false, Key::Index(index)) => Key::Name(index.to_string()),
			(_, key) => key,
		}
	}

	/// Handles writes to `$parent`, which relink instead of storing.
	fn assign_parent_key(&self, key: &Key, value: &Value) -> bool {
		if key.as_name() != Some(PARENT_KEY) {
			return false;
		}
		match value {
			Value::Container(parent) => self.set_parent(Some(parent)),
			_ => self.set_parent(None),
		}
		true
	}

	fn require_sequence(&self, operation: &'static str) -> Result<()> {
		match self.mode() {
			ContainerMode::Sequence => Ok(()),
			mode => Err(ObserverError::InvalidOperationKind { operation, mode }),
		}
	}

	fn emit(&self, name: Option<Key>, change: Change) {
		let event = ChangeEvent {
			name,
			container: self.clone(),
			change,
		};
		match &event.name {
			Some(key) => {
				let channel = key_channel(key);
				self.inner.emitter.trigger([CHANGE, channel.as_str()], &event);
			}
			None => self.inner.emitter.trigger([CHANGE], &event),
		}
		if let Some(parent) = self.parent() {
			parent.inner.emitter.trigger([CHILD_CHANNEL], &event);
		}
	}
}

impl Default for Observer {
	fn default() -> Self {
		Self::mapping()
	}
}

impl fmt::Debug for Observer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		// Values may contain this container again through a parent cycle, so
		// only the shape is printed.
		let values = self.inner.values.try_borrow();
		f.debug_struct("Observer")
			.field("mode", &values.as_ref().map(|v| v.mode()).ok())
			.field("len", &values.as_ref().map(|v| v.len()).ok())
			.field("has_parent", &self.parent().is_some())
			.field("listeners", &self.inner.emitter.total_listeners())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;
	use std::cell::RefCell;

	fn record(observer: &Observer) -> (Rc<RefCell<Vec<ChangeEvent>>>, Subscription) {
		let events = Rc::new(RefCell::new(Vec::new()));
		let sink = events.clone();
		let subscription = observer.observe(move |event: &ChangeEvent| sink.borrow_mut().push(event.clone()));
		(events, subscription)
	}

	fn kinds(events: &RefCell<Vec<ChangeEvent>>) -> Vec<ChangeKind> {
		events.borrow().iter().map(ChangeEvent::kind).collect()
	}

	#[rstest]
	fn test_add_then_equal_set_emits_only_add() {
		// Arrange
		let observer = Observer::mapping();
		let (events, _sub) = record(&observer);

		// Act
		observer.add("x", 1);
		observer.set("x", 1);

		// Assert
		assert_eq!(kinds(&events), vec![ChangeKind::Add]);
		assert_eq!(observer.get("x"), Some(Value::from(1)));
	}

	#[rstest]
	fn test_set_unknown_key_adds() {
		// Arrange
		let observer = Observer::mapping();
		let (events, _sub) = record(&observer);

		// Act
		observer.set("EURUSD", 1.1);
		observer.set("EURUSD", 1.2);

		// Assert
		assert_eq!(kinds(&events), vec![ChangeKind::Add, ChangeKind::Update]);
		assert_eq!(events.borrow()[1].old_value(), Some(&Value::from(1.1)));
	}

	#[rstest]
	fn test_forced_set_emits_update() {
		// Arrange
		let observer = Observer::mapping_from([("x", 1)]);
		let (events, _sub) = record(&observer);

		// Act
		observer.set_with("x", 1, SetOptions::forced());

		// Assert
		assert_eq!(kinds(&events), vec![ChangeKind::Update]);
	}

	#[rstest]
	fn test_mapping_add_existing_key_degrades_to_set() {
		// Arrange
		let observer = Observer::mapping_from([("x", 1)]);
		let (events, _sub) = record(&observer);

		// Act
		let key = observer.add("x", 2);

		// Assert
		assert_eq!(key, Key::from("x"));
		assert_eq!(kinds(&events), vec![ChangeKind::Update]);
	}

	#[rstest]
	fn test_per_key_channel() {
		// Arrange
		let observer = Observer::mapping_from([("a", 1), ("b", 2)]);
		let hits = Rc::new(RefCell::new(Vec::new()));
		let sink = hits.clone();
		let _sub = observer.observe_key("b", move |event: &ChangeEvent| {
			sink.borrow_mut().push(event.new_value().cloned());
		});

		// Act
		observer.set("a", 10);
		observer.set("b", 20);

		// Assert
		assert_eq!(*hits.borrow(), vec![Some(Value::from(20))]);
	}

	#[rstest]
	fn test_unshift_reports_index_zero() {
		// Arrange
		let observer = Observer::sequence_from(["b"]);
		let (events, _sub) = record(&observer);

		// Act
		let len = observer.unshift("a").unwrap();

		// Assert
		assert_eq!(len, 2);
		assert_eq!(events.borrow()[0].name, Some(Key::Index(0)));
		assert_eq!(observer.snapshot().to_json(), json!(["a", "b"]));
	}

	#[rstest]
	fn test_splice_scenario() {
		// Arrange
		let observer = Observer::sequence_from([10, 20, 30]);
		let (events, _sub) = record(&observer);

		// Act
		let removed = observer.splice(1, 1, [Value::from(99)]).unwrap();

		// Assert
		assert_eq!(removed, vec![Value::from(20)]);
		assert_eq!(observer.snapshot().to_json(), json!([10, 99, 30]));
		let events = events.borrow();
		assert_eq!(events.len(), 1);
		assert_eq!(events[0].removed(), &[Value::from(20)]);
		assert_eq!(events[0].inserted_count(), 1);
		assert_eq!(events[0].name, None);
	}

	#[rstest]
	fn test_splice_clamps_start() {
		// Arrange
		let observer = Observer::sequence_from([1, 2]);

		// Act
		let removed = observer.splice(10, 3, [Value::from(3)]).unwrap();

		// Assert
		assert!(removed.is_empty());
		assert_eq!(observer.snapshot().to_json(), json!([1, 2, 3]));
	}

	#[rstest]
	fn test_pop_and_shift_on_empty_sequence() {
		// Arrange
		let observer = Observer::sequence();
		let (events, _sub) = record(&observer);

		// Act / Assert
		assert_eq!(observer.pop(), Ok(None));
		assert_eq!(observer.shift(), Ok(None));
		assert!(events.borrow().is_empty());
	}

	#[rstest]
	#[case("push", |o: &Observer| o.push(1).map(drop))]
	#[case("unshift", |o: &Observer| o.unshift(1).map(drop))]
	#[case("pop", |o: &Observer| o.pop().map(drop))]
	#[case("shift", |o: &Observer| o.shift().map(drop))]
	#[case("splice", |o: &Observer| o.splice(0, 1, []).map(drop))]
	fn test_sequence_operations_reject_mapping(
		#[case] operation: &'static str,
		#[case] call: fn(&Observer) -> Result<()>,
	) {
		// Arrange
		let observer = Observer::mapping();
		let (events, _sub) = record(&observer);

		// Act
		let result = call(&observer);

		// Assert
		assert_eq!(
			result,
			Err(ObserverError::InvalidOperationKind {
				operation,
				mode: ContainerMode::Mapping,
			})
		);
		assert!(events.borrow().is_empty());
	}

	#[rstest]
	fn test_del_on_sequence_splices() {
		// Arrange
		let observer = Observer::sequence_from(["a", "b", "c"]);
		let (events, _sub) = record(&observer);

		// Act
		let removed = observer.del("1");

		// Assert
		assert_eq!(removed, Some(Value::from("b")));
		assert_eq!(kinds(&events), vec![ChangeKind::Splice]);
	}

	#[rstest]
	fn test_del_unknown_key_is_noop() {
		// Arrange
		let observer = Observer::mapping();
		let (events, _sub) = record(&observer);

		// Act
		let removed = observer.del("missing");

		// Assert
		assert_eq!(removed, None);
		assert!(events.borrow().is_empty());
	}

	#[rstest]
	fn test_dotted_get() {
		// Arrange
		let rates = Observer::mapping_from([("EURUSD", 1.5)]);
		let scope = Observer::mapping_from([("rates", Value::from(&rates))]);
		scope.set("plain", Value::from(json!({ "inner": "x" })));

		// Act / Assert
		assert_eq!(scope.get("rates.EURUSD"), Some(Value::from(1.5)));
		assert_eq!(scope.get("plain.inner"), Some(Value::from("x")));
		assert_eq!(scope.get("missing.inner"), None);
		assert_eq!(scope.get_or("missing.inner", "n/a"), Value::from("n/a"));
	}

	#[rstest]
	fn test_get_own_takes_keys_literally() {
		// Arrange
		let quotes = Observer::mapping_from([("EUR.USD", 1.08)]);
		let rates = Observer::sequence_from([1, 2]);

		// Act / Assert
		assert_eq!(quotes.get("EUR.USD"), None);
		assert_eq!(quotes.get_own("EUR.USD"), Some(Value::from(1.08)));
		assert_eq!(rates.get_own("1"), Some(Value::from(2)));
		assert_eq!(rates.get_own(5_usize), None);
	}

	#[rstest]
	fn test_dotted_observe_delegates_to_nested_container() {
		// Arrange
		let rates = Observer::mapping_from([("EURUSD", 1.5)]);
		let scope = Observer::mapping_from([("rates", Value::from(&rates))]);
		let hits = Rc::new(RefCell::new(0));
		let sink = hits.clone();
		let _sub = scope.observe_key("rates.EURUSD", move |_: &ChangeEvent| *sink.borrow_mut() += 1);

		// Act
		rates.set("EURUSD", 1.6);

		// Assert
		assert_eq!(*hits.borrow(), 1);
	}

	#[rstest]
	fn test_observe_non_observable_path_is_detached() {
		// Arrange
		let scope = Observer::mapping_from([("count", 1)]);

		// Act
		let subscription = scope.observe_key("count.value", |_: &ChangeEvent| {});

		// Assert
		assert!(!subscription.is_attached());
	}

	#[rstest]
	fn test_child_events_bubble_once() {
		// Arrange
		let parent = Observer::mapping();
		let child = Observer::with_parent(&parent);
		let bubbled = Rc::new(RefCell::new(Vec::new()));
		let sink = bubbled.clone();
		let _sub = parent.observe_children(move |event: &ChangeEvent| {
			sink.borrow_mut().push(event.container.clone());
		});

		// Act
		child.set("x", 1);

		// Assert
		let bubbled = bubbled.borrow();
		assert_eq!(bubbled.len(), 1);
		assert!(bubbled[0].ptr_eq(&child));
	}

	#[rstest]
	fn test_parent_key_relinks() {
		// Arrange
		let parent = Observer::mapping();
		let child = Observer::mapping();

		// Act
		child.set(PARENT_KEY, &parent);

		// Assert
		assert!(child.parent().is_some_and(|p| p.ptr_eq(&parent)));
		assert!(!child.has_key(PARENT_KEY));
		assert!(matches!(child.get(PARENT_KEY), Some(Value::Container(p)) if p.ptr_eq(&parent)));
	}

	#[rstest]
	fn test_to_plain_value_drains_sequence() {
		// Arrange
		let observer = Observer::sequence_from([1, 2]);
		let (events, _sub) = record(&observer);

		// Act
		let plain = observer.to_plain_value();

		// Assert
		assert_eq!(plain.to_json(), json!([1, 2]));
		assert!(observer.is_empty());
		assert_eq!(kinds(&events), vec![ChangeKind::Splice]);
	}

	#[rstest]
	fn test_to_plain_value_hides_reserved_keys() {
		// Arrange
		let observer = Observer::mapping_from([("$index", 0), ("name", 1)]);

		// Act
		let plain = observer.to_plain_value();

		// Assert
		assert_eq!(plain.to_json(), json!({ "name": 1 }));
		assert_eq!(observer.len(), 2);
	}

	#[rstest]
	fn test_add_bulk_sequence_single_splice_with_transform() {
		// Arrange
		let observer = Observer::sequence_from([0]);
		let (events, _sub) = record(&observer);

		// Act
		observer.add_bulk(
			Value::from(json!([1, 2, 3])),
			BulkOptions::default().with_transform(|v| Value::from(v.as_f64().unwrap_or_default() * 10.0)),
		);

		// Assert
		assert_eq!(observer.snapshot().to_json(), json!([0, 10, 20, 30]));
		assert_eq!(kinds(&events), vec![ChangeKind::Splice]);
	}

	#[rstest]
	fn test_add_bulk_mapping_adds_per_key() {
		// Arrange
		let observer = Observer::mapping();
		let (events, _sub) = record(&observer);

		// Act
		observer.add_bulk(Value::from(json!({ "a": 1, "b": 2 })), BulkOptions::default());

		// Assert
		assert_eq!(kinds(&events), vec![ChangeKind::Add, ChangeKind::Add]);
		assert_eq!(observer.keys(), vec![Key::from("a"), Key::from("b")]);
	}

	#[rstest]
	fn test_callback_may_mutate_its_container() {
		// Arrange
		let observer = Observer::mapping();
		let handle = observer.clone();
		let _sub = observer.observe_key("x", move |event: &ChangeEvent| {
			if let Some(Value::Number(n)) = event.new_value() {
				handle.set("doubled", n * 2.0);
			}
		});

		// Act
		observer.set("x", 4);

		// Assert
		assert_eq!(observer.get("doubled"), Some(Value::from(8)));
	}

	#[rstest]
	fn test_dispose_detaches_listeners_and_parent() {
		// Arrange
		let parent = Observer::mapping();
		let child = Observer::with_parent(&parent);
		let (events, _sub) = record(&child);

		// Act
		child.dispose();
		child.set("x", 1);

		// Assert
		assert!(events.borrow().is_empty());
		assert!(child.parent().is_none());
		assert!(child.is_disposed());
	}
}
