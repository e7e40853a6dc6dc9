//! Named-callback registry
//!
//! [`EventEmitter`] is the dispatch primitive behind every observable in the
//! framework. Callbacks are registered per channel name and invoked
//! synchronously, in registration order, whenever that channel is triggered.
//!
//! ## Fault isolation
//!
//! A callback may return `()` or `Result<(), E>` for any displayable `E`.
//! Errors and panics raised by one callback are caught and logged through
//! `tracing`; the remaining callbacks still run and the caller of
//! [`EventEmitter::trigger`] never observes the failure.
//!
//! ## Example
//!
//! ```
//! use scopewire_core::events::EventEmitter;
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let emitter = EventEmitter::<i32>::new();
//! let total = Rc::new(Cell::new(0));
//!
//! let sink = total.clone();
//! let subscription = emitter.on("add", move |n: &i32| sink.set(sink.get() + n));
//!
//! emitter.trigger(["add"], &2);
//! emitter.trigger(["add"], &3);
//! assert_eq!(total.get(), 5);
//!
//! subscription.unsubscribe();
//! emitter.trigger(["add"], &100);
//! assert_eq!(total.get(), 5);
//! ```

use core::sync::atomic::{AtomicU64, Ordering};
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use indexmap::IndexMap;

use crate::error::CallbackError;

/// Unique identifier of one callback registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
	fn next() -> Self {
		static COUNTER: AtomicU64 = AtomicU64::new(0);
		Self(COUNTER.fetch_add(1, Ordering::Relaxed))
	}
}

/// Tag grouping registrations that belong to the same owner.
///
/// Passing a context to [`EventEmitter::on_with_context`] allows removing
/// every callback of that owner at once with [`EventEmitter::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
	/// Creates a new unique context tag
	pub fn new() -> Self {
		static COUNTER: AtomicU64 = AtomicU64::new(0);
		Self(COUNTER.fetch_add(1, Ordering::Relaxed))
	}
}

impl Default for ContextId {
	fn default() -> Self {
		Self::new()
	}
}

/// Conversion of a callback's return value into a dispatch outcome.
pub trait ListenerOutcome {
	/// Converts the value into the outcome recorded by the emitter.
	fn into_outcome(self) -> Result<(), CallbackError>;
}

impl ListenerOutcome for () {
	fn into_outcome(self) -> Result<(), CallbackError> {
		Ok(())
	}
}

impl<E: fmt::Display> ListenerOutcome for Result<(), E> {
	fn into_outcome(self) -> Result<(), CallbackError> {
		self.map_err(|e| CallbackError::new(e.to_string()))
	}
}

type Callback<A> = Rc<dyn Fn(&A) -> Result<(), CallbackError>>;

struct Registration<A> {
	id: ListenerId,
	context: Option<ContextId>,
	callback: Callback<A>,
}

struct Channels<A>(RefCell<IndexMap<String, Vec<Registration<A>>>>);

/// Type-erased removal used by [`Subscription`].
trait ListenerStore {
	fn remove_listener(&self, name: &str, id: ListenerId) -> bool;
}

impl<A: 'static> ListenerStore for Channels<A> {
	fn remove_listener(&self, name: &str, id: ListenerId) -> bool {
		let mut channels = self.0.borrow_mut();
		let Some(registrations) = channels.get_mut(name) else {
			return false;
		};
		let before = registrations.len();
		registrations.retain(|r| r.id != id);
		let removed = registrations.len() < before;
		if registrations.is_empty() {
			channels.shift_remove(name);
		}
		removed
	}
}

/// A registry of named callbacks.
///
/// `EventEmitter` is a cheap handle: clones share the same registrations.
pub struct EventEmitter<A: 'static> {
	channels: Rc<Channels<A>>,
}

impl<A: 'static> EventEmitter<A> {
	/// Creates an emitter without registrations.
	pub fn new() -> Self {
		Self {
			channels: Rc::new(Channels(RefCell::new(IndexMap::new()))),
		}
	}

	/// Registers `callback` on the channel `name`.
	pub fn on<F, R>(&self, name: &str, callback: F) -> Subscription
	where
		F: Fn(&A) -> R + 'static,
		R: ListenerOutcome,
	{
		self.register(name, None, callback)
	}

	/// Registers `callback` on the channel `name`, tagged with `context`.
	pub fn on_with_context<F, R>(&self, name: &str, context: ContextId, callback: F) -> Subscription
	where
		F: Fn(&A) -> R + 'static,
		R: ListenerOutcome,
	{
		self.register(name, Some(context), callback)
	}

	fn register<F, R>(&self, name: &str, context: Option<ContextId>, callback: F) -> Subscription
	where
		F: Fn(&A) -> R + 'static,
		R: ListenerOutcome,
	{
		let id = ListenerId::next();
		let callback: Callback<A> = Rc::new(move |payload: &A| callback(payload).into_outcome());
		self.channels
			.0
			.borrow_mut()
			.entry(name.to_string())
			.or_default()
			.push(Registration {
				id,
				context,
				callback,
			});

		let store: Rc<dyn ListenerStore> = self.channels.clone();
		Subscription {
			store: Some(Rc::downgrade(&store)),
			name: name.to_string(),
			id,
		}
	}

	/// Removes registrations.
	///
	/// All arguments are optional filters:
	/// - `name` with no other filter removes every callback of that channel;
	/// - `name` with `listener` and/or `context` removes the matching ones;
	/// - no `name` applies the filters across every channel, so calling
	///   `off(None, None, None)` clears the emitter.
	pub fn off(&self, name: Option<&str>, listener: Option<ListenerId>, context: Option<ContextId>) {
		let matches = |r: &Registration<A>| {
			listener.is_none_or(|id| r.id == id) && context.is_none_or(|ctx| r.context == Some(ctx))
		};

		let mut channels = self.channels.0.borrow_mut();
		match name {
			Some(name) if listener.is_none() && context.is_none() => {
				channels.shift_remove(name);
			}
			Some(name) => {
				if let Some(registrations) = channels.get_mut(name) {
					registrations.retain(|r| !matches(r));
				}
			}
			None => {
				for registrations in channels.values_mut() {
					registrations.retain(|r| !matches(r));
				}
			}
		}
		channels.retain(|_, registrations| !registrations.is_empty());
	}

	/// Invokes every callback registered on each of `names`, in order.
	///
	/// Callbacks are resolved against a snapshot of the registrations taken
	/// per channel, so callbacks may register or remove listeners freely. A
	/// listener removed by an earlier callback of the same dispatch is skipped.
	pub fn trigger<'n, I>(&self, names: I, payload: &A)
	where
		I: IntoIterator<Item = &'n str>,
	{
		for name in names {
			let snapshot: Vec<(ListenerId, Callback<A>)> = match self.channels.0.borrow().get(name) {
				Some(registrations) => registrations
					.iter()
					.map(|r| (r.id, Rc::clone(&r.callback)))
					.collect(),
				None => continue,
			};

			tracing::trace!(channel = name, listeners = snapshot.len(), "dispatching event");

			for (id, callback) in snapshot {
				if !self.is_registered(name, id) {
					continue;
				}
				match panic::catch_unwind(AssertUnwindSafe(|| callback(payload))) {
					Ok(Ok(())) => {}
					Ok(Err(error)) => {
						tracing::error!(channel = name, listener = ?id, %error, "event listener failed");
					}
					Err(panic) => {
						tracing::error!(
							channel = name,
							listener = ?id,
							panic = panic_message(panic.as_ref()),
							"event listener panicked"
						);
					}
				}
			}
		}
	}

	/// Returns true when `id` is still registered on `name`.
	pub fn is_registered(&self, name: &str, id: ListenerId) -> bool {
		self.channels
			.0
			.borrow()
			.get(name)
			.is_some_and(|registrations| registrations.iter().any(|r| r.id == id))
	}

	/// Number of callbacks registered on `name`.
	pub fn listener_count(&self, name: &str) -> usize {
		self.channels.0.borrow().get(name).map_or(0, Vec::len)
	}

	/// Total number of registrations across all channels.
	pub fn total_listeners(&self) -> usize {
		self.channels.0.borrow().values().map(Vec::len).sum()
	}

	/// Removes every registration.
	pub fn clear(&self) {
		self.channels.0.borrow_mut().clear();
	}
}

impl<A: 'static> Default for EventEmitter<A> {
	fn default() -> Self {
		Self::new()
	}
}

impl<A: 'static> Clone for EventEmitter<A> {
	fn clone(&self) -> Self {
		Self {
			channels: Rc::clone(&self.channels),
		}
	}
}

impl<A: 'static> fmt::Debug for EventEmitter<A> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let channels = self.channels.0.borrow();
		f.debug_struct("EventEmitter")
			.field("channels", &channels.keys().collect::<Vec<_>>())
			.field("listeners", &channels.values().map(Vec::len).sum::<usize>())
			.finish()
	}
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
	if let Some(message) = panic.downcast_ref::<&str>() {
		message
	} else if let Some(message) = panic.downcast_ref::<String>() {
		message.as_str()
	} else {
		"<non-string panic payload>"
	}
}

/// Handle to one callback registration.
///
/// Dropping a `Subscription` keeps the callback registered; call
/// [`Subscription::unsubscribe`] or wrap it in a [`SubscriptionGuard`] to
/// remove it. A subscription never keeps its emitter alive.
pub struct Subscription {
	store: Option<Weak<dyn ListenerStore>>,
	name: String,
	id: ListenerId,
}

impl Subscription {
	/// A subscription that is not attached to any emitter.
	///
	/// Returned when an observe call could not bind to its target.
	pub fn detached() -> Self {
		Self {
			store: None,
			name: String::new(),
			id: ListenerId::next(),
		}
	}

	/// Identifier of the registration, usable with [`EventEmitter::off`].
	pub fn id(&self) -> ListenerId {
		self.id
	}

	/// Channel the callback is registered on.
	pub fn channel(&self) -> &str {
		&self.name
	}

	/// Returns false for detached subscriptions and for subscriptions whose
	/// emitter has been dropped.
	pub fn is_attached(&self) -> bool {
		self.store.as_ref().is_some_and(|store| store.strong_count() > 0)
	}

	/// Removes the callback. Returns true if it was still registered.
	pub fn unsubscribe(&self) -> bool {
		match self.store.as_ref().and_then(Weak::upgrade) {
			Some(store) => store.remove_listener(&self.name, self.id),
			None => false,
		}
	}

	/// Converts the subscription into a guard that unsubscribes on drop.
	pub fn guard(self) -> SubscriptionGuard {
		SubscriptionGuard(self)
	}
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription")
			.field("channel", &self.name)
			.field("id", &self.id)
			.field("attached", &self.is_attached())
			.finish()
	}
}

/// Removes its subscription when dropped.
#[derive(Debug)]
pub struct SubscriptionGuard(Subscription);

impl SubscriptionGuard {
	/// The guarded subscription
	pub fn subscription(&self) -> &Subscription {
		&self.0
	}
}

impl Drop for SubscriptionGuard {
	fn drop(&mut self) {
		self.0.unsubscribe();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use std::cell::Cell;
	use tracing_test::traced_test;

	fn recorder() -> (Rc<RefCell<Vec<String>>>, EventEmitter<String>) {
		(Rc::new(RefCell::new(Vec::new())), EventEmitter::new())
	}

	#[rstest]
	fn test_trigger_runs_in_registration_order() {
		// Arrange
		let (log, emitter) = recorder();
		for tag in ["first", "second", "third"] {
			let log = log.clone();
			emitter.on("ping", move |payload: &String| {
				log.borrow_mut().push(format!("{tag}:{payload}"));
			});
		}

		// Act
		emitter.trigger(["ping"], &"x".to_string());

		// Assert
		assert_eq!(*log.borrow(), vec!["first:x", "second:x", "third:x"]);
	}

	#[rstest]
	fn test_trigger_multiple_names() {
		// Arrange
		let (log, emitter) = recorder();
		for channel in ["a", "b"] {
			let log = log.clone();
			emitter.on(channel, move |_: &String| log.borrow_mut().push(channel.to_string()));
		}

		// Act
		emitter.trigger(["b", "missing", "a"], &String::new());

		// Assert
		assert_eq!(*log.borrow(), vec!["b", "a"]);
	}

	#[test]
	#[traced_test]
	fn test_failing_listener_does_not_stop_dispatch() {
		// Arrange
		let emitter = EventEmitter::<()>::new();
		let second_ran = Rc::new(Cell::new(false));
		emitter.on("x", |_: &()| Err::<(), _>("first listener broke"));
		let flag = second_ran.clone();
		emitter.on("x", move |_: &()| flag.set(true));

		// Act
		emitter.trigger(["x"], &());

		// Assert
		assert!(second_ran.get());
		assert!(logs_contain("first listener broke"));
	}

	#[test]
	#[traced_test]
	fn test_panicking_listener_is_isolated() {
		// Arrange
		let emitter = EventEmitter::<()>::new();
		let calls = Rc::new(Cell::new(0));
		fn explode(_: &()) {
			panic!("listener exploded");
		}
		emitter.on("x", explode);
		let counter = calls.clone();
		emitter.on("x", move |_: &()| counter.set(counter.get() + 1));

		// Act
		emitter.trigger(["x"], &());
		emitter.trigger(["x"], &());

		// Assert
		assert_eq!(calls.get(), 2);
		assert!(logs_contain("listener exploded"));
	}

	#[rstest]
	fn test_off_by_name_removes_all() {
		// Arrange
		let emitter = EventEmitter::<()>::new();
		emitter.on("a", |_: &()| {});
		emitter.on("a", |_: &()| {});
		emitter.on("b", |_: &()| {});

		// Act
		emitter.off(Some("a"), None, None);

		// Assert
		assert_eq!(emitter.listener_count("a"), 0);
		assert_eq!(emitter.listener_count("b"), 1);
	}

	#[rstest]
	fn test_off_by_listener_id() {
		// Arrange
		let emitter = EventEmitter::<()>::new();
		let keep = emitter.on("a", |_: &()| {});
		let drop_me = emitter.on("a", |_: &()| {});

		// Act
		emitter.off(Some("a"), Some(drop_me.id()), None);

		// Assert
		assert!(emitter.is_registered("a", keep.id()));
		assert!(!emitter.is_registered("a", drop_me.id()));
	}

	#[rstest]
	fn test_off_by_context_across_channels() {
		// Arrange
		let emitter = EventEmitter::<()>::new();
		let owner = ContextId::new();
		emitter.on_with_context("a", owner, |_: &()| {});
		emitter.on_with_context("b", owner, |_: &()| {});
		emitter.on("b", |_: &()| {});

		// Act
		emitter.off(None, None, Some(owner));

		// Assert
		assert_eq!(emitter.listener_count("a"), 0);
		assert_eq!(emitter.listener_count("b"), 1);
	}

	#[rstest]
	fn test_off_without_filters_clears_everything() {
		// Arrange
		let emitter = EventEmitter::<()>::new();
		emitter.on("a", |_: &()| {});
		emitter.on("b", |_: &()| {});

		// Act
		emitter.off(None, None, None);

		// Assert
		assert_eq!(emitter.total_listeners(), 0);
	}

	#[rstest]
	fn test_listener_removed_during_dispatch_is_skipped() {
		// Arrange
		let emitter = EventEmitter::<()>::new();
		let later_ran = Rc::new(Cell::new(false));
		let later: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

		let handle = later.clone();
		emitter.on("x", move |_: &()| {
			if let Some(subscription) = handle.borrow().as_ref() {
				subscription.unsubscribe();
			}
		});
		let flag = later_ran.clone();
		*later.borrow_mut() = Some(emitter.on("x", move |_: &()| flag.set(true)));

		// Act
		emitter.trigger(["x"], &());

		// Assert
		assert!(!later_ran.get());
	}

	#[rstest]
	fn test_guard_unsubscribes_on_drop() {
		// Arrange
		let emitter = EventEmitter::<()>::new();
		let guard = emitter.on("x", |_: &()| {}).guard();
		assert_eq!(emitter.listener_count("x"), 1);

		// Act
		drop(guard);

		// Assert
		assert_eq!(emitter.listener_count("x"), 0);
	}

	#[rstest]
	fn test_detached_subscription() {
		let subscription = Subscription::detached();
		assert!(!subscription.is_attached());
		assert!(!subscription.unsubscribe());
	}
}
