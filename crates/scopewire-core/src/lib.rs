//! Scopewire Core - Observation Layer
//!
//! The data side of Scopewire: observable containers whose mutations produce
//! typed change events, and the scopes that directives bind to.
//!
//! ## Features
//!
//! - **Explicit accessors**: every read and write goes through
//!   [`Observer::get`] / [`Observer::set`] and friends, so no mutation can
//!   bypass observation
//! - **Typed change events**: `Add`, `Update`, `Delete` and `Splice`, one per
//!   logical mutation, with no-op updates suppressed
//! - **Bubbling**: a child container re-fires its events on its parent's
//!   `change.child` channel
//! - **Fault isolation**: a failing listener is logged and never interrupts
//!   the others
//!
//! ## Architecture
//!
//! - [`events`]: named-callback registry ([`EventEmitter`])
//! - [`value`]: the dynamically typed [`Value`] stored in containers
//! - [`observer`]: observable mapping/sequence containers
//! - [`scope`]: binding scopes and the expression language
//! - [`error`]: error types
//!
//! ## Example
//!
//! ```
//! use scopewire_core::{ChangeEvent, Scope, Value};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let scope = Scope::new();
//! let seen = Rc::new(RefCell::new(Vec::new()));
//!
//! let log = seen.clone();
//! let _subscription = scope.observe_key("EURUSD", move |event: &ChangeEvent| {
//!     log.borrow_mut().push(event.new_value().cloned());
//! });
//!
//! scope.set("EURUSD", 1.0825);
//! scope.set("EURUSD", 1.0825);
//! scope.set("EURUSD", 1.0831);
//!
//! assert_eq!(
//!     *seen.borrow(),
//!     vec![Some(Value::from(1.0825)), Some(Value::from(1.0831))]
//! );
//! ```

pub mod error;
pub mod events;
pub mod observer;
pub mod scope;
pub mod value;

pub use error::{CallbackError, ContainerMode, ExpressionError, ObserverError, Result};
pub use events::{ContextId, EventEmitter, ListenerId, ListenerOutcome, Subscription, SubscriptionGuard};
pub use observer::{
	AddMethod, AddOptions, BulkOptions, Change, ChangeEvent, ChangeKind, Observer, RESERVED_SIGIL,
	SetOptions,
};
pub use scope::{Expression, Scope};
pub use value::{Key, ScopeFunction, Value};
