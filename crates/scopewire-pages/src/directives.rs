//! Built-in directives
//!
//! | Attribute | Phase | Behavior |
//! |-----------|-------|----------|
//! | `scope-repeat` | build_dom | Renders one clone per collection item |
//! | `scope-value` | link | Two-way binds a form value |
//! | `scope-text` | link | Renders a value as text |
//! | `scope-html` | link | Renders a value as markup |
//! | `on-click` | link | Evaluates an expression on click |
//! | `on-event` | link | Calls a scope function on an event |

mod binding;
mod events;
mod repeat;

pub use binding::{ScopeHtml, ScopeText, ScopeValue};
pub use events::{OnClick, OnEvent};
pub use repeat::{Repeat, RepeatParams};

use std::cell::RefCell;

use scopewire_core::{Scope, Subscription};

/// Subscriptions owned by a directive, removed when it is disposed
#[derive(Debug, Default)]
pub(crate) struct Subscriptions(RefCell<Vec<Subscription>>);

impl Subscriptions {
	pub(crate) fn push(&self, subscription: Subscription) {
		self.0.borrow_mut().push(subscription);
	}

	pub(crate) fn clear(&self) {
		for subscription in self.0.take() {
			subscription.unsubscribe();
		}
	}
}

/// Scope in the chain that owns the first segment of `path`, or `scope`
/// itself when no scope defines it yet.
pub(crate) fn owner_scope(scope: &Scope, path: &str) -> Scope {
	let head = path.split_once('.').map_or(path, |(head, _)| head);
	scope.resolve_owner(head).unwrap_or_else(|| scope.clone())
}
