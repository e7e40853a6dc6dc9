//! Value, text and markup bindings
//!
//! Each binding reads its key (possibly dotted) through the scope chain when
//! linked, then follows `change.<key>` on the scope that owns the key.

use scopewire_core::{ChangeEvent, Scope, Value};

use super::{Subscriptions, owner_scope};
use crate::directive::{Directive, DirectiveContext};
use crate::dom::{DomEvent, Node};
use crate::error::DirectiveError;

fn binding_key<'a>(context: &DirectiveContext<'a>) -> Result<&'a str, DirectiveError> {
	let key = context.parameter.trim();
	if key.is_empty() {
		return Err(DirectiveError::InvalidParameter {
			parameter: context.parameter.to_string(),
			message: "expected a scope key".to_string(),
		});
	}
	Ok(key)
}

fn display(value: Option<&Value>) -> String {
	value.map(Value::to_display_string).unwrap_or_default()
}

/// Subscribes `render` to changes of `key` and renders the current value.
fn follow<F, R>(
	context: &DirectiveContext<'_>,
	subscriptions: &Subscriptions,
	key: &str,
	render: F,
) -> Result<(), DirectiveError>
where
	F: Fn(&Node, String) -> Result<(), R> + 'static,
	R: std::fmt::Display,
	DirectiveError: From<R>,
{
	render(context.element, display(context.scope.lookup(key).as_ref()))?;

	let node = context.element.downgrade();
	let subscription = owner_scope(context.scope, key).observe_key(key, move |event: &ChangeEvent| {
		match node.upgrade() {
			Some(node) => render(&node, display(event.new_value())),
			None => Ok(()),
		}
	});
	subscriptions.push(subscription);
	Ok(())
}

/// `scope-text="key"`: keeps the text content equal to the value.
#[derive(Debug, Default)]
pub struct ScopeText {
	subscriptions: Subscriptions,
}

impl Directive for ScopeText {
	fn link(&self, context: &DirectiveContext<'_>) -> Result<(), DirectiveError> {
		let key = binding_key(context)?;
		follow(context, &self.subscriptions, key, |node, text| {
			node.set_text_content(&text);
			Ok::<_, DirectiveError>(())
		})
	}

	fn dispose(&self) {
		self.subscriptions.clear();
	}
}

/// `scope-html="key"`: renders the value as markup.
///
/// A value that cannot be parsed leaves the previous content in place.
#[derive(Debug, Default)]
pub struct ScopeHtml {
	subscriptions: Subscriptions,
}

impl Directive for ScopeHtml {
	fn link(&self, context: &DirectiveContext<'_>) -> Result<(), DirectiveError> {
		let key = binding_key(context)?;
		follow(context, &self.subscriptions, key, |node, html| node.set_inner_html(&html))
	}

	fn dispose(&self) {
		self.subscriptions.clear();
	}
}

/// `scope-value="key"`: two-way binding of a form value.
///
/// The element value follows the scope; a `change` event on the element
/// writes the current value back through [`Scope::assign`].
#[derive(Debug, Default)]
pub struct ScopeValue {
	subscriptions: Subscriptions,
}

impl Directive for ScopeValue {
	fn link(&self, context: &DirectiveContext<'_>) -> Result<(), DirectiveError> {
		let key = binding_key(context)?;
		follow(context, &self.subscriptions, key, |node, value| node.set_value(&value))?;

		let scope: Scope = context.scope.clone();
		let path = key.to_string();
		let subscription = context.element.on("change", move |event: &DomEvent| {
			scope.assign(&path, Value::from(event.target.value()))
		});
		self.subscriptions.push(subscription);
		Ok(())
	}

	fn dispose(&self) {
		self.subscriptions.clear();
	}
}
