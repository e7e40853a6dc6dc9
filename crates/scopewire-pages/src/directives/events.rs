//! Event handler directives

use scopewire_core::{CallbackError, Expression, ExpressionError, Value};

use super::Subscriptions;
use crate::directive::{Directive, DirectiveContext};
use crate::dom::DomEvent;
use crate::error::DirectiveError;

/// `on-click="expression"`: evaluates the expression against the nearest
/// scope of the element when it is clicked.
///
/// Clicks are ignored while the element carries a `disabled` attribute.
#[derive(Debug, Default)]
pub struct OnClick {
	subscriptions: Subscriptions,
}

impl Directive for OnClick {
	fn link(&self, context: &DirectiveContext<'_>) -> Result<(), DirectiveError> {
		let expression = Expression::compile(context.parameter)?;
		let subscription = context.element.on("click", move |event: &DomEvent| -> Result<(), ExpressionError> {
			if event.target.has_attribute("disabled") {
				return Ok(());
			}
			let Some(scope) = event.target.nearest_scope() else {
				tracing::debug!(expression = expression.source(), "click target has no scope");
				return Ok(());
			};
			expression.eval(&scope).map(|_| ())
		});
		self.subscriptions.push(subscription);
		Ok(())
	}

	fn dispose(&self) {
		self.subscriptions.clear();
	}
}

/// `on-event="event:handler"`: calls the scope function `handler` with the
/// event detail whenever `event` is dispatched to the element.
#[derive(Debug, Default)]
pub struct OnEvent {
	subscriptions: Subscriptions,
}

impl Directive for OnEvent {
	fn link(&self, context: &DirectiveContext<'_>) -> Result<(), DirectiveError> {
		let parsed = context
			.parameter
			.split_once(':')
			.map(|(event, handler)| (event.trim(), handler.trim()))
			.filter(|(event, handler)| !event.is_empty() && !handler.is_empty());
		let Some((event_name, handler)) = parsed else {
			tracing::warn!(
				parameter = context.parameter,
				"on-event expects a parameter of the form `<event>:<handler>`"
			);
			return Ok(());
		};

		let scope = context.scope.clone();
		let handler = handler.to_string();
		let subscription = context.element.on(event_name, move |event: &DomEvent| -> Result<(), CallbackError> {
			match scope.lookup(&handler) {
				Some(Value::Function(function)) => function.call(&[event.detail.clone()]).map(|_| ()),
				Some(other) => {
					tracing::debug!(handler = %handler, found = other.type_name(), "event handler is not a function");
					Ok(())
				}
				None => {
					tracing::debug!(handler = %handler, "event handler is not defined");
					Ok(())
				}
			}
		});
		self.subscriptions.push(subscription);
		Ok(())
	}

	fn dispose(&self) {
		self.subscriptions.clear();
	}
}
