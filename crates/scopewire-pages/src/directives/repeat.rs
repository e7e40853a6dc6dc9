//! List rendering
//!
//! `scope-repeat` replaces its element with two comment markers and keeps
//! the range between them in sync with a collection: one clone of the
//! element per item, in collection order. The parameter takes one of three
//! forms:
//!
//! - `(key, value) in source`
//! - `value in source`
//! - `source`, binding each item to the default variable (`item`)
//!
//! Every clone gets a child scope of the repeat's scope holding the item, its
//! position (`$index`) and, if declared, its key.
//!
//! Mutations of the source container reach the directive as `change.child`
//! events on the container's parent, and are applied to the affected clones
//! only: a splice removes and inserts exactly the spliced range, an update
//! re-renders one clone, and so on. Untouched clones are never recreated.
//! Clones take their items from the container itself, never from the event.
//! Whenever an event cannot be mapped onto the rendered range, or the clones
//! no longer show the source's entries, the range is rebuilt from a snapshot.
//! Replacing the source value itself always rebuilds.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::LazyLock;

use regex::Regex;
use scopewire_core::{Change, ChangeEvent, Key, Observer, Scope, Subscription, Value};

use super::owner_scope;
use crate::compiler::Compiler;
use crate::directive::{Directive, DirectiveContext, attribute_to_directive_name};
use crate::dom::{Node, WeakNode};
use crate::error::{DirectiveError, DomError};

// `(key, value) in source`
static KEY_VALUE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"\(\s*(\w+)\s*,\s*(\w+)\s*\)\s*in\s+(\w+(?:\.\w+)*)")
		.expect("KEY_VALUE_PATTERN: invalid regex pattern")
});

// `value in source`
static VALUE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"\s*(\w+)\s+in\s+(\w+(?:\.\w+)*)").expect("VALUE_PATTERN: invalid regex pattern")
});

/// Parsed `scope-repeat` parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatParams {
	/// Scope path of the collection, possibly dotted
	pub source: String,
	/// Variable receiving the item key, if declared
	pub key_variable: Option<String>,
	/// Variable receiving the item
	pub value_variable: String,
}

impl RepeatParams {
	/// Parses a parameter; anything that is not a `... in ...` form is taken
	/// as the source path with `default_variable` as item variable.
	pub fn parse(parameter: &str, default_variable: &str) -> Self {
		if let Some(captures) = KEY_VALUE_PATTERN.captures(parameter) {
			return Self {
				source: captures[3].to_string(),
				key_variable: Some(captures[1].to_string()),
				value_variable: captures[2].to_string(),
			};
		}
		if let Some(captures) = VALUE_PATTERN.captures(parameter) {
			return Self {
				source: captures[2].to_string(),
				key_variable: None,
				value_variable: captures[1].to_string(),
			};
		}
		Self {
			source: parameter.trim().to_string(),
			key_variable: None,
			value_variable: default_variable.to_string(),
		}
	}
}

/// The `scope-repeat` directive
#[derive(Default)]
pub struct Repeat {
	session: RefCell<Option<Rc<Session>>>,
}

impl Directive for Repeat {
	fn build_dom(&self, context: &DirectiveContext<'_>) -> Result<(), DirectiveError> {
		if self.session.borrow().is_some() {
			return Ok(());
		}
		let settings = context.compiler.settings();
		let params = RepeatParams::parse(context.parameter, &settings.repeat_default_variable);
		if params.source.is_empty() {
			return Err(DirectiveError::InvalidParameter {
				parameter: context.parameter.to_string(),
				message: "expected a collection to repeat".to_string(),
			});
		}

		let element = context.element;
		let parent = element
			.parent()
			.ok_or(DomError::HierarchyRequest("a repeated element needs a parent"))?;
		let document = element.document();
		let before = document.create_comment(&format!("scope-repeat={}", context.parameter));
		let after = document.create_comment(&format!("/scope-repeat={}", context.parameter));
		parent.insert_before(&before, Some(element))?;
		parent.insert_before(&after, Some(element))?;

		// The element becomes the template; the start marker carries the
		// binding from now on so that tearing down the document reaches it.
		element.detach();
		for (attribute, _) in element.attributes() {
			if attribute_to_directive_name(&attribute) == context.name {
				element.remove_attribute(&attribute)?;
			}
		}
		before.insert_binding(context.name, context.binding.clone())?;

		let session = Rc::new_cyclic(|this| Session {
			this: this.clone(),
			params,
			scope: context.scope.clone(),
			compiler: context.compiler.clone(),
			before: before.downgrade(),
			after: after.downgrade(),
			template: element.downgrade(),
			items: RefCell::new(Vec::new()),
			source: RefCell::new(None),
			source_subscription: RefCell::new(None),
			child_subscription: RefCell::new(None),
			state: Cell::new(State::Mounted),
			dirty: Cell::new(false),
		});
		session.subscribe_source();
		session.reconcile(|session| {
			session.retarget();
			session.rebuild();
		});
		*self.session.borrow_mut() = Some(session);
		Ok(())
	}

	fn dispose(&self) {
		let session = self.session.take();
		if let Some(session) = session {
			session.dispose();
		}
	}
}

impl fmt::Debug for Repeat {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &*self.session.borrow() {
			Some(session) => f
				.debug_struct("Repeat")
				.field("params", &session.params)
				.field("state", &session.state.get())
				.field("rendered", &session.items.borrow().len())
				.finish(),
			None => f.debug_struct("Repeat").finish_non_exhaustive(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
	Mounted,
	Reconciling,
	Disposed,
}

/// A rendered clone
struct Rendered {
	key: Key,
	node: WeakNode,
	scope: Scope,
}

impl Rendered {
	fn release(self) {
		if let Some(node) = self.node.upgrade() {
			node.release();
		}
		self.scope.dispose();
	}
}

struct Session {
	this: Weak<Session>,
	params: RepeatParams,
	scope: Scope,
	compiler: Compiler,
	before: WeakNode,
	after: WeakNode,
	template: WeakNode,
	items: RefCell<Vec<Rendered>>,
	/// Current source container, if the source is observable
	source: RefCell<Option<Observer>>,
	source_subscription: RefCell<Option<Subscription>>,
	child_subscription: RefCell<Option<Subscription>>,
	state: Cell<State>,
	/// Set when the source changed while reconciling
	dirty: Cell<bool>,
}

impl Session {
	fn subscribe_source(&self) {
		let this = self.this.clone();
		let subscription = owner_scope(&self.scope, &self.params.source).observe_key(
			&self.params.source,
			move |_: &ChangeEvent| {
				if let Some(session) = this.upgrade() {
					session.source_replaced();
				}
			},
		);
		*self.source_subscription.borrow_mut() = Some(subscription);
	}

	fn current_source(&self) -> Option<Value> {
		self.scope.lookup(&self.params.source)
	}

	/// Follows the current source container, linking it to the scope that
	/// owns it when it has no parent to report its changes to.
	fn retarget(&self) {
		if let Some(previous) = self.child_subscription.take() {
			previous.unsubscribe();
		}
		let container = match self.current_source() {
			Some(Value::Container(container)) => Some(container),
			_ => None,
		};
		if let Some(container) = &container {
			let parent = container.parent().unwrap_or_else(|| {
				let owner = owner_scope(&self.scope, &self.params.source);
				tracing::debug!(source = %self.params.source, "linking repeat source to its scope");
				container.set_parent(Some(owner.observer()));
				owner.observer().clone()
			});
			let this = self.this.clone();
			let subscription = parent.observe_children(move |event: &ChangeEvent| {
				if let Some(session) = this.upgrade() {
					session.child_changed(event);
				}
			});
			*self.child_subscription.borrow_mut() = Some(subscription);
		}
		*self.source.borrow_mut() = container;
	}

	fn source_replaced(&self) {
		tracing::debug!(source = %self.params.source, "repeat source replaced");
		self.reconcile(|session| {
			session.retarget();
			session.rebuild();
		});
	}

	fn child_changed(&self, event: &ChangeEvent) {
		let from_source = self
			.source
			.borrow()
			.as_ref()
			.is_some_and(|source| source.ptr_eq(&event.container));
		if from_source {
			self.reconcile(|session| session.apply(event));
		}
	}

	/// Runs `update`, unless a reconciliation is already in progress: then
	/// the range is marked dirty and rebuilt once the running one finishes.
	fn reconcile(&self, update: impl FnOnce(&Self)) {
		match self.state.get() {
			State::Disposed => return,
			State::Reconciling => {
				self.dirty.set(true);
				return;
			}
			State::Mounted => {}
		}
		self.state.set(State::Reconciling);
		update(self);
		while self.dirty.replace(false) && self.state.get() == State::Reconciling {
			tracing::debug!(source = %self.params.source, "source changed while rendering, rebuilding");
			self.retarget();
			self.rebuild();
		}
		if self.state.get() == State::Reconciling {
			self.state.set(State::Mounted);
		}
	}

	fn apply(&self, event: &ChangeEvent) {
		let Some(source) = self.source.borrow().clone() else {
			return;
		};
		let applied = match (&event.change, &event.name) {
			(
				Change::Splice {
					start,
					removed,
					inserted,
				},
				_,
			) => self.splice(&source, *start, removed.len(), inserted.len()),
			(Change::Add { .. }, Some(key)) => self.insert(&source, key),
			(Change::Update { .. }, Some(key)) => self.replace(&source, key),
			(Change::Delete { .. }, Some(key)) => self.remove(key),
			_ => false,
		};
		if !applied || !self.matches_source(&source) {
			tracing::debug!(
				source = %self.params.source,
				applied,
				rendered = self.items.borrow().len(),
				"rendered range differs from the source, rebuilding"
			);
			self.rebuild();
		}
	}

	/// Returns true if the clones show the source's entries, in order.
	///
	/// Listeners on the source run before the repeat hears of a change, so
	/// an event payload may already be stale when it arrives.
	fn matches_source(&self, source: &Observer) -> bool {
		let entries: Vec<(Key, Value)> = source
			.entries()
			.into_iter()
			.filter(|(key, _)| !self.is_reserved(key))
			.collect();
		let items = self.items.borrow();
		let variable = self.params.value_variable.as_str();
		items.len() == entries.len()
			&& items
				.iter()
				.zip(&entries)
				.all(|(item, (key, value))| item.key == *key && item.scope.get_own(variable).as_ref() == Some(value))
	}

	/// Works on the rendered items without holding a borrow, so rendering
	/// may trigger further events.
	fn with_items(&self, update: impl FnOnce(&mut Vec<Rendered>) -> bool) -> bool {
		let mut items = self.items.take();
		let applied = update(&mut items);
		*self.items.borrow_mut() = items;
		applied
	}

	fn is_reserved(&self, key: &Key) -> bool {
		let sigil = self.compiler.settings().reserved_sigil;
		key.as_name().is_some_and(|name| name.starts_with(sigil))
	}

	/// Entries of the current source, in order, without reserved keys.
	fn entries(&self) -> Vec<(Key, Value)> {
		let entries = match self.current_source() {
			Some(Value::Container(container)) => container.entries(),
			Some(Value::List(items)) => items
				.into_iter()
				.enumerate()
				.map(|(index, item)| (Key::Index(index), item))
				.collect(),
			Some(Value::Map(map)) => map.into_iter().map(|(name, item)| (Key::Name(name), item)).collect(),
			Some(Value::Null) | None => Vec::new(),
			Some(other) => {
				tracing::debug!(
					source = %self.params.source,
					found = other.type_name(),
					"repeat source is not a collection"
				);
				Vec::new()
			}
		};
		entries.into_iter().filter(|(key, _)| !self.is_reserved(key)).collect()
	}

	/// Node before which the item at `index` goes.
	fn reference_at(&self, items: &[Rendered], index: usize) -> Option<Node> {
		items
			.get(index)
			.and_then(|item| item.node.upgrade())
			.or_else(|| self.after.upgrade())
	}

	/// Clones the template for one entry and inserts it before `reference`.
	fn render(&self, key: &Key, value: Value, index: usize, reference: &Node) -> Option<Rendered> {
		let template = self.template.upgrade()?;
		let parent = reference.parent()?;
		let node = template
			.clone_deep()
			.inspect_err(|error| tracing::debug!(%error, "cannot clone repeat template"))
			.ok()?;

		let settings = self.compiler.settings();
		let scope = Scope::child_of(&self.scope);
		scope.set(settings.index_variable.as_str(), index);
		if let Some(name) = &self.params.key_variable {
			scope.set(name.as_str(), key_value(key));
		}
		scope.set(self.params.value_variable.as_str(), value);

		if let Err(error) = node
			.set_scope(Some(scope.clone()))
			.and_then(|_| parent.insert_before(&node, Some(reference)))
		{
			tracing::debug!(%error, "cannot insert repeated item");
			node.release();
			return None;
		}
		if settings.compile_clones {
			self.compiler.compile(&node, None);
		}
		Some(Rendered {
			key: key.clone(),
			node: node.downgrade(),
			scope,
		})
	}

	/// Updates position variables of the items from `from` on.
	fn renumber(&self, items: &mut [Rendered], from: usize) {
		let index_variable = self.compiler.settings().index_variable.as_str();
		for (index, item) in items.iter_mut().enumerate().skip(from) {
			if let Key::Index(_) = item.key {
				item.key = Key::Index(index);
				if let Some(name) = &self.params.key_variable {
					item.scope.set(name.as_str(), index);
				}
			}
			item.scope.set(index_variable, index);
		}
	}

	fn rebuild(&self) {
		let entries = self.entries();
		self.with_items(|items| {
			for item in items.drain(..) {
				item.release();
			}
			self.clear_range();
			let Some(after) = self.after.upgrade() else {
				return false;
			};
			for (index, (key, value)) in entries.into_iter().enumerate() {
				items.extend(self.render(&key, value, index, &after));
			}
			true
		});
	}

	/// Releases anything left between the markers.
	fn clear_range(&self) {
		let (Some(before), Some(after)) = (self.before.upgrade(), self.after.upgrade()) else {
			return;
		};
		while let Some(node) = before.next_sibling()
			&& node != after
		{
			node.release();
		}
	}

	fn splice(&self, source: &Observer, start: usize, removed: usize, inserted: usize) -> bool {
		self.with_items(|items| {
			if start + removed > items.len() {
				return false;
			}
			for item in items.drain(start..start + removed) {
				item.release();
			}
			let Some(reference) = self.reference_at(items, start) else {
				return false;
			};
			let mut rendered = Vec::with_capacity(inserted);
			for index in start..start + inserted {
				let key = Key::Index(index);
				let Some(value) = source.get_own(key.clone()) else {
					return false;
				};
				match self.render(&key, value, index, &reference) {
					Some(item) => rendered.push(item),
					None => return false,
				}
			}
			items.splice(start..start, rendered);
			self.renumber(items, start + inserted);
			true
		})
	}

	fn insert(&self, source: &Observer, key: &Key) -> bool {
		if self.is_reserved(key) {
			return true;
		}
		let Some(value) = source.get_own(key.clone()) else {
			return false;
		};
		if source.is_sequence() {
			let &Key::Index(index) = key else {
				return false;
			};
			return self.with_items(|items| {
				if index > items.len() {
					return false;
				}
				let Some(reference) = self.reference_at(items, index) else {
					return false;
				};
				let Some(item) = self.render(key, value, index, &reference) else {
					return false;
				};
				items.insert(index, item);
				self.renumber(items, index + 1);
				true
			});
		}
		if self.items.borrow().iter().any(|item| item.key == *key) {
			return self.replace(source, key);
		}
		self.with_items(|items| {
			let index = items.len();
			let Some(after) = self.after.upgrade() else {
				return false;
			};
			match self.render(key, value, index, &after) {
				Some(item) => {
					items.push(item);
					true
				}
				None => false,
			}
		})
	}

	fn replace(&self, source: &Observer, key: &Key) -> bool {
		if self.is_reserved(key) {
			return true;
		}
		let Some(value) = source.get_own(key.clone()) else {
			return false;
		};
		self.with_items(|items| {
			let Some(index) = items.iter().position(|item| item.key == *key) else {
				return false;
			};
			let Some(reference) = items[index].node.upgrade() else {
				return false;
			};
			let Some(item) = self.render(key, value, index, &reference) else {
				return false;
			};
			std::mem::replace(&mut items[index], item).release();
			true
		})
	}

	fn remove(&self, key: &Key) -> bool {
		if self.is_reserved(key) {
			return true;
		}
		self.with_items(|items| {
			if let Some(index) = items.iter().position(|item| item.key == *key) {
				items.remove(index).release();
				self.renumber(items, index);
			}
			true
		})
	}

	fn dispose(&self) {
		self.state.set(State::Disposed);
		let subscriptions = [self.source_subscription.take(), self.child_subscription.take()];
		for subscription in subscriptions.into_iter().flatten() {
			subscription.unsubscribe();
		}
		for item in self.items.take() {
			item.release();
		}
		self.clear_range();
		for node in [&self.before, &self.after, &self.template] {
			if let Some(node) = node.upgrade() {
				node.release();
			}
		}
		self.source.take();
	}
}

fn key_value(key: &Key) -> Value {
	match key {
		Key::Name(name) => Value::from(name.as_str()),
		Key::Index(index) => Value::from(*index),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	#[rstest]
	#[case("(pair, rate) in rates", "rates", Some("pair"), "rate")]
	#[case("( k ,v )  in  data.items", "data.items", Some("k"), "v")]
	#[case("rate in rates", "rates", None, "rate")]
	#[case("  row in table.rows", "table.rows", None, "row")]
	#[case("rates", "rates", None, "item")]
	#[case(" rates ", "rates", None, "item")]
	fn test_parse_parameter(
		#[case] parameter: &str,
		#[case] source: &str,
		#[case] key_variable: Option<&str>,
		#[case] value_variable: &str,
	) {
		// Act
		let params = RepeatParams::parse(parameter, "item");

		// Assert
		assert_eq!(params.source, source);
		assert_eq!(params.key_variable.as_deref(), key_variable);
		assert_eq!(params.value_variable, value_variable);
	}

	#[rstest]
	fn test_parse_uses_configured_default_variable() {
		let params = RepeatParams::parse("rows", "row");
		assert_eq!(params.value_variable, "row");
	}

	#[rstest]
	fn test_key_value() {
		assert_eq!(key_value(&Key::from("EUR")), Value::from("EUR"));
		assert_eq!(key_value(&Key::Index(3)), Value::from(3));
	}
}
