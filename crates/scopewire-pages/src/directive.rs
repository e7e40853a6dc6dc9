//! Directive protocol and registries
//!
//! A directive is behavior attached to an element through an attribute: the
//! attribute name in dash-case selects the directive registered under the
//! camelCase name, and the attribute value is handed over verbatim as the
//! directive parameter.
//!
//! Directives take part in up to two phases. `build_dom` runs first and may
//! restructure the document (a repeat replaces its element with rendered
//! clones); `link` runs afterwards on the final structure and wires the
//! element to its scope. The phases a directive takes part in are declared in
//! its [`DirectiveDefinition`], so the compiler can select elements without
//! instantiating anything.
//!
//! ## Example
//!
//! ```
//! use scopewire_pages::directive::{DirectiveDefinition, DirectiveRegistry};
//!
//! let mut registry = DirectiveRegistry::with_builtins();
//! registry.register(
//! 	"scopeTitle",
//! 	DirectiveDefinition::from_link(|context| {
//! 		let title = context.scope.lookup(context.parameter).unwrap_or_default();
//! 		context.element.set_attribute("title", &title.to_display_string())?;
//! 		Ok(())
//! 	}),
//! );
//!
//! assert!(registry.contains("scopeTitle"));
//! assert!(registry.contains("scopeRepeat"));
//! ```

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use scopewire_core::Scope;

use crate::compiler::Compiler;
use crate::directives::{OnClick, OnEvent, Repeat, ScopeHtml, ScopeText, ScopeValue};
use crate::dom::Node;
use crate::error::{ControllerError, DirectiveError};

/// One of the two compile phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
	BuildDom,
	Link,
}

impl fmt::Display for Phase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::BuildDom => write!(f, "build_dom"),
			Self::Link => write!(f, "link"),
		}
	}
}

/// Set of phases a directive takes part in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phases {
	build_dom: bool,
	link: bool,
}

impl Phases {
	pub const BUILD_DOM: Self = Self {
		build_dom: true,
		link: false,
	};
	pub const LINK: Self = Self {
		build_dom: false,
		link: true,
	};
	pub const ALL: Self = Self {
		build_dom: true,
		link: true,
	};

	pub fn includes(self, phase: Phase) -> bool {
		match phase {
			Phase::BuildDom => self.build_dom,
			Phase::Link => self.link,
		}
	}
}

/// Everything a directive phase gets to work with
pub struct DirectiveContext<'a> {
	/// Element carrying the directive attribute
	pub element: &'a Node,
	/// Scope the binding was created with
	pub scope: &'a Scope,
	/// Attribute value, verbatim
	pub parameter: &'a str,
	/// Registered (camelCase) name
	pub name: &'a str,
	/// Compiler running the phase; directives that render new content
	/// compile it through this handle
	pub compiler: &'a Compiler,
	/// The cached binding running this phase
	pub binding: &'a Rc<DirectiveBinding>,
}

/// Behavior attached to an element.
///
/// Both phases default to doing nothing. Failures are reported to the
/// compiler, which logs them and records them in its report; they never
/// abort the compile pass.
pub trait Directive {
	fn build_dom(&self, context: &DirectiveContext<'_>) -> Result<(), DirectiveError> {
		let _ = context;
		Ok(())
	}

	fn link(&self, context: &DirectiveContext<'_>) -> Result<(), DirectiveError> {
		let _ = context;
		Ok(())
	}

	/// Releases listeners and rendered content. Called once, when the
	/// element is torn down.
	fn dispose(&self) {}
}

type DirectiveFactory = Rc<dyn Fn() -> Box<dyn Directive>>;

type LinkFn = Rc<dyn Fn(&DirectiveContext<'_>) -> Result<(), DirectiveError>>;

/// Directive built from a link function
struct LinkDirective(LinkFn);

impl Directive for LinkDirective {
	fn link(&self, context: &DirectiveContext<'_>) -> Result<(), DirectiveError> {
		(self.0)(context)
	}
}

/// Declared phases plus a factory creating one directive per element
#[derive(Clone)]
pub struct DirectiveDefinition {
	phases: Phases,
	factory: DirectiveFactory,
}

impl DirectiveDefinition {
	pub fn new<F, D>(phases: Phases, factory: F) -> Self
	where
		F: Fn() -> D + 'static,
		D: Directive + 'static,
	{
		Self {
			phases,
			factory: Rc::new(move || -> Box<dyn Directive> { Box::new(factory()) }),
		}
	}

	/// Defines a link-only directive from a function.
	pub fn from_link<F>(link: F) -> Self
	where
		F: Fn(&DirectiveContext<'_>) -> Result<(), DirectiveError> + 'static,
	{
		let link: LinkFn = Rc::new(link);
		Self {
			phases: Phases::LINK,
			factory: Rc::new(move || -> Box<dyn Directive> { Box::new(LinkDirective(link.clone())) }),
		}
	}

	pub fn phases(&self) -> Phases {
		self.phases
	}

	pub(crate) fn instantiate(&self) -> Box<dyn Directive> {
		(self.factory)()
	}
}

impl fmt::Debug for DirectiveDefinition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DirectiveDefinition")
			.field("phases", &self.phases)
			.finish()
	}
}

/// Directive definitions by camelCase name
#[derive(Debug, Clone, Default)]
pub struct DirectiveRegistry {
	definitions: IndexMap<String, DirectiveDefinition>,
}

impl DirectiveRegistry {
	/// An empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// A registry holding the built-in directives: `scopeRepeat`,
	/// `scopeValue`, `scopeText`, `scopeHtml`, `onClick` and `onEvent`.
	pub fn with_builtins() -> Self {
		let mut registry = Self::new();
		registry.register("scopeRepeat", DirectiveDefinition::new(Phases::BUILD_DOM, Repeat::default));
		registry.register("scopeValue", DirectiveDefinition::new(Phases::LINK, ScopeValue::default));
		registry.register("scopeText", DirectiveDefinition::new(Phases::LINK, ScopeText::default));
		registry.register("scopeHtml", DirectiveDefinition::new(Phases::LINK, ScopeHtml::default));
		registry.register("onClick", DirectiveDefinition::new(Phases::LINK, OnClick::default));
		registry.register("onEvent", DirectiveDefinition::new(Phases::LINK, OnEvent::default));
		registry
	}

	/// Registers a definition, returning the one it replaces.
	pub fn register(&mut self, name: impl Into<String>, definition: DirectiveDefinition) -> Option<DirectiveDefinition> {
		self.definitions.insert(name.into(), definition)
	}

	pub fn get(&self, name: &str) -> Option<&DirectiveDefinition> {
		self.definitions.get(name)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.definitions.contains_key(name)
	}

	/// Registered names in registration order
	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.definitions.keys().map(String::as_str)
	}

	pub fn len(&self) -> usize {
		self.definitions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.definitions.is_empty()
	}
}

type ControllerHandler = Rc<dyn Fn(&Scope) -> Result<(), ControllerError>>;

/// Controller handlers by name.
///
/// A handler runs once per controller element, with the fresh scope created
/// for that element.
#[derive(Clone, Default)]
pub struct ControllerRegistry {
	handlers: IndexMap<String, ControllerHandler>,
}

impl ControllerRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
	where
		F: Fn(&Scope) -> Result<(), ControllerError> + 'static,
	{
		self.handlers.insert(name.into(), Rc::new(handler));
	}

	pub(crate) fn get(&self, name: &str) -> Option<ControllerHandler> {
		self.handlers.get(name).cloned()
	}

	pub fn contains(&self, name: &str) -> bool {
		self.handlers.contains_key(name)
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.handlers.keys().map(String::as_str)
	}
}

impl fmt::Debug for ControllerRegistry {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ControllerRegistry")
			.field("names", &self.handlers.keys().collect::<Vec<_>>())
			.finish()
	}
}

/// A directive instance cached on its element, together with the scope it
/// was created with. Each phase runs at most once per binding.
pub struct DirectiveBinding {
	name: String,
	parameter: String,
	scope: Scope,
	directive: Box<dyn Directive>,
	built: Cell<bool>,
	linked: Cell<bool>,
	disposed: Cell<bool>,
}

impl DirectiveBinding {
	pub(crate) fn new(name: &str, parameter: &str, scope: Scope, directive: Box<dyn Directive>) -> Self {
		Self {
			name: name.to_string(),
			parameter: parameter.to_string(),
			scope,
			directive,
			built: Cell::new(false),
			linked: Cell::new(false),
			disposed: Cell::new(false),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn parameter(&self) -> &str {
		&self.parameter
	}

	pub fn scope(&self) -> &Scope {
		&self.scope
	}

	pub fn has_run(&self, phase: Phase) -> bool {
		match phase {
			Phase::BuildDom => self.built.get(),
			Phase::Link => self.linked.get(),
		}
	}

	/// Runs `phase` unless it already ran. Returns whether it ran.
	pub(crate) fn run(self: &Rc<Self>, phase: Phase, element: &Node, compiler: &Compiler) -> Result<bool, DirectiveError> {
		let flag = match phase {
			Phase::BuildDom => &self.built,
			Phase::Link => &self.linked,
		};
		if flag.get() || self.disposed.get() {
			return Ok(false);
		}
		// Set first: a phase may compile content that contains this element.
		flag.set(true);

		let context = DirectiveContext {
			element,
			scope: &self.scope,
			parameter: &self.parameter,
			name: &self.name,
			compiler,
			binding: self,
		};
		match phase {
			Phase::BuildDom => self.directive.build_dom(&context)?,
			Phase::Link => self.directive.link(&context)?,
		}
		Ok(true)
	}

	pub fn is_disposed(&self) -> bool {
		self.disposed.get()
	}

	pub fn dispose(&self) {
		if !self.disposed.replace(true) {
			tracing::trace!(directive = %self.name, "disposing directive binding");
			self.directive.dispose();
		}
	}
}

impl fmt::Debug for DirectiveBinding {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DirectiveBinding")
			.field("name", &self.name)
			.field("parameter", &self.parameter)
			.field("built", &self.built.get())
			.field("linked", &self.linked.get())
			.field("disposed", &self.disposed.get())
			.finish()
	}
}

/// Converts an attribute name to its directive name: `scope-repeat` becomes
/// `scopeRepeat`.
pub fn attribute_to_directive_name(attribute: &str) -> String {
	let mut out = String::with_capacity(attribute.len());
	let mut upper = false;
	for c in attribute.chars() {
		if c == '-' {
			upper = !out.is_empty();
		} else if upper {
			out.extend(c.to_uppercase());
			upper = false;
		} else {
			out.push(c);
		}
	}
	out
}

/// Converts a directive name to its attribute name: `onClick` becomes
/// `on-click`.
pub fn directive_to_attribute_name(name: &str) -> String {
	let mut out = String::with_capacity(name.len() + 4);
	for c in name.chars() {
		if c.is_uppercase() {
			if !out.is_empty() {
				out.push('-');
			}
			out.extend(c.to_lowercase());
		} else {
			out.push(c);
		}
	}
	out
}
