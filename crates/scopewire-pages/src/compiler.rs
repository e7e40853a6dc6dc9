//! Document compiler
//!
//! [`Compiler::compile`] walks a subtree in three passes:
//!
//! 1. every element carrying the controller attribute gets a fresh scope,
//!    parented to the nearest enclosing scope, and its controller handler
//!    runs once;
//! 2. `build_dom` runs for every element naming a directive that declares
//!    that phase;
//! 3. a fresh scan (the structure may have changed) runs `link`.
//!
//! Directive instances are cached on their element, so compiling the same
//! subtree again only affects elements that were not compiled before. Faults
//! are logged and collected in the returned [`CompileReport`]; one failing
//! element never prevents the others from being compiled.
//!
//! ## Example
//!
//! ```
//! use scopewire_pages::compiler::Compiler;
//! use scopewire_pages::directive::{ControllerRegistry, DirectiveRegistry};
//! use scopewire_pages::dom::Document;
//!
//! let mut controllers = ControllerRegistry::new();
//! controllers.register("greeting", |scope| {
//! 	scope.set("name", "world");
//! 	Ok(())
//! });
//!
//! let compiler = Compiler::new(DirectiveRegistry::with_builtins(), controllers);
//! let document = Document::from_html(
//! 	r#"<div controller="greeting"><span scope-text="name"></span></div>"#,
//! ).unwrap();
//!
//! let report = compiler.compile(&document.root(), None);
//! assert!(report.is_ok());
//! assert_eq!(document.root().text_content(), "world");
//! ```

use std::fmt;
use std::rc::Rc;

use scopewire_core::Scope;

use crate::directive::{
	ControllerRegistry, DirectiveBinding, DirectiveRegistry, Phase, attribute_to_directive_name,
};
use crate::dom::Node;
use crate::error::{PagesError, SettingsError};
use crate::settings::Settings;

struct CompilerInner {
	directives: DirectiveRegistry,
	controllers: ControllerRegistry,
	settings: Settings,
}

/// Binds controllers and runs directives over document subtrees.
///
/// `Compiler` is a cheap handle; directives keep a clone to compile the
/// content they render later on.
#[derive(Clone)]
pub struct Compiler {
	inner: Rc<CompilerInner>,
}

impl Compiler {
	/// Creates a compiler with default settings.
	pub fn new(directives: DirectiveRegistry, controllers: ControllerRegistry) -> Self {
		Self {
			inner: Rc::new(CompilerInner {
				directives,
				controllers,
				settings: Settings::default(),
			}),
		}
	}

	/// Creates a compiler with validated `settings`.
	pub fn with_settings(
		directives: DirectiveRegistry,
		controllers: ControllerRegistry,
		settings: Settings,
	) -> Result<Self, SettingsError> {
		settings.validate()?;
		Ok(Self {
			inner: Rc::new(CompilerInner {
				directives,
				controllers,
				settings,
			}),
		})
	}

	pub fn settings(&self) -> &Settings {
		&self.inner.settings
	}

	pub fn directives(&self) -> &DirectiveRegistry {
		&self.inner.directives
	}

	pub fn controllers(&self) -> &ControllerRegistry {
		&self.inner.controllers
	}

	/// Compiles the subtree rooted at `root`.
	///
	/// If `scope` is given and `root` has no scope of its own, it is attached
	/// to `root` first.
	pub fn compile(&self, root: &Node, scope: Option<&Scope>) -> CompileReport {
		let mut report = CompileReport::default();
		if let Some(scope) = scope
			&& root.scope().is_none()
			&& let Err(error) = root.set_scope(Some(scope.clone()))
		{
			report.errors.push(error.into());
			return report;
		}

		self.bind_controllers(root, &mut report);
		self.run_phase(root, Phase::BuildDom, &mut report);
		self.run_phase(root, Phase::Link, &mut report);

		tracing::debug!(
			controllers = report.controllers_bound,
			built = report.directives_built,
			linked = report.directives_linked,
			errors = report.errors.len(),
			"compiled subtree"
		);
		report
	}

	fn bind_controllers(&self, root: &Node, report: &mut CompileReport) {
		let attribute = &self.inner.settings.controller_attribute;
		for element in root.find_by_attribute(attribute) {
			if element.is_controller_bound() {
				continue;
			}
			let Some(name) = element.attribute(attribute) else {
				continue;
			};
			let Some(handler) = self.inner.controllers.get(&name) else {
				tracing::error!(controller = %name, "unknown controller");
				report.errors.push(PagesError::UnknownController(name));
				continue;
			};

			let scope = match element.nearest_scope() {
				Some(parent) => Scope::child_of(&parent),
				None => Scope::new(),
			};
			if let Err(error) = element
				.set_scope(Some(scope.clone()))
				.and_then(|_| element.mark_controller_bound())
			{
				report.errors.push(error.into());
				continue;
			}
			report.controllers_bound += 1;

			if let Err(source) = handler(&scope) {
				tracing::error!(controller = %name, error = %source, "controller failed");
				report.errors.push(PagesError::Controller { name, source });
			}
		}
	}

	fn run_phase(&self, root: &Node, phase: Phase, report: &mut CompileReport) {
		for element in root.descendants_and_self() {
			// Earlier directives may have moved or released this element.
			if !element.is_element() || !root.contains(&element) {
				continue;
			}
			for (attribute, parameter) in element.attributes() {
				let name = attribute_to_directive_name(&attribute);
				let Some(definition) = self.inner.directives.get(&name) else {
					continue;
				};
				if !definition.phases().includes(phase) {
					continue;
				}
				let Some(binding) = self.binding_for(&element, &name, &parameter) else {
					tracing::trace!(directive = %name, "element has no scope, skipping");
					break;
				};

				match binding.run(phase, &element, self) {
					Ok(false) => {}
					Ok(true) => match phase {
						Phase::BuildDom => report.directives_built += 1,
						Phase::Link => report.directives_linked += 1,
					},
					Err(source) => {
						tracing::error!(directive = %name, %phase, error = %source, "directive failed");
						report.errors.push(PagesError::Directive { name, source });
					}
				}
				if !root.contains(&element) {
					break;
				}
			}
		}
	}

	fn binding_for(&self, element: &Node, name: &str, parameter: &str) -> Option<Rc<DirectiveBinding>> {
		if let Some(binding) = element.binding(name) {
			return Some(binding);
		}
		let scope = element.nearest_scope()?;
		let definition = self.inner.directives.get(name)?;
		let binding = Rc::new(DirectiveBinding::new(name, parameter, scope, definition.instantiate()));
		element.insert_binding(name, binding.clone()).ok()?;
		Some(binding)
	}

	/// Disposes every directive binding and controller scope in the subtree.
	/// The nodes stay in the document; compiling them again starts over.
	pub fn teardown(&self, root: &Node) {
		tracing::debug!(node = ?root.id(), "tearing down subtree");
		root.teardown();
	}
}

impl fmt::Debug for Compiler {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Compiler")
			.field("directives", &self.inner.directives.names().collect::<Vec<_>>())
			.field("controllers", &self.inner.controllers)
			.field("settings", &self.inner.settings)
			.finish()
	}
}

/// Outcome of one [`Compiler::compile`] call
#[derive(Debug, Default)]
pub struct CompileReport {
	/// Controller elements bound in this pass
	pub controllers_bound: usize,
	/// `build_dom` phases run in this pass
	pub directives_built: usize,
	/// `link` phases run in this pass
	pub directives_linked: usize,
	/// Faults recorded while compiling
	pub errors: Vec<PagesError>,
}

impl CompileReport {
	pub fn is_ok(&self) -> bool {
		self.errors.is_empty()
	}

	/// Fails with the first recorded fault.
	pub fn into_result(mut self) -> crate::error::Result<Self> {
		if self.errors.is_empty() {
			Ok(self)
		} else {
			Err(self.errors.remove(0))
		}
	}
}
