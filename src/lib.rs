//! # Scopewire
//!
//! A minimal reactive micro-framework: observable containers and scopes on
//! one side, a document model bound to them through attribute directives on
//! the other.
//!
//! ## Core Principles
//!
//! - **Explicit observation**: every mutation goes through a typed accessor
//!   and produces exactly one change event
//! - **Scopes as data contexts**: controller scopes chain to their enclosing
//!   scope, and lookups walk the chain
//! - **Directives as attributes**: a dash-case attribute selects a registered
//!   directive; the attribute value is its parameter
//! - **Incremental rendering**: lists only re-render the items a change
//!   touches
//!
//! ## Feature Flags
//!
//! - `core` - Observation layer only
//! - `pages` - Document model, directive compiler and storage (implies `core`)
//! - `full` (default) - Everything
//!
//! ## Quick Example
//!
//! ```rust
//! use scopewire::prelude::*;
//!
//! let mut controllers = ControllerRegistry::new();
//! controllers.register("rates", |scope: &Scope| {
//! 	scope.set("rates", Observer::sequence_from([1.08, 1.27]));
//! 	Ok(())
//! });
//!
//! let compiler = Compiler::new(DirectiveRegistry::with_builtins(), controllers);
//! let document = Document::from_html(
//! 	r#"<ul controller="rates"><li scope-repeat="rate in rates" scope-text="rate"></li></ul>"#,
//! )
//! .unwrap();
//! assert!(compiler.compile(&document.root(), None).is_ok());
//! assert_eq!(document.root().find_by_tag("li").len(), 2);
//! ```

#[cfg(feature = "core")]
pub mod core;
#[cfg(feature = "pages")]
pub mod pages;

// Re-export the observation layer
#[cfg(feature = "core")]
pub use scopewire_core::{
	Change, ChangeEvent, ChangeKind, EventEmitter, Expression, Key, Observer, Scope, ScopeFunction,
	Subscription, Value,
};

// Re-export the document layer
#[cfg(feature = "pages")]
pub use scopewire_pages::{
	CompileReport, Compiler, ControllerRegistry, Directive, DirectiveContext, DirectiveDefinition,
	DirectiveRegistry, Document, DomEvent, Node, PagesError, Phases, Settings, Storage,
};

/// Commonly used types
pub mod prelude {
	#[cfg(feature = "core")]
	pub use crate::{ChangeEvent, Key, Observer, Scope, ScopeFunction, Subscription, Value};

	#[cfg(feature = "pages")]
	pub use crate::{
		Compiler, ControllerRegistry, Directive, DirectiveContext, DirectiveDefinition, DirectiveRegistry,
		Document, DomEvent, Node, Settings, Storage,
	};
}
