//! Scopewire Pages - Document Model and Directive Compiler
//!
//! The view side of Scopewire: a small document tree, the directive protocol
//! that turns attributes into behavior, and the compiler that binds both to
//! the scopes of [`scopewire_core`].
//!
//! ## Features
//!
//! - **Document model**: arena-backed nodes with an HTML fragment parser and
//!   serializer, attributes, live form values and target-only events
//! - **Directive protocol**: a dash-case attribute (`scope-text`) selects the
//!   camelCase directive (`scopeText`) registered in a [`DirectiveRegistry`]
//! - **Controllers**: elements carrying the controller attribute get their
//!   own scope, chained to the enclosing one
//! - **List reconciliation**: `scope-repeat` keeps one clone per item and
//!   only touches the clones a change affects
//! - **Persistent store**: an observable mapping mirrored into a string
//!   key/value backend
//!
//! ## Architecture
//!
//! - [`dom`]: [`Document`], [`Node`] and DOM events
//! - [`directive`]: the [`Directive`] trait and the registries
//! - [`compiler`]: the [`Compiler`] and its [`CompileReport`]
//! - [`directives`]: built-in directives
//! - [`storage`]: [`Storage`] and its backends
//! - [`settings`]: [`Settings`] loaded from TOML
//! - [`error`]: error types
//!
//! ## Example
//!
//! ```
//! use scopewire_core::{Observer, Scope};
//! use scopewire_pages::{Compiler, ControllerRegistry, DirectiveRegistry, Document};
//!
//! let scope = Scope::new();
//! let pairs = Observer::sequence_from(["EUR/USD", "GBP/USD"]);
//! scope.set("pairs", &pairs);
//!
//! let document = Document::from_html(
//! 	r#"<ul><li scope-repeat="pair in pairs" scope-text="pair"></li></ul>"#,
//! ).unwrap();
//! let compiler = Compiler::new(DirectiveRegistry::with_builtins(), ControllerRegistry::new());
//! assert!(compiler.compile(&document.root(), Some(&scope)).is_ok());
//!
//! pairs.push("USD/JPY").unwrap();
//! assert_eq!(document.root().text_content(), "EUR/USDGBP/USDUSD/JPY");
//! ```

pub mod compiler;
pub mod directive;
pub mod directives;
pub mod dom;
pub mod error;
pub mod settings;
pub mod storage;

pub use compiler::{CompileReport, Compiler};
pub use directive::{
	ControllerRegistry, Directive, DirectiveBinding, DirectiveContext, DirectiveDefinition,
	DirectiveRegistry, Phase, Phases,
};
pub use dom::{Document, DomEvent, Node, NodeId, NodeType, WeakNode};
pub use error::{
	ControllerError, DirectiveError, DomError, PagesError, Result, SettingsError, StorageError,
};
pub use settings::Settings;
pub use storage::{MemoryBackend, Storage, StorageBackend};
