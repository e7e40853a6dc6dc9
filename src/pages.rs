//! Document model and directive compiler
//!
//! This module provides access to scopewire-pages, which binds scopes to a
//! document through attribute directives.
//!
//! ## Architecture
//!
//! - **Document model**: [`Document`] and [`Node`] handles over an arena tree
//! - **Directives**: the [`Directive`] trait and the [`DirectiveRegistry`]
//! - **Compiler**: controller binding followed by the `build_dom` and `link`
//!   phases
//! - **Storage**: an observable mapping persisted through a backend
//!
//! ## Example
//!
//! ```rust
//! use scopewire::pages::{Compiler, ControllerRegistry, DirectiveRegistry, Document};
//!
//! let mut controllers = ControllerRegistry::new();
//! controllers.register("clock", |scope| {
//! 	scope.set("time", "12:00");
//! 	Ok(())
//! });
//!
//! let compiler = Compiler::new(DirectiveRegistry::with_builtins(), controllers);
//! let document = Document::from_html(r#"<p controller="clock" scope-text="time"></p>"#).unwrap();
//! compiler.compile(&document.root(), None);
//! assert_eq!(document.root().text_content(), "12:00");
//! ```

#[cfg(feature = "pages")]
pub use scopewire_pages::*;
