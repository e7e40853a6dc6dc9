//! Observation layer module.
//!
//! This module provides access to the observable containers, scopes, change
//! events and the expression language.
//!
//! # Examples
//!
//! ```rust
//! # #[cfg(feature = "core")]
//! use scopewire::core::{Observer, Scope};
//! ```

#[cfg(feature = "core")]
pub use scopewire_core::*;
