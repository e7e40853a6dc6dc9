//! Compiler settings
//!
//! Settings are plain data with defaults for every field, so an empty TOML
//! document is valid:
//!
//! ```
//! use scopewire_pages::settings::Settings;
//!
//! let settings = Settings::from_toml_str(r#"
//! controller_attribute = "data-controller"
//! "#).unwrap();
//!
//! assert_eq!(settings.controller_attribute, "data-controller");
//! assert_eq!(settings.repeat_default_variable, "item");
//! ```

use scopewire_core::RESERVED_SIGIL;
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Settings consumed by the [`Compiler`](crate::compiler::Compiler) and the
/// built-in directives
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
	/// Attribute marking controller elements
	pub controller_attribute: String,

	/// Keys starting with this character are skipped when a repeat renders
	/// a mapping.
	///
	/// Only rendering reads this. Container snapshots and plain values
	/// always hide keys starting with [`RESERVED_SIGIL`], and `$parent`
	/// keeps its meaning whatever the sigil.
	pub reserved_sigil: char,

	/// Item variable of a repeat written as a bare source name
	pub repeat_default_variable: String,

	/// Scope key holding the position of a repeated item
	pub index_variable: String,

	/// Compile every clone a repeat renders
	pub compile_clones: bool,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			controller_attribute: "controller".to_string(),
			reserved_sigil: RESERVED_SIGIL,
			repeat_default_variable: "item".to_string(),
			index_variable: "$index".to_string(),
			compile_clones: true,
		}
	}
}

impl Settings {
	/// Create new settings with defaults
	pub fn new() -> Self {
		Self::default()
	}

	/// Parses and validates settings from a TOML document.
	pub fn from_toml_str(source: &str) -> Result<Self, SettingsError> {
		let settings: Settings = toml::from_str(source)?;
		settings.validate()?;
		Ok(settings)
	}

	/// Validate settings
	pub fn validate(&self) -> Result<(), SettingsError> {
		if self.controller_attribute.trim().is_empty() {
			return Err(SettingsError::Validation(
				"controller_attribute must not be empty".to_string(),
			));
		}

		for (name, value) in [
			("repeat_default_variable", &self.repeat_default_variable),
			("index_variable", &self.index_variable),
		] {
			if value.is_empty() || value.contains(['.', ' ']) {
				return Err(SettingsError::Validation(format!(
					"{name} must be a plain scope key, got `{value}`"
				)));
			}
		}

		if self.reserved_sigil != RESERVED_SIGIL {
			tracing::warn!(
				reserved_sigil = %self.reserved_sigil,
				container_sigil = %RESERVED_SIGIL,
				"reserved_sigil only affects repeat rendering; snapshots still hide the container sigil"
			);
		}

		Ok(())
	}

	pub fn with_controller_attribute(mut self, attribute: impl Into<String>) -> Self {
		self.controller_attribute = attribute.into();
		self
	}

	pub fn with_reserved_sigil(mut self, sigil: char) -> Self {
		self.reserved_sigil = sigil;
		self
	}

	pub fn with_repeat_default_variable(mut self, name: impl Into<String>) -> Self {
		self.repeat_default_variable = name.into();
		self
	}

	pub fn with_index_variable(mut self, name: impl Into<String>) -> Self {
		self.index_variable = name.into();
		self
	}

	pub fn with_compile_clones(mut self, compile: bool) -> Self {
		self.compile_clones = compile;
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use tracing_test::traced_test;

	#[rstest]
	fn test_empty_document_yields_defaults() {
		assert_eq!(Settings::from_toml_str("").unwrap(), Settings::default());
	}

	#[rstest]
	fn test_overrides_are_applied() {
		// Arrange
		let source = r#"
			index_variable = "$i"
			reserved_sigil = "_"
			compile_clones = false
		"#;

		// Act
		let settings = Settings::from_toml_str(source).unwrap();

		// Assert
		assert_eq!(settings.index_variable, "$i");
		assert_eq!(settings.reserved_sigil, '_');
		assert!(!settings.compile_clones);
		assert_eq!(settings.controller_attribute, "controller");
	}

	#[rstest]
	#[traced_test]
	fn test_custom_sigil_is_reported() {
		// Arrange
		let settings = Settings::new().with_reserved_sigil('_');

		// Act
		let result = settings.validate();

		// Assert
		assert!(result.is_ok());
		assert!(logs_contain("reserved_sigil only affects repeat rendering"));
	}

	#[rstest]
	#[traced_test]
	fn test_default_sigil_matches_containers() {
		assert_eq!(Settings::default().reserved_sigil, RESERVED_SIGIL);
		assert!(Settings::default().validate().is_ok());
		assert!(!logs_contain("reserved_sigil only affects"));
	}

	#[rstest]
	#[case(r#"controller_attribute = " ""#)]
	#[case(r#"index_variable = "a.b""#)]
	#[case(r#"repeat_default_variable = """#)]
	fn test_invalid_values_are_rejected(#[case] source: &str) {
		assert!(matches!(
			Settings::from_toml_str(source),
			Err(SettingsError::Validation(_))
		));
	}

	#[rstest]
	fn test_malformed_toml_is_a_parse_error() {
		assert!(matches!(
			Settings::from_toml_str("controller_attribute = "),
			Err(SettingsError::Parse(_))
		));
	}

	#[rstest]
	fn test_builder_methods() {
		// Act
		let settings = Settings::new()
			.with_controller_attribute("ng-controller")
			.with_repeat_default_variable("row")
			.with_index_variable("$i")
			.with_compile_clones(false);

		// Assert
		assert_eq!(settings.controller_attribute, "ng-controller");
		assert_eq!(settings.repeat_default_variable, "row");
		assert_eq!(settings.index_variable, "$i");
		assert!(!settings.compile_clones);
		assert!(settings.validate().is_ok());
	}
}
