//! Warm configuration: what a prewarmed session is built for.

use serde::{Deserialize, Serialize};

/// Identifies what should be prewarmed.
///
/// Two configs are equivalent when `resource_id` and `context_payload_variant`
/// match. `context_payload` and `locale` do not take part in equivalence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarmConfig {
	/// Avatar identifier.
	pub resource_id: String,
	/// Knowledge/context text handed to the conversational agent.
	#[serde(default)]
	pub context_payload: String,
	/// Label distinguishing payload variants built for the same avatar.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub context_payload_variant: Option<String>,
	/// Conversation language code.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub locale: Option<String>,
}

impl WarmConfig {
	/// Creates a config for `resource_id` with an empty payload.
	pub fn new(resource_id: impl Into<String>) -> Self {
		Self {
			resource_id: resource_id.into(),
			context_payload: String::new(),
			context_payload_variant: None,
			locale: None,
		}
	}

	/// Sets the context payload text.
	pub fn with_context_payload(mut self, payload: impl Into<String>) -> Self {
		self.context_payload = payload.into();
		self
	}

	/// Sets the payload variant label.
	pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
		self.context_payload_variant = Some(variant.into());
		self
	}

	/// Sets the conversation locale.
	pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
		self.locale = Some(locale.into());
		self
	}

	/// Returns `true` when `other` would be satisfied by a session built for `self`.
	pub fn is_equivalent(&self, other: &WarmConfig) -> bool {
		self.matches(&other.resource_id, other.context_payload_variant.as_deref())
	}

	/// Returns `true` when this config targets `resource_id` with `variant`.
	pub fn matches(&self, resource_id: &str, variant: Option<&str>) -> bool {
		self.resource_id == resource_id && self.context_payload_variant.as_deref() == variant
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn equivalence_ignores_payload_and_locale() {
		let a = WarmConfig::new("a1").with_variant("v1").with_context_payload("one").with_locale("en");
		let b = WarmConfig::new("a1").with_variant("v1").with_context_payload("two").with_locale("de");
		assert!(a.is_equivalent(&b));
		assert!(b.is_equivalent(&a));
	}

	#[test]
	fn equivalence_requires_resource_and_variant() {
		let base = WarmConfig::new("a1").with_variant("v1");
		assert!(!base.is_equivalent(&WarmConfig::new("a2").with_variant("v1")));
		assert!(!base.is_equivalent(&WarmConfig::new("a1").with_variant("v2")));
		assert!(!base.is_equivalent(&WarmConfig::new("a1")));
		assert!(WarmConfig::new("a1").is_equivalent(&WarmConfig::new("a1")));
	}

	#[test]
	fn deserializes_camel_case_with_defaults() {
		let config: WarmConfig = serde_json::from_str(r#"{"resourceId":"a1","contextPayloadVariant":"v1"}"#).unwrap();
		assert_eq!(config.resource_id, "a1");
		assert_eq!(config.context_payload, "");
		assert_eq!(config.context_payload_variant.as_deref(), Some("v1"));
		assert!(config.locale.is_none());
	}
}
