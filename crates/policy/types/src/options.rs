//! Declarative option checks
//!
//! Each block type declares a descriptor per recognized option. The
//! options validator interprets the descriptors generically: required
//! presence, exact type, membership in an allowed set, and existence
//! of referenced external entities. A missing optional field with a
//! documented default is not an error; a well-formed reference to a
//! nonexistent entity is.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Expected JSON type of an option value
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionKind {
    String,
    Boolean,
    Number,
    Object,
    Array,
}

impl OptionKind {
    /// Check a value against this kind
    pub fn matches(self, value: &Value) -> bool {
        match self {
            OptionKind::String => value.is_string(),
            OptionKind::Boolean => value.is_boolean(),
            OptionKind::Number => value.is_number(),
            OptionKind::Object => value.is_object(),
            OptionKind::Array => value.is_array(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OptionKind::String => "string",
            OptionKind::Boolean => "boolean",
            OptionKind::Number => "number",
            OptionKind::Object => "object",
            OptionKind::Array => "array",
        }
    }
}

/// External registry a string option must resolve in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceKind {
    /// Option is a schema IRI that must exist in the document store
    Schema,
    /// Option is a token id that must exist in the token registry
    Token,
}

/// One declarative check over a named option
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OptionDescriptor {
    /// Option name in the block's options map
    pub name: String,
    /// Whether absence is a configuration error
    pub required: bool,
    /// Expected JSON type
    pub kind: OptionKind,
    /// Allowed values, when the option is an enumeration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
    /// External registry the value must resolve in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<ReferenceKind>,
}

impl OptionDescriptor {
    pub fn new(name: impl Into<String>, kind: OptionKind) -> Self {
        Self {
            name: name.into(),
            required: false,
            kind,
            allowed: None,
            reference: None,
        }
    }

    /// A required string option
    pub fn required_string(name: impl Into<String>) -> Self {
        Self::new(name, OptionKind::String).required()
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn one_of(mut self, allowed: &[&str]) -> Self {
        self.allowed = Some(allowed.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn references(mut self, kind: ReferenceKind) -> Self {
        self.reference = Some(kind);
        self
    }
}
