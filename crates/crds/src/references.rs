//! Object references used by DCops CRDs

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to a Secret in the namespace implied by the referencing field
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    /// Name of the Secret
    pub name: String,
}

impl SecretReference {
    /// Create a reference to the named Secret
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}
