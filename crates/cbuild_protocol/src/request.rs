//! Inbound `BuildRequest` shape (§6.1).

use serde::{Deserialize, Serialize};

/// A single user-supplied option flag, as submitted in `flags: [...]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFlag {
    pub name: String,
    pub value: String,
}

impl RequestFlag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// `{ "release": str, "target": str, "flags": [{"name": str, "value": str}, …] }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub release: String,
    pub target: String,
    #[serde(default)]
    pub flags: Vec<RequestFlag>,
}
