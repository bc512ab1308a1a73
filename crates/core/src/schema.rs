//! Intent schema: the static mapping from intent name to required fields.
//!
//! The schema is external configuration consumed at the boundary. The flow
//! orchestrator treats it as an opaque lookup table so the state machine
//! stays free of intent-specific branching.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reserved intent value for messages the classifier cannot place. Never
/// locked onto a ticket; routes straight to escalation.
pub const UNKNOWN_INTENT: &str = "unknown";

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldName(pub String);

impl FieldName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FieldName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentSpec {
    /// Required fields in the order the customer should be asked for them.
    pub required_fields: Vec<FieldName>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntentSchema {
    intents: BTreeMap<String, IntentSpec>,
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("could not read intent schema `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse intent schema `{path}`: {source}")]
    ParseFile { path: PathBuf, source: serde_json::Error },
    #[error("intent schema must not declare the reserved `{UNKNOWN_INTENT}` intent")]
    ReservedIntent,
}

impl IntentSchema {
    pub fn new(intents: BTreeMap<String, IntentSpec>) -> Result<Self, SchemaError> {
        if intents.contains_key(UNKNOWN_INTENT) {
            return Err(SchemaError::ReservedIntent);
        }
        Ok(Self { intents })
    }

    pub fn from_json_str(path: &Path, raw: &str) -> Result<Self, SchemaError> {
        let intents: BTreeMap<String, IntentSpec> = serde_json::from_str(raw)
            .map_err(|source| SchemaError::ParseFile { path: path.to_path_buf(), source })?;
        Self::new(intents)
    }

    pub fn from_path(path: &Path) -> Result<Self, SchemaError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| SchemaError::ReadFile { path: path.to_path_buf(), source })?;
        Self::from_json_str(path, &raw)
    }

    pub fn knows(&self, intent: &str) -> bool {
        self.intents.contains_key(intent)
    }

    pub fn required_fields(&self, intent: &str) -> Option<&[FieldName]> {
        self.intents.get(intent).map(|spec| spec.required_fields.as_slice())
    }

    pub fn intent_names(&self) -> impl Iterator<Item = &str> {
        self.intents.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}
