use serde::{Deserialize, Serialize};

use crate::delta::Delta;
use crate::document::Document;
use crate::error::TreeError;

const DEFAULT_SCHEMA: &str = "verse-core";
const DEFAULT_VERSION: u32 = 1;

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

fn default_version() -> u32 {
    DEFAULT_VERSION
}

/// Persisted form of a document's contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentValue {
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub delta: Delta,
}

impl DocumentValue {
    pub fn from_delta(delta: Delta) -> Self {
        Self {
            schema: default_schema(),
            version: default_version(),
            delta,
        }
    }

    pub fn from_document(document: &Document) -> Result<Self, TreeError> {
        Ok(Self::from_delta(document.contents()?))
    }

    pub fn into_delta(self) -> Delta {
        self.delta
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
