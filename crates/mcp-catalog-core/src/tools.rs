//! Tool descriptors discovered for a server, and the backfill decision.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::manifest::nullable;

/// One parameter of a tool's input schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    #[serde(rename = "type", default, deserialize_with = "nullable")]
    pub kind: String,
    #[serde(default, deserialize_with = "nullable")]
    pub description: String,
    #[serde(default, deserialize_with = "nullable")]
    pub required: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(default, deserialize_with = "nullable")]
    pub properties: BTreeMap<String, Property>,
}

/// A tool exposed by an MCP server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub description: String,
    #[serde(default, deserialize_with = "nullable")]
    pub input_schema: InputSchema,
}

/// The stored tool catalog of a record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ToolCatalog {
    /// No backfill has run yet. Stored as the `{}` placeholder.
    #[default]
    Unscanned,
    /// A backfill ran; the list may legitimately be empty.
    Scanned(Vec<ToolDescriptor>),
}

impl ToolCatalog {
    pub fn tools(&self) -> &[ToolDescriptor] {
        match self {
            ToolCatalog::Unscanned => &[],
            ToolCatalog::Scanned(tools) => tools,
        }
    }

    pub fn is_scanned(&self) -> bool {
        matches!(self, ToolCatalog::Scanned(_))
    }

    pub fn to_stored(&self) -> String {
        match self {
            ToolCatalog::Unscanned => "{}".to_string(),
            ToolCatalog::Scanned(tools) => {
                serde_json::to_string(tools).unwrap_or_else(|_| "[]".to_string())
            }
        }
    }

    /// Decode the stored column. Anything that is not a JSON array
    /// (`NULL`, `{}`, empty text) is the unscanned placeholder.
    pub fn from_stored(text: Option<&str>) -> Result<Self, serde_json::Error> {
        match text.map(str::trim) {
            Some(t) if t.starts_with('[') => Ok(ToolCatalog::Scanned(serde_json::from_str(t)?)),
            _ => Ok(ToolCatalog::Unscanned),
        }
    }
}

/// Whether an ingestion should run the tool-definition backfill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillDecision {
    /// No preferred launch config, so there is nothing to introspect.
    NoPreferredConfig,
    /// Tools were already catalogued and the caller did not force a refresh.
    AlreadyCatalogued,
    Required,
}

impl BackfillDecision {
    pub fn decide(has_preferred: bool, catalog: &ToolCatalog, force: bool) -> Self {
        if !has_preferred {
            BackfillDecision::NoPreferredConfig
        } else if catalog.is_scanned() && !force {
            BackfillDecision::AlreadyCatalogued
        } else {
            BackfillDecision::Required
        }
    }

    pub fn is_required(self) -> bool {
        self == BackfillDecision::Required
    }
}
