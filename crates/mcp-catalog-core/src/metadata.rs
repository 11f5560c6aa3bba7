//! Curator-facing metadata attached to a repository record.
//!
//! Metadata is a flat string map. The `categories` key holds a
//! comma-joined list of tags drawn from [`CATEGORY_VOCABULARY`]; other
//! keys are free-form and preserved across re-ingestion.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const CATEGORIES_KEY: &str = "categories";

/// Curator-only tag. The extraction service never assigns it and
/// re-ingestion never removes it.
pub const VERIFIED_TAG: &str = "Verified";

/// Tags the extraction service may assign.
pub const CATEGORY_VOCABULARY: &[&str] = &[
    "Popular",
    "Featured",
    "Cloud Platforms",
    "Security & Compliance",
    "Developer Tools",
    "TypeScript",
    "Python",
    "Go",
    "Art & Culture",
    "Analytics & Data",
    "E-commerce",
    "Marketing & Social Media",
    "Productivity",
    "Education",
];

/// Map a free-form tag to its canonical spelling, if it is known.
pub fn canonical_tag(tag: &str) -> Option<&'static str> {
    let tag = tag.trim();
    if tag.eq_ignore_ascii_case(VERIFIED_TAG) {
        return Some(VERIFIED_TAG);
    }
    CATEGORY_VOCABULARY
        .iter()
        .copied()
        .find(|known| known.eq_ignore_ascii_case(tag))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    /// Tags currently in the `categories` key, in stored order.
    pub fn categories(&self) -> Vec<&str> {
        self.get(CATEGORIES_KEY)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.categories()
            .iter()
            .any(|t| t.eq_ignore_ascii_case(tag.trim()))
    }

    /// Replace the machine-assigned categories with `assigned`.
    ///
    /// Unknown tags are dropped, duplicates collapse, and `Verified` is
    /// kept only if it was already present. Other keys are untouched.
    pub fn merge_categories(&mut self, assigned: &str) {
        let verified = self.has_tag(VERIFIED_TAG);
        let mut tags: Vec<&'static str> = Vec::new();
        for tag in assigned.split(',').filter_map(canonical_tag) {
            if tag != VERIFIED_TAG && !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        if verified {
            tags.push(VERIFIED_TAG);
        }
        self.insert(CATEGORIES_KEY, tags.join(","));
    }

    /// Guarantee a `categories` key exists, normalizing its spelling.
    pub fn ensure_categories(&mut self) {
        let mut tags: Vec<String> = Vec::new();
        for raw in self.categories() {
            let tag = canonical_tag(raw)
                .map(str::to_string)
                .unwrap_or_else(|| raw.to_string());
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        self.insert(CATEGORIES_KEY, tags.join(","));
    }

    pub fn to_stored(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }

    /// Decode the stored column. Non-string values are kept as their
    /// JSON text so curator data is never silently discarded.
    pub fn from_stored(text: Option<&str>) -> Result<Self, serde_json::Error> {
        let text = match text.map(str::trim) {
            Some(t) if !t.is_empty() && t != "null" => t,
            _ => return Ok(Self::default()),
        };
        let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(text)?;
        Ok(Self(
            raw.into_iter()
                .map(|(k, v)| {
                    let v = match v {
                        serde_json::Value::String(s) => s,
                        serde_json::Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    (k, v)
                })
                .collect(),
        ))
    }
}

impl From<BTreeMap<String, String>> for Metadata {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}
