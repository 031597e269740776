//! Property sets and properties
//!
//! Properties are immutable records built once from upstream data.

use serde::{Deserialize, Serialize};

/// Value type of a property plus an optional enumeration reference
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyFormat {
    /// Type tag (e.g. "string", "real", "enumeration")
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Display name of the format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Id of the referenced enumeration, when the format is an enumeration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enumeration: Option<String>,
}

/// A single typed attribute of a catalog object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub format: PropertyFormat,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
}

/// A named group of properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySet {
    pub id: String,

    /// Unique within the owning object (compared case-insensitively)
    pub name: String,

    #[serde(default)]
    pub properties: Vec<Property>,
}

impl Property {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            format: PropertyFormat::default(),
            unit: None,
            description: None,
            example: None,
        }
    }
}

impl PropertySet {
    pub fn new(id: impl Into<String>, name: impl Into<String>, properties: Vec<Property>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            properties,
        }
    }

    /// Look up a property by name (case-insensitive)
    pub fn get_property(&self, name: &str) -> Option<&Property> {
        let name_lower = name.to_lowercase();
        self.properties
            .iter()
            .find(|p| p.name.to_lowercase() == name_lower)
    }
}
