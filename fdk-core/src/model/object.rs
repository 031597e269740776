//! Catalog object entity

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::{Property, PropertySet};

/// How much of an object has been fetched
///
/// Tracked explicitly so a detail record whose upstream object genuinely
/// has no property sets is never mistaken for a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Completeness {
    /// Only the bulk listing fields are present
    #[default]
    Summary,
    /// The full single-object record has been fetched
    Detail,
}

/// Weak back-reference to another catalog object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: String,
    pub name: String,
}

/// A catalog object (e.g. a track grid, a bridge bearing, a wall)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogObject {
    /// Globally unique, stable across releases (e.g. "OBJ_FB_1")
    pub id: String,

    pub name: String,

    /// Domain name (e.g. "Fahrbahn", "Hochbau")
    pub domain: String,

    #[serde(default)]
    pub completeness: Completeness,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,

    /// Object group label from the listing (`nameObjectGroup` upstream)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_group: Option<String>,

    /// Subgroup label from the listing (`nameSubgroup` upstream)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgroup: Option<String>,

    /// IFC classes followed by eBKP codes
    #[serde(default)]
    pub classifications: Vec<String>,

    #[serde(default)]
    pub component_relationships: Vec<Relationship>,

    #[serde(default)]
    pub assembly_relationships: Vec<Relationship>,

    #[serde(default)]
    pub property_sets: Vec<PropertySet>,

    /// Remaining upstream fields, kept opaque (searchable, never interpreted)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

impl CatalogObject {
    /// Create a summary record with only the identifying fields set
    pub fn summary(
        id: impl Into<String>,
        name: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            domain: domain.into(),
            completeness: Completeness::Summary,
            description: None,
            image_id: None,
            object_group: None,
            subgroup: None,
            classifications: Vec::new(),
            component_relationships: Vec::new(),
            assembly_relationships: Vec::new(),
            property_sets: Vec::new(),
            attributes: Map::new(),
        }
    }

    /// Mark this record as a complete single-object fetch
    pub fn into_detail(mut self) -> Self {
        self.completeness = Completeness::Detail;
        self
    }

    pub fn is_detail(&self) -> bool {
        self.completeness == Completeness::Detail
    }

    /// Look up a property set by name (case-insensitive)
    pub fn get_property_set(&self, name: &str) -> Option<&PropertySet> {
        let name_lower = name.to_lowercase();
        self.property_sets
            .iter()
            .find(|pset| pset.name.to_lowercase() == name_lower)
    }

    /// Look up a property by name, optionally inside a named property set
    pub fn get_property(
        &self,
        property_name: &str,
        pset_name: Option<&str>,
    ) -> Option<&Property> {
        match pset_name {
            Some(pset) => self.get_property_set(pset)?.get_property(property_name),
            None => self
                .property_sets
                .iter()
                .find_map(|pset| pset.get_property(property_name)),
        }
    }

    /// First IFC class, if any
    pub fn primary_ifc_class(&self) -> Option<&str> {
        self.classifications.first().map(|s| s.as_str())
    }

    /// Ids of all related objects, components first
    pub fn related_ids(&self) -> Vec<&str> {
        self.component_relationships
            .iter()
            .chain(self.assembly_relationships.iter())
            .map(|rel| rel.id.as_str())
            .collect()
    }

    pub fn property_count(&self) -> usize {
        self.property_sets.iter().map(|p| p.properties.len()).sum()
    }
}

impl fmt::Display for CatalogObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)?;
        if !self.domain.is_empty() {
            write!(f, " - Domain: {}", self.domain)?;
        }
        if self.is_detail() {
            write!(f, " - Properties: {} sets", self.property_sets.len())?;
        }
        Ok(())
    }
}
