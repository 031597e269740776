//! SBB FDK wire format
//!
//! The upstream API's JSON shapes and their mapping onto the entity model.
//! Known fields become typed model fields; everything else is carried in
//! `attributes` so searches can still reach it.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::model::{
    CatalogObject, Completeness, Property, PropertyFormat, PropertySet, ReleaseInfo, Relationship,
};

/// Response of `GET /objects`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireListing {
    #[serde(default)]
    pub count: Option<usize>,

    #[serde(default)]
    pub summaries: Vec<WireSummary>,

    #[serde(default)]
    pub release: Option<WireRelease>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireRelease {
    pub name: String,
    #[serde(default)]
    pub date: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireIfcClass {
    #[serde(default)]
    pub ifc_class: String,
}

/// One entry of the `/objects` listing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub domain_name: String,
    #[serde(default)]
    pub image_id: Option<String>,
    #[serde(default)]
    pub name_object_group: Option<String>,
    #[serde(default)]
    pub name_subgroup: Option<String>,
    #[serde(default)]
    pub ifc_class_assignments: Vec<WireIfcClass>,

    /// domainSequence, sequenceObjectGroup, domainModel, ...
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireFormat {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub fdk_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireProperty {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub format: Option<WireFormat>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub example: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WirePropertySet {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub properties: Vec<WireProperty>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireRelationship {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireEbkpConcept {
    #[serde(default)]
    pub code: String,
}

/// Response of `GET /objects/{id}`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireDetail {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub domain_name: String,
    #[serde(default)]
    pub image_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub name_object_group: Option<String>,
    #[serde(default)]
    pub name_subgroup: Option<String>,
    #[serde(default)]
    pub component_relationships: Vec<WireRelationship>,
    #[serde(default)]
    pub assembly_relationships: Vec<WireRelationship>,
    #[serde(default)]
    pub ifc_assignments: Vec<WireIfcClass>,
    #[serde(default)]
    pub ebkp_concepts: Vec<WireEbkpConcept>,
    #[serde(default)]
    pub property_sets: Vec<WirePropertySet>,

    /// aksCode, structuredDescription, releaseHistory, siaPhaseScopes, ...
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WireListing {
    pub fn into_parts(self) -> (Vec<CatalogObject>, usize, Option<ReleaseInfo>) {
        let objects: Vec<CatalogObject> = self.summaries.into_iter().map(Into::into).collect();
        let total = self.count.unwrap_or(objects.len());
        let release = self.release.map(|r| ReleaseInfo::new(r.name, r.date));
        (objects, total, release)
    }
}

impl From<WireSummary> for CatalogObject {
    fn from(wire: WireSummary) -> Self {
        let mut obj = CatalogObject::summary(wire.id, wire.name, wire.domain_name);
        obj.image_id = wire.image_id;
        obj.object_group = wire.name_object_group;
        obj.subgroup = wire.name_subgroup;
        obj.classifications = wire
            .ifc_class_assignments
            .into_iter()
            .map(|ifc| ifc.ifc_class)
            .filter(|class| !class.is_empty())
            .collect();
        obj.attributes = non_null(wire.extra);
        obj
    }
}

impl From<WireProperty> for Property {
    fn from(wire: WireProperty) -> Self {
        let format = wire
            .format
            .map(|f| PropertyFormat {
                kind: f.kind,
                name: f.name,
                enumeration: f.fdk_id,
            })
            .unwrap_or_default();
        Property {
            id: wire.id,
            name: wire.name,
            format,
            unit: wire.unit.filter(|u| !u.is_empty()),
            description: wire.description,
            example: wire.example,
        }
    }
}

impl From<WirePropertySet> for PropertySet {
    fn from(wire: WirePropertySet) -> Self {
        PropertySet::new(
            wire.id,
            wire.name,
            wire.properties.into_iter().map(Into::into).collect(),
        )
    }
}

impl From<WireRelationship> for Relationship {
    fn from(wire: WireRelationship) -> Self {
        Relationship {
            id: wire.id,
            name: wire.name,
        }
    }
}

impl From<WireDetail> for CatalogObject {
    fn from(wire: WireDetail) -> Self {
        let classifications = wire
            .ifc_assignments
            .into_iter()
            .map(|ifc| ifc.ifc_class)
            .chain(wire.ebkp_concepts.into_iter().map(|e| e.code))
            .filter(|c| !c.is_empty())
            .collect();

        CatalogObject {
            id: wire.id,
            name: wire.name,
            domain: wire.domain_name,
            completeness: Completeness::Detail,
            description: wire.description,
            image_id: wire.image_id,
            object_group: wire.name_object_group,
            subgroup: wire.name_subgroup,
            classifications,
            component_relationships: wire
                .component_relationships
                .into_iter()
                .map(Into::into)
                .collect(),
            assembly_relationships: wire
                .assembly_relationships
                .into_iter()
                .map(Into::into)
                .collect(),
            property_sets: wire.property_sets.into_iter().map(Into::into).collect(),
            attributes: non_null(wire.extra),
        }
    }
}

fn non_null(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter().filter(|(_, v)| !v.is_null()).collect()
}
