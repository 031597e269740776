//! Searchable sections of a catalog object

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::model::CatalogObject;

/// A named section of an object that a search can be scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchField {
    /// Every scalar leaf of the whole object
    All,
    Name,
    Domain,
    Description,
    /// Whole property sets, including their properties
    #[serde(alias = "property_sets")]
    PropertySets,
    #[serde(alias = "property_set_names")]
    PropertySetNames,
    /// Every leaf of every property (name, format, unit, ...)
    Properties,
    #[serde(alias = "property_names")]
    PropertyNames,
    /// Component and assembly relationships
    Relationships,
    /// IFC classes and eBKP codes
    Classifications,
    /// Object group and subgroup labels
    Groups,
    /// Opaque upstream fields
    Attributes,
}

impl SearchField {
    pub const ALL_FIELDS: [SearchField; 12] = [
        SearchField::All,
        SearchField::Name,
        SearchField::Domain,
        SearchField::Description,
        SearchField::PropertySets,
        SearchField::PropertySetNames,
        SearchField::Properties,
        SearchField::PropertyNames,
        SearchField::Relationships,
        SearchField::Classifications,
        SearchField::Groups,
        SearchField::Attributes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchField::All => "all",
            SearchField::Name => "name",
            SearchField::Domain => "domain",
            SearchField::Description => "description",
            SearchField::PropertySets => "propertySets",
            SearchField::PropertySetNames => "propertySetNames",
            SearchField::Properties => "properties",
            SearchField::PropertyNames => "propertyNames",
            SearchField::Relationships => "relationships",
            SearchField::Classifications => "classifications",
            SearchField::Groups => "groups",
            SearchField::Attributes => "attributes",
        }
    }

    /// The (path, value) roots this field covers on `object`
    ///
    /// Paths use the serialized camelCase names, e.g.
    /// `propertySets[0].properties[2].name`.
    pub(crate) fn sections(&self, object: &CatalogObject) -> Vec<(String, Value)> {
        let mut out = Vec::new();
        match self {
            SearchField::All => {
                let mut whole = serde_json::to_value(object).unwrap_or_default();
                if let Value::Object(map) = &mut whole {
                    map.remove("completeness");
                }
                out.push((String::new(), whole));
            }
            SearchField::Name => out.push(("name".into(), Value::from(object.name.as_str()))),
            SearchField::Domain => {
                out.push(("domain".into(), Value::from(object.domain.as_str())))
            }
            SearchField::Description => {
                if let Some(description) = &object.description {
                    out.push(("description".into(), Value::from(description.as_str())));
                }
            }
            SearchField::PropertySets => out.push((
                "propertySets".into(),
                serde_json::to_value(&object.property_sets).unwrap_or_default(),
            )),
            SearchField::PropertySetNames => {
                for (i, pset) in object.property_sets.iter().enumerate() {
                    out.push((
                        format!("propertySets[{i}].name"),
                        Value::from(pset.name.as_str()),
                    ));
                }
            }
            SearchField::Properties => {
                for (i, pset) in object.property_sets.iter().enumerate() {
                    out.push((
                        format!("propertySets[{i}].properties"),
                        serde_json::to_value(&pset.properties).unwrap_or_default(),
                    ));
                }
            }
            SearchField::PropertyNames => {
                for (i, pset) in object.property_sets.iter().enumerate() {
                    for (j, prop) in pset.properties.iter().enumerate() {
                        out.push((
                            format!("propertySets[{i}].properties[{j}].name"),
                            Value::from(prop.name.as_str()),
                        ));
                    }
                }
            }
            SearchField::Relationships => {
                out.push((
                    "componentRelationships".into(),
                    serde_json::to_value(&object.component_relationships).unwrap_or_default(),
                ));
                out.push((
                    "assemblyRelationships".into(),
                    serde_json::to_value(&object.assembly_relationships).unwrap_or_default(),
                ));
            }
            SearchField::Classifications => out.push((
                "classifications".into(),
                Value::from(object.classifications.clone()),
            )),
            SearchField::Groups => {
                if let Some(group) = &object.object_group {
                    out.push(("objectGroup".into(), Value::from(group.as_str())));
                }
                if let Some(subgroup) = &object.subgroup {
                    out.push(("subgroup".into(), Value::from(subgroup.as_str())));
                }
            }
            SearchField::Attributes => out.push((
                "attributes".into(),
                Value::Object(object.attributes.clone()),
            )),
        }
        out
    }
}

impl fmt::Display for SearchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchField {
    type Err = String;

    /// Accepts camelCase and snake_case spellings, case-insensitively
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        SearchField::ALL_FIELDS
            .into_iter()
            .find(|field| field.as_str().to_lowercase() == normalized)
            .ok_or_else(|| {
                let valid: Vec<&str> = SearchField::ALL_FIELDS.iter().map(|f| f.as_str()).collect();
                format!("Unknown search field '{}' (valid: {})", s, valid.join(", "))
            })
    }
}
