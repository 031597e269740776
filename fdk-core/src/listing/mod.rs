//! Filtering, sorting, grouping and pagination over a snapshot
//!
//! Everything here is synchronous and pure; the service hands in the
//! coordinator's snapshot.

mod domains;

pub use domains::{list_domains, DomainCount, DomainListing};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{CatalogError, Result};
use crate::model::{CatalogObject, Completeness};

pub const DEFAULT_LIST_LIMIT: usize = 20;

const UNKNOWN_DOMAIN: &str = "Unknown";
const NO_IFC_CLASS: &str = "No IFC Class";
const NO_PROPERTY_SET: &str = "No Property Set";
/// Summary records whose property sets are not known yet
const NOT_LOADED: &str = "Not Loaded";
const NO_OBJECT_GROUP: &str = "No Object Group";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Name,
    Domain,
    Id,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GroupField {
    Domain,
    /// First IFC class
    IfcClass,
    /// One bucket per property set; an object may join several
    PropertySet,
    Name,
    ObjectGroup,
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "name" => Ok(SortField::Name),
            "domain" => Ok(SortField::Domain),
            "id" => Ok(SortField::Id),
            other => Err(format!("Unknown sort field '{}' (valid: name, domain, id)", other)),
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortOrder::Asc),
            "desc" | "descending" => Ok(SortOrder::Desc),
            other => Err(format!("Unknown sort order '{}' (valid: asc, desc)", other)),
        }
    }
}

impl FromStr for GroupField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['_', '-'], "").as_str() {
            "domain" => Ok(GroupField::Domain),
            "ifcclass" => Ok(GroupField::IfcClass),
            "propertyset" => Ok(GroupField::PropertySet),
            "name" => Ok(GroupField::Name),
            "objectgroup" | "group" => Ok(GroupField::ObjectGroup),
            other => Err(format!(
                "Unknown group field '{}' (valid: domain, ifcClass, propertySet, name, objectGroup)",
                other
            )),
        }
    }
}

impl fmt::Display for GroupField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GroupField::Domain => "domain",
            GroupField::IfcClass => "ifcClass",
            GroupField::PropertySet => "propertySet",
            GroupField::Name => "name",
            GroupField::ObjectGroup => "objectGroup",
        };
        f.write_str(name)
    }
}

/// Parameters of one listing
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    /// Exact, case-insensitive
    pub domain: Option<String>,
    /// Case-insensitive substring of the name
    pub search: Option<String>,
    pub sort_by: Option<SortField>,
    pub order: SortOrder,
    /// Non-empty grouping disables pagination
    pub group_by: Vec<GroupField>,
    pub offset: usize,
    /// `None` returns everything after `offset`
    pub limit: Option<usize>,
}

impl ListQuery {
    pub fn validate(&self, max_limit: usize) -> Result<()> {
        if let Some(limit) = self.limit {
            if limit == 0 || limit > max_limit {
                return Err(CatalogError::validation(format!(
                    "limit must be between 1 and {}, got {}",
                    max_limit, limit
                )));
            }
        }
        if !self.group_by.is_empty() && (self.offset > 0 || self.limit.is_some()) {
            return Err(CatalogError::validation(
                "grouping returns full buckets and cannot be combined with offset/limit",
            ));
        }
        Ok(())
    }

    /// Whether `object` passes the domain and name filters
    pub fn selects(&self, object: &CatalogObject) -> bool {
        let domain_ok = self
            .domain
            .as_deref()
            .map_or(true, |d| object.domain.to_lowercase() == d.to_lowercase());
        let search_ok = self.search.as_deref().map_or(true, |s| {
            object.name.to_lowercase().contains(&s.to_lowercase())
        });
        domain_ok && search_ok
    }

    /// Grouping by property set only makes sense over detail records
    pub fn needs_detail(&self) -> bool {
        self.group_by.contains(&GroupField::PropertySet)
    }
}

/// Compact view of an object for listings
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectItem {
    pub id: String,
    pub name: String,
    pub domain: String,
    pub completeness: Completeness,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ifc_class: Option<String>,
    pub property_set_count: usize,
}

impl From<&CatalogObject> for ObjectItem {
    fn from(object: &CatalogObject) -> Self {
        Self {
            id: object.id.clone(),
            name: object.name.clone(),
            domain: object.domain.clone(),
            completeness: object.completeness,
            object_group: object.object_group.clone(),
            ifc_class: object.primary_ifc_class().map(str::to_string),
            property_set_count: object.property_sets.len(),
        }
    }
}

/// Listing response envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    /// Post-filter, pre-pagination count
    pub total: usize,
    /// Items in this page (or grouped members)
    pub count: usize,
    pub offset: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ObjectItem>,
    /// Bucket path (`a/b` for multi-field grouping) to members
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<BTreeMap<String, Vec<ObjectItem>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_counts: Option<BTreeMap<String, usize>>,
    /// Objects whose detail was fetched to answer this listing
    #[serde(skip_serializing_if = "is_zero")]
    pub backfilled: usize,
    /// Objects whose detail could not be fetched; grouped as `Not Loaded`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub backfill_failed: Vec<String>,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Filter, sort and then either group or paginate `objects`
pub fn list(objects: &[CatalogObject], query: &ListQuery) -> Listing {
    let mut selected: Vec<&CatalogObject> =
        objects.iter().filter(|obj| query.selects(obj)).collect();

    if let Some(field) = query.sort_by {
        selected.sort_by(|a, b| compare(a, b, field, query.order));
    }

    let total = selected.len();

    if !query.group_by.is_empty() {
        let groups = group(&selected, &query.group_by);
        let group_counts = groups.iter().map(|(k, v)| (k.clone(), v.len())).collect();
        return Listing {
            total,
            count: total,
            offset: 0,
            items: Vec::new(),
            groups: Some(groups),
            group_counts: Some(group_counts),
            ..Default::default()
        };
    }

    let items: Vec<ObjectItem> = selected
        .into_iter()
        .skip(query.offset)
        .take(query.limit.unwrap_or(usize::MAX))
        .map(ObjectItem::from)
        .collect();

    Listing {
        total,
        count: items.len(),
        offset: query.offset,
        items,
        ..Default::default()
    }
}

/// Ties always break on id ascending
fn compare(a: &CatalogObject, b: &CatalogObject, field: SortField, order: SortOrder) -> Ordering {
    let primary = match field {
        SortField::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortField::Domain => a.domain.to_lowercase().cmp(&b.domain.to_lowercase()),
        SortField::Id => a.id.cmp(&b.id),
    };
    let primary = match order {
        SortOrder::Asc => primary,
        SortOrder::Desc => primary.reverse(),
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

fn group(objects: &[&CatalogObject], fields: &[GroupField]) -> BTreeMap<String, Vec<ObjectItem>> {
    let mut groups: BTreeMap<String, Vec<ObjectItem>> = BTreeMap::new();
    for object in objects {
        for key in bucket_paths(object, fields) {
            groups.entry(key).or_default().push(ObjectItem::from(*object));
        }
    }
    groups
}

/// Every bucket path `object` belongs to (cartesian product over fields)
fn bucket_paths(object: &CatalogObject, fields: &[GroupField]) -> Vec<String> {
    let mut paths = vec![String::new()];
    for field in fields {
        let keys = bucket_keys(object, *field);
        paths = paths
            .iter()
            .flat_map(|prefix| {
                keys.iter().map(move |key| {
                    if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{prefix}/{key}")
                    }
                })
            })
            .collect();
    }
    paths
}

fn bucket_keys(object: &CatalogObject, field: GroupField) -> Vec<String> {
    match field {
        GroupField::Domain => vec![non_empty_or(&object.domain, UNKNOWN_DOMAIN)],
        GroupField::Name => vec![object.name.clone()],
        GroupField::IfcClass => vec![object
            .primary_ifc_class()
            .unwrap_or(NO_IFC_CLASS)
            .to_string()],
        GroupField::ObjectGroup => vec![object
            .object_group
            .as_deref()
            .map_or_else(|| NO_OBJECT_GROUP.to_string(), |g| non_empty_or(g, NO_OBJECT_GROUP))],
        GroupField::PropertySet if !object.is_detail() => vec![NOT_LOADED.to_string()],
        GroupField::PropertySet if object.property_sets.is_empty() => {
            vec![NO_PROPERTY_SET.to_string()]
        }
        GroupField::PropertySet => {
            let mut names: Vec<String> =
                object.property_sets.iter().map(|p| p.name.clone()).collect();
            names.dedup();
            names
        }
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}
