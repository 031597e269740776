use serde::Serialize;
use std::collections::BTreeMap;

use super::UNKNOWN_DOMAIN;
use crate::model::CatalogObject;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainCount {
    pub domain: String,
    pub count: usize,
}

/// Domains with their object counts, alphabetical
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainListing {
    pub domains: Vec<DomainCount>,
    pub total_domains: usize,
    pub total_objects: usize,
}

impl DomainListing {
    pub fn count_for(&self, domain: &str) -> Option<usize> {
        self.domains
            .iter()
            .find(|d| d.domain.eq_ignore_ascii_case(domain))
            .map(|d| d.count)
    }
}

/// Count objects per domain; an empty domain counts as `Unknown`
pub fn list_domains(objects: &[CatalogObject]) -> DomainListing {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for object in objects {
        let domain = if object.domain.trim().is_empty() {
            UNKNOWN_DOMAIN
        } else {
            object.domain.as_str()
        };
        *counts.entry(domain).or_insert(0) += 1;
    }

    let domains: Vec<DomainCount> = counts
        .into_iter()
        .map(|(domain, count)| DomainCount {
            domain: domain.to_string(),
            count,
        })
        .collect();

    DomainListing {
        total_domains: domains.len(),
        total_objects: objects.len(),
        domains,
    }
}
