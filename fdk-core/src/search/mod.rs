//! Field-scoped search with transparent backfill
//!
//! Matching runs over whatever each object already holds. Summary objects
//! that did not match are backfilled through the [`CacheCoordinator`] when a
//! requested field needs detail data, then matched again. Results follow the
//! store listing order (id ascending) and `total` is always the full count.

mod fields;
mod matcher;

pub use fields::SearchField;
pub use matcher::{LeafMatch, MatchMode, Matcher};

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{FdkConfig, SearchConfig};
use crate::coordinator::CacheCoordinator;
use crate::error::{CatalogError, Result};
use crate::model::{CatalogObject, Completeness};

/// Parameters of one search
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub query: String,
    pub fields: Vec<SearchField>,
    /// Exact, case-insensitive domain restriction
    pub domain: Option<String>,
    pub mode: MatchMode,
    pub case_sensitive: bool,
    pub limit: usize,
}

impl SearchQuery {
    /// Whole-object, case-insensitive substring search
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            fields: vec![SearchField::All],
            domain: None,
            mode: MatchMode::Contains,
            case_sensitive: false,
            limit: 50,
        }
    }

    pub fn fields(mut self, fields: Vec<SearchField>) -> Self {
        self.fields = fields;
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Reject malformed parameters before any I/O
    pub fn validate(&self, max_limit: usize) -> Result<()> {
        if self.query.trim().is_empty() {
            return Err(CatalogError::validation("search query must not be empty"));
        }
        if self.fields.is_empty() {
            return Err(CatalogError::validation(
                "at least one search field is required",
            ));
        }
        if self.limit == 0 || self.limit > max_limit {
            return Err(CatalogError::validation(format!(
                "limit must be between 1 and {}, got {}",
                max_limit, self.limit
            )));
        }
        Ok(())
    }

    /// Requested fields without duplicates; `all` subsumes everything else
    fn effective_fields(&self) -> Vec<SearchField> {
        if self.fields.contains(&SearchField::All) {
            return vec![SearchField::All];
        }
        let mut fields = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            if !fields.contains(field) {
                fields.push(*field);
            }
        }
        fields
    }
}

/// One matching object
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    pub name: String,
    pub domain: String,
    pub completeness: Completeness,
    /// Field of the first matching leaf
    pub field: SearchField,
    /// Path of the first matching leaf, e.g. `propertySets[0].name`
    pub path: String,
    /// Value of the first matching leaf
    pub value: String,
    /// Property set containing the first match, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_set: Option<String>,
    /// Matching leaves across all requested fields
    pub match_count: usize,
}

/// Search response envelope
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    /// Full match count, independent of `limit`
    pub total: usize,
    /// Items actually returned
    pub count: usize,
    pub items: Vec<SearchHit>,
    /// Objects whose detail was fetched to answer this query
    pub backfilled: usize,
    /// Objects whose backfill failed; matched on summary data only
    pub backfill_failed: Vec<String>,
}

/// Search engine over the coordinator's snapshot
pub struct SearchEngine {
    coordinator: Arc<CacheCoordinator>,
    config: SearchConfig,
    backfill_concurrency: usize,
}

impl SearchEngine {
    pub fn new(coordinator: Arc<CacheCoordinator>, config: &FdkConfig) -> Self {
        Self {
            coordinator,
            config: config.search.clone(),
            backfill_concurrency: config.download.max_concurrency,
        }
    }

    pub fn max_limit(&self) -> usize {
        self.config.max_limit
    }

    /// Run `query`, backfilling detail where the requested fields need it
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResults> {
        query.validate(self.config.max_limit)?;

        let fields = query.effective_fields();
        let matcher = Matcher::new(&query.query, query.mode, query.case_sensitive);
        let needs_detail = fields.iter().any(|f| self.config.requires_detail(*f));

        let objects: Vec<CatalogObject> = self
            .coordinator
            .snapshot()
            .await?
            .into_iter()
            .filter(|obj| {
                query
                    .domain
                    .as_deref()
                    .map_or(true, |d| obj.domain.eq_ignore_ascii_case(d))
            })
            .collect();

        let mut hits: Vec<Option<SearchHit>> = objects
            .iter()
            .map(|obj| match_object(obj, &fields, &matcher))
            .collect();

        let candidates: Vec<usize> = if needs_detail {
            hits.iter()
                .enumerate()
                .filter(|(i, hit)| hit.is_none() && !objects[*i].is_detail())
                .map(|(i, _)| i)
                .collect()
        } else {
            Vec::new()
        };

        let mut results = SearchResults::default();
        if !candidates.is_empty() {
            debug!(
                "Backfilling {} summary objects for fields {:?}",
                candidates.len(),
                fields
            );
            let ids: Vec<String> = candidates.iter().map(|i| objects[*i].id.clone()).collect();
            let (stats, fetched) = self
                .coordinator
                .fetch_many(ids, self.backfill_concurrency, true)
                .await;

            let mut by_id: HashMap<String, CatalogObject> =
                fetched.into_iter().map(|o| (o.id.clone(), o)).collect();
            for i in candidates {
                if let Some(detail) = by_id.remove(&objects[i].id) {
                    hits[i] = match_object(&detail, &fields, &matcher);
                }
            }
            results.backfilled = stats.succeeded;
            results.backfill_failed = stats.failed_ids;
        }

        results.total = hits.iter().filter(|h| h.is_some()).count();
        results.items = hits.into_iter().flatten().take(query.limit).collect();
        results.count = results.items.len();

        info!(
            "Search '{}' in {:?}: {} matches ({} backfilled)",
            query.query, fields, results.total, results.backfilled
        );
        Ok(results)
    }

    /// Property-name search: `search` scoped to property names
    pub async fn search_properties(&self, query: &str, limit: usize) -> Result<SearchResults> {
        let query = SearchQuery::new(query)
            .fields(vec![SearchField::PropertyNames])
            .limit(limit);
        self.search(&query).await
    }
}

/// Match one object; `None` when no requested field has a matching leaf
fn match_object(
    object: &CatalogObject,
    fields: &[SearchField],
    matcher: &Matcher,
) -> Option<SearchHit> {
    let mut first: Option<(SearchField, LeafMatch)> = None;
    let mut match_count = 0;

    for field in fields {
        for (path, value) in field.sections(object) {
            let mut found = Vec::new();
            matcher.collect(&value, &path, &mut found);
            match_count += found.len();
            if first.is_none() {
                if let Some(leaf) = found.into_iter().next() {
                    first = Some((*field, leaf));
                }
            }
        }
    }

    let (field, leaf) = first?;
    Some(SearchHit {
        id: object.id.clone(),
        name: object.name.clone(),
        domain: object.domain.clone(),
        completeness: object.completeness,
        field,
        property_set: property_set_at(object, &leaf.path),
        path: leaf.path,
        value: leaf.value,
        match_count,
    })
}

/// Name of the property set a `propertySets[i]...` path points into
fn property_set_at(object: &CatalogObject, path: &str) -> Option<String> {
    let rest = path.strip_prefix("propertySets[")?;
    let index: usize = rest.split(']').next()?.parse().ok()?;
    object.property_sets.get(index).map(|p| p.name.clone())
}
