//! Subcommands and their table rendering

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

use fdk_core::listing::{GroupField, ListQuery, Listing, ObjectItem, SortField, SortOrder};
use fdk_core::model::{CatalogObject, Completeness, Language};
use fdk_core::search::{MatchMode, SearchField, SearchQuery, SearchResults};
use fdk_core::{DownloadStats, FdkService};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List catalog objects with filtering, sorting and grouping
    List {
        /// Only objects of this domain
        #[clap(long)]
        domain: Option<String>,

        /// Case-insensitive substring of the object name
        #[clap(long)]
        search: Option<String>,

        /// Sort by name, domain or id
        #[clap(long)]
        sort_by: Option<SortField>,

        /// asc or desc
        #[clap(long, default_value = "asc")]
        order: SortOrder,

        /// Group by domain, ifcClass, propertySet, name or objectGroup (repeatable)
        #[clap(long)]
        group_by: Vec<GroupField>,

        #[clap(long, default_value_t = 0)]
        offset: usize,

        #[clap(long)]
        limit: Option<usize>,
    },

    /// Show one object with its full detail
    Get {
        /// Object id
        id: String,

        /// de, fr, it or en (default: configured language)
        #[clap(long)]
        language: Option<Language>,
    },

    /// Search property names
    SearchProperties {
        query: String,

        #[clap(long, default_value_t = 50)]
        limit: usize,
    },

    /// Search any combination of object fields
    Search {
        query: String,

        /// Field to search (repeatable, default: all)
        #[clap(long = "field", short = 'f')]
        fields: Vec<SearchField>,

        #[clap(long)]
        domain: Option<String>,

        /// contains, equals, starts_with or ends_with
        #[clap(long, default_value = "contains")]
        mode: MatchMode,

        #[clap(long)]
        case_sensitive: bool,

        #[clap(long, default_value_t = 50)]
        limit: usize,
    },

    /// Object counts per domain
    Domains,

    /// Fetch detail for every object into the cache
    Download {
        #[clap(long)]
        language: Option<Language>,

        #[clap(long)]
        domain: Option<String>,

        /// Parallel detail fetches (1-20)
        #[clap(long)]
        concurrency: Option<usize>,
    },

    /// Fetch detail only for objects the cache lacks
    Update {
        #[clap(long)]
        language: Option<Language>,

        #[clap(long)]
        domain: Option<String>,

        /// Drop held detail and re-list before updating
        #[clap(long)]
        force: bool,

        /// Parallel detail fetches (1-20)
        #[clap(long)]
        concurrency: Option<usize>,
    },

    /// How much of the catalog is cached with detail
    Coverage {
        #[clap(long)]
        domain: Option<String>,
    },

    /// Cache status
    Stats,

    /// Remove every cached record
    Clear,
}

pub async fn run(service: &FdkService, command: Command, json: bool) -> Result<()> {
    match command {
        Command::List {
            domain,
            search,
            sort_by,
            order,
            group_by,
            offset,
            limit,
        } => {
            let query = ListQuery {
                domain,
                search,
                sort_by,
                order,
                group_by,
                offset,
                limit,
            };
            let listing = service.list_objects(&query).await?;
            if json {
                return print_json(&listing);
            }
            print_listing(&listing);
        }
        Command::Get { id, language } => {
            let response = service.get_object(&id, language).await?;
            if json {
                return print_json(&response);
            }
            print_object(&response.object, response.from_cache);
        }
        Command::SearchProperties { query, limit } => {
            let results = service.search_properties(&query, limit).await?;
            if json {
                return print_json(&results);
            }
            print_search(&results);
        }
        Command::Search {
            query,
            fields,
            domain,
            mode,
            case_sensitive,
            limit,
        } => {
            let mut search = SearchQuery::new(query)
                .mode(mode)
                .case_sensitive(case_sensitive)
                .limit(limit);
            if !fields.is_empty() {
                search = search.fields(fields);
            }
            if let Some(domain) = domain {
                search = search.domain(domain);
            }
            let results = service.advanced_search(&search).await?;
            if json {
                return print_json(&results);
            }
            print_search(&results);
        }
        Command::Domains => {
            let domains = service.list_domains().await?;
            if json {
                return print_json(&domains);
            }
            let rows: Vec<DomainRow> = domains
                .domains
                .iter()
                .map(|d| DomainRow {
                    domain: d.domain.clone(),
                    count: d.count,
                })
                .collect();
            println!("{}", render(&rows));
            println!(
                "{} domains, {} objects",
                domains.total_domains, domains.total_objects
            );
        }
        Command::Download {
            language,
            domain,
            concurrency,
        } => {
            let stats = service
                .download_all(language, domain.as_deref(), concurrency)
                .await?;
            if json {
                return print_json(&stats);
            }
            print_download(&stats);
        }
        Command::Update {
            language,
            domain,
            force,
            concurrency,
        } => {
            let stats = service
                .update_cache(language, domain.as_deref(), force, concurrency)
                .await?;
            if json {
                return print_json(&stats);
            }
            print_download(&stats);
        }
        Command::Coverage { domain } => {
            let coverage = service.get_cache_coverage(domain.as_deref()).await?;
            if json {
                return print_json(&coverage);
            }
            let rows: Vec<CoverageRow> = coverage
                .domains
                .iter()
                .map(|d| CoverageRow {
                    domain: d.domain.clone(),
                    total: d.total,
                    with_detail: d.with_detail,
                    percent: format!("{:.1}%", d.coverage_percent),
                })
                .collect();
            if !rows.is_empty() {
                println!("{}", render(&rows));
            }
            println!(
                "Coverage: {}/{} ({:.1}%), {} missing ({} not cached), ~{:.0}s to fetch",
                coverage.with_detail,
                coverage.total_known,
                coverage.coverage_percent,
                coverage.missing,
                coverage.not_cached,
                coverage.estimated_fetch_time
            );
        }
        Command::Stats => {
            let stats = service.get_cache_stats().await?;
            if json {
                return print_json(&stats);
            }
            println!("Source:       {}", stats.source);
            if !stats.cache_enabled {
                println!("Cache:        disabled");
                return Ok(());
            }
            println!(
                "Location:     {}",
                stats.location.as_deref().unwrap_or("-")
            );
            match &stats.release {
                Some(release) => println!("Release:      {}", release),
                None => println!("Release:      -"),
            }
            match stats.last_updated {
                Some(at) => println!("Last updated: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
                None => println!("Last updated: never"),
            }
            println!(
                "Objects:      {} ({} with detail)",
                stats.object_count, stats.with_detail
            );
            println!("Fresh:        {}", if stats.is_fresh { "yes" } else { "no" });
        }
        Command::Clear => {
            let removed = service.clear_cache().await?;
            if json {
                return print_json(&serde_json::json!({ "removed": removed }));
            }
            println!("Removed {} cached objects", removed);
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render<T: Tabled>(rows: &[T]) -> String {
    Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string()
}

fn completeness_label(completeness: Completeness) -> &'static str {
    match completeness {
        Completeness::Summary => "summary",
        Completeness::Detail => "detail",
    }
}

/// Char-based, so umlauts never split
fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", head)
}

#[derive(Tabled)]
struct ObjectRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Domain")]
    domain: String,
    #[tabled(rename = "Cached")]
    completeness: &'static str,
}

impl From<&ObjectItem> for ObjectRow {
    fn from(item: &ObjectItem) -> Self {
        Self {
            id: item.id.clone(),
            name: truncate(&item.name, 50),
            domain: item.domain.clone(),
            completeness: completeness_label(item.completeness),
        }
    }
}

#[derive(Tabled)]
struct DomainRow {
    #[tabled(rename = "Domain")]
    domain: String,
    #[tabled(rename = "Objects")]
    count: usize,
}

#[derive(Tabled)]
struct CoverageRow {
    #[tabled(rename = "Domain")]
    domain: String,
    #[tabled(rename = "Objects")]
    total: usize,
    #[tabled(rename = "With detail")]
    with_detail: usize,
    #[tabled(rename = "Coverage")]
    percent: String,
}

#[derive(Tabled)]
struct HitRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Match")]
    value: String,
    #[tabled(rename = "Property set")]
    property_set: String,
    #[tabled(rename = "Hits")]
    match_count: usize,
}

#[derive(Tabled)]
struct PropertyRow {
    #[tabled(rename = "Property set")]
    property_set: String,
    #[tabled(rename = "Property")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Unit")]
    unit: String,
}

fn print_listing(listing: &Listing) {
    if let (Some(groups), Some(counts)) = (&listing.groups, &listing.group_counts) {
        for (bucket, members) in groups {
            println!("{} ({})", bucket, counts.get(bucket).copied().unwrap_or(0));
            let rows: Vec<ObjectRow> = members.iter().map(ObjectRow::from).collect();
            println!("{}", render(&rows));
        }
        println!("{} objects in {} groups", listing.total, groups.len());
        if listing.backfilled > 0 {
            println!("Fetched detail for {} objects", listing.backfilled);
        }
        if !listing.backfill_failed.is_empty() {
            eprintln!(
                "Detail unavailable for {} objects: {}",
                listing.backfill_failed.len(),
                listing.backfill_failed.join(", ")
            );
        }
        return;
    }

    if listing.items.is_empty() {
        println!("No objects found");
        return;
    }
    let rows: Vec<ObjectRow> = listing.items.iter().map(ObjectRow::from).collect();
    println!("{}", render(&rows));
    println!(
        "Showing {}-{} of {}",
        listing.offset + 1,
        listing.offset + listing.count,
        listing.total
    );
}

fn print_object(object: &CatalogObject, from_cache: bool) {
    println!("{}", object);
    println!("Domain:      {}", object.domain);
    if let Some(group) = &object.object_group {
        println!("Group:       {}", group);
    }
    if let Some(description) = &object.description {
        println!("Description: {}", description);
    }
    if !object.classifications.is_empty() {
        println!("Classes:     {}", object.classifications.join(", "));
    }
    println!(
        "Source:      {}",
        if from_cache { "cache" } else { "remote" }
    );

    let rows: Vec<PropertyRow> = object
        .property_sets
        .iter()
        .flat_map(|set| {
            set.properties.iter().map(move |p| PropertyRow {
                property_set: set.name.clone(),
                name: p.name.clone(),
                kind: p.format.kind.clone(),
                unit: p.unit.clone().unwrap_or_default(),
            })
        })
        .collect();
    if !rows.is_empty() {
        println!("{}", render(&rows));
    }
}

fn print_search(results: &SearchResults) {
    if results.items.is_empty() {
        println!("No matches");
    } else {
        let rows: Vec<HitRow> = results
            .items
            .iter()
            .map(|hit| HitRow {
                id: hit.id.clone(),
                name: truncate(&hit.name, 40),
                value: truncate(&hit.value, 50),
                property_set: hit.property_set.clone().unwrap_or_default(),
                match_count: hit.match_count,
            })
            .collect();
        println!("{}", render(&rows));
        println!("Showing {} of {} matches", results.count, results.total);
    }
    if results.backfilled > 0 {
        println!("Fetched detail for {} objects", results.backfilled);
    }
    if !results.backfill_failed.is_empty() {
        eprintln!(
            "Detail unavailable for {} objects: {}",
            results.backfill_failed.len(),
            results.backfill_failed.join(", ")
        );
    }
}

fn print_download(stats: &DownloadStats) {
    println!(
        "Fetched {}/{} objects ({} skipped, {} failed) in {:.1}s",
        stats.succeeded,
        stats.attempted,
        stats.skipped,
        stats.failed,
        stats.elapsed.as_secs_f64()
    );
    if !stats.failed_ids.is_empty() {
        eprintln!("Failed: {}", stats.failed_ids.join(", "));
    }
}
