//! Cached access to an FDK object catalog
//!
//! - [`source`]: the remote catalog port and the SBB HTTP implementation
//! - [`store`]: persistent object store with summary/detail completeness
//! - [`coordinator`]: freshness, de-duplicated fetches and bulk backfill
//! - [`search`]: field-scoped recursive search with transparent backfill
//! - [`listing`]: filtering, sorting, grouping and pagination
//! - [`service`]: the exposed operations

pub mod config;
pub mod coordinator;
pub mod error;
pub mod listing;
pub mod model;
pub mod search;
pub mod service;
pub mod source;
pub mod store;

pub use config::FdkConfig;
pub use coordinator::{CacheCoordinator, DownloadStats};
pub use error::{CatalogError, Result, SourceError, StorageError};
pub use model::{CatalogObject, Completeness, Language};
pub use service::FdkService;
pub use store::CatalogStore;
