//! SBB FDK HTTP source
//!
//! `GET {base}/objects?language=xx` for the summary listing and
//! `GET {base}/objects/{id}?language=xx` for single-object detail.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use super::wire::{WireDetail, WireListing};
use super::{RemoteSource, SummaryListing};
use crate::config::SourceConfig;
use crate::error::SourceError;
use crate::model::{CatalogObject, Language};

/// SBB FDK API backend
pub struct SbbSource {
    client: reqwest::Client,
    base_url: String,
}

impl SbbSource {
    pub fn new(config: &SourceConfig) -> anyhow::Result<Self> {
        use anyhow::Context;

        let client = reqwest::Client::builder()
            .user_agent(concat!("fdk/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        language: Language,
        missing_id: Option<&str>,
    ) -> Result<T, SourceError> {
        debug!("GET {} (language={})", url, language);

        let response = self
            .client
            .get(url)
            .query(&[("language", language.code())])
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(url, status, missing_id));
        }

        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                transport_error(url, e)
            } else {
                SourceError::InvalidResponse {
                    message: format!("{url}: {e}"),
                }
            }
        })
    }
}

fn transport_error(url: &str, err: reqwest::Error) -> SourceError {
    if err.is_timeout() {
        SourceError::Timeout {
            message: format!("{url}: {err}"),
        }
    } else {
        SourceError::Unavailable {
            message: format!("{url}: {err}"),
        }
    }
}

fn status_error(url: &str, status: StatusCode, missing_id: Option<&str>) -> SourceError {
    if status == StatusCode::NOT_FOUND {
        return SourceError::NotFound {
            id: missing_id.unwrap_or(url).to_string(),
        };
    }
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        warn!("FDK API answered HTTP {} for {}", status, url);
        return SourceError::Unavailable {
            message: format!("HTTP {status} from {url}"),
        };
    }
    SourceError::InvalidResponse {
        message: format!("HTTP {status} from {url}"),
    }
}

#[async_trait]
impl RemoteSource for SbbSource {
    async fn fetch_all_summaries(&self, language: Language) -> Result<SummaryListing, SourceError> {
        let url = format!("{}/objects", self.base_url);
        let listing: WireListing = self.get_json(&url, language, None).await?;
        let (objects, total_count, release) = listing.into_parts();

        debug!(
            "Fetched {} summaries from FDK API (release: {:?})",
            objects.len(),
            release.as_ref().map(|r| r.version_id.as_str())
        );

        Ok(SummaryListing {
            objects,
            total_count,
            release,
        })
    }

    async fn fetch_detail(&self, id: &str, language: Language) -> Result<CatalogObject, SourceError> {
        if id.is_empty() || id.contains('/') {
            return Err(SourceError::NotFound { id: id.to_string() });
        }
        let url = format!("{}/objects/{}", self.base_url, id);
        let detail: WireDetail = self.get_json(&url, language, Some(id)).await?;
        Ok(detail.into())
    }

    fn name(&self) -> &'static str {
        "sbb"
    }
}
