// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::model::{JobSource, WorkType};

/// One posting as normalized out of a provider, before dedup/merge.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RawPosting {
    /// Source-native identifier when the provider has one (API/ATS sources).
    /// Scraped sources leave this `None`; dedup falls back to a content hash.
    pub native_id: Option<String>,
    pub title: String,
    pub company: String,
    pub location: String,
    pub work_type: Option<WorkType>,
    pub salary_min: Option<u32>,
    pub salary_max: Option<u32>,
    pub description: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    pub apply_url: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    /// Logo URL handed to us by the ATS, if any. Verified before use.
    pub ats_logo_url: Option<String>,
}

#[async_trait::async_trait]
pub trait JobFetcher: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<RawPosting>>;
    fn name(&self) -> &str;
}

/// Maps a registered source to the fetcher that can poll it. Tests inject
/// canned or failing fetchers through this seam.
pub trait FetcherFactory: Send + Sync {
    fn fetcher_for(&self, source: &JobSource) -> Box<dyn JobFetcher>;
}
