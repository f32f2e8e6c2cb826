// src/ingest/providers/mod.rs
pub mod ats;
pub mod jobfeed;

use crate::ingest::types::{FetcherFactory, JobFetcher};
use crate::model::{JobSource, SourceKind};

/// Production wiring: pick a fetcher by source kind, pointed at the source's
/// configured endpoint. Tests replace the whole factory instead.
pub struct HttpFetcherFactory;

impl FetcherFactory for HttpFetcherFactory {
    fn fetcher_for(&self, source: &JobSource) -> Box<dyn JobFetcher> {
        match source.kind {
            SourceKind::Api | SourceKind::Ats => Box::new(ats::JsonApiProvider::from_url(
                &source.name,
                &source.endpoint,
            )),
            SourceKind::SearchScrape => Box::new(jobfeed::JobFeedProvider::from_url(
                &source.name,
                &source.endpoint,
            )),
        }
    }
}
