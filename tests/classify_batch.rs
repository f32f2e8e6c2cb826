// tests/classify_batch.rs
//
// Batch isolation in the enrichment engine: one failing item is counted and
// sampled, the rest of the batch is persisted, and the error sample stays
// bounded no matter how many items fail.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{Duration, Utc};

use jobpulse::classify::ai_adapter::EnrichClient;
use jobpulse::classify::{ClassifyConfig, ClassifyEngine, ClassifyFilter};
use jobpulse::ingest::build_job;
use jobpulse::ingest::types::RawPosting;
use jobpulse::model::{Enrichment, JobSource, SourceKind};
use jobpulse::store::{MemStorage, Storage};

/// Fails any input containing the marker; succeeds otherwise.
struct FlakyClient {
    fail_marker: &'static str,
}

#[async_trait::async_trait]
impl EnrichClient for FlakyClient {
    async fn enrich(&self, input: &str) -> Result<Enrichment> {
        if input.contains(self.fail_marker) {
            return Err(anyhow!("upstream rate limited"));
        }
        Ok(Enrichment {
            summary: "Builds and operates backend services.".to_string(),
            responsibilities: vec!["Own services end to end".to_string()],
            qualifications: vec!["Rust".to_string()],
            tech_stack: vec!["rust".to_string()],
            benefits: vec![],
            visa_info: None,
        })
    }
    fn provider_name(&self) -> &'static str {
        "flaky"
    }
}

fn seed_jobs(store: &dyn Storage, descriptions: &[&str]) -> Vec<String> {
    let base = Utc::now() - Duration::hours(1);
    let source = JobSource::new("src", "Src", SourceKind::Ats, "https://example.invalid", base);
    store.upsert_source(source.clone());

    descriptions
        .iter()
        .enumerate()
        .map(|(i, desc)| {
            // Staggered first_seen_at keeps the selection order deterministic.
            let seen = base + Duration::seconds(i as i64);
            let raw = RawPosting {
                native_id: Some(format!("{i}")),
                title: format!("Role {i}"),
                company: "Acme".to_string(),
                location: "Remote".to_string(),
                work_type: None,
                salary_min: None,
                salary_max: None,
                description: desc.to_string(),
                requirements: vec![],
                apply_url: None,
                posted_at: None,
                ats_logo_url: None,
            };
            let job = build_job(&source, raw, seen);
            let id = job.id.clone();
            store.upsert_job(job, seen);
            id
        })
        .collect()
}

fn engine(store: Arc<dyn Storage>, client: FlakyClient) -> ClassifyEngine {
    ClassifyEngine::new(
        store,
        Arc::new(client),
        ClassifyConfig {
            delay_ms: 0,
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn item_three_of_five_fails_alone() {
    let store: Arc<dyn Storage> = Arc::new(MemStorage::new());
    let ids = seed_jobs(
        store.as_ref(),
        &[
            "posting one",
            "posting two",
            "posting three POISON",
            "posting four",
            "posting five",
        ],
    );

    let outcome = engine(store.clone(), FlakyClient { fail_marker: "POISON" })
        .run(ClassifyFilter::default())
        .await;

    assert_eq!(outcome.processed, 5);
    assert_eq!(outcome.success_count, 4);
    assert_eq!(outcome.error_count, 1);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].contains(&ids[2]));

    // Items 1, 2, 4, 5 are persisted; the poisoned one is left for retry.
    for (i, id) in ids.iter().enumerate() {
        let job = store.get_job(id).unwrap();
        if i == 2 {
            assert!(job.enrichment.is_none());
            assert!(job.enriched_at.is_none());
        } else {
            assert!(job.enrichment.is_some(), "job {i} must be enriched");
            assert!(job.enriched_at.is_some());
        }
    }
}

#[tokio::test]
async fn error_sample_is_bounded() {
    let store: Arc<dyn Storage> = Arc::new(MemStorage::new());
    let descriptions: Vec<String> = (0..8).map(|i| format!("posting {i} POISON")).collect();
    let refs: Vec<&str> = descriptions.iter().map(|s| s.as_str()).collect();
    seed_jobs(store.as_ref(), &refs);

    let outcome = engine(store.clone(), FlakyClient { fail_marker: "POISON" })
        .run(ClassifyFilter::default())
        .await;

    assert_eq!(outcome.processed, 8);
    assert_eq!(outcome.error_count, 8);
    assert_eq!(outcome.errors.len(), 5, "sample capped at 5");
}

#[tokio::test]
async fn enriched_jobs_are_not_reselected() {
    let store: Arc<dyn Storage> = Arc::new(MemStorage::new());
    seed_jobs(store.as_ref(), &["posting one", "posting two"]);
    let eng = engine(store.clone(), FlakyClient { fail_marker: "POISON" });

    let first = eng.run(ClassifyFilter::default()).await;
    assert_eq!(first.success_count, 2);

    let second = eng.run(ClassifyFilter::default()).await;
    assert_eq!(second.processed, 0, "nothing left to enrich");
}

#[tokio::test]
async fn explicit_job_id_targets_one_posting() {
    let store: Arc<dyn Storage> = Arc::new(MemStorage::new());
    let ids = seed_jobs(store.as_ref(), &["posting one", "posting two"]);

    let outcome = engine(store.clone(), FlakyClient { fail_marker: "POISON" })
        .run(ClassifyFilter {
            job_id: Some(ids[1].clone()),
            limit: None,
        })
        .await;

    assert_eq!(outcome.processed, 1);
    assert!(store.get_job(&ids[1]).unwrap().enrichment.is_some());
    assert!(store.get_job(&ids[0]).unwrap().enrichment.is_none());
}
