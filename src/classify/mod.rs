// src/classify/mod.rs
// Classification/enrichment engine: feeds unprocessed postings to the AI
// adapter under a fixed inter-call delay. Per-posting failures are counted
// and sampled, never propagated; the batch always finishes.

pub mod ai_adapter;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::store::Storage;
use ai_adapter::DynEnrichClient;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("classify_processed_total", "Postings sent for enrichment.");
        describe_counter!("classify_success_total", "Postings enriched successfully.");
        describe_counter!("classify_errors_total", "Per-posting enrichment failures.");
    });
}

#[derive(Debug, Clone, Copy)]
pub struct ClassifyConfig {
    /// Fixed inter-call delay throttling the AI service.
    pub delay_ms: u64,
    /// Description text is truncated to this many chars before the call.
    pub max_input_chars: usize,
    /// Default batch size when the caller does not pass a limit.
    pub default_limit: usize,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            delay_ms: 500,
            max_input_chars: 6_000,
            default_limit: 25,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassifyFilter {
    pub job_id: Option<String>,
    pub limit: Option<usize>,
}

/// Batch result. Errors are truncated to a small sample so the response
/// size stays bounded no matter how badly a run goes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClassifyOutcome {
    pub processed: u64,
    #[serde(rename = "successCount")]
    pub success_count: u64,
    #[serde(rename = "errorCount")]
    pub error_count: u64,
    pub errors: Vec<String>,
}

const ERROR_SAMPLE_CAP: usize = 5;

pub struct ClassifyEngine {
    store: Arc<dyn Storage>,
    client: DynEnrichClient,
    cfg: ClassifyConfig,
}

impl ClassifyEngine {
    pub fn new(store: Arc<dyn Storage>, client: DynEnrichClient, cfg: ClassifyConfig) -> Self {
        Self { store, client, cfg }
    }

    pub fn client_enabled(&self) -> bool {
        self.client.enabled()
    }

    pub async fn run(&self, filter: ClassifyFilter) -> ClassifyOutcome {
        ensure_metrics_described();

        let jobs = if let Some(id) = &filter.job_id {
            self.store.get_job(id).into_iter().collect()
        } else {
            self.store
                .jobs_for_enrichment(filter.limit.unwrap_or(self.cfg.default_limit))
        };

        let mut outcome = ClassifyOutcome::default();
        for (i, mut job) in jobs.into_iter().enumerate() {
            if i > 0 && self.cfg.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.cfg.delay_ms)).await;
            }

            let input = build_input(&job.title, &job.company, &job.description, self.cfg.max_input_chars);
            outcome.processed += 1;
            counter!("classify_processed_total").increment(1);

            match self.client.enrich(&input).await {
                Ok(enrichment) => {
                    let now = Utc::now();
                    job.enrichment = Some(enrichment);
                    job.enriched_at = Some(now);
                    self.store.update_job(job);
                    outcome.success_count += 1;
                    counter!("classify_success_total").increment(1);
                }
                Err(e) => {
                    // Item-level failure: count it, sample it, leave the
                    // posting untouched for a future run.
                    outcome.error_count += 1;
                    counter!("classify_errors_total").increment(1);
                    warn!(error = ?e, job = %job.id, "enrichment failed");
                    if outcome.errors.len() < ERROR_SAMPLE_CAP {
                        outcome.errors.push(format!("{}: {e:#}", job.id));
                    }
                }
            }
        }

        info!(
            processed = outcome.processed,
            ok = outcome.success_count,
            failed = outcome.error_count,
            provider = self.client.provider_name(),
            "classification pass complete"
        );
        outcome
    }
}

/// The prompt input: a short header plus the truncated description. Title
/// and company ground the model when the description is thin.
fn build_input(title: &str, company: &str, description: &str, max_chars: usize) -> String {
    let body: String = description.chars().take(max_chars).collect();
    format!("Job: {title}\nCompany: {company}\n\n{body}")
}
