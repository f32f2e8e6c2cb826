// src/verify.rs
// Verification engine: re-checks previously ingested postings against their
// source. One failed re-check is a soft signal (stale); only sustained
// absence across consecutive passes hardens into expired. A transient
// network failure must not hide a job that is still open.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ingest::normalize_text;
use crate::model::VerificationStatus;
use crate::store::Storage;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("verify_checks_total", "Liveness checks performed.");
        describe_counter!("verify_active_total", "Checks confirming a posting reachable.");
        describe_counter!("verify_stale_total", "Postings marked stale.");
        describe_counter!("verify_expired_total", "Postings expired after sustained misses.");
        describe_counter!(
            "verify_content_changed_total",
            "Reachable postings whose content drifted from the stored copy."
        );
    });
}

/// Result of one liveness check on a posting's apply URL.
#[derive(Debug, Clone)]
pub enum ProbeOutcome {
    /// Reachable; `content` carries the page text when the probe re-scraped.
    Reachable { content: Option<String> },
    Unreachable,
}

#[async_trait::async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn check(&self, url: &str) -> ProbeOutcome;
}

/// HEAD-style reachability check. Cheap, no body; content diffing only
/// happens when a probe implementation chooses to return one.
pub struct HttpLivenessProbe {
    client: reqwest::Client,
}

impl HttpLivenessProbe {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent("jobpulse/0.1 (+verify)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self { client }
    }
}

impl Default for HttpLivenessProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LivenessProbe for HttpLivenessProbe {
    async fn check(&self, url: &str) -> ProbeOutcome {
        match self.client.head(url).send().await {
            Ok(resp) if resp.status().is_success() => ProbeOutcome::Reachable { content: None },
            Ok(resp) => {
                debug!(status = %resp.status(), url, "liveness check non-2xx");
                ProbeOutcome::Unreachable
            }
            Err(e) => {
                debug!(error = ?e, url, "liveness check failed");
                ProbeOutcome::Unreachable
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VerifyConfig {
    /// A posting unchecked and unseen for this long is due for re-check.
    pub stale_after_secs: i64,
    /// Consecutive failed checks before stale hardens into expired.
    pub expire_after_misses: u32,
    /// Similarity below this counts as changed content.
    pub content_change_threshold: f64,
    /// Default batch size when the caller does not pass a limit.
    pub default_limit: usize,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 7_200,
            expire_after_misses: 3,
            content_change_threshold: 0.9,
            default_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifyFilter {
    pub job_id: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct VerifyOutcome {
    pub verified: u64,
    pub expired: u64,
}

pub struct VerifyEngine {
    store: Arc<dyn Storage>,
    probe: Arc<dyn LivenessProbe>,
    cfg: VerifyConfig,
}

impl VerifyEngine {
    pub fn new(store: Arc<dyn Storage>, probe: Arc<dyn LivenessProbe>, cfg: VerifyConfig) -> Self {
        Self { store, probe, cfg }
    }

    /// One verification pass. Items are isolated: each posting's check stands
    /// alone and the loop never aborts mid-batch.
    pub async fn run(&self, filter: VerifyFilter) -> VerifyOutcome {
        ensure_metrics_described();
        let now = Utc::now();

        let jobs = if let Some(id) = &filter.job_id {
            self.store.get_job(id).into_iter().collect()
        } else {
            let cutoff = now - chrono::Duration::seconds(self.cfg.stale_after_secs);
            self.store
                .jobs_for_verification(cutoff, filter.limit.unwrap_or(self.cfg.default_limit))
        };

        let mut outcome = VerifyOutcome::default();
        for mut job in jobs {
            let Some(url) = job.apply_url.clone() else {
                // Nothing to probe; leave the posting for ingestion to re-see.
                continue;
            };

            counter!("verify_checks_total").increment(1);
            match self.probe.check(&url).await {
                ProbeOutcome::Reachable { content } => {
                    job.status = VerificationStatus::VerifiedActive;
                    job.verify_misses = 0;
                    if let Some(body) = content {
                        if self.content_changed(&job.description, &body) {
                            counter!("verify_content_changed_total").increment(1);
                            job.updated_at = now;
                        }
                    }
                    counter!("verify_active_total").increment(1);
                    outcome.verified += 1;
                }
                ProbeOutcome::Unreachable => {
                    job.verify_misses = job.verify_misses.saturating_add(1);
                    if job.verify_misses >= self.cfg.expire_after_misses {
                        job.status = VerificationStatus::Expired;
                        counter!("verify_expired_total").increment(1);
                        outcome.expired += 1;
                    } else {
                        job.status = VerificationStatus::Stale;
                        counter!("verify_stale_total").increment(1);
                    }
                }
            }
            // verified_at records the last check, pass or fail, so the
            // selection window paces re-checks for stale postings too.
            job.verified_at = Some(now);
            if job.status == VerificationStatus::VerifiedActive && job.logo_url.is_some() {
                job.logo_verified_at = Some(now);
            }

            let reliability = self
                .store
                .get_source(&job.source_id)
                .map(|s| s.reliability)
                .unwrap_or(1.0);
            job.compute_rank(now, reliability);
            self.store.update_job(job);
        }

        info!(
            verified = outcome.verified,
            expired = outcome.expired,
            "verification pass complete"
        );
        outcome
    }

    /// Diff a re-scraped page against the stored description. Both sides are
    /// normalized and truncated before the edit-distance comparison.
    fn content_changed(&self, stored: &str, fetched: &str) -> bool {
        let a: String = normalize_text(stored).chars().take(1_500).collect();
        let b: String = normalize_text(fetched).chars().take(1_500).collect();
        if a.is_empty() || b.is_empty() {
            return false;
        }
        strsim::normalized_levenshtein(&a, &b) < self.cfg.content_change_threshold
    }
}
