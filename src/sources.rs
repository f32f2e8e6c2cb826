// src/sources.rs
// Source registry: per-source health/reliability bookkeeping over the store.
// All operations are single-row read/writes; nothing here blocks.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::model::{JobSource, SourceStatus};
use crate::store::Storage;

/// Counts attributed to one ingestion attempt against one source.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutcomeStats {
    pub fetched: u64,
    pub new: u64,
    pub updated: u64,
    pub deduplicated: u64,
}

/// Health state change produced by `record_outcome`, surfaced so callers can
/// alert on it. `Disabled` never appears here: it is operator-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthTransition {
    BecameFailing,
    Recovered,
}

#[derive(Debug, Clone, Copy)]
pub struct HealthConfig {
    /// Consecutive failures before a source is demoted to `failing`.
    pub failing_threshold: u32,
    /// EWMA smoothing factor for the reliability score.
    pub reliability_alpha: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failing_threshold: 5,
            reliability_alpha: 0.2,
        }
    }
}

pub struct SourceRegistry {
    store: Arc<dyn Storage>,
    cfg: HealthConfig,
}

impl SourceRegistry {
    pub fn new(store: Arc<dyn Storage>, cfg: HealthConfig) -> Self {
        Self { store, cfg }
    }

    /// Sources due for polling at `now`: `active` with `next_poll_at <= now`,
    /// priority sources first, then longest-overdue first.
    pub fn list_due_sources(&self, now: DateTime<Utc>) -> Vec<JobSource> {
        let mut due: Vec<_> = self
            .store
            .list_sources()
            .into_iter()
            .filter(|s| s.is_due(now))
            .collect();
        due.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.next_poll_at.cmp(&b.next_poll_at))
        });
        due
    }

    /// Record the outcome of one poll. Recomputes the poll window, the
    /// consecutive-failure counter, and the EWMA reliability score; demotes
    /// to `failing` at the threshold and restores `active` on any success.
    pub fn record_outcome(
        &self,
        source_id: &str,
        success: bool,
        stats: OutcomeStats,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Option<HealthTransition> {
        let Some(mut src) = self.store.get_source(source_id) else {
            warn!(source = source_id, "record_outcome for unknown source");
            return None;
        };

        src.last_poll_at = Some(now);
        src.next_poll_at = now + Duration::seconds(src.poll_interval_secs as i64);

        let alpha = self.cfg.reliability_alpha.clamp(0.0, 1.0);
        let outcome = if success { 1.0 } else { 0.0 };
        src.reliability = (alpha * outcome + (1.0 - alpha) * src.reliability).clamp(0.0, 1.0);

        let mut transition = None;
        if success {
            src.consecutive_failures = 0;
            src.last_success_at = Some(now);
            src.last_error = None;
            src.total_ingested += stats.new;
            src.active_jobs += stats.new;
            if src.status == SourceStatus::Failing {
                src.status = SourceStatus::Active;
                transition = Some(HealthTransition::Recovered);
                info!(source = source_id, "source recovered, restored to active");
            }
        } else {
            src.consecutive_failures = src.consecutive_failures.saturating_add(1);
            src.last_failure_at = Some(now);
            src.last_error = error;
            if src.status == SourceStatus::Active
                && src.consecutive_failures >= self.cfg.failing_threshold
            {
                src.status = SourceStatus::Failing;
                transition = Some(HealthTransition::BecameFailing);
                warn!(
                    source = source_id,
                    failures = src.consecutive_failures,
                    "source demoted to failing"
                );
            }
        }

        self.store.upsert_source(src);
        transition
    }

    /// Explicit operator action. No side effects beyond the status write;
    /// this is the only path to `disabled`.
    pub fn set_status(&self, source_id: &str, status: SourceStatus) -> bool {
        let Some(mut src) = self.store.get_source(source_id) else {
            return false;
        };
        src.status = status;
        if status == SourceStatus::Active {
            src.consecutive_failures = 0;
        }
        self.store.upsert_source(src);
        true
    }
}
