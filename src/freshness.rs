// src/freshness.rs
// Freshness/SLA monitor: pure read aggregation over the store, no writes.
// Consumed by the operations dashboard and mirrored into Prometheus gauges.

use chrono::{DateTime, Utc};
use metrics::{describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::model::SourceStatus;
use crate::store::{StatusCounts, Storage};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_gauge!(
            "freshness_sources_refreshed_ratio",
            "Fraction of active sources refreshed inside the window."
        );
        describe_gauge!("freshness_p50_age_hours", "Median age of active jobs.");
        describe_gauge!("freshness_p90_age_hours", "P90 age of active jobs.");
        describe_gauge!("freshness_active_jobs", "Jobs currently unverified or verified_active.");
    });
}

#[derive(Debug, Clone, Copy)]
pub struct FreshnessConfig {
    /// A source counts as refreshed when `last_success_at` is inside this window.
    pub refresh_window_secs: i64,
    /// Healthy threshold on the refreshed-sources ratio.
    pub healthy_ratio: f64,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            refresh_window_secs: 7_200,
            healthy_ratio: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FreshnessReport {
    pub generated_at: DateTime<Utc>,
    pub sources_total: u64,
    pub sources_active: u64,
    pub sources_refreshed: u64,
    pub sources_refreshed_ratio: f64,
    pub p50_age_hours: f64,
    pub p90_age_hours: f64,
    pub jobs: StatusCounts,
    pub healthy: bool,
}

/// Nearest-rank percentile over an ascending-sorted slice. `p` in (0, 100].
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((p / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

pub fn compute(store: &dyn Storage, cfg: FreshnessConfig, now: DateTime<Utc>) -> FreshnessReport {
    ensure_metrics_described();

    let sources = store.list_sources();
    let active: Vec<_> = sources
        .iter()
        .filter(|s| s.status == SourceStatus::Active)
        .collect();
    let window = chrono::Duration::seconds(cfg.refresh_window_secs);
    let refreshed = active
        .iter()
        .filter(|s| s.last_success_at.map_or(false, |t| now - t <= window))
        .count() as u64;

    // No active sources is vacuously refreshed, not a breach.
    let ratio = if active.is_empty() {
        1.0
    } else {
        refreshed as f64 / active.len() as f64
    };

    let mut ages: Vec<f64> = store
        .active_posted_times()
        .into_iter()
        .map(|t| (now - t).num_minutes().max(0) as f64 / 60.0)
        .collect();
    ages.sort_by(|a, b| a.partial_cmp(b).expect("ages are finite"));

    let p50 = percentile(&ages, 50.0);
    let p90 = percentile(&ages, 90.0);
    let jobs = store.count_jobs_by_status();

    gauge!("freshness_sources_refreshed_ratio").set(ratio);
    gauge!("freshness_p50_age_hours").set(p50);
    gauge!("freshness_p90_age_hours").set(p90);
    gauge!("freshness_active_jobs").set((jobs.unverified + jobs.verified_active) as f64);

    FreshnessReport {
        generated_at: now,
        sources_total: sources.len() as u64,
        sources_active: active.len() as u64,
        sources_refreshed: refreshed,
        sources_refreshed_ratio: ratio,
        p50_age_hours: p50,
        p90_age_hours: p90,
        jobs,
        healthy: ratio >= cfg.healthy_ratio,
    }
}
