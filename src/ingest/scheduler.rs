// src/ingest/scheduler.rs
// Optional in-process ticker. Production deployments drive the engines
// through the HTTP surface from an external scheduler; this exists so a
// single-binary deployment still polls without one.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use tokio::task::JoinHandle;
use tracing::info;

use crate::freshness::{self, FreshnessConfig};
use crate::ingest::{IngestEngine, IngestFilter};
use crate::notify::{AlertEvent, NotifierMux};
use crate::store::Storage;

#[derive(Clone, Copy, Debug)]
pub struct PipelineSchedulerCfg {
    pub interval_secs: u64,
}

/// Spawn the polling loop: each tick ingests whatever sources are due, then
/// checks the freshness SLA and raises a (cooldown-gated) alert on breach.
pub fn spawn_pipeline_scheduler(
    cfg: PipelineSchedulerCfg,
    engine: Arc<IngestEngine>,
    store: Arc<dyn Storage>,
    alerts: Arc<NotifierMux>,
    fresh_cfg: FreshnessConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(cfg.interval_secs));
        loop {
            ticker.tick().await;
            let outcome = engine.run(IngestFilter::default()).await;
            counter!("ingest_scheduler_ticks_total").increment(1);
            info!(
                target: "scheduler",
                sources = outcome.sources_processed,
                new = outcome.total_new,
                updated = outcome.total_updated,
                deduplicated = outcome.total_deduplicated,
                "scheduled ingest tick"
            );

            let now = Utc::now();
            let report = freshness::compute(&*store, fresh_cfg, now);
            if !report.healthy {
                alerts
                    .notify(
                        &AlertEvent::SlaBreach {
                            refreshed_ratio: report.sources_refreshed_ratio,
                            ts: now,
                        },
                        now,
                    )
                    .await;
            }
        }
    })
}
