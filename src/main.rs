//! Job Intelligence Pipeline: Binary Entrypoint
//! Boots the Axum HTTP server, wiring engines, shared state, and middleware.
//!
//! The relational store and the auth service are external collaborators;
//! this binary wires the in-memory store and the env-token session seam,
//! which is all a single-instance deployment needs.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jobpulse::api::{self, AppState, EnvSessionValidator};
use jobpulse::classify::{ai_adapter, ClassifyEngine};
use jobpulse::config::{self, PipelineConfig};
use jobpulse::ingest::providers::HttpFetcherFactory;
use jobpulse::ingest::scheduler::{spawn_pipeline_scheduler, PipelineSchedulerCfg};
use jobpulse::ingest::IngestEngine;
use jobpulse::logo::domains::CompanyDomains;
use jobpulse::logo::{HttpProbe, LogoResolver};
use jobpulse::metrics::Metrics;
use jobpulse::notify::NotifierMux;
use jobpulse::sources::SourceRegistry;
use jobpulse::store::{LogoCache, MemStorage, MemoryLogoCache, Storage};
use jobpulse::verify::{HttpLivenessProbe, VerifyEngine};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jobpulse=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = PipelineConfig::load_default()?;
    let metrics = Metrics::init(cfg.refresh_window_secs);

    let store: Arc<dyn Storage> = Arc::new(MemStorage::new());
    let seeds = config::load_sources_default()?;
    config::seed_sources(store.as_ref(), seeds, Utc::now());

    let registry = Arc::new(SourceRegistry::new(store.clone(), cfg.health()));
    let alerts = Arc::new(NotifierMux::from_env());

    let logo_cache: Arc<dyn LogoCache> = Arc::new(MemoryLogoCache::new());
    let logos = Arc::new(LogoResolver::new(
        Arc::new(HttpProbe::new()),
        logo_cache,
        CompanyDomains::load_from_file("config/company_domains.json"),
    ));

    let ingest = Arc::new(IngestEngine::new(
        store.clone(),
        registry.clone(),
        Arc::new(HttpFetcherFactory),
        logos.clone(),
        alerts.clone(),
    ));
    let verify = Arc::new(VerifyEngine::new(
        store.clone(),
        Arc::new(HttpLivenessProbe::new()),
        cfg.verify(),
    ));
    let ai = ai_adapter::build_client_from_config(&ai_adapter::load_ai_config());
    let classify = Arc::new(ClassifyEngine::new(store.clone(), ai, cfg.classify()));

    if cfg.scheduler_enabled {
        spawn_pipeline_scheduler(
            PipelineSchedulerCfg {
                interval_secs: cfg.scheduler_interval_secs,
            },
            ingest.clone(),
            store.clone(),
            alerts.clone(),
            cfg.freshness(),
        );
    }

    let bind_addr = cfg.bind_addr.clone();
    let state = AppState {
        store,
        registry,
        ingest,
        verify,
        classify,
        logos,
        sessions: Arc::new(EnvSessionValidator::from_env()),
        cron_secret: std::env::var("CRON_SECRET").ok(),
        cfg,
    };

    let app = api::router(state).merge(metrics.router());

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "jobpulse listening");
    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
