// src/config.rs
// Pipeline configuration. Thresholds and windows live in config/pipeline.toml
// (all optional, compiled-in defaults); secrets come from the environment.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::classify::ClassifyConfig;
use crate::freshness::FreshnessConfig;
use crate::model::{JobSource, SourceKind};
use crate::sources::HealthConfig;
use crate::store::Storage;
use crate::verify::VerifyConfig;

pub const ENV_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";
pub const ENV_SOURCES_PATH: &str = "PIPELINE_SOURCES_PATH";
const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub bind_addr: String,

    // Source health
    pub failing_threshold: u32,
    pub reliability_alpha: f64,

    // Verification
    pub stale_after_secs: i64,
    pub expire_after_misses: u32,
    pub content_change_threshold: f64,
    pub verify_default_limit: usize,

    // Classification
    pub classify_delay_ms: u64,
    pub classify_max_input_chars: usize,
    pub classify_default_limit: usize,

    // Logo resolution
    pub logo_backfill_delay_ms: u64,
    pub logo_default_batch: usize,

    // Freshness SLA
    pub refresh_window_secs: i64,
    pub healthy_refresh_ratio: f64,

    // In-process scheduler
    pub scheduler_enabled: bool,
    pub scheduler_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            failing_threshold: 5,
            reliability_alpha: 0.2,
            stale_after_secs: 7_200,
            expire_after_misses: 3,
            content_change_threshold: 0.9,
            verify_default_limit: 100,
            classify_delay_ms: 500,
            classify_max_input_chars: 6_000,
            classify_default_limit: 25,
            logo_backfill_delay_ms: 50,
            logo_default_batch: 50,
            refresh_window_secs: 7_200,
            healthy_refresh_ratio: 0.8,
            scheduler_enabled: false,
            scheduler_interval_secs: 900,
        }
    }
}

impl PipelineConfig {
    /// Load using env var + fallbacks:
    /// 1) $PIPELINE_CONFIG_PATH
    /// 2) config/pipeline.toml
    /// 3) compiled-in defaults
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("PIPELINE_CONFIG_PATH points to non-existent path"));
        }
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        Ok(Self::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        toml::from_str(&content).context("parsing pipeline config toml")
    }

    // Per-engine views, so engines never see the whole config.

    pub fn health(&self) -> HealthConfig {
        HealthConfig {
            failing_threshold: self.failing_threshold,
            reliability_alpha: self.reliability_alpha,
        }
    }

    pub fn verify(&self) -> VerifyConfig {
        VerifyConfig {
            stale_after_secs: self.stale_after_secs,
            expire_after_misses: self.expire_after_misses,
            content_change_threshold: self.content_change_threshold,
            default_limit: self.verify_default_limit,
        }
    }

    pub fn classify(&self) -> ClassifyConfig {
        ClassifyConfig {
            delay_ms: self.classify_delay_ms,
            max_input_chars: self.classify_max_input_chars,
            default_limit: self.classify_default_limit,
        }
    }

    pub fn freshness(&self) -> FreshnessConfig {
        FreshnessConfig {
            refresh_window_secs: self.refresh_window_secs,
            healthy_ratio: self.healthy_refresh_ratio,
        }
    }
}

// ---------------------------------------------------------------------------
// Source seeding
// ---------------------------------------------------------------------------

/// One configured source. Sources are created by configuration, mutated by
/// every ingestion run against them, never deleted by the pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSeed {
    pub id: String,
    pub name: String,
    pub kind: SourceKind,
    pub endpoint: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub priority: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_poll_interval() -> u64 {
    3_600
}

/// Load the source list from an explicit path. Supports TOML or JSON.
pub fn load_sources_from(path: &Path) -> Result<Vec<SourceSeed>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_sources(&content, ext.as_str())
}

/// Load sources using env var + fallbacks:
/// 1) $PIPELINE_SOURCES_PATH
/// 2) config/sources.toml
/// 3) config/sources.json
pub fn load_sources_default() -> Result<Vec<SourceSeed>> {
    if let Ok(p) = std::env::var(ENV_SOURCES_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_sources_from(&pb);
        }
        return Err(anyhow!("PIPELINE_SOURCES_PATH points to non-existent path"));
    }
    let toml_p = PathBuf::from("config/sources.toml");
    if toml_p.exists() {
        return load_sources_from(&toml_p);
    }
    let json_p = PathBuf::from("config/sources.json");
    if json_p.exists() {
        return load_sources_from(&json_p);
    }
    Ok(Vec::new())
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<Vec<SourceSeed>> {
    #[derive(Deserialize)]
    struct TomlSources {
        sources: Vec<SourceSeed>,
    }

    if hint_ext == "toml" || s.contains("[[sources]]") {
        if let Ok(v) = toml::from_str::<TomlSources>(s) {
            return Ok(v.sources);
        }
    }
    if let Ok(v) = serde_json::from_str::<Vec<SourceSeed>>(s) {
        return Ok(v);
    }
    if hint_ext != "toml" {
        if let Ok(v) = toml::from_str::<TomlSources>(s) {
            return Ok(v.sources);
        }
    }
    Err(anyhow!("unsupported sources format"))
}

/// Write configured sources into the store, preserving live state on
/// re-seed: health counters and poll bookkeeping survive a restart, only
/// the configured attributes are refreshed.
pub fn seed_sources(store: &dyn Storage, seeds: Vec<SourceSeed>, now: DateTime<Utc>) {
    for seed in seeds {
        let mut src = store
            .get_source(&seed.id)
            .unwrap_or_else(|| JobSource::new(&seed.id, &seed.name, seed.kind, &seed.endpoint, now));
        src.name = seed.name;
        src.kind = seed.kind;
        src.endpoint = seed.endpoint;
        src.poll_interval_secs = seed.poll_interval_secs;
        src.priority = seed.priority;
        src.tags = seed.tags;
        store.upsert_source(src);
    }
}
