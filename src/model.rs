// src/model.rs
// Core data model for the pipeline: sources, jobs, run records, logo cache rows.
// Status/action fields are closed enums so illegal states are unrepresentable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of external system a source is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Api,
    Ats,
    SearchScrape,
}

/// Health status of a source. `Disabled` is operator-only; the pipeline
/// itself never goes past `Failing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Active,
    Paused,
    Failing,
    Disabled,
}

/// Staged job lifecycle: one failed re-check is a soft signal (`Stale`),
/// only sustained absence hardens into `Expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Unverified,
    VerifiedActive,
    Stale,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkType {
    Remote,
    Hybrid,
    Onsite,
}

/// Which step of the fallback chain produced a logo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoSource {
    AtsProvided,
    BrandApi,
    Favicon,
    FaviconFallback,
    None,
}

/// One external provider of postings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSource {
    pub id: String,
    pub name: String,
    pub kind: SourceKind,
    pub endpoint: String,
    pub poll_interval_secs: u64,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub next_poll_at: DateTime<Utc>,
    pub status: SourceStatus,
    pub consecutive_failures: u32,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub total_ingested: u64,
    pub active_jobs: u64,
    /// Exponentially-weighted success ratio in [0, 1].
    pub reliability: f64,
    pub priority: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl JobSource {
    pub fn new(id: &str, name: &str, kind: SourceKind, endpoint: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind,
            endpoint: endpoint.to_string(),
            poll_interval_secs: 3600,
            last_poll_at: None,
            next_poll_at: now,
            status: SourceStatus::Active,
            consecutive_failures: 0,
            last_success_at: None,
            last_failure_at: None,
            last_error: None,
            total_ingested: 0,
            active_jobs: 0,
            reliability: 1.0,
            priority: false,
            tags: Vec::new(),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == SourceStatus::Active && self.next_poll_at <= now
    }
}

/// AI-derived structured fields attached to a job by the enrichment engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichment {
    pub summary: String,
    #[serde(default)]
    pub responsibilities: Vec<String>,
    #[serde(default)]
    pub qualifications: Vec<String>,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(default)]
    pub benefits: Vec<String>,
    #[serde(default)]
    pub visa_info: Option<String>,
}

/// One posting, the unit of truth. `id` is the dedup key: stable across
/// re-fetches, so two fetches of the same posting merge into one row.
/// Rows are never hard-deleted; expiry is a status flip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub source_id: String,
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

    // Logo fields, owned by the logo resolver.
    pub logo_url: Option<String>,
    pub logo_domain: Option<String>,
    pub logo_source: Option<LogoSource>,
    pub logo_verified_at: Option<DateTime<Utc>>,

    pub posted_at: Option<DateTime<Utc>>,
    pub first_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,

    pub status: VerificationStatus,
    pub verified_at: Option<DateTime<Utc>>,
    /// Consecutive failed verification passes. Reset whenever the posting is
    /// re-seen by ingestion or confirmed reachable.
    pub verify_misses: u32,

    pub enrichment: Option<Enrichment>,
    pub enriched_at: Option<DateTime<Utc>>,

    pub freshness_rank: f64,
    pub rank_score: f64,
}

impl Job {
    /// Effective posted time used for age metrics: the source-provided
    /// timestamp when present, else when we first saw the posting.
    pub fn effective_posted_at(&self) -> DateTime<Utc> {
        self.posted_at.unwrap_or(self.first_seen_at)
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            VerificationStatus::Unverified | VerificationStatus::VerifiedActive
        )
    }

    /// Merge a re-fetched posting into this row. Returns `true` when any
    /// mutable content field changed (and `updated_at` was bumped).
    ///
    /// Re-seeing a posting always refreshes `last_seen_at`, resets the
    /// verification miss counter, and pulls a `Stale`/`Expired` row back to
    /// `Unverified`: the source just proved the posting exists again.
    pub fn apply_refresh(&mut self, incoming: &Job, now: DateTime<Utc>) -> bool {
        let changed = self.title != incoming.title
            || self.location != incoming.location
            || self.work_type != incoming.work_type
            || self.salary_min != incoming.salary_min
            || self.salary_max != incoming.salary_max
            || self.description != incoming.description
            || self.requirements != incoming.requirements
            || self.apply_url != incoming.apply_url;

        if changed {
            self.title = incoming.title.clone();
            self.location = incoming.location.clone();
            self.work_type = incoming.work_type;
            self.salary_min = incoming.salary_min;
            self.salary_max = incoming.salary_max;
            self.description = incoming.description.clone();
            self.requirements = incoming.requirements.clone();
            self.apply_url = incoming.apply_url.clone();
            self.updated_at = now;
        }
        if incoming.posted_at.is_some() {
            self.posted_at = incoming.posted_at;
        }

        self.last_seen_at = now;
        self.verify_misses = 0;
        if matches!(
            self.status,
            VerificationStatus::Stale | VerificationStatus::Expired
        ) {
            self.status = VerificationStatus::Unverified;
        }
        changed
    }

    /// Recompute derived ranking fields. Freshness decays with a 48h
    /// half-life; the overall score folds in source reliability.
    pub fn compute_rank(&mut self, now: DateTime<Utc>, source_reliability: f64) {
        let age_hours = (now - self.effective_posted_at()).num_minutes().max(0) as f64 / 60.0;
        self.freshness_rank = 0.5f64.powf(age_hours / 48.0);
        self.rank_score = self.freshness_rank * (0.5 + 0.5 * source_reliability.clamp(0.0, 1.0));
    }
}

/// Append-only audit record for one engine run over a batch of sources.
/// Immutable once completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionRun {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub sources_processed: u64,
    pub jobs_fetched: u64,
    pub jobs_new: u64,
    pub jobs_updated: u64,
    pub jobs_deduplicated: u64,
    pub success: bool,
    pub error: Option<String>,
    /// Small sample of affected job ids for operator inspection.
    pub sample_job_ids: Vec<String>,
}

/// Append-only audit record for one ingestion attempt against one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionLog {
    pub source_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub fetched: u64,
    pub new: u64,
    pub updated: u64,
    pub deduplicated: u64,
    pub success: bool,
    pub error: Option<String>,
}

/// One resolved domain → logo mapping; the shared idempotent memo that keeps
/// repeated postings from the same company off the external services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedLogo {
    pub domain: String,
    pub logo_url: String,
    pub source: LogoSource,
    pub verified_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn job(now: DateTime<Utc>) -> Job {
        Job {
            id: "src-a:101".into(),
            source_id: "src-a".into(),
            native_id: Some("101".into()),
            title: "Backend Engineer".into(),
            company: "Acme".into(),
            location: "Remote".into(),
            work_type: Some(WorkType::Remote),
            salary_min: Some(120_000),
            salary_max: Some(160_000),
            description: "Build services".into(),
            requirements: vec!["Rust".into()],
            apply_url: Some("https://acme.com/jobs/101".into()),
            logo_url: None,
            logo_domain: None,
            logo_source: None,
            logo_verified_at: None,
            posted_at: Some(now),
            first_seen_at: now,
            updated_at: now,
            last_seen_at: now,
            status: VerificationStatus::Unverified,
            verified_at: None,
            verify_misses: 0,
            enrichment: None,
            enriched_at: None,
            freshness_rank: 0.0,
            rank_score: 0.0,
        }
    }

    #[test]
    fn refresh_unchanged_keeps_updated_at() {
        let now = t0();
        let later = now + chrono::Duration::hours(1);
        let mut existing = job(now);
        let incoming = job(later);
        let changed = existing.apply_refresh(&incoming, later);
        assert!(!changed);
        assert_eq!(existing.updated_at, now);
        assert_eq!(existing.last_seen_at, later);
    }

    #[test]
    fn refresh_changed_bumps_updated_at() {
        let now = t0();
        let later = now + chrono::Duration::hours(1);
        let mut existing = job(now);
        let mut incoming = job(later);
        incoming.salary_max = Some(170_000);
        let changed = existing.apply_refresh(&incoming, later);
        assert!(changed);
        assert_eq!(existing.updated_at, later);
        assert_eq!(existing.salary_max, Some(170_000));
    }

    #[test]
    fn refresh_resurrects_stale_and_expired() {
        let now = t0();
        let later = now + chrono::Duration::hours(3);
        let mut existing = job(now);
        existing.status = VerificationStatus::Expired;
        existing.verify_misses = 4;
        let incoming = job(later);
        existing.apply_refresh(&incoming, later);
        assert_eq!(existing.status, VerificationStatus::Unverified);
        assert_eq!(existing.verify_misses, 0);
    }

    #[test]
    fn rank_decays_with_age() {
        let now = t0();
        let mut fresh = job(now);
        fresh.compute_rank(now, 1.0);
        let mut old = job(now);
        old.posted_at = Some(now - chrono::Duration::hours(96));
        old.compute_rank(now, 1.0);
        assert!(fresh.freshness_rank > old.freshness_rank);
        assert!((fresh.freshness_rank - 1.0).abs() < 1e-9);
        assert!((old.freshness_rank - 0.25).abs() < 1e-9);
    }
}
