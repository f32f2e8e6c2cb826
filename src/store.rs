// src/store.rs
// Storage seam. The relational engine itself is an external collaborator;
// the pipeline only needs row-scoped query/update operations, so it talks to
// the `Storage` trait. `MemStorage` backs tests and single-instance deploys;
// a SQL-backed implementation slots in behind the same trait.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::model::{CachedLogo, IngestionLog, IngestionRun, Job, JobSource, VerificationStatus};

/// Outcome of an atomic upsert by dedup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct StatusCounts {
    pub unverified: u64,
    pub verified_active: u64,
    pub stale: u64,
    pub expired: u64,
}

pub trait Storage: Send + Sync {
    // --- sources ---
    fn list_sources(&self) -> Vec<JobSource>;
    fn get_source(&self, id: &str) -> Option<JobSource>;
    fn upsert_source(&self, source: JobSource);

    // --- jobs ---
    fn get_job(&self, id: &str) -> Option<Job>;
    /// Insert-or-merge by the job's dedup key (== `Job.id`). The lookup and
    /// write happen under one lock: this is the serialization boundary that
    /// keeps two concurrent ingestions of the same key from interleaving.
    /// Returns the outcome plus the stored row after the merge.
    fn upsert_job(&self, incoming: Job, now: DateTime<Utc>) -> (UpsertOutcome, Job);
    /// Row-scoped whole-row write, used by verification / enrichment / logo
    /// resolution which all key by job id.
    fn update_job(&self, job: Job);
    /// Jobs due for a liveness re-check: not expired, and neither verified
    /// nor re-seen by ingestion since `cutoff`. Oldest verification first.
    fn jobs_for_verification(&self, cutoff: DateTime<Utc>, limit: usize) -> Vec<Job>;
    /// Jobs still lacking AI-derived fields, oldest first.
    fn jobs_for_enrichment(&self, limit: usize) -> Vec<Job>;
    /// Jobs without a resolved logo, for manual backfill batches.
    fn jobs_missing_logo(&self, limit: usize) -> Vec<Job>;
    fn count_jobs_by_status(&self) -> StatusCounts;
    /// Effective posted times of active jobs, for age percentiles.
    fn active_posted_times(&self) -> Vec<DateTime<Utc>>;

    // --- audit trail ---
    fn append_run(&self, run: IngestionRun);
    fn append_log(&self, log: IngestionLog);
    fn recent_runs(&self, n: usize) -> Vec<IngestionRun>;
    fn recent_logs(&self, n: usize) -> Vec<IngestionLog>;
}

/// Injectable cache abstraction for resolved logos (domain-keyed memo).
/// In-memory for single-instance deployments; swap for a shared store in
/// multi-instance deployments without touching resolver logic.
pub trait LogoCache: Send + Sync {
    fn get(&self, domain: &str) -> Option<CachedLogo>;
    fn put(&self, entry: CachedLogo);
    fn evict(&self, domain: &str);
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

const RUN_LOG_CAP: usize = 1_000;

#[derive(Default)]
pub struct MemStorage {
    sources: Mutex<HashMap<String, JobSource>>,
    jobs: Mutex<HashMap<String, Job>>,
    runs: Mutex<Vec<IngestionRun>>,
    logs: Mutex<Vec<IngestionLog>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemStorage {
    fn list_sources(&self) -> Vec<JobSource> {
        let g = self.sources.lock().expect("sources mutex poisoned");
        let mut out: Vec<_> = g.values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    fn get_source(&self, id: &str) -> Option<JobSource> {
        let g = self.sources.lock().expect("sources mutex poisoned");
        g.get(id).cloned()
    }

    fn upsert_source(&self, source: JobSource) {
        let mut g = self.sources.lock().expect("sources mutex poisoned");
        g.insert(source.id.clone(), source);
    }

    fn get_job(&self, id: &str) -> Option<Job> {
        let g = self.jobs.lock().expect("jobs mutex poisoned");
        g.get(id).cloned()
    }

    fn upsert_job(&self, incoming: Job, now: DateTime<Utc>) -> (UpsertOutcome, Job) {
        let mut g = self.jobs.lock().expect("jobs mutex poisoned");
        match g.get_mut(&incoming.id) {
            None => {
                g.insert(incoming.id.clone(), incoming.clone());
                (UpsertOutcome::Inserted, incoming)
            }
            Some(existing) => {
                let changed = existing.apply_refresh(&incoming, now);
                let stored = existing.clone();
                if changed {
                    (UpsertOutcome::Updated, stored)
                } else {
                    (UpsertOutcome::Unchanged, stored)
                }
            }
        }
    }

    fn update_job(&self, job: Job) {
        let mut g = self.jobs.lock().expect("jobs mutex poisoned");
        g.insert(job.id.clone(), job);
    }

    fn jobs_for_verification(&self, cutoff: DateTime<Utc>, limit: usize) -> Vec<Job> {
        let g = self.jobs.lock().expect("jobs mutex poisoned");
        let mut due: Vec<_> = g
            .values()
            .filter(|j| j.status != VerificationStatus::Expired)
            .filter(|j| j.verified_at.map_or(true, |t| t < cutoff))
            .filter(|j| j.last_seen_at < cutoff)
            .cloned()
            .collect();
        due.sort_by_key(|j| j.verified_at.unwrap_or(j.first_seen_at));
        due.truncate(limit);
        due
    }

    fn jobs_for_enrichment(&self, limit: usize) -> Vec<Job> {
        let g = self.jobs.lock().expect("jobs mutex poisoned");
        let mut due: Vec<_> = g
            .values()
            .filter(|j| j.enriched_at.is_none() && j.is_active() && !j.description.is_empty())
            .cloned()
            .collect();
        due.sort_by_key(|j| j.first_seen_at);
        due.truncate(limit);
        due
    }

    fn jobs_missing_logo(&self, limit: usize) -> Vec<Job> {
        let g = self.jobs.lock().expect("jobs mutex poisoned");
        let mut due: Vec<_> = g
            .values()
            .filter(|j| j.logo_url.is_none() && j.is_active())
            .cloned()
            .collect();
        due.sort_by_key(|j| j.first_seen_at);
        due.truncate(limit);
        due
    }

    fn count_jobs_by_status(&self) -> StatusCounts {
        let g = self.jobs.lock().expect("jobs mutex poisoned");
        let mut c = StatusCounts::default();
        for j in g.values() {
            match j.status {
                VerificationStatus::Unverified => c.unverified += 1,
                VerificationStatus::VerifiedActive => c.verified_active += 1,
                VerificationStatus::Stale => c.stale += 1,
                VerificationStatus::Expired => c.expired += 1,
            }
        }
        c
    }

    fn active_posted_times(&self) -> Vec<DateTime<Utc>> {
        let g = self.jobs.lock().expect("jobs mutex poisoned");
        g.values()
            .filter(|j| j.is_active())
            .map(|j| j.effective_posted_at())
            .collect()
    }

    fn append_run(&self, run: IngestionRun) {
        let mut g = self.runs.lock().expect("runs mutex poisoned");
        g.push(run);
        if g.len() > RUN_LOG_CAP {
            let excess = g.len() - RUN_LOG_CAP;
            g.drain(0..excess);
        }
    }

    fn append_log(&self, log: IngestionLog) {
        let mut g = self.logs.lock().expect("logs mutex poisoned");
        g.push(log);
        if g.len() > RUN_LOG_CAP {
            let excess = g.len() - RUN_LOG_CAP;
            g.drain(0..excess);
        }
    }

    fn recent_runs(&self, n: usize) -> Vec<IngestionRun> {
        let g = self.runs.lock().expect("runs mutex poisoned");
        let start = g.len().saturating_sub(n);
        g[start..].to_vec()
    }

    fn recent_logs(&self, n: usize) -> Vec<IngestionLog> {
        let g = self.logs.lock().expect("logs mutex poisoned");
        let start = g.len().saturating_sub(n);
        g[start..].to_vec()
    }
}

#[derive(Default)]
pub struct MemoryLogoCache {
    inner: Mutex<HashMap<String, CachedLogo>>,
}

impl MemoryLogoCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogoCache for MemoryLogoCache {
    fn get(&self, domain: &str) -> Option<CachedLogo> {
        let g = self.inner.lock().expect("logo cache mutex poisoned");
        g.get(domain).cloned()
    }

    fn put(&self, entry: CachedLogo) {
        let mut g = self.inner.lock().expect("logo cache mutex poisoned");
        g.insert(entry.domain.clone(), entry);
    }

    fn evict(&self, domain: &str) {
        let mut g = self.inner.lock().expect("logo cache mutex poisoned");
        g.remove(domain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WorkType;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn sample_job(id: &str, now: DateTime<Utc>) -> Job {
        Job {
            id: id.to_string(),
            source_id: "src-a".into(),
            native_id: None,
            title: "Data Engineer".into(),
            company: "Acme".into(),
            location: "Minneapolis, MN".into(),
            work_type: Some(WorkType::Hybrid),
            salary_min: None,
            salary_max: None,
            description: "Pipelines".into(),
            requirements: vec![],
            apply_url: None,
            logo_url: None,
            logo_domain: None,
            logo_source: None,
            logo_verified_at: None,
            posted_at: None,
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
    fn upsert_same_key_never_duplicates() {
        let store = MemStorage::new();
        let now = t0();
        let (o1, _) = store.upsert_job(sample_job("k1", now), now);
        let (o2, _) = store.upsert_job(sample_job("k1", now), now);
        assert_eq!(o1, UpsertOutcome::Inserted);
        assert_eq!(o2, UpsertOutcome::Unchanged);
        assert_eq!(store.count_jobs_by_status().unverified, 1);
    }

    #[test]
    fn verification_selection_skips_recently_seen() {
        let store = MemStorage::new();
        let now = t0();
        let cutoff = now - chrono::Duration::hours(2);

        let seen_at = now - chrono::Duration::hours(5);
        store.upsert_job(sample_job("old", seen_at), seen_at);
        store.upsert_job(sample_job("fresh", now), now);

        let due = store.jobs_for_verification(cutoff, 10);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, "old");
    }

    #[test]
    fn run_log_is_capped() {
        let store = MemStorage::new();
        let now = t0();
        for _ in 0..(RUN_LOG_CAP + 10) {
            store.append_log(IngestionLog {
                source_id: "s".into(),
                started_at: now,
                completed_at: now,
                fetched: 0,
                new: 0,
                updated: 0,
                deduplicated: 0,
                success: true,
                error: None,
            });
        }
        assert_eq!(store.recent_logs(usize::MAX).len(), RUN_LOG_CAP);
    }
}
