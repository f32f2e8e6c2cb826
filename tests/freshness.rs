// tests/freshness.rs
//
// The SLA monitor is a pure read: refreshed-source ratio over the window,
// job age percentiles, status counts, and the healthy flag at the 80% line.

use chrono::{Duration, Utc};

use jobpulse::freshness::{compute, FreshnessConfig};
use jobpulse::ingest::build_job;
use jobpulse::ingest::types::RawPosting;
use jobpulse::model::{JobSource, SourceKind, SourceStatus, VerificationStatus};
use jobpulse::store::{MemStorage, Storage};

fn source(id: &str, status: SourceStatus, success_age_mins: Option<i64>) -> JobSource {
    let now = Utc::now();
    let mut s = JobSource::new(id, id, SourceKind::Ats, "https://example.invalid", now);
    s.status = status;
    s.last_success_at = success_age_mins.map(|m| now - Duration::minutes(m));
    s
}

fn job(store: &dyn Storage, src: &JobSource, nid: &str, age_hours: i64, status: VerificationStatus) {
    let now = Utc::now();
    let raw = RawPosting {
        native_id: Some(nid.to_string()),
        title: format!("Role {nid}"),
        company: "Acme".to_string(),
        location: "Remote".to_string(),
        work_type: None,
        salary_min: None,
        salary_max: None,
        description: "desc".to_string(),
        requirements: vec![],
        apply_url: None,
        posted_at: Some(now - Duration::hours(age_hours)),
        ats_logo_url: None,
    };
    let mut j = build_job(src, raw, now);
    j.status = status;
    store.upsert_job(j, now);
}

#[test]
fn refreshed_ratio_counts_only_active_sources() {
    let store = MemStorage::new();
    // 2 active (1 fresh, 1 stale), 1 paused, 1 failing: ratio is over the
    // two active ones only.
    store.upsert_source(source("fresh", SourceStatus::Active, Some(30)));
    store.upsert_source(source("stale", SourceStatus::Active, Some(300)));
    store.upsert_source(source("paused", SourceStatus::Paused, Some(10)));
    store.upsert_source(source("failing", SourceStatus::Failing, None));

    let report = compute(&store, FreshnessConfig::default(), Utc::now());
    assert_eq!(report.sources_total, 4);
    assert_eq!(report.sources_active, 2);
    assert_eq!(report.sources_refreshed, 1);
    assert!((report.sources_refreshed_ratio - 0.5).abs() < 1e-9);
    assert!(!report.healthy, "50% is below the 80% target");
}

#[test]
fn all_sources_fresh_is_healthy() {
    let store = MemStorage::new();
    store.upsert_source(source("a", SourceStatus::Active, Some(5)));
    store.upsert_source(source("b", SourceStatus::Active, Some(60)));

    let report = compute(&store, FreshnessConfig::default(), Utc::now());
    assert!((report.sources_refreshed_ratio - 1.0).abs() < 1e-9);
    assert!(report.healthy);
}

#[test]
fn no_active_sources_is_vacuously_healthy() {
    let store = MemStorage::new();
    store.upsert_source(source("p", SourceStatus::Paused, None));
    let report = compute(&store, FreshnessConfig::default(), Utc::now());
    assert!((report.sources_refreshed_ratio - 1.0).abs() < 1e-9);
    assert!(report.healthy);
}

#[test]
fn age_percentiles_ignore_expired_jobs() {
    let store = MemStorage::new();
    let src = source("a", SourceStatus::Active, Some(5));
    store.upsert_source(src.clone());

    // Ten active jobs aged 1..=10 hours, plus one ancient expired job that
    // must not drag the percentiles.
    for i in 1..=10 {
        job(&store, &src, &format!("{i}"), i, VerificationStatus::VerifiedActive);
    }
    job(&store, &src, "ancient", 10_000, VerificationStatus::Expired);

    let report = compute(&store, FreshnessConfig::default(), Utc::now());
    assert_eq!(report.jobs.verified_active, 10);
    assert_eq!(report.jobs.expired, 1);
    assert!((report.p50_age_hours - 5.0).abs() < 0.1);
    assert!((report.p90_age_hours - 9.0).abs() < 0.1);
}

#[test]
fn status_counts_cover_the_full_lifecycle() {
    let store = MemStorage::new();
    let src = source("a", SourceStatus::Active, Some(5));
    store.upsert_source(src.clone());
    job(&store, &src, "u", 1, VerificationStatus::Unverified);
    job(&store, &src, "v", 1, VerificationStatus::VerifiedActive);
    job(&store, &src, "s", 1, VerificationStatus::Stale);
    job(&store, &src, "e", 1, VerificationStatus::Expired);

    let report = compute(&store, FreshnessConfig::default(), Utc::now());
    assert_eq!(report.jobs.unverified, 1);
    assert_eq!(report.jobs.verified_active, 1);
    assert_eq!(report.jobs.stale, 1);
    assert_eq!(report.jobs.expired, 1);
}
