// src/ingest/mod.rs
pub mod dedup;
pub mod providers;
pub mod scheduler;
pub mod types;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::logo::LogoResolver;
use crate::model::{IngestionLog, IngestionRun, Job, JobSource, SourceKind, VerificationStatus, WorkType};
use crate::notify::{AlertEvent, NotifierMux};
use crate::sources::{HealthTransition, OutcomeStats, SourceRegistry};
use crate::store::{Storage, UpsertOutcome};
use types::{FetcherFactory, RawPosting};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_runs_total", "Ingestion engine runs.");
        describe_counter!("ingest_postings_total", "Postings parsed from providers.");
        describe_counter!("ingest_jobs_new_total", "Postings inserted as new jobs.");
        describe_counter!(
            "ingest_jobs_updated_total",
            "Existing jobs refreshed with changed content."
        );
        describe_counter!(
            "ingest_jobs_deduplicated_total",
            "Postings merged into an existing job unchanged."
        );
        describe_counter!(
            "ingest_source_errors_total",
            "Source fetch/parse errors during ingestion."
        );
        describe_histogram!("ingest_parse_ms", "Provider parse time in milliseconds.");
        describe_gauge!(
            "ingest_last_run_ts",
            "Unix ts when the ingestion engine last ran."
        );
    });
}

/// Normalize posting text: entity decode, strip tags, normalize quotes,
/// collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode (board APIs double-encode their HTML)
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // 5) Length cap: 8000 chars
    if out.chars().count() > 8000 {
        out = out.chars().take(8000).collect();
    }

    out
}

/// Pull `<li>` items out of raw (possibly entity-encoded) HTML, the closest
/// thing board markup has to a requirements list. Capped at 10.
pub fn extract_list_items(raw_html: &str) -> Vec<String> {
    let decoded = html_escape::decode_html_entities(raw_html).to_string();
    static RE_LI: OnceCell<regex::Regex> = OnceCell::new();
    let re = RE_LI.get_or_init(|| regex::Regex::new(r"(?is)<li[^>]*>(.*?)</li>").unwrap());
    re.captures_iter(&decoded)
        .filter_map(|c| {
            let item = normalize_text(c.get(1).map(|m| m.as_str()).unwrap_or_default());
            (!item.is_empty()).then_some(item)
        })
        .take(10)
        .collect()
}

/// Remote/hybrid markers in the location or title. Anything else is left
/// unknown rather than guessed at.
pub fn infer_work_type(location: &str, title: &str) -> Option<WorkType> {
    let haystack = format!("{location} {title}").to_ascii_lowercase();
    if haystack.contains("remote") {
        Some(WorkType::Remote)
    } else if haystack.contains("hybrid") {
        Some(WorkType::Hybrid)
    } else if haystack.contains("on-site") || haystack.contains("onsite") {
        Some(WorkType::Onsite)
    } else {
        None
    }
}

/// Best-effort salary range out of free text: "$140,000 - $180,000" or
/// "$140k-$180k". Returns (min, max), either possibly None.
pub fn parse_salary_range(text: &str) -> (Option<u32>, Option<u32>) {
    static RE_FULL: OnceCell<regex::Regex> = OnceCell::new();
    let re_full = RE_FULL.get_or_init(|| {
        regex::Regex::new(
            r"\$\s*([0-9]{1,3}(?:,[0-9]{3})+|[0-9]{4,7})\s*(?:-|–|—|to)\s*\$?\s*([0-9]{1,3}(?:,[0-9]{3})+|[0-9]{4,7})",
        )
        .unwrap()
    });
    static RE_K: OnceCell<regex::Regex> = OnceCell::new();
    let re_k = RE_K.get_or_init(|| {
        regex::Regex::new(r"\$\s*([0-9]{2,3})\s*[kK]\s*(?:-|–|—|to)\s*\$?\s*([0-9]{2,3})\s*[kK]")
            .unwrap()
    });

    let parse_num = |s: &str| s.replace(',', "").parse::<u32>().ok();

    if let Some(c) = re_full.captures(text) {
        return (
            c.get(1).and_then(|m| parse_num(m.as_str())),
            c.get(2).and_then(|m| parse_num(m.as_str())),
        );
    }
    if let Some(c) = re_k.captures(text) {
        return (
            c.get(1).and_then(|m| parse_num(m.as_str())).map(|v| v * 1_000),
            c.get(2).and_then(|m| parse_num(m.as_str())).map(|v| v * 1_000),
        );
    }
    (None, None)
}

/// Turn a normalized posting into a candidate job row keyed by its dedup key.
pub fn build_job(source: &JobSource, raw: RawPosting, now: DateTime<Utc>) -> Job {
    let id = dedup::dedup_key(
        &source.id,
        raw.native_id.as_deref(),
        &raw.title,
        &raw.company,
        &raw.location,
    );
    Job {
        id,
        source_id: source.id.clone(),
        native_id: raw.native_id,
        title: raw.title,
        company: raw.company,
        location: raw.location,
        work_type: raw.work_type,
        salary_min: raw.salary_min,
        salary_max: raw.salary_max,
        description: raw.description,
        requirements: raw.requirements,
        apply_url: raw.apply_url,
        logo_url: None,
        logo_domain: None,
        logo_source: None,
        logo_verified_at: None,
        posted_at: raw.posted_at,
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

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestFilter {
    pub source_id: Option<String>,
    pub source_type: Option<SourceKind>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct IngestOutcome {
    pub sources_processed: u64,
    pub total_new: u64,
    pub total_updated: u64,
    pub total_deduplicated: u64,
}

pub struct IngestEngine {
    store: Arc<dyn Storage>,
    registry: Arc<SourceRegistry>,
    fetchers: Arc<dyn FetcherFactory>,
    logos: Arc<LogoResolver>,
    alerts: Arc<NotifierMux>,
}

impl IngestEngine {
    pub fn new(
        store: Arc<dyn Storage>,
        registry: Arc<SourceRegistry>,
        fetchers: Arc<dyn FetcherFactory>,
        logos: Arc<LogoResolver>,
        alerts: Arc<NotifierMux>,
    ) -> Self {
        Self {
            store,
            registry,
            fetchers,
            logos,
            alerts,
        }
    }

    fn select_sources(&self, filter: &IngestFilter, now: DateTime<Utc>) -> Vec<JobSource> {
        // An explicit source_id is a manual trigger: it runs regardless of
        // the poll schedule and even for failing sources, but never for
        // disabled ones.
        let mut selected: Vec<JobSource> = if let Some(id) = &filter.source_id {
            self.store
                .get_source(id)
                .into_iter()
                .filter(|s| s.status != crate::model::SourceStatus::Disabled)
                .collect()
        } else {
            self.registry.list_due_sources(now)
        };
        if let Some(kind) = filter.source_type {
            selected.retain(|s| s.kind == kind);
        }
        if let Some(limit) = filter.limit {
            selected.truncate(limit);
        }
        selected
    }

    /// One ingestion pass over the filtered source set. A fetch failure for
    /// one source never aborts the batch; it is attributed to that source
    /// and the loop continues. Never demotes a posting it fails to re-see;
    /// sustained absence is the verification engine's call.
    pub async fn run(&self, filter: IngestFilter) -> IngestOutcome {
        ensure_metrics_described();
        let run_started = Utc::now();
        let sources = self.select_sources(&filter, run_started);

        let mut outcome = IngestOutcome::default();
        let mut total_fetched: u64 = 0;
        let mut sources_failed: u64 = 0;
        let mut samples: Vec<String> = Vec::new();

        for source in sources {
            let log_started = Utc::now();
            let fetcher = self.fetchers.fetcher_for(&source);

            match fetcher.fetch_latest().await {
                Ok(raws) => {
                    let mut stats = OutcomeStats {
                        fetched: raws.len() as u64,
                        ..Default::default()
                    };
                    for raw in raws {
                        let now = Utc::now();
                        let ats_logo = raw.ats_logo_url.clone();
                        let candidate = build_job(&source, raw, now);
                        let (res, mut stored) = self.store.upsert_job(candidate, now);
                        stored.compute_rank(now, source.reliability);
                        match res {
                            UpsertOutcome::Inserted => {
                                stats.new += 1;
                                if samples.len() < 10 {
                                    samples.push(stored.id.clone());
                                }
                                // Best-effort: a missing logo never blocks the row.
                                self.logos
                                    .resolve_for_job(&mut stored, ats_logo.as_deref(), now)
                                    .await;
                            }
                            UpsertOutcome::Updated => stats.updated += 1,
                            UpsertOutcome::Unchanged => stats.deduplicated += 1,
                        }
                        self.store.update_job(stored);
                    }

                    counter!("ingest_jobs_new_total").increment(stats.new);
                    counter!("ingest_jobs_updated_total").increment(stats.updated);
                    counter!("ingest_jobs_deduplicated_total").increment(stats.deduplicated);

                    let now = Utc::now();
                    let transition =
                        self.registry
                            .record_outcome(&source.id, true, stats, None, now);
                    if let Some(HealthTransition::Recovered) = transition {
                        self.alerts
                            .notify(
                                &AlertEvent::SourceRecovered {
                                    source_id: source.id.clone(),
                                    ts: now,
                                },
                                now,
                            )
                            .await;
                    }

                    self.store.append_log(IngestionLog {
                        source_id: source.id.clone(),
                        started_at: log_started,
                        completed_at: now,
                        fetched: stats.fetched,
                        new: stats.new,
                        updated: stats.updated,
                        deduplicated: stats.deduplicated,
                        success: true,
                        error: None,
                    });

                    info!(
                        source = %source.id,
                        fetched = stats.fetched,
                        new = stats.new,
                        updated = stats.updated,
                        deduplicated = stats.deduplicated,
                        "source ingested"
                    );

                    total_fetched += stats.fetched;
                    outcome.total_new += stats.new;
                    outcome.total_updated += stats.updated;
                    outcome.total_deduplicated += stats.deduplicated;
                }
                Err(e) => {
                    sources_failed += 1;
                    counter!("ingest_source_errors_total").increment(1);
                    warn!(error = ?e, source = %source.id, "source fetch failed");

                    let now = Utc::now();
                    let err_text = format!("{e:#}");
                    let transition = self.registry.record_outcome(
                        &source.id,
                        false,
                        OutcomeStats::default(),
                        Some(err_text.clone()),
                        now,
                    );
                    if let Some(HealthTransition::BecameFailing) = transition {
                        self.alerts
                            .notify(
                                &AlertEvent::SourceFailing {
                                    source_id: source.id.clone(),
                                    error: err_text.clone(),
                                    ts: now,
                                },
                                now,
                            )
                            .await;
                    }

                    self.store.append_log(IngestionLog {
                        source_id: source.id.clone(),
                        started_at: log_started,
                        completed_at: now,
                        fetched: 0,
                        new: 0,
                        updated: 0,
                        deduplicated: 0,
                        success: false,
                        error: Some(err_text),
                    });
                }
            }
            outcome.sources_processed += 1;
        }

        let completed = Utc::now();
        self.store.append_run(IngestionRun {
            started_at: run_started,
            completed_at: completed,
            duration_ms: (completed - run_started).num_milliseconds().max(0) as u64,
            sources_processed: outcome.sources_processed,
            jobs_fetched: total_fetched,
            jobs_new: outcome.total_new,
            jobs_updated: outcome.total_updated,
            jobs_deduplicated: outcome.total_deduplicated,
            success: sources_failed == 0,
            error: (sources_failed > 0).then(|| format!("{sources_failed} source(s) failed")),
            sample_job_ids: samples,
        });

        counter!("ingest_runs_total").increment(1);
        gauge!("ingest_last_run_ts").set(completed.timestamp().max(0) as f64);

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_strips_tags_and_collapses_ws() {
        let s = "&lt;p&gt;Build   things&lt;/p&gt;  now ";
        assert_eq!(normalize_text(s), "Build things now");
    }

    #[test]
    fn extract_list_items_finds_requirements() {
        let html = "<ul><li>5+ years Rust</li><li> Postgres </li><li></li></ul>";
        assert_eq!(extract_list_items(html), vec!["5+ years Rust", "Postgres"]);
    }

    #[test]
    fn salary_ranges_parse_both_shapes() {
        assert_eq!(
            parse_salary_range("base $140,000 - $180,000 plus equity"),
            (Some(140_000), Some(180_000))
        );
        assert_eq!(
            parse_salary_range("pays $90k-$120k"),
            (Some(90_000), Some(120_000))
        );
        assert_eq!(parse_salary_range("competitive"), (None, None));
    }

    #[test]
    fn work_type_markers() {
        assert_eq!(infer_work_type("Remote - US", "Engineer"), Some(WorkType::Remote));
        assert_eq!(infer_work_type("NYC", "Engineer (Hybrid)"), Some(WorkType::Hybrid));
        assert_eq!(infer_work_type("Minneapolis, MN", "Engineer"), None);
    }
}
