// src/logo/mod.rs
// Logo resolver: ordered fallback chain over a single probe capability, with
// a domain-keyed cache in front of every external call. `resolve` never
// fails; every path terminates in a logo URL or an explicit null.

pub mod domains;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::debug;

use crate::model::{CachedLogo, Job, LogoSource};
use crate::store::{LogoCache, Storage};
use domains::{derive_domain, CompanyDomains};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("logo_cache_hits_total", "Resolutions answered from the cache.");
        describe_counter!("logo_resolved_total", "Resolutions that produced a logo URL.");
        describe_counter!(
            "logo_probe_misses_total",
            "Candidate URLs that failed the reachability probe."
        );
    });
}

/// Reachability probe for candidate URLs (HEAD-equivalent). The only
/// external capability the chain needs; tests swap in counting stubs.
#[async_trait::async_trait]
pub trait UrlProbe: Send + Sync {
    async fn is_reachable(&self, url: &str) -> bool;
}

pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent("jobpulse/0.1 (+logo-resolver)")
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(6))
            .build()
            .expect("reqwest client");
        Self { client }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl UrlProbe for HttpProbe {
    async fn is_reachable(&self, url: &str) -> bool {
        match self.client.head(url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(error = ?e, url, "logo probe failed");
                false
            }
        }
    }
}

/// Result of one resolution. `source` tags which step produced the URL;
/// `LogoSource::None` marks the no-domain dead end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedLogo {
    pub logo_url: Option<String>,
    pub source: LogoSource,
    pub domain: Option<String>,
}

/// One probed step of the chain: a URL that must pass the probe to be used.
struct Candidate {
    source: LogoSource,
    url: String,
}

fn probed_chain(domain: &str) -> Vec<Candidate> {
    vec![
        Candidate {
            source: LogoSource::BrandApi,
            url: format!("https://logo.clearbit.com/{domain}"),
        },
        Candidate {
            source: LogoSource::Favicon,
            url: format!("https://www.google.com/s2/favicons?domain={domain}&sz=128"),
        },
    ]
}

/// Terminal step: this favicon provider always returns *something*, so it is
/// never probed and the chain cannot come up empty once a domain exists.
fn terminal_fallback(domain: &str) -> String {
    format!("https://icons.duckduckgo.com/ip3/{domain}.ico")
}

pub struct LogoResolver {
    probe: Arc<dyn UrlProbe>,
    cache: Arc<dyn LogoCache>,
    table: CompanyDomains,
}

impl LogoResolver {
    pub fn new(probe: Arc<dyn UrlProbe>, cache: Arc<dyn LogoCache>, table: CompanyDomains) -> Self {
        Self {
            probe,
            cache,
            table,
        }
    }

    /// Resolve a logo for `(company, apply_url, ats_logo_url)`.
    ///
    /// Chain: warm cache → ATS-provided URL (probed) → brand logo API →
    /// favicon API → terminal favicon fallback. Successful non-terminal
    /// steps are memoized per domain, so repeated postings from the same
    /// company are O(1) cache reads.
    pub async fn resolve(
        &self,
        company: &str,
        apply_url: Option<&str>,
        ats_logo_url: Option<&str>,
        now: DateTime<Utc>,
    ) -> ResolvedLogo {
        ensure_metrics_described();

        let domain = derive_domain(&self.table, company, apply_url);

        if let Some(d) = &domain {
            if let Some(hit) = self.cache.get(d) {
                counter!("logo_cache_hits_total").increment(1);
                return ResolvedLogo {
                    logo_url: Some(hit.logo_url),
                    source: hit.source,
                    domain: Some(hit.domain),
                };
            }
        }

        if let Some(url) = ats_logo_url {
            if self.probe.is_reachable(url).await {
                return self.memoize(url, LogoSource::AtsProvided, domain, now);
            }
            counter!("logo_probe_misses_total").increment(1);
        }

        let Some(d) = domain else {
            // No ATS logo and no derivable domain. The one path with no logo.
            return ResolvedLogo {
                logo_url: None,
                source: LogoSource::None,
                domain: None,
            };
        };

        for cand in probed_chain(&d) {
            if self.probe.is_reachable(&cand.url).await {
                return self.memoize(&cand.url, cand.source, Some(d), now);
            }
            counter!("logo_probe_misses_total").increment(1);
        }

        // Terminal fallback: taken as-is, not memoized.
        counter!("logo_resolved_total").increment(1);
        ResolvedLogo {
            logo_url: Some(terminal_fallback(&d)),
            source: LogoSource::FaviconFallback,
            domain: Some(d),
        }
    }

    fn memoize(
        &self,
        url: &str,
        source: LogoSource,
        domain: Option<String>,
        now: DateTime<Utc>,
    ) -> ResolvedLogo {
        counter!("logo_resolved_total").increment(1);
        if let Some(d) = &domain {
            self.cache.put(CachedLogo {
                domain: d.clone(),
                logo_url: url.to_string(),
                source,
                verified_at: now,
            });
        }
        ResolvedLogo {
            logo_url: Some(url.to_string()),
            source,
            domain,
        }
    }

    /// Resolve for a job row and write the logo fields back. Best-effort by
    /// construction: there is no error to surface.
    pub async fn resolve_for_job(
        &self,
        job: &mut Job,
        ats_logo_url: Option<&str>,
        now: DateTime<Utc>,
    ) -> ResolvedLogo {
        let resolved = self
            .resolve(&job.company, job.apply_url.as_deref(), ats_logo_url, now)
            .await;
        job.logo_url = resolved.logo_url.clone();
        job.logo_domain = resolved.domain.clone();
        job.logo_source = Some(resolved.source);
        job.logo_verified_at = Some(now);
        resolved
    }
}

/// Result of a manual backfill batch over jobs missing a logo.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BackfillOutcome {
    pub processed: u64,
    #[serde(rename = "successCount")]
    pub success_count: u64,
    #[serde(rename = "errorCount")]
    pub error_count: u64,
}

/// Walk jobs missing a logo and resolve each, with a bounded inter-item
/// delay to stay polite to the external services.
pub async fn backfill(
    resolver: &LogoResolver,
    store: &dyn Storage,
    batch_size: usize,
    delay_ms: u64,
    now: DateTime<Utc>,
) -> BackfillOutcome {
    let mut out = BackfillOutcome::default();
    let jobs = store.jobs_missing_logo(batch_size);
    for mut job in jobs {
        resolver.resolve_for_job(&mut job, None, now).await;
        out.processed += 1;
        if job.logo_url.is_some() {
            out.success_count += 1;
        } else {
            out.error_count += 1;
        }
        store.update_job(job);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }
    out
}
