// tests/logo_resolver.rs
//
// The fallback chain contracts:
// - resolve() never errors and never returns a null logo once a domain exists
// - warm-cache calls are O(1): same result, zero extra external lookups
// - the ATS-provided URL is only trusted after a reachability check
// - job-board apply URLs never leak in as company domains

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::Utc;

use jobpulse::logo::domains::CompanyDomains;
use jobpulse::logo::{LogoResolver, UrlProbe};
use jobpulse::model::LogoSource;
use jobpulse::store::{LogoCache, MemoryLogoCache};

struct CountingProbe {
    calls: AtomicU32,
    reachable: bool,
}

impl CountingProbe {
    fn new(reachable: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            reachable,
        })
    }
    fn count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl UrlProbe for CountingProbe {
    async fn is_reachable(&self, _url: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reachable
    }
}

fn resolver(probe: Arc<CountingProbe>) -> (LogoResolver, Arc<MemoryLogoCache>) {
    let cache = Arc::new(MemoryLogoCache::new());
    (
        LogoResolver::new(
            probe,
            cache.clone(),
            CompanyDomains::load_from_file("config/company_domains.json"),
        ),
        cache,
    )
}

#[tokio::test]
async fn terminal_fallback_guarantees_a_logo() {
    // Every probed step fails; the terminal favicon provider still answers.
    let probe = CountingProbe::new(false);
    let (r, _) = resolver(probe.clone());

    let out = r
        .resolve("Globex Corp", Some("https://globex.example.com/jobs/1"), None, Utc::now())
        .await;
    assert_eq!(out.domain.as_deref(), Some("globex.example.com"));
    assert_eq!(out.source, LogoSource::FaviconFallback);
    let url = out.logo_url.expect("fallback must produce a url");
    assert!(url.contains("globex.example.com"));
    // ATS step absent: only the two probed chain steps ran.
    assert_eq!(probe.count(), 2);
}

#[tokio::test]
async fn no_domain_is_the_only_null_path() {
    let probe = CountingProbe::new(false);
    let (r, _) = resolver(probe);

    let out = r.resolve("", None, None, Utc::now()).await;
    assert_eq!(out.logo_url, None);
    assert_eq!(out.source, LogoSource::None);
    assert_eq!(out.domain, None);
}

#[tokio::test]
async fn warm_cache_is_idempotent_with_no_external_calls() {
    let probe = CountingProbe::new(true);
    let (r, _) = resolver(probe.clone());

    let first = r
        .resolve("Acme Corp", Some("https://acme.example.com/jobs/9"), None, Utc::now())
        .await;
    assert_eq!(first.source, LogoSource::BrandApi);
    let calls_after_first = probe.count();
    assert_eq!(calls_after_first, 1, "brand api answered on the first probe");

    let second = r
        .resolve("Acme Corp", Some("https://acme.example.com/jobs/9"), None, Utc::now())
        .await;
    assert_eq!(second, first, "warm cache returns the identical triple");
    assert_eq!(probe.count(), calls_after_first, "no second external lookup");
}

#[tokio::test]
async fn ats_logo_is_verified_before_use() {
    // Reachable ATS URL wins outright.
    let probe = CountingProbe::new(true);
    let (r, cache) = resolver(probe.clone());
    let out = r
        .resolve(
            "Acme",
            Some("https://acme.example.com/jobs/1"),
            Some("https://cdn.ats.example.com/acme.png"),
            Utc::now(),
        )
        .await;
    assert_eq!(out.source, LogoSource::AtsProvided);
    assert_eq!(
        out.logo_url.as_deref(),
        Some("https://cdn.ats.example.com/acme.png")
    );
    // The win is memoized under the derived domain.
    assert!(cache.get("acme.example.com").is_some());

    // Unreachable ATS URL falls through the chain to the terminal step.
    let probe = CountingProbe::new(false);
    let (r, _) = resolver(probe.clone());
    let out = r
        .resolve(
            "Acme",
            Some("https://acme.example.com/jobs/1"),
            Some("https://cdn.ats.example.com/gone.png"),
            Utc::now(),
        )
        .await;
    assert_eq!(out.source, LogoSource::FaviconFallback);
    assert_eq!(probe.count(), 3, "ats + two probed steps");
}

#[tokio::test]
async fn board_apply_urls_defer_to_table_and_slug() {
    let probe = CountingProbe::new(false);
    let (r, _) = resolver(probe);

    // Curated table entry wins over the greenhouse host.
    let out = r
        .resolve(
            "Google",
            Some("https://boards.greenhouse.io/google/jobs/1"),
            None,
            Utc::now(),
        )
        .await;
    assert_eq!(out.domain.as_deref(), Some("google.com"));

    // Unknown company on a board host slugs to {company}.com.
    let out = r
        .resolve(
            "Tiny Startup Inc",
            Some("https://jobs.lever.co/tiny/1"),
            None,
            Utc::now(),
        )
        .await;
    assert_eq!(out.domain.as_deref(), Some("tinystartup.com"));
}

#[tokio::test]
async fn evicted_domain_is_resolved_again() {
    let probe = CountingProbe::new(true);
    let (r, cache) = resolver(probe.clone());

    r.resolve("Acme", Some("https://acme.example.com/j/1"), None, Utc::now())
        .await;
    assert_eq!(probe.count(), 1);

    cache.evict("acme.example.com");
    r.resolve("Acme", Some("https://acme.example.com/j/1"), None, Utc::now())
        .await;
    assert_eq!(probe.count(), 2, "eviction forces one fresh lookup");
}
