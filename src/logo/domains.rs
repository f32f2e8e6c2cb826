//! # Company → domain resolution
//!
//! Maps a company name (and/or its apply URL) to the web domain used to key
//! logo lookups and the logo cache.
//!
//! - Loads from JSON config (domains + aliases).
//! - Case-insensitive lookup with normalization of punctuation, dashes, etc.
//! - Aliases map alternative spellings to canonical company names.
//! - Fallback order: apply-URL host (unless it is a job-board domain) →
//!   aliases → exact match → substring match → heuristic `{slug}.com`.
//! - Includes a built-in `default_seed()` with common employers.
//!
//! Designed to be simple, testable, and resilient to noisy input.

use serde::Deserialize;
use std::{collections::HashMap, fs, path::Path};

/// Generic ATS and job-board hosts that must never be treated as a company
/// domain: a posting's apply URL living on one of these says nothing about
/// the employer's own site.
const JOB_BOARD_DOMAINS: &[&str] = &[
    "greenhouse.io",
    "lever.co",
    "myworkdayjobs.com",
    "workday.com",
    "ashbyhq.com",
    "smartrecruiters.com",
    "icims.com",
    "bamboohr.com",
    "breezy.hr",
    "jobvite.com",
    "recruitee.com",
    "workable.com",
    "indeed.com",
    "linkedin.com",
    "glassdoor.com",
    "ziprecruiter.com",
    "wellfound.com",
    "weworkremotely.com",
    "remoteok.com",
];

/// Curated company → domain table, loaded from JSON or defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct CompanyDomains {
    /// Explicit domains for canonical company names.
    #[serde(default)]
    pub domains: HashMap<String, String>,
    /// Aliases mapping non-canonical names → canonical names.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

impl CompanyDomains {
    /// Load the table from a JSON file.
    /// Falls back to `default_seed()` on error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|_| Self::default_seed()),
            Err(_) => Self::default_seed(),
        }
    }

    /// Look up the curated domain for a company name.
    ///
    /// Steps:
    /// 1. Alias lookup (normalized) → canonical → domain.
    /// 2. Exact domain match.
    /// 3. Substring fallback (e.g. "Acme Corp, Inc." → "acme corp").
    pub fn domain_for(&self, company: &str) -> Option<String> {
        let s = normalize(company);
        if s.is_empty() {
            return None;
        }

        if let Some(canon) = self.aliases.get(&s) {
            let c = normalize(canon);
            if let Some(d) = self.domains.get(&c) {
                return Some(d.clone());
            }
        }

        if let Some(d) = self.domains.get(&s) {
            return Some(d.clone());
        }

        for (k, d) in &self.domains {
            if s.contains(k.as_str()) {
                return Some(d.clone());
            }
        }

        None
    }

    /// Built-in seed with employers common in the corpus. Used as fallback
    /// if no config is found.
    pub(crate) fn default_seed() -> Self {
        let mut domains = HashMap::new();
        let mut aliases = HashMap::new();

        for (k, v) in [
            ("google", "google.com"),
            ("alphabet", "abc.xyz"),
            ("microsoft", "microsoft.com"),
            ("amazon", "amazon.com"),
            ("apple", "apple.com"),
            ("meta", "meta.com"),
            ("netflix", "netflix.com"),
            ("stripe", "stripe.com"),
            ("airbnb", "airbnb.com"),
            ("shopify", "shopify.com"),
            ("datadog", "datadoghq.com"),
            ("cloudflare", "cloudflare.com"),
            ("target", "target.com"),
            ("best buy", "bestbuy.com"),
            ("general mills", "generalmills.com"),
            ("3m", "3m.com"),
            ("unitedhealth group", "unitedhealthgroup.com"),
            ("us bank", "usbank.com"),
            ("wells fargo", "wellsfargo.com"),
            ("jpmorgan", "jpmorganchase.com"),
        ] {
            domains.insert(k.to_string(), v.to_string());
        }

        for (a, c) in [
            ("google inc", "google"),
            ("google llc", "google"),
            ("alphabet inc", "alphabet"),
            ("meta platforms", "meta"),
            ("facebook", "meta"),
            ("amazon com", "amazon"),
            ("aws", "amazon"),
            ("u s bank", "us bank"),
            ("u s bancorp", "us bank"),
            ("jp morgan", "jpmorgan"),
            ("j p morgan", "jpmorgan"),
            ("jpmorgan chase", "jpmorgan"),
            ("unitedhealth", "unitedhealth group"),
            ("uhg", "unitedhealth group"),
        ] {
            aliases.insert(a.to_string(), c.to_string());
        }

        Self { domains, aliases }
    }
}

/// Extract the host from a URL without pulling in a URL crate: strip the
/// scheme, cut at the first path/query/port separator, drop a leading `www.`.
pub fn url_host(url: &str) -> Option<String> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let host = rest
        .split(['/', '?', '#', ':'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if host.is_empty() || !host.contains('.') {
        return None;
    }
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// True when `host` is (a subdomain of) a generic ATS or job-board domain.
pub fn is_job_board_host(host: &str) -> bool {
    JOB_BOARD_DOMAINS
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{d}")))
}

/// Heuristic last resort: slugify the company name to `{slug}.com`.
/// Corporate suffixes are dropped first, so "Acme Corp, Inc." → "acme.com".
pub fn slug_domain(company: &str) -> Option<String> {
    const SUFFIXES: &[&str] = &["inc", "llc", "ltd", "corp", "co", "company", "gmbh", "plc"];
    let norm = normalize(company);
    let words: Vec<&str> = norm
        .split_whitespace()
        .filter(|w| !SUFFIXES.contains(w))
        .collect();
    let slug: String = words.join("");
    if slug.is_empty() {
        return None;
    }
    Some(format!("{slug}.com"))
}

/// Derive the logo domain for a posting: prefer the apply URL's host when it
/// is not a job-board host, then the curated table, then the slug heuristic.
pub fn derive_domain(
    table: &CompanyDomains,
    company: &str,
    apply_url: Option<&str>,
) -> Option<String> {
    if let Some(host) = apply_url.and_then(url_host) {
        if !is_job_board_host(&host) {
            return Some(host);
        }
    }
    if let Some(d) = table.domain_for(company) {
        return Some(d);
    }
    slug_domain(company)
}

/// Normalize input string: lowercase, replace punctuation/dashes with spaces,
/// collapse multiple spaces into one.
fn normalize(s: &str) -> String {
    let mut out = s.trim().to_ascii_lowercase();

    for ch in ['—', '–', '-', '_', '/', '\\'] {
        out = out.replace(ch, " ");
    }
    out = out.replace(['\n', '\r', '\t', '.', ',', '&', '’', '\''], " ");

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CompanyDomains {
        CompanyDomains::default_seed()
    }

    #[test]
    fn exact_match() {
        assert_eq!(table().domain_for("Google"), Some("google.com".into()));
    }

    #[test]
    fn alias_match() {
        let t = table();
        assert_eq!(t.domain_for("Meta Platforms"), Some("meta.com".into()));
        assert_eq!(t.domain_for("J.P. Morgan"), Some("jpmorganchase.com".into()));
    }

    #[test]
    fn substring_match() {
        assert_eq!(
            table().domain_for("Google Cloud Platform"),
            Some("google.com".into())
        );
    }

    #[test]
    fn unknown_company_has_no_curated_domain() {
        assert_eq!(table().domain_for("Totally Unknown LLC"), None);
    }

    #[test]
    fn url_host_strips_scheme_www_and_path() {
        assert_eq!(
            url_host("https://www.acme.com/careers/123?ref=x"),
            Some("acme.com".into())
        );
        assert_eq!(url_host("http://jobs.acme.io:8080/p"), Some("jobs.acme.io".into()));
        assert_eq!(url_host("not a url"), None);
    }

    #[test]
    fn board_hosts_are_excluded() {
        assert!(is_job_board_host("boards.greenhouse.io"));
        assert!(is_job_board_host("jobs.lever.co"));
        assert!(is_job_board_host("acme.wd5.myworkdayjobs.com"));
        assert!(!is_job_board_host("acme.com"));
    }

    #[test]
    fn slug_drops_corporate_suffixes() {
        assert_eq!(slug_domain("Acme Corp, Inc."), Some("acme.com".into()));
        assert_eq!(slug_domain("Blue Cross Blue Shield"), Some("bluecrossblueshield.com".into()));
        assert_eq!(slug_domain("  "), None);
    }

    #[test]
    fn derive_prefers_company_site_over_board() {
        let t = table();
        // Company-hosted apply URL wins.
        assert_eq!(
            derive_domain(&t, "Acme", Some("https://acme.com/jobs/1")),
            Some("acme.com".into())
        );
        // Board-hosted apply URL defers to the table, then the slug.
        assert_eq!(
            derive_domain(&t, "Google", Some("https://boards.greenhouse.io/google/1")),
            Some("google.com".into())
        );
        assert_eq!(
            derive_domain(&t, "Tiny Startup", Some("https://jobs.lever.co/tiny/1")),
            Some("tinystartup.com".into())
        );
    }
}
