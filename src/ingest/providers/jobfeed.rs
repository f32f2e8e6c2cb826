// src/ingest/providers/jobfeed.rs
// RSS job feeds from aggregator boards. No stable native id, so dedup falls
// back to the normalized content hash. Item titles follow the common board
// convention "Role at Company (Location)".

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::time::Duration;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::ingest::types::{JobFetcher, RawPosting};
use crate::ingest::{extract_list_items, infer_work_type, normalize_text, parse_salary_range};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_rfc2822_to_utc(ts: &str) -> Option<DateTime<Utc>> {
    let unix = OffsetDateTime::parse(ts, &Rfc2822)
        .ok()?
        .to_offset(UtcOffset::UTC)
        .unix_timestamp();
    DateTime::from_timestamp(unix, 0)
}

/// Split "Role at Company (Location)" into its parts. Missing pieces fall
/// back to the whole title / the feed's default company / "Unspecified".
fn split_feed_title(title: &str) -> (String, Option<String>, Option<String>) {
    let mut rest = title.trim().to_string();

    let mut location = None;
    if rest.ends_with(')') {
        if let Some(open) = rest.rfind('(') {
            let loc = rest[open + 1..rest.len() - 1].trim().to_string();
            if !loc.is_empty() {
                location = Some(loc);
            }
            rest.truncate(open);
            rest = rest.trim_end().to_string();
        }
    }

    let mut company = None;
    if let Some(idx) = rest.rfind(" at ") {
        let c = rest[idx + 4..].trim().to_string();
        if !c.is_empty() {
            company = Some(c);
            rest.truncate(idx);
        }
    }

    (rest.trim().to_string(), company, location)
}

pub struct JobFeedProvider {
    name: String,
    default_company: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl JobFeedProvider {
    pub fn from_fixture(name: &str, body: &str) -> Self {
        Self {
            name: name.to_string(),
            default_company: name.to_string(),
            mode: Mode::Fixture(body.to_string()),
        }
    }

    pub fn from_url(name: &str, url: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("jobpulse/0.1 (+ingest)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(15))
            .build()
            .expect("reqwest client");
        Self {
            name: name.to_string(),
            default_company: name.to_string(),
            mode: Mode::Http {
                url: url.to_string(),
                client,
            },
        }
    }

    fn parse_items_from_str(&self, s: &str) -> Result<Vec<RawPosting>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean).context("parsing job feed xml")?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let raw_title = it.title.as_deref().unwrap_or_default();
            let (title, company, location) = split_feed_title(raw_title);
            let title = normalize_text(&title);
            if title.is_empty() {
                continue;
            }

            let raw_desc = it.description.as_deref().unwrap_or_default();
            let description = normalize_text(raw_desc);
            let location = location.unwrap_or_else(|| "Unspecified".to_string());
            let (salary_min, salary_max) = parse_salary_range(&description);

            out.push(RawPosting {
                native_id: None,
                work_type: infer_work_type(&location, &title),
                company: company.unwrap_or_else(|| self.default_company.clone()),
                title,
                location,
                salary_min,
                salary_max,
                requirements: extract_list_items(raw_desc),
                description,
                apply_url: it.link,
                posted_at: it.pub_date.as_deref().and_then(parse_rfc2822_to_utc),
                ats_logo_url: None,
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        counter!("ingest_postings_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl JobFetcher for JobFeedProvider {
    async fn fetch_latest(&self) -> Result<Vec<RawPosting>> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_items_from_str(s),
            Mode::Http { url, client } => {
                let body = client
                    .get(url)
                    .send()
                    .await
                    .context("job feed get()")?
                    .error_for_status()
                    .context("job feed non-2xx")?
                    .text()
                    .await
                    .context("job feed .text()")?;
                self.parse_items_from_str(&body)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Remote Jobs</title>
    <item>
      <title>Senior Rust Engineer at Acme Corp (Remote)</title>
      <link>https://boards.example.com/p/1</link>
      <pubDate>Sun, 01 Jun 2025 09:00:00 GMT</pubDate>
      <description>Own the pipeline. Salary $140,000 - $180,000.</description>
    </item>
    <item>
      <title>Data Analyst</title>
      <link>https://boards.example.com/p/2</link>
      <pubDate>not a date</pubDate>
      <description></description>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn splits_board_convention_titles() {
        let (t, c, l) = split_feed_title("Senior Rust Engineer at Acme Corp (Remote)");
        assert_eq!(t, "Senior Rust Engineer");
        assert_eq!(c.as_deref(), Some("Acme Corp"));
        assert_eq!(l.as_deref(), Some("Remote"));

        let (t, c, l) = split_feed_title("Data Analyst");
        assert_eq!(t, "Data Analyst");
        assert!(c.is_none() && l.is_none());
    }

    #[tokio::test]
    async fn parses_feed_fixture() {
        let p = JobFeedProvider::from_fixture("Remote Jobs", FIXTURE);
        let items = p.fetch_latest().await.unwrap();
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert!(first.native_id.is_none(), "feeds have no native id");
        assert_eq!(first.company, "Acme Corp");
        assert_eq!(first.location, "Remote");
        assert_eq!(first.salary_min, Some(140_000));
        assert_eq!(first.salary_max, Some(180_000));
        assert!(first.posted_at.is_some());

        // Unparseable dates degrade to None, company falls back to the feed.
        let second = &items[1];
        assert!(second.posted_at.is_none());
        assert_eq!(second.company, "Remote Jobs");
    }
}
