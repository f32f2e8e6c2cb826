//! AI adapter: provider abstraction + file cache + daily limit.
//! The enrichment contract is a fixed JSON schema (summary, responsibilities,
//! qualifications, tech_stack, benefits, visa_info); providers that cannot
//! produce it fail the item, they never fail the batch.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::model::Enrichment;

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

/// Trait object used by the classify engine (and tests).
#[async_trait::async_trait]
pub trait EnrichClient: Send + Sync {
    /// Derive structured fields from a posting's text.
    async fn enrich(&self, input: &str) -> Result<Enrichment>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
    /// False when the client can never succeed (disabled / unconfigured).
    fn enabled(&self) -> bool {
        true
    }
}

/// Build-time config loaded from `config/ai.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub enabled: bool,
    /// "openai" is the only real provider today.
    pub provider: Option<String>,
    pub model: Option<String>,
    /// Optional per-day limit on real API calls; defaults to 200 if absent.
    pub daily_limit: Option<u32>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: None,
            model: None,
            daily_limit: Some(200),
        }
    }
}

/// Load config from `config/ai.json`. If reading/parsing fails, returns
/// `AiConfig::default()`.
pub fn load_ai_config() -> AiConfig {
    let path = Path::new("config/ai.json");
    match fs::read_to_string(path) {
        Ok(s) => serde_json::from_str(&s).unwrap_or_default(),
        Err(_) => AiConfig::default(),
    }
}

pub type DynEnrichClient = Arc<dyn EnrichClient>;

/// Factory: build a client according to config and environment variables.
///
/// * If `AI_TEST_MODE=mock`, returns a deterministic mock client.
/// * Else if `config.enabled==false`, returns a disabled client.
/// * Else builds the real provider wrapped with caching + daily limit.
pub fn build_client_from_config(config: &AiConfig) -> DynEnrichClient {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        let mock = MockProvider {
            fixed: mock_enrichment(),
        };
        let client = CachingClient::new(
            mock,
            default_cache_dir(),
            config.daily_limit.unwrap_or(200),
        );
        return Arc::new(client);
    }

    if !config.enabled {
        return Arc::new(DisabledClient);
    }

    match config.provider.as_deref() {
        Some("openai") => {
            let provider = OpenAiProvider::new(config.model.as_deref());
            let client = CachingClient::new(
                provider,
                default_cache_dir(),
                config.daily_limit.unwrap_or(200),
            );
            Arc::new(client)
        }
        _ => Arc::new(DisabledClient),
    }
}

fn mock_enrichment() -> Enrichment {
    Enrichment {
        summary: "Mock enrichment for local runs".to_string(),
        responsibilities: vec!["Ship features".to_string()],
        qualifications: vec!["Rust".to_string()],
        tech_stack: vec!["rust".to_string(), "postgres".to_string()],
        benefits: vec![],
        visa_info: None,
    }
}

// ------------------------------------------------------------
// Provider abstraction + concrete providers
// ------------------------------------------------------------

/// Low-level provider: does a *real* remote call. Separated so the same
/// caching wrapper serves production and tests.
#[async_trait::async_trait]
pub trait Provider: Send + Sync + 'static {
    async fn fetch(&self, input: &str) -> Result<Enrichment>;
    fn name(&self) -> &'static str;
}

/// OpenAI provider (Chat Completions, JSON response). Requires `OPENAI_API_KEY`.
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(model_override: Option<&str>) -> Self {
        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        let http = reqwest::Client::builder()
            .user_agent("jobpulse/0.1 (+enrichment)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        let model = model_override.unwrap_or("gpt-4o-mini").to_string();
        Self {
            http,
            api_key,
            model,
        }
    }
}

const SYSTEM_PROMPT: &str = "You extract structured data from job postings. \
Respond with ONLY a JSON object with exactly these keys: \
summary (string, <=2 sentences), responsibilities (array of strings), \
qualifications (array of strings), tech_stack (array of lowercase strings), \
benefits (array of strings), visa_info (string or null). \
No markdown, no commentary.";

#[async_trait::async_trait]
impl Provider for OpenAiProvider {
    async fn fetch(&self, input: &str) -> Result<Enrichment> {
        if self.api_key.is_empty() {
            return Err(anyhow!("OPENAI_API_KEY missing"));
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
            response_format: ResponseFormat<'a>,
        }
        #[derive(Serialize)]
        struct ResponseFormat<'a> {
            #[serde(rename = "type")]
            kind: &'a str,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: input,
                },
            ],
            temperature: 0.0,
            max_tokens: 700,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("enrichment request")?;

        let status = resp.status();
        if !status.is_success() {
            // Never bubble the raw upstream body; the status is enough.
            return Err(anyhow!("enrichment upstream returned {status}"));
        }
        let body: Resp = resp.json().await.context("enrichment response json")?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or("");
        let parsed: Enrichment =
            serde_json::from_str(content).context("enrichment schema parse")?;
        Ok(sanitize_enrichment(parsed))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Always errs; used when AI enrichment is switched off.
pub struct DisabledClient;

#[async_trait::async_trait]
impl EnrichClient for DisabledClient {
    async fn enrich(&self, _input: &str) -> Result<Enrichment> {
        Err(anyhow!("AI enrichment is disabled"))
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
    fn enabled(&self) -> bool {
        false
    }
}

/// Deterministic provider for tests/local runs.
#[derive(Clone)]
pub struct MockProvider {
    pub fixed: Enrichment,
}

#[async_trait::async_trait]
impl Provider for MockProvider {
    async fn fetch(&self, _input: &str) -> Result<Enrichment> {
        Ok(self.fixed.clone())
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Caching client wrapper (file cache + daily limit)
// ------------------------------------------------------------

/// File names and counter state are guarded by a `Mutex` to keep it simple
/// and safe. Cache hits do not count against the daily limit.
pub struct CachingClient<P: Provider> {
    inner: P,
    cache_dir: PathBuf,
    daily_limit_max: u32,
    counter: Arc<Mutex<DailyCounter>>,
}

impl<P: Provider> CachingClient<P> {
    pub fn new(inner: P, cache_dir: PathBuf, daily_limit_max: u32) -> Self {
        let _ = fs::create_dir_all(&cache_dir);
        let counter = Arc::new(Mutex::new(
            load_daily_counter(&cache_dir).unwrap_or_default(),
        ));
        Self {
            inner,
            cache_dir,
            daily_limit_max,
            counter,
        }
    }

    async fn enrich_impl(&self, input: &str) -> Result<Enrichment> {
        // 1) Check daily limit (real API calls only increment; cache hits do not).
        {
            let mut g = self.counter.lock().expect("poisoned counter");
            if g.is_expired() {
                g.reset_to_today();
                let _ = save_daily_counter(&self.cache_dir, &g);
            }
            if g.count >= self.daily_limit_max {
                return Err(anyhow!("daily enrichment limit reached"));
            }
        }

        // 2) Cache lookup.
        let key = cache_key(input);
        if let Some(hit) = read_cache_file(&self.cache_dir, &key) {
            return Ok(hit);
        }

        // 3) Real call.
        let fresh = sanitize_enrichment(self.inner.fetch(input).await?);
        if fresh.summary.is_empty() {
            return Err(anyhow!("provider returned an empty summary"));
        }
        let _ = write_cache_file(&self.cache_dir, &key, &fresh);
        // Increment after a successful real call.
        let mut g = self.counter.lock().expect("poisoned counter");
        g.count = g.count.saturating_add(1);
        let _ = save_daily_counter(&self.cache_dir, &g);
        Ok(fresh)
    }
}

#[async_trait::async_trait]
impl<P: Provider> EnrichClient for CachingClient<P> {
    async fn enrich(&self, input: &str) -> Result<Enrichment> {
        self.enrich_impl(input).await
    }
    fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
}

// ------------------------------------------------------------
// File cache helpers
// ------------------------------------------------------------

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache/ai")
}

fn cache_key(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hasher
        .finalize()
        .iter()
        .take(16)
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_cache_file(dir: &Path, key: &str) -> Option<Enrichment> {
    let path = cache_path(dir, key);
    let mut file = fs::File::open(path).ok()?;
    let mut buf = String::new();
    file.read_to_string(&mut buf).ok()?;
    serde_json::from_str(&buf).ok()
}

fn write_cache_file(dir: &Path, key: &str, value: &Enrichment) -> io::Result<()> {
    let path = cache_path(dir, key);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
    let mut f = fs::File::create(&tmp)?;
    f.write_all(json.as_bytes())?;
    fs::rename(tmp, path)?;
    Ok(())
}

// ------------------------------------------------------------
// Daily counter helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}
impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}
impl DailyCounter {
    fn is_expired(&self) -> bool {
        self.date != today()
    }
    fn reset_to_today(&mut self) {
        self.date = today();
        self.count = 0;
    }
}

fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

fn load_daily_counter(dir: &Path) -> io::Result<DailyCounter> {
    let p = counter_path(dir);
    let s = fs::read_to_string(p)?;
    let dc: DailyCounter =
        serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(dc)
}

fn save_daily_counter(dir: &Path, dc: &DailyCounter) -> io::Result<()> {
    let p = counter_path(dir);
    let tmp = p.with_extension("json.tmp");
    let s = serde_json::to_string(dc).unwrap_or_else(|_| "{}".to_string());
    let mut f = fs::File::create(&tmp)?;
    f.write_all(s.as_bytes())?;
    fs::rename(tmp, p)?;
    Ok(())
}

// ------------------------------------------------------------
// Sanitization
// ------------------------------------------------------------

/// Bound every field: the schema promises short lists and a short summary,
/// and upstream models occasionally pad both.
pub fn sanitize_enrichment(mut e: Enrichment) -> Enrichment {
    fn clean_list(items: Vec<String>) -> Vec<String> {
        items
            .into_iter()
            .map(|s| s.trim().chars().take(200).collect::<String>())
            .filter(|s| !s.is_empty())
            .take(10)
            .collect()
    }

    e.summary = e.summary.trim().chars().take(500).collect();
    e.responsibilities = clean_list(e.responsibilities);
    e.qualifications = clean_list(e.qualifications);
    e.tech_stack = clean_list(e.tech_stack)
        .into_iter()
        .map(|s| s.to_ascii_lowercase())
        .collect();
    e.benefits = clean_list(e.benefits);
    e.visa_info = e
        .visa_info
        .map(|v| v.trim().chars().take(200).collect::<String>())
        .filter(|v| !v.is_empty());
    e
}
