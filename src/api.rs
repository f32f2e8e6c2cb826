// src/api.rs
// HTTP surface. Every engine is a request/response batch operation:
// automated triggers authenticate with the shared automation secret,
// user-triggered ones with a session bearer token. Business failures are
// HTTP 200 `{success:false, error}`; transport/auth failures are 4xx/5xx
// with a sanitized message, never a raw upstream body.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::classify::{ClassifyEngine, ClassifyFilter, ClassifyOutcome};
use crate::config::PipelineConfig;
use crate::freshness;
use crate::ingest::{IngestEngine, IngestFilter, IngestOutcome};
use crate::logo::{self, BackfillOutcome, LogoResolver, ResolvedLogo};
use crate::model::SourceStatus;
use crate::sources::SourceRegistry;
use crate::store::Storage;
use crate::verify::{VerifyEngine, VerifyFilter, VerifyOutcome};

/// Seam to the auth system (an external collaborator): validates a
/// logged-in user's session token.
pub trait SessionValidator: Send + Sync {
    fn validate(&self, token: &str) -> bool;
}

/// Env-driven stand-in: accepts the single token in `SESSION_API_TOKEN`.
pub struct EnvSessionValidator {
    token: Option<String>,
}

impl EnvSessionValidator {
    pub fn from_env() -> Self {
        Self {
            token: std::env::var("SESSION_API_TOKEN").ok(),
        }
    }
}

impl SessionValidator for EnvSessionValidator {
    fn validate(&self, token: &str) -> bool {
        self.token.as_deref() == Some(token)
    }
}

/// Fixed-token validator for tests.
pub struct StaticSessionValidator(pub String);

impl SessionValidator for StaticSessionValidator {
    fn validate(&self, token: &str) -> bool {
        self.0 == token
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Storage>,
    pub registry: Arc<SourceRegistry>,
    pub ingest: Arc<IngestEngine>,
    pub verify: Arc<VerifyEngine>,
    pub classify: Arc<ClassifyEngine>,
    pub logos: Arc<LogoResolver>,
    pub sessions: Arc<dyn SessionValidator>,
    /// Shared secret for automated/scheduled triggers (`CRON_SECRET`).
    pub cron_secret: Option<String>,
    pub cfg: PipelineConfig,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/freshness", get(freshness_report))
        .route("/api/sources", get(list_sources))
        .route("/api/ingest/run", post(ingest_run))
        .route("/api/verify/run", post(verify_run))
        .route("/api/classify/run", post(classify_run))
        .route("/api/logos/resolve", post(logos_resolve))
        .route("/api/logos/backfill", post(logos_backfill))
        .route("/api/admin/source-status", post(set_source_status))
        .route("/debug/runs", get(debug_runs))
        .route("/debug/logs", get(debug_logs))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Auth helpers
// ---------------------------------------------------------------------------

type ApiError = (StatusCode, Json<serde_json::Value>);

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|s| s.trim().to_string())
}

fn unauthorized() -> ApiError {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "Unauthorized"})),
    )
}

/// Automated/scheduled operations: shared secret compared by equality.
fn require_cron_secret(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(secret) = &state.cron_secret else {
        // Configuration error, not an auth error: fail loudly, never retry.
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "automation secret not configured"})),
        ));
    };
    match bearer_token(headers) {
        Some(tok) if tok == *secret => Ok(()),
        _ => Err(unauthorized()),
    }
}

/// End-user-triggered operations: session token validated through the seam.
fn require_session(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    match bearer_token(headers) {
        Some(tok) if state.sessions.validate(&tok) => Ok(()),
        _ => Err(unauthorized()),
    }
}

fn business_error(msg: &str) -> Response {
    Json(json!({"success": false, "error": msg})).into_response()
}

// ---------------------------------------------------------------------------
// Read endpoints
// ---------------------------------------------------------------------------

async fn freshness_report(State(state): State<AppState>) -> Response {
    let report = freshness::compute(state.store.as_ref(), state.cfg.freshness(), Utc::now());
    Json(report).into_response()
}

#[derive(Serialize)]
struct SourceHealthOut {
    id: String,
    name: String,
    kind: crate::model::SourceKind,
    status: SourceStatus,
    consecutive_failures: u32,
    reliability: f64,
    last_success_at: Option<chrono::DateTime<Utc>>,
    next_poll_at: chrono::DateTime<Utc>,
    priority: bool,
}

async fn list_sources(State(state): State<AppState>) -> Json<Vec<SourceHealthOut>> {
    let out = state
        .store
        .list_sources()
        .into_iter()
        .map(|s| SourceHealthOut {
            id: s.id,
            name: s.name,
            kind: s.kind,
            status: s.status,
            consecutive_failures: s.consecutive_failures,
            reliability: s.reliability,
            last_success_at: s.last_success_at,
            next_poll_at: s.next_poll_at,
            priority: s.priority,
        })
        .collect();
    Json(out)
}

async fn debug_runs(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    let n = q.get("n").and_then(|v| v.parse().ok()).unwrap_or(10);
    Json(state.store.recent_runs(n)).into_response()
}

async fn debug_logs(
    State(state): State<AppState>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    let n = q.get("n").and_then(|v| v.parse().ok()).unwrap_or(20);
    Json(state.store.recent_logs(n)).into_response()
}

// ---------------------------------------------------------------------------
// Engine triggers
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct IngestResp {
    success: bool,
    #[serde(flatten)]
    outcome: IngestOutcome,
}

async fn ingest_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(filter): Json<IngestFilter>,
) -> Result<Response, ApiError> {
    require_cron_secret(&state, &headers)?;
    let outcome = state.ingest.run(filter).await;
    Ok(Json(IngestResp {
        success: true,
        outcome,
    })
    .into_response())
}

#[derive(Serialize)]
struct VerifyResp {
    success: bool,
    #[serde(flatten)]
    outcome: VerifyOutcome,
}

async fn verify_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(filter): Json<VerifyFilter>,
) -> Result<Response, ApiError> {
    require_cron_secret(&state, &headers)?;
    let outcome = state.verify.run(filter).await;
    Ok(Json(VerifyResp {
        success: true,
        outcome,
    })
    .into_response())
}

#[derive(Serialize)]
struct ClassifyResp {
    success: bool,
    #[serde(flatten)]
    outcome: ClassifyOutcome,
}

async fn classify_run(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(filter): Json<ClassifyFilter>,
) -> Result<Response, ApiError> {
    require_cron_secret(&state, &headers)?;
    if !state.classify.client_enabled() {
        return Ok(business_error("AI enrichment is disabled"));
    }
    let outcome = state.classify.run(filter).await;
    Ok(Json(ClassifyResp {
        success: true,
        outcome,
    })
    .into_response())
}

// ---------------------------------------------------------------------------
// Logo endpoints
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct LogoResolveReq {
    job_id: Option<String>,
    company: Option<String>,
    apply_url: Option<String>,
    logo_url: Option<String>,
}

#[derive(Serialize)]
struct LogoResolveResp {
    success: bool,
    result: ResolvedLogo,
}

async fn logos_resolve(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LogoResolveReq>,
) -> Result<Response, ApiError> {
    require_session(&state, &headers)?;
    let now = Utc::now();

    if let Some(job_id) = &req.job_id {
        let Some(mut job) = state.store.get_job(job_id) else {
            return Ok(business_error("job not found"));
        };
        let result = state
            .logos
            .resolve_for_job(&mut job, req.logo_url.as_deref(), now)
            .await;
        state.store.update_job(job);
        return Ok(Json(LogoResolveResp {
            success: true,
            result,
        })
        .into_response());
    }

    if let Some(company) = &req.company {
        let result = state
            .logos
            .resolve(
                company,
                req.apply_url.as_deref(),
                req.logo_url.as_deref(),
                now,
            )
            .await;
        return Ok(Json(LogoResolveResp {
            success: true,
            result,
        })
        .into_response());
    }

    Ok(business_error("job_id or company is required"))
}

#[derive(Debug, Default, Deserialize)]
struct LogoBackfillReq {
    batch_size: Option<usize>,
}

#[derive(Serialize)]
struct LogoBackfillResp {
    success: bool,
    #[serde(flatten)]
    outcome: BackfillOutcome,
}

async fn logos_backfill(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LogoBackfillReq>,
) -> Result<Response, ApiError> {
    require_cron_secret(&state, &headers)?;
    let outcome = logo::backfill(
        state.logos.as_ref(),
        state.store.as_ref(),
        req.batch_size.unwrap_or(state.cfg.logo_default_batch),
        state.cfg.logo_backfill_delay_ms,
        Utc::now(),
    )
    .await;
    Ok(Json(LogoBackfillResp {
        success: true,
        outcome,
    })
    .into_response())
}

// ---------------------------------------------------------------------------
// Operator actions
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SourceStatusReq {
    source_id: String,
    status: SourceStatus,
}

async fn set_source_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SourceStatusReq>,
) -> Result<Response, ApiError> {
    require_cron_secret(&state, &headers)?;
    if state.registry.set_status(&req.source_id, req.status) {
        Ok(Json(json!({"success": true})).into_response())
    } else {
        Ok(business_error("source not found"))
    }
}
