//! HTTP API for the catalog UI.
//!
//! # Endpoints
//!
//! | Method | Path | Auth | Description |
//! |--------|------|------|-------------|
//! | `GET`  | `/health` | | Health check (returns version) |
//! | `GET`  | `/api/repos` | | Paginated list, total in `X-Total-Count` |
//! | `GET`  | `/api/repos/count` | | `{ "count": n }` |
//! | `GET`  | `/api/search?q=` | | Match description or display name |
//! | `GET`  | `/api/search-readme?q=` | | Match README text |
//! | `GET`  | `/api/repos/{id}` | | One record, README included |
//! | `PUT`  | `/api/repos/{id}` | yes | Replace the accepted manifest |
//! | `PUT`  | `/api/repos/{id}/metadata` | yes | Replace the metadata map |
//! | `POST` | `/api/repos/{id}/generate` | yes | Re-run extraction (`{"force": bool}`) |
//! | `POST` | `/api/repos/{id}/approve` | yes | Promote the proposed manifest |
//! | `POST` | `/api/repos` | yes | Add `{"fullName": "owner/repo[/dir]"}` |
//! | `POST` | `/api/collect` | yes | Start a collection run in the background |
//!
//! Write routes accept the access token from the configured cookie or an
//! `Authorization: Bearer` header. Without `CATALOG_ACCESS_TOKEN` set they
//! always answer 401.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "repository 42 not found" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `not_found` (404),
//! `no_manifest` (422), `internal` (500).

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use mcp_catalog_core::manifest::Manifest;
use mcp_catalog_core::metadata::Metadata;
use mcp_catalog_core::models::RepositoryView;
use mcp_catalog_core::store::{ListQuery, SearchField, SortKey, SortOrder};

use crate::config::Config;
use crate::error::IngestError;
use crate::ingest::IngestOutcome;
use crate::service::CatalogService;

const TOTAL_COUNT: &str = "x-total-count";
const DEFAULT_LIST_LIMIT: i64 = 10_000;
const DEFAULT_SEARCH_LIMIT: i64 = 100;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    service: Arc<CatalogService>,
    access_token: Option<Arc<str>>,
    cookie_name: Arc<str>,
}

impl AppState {
    pub fn new(
        service: Arc<CatalogService>,
        access_token: Option<String>,
        cookie_name: impl Into<String>,
    ) -> Self {
        Self {
            service,
            access_token: access_token
                .filter(|t| !t.trim().is_empty())
                .map(Arc::from),
            cookie_name: Arc::from(cookie_name.into()),
        }
    }

    fn authorize(&self, jar: &CookieJar, headers: &HeaderMap) -> Result<(), AppError> {
        let expected = self
            .access_token
            .as_deref()
            .ok_or_else(|| unauthorized("no access token configured"))?;
        let from_cookie = jar.get(&self.cookie_name).map(|c| c.value().to_string());
        let from_header = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|v| v.trim().to_string());
        if from_cookie.as_deref() == Some(expected) || from_header.as_deref() == Some(expected) {
            Ok(())
        } else {
            Err(unauthorized("missing or invalid access token"))
        }
    }
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([HeaderName::from_static(TOTAL_COUNT)]);
    match HeaderValue::from_str(origin) {
        Ok(value) if origin != "*" => layer.allow_origin(value).allow_credentials(true),
        _ => layer.allow_origin(Any),
    }
}

pub fn router(state: AppState, cors_origin: &str) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/api/repos", get(handle_list).post(handle_add))
        .route("/api/repos/count", get(handle_count))
        .route("/api/search", get(handle_search))
        .route("/api/search-readme", get(handle_search_readme))
        .route("/api/repos/{id}", get(handle_get).put(handle_put_manifest))
        .route("/api/repos/{id}/metadata", put(handle_put_metadata))
        .route("/api/repos/{id}/generate", post(handle_generate))
        .route("/api/repos/{id}/approve", post(handle_approve))
        .route("/api/collect", post(handle_collect))
        .layer(cors_layer(cors_origin))
        .with_state(state)
}

/// Serve the API until the process is terminated.
pub async fn run_server(config: &Config, service: Arc<CatalogService>) -> anyhow::Result<()> {
    let token = std::env::var("CATALOG_ACCESS_TOKEN").ok();
    if token.is_none() {
        warn!("CATALOG_ACCESS_TOKEN not set; write endpoints are disabled");
    }
    let state = AppState::new(service, token, config.server.cookie_name.clone());
    let app = router(state, &config.server.cors_origin);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "catalog API listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        internal(format!("{:#}", err))
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        let message = err.to_string();
        match err {
            IngestError::NotFound(_) => not_found(message),
            _ if err.is_client_error() => bad_request(message),
            _ if err.is_skip() => AppError {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                code: "no_manifest",
                message,
            },
            _ => internal(message),
        }
    }
}

// ============ Read routes ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Deserialize, Default)]
struct ListParams {
    filter: Option<String>,
    sort: Option<String>,
    order: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

/// `None` for an absent filter or the `all` pseudo-tag.
fn tag_filter(filter: Option<&str>) -> Option<String> {
    filter
        .map(str::trim)
        .filter(|f| !f.is_empty() && !f.eq_ignore_ascii_case("all"))
        .map(str::to_string)
}

impl ListParams {
    /// Unknown sort keys and orders fall back to the defaults.
    fn to_query(&self) -> ListQuery {
        let sort = match self.sort.as_deref() {
            Some("name") => SortKey::Name,
            Some("id") => SortKey::Id,
            _ => SortKey::Stars,
        };
        let order = match self.order.as_deref() {
            Some("asc") => SortOrder::Asc,
            _ => SortOrder::Desc,
        };
        ListQuery {
            tag: tag_filter(self.filter.as_deref()),
            sort,
            order,
            limit: self.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIST_LIMIT),
            offset: self.offset.filter(|o| *o >= 0).unwrap_or(0),
        }
    }
}

async fn handle_list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Response, AppError> {
    let query = params.to_query();
    let store = state.service.store();
    let records = store.list(&query).await?;
    let total = store.count(query.tag.as_deref()).await?;
    let views: Vec<RepositoryView> = records
        .iter()
        .map(|r| RepositoryView::from_record(r, false))
        .collect();
    Ok(([(TOTAL_COUNT, total.to_string())], Json(views)).into_response())
}

#[derive(Deserialize)]
struct CountParams {
    filter: Option<String>,
}

async fn handle_count(
    State(state): State<AppState>,
    Query(params): Query<CountParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let tag = tag_filter(params.filter.as_deref());
    let count = state.service.store().count(tag.as_deref()).await?;
    Ok(Json(serde_json::json!({ "count": count })))
}

#[derive(Deserialize)]
struct SearchParams {
    q: Option<String>,
    limit: Option<i64>,
}

async fn search(
    state: &AppState,
    params: SearchParams,
    field: SearchField,
) -> Result<Json<Vec<RepositoryView>>, AppError> {
    let text = params.q.unwrap_or_default();
    if text.trim().is_empty() {
        return Err(bad_request("q must not be empty"));
    }
    let limit = params
        .limit
        .filter(|l| *l > 0)
        .unwrap_or(DEFAULT_SEARCH_LIMIT);
    let records = state
        .service
        .store()
        .search(text.trim(), field, limit)
        .await?;
    Ok(Json(
        records
            .iter()
            .map(|r| RepositoryView::from_record(r, false))
            .collect(),
    ))
}

async fn handle_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<RepositoryView>>, AppError> {
    search(&state, params, SearchField::Description).await
}

async fn handle_search_readme(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<RepositoryView>>, AppError> {
    search(&state, params, SearchField::Readme).await
}

async fn handle_get(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<RepositoryView>, AppError> {
    let record = state
        .service
        .store()
        .get(id)
        .await?
        .ok_or_else(|| not_found(format!("repository {} not found", id)))?;
    Ok(Json(RepositoryView::from_record(&record, true)))
}

// ============ Write routes ============

fn parse_body<T: serde::de::DeserializeOwned + Default>(body: &Bytes) -> Result<T, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| bad_request(format!("invalid JSON body: {}", e)))
}

async fn handle_put_manifest(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<RepositoryView>, AppError> {
    state.authorize(&jar, &headers)?;
    let manifest: Manifest = parse_body(&body)?;
    let record = state.service.set_manifest(id, manifest).await?;
    Ok(Json(RepositoryView::from_record(&record, false)))
}

async fn handle_put_metadata(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<RepositoryView>, AppError> {
    state.authorize(&jar, &headers)?;
    let metadata: Metadata = parse_body(&body)?;
    let record = state.service.set_metadata(id, metadata).await?;
    Ok(Json(RepositoryView::from_record(&record, false)))
}

#[derive(Deserialize, Default)]
struct ForceBody {
    #[serde(default)]
    force: bool,
}

async fn outcome_view(state: &AppState, outcome: IngestOutcome) -> Result<Json<RepositoryView>, AppError> {
    let record = state
        .service
        .store()
        .get(outcome.id())
        .await?
        .ok_or_else(|| not_found(format!("repository {} not found", outcome.id())))?;
    Ok(Json(RepositoryView::from_record(&record, false)))
}

async fn handle_generate(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    Path(id): Path<i64>,
    body: Bytes,
) -> Result<Json<RepositoryView>, AppError> {
    state.authorize(&jar, &headers)?;
    let ForceBody { force } = parse_body(&body)?;
    let outcome = state.service.reanalyze(id, force).await?;
    outcome_view(&state, outcome).await
}

async fn handle_approve(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<RepositoryView>, AppError> {
    state.authorize(&jar, &headers)?;
    let record = state.service.approve(id).await?;
    Ok(Json(RepositoryView::from_record(&record, false)))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct AddBody {
    #[serde(default)]
    full_name: String,
    #[serde(default)]
    force: bool,
}

async fn handle_add(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RepositoryView>, AppError> {
    state.authorize(&jar, &headers)?;
    let AddBody { full_name, force } = parse_body(&body)?;
    if full_name.trim().is_empty() {
        return Err(bad_request("fullName must not be empty"));
    }
    let outcome = state.service.add_repository(&full_name, force).await?;
    outcome_view(&state, outcome).await
}

#[derive(Deserialize, Default)]
struct CollectBody {
    #[serde(default)]
    force: bool,
    #[serde(default)]
    limit: Option<usize>,
}

async fn handle_collect(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    state.authorize(&jar, &headers)?;
    let CollectBody { force, limit } = parse_body(&body)?;
    let service = state.service.clone();
    tokio::spawn(async move {
        service.collect(force, limit).await;
    });
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "started" })),
    ))
}
