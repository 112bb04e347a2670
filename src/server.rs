//! HTTP server.
//!
//! Exposes catalog synchronization, visit recording, and visit queries as a
//! small JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/repos/sync` | Synchronize the catalog, returns `{changeDetected, items}` |
//! | `GET`  | `/repos` | List stored repositories |
//! | `POST` | `/visits` | Record a visit (201, empty body) |
//! | `GET`  | `/visits` | Public lookup; rows only when `visitor_token` is given |
//! | `GET`  | `/visits/me` | Lookup scoped by the `X-Unique-Visitor-Token` header |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "invalid request: ..." } }
//! ```
//!
//! Error codes: `bad_request` (400), `upstream_error` (502), `store_error` (500).
//!
//! # Requester IP
//!
//! The socket peer address, unless `[server].trust_forwarded_for` is set,
//! in which case the last `X-Forwarded-For` entry (or `X-Real-IP`) wins.

use axum::{
    extract::{ConnectInfo, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::catalog::GitHubStarredFetcher;
use crate::config::Config;
use crate::db;
use crate::error::Error;
use crate::geo;
use crate::migrate;
use crate::models::{RepositoryRecord, RequestInfo, SyncOutcome, VisitFilter, VisitPage};
use crate::sqlite_store::SqliteStore;
use crate::store::Store;
use crate::sync::RepoCatalogSynchronizer;
use crate::visit::VisitRecorder;
use crate::visit_query::VisitorQueryEngine;

pub const VISITOR_TOKEN_HEADER: &str = "x-unique-visitor-token";
pub const REFERRING_ORIGIN_HEADER: &str = "x-referring-origin";

/// The wired-up components behind the HTTP API.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn Store>,
    pub synchronizer: Arc<RepoCatalogSynchronizer>,
    pub recorder: Arc<VisitRecorder>,
    pub queries: Arc<VisitorQueryEngine>,
}

impl Services {
    /// Build production services: SQLite store, GitHub catalog, and the
    /// configured geolocation provider.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(pool));

        let fetcher = Arc::new(GitHubStarredFetcher::new(&config.catalog)?);
        let resolver = geo::create_resolver(&config.geo)?;

        let synchronizer = RepoCatalogSynchronizer::new(fetcher, store.clone())
            .with_fetch_timeout(config.catalog.timeout());
        let recorder =
            VisitRecorder::new(resolver, store.clone()).with_resolve_timeout(config.geo.timeout());
        let queries = VisitorQueryEngine::new(store.clone()).with_limit(config.visits.query_limit);

        Ok(Self {
            store,
            synchronizer: Arc::new(synchronizer),
            recorder: Arc::new(recorder),
            queries: Arc::new(queries),
        })
    }
}

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    services: Services,
    trust_forwarded_for: bool,
}

/// Starts the HTTP server with production services.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let services = Services::from_config(config).await?;
    run_server_with_services(config, services).await
}

/// Starts the HTTP server with caller-supplied services.
///
/// When `[catalog].refresh_interval_secs` is set, a background task also
/// resynchronizes the catalog on that interval.
pub async fn run_server_with_services(config: &Config, services: Services) -> anyhow::Result<()> {
    if let Some(secs) = config.catalog.refresh_interval_secs {
        spawn_periodic_sync(services.synchronizer.clone(), Duration::from_secs(secs));
    }

    let app = router(services, config.server.trust_forwarded_for);

    tracing::info!(bind = %config.server.bind, "server listening");
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Build the router. Requires serving with `ConnectInfo<SocketAddr>`.
pub fn router(services: Services, trust_forwarded_for: bool) -> Router {
    let state = AppState {
        services,
        trust_forwarded_for,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/repos/sync", post(handle_sync))
        .route("/repos", get(handle_list_repos))
        .route("/visits", post(handle_record_visit).get(handle_public_visits))
        .route("/visits/me", get(handle_my_visits))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Run `synchronize()` every `period`. Failures are logged and the loop
/// keeps going.
pub fn spawn_periodic_sync(
    synchronizer: Arc<RepoCatalogSynchronizer>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = synchronizer.synchronize().await {
                tracing::warn!(error = %e, "scheduled catalog sync failed");
            }
        }
    })
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

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let (status, code) = match &err {
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Error::Fetch(_) | Error::Resolution(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            Error::Write(_) | Error::Query(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
        };
        if !err.is_client_error() {
            tracing::error!(kind = err.kind(), error = %err, "request failed");
        }
        Self {
            status,
            code,
            message: err.to_string(),
        }
    }
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

// ============ Request helpers ============

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
}

/// Determine the requester IP for a request.
///
/// With `trust_forwarded_for`, the last `X-Forwarded-For` entry is used: it
/// is the one appended by the proxy in front of us. Earlier entries come from
/// the client and are ignored.
pub fn requester_ip(headers: &HeaderMap, peer: SocketAddr, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = header_str(headers, "x-forwarded-for")
            .and_then(|v| v.rsplit(',').next().map(|s| s.trim().to_string()))
            .filter(|s| !s.is_empty());
        if let Some(ip) = forwarded.or_else(|| header_str(headers, "x-real-ip").filter(|s| !s.is_empty())) {
            return ip;
        }
    }
    peer.ip().to_string()
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Repositories ============

async fn handle_sync(State(state): State<AppState>) -> Result<Json<SyncOutcome>, AppError> {
    let outcome = state.services.synchronizer.synchronize().await?;
    Ok(Json(outcome))
}

#[derive(Serialize)]
struct RepoListResponse {
    items: Vec<RepositoryRecord>,
}

async fn handle_list_repos(State(state): State<AppState>) -> Result<Json<RepoListResponse>, AppError> {
    let items = state.services.store.list_repositories().await?;
    Ok(Json(RepoListResponse { items }))
}

// ============ Visits ============

async fn handle_record_visit(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let request = RequestInfo {
        ip_address: requester_ip(&headers, peer, state.trust_forwarded_for),
        visitor_token: header_str(&headers, VISITOR_TOKEN_HEADER).unwrap_or_default(),
        origin: header_str(&headers, "origin").unwrap_or_default(),
        referring_origin: header_str(&headers, REFERRING_ORIGIN_HEADER).unwrap_or_default(),
        user_agent: header_str(&headers, "user-agent").unwrap_or_default(),
        referrer: header_str(&headers, "referer").unwrap_or_default(),
    };
    state.services.recorder.record(&request).await?;
    Ok(StatusCode::CREATED)
}

async fn handle_public_visits(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(filter): Query<VisitFilter>,
) -> Result<Json<VisitPage>, AppError> {
    let ip = requester_ip(&headers, peer, state.trust_forwarded_for);
    let page = state.services.queries.query_public(&filter, &ip).await?;
    Ok(Json(page))
}

#[derive(Deserialize)]
struct OriginQuery {
    #[serde(default)]
    origin: Option<String>,
}

async fn handle_my_visits(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<OriginQuery>,
) -> Result<Json<VisitPage>, AppError> {
    let ip = requester_ip(&headers, peer, state.trust_forwarded_for);
    let token = header_str(&headers, VISITOR_TOKEN_HEADER);
    let page = state
        .services
        .queries
        .query_for_visitor(token.as_deref(), query.origin.as_deref(), &ip)
        .await?;
    Ok(Json(page))
}
