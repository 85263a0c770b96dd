//! HTTP serving layer: route dispatch over the core service.
//!
//! Routes mirror the published URL scheme: `/geosite/<name>` serves the
//! Surge dialect, `/geosite/{surge,mihomo,egern}/<name>` selects one
//! explicitly, and the bare dialect paths return the index. The `<name>`
//! segment may carry an `@filter` suffix. All core work runs on the
//! blocking pool; handlers never hold the runtime hostage.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;

use crate::error::{Error, Result};
use crate::index::{self, IndexPublisher};
use crate::render::Dialect;
use crate::service::RulesetService;

const CACHE_CONTROL_VALUE: &str = "public, max-age=1800";

/// Shared state behind the router.
pub struct AppState {
    pub service: Arc<RulesetService>,
    pub index: Arc<IndexPublisher>,
    /// Repository URL the root path redirects to.
    pub repo_url: String,
    /// Fixed base URL for index entries; derived per-request when unset.
    pub base_url: Option<String>,
    /// Index mirror file served with priority when present.
    pub index_path: Option<PathBuf>,
}

/// Build the HTTP router over the shared state.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/geosite", get(index_handler))
        .route("/geosite/surge", get(index_handler))
        .route("/geosite/mihomo", get(index_handler))
        .route("/geosite/egern", get(index_handler))
        .route("/geosite/{name}", get(surge_ruleset))
        .route("/geosite/surge/{name}", get(surge_ruleset))
        .route("/geosite/mihomo/{name}", get(mihomo_ruleset))
        .route("/geosite/egern/{name}", get(egern_ruleset))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();
    let response = next.run(request).await;
    log::info!("{} {} {:?}", method, path, start.elapsed());
    response
}

async fn root(State(state): State<Arc<AppState>>) -> Redirect {
    Redirect::to(&state.repo_url)
}

async fn index_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    // Priority 1: the mirror file, when a fronting job maintains one.
    if let Some(path) = &state.index_path {
        if let Ok(body) = tokio::fs::read(path).await {
            return json_response(body);
        }
    }

    // Priority 2: the in-memory derived index.
    if let Some(body) = state.index.body() {
        return json_response(body);
    }

    // Priority 3: derive on the fly from the current archive.
    let base_url = effective_base_url(&state, &headers);
    let service = Arc::clone(&state.service);
    let built = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
        let (archive, _) = service.current()?;
        index::build_index(&archive, &base_url)
    })
    .await;

    match built {
        Ok(Ok(body)) => json_response(body),
        Ok(Err(e)) => error_response(&e),
        Err(e) => {
            (StatusCode::INTERNAL_SERVER_ERROR, format!("index task failed: {e}")).into_response()
        }
    }
}

async fn surge_ruleset(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    serve_ruleset(state, name, Dialect::Surge).await
}

async fn mihomo_ruleset(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    serve_ruleset(state, name, Dialect::Mihomo).await
}

async fn egern_ruleset(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    serve_ruleset(state, name, Dialect::Egern).await
}

async fn serve_ruleset(state: Arc<AppState>, raw_name: String, dialect: Dialect) -> Response {
    let raw_name = raw_name.trim().to_lowercase();
    let (name, filter) = match raw_name.split_once('@') {
        Some((name, filter)) => (name.to_string(), filter.to_string()),
        None => (raw_name, String::new()),
    };
    if name.is_empty() {
        return (StatusCode::BAD_REQUEST, "invalid name parameter").into_response();
    }

    let service = Arc::clone(&state.service);
    let result =
        tokio::task::spawn_blocking(move || service.ruleset(&name, &filter, dialect)).await;

    match result {
        Ok(Ok(text)) => (
            [
                (header::CONTENT_TYPE, dialect.content_type()),
                (header::CACHE_CONTROL, CACHE_CONTROL_VALUE),
            ],
            text,
        )
            .into_response(),
        Ok(Err(e)) => error_response(&e),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("ruleset task failed: {e}"),
        )
            .into_response(),
    }
}

fn json_response(body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CACHE_CONTROL, CACHE_CONTROL_VALUE),
        ],
        body,
    )
        .into_response()
}

fn error_response(error: &Error) -> Response {
    let status = if error.is_not_found() {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, error.to_string()).into_response()
}

/// Base URL for index entries: the configured one, else reconstructed
/// from forwarding headers the way reverse proxies present them.
fn effective_base_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(base) = &state.base_url {
        return format!("{}/geosite", base.trim_end_matches('/'));
    }

    let host = headers
        .get("x-forwarded-host")
        .or_else(|| headers.get(header::HOST))
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("http");
    format!("{proto}://{host}/geosite")
}
