//! HTTP surface: routes, extract helpers and the layer stack.

mod files;
mod health;
mod jobs;
pub mod stream;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, Request, header::CONTENT_TYPE, header::RANGE},
    routing::{get, post},
};
use serde::{Deserialize, Deserializer, de};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Build the application router. `cors_origins` of `None` allows any origin.
pub fn router(state: Arc<AppState>, cors_origins: Option<Vec<String>>) -> Router {
    let body_limit = usize::try_from(state.limits().max_upload_bytes).unwrap_or(usize::MAX);

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, RANGE]);
    let cors = match cors_origins {
        None => cors.allow_origin(Any),
        Some(list) => {
            let origins: Vec<HeaderValue> = list
                .iter()
                .filter_map(|o| match HeaderValue::from_str(o) {
                    Ok(v) => Some(v),
                    Err(_) => {
                        warn!(origin = %o, "ignoring unusable CORS origin");
                        None
                    }
                })
                .collect();
            cors.allow_origin(AllowOrigin::list(origins))
        }
    };

    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
        tracing::info_span!(
            "http.request",
            method = %request.method(),
            route = %request.uri().path(),
        )
    });

    Router::new()
        .route("/health", get(health::health))
        .route("/api/jobs", post(jobs::create_job).get(jobs::list_jobs))
        .route(
            "/api/jobs/{id}",
            get(jobs::get_job).delete(jobs::delete_job),
        )
        .route("/api/jobs/{id}/tree", get(jobs::tree))
        .route("/api/jobs/{id}/process", post(jobs::process))
        .route("/api/jobs/{id}/repack", post(jobs::repack))
        .route(
            "/api/jobs/{id}/file",
            get(files::read_text).put(files::write_text),
        )
        .route("/api/jobs/{id}/raw", get(files::raw))
        .route("/api/jobs/{id}/download", get(files::download))
        .route("/api/jobs/{id}/fs", axum::routing::delete(files::remove))
        .route("/api/jobs/{id}/fs/move", post(files::move_path))
        .route("/api/jobs/{id}/fs/mkdir", post(files::make_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(trace)
        .with_state(state)
}

/// Run blocking workspace code off the async executor.
pub(crate) async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> vntl_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await??)
}

/// Accepts `1/0`, `true/false`, `yes/no` and `on/off`, as browsers and
/// scripts send all of them.
pub(crate) fn lenient_bool<'de, D>(d: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(d)?;
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(de::Error::custom(format!("expected a boolean, got {other:?}"))),
    }
}

pub(crate) fn bad_query(rej: axum::extract::rejection::QueryRejection) -> ApiError {
    ApiError::bad_request(rej.body_text())
}

pub(crate) fn bad_json(rej: axum::extract::rejection::JsonRejection) -> ApiError {
    ApiError::new(rej.status(), "invalid_params", rej.body_text())
}
