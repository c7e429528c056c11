//! Browsing and editing a job's files.

use std::io;
use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};
use vntl_core::VntlError;
use vntl_core::content::{self, ByteRange, RawFile, parse_range};
use vntl_core::domain::Area;
use vntl_core::sandbox::Sandbox;

use super::stream::blocking_body;
use super::{bad_json, bad_query, blocking, lenient_bool};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(crate) struct PathQuery {
    #[serde(rename = "where", default)]
    area: Area,
    path: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DownloadQuery {
    #[serde(rename = "where", default)]
    area: Area,
    #[serde(default)]
    path: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    zip: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SaveBody {
    content: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MoveBody {
    #[serde(rename = "where", default)]
    area: Area,
    src: String,
    dst: String,
    #[serde(default)]
    overwrite: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PathBody {
    #[serde(rename = "where", default)]
    area: Area,
    path: String,
}

fn ok() -> Json<Value> {
    Json(json!({ "ok": true }))
}

fn mime_for(name: &str) -> HeaderValue {
    let mime = mime_guess::from_path(name).first_or_octet_stream();
    HeaderValue::from_str(mime.as_ref())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}

fn attachment(name: &str) -> HeaderValue {
    let safe: String = name
        .chars()
        .map(|c| if c == '"' || c.is_control() || !c.is_ascii() { '_' } else { c })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{safe}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

fn stream_raw(raw: RawFile) -> Body {
    let what = raw.name.clone();
    blocking_body(what, move |w| {
        io::copy(&mut raw.into_reader(), w)?;
        Ok(())
    })
}

pub(crate) async fn read_text(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    query: Result<Query<PathQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(q) = query.map_err(bad_query)?;
    let manager = state.manager.clone();
    let text = blocking(move || manager.read_text(&id, q.area, &q.path)).await?;
    Ok(text.into_response())
}

pub(crate) async fn write_text(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    query: Result<Query<PathQuery>, QueryRejection>,
    body: Result<Json<SaveBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Query(q) = query.map_err(bad_query)?;
    let Json(b) = body.map_err(bad_json)?;
    let manager = state.manager.clone();
    let size = blocking(move || manager.write_text(&id, q.area, &q.path, &b.content)).await?;
    Ok(Json(json!({ "ok": true, "size": size })))
}

enum RawReply {
    Whole(RawFile),
    Partial(RawFile, ByteRange),
    Unsatisfiable(u64),
}

/// Raw bytes with single-range support. Unsatisfiable ranges give 416.
pub(crate) async fn raw(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    query: Result<Query<PathQuery>, QueryRejection>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let Query(q) = query.map_err(bad_query)?;
    // other range units are ignored and the whole file is sent
    let range_header = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| v.trim_start().starts_with("bytes="))
        .map(str::to_owned);

    let manager = state.manager.clone();
    let reply = blocking(move || {
        let whole = manager.open_raw(&id, q.area, &q.path)?;
        let Some(h) = range_header else {
            return Ok(RawReply::Whole(whole));
        };
        let total = whole.len;
        drop(whole);
        Ok(match parse_range(&h, total) {
            Some(r) => RawReply::Partial(manager.open_range(&id, q.area, &q.path, r)?, r),
            None => RawReply::Unsatisfiable(total),
        })
    })
    .await?;

    let builder = Response::builder().header(header::ACCEPT_RANGES, "bytes");
    let response = match reply {
        RawReply::Whole(raw) => builder
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, mime_for(&raw.name))
            .header(header::CONTENT_LENGTH, raw.len)
            .body(stream_raw(raw)),
        RawReply::Partial(raw, r) => builder
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_TYPE, mime_for(&raw.name))
            .header(header::CONTENT_LENGTH, r.len())
            .header(
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", r.start, r.end, r.total),
            )
            .body(stream_raw(raw)),
        RawReply::Unsatisfiable(total) => builder
            .status(StatusCode::RANGE_NOT_SATISFIABLE)
            .header(header::CONTENT_RANGE, format!("bytes */{total}"))
            .body(Body::empty()),
    };
    response.map_err(|e| ApiError::internal(e.to_string()))
}

/// A single file as an attachment, or with `zip` a bundle of a file, a
/// directory, or the whole area.
pub(crate) async fn download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    query: Result<Query<DownloadQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(q) = query.map_err(bad_query)?;
    let path = q.path.unwrap_or_default();
    let manager = state.manager.clone();

    if q.zip {
        let name = content::bundle_name(q.area.dir_name(), &path);
        // fail before any headers go out when the target is unusable
        let (check_mgr, check_id, check_path) = (manager.clone(), id.clone(), path.clone());
        blocking(move || {
            let job = check_mgr.job(&check_id)?;
            let target = Sandbox::new(job.area(q.area))?.resolve(&check_path)?;
            std::fs::symlink_metadata(&target)
                .map(|_| ())
                .map_err(|_| VntlError::SourceNotFound(check_path))
        })
        .await?;

        let area = q.area;
        let body = blocking_body(name.clone(), move |w| {
            manager.write_zip(&id, area, &path, w).map(|_| ())
        });
        return Response::builder()
            .header(header::CONTENT_TYPE, "application/zip")
            .header(header::CONTENT_DISPOSITION, attachment(&name))
            .body(body)
            .map_err(|e| ApiError::internal(e.to_string()));
    }

    if path.trim().is_empty() {
        return Err(ApiError::bad_request("set zip=1 or provide path"));
    }
    let area = q.area;
    let (raw, name) = blocking(move || manager.download_single(&id, area, &path)).await?;
    Response::builder()
        .header(header::CONTENT_TYPE, mime_for(&name))
        .header(header::CONTENT_LENGTH, raw.len)
        .header(header::CONTENT_DISPOSITION, attachment(&name))
        .body(stream_raw(raw))
        .map_err(|e| ApiError::internal(e.to_string()))
}

pub(crate) async fn make_dir(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<PathBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(b) = body.map_err(bad_json)?;
    let manager = state.manager.clone();
    blocking(move || manager.make_dir(&id, b.area, &b.path)).await?;
    Ok(ok())
}

pub(crate) async fn move_path(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<MoveBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(b) = body.map_err(bad_json)?;
    let manager = state.manager.clone();
    blocking(move || manager.move_path(&id, b.area, &b.src, &b.dst, b.overwrite)).await?;
    Ok(ok())
}

pub(crate) async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    query: Result<Query<PathQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(q) = query.map_err(bad_query)?;
    let manager = state.manager.clone();
    blocking(move || manager.remove_path(&id, q.area, &q.path)).await?;
    Ok(ok())
}
