//! Job lifecycle and processing endpoints.

use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Multipart, Path, Query, State,
        multipart::MultipartError,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tracing::info;
use vntl_core::dispatch::{ModeKind, PackRequest, ProcessRequest};
use vntl_core::domain::{Area, PathEntry};
use vntl_core::workspace::{Job, JobSnapshot};
use vntl_core::VntlError;

use super::{bad_json, bad_query, blocking, lenient_bool};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const UPLOAD_FIELD: &str = "files";

#[derive(Serialize)]
pub(crate) struct JobCreated {
    job_id: String,
    files: usize,
    input_tree: PathEntry,
}

#[derive(Serialize)]
pub(crate) struct TreeResponse {
    job_id: String,
    #[serde(rename = "where")]
    area: Area,
    tree: PathEntry,
}

#[derive(Serialize)]
pub(crate) struct ProcessResponse {
    job: JobSnapshot,
    output_tree: PathEntry,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AreaQuery {
    #[serde(rename = "where", default)]
    area: Area,
}

fn default_mode() -> ModeKind {
    ModeKind::Auto
}

fn default_pack_where() -> Area {
    Area::Input
}

fn default_pack_name() -> String {
    PackRequest::DEFAULT_NAME.to_string()
}

fn default_version() -> u8 {
    3
}

fn default_key_hex() -> String {
    PackRequest::DEFAULT_KEY_HEX.to_string()
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProcessQuery {
    #[serde(default = "default_mode")]
    mode: ModeKind,
    #[serde(default, deserialize_with = "lenient_bool")]
    try_harder: bool,
    #[serde(default = "default_pack_where")]
    pack_source_where: Area,
    #[serde(default)]
    pack_source_path: String,
    #[serde(default = "default_pack_name")]
    pack_name: String,
    #[serde(default = "default_version")]
    pack_version: u8,
    #[serde(default = "default_key_hex")]
    pack_key_hex: String,
    #[serde(default)]
    pack_padding: u64,
}

fn default_repack_name() -> String {
    "repacked.rpa".to_string()
}

/// Body of `POST /repack`. Unlike `process?mode=pack_rpa` it reads from the
/// output area by default and leaves the rest of the output alone.
#[derive(Debug, Deserialize)]
pub(crate) struct RepackBody {
    #[serde(default)]
    source_where: Area,
    #[serde(default)]
    source_path: String,
    #[serde(default = "default_repack_name")]
    name: String,
    #[serde(default = "default_version")]
    version: u8,
    #[serde(default = "default_key_hex")]
    key_hex: String,
    #[serde(default)]
    padding: u64,
}

fn key_opt(key_hex: &str) -> Option<&str> {
    Some(key_hex).filter(|k| !k.trim().is_empty())
}

fn bad_multipart(err: MultipartError) -> ApiError {
    ApiError::new(err.status(), "invalid_params", err.body_text())
}

pub(crate) async fn create_job(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<JobCreated>)> {
    let job = state.manager.create_job()?;
    let files = match receive_files(&state, &job, &mut multipart).await {
        Ok(0) => Err(ApiError::bad_request("no files provided")),
        other => other,
    };
    let files = match files {
        Ok(n) => n,
        Err(e) => {
            // a half-filled job is of no use to anyone
            if let Err(del) = state.manager.delete_job(job.id()) {
                tracing::warn!(job = %job.id(), error = %del, "could not discard failed upload");
            }
            return Err(e);
        }
    };

    let manager = state.manager.clone();
    let id = job.id().to_string();
    let input_tree = blocking(move || manager.tree(&id, Area::Input)).await?;
    info!(job = %job.id(), files, "upload stored");
    Ok((
        StatusCode::CREATED,
        Json(JobCreated {
            job_id: job.id().to_string(),
            files,
            input_tree,
        }),
    ))
}

/// Store every `files` part under the job's input, enforcing the upload cap
/// across all parts. Returns the number of files that landed in the input.
async fn receive_files(
    state: &Arc<AppState>,
    job: &Arc<Job>,
    multipart: &mut Multipart,
) -> ApiResult<usize> {
    let limit = state.limits().max_upload_bytes;
    let mut total = 0u64;
    let mut files = 0usize;

    while let Some(mut field) = multipart.next_field().await.map_err(bad_multipart)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let dest = state.manager.upload_target(job, &name)?;
        let mut out = tokio::fs::File::create(&dest)
            .await
            .map_err(VntlError::from)?;
        while let Some(chunk) = field.chunk().await.map_err(bad_multipart)? {
            total += chunk.len() as u64;
            if total > limit {
                return Err(VntlError::TooLarge {
                    path: name,
                    size: total,
                    limit,
                }
                .into());
            }
            out.write_all(&chunk).await.map_err(VntlError::from)?;
        }
        out.flush().await.map_err(VntlError::from)?;
        drop(out);

        let manager = state.manager.clone();
        let job = Arc::clone(job);
        files += blocking(move || manager.ingest_upload(&job, &dest)).await?;
    }
    Ok(files)
}

pub(crate) async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<JobSnapshot>> {
    Json(state.manager.store().list())
}

pub(crate) async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobSnapshot>> {
    Ok(Json(state.manager.snapshot(&id)?))
}

pub(crate) async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let manager = state.manager.clone();
    let deleted = blocking(move || manager.delete_job(&id)).await?;
    Ok(Json(json!({ "ok": true, "deleted": deleted })))
}

pub(crate) async fn tree(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    query: Result<Query<AreaQuery>, QueryRejection>,
) -> ApiResult<Json<TreeResponse>> {
    let Query(q) = query.map_err(bad_query)?;
    let manager = state.manager.clone();
    let job_id = id.clone();
    let tree = blocking(move || manager.tree(&id, q.area)).await?;
    Ok(Json(TreeResponse {
        job_id,
        area: q.area,
        tree,
    }))
}

pub(crate) async fn process(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    query: Result<Query<ProcessQuery>, QueryRejection>,
) -> ApiResult<Json<ProcessResponse>> {
    let Query(q) = query.map_err(bad_query)?;
    let req = ProcessRequest::for_mode(q.mode, q.try_harder, || {
        PackRequest::new(
            q.pack_source_where,
            q.pack_source_path.clone(),
            &q.pack_name,
            q.pack_version,
            key_opt(&q.pack_key_hex),
            q.pack_padding,
        )
    })?;
    run(&state, id, req).await
}

pub(crate) async fn repack(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<RepackBody>, JsonRejection>,
) -> ApiResult<Json<ProcessResponse>> {
    let Json(b) = body.map_err(bad_json)?;
    let pack = PackRequest::new(
        b.source_where,
        b.source_path,
        &b.name,
        b.version,
        key_opt(&b.key_hex),
        b.padding,
    )?;
    run(&state, id, ProcessRequest::PackRpa(pack)).await
}

async fn run(state: &Arc<AppState>, id: String, req: ProcessRequest) -> ApiResult<Json<ProcessResponse>> {
    let manager = state.manager.clone();
    let (job, output_tree) = blocking(move || {
        let snap = manager.process(&id, &req)?;
        let tree = manager.tree(&id, Area::Output)?;
        Ok((snap, tree))
    })
    .await?;
    Ok(Json(ProcessResponse { job, output_tree }))
}
