use std::sync::Arc;

use axum::{Json, extract::State};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub(crate) struct HealthResponse {
    ok: bool,
    name: &'static str,
    version: &'static str,
    jobs: usize,
}

pub(crate) async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        name: "vntl-server",
        version: env!("CARGO_PKG_VERSION"),
        jobs: state.manager.store().len(),
    })
}
