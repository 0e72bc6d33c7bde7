//! Run ingestion endpoint

use axum::{Json, extract::State, http::StatusCode};

use crate::api::{error::ApiResult, state::ApiState};
use crate::ingest::IngestReceipt;
use crate::model::RunSubmission;

/// POST /api/v1/ingest/runs
///
/// Persist a completed run submitted by an external executor. Unknown sites
/// or pages are rejected with 422 and nothing is stored.
pub async fn ingest_run(
    State(state): State<ApiState>,
    Json(submission): Json<RunSubmission>,
) -> ApiResult<(StatusCode, Json<IngestReceipt>)> {
    let receipt = state.ingest.ingest(submission).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}
