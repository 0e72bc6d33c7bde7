//! Dashboard endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{Duration, Utc};

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{RangeQuery, RunsQuery, SeriesQuery},
};
use crate::dashboard::{Bucket, Overview, RunSummary, TimeRange, TimeSeries, WeeklyReport};
use crate::model::{RunId, RunRecord, SiteId};

/// Default lookback period for run listings (24 hours)
const DEFAULT_LOOKBACK_HOURS: i64 = 24;

/// GET /api/v1/sites/:id/overview?range=
pub async fn get_overview(
    State(state): State<ApiState>,
    Path(site_id): Path<SiteId>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<Overview>> {
    let range = TimeRange::parse(query.range.as_deref());
    let overview = state.dashboard.overview(site_id, range, Utc::now()).await?;
    Ok(Json(overview))
}

/// GET /api/v1/sites/:id/timeseries/errors?range=&bucket=
pub async fn get_error_series(
    State(state): State<ApiState>,
    Path(site_id): Path<SiteId>,
    Query(query): Query<SeriesQuery>,
) -> ApiResult<Json<TimeSeries>> {
    let range = TimeRange::parse(query.range.as_deref());
    let bucket = Bucket::parse(query.bucket.as_deref());
    let series = state
        .dashboard
        .error_series(site_id, range, bucket, Utc::now())
        .await?;
    Ok(Json(series))
}

/// GET /api/v1/sites/:id/timeseries/performance?range=&bucket=
pub async fn get_performance_series(
    State(state): State<ApiState>,
    Path(site_id): Path<SiteId>,
    Query(query): Query<SeriesQuery>,
) -> ApiResult<Json<TimeSeries>> {
    let range = TimeRange::parse(query.range.as_deref());
    let bucket = Bucket::parse(query.bucket.as_deref());
    let series = state
        .dashboard
        .performance_series(site_id, range, bucket, Utc::now())
        .await?;
    Ok(Json(series))
}

/// GET /api/v1/sites/:id/runs?from=&to=
///
/// Defaults to the last 24 hours
pub async fn list_runs(
    State(state): State<ApiState>,
    Path(site_id): Path<SiteId>,
    Query(query): Query<RunsQuery>,
) -> ApiResult<Json<Vec<RunSummary>>> {
    let to = query.to.unwrap_or_else(Utc::now);
    let from = query
        .from
        .unwrap_or_else(|| to - Duration::hours(DEFAULT_LOOKBACK_HOURS));

    if from > to {
        return Err(ApiError::InvalidRequest(
            "'from' must not be after 'to'".to_string(),
        ));
    }

    let runs = state.dashboard.runs(site_id, from, to).await?;
    Ok(Json(runs))
}

/// GET /api/v1/sites/:id/report
///
/// Weekly report data for the last seven days
pub async fn get_weekly_report(
    State(state): State<ApiState>,
    Path(site_id): Path<SiteId>,
) -> ApiResult<Json<WeeklyReport>> {
    let report = state.dashboard.weekly_report(site_id, Utc::now()).await?;
    Ok(Json(report))
}

/// GET /api/v1/runs/:id
pub async fn get_run(
    State(state): State<ApiState>,
    Path(run_id): Path<RunId>,
) -> ApiResult<Json<RunRecord>> {
    let run = state.dashboard.run(run_id).await?;
    Ok(Json(run))
}
