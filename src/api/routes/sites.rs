//! Site endpoints

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use tracing::{info, warn};

use crate::actors::messages::{TriggerMessage, TriggerSource};
use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{SiteInfo, SitesResponse, TriggerResponse},
};
use crate::dashboard::LastRun;
use crate::model::{SiteConfig, SiteId};

/// GET /api/v1/sites
///
/// List all sites with their latest run
pub async fn list_sites(State(state): State<ApiState>) -> ApiResult<Json<SitesResponse>> {
    let mut sites = Vec::new();

    for site in state.store.list_sites().await? {
        let last_run = state.store.latest_run(site.id).await?;
        sites.push(SiteInfo::new(&site, last_run.as_ref().map(LastRun::from)));
    }

    let count = sites.len();
    Ok(Json(SitesResponse { sites, count }))
}

/// GET /api/v1/sites/:id/config
///
/// Check configuration of a site, enabled pages only
pub async fn get_site_config(
    State(state): State<ApiState>,
    Path(site_id): Path<SiteId>,
) -> ApiResult<Json<SiteConfig>> {
    state
        .store
        .site_config(site_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("site not found: {site_id}")))
}

/// POST /api/v1/sites/:id/trigger
///
/// Queue a manual run. Disabled sites can still be triggered by hand.
pub async fn trigger_site(
    State(state): State<ApiState>,
    Path(site_id): Path<SiteId>,
) -> ApiResult<(StatusCode, Json<TriggerResponse>)> {
    let site = state
        .store
        .get_site(site_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("site not found: {site_id}")))?;

    state
        .triggers
        .send(TriggerMessage::for_site(&site, TriggerSource::Manual))
        .await
        .map_err(|e| {
            warn!(site_id, "manual trigger rejected: {:#}", e);
            ApiError::Unavailable(e.to_string())
        })?;

    info!(site_id, "manual run queued for {}", site.name);

    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            site_id,
            triggered_by: TriggerSource::Manual,
            queued_at: Utc::now(),
        }),
    ))
}
