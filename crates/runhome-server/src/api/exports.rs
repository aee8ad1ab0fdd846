//! Elevation profile and GPX download endpoints.

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use runhome_core::{
    elevation_stats, fetch_profile, gpx_filename, to_gpx, CandidateRoute, ElevationProfile,
    ElevationStats,
};

use crate::api::error::ApiError;
use crate::api::searches::{lookup, lookup_route};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub index: usize,
    pub has_elevation: bool,
    pub stats: ElevationStats,
    pub profile: ElevationProfile,
}

/// Cached per route and geometry; profiles without any elevation are not cached.
async fn route_profile(
    state: &AppState,
    session_id: &str,
    index: usize,
    route: &CandidateRoute,
) -> ElevationProfile {
    let key = AppState::profile_key(session_id, index, route);
    if let Some(profile) = state.cached_profile(&key) {
        return profile;
    }

    let profile = fetch_profile(
        state.providers().elevation.as_ref(),
        &route.geometry,
        &state.config().elevation_config(),
    )
    .await;
    if profile.has_elevation() {
        state.store_profile(key, profile.clone());
    } else {
        tracing::warn!("No elevation data for search {} route {}", session_id, index);
    }
    profile
}

pub async fn get_elevation(
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(String, usize)>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let entry = lookup(&state, &id)?;
    let route = lookup_route(&entry, index)?;
    let profile = route_profile(&state, &id, index, &route).await;

    Ok(Json(ProfileResponse {
        index,
        has_elevation: profile.has_elevation(),
        stats: elevation_stats(&profile),
        profile,
    }))
}

pub async fn export_gpx(
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(String, usize)>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = lookup(&state, &id)?;
    let route = lookup_route(&entry, index)?;
    let query = entry.query();
    let profile = route_profile(&state, &id, index, &route).await;

    let now = Utc::now();
    let body = to_gpx(
        &route,
        &route.candidate,
        &query.home,
        query.activity,
        profile.has_elevation().then_some(&profile),
        now,
    );
    let filename = gpx_filename(&route.candidate.name, query.activity, now.date_naive());

    Ok((
        [
            (header::CONTENT_TYPE, "application/gpx+xml".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    ))
}
