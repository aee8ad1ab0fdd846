//! Search session endpoints.
//!
//! A session is created with the user's inputs and immediately starts its pass loop in the
//! background; clients poll the snapshot until `in_flight` turns false.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use runhome_core::geo::{format_distance, format_duration};
use runhome_core::{
    elevation_stats, estimate_route, format_activity_duration, format_pace, CandidateRoute,
    ElevationStats, RouteEstimate, SearchQuery, SearchSession,
};

use crate::api::error::ApiError;
use crate::jobs::search_job::{spawn_search, SearchRun};
use crate::state::{AppState, SessionEntry, SessionSnapshot};

pub(crate) fn lookup(state: &AppState, id: &str) -> Result<Arc<SessionEntry>, ApiError> {
    state.get_session(id).ok_or_else(|| ApiError::session_not_found(id))
}

pub(crate) fn lookup_route(entry: &SessionEntry, index: usize) -> Result<CandidateRoute, ApiError> {
    entry.route(index).ok_or_else(|| ApiError::route_not_found(index))
}

/// Create a session and start searching.
pub async fn create_search(
    State(state): State<Arc<AppState>>,
    Json(query): Json<SearchQuery>,
) -> Result<(StatusCode, Json<SessionSnapshot>), ApiError> {
    let session = SearchSession::new(query.clone())?;
    let entry = state
        .create_session(query, session)
        .ok_or_else(|| ApiError::Unavailable("too many active search sessions".to_string()))?;
    let guard = entry.try_claim().ok_or_else(ApiError::search_in_flight)?;

    tracing::info!(
        "Created search {} ({:.1} km, {:?}, {:?})",
        entry.id(),
        entry.query().target_km,
        entry.query().direction,
        entry.query().activity
    );
    spawn_search(state.clone(), entry.clone(), guard, SearchRun::Fresh);
    Ok((StatusCode::ACCEPTED, Json(entry.snapshot())))
}

pub async fn get_search(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let entry = lookup(&state, &id)?;
    Ok(Json(entry.snapshot()))
}

/// Re-run the search from scratch. A no-op while a run is in flight.
pub async fn restart_search(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<SessionSnapshot>), ApiError> {
    start_run(state, &id, SearchRun::Fresh).await
}

/// One more pass at the current tolerance level. A no-op while a run is in flight.
pub async fn find_more(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<SessionSnapshot>), ApiError> {
    start_run(state, &id, SearchRun::FindMore).await
}

async fn start_run(
    state: Arc<AppState>,
    id: &str,
    run: SearchRun,
) -> Result<(StatusCode, Json<SessionSnapshot>), ApiError> {
    let entry = lookup(&state, id)?;
    let Some(guard) = entry.try_claim() else {
        tracing::debug!("Search {} already running, ignoring {:?}", id, run);
        return Ok((StatusCode::OK, Json(entry.snapshot())));
    };
    if run == SearchRun::Fresh {
        state.invalidate_profiles(id, None);
        // Waits out an in-progress edit call; the route list is about to be rebuilt.
        let discarded = entry.editor().lock().await.discard_all();
        if discarded > 0 {
            tracing::debug!("Search {} restart closed {} edit sessions", id, discarded);
        }
    }
    spawn_search(state.clone(), entry.clone(), guard, run);
    Ok((StatusCode::ACCEPTED, Json(entry.snapshot())))
}

pub async fn cancel_search(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<SessionSnapshot>), ApiError> {
    let entry = lookup(&state, &id)?;
    entry.cancel();
    tracing::info!("Cancel requested for search {}", id);
    Ok((StatusCode::ACCEPTED, Json(entry.snapshot())))
}

pub async fn delete_search(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> StatusCode {
    if state.remove_session(&id) {
        tracing::info!("Deleted search {}", id);
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RouteDetailsQuery {
    /// Minutes per km; defaults to the activity's typical pace.
    pub pace: Option<f64>,
    /// Departure for the transit leg; defaults to now.
    pub departure: Option<DateTime<Utc>>,
    /// Skip the transit lookup entirely.
    #[serde(default)]
    pub skip_transit: bool,
}

#[derive(Debug, Serialize)]
pub struct RouteDetails {
    pub index: usize,
    pub route: CandidateRoute,
    pub estimate: RouteEstimate,
    pub distance_label: String,
    pub duration_label: String,
    pub pace_label: String,
    pub routed_duration_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elevation: Option<ElevationStats>,
}

/// Route details with estimates. Looks up the transit journey on first request and keeps it.
pub async fn get_route(
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(String, usize)>,
    Query(params): Query<RouteDetailsQuery>,
) -> Result<Json<RouteDetails>, ApiError> {
    let entry = lookup(&state, &id)?;
    let mut route = lookup_route(&entry, index)?;
    let query = entry.query();

    if route.transit_journey.is_none() && !route.candidate.is_synthetic() && !params.skip_transit {
        let departure = params.departure.unwrap_or_else(Utc::now);
        match state
            .providers()
            .journeys
            .find_journey(&query.home, &route.candidate, departure)
            .await
        {
            Ok(journey) => {
                route.transit_journey = Some(journey.clone());
                // Skip persisting while a pass loop owns the session; the next request retries.
                if let Some(mut session) = entry.try_claim() {
                    if session.attach_transit_journey(index, journey).is_ok() {
                        entry.publish(&session, None);
                    }
                }
            }
            Err(err) => {
                tracing::warn!("Transit journey for {} failed: {}", route.candidate.name, err);
            }
        }
    }

    let stats = state
        .cached_profile(&AppState::profile_key(&id, index, &route))
        .filter(|profile| profile.has_elevation())
        .map(|profile| elevation_stats(&profile));
    let estimate = estimate_route(&route, query.activity, params.pace, stats.as_ref());

    Ok(Json(RouteDetails {
        index,
        distance_label: format_distance(route.distance_m),
        duration_label: format_activity_duration(estimate.duration_minutes),
        pace_label: format_pace(estimate.pace_min_per_km),
        routed_duration_label: format_duration(route.duration_s),
        elevation: stats,
        estimate,
        route,
    }))
}
