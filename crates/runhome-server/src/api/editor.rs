//! Waypoint editor endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use runhome_core::{CandidateRoute, LatLng, RouteEditor};

use crate::api::error::ApiError;
use crate::api::searches::{lookup, lookup_route};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct EditView {
    pub route_index: usize,
    pub waypoints: Vec<LatLng>,
    pub geometry: Vec<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tentative_distance_m: Option<f64>,
    pub needs_update: bool,
    pub selected: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

fn edit_view(editor: &RouteEditor, index: usize) -> Result<EditView, ApiError> {
    let session = editor
        .session(index)
        .ok_or_else(|| ApiError::NotFound(format!("route {} is not being edited", index)))?;
    Ok(EditView {
        route_index: index,
        waypoints: session.waypoints().to_vec(),
        geometry: session.geometry().to_vec(),
        tentative_distance_m: session.tentative().map(|path| path.distance_m),
        needs_update: editor.needs_update(index),
        selected: session.selected(),
        notice: editor.notice().map(str::to_string),
    })
}

pub async fn enter_edit(
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(String, usize)>,
) -> Result<Json<EditView>, ApiError> {
    let entry = lookup(&state, &id)?;
    let route = lookup_route(&entry, index)?;
    let mut editor = entry.editor().lock().await;
    editor.enter_edit(index, &route);
    Ok(Json(edit_view(&editor, index)?))
}

pub async fn get_edit(
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(String, usize)>,
) -> Result<Json<EditView>, ApiError> {
    let entry = lookup(&state, &id)?;
    let editor = entry.editor().lock().await;
    Ok(Json(edit_view(&editor, index)?))
}

pub async fn add_waypoint(
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(String, usize)>,
    Json(point): Json<LatLng>,
) -> Result<(StatusCode, Json<EditView>), ApiError> {
    let entry = lookup(&state, &id)?;
    let mut editor = entry.editor().lock().await;
    let position = editor.add_waypoint(index, point)?;
    tracing::debug!("Search {} route {}: waypoint inserted at {}", id, index, position);
    Ok((StatusCode::CREATED, Json(edit_view(&editor, index)?)))
}

pub async fn remove_waypoint(
    State(state): State<Arc<AppState>>,
    Path((id, index, waypoint)): Path<(String, usize, usize)>,
) -> Result<Json<EditView>, ApiError> {
    let entry = lookup(&state, &id)?;
    let mut editor = entry.editor().lock().await;
    editor.remove_waypoint(index, waypoint)?;
    Ok(Json(edit_view(&editor, index)?))
}

#[derive(Debug, Deserialize)]
pub struct SelectWaypointRequest {
    pub waypoint: Option<usize>,
}

pub async fn select_waypoint(
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(String, usize)>,
    Json(request): Json<SelectWaypointRequest>,
) -> Result<Json<EditView>, ApiError> {
    let entry = lookup(&state, &id)?;
    let mut editor = entry.editor().lock().await;
    editor.select_waypoint(index, request.waypoint)?;
    Ok(Json(edit_view(&editor, index)?))
}

/// Recompute the tentative route through the current waypoints.
pub async fn update_route(
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(String, usize)>,
) -> Result<Json<EditView>, ApiError> {
    let entry = lookup(&state, &id)?;
    let router = state.providers().router.clone();
    let mut editor = entry.editor().lock().await;
    editor.update_route(index, router.as_ref()).await?;
    Ok(Json(edit_view(&editor, index)?))
}

/// Commit the edit into the session's route list.
pub async fn save_edits(
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(String, usize)>,
) -> Result<Json<CandidateRoute>, ApiError> {
    let entry = lookup(&state, &id)?;
    // Claim the session before closing the edit, so a running search cannot lose it.
    let mut session = entry.try_claim().ok_or_else(ApiError::search_in_flight)?;
    let router = state.providers().router.clone();

    let mut editor = entry.editor().lock().await;
    let edited_id = editor
        .session(index)
        .map(|edit| edit.original().candidate.id.clone());
    if let Some(edited_id) = edited_id {
        let current_id = session.route(index).map(|route| route.candidate.id.as_str());
        if current_id != Some(edited_id.as_str()) {
            editor.cancel_edits(index)?;
            return Err(ApiError::Conflict(format!(
                "route {} changed since editing started; edit discarded",
                index
            )));
        }
    }
    let route = editor.save_edits(index, router.as_ref()).await?;
    session.replace_route(index, route.clone())?;
    entry.publish(&session, None);
    state.invalidate_profiles(&id, Some(index));

    tracing::info!(
        "Search {} route {} saved ({:.0} m)",
        id,
        index,
        route.distance_m
    );
    Ok(Json(route))
}

pub async fn cancel_edits(
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(String, usize)>,
) -> Result<Json<CandidateRoute>, ApiError> {
    let entry = lookup(&state, &id)?;
    let mut editor = entry.editor().lock().await;
    Ok(Json(editor.cancel_edits(index)?))
}
