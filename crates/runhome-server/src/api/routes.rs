//! REST API routes.

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;

use crate::api::{editor, exports, request_id, searches};
use crate::state::AppState;

/// Create the API router.
pub fn create_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/searches", post(searches::create_search))
        .route(
            "/v1/searches/:id",
            get(searches::get_search).delete(searches::delete_search),
        )
        .route("/v1/searches/:id/restart", post(searches::restart_search))
        .route("/v1/searches/:id/more", post(searches::find_more))
        .route("/v1/searches/:id/cancel", post(searches::cancel_search))
        .route("/v1/searches/:id/routes/:index", get(searches::get_route))
        .route(
            "/v1/searches/:id/routes/:index/elevation",
            get(exports::get_elevation),
        )
        .route("/v1/searches/:id/routes/:index/gpx", get(exports::export_gpx))
        // Waypoint editor
        .route(
            "/v1/searches/:id/routes/:index/edit",
            post(editor::enter_edit).get(editor::get_edit),
        )
        .route(
            "/v1/searches/:id/routes/:index/edit/waypoints",
            post(editor::add_waypoint),
        )
        .route(
            "/v1/searches/:id/routes/:index/edit/waypoints/:waypoint",
            delete(editor::remove_waypoint),
        )
        .route(
            "/v1/searches/:id/routes/:index/edit/selection",
            put(editor::select_waypoint),
        )
        .route(
            "/v1/searches/:id/routes/:index/edit/update",
            post(editor::update_route),
        )
        .route(
            "/v1/searches/:id/routes/:index/edit/save",
            post(editor::save_edits),
        )
        .route(
            "/v1/searches/:id/routes/:index/edit/cancel",
            post(editor::cancel_edits),
        )
        .layer(middleware::from_fn(request_id::ensure_request_id))
}
