//! API routes for the run-home server.

pub mod editor;
pub mod error;
pub mod exports;
pub mod request_id;
mod routes;
pub mod searches;

use axum::Router;

pub fn routes() -> Router<std::sync::Arc<crate::state::AppState>> {
    routes::create_router()
}

#[cfg(test)]
mod tests;
