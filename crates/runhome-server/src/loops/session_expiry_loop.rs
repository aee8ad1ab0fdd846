//! Session expiry loop.
//!
//! Drops idle search sessions so abandoned searches do not hold routes and editor state forever.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::interval;

use crate::state::AppState;

pub async fn run_session_expiry_loop(state: Arc<AppState>, mut shutdown: broadcast::Receiver<()>) {
    let ttl = state.config().session_ttl();
    let mut ticker = interval(Duration::from_secs(
        state.config().session_sweep_interval_s.max(1),
    ));

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("Session expiry loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                let removed = state.expire_sessions(ttl);
                if removed > 0 {
                    tracing::info!(
                        "Expired {} idle sessions ({} remaining)",
                        removed,
                        state.session_count()
                    );
                }
            }
        }
    }
}
