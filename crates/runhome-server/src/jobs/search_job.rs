//! Runs a search (or a "find more" pass) off the request path.
//!
//! The caller claims the session lock first, so a second start while one is running is
//! rejected synchronously instead of queueing behind it.

use std::sync::Arc;

use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;

use runhome_core::{CandidateRoute, SearchObserver, SearchOutcome, SearchSession};

use crate::state::{AppState, SessionEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchRun {
    Fresh,
    FindMore,
}

struct SnapshotObserver {
    entry: Arc<SessionEntry>,
}

impl SearchObserver for SnapshotObserver {
    fn on_progress(&self, routes: &[CandidateRoute]) {
        self.entry.set_routes(routes);
    }

    fn on_pass(&self, session: &SearchSession) {
        self.entry.publish(session, None);
    }

    fn on_complete(&self, outcome: &SearchOutcome) {
        tracing::info!(
            "Search {} finished: {:?} with {} routes (level {})",
            self.entry.id(),
            outcome.status,
            outcome.routes_found,
            outcome.tolerance_level
        );
    }
}

pub fn spawn_search(
    state: Arc<AppState>,
    entry: Arc<SessionEntry>,
    mut session: OwnedMutexGuard<SearchSession>,
    run: SearchRun,
) -> JoinHandle<()> {
    let engine = state.engine().clone();
    let cancel = entry.new_run_token();
    if run == SearchRun::Fresh {
        entry.clear_results();
    }
    entry.mark_started();

    tokio::spawn(async move {
        let observer = SnapshotObserver {
            entry: entry.clone(),
        };
        let outcome = match run {
            SearchRun::Fresh => engine.search(&mut session, &observer, &cancel).await,
            SearchRun::FindMore => engine.find_more(&mut session, &observer, &cancel).await,
        };
        entry.publish(&session, Some(&outcome));
        // Lock released here; polls stop reporting in_flight.
        drop(session);
    })
}
