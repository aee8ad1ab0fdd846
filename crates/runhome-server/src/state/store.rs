//! In-memory session store using DashMap.

use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use runhome_core::{
    CandidateRoute, ElevationLookup, ElevationProfile, JourneyPlanner, RouteEditor, Router,
    SearchEngine, SearchOutcome, SearchPhase, SearchQuery, SearchSession, SearchStatus,
};

use crate::config::Config;

/// What a poll of `GET /v1/searches/:id` returns.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub query: SearchQuery,
    pub phase: SearchPhase,
    pub tolerance_level: usize,
    pub routes: Vec<CandidateRoute>,
    pub status: Option<SearchStatus>,
    pub message: Option<String>,
    pub degraded: bool,
    pub has_more: bool,
    pub in_flight: bool,
    pub candidates_total: usize,
    pub candidates_checked: usize,
    pub created_at: DateTime<Utc>,
}

pub struct SessionEntry {
    id: String,
    search: Arc<AsyncMutex<SearchSession>>,
    snapshot: RwLock<SessionSnapshot>,
    editor: AsyncMutex<RouteEditor>,
    cancel: Mutex<CancellationToken>,
    last_access: Mutex<Instant>,
}

impl SessionEntry {
    fn new(id: String, session: SearchSession, editor: RouteEditor) -> Self {
        let snapshot = SessionSnapshot {
            id: id.clone(),
            query: session.query().clone(),
            phase: session.phase(),
            tolerance_level: session.tolerance_level(),
            routes: Vec::new(),
            status: None,
            message: None,
            degraded: false,
            has_more: false,
            in_flight: false,
            candidates_total: 0,
            candidates_checked: 0,
            created_at: Utc::now(),
        };
        Self {
            id,
            search: Arc::new(AsyncMutex::new(session)),
            snapshot: RwLock::new(snapshot),
            editor: AsyncMutex::new(editor),
            cancel: Mutex::new(CancellationToken::new()),
            last_access: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Exclusive access to the search session, or `None` while a pass loop holds it.
    pub fn try_claim(&self) -> Option<OwnedMutexGuard<SearchSession>> {
        self.search.clone().try_lock_owned().ok()
    }

    pub fn is_in_flight(&self) -> bool {
        self.search.try_lock().is_err()
    }

    pub fn editor(&self) -> &AsyncMutex<RouteEditor> {
        &self.editor
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let mut snapshot = match self.snapshot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        snapshot.in_flight = self.is_in_flight();
        snapshot
    }

    pub fn route(&self, index: usize) -> Option<CandidateRoute> {
        let guard = self.snapshot.read().ok()?;
        guard.routes.get(index).cloned()
    }

    pub fn query(&self) -> SearchQuery {
        self.snapshot().query
    }

    /// Routes accepted so far; the newest one carries the level the pass is running at.
    pub fn set_routes(&self, routes: &[CandidateRoute]) {
        if let Ok(mut guard) = self.snapshot.write() {
            guard.routes = routes.to_vec();
            if let Some(last) = routes.last() {
                guard.tolerance_level = guard.tolerance_level.max(last.tolerance_level);
            }
        }
    }

    /// Refresh the snapshot from the authoritative session state.
    pub fn publish(&self, session: &SearchSession, outcome: Option<&SearchOutcome>) {
        if let Ok(mut guard) = self.snapshot.write() {
            guard.query = session.query().clone();
            guard.phase = session.phase();
            guard.tolerance_level = session.tolerance_level();
            guard.routes = session.routes().to_vec();
            guard.degraded = session.is_degraded();
            guard.has_more = session.has_more();
            guard.candidates_total = session.candidates().len();
            guard.candidates_checked = session.checked_count();
            if let Some(outcome) = outcome {
                guard.status = Some(outcome.status);
                guard.message = Some(outcome.status.user_message().to_string());
            }
        }
    }

    /// Forget the previous run's results before a fresh search rebuilds them.
    pub fn clear_results(&self) {
        if let Ok(mut guard) = self.snapshot.write() {
            guard.routes.clear();
            guard.tolerance_level = 0;
            guard.degraded = false;
            guard.has_more = false;
            guard.candidates_total = 0;
            guard.candidates_checked = 0;
        }
    }

    pub fn mark_started(&self) {
        if let Ok(mut guard) = self.snapshot.write() {
            guard.phase = SearchPhase::Searching;
            guard.status = None;
            guard.message = None;
        }
    }

    /// Fresh token for a new run; the previous one is left as is.
    pub fn new_run_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Ok(mut guard) = self.cancel.lock() {
            *guard = token.clone();
        }
        token
    }

    pub fn cancel(&self) {
        if let Ok(guard) = self.cancel.lock() {
            guard.cancel();
        }
    }

    pub fn touch(&self) {
        if let Ok(mut guard) = self.last_access.lock() {
            *guard = Instant::now();
        }
    }

    pub fn idle_for(&self) -> Duration {
        self.last_access
            .lock()
            .map(|guard| guard.elapsed())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct CachedProfile {
    pub profile: ElevationProfile,
    pub fetched_at: Instant,
}

/// External services the handlers talk to.
#[derive(Clone)]
pub struct Providers {
    pub engine: SearchEngine,
    pub router: Arc<dyn Router>,
    pub elevation: Arc<dyn ElevationLookup>,
    pub journeys: Arc<dyn JourneyPlanner>,
}

/// Application state shared by handlers, jobs and loops.
pub struct AppState {
    config: Config,
    providers: Providers,
    sessions: DashMap<String, Arc<SessionEntry>>,
    profiles: DashMap<String, CachedProfile>,
}

impl AppState {
    pub fn new(config: Config, providers: Providers) -> Self {
        Self {
            config,
            providers,
            sessions: DashMap::new(),
            profiles: DashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    pub fn engine(&self) -> &SearchEngine {
        &self.providers.engine
    }

    /// Register a new session. Returns `None` when the store is full.
    pub fn create_session(&self, query: SearchQuery, session: SearchSession) -> Option<Arc<SessionEntry>> {
        if self.sessions.len() >= self.config.max_sessions.max(1) {
            return None;
        }
        let id = uuid::Uuid::new_v4().to_string();
        let editor = RouteEditor::new(
            query.home.location(),
            query.activity.profile(),
            self.config.editor_config(),
        );
        let entry = Arc::new(SessionEntry::new(id.clone(), session, editor));
        self.sessions.insert(id, entry.clone());
        Some(entry)
    }

    pub fn get_session(&self, id: &str) -> Option<Arc<SessionEntry>> {
        let entry = self.sessions.get(id).map(|r| r.value().clone())?;
        entry.touch();
        Some(entry)
    }

    pub fn remove_session(&self, id: &str) -> bool {
        match self.sessions.remove(id) {
            Some((_, entry)) => {
                entry.cancel();
                self.invalidate_profiles(id, None);
                true
            }
            None => false,
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drop sessions idle for longer than `ttl` that are not mid-search.
    pub fn expire_sessions(&self, ttl: Duration) -> usize {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().idle_for() > ttl && !entry.value().is_in_flight())
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for id in expired {
            if self.remove_session(&id) {
                removed += 1;
            }
        }
        removed
    }

    pub fn profile_key(session_id: &str, route_index: usize, route: &CandidateRoute) -> String {
        format!("{}:{}:{}", session_id, route_index, route.fingerprint())
    }

    pub fn cached_profile(&self, key: &str) -> Option<ElevationProfile> {
        self.profiles.get(key).map(|entry| entry.profile.clone())
    }

    pub fn store_profile(&self, key: String, profile: ElevationProfile) {
        self.profiles.insert(
            key,
            CachedProfile {
                profile,
                fetched_at: Instant::now(),
            },
        );
        let max_entries = self.config.profile_cache_max_entries.max(1);
        if self.profiles.len() > max_entries {
            let mut entries: Vec<(String, Instant)> = self
                .profiles
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().fetched_at))
                .collect();
            entries.sort_by_key(|(_, fetched_at)| *fetched_at);
            for (key, _) in entries {
                if self.profiles.len() <= max_entries {
                    break;
                }
                self.profiles.remove(&key);
            }
        }
    }

    /// Forget cached profiles of one route (or of the whole session when `route_index` is `None`).
    pub fn invalidate_profiles(&self, session_id: &str, route_index: Option<usize>) {
        let prefix = match route_index {
            Some(index) => format!("{}:{}:", session_id, index),
            None => format!("{}:", session_id),
        };
        self.profiles.retain(|key, _| !key.starts_with(&prefix));
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.len()
    }
}
