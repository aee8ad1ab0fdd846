//! Candidate search and route matching.
//!
//! A [`SearchSession`] holds the bookkeeping for one "find routes" action: the candidate list,
//! the set of checked ids, accepted routes and the active tolerance level. [`SearchEngine`]
//! drives passes over it, calling the router strictly one candidate at a time.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::candidates::synthetic_candidates;
use crate::error::{SearchError, SourceError};
use crate::geo::{tolerance_band_with, ToleranceBand, DEFAULT_TOLERANCES};
use crate::models::{
    Activity, Candidate, CandidateRoute, Direction, HomePoint, RoutedPath, TransitJourney,
};
use crate::providers::{CandidateSource, Router, Scheduler};

/// Display colors assigned to accepted routes, cycling.
pub const ROUTE_COLORS: [&str; 3] = ["#3b82f6", "#10b981", "#f59e0b"];

/// Search tuning knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    /// Routes wanted per pass (and per "find more").
    pub routes_target: usize,
    /// Router calls allowed in one pass.
    pub max_candidates_per_pass: usize,
    /// Pause after every router call, successful or not.
    pub inter_call_delay: Duration,
    /// Ascending relative tolerances, indexed by level.
    pub tolerances: Vec<f64>,
    pub palette: Vec<String>,
    /// Keep out-of-band router results and re-test them when the tolerance relaxes.
    pub reuse_rejected_routes: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            routes_target: 5,
            max_candidates_per_pass: 30,
            inter_call_delay: Duration::from_millis(150),
            tolerances: DEFAULT_TOLERANCES.to_vec(),
            palette: ROUTE_COLORS.iter().map(|c| c.to_string()).collect(),
            reuse_rejected_routes: true,
        }
    }
}

impl SearchConfig {
    pub fn max_tolerance_level(&self) -> usize {
        self.tolerances.len().saturating_sub(1)
    }

    fn color(&self, index: usize) -> String {
        if self.palette.is_empty() {
            return ROUTE_COLORS[index % ROUTE_COLORS.len()].to_string();
        }
        self.palette[index % self.palette.len()].clone()
    }
}

/// User inputs that define a session. Changing any of them means a new session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub home: HomePoint,
    pub target_km: f64,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub activity: Activity,
}

impl SearchQuery {
    pub fn validate(&self) -> Result<(), SearchError> {
        if !self.target_km.is_finite() || self.target_km <= 0.0 {
            return Err(SearchError::InvalidTarget(self.target_km));
        }
        let home = &self.home;
        if !home.location().is_finite() || home.lat.abs() > 90.0 || home.lng.abs() > 180.0 {
            return Err(SearchError::InvalidHome);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPhase {
    #[default]
    Idle,
    Searching,
    TargetMet,
    /// The last pass ended short of its goal and no further relaxation happens.
    ExhaustedAtMaxTolerance,
}

/// Terminal status reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchStatus {
    Done,
    NoRoutesFound,
    RateLimited,
    Unavailable,
    Cancelled,
}

impl SearchStatus {
    pub fn user_message(self) -> &'static str {
        match self {
            SearchStatus::Done => "Routes found",
            SearchStatus::NoRoutesFound => {
                "No routes found. Try adjusting the distance or direction."
            }
            SearchStatus::RateLimited => "Services are busy right now. Please wait a moment and retry.",
            SearchStatus::Unavailable => "Routing services are currently unavailable.",
            SearchStatus::Cancelled => "Search cancelled",
        }
    }
}

/// Bookkeeping for one pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PassReport {
    pub tolerance_level: usize,
    pub attempted: usize,
    pub accepted: usize,
    /// Routes accepted from cached router results without a new call.
    pub reused: usize,
    pub failures: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub status: SearchStatus,
    pub routes_found: usize,
    /// Routes added by this call.
    pub new_routes: usize,
    pub tolerance_level: usize,
    pub degraded: bool,
    pub has_more: bool,
}

/// Receives incremental results. Implementations must not block.
pub trait SearchObserver: Send + Sync {
    fn on_progress(&self, routes: &[CandidateRoute]);

    /// After every pass, with the session's level and checked set as they stand.
    fn on_pass(&self, _session: &SearchSession) {}

    fn on_complete(&self, _outcome: &SearchOutcome) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SearchObserver for NoopObserver {
    fn on_progress(&self, _routes: &[CandidateRoute]) {}
}

#[derive(Debug, Clone)]
struct RejectedRoute {
    candidate: Candidate,
    path: RoutedPath,
}

#[derive(Debug, Clone)]
pub struct SearchSession {
    query: SearchQuery,
    phase: SearchPhase,
    tolerance_level: usize,
    candidates: Vec<Candidate>,
    checked: HashSet<String>,
    accepted: Vec<CandidateRoute>,
    rejected: Vec<RejectedRoute>,
    passes: Vec<PassReport>,
    degraded: bool,
    next_color: usize,
    router_calls: usize,
    router_successes: usize,
    rate_limited_failures: usize,
    source_rate_limited: bool,
}

impl SearchSession {
    pub fn new(query: SearchQuery) -> Result<Self, SearchError> {
        query.validate()?;
        Ok(blank_session(query))
    }

    /// Drop all results and start over with new inputs.
    pub fn reset(&mut self, query: SearchQuery) -> Result<(), SearchError> {
        *self = Self::new(query)?;
        Ok(())
    }

    pub fn query(&self) -> &SearchQuery {
        &self.query
    }

    pub fn phase(&self) -> SearchPhase {
        self.phase
    }

    pub fn tolerance_level(&self) -> usize {
        self.tolerance_level
    }

    pub fn routes(&self) -> &[CandidateRoute] {
        &self.accepted
    }

    pub fn route(&self, index: usize) -> Option<&CandidateRoute> {
        self.accepted.get(index)
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn passes(&self) -> &[PassReport] {
        &self.passes
    }

    pub fn is_checked(&self, candidate_id: &str) -> bool {
        self.checked.contains(candidate_id)
    }

    pub fn checked_count(&self) -> usize {
        self.checked.len()
    }

    /// True when candidates come from the synthetic generator ("no live transit info").
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn is_searching(&self) -> bool {
        self.phase == SearchPhase::Searching
    }

    /// Unchecked candidates remain for a "find more".
    pub fn has_more(&self) -> bool {
        self.candidates.iter().any(|c| !self.checked.contains(&c.id))
    }

    /// Lazily attach a transit journey to an accepted route.
    pub fn attach_transit_journey(
        &mut self,
        index: usize,
        journey: TransitJourney,
    ) -> Result<(), SearchError> {
        let route = self
            .accepted
            .get_mut(index)
            .ok_or(SearchError::UnknownRoute(index))?;
        route.transit_journey = Some(journey);
        Ok(())
    }

    /// Swap in a route produced by the editor. The old value is returned untouched.
    pub fn replace_route(
        &mut self,
        index: usize,
        route: CandidateRoute,
    ) -> Result<CandidateRoute, SearchError> {
        let slot = self
            .accepted
            .get_mut(index)
            .ok_or(SearchError::UnknownRoute(index))?;
        Ok(std::mem::replace(slot, route))
    }

    fn band(&self, config: &SearchConfig) -> ToleranceBand {
        tolerance_band_with(&config.tolerances, self.query.target_km, self.tolerance_level)
    }

    fn status(&self) -> SearchStatus {
        if !self.accepted.is_empty() {
            SearchStatus::Done
        } else if self.source_rate_limited
            || (self.rate_limited_failures > 0 && self.router_successes == 0)
        {
            SearchStatus::RateLimited
        } else if self.router_calls > 0 && self.router_successes == 0 {
            SearchStatus::Unavailable
        } else {
            SearchStatus::NoRoutesFound
        }
    }

    fn outcome(&self, status: SearchStatus, before: usize) -> SearchOutcome {
        SearchOutcome {
            status,
            routes_found: self.accepted.len(),
            new_routes: self.accepted.len().saturating_sub(before),
            tolerance_level: self.tolerance_level,
            degraded: self.degraded,
            has_more: self.has_more(),
        }
    }
}

/// Drives search passes against the injected services.
#[derive(Clone)]
pub struct SearchEngine {
    source: Arc<dyn CandidateSource>,
    router: Arc<dyn Router>,
    scheduler: Arc<dyn Scheduler>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(
        source: Arc<dyn CandidateSource>,
        router: Arc<dyn Router>,
        scheduler: Arc<dyn Scheduler>,
        config: SearchConfig,
    ) -> Self {
        Self {
            source,
            router,
            scheduler,
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Fetch candidates and run passes from level 0 until the target is met or the
    /// tolerance schedule is exhausted. Any previous results in `session` are dropped.
    pub async fn search(
        &self,
        session: &mut SearchSession,
        observer: &dyn SearchObserver,
        cancel: &CancellationToken,
    ) -> SearchOutcome {
        let query = session.query.clone();
        *session = SearchSession {
            phase: SearchPhase::Searching,
            ..blank_session(query.clone())
        };

        match self
            .source
            .find_candidates(&query.home, query.target_km, query.direction)
            .await
        {
            Ok(candidates) if !candidates.is_empty() => {
                tracing::info!("Search started with {} live candidates", candidates.len());
                session.candidates = candidates;
            }
            Ok(_) => {
                tracing::info!("Stop directory returned nothing; using synthetic candidates");
                self.use_synthetic(session);
            }
            Err(SourceError::RateLimited(msg)) => {
                tracing::warn!("Stop directory rate-limited: {}", msg);
                session.source_rate_limited = true;
                session.phase = SearchPhase::Idle;
                let outcome = session.outcome(SearchStatus::RateLimited, 0);
                observer.on_complete(&outcome);
                return outcome;
            }
            Err(err) => {
                tracing::warn!("{}; falling back to synthetic candidates", err);
                self.use_synthetic(session);
            }
        }

        let goal = self.config.routes_target;
        let max_level = self.config.max_tolerance_level();
        loop {
            let report = self.run_pass(session, goal, observer, cancel).await;
            if report.cancelled {
                return self.finish(session, SearchStatus::Cancelled, 0, observer);
            }
            if session.accepted.len() >= goal {
                session.phase = SearchPhase::TargetMet;
                break;
            }
            if session.tolerance_level >= max_level {
                session.phase = SearchPhase::ExhaustedAtMaxTolerance;
                break;
            }
            session.tolerance_level += 1;
            tracing::debug!(
                "Relaxing tolerance to level {} ({} routes so far)",
                session.tolerance_level,
                session.accepted.len()
            );
        }

        let status = session.status();
        self.finish(session, status, 0, observer)
    }

    /// Resume the session with one more pass at the current tolerance level. New routes are
    /// appended after the existing ones.
    pub async fn find_more(
        &self,
        session: &mut SearchSession,
        observer: &dyn SearchObserver,
        cancel: &CancellationToken,
    ) -> SearchOutcome {
        if session.passes.is_empty() {
            return self.search(session, observer, cancel).await;
        }

        let before = session.accepted.len();
        let goal = before + self.config.routes_target;
        session.phase = SearchPhase::Searching;

        let report = self.run_pass(session, goal, observer, cancel).await;
        if report.cancelled {
            return self.finish(session, SearchStatus::Cancelled, before, observer);
        }
        session.phase = if session.accepted.len() >= goal {
            SearchPhase::TargetMet
        } else {
            SearchPhase::ExhaustedAtMaxTolerance
        };

        let status = session.status();
        self.finish(session, status, before, observer)
    }

    fn use_synthetic(&self, session: &mut SearchSession) {
        let query = &session.query;
        session.candidates = synthetic_candidates(&query.home, query.target_km, query.direction);
        session.degraded = true;
    }

    fn finish(
        &self,
        session: &mut SearchSession,
        status: SearchStatus,
        before: usize,
        observer: &dyn SearchObserver,
    ) -> SearchOutcome {
        if status == SearchStatus::Cancelled {
            session.phase = SearchPhase::Idle;
        }
        let outcome = session.outcome(status, before);
        tracing::info!(
            "Search finished: {:?}, {} routes, level {}",
            outcome.status,
            outcome.routes_found,
            outcome.tolerance_level
        );
        observer.on_complete(&outcome);
        outcome
    }

    async fn run_pass(
        &self,
        session: &mut SearchSession,
        goal: usize,
        observer: &dyn SearchObserver,
        cancel: &CancellationToken,
    ) -> PassReport {
        let band = session.band(&self.config);
        let mut report = PassReport {
            tolerance_level: session.tolerance_level,
            ..PassReport::default()
        };

        if self.config.reuse_rejected_routes {
            report.reused = self.reuse_rejected(session, band, goal, observer);
            report.accepted += report.reused;
        }

        let home = session.query.home.location();
        let profile = session.query.activity.profile();
        let pending: Vec<Candidate> = session
            .candidates
            .iter()
            .filter(|c| !session.checked.contains(&c.id))
            .cloned()
            .collect();

        for candidate in pending {
            if session.accepted.len() >= goal
                || report.attempted >= self.config.max_candidates_per_pass
            {
                break;
            }
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            // Duplicate ids in the list are skipped here.
            if !session.checked.insert(candidate.id.clone()) {
                continue;
            }

            report.attempted += 1;
            session.router_calls += 1;
            match self.router.route(candidate.location(), home, profile).await {
                Ok(path) => {
                    session.router_successes += 1;
                    if band.contains(path.distance_m) {
                        tracing::debug!(
                            "Accepted {} at {:.0} m (level {})",
                            candidate.name,
                            path.distance_m,
                            session.tolerance_level
                        );
                        self.accept(session, candidate, path);
                        report.accepted += 1;
                        observer.on_progress(&session.accepted);
                    } else {
                        tracing::debug!(
                            "Rejected {} at {:.0} m (band {:.0}-{:.0})",
                            candidate.name,
                            path.distance_m,
                            band.min_m,
                            band.max_m
                        );
                        if self.config.reuse_rejected_routes {
                            session.rejected.push(RejectedRoute { candidate, path });
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!("Routing from {} failed: {}", candidate.name, err);
                    report.failures += 1;
                    if err.is_rate_limited() {
                        session.rate_limited_failures += 1;
                    }
                }
            }

            self.scheduler.sleep(self.config.inter_call_delay).await;
        }

        tracing::info!(
            "Pass at level {}: attempted {}, accepted {} ({} reused), failures {}",
            report.tolerance_level,
            report.attempted,
            report.accepted,
            report.reused,
            report.failures
        );
        session.passes.push(report.clone());
        observer.on_pass(session);
        report
    }

    fn reuse_rejected(
        &self,
        session: &mut SearchSession,
        band: ToleranceBand,
        goal: usize,
        observer: &dyn SearchObserver,
    ) -> usize {
        let mut reused = 0;
        let mut idx = 0;
        while idx < session.rejected.len() && session.accepted.len() < goal {
            if band.contains(session.rejected[idx].path.distance_m) {
                let RejectedRoute { candidate, path } = session.rejected.remove(idx);
                self.accept(session, candidate, path);
                reused += 1;
                observer.on_progress(&session.accepted);
            } else {
                idx += 1;
            }
        }
        reused
    }

    fn accept(&self, session: &mut SearchSession, candidate: Candidate, path: RoutedPath) {
        let color_index = session.next_color;
        session.next_color += 1;
        session.accepted.push(CandidateRoute {
            candidate,
            distance_m: path.distance_m,
            duration_s: path.duration_s,
            geometry: path.geometry,
            color: self.config.color(color_index),
            color_index,
            tolerance_level: session.tolerance_level,
            transit_journey: None,
        });
    }
}

fn blank_session(query: SearchQuery) -> SearchSession {
    SearchSession {
        query,
        phase: SearchPhase::Idle,
        tolerance_level: 0,
        candidates: Vec::new(),
        checked: HashSet::new(),
        accepted: Vec::new(),
        rejected: Vec::new(),
        passes: Vec::new(),
        degraded: false,
        next_color: 0,
        router_calls: 0,
        router_successes: 0,
        rate_limited_failures: 0,
        source_rate_limited: false,
    }
}
