//! Waypoint editing for accepted routes.
//!
//! Edits never touch a [`CandidateRoute`] in place: saving produces a new route for the caller
//! to swap in, cancelling hands back the untouched snapshot.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::error::EditorError;
use crate::geo::nearest_vertex_index;
use crate::models::{CandidateRoute, LatLng, RoutedPath, RoutingProfile};
use crate::providers::Router;

pub const MAX_WAYPOINTS: usize = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct EditorConfig {
    pub max_waypoints: usize,
    /// How long a capacity notice stays visible.
    pub notice_ttl: Duration,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_waypoints: MAX_WAYPOINTS,
            notice_ttl: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone)]
struct Notice {
    message: String,
    raised_at: Instant,
}

/// In-progress edit of one route.
#[derive(Debug, Clone)]
pub struct WaypointEditSession {
    route_index: usize,
    waypoints: Vec<LatLng>,
    original: CandidateRoute,
    tentative: Option<RoutedPath>,
    dirty: bool,
    selected: Option<usize>,
}

impl WaypointEditSession {
    pub fn route_index(&self) -> usize {
        self.route_index
    }

    /// Waypoints in path order.
    pub fn waypoints(&self) -> &[LatLng] {
        &self.waypoints
    }

    pub fn original(&self) -> &CandidateRoute {
        &self.original
    }

    pub fn tentative(&self) -> Option<&RoutedPath> {
        self.tentative.as_ref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    /// Geometry the user currently sees: the recomputed route if any, else the original.
    pub fn geometry(&self) -> &[[f64; 2]] {
        match &self.tentative {
            Some(path) => &path.geometry,
            None => &self.original.geometry,
        }
    }

    fn projected_index(&self, point: LatLng) -> usize {
        nearest_vertex_index(self.geometry(), point.lat, point.lng).unwrap_or(0)
    }
}

/// Owns every open edit session for one search.
#[derive(Debug, Clone)]
pub struct RouteEditor {
    config: EditorConfig,
    home: LatLng,
    profile: RoutingProfile,
    sessions: HashMap<usize, WaypointEditSession>,
    notice: Option<Notice>,
}

impl RouteEditor {
    pub fn new(home: LatLng, profile: RoutingProfile, config: EditorConfig) -> Self {
        Self {
            config,
            home,
            profile,
            sessions: HashMap::new(),
            notice: None,
        }
    }

    pub fn session(&self, route_index: usize) -> Option<&WaypointEditSession> {
        self.sessions.get(&route_index)
    }

    pub fn is_editing(&self, route_index: usize) -> bool {
        self.sessions.contains_key(&route_index)
    }

    /// Close every open session without saving. Used when the route list is rebuilt.
    pub fn discard_all(&mut self) -> usize {
        let open = self.sessions.len();
        self.sessions.clear();
        self.notice = None;
        open
    }

    /// Waypoints changed since the last recompute.
    pub fn needs_update(&self, route_index: usize) -> bool {
        self.sessions
            .get(&route_index)
            .map(|s| s.dirty)
            .unwrap_or(false)
    }

    /// Snapshot `route` and open a clean edit session for it. Re-entering discards any
    /// previous session for the same index.
    pub fn enter_edit(&mut self, route_index: usize, route: &CandidateRoute) {
        self.sessions.insert(
            route_index,
            WaypointEditSession {
                route_index,
                waypoints: Vec::new(),
                original: route.clone(),
                tentative: None,
                dirty: false,
                selected: None,
            },
        );
    }

    /// Insert a waypoint at its position along the route. Returns the insertion index.
    pub fn add_waypoint(&mut self, route_index: usize, point: LatLng) -> Result<usize, EditorError> {
        if !point.is_finite() {
            return Err(EditorError::InvalidPoint);
        }
        let max = self.config.max_waypoints;
        let Some(session) = self.sessions.get_mut(&route_index) else {
            return Err(EditorError::NotEditing(route_index));
        };
        if session.waypoints.len() >= max {
            let err = EditorError::CapacityExceeded { max };
            self.notice = Some(Notice {
                message: err.to_string(),
                raised_at: Instant::now(),
            });
            return Err(err);
        }

        let projected = session.projected_index(point);
        let position = session
            .waypoints
            .iter()
            .filter(|wp| session.projected_index(**wp) <= projected)
            .count();

        session.waypoints.insert(position, point);
        if let Some(selected) = session.selected.as_mut() {
            if *selected >= position {
                *selected += 1;
            }
        }
        session.dirty = true;
        Ok(position)
    }

    pub fn remove_waypoint(&mut self, route_index: usize, index: usize) -> Result<LatLng, EditorError> {
        let session = self
            .sessions
            .get_mut(&route_index)
            .ok_or(EditorError::NotEditing(route_index))?;
        if index >= session.waypoints.len() {
            return Err(EditorError::WaypointOutOfRange {
                index,
                len: session.waypoints.len(),
            });
        }

        let removed = session.waypoints.remove(index);
        session.selected = match session.selected {
            Some(selected) if selected == index => None,
            Some(selected) if selected > index => Some(selected - 1),
            other => other,
        };
        session.dirty = true;
        Ok(removed)
    }

    pub fn select_waypoint(&mut self, route_index: usize, index: Option<usize>) -> Result<(), EditorError> {
        let session = self
            .sessions
            .get_mut(&route_index)
            .ok_or(EditorError::NotEditing(route_index))?;
        if let Some(idx) = index {
            if idx >= session.waypoints.len() {
                return Err(EditorError::WaypointOutOfRange {
                    index: idx,
                    len: session.waypoints.len(),
                });
            }
        }
        session.selected = index;
        Ok(())
    }

    /// Route `[stop, ...waypoints, home]` and keep the result as the tentative route.
    /// On failure the session is left as it was.
    pub async fn update_route(
        &mut self,
        route_index: usize,
        router: &dyn Router,
    ) -> Result<RoutedPath, EditorError> {
        let points = {
            let session = self
                .sessions
                .get(&route_index)
                .ok_or(EditorError::NotEditing(route_index))?;
            let mut points = Vec::with_capacity(session.waypoints.len() + 2);
            points.push(session.original.candidate.location());
            points.extend(session.waypoints.iter().copied());
            points.push(self.home);
            points
        };

        let path = router.route_with_waypoints(&points, self.profile).await?;
        tracing::debug!(
            "Recomputed route {} through {} waypoints: {:.0} m",
            route_index,
            points.len() - 2,
            path.distance_m
        );

        let session = self
            .sessions
            .get_mut(&route_index)
            .ok_or(EditorError::NotEditing(route_index))?;
        session.tentative = Some(path.clone());
        session.dirty = false;
        Ok(path)
    }

    /// Commit the edit and close the session. Stale or missing tentative routes are
    /// recomputed first; if that fails the session stays open.
    pub async fn save_edits(
        &mut self,
        route_index: usize,
        router: &dyn Router,
    ) -> Result<CandidateRoute, EditorError> {
        let needs_route = {
            let session = self
                .sessions
                .get(&route_index)
                .ok_or(EditorError::NotEditing(route_index))?;
            !session.waypoints.is_empty() && (session.dirty || session.tentative.is_none())
        };
        if needs_route {
            self.update_route(route_index, router).await?;
        }

        let session = self
            .sessions
            .remove(&route_index)
            .ok_or(EditorError::NotEditing(route_index))?;
        let route = match session.tentative {
            Some(path) => CandidateRoute {
                distance_m: path.distance_m,
                duration_s: path.duration_s,
                geometry: path.geometry,
                ..session.original
            },
            None => session.original,
        };
        Ok(route)
    }

    /// Drop the session and hand back the untouched snapshot.
    pub fn cancel_edits(&mut self, route_index: usize) -> Result<CandidateRoute, EditorError> {
        self.sessions
            .remove(&route_index)
            .map(|session| session.original)
            .ok_or(EditorError::NotEditing(route_index))
    }

    /// The current user notice, if it has not expired yet.
    pub fn notice(&self) -> Option<&str> {
        self.notice_at(Instant::now())
    }

    pub fn notice_at(&self, now: Instant) -> Option<&str> {
        self.notice
            .as_ref()
            .filter(|n| now.saturating_duration_since(n.raised_at) < self.config.notice_ttl)
            .map(|n| n.message.as_str())
    }

    pub fn clear_notice(&mut self) {
        self.notice = None;
    }
}
