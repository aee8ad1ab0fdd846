//! Error taxonomy shared by the core and the service adapters.

use thiserror::Error;

/// Failure of the session-establishing candidate query.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// The directory throttled us; retrying later may succeed.
    #[error("stop directory is rate-limiting requests: {0}")]
    RateLimited(String),
    /// Every endpoint failed for a reason other than throttling.
    #[error("stop directory unavailable: {0}")]
    Unavailable(String),
}

impl SourceError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SourceError::RateLimited(_))
    }
}

/// A single point-to-point routing call failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RoutingError {
    #[error("routing request failed: {0}")]
    Network(String),
    #[error("routing request timed out")]
    Timeout,
    #[error("no route found")]
    NoRoute,
    #[error("routing service is rate-limiting requests")]
    RateLimited,
    #[error("routing service returned HTTP {0}")]
    Http(u16),
    #[error("invalid routing response: {0}")]
    InvalidResponse(String),
    #[error("need at least 2 points to route, got {0}")]
    TooFewPoints(usize),
}

impl RoutingError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RoutingError::RateLimited)
    }
}

/// A batch of elevation lookups failed. Never escapes profile construction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ElevationError {
    #[error("elevation request failed: {0}")]
    Network(String),
    #[error("elevation service returned HTTP {0}")]
    Http(u16),
    #[error("invalid elevation response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JourneyError {
    #[error("transit journey lookup failed: {0}")]
    Unavailable(String),
    #[error("transit journey lookup is rate-limited")]
    RateLimited,
    #[error("no journey found")]
    NotFound,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EditorError {
    #[error("maximum of {max} waypoints reached")]
    CapacityExceeded { max: usize },
    #[error("route {0} is not being edited")]
    NotEditing(usize),
    #[error("waypoint {index} out of range (have {len})")]
    WaypointOutOfRange { index: usize, len: usize },
    #[error("invalid waypoint coordinate")]
    InvalidPoint,
    #[error(transparent)]
    Routing(#[from] RoutingError),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SearchError {
    #[error("target distance must be positive and finite, got {0}")]
    InvalidTarget(f64),
    #[error("home location is not a valid coordinate")]
    InvalidHome,
    #[error("route {0} does not exist in this session")]
    UnknownRoute(usize),
}
