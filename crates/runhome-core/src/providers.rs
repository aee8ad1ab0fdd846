//! Seams to the external services the core depends on.
//!
//! Adapters live in `runhome-services`; tests plug in in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::error::{ElevationError, JourneyError, RoutingError, SourceError};
use crate::models::{
    Candidate, Direction, HomePoint, LatLng, RoutedPath, RoutingProfile, TransitJourney,
};

/// Stop/station directory.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Candidates inside the search annulus and direction sector, closest-to-target first.
    async fn find_candidates(
        &self,
        home: &HomePoint,
        target_km: f64,
        direction: Direction,
    ) -> Result<Vec<Candidate>, SourceError>;
}

/// Point-to-point routing service. Implementations apply their own request timeout and never retry.
#[async_trait]
pub trait Router: Send + Sync {
    async fn route(
        &self,
        start: LatLng,
        end: LatLng,
        profile: RoutingProfile,
    ) -> Result<RoutedPath, RoutingError>;

    /// Route through `[start, ...waypoints, end]` in order.
    async fn route_with_waypoints(
        &self,
        points: &[LatLng],
        profile: RoutingProfile,
    ) -> Result<RoutedPath, RoutingError>;
}

/// Elevation lookup for one batch of points; output is parallel to input.
#[async_trait]
pub trait ElevationLookup: Send + Sync {
    async fn lookup(&self, points: &[LatLng]) -> Result<Vec<Option<f64>>, ElevationError>;
}

/// Public transport journey from home to a stop.
#[async_trait]
pub trait JourneyPlanner: Send + Sync {
    async fn find_journey(
        &self,
        home: &HomePoint,
        stop: &Candidate,
        departure: DateTime<Utc>,
    ) -> Result<TransitJourney, JourneyError>;
}

/// Cooperative pause between upstream calls.
#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

#[async_trait]
impl Scheduler for TokioScheduler {
    async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        tokio::time::sleep(duration).await;
    }
}
