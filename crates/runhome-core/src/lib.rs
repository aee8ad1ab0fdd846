pub mod candidates;
pub mod editor;
pub mod elevation;
pub mod error;
pub mod estimate;
pub mod export;
pub mod geo;
pub mod models;
pub mod providers;
pub mod search;

pub use candidates::{rank_candidates, synthetic_candidates};
pub use editor::{EditorConfig, RouteEditor, WaypointEditSession, MAX_WAYPOINTS};
pub use elevation::{elevation_stats, fetch_profile, flat_profile, ElevationConfig};
pub use error::{EditorError, ElevationError, JourneyError, RoutingError, SearchError, SourceError};
pub use estimate::{estimate_route, format_activity_duration, format_pace, RouteEstimate};
pub use export::{gpx_filename, to_gpx};
pub use geo::{
    bearing_degrees, format_distance, format_duration, haversine_distance, in_direction,
    search_annulus, tolerance_band, SearchAnnulus, ToleranceBand,
};
pub use models::{
    Activity, Candidate, CandidateKind, CandidateOrigin, CandidateRoute, Direction,
    ElevationPoint, ElevationProfile, ElevationStats, HomePoint, JourneyLeg, LatLng, RoutedPath,
    RoutingProfile, TransitJourney,
};
pub use providers::{
    CandidateSource, ElevationLookup, JourneyPlanner, Router, Scheduler, TokioScheduler,
};
pub use search::{
    NoopObserver, PassReport, SearchConfig, SearchEngine, SearchObserver, SearchOutcome,
    SearchPhase, SearchQuery, SearchSession, SearchStatus,
};
