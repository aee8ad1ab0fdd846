//! Core data models for the run-home route finder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A plain WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// GeoJSON ordering, as used in route geometry.
    pub fn to_lng_lat(self) -> [f64; 2] {
        [self.lng, self.lat]
    }

    pub fn from_lng_lat(coord: [f64; 2]) -> Self {
        Self {
            lat: coord[1],
            lng: coord[0],
        }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// The user's home location. Set once per search and never mutated by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomePoint {
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl HomePoint {
    pub fn new(lat: f64, lng: f64, display_name: Option<String>) -> Self {
        Self {
            lat,
            lng,
            display_name,
        }
    }

    pub fn location(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }

    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or("Home")
    }
}

/// Direction constraint relative to home.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North,
    East,
    South,
    West,
    #[default]
    Any,
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "north" | "n" => Ok(Direction::North),
            "east" | "e" => Ok(Direction::East),
            "south" | "s" => Ok(Direction::South),
            "west" | "w" => Ok(Direction::West),
            "any" | "" => Ok(Direction::Any),
            other => Err(format!("unknown direction '{other}'")),
        }
    }
}

/// What the user is doing on the way home.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activity {
    #[default]
    Run,
    Bike,
}

impl Activity {
    pub fn profile(self) -> RoutingProfile {
        match self {
            Activity::Run => RoutingProfile::Foot,
            Activity::Bike => RoutingProfile::Bike,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Activity::Run => "Running",
            Activity::Bike => "Cycling",
        }
    }
}

impl std::str::FromStr for Activity {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "run" | "running" | "walk" => Ok(Activity::Run),
            "bike" | "cycling" | "cycle" => Ok(Activity::Bike),
            other => Err(format!("unknown activity '{other}'")),
        }
    }
}

/// Routing profile understood by the router adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingProfile {
    Foot,
    Bike,
}

impl RoutingProfile {
    pub fn as_str(self) -> &'static str {
        match self {
            RoutingProfile::Foot => "foot",
            RoutingProfile::Bike => "bike",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    Train,
    Metro,
    Suburban,
    Tram,
    Bus,
    Station,
    Waypoint,
}

impl CandidateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CandidateKind::Train => "train",
            CandidateKind::Metro => "metro",
            CandidateKind::Suburban => "suburban",
            CandidateKind::Tram => "tram",
            CandidateKind::Bus => "bus",
            CandidateKind::Station => "station",
            CandidateKind::Waypoint => "waypoint",
        }
    }
}

/// Where a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateOrigin {
    RealStop,
    SyntheticDirect,
}

/// A transit stop or synthetic point considered as a route start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Unique and stable within one candidate list; the dedup key of a session.
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub kind: CandidateKind,
    /// Straight-line distance from home in meters.
    pub distance_from_home_m: f64,
    pub origin: CandidateOrigin,
}

impl Candidate {
    pub fn location(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }

    pub fn is_synthetic(&self) -> bool {
        self.origin == CandidateOrigin::SyntheticDirect
    }
}

/// Output of the router adapter. Geometry is `[lng, lat]` ordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedPath {
    pub distance_m: f64,
    pub duration_s: f64,
    pub geometry: Vec<[f64; 2]>,
}

/// One leg of a public transport journey from home to the stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyLeg {
    pub origin_name: Option<String>,
    pub destination_name: Option<String>,
    pub departure: Option<DateTime<Utc>>,
    pub arrival: Option<DateTime<Utc>>,
    pub line_name: Option<String>,
    pub line_product: Option<String>,
    pub direction: Option<String>,
    #[serde(default)]
    pub walking: bool,
    pub distance_m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitJourney {
    pub legs: Vec<JourneyLeg>,
}

impl TransitJourney {
    pub fn departure(&self) -> Option<DateTime<Utc>> {
        self.legs.first().and_then(|leg| leg.departure)
    }

    pub fn arrival(&self) -> Option<DateTime<Utc>> {
        self.legs.last().and_then(|leg| leg.arrival)
    }

    pub fn duration_s(&self) -> Option<i64> {
        let departure = self.departure()?;
        let arrival = self.arrival()?;
        Some((arrival - departure).num_seconds().max(0))
    }

    pub fn line_names(&self) -> Vec<&str> {
        self.legs
            .iter()
            .filter_map(|leg| leg.line_name.as_deref())
            .collect()
    }
}

/// A validated candidate whose route distance fell inside the active tolerance band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRoute {
    pub candidate: Candidate,
    pub distance_m: f64,
    pub duration_s: f64,
    pub geometry: Vec<[f64; 2]>,
    pub color: String,
    pub color_index: usize,
    /// Tolerance level that was active when this route was accepted.
    pub tolerance_level: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transit_journey: Option<TransitJourney>,
}

impl CandidateRoute {
    pub fn distance_km(&self) -> f64 {
        self.distance_m / 1000.0
    }

    /// Identity used for derived caches; changes whenever the geometry changes.
    pub fn fingerprint(&self) -> String {
        let first = self.geometry.first().copied().unwrap_or([0.0, 0.0]);
        let last = self.geometry.last().copied().unwrap_or([0.0, 0.0]);
        format!(
            "{}:{}:{:.1}:{:.6},{:.6}:{:.6},{:.6}",
            self.candidate.id,
            self.geometry.len(),
            self.distance_m,
            first[0],
            first[1],
            last[0],
            last[1]
        )
    }
}

/// One sample of an elevation profile. `elevation_m` is `None` when unknown, never zero-filled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElevationPoint {
    pub lat: f64,
    pub lng: f64,
    pub elevation_m: Option<f64>,
    pub cumulative_distance_m: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElevationProfile {
    pub points: Vec<ElevationPoint>,
}

impl ElevationProfile {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn has_elevation(&self) -> bool {
        self.points.iter().any(|p| p.elevation_m.is_some())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ElevationStats {
    pub gain: f64,
    pub loss: f64,
    pub min: f64,
    pub max: f64,
}
