//! Stop directory backed by the Overpass API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use runhome_core::candidates::rank_candidates;
use runhome_core::geo::search_annulus;
use runhome_core::{
    Candidate, CandidateKind, CandidateOrigin, CandidateSource, Direction, HomePoint, SourceError,
};

use crate::backoff::Backoff;
use crate::endpoints::{AttemptError, EndpointSet};

const UNNAMED_STOP: &str = "Unnamed Stop";
const MAX_COOLDOWN: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    id: i64,
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<OverpassCenter>,
    tags: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

pub struct OverpassDirectory {
    client: Client,
    endpoints: Arc<EndpointSet>,
    request_timeout: Duration,
    query_timeout_s: u64,
    cooldown: Mutex<Backoff>,
}

impl OverpassDirectory {
    pub fn new(
        client: Client,
        endpoints: Arc<EndpointSet>,
        request_timeout: Duration,
        query_timeout_s: u64,
        cooldown: Duration,
    ) -> Self {
        Self {
            client,
            endpoints,
            request_timeout,
            query_timeout_s: query_timeout_s.max(5),
            cooldown: Mutex::new(Backoff::new(cooldown, MAX_COOLDOWN)),
        }
    }

    /// Remaining cooldown after a throttled call, if any.
    pub fn cooling_down(&self) -> Option<Duration> {
        let cooldown = self.cooldown.lock().ok()?;
        if cooldown.ready() {
            None
        } else {
            Some(cooldown.remaining())
        }
    }

    async fn fetch(&self, query: String) -> Result<OverpassResponse, SourceError> {
        // The whole query can take up to `query_timeout_s` server-side.
        let timeout = self
            .request_timeout
            .max(Duration::from_secs(self.query_timeout_s + 5));
        let client = &self.client;

        self.endpoints
            .try_each("Overpass", |url| {
                let body = query.clone();
                async move {
                    let response = client
                        .post(&url)
                        .header("Content-Type", "text/plain")
                        .timeout(timeout)
                        .body(body)
                        .send()
                        .await
                        .map_err(|err| AttemptError::from_reqwest(&err))?;

                    if !response.status().is_success() {
                        return Err(AttemptError::from_status(response.status(), "Overpass"));
                    }

                    response
                        .json::<OverpassResponse>()
                        .await
                        .map_err(|err| AttemptError::from_reqwest(&err))
                }
            })
            .await
            .map_err(SourceError::from)
    }
}

#[async_trait]
impl CandidateSource for OverpassDirectory {
    async fn find_candidates(
        &self,
        home: &HomePoint,
        target_km: f64,
        direction: Direction,
    ) -> Result<Vec<Candidate>, SourceError> {
        if let Some(remaining) = self.cooling_down() {
            return Err(SourceError::RateLimited(format!(
                "Overpass cooling down for another {}s",
                remaining.as_secs().max(1)
            )));
        }

        let annulus = search_annulus(target_km);
        let query = build_query(home, annulus.outer_radius_m, self.query_timeout_s);

        let payload = match self.fetch(query).await {
            Ok(payload) => {
                if let Ok(mut cooldown) = self.cooldown.lock() {
                    cooldown.reset();
                }
                payload
            }
            Err(err) => {
                if err.is_rate_limited() {
                    if let Ok(mut cooldown) = self.cooldown.lock() {
                        let delay = cooldown.fail();
                        tracing::warn!("Overpass throttled, cooling down for {:?}", delay);
                    }
                }
                return Err(err);
            }
        };

        let raw = parse_elements(payload.elements);
        let total = raw.len();
        let ranked = rank_candidates(home, target_km, direction, raw);
        tracing::debug!(
            "Overpass returned {} stops, {} inside the {:?} annulus",
            total,
            ranked.len(),
            direction
        );
        Ok(ranked)
    }
}

fn build_query(home: &HomePoint, radius_m: f64, timeout_s: u64) -> String {
    let around = format!("around:{:.0},{:.6},{:.6}", radius_m.ceil(), home.lat, home.lng);
    format!(
        "[out:json][timeout:{timeout_s}];\n(\n  node[\"railway\"~\"^(station|halt)$\"]({around});\n  node[\"public_transport\"=\"station\"]({around});\n  node[\"railway\"=\"tram_stop\"]({around});\n  node[\"amenity\"=\"bus_station\"]({around});\n  way[\"public_transport\"=\"station\"]({around});\n  way[\"amenity\"=\"bus_station\"]({around});\n);\nout center tags;"
    )
}

fn parse_elements(elements: Vec<OverpassElement>) -> Vec<Candidate> {
    let empty_tags = HashMap::new();
    elements
        .into_iter()
        .filter_map(|element| {
            let (lat, lng) = element_center(&element)?;
            let tags = element.tags.as_ref().unwrap_or(&empty_tags);
            let name = tags
                .get("name")
                .map(|n| n.trim())
                .filter(|n| !n.is_empty())
                .unwrap_or(UNNAMED_STOP)
                .to_string();
            let element_type = element.kind.as_deref().unwrap_or("node");
            Some(Candidate {
                id: format!("{}/{}", element_type, element.id),
                name,
                lat,
                lng,
                kind: classify(tags),
                distance_from_home_m: 0.0,
                origin: CandidateOrigin::RealStop,
            })
        })
        .collect()
}

fn element_center(element: &OverpassElement) -> Option<(f64, f64)> {
    if let (Some(lat), Some(lon)) = (element.lat, element.lon) {
        return Some((lat, lon));
    }
    element.center.as_ref().map(|c| (c.lat, c.lon))
}

fn classify(tags: &HashMap<String, String>) -> CandidateKind {
    let tag = |key: &str| tags.get(key).map(String::as_str);

    if tag("station") == Some("subway") || tag("subway") == Some("yes") {
        return CandidateKind::Metro;
    }
    if tag("station") == Some("light_rail") || tag("light_rail") == Some("yes") {
        return CandidateKind::Suburban;
    }
    match tag("railway") {
        Some("station") | Some("halt") => return CandidateKind::Train,
        Some("tram_stop") => return CandidateKind::Tram,
        _ => {}
    }
    if tag("amenity") == Some("bus_station") || tag("highway") == Some("bus_stop") {
        return CandidateKind::Bus;
    }
    CandidateKind::Station
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "version": 0.6,
        "elements": [
            {"type": "node", "id": 1, "lat": 52.5487, "lon": 13.3885,
             "tags": {"name": "Berlin Gesundbrunnen", "railway": "station", "station": "light_rail"}},
            {"type": "node", "id": 2, "lat": 52.5497, "lon": 13.3876,
             "tags": {"name": "Gesundbrunnen", "railway": "station", "station": "subway"}},
            {"type": "node", "id": 3, "lat": 52.54, "lon": 13.40,
             "tags": {"railway": "tram_stop"}},
            {"type": "way", "id": 4, "center": {"lat": 52.55, "lon": 13.39},
             "tags": {"name": "ZOB", "amenity": "bus_station"}},
            {"type": "relation", "id": 5, "tags": {"name": "No coordinates"}}
        ]
    }"#;

    #[test]
    fn parses_and_classifies_elements() {
        let response: OverpassResponse = serde_json::from_str(FIXTURE).unwrap();
        let stops = parse_elements(response.elements);

        assert_eq!(stops.len(), 4);
        assert_eq!(stops[0].id, "node/1");
        assert_eq!(stops[0].kind, CandidateKind::Suburban);
        assert_eq!(stops[1].kind, CandidateKind::Metro);
        assert_eq!(stops[2].name, UNNAMED_STOP);
        assert_eq!(stops[2].kind, CandidateKind::Tram);
        assert_eq!(stops[3].id, "way/4");
        assert_eq!(stops[3].kind, CandidateKind::Bus);
        assert!(stops.iter().all(|s| s.origin == CandidateOrigin::RealStop));
    }

    #[test]
    fn query_uses_outer_radius() {
        let home = HomePoint::new(52.52, 13.405, None);
        let query = build_query(&home, 6_000.4, 25);
        assert!(query.starts_with("[out:json][timeout:25];"));
        assert!(query.contains("around:6001,52.520000,13.405000"));
        assert!(query.ends_with("out center tags;"));
    }

    #[test]
    fn plain_railway_station_is_train() {
        let mut tags = HashMap::new();
        tags.insert("railway".to_string(), "halt".to_string());
        assert_eq!(classify(&tags), CandidateKind::Train);
        assert_eq!(classify(&HashMap::new()), CandidateKind::Station);
    }

    #[tokio::test]
    async fn cooldown_fails_fast_without_network() {
        let endpoints = Arc::new(EndpointSet::new(
            vec!["http://127.0.0.1:9/api/interpreter".to_string()],
            Default::default(),
        ));
        let directory = OverpassDirectory::new(
            Client::new(),
            endpoints,
            Duration::from_secs(1),
            25,
            Duration::from_secs(30),
        );
        directory.cooldown.lock().unwrap().fail();

        let home = HomePoint::new(52.52, 13.405, None);
        let err = directory
            .find_candidates(&home, 5.0, Direction::Any)
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());
    }
}
