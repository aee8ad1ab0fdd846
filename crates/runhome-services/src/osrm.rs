//! OSRM route client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use runhome_core::{LatLng, RoutedPath, Router, RoutingError, RoutingProfile};

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    distance: f64,
    duration: f64,
    geometry: OsrmGeometry,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

/// One request per call; no retries and no endpoint fallback.
pub struct OsrmRouter {
    client: Client,
    foot_url: String,
    bike_url: String,
    timeout: Duration,
}

impl OsrmRouter {
    pub fn new(client: Client, foot_url: String, bike_url: String, timeout: Duration) -> Self {
        Self {
            client,
            foot_url: foot_url.trim_end_matches('/').to_string(),
            bike_url: bike_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn base_url(&self, profile: RoutingProfile) -> &str {
        match profile {
            RoutingProfile::Foot => &self.foot_url,
            RoutingProfile::Bike => &self.bike_url,
        }
    }

    async fn request(&self, url: &str) -> Result<RoutedPath, RoutingError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    RoutingError::Timeout
                } else {
                    RoutingError::Network(err.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(RoutingError::RateLimited);
        }
        // OSRM answers 400 with a JSON body for "NoRoute"/"NoSegment".
        if !status.is_success() && status != StatusCode::BAD_REQUEST {
            return Err(RoutingError::Http(status.as_u16()));
        }

        let body = response.text().await.map_err(|err| {
            if err.is_timeout() {
                RoutingError::Timeout
            } else {
                RoutingError::Network(err.to_string())
            }
        })?;
        match parse_response(&body) {
            Err(RoutingError::InvalidResponse(_)) if !status.is_success() => {
                Err(RoutingError::Http(status.as_u16()))
            }
            other => other,
        }
    }
}

#[async_trait]
impl Router for OsrmRouter {
    async fn route(
        &self,
        start: LatLng,
        end: LatLng,
        profile: RoutingProfile,
    ) -> Result<RoutedPath, RoutingError> {
        self.route_with_waypoints(&[start, end], profile).await
    }

    async fn route_with_waypoints(
        &self,
        points: &[LatLng],
        profile: RoutingProfile,
    ) -> Result<RoutedPath, RoutingError> {
        if points.len() < 2 {
            return Err(RoutingError::TooFewPoints(points.len()));
        }
        let url = build_route_url(self.base_url(profile), points);
        tracing::debug!("OSRM {} request with {} points", profile.as_str(), points.len());
        self.request(&url).await
    }
}

fn build_route_url(base: &str, points: &[LatLng]) -> String {
    let coordinates = points
        .iter()
        .map(|p| format!("{},{}", p.lng, p.lat))
        .collect::<Vec<_>>()
        .join(";");
    format!("{base}/{coordinates}?overview=full&geometries=geojson")
}

fn parse_response(body: &str) -> Result<RoutedPath, RoutingError> {
    let parsed: OsrmResponse = serde_json::from_str(body)
        .map_err(|err| RoutingError::InvalidResponse(err.to_string()))?;

    if parsed.code != "Ok" {
        tracing::debug!(
            "OSRM returned {}: {}",
            parsed.code,
            parsed.message.as_deref().unwrap_or("")
        );
        return Err(RoutingError::NoRoute);
    }

    let route = parsed
        .routes
        .into_iter()
        .next()
        .ok_or(RoutingError::NoRoute)?;

    Ok(RoutedPath {
        distance_m: route.distance,
        duration_s: route.duration,
        geometry: route.geometry.coordinates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_lists_lng_lat_pairs_in_order() {
        let url = build_route_url(
            "https://routing.example/route/v1/foot",
            &[
                LatLng::new(52.5487, 13.3885),
                LatLng::new(52.53, 13.39),
                LatLng::new(52.52, 13.405),
            ],
        );
        assert_eq!(
            url,
            "https://routing.example/route/v1/foot/13.3885,52.5487;13.39,52.53;13.405,52.52?overview=full&geometries=geojson"
        );
    }

    #[test]
    fn parses_first_route() {
        let body = r#"{
            "code": "Ok",
            "routes": [
                {"distance": 5012.3, "duration": 3604.0,
                 "geometry": {"type": "LineString", "coordinates": [[13.3885, 52.5487], [13.405, 52.52]]}},
                {"distance": 9000.0, "duration": 7000.0,
                 "geometry": {"type": "LineString", "coordinates": []}}
            ]
        }"#;
        let path = parse_response(body).unwrap();
        assert_eq!(path.distance_m, 5012.3);
        assert_eq!(path.duration_s, 3604.0);
        assert_eq!(path.geometry, vec![[13.3885, 52.5487], [13.405, 52.52]]);
    }

    #[test]
    fn non_ok_code_is_no_route() {
        let body = r#"{"code": "NoRoute", "message": "Impossible route between points", "routes": []}"#;
        assert_eq!(parse_response(body), Err(RoutingError::NoRoute));
        assert_eq!(parse_response(r#"{"code": "Ok", "routes": []}"#), Err(RoutingError::NoRoute));
        assert!(matches!(parse_response("<html>"), Err(RoutingError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn single_point_is_rejected_before_any_request() {
        let router = OsrmRouter::new(
            Client::new(),
            "http://127.0.0.1:9/foot".to_string(),
            "http://127.0.0.1:9/bike".to_string(),
            Duration::from_secs(1),
        );
        let err = router
            .route_with_waypoints(&[LatLng::new(52.52, 13.405)], RoutingProfile::Foot)
            .await
            .unwrap_err();
        assert_eq!(err, RoutingError::TooFewPoints(1));
    }
}
