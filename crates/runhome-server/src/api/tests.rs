use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tower::ServiceExt;

use runhome_core::{
    Candidate, CandidateKind, CandidateOrigin, CandidateSource, Direction, ElevationError,
    ElevationLookup, HomePoint, JourneyError, JourneyLeg, JourneyPlanner, LatLng, RoutedPath,
    Router, RoutingError, RoutingProfile, SearchConfig, SearchEngine, SourceError,
    TokioScheduler, TransitJourney,
};

use crate::{api, config::Config, state::AppState, state::Providers};

const HOME: (f64, f64) = (52.52, 13.405);

fn stop(id: &str, name: &str, lat: f64) -> Candidate {
    Candidate {
        id: id.to_string(),
        name: name.to_string(),
        lat,
        lng: HOME.1,
        kind: CandidateKind::Train,
        distance_from_home_m: (lat - HOME.0) * 111_195.0,
        origin: CandidateOrigin::RealStop,
    }
}

struct FakeSource;

#[async_trait]
impl CandidateSource for FakeSource {
    async fn find_candidates(
        &self,
        _home: &HomePoint,
        _target_km: f64,
        _direction: Direction,
    ) -> Result<Vec<Candidate>, SourceError> {
        Ok(vec![
            stop("node/1", "Gesundbrunnen", 52.565),
            stop("node/2", "Pankow", 52.567),
            stop("node/3", "Wollankstrasse", 52.562),
        ])
    }
}

/// Two-point routes come back at exactly 5 km; every waypoint adds 400 m.
struct FakeRouter {
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
}

impl FakeRouter {
    fn open() -> Self {
        Self {
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Router for FakeRouter {
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
        _profile: RoutingProfile,
    ) -> Result<RoutedPath, RoutingError> {
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| RoutingError::Timeout)?
                .forget();
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let geometry: Vec<[f64; 2]> = points.iter().map(|p| p.to_lng_lat()).collect();
        Ok(RoutedPath {
            distance_m: 5_000.0 + 400.0 * points.len().saturating_sub(2) as f64,
            duration_s: 1_800.0,
            geometry,
        })
    }
}

struct FakeElevation;

#[async_trait]
impl ElevationLookup for FakeElevation {
    async fn lookup(&self, points: &[LatLng]) -> Result<Vec<Option<f64>>, ElevationError> {
        Ok(points.iter().map(|p| Some(30.0 + (p.lat - HOME.0) * 1_000.0)).collect())
    }
}

#[derive(Default)]
struct FakeJourneys {
    calls: AtomicUsize,
}

#[async_trait]
impl JourneyPlanner for FakeJourneys {
    async fn find_journey(
        &self,
        home: &HomePoint,
        stop: &Candidate,
        departure: DateTime<Utc>,
    ) -> Result<TransitJourney, JourneyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TransitJourney {
            legs: vec![JourneyLeg {
                origin_name: Some(home.label().to_string()),
                destination_name: Some(stop.name.clone()),
                departure: Some(departure),
                arrival: Some(departure + ChronoDuration::minutes(14)),
                line_name: Some("S41".to_string()),
                line_product: Some("suburban".to_string()),
                direction: Some("Ring".to_string()),
                walking: false,
                distance_m: None,
            }],
        })
    }
}

struct TestApp {
    app: axum::Router,
    state: Arc<AppState>,
    journeys: Arc<FakeJourneys>,
}

fn setup_app_with(router: Arc<FakeRouter>) -> TestApp {
    let mut config = Config::default();
    config.routes_target = 2;
    config.inter_call_delay_ms = 0;

    let journeys = Arc::new(FakeJourneys::default());
    let engine = SearchEngine::new(
        Arc::new(FakeSource),
        router.clone(),
        Arc::new(TokioScheduler),
        SearchConfig {
            routes_target: config.routes_target,
            inter_call_delay: Duration::ZERO,
            ..SearchConfig::default()
        },
    );
    let providers = Providers {
        engine,
        router,
        elevation: Arc::new(FakeElevation),
        journeys: journeys.clone(),
    };
    let state = Arc::new(AppState::new(config, providers));
    let app = api::routes().with_state(state.clone());
    TestApp {
        app,
        state,
        journeys,
    }
}

fn setup_app() -> TestApp {
    setup_app_with(Arc::new(FakeRouter::open()))
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse json")
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> axum::response::Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

fn search_body(target_km: f64) -> Value {
    json!({
        "home": {"lat": HOME.0, "lng": HOME.1, "display_name": "Alexanderplatz"},
        "target_km": target_km,
        "direction": "north",
        "activity": "run"
    })
}

async fn create_search(app: &axum::Router) -> String {
    let response = send(app, "POST", "/v1/searches", Some(search_body(5.0))).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = read_json(response).await;
    body["id"].as_str().expect("session id").to_string()
}

async fn wait_idle(app: &axum::Router, id: &str) -> Value {
    for _ in 0..200 {
        let response = send(app, "GET", &format!("/v1/searches/{}", id), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        if body["in_flight"] == json!(false) && body["status"] != Value::Null {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("search {} never finished", id);
}

#[tokio::test]
async fn search_runs_in_background_until_target_met() {
    let test = setup_app();
    let id = create_search(&test.app).await;
    let body = wait_idle(&test.app, &id).await;

    assert_eq!(body["status"], "done");
    assert_eq!(body["phase"], "target_met");
    assert_eq!(body["routes"].as_array().unwrap().len(), 2);
    assert_eq!(body["routes"][0]["color"], "#3b82f6");
    assert_eq!(body["has_more"], true);
    assert_eq!(body["degraded"], false);
}

#[tokio::test]
async fn find_more_appends_remaining_routes() {
    let test = setup_app();
    let id = create_search(&test.app).await;
    wait_idle(&test.app, &id).await;

    let response = send(&test.app, "POST", &format!("/v1/searches/{}/more", id), None).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = wait_idle(&test.app, &id).await;

    let routes = body["routes"].as_array().unwrap();
    assert_eq!(routes.len(), 3);
    assert_eq!(routes[2]["color"], "#f59e0b");
    assert_eq!(body["has_more"], false);
}

#[tokio::test]
async fn starting_while_in_flight_is_a_no_op() {
    let gate = Arc::new(Semaphore::new(0));
    let router = Arc::new(FakeRouter::gated(gate.clone()));
    let test = setup_app_with(router.clone());
    let id = create_search(&test.app).await;

    let response = send(&test.app, "POST", &format!("/v1/searches/{}/more", id), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["in_flight"], true);

    gate.add_permits(100);
    let body = wait_idle(&test.app, &id).await;
    assert_eq!(body["routes"].as_array().unwrap().len(), 2);
    assert_eq!(router.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cancel_stops_a_running_search() {
    let gate = Arc::new(Semaphore::new(0));
    let test = setup_app_with(Arc::new(FakeRouter::gated(gate.clone())));
    let id = create_search(&test.app).await;

    let response = send(&test.app, "POST", &format!("/v1/searches/{}/cancel", id), None).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    gate.add_permits(100);

    // At most the call already waiting on the gate completes.
    let body = wait_idle(&test.app, &id).await;
    assert_eq!(body["status"], "cancelled");
    assert_eq!(body["phase"], "idle");
    assert!(body["routes"].as_array().unwrap().len() <= 1);
}

#[tokio::test]
async fn invalid_query_is_rejected() {
    let test = setup_app();
    let response = send(&test.app, "POST", "/v1/searches", Some(search_body(-1.0))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("target distance"));
    assert_eq!(test.state.session_count(), 0);
}

#[tokio::test]
async fn unknown_session_and_route_are_not_found() {
    let test = setup_app();
    let response = send(&test.app, "GET", "/v1/searches/missing", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let id = create_search(&test.app).await;
    wait_idle(&test.app, &id).await;
    let response = send(&test.app, "GET", &format!("/v1/searches/{}/routes/9", id), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn route_details_attach_journey_once() {
    let test = setup_app();
    let id = create_search(&test.app).await;
    wait_idle(&test.app, &id).await;

    let uri = format!(
        "/v1/searches/{}/routes/0?departure=2024-05-04T07:00:00Z",
        id
    );
    let response = send(&test.app, "GET", &uri, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["route"]["transit_journey"]["legs"][0]["line_name"], "S41");
    assert_eq!(body["distance_label"], "5.0 km");
    assert_eq!(body["pace_label"], "5:30");
    assert_eq!(body["estimate"]["calories"], 300);
    // 07:14 transit arrival + 27.5 min run
    assert_eq!(body["estimate"]["arrival_home"], "2024-05-04T07:41:30Z");

    send(&test.app, "GET", &uri, None).await;
    assert_eq!(test.journeys.calls.load(Ordering::SeqCst), 1);

    let snapshot = wait_idle(&test.app, &id).await;
    assert_eq!(
        snapshot["routes"][0]["transit_journey"]["legs"][0]["line_name"],
        "S41"
    );
}

#[tokio::test]
async fn waypoint_capacity_reports_conflict() {
    let test = setup_app();
    let id = create_search(&test.app).await;
    wait_idle(&test.app, &id).await;
    let base = format!("/v1/searches/{}/routes/0/edit", id);

    let response = send(&test.app, "POST", &base, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    for i in 0..6 {
        let point = json!({"lat": 52.53 + i as f64 * 0.005, "lng": 13.406});
        let response = send(&test.app, "POST", &format!("{}/waypoints", base), Some(point)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }
    let point = json!({"lat": 52.55, "lng": 13.41});
    let response = send(&test.app, "POST", &format!("{}/waypoints", base), Some(point)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = read_json(response).await;
    assert_eq!(body["error"], "maximum of 6 waypoints reached");

    let response = send(&test.app, "GET", &base, None).await;
    let body = read_json(response).await;
    assert_eq!(body["waypoints"].as_array().unwrap().len(), 6);
    assert_eq!(body["needs_update"], true);
}

#[tokio::test]
async fn saved_edit_replaces_route_and_cancel_restores() {
    let test = setup_app();
    let id = create_search(&test.app).await;
    wait_idle(&test.app, &id).await;
    let base = format!("/v1/searches/{}/routes/0/edit", id);

    send(&test.app, "POST", &base, None).await;
    let point = json!({"lat": 52.54, "lng": 13.41});
    send(&test.app, "POST", &format!("{}/waypoints", base), Some(point)).await;

    let response = send(&test.app, "POST", &format!("{}/update", base), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["needs_update"], false);
    assert_eq!(body["tentative_distance_m"], 5_400.0);

    let response = send(&test.app, "POST", &format!("{}/save", base), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let saved = read_json(response).await;
    assert_eq!(saved["distance_m"], 5_400.0);
    assert_eq!(saved["geometry"].as_array().unwrap().len(), 3);

    let snapshot = wait_idle(&test.app, &id).await;
    assert_eq!(snapshot["routes"][0]["distance_m"], 5_400.0);

    // Cancel leaves the saved route alone.
    send(&test.app, "POST", &base, None).await;
    let point = json!({"lat": 52.55, "lng": 13.41});
    send(&test.app, "POST", &format!("{}/waypoints", base), Some(point)).await;
    let response = send(&test.app, "POST", &format!("{}/cancel", base), None).await;
    let restored = read_json(response).await;
    assert_eq!(restored["distance_m"], 5_400.0);

    let response = send(&test.app, "POST", &format!("{}/save", base), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn restart_closes_edits_even_mid_update() {
    let test = setup_app();
    let id = create_search(&test.app).await;
    wait_idle(&test.app, &id).await;
    let base = format!("/v1/searches/{}/routes/0/edit", id);
    send(&test.app, "POST", &base, None).await;
    send(&test.app, "POST", &format!("{}/waypoints", base), Some(json!({"lat": 52.54, "lng": 13.41}))).await;

    // Stand-in for an update call holding the editor.
    let entry = test.state.get_session(&id).unwrap();
    let held = entry.editor().lock().await;
    let app = test.app.clone();
    let uri = format!("/v1/searches/{}/restart", id);
    let restart = tokio::spawn(async move { send(&app, "POST", &uri, None).await.status() });
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!restart.is_finished());

    drop(held);
    assert_eq!(restart.await.unwrap(), StatusCode::ACCEPTED);
    wait_idle(&test.app, &id).await;

    let response = send(&test.app, "GET", &base, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = send(&test.app, "POST", &format!("{}/save", base), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn save_rejects_edit_of_a_replaced_route() {
    let test = setup_app();
    let id = create_search(&test.app).await;
    wait_idle(&test.app, &id).await;
    let base = format!("/v1/searches/{}/routes/0/edit", id);
    send(&test.app, "POST", &base, None).await;
    send(&test.app, "POST", &format!("{}/waypoints", base), Some(json!({"lat": 52.54, "lng": 13.41}))).await;

    let entry = test.state.get_session(&id).unwrap();
    let replacement_id = {
        let mut session = entry.try_claim().unwrap();
        let other = session.route(1).cloned().unwrap();
        let other_id = other.candidate.id.clone();
        session.replace_route(0, other).unwrap();
        entry.publish(&session, None);
        other_id
    };

    let response = send(&test.app, "POST", &format!("{}/save", base), None).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = read_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("changed since editing started"));

    let response = send(&test.app, "GET", &base, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let snapshot = wait_idle(&test.app, &id).await;
    assert_eq!(snapshot["routes"][0]["candidate"]["id"], replacement_id.as_str());
    assert_eq!(snapshot["routes"][0]["distance_m"], 5_000.0);
}

#[tokio::test]
async fn fresh_restart_hides_previous_routes_until_rebuilt() {
    let gate = Arc::new(Semaphore::new(2));
    let test = setup_app_with(Arc::new(FakeRouter::gated(gate.clone())));
    let id = create_search(&test.app).await;
    let body = wait_idle(&test.app, &id).await;
    assert_eq!(body["routes"].as_array().unwrap().len(), 2);
    assert_eq!(body["candidates_checked"], 2);

    let response = send(&test.app, "POST", &format!("/v1/searches/{}/restart", id), None).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = read_json(response).await;
    assert_eq!(body["in_flight"], true);
    assert_eq!(body["phase"], "searching");
    assert!(body["routes"].as_array().unwrap().is_empty());
    assert_eq!(body["candidates_checked"], 0);

    let response = send(&test.app, "POST", &format!("/v1/searches/{}/routes/0/edit", id), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    gate.add_permits(100);
    let body = wait_idle(&test.app, &id).await;
    assert_eq!(body["routes"].as_array().unwrap().len(), 2);
    assert_eq!(body["candidates_checked"], 2);
    assert_eq!(body["tolerance_level"], 0);
}

#[tokio::test]
async fn elevation_profile_is_cached_until_geometry_changes() {
    let test = setup_app();
    let id = create_search(&test.app).await;
    wait_idle(&test.app, &id).await;

    let response = send(&test.app, "GET", &format!("/v1/searches/{}/routes/0/elevation", id), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["has_elevation"], true);
    assert!(body["stats"]["max"].as_f64().unwrap() > body["stats"]["min"].as_f64().unwrap());
    assert_eq!(test.state.profile_count(), 1);

    let base = format!("/v1/searches/{}/routes/0/edit", id);
    send(&test.app, "POST", &base, None).await;
    send(&test.app, "POST", &format!("{}/waypoints", base), Some(json!({"lat": 52.54, "lng": 13.41}))).await;
    let response = send(&test.app, "POST", &format!("{}/save", base), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(test.state.profile_count(), 0);
}

#[tokio::test]
async fn gpx_export_has_track_and_filename() {
    let test = setup_app();
    let id = create_search(&test.app).await;
    wait_idle(&test.app, &id).await;

    let response = send(&test.app, "GET", &format!("/v1/searches/{}/routes/0/gpx", id), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/gpx+xml"
    );
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"run-gesundbrunnen-"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let gpx = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(gpx.contains("<gpx"));
    assert!(gpx.contains("<trkpt"));
    assert!(gpx.contains("<ele>"));
}

#[tokio::test]
async fn delete_removes_session() {
    let test = setup_app();
    let id = create_search(&test.app).await;
    wait_idle(&test.app, &id).await;

    let response = send(&test.app, "DELETE", &format!("/v1/searches/{}", id), None).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = send(&test.app, "GET", &format!("/v1/searches/{}", id), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let response = send(&test.app, "DELETE", &format!("/v1/searches/{}", id), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn idle_sessions_expire() {
    let test = setup_app();
    let id = create_search(&test.app).await;
    wait_idle(&test.app, &id).await;

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(test.state.expire_sessions(Duration::from_secs(3600)), 0);
    assert_eq!(test.state.expire_sessions(Duration::from_millis(5)), 1);
    assert_eq!(test.state.session_count(), 0);
}

#[tokio::test]
async fn responses_carry_request_id() {
    let test = setup_app();
    let request = Request::builder()
        .uri("/v1/searches/missing")
        .header("x-request-id", "abc-123")
        .body(Body::empty())
        .unwrap();
    let response = test.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "abc-123");
}
