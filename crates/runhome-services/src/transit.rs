//! Journey lookups against db.transport.rest.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;

use runhome_core::{Candidate, HomePoint, JourneyError, JourneyLeg, JourneyPlanner, TransitJourney};

use crate::endpoints::{AttemptError, EndpointSet};

#[derive(Debug, Deserialize)]
struct JourneysResponse {
    #[serde(default)]
    journeys: Vec<ApiJourney>,
}

#[derive(Debug, Deserialize)]
struct ApiJourney {
    #[serde(default)]
    legs: Vec<ApiLeg>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiLeg {
    origin: Option<ApiPlace>,
    destination: Option<ApiPlace>,
    departure: Option<String>,
    planned_departure: Option<String>,
    arrival: Option<String>,
    planned_arrival: Option<String>,
    line: Option<ApiLine>,
    direction: Option<String>,
    #[serde(default)]
    walking: bool,
    distance: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ApiPlace {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiLine {
    name: Option<String>,
    product: Option<String>,
}

pub struct DbTransitClient {
    client: Client,
    endpoints: Arc<EndpointSet>,
    timeout: Duration,
}

impl DbTransitClient {
    pub fn new(client: Client, endpoints: Arc<EndpointSet>, timeout: Duration) -> Self {
        Self {
            client,
            endpoints,
            timeout,
        }
    }
}

#[async_trait]
impl JourneyPlanner for DbTransitClient {
    async fn find_journey(
        &self,
        home: &HomePoint,
        stop: &Candidate,
        departure: DateTime<Utc>,
    ) -> Result<TransitJourney, JourneyError> {
        if stop.is_synthetic() {
            return Err(JourneyError::NotFound);
        }

        let params = journey_params(home, stop, departure);
        let client = &self.client;
        let timeout = self.timeout;

        let response = self
            .endpoints
            .try_each("transit", |base| {
                let params = params.clone();
                async move {
                    let response = client
                        .get(format!("{}/journeys", base.trim_end_matches('/')))
                        .query(&params)
                        .timeout(timeout)
                        .send()
                        .await
                        .map_err(|err| AttemptError::from_reqwest(&err))?;

                    if !response.status().is_success() {
                        return Err(AttemptError::from_status(response.status(), "transit"));
                    }

                    response
                        .json::<JourneysResponse>()
                        .await
                        .map_err(|err| AttemptError::from_reqwest(&err))
                }
            })
            .await?;

        first_journey(response).ok_or(JourneyError::NotFound)
    }
}

fn journey_params(
    home: &HomePoint,
    stop: &Candidate,
    departure: DateTime<Utc>,
) -> Vec<(&'static str, String)> {
    vec![
        ("from.latitude", home.lat.to_string()),
        ("from.longitude", home.lng.to_string()),
        ("from.address", home.label().to_string()),
        ("to.latitude", stop.lat.to_string()),
        ("to.longitude", stop.lng.to_string()),
        ("to.address", stop.name.clone()),
        (
            "departure",
            departure.to_rfc3339_opts(SecondsFormat::Secs, true),
        ),
        ("results", "1".to_string()),
        ("stopovers", "false".to_string()),
        ("polylines", "false".to_string()),
        ("pretty", "false".to_string()),
    ]
}

fn first_journey(response: JourneysResponse) -> Option<TransitJourney> {
    let journey = response.journeys.into_iter().next()?;
    if journey.legs.is_empty() {
        return None;
    }
    let legs = journey
        .legs
        .into_iter()
        .map(|leg| JourneyLeg {
            origin_name: leg.origin.and_then(|p| p.name),
            destination_name: leg.destination.and_then(|p| p.name),
            departure: parse_time(leg.departure.or(leg.planned_departure)),
            arrival: parse_time(leg.arrival.or(leg.planned_arrival)),
            line_name: leg.line.as_ref().and_then(|l| l.name.clone()),
            line_product: leg.line.and_then(|l| l.product),
            direction: leg.direction,
            walking: leg.walking,
            distance_m: leg.distance,
        })
        .collect();
    Some(TransitJourney { legs })
}

fn parse_time(raw: Option<String>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
}
