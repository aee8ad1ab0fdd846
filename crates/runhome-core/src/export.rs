//! GPX 1.1 track export.

use std::collections::HashMap;
use std::fmt::Write as _;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

use crate::models::{Activity, Candidate, CandidateRoute, ElevationProfile, HomePoint};

const CREATOR: &str = "RunHome App";

fn escape_xml(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

fn coord_key(lng: f64, lat: f64) -> String {
    format!("{lng:.6},{lat:.6}")
}

fn track_type(activity: Activity) -> &'static str {
    match activity {
        Activity::Run => "running",
        Activity::Bike => "cycling",
    }
}

/// Serialize a route as a GPX document: start and finish waypoints plus one track segment.
/// Track points get an `<ele>` only where the profile has a known elevation at that vertex.
pub fn to_gpx(
    route: &CandidateRoute,
    stop: &Candidate,
    home: &HomePoint,
    activity: Activity,
    profile: Option<&ElevationProfile>,
    created_at: DateTime<Utc>,
) -> String {
    let stop_name = if stop.name.trim().is_empty() {
        "Transit Stop".to_string()
    } else {
        escape_xml(&stop.name)
    };
    let activity_name = activity.display_name();

    let elevations: HashMap<String, f64> = profile
        .map(|p| {
            p.points
                .iter()
                .filter_map(|pt| pt.elevation_m.map(|e| (coord_key(pt.lng, pt.lat), e)))
                .collect()
        })
        .unwrap_or_default();

    let mut trackpoints = String::new();
    for (idx, [lng, lat]) in route.geometry.iter().enumerate() {
        if idx > 0 {
            trackpoints.push('\n');
        }
        match elevations.get(&coord_key(*lng, *lat)) {
            Some(ele) => {
                let _ = write!(
                    trackpoints,
                    "      <trkpt lat=\"{lat}\" lon=\"{lng}\"><ele>{ele:.1}</ele></trkpt>"
                );
            }
            None => {
                let _ = write!(trackpoints, "      <trkpt lat=\"{lat}\" lon=\"{lng}\"></trkpt>");
            }
        }
    }

    let time = created_at.to_rfc3339_opts(SecondsFormat::Millis, true);
    let distance_km = route.distance_m / 1000.0;

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="{CREATOR}"
  xmlns="http://www.topografix.com/GPX/1/1"
  xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
  xsi:schemaLocation="http://www.topografix.com/GPX/1/1 http://www.topografix.com/GPX/1/1/gpx.xsd">
  <metadata>
    <name>{activity_name} from {stop_name}</name>
    <desc>{activity_name} route from {stop_name} to Home - {distance_km:.1} km</desc>
    <time>{time}</time>
  </metadata>
  <wpt lat="{stop_lat}" lon="{stop_lng}">
    <name>Start: {stop_name}</name>
    <desc>Transit stop - {stop_kind}</desc>
    <sym>Flag, Blue</sym>
  </wpt>
  <wpt lat="{home_lat}" lon="{home_lng}">
    <name>Finish: Home</name>
    <desc>Home location</desc>
    <sym>Flag, Green</sym>
  </wpt>
  <trk>
    <name>{activity_name} from {stop_name}</name>
    <type>{track_type}</type>
    <trkseg>
{trackpoints}
    </trkseg>
  </trk>
</gpx>"#,
        stop_lat = stop.lat,
        stop_lng = stop.lng,
        stop_kind = stop.kind.as_str(),
        home_lat = home.lat,
        home_lng = home.lng,
        track_type = track_type(activity),
    )
}

/// `run-alexanderplatz-2024-05-01.gpx`
pub fn gpx_filename(stop_name: &str, activity: Activity, date: NaiveDate) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;
    for ch in stop_name.to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }
    let slug: String = slug.chars().take(30).collect();
    let slug = if slug.is_empty() { "route".to_string() } else { slug };

    let prefix = match activity {
        Activity::Run => "run",
        Activity::Bike => "bike",
    };
    format!("{prefix}-{slug}-{}.gpx", date.format("%Y-%m-%d"))
}
