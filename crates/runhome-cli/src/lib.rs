//! Terminal output helpers for the `find_routes` binary.

use std::sync::atomic::{AtomicUsize, Ordering};

use runhome_core::geo::{format_distance, format_duration};
use runhome_core::{
    estimate_route, format_activity_duration, format_pace, Activity, CandidateRoute,
    SearchObserver, SearchOutcome,
};

/// One line per route: index, stop, kind, distance, routed time, activity estimate.
pub fn route_line(index: usize, route: &CandidateRoute, activity: Activity) -> String {
    let estimate = estimate_route(route, activity, None, None);
    format!(
        "{:>2}. {:<32} {:<9} {:>8}  {:>10}  {} @ {}/km  (band level {})",
        index + 1,
        truncate(&route.candidate.name, 32),
        route.candidate.kind.as_str(),
        format_distance(route.distance_m),
        format_duration(route.duration_s),
        format_activity_duration(estimate.duration_minutes),
        format_pace(estimate.pace_min_per_km),
        route.tolerance_level
    )
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Prints each route as it is accepted.
#[derive(Debug)]
pub struct ConsoleObserver {
    activity: Activity,
    printed: AtomicUsize,
}

impl ConsoleObserver {
    pub fn new(activity: Activity) -> Self {
        Self {
            activity,
            printed: AtomicUsize::new(0),
        }
    }

    pub fn printed(&self) -> usize {
        self.printed.load(Ordering::SeqCst)
    }
}

impl SearchObserver for ConsoleObserver {
    fn on_progress(&self, routes: &[CandidateRoute]) {
        let already = self.printed.swap(routes.len(), Ordering::SeqCst);
        for (index, route) in routes.iter().enumerate().skip(already) {
            println!("{}", route_line(index, route, self.activity));
        }
    }

    fn on_complete(&self, outcome: &SearchOutcome) {
        println!(
            "\n{} ({} routes, tolerance level {}{})",
            outcome.status.user_message(),
            outcome.routes_found,
            outcome.tolerance_level,
            if outcome.degraded {
                ", no live transit info"
            } else {
                ""
            }
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runhome_core::{Candidate, CandidateKind, CandidateOrigin};

    fn route(name: &str) -> CandidateRoute {
        CandidateRoute {
            candidate: Candidate {
                id: "node/1".to_string(),
                name: name.to_string(),
                lat: 52.5487,
                lng: 13.3885,
                kind: CandidateKind::Suburban,
                distance_from_home_m: 3_600.0,
                origin: CandidateOrigin::RealStop,
            },
            distance_m: 5_000.0,
            duration_s: 3_600.0,
            geometry: vec![[13.3885, 52.5487], [13.405, 52.52]],
            color: "#3b82f6".to_string(),
            color_index: 0,
            tolerance_level: 1,
            transit_journey: None,
        }
    }

    #[test]
    fn route_line_shows_distance_and_estimate() {
        let line = route_line(0, &route("Gesundbrunnen"), Activity::Run);
        assert!(line.starts_with(" 1. Gesundbrunnen"));
        assert!(line.contains("suburban"));
        assert!(line.contains("5.0 km"));
        assert!(line.contains("5:30/km"));
        assert!(line.ends_with("(band level 1)"));
    }

    #[test]
    fn long_names_are_truncated() {
        assert_eq!(truncate("Berlin Hauptbahnhof", 10), "Berlin Ha…");
        assert_eq!(truncate("Pankow", 10), "Pankow");
    }

    #[test]
    fn observer_prints_only_new_routes() {
        let observer = ConsoleObserver::new(Activity::Bike);
        let routes = vec![route("A"), route("B")];
        observer.on_progress(&routes[..1]);
        observer.on_progress(&routes);
        assert_eq!(observer.printed(), 2);
    }
}
