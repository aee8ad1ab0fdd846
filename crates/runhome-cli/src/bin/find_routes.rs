//! One-shot route search from the terminal.
//!
//! Usage:
//!   cargo run -p runhome-cli --bin find_routes -- --lat 52.52 --lng 13.405 --distance-km 8 \
//!       --direction north --gpx ./route.gpx

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use runhome_cli::ConsoleObserver;
use runhome_core::{
    elevation_stats, fetch_profile, gpx_filename, to_gpx, Activity, Direction, ElevationConfig,
    HomePoint, SearchConfig, SearchQuery, SearchSession,
};
use runhome_services::{ServiceConfig, ServiceContext};

#[derive(Parser, Debug)]
#[command(author, version, about = "Find transit stops you can run or ride home from")]
struct Args {
    /// Home latitude
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,

    /// Home longitude
    #[arg(long, allow_hyphen_values = true)]
    lng: f64,

    /// Label used for home in exports
    #[arg(long)]
    name: Option<String>,

    /// Target route length in kilometres
    #[arg(long, default_value_t = 5.0)]
    distance_km: f64,

    /// north, east, south, west or any
    #[arg(long, default_value = "any")]
    direction: Direction,

    /// run or bike
    #[arg(long, default_value = "run")]
    activity: Activity,

    /// Routes to find
    #[arg(long, default_value_t = 5)]
    routes: usize,

    /// Run "find more" this many times after the first search
    #[arg(long, default_value_t = 0)]
    more: usize,

    /// Write the first route as GPX (a directory gets a generated file name)
    #[arg(long)]
    gpx: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("runhome_services=warn".parse()?),
        )
        .init();

    let args = Args::parse();
    let query = SearchQuery {
        home: HomePoint::new(args.lat, args.lng, args.name.clone()),
        target_km: args.distance_km,
        direction: args.direction,
        activity: args.activity,
    };
    let mut session = SearchSession::new(query.clone())?;

    let context = ServiceContext::create(ServiceConfig::from_env())?;
    let engine = context.search_engine(SearchConfig {
        routes_target: args.routes.max(1),
        ..SearchConfig::default()
    });

    println!(
        "Searching {} routes of ~{:.1} km home ({:?}, {})...\n",
        args.routes.max(1),
        args.distance_km,
        args.direction,
        args.activity.display_name()
    );

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let observer = ConsoleObserver::new(args.activity);
    let mut outcome = engine.search(&mut session, &observer, &cancel).await;
    for _ in 0..args.more {
        if !outcome.has_more || cancel.is_cancelled() {
            break;
        }
        println!("\nLooking for more...\n");
        outcome = engine.find_more(&mut session, &observer, &cancel).await;
    }

    if let Some(path) = args.gpx {
        let Some(route) = session.route(0) else {
            bail!("no route to export");
        };
        let profile = fetch_profile(
            context.elevation().as_ref(),
            &route.geometry,
            &ElevationConfig::default(),
        )
        .await;
        if profile.has_elevation() {
            let stats = elevation_stats(&profile);
            println!(
                "Elevation: +{:.0} m / -{:.0} m ({:.0}-{:.0} m)",
                stats.gain, stats.loss, stats.min, stats.max
            );
        }

        let now = Utc::now();
        let gpx = to_gpx(
            route,
            &route.candidate,
            &query.home,
            query.activity,
            profile.has_elevation().then_some(&profile),
            now,
        );
        let path = if path.is_dir() {
            path.join(gpx_filename(&route.candidate.name, query.activity, now.date_naive()))
        } else {
            path
        };
        std::fs::write(&path, gpx)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Wrote {}", path.display());
    }

    context.dispose();
    Ok(())
}
