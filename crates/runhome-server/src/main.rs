//! run-home server: route searches, waypoint editing and GPX export over REST.

use anyhow::Result;
use axum::routing::get;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use runhome_server::config::Config;
use runhome_server::state::{AppState, Providers};
use runhome_server::{api, loops};
use runhome_services::ServiceContext;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("runhome_server=debug".parse()?)
                .add_directive("runhome_services=info".parse()?)
                .add_directive("runhome_core=info".parse()?),
        )
        .init();

    tracing::info!("Starting run-home server...");

    let config = Config::from_env();
    let port = config.server_port;
    let context = ServiceContext::create(config.services.clone())?;
    let providers = Providers {
        engine: context.search_engine(config.search_config()),
        router: context.router(),
        elevation: context.elevation(),
        journeys: context.journeys(),
    };
    let state = Arc::new(AppState::new(config, providers));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let expiry = tokio::spawn(loops::session_expiry_loop::run_session_expiry_loop(
        state.clone(),
        shutdown_tx.subscribe(),
    ));

    let app = api::routes()
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for shutdown signal: {}", err);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    tracing::info!("Shutting down");
    let _ = shutdown_tx.send(());
    expiry.await.ok();
    context.dispose();

    Ok(())
}
