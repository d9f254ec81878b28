//! acap-daemon entry point.
//!
//! This file is intentionally thin: it loads configuration, connects to the
//! database, starts the Orchestrator in the background, wires the HTTP
//! status surface, and waits on an OS signal to shut everything down. All
//! route handlers live in `routes.rs`; all shared state lives in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use acap_config::AcapConfig;
use acap_daemon::{routes, state};
use acap_recorder::MockRecorder;
use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    match run().await {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "acap-daemon exited with a fatal error");
            std::process::exit(1);
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let (config, config_hash) = load_config()?;
    config.validate().context("config validation failed")?;
    info!(config_hash = %config_hash, "loaded configuration");

    let pool = acap_db::connect_from_env().await.context("connect to database")?;
    acap_db::migrate(&pool).await.context("run database migrations")?;

    let shared = Arc::new(state::AppState::new(pool.clone(), config.clone(), config_hash));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8899)));
    info!("acap-daemon listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // No production Recorder implementation ships in this repo (the model-
    // driving browser loop is an external concern, §1 Non-goals); the
    // daemon drives the Recording Queue Worker against a deterministic
    // mock until a real `RecorderAdapter` is wired in by the operator.
    let recorder_factory: acap_orchestrator::RecorderFactory = std::sync::Arc::new(|| std::sync::Arc::new(MockRecorder::new()));

    let orchestrator = acap_orchestrator::Orchestrator::new(
        pool,
        config.orchestrator.clone(),
        config.build_runner.clone(),
        config.queue_worker.clone(),
        recorder_factory,
    );

    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    let orchestrator_handle = tokio::spawn(async move { orchestrator.run(stop_rx).await });

    let server = axum::serve(listener, app).with_graceful_shutdown(wait_for_shutdown_signal());
    let serve_result = server.await.context("HTTP server crashed");

    // First signal (or server exit) requests a graceful stop; the
    // Orchestrator gets up to `shutdown_timeout_seconds` to drain in-flight
    // work before we give up waiting on it (§6 Operational signals).
    let _ = stop_tx.send(true);
    let shutdown_deadline = Duration::from_secs(config.orchestrator.shutdown_timeout_seconds + 5);
    match tokio::time::timeout(shutdown_deadline, orchestrator_handle).await {
        Ok(Ok(Ok(()))) => info!("orchestrator stopped cleanly"),
        Ok(Ok(Err(err))) => warn!(error = %format!("{err:#}"), "orchestrator returned an error"),
        Ok(Err(join_err)) => warn!(error = %join_err, "orchestrator task panicked"),
        Err(_) => warn!("orchestrator did not stop within the shutdown deadline; abandoning it"),
    }

    serve_result
}

/// Waits for the first SIGINT/SIGTERM. A second signal while this future is
/// still pending (i.e. during the graceful drain below) terminates the
/// process immediately rather than waiting out the full deadline.
async fn wait_for_shutdown_signal() {
    let first = first_signal();
    first.await;
    info!("shutdown signal received, draining in-flight work");

    tokio::spawn(async {
        first_signal().await;
        warn!("second shutdown signal received, forcing immediate exit");
        std::process::exit(130);
    });
}

#[cfg(unix)]
async fn first_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
    tokio::select! {
        _ = sigterm.recv() => {}
        _ = sigint.recv() => {}
    }
}

#[cfg(not(unix))]
async fn first_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}

/// Config layers are read from `ACAP_CONFIG_PATHS` (comma-separated,
/// applied in order, later layers win). Unset means "all defaults", which
/// is a valid production configuration per §6.
fn load_config() -> anyhow::Result<(AcapConfig, String)> {
    let loaded = match std::env::var("ACAP_CONFIG_PATHS") {
        Ok(raw) => {
            let paths: Vec<&str> = raw.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
            acap_config::load_layered_yaml(&paths)?
        }
        Err(_) => acap_config::load_layered_yaml_from_strings(&[])?,
    };
    let config = AcapConfig::from_loaded(&loaded)?;
    Ok((config, loaded.config_hash))
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("ACAP_DAEMON_ADDR").ok()?.parse().ok()
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()).collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
