// src/main.rs

//! # Hotpage Main Entry Point
//!
//! Loads configuration, initializes logging, and launches the file watcher, the
//! change router and the web server. Any failure before the server is up is
//! fatal and exits with status 1.

use anyhow::Result;
use hotpage::bootstrap::Bootstrap;
use hotpage::config::AppConfig;
use hotpage::event::ChangeEvent;
use hotpage::hub::Hub;
use hotpage::router::{run_router, ChangeRouter, CommandRebuilder};
use hotpage::{watcher, web};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Logs a startup error and exits with a non-zero status.
fn fatal(message: impl std::fmt::Display) -> ! {
    tracing::error!("{}", message);
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<()> {
    let app_config = match AppConfig::load() {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize tracing subscriber for logging with environment filter and max level.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&app_config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_max_level(tracing::Level::TRACE)
        .with_writer(std::io::stderr) // Log to stderr
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Setting default tracing subscriber failed: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Hotpage starting with configuration: {:?}", app_config);

    if !app_config.root.is_dir() {
        fatal(format!(
            "Root directory {} does not exist.",
            app_config.root.display()
        ));
    }

    let bootstrap = Bootstrap::new(&app_config.sse_url).unwrap_or_else(|e| fatal(e));
    let hub = Arc::new(Hub::new());
    let router = ChangeRouter::from_config(&app_config, Arc::clone(&hub), CommandRebuilder)
        .unwrap_or_else(|e| fatal(e));
    let listener = web::bind(app_config.web_addr).await.unwrap_or_else(|e| {
        fatal(format!("Failed to bind {}: {}", app_config.web_addr, e))
    });

    // Shutdown signal channel for graceful shutdown of all tasks.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Channel for events from watcher to the change router.
    let (watcher_event_tx, watcher_event_rx) = mpsc::channel::<ChangeEvent>(100);

    if let Err(e) = watcher::run_watcher(app_config.folders_to_watch.clone(), watcher_event_tx).await {
        fatal(e);
    }

    let mut tasks = Vec::new();

    let router_shutdown_rx = shutdown_rx.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = run_router(router, watcher_event_rx, router_shutdown_rx).await {
            tracing::error!("Change router exited with error: {}", e);
        }
    }));

    let app = web::app(&app_config.root, web::AppState::new(Arc::clone(&hub), bootstrap));
    let web_shutdown_rx = shutdown_rx.clone();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = web::start_server(listener, app, hub, web_shutdown_rx).await {
            tracing::error!("Web server exited with error: {}", e);
        }
    }));

    tracing::info!(
        "Serving {} with live reload at {}",
        app_config.root.display(),
        app_config.sse_url
    );

    // Wait for Ctrl-C signal to initiate shutdown.
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Ctrl-C received, initiating shutdown...");
        }
        Err(err) => {
            tracing::error!("Failed to listen for Ctrl-C signal: {}", err);
        }
    }

    if shutdown_tx.send(true).is_err() {
        tracing::error!("Failed to send shutdown signal");
    }

    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!("A task panicked or exited with error: {}", e);
        }
    }

    tracing::info!("Hotpage shut down gracefully.");
    Ok(())
}
