// src/main.rs

//! # mdlive entry point
//!
//! Loads the configuration, sets up logging, and runs the watcher, the
//! fan-out loop and the web server until Ctrl-C.

use anyhow::Result;
use mdlive::config::AppConfig;
use mdlive::event::ChangeEvent;
use mdlive::hub::{self, ViewerHub};
use mdlive::{watcher, web};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// The main entry point for mdlive.
///
/// 1. Loads and validates the configuration; a missing root exits before any socket is bound.
/// 2. Initializes the tracing subscriber.
/// 3. Starts the watcher, the fan-out loop and the web server.
/// 4. Waits for Ctrl-C and shuts everything down.
#[tokio::main]
async fn main() -> Result<()> {
    let app_config = match AppConfig::load() {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&app_config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_max_level(tracing::Level::TRACE)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    tracing::info!("mdlive starting with configuration: {:?}", app_config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (change_tx, change_rx) = mpsc::channel::<ChangeEvent>(256);
    let viewers = ViewerHub::new();

    let mut tasks = Vec::new();

    if let Err(e) = watcher::run_watcher(Arc::clone(&app_config), change_tx).await {
        tracing::error!("Watcher failed to start, live reload disabled: {}", e);
    }

    tasks.push(tokio::spawn(hub::run_fan_out(
        viewers.clone(),
        change_rx,
        shutdown_rx.clone(),
    )));

    let web_config = Arc::clone(&app_config);
    let web_shutdown_rx = shutdown_rx.clone();
    let mut server = tokio::spawn(async move {
        web::start_server(web_config, viewers, web_shutdown_rx).await
    });

    tokio::select! {
        result = &mut server => {
            // The server only returns early if it could not bind or crashed.
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("Web server exited with error: {}", e),
                Err(e) => tracing::error!("Web server task failed: {}", e),
            }
            let _ = shutdown_tx.send(true);
            for task in tasks {
                let _ = task.await;
            }
            std::process::exit(1);
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => tracing::info!("Ctrl-C received, initiating shutdown..."),
                Err(err) => tracing::error!("Failed to listen for Ctrl-C signal: {}", err),
            }
        }
    }

    if shutdown_tx.send(true).is_err() {
        tracing::error!("Failed to send shutdown signal");
    }

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("Web server exited with error: {}", e),
        Err(e) => tracing::error!("Web server task failed: {}", e),
    }
    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!("A task panicked or exited with error: {}", e);
        }
    }

    tracing::info!("mdlive shut down gracefully.");
    Ok(())
}
