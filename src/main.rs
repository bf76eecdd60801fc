//! Tag search server.
//!
//! Usage: `tagbooru [settings-file]`. Settings not found in the file come
//! from `TAGBOORU_*` environment variables or the built-in defaults.

use std::sync::Arc;

use tagbooru::booru::Booru;
use tagbooru::config::Settings;
use tagbooru::server;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let file = std::env::args().nth(1);
    let settings = match Settings::load(file.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "cannot load settings");
            std::process::exit(1);
        }
    };
    let booru = match Booru::open(&settings) {
        Ok(booru) => Arc::new(booru),
        Err(e) => {
            error!(error = %e, "cannot open booru");
            std::process::exit(1);
        }
    };

    let app = server::router(Arc::clone(&booru), settings.page_length);
    let listener = match tokio::net::TcpListener::bind(&settings.address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(address = %settings.address, error = %e, "cannot bind");
            std::process::exit(1);
        }
    };
    info!(address = %settings.address, "listening");
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await;
    if let Err(e) = served {
        error!(error = %e, "server failed");
    }

    match Arc::try_unwrap(booru) {
        Ok(booru) => {
            if let Err(e) = booru.close() {
                error!(error = %e, "close failed");
            }
        }
        Err(_) => info!("requests still running, leaving storage to close on exit"),
    }
}
