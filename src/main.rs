//! City Weather API - current weather and forecasts by city name
//!
//! Serves normalized OpenWeather data over HTTP, with an in-memory cache in
//! front of the provider.

use std::fs::OpenOptions;
use std::path::Path;
use std::process;
use std::sync::Mutex;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{debug, error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use cityweather::api::{self, AppState};
use cityweather::cli::{Cli, ServiceConfig};
use cityweather::service::WeatherService;

/// Installs the global subscriber: stderr always, plus `log_file` if given
fn init_tracing(log_file: Option<&Path>) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cityweather=info"));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Values from .env fill in for unset environment variables
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = match ServiceConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(2);
        }
    };

    init_tracing(config.log_file.as_deref())?;

    match dotenv {
        Ok(path) => debug!("loaded environment from {}", path.display()),
        Err(e) => debug!("no .env file loaded: {}", e),
    }

    info!("Weather API starting up");

    let service = WeatherService::from_config(&config)?;
    if service.has_api_key() {
        info!("API key loaded");
    } else {
        error!("OPENWEATHER_API_KEY is not set; lookups will fail with no_api_key");
    }
    info!(origins = ?config.cors_origins, "CORS allowlist");

    let app = api::router(AppState::new(service), &config.cors_origins);

    let listener = TcpListener::bind(config.bind).await?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Weather API shutting down");
    Ok(())
}
