use anyhow::Context;
use clap::{Parser, Subcommand};
use flood_core::{ClassifierModel, Config, FloodRiskService, provider::default_provider_from_config};
use std::{path::PathBuf, sync::Arc};

use crate::routes;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "flood-risk", version, about = "Flood risk prediction service")]
pub struct Cli {
    /// Path to a config file. Defaults to $FLOOD_RISK_CONFIG, then the
    /// platform config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the HTTP API.
    Serve {
        /// Listen address, overriding `bind` from the config.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Predict flood risk for one location and exit.
    Predict {
        #[arg(long, allow_hyphen_values = true)]
        latitude: f64,

        #[arg(long, allow_hyphen_values = true)]
        longitude: f64,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config = Config::load(self.config.as_deref())?;

        match self.command {
            Command::Serve { bind } => {
                let bind = bind.unwrap_or_else(|| config.bind.clone());
                let service = build_service(&config)?;
                serve(service, &bind).await
            }
            Command::Predict {
                latitude,
                longitude,
            } => {
                let service = build_service(&config)?;
                let result = service.predict_by_location(latitude, longitude).await?;

                let f = result.features;
                println!("Location:   {}", result.coordinate);
                println!(
                    "Features:   rainfall {:.1} mm, soil moisture {:.3} m3/m3, elevation {:.1} m",
                    f.rainfall, f.soil_moisture, f.elevation
                );
                println!(
                    "Flood risk: {} ({:.1}% confidence)",
                    result.prediction.label,
                    result.prediction.confidence * 100.0
                );
                Ok(())
            }
        }
    }
}

/// Load the model and feature source. A missing or invalid model is fatal.
fn build_service(config: &Config) -> anyhow::Result<Arc<FloodRiskService>> {
    let model = ClassifierModel::load(&config.model_path)
        .context("Refusing to start without a classifier model")?;
    let source = default_provider_from_config(config)?;

    tracing::info!(
        provider = %source.id(),
        trees = model.n_trees(),
        region = ?config.region,
        "flood risk service ready"
    );

    Ok(Arc::new(
        FloodRiskService::new(source, Arc::new(model)).with_region(config.region),
    ))
}

async fn serve(service: Arc<FloodRiskService>, bind: &str) -> anyhow::Result<()> {
    let app = routes::router(service);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;

    tracing::info!("flood risk API listening on http://{bind}");
    tracing::info!("   POST /predict-by-location");
    tracing::info!("   POST /predict");
    tracing::info!("   GET  /health");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
