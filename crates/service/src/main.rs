//! Claim Ledger Service
//!
//! Builds epoch trees from the participation datastore, publishes their
//! roots and serves claim proofs.

mod api;
mod builder;
mod state;
mod submitter;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ledger-service")]
#[command(about = "Epoch root publisher and proof-lookup service for the claim ledger")]
struct Args {
    /// Participation datastore URL
    #[arg(long, env = "DATASET_URL", default_value = "http://localhost:8080")]
    dataset_url: String,

    /// Ledger node JSON-RPC URL
    #[arg(long, env = "RPC_URL", default_value = "http://localhost:8899")]
    rpc_url: String,

    /// Ledger program id (0x-prefixed, 32 bytes)
    #[arg(long, env = "PROGRAM_ID")]
    program_id: String,

    /// Token mint claims are paid in
    #[arg(long, env = "MINT")]
    mint: String,

    /// Publisher identity; omit to run read-only
    #[arg(long, env = "PUBLISHER")]
    publisher: Option<String>,

    /// Channels to maintain, as `name` or `name:mode` (ring, legacy, open, cumulative)
    #[arg(long = "channel", env = "CHANNELS", value_delimiter = ',', required = true)]
    channels: Vec<builder::ChannelConfig>,

    /// Seconds between datastore polls
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = 30)]
    poll_interval_secs: u64,

    /// API listen address
    #[arg(long, default_value = "0.0.0.0:8081")]
    listen: String,

    /// Metrics listen address
    #[arg(long, default_value = "0.0.0.0:9090")]
    metrics_listen: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    tracing::info!("Starting claim ledger service");
    tracing::info!(dataset_url = %args.dataset_url, "Participation datastore");
    tracing::info!(rpc_url = %args.rpc_url, "Ledger node");
    tracing::info!(listen = %args.listen, "API server");

    PrometheusBuilder::new()
        .with_http_listener(args.metrics_listen)
        .install()
        .context("Failed to install Prometheus exporter")?;

    let submitter = Arc::new(submitter::Submitter::new(submitter::SubmitterConfig {
        rpc_url: args.rpc_url.clone(),
        program_id: args.program_id.clone(),
        mint: args.mint.clone(),
        publisher: args.publisher.clone(),
    })?);

    let app_state = state::AppState::new();

    let api_handle = tokio::spawn(api::run_server(args.listen.clone(), app_state.clone()));

    let epoch_builder = builder::EpochBuilder::new(
        builder::BuilderConfig {
            dataset_url: args.dataset_url.clone(),
            poll_interval: Duration::from_secs(args.poll_interval_secs),
            channels: args.channels.clone(),
        },
        submitter,
        app_state,
    );
    let builder_handle = tokio::spawn(async move { epoch_builder.run().await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
        }
        result = api_handle => {
            match result {
                Ok(Err(e)) => tracing::error!(error = %e, "API server error"),
                Err(e) => tracing::error!(error = %e, "API server task failed"),
                Ok(Ok(())) => {}
            }
        }
        result = builder_handle => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Builder task failed");
            }
        }
    }

    Ok(())
}
