use std::sync::Arc;
use std::time::Duration;

use alloy_network::AnyNetwork;
use alloy_provider::ProviderBuilder;
use anyhow::{Result, anyhow};
use tokio::{signal, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{self, EnvFilter};
use url::Url;

use protocol_indexer::indexer::{self, Indexer};
use protocol_indexer::metrics::Metrics;
use protocol_indexer::models::errors::ProtocolError;
use protocol_indexer::protocols::{RpcContractReader, build_registry};
use protocol_indexer::storage;
use protocol_indexer::utils::load_config;
use protocol_indexer::utils::retry::{RetryConfig, retry_if};

const SLEEP_DURATION: u64 = 1000; // ms
const DEFAULT_CONFIG_FILE: &str = "config.yml";
const MAX_DB_CONNECTIONS: u32 = 4;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    println!();
    info!("=========================== INITIALIZING ===========================");

    // Load config
    let config_file = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
    let config = match load_config(&config_file) {
        Ok(config) => {
            info!("Config loaded successfully");
            config
        }
        Err(e) => {
            error!("Failed to load config: {:#}", e);
            return Err(anyhow!(e));
        }
    };

    // Initialize optional metrics
    let metrics = if config.metrics.enabled {
        let metrics = Arc::new(Metrics::new(config.chain_name.clone())?);
        metrics
            .start_metrics_server(&config.metrics.address, config.metrics.port)
            .await?;
        Some(metrics)
    } else {
        info!("Metrics are disabled");
        None
    };

    // Create RPC provider. Only reads are issued, so no fillers are needed.
    let rpc_url: Url = config.rpc_url.parse()?;
    info!("RPC URL: {:?}", config.rpc_url);
    let provider = ProviderBuilder::new()
        .disable_recommended_fillers()
        .network::<AnyNetwork>()
        .connect_http(rpc_url);

    // Register protocols and create their schemas
    let reader = Arc::new(RpcContractReader::new(provider.clone(), metrics.clone()));
    let registry = build_registry(&config.protocols, reader)?;
    let pool = storage::connect(&config.database_url, MAX_DB_CONNECTIONS).await?;
    let indexer = Indexer::new(registry, pool, metrics.clone());
    indexer.initialize().await?;

    // Resume after the last committed block, never before the configured start
    let last_indexed_block = storage::last_indexed_block(indexer.pool()).await?;
    let mut block_number = last_indexed_block
        .map_or(0, |height| height + 1)
        .max(config.start_block.unwrap_or(0));
    info!("Starting block number: {}", block_number);

    // Ctrl+C cancels the token; an in-flight block is rolled back
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Ok(()) = signal::ctrl_c().await {
            info!("Received Ctrl+C signal, initiating shutdown...");
            shutdown.cancel();
        }
    });

    let retry_config = RetryConfig::default();

    println!();
    info!("========================= STARTING INDEXER =========================");

    loop {
        if cancel.is_cancelled() {
            info!("Shutting down main processing loop...");
            break Ok(());
        }

        if let Some(end_block) = config.end_block {
            if block_number > end_block {
                info!("Reached end block {}. Stopping.", end_block);
                break Ok(());
            }
        }

        // Get latest block number
        let latest_block = indexer::get_latest_block_number(&provider, metrics.as_deref()).await?;
        if let Some(metrics) = &metrics {
            metrics.record_chain_tip(latest_block, block_number);
        }

        // If indexer gets too close to tip, back off and retry
        if block_number.saturating_add(config.chain_tip_buffer) > latest_block {
            info!(
                "Buffer limit reached. Waiting for block {} to be {} blocks behind tip {} - sleeping for 1s",
                block_number, config.chain_tip_buffer, latest_block
            );
            pause(&cancel).await;
            continue;
        }

        let block_start_time = Instant::now();
        let block_data =
            indexer::fetch_block_data(&provider, block_number, metrics.as_deref()).await?;

        // Only transient failures are worth a fresh transaction
        let result = {
            let (indexer, block_data, cancel) = (&indexer, &block_data, &cancel);
            retry_if(
                move || indexer.index_block(block_data, cancel),
                ProtocolError::is_transient,
                &retry_config,
                "index_block",
            )
            .await
        };

        match result {
            Ok(()) => {
                info!(
                    "Indexed block {} in {:.3}s",
                    block_number,
                    block_start_time.elapsed().as_secs_f64()
                );
                block_number += 1;
            }
            Err(ProtocolError::Cancelled) => {
                info!("Block {} rolled back on shutdown", block_number);
                break Ok(());
            }
            Err(e) => {
                error!("Failed to index block {}: {}", block_number, e);
                return Err(anyhow!(e).context(format!("block {}", block_number)));
            }
        }
    }
}

async fn pause(cancel: &CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(Duration::from_millis(SLEEP_DURATION)) => {}
    }
}
