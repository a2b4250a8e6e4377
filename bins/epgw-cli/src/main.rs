//! # EPGW CLI - EPortal Gateway Runner
//!
//! Loads the gateway configuration, wires the consumers, worker pools, and the
//! shared producer, and runs until interrupted. Configuration problems are
//! fatal at startup; per-message problems are dead-lettered at runtime.
//!
//! ## Usage
//!
//! ```bash
//! # Run the gateway against a configuration file
//! epgw-cli --config config/gateway.yml
//!
//! # Enable debug logging
//! RUST_LOG=debug epgw-cli --config config/gateway.yml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use epgw_core::config::GatewayConfig;
use epgw_io::consumer::{run_consumer, ConsumerSettings};
use epgw_io::pipeline::{PipelineDeps, WorkerPool, QUEUE_CAPACITY, WORKERS_PER_PIPELINE};
use epgw_io::producer::KafkaPublisher;
use epgw_tx::registry::ResourceRegistry;
use tokio::{signal, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for the gateway runner
#[derive(Parser, Debug)]
#[command(name = "epgw-cli")]
#[command(about = "EPortal message-transformation gateway")]
struct Args {
    /// Path to the gateway YAML configuration file
    #[arg(short, long)]
    #[arg(help = "Gateway YAML configuration file")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = {
        let yaml = std::fs::read_to_string(&args.config)
            .with_context(|| format!("failed to read {}", args.config.display()))?;
        GatewayConfig::from_yaml(&yaml).context("failed to parse gateway configuration")?
    };
    config.validate().context("invalid gateway configuration")?;

    let (channel_id, channel) = config
        .active_channel()
        .context("no enabled channel configured")?;
    let channel_id = channel_id.to_string();
    let channel = Arc::new(channel.clone());
    let groups = channel.consumer_groups();

    info!(
        channel = %channel_id,
        brokers = %config.app.kafka.brokers,
        operations = channel.enabled_operations().count(),
        consumers = groups.len(),
        dlq = channel.dlq_topic().unwrap_or("<disabled>"),
        "starting gateway"
    );

    let registry = Arc::new(ResourceRegistry::new());
    let publisher = Arc::new(
        KafkaPublisher::new(&config.app.kafka, channel.timeout_ms)
            .context("failed to create producer")?,
    );

    let cancel = CancellationToken::new();
    let mut consumer_tasks = Vec::new();
    let mut pools = Vec::new();

    for (group_id, operations) in groups {
        let operations: Vec<_> = operations.into_iter().map(Arc::new).collect();
        let mut topics: Vec<String> = operations
            .iter()
            .flat_map(|op| op.input.iter().cloned())
            .collect();
        topics.sort();
        topics.dedup();

        info!(
            group = %group_id,
            ?topics,
            operations = operations.len(),
            "starting consumer"
        );

        let deps = Arc::new(PipelineDeps::new(
            channel_id.clone(),
            channel.clone(),
            operations.clone(),
            registry.clone(),
            publisher.clone(),
        ));
        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        pools.push(WorkerPool::spawn(queue_rx, deps, WORKERS_PER_PIPELINE));

        let settings = ConsumerSettings {
            brokers: config.app.kafka.brokers.clone(),
            client_id: format!("{}-{}", config.app.kafka.client_id, group_id),
            group_id,
            topics,
        };
        let child = cancel.child_token();
        consumer_tasks.push(tokio::spawn(run_consumer(
            settings, operations, queue_tx, child,
        )));
    }

    signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
    info!("received Ctrl-C, shutting down");
    cancel.cancel();

    // Consumers return first, closing their queues; workers drain and stop.
    for task in consumer_tasks {
        if let Ok(Err(err)) = task.await {
            tracing::error!(error = %err, "consumer terminated with error");
        }
    }
    for pool in pools {
        pool.join().await;
    }
    info!("gateway stopped");
    Ok(())
}
