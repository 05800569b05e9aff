//! callsight pipeline binary.
//!
//! Wires the whole pipeline together: the NDJSON-over-TCP ingest listener
//! (the stand-in transport collaborator), the session demultiplexer, the
//! extraction pool, the persister, and the health/metrics endpoints.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};

use callsight_demux::SessionDemultiplexer;
use callsight_features::processor_factory;
use callsight_pool::{ideal_worker_count, ExecutionPool};
use callsight_settings::{load_settings_from_path, CallsightSettings};
use callsight_store::{
    FsDumpStore, LocalUniquenessRegistry, Persister, TracingFeatureStore,
};

mod http;
mod ingest;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "callsight-agent", about = "WebRTC trace ingestion and feature mining")]
struct Cli {
    /// Path to the settings file.
    #[arg(long, default_value = "callsight.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings_from_path(&cli.config).context("loading settings")?;
    callsight_logging::init(settings.server.log_json);

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("installing metrics recorder")?;

    info!(config = %cli.config.display(), "starting callsight agent");
    run(settings, metrics_handle).await
}

async fn run(
    settings: CallsightSettings,
    metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
) -> anyhow::Result<()> {
    setup_work_directory(&settings.ingest.dump_dir).context("preparing work directory")?;

    // Extraction pool and the persister consuming its results.
    let pool_size = match settings.pool.size {
        0 => ideal_worker_count(),
        size => size,
    };
    let pool = ExecutionPool::spawn(
        processor_factory(),
        pool_size,
        Duration::from_millis(settings.pool.regen_delay_ms),
    );
    info!(pool_size, "extraction pool ready");

    let persister = Persister::new(
        Arc::new(FsDumpStore::new(format!("{}/archive", settings.ingest.dump_dir))),
        Arc::new(TracingFeatureStore),
        Arc::new(LocalUniquenessRegistry::default()),
        settings.store.retain_on_error,
    );
    let pool_events = pool
        .subscribe()
        .await
        .map_err(|err| anyhow::anyhow!("pool subscription failed: {err}"))?;
    let persister_task = tokio::spawn(persister.run(pool_events));

    // Demultiplexer: completed dumps flow to the pool (unless extraction
    // is disabled, in which case they go straight to persistence).
    let (ingest_tx, ingest_rx) = mpsc::channel(1024);
    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel();
    let demux = SessionDemultiplexer::new(
        &settings.ingest.dump_dir,
        Duration::from_millis(settings.ingest.sink_idle_timeout_ms),
        closed_tx,
    );
    let demux_task = tokio::spawn(demux.run(ingest_rx));

    let submit_pool = pool.clone();
    let disable_extraction = settings.store.disable_feature_extraction;
    let router_task = tokio::spawn(async move {
        while let Some(dump) = closed_rx.recv().await {
            if disable_extraction {
                info!(client_id = %dump.client_id, "extraction disabled, dump kept on disk");
                continue;
            }
            if let Err(err) = submit_pool.submit(dump) {
                error!("dropping completed dump: {err}");
            }
        }
    });

    // Ingest listener and the health/metrics endpoints.
    let ingest_addr = format!("{}:{}", settings.server.host, settings.server.port);
    let ingest_task = tokio::spawn(ingest::listen(ingest_addr.clone(), ingest_tx));
    let http_addr = format!("{}:{}", settings.server.host, settings.server.metrics_port);
    let http_task = tokio::spawn(http::serve(http_addr.clone(), metrics_handle));
    info!(ingest_addr, http_addr, "callsight agent running");

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutting down");

    // Stop accepting; the demultiplexer force-closes open sinks on channel
    // teardown and the persister drains whatever the pool still emits.
    ingest_task.abort();
    http_task.abort();
    // Lingering per-connection tasks keep senders alive; bound the wait.
    if tokio::time::timeout(Duration::from_secs(10), demux_task)
        .await
        .is_err()
    {
        error!("demultiplexer did not stop in time");
    }
    router_task.abort();
    drop(pool);
    persister_task.abort();
    Ok(())
}

/// Reset the dump directory: leftover files from a previous run are
/// partial at best and would otherwise collide with fresh sinks.
fn setup_work_directory(dump_dir: &str) -> std::io::Result<()> {
    let dir = std::path::Path::new(dump_dir);
    if dir.exists() {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() {
                if let Err(err) = std::fs::remove_file(&path) {
                    error!(path = %path.display(), "could not remove stale dump: {err}");
                }
            }
        }
    } else {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}
