//! check-worker — runs every running workflow's diagnostic checks on schedule.
//!
//! Startup: load config → open the workflow store → build the Prometheus
//! source and model registry → schedule all running workflows.
//! Stops on Ctrl-C or SIGTERM, waiting for jobs to wind down.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use vigil_compute::{
    CheckScheduler, JsonWorkflowStore, LogSink, ModelRegistry, PrometheusSource,
    SchedulerConfig, WorkflowRunner,
};
use vigil_core::config::{load_dotenv, Config};

// ── CLI ─────────────────────────────────────────────────────────────

/// Periodic diagnostic checks over host telemetry.
#[derive(Parser, Debug)]
#[command(name = "check-worker", version, about)]
struct Cli {
    /// Config profile (e.g. PROD); overrides VIGIL_PROFILE.
    #[arg(long)]
    profile: Option<String>,

    /// Workflow store JSON file.
    #[arg(long)]
    workflow_store: Option<PathBuf>,

    /// Model directory (`<dir>/<algo_name>/<model_id>.json`).
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Prometheus base URL.
    #[arg(long)]
    prometheus_url: Option<String>,

    /// Shutdown timeout in seconds.
    #[arg(long)]
    shutdown_timeout: Option<u64>,
}

impl Cli {
    fn config(&self) -> Config {
        let mut config = match &self.profile {
            Some(profile) => Config::for_profile(profile),
            None => Config::from_env(),
        };
        if let Some(path) = &self.workflow_store {
            config.storage.workflow_store = path.clone();
        }
        if let Some(dir) = &self.model_dir {
            config.storage.model_dir = dir.clone();
        }
        if let Some(url) = &self.prometheus_url {
            config.prometheus.url = url.clone();
        }
        if let Some(secs) = self.shutdown_timeout {
            config.check.shutdown_timeout_secs = secs;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config();
    config.log_summary();

    let store = Arc::new(
        JsonWorkflowStore::open(&config.storage.workflow_store)
            .await
            .with_context(|| {
                format!(
                    "failed to open workflow store {}",
                    config.storage.workflow_store.display()
                )
            })?,
    );
    let source = Arc::new(
        PrometheusSource::from_config(&config.prometheus)
            .context("failed to build Prometheus client")?,
    );
    let models = Arc::new(ModelRegistry::builtin(
        &config.storage.model_dir,
        config.check.sample_period as i64,
    ));
    info!(algorithms = ?models.algorithms(), "model registry ready");

    let runner = Arc::new(WorkflowRunner::new(
        store.clone(),
        source,
        models,
        Arc::new(LogSink),
        config.check.sample_period,
    ));
    let scheduler = CheckScheduler::new(SchedulerConfig::from(&config.check), store, runner);

    let started = scheduler
        .start_all_workflow()
        .await
        .context("failed to schedule running workflows")?;
    info!(jobs = started, "check-worker started");

    shutdown_signal().await?;
    info!("shutdown signal received");

    scheduler.shutdown().await;
    info!("check-worker exited cleanly");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("failed to register SIGTERM handler")?;
        tokio::select! {
            res = ctrl_c => res.context("failed to listen for ctrl_c")?,
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.context("failed to listen for ctrl_c")?;
    }

    Ok(())
}
