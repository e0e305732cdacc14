//! # teardown
//!
//! Removes preview environments: deletes the cluster project derived from a
//! branch or pull request and marks the environment deleted in the registry.
//!
//! ## Usage
//!
//! ```bash
//! # Run workers, one JSON task per line on stdin
//! echo '{"projectName":"acme","branch":"feature/x","type":"branch"}' \
//!   | teardown run --cluster-url https://console.example.com:8443 \
//!       --registry-url https://api.example.com/graphql
//!
//! # Show which names a task resolves to
//! teardown resolve '{"projectName":"acme","pullrequestNumber":42,"type":"pullrequest"}'
//! ```

#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use teardown_core::app::{DeleteConfirmation, RemovalWorker, WorkerGroup};
use teardown_core::config::{ClusterConfig, LogFormat, RegistryConfig, RetryConfig, WorkerConfig};
use teardown_core::domain::{
    DefaultDecider, RemovalTask, TaskEnvelope, TaskId, TaskType, resolve_task,
};
use teardown_core::impls::{GraphqlRegistry, HttpClusterApi, InMemoryTaskQueue, TracingEventSink};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "teardown")]
#[command(about = "Removes preview environments from the cluster and the registry")]
#[command(version)]
struct Args {
    /// Log output format.
    #[arg(long, env = "TEARDOWN_LOG_FORMAT", value_enum, default_value = "pretty", global = true)]
    log_format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Pretty,
}

impl From<Format> for LogFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => LogFormat::Json,
            Format::Pretty => LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Consume removal tasks (newline-delimited JSON on stdin).
    Run(RunArgs),

    /// Print the cluster project and registry environment a task resolves to.
    Resolve {
        /// Task JSON, e.g. `{"projectName":"acme","branch":"main","type":"branch"}`.
        task: String,
    },
}

#[derive(Debug, clap::Args)]
struct RunArgs {
    /// Queue name.
    #[arg(long, env = "TEARDOWN_QUEUE", default_value = "remove-openshift")]
    queue: String,

    /// Number of competing workers.
    #[arg(long, env = "TEARDOWN_WORKERS", default_value = "1")]
    workers: usize,

    /// Cluster API base URL.
    #[arg(long, env = "TEARDOWN_CLUSTER_URL")]
    cluster_url: String,

    #[arg(long, env = "TEARDOWN_CLUSTER_TOKEN", default_value = "", hide_env_values = true)]
    cluster_token: String,

    /// Cluster request timeout in seconds.
    #[arg(long, env = "TEARDOWN_CLUSTER_TIMEOUT_SECS", default_value = "30")]
    cluster_timeout_secs: u64,

    /// Post-delete existence polls (0 disables confirmation).
    #[arg(long, env = "TEARDOWN_CONFIRM_ATTEMPTS", default_value = "0")]
    confirm_attempts: u32,

    #[arg(long, env = "TEARDOWN_CONFIRM_INTERVAL_SECS", default_value = "2")]
    confirm_interval_secs: u64,

    /// Registry GraphQL endpoint.
    #[arg(long, env = "TEARDOWN_REGISTRY_URL")]
    registry_url: String,

    #[arg(long, env = "TEARDOWN_REGISTRY_TOKEN", default_value = "", hide_env_values = true)]
    registry_token: String,

    /// Registry request timeout in seconds.
    #[arg(long, env = "TEARDOWN_REGISTRY_TIMEOUT_SECS", default_value = "30")]
    registry_timeout_secs: u64,

    /// Deliveries per task before dead-lettering.
    #[arg(long, env = "TEARDOWN_MAX_ATTEMPTS", default_value = "5")]
    max_attempts: u32,

    #[arg(long, env = "TEARDOWN_BASE_DELAY_SECS", default_value = "2")]
    base_delay_secs: u64,

    #[arg(long, env = "TEARDOWN_BACKOFF_MULTIPLIER", default_value = "2.0")]
    backoff_multiplier: f64,
}

impl RunArgs {
    fn into_config(self, log_format: LogFormat) -> WorkerConfig {
        WorkerConfig {
            queue: self.queue,
            workers: self.workers,
            retry: RetryConfig {
                max_attempts: self.max_attempts,
                base_delay_seconds: self.base_delay_secs,
                backoff_multiplier: self.backoff_multiplier,
            },
            cluster: ClusterConfig {
                console_url: self.cluster_url,
                token: self.cluster_token,
                timeout_seconds: self.cluster_timeout_secs,
                confirm_attempts: self.confirm_attempts,
                confirm_interval_seconds: self.confirm_interval_secs,
            },
            registry: RegistryConfig {
                endpoint: self.registry_url,
                token: self.registry_token,
                timeout_seconds: self.registry_timeout_secs,
            },
            log_format,
        }
    }
}

// ============================================================================
// Logging
// ============================================================================

fn init_logging(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_format = LogFormat::from(args.log_format);

    match args.command {
        Commands::Run(run) => {
            init_logging(log_format);
            let config = run.into_config(log_format);
            config.validate().context("invalid configuration")?;
            serve(config).await
        }
        Commands::Resolve { task } => resolve(&task),
    }
}

fn resolve(raw: &str) -> Result<()> {
    let task: RemovalTask = serde_json::from_str(raw).context("task is not valid JSON")?;
    let identity = resolve_task(&task)?;
    println!("cluster project:      {}", identity.cluster_project_name);
    println!("registry environment: {}", identity.registry_environment_name);
    Ok(())
}

async fn serve(config: WorkerConfig) -> Result<()> {
    let cluster = HttpClusterApi::with(&config.cluster).context("building cluster client")?;
    let registry = GraphqlRegistry::with(&config.registry).context("building registry client")?;

    let worker = RemovalWorker::new(
        Arc::new(cluster),
        Arc::new(registry),
        Arc::new(TracingEventSink),
    )
    .with_delete_confirmation(DeleteConfirmation {
        attempts: config.cluster.confirm_attempts,
        interval: config.cluster.confirm_interval(),
    });

    let queue = Arc::new(InMemoryTaskQueue::new(config.queue.clone()));
    let decider = Arc::new(DefaultDecider::new(config.retry.policy()));
    let group = WorkerGroup::spawn(config.workers, queue.clone(), Arc::new(worker), decider);
    let shutdown = group.shutdown_handle();

    tracing::info!(
        queue = %config.queue,
        workers = config.workers,
        max_attempts = config.retry.max_attempts,
        cluster_url = %config.cluster.console_url,
        registry_url = %config.registry.endpoint,
        "teardown worker started"
    );

    tokio::select! {
        fed = feed_stdin(&queue) => {
            fed?;
            tracing::info!("stdin closed, draining queue");
            queue.close().await;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
            shutdown.request();
        }
    }

    // a second Ctrl-C while draining stops new leases; in-flight removals still finish
    let join = group.join();
    tokio::pin!(join);
    tokio::select! {
        () = &mut join => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested while draining");
            shutdown.request();
            join.await;
        }
    }

    let counts = queue.counts_by_state().await;
    let dead_letters = queue.dead_letters().await;
    tracing::info!(
        succeeded = counts.succeeded,
        dead_lettered = counts.dead_lettered,
        retry_scheduled = counts.retry_scheduled,
        queued = counts.queued,
        "teardown worker stopped"
    );
    for dl in dead_letters {
        tracing::warn!(
            task_id = %dl.envelope.task_id(),
            attempts = dl.attempts,
            error = %dl.error,
            "dead-lettered task needs manual intervention"
        );
    }
    Ok(())
}

/// Enqueue one task per non-empty stdin line until EOF.
///
/// Lines that are not JSON are still enqueued so they dead-letter with an
/// invalid-task event instead of vanishing.
async fn feed_stdin(queue: &InMemoryTaskQueue) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let payload = serde_json::from_str(line)
            .unwrap_or_else(|_| serde_json::Value::String(line.to_string()));
        let envelope = TaskEnvelope::new(TaskId::generate(), TaskType::remove(), payload);
        tracing::debug!(task_id = %envelope.task_id(), "task enqueued");
        queue.enqueue(envelope).await?;
    }
    Ok(())
}
