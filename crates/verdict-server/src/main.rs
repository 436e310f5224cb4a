//! Verdict Server
//!
//! Serves one text classification model package over HTTP. The listener is
//! bound immediately; the model loads in the background and requests are
//! rejected as not ready until it is.

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use verdict_inference::ServingGate;
use verdict_server::{create_router, AppState, ConfigOverrides, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "verdict-server")]
#[command(about = "Verdict text classification server", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "VERDICT_CONFIG", default_value = "verdict.yaml")]
    config: String,

    /// Model package directory or manifest
    #[arg(short, long, env = "VERDICT_PACKAGE")]
    package: Option<PathBuf>,

    /// Listen address
    #[arg(short = 'l', long)]
    listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Exit with an error if the model fails to load
    #[arg(long)]
    exit_on_load_failure: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            package: self.package.clone(),
            listen: self.listen.clone(),
            port: self.port,
            exit_on_load_failure: self.exit_on_load_failure,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.json_logs);

    info!("Starting Verdict server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load(&cli.config, &cli.overrides())?;
    info!("Configuration loaded successfully");
    info!("Package: {:?}", config.serving.package);
    info!("Device: {:?}", config.serving.device);
    info!("Max batch size: {}", config.serving.batch.max_batch_size);

    let metrics_handle = init_metrics()?;

    let gate = Arc::new(ServingGate::new());
    let exit_on_load_failure = config.server.exit_on_load_failure;
    let addr: SocketAddr = config.bind_address().parse()?;
    let serving = config.serving.clone();

    let state = AppState::new(Arc::clone(&gate), config).with_metrics(metrics_handle);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Verdict listening on http://{}", addr);

    // Load off the async runtime; the server answers health probes meanwhile
    let load_task = tokio::task::spawn_blocking({
        let gate = Arc::clone(&gate);
        move || gate.load(&serving)
    });

    let server = async {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    };

    tokio::select! {
        result = server => result?,
        err = watch_load(load_task, gate, exit_on_load_failure) => return Err(err),
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for the background load. Resolves only when the failure is fatal.
async fn watch_load(
    task: JoinHandle<verdict_core::Result<()>>,
    gate: Arc<ServingGate>,
    exit_on_failure: bool,
) -> anyhow::Error {
    let outcome = match task.await {
        Ok(result) => result.map_err(anyhow::Error::from),
        Err(e) => {
            // Loading panicked before reaching a terminal state
            let _ = gate.mark_failed(format!("load task aborted: {}", e));
            Err(anyhow::anyhow!("Model load task failed: {}", e))
        }
    };

    match outcome {
        Ok(()) => info!("Model ready, accepting predictions"),
        Err(e) if exit_on_failure => {
            error!("Model failed to load, exiting: {:#}", e);
            return e.context("model failed to load");
        }
        Err(e) => error!("Model failed to load, serving unhealthy: {:#}", e),
    }

    std::future::pending().await
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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

    warn!("Shutdown signal received, stopping server...");
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("verdict=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("verdict=info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "verdict_requests_total",
        "Total number of requests by endpoint"
    );
    metrics::describe_counter!("verdict_errors_total", "Total number of errors by type");
    metrics::describe_histogram!(
        "verdict_inference_latency_us",
        metrics::Unit::Microseconds,
        "Inference latency in microseconds by mode"
    );
    metrics::describe_histogram!(
        "verdict_batch_size",
        metrics::Unit::Count,
        "Number of texts per batch request"
    );

    info!("Metrics exporter initialized");
    Ok(handle)
}
