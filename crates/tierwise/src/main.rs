use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tierwise_cluster::{ClusterApi, KubeClient};
use tierwise_proxy::{AppState, BackendTarget, MetricsServer, ProxyConfig, ProxyServer};
use tierwise_scheduler::{GaugeRegistry, SchedulerConfig, TierScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "tierwise",
    about = "Size-aware workflow scheduler and proxy for the Argo Workflows server"
)]
struct Cli {
    /// Address the proxy listens on
    #[arg(long, env = "PROXY_ADDRESS", default_value = "0.0.0.0")]
    proxy_address: IpAddr,
    /// Port the proxy listens on
    #[arg(long, env = "PROXY_PORT", default_value_t = 8080)]
    proxy_port: u16,
    /// Workflow server URL requests are forwarded to
    #[arg(long, env = "TARGET_SERVER", default_value = "http://0.0.0.0")]
    target_server: String,
    /// Workflow server port
    #[arg(long, env = "TARGET_PORT", default_value_t = 2746)]
    target_port: u16,
    /// Port of the Prometheus scrape endpoint
    #[arg(long, env = "METRICS_PORT", default_value_t = 9999)]
    metrics_port: u16,
    /// Path whose JSON POSTs are scheduled
    #[arg(long, env = "SUBMISSION_PATH", default_value = "/api/v1/workflows/argo")]
    submission_path: String,
    /// Seconds between registry syncs and metric publications
    #[arg(long, env = "PUBLISH_INTERVAL_SECS", default_value_t = 5)]
    publish_interval_secs: u64,
    /// Requests handled at once before new ones get 503
    #[arg(long, env = "MAX_CONCURRENT_REQUESTS", default_value_t = 256)]
    max_concurrent_requests: usize,
    /// Timeout for requests to the workflow server
    #[arg(long, env = "BACKEND_TIMEOUT_SECS", default_value_t = 15)]
    backend_timeout_secs: u64,
    /// Seconds open connections get to finish on shutdown
    #[arg(long, env = "SHUTDOWN_GRACE_SECS", default_value_t = 10)]
    shutdown_grace_secs: u64,
    /// Kubeconfig used when not running inside the cluster. Without it the
    /// files listed in KUBECONFIG, then ~/.kube/config, are tried.
    #[arg(long)]
    kubeconfig: Option<PathBuf>,
    /// Regex matched against node label keys to find worker nodes
    #[arg(long, env = "WORKER_LABEL_PATTERN", default_value = tierwise_core::labels::DEFAULT_WORKER_LABEL_PATTERN)]
    worker_label_pattern: String,
    /// Regex matched against node names to find nodes for the registry
    #[arg(long, env = "REGISTRY_NAME_PATTERN", default_value = tierwise_core::labels::DEFAULT_REGISTRY_NAME_PATTERN)]
    registry_name_pattern: String,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    run(cli).await
}

/// Connect to the cluster. Without credentials the proxy still runs, it
/// just forwards submissions as they are.
async fn create_scheduler(cli: &Cli) -> miette::Result<Option<Arc<TierScheduler>>> {
    let cluster: Arc<dyn ClusterApi> = match KubeClient::discover(cli.kubeconfig.as_deref()).await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            warn!("No usable cluster connection, scheduling disabled: {}", e);
            return Ok(None);
        }
    };

    let config = SchedulerConfig {
        publish_interval: Duration::from_secs(cli.publish_interval_secs.max(1)),
        worker_label_pattern: cli.worker_label_pattern.clone(),
        registry_name_pattern: cli.registry_name_pattern.clone(),
    };
    let scheduler = TierScheduler::new(cluster, config)?;
    Ok(Some(Arc::new(scheduler)))
}

async fn run(cli: Cli) -> miette::Result<()> {
    info!("Starting tierwise");

    let scheduler = create_scheduler(&cli).await?;
    let backend = BackendTarget::new(&cli.target_server, cli.target_port)?;
    info!("Forwarding to {}", backend.base_url);

    let state = AppState::new(
        scheduler.clone(),
        backend,
        cli.submission_path.clone(),
        Duration::from_secs(cli.backend_timeout_secs),
    )?;

    let proxy_config = ProxyConfig {
        listen_addr: SocketAddr::new(cli.proxy_address, cli.proxy_port),
        max_concurrent_requests: cli.max_concurrent_requests.max(1),
        shutdown_grace: Duration::from_secs(cli.shutdown_grace_secs),
    };
    let proxy = ProxyServer::bind(proxy_config.clone(), state)
        .await
        .map_err(|e| {
            miette::miette!("Failed to bind proxy on {}: {}", proxy_config.listen_addr, e)
        })?;

    let gauges = scheduler
        .as_ref()
        .map(|s| s.gauges())
        .unwrap_or_else(|| Arc::new(GaugeRegistry::new()));
    let metrics_addr = SocketAddr::from(([0, 0, 0, 0], cli.metrics_port));
    let metrics = MetricsServer::bind(metrics_addr, gauges)
        .await
        .map_err(|e| miette::miette!("Failed to bind metrics server on {}: {}", metrics_addr, e))?;

    let token = CancellationToken::new();

    // 1. Spawn proxy
    let proxy_token = token.clone();
    let proxy_handle = tokio::spawn(async move {
        if let Err(e) = proxy.run(proxy_token).await {
            error!("Proxy error: {}", e);
        }
    });

    // 2. Spawn metrics server
    let metrics_token = token.clone();
    let metrics_handle = tokio::spawn(async move {
        if let Err(e) = metrics.run(metrics_token).await {
            error!("Metrics server error: {}", e);
        }
    });

    // 3. Spawn the periodic registry sync and metric publication
    let scheduler_handle = scheduler.map(|scheduler| {
        let scheduler_token = token.clone();
        tokio::spawn(async move {
            if let Err(e) = scheduler.run(scheduler_token).await {
                error!("Scheduler error: {}", e);
            }
        })
    });

    info!(
        "All components started. Proxy on {}, metrics on {}",
        proxy_config.listen_addr, metrics_addr
    );

    shutdown_signal().await?;

    info!("Shutting down gracefully...");
    token.cancel();

    // The proxy gets its grace period plus a little for the rest
    let shutdown_timeout = proxy_config.shutdown_grace + Duration::from_secs(5);
    let _ = tokio::time::timeout(shutdown_timeout, async {
        let _ = tokio::join!(proxy_handle, metrics_handle);
        if let Some(handle) = scheduler_handle {
            let _ = handle.await;
        }
    })
    .await;

    info!("Shutdown complete");

    Ok(())
}

/// Resolves on ctrl-c, or on SIGTERM from the kubelet when the pod stops
async fn shutdown_signal() -> miette::Result<()> {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| miette::miette!("Failed to listen for ctrl-c: {}", e))
    };

    #[cfg(unix)]
    let terminate = {
        let mut signal =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .map_err(|e| miette::miette!("Failed to listen for SIGTERM: {}", e))?;
        async move {
            signal.recv().await;
            info!("Received SIGTERM");
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = ctrl_c => result,
        _ = terminate => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "tierwise",
            "--proxy-port",
            "9090",
            "--target-server",
            "http://argo-server.argo",
            "--max-concurrent-requests",
            "4",
        ])
        .unwrap();
        assert_eq!(cli.proxy_port, 9090);
        assert_eq!(cli.target_server, "http://argo-server.argo");
        assert_eq!(cli.max_concurrent_requests, 4);
        assert!(cli.kubeconfig.is_none());
    }

    #[test]
    fn test_kubeconfig_flag() {
        let cli = Cli::try_parse_from(["tierwise", "--kubeconfig", "/etc/tierwise/kubeconfig"]).unwrap();
        assert_eq!(cli.kubeconfig, Some(PathBuf::from("/etc/tierwise/kubeconfig")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sigterm_triggers_shutdown() {
        let waiter = tokio::spawn(shutdown_signal());
        // Let the handler install before raising the signal
        tokio::time::sleep(Duration::from_millis(50)).await;

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("shutdown signal resolved")
            .unwrap()
            .unwrap();
    }
}
