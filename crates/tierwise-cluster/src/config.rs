use crate::error::{ClusterError, Result};
use kube::config::{Config, KubeConfigOptions, Kubeconfig};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Per-request timeout for calls against the API server
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Find cluster credentials.
///
/// The pod's service account wins. Outside the cluster an explicit
/// kubeconfig path is used if given, otherwise the kubeconfig named by
/// `KUBECONFIG` (which may list several files) or `~/.kube/config`.
pub async fn discover_config(kubeconfig: Option<&Path>) -> Result<Config> {
    info!("Trying to load in-cluster config");
    let in_cluster_err = match Config::incluster() {
        Ok(config) => return Ok(with_timeouts(config)),
        Err(e) => e,
    };
    debug!("In-cluster config unavailable: {}", in_cluster_err);

    let config = match kubeconfig {
        Some(path) => {
            info!(
                "In-cluster config not found, loading kubeconfig from {}",
                path.display()
            );
            from_kubeconfig_file(path).await?
        }
        None => {
            info!("In-cluster config not found, loading default kubeconfig");
            Config::from_kubeconfig(&KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    ClusterError::credentials_not_found(format!(
                        "in-cluster: ({}), kubeconfig: ({})",
                        in_cluster_err, e
                    ))
                })?
        }
    };

    Ok(with_timeouts(config))
}

/// Load the current context of one kubeconfig file.
///
/// Relative certificate and key paths resolve against the file's directory.
pub async fn from_kubeconfig_file(path: &Path) -> Result<Config> {
    let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
        ClusterError::credentials_not_found(format!(
            "cannot read kubeconfig {}: {}",
            path.display(),
            e
        ))
    })?;
    from_kubeconfig(kubeconfig).await
}

pub async fn from_kubeconfig(kubeconfig: Kubeconfig) -> Result<Config> {
    let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| {
            ClusterError::invalid_config(
                format!("kubeconfig cannot be used: {}", e),
                "Select a context with `kubectl config use-context` and check its cluster and user entries",
            )
        })?;
    Ok(with_timeouts(config))
}

fn with_timeouts(mut config: Config) -> Config {
    config.read_timeout = Some(REQUEST_TIMEOUT);
    config.write_timeout = Some(REQUEST_TIMEOUT);
    config
}
