use miette::Diagnostic;
use thiserror::Error;

/// Error type for calls against the cluster API
#[derive(Error, Debug, Diagnostic)]
pub enum ClusterError {
    /// The HTTP request never produced a response
    #[error("Cluster API request failed during {operation}: {message}")]
    #[diagnostic(
        code(tierwise::cluster::request_failed),
        help("Check that the API server is reachable from this pod and that the request timeout is long enough")
    )]
    RequestFailed {
        #[allow(unused)]
        operation: String,
        #[allow(unused)]
        message: String,
    },

    /// The API server answered with a non-success status
    #[error("{operation} failed with status {status}: {body}")]
    #[diagnostic(
        code(tierwise::cluster::api_status),
        help("A 403 usually means the service account lacks RBAC permissions for this resource")
    )]
    ApiStatus {
        #[allow(unused)]
        operation: String,
        #[allow(unused)]
        status: u16,
        #[allow(unused)]
        body: String,
    },

    /// A response body could not be decoded
    #[error("Failed to decode {what}: {message}")]
    #[diagnostic(
        code(tierwise::cluster::decode_failed),
        help("The API server returned an unexpected document shape")
    )]
    DecodeFailed {
        #[allow(unused)]
        what: String,
        #[allow(unused)]
        message: String,
    },

    /// No in-cluster service account and no usable kubeconfig
    #[error("Cluster credentials not found: {message}")]
    #[diagnostic(
        code(tierwise::cluster::credentials_not_found),
        help("Run inside the cluster with a service account, or point KUBECONFIG at a kubeconfig file")
    )]
    CredentialsNotFound {
        #[allow(unused)]
        message: String,
    },

    /// Invalid configuration
    #[error("Invalid cluster configuration: {message}")]
    #[diagnostic(code(tierwise::cluster::invalid_config), help("{suggestion}"))]
    InvalidConfig {
        #[allow(unused)]
        message: String,
        #[allow(unused)]
        suggestion: String,
    },
}

/// Result type alias for cluster operations
pub type Result<T> = std::result::Result<T, ClusterError>;

impl ClusterError {
    pub fn request_failed(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn api_status(operation: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::ApiStatus {
            operation: operation.into(),
            status,
            body: body.into(),
        }
    }

    pub fn decode_failed(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DecodeFailed {
            what: what.into(),
            message: message.into(),
        }
    }

    pub fn credentials_not_found(message: impl Into<String>) -> Self {
        Self::CredentialsNotFound {
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }
}
