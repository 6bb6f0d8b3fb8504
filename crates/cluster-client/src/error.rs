//! Cluster client errors

use thiserror::Error;

/// Errors that can occur when talking to the Kubernetes API
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The object (or API group) does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A precondition or resource version did not match the stored object
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The API server rejected the request for another reason
    #[error("Kubernetes API error: {0}")]
    Api(String),

    /// The request could not be built from the given object
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transport or client-side failure
    #[error("Kubernetes client error: {0}")]
    Kube(#[source] kube::Error),
}

impl ClusterError {
    /// True if the API server reported the target as absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound(_))
    }

    /// True if an optimistic-concurrency check failed
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClusterError::Conflict(_))
    }
}

impl From<kube::Error> for ClusterError {
    fn from(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(ref response) if response.code == 404 => {
                ClusterError::NotFound(response.message.clone())
            }
            kube::Error::Api(ref response) if response.code == 409 => {
                ClusterError::Conflict(response.message.clone())
            }
            kube::Error::Api(ref response) => {
                ClusterError::Api(format!("{} ({})", response.message, response.code))
            }
            other => ClusterError::Kube(other),
        }
    }
}
