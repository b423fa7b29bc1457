//! Error types shared across the operator.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("manifest error: {0}")]
    ManifestError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("resource not permitted: {0}")]
    PolicyError(String),

    #[error("transient error: {0}")]
    TransientError(String),

    #[error("kind not found: {0}")]
    KindNotFound(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("finalizer error: {0}")]
    FinalizerError(#[source] Box<kube::runtime::finalizer::Error<Error>>),
}

impl From<kube::runtime::finalizer::Error<Error>> for Error {
    fn from(e: kube::runtime::finalizer::Error<Error>) -> Self {
        Error::FinalizerError(Box::new(e))
    }
}

impl Error {
    /// Transient errors leave the operation in the `Error` phase so the
    /// reconciler retries, instead of recording a permanent failure.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::TransientError(_) => true,
            Error::KubeError(kube::Error::Api(e)) => e.code == 429 || e.code >= 500,
            Error::KubeError(kube::Error::Service(_)) => true,
            Error::KubeError(kube::Error::HyperError(_)) => true,
            _ => false,
        }
    }
}
