//! Controller Error Hierarchy
//!
//! Defines the error types of the reconciliation engine, categorized by the
//! layer that produced them. The worker loop uses the classification helpers
//! on [`Error`] to decide between dropping a key, retrying it with backoff, or
//! discarding it as a programmer error.

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (object store, watch streams, serialization)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Controller configuration validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Failures raised while driving a reconciliation pass
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    // Object store layer
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // Watch/List layer
    #[error("Watch error: {0}")]
    Watch(#[from] WatchError),

    // Serialization
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    SignalSendFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Optimistic version mismatch on a conditional write
    #[error("Conflict on {key}: expected resource version {expected}")]
    Conflict { key: String, expected: String },

    /// Object vanished between enqueue and processing
    #[error("Object {key} not found")]
    NotFound { key: String },

    /// Store temporarily unreachable
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store operation failed: {0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Requested resource version is older than the retained history
    #[error("Resource version {resource_version} is too old")]
    Expired { resource_version: String },

    #[error("Watch stream closed")]
    StreamClosed,

    /// Consumer fell behind the event stream and missed events
    #[error("Watch consumer lagged behind by {0} events")]
    Lagged(u64),
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Queue key cannot be parsed; retrying cannot help
    #[error("Malformed queue key: {0}")]
    MalformedKey(String),

    /// Secondary object reference cannot be resolved to a resource
    #[error("Invalid object reference: {0}")]
    InvalidReference(String),

    /// Index lookup against an index that was never registered
    #[error("Index {0} does not exist")]
    MissingIndex(String),

    /// Business policy failure reported by a reconciler plugin
    #[error("Reconcile policy failed: {0}")]
    Policy(String),
}

impl Error {
    /// The object is gone; the key should be dropped without retry.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::System(SystemError::Store(StoreError::NotFound { .. }))
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Error::System(SystemError::Store(StoreError::Conflict { .. }))
        )
    }

    /// Watch history no longer covers the requested version; a fresh List is required.
    pub fn is_expired(&self) -> bool {
        matches!(
            self,
            Error::System(SystemError::Watch(WatchError::Expired { .. }))
                | Error::System(SystemError::Watch(WatchError::Lagged(_)))
        )
    }

    /// Whether routing the key through rate-limited requeue can possibly help.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::Reconcile(ReconcileError::MalformedKey(_))
                | Error::Config(_)
                | Error::Fatal(_)
        ) && !self.is_not_found()
    }
}

// ============== Conversion Implementations ============== //
impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Error::System(SystemError::Store(e))
    }
}

impl From<WatchError> for Error {
    fn from(e: WatchError) -> Self {
        Error::System(SystemError::Watch(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::System(SystemError::Serialization(e))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::System(SystemError::Io(e))
    }
}

impl From<JoinError> for Error {
    fn from(e: JoinError) -> Self {
        Error::System(SystemError::TaskFailed(e))
    }
}
