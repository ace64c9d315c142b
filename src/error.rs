//! Error types for the rack provider
//!
//! Bootstrap errors (credentials, namespace lookup, client and controller
//! construction) propagate to the caller and are fatal to startup. Errors
//! raised inside a running controller or a single heartbeat tick stay local
//! to that unit and are only logged.

use thiserror::Error;

use crate::template::TemplateError;

/// Main error type for provider operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Configuration error (environment, credentials)
    #[error("configuration error: {0}")]
    Config(String),

    /// A required cluster object does not exist
    #[error("{kind} not found: {name}")]
    NotFound {
        /// Object kind (e.g. "namespace")
        kind: String,
        /// Object name
        name: String,
    },

    /// Controller construction error
    #[error("controller error [{controller}]: {message}")]
    Controller {
        /// Name of the controller that failed
        controller: String,
        /// Description of what failed
        message: String,
    },

    /// Engine capability error
    #[error("engine error: {0}")]
    Engine(String),

    /// Template rendering error
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Declarative apply error
    #[error("apply error: {0}")]
    Apply(String),

    /// Metrics transport error
    #[error("metrics error: {0}")]
    Metrics(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a not-found error for an object of the given kind
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a controller error for the named controller
    pub fn controller(controller: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Controller {
            controller: controller.into(),
            message: msg.into(),
        }
    }

    /// Create an engine error with the given message
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine(msg.into())
    }

    /// Create an apply error with the given message
    pub fn apply(msg: impl Into<String>) -> Self {
        Self::Apply(msg.into())
    }

    /// Create a metrics error with the given message
    pub fn metrics(msg: impl Into<String>) -> Self {
        Self::Metrics(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Whether this error means the object is absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
