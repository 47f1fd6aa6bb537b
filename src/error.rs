//! Error types for the cascade simulator.

use thiserror::Error;

/// Result type alias for configuration loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading or validating the simulation configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type alias for topology loading.
pub type TopologyResult<T> = std::result::Result<T, TopologyError>;

/// Errors raised while loading the service topology.
#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("could not read topology file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse topology file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Result type alias for graph construction.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Errors raised while constructing a [`crate::graph::ServiceGraph`].
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("duplicate service name: {0}")]
    DuplicateService(String),
}

/// Errors raised while answering a query. These never mutate engine state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Service '{0}' not found.")]
    UnknownService(String),

    #[error("Unknown query. Try: 'why is <service> failing?', 'what happened in the last N ticks?', 'top-impacted'")]
    Unparseable,
}
