//! Error taxonomy for the derivation and allocation engine.
//!
//! Every stage returns [`FabricError`] eagerly; nothing is retried because the
//! inputs of a run are static.

use thiserror::Error;

/// Result alias used by every engine module
pub type Result<T> = std::result::Result<T, FabricError>;

#[derive(Debug, Error)]
pub enum FabricError {
    #[error("Invalid topology: {0}")]
    InvalidTopology(String),

    #[error(
        "Duplicate link: '{link}'\nRefer to the errors below and to your topology file.\n{rendered}"
    )]
    DuplicateLink { link: String, rendered: String },

    #[error(
        "Overlapping link interfaces: '{interface} in {host}'\nRefer to the errors below and to your topology file.\n{rendered}"
    )]
    OverlappingInterface {
        host: String,
        interface: String,
        rendered: String,
    },

    #[error("Allocation pool '{pool}' exhausted: {detail}")]
    PoolExhausted { pool: String, detail: String },

    #[error("Invalid range value: '{0}'")]
    InvalidRange(String),

    #[error("Failed to access allocation pool '{pool}': {source}")]
    StoreIo {
        pool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed allocation pool '{pool}': {source}")]
    StoreFormat {
        pool: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown configuration variable: '{0}'")]
    UnknownView(String),

    #[error("Failed to render '{view}': {source}")]
    Render {
        view: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FabricError {
    pub fn invalid_topology(msg: impl Into<String>) -> Self {
        Self::InvalidTopology(msg.into())
    }

    pub fn pool_exhausted(pool: &str, detail: impl Into<String>) -> Self {
        Self::PoolExhausted {
            pool: pool.to_string(),
            detail: detail.into(),
        }
    }
}
