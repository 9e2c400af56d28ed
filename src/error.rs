//! Error types for server setup.
//!
//! Request handling uses `anyhow` end to end; these typed errors cover the
//! places where a caller needs to tell failures apart (startup, config,
//! route registration).

use std::io;

use thiserror::Error;

use crate::http::router::PatternError;

#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or listening on the configured address failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Certificate or key material could not be loaded.
    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid route pattern: {0}")]
    Route(#[from] PatternError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<serde_yaml::Error> for ServerError {
    fn from(e: serde_yaml::Error) -> Self {
        ServerError::Config(e.to_string())
    }
}
