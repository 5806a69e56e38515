//! Crate-wide error type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unable to resolve the upstream DAPNET address: {0}")]
    UpstreamUnresolved(#[source] std::io::Error),

    #[error("unable to resolve the downstream repeater address: {0}")]
    DownstreamUnresolved(#[source] std::io::Error),

    #[error("AuthKey not set or invalid")]
    AuthKeyInvalid,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
