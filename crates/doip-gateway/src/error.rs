//! Gateway runtime errors

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// A listening socket could not be bound.
    #[error("failed to bind {protocol} socket on {addr}")]
    Bind {
        protocol: &'static str,
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}
