//! Error types for tagsync-client

use tagsync_common::protocol::ProtocolError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// No open connection; call `reconnect`
    #[error("Not connected to server")]
    NotConnected,

    #[error("Cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connecting to {addr} timed out")]
    ConnectTimeout { addr: String },

    /// Sending a frame failed; the connection is marked down
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Bootstrap data still missing after every retry
    #[error("Bootstrap incomplete, still missing: {}", .missing.join(", "))]
    BootstrapIncomplete { missing: Vec<&'static str> },

    /// Operation needs bootstrap data that has not arrived
    #[error("{0} not received yet")]
    NotReady(&'static str),

    /// The expected response did not arrive in time
    #[error("Timed out waiting for the server")]
    ResponseTimeout,

    #[error("{what} {index} out of range ({len})")]
    OutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] tagsync_common::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
