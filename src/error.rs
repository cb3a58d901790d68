//! Error taxonomy for tunnel establishment and teardown

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors produced while establishing or tearing down a tunnel.
///
/// A missing, unparseable, or non-`ssh` `DOCKER_HOST` is not an error;
/// the handler passes through nominally in those cases.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// The forward endpoints were unusable (empty host, relative socket path).
    #[error("invalid tunnel target: {0}")]
    InvalidTarget(String),

    /// The private socket directory could not be created.
    #[error("create tunnel socket directory: {0}")]
    TempDir(#[source] io::Error),

    /// The ssh transport process could not be started. Not retried.
    #[error("start ssh transport: {0}")]
    Launch(#[source] io::Error),

    /// The tunneled socket never became dialable before the deadline.
    /// The transport process may still be running.
    #[error("ssh tunneled socket never became available within {timeout:?}")]
    SocketUnavailable { timeout: Duration },

    /// Tunnel establishment was cancelled while waiting for the socket.
    #[error("tunnel establishment cancelled")]
    Cancelled,

    /// Signalling the transport process group failed, e.g. because it
    /// already exited.
    #[error("kill tunnel process group: {0}")]
    Teardown(#[source] nix::errno::Errno),
}
