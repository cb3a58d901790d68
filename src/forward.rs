//! SSH transport launch
//!
//! Builds and starts the external `ssh` process that forwards the remote
//! Docker control socket to a local unix socket path.

use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};

use tracing::debug;

use crate::deps::SystemDeps;
use crate::error::TunnelError;

/// Remote path of the Docker control socket forwarded by every tunnel.
pub const REMOTE_DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Endpoints of one ssh local-forward.
#[derive(Debug, Clone)]
pub struct ForwardSpec {
    remote_host: String,
    local_socket: PathBuf,
}

impl ForwardSpec {
    /// Validate the forward endpoints. The remote host must be non-empty
    /// and the local socket path absolute.
    pub fn new(remote_host: &str, local_socket: &Path) -> Result<Self, TunnelError> {
        if remote_host.is_empty() {
            return Err(TunnelError::InvalidTarget(
                "remote host is empty".to_string(),
            ));
        }
        if !local_socket.is_absolute() {
            return Err(TunnelError::InvalidTarget(format!(
                "local socket path is not absolute: {}",
                local_socket.display()
            )));
        }

        Ok(Self {
            remote_host: remote_host.to_string(),
            local_socket: local_socket.to_path_buf(),
        })
    }

    /// Build the ssh invocation: forward the remote Docker socket to the
    /// local path, run no remote command, and hold the connection open.
    ///
    /// The child is placed in its own process group so teardown can signal
    /// it and any children it spawns as one unit.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-L")
            .arg(format!(
                "{}:{}",
                self.local_socket.display(),
                REMOTE_DOCKER_SOCKET
            ))
            .arg(&self.remote_host)
            .arg("-N");
        cmd.process_group(0);
        cmd
    }

    /// Start the transport through the injected process capability.
    ///
    /// Does not wait for the tunnel to become ready; a start failure aborts
    /// the whole tunnel attempt.
    pub fn spawn<D: SystemDeps>(&self, deps: &D) -> Result<Child, TunnelError> {
        let mut cmd = self.command();
        let child = deps.start(&mut cmd).map_err(TunnelError::Launch)?;
        debug!(pid = child.id(), host = %self.remote_host, "ssh transport started");
        Ok(child)
    }
}
