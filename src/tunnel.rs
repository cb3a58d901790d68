//! Tunnel supervision
//!
//! Turns "ssh process started" into "tunnel usable": allocates the private
//! socket directory, launches the transport, polls the local socket until it
//! accepts a connection, and hands back a closable handle that owns the
//! transport process group.

use std::path::Path;
use std::process::Child;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tempfile::TempDir;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::deps::SystemDeps;
use crate::error::TunnelError;
use crate::forward::ForwardSpec;

/// Name of the tunneled socket inside its private directory.
pub const TUNNEL_SOCKET_NAME: &str = "dockerhost.sock";

/// Fixed delay between readiness probes.
const PROBE_INTERVAL: Duration = Duration::from_secs(1);

/// Overall deadline for the socket to become dialable, measured from the
/// start of polling.
const SOCKET_TUNNEL_TIMEOUT: Duration = Duration::from_secs(8);

/// An established tunnel.
///
/// Holds the rewritten `unix://` URL, the ssh transport process, and the
/// private socket directory. The handle exclusively owns the process: no
/// other component may signal or wait on it.
#[derive(Debug)]
pub struct TunnelHandle {
    docker_host: String,
    child: Child,
    socket_dir: Option<TempDir>,
}

impl TunnelHandle {
    /// The `unix://` URL of the local tunnel socket.
    pub fn docker_host(&self) -> &str {
        &self.docker_host
    }

    /// Tear the tunnel down.
    ///
    /// Sends SIGKILL to the transport's process group, so the ssh process
    /// and anything it spawned die as a unit, then reaps the process and
    /// removes the socket directory. Signalling an already-dead group
    /// surfaces [`TunnelError::Teardown`]; `close` consumes the handle, so
    /// a second close is unrepresentable.
    pub fn close(mut self) -> Result<(), TunnelError> {
        let socket_dir = self.socket_dir.take();
        debug!(pid = self.child.id(), "killing tunnel process group");

        let signalled = signal::killpg(Pid::from_raw(self.child.id() as i32), Signal::SIGKILL)
            .map_err(TunnelError::Teardown);
        let _ = self.child.wait();
        if let Some(dir) = socket_dir {
            let _ = dir.close();
        }
        signalled
    }
}

impl Drop for TunnelHandle {
    fn drop(&mut self) {
        // best-effort teardown when close() was never called
        if self.socket_dir.is_none() {
            return;
        }
        let _ = signal::killpg(Pid::from_raw(self.child.id() as i32), Signal::SIGKILL);
        let _ = self.child.wait();
    }
}

/// Establish a tunnel to the Docker control socket on `remote_host`.
///
/// Allocates a fresh private directory, starts the ssh transport, then
/// probes the local socket once per second until it accepts a connection or
/// the deadline elapses. On a poll timeout the transport process is left
/// running for the caller to inspect; the socket directory is removed on
/// every failure path.
pub async fn establish<D: SystemDeps>(
    deps: &D,
    remote_host: &str,
    cancel: &CancellationToken,
) -> Result<TunnelHandle, TunnelError> {
    let socket_dir = deps.temp_dir().map_err(TunnelError::TempDir)?;
    let local_socket = socket_dir.path().join(TUNNEL_SOCKET_NAME);

    let spec = ForwardSpec::new(remote_host, &local_socket)?;
    let child = spec.spawn(deps)?;

    info!(host = %remote_host, socket = %local_socket.display(), "waiting for tunnel socket");
    wait_for_socket(deps, &local_socket, cancel).await?;

    let docker_host = format!("unix://{}", local_socket.display());
    debug!(docker_host = %docker_host, "tunnel socket ready");
    Ok(TunnelHandle {
        docker_host,
        child,
        socket_dir: Some(socket_dir),
    })
}

/// Probe the socket on a fixed interval until it accepts a connection.
///
/// Individual connect failures are swallowed and retried; only the deadline
/// or upstream cancellation end the loop with an error. The first probe
/// fires one interval after polling starts.
async fn wait_for_socket<D: SystemDeps>(
    deps: &D,
    socket: &Path,
    cancel: &CancellationToken,
) -> Result<(), TunnelError> {
    let deadline = time::sleep(SOCKET_TUNNEL_TIMEOUT);
    tokio::pin!(deadline);

    let mut ticker = time::interval(PROBE_INTERVAL);
    // the interval's first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TunnelError::Cancelled),
            _ = &mut deadline => {
                return Err(TunnelError::SocketUnavailable {
                    timeout: SOCKET_TUNNEL_TIMEOUT,
                })
            }
            _ = ticker.tick() => {}
        }

        match deps.dial_unix(socket).await {
            Ok(()) => return Ok(()),
            Err(err) => debug!(error = %err, "tunnel socket not ready yet"),
        }
    }
}
