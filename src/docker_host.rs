//! DOCKER_HOST redirection
//!
//! Entry point of the crate: reads `DOCKER_HOST`, and when it names an ssh
//! host, establishes a tunnel and rewrites the variable to point at the
//! local socket. Any other value passes through untouched.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::deps::{OsDeps, SystemDeps};
use crate::error::TunnelError;
use crate::tunnel::{self, TunnelHandle};

/// Environment variable naming the Docker daemon endpoint.
pub const DOCKER_HOST_ENV: &str = "DOCKER_HOST";

/// Redirects `DOCKER_HOST` through an ssh tunnel when it names an ssh host.
pub struct DockerHostHandler<D = OsDeps> {
    deps: D,
}

impl DockerHostHandler<OsDeps> {
    /// Handler wired to the real OS.
    pub fn new() -> Self {
        Self { deps: OsDeps }
    }
}

impl Default for DockerHostHandler<OsDeps> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: SystemDeps> DockerHostHandler<D> {
    /// Handler with injected capabilities.
    pub fn with_deps(deps: D) -> Self {
        Self { deps }
    }

    /// Redirect `DOCKER_HOST` if it points at an ssh host.
    ///
    /// An absent, unparseable, or non-`ssh` value is not an error: the
    /// variable stays untouched and the returned guard is a no-op. For an
    /// `ssh://host[:port]` value the tunnel is established first and the
    /// variable rewritten to the local `unix://` socket only once that
    /// socket is dialable, so a failed attempt never leaves `DOCKER_HOST`
    /// pointing at a dead tunnel.
    pub async fn handle_docker_host(
        &self,
        cancel: &CancellationToken,
    ) -> Result<DockerHostGuard, TunnelError> {
        let Some(raw) = self.deps.getenv(DOCKER_HOST_ENV) else {
            debug!("DOCKER_HOST is unset, nothing to tunnel");
            return Ok(DockerHostGuard::Passthrough);
        };

        let Ok(target) = Url::parse(&raw) else {
            // an invalid docker host is specified, continue nominally
            debug!(docker_host = %raw, "DOCKER_HOST is not a URL, leaving it untouched");
            return Ok(DockerHostGuard::Passthrough);
        };

        if target.scheme() != "ssh" {
            debug!(scheme = target.scheme(), "DOCKER_HOST scheme needs no tunnel");
            return Ok(DockerHostGuard::Passthrough);
        }

        let tunnel = tunnel::establish(&self.deps, &ssh_host(&target), cancel).await?;
        self.deps.setenv(DOCKER_HOST_ENV, tunnel.docker_host());
        info!(docker_host = %tunnel.docker_host(), "DOCKER_HOST redirected through ssh tunnel");
        Ok(DockerHostGuard::Tunnel(tunnel))
    }
}

/// Host component as passed to ssh, port included when present.
fn ssh_host(target: &Url) -> String {
    let host = target.host_str().unwrap_or_default();
    match target.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Closable result of [`DockerHostHandler::handle_docker_host`].
///
/// Distinguishes "no tunnel requested" from an established tunnel; a failed
/// tunnel attempt produces an error instead of a guard.
#[derive(Debug)]
pub enum DockerHostGuard {
    /// No tunnel was required; closing is a no-op.
    Passthrough,
    /// A live tunnel owning the ssh transport process group.
    Tunnel(TunnelHandle),
}

impl DockerHostGuard {
    /// The rewritten docker host URL, `None` for a passthrough.
    pub fn docker_host(&self) -> Option<&str> {
        match self {
            Self::Passthrough => None,
            Self::Tunnel(handle) => Some(handle.docker_host()),
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, Self::Passthrough)
    }

    /// Tear down the tunnel, if one was established.
    pub fn close(self) -> Result<(), TunnelError> {
        match self {
            Self::Passthrough => Ok(()),
            Self::Tunnel(handle) => handle.close(),
        }
    }
}
