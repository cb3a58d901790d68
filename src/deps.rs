//! Injected OS capabilities
//!
//! The supervisor's process, network, and environment interactions all go
//! through [`SystemDeps`] so tests can run the full orchestration against
//! stubs without touching the real OS.

use std::io;
use std::path::Path;
use std::process::{Child, Command};

use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

/// The OS-level capabilities the tunnel orchestration depends on.
///
/// Implementations are shared read-only; all methods take `&self` so one
/// dependency set can serve concurrent tunnel attempts.
#[allow(async_fn_in_trait)]
pub trait SystemDeps: Send + Sync {
    /// Probe-connect to a unix socket. The connection is closed before
    /// returning; success only means the socket accepted a connection.
    async fn dial_unix(&self, path: &Path) -> io::Result<()>;

    /// Start a prepared command as a background child process.
    fn start(&self, cmd: &mut Command) -> io::Result<Child>;

    /// Create a fresh private directory for one tunnel's socket.
    fn temp_dir(&self) -> io::Result<TempDir>;

    /// Read an environment variable, `None` if unset or not unicode.
    fn getenv(&self, key: &str) -> Option<String>;

    /// Overwrite an environment variable.
    fn setenv(&self, key: &str, value: &str);
}

// Shared references qualify, so one dependency set can be borrowed by
// several handlers at once.
impl<'a, D: SystemDeps> SystemDeps for &'a D {
    async fn dial_unix(&self, path: &Path) -> io::Result<()> {
        (**self).dial_unix(path).await
    }

    fn start(&self, cmd: &mut Command) -> io::Result<Child> {
        (**self).start(cmd)
    }

    fn temp_dir(&self) -> io::Result<TempDir> {
        (**self).temp_dir()
    }

    fn getenv(&self, key: &str) -> Option<String> {
        (**self).getenv(key)
    }

    fn setenv(&self, key: &str, value: &str) {
        (**self).setenv(key, value)
    }
}

/// Production dependency set backed by the real OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsDeps;

impl SystemDeps for OsDeps {
    async fn dial_unix(&self, path: &Path) -> io::Result<()> {
        let mut stream = UnixStream::connect(path).await?;
        // Gracefully close the probe connection
        let _ = stream.shutdown().await;
        Ok(())
    }

    fn start(&self, cmd: &mut Command) -> io::Result<Child> {
        cmd.spawn()
    }

    fn temp_dir(&self) -> io::Result<TempDir> {
        tempfile::Builder::new().prefix("sshdock-").tempdir()
    }

    fn getenv(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn setenv(&self, key: &str, value: &str) {
        std::env::set_var(key, value);
    }
}
