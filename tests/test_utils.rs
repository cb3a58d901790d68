//! Test utilities shared across the integration test suite
//!
//! Provides a scriptable [`SystemDeps`] implementation so the full
//! DOCKER_HOST handling flow can run without ssh and without touching the
//! real process environment.

use std::collections::HashMap;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Mutex;

use tempfile::TempDir;

use sshdock::SystemDeps;

/// How the stubbed dial behaves across successive probes.
#[allow(dead_code)]
pub enum DialScript {
    /// Every probe succeeds.
    AlwaysReady,
    /// The first `n` probes fail, later ones succeed.
    ReadyAfter(usize),
    /// No probe ever succeeds.
    NeverReady,
}

/// Scriptable dependency set that records every interaction.
///
/// `start` spawns a long-lived `sleep` in its own process group as a
/// stand-in for the ssh transport, so teardown behavior can be observed
/// against a real process.
pub struct StubDeps {
    dial: DialScript,
    fail_start: bool,
    env: Mutex<HashMap<String, String>>,
    dials: AtomicUsize,
    starts: AtomicUsize,
    spawned_argv: Mutex<Vec<String>>,
    transport_pid: AtomicI32,
    socket_dirs: Mutex<Vec<PathBuf>>,
}

#[allow(dead_code)]
impl StubDeps {
    pub fn new(dial: DialScript) -> Self {
        Self {
            dial,
            fail_start: false,
            env: Mutex::new(HashMap::new()),
            dials: AtomicUsize::new(0),
            starts: AtomicUsize::new(0),
            spawned_argv: Mutex::new(Vec::new()),
            transport_pid: AtomicI32::new(0),
            socket_dirs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_docker_host(self, value: &str) -> Self {
        self.env
            .lock()
            .unwrap()
            .insert("DOCKER_HOST".to_string(), value.to_string());
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn env_var(&self, key: &str) -> Option<String> {
        self.env.lock().unwrap().get(key).cloned()
    }

    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn spawned_argv(&self) -> Vec<String> {
        self.spawned_argv.lock().unwrap().clone()
    }

    /// Pid of the stand-in transport process, if one was spawned.
    pub fn transport_pid(&self) -> Option<i32> {
        match self.transport_pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    /// Socket directories handed out so far.
    pub fn socket_dirs(&self) -> Vec<PathBuf> {
        self.socket_dirs.lock().unwrap().clone()
    }
}

impl SystemDeps for StubDeps {
    async fn dial_unix(&self, _path: &Path) -> io::Result<()> {
        let attempt = self.dials.fetch_add(1, Ordering::SeqCst) + 1;
        let ready = match self.dial {
            DialScript::AlwaysReady => true,
            DialScript::ReadyAfter(failures) => attempt > failures,
            DialScript::NeverReady => false,
        };
        if ready {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "no listener"))
        }
    }

    fn start(&self, cmd: &mut Command) -> io::Result<Child> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let mut argv = vec![cmd.get_program().to_string_lossy().into_owned()];
        argv.extend(cmd.get_args().map(|a| a.to_string_lossy().into_owned()));
        *self.spawned_argv.lock().unwrap() = argv;

        if self.fail_start {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "ssh: command not found",
            ));
        }

        let mut transport = Command::new("sleep");
        transport.arg("30");
        transport.process_group(0);
        let child = transport.spawn()?;
        self.transport_pid.store(child.id() as i32, Ordering::SeqCst);
        Ok(child)
    }

    fn temp_dir(&self) -> io::Result<TempDir> {
        let dir = tempfile::Builder::new().prefix("sshdock-").tempdir()?;
        self.socket_dirs
            .lock()
            .unwrap()
            .push(dir.path().to_path_buf());
        Ok(dir)
    }

    fn getenv(&self, key: &str) -> Option<String> {
        self.env.lock().unwrap().get(key).cloned()
    }

    fn setenv(&self, key: &str, value: &str) {
        self.env
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }
}
