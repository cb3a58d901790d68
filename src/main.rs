//! sshdock - Run a command against an SSH-tunneled Docker daemon
//!
//! Reads `DOCKER_HOST`, tunnels it through ssh when it names an `ssh://`
//! host, runs the given command under the rewritten environment, and tears
//! the tunnel down when the command exits.

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sshdock::DockerHostHandler;

/// sshdock - Run a command against an SSH-tunneled Docker daemon
///
/// If DOCKER_HOST is set to ssh://host[:port], sshdock forwards the remote
/// Docker control socket to a private local unix socket, points DOCKER_HOST
/// at it, and runs the given command. Any other DOCKER_HOST value runs the
/// command unchanged.
///
/// Example: DOCKER_HOST=ssh://build-box sshdock -- docker ps
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Command to run under the redirected DOCKER_HOST
    #[arg(trailing_var_arg = true, required = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    // Ctrl-C while the tunnel is being established aborts the readiness
    // wait instead of leaving the polling loop running
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    let handler = DockerHostHandler::new();
    let guard = handler
        .handle_docker_host(&cancel)
        .await
        .context("redirect DOCKER_HOST over ssh")?;

    match guard.docker_host() {
        Some(url) => info!(docker_host = %url, "running command against tunneled Docker host"),
        None => debug!("DOCKER_HOST left untouched"),
    }

    let Some((program, args)) = cli.command.split_first() else {
        bail!("no command given");
    };
    let status = Command::new(program)
        .args(args)
        .status()
        .await
        .with_context(|| format!("run {program}"))?;

    if let Err(err) = guard.close() {
        warn!(error = %err, "tunnel teardown failed");
    }

    match status.code() {
        Some(code) => std::process::exit(code),
        None => bail!("{program} terminated by signal"),
    }
}
