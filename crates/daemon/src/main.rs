// SPDX-License-Identifier: MIT

//! Joblet daemon (jobletd)
//!
//! Background process that owns the execution engine and serves the RPC
//! surface.
//!
//! Architecture:
//! - Listener tasks: socket I/O, one connection per task
//! - Scheduler loop: the main task, processing engine events sequentially
//! - Supervisor tasks: one per running job

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

#[cfg(target_os = "linux")]
mod linux_main {
    use joblet_daemon::env::DaemonConfig;
    use joblet_daemon::lifecycle::{self, LifecycleError};
    use tokio::signal::unix::{signal, SignalKind};
    use tracing::{error, info};

    pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
        if let Some(arg) = std::env::args().nth(1) {
            match arg.as_str() {
                "--version" | "-V" | "-v" => {
                    println!("jobletd {}", env!("CARGO_PKG_VERSION"));
                    return Ok(());
                }
                "--help" | "-h" | "help" => {
                    println!("jobletd {}", env!("CARGO_PKG_VERSION"));
                    println!("Joblet daemon - job execution engine with sandboxed runtimes");
                    println!();
                    println!("USAGE:");
                    println!("    jobletd");
                    println!();
                    println!("Configuration comes from the environment:");
                    println!("    JOBLET_STATE_DIR    state directory (default ~/.local/state/joblet)");
                    println!("    JOBLET_LISTEN_ADDR  optional TCP listen address");
                    println!("    JOBLET_TLS_CERT     TLS certificate chain (PEM)");
                    println!("    JOBLET_TLS_KEY      TLS private key (PEM)");
                    println!("    JOBLET_LOG_LEVEL    log filter (default info)");
                    println!("    JOBLET_WORKERS      worker parallelism cap");
                    println!();
                    println!("OPTIONS:");
                    println!("    -h, --help       Print help information");
                    println!("    -v, --version    Print version information");
                    return Ok(());
                }
                _ => {
                    eprintln!("error: unexpected argument '{arg}'");
                    eprintln!("Usage: jobletd [--help | --version]");
                    std::process::exit(1);
                }
            }
        }

        let config = DaemonConfig::from_env()?;
        std::fs::create_dir_all(&config.state_dir)?;
        let _log_guard = setup_logging(&config)?;

        info!(state_dir = %config.state_dir.display(), "starting jobletd");

        let (daemon, unix_listener) = match lifecycle::startup(&config).await {
            Ok(started) => started,
            Err(LifecycleError::LockFailed(path)) => {
                let pid = std::fs::read_to_string(config.lock_path())
                    .unwrap_or_default()
                    .trim()
                    .to_string();
                eprintln!("jobletd is already running");
                if !pid.is_empty() {
                    eprintln!("  pid: {pid}");
                }
                eprintln!("  lock: {path}");
                std::process::exit(1);
            }
            Err(e) => return Err(e.into()),
        };

        // SIGTERM/SIGINT trigger the same orderly shutdown a Shutdown
        // request does.
        let engine = daemon.engine.clone();
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("SIGTERM received"),
                _ = sigint.recv() => info!("SIGINT received"),
            }
            engine.send_shutdown();
        });

        daemon.run(&config, unix_listener).await?;
        Ok(())
    }

    fn setup_logging(
        config: &DaemonConfig,
    ) -> Result<tracing_appender::non_blocking::WorkerGuard, Box<dyn std::error::Error>> {
        use tracing_subscriber::EnvFilter;

        let filter = EnvFilter::try_new(&config.log_level)
            .or_else(|_| EnvFilter::try_new("info"))
            .map_err(|e| -> Box<dyn std::error::Error> { Box::new(e) })?;

        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(config.log_path())?;
        let (writer, guard) = tracing_appender::non_blocking(log_file);

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();

        if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
            error!("rustls provider install failed: {e:?}");
        }
        Ok(guard)
    }
}

#[cfg(target_os = "linux")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    linux_main::run().await
}

#[cfg(not(target_os = "linux"))]
fn main() {
    eprintln!("jobletd only runs on Linux (namespaces, cgroup v2, pidfd).");
    std::process::exit(1);
}
