//! Headless smoke runner for the murmur process core.
//!
//! Brings the tor daemon up, waits for the bootstrap to finish, connects the
//! engine bridge, issues one status command, and tears everything down. Meant
//! for manual verification and packaging checks, not end users.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{eyre, Result};
use tracing::info;

use murmur_bridge::{ControlBridge, EngineCommand, EngineConfig};
use murmur_core::{DaemonState, Settings};
use murmur_daemon::TorSupervisor;

/// How long to wait for the daemon to finish bootstrapping.
const BOOTSTRAP_WAIT: Duration = Duration::from_secs(120);

#[derive(Parser, Debug)]
#[command(name = "murmur", version, about = "Privacy messenger process core")]
struct Args {
    /// Private storage directory (config, daemon data, logs).
    #[arg(long, default_value = ".murmur")]
    data_dir: PathBuf,

    /// Override the engine program from config.toml.
    #[arg(long)]
    engine: Option<PathBuf>,

    /// Bring up the daemon only, skip the engine bridge.
    #[arg(long)]
    no_engine: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    std::fs::create_dir_all(&args.data_dir)?;
    murmur_core::logging::init(&args.data_dir)?;
    println!(
        "log file: {}",
        murmur_core::logging::current_log_file(&args.data_dir).display()
    );

    let mut settings = Settings::load_from(&args.data_dir)?;
    if let Some(engine) = args.engine {
        settings.engine.program = engine;
    }

    let supervisor = TorSupervisor::new(&args.data_dir, settings.daemon.clone());
    supervisor.start().await?;
    info!("Daemon starting, waiting for bootstrap");

    wait_for_bootstrap(&supervisor).await?;
    println!("daemon: connected (socks 127.0.0.1:{})", settings.daemon.socks_port);

    if supervisor.is_reachable().await {
        info!("SOCKS listener is accepting connections");
    }

    if !args.no_engine {
        let bridge = ControlBridge::new(supervisor.status_handle());
        let config = EngineConfig {
            program: settings.engine.program.to_string_lossy().into_owned(),
            args: settings.engine.args.clone(),
            data_dir: args.data_dir.clone(),
            socks_port: settings.daemon.socks_port,
        };
        bridge.connect(&config).await?;

        let status = bridge
            .send(&EngineCommand::GetNetworkStatus, settings.request_timeout())
            .await?;
        println!("engine: {}", status);

        bridge.disconnect().await?;
    }

    supervisor.stop().await?;
    println!("daemon: stopped");
    Ok(())
}

/// Poll the supervisor until Connected, reporting progress along the way.
async fn wait_for_bootstrap(supervisor: &TorSupervisor) -> Result<()> {
    let deadline = tokio::time::Instant::now() + BOOTSTRAP_WAIT;
    let mut last_progress = 0u8;

    loop {
        let status = supervisor.status();
        match status.state {
            DaemonState::Connected => return Ok(()),
            DaemonState::Error => {
                let message = status
                    .error
                    .map(|record| record.message)
                    .unwrap_or_else(|| "unknown daemon failure".into());
                return Err(eyre!("daemon failed to start: {message}"));
            }
            _ => {
                if status.bootstrap_progress > last_progress {
                    last_progress = status.bootstrap_progress;
                    println!("daemon: bootstrapping {}%", last_progress);
                }
            }
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(eyre!(
                "daemon did not finish bootstrapping within {BOOTSTRAP_WAIT:?} \
                 (stuck at {last_progress}%)"
            ));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}
