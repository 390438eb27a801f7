//! # lintel-shell - the desktop shell server
//!
//! Owns the top bar: listens on the shell socket, tracks every connected
//! application's menu and status items, and redraws the bar when they
//! change. Runs until interrupted.

use anyhow::Result;
use clap::Parser;
use lintel::shell::{service, BarPresenter, LogPresenter, PixmapPresenter, ShellService};
use lintel::LintelConfig;
use log::{error, info};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lintel-shell")]
#[command(about = "Desktop shell server: application menus, status tray, and the top bar")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/lintel/lintel.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Override the socket applications connect to
    #[arg(short, long)]
    socket: Option<PathBuf>,

    /// Rasterize the bar and write every frame to this PNG file
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    info!("🚀 Starting Lintel shell");
    info!("📄 Version: {}", lintel::VERSION);
    info!(
        "🔧 Built {} for {} ({})",
        option_env!("BUILD_DATE").unwrap_or("unknown date"),
        option_env!("TARGET_TRIPLE").unwrap_or("unknown target"),
        option_env!("GIT_COMMIT").unwrap_or("no commit")
    );

    // Load configuration
    let mut config = match LintelConfig::load(&cli.config) {
        Ok(config) => {
            info!("✅ Configuration loaded from: {}", cli.config);
            config
        }
        Err(e) => {
            error!("❌ Failed to load configuration: {}", e);
            info!("📝 Using default configuration");
            LintelConfig::default()
        }
    };

    // Override config with CLI flags
    if let Some(socket) = cli.socket {
        config.shell.socket_path = socket;
    }

    let presenter: Box<dyn BarPresenter> = match cli.snapshot {
        Some(path) => {
            info!("🖼️ Writing bar snapshots to {}", path.display());
            Box::new(PixmapPresenter::new(&config.bar)?.with_snapshot(path))
        }
        None => Box::new(LogPresenter::new()),
    };

    let listener = service::bind(&config.shell.socket_path)?;
    info!("🔌 Listening on {}", config.shell.socket_path.display());

    let shell = ShellService::new(&config.shell, presenter);
    shell
        .run(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("❌ Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    if let Err(e) = std::fs::remove_file(&config.shell.socket_path) {
        log::debug!("Could not remove socket: {}", e);
    }
    info!("👋 Lintel shell shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["lintel-shell"]).unwrap();
        assert!(!cli.debug);
        assert!(cli.socket.is_none());
        assert!(cli.snapshot.is_none());
    }

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "lintel-shell",
            "--debug",
            "--socket",
            "/tmp/shell.sock",
            "--snapshot",
            "/tmp/bar.png",
        ])
        .unwrap();
        assert!(cli.debug);
        assert_eq!(cli.socket, Some(PathBuf::from("/tmp/shell.sock")));
        assert_eq!(cli.snapshot, Some(PathBuf::from("/tmp/bar.png")));
    }
}
