//! `kiln` - serve a folder over HTTP.
//!
//! Loads configuration (file, then `KILN_*` environment, then flags),
//! creates the base folder and its public directory, mounts the public
//! directory at `/` and runs until Ctrl-C.

use clap::Parser;
use colored::Colorize;
use kiln_config::{ServerConfig, Validate};
use kiln_core::logging::LogConfig;
use kiln_core::{Server, StaticFilesConfig};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

mod error;

use error::{CliError, CliResult};

/// Kiln - a small self-tuning HTTP/1.x server
#[derive(Debug, Parser)]
#[command(name = "kiln")]
#[command(version)]
#[command(about = "Serve a folder with the Kiln HTTP engine")]
struct Cli {
    /// Base folder; static files are served from its public directory
    #[arg(short, long, default_value = ".")]
    folder: PathBuf,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Number of workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Debug mode: verbose logs and diagnostic error pages
    #[arg(short, long)]
    debug: bool,

    /// Configuration file (TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl Cli {
    fn load_config(&self) -> CliResult<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => kiln_config::load(path)?,
            None => kiln_config::from_env()?,
        };
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(workers) = self.workers {
            config.server.workers = workers;
        }
        if self.debug {
            config.server.debug = true;
        }
        config.validate()?;
        Ok(config)
    }
}

fn create_dir(path: &Path) -> CliResult<()> {
    std::fs::create_dir_all(path).map_err(|source| CliError::Directory {
        path: path.to_path_buf(),
        source,
    })
}

async fn run(cli: Cli) -> CliResult<()> {
    let config = cli.load_config()?;

    let public = cli.folder.join(&config.files.folder);
    create_dir(&cli.folder)?;
    create_dir(&public)?;

    let _guard = LogConfig::console(config.server.debug).init()?;

    let server = Server::builder(config)
        .static_files(StaticFilesConfig::new(&public))
        .build()?;
    let running = server.start().await?;
    info!(addr = %running.local_addr(), folder = %public.display(), "kiln is serving");

    let shutdown = running.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received, shutting down"),
            Err(err) => warn!(error = %err, "cannot listen for Ctrl-C, shutting down"),
        }
        shutdown.shutdown();
    });

    running.wait().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("\n  {} {}\n", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from(["kiln", "-p", "8081", "-w", "4", "-d"]);
        let config = cli.load_config().unwrap();
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.server.workers, 4);
        assert!(config.server.debug);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let cli = Cli::parse_from(["kiln", "--workers", "0"]);
        assert!(matches!(cli.load_config(), Err(CliError::Config(_))));
    }

    #[test]
    fn test_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiln.toml");
        std::fs::write(&path, "[server]\nport = 9090\n\n[files]\nfolder = \"www\"\n").unwrap();

        let cli = Cli::parse_from(["kiln", "-c", path.to_str().unwrap()]);
        let config = cli.load_config().unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.files.folder, "www");
    }
}
