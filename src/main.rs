//! iptv-probe
//!
//! Command-line front end to the stream probing engine.
//!
//! # Usage
//!
//! ```bash
//! iptv-probe probe http://provider/live/user/pass/1001.ts
//! iptv-probe scan channels.m3u --concurrency 4 --filter online
//! iptv-probe config --format json
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::info;

use iptv_probe::app::EngineContainer;
use iptv_probe::cli::{commands, Cli, Commands};
use iptv_probe::config_initialization::initialize_configuration;
use iptv_probe::utils::logging::LoggingSystem;

/// Main entry point for the iptv-probe CLI application
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = initialize_configuration(&cli)?;

    let logging = LoggingSystem::new(config.logging.clone());
    logging.initialize()?;
    logging.log_system_info();

    let container = EngineContainer::new(&config);

    match cli.command {
        Commands::Probe(args) => {
            info!("Executing probe command");
            commands::probe(&container, args).await?;
        }
        Commands::Scan(args) => {
            info!("Executing scan command");
            commands::scan(&container, args).await?;
        }
        Commands::Config(args) => {
            commands::show_config(&config, &container, args)?;
        }
    }

    Ok(())
}
