//! Configuration initialization and hierarchy management

use tracing::debug;

use crate::adapters::toml_config::{EngineConfig, TomlConfigAdapter};
use crate::cli::{Cli, Commands};
use crate::error::EngineResult;

/// Resolve configuration following precedence: CLI > Env > File > Defaults
pub fn initialize_configuration(cli: &Cli) -> EngineResult<EngineConfig> {
    let adapter = TomlConfigAdapter::new(cli.config.clone());

    // Defaults, file, then environment
    let mut config = adapter.load()?;

    let overrides = apply_cli_overrides(&mut config, cli)?;
    if overrides > 0 {
        debug!("Applied {} CLI configuration overrides", overrides);
    }

    config.validate()?;
    Ok(config)
}

/// Apply CLI argument overrides; returns how many were applied
pub fn apply_cli_overrides(config: &mut EngineConfig, cli: &Cli) -> EngineResult<usize> {
    let mut overrides = 0;

    if let Some(level) = &cli.log_level {
        config.logging.level = level.parse()?;
        overrides += 1;
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = format.parse()?;
        overrides += 1;
    }
    if let Some(path) = &cli.ffprobe {
        config.probe.ffprobe_path = path.clone();
        overrides += 1;
    }

    let (timeout_ms, concurrency) = match &cli.command {
        Commands::Probe(args) => (args.timeout_ms, None),
        Commands::Scan(args) => (args.timeout_ms, args.concurrency),
        Commands::Config(_) => (None, None),
    };
    if let Some(timeout_ms) = timeout_ms {
        config.probe.timeout_ms = timeout_ms;
        overrides += 1;
    }
    if let Some(concurrency) = concurrency {
        config.probe.max_concurrency = concurrency;
        overrides += 1;
    }

    Ok(overrides)
}
