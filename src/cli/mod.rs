//! CLI module for iptv-probe
//!
//! This module handles command-line argument parsing and command execution.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod args;
pub mod commands;

/// IPTV stream probe
///
/// Checks whether IPTV streams are playable and reports resolution, frame
/// rate, codec, bitrate and HDR, using ffprobe under a hard deadline.
#[derive(Parser, Debug)]
#[command(name = "iptv-probe")]
#[command(about = "Probe IPTV streams for liveness and technical details")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Configuration file (default: ./iptv-probe.toml, then the user config dir)
    #[arg(long, global = true, env = "IPTV_PROBE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log output format (pretty, compact, json)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Path to the ffprobe executable
    #[arg(long, global = true)]
    pub ffprobe: Option<String>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Probe one or more stream URLs
    Probe(args::ProbeArgs),
    /// Probe every channel in an M3U playlist
    Scan(args::ScanArgs),
    /// Show the effective configuration
    Config(args::ConfigArgs),
}
