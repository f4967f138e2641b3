//! iptv-probe library
//!
//! Stream liveness and metadata probing for IPTV channel lists. Each URL is
//! handed to an external ffprobe under a hard deadline, results are cached
//! per URL with concurrent requests collapsed onto one probe, and bulk scans
//! run through a bounded scheduler that can be cancelled as a whole.

pub mod adapters;
pub mod app;
pub mod cli;
pub mod config_initialization;
pub mod domain;
pub mod error;
pub mod ports;
pub mod utils;

// Re-export commonly used types
pub use adapters::toml_config::EngineConfig;
pub use adapters::FfprobeAdapter;
pub use app::{EngineContainer, ProbeCache, ProbeScheduler};
pub use domain::errors::ProbeFailure;
pub use domain::model::{HealthStatus, ProbeRequest, ProbeResult, ProbeUpdate, StreamBadge};
pub use error::{EngineResult, ProbeEngineError};
pub use ports::ProbePort;
