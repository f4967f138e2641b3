// Adapters - External system implementations

pub mod probe_ffprobe;
pub mod toml_config;

// Re-export adapters
pub use probe_ffprobe::FfprobeAdapter;
pub use toml_config::TomlConfigAdapter;
