// TOML config adapter - Engine configuration from files and environment

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::adapters::probe_ffprobe::{AnalyzerSettings, DEFAULT_ANALYZE_DURATION_US, DEFAULT_PROBE_SIZE};
use crate::error::{EngineResult, ProbeEngineError};
use crate::utils::logging::LoggingConfig;

/// File name searched for in the working directory
pub const CONFIG_FILE_NAME: &str = "iptv-probe.toml";

/// Environment variable to config field mapping
pub const ENV_MAPPINGS: [(&str, &str); 6] = [
    ("IPTV_PROBE_FFPROBE", "probe.ffprobe_path"),
    ("IPTV_PROBE_TIMEOUT_MS", "probe.timeout_ms"),
    ("IPTV_PROBE_MAX_CONCURRENCY", "probe.max_concurrency"),
    ("IPTV_PROBE_COOLDOWN_MS", "probe.cooldown_ms"),
    ("IPTV_PROBE_LOG_LEVEL", "logging.level"),
    ("IPTV_PROBE_LOG_FORMAT", "logging.format"),
];

/// Probe engine settings (`[probe]` table)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// Analyzer executable; a bare name is resolved through PATH
    pub ffprobe_path: String,
    pub timeout_ms: u64,
    pub probe_size: u64,
    pub analyze_duration_us: u64,
    /// Analyzer processes allowed to run at once
    pub max_concurrency: usize,
    /// Pause a worker takes after launching a real probe
    pub cooldown_ms: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            ffprobe_path: "ffprobe".to_string(),
            timeout_ms: 5000,
            probe_size: DEFAULT_PROBE_SIZE,
            analyze_duration_us: DEFAULT_ANALYZE_DURATION_US,
            max_concurrency: 3,
            cooldown_ms: 250,
        }
    }
}

impl ProbeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn analyzer_settings(&self) -> AnalyzerSettings {
        AnalyzerSettings {
            probe_size: self.probe_size,
            analyze_duration_us: self.analyze_duration_us,
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub probe: ProbeSettings,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Reject values that would make probing unbounded or impossible
    pub fn validate(&self) -> EngineResult<()> {
        if self.probe.timeout_ms == 0 {
            return Err(ProbeEngineError::config("probe.timeout_ms must be greater than 0"));
        }
        if self.probe.max_concurrency == 0 {
            return Err(ProbeEngineError::config(
                "probe.max_concurrency must be at least 1",
            ));
        }
        if self.probe.probe_size == 0 {
            return Err(ProbeEngineError::config("probe.probe_size must be greater than 0"));
        }
        if self.probe.ffprobe_path.trim().is_empty() {
            return Err(ProbeEngineError::config("probe.ffprobe_path must not be empty"));
        }
        Ok(())
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> EngineResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ProbeEngineError::config(format!("Failed to serialize config: {}", e)))
    }
}

/// TOML configuration adapter
pub struct TomlConfigAdapter {
    config_file_path: Option<PathBuf>,
}

impl TomlConfigAdapter {
    /// Create an adapter; `explicit` must exist if given
    pub fn new(explicit: Option<PathBuf>) -> Self {
        Self {
            config_file_path: explicit,
        }
    }

    /// Load defaults, then the config file, then environment overrides
    pub fn load(&self) -> EngineResult<EngineConfig> {
        let mut config = match self.locate()? {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                Self::load_file(&path)?
            }
            None => {
                debug!("No config file found, using defaults");
                EngineConfig::default()
            }
        };

        let applied = Self::apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
        if applied > 0 {
            info!("Applied {} environment variable overrides", applied);
        }

        config.validate()?;
        Ok(config)
    }

    /// Which config file `load` would read, if any
    pub fn locate(&self) -> EngineResult<Option<PathBuf>> {
        if let Some(path) = &self.config_file_path {
            if !path.is_file() {
                return Err(ProbeEngineError::config(format!(
                    "Config file does not exist: {}",
                    path.display()
                )));
            }
            return Ok(Some(path.clone()));
        }

        Ok(Self::default_config_paths()
            .into_iter()
            .find(|path| path.is_file()))
    }

    /// Candidate locations, most specific first
    pub fn default_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];

        if let Some(appdata) = std::env::var_os("APPDATA") {
            paths.push(PathBuf::from(appdata).join("iptv-probe").join("config.toml"));
        } else if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg).join("iptv-probe").join("config.toml"));
        } else if let Some(home) = std::env::var_os("HOME") {
            paths.push(
                PathBuf::from(home)
                    .join(".config")
                    .join("iptv-probe")
                    .join("config.toml"),
            );
        }

        paths
    }

    /// Parse one config file
    pub fn load_file(path: &Path) -> EngineResult<EngineConfig> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|source| ProbeEngineError::TomlParse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Apply `IPTV_PROBE_*` overrides read through `lookup`.
    ///
    /// Returns how many were applied.
    pub fn apply_env_overrides<F>(config: &mut EngineConfig, lookup: F) -> EngineResult<usize>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut applied = 0;

        for (env_var, field) in ENV_MAPPINGS {
            let Some(value) = lookup(env_var) else {
                continue;
            };
            debug!("Found environment override: {} = {}", env_var, value);

            match field {
                "probe.ffprobe_path" => config.probe.ffprobe_path = value,
                "probe.timeout_ms" => config.probe.timeout_ms = parse_number(env_var, &value)?,
                "probe.max_concurrency" => {
                    config.probe.max_concurrency = parse_number(env_var, &value)?
                }
                "probe.cooldown_ms" => config.probe.cooldown_ms = parse_number(env_var, &value)?,
                "logging.level" => config.logging.level = value.parse()?,
                "logging.format" => config.logging.format = value.parse()?,
                _ => continue,
            }
            applied += 1;
        }

        Ok(applied)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> EngineResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ProbeEngineError::config(format!("{} must be a non-negative integer, got {:?}", name, value)))
}
