// Domain models - Core types and data structures

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::domain::errors::ProbeFailure;

/// Default deadline for a single probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Reserved field values that stand in for real metadata
pub mod sentinel {
    pub const NO_FFPROBE: &str = "No ffprobe";
    pub const ABORTED: &str = "Aborted";
    pub const ERROR: &str = "Error";
    pub const NO_DATA: &str = "No Data";
    pub const UNKNOWN: &str = "Unknown";

    /// Placeholder for fps/codec when nothing is known
    pub const DASH: &str = "-";
    /// Frame rate that could not be derived
    pub const NO_FPS: &str = "- fps";

    /// Every value that marks a resolution as a failure reason
    pub const FAILURES: [&str; 5] = [ABORTED, ERROR, NO_DATA, UNKNOWN, NO_FFPROBE];

    /// Check whether a resolution string is one of the failure sentinels
    pub fn is_failure(value: &str) -> bool {
        FAILURES.contains(&value)
    }
}

/// Normalize a stream URL into a cache key.
///
/// Returns `None` for empty or whitespace-only input.
pub fn normalize_url(url: &str) -> Option<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// A single probe invocation
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    pub url: String,
    pub timeout: Duration,
    pub cancellation: CancellationToken,
}

impl ProbeRequest {
    /// Create a request with the default timeout and a fresh cancellation token
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: DEFAULT_PROBE_TIMEOUT,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }
}

/// Technical facts extracted from one probe attempt.
///
/// Built once by the probe adapter and never changed afterwards; the cache
/// hands out clones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    resolution: String,
    fps: String,
    codec: String,
    bitrate_bps: u64,
    success: bool,
    is_hdr: bool,
}

impl ProbeResult {
    /// Result for a stream that answered with a video stream entry
    pub fn online(
        resolution: impl Into<String>,
        fps: impl Into<String>,
        codec: impl Into<String>,
        bitrate_bps: u64,
        is_hdr: bool,
    ) -> Self {
        Self {
            resolution: resolution.into(),
            fps: fps.into(),
            codec: codec.into(),
            bitrate_bps,
            success: true,
            is_hdr,
        }
    }

    /// Result for a failed probe, carrying the failure's sentinel
    pub fn failed(failure: &ProbeFailure) -> Self {
        Self {
            resolution: failure.sentinel().to_string(),
            fps: sentinel::DASH.to_string(),
            codec: sentinel::DASH.to_string(),
            bitrate_bps: 0,
            success: false,
            is_hdr: false,
        }
    }

    /// Shorthand for an aborted (timed out or cancelled) probe
    pub fn aborted() -> Self {
        Self::failed(&ProbeFailure::Cancelled)
    }

    pub fn resolution(&self) -> &str {
        &self.resolution
    }

    pub fn fps(&self) -> &str {
        &self.fps
    }

    pub fn codec(&self) -> &str {
        &self.codec
    }

    pub fn bitrate_bps(&self) -> u64 {
        self.bitrate_bps
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn is_hdr(&self) -> bool {
        self.is_hdr
    }

    /// True when the result records an aborted probe
    pub fn is_aborted(&self) -> bool {
        !self.success && self.resolution == sentinel::ABORTED
    }
}

impl fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.success {
            return write!(f, "{}", self.resolution);
        }
        write!(f, "{} | {} | {}", self.resolution, self.fps, self.codec)?;
        if self.is_hdr {
            write!(f, " | HDR")?;
        }
        Ok(())
    }
}

/// Liveness classification shown next to a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Not probed yet
    Unknown,
    #[serde(rename = "Online-Stable")]
    OnlineStable,
    #[serde(rename = "Online-Unstable")]
    OnlineUnstable,
    Offline,
}

impl HealthStatus {
    pub fn label(&self) -> &'static str {
        match self {
            HealthStatus::Unknown => "Unknown",
            HealthStatus::OnlineStable => "Online-Stable",
            HealthStatus::OnlineUnstable => "Online-Unstable",
            HealthStatus::Offline => "Offline",
        }
    }

    /// `Some(true)` when online, `Some(false)` when offline, `None` if not probed
    pub fn is_online(&self) -> Option<bool> {
        match self {
            HealthStatus::Unknown => None,
            HealthStatus::OnlineStable | HealthStatus::OnlineUnstable => Some(true),
            HealthStatus::Offline => Some(false),
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-item tuple the presentation layer renders badges from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamBadge {
    pub resolution: String,
    pub fps: String,
    pub codec: String,
    pub bitrate: u64,
    pub is_hdr: bool,
    pub is_online: Option<bool>,
}

impl StreamBadge {
    /// Badge for an item, or an empty one when it has not been probed
    pub fn from_result(result: Option<&ProbeResult>) -> Self {
        match result {
            Some(result) => Self {
                resolution: result.resolution.clone(),
                fps: result.fps.clone(),
                codec: result.codec.clone(),
                bitrate: result.bitrate_bps,
                is_hdr: result.is_hdr,
                is_online: Some(result.success),
            },
            None => Self {
                resolution: String::new(),
                fps: String::new(),
                codec: String::new(),
                bitrate: 0,
                is_hdr: false,
                is_online: None,
            },
        }
    }
}

/// One published probe completion
#[derive(Debug, Clone, Serialize)]
pub struct ProbeUpdate {
    pub url: String,
    pub result: ProbeResult,
    pub health: HealthStatus,
    /// The result was served from the cache without launching the analyzer
    pub from_cache: bool,
    pub completed_at: DateTime<Utc>,
}

impl ProbeUpdate {
    pub fn new(url: String, result: ProbeResult, from_cache: bool) -> Self {
        let health = crate::domain::rules::classify(&result);
        Self {
            url,
            result,
            health,
            from_cache,
            completed_at: Utc::now(),
        }
    }

    pub fn badge(&self) -> StreamBadge {
        StreamBadge::from_result(Some(&self.result))
    }
}
