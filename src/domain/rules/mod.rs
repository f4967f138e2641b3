// Domain rules - Health classification and analyzer field derivation

use serde::Serialize;

use crate::domain::model::*;

/// Bitrates below this (and above zero) usually mean a black screen or a
/// static placeholder rather than a real channel.
pub const UNSTABLE_BITRATE_BPS: u64 = 200_000;

/// Color primaries marker for wide-gamut (HDR) video
const HDR_PRIMARIES_MARKER: &str = "bt2020";
/// PQ transfer characteristic
const HDR_TRANSFER_PQ: &str = "smpte2084";
/// HLG transfer characteristic
const HDR_TRANSFER_HLG: &str = "arib-std-b67";

/// Classify a probe result.
///
/// A bitrate of zero means the stream did not report one; many live streams
/// under-report, so it counts as stable.
pub fn classify(result: &ProbeResult) -> HealthStatus {
    if !result.success() {
        return HealthStatus::Offline;
    }

    match result.bitrate_bps() {
        0 => HealthStatus::OnlineStable,
        bps if bps < UNSTABLE_BITRATE_BPS => HealthStatus::OnlineUnstable,
        _ => HealthStatus::OnlineStable,
    }
}

/// Classify an item that may not have been probed yet
pub fn health_of(result: Option<&ProbeResult>) -> HealthStatus {
    result.map(classify).unwrap_or(HealthStatus::Unknown)
}

/// True when the resolution holds real data rather than a failure sentinel
pub fn has_usable_metadata(result: &ProbeResult) -> bool {
    let resolution = result.resolution();
    !resolution.is_empty() && !sentinel::is_failure(resolution)
}

/// Status indicator color for a health value
pub fn status_color(health: HealthStatus) -> &'static str {
    match health {
        HealthStatus::Offline => "#FF0000",
        HealthStatus::OnlineUnstable => "#FFCC00",
        HealthStatus::OnlineStable => "#00FF00",
        HealthStatus::Unknown => "#888888",
    }
}

/// Human-readable bitrate
pub fn format_bitrate(bps: u64) -> String {
    match bps {
        0 => sentinel::DASH.to_string(),
        bps if bps < 1_000_000 => format!("{} kbps", bps / 1000),
        bps => format!("{:.1} Mbps", bps as f64 / 1_000_000.0),
    }
}

/// Everything a presentation layer needs to draw a status badge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Presentation {
    pub health: HealthStatus,
    pub status_color: &'static str,
    pub tooltip: String,
    pub has_metadata: bool,
}

/// Derive presentation attributes; recomputed on every call
pub fn present(result: Option<&ProbeResult>) -> Presentation {
    let health = health_of(result);
    let has_metadata = result.map(has_usable_metadata).unwrap_or(false);

    let tooltip = match result {
        None => "Not probed yet".to_string(),
        Some(r) if !r.success() => format!("{} ({})", health.label(), r.resolution()),
        Some(r) => {
            let mut parts = vec![health.label().to_string()];
            if has_metadata {
                parts.push(r.resolution().to_string());
            }
            parts.push(r.fps().to_string());
            parts.push(r.codec().to_string());
            if r.bitrate_bps() > 0 {
                parts.push(format_bitrate(r.bitrate_bps()));
            }
            if r.is_hdr() {
                parts.push("HDR".to_string());
            }
            parts.join(" · ")
        }
    };

    Presentation {
        health,
        status_color: status_color(health),
        tooltip,
        has_metadata,
    }
}

/// Channel list filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum HealthFilter {
    #[default]
    All,
    /// Any online channel
    Online,
    /// Online and not flagged unstable
    Stable,
    Hdr,
}

impl HealthFilter {
    pub fn matches(&self, result: Option<&ProbeResult>) -> bool {
        match self {
            HealthFilter::All => true,
            HealthFilter::Online => health_of(result).is_online() == Some(true),
            HealthFilter::Stable => health_of(result) == HealthStatus::OnlineStable,
            HealthFilter::Hdr => result.map(|r| r.is_hdr()).unwrap_or(false),
        }
    }
}

/// `"{width}x{height}"`, or `Unknown` without a positive width
pub fn format_resolution(width: Option<i64>, height: Option<i64>) -> String {
    match width {
        Some(w) if w > 0 => format!("{}x{}", w, height.unwrap_or(0)),
        _ => sentinel::UNKNOWN.to_string(),
    }
}

/// Pick and format the frame rate.
///
/// The average rate wins unless it is missing or the degenerate `0/0`, in
/// which case the real (base) rate is used.
pub fn format_frame_rate(avg_frame_rate: Option<&str>, real_frame_rate: Option<&str>) -> String {
    let usable = |raw: &&str| !raw.trim().is_empty() && raw.trim() != "0/0";

    let raw = avg_frame_rate
        .filter(usable)
        .or(real_frame_rate.filter(usable));

    match raw.and_then(evaluate_rate) {
        Some(fps) => format!("{} fps", fps),
        None => sentinel::NO_FPS.to_string(),
    }
}

/// Evaluate `"num/den"` or a bare number, rounded to the nearest integer
fn evaluate_rate(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let value = match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.parse::<f64>().ok()?,
    };

    value.is_finite().then(|| value.round() as i64)
}

/// Uppercase the codec name and fold common aliases
pub fn normalize_codec(codec_name: Option<&str>) -> String {
    let upper = match codec_name.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_uppercase(),
        _ => return sentinel::DASH.to_string(),
    };

    if upper.contains("H264") {
        "H.264".to_string()
    } else if upper.contains("HEVC") || upper.contains("H265") {
        "HEVC".to_string()
    } else {
        upper
    }
}

/// Stream bitrate when numeric, else the container bitrate, else zero
pub fn select_bitrate(stream_bit_rate: Option<&str>, format_bit_rate: Option<&str>) -> u64 {
    let parse = |raw: Option<&str>| raw.and_then(|v| v.trim().parse::<u64>().ok());
    parse(stream_bit_rate)
        .or_else(|| parse(format_bit_rate))
        .unwrap_or(0)
}

/// HDR from color metadata: BT.2020 primaries, or a PQ/HLG transfer
pub fn detect_hdr(color_primaries: Option<&str>, color_transfer: Option<&str>) -> bool {
    let wide_gamut = color_primaries
        .map(|p| p.to_ascii_lowercase().contains(HDR_PRIMARIES_MARKER))
        .unwrap_or(false);
    let hdr_transfer = color_transfer
        .map(|t| {
            let t = t.trim().to_ascii_lowercase();
            t == HDR_TRANSFER_PQ || t == HDR_TRANSFER_HLG
        })
        .unwrap_or(false);

    wide_gamut || hdr_transfer
}
