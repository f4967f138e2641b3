//! ffprobe JSON output schema and conversion into `ProbeResult`

use serde::Deserialize;

use crate::domain::errors::{Malformation, ProbeFailure};
use crate::domain::model::ProbeResult;
use crate::domain::rules;

/// Top-level `-of json` document
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    bit_rate: Option<String>,
}

/// Fields requested through `-show_entries stream=...`
#[derive(Debug, Deserialize)]
struct FfprobeStream {
    width: Option<i64>,
    height: Option<i64>,
    codec_name: Option<String>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    bit_rate: Option<String>,
    color_primaries: Option<String>,
    color_transfer: Option<String>,
}

/// Turn captured stdout into a result, or the reason it cannot be one
pub fn interpret(stdout: &[u8]) -> Result<ProbeResult, ProbeFailure> {
    let text = String::from_utf8_lossy(stdout);
    if text.trim().is_empty() {
        return Err(ProbeFailure::EmptyOutput);
    }

    let output: FfprobeOutput = serde_json::from_str(&text).map_err(|e| {
        ProbeFailure::MalformedOutput(Malformation::Unparseable(e.to_string()))
    })?;

    // -select_streams v:0 leaves at most one entry
    let stream = output
        .streams
        .first()
        .ok_or(ProbeFailure::MalformedOutput(Malformation::NoVideoStream))?;

    let format_bit_rate = output.format.as_ref().and_then(|f| f.bit_rate.as_deref());

    Ok(ProbeResult::online(
        rules::format_resolution(stream.width, stream.height),
        rules::format_frame_rate(stream.avg_frame_rate.as_deref(), stream.r_frame_rate.as_deref()),
        rules::normalize_codec(stream.codec_name.as_deref()),
        rules::select_bitrate(stream.bit_rate.as_deref(), format_bit_rate),
        rules::detect_hdr(stream.color_primaries.as_deref(), stream.color_transfer.as_deref()),
    ))
}
