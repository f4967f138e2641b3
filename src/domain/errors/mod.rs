// Domain errors - Local probe failure taxonomy

use std::fmt;

use crate::domain::model::sentinel;

/// Why a probe attempt failed to produce stream metadata.
///
/// These never escape the engine as errors. Each one is folded into a
/// `ProbeResult` with `success == false` and a sentinel in the resolution
/// field, so callers render a state instead of handling an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    /// Analyzer binary missing or not configured
    ToolUnavailable,
    /// Deadline elapsed before the analyzer exited
    Timeout,
    /// Caller cancelled while the analyzer was running
    Cancelled,
    /// Analyzer exited without writing anything
    EmptyOutput,
    /// Analyzer output could not be used
    MalformedOutput(Malformation),
    /// Anything else (spawn failure, pipe error, ...)
    UnexpectedFailure(String),
}

/// Detail for `ProbeFailure::MalformedOutput`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Malformation {
    /// Output was not valid JSON in the expected shape
    Unparseable(String),
    /// JSON parsed but held no video stream entry
    NoVideoStream,
}

impl ProbeFailure {
    /// Sentinel string stored in `ProbeResult::resolution` for this failure
    pub fn sentinel(&self) -> &'static str {
        match self {
            ProbeFailure::ToolUnavailable => sentinel::NO_FFPROBE,
            ProbeFailure::Timeout | ProbeFailure::Cancelled => sentinel::ABORTED,
            ProbeFailure::EmptyOutput => sentinel::NO_DATA,
            ProbeFailure::MalformedOutput(Malformation::Unparseable(_)) => sentinel::NO_DATA,
            ProbeFailure::MalformedOutput(Malformation::NoVideoStream) => sentinel::UNKNOWN,
            ProbeFailure::UnexpectedFailure(_) => sentinel::ERROR,
        }
    }
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeFailure::ToolUnavailable => write!(f, "Analyzer unavailable"),
            ProbeFailure::Timeout => write!(f, "Probe timed out"),
            ProbeFailure::Cancelled => write!(f, "Probe cancelled"),
            ProbeFailure::EmptyOutput => write!(f, "Analyzer produced no output"),
            ProbeFailure::MalformedOutput(Malformation::Unparseable(msg)) => {
                write!(f, "Malformed analyzer output: {}", msg)
            }
            ProbeFailure::MalformedOutput(Malformation::NoVideoStream) => {
                write!(f, "Malformed analyzer output: no video stream")
            }
            ProbeFailure::UnexpectedFailure(msg) => write!(f, "Unexpected failure: {}", msg),
        }
    }
}

impl std::error::Error for ProbeFailure {}
