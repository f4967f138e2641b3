//! FFprobe adapter for stream probing
//!
//! Runs `ffprobe` as a child process per URL and races its exit against the
//! request deadline and the caller's cancellation token. Whatever happens,
//! the caller gets a `ProbeResult`; the child is killed on every path that
//! does not end in a normal exit.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::domain::errors::ProbeFailure;
use crate::domain::model::*;
use crate::ports::ProbePort;

pub mod output;

/// Default `-probesize` in bytes
pub const DEFAULT_PROBE_SIZE: u64 = 256_000;
/// Default `-analyzeduration` in microseconds
pub const DEFAULT_ANALYZE_DURATION_US: u64 = 200_000;

/// Knobs that bound how much of a stream ffprobe reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerSettings {
    pub probe_size: u64,
    pub analyze_duration_us: u64,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            probe_size: DEFAULT_PROBE_SIZE,
            analyze_duration_us: DEFAULT_ANALYZE_DURATION_US,
        }
    }
}

/// How the race between exit, deadline and cancellation ended
enum Outcome {
    Exited(std::io::Result<(ExitStatus, Vec<u8>)>),
    TimedOut,
    Cancelled,
}

/// FFprobe-based probe adapter
pub struct FfprobeAdapter {
    /// Resolved once at construction; `None` means every probe short-circuits
    tool: Option<PathBuf>,
    settings: AnalyzerSettings,
}

impl FfprobeAdapter {
    /// Create an adapter, resolving `configured` to an executable.
    ///
    /// A bare name (`ffprobe`) is looked up on `PATH`; anything containing a
    /// path separator must point at an existing file.
    pub fn new(configured: &str, settings: AnalyzerSettings) -> Self {
        let tool = resolve_tool(configured);
        match &tool {
            Some(path) => debug!(tool = %path.display(), "Analyzer resolved"),
            None => warn!(configured, "Analyzer not found; probes will report No ffprobe"),
        }
        Self { tool, settings }
    }

    /// Adapter bound to an exact executable path, skipping lookup
    pub fn with_tool(tool: PathBuf, settings: AnalyzerSettings) -> Self {
        let tool = tool.is_file().then_some(tool);
        Self { tool, settings }
    }

    pub fn tool_path(&self) -> Option<&Path> {
        self.tool.as_deref()
    }

    /// Command-line arguments for probing `url`
    pub fn build_args(&self, url: &str) -> Vec<String> {
        vec![
            "-v".to_string(),
            "error".to_string(),
            "-probesize".to_string(),
            self.settings.probe_size.to_string(),
            "-analyzeduration".to_string(),
            self.settings.analyze_duration_us.to_string(),
            "-select_streams".to_string(),
            "v:0".to_string(),
            "-show_entries".to_string(),
            "stream=width,height,avg_frame_rate,r_frame_rate,codec_name,bit_rate,color_primaries,color_transfer"
                .to_string(),
            "-show_entries".to_string(),
            "format=bit_rate".to_string(),
            "-of".to_string(),
            "json".to_string(),
            url.to_string(),
        ]
    }

    async fn run(&self, request: &ProbeRequest) -> Result<ProbeResult, ProbeFailure> {
        let tool = self.tool.as_ref().ok_or(ProbeFailure::ToolUnavailable)?;

        if request.cancellation.is_cancelled() {
            return Err(ProbeFailure::Cancelled);
        }

        let mut command = Command::new(tool);
        command
            .args(self.build_args(&request.url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        hide_console_window(&mut command);

        let mut child = command.spawn().map_err(|e| {
            ProbeFailure::UnexpectedFailure(format!("failed to spawn {}: {}", tool.display(), e))
        })?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProbeFailure::UnexpectedFailure("stdout was not captured".to_string()))?;

        let outcome = {
            let exited = async {
                let mut buf = Vec::new();
                stdout.read_to_end(&mut buf).await?;
                let status = child.wait().await?;
                Ok::<_, std::io::Error>((status, buf))
            };

            tokio::select! {
                res = exited => Outcome::Exited(res),
                _ = tokio::time::sleep(request.timeout) => Outcome::TimedOut,
                _ = request.cancellation.cancelled() => Outcome::Cancelled,
            }
        };

        match outcome {
            Outcome::Exited(Ok((status, stdout))) => {
                if !status.success() {
                    debug!(url = %request.url, %status, "Analyzer exited with failure status");
                }
                output::interpret(&stdout)
            }
            Outcome::Exited(Err(e)) => {
                terminate(child, &request.url);
                Err(ProbeFailure::UnexpectedFailure(e.to_string()))
            }
            Outcome::TimedOut => {
                terminate(child, &request.url);
                Err(ProbeFailure::Timeout)
            }
            Outcome::Cancelled => {
                terminate(child, &request.url);
                Err(ProbeFailure::Cancelled)
            }
        }
    }
}

#[async_trait]
impl ProbePort for FfprobeAdapter {
    async fn probe(&self, request: &ProbeRequest) -> ProbeResult {
        let started = Instant::now();
        let outcome = self.run(request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                debug!(
                    url = %request.url,
                    elapsed_ms,
                    bitrate = result.bitrate_bps(),
                    "Probe completed: {}",
                    result
                );
                result
            }
            Err(failure) => {
                debug!(url = %request.url, elapsed_ms, "Probe failed: {}", failure);
                ProbeResult::failed(&failure)
            }
        }
    }

    fn is_available(&self) -> bool {
        self.tool.is_some()
    }

    fn name(&self) -> &str {
        "ffprobe"
    }
}

/// Kill the child and reap it in the background.
///
/// Kill failures are logged only; the probe result is already decided.
fn terminate(mut child: Child, url: &str) {
    if let Err(e) = child.start_kill() {
        warn!(url, error = %e, "Failed to kill analyzer process");
        return;
    }

    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move {
            let _ = child.wait().await;
        });
    }
}

/// Find the analyzer executable
pub fn resolve_tool(configured: &str) -> Option<PathBuf> {
    let configured = configured.trim();
    if configured.is_empty() {
        return None;
    }

    let candidate = Path::new(configured);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        executable_names(configured)
            .into_iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    })
}

#[cfg(windows)]
fn executable_names(name: &str) -> Vec<String> {
    if name.to_ascii_lowercase().ends_with(".exe") {
        vec![name.to_string()]
    } else {
        vec![format!("{}.exe", name), name.to_string()]
    }
}

#[cfg(not(windows))]
fn executable_names(name: &str) -> Vec<String> {
    vec![name.to_string()]
}

#[cfg(windows)]
fn hide_console_window(command: &mut Command) {
    command.creation_flags(winapi::um::winbase::CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn hide_console_window(_command: &mut Command) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args_bounds_probe_and_selects_first_video() {
        let adapter = FfprobeAdapter {
            tool: None,
            settings: AnalyzerSettings::default(),
        };
        let args = adapter.build_args("http://host/live/1.ts");

        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("-probesize") + 1], "256000");
        assert_eq!(args[pos("-analyzeduration") + 1], "200000");
        assert_eq!(args[pos("-select_streams") + 1], "v:0");
        assert_eq!(args[pos("-of") + 1], "json");
        assert!(args.iter().any(|a| a.contains("color_transfer")));
        assert!(args.iter().any(|a| a == "format=bit_rate"));
        assert_eq!(args.last().unwrap(), "http://host/live/1.ts");
    }

    #[test]
    fn test_resolve_tool_rejects_missing_paths() {
        assert_eq!(resolve_tool(""), None);
        assert_eq!(resolve_tool("/definitely/not/here/ffprobe"), None);
        assert_eq!(resolve_tool("no-such-analyzer-binary-xyz"), None);
    }

    #[tokio::test]
    async fn test_missing_tool_reports_no_ffprobe() {
        let adapter = FfprobeAdapter::new("/definitely/not/here/ffprobe", AnalyzerSettings::default());
        assert!(!adapter.is_available());

        let result = adapter.probe(&ProbeRequest::new("http://host/1.ts")).await;
        assert!(!result.success());
        assert_eq!(result.resolution(), "No ffprobe");
    }
}
