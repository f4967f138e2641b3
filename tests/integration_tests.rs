//! End-to-end tests: the ffprobe adapter against stand-in analyzer scripts,
//! and the CLI binary.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use assert_cmd::Command;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use iptv_probe::adapters::probe_ffprobe::AnalyzerSettings;
use iptv_probe::adapters::toml_config::EngineConfig;
use iptv_probe::app::EngineContainer;
use iptv_probe::domain::model::{sentinel, HealthStatus, ProbeRequest};
use iptv_probe::{FfprobeAdapter, ProbePort};

/// Test utilities for stand-in analyzers
mod test_utils {
    use super::*;

    pub const HDR_OUTPUT: &str = r#"{"streams":[{"codec_name":"hevc","width":3840,"height":2160,"avg_frame_rate":"0/0","r_frame_rate":"50/1","bit_rate":"4500000","color_primaries":"bt2020","color_transfer":"smpte2084"}],"format":{"bit_rate":"5000000"}}"#;

    /// Write an executable shell script standing in for ffprobe.
    ///
    /// The file is written by a child shell so no descriptor for it is ever
    /// open in this process when another test thread forks.
    pub fn fake_analyzer(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let script = format!("#!/bin/sh\n{}\n", body);
        let status = std::process::Command::new("/bin/sh")
            .arg("-c")
            .arg("printf '%s' \"$1\" > \"$2\" && chmod 755 \"$2\"")
            .arg("sh")
            .arg(&script)
            .arg(&path)
            .status()
            .expect("failed to write analyzer script");
        assert!(status.success());
        path
    }

    pub fn adapter(tool: &Path) -> FfprobeAdapter {
        FfprobeAdapter::with_tool(tool.to_path_buf(), AnalyzerSettings::default())
    }

    pub fn request(url: &str, timeout_ms: u64) -> ProbeRequest {
        ProbeRequest::new(url).with_timeout(Duration::from_millis(timeout_ms))
    }

    /// The CLI binary isolated from user config and environment
    pub fn cli(workdir: &TempDir) -> Command {
        let mut cmd = Command::cargo_bin("iptv-probe").unwrap();
        cmd.current_dir(workdir.path())
            .env_remove("APPDATA")
            .env_remove("IPTV_PROBE_CONFIG")
            .env_remove("IPTV_PROBE_FFPROBE")
            .env_remove("IPTV_PROBE_TIMEOUT_MS")
            .env_remove("IPTV_PROBE_MAX_CONCURRENCY")
            .env_remove("IPTV_PROBE_COOLDOWN_MS")
            .env_remove("IPTV_PROBE_LOG_LEVEL")
            .env_remove("IPTV_PROBE_LOG_FORMAT")
            .env_remove("RUST_LOG")
            .env("XDG_CONFIG_HOME", workdir.path());
        cmd
    }
}

use test_utils::*;

#[tokio::test]
async fn test_missing_analyzer_reports_no_ffprobe() {
    let dir = TempDir::new().unwrap();
    let adapter = adapter(&dir.path().join("does-not-exist"));
    assert!(!adapter.is_available());

    let result = adapter.probe(&request("http://host/1.ts", 1000)).await;
    assert!(!result.success());
    assert_eq!(result.resolution(), sentinel::NO_FFPROBE);
    assert_eq!(result.fps(), sentinel::DASH);
    assert_eq!(result.codec(), sentinel::DASH);
}

#[cfg(unix)]
#[tokio::test]
async fn test_parses_analyzer_json() {
    let dir = TempDir::new().unwrap();
    let tool = fake_analyzer(&dir, "ffprobe", &format!("cat <<'EOF'\n{}\nEOF", HDR_OUTPUT));

    let result = adapter(&tool).probe(&request("http://host/uhd.ts", 5000)).await;

    assert!(result.success());
    assert_eq!(result.resolution(), "3840x2160");
    assert_eq!(result.fps(), "50 fps");
    assert_eq!(result.codec(), "HEVC");
    assert_eq!(result.bitrate_bps(), 4_500_000);
    assert!(result.is_hdr());
}

#[cfg(unix)]
#[tokio::test]
async fn test_analyzer_receives_bounded_arguments() {
    let dir = TempDir::new().unwrap();
    let args_file = dir.path().join("args.txt");
    let tool = fake_analyzer(
        &dir,
        "ffprobe",
        &format!(
            "printf '%s\\n' \"$@\" > '{}'\necho '{{\"streams\":[{{\"width\":720,\"height\":576}}]}}'",
            args_file.display()
        ),
    );

    let result = adapter(&tool).probe(&request("http://host/sd.ts", 5000)).await;
    assert!(result.success());
    assert_eq!(result.resolution(), "720x576");

    let args = std::fs::read_to_string(&args_file).unwrap();
    let args: Vec<&str> = args.lines().collect();
    assert_eq!(args.last(), Some(&"http://host/sd.ts"));
    let position = |flag: &str| args.iter().position(|a| *a == flag).unwrap();
    assert_eq!(args[position("-probesize") + 1], "256000");
    assert_eq!(args[position("-analyzeduration") + 1], "200000");
    assert_eq!(args[position("-select_streams") + 1], "v:0");
    assert_eq!(args[position("-of") + 1], "json");
}

#[cfg(unix)]
#[tokio::test]
async fn test_empty_and_garbage_output_mean_no_data() {
    let dir = TempDir::new().unwrap();
    let silent = fake_analyzer(&dir, "silent", "exit 1");
    let garbage = fake_analyzer(&dir, "garbage", "echo 'Connection refused'");

    let result = adapter(&silent).probe(&request("http://host/1.ts", 5000)).await;
    assert!(!result.success());
    assert_eq!(result.resolution(), sentinel::NO_DATA);

    let result = adapter(&garbage).probe(&request("http://host/1.ts", 5000)).await;
    assert!(!result.success());
    assert_eq!(result.resolution(), sentinel::NO_DATA);
}

#[cfg(unix)]
#[tokio::test]
async fn test_no_video_stream_is_unknown() {
    let dir = TempDir::new().unwrap();
    let tool = fake_analyzer(&dir, "ffprobe", "echo '{\"streams\":[],\"format\":{}}'");

    let result = adapter(&tool).probe(&request("http://host/radio.aac", 5000)).await;
    assert!(!result.success());
    assert_eq!(result.resolution(), sentinel::UNKNOWN);
}

#[cfg(unix)]
#[tokio::test]
async fn test_hung_analyzer_is_aborted_at_deadline() {
    let dir = TempDir::new().unwrap();
    let tool = fake_analyzer(&dir, "ffprobe", "exec sleep 30");

    let started = Instant::now();
    let result = adapter(&tool).probe(&request("http://host/stuck.ts", 300)).await;
    let elapsed = started.elapsed();

    assert!(result.is_aborted());
    assert_eq!(result.resolution(), sentinel::ABORTED);
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_secs(5), "probe took {:?}", elapsed);
}

#[cfg(unix)]
#[tokio::test]
async fn test_cancellation_stops_the_analyzer() {
    let dir = TempDir::new().unwrap();
    let tool = fake_analyzer(&dir, "ffprobe", "exec sleep 30");
    let adapter = adapter(&tool);

    let token = CancellationToken::new();
    let request = request("http://host/stuck.ts", 30_000).with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    });

    let started = Instant::now();
    let result = adapter.probe(&request).await;
    canceller.await.unwrap();

    assert!(result.is_aborted());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[cfg(unix)]
#[tokio::test]
async fn test_already_cancelled_request_never_launches() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("launched");
    let tool = fake_analyzer(&dir, "ffprobe", &format!("touch '{}'", marker.display()));

    let token = CancellationToken::new();
    token.cancel();
    let result = adapter(&tool)
        .probe(&request("http://host/1.ts", 5000).with_cancellation(token))
        .await;

    assert!(result.is_aborted());
    assert!(!marker.exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_engine_scans_through_real_processes() {
    let dir = TempDir::new().unwrap();
    let tool = fake_analyzer(&dir, "ffprobe", &format!("cat <<'EOF'\n{}\nEOF", HDR_OUTPUT));

    let mut config = EngineConfig::default();
    config.probe.cooldown_ms = 0;
    let container = EngineContainer::with_prober(Arc::new(adapter(&tool)), &config);

    let urls = ["http://host/a.ts", "http://host/b.ts", "http://host/c.ts", "http://host/d.ts"];
    let mut batch = container.scheduler().submit(urls);
    let mut count = 0;
    while let Some(update) = batch.recv().await {
        assert_eq!(update.health, HealthStatus::OnlineStable);
        assert!(update.badge().is_hdr);
        count += 1;
    }
    let summary = batch.join().await;

    assert_eq!(count, 4);
    assert_eq!(summary.probed, 4);
    assert_eq!(container.cache().len(), 4);
    assert_eq!(container.cache().physical_probes(), 4);
}

// CLI

#[test]
fn test_cli_config_reflects_environment() {
    let dir = TempDir::new().unwrap();
    let output = cli(&dir)
        .env("IPTV_PROBE_TIMEOUT_MS", "1234")
        .args(["config", "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let config: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(config["probe"]["timeout_ms"], 1234);
    assert_eq!(config["probe"]["max_concurrency"], 3);
}

#[test]
fn test_cli_reads_config_file_from_workdir() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("iptv-probe.toml"),
        "[probe]\nmax_concurrency = 7\n\n[logging]\nlevel = \"warn\"\n",
    )
    .unwrap();

    let output = cli(&dir)
        .arg("config")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).unwrap();

    assert!(text.contains("max_concurrency = 7"), "{}", text);
    assert!(text.contains("level = \"warn\""), "{}", text);
}

#[test]
fn test_cli_rejects_invalid_config_values() {
    let dir = TempDir::new().unwrap();
    cli(&dir)
        .env("IPTV_PROBE_MAX_CONCURRENCY", "lots")
        .arg("config")
        .assert()
        .failure();
}

#[test]
fn test_cli_probe_without_analyzer() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("bin").join("ffprobe");

    let output = cli(&dir)
        .arg("--ffprobe")
        .arg(&missing)
        .args(["--log-level", "error", "probe", "http://host/1.ts", "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let reports: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(reports[0]["url"], "http://host/1.ts");
    assert_eq!(reports[0]["health"], "Offline");
    assert_eq!(reports[0]["status_color"], "#FF0000");
    assert_eq!(reports[0]["badge"]["resolution"], sentinel::NO_FFPROBE);
}

#[test]
fn test_cli_scan_rejects_unknown_filter() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("list.m3u"), "#EXTM3U\nhttp://host/1.ts\n").unwrap();

    cli(&dir)
        .args(["scan", "list.m3u", "--filter", "sideways"])
        .assert()
        .failure();
}

#[cfg(unix)]
#[test]
fn test_cli_scan_playlist() {
    let dir = TempDir::new().unwrap();
    let tool = fake_analyzer(&dir, "ffprobe", &format!("cat <<'EOF'\n{}\nEOF", HDR_OUTPUT));
    std::fs::write(
        dir.path().join("list.m3u"),
        "#EXTM3U\n\
         #EXTINF:-1 group-title=\"Movies\",Cinema UHD\n\
         http://host/cinema.ts\n\
         #EXTINF:-1,Nature 4K\n\
         http://host/nature.ts\n",
    )
    .unwrap();

    let output = cli(&dir)
        .arg("--ffprobe")
        .arg(&tool)
        .env("IPTV_PROBE_COOLDOWN_MS", "0")
        .args(["--log-level", "error", "scan", "list.m3u", "--filter", "hdr", "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&output).unwrap();
    let channels = report["channels"].as_array().unwrap();
    assert_eq!(channels.len(), 2);
    assert!(channels.iter().all(|c| c["health"] == "Online-Stable"));
    assert!(channels
        .iter()
        .any(|c| c["name"] == "Cinema UHD" && c["group"] == "Movies"));
    assert_eq!(report["summary"]["probed"], 2);
}
