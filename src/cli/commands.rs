//! Command implementations

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::adapters::toml_config::EngineConfig;
use crate::app::container::EngineContainer;
use crate::app::scheduler::{BatchSummary, ProbeBatch};
use crate::cli::args::{ConfigArgs, OutputFormat, ProbeArgs, ScanArgs};
use crate::domain::model::*;
use crate::domain::rules::present;
use crate::error::EngineResult;
use crate::utils::playlist::{read_playlist, PlaylistEntry};

/// One reported stream
#[derive(Debug, Clone, Serialize)]
pub struct StreamReport {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    pub url: String,
    pub health: HealthStatus,
    pub status_color: &'static str,
    pub tooltip: String,
    pub from_cache: bool,
    pub badge: StreamBadge,
}

impl StreamReport {
    fn from_update(update: &ProbeUpdate, entry: Option<&PlaylistEntry>) -> Self {
        let presentation = present(Some(&update.result));
        Self {
            name: entry
                .map(|e| e.name.clone())
                .unwrap_or_else(|| update.url.clone()),
            group: entry.map(|e| e.group.clone()),
            url: update.url.clone(),
            health: presentation.health,
            status_color: presentation.status_color,
            tooltip: presentation.tooltip,
            from_cache: update.from_cache,
            badge: update.badge(),
        }
    }

    fn text_line(&self) -> String {
        format!("{:<16} {}  [{}]", self.health.label(), self.name, self.tooltip)
    }
}

/// Document written for json/yaml scan output
#[derive(Debug, Serialize)]
struct ScanReport {
    channels: Vec<StreamReport>,
    summary: BatchSummary,
}

/// Cancel the batch on Ctrl-C
fn cancel_on_interrupt(batch: &ProbeBatch) {
    let token = batch.cancellation_token();
    tokio::spawn(async move {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if signal.is_ok() {
                    warn!("Interrupted, cancelling outstanding probes");
                    token.cancel();
                }
            }
            _ = token.cancelled() => {}
        }
    });
}

/// Per-entry health counts for the text summary of a scan
#[derive(Debug, Default)]
struct ScanTally {
    counts: HashMap<HealthStatus, usize>,
    resolved: usize,
}

impl ScanTally {
    fn record(&mut self, health: HealthStatus) {
        *self.counts.entry(health).or_default() += 1;
        self.resolved += 1;
    }

    fn count(&self, health: HealthStatus) -> usize {
        self.counts.get(&health).copied().unwrap_or(0)
    }

    /// Summary over `total` playlist entries; entries without a result are
    /// reported as not probed
    fn summary_line(&self, total: usize) -> String {
        format!(
            "{} channels: {} stable, {} unstable, {} offline, {} not probed",
            total,
            self.count(HealthStatus::OnlineStable),
            self.count(HealthStatus::OnlineUnstable),
            self.count(HealthStatus::Offline),
            total.saturating_sub(self.resolved),
        )
    }
}

/// Serialize `value` as a json or yaml document; text has no document form
pub fn render_document<T: Serialize>(value: &T, format: OutputFormat) -> EngineResult<Option<String>> {
    let document = match format {
        OutputFormat::Json => Some(serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => Some(serde_yaml::to_string(value)?),
        OutputFormat::Text => None,
    };
    Ok(document)
}

fn print_document<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    if let Some(document) = render_document(value, format)? {
        println!("{}", document.trim_end());
    }
    Ok(())
}

/// Execute the probe command
pub async fn probe(container: &EngineContainer, args: ProbeArgs) -> Result<()> {
    let urls: Vec<String> = args.urls.iter().filter_map(|u| normalize_url(u)).collect();
    if urls.is_empty() {
        return Err(anyhow::anyhow!("No non-empty stream URL given"));
    }
    if !container.prober().is_available() {
        warn!("ffprobe was not found; every probe will report \"{}\"", sentinel::NO_FFPROBE);
    }

    info!("Probing {} stream(s)", urls.len());

    let scheduler = container.scheduler();
    let mut batch = scheduler.submit(&urls);
    cancel_on_interrupt(&batch);

    let mut by_url: HashMap<String, StreamReport> = HashMap::new();
    while let Some(update) = batch.recv().await {
        by_url.insert(update.url.clone(), StreamReport::from_update(&update, None));
    }
    let summary = batch.join().await;

    // Report in the order given, skipping URLs the batch never resolved
    let mut reports = Vec::with_capacity(urls.len());
    for url in &urls {
        if let Some(report) = by_url.remove(url) {
            reports.push(report);
        }
    }

    match args.format {
        OutputFormat::Text => {
            for report in &reports {
                println!("{}", report.text_line());
            }
        }
        format => print_document(&reports, format)?,
    }

    info!(
        probed = summary.probed,
        cancelled = summary.cancelled + summary.dropped,
        "Probe command finished"
    );
    Ok(())
}

/// Execute the scan command
pub async fn scan(container: &EngineContainer, args: ScanArgs) -> Result<()> {
    let filter = args.filter;

    let entries = read_playlist(&args.playlist)
        .with_context(|| format!("Failed to read playlist {}", args.playlist.display()))?;
    info!("Loaded {} channels from {}", entries.len(), args.playlist.display());

    let mut channels: HashMap<String, Vec<&PlaylistEntry>> = HashMap::new();
    for entry in &entries {
        if let Some(url) = normalize_url(&entry.url) {
            channels.entry(url).or_default().push(entry);
        }
    }

    let scheduler = container.scheduler();
    let mut batch = scheduler.submit(entries.iter().map(|e| e.url.as_str()));
    cancel_on_interrupt(&batch);

    let mut reports = Vec::new();
    let mut tally = ScanTally::default();

    while let Some(update) = batch.recv().await {
        let Some(matching) = channels.get(&update.url) else {
            continue;
        };
        for &entry in matching {
            tally.record(update.health);
            if !filter.matches(Some(&update.result)) {
                continue;
            }
            let report = StreamReport::from_update(&update, Some(entry));
            if args.format == OutputFormat::Text {
                println!("{}", report.text_line());
            }
            reports.push(report);
        }
    }

    let summary = batch.join().await;

    match args.format {
        OutputFormat::Text => {
            println!("\n{}", tally.summary_line(entries.len()));
            info!(
                probed = summary.probed,
                cache_hits = summary.cache_hits,
                cancelled = summary.cancelled + summary.dropped,
                "Scan finished"
            );
        }
        format => print_document(
            &ScanReport {
                channels: reports,
                summary,
            },
            format,
        )?,
    }

    Ok(())
}

/// Execute the config command
pub fn show_config(config: &EngineConfig, container: &EngineContainer, args: ConfigArgs) -> Result<()> {
    match args.format {
        OutputFormat::Text => {
            print!("{}", config.to_toml_string()?);
            let analyzer = container.prober();
            println!(
                "\n# analyzer: {} ({})",
                analyzer.name(),
                if analyzer.is_available() { "available" } else { "not found" }
            );
        }
        format => print_document(config, format)?,
    }
    Ok(())
}
