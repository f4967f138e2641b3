// Probe scheduler - Bounded bulk probing with batch-wide cancellation

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::probe_cache::ProbeCache;
use crate::domain::model::*;

/// Scheduler tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Analyzer processes allowed at once, across all batches
    pub max_concurrency: usize,
    /// Pause after each real probe before the permit is released
    pub cooldown: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            cooldown: Duration::from_millis(250),
        }
    }
}

/// Counters reported when a batch finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Distinct, non-empty URLs accepted
    pub submitted: usize,
    /// Resolved through the cache's probe path
    pub probed: usize,
    /// Answered straight from the cache
    pub cache_hits: usize,
    /// Never started because the batch was cancelled first
    pub dropped: usize,
    /// Started, then cancelled mid-probe
    pub cancelled: usize,
}

/// How a single worker ended
enum WorkerOutcome {
    Probed,
    CacheHit,
    Dropped,
    Cancelled,
}

/// Handle to a submitted batch
pub struct ProbeBatch {
    updates: mpsc::UnboundedReceiver<ProbeUpdate>,
    token: CancellationToken,
    driver: JoinHandle<BatchSummary>,
}

impl ProbeBatch {
    /// Next completed probe, in completion order. `None` once every URL has
    /// been resolved or dropped.
    pub async fn recv(&mut self) -> Option<ProbeUpdate> {
        self.updates.recv().await
    }

    /// Abandon the batch: queued URLs are dropped, running probes aborted
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for the batch to finish and return its counters
    pub async fn join(self) -> BatchSummary {
        let ProbeBatch { updates, driver, .. } = self;
        // Nobody is listening any more; workers ignore send failures
        drop(updates);
        match driver.await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "Batch driver failed");
                BatchSummary::default()
            }
        }
    }
}

/// Bounded-concurrency front end to a `ProbeCache`
pub struct ProbeScheduler {
    cache: ProbeCache,
    permits: Arc<Semaphore>,
    cooldown: Duration,
    current: Mutex<Option<CancellationToken>>,
}

impl ProbeScheduler {
    pub fn new(cache: ProbeCache, settings: SchedulerSettings) -> Self {
        let max_concurrency = settings.max_concurrency.max(1);
        Self {
            cache,
            permits: Arc::new(Semaphore::new(max_concurrency)),
            cooldown: settings.cooldown,
            current: Mutex::new(None),
        }
    }

    pub fn cache(&self) -> &ProbeCache {
        &self.cache
    }

    /// Submit a batch that supersedes (cancels) the previous one
    pub fn submit<I, S>(&self, urls: I) -> ProbeBatch
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let token = CancellationToken::new();
        if let Some(previous) = self.current.lock().replace(token.clone()) {
            if !previous.is_cancelled() {
                debug!("Superseding previous probe batch");
                previous.cancel();
            }
        }
        self.spawn_batch(urls, token)
    }

    /// Submit a batch that runs alongside any others
    pub fn submit_concurrent<I, S>(&self, urls: I) -> ProbeBatch
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.spawn_batch(urls, CancellationToken::new())
    }

    /// Cancel the batch most recently started with `submit`
    pub fn cancel_current(&self) {
        if let Some(token) = self.current.lock().take() {
            token.cancel();
        }
    }

    fn spawn_batch<I, S>(&self, urls: I, token: CancellationToken) -> ProbeBatch
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let urls: Vec<String> = urls
            .into_iter()
            .filter_map(|url| normalize_url(url.as_ref()))
            .filter(|url| seen.insert(url.clone()))
            .collect();

        info!(count = urls.len(), "Submitting probe batch");

        let (tx, rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(drive(
            self.cache.clone(),
            Arc::clone(&self.permits),
            self.cooldown,
            urls,
            token.clone(),
            tx,
        ));

        ProbeBatch {
            updates: rx,
            token,
            driver,
        }
    }
}

/// Hand out permits in submission order and collect worker outcomes
async fn drive(
    cache: ProbeCache,
    permits: Arc<Semaphore>,
    cooldown: Duration,
    urls: Vec<String>,
    token: CancellationToken,
    tx: mpsc::UnboundedSender<ProbeUpdate>,
) -> BatchSummary {
    let mut summary = BatchSummary {
        submitted: urls.len(),
        ..Default::default()
    };
    let mut workers = JoinSet::new();
    let mut queue = urls.into_iter();

    while let Some(url) = queue.next() {
        let permit = tokio::select! {
            biased;
            _ = token.cancelled() => {
                summary.dropped += 1 + queue.len();
                break;
            }
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    summary.dropped += 1 + queue.len();
                    break;
                }
            },
        };

        workers.spawn(run_worker(
            cache.clone(),
            url,
            permit,
            cooldown,
            token.clone(),
            tx.clone(),
        ));
    }
    drop(tx);

    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(WorkerOutcome::Probed) => summary.probed += 1,
            Ok(WorkerOutcome::CacheHit) => summary.cache_hits += 1,
            Ok(WorkerOutcome::Dropped) => summary.dropped += 1,
            Ok(WorkerOutcome::Cancelled) => summary.cancelled += 1,
            Err(e) => warn!(error = %e, "Probe worker failed"),
        }
    }

    info!(
        submitted = summary.submitted,
        probed = summary.probed,
        cache_hits = summary.cache_hits,
        dropped = summary.dropped,
        cancelled = summary.cancelled,
        "Probe batch finished"
    );
    summary
}

async fn run_worker(
    cache: ProbeCache,
    url: String,
    _permit: OwnedSemaphorePermit,
    cooldown: Duration,
    token: CancellationToken,
    tx: mpsc::UnboundedSender<ProbeUpdate>,
) -> WorkerOutcome {
    if token.is_cancelled() {
        return WorkerOutcome::Dropped;
    }

    if let Some(cached) = cache.peek(&url) {
        let _ = tx.send(ProbeUpdate::new(url, cached, true));
        return WorkerOutcome::CacheHit;
    }

    let result = cache.get_or_probe(&url, &token).await;
    if token.is_cancelled() && result.is_aborted() {
        debug!(url = %url, "Probe abandoned with its batch");
        return WorkerOutcome::Cancelled;
    }

    let _ = tx.send(ProbeUpdate::new(url, result, false));

    if !cooldown.is_zero() {
        tokio::select! {
            _ = tokio::time::sleep(cooldown) => {}
            _ = token.cancelled() => {}
        }
    }

    WorkerOutcome::Probed
}
