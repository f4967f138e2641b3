// Probe cache - Per-URL memoization with in-flight collapsing

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::errors::ProbeFailure;
use crate::domain::model::*;
use crate::ports::ProbePort;

/// A probe other callers can join
type PendingProbe = Shared<BoxFuture<'static, ProbeResult>>;

/// One running probe and the callers waiting on it
struct InFlight {
    id: u64,
    pending: PendingProbe,
    /// Owned by the cache, cancelled only when the last waiter leaves
    token: CancellationToken,
    waiters: usize,
}

/// Outcome of looking a URL up before waiting
enum Lookup {
    Cached(ProbeResult),
    Waiting(PendingProbe, Waiter),
}

/// A caller's registration on an in-flight probe; leaves on drop
struct Waiter {
    inner: Arc<CacheInner>,
    url: String,
    id: u64,
}

impl Drop for Waiter {
    fn drop(&mut self) {
        self.inner.leave(&self.url, self.id);
    }
}

/// Notifications for presentation layers holding badges
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// Every entry was dropped
    Cleared,
    /// One entry was dropped
    Removed { url: String },
    /// Entries outside a valid URL set were dropped
    Pruned { count: usize },
}

struct CacheInner {
    prober: Arc<dyn ProbePort>,
    timeout: Duration,
    entries: RwLock<HashMap<String, ProbeResult>>,
    in_flight: Mutex<HashMap<String, InFlight>>,
    next_id: AtomicU64,
    physical_probes: AtomicUsize,
    events: broadcast::Sender<CacheEvent>,
}

/// Probe result cache.
///
/// Cloning is cheap and every clone shares the same entries. At most one
/// probe per URL runs at a time: later callers for a URL that is already
/// being probed wait for that probe instead of starting another. Failed
/// probes are cached too, so a dead channel is not hammered again until the
/// entry is cleared or removed.
#[derive(Clone)]
pub struct ProbeCache {
    inner: Arc<CacheInner>,
}

impl ProbeCache {
    pub fn new(prober: Arc<dyn ProbePort>, timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(CacheInner {
                prober,
                timeout,
                entries: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                physical_probes: AtomicUsize::new(0),
                events,
            }),
        }
    }

    /// Per-probe deadline handed to the analyzer
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Return the cached result for `url`, probing it if needed.
    ///
    /// `cancellation` applies to this caller only: cancelling it abandons
    /// the wait and returns `Aborted`. The shared probe keeps running while
    /// any other caller still waits on it, and is cancelled once none do.
    pub async fn get_or_probe(&self, url: &str, cancellation: &CancellationToken) -> ProbeResult {
        let Some(key) = normalize_url(url) else {
            return ProbeResult::failed(&ProbeFailure::UnexpectedFailure("empty url".to_string()));
        };

        if let Some(cached) = self.peek(&key) {
            return cached;
        }
        if cancellation.is_cancelled() {
            return ProbeResult::aborted();
        }

        let (pending, _waiter) = match self.join_or_start(key) {
            Lookup::Cached(result) => return result,
            Lookup::Waiting(pending, waiter) => (pending, waiter),
        };

        tokio::select! {
            result = pending => result,
            _ = cancellation.cancelled() => ProbeResult::aborted(),
        }
    }

    /// Drop any cached entry for `url` and probe it again
    pub async fn refresh(&self, url: &str, cancellation: &CancellationToken) -> ProbeResult {
        if let Some(key) = normalize_url(url) {
            self.inner.entries.write().remove(&key);
        }
        self.get_or_probe(url, cancellation).await
    }

    /// Cached result without probing
    pub fn peek(&self, url: &str) -> Option<ProbeResult> {
        let key = normalize_url(url)?;
        self.inner.entries.read().get(&key).cloned()
    }

    /// Atomically drop every entry. In-flight probes are left running and
    /// repopulate the cache when they finish.
    pub fn clear(&self) {
        let removed = {
            let mut entries = self.inner.entries.write();
            let removed = entries.len();
            entries.clear();
            removed
        };
        info!(removed, "Probe cache cleared");
        let _ = self.inner.events.send(CacheEvent::Cleared);
    }

    /// Drop one entry; returns whether it existed
    pub fn remove(&self, url: &str) -> bool {
        let Some(key) = normalize_url(url) else {
            return false;
        };
        let existed = self.inner.entries.write().remove(&key).is_some();
        if existed {
            let _ = self.inner.events.send(CacheEvent::Removed { url: key });
        }
        existed
    }

    /// Drop entries whose URL is not in `valid_urls`; returns how many
    pub fn prune(&self, valid_urls: &HashSet<String>) -> usize {
        let valid: HashSet<String> = valid_urls
            .iter()
            .filter_map(|url| normalize_url(url))
            .collect();

        let count = {
            let mut entries = self.inner.entries.write();
            let before = entries.len();
            entries.retain(|url, _| valid.contains(url));
            before - entries.len()
        };

        if count > 0 {
            info!(count, "Pruned orphaned probe results");
            let _ = self.inner.events.send(CacheEvent::Pruned { count });
        }
        count
    }

    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    /// URLs currently being probed
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.lock().len()
    }

    /// Analyzer invocations started through this cache
    pub fn physical_probes(&self) -> usize {
        self.inner.physical_probes.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    /// Whether the analyzer behind this cache can run at all
    pub fn prober_available(&self) -> bool {
        self.inner.prober.is_available()
    }

    /// Join the pending probe for `key`, or register and spawn a new one.
    ///
    /// The in-flight lock is held across the cache re-check so a probe that
    /// finishes between `peek` and here is not started twice.
    fn join_or_start(&self, key: String) -> Lookup {
        let mut in_flight = self.inner.in_flight.lock();

        if let Some(entry) = in_flight.get_mut(&key) {
            debug!(url = %key, waiters = entry.waiters + 1, "Joining in-flight probe");
            entry.waiters += 1;
            let waiter = Waiter {
                inner: Arc::clone(&self.inner),
                url: key,
                id: entry.id,
            };
            return Lookup::Waiting(entry.pending.clone(), waiter);
        }

        if let Some(cached) = self.inner.entries.read().get(&key).cloned() {
            return Lookup::Cached(cached);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let request = ProbeRequest::new(key.clone())
            .with_timeout(self.inner.timeout)
            .with_cancellation(token.clone());

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.run_probe(request, id).await });

        let weak: Weak<CacheInner> = Arc::downgrade(&self.inner);
        let url = key.clone();
        let pending = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(url = %url, error = %e, "Probe task failed");
                    // run_probe never reached its unregister step
                    if let Some(inner) = weak.upgrade() {
                        inner.unregister(&mut inner.in_flight.lock(), &url, id);
                    }
                    ProbeResult::failed(&ProbeFailure::UnexpectedFailure(e.to_string()))
                }
            }
        }
        .boxed()
        .shared();

        in_flight.insert(
            key.clone(),
            InFlight {
                id,
                pending: pending.clone(),
                token,
                waiters: 1,
            },
        );

        let waiter = Waiter {
            inner: Arc::clone(&self.inner),
            url: key,
            id,
        };
        Lookup::Waiting(pending, waiter)
    }
}

impl CacheInner {
    /// Run one physical probe and publish its result
    async fn run_probe(&self, request: ProbeRequest, id: u64) -> ProbeResult {
        self.physical_probes.fetch_add(1, Ordering::SeqCst);
        let result = self.prober.probe(&request).await;

        // Store and unregister under the in-flight lock so no caller sees
        // the URL missing from both maps.
        let mut in_flight = self.in_flight.lock();
        if request.cancellation.is_cancelled() && result.is_aborted() {
            // Every waiter left; says nothing about the stream
            debug!(url = %request.url, "Probe cancelled; result not cached");
        } else {
            self.entries.write().insert(request.url.clone(), result.clone());
        }
        self.unregister(&mut in_flight, &request.url, id);

        result
    }

    /// Drop the in-flight entry for `url` if it is still probe `id`
    fn unregister(&self, in_flight: &mut HashMap<String, InFlight>, url: &str, id: u64) {
        if in_flight.get(url).is_some_and(|entry| entry.id == id) {
            in_flight.remove(url);
        }
    }

    /// One waiter on probe `id` is gone; the last one out cancels it
    fn leave(&self, url: &str, id: u64) {
        let mut in_flight = self.in_flight.lock();
        let Some(entry) = in_flight.get_mut(url) else {
            return;
        };
        if entry.id != id {
            return;
        }

        entry.waiters = entry.waiters.saturating_sub(1);
        if entry.waiters == 0 {
            debug!(url, "No callers left; cancelling probe");
            entry.token.cancel();
            in_flight.remove(url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedProbe {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProbePort for FixedProbe {
        async fn probe(&self, request: &ProbeRequest) -> ProbeResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.url.contains("dead") {
                ProbeResult::failed(&ProbeFailure::EmptyOutput)
            } else {
                ProbeResult::online("1280x720", "25 fps", "H.264", 2_000_000, false)
            }
        }

        fn is_available(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn cache() -> (ProbeCache, Arc<FixedProbe>) {
        let probe = Arc::new(FixedProbe {
            calls: AtomicUsize::new(0),
        });
        let cache = ProbeCache::new(probe.clone(), Duration::from_secs(5));
        (cache, probe)
    }

    #[tokio::test]
    async fn test_empty_url_is_not_probed_or_cached() {
        let (cache, probe) = cache();
        let result = cache.get_or_probe("   ", &CancellationToken::new()).await;
        assert!(!result.success());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_second_lookup_hits_cache() {
        let (cache, probe) = cache();
        let token = CancellationToken::new();
        let first = cache.get_or_probe("http://host/1.ts", &token).await;
        let second = cache.get_or_probe(" http://host/1.ts ", &token).await;
        assert_eq!(first, second);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failures_are_cached() {
        let (cache, probe) = cache();
        let token = CancellationToken::new();
        let first = cache.get_or_probe("http://host/dead.ts", &token).await;
        assert_eq!(first.resolution(), "No Data");
        cache.get_or_probe("http://host/dead.ts", &token).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remove_and_prune_emit_events() {
        let (cache, _) = cache();
        let mut events = cache.subscribe();
        let token = CancellationToken::new();
        cache.get_or_probe("http://host/1.ts", &token).await;
        cache.get_or_probe("http://host/2.ts", &token).await;
        cache.get_or_probe("http://host/3.ts", &token).await;

        assert!(cache.remove("http://host/1.ts"));
        assert!(!cache.remove("http://host/1.ts"));
        assert_eq!(
            events.recv().await.unwrap(),
            CacheEvent::Removed {
                url: "http://host/1.ts".to_string()
            }
        );

        let valid: HashSet<String> = ["http://host/2.ts".to_string()].into_iter().collect();
        assert_eq!(cache.prune(&valid), 1);
        assert_eq!(events.recv().await.unwrap(), CacheEvent::Pruned { count: 1 });
        assert!(cache.peek("http://host/2.ts").is_some());
        assert!(cache.peek("http://host/3.ts").is_none());
    }

    #[tokio::test]
    async fn test_refresh_forces_new_probe() {
        let (cache, probe) = cache();
        let token = CancellationToken::new();
        cache.get_or_probe("http://host/1.ts", &token).await;
        cache.refresh("http://host/1.ts", &token).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 1);
    }

    /// Panics on its first call, then behaves
    struct CrashOnceProbe {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProbePort for CrashOnceProbe {
        async fn probe(&self, _request: &ProbeRequest) -> ProbeResult {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("analyzer adapter bug");
            }
            ProbeResult::online("1280x720", "25 fps", "H.264", 2_000_000, false)
        }

        fn is_available(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "crash-once"
        }
    }

    #[tokio::test]
    async fn test_panicking_adapter_does_not_wedge_the_url() {
        let probe = Arc::new(CrashOnceProbe {
            calls: AtomicUsize::new(0),
        });
        let cache = ProbeCache::new(probe.clone(), Duration::from_secs(5));
        let token = CancellationToken::new();

        let first = cache.get_or_probe("http://host/1.ts", &token).await;
        assert!(!first.success());
        assert_eq!(first.resolution(), sentinel::ERROR);
        assert_eq!(cache.in_flight(), 0);
        assert!(cache.peek("http://host/1.ts").is_none());

        let second = cache.get_or_probe("http://host/1.ts", &token).await;
        assert!(second.success());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancelled_caller_starts_nothing() {
        let (cache, probe) = cache();
        let token = CancellationToken::new();
        token.cancel();

        let result = cache.get_or_probe("http://host/1.ts", &token).await;
        assert!(result.is_aborted());
        assert_eq!(cache.in_flight(), 0);
        assert_eq!(cache.physical_probes(), 0);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }
}
