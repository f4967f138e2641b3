use std::sync::Arc;

use tracing::info;

use crate::adapters::toml_config::EngineConfig;
use crate::adapters::FfprobeAdapter;
use crate::app::probe_cache::ProbeCache;
use crate::app::scheduler::{ProbeScheduler, SchedulerSettings};
use crate::ports::ProbePort;

/// Explicitly wired engine: one analyzer adapter, one cache, one scheduler.
///
/// Each container owns an independent cache lifetime.
pub struct EngineContainer {
    prober: Arc<dyn ProbePort>,
    cache: ProbeCache,
    scheduler: Arc<ProbeScheduler>,
}

impl EngineContainer {
    /// Build the production engine from configuration
    pub fn new(config: &EngineConfig) -> Self {
        let prober = Arc::new(FfprobeAdapter::new(
            &config.probe.ffprobe_path,
            config.probe.analyzer_settings(),
        ));
        Self::with_prober(prober, config)
    }

    /// Build the engine around any probe implementation
    pub fn with_prober(prober: Arc<dyn ProbePort>, config: &EngineConfig) -> Self {
        info!(
            analyzer = prober.name(),
            available = prober.is_available(),
            timeout_ms = config.probe.timeout_ms,
            max_concurrency = config.probe.max_concurrency,
            "Initializing probe engine"
        );

        let cache = ProbeCache::new(Arc::clone(&prober), config.probe.timeout());
        let scheduler = Arc::new(ProbeScheduler::new(
            cache.clone(),
            SchedulerSettings {
                max_concurrency: config.probe.max_concurrency,
                cooldown: config.probe.cooldown(),
            },
        ));

        Self {
            prober,
            cache,
            scheduler,
        }
    }

    pub fn prober(&self) -> Arc<dyn ProbePort> {
        Arc::clone(&self.prober)
    }

    pub fn cache(&self) -> ProbeCache {
        self.cache.clone()
    }

    pub fn scheduler(&self) -> Arc<ProbeScheduler> {
        Arc::clone(&self.scheduler)
    }
}
