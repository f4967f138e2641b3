// Application layer - Cache, scheduler and engine wiring

pub mod container;
pub mod probe_cache;
pub mod scheduler;

pub use container::EngineContainer;
pub use probe_cache::{CacheEvent, ProbeCache};
pub use scheduler::{BatchSummary, ProbeBatch, ProbeScheduler, SchedulerSettings};
