// Ports - Interface definitions (contracts)

use async_trait::async_trait;

use crate::domain::model::*;

/// Port for out-of-process stream inspection.
///
/// Implementations never fail: every failure mode is folded into a
/// `ProbeResult` with `success == false` and a sentinel. They must honor
/// `request.timeout` and `request.cancellation`, and must not leave an
/// analyzer process running once they return.
#[async_trait]
pub trait ProbePort: Send + Sync {
    /// Probe one stream URL
    async fn probe(&self, request: &ProbeRequest) -> ProbeResult;

    /// Whether the backing analyzer is usable at all
    fn is_available(&self) -> bool;

    /// Short name for logs
    fn name(&self) -> &str;
}
