// Metrics hooks for the dispatch crate.
//
// Callers install a global `DispatchMetrics` implementation via
// [`set_dispatch_metrics`]; the worker then reports every attempt outcome and
// latency. This keeps instrumentation decoupled from any specific metrics
// backend — the `metrics` crate counters emitted alongside are for the
// Prometheus surface.
use std::sync::{Arc, RwLock};
use std::time::Duration;

use once_cell::sync::OnceCell;
use store::ForwardOutcome;

/// Metrics observer for delivery attempts.
pub trait DispatchMetrics: Send + Sync {
    /// Record one attempt: the scope it belongs to, its outcome, and the
    /// wall-clock time spent on the HTTP call (zero for skips).
    fn record_attempt(&self, scope: &str, outcome: ForwardOutcome, latency: Duration);
}

fn metrics_lock() -> &'static RwLock<Option<Arc<dyn DispatchMetrics>>> {
    static METRICS: OnceCell<RwLock<Option<Arc<dyn DispatchMetrics>>>> = OnceCell::new();
    METRICS.get_or_init(|| RwLock::new(None))
}

pub(crate) fn metrics_recorder() -> Option<Arc<dyn DispatchMetrics>> {
    let guard = metrics_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.clone()
}

/// Install or clear the global dispatch metrics recorder.
///
/// Typically called once during service startup so all dispatcher instances
/// share the same backend.
pub fn set_dispatch_metrics(recorder: Option<Arc<dyn DispatchMetrics>>) {
    let lock = metrics_lock();
    let mut guard = lock.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = recorder;
}
