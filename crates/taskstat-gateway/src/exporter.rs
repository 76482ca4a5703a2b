//! Mirrors a `TaskTracker` into a `{service, name}` gauge.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use taskstat_core::error::Result;
use taskstat_core::TaskTracker;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::obs::{GaugeVec, MetricsRegistry};

pub const DEFAULT_METRIC_NAME: &str = "task_count";
const METRIC_HELP: &str = "Number of tasks running";

const LABEL_SERVICE: &str = "service";
const LABEL_NAME: &str = "name";

pub struct TaskStats {
    tracker: Arc<TaskTracker>,
    gauge: Arc<GaugeVec>,
    // Held across snapshot -> set -> retain.
    sync_lock: Mutex<()>,
}

impl TaskStats {
    /// Register the `task_count` gauge in `registry` and bind it to `tracker`.
    pub fn new(tracker: Arc<TaskTracker>, registry: &MetricsRegistry) -> Result<Self> {
        Self::with_metric_name(tracker, registry, DEFAULT_METRIC_NAME)
    }

    pub fn with_metric_name(
        tracker: Arc<TaskTracker>,
        registry: &MetricsRegistry,
        metric_name: &str,
    ) -> Result<Self> {
        let gauge = Arc::new(GaugeVec::new());
        registry.register(metric_name, METRIC_HELP, gauge.clone())?;
        Ok(Self {
            tracker,
            gauge,
            sync_lock: Mutex::new(()),
        })
    }

    pub fn tracker(&self) -> &Arc<TaskTracker> {
        &self.tracker
    }

    pub fn gauge(&self) -> &GaugeVec {
        &self.gauge
    }

    /// Copy the tracker's current counts into the gauge.
    ///
    /// Values are overwritten, never accumulated. Series for names that are
    /// no longer tracked (see `TaskTracker::prune_idle`) are dropped, so after
    /// a sync the gauge holds exactly one series per tracked name.
    ///
    /// Concurrent syncs run one at a time; the last one to finish always
    /// publishes the newest snapshot.
    pub fn sync_to_gauge(&self) {
        let _sync = self.sync_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot: HashMap<String, u64> = self.tracker.snapshot();
        let service = self.tracker.service_name();

        for (name, count) in &snapshot {
            let v = i64::try_from(*count).unwrap_or(i64::MAX);
            self.gauge.set(&[(LABEL_SERVICE, service), (LABEL_NAME, name)], v);
        }

        self.gauge.retain(|labels| {
            labels
                .iter()
                .any(|(k, v)| k == LABEL_NAME && snapshot.contains_key(v))
        });

        tracing::trace!(service = %service, series = snapshot.len(), "task gauge synced");
    }

    /// Run `sync_to_gauge` every `every` until the returned handle is aborted.
    pub fn spawn_periodic_sync(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let stats = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                stats.sync_to_gauge();
            }
        })
    }
}
