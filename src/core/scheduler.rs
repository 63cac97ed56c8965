//! Bounded worker pool driving lookups and feeding the checkpoint.

use crate::core::checkpoint::CheckpointManager;
use crate::core::models::{Identity, LookupResult, RunSummary, WorkUnit};
use crate::lookup::Lookup;

use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Called on the driver task after each completion is recorded.
pub type CompletionObserver = Arc<dyn Fn(&Identity, &LookupResult) + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleReport {
    pub dispatched: usize,
    /// True when cancellation or a checkpoint failure left units undispatched.
    pub interrupted: bool,
    /// Outcome counts for lookups run in this pass.
    pub outcomes: RunSummary,
    /// Set when the final flush failed; completed results exist only in memory.
    pub checkpoint_error: Option<String>,
}

pub struct Scheduler {
    max_concurrency: usize,
    observer: Option<CompletionObserver>,
}

fn spawn_unit(
    lookup: Arc<dyn Lookup>,
    unit: WorkUnit,
) -> impl Future<Output = (Identity, LookupResult)> {
    let identity = unit.identity.clone();
    let label = unit.label();
    let handle = tokio::spawn(async move { lookup.lookup(&unit).await });
    async move {
        match handle.await {
            Ok(result) => (identity, result),
            Err(e) => {
                tracing::error!(target: "scheduler", "[{}] Worker crashed: {}", label, e);
                (identity, LookupResult::permanent(format!("worker crashed: {}", e)))
            }
        }
    }
}

impl Scheduler {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: CompletionObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Runs `units` with at most `max_concurrency` lookups in flight.
    ///
    /// Each completion is recorded in `checkpoint`; when a flush is due it
    /// happens before any further unit is dispatched. Once `cancel` fires or
    /// a flush fails no new unit starts, in-flight ones finish, and a final
    /// flush captures everything completed.
    pub async fn run(
        &self,
        units: Vec<WorkUnit>,
        lookup: Arc<dyn Lookup>,
        checkpoint: &CheckpointManager,
        cancel: &CancellationToken,
    ) -> ScheduleReport {
        let total = units.len();
        let mut queue = units.into_iter();
        let mut in_flight = FuturesUnordered::new();
        let mut report = ScheduleReport::default();
        let mut flush_failed = false;

        tracing::info!(target: "scheduler",
            "Dispatching {} lookups (concurrency {})", total, self.max_concurrency);

        loop {
            while in_flight.len() < self.max_concurrency && !cancel.is_cancelled() && !flush_failed {
                let Some(unit) = queue.next() else {
                    break;
                };
                tracing::debug!(target: "scheduler", "[{}] Dispatching", unit.label());
                in_flight.push(spawn_unit(Arc::clone(&lookup), unit));
                report.dispatched += 1;
            }

            let Some((identity, result)) = in_flight.next().await else {
                break;
            };

            if let LookupResult::Failed { kind, detail } = &result {
                tracing::warn!(target: "scheduler", "[{}] Lookup failed ({}): {}", identity, kind, detail);
            }
            report.outcomes.record_outcome(&result);
            if let Some(ref observer) = self.observer {
                observer(&identity, &result);
            }

            if checkpoint.record(identity, result) && !flush_failed {
                if let Err(e) = checkpoint.flush() {
                    tracing::error!(target: "scheduler",
                        "Checkpoint flush failed; no further lookups will start: {}", e);
                    flush_failed = true;
                }
            }
        }

        report.interrupted = report.dispatched < total;
        if report.interrupted {
            tracing::warn!(target: "scheduler",
                "Interrupted: {} of {} lookups dispatched; flushing checkpoint.", report.dispatched, total);
        }
        if let Err(e) = checkpoint.flush() {
            tracing::error!(target: "scheduler", "Final checkpoint flush failed: {}", e);
            report.checkpoint_error = Some(e.to_string());
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::FailureKind;
    use crate::core::testing::{units_for, ConcurrencyGauge, EchoLookup, PanicOn};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn checkpoint(dir: &TempDir, every: usize) -> CheckpointManager {
        CheckpointManager::new(dir.path().join("cp.json"), every)
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_never_exceeds_limit() {
        let dir = TempDir::new().unwrap();
        let cp = checkpoint(&dir, 5);
        let gauge = Arc::new(ConcurrencyGauge::new());
        let report = Scheduler::new(3)
            .run(units_for(20), gauge.clone(), &cp, &CancellationToken::new())
            .await;

        assert_eq!(report.dispatched, 20);
        assert_eq!(report.outcomes.succeeded, 20);
        assert!(gauge.max_in_flight() <= 3, "max in flight {}", gauge.max_in_flight());
        assert_eq!(gauge.max_in_flight(), 3);
        assert_eq!(cp.completed_ids().len(), 20);
    }

    #[tokio::test]
    async fn test_results_are_attributed_to_their_identity() {
        let dir = TempDir::new().unwrap();
        let cp = checkpoint(&dir, 4);
        Scheduler::new(4)
            .run(units_for(12), Arc::new(EchoLookup::default()), &cp, &CancellationToken::new())
            .await;

        for (id, result) in cp.results() {
            let LookupResult::Success { fields } = result else {
                panic!("expected success for {}", id);
            };
            assert_eq!(fields["echo_identity"], serde_json::json!(id.as_str()));
        }
    }

    #[tokio::test]
    async fn test_worker_panic_is_isolated() {
        let dir = TempDir::new().unwrap();
        let cp = checkpoint(&dir, 10);
        let units = units_for(5);
        let doomed = units[2].identity.clone();
        let report = Scheduler::new(2)
            .run(units, Arc::new(PanicOn(doomed.clone())), &cp, &CancellationToken::new())
            .await;

        assert_eq!(report.outcomes.succeeded, 4);
        assert_eq!(report.outcomes.failed, 1);
        let results = cp.results();
        assert!(matches!(
            results.get(&doomed),
            Some(LookupResult::Failed { kind: FailureKind::Permanent, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_dispatch_and_flushes() {
        let dir = TempDir::new().unwrap();
        let cp = checkpoint(&dir, 100);
        let cancel = CancellationToken::new();
        let gauge = Arc::new(ConcurrencyGauge::new().cancel_on_first_call(cancel.clone()));

        let report = Scheduler::new(2)
            .run(units_for(10), gauge.clone(), &cp, &cancel)
            .await;

        assert!(report.interrupted);
        assert_eq!(report.dispatched, 2);
        assert_eq!(gauge.calls(), 2);
        let on_disk = cp.load().unwrap().unwrap();
        assert_eq!(on_disk.completed_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_flush_cadence_and_observer() {
        let dir = TempDir::new().unwrap();
        let cp = checkpoint(&dir, 3);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        Scheduler::new(1)
            .with_observer(Arc::new(move |_, _| {
                seen_clone.fetch_add(1, Ordering::SeqCst);
            }))
            .run(units_for(7), Arc::new(EchoLookup::default()), &cp, &CancellationToken::new())
            .await;

        assert_eq!(seen.load(Ordering::SeqCst), 7);
        // Flushes after 3 and 6 completions plus the final one.
        assert_eq!(cp.load().unwrap().unwrap().cursor.flush_count, 3);
    }

    #[tokio::test]
    async fn test_failed_flush_stops_dispatch() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "").unwrap();
        let cp = CheckpointManager::new(blocker.join("cp.json"), 2);
        let echo = Arc::new(EchoLookup::default());

        let report = Scheduler::new(1)
            .run(units_for(10), echo.clone(), &cp, &CancellationToken::new())
            .await;

        assert_eq!(report.dispatched, 2);
        assert_eq!(echo.calls(), 2);
        assert!(report.interrupted);
        assert!(report.checkpoint_error.is_some());
        assert_eq!(cp.results().len(), 2);
    }
}
