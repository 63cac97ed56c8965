//! End-to-end run of one enrichment kind over one input collection.
//!
//! Order of operations: destination check, load, checkpoint resume, plan,
//! confirmation, scheduling, merge, emit, checkpoint cleanup. Nothing that
//! costs money happens before the gate has confirmed the plan.

use crate::core::checkpoint::CheckpointManager;
use crate::core::config::Config;
use crate::core::eligibility::{build_plan, EligibilityPolicy, RunLimits};
use crate::core::error::{AppError, Result};
use crate::core::io::{ensure_distinct, InputSource, OutputSink};
use crate::core::kind::EnrichmentKind;
use crate::core::merge::{merge_all, MergePolicy};
use crate::core::models::{LookupResult, RunSummary};
use crate::core::record_store::RecordStore;
use crate::core::scheduler::{CompletionObserver, Scheduler};
use crate::lookup::Lookup;

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Asked once per run with the pre-run summary.
pub trait ConfirmationGate: Send + Sync {
    fn confirm(&self, summary: &RunSummary) -> bool;
}

/// Confirms every run. Used for `--yes`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

impl ConfirmationGate for AutoConfirm {
    fn confirm(&self, _summary: &RunSummary) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub kind: EnrichmentKind,
    pub policy: EligibilityPolicy,
    pub limits: RunLimits,
    pub merge: MergePolicy,
    pub max_concurrency: usize,
    pub checkpoint_dir: PathBuf,
    pub checkpoint_every: usize,
    pub key_field: String,
    /// Plan and report only.
    pub dry_run: bool,
    /// Discard any existing checkpoint instead of resuming it.
    pub fresh_start: bool,
    /// Attempt again identities whose recorded result is a failure.
    pub retry_failed: bool,
}

impl PipelineOptions {
    pub fn from_config(config: &Config, kind: EnrichmentKind) -> Self {
        Self {
            kind,
            policy: EligibilityPolicy {
                require_fields: config.require_fields.clone(),
                skip_if_missing_required: config.skip_if_missing_required,
                ..EligibilityPolicy::for_kind(kind, config.include_existing)
            },
            limits: RunLimits {
                skip_first: config.skip_first,
                max_leads: config.max_leads,
            },
            merge: MergePolicy {
                output_keys: kind.output_keys(),
                force: config.include_existing,
                uniform_columns: true,
            },
            max_concurrency: config.max_concurrency,
            checkpoint_dir: config.checkpoint_dir.clone(),
            checkpoint_every: config.checkpoint_every,
            key_field: config.key_field.clone(),
            dry_run: false,
            fresh_start: false,
            retry_failed: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every planned lookup finished; the checkpoint was removed.
    Completed,
    /// Stopped early; output was written and the checkpoint kept for resume.
    Interrupted,
    /// The gate declined; nothing was called or written.
    Declined,
    DryRun,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Outcome counts cover the whole logical run, resumed results included.
    pub summary: RunSummary,
    pub lookups_this_run: usize,
    pub duration: Duration,
    pub checkpoint_path: PathBuf,
}

pub struct Pipeline {
    options: PipelineOptions,
    lookup: Arc<dyn Lookup>,
    observer: Option<CompletionObserver>,
}

impl Pipeline {
    pub fn new(options: PipelineOptions, lookup: Arc<dyn Lookup>) -> Self {
        Self {
            options,
            lookup,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: CompletionObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    fn open_checkpoint(&self, source_id: &str) -> Result<CheckpointManager> {
        let opts = &self.options;
        let checkpoint = CheckpointManager::for_kind(&opts.checkpoint_dir, opts.kind, opts.checkpoint_every);

        if opts.fresh_start {
            if !opts.dry_run {
                checkpoint.delete()?;
            }
            tracing::info!(target: "pipeline", "Fresh start requested; ignoring any existing checkpoint.");
            return Ok(checkpoint);
        }

        match checkpoint.load()? {
            Some(state) if state.matches(opts.kind, source_id) => {
                tracing::info!(target: "pipeline",
                    "Resuming from checkpoint: {} lookups already completed.", state.completed_ids.len());
                checkpoint.resume(state);
            }
            Some(state) => {
                tracing::warn!(target: "pipeline",
                    "Checkpoint at {} belongs to a different run (source {:?}, kind {:?}); it will be replaced.",
                    checkpoint.path().display(), state.cursor.source_id, state.cursor.kind);
            }
            None => {}
        }

        if opts.retry_failed {
            let reopened = checkpoint.forget_failures();
            if reopened > 0 {
                tracing::info!(target: "pipeline", "Retrying {} previously failed lookups.", reopened);
            }
        }
        Ok(checkpoint)
    }

    /// Runs the pipeline. Per-record failures never surface as `Err`; only
    /// configuration, input, checkpoint and output problems do.
    pub async fn run(
        &self,
        source: &dyn InputSource,
        sink: &dyn OutputSink,
        gate: &dyn ConfirmationGate,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let start = Instant::now();
        let opts = &self.options;
        let source_id = source.source_id();
        ensure_distinct(&source_id, &sink.destination_id())?;

        let store = RecordStore::new(source_id.clone(), source.load()?, &opts.key_field);
        let checkpoint = self.open_checkpoint(&source_id)?;
        let plan = build_plan(
            &store,
            &opts.policy,
            &checkpoint.completed_ids(),
            opts.limits,
            opts.kind.cost_per_lookup(),
        );

        tracing::info!(target: "pipeline",
            "[{}] {} records: {} to process, {} already done ({} resumed), {} missing input, {} outside limits. Estimated cost: {:.0} credits.",
            opts.kind, plan.summary.total, plan.summary.eligible, plan.summary.skipped_already_done,
            plan.summary.resumed, plan.summary.skipped_missing_input, plan.summary.skipped_by_limit,
            plan.summary.estimated_cost);

        let report = |outcome, summary, lookups_this_run| RunReport {
            outcome,
            summary,
            lookups_this_run,
            duration: start.elapsed(),
            checkpoint_path: checkpoint.path().to_path_buf(),
        };

        if opts.dry_run {
            tracing::info!(target: "pipeline", "Dry run: no lookups performed.");
            return Ok(report(RunOutcome::DryRun, plan.summary, 0));
        }
        if !plan.units.is_empty() && !gate.confirm(&plan.summary) {
            tracing::info!(target: "pipeline", "Run declined; nothing was changed.");
            return Ok(report(RunOutcome::Declined, plan.summary, 0));
        }

        checkpoint.begin(opts.kind, &source_id, store.len())?;
        let mut scheduler = Scheduler::new(opts.max_concurrency);
        if let Some(ref observer) = self.observer {
            scheduler = scheduler.with_observer(Arc::clone(observer));
        }
        let schedule = scheduler
            .run(plan.units, Arc::clone(&self.lookup), &checkpoint, cancel)
            .await;

        let results = checkpoint.results();
        let output = merge_all(&store, &results, &opts.merge);
        sink.emit(&output)?;

        if let Some(detail) = schedule.checkpoint_error {
            return Err(AppError::Checkpoint(format!(
                "Could not save progress to {} ({}). Results of this run were written to {}.",
                checkpoint.path().display(),
                detail,
                sink.destination_id()
            )));
        }

        let mut summary = plan.summary;
        for result in results.values() {
            summary.record_outcome(result);
        }
        log_failures(&results);

        if schedule.interrupted {
            tracing::warn!(target: "pipeline",
                "Run interrupted. Progress kept in {}; run again to resume.", checkpoint.path().display());
            return Ok(report(RunOutcome::Interrupted, summary, schedule.dispatched));
        }
        checkpoint.delete()?;
        Ok(report(RunOutcome::Completed, summary, schedule.dispatched))
    }
}

fn log_failures(results: &std::collections::BTreeMap<crate::core::models::Identity, LookupResult>) {
    for (identity, result) in results {
        if let LookupResult::Failed { kind, detail } = result {
            tracing::debug!(target: "pipeline", "Failed lookup {} ({}): {}", identity, kind, detail);
        }
    }
}
