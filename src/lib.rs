//! # Lead Enrich Core Library
//!
//! This crate enriches lists of business leads through paid lookup services
//! (website contact scrapers, decision-maker email finders, a decision-maker
//! discovery waterfall) without re-paying for work an interrupted run already
//! finished.
//!
//! It is designed to be used either directly as a library or via the `lead-enrich`
//! command-line tool (which uses this library).

pub mod adapters;
pub mod core;
pub mod lookup;
mod utils;

pub use crate::adapters::{build_lookup, Credentials};
pub use crate::core::config::{Config, ConfigBuilder, ConfigFile};
pub use crate::core::error::{AppError, Result};
pub use crate::core::io::{InputSource, JsonFileSink, JsonFileSource, OutputSink, VecSink, VecSource};
pub use crate::core::kind::EnrichmentKind;
pub use crate::core::models::{FailureKind, Fields, Identity, LookupResult, Record, RunSummary, WorkUnit};
pub use crate::core::pipeline::{AutoConfirm, ConfirmationGate, Pipeline, PipelineOptions, RunOutcome, RunReport};
pub use crate::core::scheduler::CompletionObserver;
pub use crate::lookup::Lookup;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Builds the lookup stack for `kind`. Fails before any paid call when a
/// credential is missing.
pub fn initialize_lookup(kind: EnrichmentKind, config: &Config, credentials: &Credentials) -> Result<Arc<dyn Lookup>> {
    build_lookup(kind, config, credentials)
}

/// Enriches an in-memory collection without asking for confirmation.
///
/// `source_id` names the collection for checkpointing: calling again with the
/// same id after an interruption resumes where the first call stopped.
///
/// # Returns
/// * The enriched records in input order, and the run report.
pub async fn enrich_records(
    config: &Config,
    kind: EnrichmentKind,
    lookup: Arc<dyn Lookup>,
    source_id: &str,
    records: Vec<Record>,
    cancel: &CancellationToken,
) -> Result<(Vec<Record>, RunReport)> {
    let source = VecSource::new(format!("memory:{}", source_id), records);
    let sink = VecSink::new(format!("memory:{}:output", source_id));
    let pipeline = Pipeline::new(PipelineOptions::from_config(config, kind), lookup);

    let report = pipeline.run(&source, &sink, &AutoConfirm, cancel).await?;
    tracing::info!(
        "Enrichment of '{}' finished: {:?} ({} lookups this run)",
        source_id,
        report.outcome,
        report.lookups_this_run
    );
    Ok((sink.take(), report))
}
