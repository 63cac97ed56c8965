//! # Lead Enrich CLI
//!
//! Command-line interface for the Lead Enrich library (`lead_enrich_core`).
//! This binary parses arguments, sets up configuration, builds the lookup for the
//! selected enrichment kind, runs the resumable pipeline over a JSON file and
//! reports the outcome.

use lead_enrich_core::{
    initialize_lookup, CompletionObserver, ConfigBuilder, ConfirmationGate, Credentials, EnrichmentKind,
    Identity, JsonFileSink, JsonFileSource, LookupResult, Pipeline, PipelineOptions, RunOutcome, RunReport,
    RunSummary,
};

// Dependencies specific to the CLI binary
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter, FmtSubscriber};

/// Which enrichment to run.
#[derive(Copy, Clone, Debug, ValueEnum)]
enum KindArg {
    /// Emails, phones and social profiles from the company website
    Contacts,
    /// Decision maker name and title through the source waterfall
    DecisionMaker,
    /// Decision maker email by domain or company name
    DecisionMakerEmail,
    /// Live/dead status of the company website
    WebsiteCheck,
}

impl From<KindArg> for EnrichmentKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Contacts => EnrichmentKind::Contacts,
            KindArg::DecisionMaker => EnrichmentKind::DecisionMaker,
            KindArg::DecisionMakerEmail => EnrichmentKind::DecisionMakerEmail,
            KindArg::WebsiteCheck => EnrichmentKind::WebsiteCheck,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Enriches lead lists through paid lookup services.",
    long_about = "Lead Enrich runs rate-limited, retrying lookups over a JSON lead list, checkpoints progress so an interrupted run resumes without paying twice, and writes the enriched list to a separate file."
)]
struct AppArgs {
    /// Enrichment to run.
    #[arg(short, long, value_enum, default_value_t = KindArg::Contacts, env = "LEAD_ENRICH_KIND")]
    kind: KindArg,

    /// Path to the input JSON file (an array of leads, or an object with a `leads` array).
    #[arg(short, long, default_value = "leads.json", env = "LEAD_ENRICH_INPUT")]
    input: String,

    /// Path to the output JSON file. Must differ from the input.
    #[arg(short, long, default_value = "enriched.json", env = "LEAD_ENRICH_OUTPUT")]
    output: String,

    /// Path to a configuration file (TOML format) to load settings from. CLI args override file settings.
    #[arg(long, env = "LEAD_ENRICH_CONFIG")]
    config_file: Option<String>,

    /// Maximum number of lookups in flight.
    #[arg(short, long, env = "LEAD_ENRICH_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Ceiling on outbound requests per second across all workers.
    #[arg(long, env = "LEAD_ENRICH_RPS")]
    requests_per_second: Option<f64>,

    /// HTTP request timeout in seconds.
    #[arg(long, env = "LEAD_ENRICH_REQUEST_TIMEOUT")]
    request_timeout: Option<u64>,

    /// User agent string for outbound requests.
    #[arg(long, env = "LEAD_ENRICH_USER_AGENT")]
    user_agent: Option<String>,

    /// Total attempts per call, including the first.
    #[arg(long, env = "LEAD_ENRICH_MAX_ATTEMPTS")]
    max_attempts: Option<u32>,

    /// Directory holding checkpoint files.
    #[arg(long, env = "LEAD_ENRICH_CHECKPOINT_DIR")]
    checkpoint_dir: Option<String>,

    /// Flush the checkpoint after this many completed lookups.
    #[arg(long, env = "LEAD_ENRICH_CHECKPOINT_EVERY")]
    checkpoint_every: Option<usize>,

    /// Field holding a stable record key.
    #[arg(long, env = "LEAD_ENRICH_KEY_FIELD")]
    key_field: Option<String>,

    /// Process at most this many eligible leads.
    #[arg(long, env = "LEAD_ENRICH_MAX_LEADS")]
    max_leads: Option<usize>,

    /// Leave the first N leads untouched.
    #[arg(long, env = "LEAD_ENRICH_SKIP_FIRST")]
    skip_first: Option<usize>,

    /// Also process leads whose target fields are already filled, overwriting them.
    #[arg(long, action = clap::ArgAction::SetTrue, env = "LEAD_ENRICH_INCLUDE_EXISTING")]
    include_existing: bool,

    /// Comma-separated fields a lead must carry to be processed.
    #[arg(long, value_delimiter = ',', env = "LEAD_ENRICH_REQUIRE_FIELDS")]
    require_fields: Option<Vec<String>>,

    /// Minimum confidence a waterfall source must reach.
    #[arg(long, env = "LEAD_ENRICH_CONFIDENCE_THRESHOLD")]
    confidence_threshold: Option<f64>,

    /// Comma-separated decision maker categories (decision-maker-email).
    #[arg(long, value_delimiter = ',', env = "LEAD_ENRICH_CATEGORIES")]
    categories: Option<Vec<String>>,

    /// Chat model used for page extraction (decision-maker).
    #[arg(long, env = "OPENAI_MODEL")]
    chat_model: Option<String>,

    /// Show the plan and estimated cost, then exit without calling anything.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    dry_run: bool,

    /// Discard any existing checkpoint and start over.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    fresh: bool,

    /// On resume, attempt previously failed leads again.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    retry_failed: bool,

    /// Skip the confirmation prompt.
    #[arg(short, long, action = clap::ArgAction::SetTrue, env = "LEAD_ENRICH_YES")]
    yes: bool,

    #[arg(long, env = "OPENWEBNINJA_API_KEY", hide_env_values = true)]
    openwebninja_api_key: Option<String>,

    #[arg(long, env = "ANYMAIL_API_KEY", hide_env_values = true)]
    anymail_api_key: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    #[arg(long, env = "DATAFORSEO_LOGIN", hide_env_values = true)]
    dataforseo_login: Option<String>,

    #[arg(long, env = "DATAFORSEO_PASSWORD", hide_env_values = true)]
    dataforseo_password: Option<String>,

    #[arg(long, env = "RAPIDAPI_KEY", hide_env_values = true)]
    rapidapi_key: Option<String>,
}

impl AppArgs {
    fn credentials(&self) -> Credentials {
        Credentials {
            contacts_api_key: self.openwebninja_api_key.clone(),
            anymail_api_key: self.anymail_api_key.clone(),
            openai_api_key: self.openai_api_key.clone(),
            search_login: self.dataforseo_login.clone(),
            search_password: self.dataforseo_password.clone(),
            people_search_key: self.rapidapi_key.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InterruptAction {
    Drain,
    Exit,
}

/// First Ctrl-C cancels the run so in-flight lookups drain; a second one exits.
fn on_interrupt(cancel: &CancellationToken) -> InterruptAction {
    if cancel.is_cancelled() {
        return InterruptAction::Exit;
    }
    cancel.cancel();
    InterruptAction::Drain
}

/// Prompts on the terminal unless `--yes` was given. Once a run is confirmed
/// it reveals the progress bar and starts listening for Ctrl-C.
struct TerminalGate {
    auto_confirm: bool,
    progress: ProgressBar,
    cancel: CancellationToken,
}

impl TerminalGate {
    fn ask(&self) -> bool {
        print!("Continue? (yes/no) ");
        if std::io::stdout().flush().is_err() {
            return false;
        }
        let mut answer = String::new();
        match std::io::stdin().lock().read_line(&mut answer) {
            Ok(0) | Err(_) => false,
            Ok(_) => matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"),
        }
    }

    fn watch_interrupts(&self) {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if on_interrupt(&cancel) == InterruptAction::Exit {
                    eprintln!("Second interrupt received. Exiting; lookups since the last checkpoint flush are lost.");
                    std::process::exit(130);
                }
                tracing::warn!("Interrupt received. Finishing in-flight lookups and saving progress (Ctrl-C again to quit now)...");
            }
        });
    }
}

impl ConfirmationGate for TerminalGate {
    fn confirm(&self, summary: &RunSummary) -> bool {
        println!();
        println!("Leads in input      : {}", summary.total);
        println!("To process          : {}", summary.eligible);
        println!("Already done        : {}", summary.skipped_already_done);
        if summary.resumed > 0 {
            println!("  (from checkpoint) : {}", summary.resumed);
        }
        println!("Missing input       : {}", summary.skipped_missing_input);
        println!("Outside limits      : {}", summary.skipped_by_limit);
        println!("Estimated cost      : {:.0} credits", summary.estimated_cost);

        if !self.auto_confirm && !self.ask() {
            return false;
        }
        self.progress.set_length(summary.eligible as u64);
        self.progress.set_draw_target(ProgressDrawTarget::stderr());
        self.progress.reset_elapsed();
        self.watch_interrupts();
        true
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_thread_names(true)
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Setting up tracing subscriber failed")?;

    tracing::info!("Lead Enrich CLI v{} starting...", env!("CARGO_PKG_VERSION"));

    let args = AppArgs::parse();
    let kind = EnrichmentKind::from(args.kind);
    tracing::debug!("Parsed CLI arguments (kind '{}', input '{}', output '{}')", kind, args.input, args.output);

    let mut config_builder = ConfigBuilder::new();

    if let Some(ref path) = args.config_file {
        config_builder = config_builder.config_file(path);
    }
    if let Some(c) = args.concurrency {
        config_builder = config_builder.max_concurrency(c);
    }
    if let Some(rps) = args.requests_per_second {
        config_builder = config_builder.requests_per_second(rps);
    }
    if let Some(t) = args.request_timeout {
        config_builder = config_builder.request_timeout(Duration::from_secs(t));
    }
    if let Some(ref ua) = args.user_agent {
        config_builder = config_builder.user_agent(ua);
    }
    if let Some(attempts) = args.max_attempts {
        config_builder = config_builder.max_attempts(attempts);
    }
    if let Some(ref dir) = args.checkpoint_dir {
        config_builder = config_builder.checkpoint_dir(dir);
    }
    if let Some(every) = args.checkpoint_every {
        config_builder = config_builder.checkpoint_every(every);
    }
    if let Some(ref key) = args.key_field {
        config_builder = config_builder.key_field(key);
    }
    if let Some(max) = args.max_leads {
        config_builder = config_builder.max_leads(max);
    }
    if let Some(skip) = args.skip_first {
        config_builder = config_builder.skip_first(skip);
    }
    if args.include_existing {
        config_builder = config_builder.include_existing(true);
    }
    if let Some(ref fields) = args.require_fields {
        config_builder = config_builder.require_fields(fields.clone());
    }
    if let Some(threshold) = args.confidence_threshold {
        config_builder = config_builder.confidence_threshold(threshold);
    }
    if let Some(ref categories) = args.categories {
        if !categories.is_empty() {
            config_builder = config_builder.decision_maker_categories(categories.clone());
        }
    }
    if let Some(ref model) = args.chat_model {
        config_builder = config_builder.chat_model(model);
    }

    let config = match config_builder.build() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Configuration error: {}", e);
            return Err(anyhow::anyhow!("Failed to build configuration: {}", e));
        }
    };
    tracing::debug!("Effective configuration loaded: {:?}", config);

    let lookup = match initialize_lookup(kind, &config, &args.credentials()) {
        Ok(l) => l,
        Err(e) => {
            if e.is_fatal_configuration() {
                tracing::error!("Configuration error: {}. Check the environment and config file.", e);
            } else {
                tracing::error!("Initialization error: {}", e);
            }
            return Err(anyhow::anyhow!("Failed to initialize '{}' lookup: {}", kind, e));
        }
    };

    let pb = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::hidden());
    pb.set_style(ProgressStyle::default_bar()
         .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) | ETA: {eta} | {msg}")
         .context("Failed to set progress bar template")?
         .progress_chars("=> "));
    pb.set_message(format!("Enriching ({})...", kind));

    let observer_pb = pb.clone();
    let mut options = PipelineOptions::from_config(&config, kind);
    options.dry_run = args.dry_run;
    options.fresh_start = args.fresh;
    options.retry_failed = args.retry_failed;
    let observer: CompletionObserver = Arc::new(move |identity: &Identity, result: &LookupResult| {
        observer_pb.set_message(format!("{} -> {}", identity, result.label()));
        observer_pb.inc(1);
    });
    let pipeline = Pipeline::new(options, lookup).with_observer(observer);

    let cancel = CancellationToken::new();
    let gate = TerminalGate {
        auto_confirm: args.yes,
        progress: pb.clone(),
        cancel: cancel.clone(),
    };
    let source = JsonFileSource::new(&args.input);
    let sink = JsonFileSink::new(&args.output);

    tracing::info!(
        "Running '{}' enrichment. Input: '{}', Output: '{}' (Concurrency: {}, {} req/s)",
        kind,
        args.input,
        args.output,
        config.max_concurrency,
        config.requests_per_second
    );
    let report = match pipeline.run(&source, &sink, &gate, &cancel).await {
        Ok(report) => report,
        Err(e) => {
            if e.is_fatal_configuration() {
                tracing::error!("Refusing to start: {}", e);
            } else {
                pb.abandon_with_message("Run stopped");
                tracing::error!("Run stopped: {}", e);
            }
            return Err(anyhow::Error::from(e).context(format!("Enrichment of '{}' failed", args.input)));
        }
    };

    pb.finish_with_message(format!("Processed {} lookups", report.lookups_this_run));
    log_summary(&report);

    match report.outcome {
        RunOutcome::Completed => tracing::info!("Results saved to '{}'.", args.output),
        RunOutcome::Interrupted => tracing::warn!(
            "Partial results saved to '{}'. Progress kept in '{}'; run the same command again to resume.",
            args.output,
            report.checkpoint_path.display()
        ),
        RunOutcome::Declined => tracing::info!("Run cancelled at confirmation. Nothing was written."),
        RunOutcome::DryRun => tracing::info!("Dry run complete. Nothing was called or written."),
    }
    Ok(())
}

/// Logs a summary of the run to the console using `tracing::info`.
fn log_summary(report: &RunReport) {
    let summary = &report.summary;
    let duration = report.duration;

    tracing::info!("-------------------- Enrichment Summary --------------------");
    tracing::info!("Total Records in Input      : {}", summary.total);
    tracing::info!("Eligible This Run           : {}", summary.eligible);
    tracing::info!("  - Resumed From Checkpoint : {}", summary.resumed);
    tracing::info!("  - Already Done            : {}", summary.skipped_already_done);
    tracing::info!("  - Missing Input           : {}", summary.skipped_missing_input);
    tracing::info!("  - Outside Limits          : {}", summary.skipped_by_limit);
    tracing::info!("Lookups Completed (total)   : {}", summary.processed);
    tracing::info!("  - Enriched                : {}", summary.succeeded);
    tracing::info!("  - Not Found               : {}", summary.not_found);
    tracing::info!("  - Failed                  : {}", summary.failed);
    tracing::info!("Lookups This Run            : {}", report.lookups_this_run);
    tracing::info!("Estimated Cost              : {:.0} credits", summary.estimated_cost);
    tracing::info!("Total Time Taken            : {:.2?}", duration);
    if duration.as_secs_f64() > 0.01 && report.lookups_this_run > 0 {
        let rate = (report.lookups_this_run as f64) / duration.as_secs_f64();
        tracing::info!("Processing Rate             : {:.2} lookups/sec", rate);
    }
    tracing::info!("------------------------------------------------------------");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_interrupt_exits() {
        let cancel = CancellationToken::new();
        assert_eq!(on_interrupt(&cancel), InterruptAction::Drain);
        assert!(cancel.is_cancelled());
        assert_eq!(on_interrupt(&cancel), InterruptAction::Exit);
    }
}
