//! Bankability - AI-powered company creditworthiness scoring
//!
//! A CLI tool that fans out LLM analyst tasks over a company's evidence
//! (parsed documents, payment and banking snapshots), synthesizes weighted
//! risk factors into a 0-100 bankability score, and derives a prioritized
//! remediation roadmap.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (connection, config, evidence failure, etc.)
//!   2 - Score below --fail-below threshold

mod agents;
mod audit;
mod bus;
mod cli;
mod config;
mod error;
mod evidence;
mod findata;
mod models;
mod orchestrator;
mod remediation;
mod report;
mod session;
mod synthesis;

use agents::{default_specialists, AnalysisCapability, HeuristicCapability, OllamaCapability, OllamaConfig};
use anyhow::{Context, Result};
use audit::AuditTrail;
use bus::TaskBus;
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::Config;
use indicatif::{ProgressBar, ProgressStyle};
use models::Snapshot;
use orchestrator::Orchestrator;
use remediation::RemediationEngine;
use report::ReportMetadata;
use session::{CacheBackend, ContextStore, HttpCacheBackend};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("Bankability v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    // Run the scoring pipeline
    match run_analysis(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Analysis failed: {}", e);
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .bankability.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(".bankability.toml");

    if path.exists() {
        eprintln!("⚠️  .bankability.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .bankability.toml")?;

    println!("✅ Created .bankability.toml with default settings.");
    println!("   Edit it to customize model, scoring target, industry, and more.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete scoring workflow. Returns exit code (0 or 2).
async fn run_analysis(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let subject_id = args.subject_id().to_string();

    // Step 1: Build the pipeline. Everything is constructed here and
    // threaded through explicitly; there are no process-wide singletons.
    let audit_trail = Arc::new(AuditTrail::new());

    let capability: Arc<dyn AnalysisCapability> = if config.model.offline {
        Arc::new(HeuristicCapability)
    } else {
        Arc::new(OllamaCapability::new(
            OllamaConfig {
                url: config.model.ollama_url.clone(),
                model: config.model.name.clone(),
                temperature: config.model.temperature,
                timeout_seconds: config.model.timeout_seconds,
            },
            audit_trail.clone(),
        ))
    };
    let model_used = capability.model_name().to_string();

    let cache: Option<Arc<dyn CacheBackend>> = config.cache.url.as_ref().map(|url| {
        Arc::new(HttpCacheBackend::new(url, Duration::from_secs(5))) as Arc<dyn CacheBackend>
    });

    let store = Arc::new(ContextStore::new(cache));
    store.subscribe(|ctx| {
        debug!(
            "session {} updated: {} documents, {} insights",
            ctx.session_id,
            ctx.documents.len(),
            ctx.insights.values().map(Vec::len).sum::<usize>()
        );
    });
    let bus = Arc::new(TaskBus::new());
    let hints = config::calibration_hints(&config.scoring.industry);
    let tasks = default_specialists(capability, hints);
    let task_count = tasks.len();

    let orchestrator = Orchestrator::new(
        store.clone(),
        bus,
        tasks,
        RemediationEngine::new(config.scoring.target),
    );

    println!("🤖 Initializing analysis pipeline...");
    println!("   Subject: {}", subject_id);
    println!("   Model: {}", model_used);
    if config.model.offline {
        println!("   Mode: Offline (deterministic heuristics)");
    } else {
        println!("   Ollama: {}", config.model.ollama_url);
        println!("   Timeout: {}s", config.model.timeout_seconds);
    }

    // Step 2: Load evidence into the session
    println!("\n📥 Loading evidence...");
    store.create_session(&subject_id).await;
    load_evidence(&args, &store).await?;

    // Step 3: Run the orchestrated analysis
    println!("\n🔬 Running analysis...");
    let spinner = make_spinner(args.quiet);
    let outcome = orchestrator.analyze(&subject_id).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let outcome = outcome.context("analysis pipeline failed")?;
    debug!("Orchestrator finished in state {:?}", orchestrator.state());

    let failed = orchestrator.failed_tasks();
    for (task_id, error) in &failed {
        warn!("Task {} failed and was excluded: {}", task_id, error);
    }

    // Step 4: Build and write the report
    println!("\n📝 Generating report...");
    let ctx = store.get_context().await?;
    let metadata = ReportMetadata {
        subject_id: subject_id.clone(),
        session_id: ctx.session_id.clone(),
        analysis_date: Utc::now(),
        model_used,
        tasks_run: if outcome.obvious_case.is_some() {
            0
        } else {
            task_count
        },
        tasks_failed: failed.len(),
        duration_seconds: start_time.elapsed().as_secs_f64(),
        obvious_case: outcome.obvious_case.map(|c| c.to_string()),
    };

    let output = match args.format {
        OutputFormat::Json => {
            report::generate_json_report(&metadata, &outcome.score, &outcome.roadmap)?
        }
        OutputFormat::Markdown => {
            report::generate_markdown_report(&metadata, &outcome.score, &outcome.roadmap)
        }
    };

    std::fs::write(&args.output, &output)
        .with_context(|| format!("Failed to write report to {}", args.output.display()))?;

    // Print summary
    println!("\n📊 Bankability Summary:");
    println!(
        "   Score: {} / 100 (Grade {})",
        outcome.score.score, outcome.score.grade
    );
    for factor in &outcome.score.risk_factors.factors {
        println!("   - {}: {:.0}", factor.kind, factor.score);
    }
    if !outcome.score.penalties.is_empty() {
        println!("   Penalties applied: {}", outcome.score.penalties.len());
    }
    if !failed.is_empty() {
        println!("   ⚠️  {} task(s) failed; coverage degraded", failed.len());
    }
    println!(
        "   Remediation tasks: {} (projected score {})",
        outcome.roadmap.tasks.len(),
        outcome.roadmap.projected_score
    );
    println!("   Analysis calls audited: {}", audit_trail.entries().len());
    println!("   Duration: {:.1}s", start_time.elapsed().as_secs_f64());
    println!(
        "\n✅ Analysis complete! Report saved to: {}",
        args.output.display()
    );

    // Check --fail-below threshold
    if let Some(threshold) = args.fail_below {
        if outcome.score.score < threshold {
            eprintln!(
                "\n⛔ Score {} below the --fail-below threshold of {}. Failing (exit code 2).",
                outcome.score.score, threshold
            );
            return Ok(2);
        }
    }

    Ok(0)
}

/// Read the evidence files named on the command line into the session.
async fn load_evidence(args: &Args, store: &Arc<ContextStore>) -> Result<()> {
    if let Some(ref path) = args.documents {
        let documents = evidence::load_documents(path)?;
        println!("   📄 {} documents", documents.len());
        for document in documents {
            store.add_document(document).await?;
        }
    }

    if let Some(ref path) = args.payments {
        let snapshot = evidence::load_payment_snapshot(path)?;
        println!("   💳 payment snapshot ({} customers)", snapshot.customer_count);
        store.set_snapshot(Snapshot::Payments(snapshot)).await?;
    }

    if let Some(ref path) = args.banking {
        let snapshot = evidence::load_banking_snapshot(path)?;
        println!("   🏦 banking snapshot ({} accounts)", snapshot.accounts.len());
        store.set_snapshot(Snapshot::Banking(snapshot)).await?;
    }

    Ok(())
}

/// Spinner shown while the fan-out runs (suppressed in quiet mode).
fn make_spinner(quiet: bool) -> Option<ProgressBar> {
    if quiet {
        return None;
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .expect("Failed to create progress style"),
    );
    spinner.set_message("Analyst tasks running concurrently...");
    spinner.enable_steady_tick(Duration::from_millis(120));
    Some(spinner)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from .bankability.toml");
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
