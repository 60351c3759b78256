//! GreekLab CLI — scan, simulate, train, and inspect the signal engine.
//!
//! Commands:
//! - `scan`: live-paced scan loop over the configured symbols
//! - `simulate`: replay synthetic sessions back to back through the paper book
//! - `train`: force a reweight and retrain over the journaled outcomes
//! - `weights`: show factor weights, learning curve, and insights
//! - `export`: write signals/outcomes CSV and a learning report
//! - `config`: print the default lab config as TOML

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use greeklab_core::engine::{LearnReport, TrainerEvent};
use greeklab_core::gate::RiskPrecheck;
use greeklab_core::{SignalEngine, TrainingMode};
use greeklab_runner::{
    generate_learning_report, save_exports, CycleSummary, JsonlJournal, LabConfig, LimitsPrecheck,
    Pace, PaperBook, RiskLedger, Session, SessionConfig, SessionReport, StateStore,
    SyntheticProvider,
};

#[derive(Parser)]
#[command(
    name = "greeklab",
    about = "GreekLab CLI — adaptive option signal engine"
)]
struct Cli {
    /// Lab config TOML. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging (RUST_LOG overrides).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scan loop at the configured interval.
    Scan {
        /// Stop after this many cycles.
        #[arg(long)]
        cycles: Option<u64>,

        /// Override the configured symbols.
        #[arg(long, num_args = 1..)]
        symbols: Vec<String>,

        /// Run learning jobs inline instead of on the trainer thread.
        #[arg(long, default_value_t = false)]
        inline: bool,
    },
    /// Replay synthetic sessions back to back through the paper book.
    Simulate {
        /// Number of cycles (75 five-minute cycles per session).
        #[arg(long, default_value_t = 750)]
        cycles: u64,

        /// First session date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        start: Option<String>,

        /// Ignore any saved state and journaled outcomes.
        #[arg(long, default_value_t = false)]
        fresh: bool,
    },
    /// Reweight and retrain over every journaled outcome.
    Train,
    /// Show current factor weights, learning curve, and insights.
    Weights {
        /// Print the persisted state as JSON instead.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Export the journal as CSV plus a Markdown learning report.
    Export {
        /// Output directory. Defaults to the configured export dir.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Print the default lab config.
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => LabConfig::from_file(path)?,
        None => LabConfig::default(),
    };

    match cli.command {
        Commands::Scan {
            cycles,
            symbols,
            inline,
        } => run_scan(config, cycles, symbols, inline),
        Commands::Simulate { cycles, start, fresh } => run_simulate(config, cycles, start, fresh),
        Commands::Train => run_train(&config),
        Commands::Weights { json } => run_weights(&config, json),
        Commands::Export { output_dir } => run_export(&config, output_dir),
        Commands::Config => {
            print!("{}", LabConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

// ─── Engine assembly ────────────────────────────────────────────────

struct Lab {
    engine: Arc<SignalEngine>,
    journal: Arc<JsonlJournal>,
    store: StateStore,
    risk: Arc<dyn RiskPrecheck>,
    ledger: Arc<RiskLedger>,
    clock: Arc<SyntheticProvider>,
}

/// Build the engine and its adapters. Unless `fresh`, restore the saved
/// state and reload journaled outcomes into the feedback history.
fn assemble(config: &LabConfig, mode: TrainingMode, first_session: NaiveDate, fresh: bool) -> Result<Lab> {
    let journal = Arc::new(JsonlJournal::new(&config.paths.journal));
    let store = StateStore::new(&config.paths.state);
    let ledger = Arc::new(RiskLedger::new(config.risk.utc_offset_secs));
    let risk: Arc<dyn RiskPrecheck> = Arc::new(LimitsPrecheck::new(config.risk.clone(), Arc::clone(&ledger)));
    let clock = Arc::new(SyntheticProvider::new(
        config.synthetic.seed,
        config.synthetic.failure_rate,
        first_session,
        config.scan.interval_secs,
    ));

    let engine = SignalEngine::new(config.engine.clone(), mode)
        .context("invalid engine config")?
        .with_provider(clock.clone())
        .with_journal(journal.clone())
        .with_risk(Arc::clone(&risk));

    if !fresh {
        match store.restore_into(&engine) {
            Ok(Some(version)) => info!(version, "resumed from saved state"),
            Ok(None) => info!("no saved state, starting from defaults"),
            Err(e) => warn!(error = %e, "saved state not loaded, starting from defaults"),
        }
        let loaded = engine
            .warm_start(DateTime::<Utc>::MIN_UTC)
            .context("failed to read journaled outcomes")?;
        if loaded > 0 {
            info!(outcomes = loaded, "feedback history reloaded");
        }
    }

    Ok(Lab {
        engine: Arc::new(engine),
        journal,
        store,
        risk,
        ledger,
        clock,
    })
}

fn session(config: &LabConfig, lab: &Lab) -> Session {
    Session::new(
        Arc::clone(&lab.engine),
        Arc::clone(&lab.risk),
        PaperBook::new(config.book.clone(), Arc::clone(&lab.ledger)),
    )
    .with_journal(lab.journal.clone())
    .with_clock(Arc::clone(&lab.clock))
    .with_store(lab.store.clone())
}

fn parse_date(s: Option<&str>) -> Result<NaiveDate> {
    Ok(s.map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()
        .context("dates are YYYY-MM-DD")?
        .unwrap_or_else(|| chrono::Local::now().date_naive()))
}

// ─── Commands ───────────────────────────────────────────────────────

fn run_scan(mut config: LabConfig, cycles: Option<u64>, symbols: Vec<String>, inline: bool) -> Result<()> {
    if !symbols.is_empty() {
        config.scan.symbols = symbols;
    }
    if cycles.is_some() {
        config.scan.cycles = cycles;
    }
    let mode = if inline { TrainingMode::Inline } else { config.scan.training_mode };
    let lab = assemble(&config, mode, parse_date(None)?, false)?;

    let session_config = SessionConfig {
        symbols: config.scan.symbols.clone(),
        cycles: config.scan.cycles,
        interval: Duration::from_secs(config.scan.interval_secs),
        pace: Pace::Live,
        flatten_at_end: false,
    };
    let report = session(&config, &lab).run(&session_config, Some(&print_cycle), None)?;
    print_session(&report);
    Ok(())
}

fn run_simulate(config: LabConfig, cycles: u64, start: Option<String>, fresh: bool) -> Result<()> {
    if cycles == 0 {
        bail!("--cycles must be at least 1");
    }
    let first_session = parse_date(start.as_deref())?;
    let lab = assemble(&config, config.scan.training_mode, first_session, fresh)?;

    let session_config = SessionConfig {
        symbols: config.scan.symbols.clone(),
        cycles: Some(cycles),
        interval: Duration::from_secs(config.scan.interval_secs),
        pace: Pace::Replay,
        flatten_at_end: true,
    };
    let report = session(&config, &lab).run(&session_config, None, None)?;

    // Let queued learning finish so the saved state includes it.
    while let Some(event) = lab.engine.wait_for_trainer(Duration::from_secs(2)) {
        print_trainer_event(&event);
    }
    lab.store.save_engine(&lab.engine)?;

    print_session(&report);
    print_weights(&lab.engine);
    Ok(())
}

fn run_train(config: &LabConfig) -> Result<()> {
    let lab = assemble(config, TrainingMode::Inline, parse_date(None)?, false)?;
    let history = lab.engine.outcome_history().len();
    if history == 0 {
        bail!("no journaled outcomes in {}", config.paths.journal.display());
    }
    println!("Training on {history} outcomes");
    let event = lab.engine.learn_now(true, true)?;
    print_trainer_event(&event);
    lab.store.save_engine(&lab.engine)?;
    println!("State saved to: {}", lab.store.path().display());
    Ok(())
}

fn run_weights(config: &LabConfig, json: bool) -> Result<()> {
    let lab = assemble(config, TrainingMode::Inline, parse_date(None)?, false)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&lab.engine.persisted(Utc::now()))?);
        return Ok(());
    }
    print_weights(&lab.engine);
    let curve = lab.engine.learning_curve();
    if let Some(last) = curve.last() {
        println!();
        println!(
            "Last training: {} on {} samples ({} runs recorded)",
            last.trained_at.format("%Y-%m-%d %H:%M"),
            last.sample_count,
            curve.len()
        );
    }
    match lab.engine.insights() {
        Some(insights) => {
            println!();
            for line in &insights.lines {
                println!("  {line}");
            }
        }
        None => println!("\nNot enough closed trades for insights yet."),
    }
    Ok(())
}

fn run_export(config: &LabConfig, output_dir: Option<PathBuf>) -> Result<()> {
    let lab = assemble(config, TrainingMode::Inline, parse_date(None)?, false)?;
    let output_dir = output_dir.unwrap_or_else(|| config.paths.export_dir.clone());
    let report = generate_learning_report(
        &lab.engine.current_weights(),
        &lab.engine.learning_curve(),
        lab.engine.insights().as_ref(),
    );
    let written = save_exports(&lab.journal, Some(&report), &output_dir)?;
    for path in written {
        println!("Wrote {}", path.display());
    }
    Ok(())
}

// ─── Output ─────────────────────────────────────────────────────────

fn print_cycle(c: &CycleSummary) {
    println!(
        "cycle {:>5}  state v{:<4} evaluated {:>3}  actionable {:>3}  skipped {:>2}  opened {:>2}  closed {:>2}  open {:>2}",
        c.cycle,
        c.state_version,
        c.evaluated,
        c.actionable,
        c.skipped.len(),
        c.opened,
        c.closed,
        c.open_positions
    );
    for s in &c.skipped {
        println!("    skipped {:<12} {}", s.symbol, s.reason);
    }
    for f in &c.journal_failures {
        println!("    not journaled {} {}", f.signal, f.reason);
    }
}

fn print_session(r: &SessionReport) {
    println!();
    println!("=== Session ===");
    println!("Cycles:         {}", r.cycles.len());
    println!("Opened:         {}", r.opened);
    println!("Closed:         {}", r.closed);
    println!("Realized P&L:   {:.2}", r.realized_pnl);
    println!("State version:  {}", r.final_state_version);
    println!("Elapsed:        {:.1}s", r.elapsed_secs);
    if r.cancelled {
        println!("(cancelled)");
    }
}

fn print_weights(engine: &SignalEngine) {
    let mut weights: Vec<_> = engine.current_weights().iter().collect();
    weights.sort_by(|a, b| b.1.total_cmp(&a.1));
    println!();
    println!("{:<24} {:>8}", "Factor", "Weight");
    println!("{}", "-".repeat(33));
    for (factor, w) in weights {
        println!("{:<24} {:>8.4}", factor.label(), w);
    }
}

fn print_trainer_event(event: &TrainerEvent) {
    match event {
        TrainerEvent::Published { version, report } => {
            println!("Published state v{version}");
            print_learn_report(report);
        }
        TrainerEvent::Unchanged { report } => {
            println!("Learning pass left the state unchanged");
            print_learn_report(report);
        }
        TrainerEvent::Discarded => println!("Learning pass discarded"),
        TrainerEvent::Superseded => println!("Learning pass superseded by a newer state"),
    }
}

fn print_learn_report(report: &LearnReport) {
    if let Some(w) = &report.weights {
        match w {
            Ok(update) => println!("  weights: max change {:.4}", update.max_change),
            Err(e) => println!("  weights: {e}"),
        }
    }
    for (name, result) in [("pattern", &report.pattern), ("trend", &report.trend)] {
        match result {
            Some(Ok(m)) => println!(
                "  {name}: {} samples, train {:.1}%, test {:.1}%",
                m.sample_count,
                m.train_accuracy * 100.0,
                m.test_accuracy * 100.0
            ),
            Some(Err(e)) => println!("  {name}: {e}"),
            None => {}
        }
    }
}
