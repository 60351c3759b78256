//! Journal export — CSV tapes and a Markdown learning report.
//!
//! - **CSV**: one row per signal and one row per closed trade
//! - **Markdown**: current factor weights, learning curve, and insights

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use greeklab_core::domain::{Signal, TradeOutcome};
use greeklab_core::engine::TrainingRecord;
use greeklab_core::factors::FactorWeights;
use greeklab_core::feedback::LearningInsights;
use greeklab_core::models::TrainingMetrics;

use crate::journal::JsonlJournal;

// ─── CSV export ─────────────────────────────────────────────────────

/// Columns: id, generated_at, symbol, action, confidence, reason, source,
/// state_version, reasoning (lines joined with " | ")
pub fn export_signals_csv(signals: &[Signal]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "id",
        "generated_at",
        "symbol",
        "action",
        "confidence",
        "reason",
        "source",
        "state_version",
        "reasoning",
    ])?;
    for s in signals {
        wtr.write_record([
            &s.id.to_string(),
            &s.generated_at.to_rfc3339(),
            &s.symbol,
            s.action.as_str(),
            &format!("{:.4}", s.confidence),
            s.reason.as_str(),
            s.source.as_str(),
            &s.state_version.to_string(),
            &s.reasoning.join(" | "),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Columns: position, symbol, side, opened_at, closed_at, hold_secs,
/// entry_price, exit_price, quantity, realized_pnl, return_pct,
/// direction_correct, exit_reason
pub fn export_outcomes_csv(outcomes: &[TradeOutcome]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "position",
        "symbol",
        "side",
        "opened_at",
        "closed_at",
        "hold_secs",
        "entry_price",
        "exit_price",
        "quantity",
        "realized_pnl",
        "return_pct",
        "direction_correct",
        "exit_reason",
    ])?;
    for o in outcomes {
        wtr.write_record([
            &o.position_ref.to_string(),
            &o.symbol,
            &format!("{:?}", o.side),
            &o.opened_at.to_rfc3339(),
            &o.closed_at.to_rfc3339(),
            &o.hold_secs.to_string(),
            &format!("{:.4}", o.entry_price),
            &format!("{:.4}", o.exit_price),
            &format!("{:.2}", o.quantity),
            &format!("{:.2}", o.realized_pnl),
            &format!("{:.6}", o.return_pct),
            &o.direction_correct.to_string(),
            o.exit_reason.map(|r| r.as_str()).unwrap_or(""),
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Markdown report ────────────────────────────────────────────────

fn metrics_cell(m: Option<&TrainingMetrics>) -> String {
    match m {
        Some(m) => format!("{:.1}% / {:.1}%", m.train_accuracy * 100.0, m.test_accuracy * 100.0),
        None => "-".to_string(),
    }
}

pub fn generate_learning_report(
    weights: &FactorWeights,
    curve: &[TrainingRecord],
    insights: Option<&LearningInsights>,
) -> String {
    let mut md = String::with_capacity(2048);
    md.push_str("# Learning Report\n\n");

    md.push_str("## Factor Weights\n\n");
    md.push_str("| Factor | Weight |\n");
    md.push_str("| --- | ---: |\n");
    let mut ranked: Vec<_> = weights.iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    for (factor, w) in ranked {
        md.push_str(&format!("| {} | {:.4} |\n", factor.label(), w));
    }
    md.push('\n');

    md.push_str("## Learning Curve\n\n");
    if curve.is_empty() {
        md.push_str("No training runs yet.\n\n");
    } else {
        md.push_str("| Trained At | Samples | Pattern (train / test) | Trend (train / test) |\n");
        md.push_str("| --- | ---: | --- | --- |\n");
        for r in curve {
            md.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                r.trained_at.format("%Y-%m-%d %H:%M"),
                r.sample_count,
                metrics_cell(r.pattern.as_ref()),
                metrics_cell(r.trend.as_ref()),
            ));
        }
        md.push('\n');
    }

    md.push_str("## Insights\n\n");
    match insights {
        Some(i) => {
            for line in &i.lines {
                md.push_str(&format!("- {line}\n"));
            }
        }
        None => md.push_str("Not enough closed trades yet.\n"),
    }
    md
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Write `signals.csv` and `outcomes.csv` from the journal, plus
/// `report.md` when a report is given. Returns the written paths.
pub fn save_exports(journal: &JsonlJournal, report: Option<&str>, output_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create export dir: {}", output_dir.display()))?;

    let records = journal
        .read_all()
        .with_context(|| format!("failed to read journal {}", journal.path().display()))?;
    let mut signals = Vec::new();
    let mut outcomes = Vec::new();
    for record in records {
        match record {
            crate::journal::JournalRecord::Signal(s) => signals.push(s),
            crate::journal::JournalRecord::Outcome(o) => outcomes.push(o),
        }
    }

    let mut written = Vec::new();
    let path = output_dir.join("signals.csv");
    std::fs::write(&path, export_signals_csv(&signals)?)?;
    written.push(path);

    let path = output_dir.join("outcomes.csv");
    std::fs::write(&path, export_outcomes_csv(&outcomes)?)?;
    written.push(path);

    if let Some(report) = report {
        let path = output_dir.join("report.md");
        std::fs::write(&path, report)?;
        written.push(path);
    }
    Ok(written)
}
