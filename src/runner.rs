//! End-to-end run: load inputs from files, consolidate, hand off to a sink

use std::path::PathBuf;

use crate::config::MonitorConfig;
use crate::error::MonitorResult;
use crate::history::PriorHistory;
use crate::io::{load_batches, load_targets, read_history, read_snapshot, ReportSink};
use crate::pipeline::{consolidate, ConsolidationInputs, ConsolidationOutcome};

/// Load targets, snapshot, prior history and extracts named by `config` and
/// `batch_paths`.
///
/// Only the target table is mandatory; every other loading problem is kept
/// as a diagnostic.
pub fn load_inputs(
    config: &MonitorConfig,
    batch_paths: &[PathBuf],
) -> MonitorResult<ConsolidationInputs> {
    let (targets, mut diagnostics) = load_targets(&config.targets_path)?;

    let snapshot = match &config.snapshot_path {
        Some(path) => {
            let (entries, mut found) = read_snapshot(path)?;
            diagnostics.append(&mut found);
            entries
        }
        None => Vec::new(),
    };

    let prior_history = match config.history_source() {
        Some(path) => {
            let (history, mut found) = read_history(&path)?;
            diagnostics.append(&mut found);
            history
        }
        None => PriorHistory::new(),
    };

    let (batches, mut found) = load_batches(batch_paths, &config.columns);
    diagnostics.append(&mut found);

    tracing::info!(
        batches = batches.len(),
        snapshot_entities = snapshot.len(),
        history_entities = prior_history.len(),
        targets = targets.len(),
        "Inputs loaded"
    );

    Ok(ConsolidationInputs {
        batches,
        snapshot,
        prior_history,
        targets,
        diagnostics,
    })
}

/// Run a full consolidation and write the report to `sink`
pub fn run(
    config: &MonitorConfig,
    batch_paths: &[PathBuf],
    sink: &mut dyn ReportSink,
) -> MonitorResult<ConsolidationOutcome> {
    let inputs = load_inputs(config, batch_paths)?;
    let outcome = consolidate(inputs, &config.engine_options())?;
    sink.write_report(&outcome.report, &outcome.diagnostics)?;
    Ok(outcome)
}
