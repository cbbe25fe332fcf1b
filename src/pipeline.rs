//! Consolidation pipeline
//!
//! Drives one run: seed the store from the snapshot, order and merge the
//! batches, apply them, finalize the records and build the report. Rows and
//! batches that cannot be used are reported as diagnostics, never dropped
//! silently.

use chrono::NaiveDate;

use os_monitor_types::{Diagnostic, DiagnosticKind, ObservationBatch, SnapshotEntry};

use crate::calendar::ContinuationPolicy;
use crate::error::MonitorResult;
use crate::history::{HistoryStore, PriorHistory};
use crate::report::{build_report, MonitoringReport, ReportOptions};
use crate::targets::TargetTable;

/// Everything a run consumes
#[derive(Debug, Clone, Default)]
pub struct ConsolidationInputs {
    /// Batches in any order
    pub batches: Vec<ObservationBatch>,
    /// Previously consolidated snapshot, empty for a first run
    pub snapshot: Vec<SnapshotEntry>,
    /// Closed intervals recorded by earlier runs, restored with the snapshot
    pub prior_history: PriorHistory,
    pub targets: TargetTable,
    /// Diagnostics raised while loading the inputs, passed through
    pub diagnostics: Vec<Diagnostic>,
}

/// Engine knobs
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub continuation: ContinuationPolicy,
    pub report: ReportOptions,
}

/// Result of a run
#[derive(Debug, Clone)]
pub struct ConsolidationOutcome {
    pub report: MonitoringReport,
    pub diagnostics: Vec<Diagnostic>,
    /// Reference dates of the batches actually applied, oldest first
    pub applied_batches: Vec<NaiveDate>,
}

/// A batch plus the (source, 1-based row) each of its observations came from
#[derive(Debug, Clone)]
struct OrderedBatch {
    batch: ObservationBatch,
    origins: Vec<(String, usize)>,
}

/// Sort batches by reference date and merge batches sharing a date.
///
/// The sort is stable, so rows of later inputs follow earlier ones inside a
/// merged batch and win the duplicate-id policy.
fn order_batches(mut batches: Vec<ObservationBatch>) -> Vec<OrderedBatch> {
    batches.sort_by_key(|batch| batch.reference_date);

    let mut ordered: Vec<OrderedBatch> = Vec::new();
    for batch in batches {
        let origins: Vec<(String, usize)> = (1..=batch.observations.len())
            .map(|row| (batch.source.clone(), row))
            .collect();

        match ordered.last_mut() {
            Some(last) if last.batch.reference_date == batch.reference_date => {
                last.batch.source = format!("{} + {}", last.batch.source, batch.source);
                last.batch.observations.extend(batch.observations);
                last.origins.extend(origins);
            }
            _ => ordered.push(OrderedBatch { batch, origins }),
        }
    }
    ordered
}

/// Run the consolidation.
///
/// Fails only on fatal conditions; everything recoverable ends up in
/// [`ConsolidationOutcome::diagnostics`].
pub fn consolidate(
    inputs: ConsolidationInputs,
    options: &EngineOptions,
) -> MonitorResult<ConsolidationOutcome> {
    let ConsolidationInputs {
        batches,
        snapshot,
        prior_history,
        targets,
        mut diagnostics,
    } = inputs;

    let mut store = HistoryStore::new(options.continuation);
    if !snapshot.is_empty() {
        store.seed(snapshot, prior_history);
    }

    let mut applied_batches = Vec::new();
    for ordered in order_batches(batches) {
        let batch_date = ordered.batch.reference_date;

        if let Some(watermark) = store.watermark().filter(|w| batch_date <= *w) {
            tracing::warn!(
                batch_date = %batch_date,
                watermark = %watermark,
                source = %ordered.batch.source,
                "Skipping batch already covered by the snapshot"
            );
            diagnostics.push(Diagnostic::new(
                ordered.batch.source.clone(),
                DiagnosticKind::StaleBatch {
                    batch_date,
                    watermark,
                },
            ));
            continue;
        }

        // Every row rejected at load time; applying it would close every entity
        if ordered.batch.is_empty() {
            tracing::warn!(
                batch_date = %batch_date,
                source = %ordered.batch.source,
                "Skipping batch without usable rows"
            );
            diagnostics.push(Diagnostic::new(
                ordered.batch.source.clone(),
                DiagnosticKind::EmptyBatch { batch_date },
            ));
            continue;
        }

        let outcome = store.apply_batch(&ordered.batch)?;
        for (index, entity_id) in outcome.duplicates {
            let (source, row) = ordered.origins[index].clone();
            diagnostics.push(Diagnostic::at_row(
                source,
                row,
                DiagnosticKind::DuplicateEntityInBatch {
                    entity_id: entity_id.to_string(),
                },
            ));
        }
        applied_batches.push(batch_date);
    }

    let as_of = store.as_of();
    let records = store.finalize();
    let report = build_report(&records, &targets, as_of, &options.report);

    for status in report.unrecognized_statuses() {
        diagnostics.push(Diagnostic::new(
            "targets",
            DiagnosticKind::UnrecognizedStatus {
                status: status.to_string(),
            },
        ));
    }

    tracing::info!(
        entities = report.consolidated.len(),
        batches = applied_batches.len(),
        breaching = report.entity_ranking.len(),
        diagnostics = diagnostics.len(),
        "Consolidation complete"
    );

    Ok(ConsolidationOutcome {
        report,
        diagnostics,
        applied_batches,
    })
}
