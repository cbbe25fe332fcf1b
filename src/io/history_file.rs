//! History reader
//!
//! Reads back the status-interval table of a previous run
//! (`historico_status.csv`). Only closed intervals are kept: the open one of
//! each entity is rebuilt from the snapshot.

use std::path::Path;

use os_monitor_types::{Diagnostic, DiagnosticKind, EntityId, StatusInterval, StatusLabel};

use super::schema::{
    cell, parse_date, sniff_delimiter, HeaderIndex, COL_ENTITY_ID, COL_INTERVAL_END,
    COL_INTERVAL_START, COL_INTERVAL_STATUS,
};
use crate::error::{MonitorError, MonitorResult};
use crate::history::PriorHistory;

/// Read a history file. A missing file yields no intervals.
pub fn read_history(path: &Path) -> MonitorResult<(PriorHistory, Vec<Diagnostic>)> {
    if !path.exists() {
        tracing::info!(
            path = %path.display(),
            "No history file found, closed intervals start empty"
        );
        return Ok((PriorHistory::new(), Vec::new()));
    }

    let content =
        std::fs::read_to_string(path).map_err(|source| MonitorError::io(path, source))?;
    let source = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let (history, diagnostics) = parse_history(&content, &source)?;
    tracing::info!(
        path = %path.display(),
        entities = history.len(),
        intervals = history.values().map(Vec::len).sum::<usize>(),
        skipped = diagnostics.len(),
        "Loaded history"
    );
    Ok((history, diagnostics))
}

/// Parse history content into the closed intervals of each entity, in file
/// order.
pub fn parse_history(
    content: &str,
    source: &str,
) -> MonitorResult<(PriorHistory, Vec<Diagnostic>)> {
    let mut diagnostics = Vec::new();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(content))
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader.headers()?.clone();
    let index = HeaderIndex::new(&headers);

    let id_col = index.position(COL_ENTITY_ID);
    let status_col = index.position(COL_INTERVAL_STATUS);
    let start_col = index.position(COL_INTERVAL_START);
    let end_col = index.position(COL_INTERVAL_END);
    for (name, found) in [
        (COL_ENTITY_ID, id_col),
        (COL_INTERVAL_STATUS, status_col),
        (COL_INTERVAL_START, start_col),
        (COL_INTERVAL_END, end_col),
    ] {
        if found.is_none() {
            diagnostics.push(Diagnostic::new(
                source,
                DiagnosticKind::MissingRequiredColumn {
                    column: name.to_string(),
                },
            ));
        }
    }
    if !diagnostics.is_empty() {
        tracing::warn!(source = %source, "History lacks required columns, ignoring it");
        return Ok((PriorHistory::new(), diagnostics));
    }

    let mut history = PriorHistory::new();
    for (idx, result) in reader.records().enumerate() {
        let row_number = idx + 1;
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                diagnostics.push(Diagnostic::at_row(
                    source,
                    row_number,
                    DiagnosticKind::UnreadableSource {
                        reason: e.to_string(),
                    },
                ));
                continue;
            }
        };
        if row.iter().all(|value| value.trim().is_empty()) {
            continue;
        }

        let end_raw = cell(&row, end_col);
        if end_raw.trim().is_empty() {
            continue;
        }

        let missing = |field: &str| {
            Diagnostic::at_row(
                source,
                row_number,
                DiagnosticKind::MissingRequiredField {
                    field: field.to_string(),
                },
            )
        };
        let not_a_date = |column: &str, raw: &str| {
            Diagnostic::at_row(
                source,
                row_number,
                DiagnosticKind::InvalidDate {
                    column: column.to_string(),
                    raw: raw.to_string(),
                },
            )
        };

        let Ok(entity_id) = EntityId::parse(cell(&row, id_col)) else {
            diagnostics.push(missing(COL_ENTITY_ID));
            continue;
        };
        let Ok(status) = StatusLabel::normalize(cell(&row, status_col)) else {
            diagnostics.push(missing(COL_INTERVAL_STATUS));
            continue;
        };
        let start_raw = cell(&row, start_col);
        if start_raw.trim().is_empty() {
            diagnostics.push(missing(COL_INTERVAL_START));
            continue;
        }
        let Some(start) = parse_date(start_raw) else {
            diagnostics.push(not_a_date(COL_INTERVAL_START, start_raw));
            continue;
        };
        let Some(end) = parse_date(end_raw) else {
            diagnostics.push(not_a_date(COL_INTERVAL_END, end_raw));
            continue;
        };

        history.entry(entity_id).or_default().push(StatusInterval {
            status,
            start,
            end: Some(end),
        });
    }

    Ok((history, diagnostics))
}
