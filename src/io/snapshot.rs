//! Snapshot reader
//!
//! The snapshot is the consolidated table of a previous run
//! (`monitoramento.csv`). Reading it back restores each entity's current
//! status, last observation date, and "Dias em: <status>" counters.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use os_monitor_types::{
    non_empty, Diagnostic, DiagnosticKind, EntityId, ObservationAttributes, SnapshotEntry,
    StatusLabel,
};

use super::schema::{
    cell, parse_date, parse_day_count, parse_flag, sniff_delimiter, HeaderIndex, COL_CLOSED,
    COL_ENTITY_ID, COL_LAST_SEEN, COL_LOCATION, COL_MODEL, COL_PART_DELIVERY, COL_SERIAL,
    COL_STATUS, COL_STATUS_SINCE, COL_TAT, DAYS_IN_PREFIX,
};
use crate::error::{MonitorError, MonitorResult};

/// Read a snapshot file. A missing file means a first run and yields no
/// entries.
pub fn read_snapshot(path: &Path) -> MonitorResult<(Vec<SnapshotEntry>, Vec<Diagnostic>)> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "No snapshot found, starting from scratch");
        return Ok((Vec::new(), Vec::new()));
    }

    let content =
        std::fs::read_to_string(path).map_err(|source| MonitorError::io(path, source))?;
    let source = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let (entries, diagnostics) = parse_snapshot(&content, &source)?;
    tracing::info!(
        path = %path.display(),
        entities = entries.len(),
        skipped = diagnostics.len(),
        "Loaded snapshot"
    );
    Ok((entries, diagnostics))
}

/// Parse snapshot content.
///
/// A snapshot lacking the id, status or last-observation column is reported
/// and ignored as a whole; malformed rows and counters are reported one by
/// one. An id listed twice keeps its last row, at the position of the first,
/// and the dropped row is reported.
pub fn parse_snapshot(
    content: &str,
    source: &str,
) -> MonitorResult<(Vec<SnapshotEntry>, Vec<Diagnostic>)> {
    let mut diagnostics = Vec::new();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(content))
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader.headers()?.clone();
    let index = HeaderIndex::new(&headers);

    let id_col = index.position(COL_ENTITY_ID);
    let status_col = index.position(COL_STATUS);
    let last_seen_col = index.position(COL_LAST_SEEN);
    for (name, found) in [
        (COL_ENTITY_ID, id_col),
        (COL_STATUS, status_col),
        (COL_LAST_SEEN, last_seen_col),
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
        tracing::warn!(source = %source, "Snapshot lacks required columns, ignoring it");
        return Ok((Vec::new(), diagnostics));
    }

    let since_col = index.position(COL_STATUS_SINCE);
    let closed_col = index.position(COL_CLOSED);
    let location_col = index.position(COL_LOCATION);
    let tat_col = index.position(COL_TAT);
    let model_col = index.position(COL_MODEL);
    let serial_col = index.position(COL_SERIAL);
    let part_col = index.position(COL_PART_DELIVERY);

    // (column position, full header, normalized status)
    let counter_cols: Vec<(usize, String, StatusLabel)> = index
        .with_prefix(&headers, DAYS_IN_PREFIX)
        .filter_map(|(idx, status)| {
            let label = StatusLabel::normalize(status).ok()?;
            Some((idx, headers.get(idx)?.trim().to_string(), label))
        })
        .collect();

    let mut entries: Vec<SnapshotEntry> = Vec::new();
    // id -> (position in entries, row number of the kept row)
    let mut positions: HashMap<EntityId, (usize, usize)> = HashMap::new();
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

        let missing = |field: &str| {
            Diagnostic::at_row(
                source,
                row_number,
                DiagnosticKind::MissingRequiredField {
                    field: field.to_string(),
                },
            )
        };

        let Ok(entity_id) = EntityId::parse(cell(&row, id_col)) else {
            diagnostics.push(missing(COL_ENTITY_ID));
            continue;
        };
        let Ok(status) = StatusLabel::normalize(cell(&row, status_col)) else {
            diagnostics.push(missing(COL_STATUS));
            continue;
        };
        let Some(last_seen) = parse_date(cell(&row, last_seen_col)) else {
            diagnostics.push(missing(COL_LAST_SEEN));
            continue;
        };

        let mut days_by_status = BTreeMap::new();
        for (col, header, label) in &counter_cols {
            let raw = cell(&row, Some(*col));
            match parse_day_count(raw) {
                Ok(Some(days)) => {
                    days_by_status.insert(label.clone(), days);
                }
                Ok(None) => {}
                Err(_) => diagnostics.push(Diagnostic::at_row(
                    source,
                    row_number,
                    DiagnosticKind::InvalidNumber {
                        column: header.clone(),
                        raw: raw.to_string(),
                    },
                )),
            }
        }

        let entry = SnapshotEntry {
            entity_id,
            status,
            attributes: ObservationAttributes {
                location: non_empty(cell(&row, location_col)),
                tat: non_empty(cell(&row, tat_col)),
                model: non_empty(cell(&row, model_col)),
                serial: non_empty(cell(&row, serial_col)),
                part_delivery: non_empty(cell(&row, part_col)),
            },
            last_seen,
            status_since: parse_date(cell(&row, since_col)),
            days_by_status,
            closed: parse_flag(cell(&row, closed_col)),
        };

        match positions.get_mut(&entry.entity_id) {
            Some((position, kept_row)) => {
                tracing::warn!(
                    source = %source,
                    entity_id = %entry.entity_id,
                    dropped_row = *kept_row,
                    "Entity listed twice in snapshot, keeping the later row"
                );
                diagnostics.push(Diagnostic::at_row(
                    source,
                    *kept_row,
                    DiagnosticKind::DuplicateEntityInSnapshot {
                        entity_id: entry.entity_id.to_string(),
                    },
                ));
                *kept_row = row_number;
                entries[*position] = entry;
            }
            None => {
                positions.insert(entry.entity_id.clone(), (entries.len(), row_number));
                entries.push(entry);
            }
        }
    }

    Ok((entries, diagnostics))
}
