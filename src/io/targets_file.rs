//! Target table loader
//!
//! Accepts a CSV with `Status` and `Meta` columns, or a YAML map of
//! status → business days (`.yaml` / `.yml`). Without a usable target table
//! no delay can be computed, so an absent or unreadable file is fatal.

use std::collections::BTreeMap;
use std::path::Path;

use os_monitor_types::{Diagnostic, DiagnosticKind};

use super::schema::{cell, parse_day_count, sniff_delimiter, HeaderIndex, COL_TARGET};
use crate::error::{MonitorError, MonitorResult};
use crate::targets::TargetTable;

const COL_TARGET_STATUS: &str = "Status";

/// Load the target table from `path`
pub fn load_targets(path: &Path) -> MonitorResult<(TargetTable, Vec<Diagnostic>)> {
    let content =
        std::fs::read_to_string(path).map_err(|e| MonitorError::MissingTargetMapping {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let is_yaml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));

    let (table, diagnostics) = if is_yaml {
        let table =
            parse_targets_yaml(&content).map_err(|e| MonitorError::MissingTargetMapping {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        (table, Vec::new())
    } else {
        let source = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        parse_targets_csv(&content, &source).map_err(|reason| {
            MonitorError::MissingTargetMapping {
                path: path.to_path_buf(),
                reason,
            }
        })?
    };

    tracing::info!(path = %path.display(), statuses = table.len(), "Loaded targets");
    Ok((table, diagnostics))
}

/// Parse a YAML status → days map
pub fn parse_targets_yaml(content: &str) -> MonitorResult<TargetTable> {
    let map: BTreeMap<String, u32> = serde_yaml::from_str(content)?;
    Ok(map.into_iter().collect())
}

/// Parse a CSV target table.
///
/// Fails when the `Status` or `Meta` column is absent; bad rows become
/// diagnostics.
pub fn parse_targets_csv(
    content: &str,
    source: &str,
) -> Result<(TargetTable, Vec<Diagnostic>), String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(content))
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader.headers().map_err(|e| e.to_string())?.clone();
    let index = HeaderIndex::new(&headers);
    let (Some(status_col), Some(target_col)) =
        (index.position(COL_TARGET_STATUS), index.position(COL_TARGET))
    else {
        return Err(format!(
            "expected '{}' and '{}' columns",
            COL_TARGET_STATUS, COL_TARGET
        ));
    };

    let mut table = TargetTable::new();
    let mut diagnostics = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let row_number = idx + 1;
        let row = result.map_err(|e| e.to_string())?;
        if row.iter().all(|value| value.trim().is_empty()) {
            continue;
        }

        let raw = cell(&row, Some(target_col));
        let days = match parse_day_count(raw) {
            Ok(Some(days)) => days,
            Ok(None) => {
                diagnostics.push(Diagnostic::at_row(
                    source,
                    row_number,
                    DiagnosticKind::MissingRequiredField {
                        field: COL_TARGET.to_string(),
                    },
                ));
                continue;
            }
            Err(_) => {
                diagnostics.push(Diagnostic::at_row(
                    source,
                    row_number,
                    DiagnosticKind::InvalidNumber {
                        column: COL_TARGET.to_string(),
                        raw: raw.to_string(),
                    },
                ));
                continue;
            }
        };

        if !table.insert(cell(&row, Some(status_col)), days) {
            diagnostics.push(Diagnostic::at_row(
                source,
                row_number,
                DiagnosticKind::MissingRequiredField {
                    field: COL_TARGET_STATUS.to_string(),
                },
            ));
        }
    }

    Ok((table, diagnostics))
}
