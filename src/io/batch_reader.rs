//! Periodic extract reader
//!
//! An extract is a CSV export of the "Base" sheet. Its reference date is taken
//! from the last whitespace-separated token of the file name, day first
//! (`Base Monitoramento 04-03-2024.csv`).

use std::path::Path;

use chrono::NaiveDate;

use os_monitor_types::{
    non_empty, Diagnostic, DiagnosticKind, EntityId, ObservationAttributes, ObservationBatch,
    StatusLabel,
};

use super::schema::{cell, sniff_delimiter, HeaderIndex};
use crate::config::ColumnMapping;

const NAME_DATE_FORMATS: &[&str] = &[
    "%d-%m-%Y", "%d.%m.%Y", "%d_%m_%Y", "%Y-%m-%d", "%d-%m-%y", "%d%m%Y",
];

/// Derive a batch's reference date from its file name
pub fn reference_date_from_name(name: &str) -> Option<NaiveDate> {
    let stem = Path::new(name).file_stem()?.to_str()?;
    let token = stem.split_whitespace().last()?;

    NAME_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(token, fmt).ok())
}

/// Read one extract file.
///
/// Returns `None` for the batch when it has to be skipped entirely; the
/// reason is among the returned diagnostics.
pub fn read_batch_file(
    path: &Path,
    columns: &ColumnMapping,
) -> (Option<ObservationBatch>, Vec<Diagnostic>) {
    let source = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let Some(reference_date) = reference_date_from_name(&source) else {
        tracing::warn!(source = %source, "No reference date in file name");
        return (
            None,
            vec![Diagnostic::new(
                source.clone(),
                DiagnosticKind::UnparseableBatchDate { raw: source },
            )],
        );
    };

    match std::fs::read_to_string(path) {
        Ok(content) => parse_batch(&content, &source, reference_date, columns),
        Err(e) => {
            tracing::warn!(source = %source, error = %e, "Extract could not be read");
            (
                None,
                vec![Diagnostic::new(
                    source,
                    DiagnosticKind::UnreadableSource {
                        reason: e.to_string(),
                    },
                )],
            )
        }
    }
}

/// Parse extract content dated `reference_date`
pub fn parse_batch(
    content: &str,
    source: &str,
    reference_date: NaiveDate,
    columns: &ColumnMapping,
) -> (Option<ObservationBatch>, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(content))
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(e) => {
            diagnostics.push(Diagnostic::new(
                source,
                DiagnosticKind::UnreadableSource {
                    reason: e.to_string(),
                },
            ));
            return (None, diagnostics);
        }
    };
    let index = HeaderIndex::new(&headers);

    let id_col = index.position(&columns.entity_id);
    let status_col = index.position(&columns.status);
    for (name, found) in [(&columns.entity_id, id_col), (&columns.status, status_col)] {
        if found.is_none() {
            diagnostics.push(Diagnostic::new(
                source,
                DiagnosticKind::MissingRequiredColumn {
                    column: name.clone(),
                },
            ));
        }
    }
    if !diagnostics.is_empty() {
        tracing::warn!(source = %source, "Extract lacks required columns, skipping batch");
        return (None, diagnostics);
    }

    let location_col = index.position(&columns.location);
    let tat_col = index.position(&columns.tat);
    let model_col = index.position(&columns.model);
    let serial_col = index.position(&columns.serial);
    let part_col = index.position(&columns.part_delivery);

    let mut batch = ObservationBatch::new(reference_date, source);
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

        // blank spreadsheet lines
        if row.iter().all(|value| value.trim().is_empty()) {
            continue;
        }

        let entity_id = match EntityId::parse(cell(&row, id_col)) {
            Ok(id) => id,
            Err(_) => {
                diagnostics.push(Diagnostic::at_row(
                    source,
                    row_number,
                    DiagnosticKind::MissingRequiredField {
                        field: columns.entity_id.clone(),
                    },
                ));
                continue;
            }
        };
        let status = match StatusLabel::normalize(cell(&row, status_col)) {
            Ok(status) => status,
            Err(_) => {
                diagnostics.push(Diagnostic::at_row(
                    source,
                    row_number,
                    DiagnosticKind::MissingRequiredField {
                        field: columns.status.clone(),
                    },
                ));
                continue;
            }
        };

        let attributes = ObservationAttributes {
            location: non_empty(cell(&row, location_col)),
            tat: non_empty(cell(&row, tat_col)),
            model: non_empty(cell(&row, model_col)),
            serial: non_empty(cell(&row, serial_col)),
            part_delivery: non_empty(cell(&row, part_col)),
        };
        batch.push(entity_id, status, attributes);
    }

    tracing::debug!(
        source = %source,
        batch_date = %reference_date,
        rows = batch.len(),
        skipped = diagnostics.len(),
        "Parsed extract"
    );

    (Some(batch), diagnostics)
}

/// Read every extract, collecting the diagnostics of all of them
pub fn load_batches<P: AsRef<Path>>(
    paths: &[P],
    columns: &ColumnMapping,
) -> (Vec<ObservationBatch>, Vec<Diagnostic>) {
    let mut batches = Vec::with_capacity(paths.len());
    let mut diagnostics = Vec::new();

    for path in paths {
        let (batch, mut found) = read_batch_file(path.as_ref(), columns);
        batches.extend(batch);
        diagnostics.append(&mut found);
    }

    (batches, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_reference_date_from_name() {
        assert_eq!(
            reference_date_from_name("Monitoramento Direcionado 04-03-2024.csv"),
            Some(date(2024, 3, 4))
        );
        assert_eq!(
            reference_date_from_name("base 04.03.2024.csv"),
            Some(date(2024, 3, 4))
        );
        assert_eq!(
            reference_date_from_name("/tmp/up/base 2024-03-04.csv"),
            Some(date(2024, 3, 4))
        );
        assert_eq!(reference_date_from_name("base 04-03-24.csv"), Some(date(2024, 3, 4)));
        assert_eq!(reference_date_from_name("base final.csv"), None);
    }

    #[test]
    fn test_parse_batch_reads_rows_and_attributes() {
        let content = "OS ID;Status OS;Cod Autorizada;TAT;Modelo\n\
                       101;reparo;A1;5;X\n\
                       102.0; Aguardando Peça ;;;\n";
        let (batch, diagnostics) =
            parse_batch(content, "base.csv", date(2024, 3, 4), &ColumnMapping::default());
        let batch = batch.unwrap();

        assert!(diagnostics.is_empty());
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.observations[0].status.as_str(), "REPARO");
        assert_eq!(batch.observations[0].attributes.location.as_deref(), Some("A1"));
        assert_eq!(batch.observations[1].entity_id.as_str(), "102");
        assert_eq!(batch.observations[1].status.as_str(), "AGUARDANDO PEÇA");
        assert_eq!(batch.observations[1].attributes.location, None);
    }

    #[test]
    fn test_rows_without_id_or_status_are_reported() {
        let content = "OS ID,Status OS\n,REPARO\n5,\n\n6,PECA\n";
        let (batch, diagnostics) =
            parse_batch(content, "base.csv", date(2024, 3, 4), &ColumnMapping::default());

        assert_eq!(batch.unwrap().len(), 1);
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].row, Some(1));
        assert_eq!(diagnostics[1].row, Some(2));
    }

    #[test]
    fn test_missing_required_column_skips_batch() {
        let content = "OS ID,Situacao\n1,REPARO\n";
        let (batch, diagnostics) =
            parse_batch(content, "base.csv", date(2024, 3, 4), &ColumnMapping::default());

        assert!(batch.is_none());
        assert_eq!(
            diagnostics[0].kind,
            DiagnosticKind::MissingRequiredColumn {
                column: "Status OS".to_string()
            }
        );
    }

    #[test]
    fn test_custom_column_mapping() {
        let columns = ColumnMapping {
            status: "Situacao".to_string(),
            ..Default::default()
        };
        let (batch, diagnostics) =
            parse_batch("OS ID,Situacao\n1,REPARO\n", "b.csv", date(2024, 3, 4), &columns);

        assert!(diagnostics.is_empty());
        assert_eq!(batch.unwrap().len(), 1);
    }

    #[test]
    fn test_unparseable_file_name_is_reported() {
        let (batch, diagnostics) =
            read_batch_file(Path::new("sem data.csv"), &ColumnMapping::default());

        assert!(batch.is_none());
        assert!(matches!(
            diagnostics[0].kind,
            DiagnosticKind::UnparseableBatchDate { .. }
        ));
    }
}
