//! Report sinks
//!
//! [`CsvDirectorySink`] writes one CSV per report table plus a JSON summary:
//!
//! | file                          | contents                              |
//! |-------------------------------|---------------------------------------|
//! | `monitoramento.csv`           | consolidated table, next run's snapshot |
//! | `historico_status.csv`        | status intervals                      |
//! | `ranking_postos_atraso.csv`   | breaching entities per location       |
//! | `ranking_os_atraso.csv`       | breaching entities                    |
//! | `ranking_status_atraso.csv`   | breaching entities per status         |
//! | `diagnosticos.csv`            | everything skipped or noticed         |
//! | `resumo.json`                 | headline figures and diagnostics      |

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use os_monitor_types::Diagnostic;

use super::schema::*;
use crate::error::{MonitorError, MonitorResult};
use crate::report::{MonitoringReport, ReportSummary};

pub const CONSOLIDATED_FILE: &str = "monitoramento.csv";
pub const HISTORY_FILE: &str = "historico_status.csv";
pub const LOCATION_RANKING_FILE: &str = "ranking_postos_atraso.csv";
pub const ENTITY_RANKING_FILE: &str = "ranking_os_atraso.csv";
pub const STATUS_RANKING_FILE: &str = "ranking_status_atraso.csv";
pub const DIAGNOSTICS_FILE: &str = "diagnosticos.csv";
pub const SUMMARY_FILE: &str = "resumo.json";

/// Destination of a finished run
pub trait ReportSink {
    fn write_report(
        &mut self,
        report: &MonitoringReport,
        diagnostics: &[Diagnostic],
    ) -> MonitorResult<()>;
}

/// Writes the report tables into a directory, creating it if needed
#[derive(Debug, Clone)]
pub struct CsvDirectorySink {
    dir: PathBuf,
}

#[derive(Serialize)]
struct SummaryDocument<'a> {
    #[serde(flatten)]
    summary: ReportSummary,
    diagnostics: &'a [Diagnostic],
}

impl CsvDirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the consolidated table, usable as the next run's snapshot
    pub fn consolidated_path(&self) -> PathBuf {
        self.dir.join(CONSOLIDATED_FILE)
    }

    fn writer(&self, name: &str) -> MonitorResult<csv::Writer<File>> {
        let path = self.dir.join(name);
        let file = File::create(&path).map_err(|source| MonitorError::io(&path, source))?;
        Ok(csv::Writer::from_writer(file))
    }

    fn write_consolidated(&self, report: &MonitoringReport) -> MonitorResult<()> {
        let mut wtr = self.writer(CONSOLIDATED_FILE)?;

        let mut header: Vec<String> = [
            COL_ENTITY_ID,
            COL_LOCATION,
            COL_STATUS,
            COL_TAT,
            COL_LAST_SEEN,
            COL_STATUS_SINCE,
            COL_DAYS_IN_STATUS,
            COL_TARGET,
            COL_DAYS_OVER,
            COL_CLOSED,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        header.extend(
            report
                .status_columns
                .iter()
                .map(|status| days_in_column(status.as_str())),
        );
        header.extend([COL_MODEL, COL_SERIAL, COL_PART_DELIVERY].map(String::from));
        wtr.write_record(&header)?;

        for row in &report.consolidated {
            let mut record = vec![
                row.entity_id.to_string(),
                row.location.clone().unwrap_or_default(),
                row.status.to_string(),
                row.tat.clone().unwrap_or_default(),
                format_date(row.last_seen),
                format_date(row.status_since),
                row.days_in_status.to_string(),
                format_optional(row.target),
                format_optional(row.days_over_target),
                format_flag(row.closed).to_string(),
            ];
            record.extend(
                report
                    .status_columns
                    .iter()
                    .map(|status| format_optional(row.days_by_status.get(status))),
            );
            record.push(row.model.clone().unwrap_or_default());
            record.push(row.serial.clone().unwrap_or_default());
            record.push(row.part_delivery.clone().unwrap_or_default());
            wtr.write_record(&record)?;
        }

        wtr.flush().map_err(|source| MonitorError::io(self.consolidated_path(), source))
    }

    fn write_history(&self, report: &MonitoringReport) -> MonitorResult<()> {
        let mut wtr = self.writer(HISTORY_FILE)?;
        wtr.write_record([
            COL_ENTITY_ID,
            COL_LOCATION,
            COL_INTERVAL_STATUS,
            COL_INTERVAL_START,
            COL_INTERVAL_END,
            COL_BUSINESS_DAYS,
            COL_TARGET,
            COL_DAYS_OVER,
        ])?;

        for row in &report.history {
            wtr.write_record([
                row.entity_id.to_string(),
                row.location.clone().unwrap_or_default(),
                row.status.to_string(),
                format_date(row.start),
                format_optional(row.end.map(format_date)),
                row.business_days.to_string(),
                format_optional(row.target),
                format_optional(row.days_over_target),
            ])?;
        }

        wtr.flush()
            .map_err(|source| MonitorError::io(self.dir.join(HISTORY_FILE), source))
    }

    fn write_rankings(&self, report: &MonitoringReport) -> MonitorResult<()> {
        let mut wtr = self.writer(LOCATION_RANKING_FILE)?;
        wtr.write_record([COL_LOCATION, COL_ENTITY_COUNT, COL_TOTAL_DAYS_OVER])?;
        for row in &report.location_ranking {
            wtr.write_record([
                row.location.clone(),
                row.breaching_entities.to_string(),
                row.total_days_over_target.to_string(),
            ])?;
        }
        wtr.flush()
            .map_err(|source| MonitorError::io(self.dir.join(LOCATION_RANKING_FILE), source))?;

        let mut wtr = self.writer(ENTITY_RANKING_FILE)?;
        wtr.write_record([
            COL_ENTITY_ID,
            COL_LOCATION,
            COL_STATUS,
            COL_DAYS_IN_STATUS,
            COL_TARGET,
            COL_DAYS_OVER,
        ])?;
        for row in &report.entity_ranking {
            wtr.write_record([
                row.entity_id.to_string(),
                row.location.clone().unwrap_or_default(),
                row.status.to_string(),
                row.days_in_status.to_string(),
                row.target.to_string(),
                row.days_over_target.to_string(),
            ])?;
        }
        wtr.flush()
            .map_err(|source| MonitorError::io(self.dir.join(ENTITY_RANKING_FILE), source))?;

        let mut wtr = self.writer(STATUS_RANKING_FILE)?;
        wtr.write_record([COL_STATUS, COL_ENTITY_COUNT, COL_TOTAL_DAYS_OVER])?;
        for row in &report.status_ranking {
            wtr.write_record([
                row.status.to_string(),
                row.breaching_entities.to_string(),
                row.total_days_over_target.to_string(),
            ])?;
        }
        wtr.flush()
            .map_err(|source| MonitorError::io(self.dir.join(STATUS_RANKING_FILE), source))
    }

    fn write_diagnostics(&self, diagnostics: &[Diagnostic]) -> MonitorResult<()> {
        let mut wtr = self.writer(DIAGNOSTICS_FILE)?;
        wtr.write_record(["Origem", "Linha", "Tipo", "Mensagem"])?;
        for diagnostic in diagnostics {
            let kind = serde_json::to_value(&diagnostic.kind)?
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or_default()
                .to_string();
            wtr.write_record([
                diagnostic.source.clone(),
                format_optional(diagnostic.row),
                kind,
                diagnostic.kind.to_string(),
            ])?;
        }
        wtr.flush()
            .map_err(|source| MonitorError::io(self.dir.join(DIAGNOSTICS_FILE), source))
    }

    fn write_summary(
        &self,
        report: &MonitoringReport,
        diagnostics: &[Diagnostic],
    ) -> MonitorResult<()> {
        let path = self.dir.join(SUMMARY_FILE);
        let document = SummaryDocument {
            summary: report.summary(),
            diagnostics,
        };
        let json = serde_json::to_string_pretty(&document)?;
        let mut file = File::create(&path).map_err(|source| MonitorError::io(&path, source))?;
        file.write_all(json.as_bytes())
            .map_err(|source| MonitorError::io(&path, source))
    }
}

impl ReportSink for CsvDirectorySink {
    fn write_report(
        &mut self,
        report: &MonitoringReport,
        diagnostics: &[Diagnostic],
    ) -> MonitorResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(|source| MonitorError::io(&self.dir, source))?;

        self.write_consolidated(report)?;
        self.write_history(report)?;
        self.write_rankings(report)?;
        self.write_diagnostics(diagnostics)?;
        self.write_summary(report, diagnostics)?;

        tracing::info!(dir = %self.dir.display(), "Report written");
        Ok(())
    }
}
