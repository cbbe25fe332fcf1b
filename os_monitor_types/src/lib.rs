//! OS Monitor Types - Level 1 Foundation Types
//!
//! This crate contains the pure data structures shared by the consolidation
//! engine and its adapters. It depends on nothing else in the workspace.
//!
//! ## Contents
//!
//! - Identity types: [`EntityId`], [`StatusLabel`]
//! - Input types: [`Observation`], [`ObservationBatch`]
//! - History types: [`StatusInterval`]
//! - Diagnostics: [`Diagnostic`], [`DiagnosticKind`]
//! - Report rows: consolidated, interval history and ranking rows
//!
//! ## Rules
//!
//! 1. **NO BUSINESS LOGIC** - normalization and constructors only
//! 2. **SERIALIZABLE** - every type supports serde
//! 3. **NO WORKSPACE DEPENDENCIES**

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

// ============================================================================
// ERRORS
// ============================================================================

/// Errors raised while constructing foundation types from raw cell values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypesError {
    #[error("entity id is empty")]
    EmptyEntityId,

    #[error("status label is empty")]
    EmptyStatus,
}

// ============================================================================
// IDENTITY
// ============================================================================

/// Service-order identifier ("OS ID"), the sole identity key of an entity.
///
/// Ordering is numeric for all-digit ids (`"9"` < `"10"`); all-digit ids
/// sort before any other id, which compare as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Parse a raw cell value into an entity id.
    ///
    /// The value is trimmed. Spreadsheet exports render integer ids as
    /// floats (`"4471.0"`), so a purely numeric value with an all-zero
    /// fractional part is reduced to its integer text.
    pub fn parse(raw: &str) -> Result<Self, TypesError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TypesError::EmptyEntityId);
        }

        if let Some((int_part, frac)) = trimmed.split_once('.') {
            let numeric = !int_part.is_empty() && int_part.chars().all(|c| c.is_ascii_digit());
            let zero_frac = !frac.is_empty() && frac.chars().all(|c| c == '0');
            if numeric && zero_frac {
                return Ok(Self(int_part.to_string()));
            }
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl EntityId {
    /// Digits without leading zeros, for all-digit ids
    fn numeric_digits(&self) -> Option<&str> {
        let all_digits = !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_digit());
        all_digits.then(|| self.0.trim_start_matches('0'))
    }
}

impl Ord for EntityId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric_digits(), other.numeric_digits()) {
            // Equal magnitudes ("7", "007") fall back to the text so the
            // order stays consistent with Eq
            (Some(a), Some(b)) => a
                .len()
                .cmp(&b.len())
                .then_with(|| a.cmp(b))
                .then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for EntityId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized status label ("Status OS"): trimmed and uppercased
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusLabel(String);

impl StatusLabel {
    /// Normalize a raw status label
    pub fn normalize(raw: &str) -> Result<Self, TypesError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TypesError::EmptyStatus);
        }
        Ok(Self(trimmed.to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trim a raw descriptive cell; empty cells become `None`
pub fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ============================================================================
// OBSERVATIONS
// ============================================================================

/// Descriptive attributes carried by an observation row
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationAttributes {
    /// Authorized-location code ("Cod Autorizada")
    pub location: Option<String>,
    /// Target-turnaround attribute ("TAT")
    pub tat: Option<String>,
    /// Product model ("Modelo")
    pub model: Option<String>,
    /// Serial number ("Número de Série")
    pub serial: Option<String>,
    /// Part-delivery date as exported ("Entrega da Peça")
    pub part_delivery: Option<String>,
}

/// One row of one batch: the state of an entity on the batch's date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub entity_id: EntityId,
    pub status: StatusLabel,
    pub attributes: ObservationAttributes,
    /// Reference date of the batch the row belongs to
    pub reference_date: NaiveDate,
}

/// A periodic extract: every row shares one reference date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationBatch {
    /// Date the extract refers to
    pub reference_date: NaiveDate,
    /// Where the batch came from (file name), used in diagnostics
    pub source: String,
    /// Rows in file order
    pub observations: Vec<Observation>,
}

impl ObservationBatch {
    /// Create an empty batch
    pub fn new(reference_date: NaiveDate, source: impl Into<String>) -> Self {
        Self {
            reference_date,
            source: source.into(),
            observations: Vec::new(),
        }
    }

    /// Append a row, stamping it with the batch's reference date
    pub fn push(
        &mut self,
        entity_id: EntityId,
        status: StatusLabel,
        attributes: ObservationAttributes,
    ) {
        self.observations.push(Observation {
            entity_id,
            status,
            attributes,
            reference_date: self.reference_date,
        });
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// One entity of a previously consolidated snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub entity_id: EntityId,
    pub status: StatusLabel,
    pub attributes: ObservationAttributes,
    /// Date of the last batch the entity appeared in
    pub last_seen: NaiveDate,
    /// Start of the current status interval, when the snapshot recorded it
    pub status_since: Option<NaiveDate>,
    /// Restored "Dias em: <status>" counters
    pub days_by_status: BTreeMap<StatusLabel, u32>,
    pub closed: bool,
}

// ============================================================================
// STATUS HISTORY
// ============================================================================

/// A span of time an entity spent in one status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusInterval {
    pub status: StatusLabel,
    pub start: NaiveDate,
    /// `None` while the interval is the entity's current one
    pub end: Option<NaiveDate>,
}

impl StatusInterval {
    /// Open a new interval
    pub fn open(status: StatusLabel, start: NaiveDate) -> Self {
        Self {
            status,
            start,
            end: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }
}

// ============================================================================
// DIAGNOSTICS
// ============================================================================

/// Recoverable problems found while ingesting or consolidating
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum DiagnosticKind {
    #[error("could not derive a reference date from '{raw}'")]
    UnparseableBatchDate { raw: String },

    #[error("required column '{column}' is missing")]
    MissingRequiredColumn { column: String },

    #[error("required field '{field}' is empty")]
    MissingRequiredField { field: String },

    #[error("entity '{entity_id}' appears more than once in the batch, last occurrence kept")]
    DuplicateEntityInBatch { entity_id: String },

    #[error("entity '{entity_id}' appears more than once in the snapshot, last occurrence kept")]
    DuplicateEntityInSnapshot { entity_id: String },

    #[error("batch dated {batch_date} has no usable rows and was not applied")]
    EmptyBatch { batch_date: NaiveDate },

    #[error("batch dated {batch_date} is not after the snapshot's last observation {watermark}")]
    StaleBatch {
        batch_date: NaiveDate,
        watermark: NaiveDate,
    },

    #[error("value '{raw}' in column '{column}' is not a number")]
    InvalidNumber { column: String, raw: String },

    #[error("value '{raw}' in column '{column}' is not a date")]
    InvalidDate { column: String, raw: String },

    #[error("no target defined for status '{status}'")]
    UnrecognizedStatus { status: String },

    #[error("source could not be read: {reason}")]
    UnreadableSource { reason: String },
}

/// A diagnostic reported back to the caller of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// File or batch the problem was found in
    pub source: String,
    /// 1-based data row, when the problem concerns a single row
    pub row: Option<usize>,
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn new(source: impl Into<String>, kind: DiagnosticKind) -> Self {
        Self {
            source: source.into(),
            row: None,
            kind,
        }
    }

    pub fn at_row(source: impl Into<String>, row: usize, kind: DiagnosticKind) -> Self {
        Self {
            source: source.into(),
            row: Some(row),
            kind,
        }
    }

    /// Whether input data was dropped because of this diagnostic
    pub fn drops_data(&self) -> bool {
        !matches!(self.kind, DiagnosticKind::UnrecognizedStatus { .. })
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.row {
            Some(row) => write!(f, "{} (row {}): {}", self.source, row, self.kind),
            None => write!(f, "{}: {}", self.source, self.kind),
        }
    }
}

// ============================================================================
// REPORT ROWS
// ============================================================================

/// One row of the consolidated table ("monitoramento")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidatedRow {
    pub entity_id: EntityId,
    pub location: Option<String>,
    pub tat: Option<String>,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub part_delivery: Option<String>,
    /// Current status
    pub status: StatusLabel,
    /// Start of the current status interval
    pub status_since: NaiveDate,
    /// Date of the last batch the entity appeared in
    pub last_seen: NaiveDate,
    /// Accumulated business days in the current status
    pub days_in_status: u32,
    /// Target ("Meta") for the current status
    pub target: Option<u32>,
    /// Days over target ("Fora do Prazo"); `None` when no target exists
    pub days_over_target: Option<u32>,
    /// Entity absent from the most recent batch
    pub closed: bool,
    /// Accumulated business days per status ever visited
    pub days_by_status: BTreeMap<StatusLabel, u32>,
}

/// One row of the status-interval history table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalRow {
    pub entity_id: EntityId,
    pub location: Option<String>,
    pub status: StatusLabel,
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
    /// Inclusive business-day span of the interval
    pub business_days: u32,
    pub target: Option<u32>,
    pub days_over_target: Option<u32>,
}

/// Breaching entities grouped by authorized location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRankingRow {
    pub location: String,
    pub breaching_entities: usize,
    pub total_days_over_target: u32,
}

/// A single breaching entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRankingRow {
    pub entity_id: EntityId,
    pub location: Option<String>,
    pub status: StatusLabel,
    pub days_in_status: u32,
    pub target: u32,
    pub days_over_target: u32,
}

/// Breaching entities grouped by current status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRankingRow {
    pub status: StatusLabel,
    pub breaching_entities: usize,
    pub total_days_over_target: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_entity_id_trims_and_strips_float_suffix() {
        assert_eq!(EntityId::parse("  4471 ").unwrap().as_str(), "4471");
        assert_eq!(EntityId::parse("4471.0").unwrap().as_str(), "4471");
        assert_eq!(EntityId::parse("4471.00").unwrap().as_str(), "4471");
        assert_eq!(EntityId::parse("4471.5").unwrap().as_str(), "4471.5");
        assert_eq!(EntityId::parse("OS-12.0").unwrap().as_str(), "OS-12.0");
    }

    #[test]
    fn test_numeric_entity_ids_sort_by_value() {
        let mut ids: Vec<EntityId> = ["10", "OS-2", "9", "100", "009", "A1"]
            .iter()
            .map(|raw| EntityId::parse(raw).unwrap())
            .collect();
        ids.sort();

        let sorted: Vec<&str> = ids.iter().map(EntityId::as_str).collect();
        assert_eq!(sorted, vec!["009", "9", "10", "100", "A1", "OS-2"]);
        assert_ne!(
            EntityId::parse("7").unwrap().cmp(&EntityId::parse("007").unwrap()),
            Ordering::Equal
        );
    }

    #[test]
    fn test_entity_id_rejects_empty() {
        assert_eq!(EntityId::parse("   "), Err(TypesError::EmptyEntityId));
    }

    #[test]
    fn test_status_label_normalization() {
        let label = StatusLabel::normalize("  Aguardando peça ").unwrap();
        assert_eq!(label.as_str(), "AGUARDANDO PEÇA");
        assert_eq!(StatusLabel::normalize(""), Err(TypesError::EmptyStatus));
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(" A1 "), Some("A1".to_string()));
        assert_eq!(non_empty("  "), None);
    }

    #[test]
    fn test_batch_push_stamps_reference_date() {
        let mut batch = ObservationBatch::new(date(2024, 3, 4), "extract 04-03-2024.csv");
        batch.push(
            EntityId::parse("1").unwrap(),
            StatusLabel::normalize("reparo").unwrap(),
            ObservationAttributes::default(),
        );

        assert_eq!(batch.len(), 1);
        assert_eq!(batch.observations[0].reference_date, date(2024, 3, 4));
    }

    #[test]
    fn test_diagnostic_display_and_data_loss_flag() {
        let skipped = Diagnostic::at_row(
            "base.csv",
            3,
            DiagnosticKind::MissingRequiredField {
                field: "OS ID".to_string(),
            },
        );
        assert_eq!(
            skipped.to_string(),
            "base.csv (row 3): required field 'OS ID' is empty"
        );
        assert!(skipped.drops_data());

        let notice = Diagnostic::new(
            "report",
            DiagnosticKind::UnrecognizedStatus {
                status: "NOVO".to_string(),
            },
        );
        assert!(!notice.drops_data());
    }

    #[test]
    fn test_diagnostic_serializes_with_type_tag() {
        let diag = Diagnostic::new(
            "x.csv",
            DiagnosticKind::UnparseableBatchDate {
                raw: "x".to_string(),
            },
        );
        let json = serde_json::to_value(&diag).unwrap();
        assert_eq!(json["kind"]["type"], "unparseable_batch_date");
        assert_eq!(json["row"], serde_json::Value::Null);
    }
}
