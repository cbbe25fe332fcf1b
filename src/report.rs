//! Aggregation & ranking
//!
//! Turns the final entity records into the consolidated table, the
//! status-interval history and the three delay rankings. Rankings only
//! consider open entities whose current status is over target.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::Serialize;

use os_monitor_types::{
    ConsolidatedRow, EntityRankingRow, IntervalRow, LocationRankingRow, StatusLabel,
    StatusRankingRow,
};

use crate::calendar::business_days_between;
use crate::history::EntityRecord;
use crate::targets::TargetTable;

/// Label used when ranking entities that carry no location code
pub const DEFAULT_UNKNOWN_LOCATION: &str = "N/D";

/// Options for report finalization
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Group key for breaching entities without a location code
    pub unknown_location_label: String,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            unknown_location_label: DEFAULT_UNKNOWN_LOCATION.to_string(),
        }
    }
}

/// Everything handed to a report sink
#[derive(Debug, Clone, Serialize)]
pub struct MonitoringReport {
    /// Date of the newest consolidated batch
    pub as_of: Option<NaiveDate>,
    /// Every status ever observed, one "Dias em" column each
    pub status_columns: Vec<StatusLabel>,
    pub consolidated: Vec<ConsolidatedRow>,
    pub history: Vec<IntervalRow>,
    pub location_ranking: Vec<LocationRankingRow>,
    pub entity_ranking: Vec<EntityRankingRow>,
    pub status_ranking: Vec<StatusRankingRow>,
}

/// Headline figures of a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub as_of: Option<NaiveDate>,
    pub entities: usize,
    pub open_entities: usize,
    pub closed_entities: usize,
    pub breaching_entities: usize,
    pub intervals: usize,
}

impl MonitoringReport {
    pub fn summary(&self) -> ReportSummary {
        let closed_entities = self.consolidated.iter().filter(|row| row.closed).count();
        ReportSummary {
            as_of: self.as_of,
            entities: self.consolidated.len(),
            open_entities: self.consolidated.len() - closed_entities,
            closed_entities,
            breaching_entities: self.entity_ranking.len(),
            intervals: self.history.len(),
        }
    }

    /// Current statuses that have no target, in alphabetical order
    pub fn unrecognized_statuses(&self) -> BTreeSet<StatusLabel> {
        self.consolidated
            .iter()
            .filter(|row| row.target.is_none())
            .map(|row| row.status.clone())
            .collect()
    }
}

/// Build the full report from finalized records
pub fn build_report(
    records: &[EntityRecord],
    targets: &TargetTable,
    as_of: Option<NaiveDate>,
    options: &ReportOptions,
) -> MonitoringReport {
    let consolidated: Vec<ConsolidatedRow> = records
        .iter()
        .filter_map(|record| consolidated_row(record, targets))
        .collect();

    let status_columns: Vec<StatusLabel> = consolidated
        .iter()
        .flat_map(|row| row.days_by_status.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let history = records
        .iter()
        .flat_map(|record| interval_rows(record, targets))
        .collect();

    MonitoringReport {
        as_of,
        status_columns,
        history,
        location_ranking: rank_locations(&consolidated, &options.unknown_location_label),
        entity_ranking: rank_entities(&consolidated),
        status_ranking: rank_statuses(&consolidated),
        consolidated,
    }
}

/// Flatten one record. Records that never received a status yield `None`.
pub fn consolidated_row(record: &EntityRecord, targets: &TargetTable) -> Option<ConsolidatedRow> {
    let status = record.current_status.clone()?;
    let last_seen = record.last_seen?;
    let days_in_status = record.days_in_current_status();

    Some(ConsolidatedRow {
        entity_id: record.entity_id.clone(),
        location: record.location.clone(),
        tat: record.tat.clone(),
        model: record.model.clone(),
        serial: record.serial.clone(),
        part_delivery: record.part_delivery.clone(),
        status_since: record.status_since().unwrap_or(last_seen),
        last_seen,
        days_in_status,
        target: targets.resolve(&status),
        days_over_target: targets.days_over_target(&status, days_in_status),
        closed: record.closed,
        days_by_status: record.days_by_status.clone(),
        status,
    })
}

/// One history row per interval. The open interval spans up to the entity's
/// last observation.
pub fn interval_rows(record: &EntityRecord, targets: &TargetTable) -> Vec<IntervalRow> {
    record
        .intervals
        .iter()
        .map(|interval| {
            let until = interval
                .end
                .or(record.last_seen)
                .unwrap_or(interval.start);
            let business_days = business_days_between(interval.start, until);
            IntervalRow {
                entity_id: record.entity_id.clone(),
                location: record.location.clone(),
                status: interval.status.clone(),
                start: interval.start,
                end: interval.end,
                business_days,
                target: targets.resolve(&interval.status),
                days_over_target: targets.days_over_target(&interval.status, business_days),
            }
        })
        .collect()
}

/// Open rows whose current status is over target, with (target, days over)
fn breaching(rows: &[ConsolidatedRow]) -> impl Iterator<Item = (&ConsolidatedRow, u32, u32)> {
    rows.iter().filter(|row| !row.closed).filter_map(|row| {
        match (row.target, row.days_over_target) {
            (Some(target), Some(over)) if over > 0 => Some((row, target, over)),
            _ => None,
        }
    })
}

/// Count rows per key preserving first-seen order, then sort by count
/// descending. `sort_by` is stable, so ties keep first-seen order.
fn count_by<K, F>(rows: &[ConsolidatedRow], key: F) -> Vec<(K, usize, u32)>
where
    K: Clone + Eq + std::hash::Hash,
    F: Fn(&ConsolidatedRow) -> K,
{
    let mut index: HashMap<K, usize> = HashMap::new();
    let mut groups: Vec<(K, usize, u32)> = Vec::new();

    for (row, _, over) in breaching(rows) {
        let k = key(row);
        match index.get(&k) {
            Some(&slot) => {
                groups[slot].1 += 1;
                groups[slot].2 += over;
            }
            None => {
                index.insert(k.clone(), groups.len());
                groups.push((k, 1, over));
            }
        }
    }

    groups.sort_by(|a, b| b.1.cmp(&a.1));
    groups
}

/// Breaching entities per authorized location, most first
pub fn rank_locations(rows: &[ConsolidatedRow], unknown_label: &str) -> Vec<LocationRankingRow> {
    count_by(rows, |row| {
        row.location
            .clone()
            .unwrap_or_else(|| unknown_label.to_string())
    })
    .into_iter()
    .map(|(location, breaching_entities, total_days_over_target)| LocationRankingRow {
        location,
        breaching_entities,
        total_days_over_target,
    })
    .collect()
}

/// Breaching entities, most days over target first
pub fn rank_entities(rows: &[ConsolidatedRow]) -> Vec<EntityRankingRow> {
    let mut ranking: Vec<EntityRankingRow> = breaching(rows)
        .map(|(row, target, over)| EntityRankingRow {
            entity_id: row.entity_id.clone(),
            location: row.location.clone(),
            status: row.status.clone(),
            days_in_status: row.days_in_status,
            target,
            days_over_target: over,
        })
        .collect();

    ranking.sort_by(|a, b| b.days_over_target.cmp(&a.days_over_target));
    ranking
}

/// Breaching entities per current status, most first
pub fn rank_statuses(rows: &[ConsolidatedRow]) -> Vec<StatusRankingRow> {
    count_by(rows, |row| row.status.clone())
        .into_iter()
        .map(|(status, breaching_entities, total_days_over_target)| StatusRankingRow {
            status,
            breaching_entities,
            total_days_over_target,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use os_monitor_types::{EntityId, StatusInterval};
    use std::collections::BTreeMap;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn label(raw: &str) -> StatusLabel {
        StatusLabel::normalize(raw).unwrap()
    }

    fn record(id: &str, location: Option<&str>, status: &str, days: u32, closed: bool) -> EntityRecord {
        let mut record = EntityRecord::new(EntityId::parse(id).unwrap());
        record.location = location.map(str::to_string);
        record.current_status = Some(label(status));
        record.last_seen = Some(date(2024, 3, 8));
        record
            .intervals
            .push(StatusInterval::open(label(status), date(2024, 3, 4)));
        record.days_by_status = BTreeMap::from([(label(status), days)]);
        record.closed = closed;
        record
    }

    fn targets() -> TargetTable {
        [("REPARO", 3), ("PECA", 5)].into_iter().collect()
    }

    #[test]
    fn test_consolidated_row_fora_do_prazo() {
        let row = consolidated_row(&record("1", Some("A"), "REPARO", 5, false), &targets()).unwrap();
        assert_eq!(row.target, Some(3));
        assert_eq!(row.days_over_target, Some(2));

        let row = consolidated_row(&record("2", Some("A"), "NOVO", 9, false), &targets()).unwrap();
        assert_eq!(row.target, None);
        assert_eq!(row.days_over_target, None);
    }

    #[test]
    fn test_interval_rows_span_open_interval_to_last_seen() {
        let mut rec = record("1", Some("A"), "PECA", 2, false);
        rec.intervals.insert(
            0,
            StatusInterval {
                status: label("REPARO"),
                start: date(2024, 2, 26),
                end: Some(date(2024, 3, 3)),
            },
        );

        let rows = interval_rows(&rec, &targets());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].business_days, 5);
        assert_eq!(rows[0].days_over_target, Some(2));
        assert_eq!(rows[1].end, None);
        assert_eq!(rows[1].business_days, 5);
        assert_eq!(rows[1].days_over_target, Some(0));
    }

    #[test]
    fn test_rankings_only_include_open_breaching_entities() {
        let records = vec![
            record("1", Some("A"), "REPARO", 5, false),
            record("2", Some("B"), "REPARO", 9, false),
            record("3", Some("B"), "PECA", 7, false),
            record("4", Some("A"), "REPARO", 9, true),
            record("5", Some("C"), "REPARO", 2, false),
            record("6", None, "NOVO", 30, false),
        ];
        let report = build_report(&records, &targets(), Some(date(2024, 3, 8)), &ReportOptions::default());

        assert_eq!(report.entity_ranking.len(), 3);
        assert_eq!(report.entity_ranking[0].entity_id.as_str(), "2");
        assert_eq!(report.entity_ranking[0].days_over_target, 6);

        assert_eq!(report.location_ranking[0].location, "B");
        assert_eq!(report.location_ranking[0].breaching_entities, 2);
        assert_eq!(report.location_ranking[0].total_days_over_target, 8);
        assert_eq!(report.location_ranking[1].location, "A");
        assert_eq!(report.location_ranking[1].breaching_entities, 1);

        assert_eq!(report.status_ranking[0].status, label("REPARO"));
        assert_eq!(report.status_ranking[0].breaching_entities, 2);
        assert_eq!(report.status_ranking[1].status, label("PECA"));
    }

    #[test]
    fn test_location_ties_keep_input_order() {
        let records = vec![
            record("1", Some("Z"), "REPARO", 4, false),
            record("2", Some("A"), "REPARO", 4, false),
            record("3", None, "REPARO", 4, false),
        ];
        let ranking = build_report(&records, &targets(), None, &ReportOptions::default()).location_ranking;

        let order: Vec<&str> = ranking.iter().map(|r| r.location.as_str()).collect();
        assert_eq!(order, vec!["Z", "A", DEFAULT_UNKNOWN_LOCATION]);
    }

    #[test]
    fn test_status_columns_and_summary() {
        let mut rec = record("1", Some("A"), "REPARO", 5, false);
        rec.days_by_status.insert(label("ORCAMENTO"), 1);
        let records = vec![rec, record("2", Some("A"), "NOVO", 1, true)];
        let report = build_report(&records, &targets(), None, &ReportOptions::default());

        assert_eq!(
            report.status_columns,
            vec![label("NOVO"), label("ORCAMENTO"), label("REPARO")]
        );
        let summary = report.summary();
        assert_eq!(summary.entities, 2);
        assert_eq!(summary.closed_entities, 1);
        assert_eq!(summary.breaching_entities, 1);
        assert_eq!(
            report.unrecognized_statuses().into_iter().collect::<Vec<_>>(),
            vec![label("NOVO")]
        );
    }
}
