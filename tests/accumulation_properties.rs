//! Property tests for day accumulation over arbitrary weekday batch sequences

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use proptest::prelude::*;

use os_monitor::calendar::ContinuationPolicy;
use os_monitor::pipeline::{consolidate, ConsolidationInputs, EngineOptions};
use os_monitor::targets::TargetTable;
use os_monitor::{EntityId, ObservationAttributes, ObservationBatch, StatusLabel};

const STATUSES: [&str; 3] = ["REPARO", "AGUARDANDO PEÇA", "ORÇAMENTO"];

/// The `n`th weekday on or after Monday 2024-03-04
fn nth_weekday(n: usize) -> NaiveDate {
    let mut date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
    let mut seen = 0;
    loop {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            if seen == n {
                return date;
            }
            seen += 1;
        }
        date += Duration::days(1);
    }
}

fn build_batches(rows: &[Vec<(u8, usize)>]) -> Vec<ObservationBatch> {
    rows.iter()
        .enumerate()
        .map(|(n, batch_rows)| {
            let mut batch = ObservationBatch::new(nth_weekday(n), format!("batch {}", n));
            for (id, status) in batch_rows {
                batch.push(
                    EntityId::parse(&id.to_string()).unwrap(),
                    StatusLabel::normalize(STATUSES[*status]).unwrap(),
                    ObservationAttributes::default(),
                );
            }
            batch
        })
        .collect()
}

fn batch_rows() -> impl Strategy<Value = Vec<Vec<(u8, usize)>>> {
    prop::collection::vec(
        prop::collection::vec((0u8..6, 0usize..STATUSES.len()), 1..6),
        1..10,
    )
}

proptest! {
    #[test]
    fn test_days_accumulate_once_per_appearance(rows in batch_rows()) {
        let targets: TargetTable = [("REPARO", 2), ("AGUARDANDO PEÇA", 3)].into_iter().collect();
        let inputs = ConsolidationInputs {
            batches: build_batches(&rows),
            targets: targets.clone(),
            ..Default::default()
        };
        let outcome = consolidate(inputs, &EngineOptions::default()).unwrap();

        let mut appearances: BTreeMap<String, u32> = BTreeMap::new();
        for batch_rows in &rows {
            let ids: BTreeSet<u8> = batch_rows.iter().map(|(id, _)| *id).collect();
            for id in ids {
                *appearances.entry(id.to_string()).or_insert(0) += 1;
            }
        }
        let newest: BTreeSet<String> = rows
            .last()
            .map(|r| r.iter().map(|(id, _)| id.to_string()).collect())
            .unwrap_or_default();

        prop_assert_eq!(outcome.report.consolidated.len(), appearances.len());
        for row in &outcome.report.consolidated {
            let total: u32 = row.days_by_status.values().sum();
            prop_assert_eq!(total, appearances[row.entity_id.as_str()]);
            prop_assert!(row.days_in_status >= 1);
            prop_assert_eq!(row.closed, !newest.contains(row.entity_id.as_str()));

            match targets.resolve(&row.status) {
                Some(target) => {
                    prop_assert_eq!(
                        row.days_over_target,
                        Some(row.days_in_status.saturating_sub(target))
                    );
                }
                None => {
                    prop_assert_eq!(row.days_over_target, None);
                }
            }
        }
    }

    #[test]
    fn test_elapsed_policy_never_credits_less_than_flat(rows in batch_rows()) {
        let run = |continuation| {
            let inputs = ConsolidationInputs {
                batches: build_batches(&rows),
                ..Default::default()
            };
            let options = EngineOptions {
                continuation,
                ..Default::default()
            };
            consolidate(inputs, &options).unwrap().report.consolidated
        };

        let flat = run(ContinuationPolicy::FlatIncrement);
        let elapsed = run(ContinuationPolicy::ElapsedBusinessDays);

        prop_assert_eq!(flat.len(), elapsed.len());
        for (f, e) in flat.iter().zip(&elapsed) {
            prop_assert_eq!(&f.status, &e.status);
            let flat_total: u32 = f.days_by_status.values().sum();
            let elapsed_total: u32 = e.days_by_status.values().sum();
            prop_assert!(elapsed_total >= flat_total);
        }
    }

    #[test]
    fn test_rankings_only_hold_open_breaching_entities(rows in batch_rows()) {
        let targets: TargetTable = STATUSES.iter().map(|s| (*s, 1)).collect();
        let inputs = ConsolidationInputs {
            batches: build_batches(&rows),
            targets,
            ..Default::default()
        };
        let report = consolidate(inputs, &EngineOptions::default()).unwrap().report;

        let breaching = report
            .consolidated
            .iter()
            .filter(|row| !row.closed && row.days_over_target.unwrap_or(0) > 0)
            .count();
        prop_assert_eq!(report.entity_ranking.len(), breaching);

        let by_location: usize = report.location_ranking.iter().map(|r| r.breaching_entities).sum();
        let by_status: usize = report.status_ranking.iter().map(|r| r.breaching_entities).sum();
        prop_assert_eq!(by_location, breaching);
        prop_assert_eq!(by_status, breaching);

        for pair in report.entity_ranking.windows(2) {
            prop_assert!(pair[0].days_over_target >= pair[1].days_over_target);
        }
    }
}
