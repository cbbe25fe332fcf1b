//! Transition & accumulation engine
//!
//! Decides for each observation whether it creates an entity, continues the
//! current status or transitions to a new one, and updates dwell time and
//! interval history accordingly.

use std::collections::HashMap;

use os_monitor_types::{EntityId, Observation, StatusLabel};

use super::record::EntityRecord;
use crate::calendar::ContinuationPolicy;

/// What applying one observation did to a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservationEffect {
    /// First observation of the entity
    Created { status: StatusLabel },
    /// Same status as before
    Continued { increment: u32 },
    /// Status changed
    Transitioned {
        from: StatusLabel,
        to: StatusLabel,
    },
}

/// Apply one observation to a record.
///
/// The caller guarantees observations reach a record in increasing
/// reference-date order.
pub fn apply_observation(
    record: &mut EntityRecord,
    observation: &Observation,
    policy: ContinuationPolicy,
) -> ObservationEffect {
    let reference = observation.reference_date;

    let effect = match record.current_status.clone() {
        None => {
            record.enter_status(observation.status.clone(), reference);
            ObservationEffect::Created {
                status: observation.status.clone(),
            }
        }
        Some(current) if current == observation.status => {
            let last_seen = record.last_seen.unwrap_or(reference);
            let increment = policy.continuation_increment(last_seen, reference);
            record.credit(&current, increment);
            ObservationEffect::Continued { increment }
        }
        Some(current) => {
            let last_seen = record.last_seen.unwrap_or(reference);
            let tail = policy.transition_credit(last_seen, reference);
            record.credit(&current, tail);
            record.close_current(reference);
            record.enter_status(observation.status.clone(), reference);

            tracing::debug!(
                entity_id = %record.entity_id,
                from = %current,
                to = %observation.status,
                date = %reference,
                "Status transition"
            );

            ObservationEffect::Transitioned {
                from: current,
                to: observation.status.clone(),
            }
        }
    };

    record.last_seen = Some(reference);
    record.merge_attributes(&observation.attributes);
    effect
}

/// Collapse duplicate ids in a batch: the last occurrence of an id wins and
/// takes the position of its first occurrence.
///
/// Returns the surviving observations and, for every dropped row, its index in
/// the batch together with the duplicated id.
pub fn dedupe_last_wins(
    observations: &[Observation],
) -> (Vec<&Observation>, Vec<(usize, EntityId)>) {
    let mut position: HashMap<&EntityId, usize> = HashMap::new();
    let mut kept: Vec<(usize, &Observation)> = Vec::with_capacity(observations.len());
    let mut dropped = Vec::new();

    for (index, observation) in observations.iter().enumerate() {
        match position.get(&observation.entity_id) {
            Some(&slot) => {
                let (previous_index, _) = kept[slot];
                dropped.push((previous_index, observation.entity_id.clone()));
                kept[slot] = (index, observation);
            }
            None => {
                position.insert(&observation.entity_id, kept.len());
                kept.push((index, observation));
            }
        }
    }

    dropped.sort_by_key(|(index, _)| *index);
    (kept.into_iter().map(|(_, obs)| obs).collect(), dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use os_monitor_types::ObservationAttributes;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn label(raw: &str) -> StatusLabel {
        StatusLabel::normalize(raw).unwrap()
    }

    fn obs(id: &str, status: &str, when: NaiveDate) -> Observation {
        Observation {
            entity_id: EntityId::parse(id).unwrap(),
            status: label(status),
            attributes: ObservationAttributes::default(),
            reference_date: when,
        }
    }

    #[test]
    fn test_first_observation_opens_interval_with_one_day() {
        let mut record = EntityRecord::new(EntityId::parse("1").unwrap());
        let effect = apply_observation(
            &mut record,
            &obs("1", "REPARO", date(2024, 3, 4)),
            ContinuationPolicy::FlatIncrement,
        );

        assert_eq!(
            effect,
            ObservationEffect::Created {
                status: label("REPARO")
            }
        );
        assert_eq!(record.days_in_current_status(), 1);
        assert_eq!(record.intervals.len(), 1);
        assert_eq!(record.last_seen, Some(date(2024, 3, 4)));
    }

    #[test]
    fn test_continuation_adds_flat_increment() {
        let mut record = EntityRecord::new(EntityId::parse("1").unwrap());
        let policy = ContinuationPolicy::FlatIncrement;
        apply_observation(&mut record, &obs("1", "REPARO", date(2024, 3, 4)), policy);
        // a full week later still counts a single day under the flat policy
        let effect =
            apply_observation(&mut record, &obs("1", "reparo", date(2024, 3, 11)), policy);

        assert_eq!(effect, ObservationEffect::Continued { increment: 1 });
        assert_eq!(record.days_in_current_status(), 2);
        assert_eq!(record.intervals.len(), 1);
    }

    #[test]
    fn test_weekend_continuation_adds_nothing_under_flat_policy() {
        let mut record = EntityRecord::new(EntityId::parse("1").unwrap());
        let policy = ContinuationPolicy::FlatIncrement;
        apply_observation(&mut record, &obs("1", "REPARO", date(2024, 3, 8)), policy);
        apply_observation(&mut record, &obs("1", "REPARO", date(2024, 3, 9)), policy);

        assert_eq!(record.days_in_current_status(), 1);
    }

    #[test]
    fn test_transition_closes_interval_day_before() {
        let mut record = EntityRecord::new(EntityId::parse("1").unwrap());
        let policy = ContinuationPolicy::FlatIncrement;
        apply_observation(&mut record, &obs("1", "REPARO", date(2024, 3, 4)), policy);
        apply_observation(&mut record, &obs("1", "REPARO", date(2024, 3, 5)), policy);
        let effect =
            apply_observation(&mut record, &obs("1", "ENTREGUE", date(2024, 3, 6)), policy);

        assert_eq!(
            effect,
            ObservationEffect::Transitioned {
                from: label("REPARO"),
                to: label("ENTREGUE"),
            }
        );
        assert_eq!(record.intervals.len(), 2);
        assert_eq!(record.intervals[0].end, Some(date(2024, 3, 5)));
        assert_eq!(record.intervals[1].start, date(2024, 3, 6));
        assert!(record.intervals[1].is_open());
        assert_eq!(record.days_by_status[&label("REPARO")], 2);
        assert_eq!(record.days_by_status[&label("ENTREGUE")], 1);
    }

    #[test]
    fn test_returning_to_status_accumulates_across_visits() {
        let mut record = EntityRecord::new(EntityId::parse("1").unwrap());
        let policy = ContinuationPolicy::FlatIncrement;
        apply_observation(&mut record, &obs("1", "REPARO", date(2024, 3, 4)), policy);
        apply_observation(&mut record, &obs("1", "REPARO", date(2024, 3, 5)), policy);
        apply_observation(&mut record, &obs("1", "PECA", date(2024, 3, 6)), policy);
        apply_observation(&mut record, &obs("1", "REPARO", date(2024, 3, 7)), policy);

        assert_eq!(record.days_in_current_status(), 3);
        assert_eq!(record.intervals.len(), 3);
        assert_eq!(
            record.intervals.iter().filter(|i| i.is_open()).count(),
            1
        );
    }

    #[test]
    fn test_elapsed_policy_credits_gap_to_outgoing_status() {
        let mut record = EntityRecord::new(EntityId::parse("1").unwrap());
        let policy = ContinuationPolicy::ElapsedBusinessDays;
        apply_observation(&mut record, &obs("1", "REPARO", date(2024, 3, 4)), policy);
        apply_observation(&mut record, &obs("1", "REPARO", date(2024, 3, 6)), policy);
        apply_observation(&mut record, &obs("1", "ENTREGUE", date(2024, 3, 11)), policy);

        // Mon..Fri of the first week
        assert_eq!(record.days_by_status[&label("REPARO")], 5);
        assert_eq!(record.intervals[0].end, Some(date(2024, 3, 10)));
    }

    #[test]
    fn test_dedupe_keeps_last_occurrence_in_first_position() {
        let when = date(2024, 3, 4);
        let rows = vec![
            obs("1", "REPARO", when),
            obs("2", "REPARO", when),
            obs("1", "ENTREGUE", when),
        ];

        let (kept, dropped) = dedupe_last_wins(&rows);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].entity_id.as_str(), "1");
        assert_eq!(kept[0].status, label("ENTREGUE"));
        assert_eq!(kept[1].entity_id.as_str(), "2");
        assert_eq!(dropped, vec![(0, EntityId::parse("1").unwrap())]);
    }
}
