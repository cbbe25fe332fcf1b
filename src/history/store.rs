//! Entity history store
//!
//! In-memory mapping from entity id to its consolidated record. A store is
//! created per run, optionally seeded from a snapshot, then mutated only by
//! applying batches in increasing reference-date order.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;

use os_monitor_types::{EntityId, Observation, ObservationBatch, SnapshotEntry, StatusInterval};

use super::engine::{apply_observation, dedupe_last_wins, ObservationEffect};
use super::record::EntityRecord;
use crate::calendar::ContinuationPolicy;
use crate::error::{MonitorError, MonitorResult};

/// Closed intervals of earlier runs, per entity
pub type PriorHistory = BTreeMap<EntityId, Vec<StatusInterval>>;

/// Counts of what one batch did to the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub reference_date: Option<NaiveDate>,
    pub created: usize,
    pub continued: usize,
    pub transitioned: usize,
    /// Rows dropped because a later row of the same batch had the same id,
    /// as (row index, entity id)
    pub duplicates: Vec<(usize, EntityId)>,
}

/// The per-run entity history store
#[derive(Debug)]
pub struct HistoryStore {
    records: BTreeMap<EntityId, EntityRecord>,
    policy: ContinuationPolicy,
    /// Latest last-observation date found in the seeding snapshot
    watermark: Option<NaiveDate>,
    /// Reference date of the last applied batch
    last_applied: Option<NaiveDate>,
    /// Ids present in the last applied batch
    newest_members: Option<HashSet<EntityId>>,
}

impl HistoryStore {
    /// Create an empty store
    pub fn new(policy: ContinuationPolicy) -> Self {
        Self {
            records: BTreeMap::new(),
            policy,
            watermark: None,
            last_applied: None,
            newest_members: None,
        }
    }

    pub fn policy(&self) -> ContinuationPolicy {
        self.policy
    }

    /// Seed the store from a previously consolidated snapshot and the closed
    /// intervals earlier runs recorded.
    ///
    /// Must be called before any batch is applied. An id listed twice keeps
    /// its later entry. Returns the number of records restored.
    pub fn seed(
        &mut self,
        entries: impl IntoIterator<Item = SnapshotEntry>,
        history: PriorHistory,
    ) -> usize {
        for entry in entries {
            let last_seen = entry.last_seen;
            self.watermark = Some(self.watermark.map_or(last_seen, |w| w.max(last_seen)));
            let record = EntityRecord::from_snapshot(entry);
            if let Some(replaced) = self.records.insert(record.entity_id.clone(), record) {
                tracing::warn!(
                    entity_id = %replaced.entity_id,
                    "Entity seeded twice, keeping the later entry"
                );
            }
        }

        let mut intervals = 0;
        let mut orphaned = 0;
        for (entity_id, earlier) in history {
            match self.records.get_mut(&entity_id) {
                Some(record) => intervals += record.restore_closed_intervals(earlier),
                None => orphaned += 1,
            }
        }

        let restored = self.records.len();
        tracing::info!(
            restored,
            intervals,
            orphaned,
            watermark = ?self.watermark,
            "Seeded history store from snapshot"
        );
        restored
    }

    /// Latest date already consolidated in the seeding snapshot
    pub fn watermark(&self) -> Option<NaiveDate> {
        self.watermark
    }

    /// Reference date of the last applied batch
    pub fn last_applied(&self) -> Option<NaiveDate> {
        self.last_applied
    }

    /// Date the consolidated state refers to
    pub fn as_of(&self) -> Option<NaiveDate> {
        self.last_applied.or(self.watermark)
    }

    /// Fetch a record, creating an empty one for an unseen id
    pub fn get_or_create(&mut self, entity_id: &EntityId) -> &mut EntityRecord {
        self.records
            .entry(entity_id.clone())
            .or_insert_with(|| EntityRecord::new(entity_id.clone()))
    }

    pub fn get(&self, entity_id: &EntityId) -> Option<&EntityRecord> {
        self.records.get(entity_id)
    }

    /// Apply a single observation to its entity
    pub fn apply_observation(&mut self, observation: &Observation) -> ObservationEffect {
        let policy = self.policy;
        let record = self.get_or_create(&observation.entity_id);
        apply_observation(record, observation, policy)
    }

    /// Apply a whole batch.
    ///
    /// The batch must be dated after every batch applied so far and after the
    /// seeding snapshot. Duplicate ids inside the batch are collapsed (last
    /// occurrence wins) so each entity is credited at most once per batch.
    pub fn apply_batch(&mut self, batch: &ObservationBatch) -> MonitorResult<BatchOutcome> {
        let floor = match (self.last_applied, self.watermark) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        if let Some(floor) = floor {
            if batch.reference_date <= floor {
                return Err(MonitorError::BatchOutOfOrder {
                    batch_date: batch.reference_date,
                    last_applied: floor,
                });
            }
        }

        let (observations, duplicates) = dedupe_last_wins(&batch.observations);
        let mut outcome = BatchOutcome {
            reference_date: Some(batch.reference_date),
            duplicates,
            ..Default::default()
        };
        let mut members = HashSet::with_capacity(observations.len());

        for observation in observations {
            match self.apply_observation(observation) {
                ObservationEffect::Created { .. } => outcome.created += 1,
                ObservationEffect::Continued { .. } => outcome.continued += 1,
                ObservationEffect::Transitioned { .. } => outcome.transitioned += 1,
            }
            members.insert(observation.entity_id.clone());
        }

        self.last_applied = Some(batch.reference_date);
        self.newest_members = Some(members);

        tracing::info!(
            batch_date = %batch.reference_date,
            source = %batch.source,
            created = outcome.created,
            continued = outcome.continued,
            transitioned = outcome.transitioned,
            duplicates = outcome.duplicates.len(),
            "Applied batch"
        );

        Ok(outcome)
    }

    /// Iterate records in entity-id order
    pub fn all_records(&self) -> impl Iterator<Item = &EntityRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Decide the closed flag and hand out the final records.
    ///
    /// An entity is open iff it appears in the most recent batch. Without any
    /// applied batch the snapshot's flags are kept.
    pub fn finalize(self) -> Vec<EntityRecord> {
        let newest = self.newest_members;
        self.records
            .into_values()
            .filter(|record| !record.is_new())
            .map(|mut record| {
                if let Some(members) = &newest {
                    record.closed = !members.contains(&record.entity_id);
                }
                record
            })
            .collect()
    }
}
