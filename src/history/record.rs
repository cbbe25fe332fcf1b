//! Consolidated per-entity state

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use os_monitor_types::{
    EntityId, ObservationAttributes, SnapshotEntry, StatusInterval, StatusLabel,
};

/// The consolidated state of one service order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity_id: EntityId,

    /// Authorized-location code, last non-empty value wins
    pub location: Option<String>,
    /// Target-turnaround attribute, replaced only by a different non-empty value
    pub tat: Option<String>,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub part_delivery: Option<String>,

    /// `None` until the first observation is applied
    pub current_status: Option<StatusLabel>,
    /// Reference date of the last batch the entity appeared in
    pub last_seen: Option<NaiveDate>,

    /// Accumulated business days per status ever visited
    pub days_by_status: BTreeMap<StatusLabel, u32>,
    /// Full status history; only the last interval may be open
    pub intervals: Vec<StatusInterval>,

    /// Absent from the most recent batch
    pub closed: bool,
}

impl EntityRecord {
    /// Create an empty record awaiting its first observation
    pub fn new(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            location: None,
            tat: None,
            model: None,
            serial: None,
            part_delivery: None,
            current_status: None,
            last_seen: None,
            days_by_status: BTreeMap::new(),
            intervals: Vec::new(),
            closed: false,
        }
    }

    /// Rebuild a record from a snapshot row, reopening its current interval.
    ///
    /// A snapshot without a counter for the current status is credited with
    /// its first business day.
    pub fn from_snapshot(entry: SnapshotEntry) -> Self {
        let mut record = Self::new(entry.entity_id);
        record.merge_attributes(&entry.attributes);

        let since = entry
            .status_since
            .filter(|since| *since <= entry.last_seen)
            .unwrap_or(entry.last_seen);

        record.days_by_status = entry.days_by_status;
        record
            .days_by_status
            .entry(entry.status.clone())
            .or_insert(1);
        record
            .intervals
            .push(StatusInterval::open(entry.status.clone(), since));
        record.current_status = Some(entry.status);
        record.last_seen = Some(entry.last_seen);
        record.closed = entry.closed;
        record
    }

    /// Put back the closed intervals of earlier runs ahead of the reopened
    /// current interval. Returns how many were kept.
    ///
    /// Intervals that are open, inverted, end on or after the current
    /// interval's start, or overlap an earlier kept interval are dropped.
    pub fn restore_closed_intervals(&mut self, mut earlier: Vec<StatusInterval>) -> usize {
        let Some(current_start) = self.status_since() else {
            return 0;
        };

        earlier.retain(|interval| {
            interval
                .end
                .is_some_and(|end| interval.start <= end && end < current_start)
        });
        earlier.sort_by_key(|interval| interval.start);

        let mut restored: Vec<StatusInterval> = Vec::with_capacity(earlier.len());
        for interval in earlier {
            let overlaps = restored
                .last()
                .and_then(|previous| previous.end)
                .is_some_and(|previous_end| interval.start <= previous_end);
            if !overlaps {
                restored.push(interval);
            }
        }

        let kept = restored.len();
        let open_at = self.intervals.len() - 1;
        self.intervals.splice(open_at..open_at, restored);
        kept
    }

    /// True until a first observation (or snapshot row) sets a status
    pub fn is_new(&self) -> bool {
        self.current_status.is_none()
    }

    /// The open interval, if any
    pub fn current_interval(&self) -> Option<&StatusInterval> {
        self.intervals.last().filter(|interval| interval.is_open())
    }

    /// Start date of the current status
    pub fn status_since(&self) -> Option<NaiveDate> {
        self.current_interval().map(|interval| interval.start)
    }

    /// Accumulated business days in the current status (all visits)
    pub fn days_in_current_status(&self) -> u32 {
        self.current_status
            .as_ref()
            .and_then(|status| self.days_by_status.get(status))
            .copied()
            .unwrap_or(0)
    }

    /// Apply the per-field overwrite rules for descriptive attributes
    pub fn merge_attributes(&mut self, incoming: &ObservationAttributes) {
        overwrite_if_present(&mut self.location, &incoming.location);
        overwrite_if_present(&mut self.model, &incoming.model);
        overwrite_if_present(&mut self.serial, &incoming.serial);
        overwrite_if_present(&mut self.part_delivery, &incoming.part_delivery);

        if let Some(tat) = incoming.tat.as_ref().filter(|tat| !tat.is_empty()) {
            if self.tat.as_ref() != Some(tat) {
                self.tat = Some(tat.clone());
            }
        }
    }

    /// Add business days to a status counter
    pub(crate) fn credit(&mut self, status: &StatusLabel, days: u32) {
        *self.days_by_status.entry(status.clone()).or_insert(0) += days;
    }

    /// Enter `status` on `date`: open an interval and count the first day
    pub(crate) fn enter_status(&mut self, status: StatusLabel, date: NaiveDate) {
        self.intervals
            .push(StatusInterval::open(status.clone(), date));
        self.credit(&status, 1);
        self.current_status = Some(status);
    }

    /// Close the open interval the day before `reference_date`
    pub(crate) fn close_current(&mut self, reference_date: NaiveDate) {
        if let Some(interval) = self.intervals.last_mut().filter(|i| i.is_open()) {
            let end = reference_date
                .pred_opt()
                .unwrap_or(reference_date)
                .max(interval.start);
            interval.end = Some(end);
        }
    }
}

fn overwrite_if_present(slot: &mut Option<String>, incoming: &Option<String>) {
    if let Some(value) = incoming.as_ref().filter(|v| !v.is_empty()) {
        *slot = Some(value.clone());
    }
}
