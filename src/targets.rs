//! Target ("Meta") resolution
//!
//! Maps a status label to the number of business days an entity may spend in
//! that status before it counts as late ("Fora do Prazo").

use std::collections::HashMap;

use os_monitor_types::StatusLabel;

/// Status → target business days
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetTable {
    targets: HashMap<StatusLabel, u32>,
}

impl TargetTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target. Blank labels are ignored and reported as `false`.
    pub fn insert(&mut self, status: &str, days: u32) -> bool {
        match StatusLabel::normalize(status) {
            Ok(label) => {
                self.targets.insert(label, days);
                true
            }
            Err(_) => false,
        }
    }

    /// Look up the target for a raw status label (trimmed, uppercased first)
    pub fn resolve_target(&self, status: &str) -> Option<u32> {
        StatusLabel::normalize(status)
            .ok()
            .and_then(|label| self.resolve(&label))
    }

    /// Look up the target for an already normalized label
    pub fn resolve(&self, status: &StatusLabel) -> Option<u32> {
        self.targets.get(status).copied()
    }

    /// `max(days − target, 0)`, or `None` when the status has no target
    pub fn days_over_target(&self, status: &StatusLabel, days: u32) -> Option<u32> {
        self.resolve(status)
            .map(|target| days.saturating_sub(target))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<(S, u32)> for TargetTable {
    fn from_iter<I: IntoIterator<Item = (S, u32)>>(iter: I) -> Self {
        let mut table = TargetTable::new();
        for (status, days) in iter {
            table.insert(status.as_ref(), days);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(raw: &str) -> StatusLabel {
        StatusLabel::normalize(raw).unwrap()
    }

    #[test]
    fn test_resolve_normalizes_label() {
        let table: TargetTable = [("Reparo", 3)].into_iter().collect();
        assert_eq!(table.resolve_target("  reparo "), Some(3));
        assert_eq!(table.resolve_target("REPARO"), Some(3));
        assert_eq!(table.resolve_target("ENTREGUE"), None);
        assert_eq!(table.resolve_target(""), None);
    }

    #[test]
    fn test_days_over_target_is_clamped_and_absent_without_target() {
        let table: TargetTable = [("REPARO", 3)].into_iter().collect();
        assert_eq!(table.days_over_target(&label("REPARO"), 5), Some(2));
        assert_eq!(table.days_over_target(&label("REPARO"), 2), Some(0));
        assert_eq!(table.days_over_target(&label("NOVO"), 10), None);
    }

    #[test]
    fn test_blank_status_not_registered() {
        let mut table = TargetTable::new();
        assert!(!table.insert("  ", 2));
        assert!(table.is_empty());
    }
}
