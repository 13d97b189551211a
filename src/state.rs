use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::types::{AcceptanceReport, ExitSummary, OrderId};

/// Normalized messages already evaluated during this process lifetime.
///
/// Never pruned; each poll only reads the last few visible messages.
#[derive(Debug, Default)]
pub struct SeenMessages {
    messages: HashSet<String>,
}

impl SeenMessages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message, returning `true` the first time it is seen.
    pub fn insert(&mut self, normalized: &str) -> bool {
        if self.messages.contains(normalized) {
            return false;
        }
        self.messages.insert(normalized.to_string())
    }

    pub fn contains(&self, normalized: &str) -> bool {
        self.messages.contains(normalized)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Order ids extracted during one polling pass, in extraction order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingOrders {
    ids: Vec<OrderId>,
}

impl PendingOrders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an id; returns `false` if it is already pending.
    pub fn push(&mut self, id: OrderId) -> bool {
        if self.contains(id.as_str()) {
            return false;
        }
        self.ids.push(id);
        true
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.ids.iter().any(|id| id.matches(identifier))
    }

    pub fn ids(&self) -> &[OrderId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Hand the set over, leaving it empty for the next cycle.
    pub fn take(&mut self) -> PendingOrders {
        std::mem::take(self)
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

impl FromIterator<OrderId> for PendingOrders {
    fn from_iter<T: IntoIterator<Item = OrderId>>(iter: T) -> Self {
        let mut pending = PendingOrders::new();
        for id in iter {
            pending.push(id);
        }
        pending
    }
}

/// Counters accumulated across the whole run.
pub struct RunStats {
    pub started_at: DateTime<Utc>,
    pub cycles: u64,
    pub sweeps: u64,
    pub orders_extracted: u64,
    pub extraction_failures: u64,
    pub accepted: u64,
    pub skipped: u64,
    pub failed: u64,
    pub accepted_ids: Vec<String>,
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            cycles: 0,
            sweeps: 0,
            orders_extracted: 0,
            extraction_failures: 0,
            accepted: 0,
            skipped: 0,
            failed: 0,
            accepted_ids: Vec::new(),
        }
    }

    /// Fold one acceptance pass into the totals.
    pub fn record_acceptance(&mut self, report: &AcceptanceReport) {
        self.cycles += 1;
        self.accepted += u64::from(report.accepted);
        self.skipped += u64::from(report.skipped);
        self.failed += u64::from(report.failed);
        self.accepted_ids.extend(report.accepted_ids.iter().cloned());
    }

    pub fn exit_summary(&self, messages_seen: usize) -> ExitSummary {
        ExitSummary {
            started_at: self.started_at.to_rfc3339(),
            stopped_at: Utc::now().to_rfc3339(),
            cycles: self.cycles,
            sweeps: self.sweeps,
            messages_seen,
            orders_extracted: self.orders_extracted,
            extraction_failures: self.extraction_failures,
            accepted: self.accepted,
            skipped: self.skipped,
            failed: self.failed,
            accepted_ids: self.accepted_ids.clone(),
        }
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> OrderId {
        OrderId(s.to_string())
    }

    #[test]
    fn seen_insert_is_idempotent() {
        let mut seen = SeenMessages::new();
        assert!(seen.insert("@everyone new job order id: z1"));
        assert!(!seen.insert("@everyone new job order id: z1"));
        assert!(seen.contains("@everyone new job order id: z1"));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn pending_preserves_order_and_skips_duplicates() {
        let mut pending = PendingOrders::new();
        assert!(pending.push(id("B2")));
        assert!(pending.push(id("A1")));
        assert!(!pending.push(id("b2")));
        assert_eq!(pending.ids(), &[id("B2"), id("A1")]);
    }

    #[test]
    fn pending_take_leaves_empty_set() {
        let mut pending: PendingOrders = vec![id("Z1")].into_iter().collect();
        let taken = pending.take();
        assert!(pending.is_empty());
        assert_eq!(taken.len(), 1);
        assert!(taken.contains("z1"));
    }

    #[test]
    fn stats_accumulate_reports() {
        let mut stats = RunStats::new();
        stats.record_acceptance(&AcceptanceReport {
            accepted: 1,
            skipped: 2,
            failed: 0,
            accepted_ids: vec!["Z1".into()],
            unclaimed: vec![],
        });
        stats.record_acceptance(&AcceptanceReport {
            accepted: 0,
            skipped: 1,
            failed: 1,
            accepted_ids: vec![],
            unclaimed: vec!["Y2".into()],
        });

        let summary = stats.exit_summary(7);
        assert_eq!(summary.cycles, 2);
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.messages_seen, 7);
        assert_eq!(summary.accepted_ids, vec!["Z1".to_string()]);
    }
}
