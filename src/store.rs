//! Result store: one batch of records, replaced wholesale by each published cycle.
//!
//! Readers clone the current `Arc<Batch>` under a short read lock, so they see either
//! the previous batch or the new one in full.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};

use crate::record::RiskRecord;

#[derive(Debug, Clone, Default)]
pub struct Batch {
    /// 0 until the first publish.
    pub cycle: u64,
    pub published_at: Option<DateTime<Utc>>,
    /// Keyed by entity name as registered.
    pub records: BTreeMap<String, Arc<RiskRecord>>,
}

#[derive(Debug, Default)]
pub struct ResultStore {
    current: RwLock<Arc<Batch>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a new batch and return its cycle number.
    pub fn publish(&self, records: Vec<RiskRecord>, published_at: DateTime<Utc>) -> u64 {
        let records: BTreeMap<_, _> = records
            .into_iter()
            .map(|r| (r.entity.clone(), Arc::new(r)))
            .collect();
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let cycle = guard.cycle + 1;
        *guard = Arc::new(Batch {
            cycle,
            published_at: Some(published_at),
            records,
        });
        cycle
    }

    pub fn snapshot(&self) -> Arc<Batch> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, entity: &str) -> Option<Arc<RiskRecord>> {
        self.snapshot().records.get(entity).cloned()
    }

    pub fn get_all(&self) -> BTreeMap<String, Arc<RiskRecord>> {
        self.snapshot().records.clone()
    }

    /// Records scoring at least `min_score`, highest first, ties by name.
    pub fn records_at_or_above(&self, min_score: u8) -> Vec<Arc<RiskRecord>> {
        let batch = self.snapshot();
        let mut out: Vec<_> = batch
            .records
            .values()
            .filter(|r| r.risk_score >= min_score)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.risk_score
                .cmp(&a.risk_score)
                .then_with(|| a.entity.cmp(&b.entity))
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::{Contributions, MergedFields, RiskLevel};

    fn rec(name: &str, score: u8) -> RiskRecord {
        RiskRecord {
            entity: name.into(),
            collected_at: Utc::now(),
            fields: MergedFields::default(),
            risk_score: score,
            risk_level: RiskLevel::from_score(score),
            contributions: Contributions::default(),
            sources: BTreeMap::new(),
        }
    }

    #[test]
    fn publish_replaces_whole_batch() {
        let store = ResultStore::new();
        assert_eq!(store.snapshot().cycle, 0);
        assert_eq!(store.publish(vec![rec("Kern", 5), rec("Inyo", 2)], Utc::now()), 1);

        let before = store.snapshot();
        assert_eq!(store.publish(vec![rec("Kern", 7)], Utc::now()), 2);

        assert_eq!(before.records.len(), 2);
        assert!(store.get("Inyo").is_none());
        assert_eq!(store.get("Kern").map(|r| r.risk_score), Some(7));
    }

    #[test]
    fn threshold_query_orders_by_score_then_name() {
        let store = ResultStore::new();
        store.publish(
            vec![rec("Napa", 6), rec("Kern", 8), rec("Butte", 6), rec("Inyo", 3)],
            Utc::now(),
        );
        let names: Vec<_> = store
            .records_at_or_above(6)
            .iter()
            .map(|r| r.entity.clone())
            .collect();
        assert_eq!(names, vec!["Kern", "Butte", "Napa"]);
    }
}
