//! Bookkeeping of rows inserted through hooked connections.
//!
//! The registry maps a lower-cased table name to the ids generated in it, in
//! insertion order and without duplicates. Tables keep the order of their
//! first insert so cleanup can walk them in reverse.

use std::collections::{HashMap, HashSet};

/// Ids recorded for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTable {
    pub table: String,
    pub ids: Vec<i64>,
}

#[derive(Debug, Default)]
struct TableIds {
    ordered: Vec<i64>,
    seen: HashSet<i64>,
}

impl TableIds {
    fn push(&mut self, id: i64) -> bool {
        if self.seen.insert(id) {
            self.ordered.push(id);
            true
        } else {
            false
        }
    }
}

/// Insert registry. Not synchronized; callers hold it behind a mutex.
#[derive(Debug, Default)]
pub struct Registry {
    order: Vec<String>,
    tables: HashMap<String, TableIds>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id` for `table`. Returns false if it was already recorded.
    pub fn record(&mut self, table: &str, id: i64) -> bool {
        if !self.tables.contains_key(table) {
            self.order.push(table.to_string());
        }
        self.tables.entry(table.to_string()).or_default().push(id)
    }

    /// Put back ids whose deletion did not happen, ahead of anything
    /// recorded since.
    pub fn restore(&mut self, table: &str, ids: Vec<i64>) {
        if ids.is_empty() {
            return;
        }
        if !self.tables.contains_key(table) {
            self.order.insert(0, table.to_string());
        }
        let entry = self.tables.entry(table.to_string()).or_default();
        let mut merged = TableIds::default();
        for id in ids.into_iter().chain(entry.ordered.drain(..)) {
            merged.push(id);
        }
        *entry = merged;
    }

    /// Take every pending table, in first-insert order, leaving the registry empty.
    pub fn drain(&mut self) -> Vec<PendingTable> {
        let mut tables = std::mem::take(&mut self.tables);
        std::mem::take(&mut self.order)
            .into_iter()
            .filter_map(|table| {
                let ids = tables.remove(&table)?.ordered;
                (!ids.is_empty()).then_some(PendingTable { table, ids })
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.tables.clear();
    }

    /// Total number of ids awaiting deletion.
    pub fn pending_rows(&self) -> usize {
        self.tables.values().map(|t| t.ordered.len()).sum()
    }

    /// Ids awaiting deletion for `table`, in insertion order.
    pub fn ids(&self, table: &str) -> Vec<i64> {
        self.tables
            .get(table)
            .map(|t| t.ordered.clone())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.pending_rows() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_dedupes_and_keeps_order() {
        let mut reg = Registry::new();
        assert!(reg.record("t1", 3));
        assert!(reg.record("t1", 1));
        assert!(!reg.record("t1", 3));
        assert_eq!(reg.ids("t1"), vec![3, 1]);
        assert_eq!(reg.pending_rows(), 2);
        assert!(reg.ids("t2").is_empty());
    }

    #[test]
    fn drain_follows_first_insert_order() {
        let mut reg = Registry::new();
        reg.record("t2", 1);
        reg.record("t1", 1);
        reg.record("t2", 2);

        let drained = reg.drain();
        assert_eq!(
            drained,
            vec![
                PendingTable {
                    table: "t2".to_string(),
                    ids: vec![1, 2]
                },
                PendingTable {
                    table: "t1".to_string(),
                    ids: vec![1]
                },
            ]
        );
        assert!(reg.is_empty());
        assert!(reg.drain().is_empty());
    }

    #[test]
    fn restore_puts_ids_first() {
        let mut reg = Registry::new();
        reg.record("t1", 10);
        reg.restore("t1", vec![4, 5, 10]);
        assert_eq!(reg.ids("t1"), vec![4, 5, 10]);

        reg.restore("t9", vec![7]);
        let order: Vec<_> = reg.drain().into_iter().map(|p| p.table).collect();
        assert_eq!(order, vec!["t9", "t1"]);
    }

    #[test]
    fn clear_forgets_everything() {
        let mut reg = Registry::new();
        reg.record("t1", 1);
        reg.clear();
        assert_eq!(reg.pending_rows(), 0);
        assert!(reg.drain().is_empty());
    }
}
