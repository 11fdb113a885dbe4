//! Local key/value store.
//!
//! Maps each key to a set of values. Mutations and range extraction take the
//! same lock, so a handoff never races an `add` on a key being moved.

use corelib::TableRow;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
pub struct KeyValueStore {
    rows: Mutex<BTreeMap<String, BTreeSet<String>>>,
}

impl KeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values bound to `key`; empty if the key is absent.
    pub fn get(&self, key: &str) -> Vec<String> {
        self.rows
            .lock()
            .get(key)
            .map(|vals| vals.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Binds `val` to `key`. Returns false if the binding already existed.
    pub fn add(&self, key: &str, val: &str) -> bool {
        self.rows
            .lock()
            .entry(key.to_string())
            .or_default()
            .insert(val.to_string())
    }

    /// Unbinds `val` from `key`. Returns false if there was no such binding.
    pub fn delete(&self, key: &str, val: &str) -> bool {
        let mut rows = self.rows.lock();
        let Some(vals) = rows.get_mut(key) else {
            return false;
        };
        let removed = vals.remove(val);
        if vals.is_empty() {
            rows.remove(key);
        }
        removed
    }

    /// Atomically removes and returns every row whose key satisfies `moves`.
    pub fn extract<F>(&self, mut moves: F) -> Vec<TableRow>
    where
        F: FnMut(&str) -> bool,
    {
        let mut rows = self.rows.lock();
        let keys: Vec<String> = rows.keys().filter(|key| moves(key.as_str())).cloned().collect();
        keys.into_iter()
            .filter_map(|key| {
                rows.remove(&key)
                    .map(|vals| TableRow::new(key, vals.into_iter().collect()))
            })
            .collect()
    }

    /// Merges handed-off rows into the store. Returns the number of new
    /// bindings.
    pub fn install(&self, incoming: Vec<TableRow>) -> usize {
        let mut rows = self.rows.lock();
        let mut added = 0;
        for row in incoming {
            if row.vals.is_empty() {
                continue;
            }
            let vals = rows.entry(row.key).or_default();
            for val in row.vals {
                if vals.insert(val) {
                    added += 1;
                }
            }
        }
        added
    }

    /// Copy of every row, ordered by key.
    pub fn rows(&self) -> Vec<TableRow> {
        self.rows
            .lock()
            .iter()
            .map(|(key, vals)| TableRow::new(key.clone(), vals.iter().cloned().collect()))
            .collect()
    }

    /// Number of keys held.
    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}
