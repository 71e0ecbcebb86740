//! # Failure Tracker
//!
//! Per-object record of the last reconcile error and how many times in a
//! row it repeated. Only identical consecutive failures count toward the
//! give-up limit; a different error starts the budget over.
//!
//! State is in memory only, so a process restart resets every budget.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub last_error: String,
    pub consecutive_count: u32,
    /// Object generation a permanent failure was reported for
    pub permanent_generation: Option<i64>,
}

/// Shared by every worker of a controller, keyed by `namespace/name`
#[derive(Debug)]
pub struct FailureTracker {
    limit: u32,
    records: Mutex<HashMap<String, FailureRecord>>,
}

impl FailureTracker {
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            records: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, FailureRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| {
            warn!("Failure tracker lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Consecutive identical failures tolerated before giving up
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Record a failure for `key` and return its consecutive count
    pub fn record(&self, key: &str, error: &impl std::fmt::Display) -> u32 {
        let error_text = error.to_string();
        let mut records = self.lock();

        match records.get_mut(key) {
            Some(record) if record.last_error == error_text => {
                record.consecutive_count = record.consecutive_count.saturating_add(1);
                record.permanent_generation = None;
                record.consecutive_count
            }
            _ => {
                records.insert(
                    key.to_string(),
                    FailureRecord {
                        last_error: error_text,
                        consecutive_count: 1,
                        permanent_generation: None,
                    },
                );
                1
            }
        }
    }

    /// Whether `count` has reached the give-up limit
    pub fn exceeded(&self, count: u32) -> bool {
        count >= self.limit
    }

    /// Remember that `key` failed permanently at `generation`
    pub fn mark_permanent(&self, key: &str, error: &impl std::fmt::Display, generation: i64) {
        self.lock().insert(
            key.to_string(),
            FailureRecord {
                last_error: error.to_string(),
                consecutive_count: 1,
                permanent_generation: Some(generation),
            },
        );
    }

    /// Whether `key` already failed permanently at `generation`
    pub fn is_permanent(&self, key: &str, generation: i64) -> bool {
        self.lock()
            .get(key)
            .is_some_and(|record| record.permanent_generation == Some(generation))
    }

    /// Forget the failure history of `key`
    pub fn clear(&self, key: &str) {
        self.lock().remove(key);
    }

    pub fn get(&self, key: &str) -> Option<FailureRecord> {
        self.lock().get(key).cloned()
    }
}

impl Default for FailureTracker {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_RECONCILE_FAIL_LIMIT)
    }
}
