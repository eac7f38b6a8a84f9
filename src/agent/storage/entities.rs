use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Employee id reported while the remote side doesn't know this machine.
pub const UNSET_EMP_ID: i64 = -1;

/// Activity observed for a single context (application window or browser domain) during a day.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone, Default)]
pub struct ContextStats {
    /// Number of sampling ticks the context was observed at. This is a coarse proxy for dwell
    /// time, not seconds.
    #[serde(default)]
    pub time_spent: u64,
    /// Only tracked for browser domains.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visits: Option<u64>,
    #[serde(default)]
    pub keys: Vec<String>,
    /// Cached result of [count_valid_keystrokes](crate::agent::collection::keys::count_valid_keystrokes)
    /// over `keys`.
    #[serde(default)]
    pub total_key_strokes: u64,
}

impl ContextStats {
    pub fn application() -> Self {
        Self::default()
    }

    pub fn browser(time_spent: u64, visits: u64) -> Self {
        Self {
            time_spent,
            visits: Some(visits),
            ..Self::default()
        }
    }
}

/// Everything recorded for a single calendar day.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone, Default)]
pub struct ActivityRecord {
    #[serde(default)]
    pub browser_activity: BTreeMap<String, ContextStats>,
    #[serde(default)]
    pub application_activity: BTreeMap<String, ContextStats>,
    #[serde(default)]
    pub idle_time: f64,
}

/// The unit of persistence. There's exactly one per machine.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct LogStore {
    pub emp_id: i64,
    pub day_logs: BTreeMap<NaiveDate, ActivityRecord>,
    /// Reserved for aggregated totals. Kept as is.
    #[serde(default)]
    pub summary: serde_json::Map<String, serde_json::Value>,
}

impl Default for LogStore {
    fn default() -> Self {
        Self::empty(UNSET_EMP_ID)
    }
}

impl LogStore {
    pub fn empty(emp_id: i64) -> Self {
        Self {
            emp_id,
            day_logs: BTreeMap::new(),
            summary: serde_json::Map::new(),
        }
    }

    /// Drops every record dated after `today`. Returns the dates that were removed.
    pub fn discard_after(&mut self, today: NaiveDate) -> Vec<NaiveDate> {
        let future = self.day_logs.split_off(&(today + chrono::Days::new(1)));
        future.into_keys().collect()
    }
}
