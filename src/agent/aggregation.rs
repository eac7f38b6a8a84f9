//! Merges everything observed during a tick into the record of the current day.
//!
//! Browser counts come from a full recompute of the history, while application ticks and keys
//! are incremental. The merge keeps the two apart: a domain is seeded from the browser counts
//! once and is then only ever extended with keys, so a later recompute can't clobber them.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use tracing::debug;

use super::{
    collection::{
        browser::DomainMap,
        keys::{count_valid_keystrokes, MAX_KEY_REPEAT},
    },
    storage::entities::{ActivityRecord, ContextStats, LogStore},
};

/// What was observed since the previous aggregation.
#[derive(Debug, Clone, Default)]
pub struct TickObservation {
    /// Domains visited today according to the browser sampler.
    pub browser: DomainMap,
    /// Foreground applications seen during the tick.
    pub applications: Vec<String>,
    /// Keys captured since the previous aggregation, by context.
    pub pending_keys: HashMap<String, Vec<String>>,
    /// Accumulated idle seconds for the day.
    pub idle_time: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationSummary {
    pub new_domains: usize,
    pub folded_keys: usize,
    pub dropped_keys: usize,
}

pub fn aggregate(
    store: &mut LogStore,
    today: NaiveDate,
    observation: TickObservation,
) -> AggregationSummary {
    let mut summary = AggregationSummary::default();
    let record = store.day_logs.entry(today).or_default();

    for (domain, visits) in &observation.browser {
        if !record.browser_activity.contains_key(domain) {
            record.browser_activity.insert(
                domain.clone(),
                ContextStats::browser(visits.time_spent, visits.visits),
            );
            summary.new_domains += 1;
        }
    }

    let applications = observation.applications.into_iter().collect::<BTreeSet<_>>();
    for application in applications {
        record
            .application_activity
            .entry(application)
            .or_insert_with(ContextStats::application)
            .time_spent += 1;
    }

    for (context, keys) in observation.pending_keys {
        let count = keys.len();
        if fold_keys(record, &context, keys) {
            summary.folded_keys += count;
        } else {
            debug!("Dropping {count} keys for unobserved context {context:?}");
            summary.dropped_keys += count;
        }
    }

    if observation.idle_time > record.idle_time {
        record.idle_time = observation.idle_time;
    } else if observation.idle_time < record.idle_time {
        debug!(
            "Keeping stored idle time {} over {}",
            record.idle_time, observation.idle_time
        );
    }

    summary
}

/// Appends keys to the matching context, looking at browser domains first.
fn fold_keys(record: &mut ActivityRecord, context: &str, keys: Vec<String>) -> bool {
    let stats = match record.browser_activity.get_mut(context) {
        Some(stats) => stats,
        None => match record.application_activity.get_mut(context) {
            Some(stats) => stats,
            None => return false,
        },
    };
    stats.keys.extend(keys);
    stats.total_key_strokes = count_valid_keystrokes(&stats.keys, MAX_KEY_REPEAT);
    true
}
