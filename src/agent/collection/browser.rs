use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{debug, error};

use crate::platform::{HistoryEntry, HistorySource};

/// Visit counters for one domain on one day. Both counters grow by one per history entry, so
/// `time_spent` is a frequency proxy rather than a duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DomainVisits {
    pub time_spent: u64,
    pub visits: u64,
}

pub type DomainMap = BTreeMap<String, DomainVisits>;

/// Extracts the host part of a url. Anything without `//` is treated as an opaque domain.
pub fn domain_of(url: &str) -> &str {
    if !url.contains("//") {
        return url;
    }
    match url.split('/').nth(2) {
        Some(host) if !host.is_empty() => host,
        _ => url,
    }
}

/// Groups history entries by the day they happened at and by domain.
pub fn bucket_history(entries: &[HistoryEntry]) -> BTreeMap<NaiveDate, DomainMap> {
    let mut days = BTreeMap::<NaiveDate, DomainMap>::new();
    for entry in entries {
        let visits = days
            .entry(entry.visited_at.date_naive())
            .or_default()
            .entry(domain_of(&entry.url).to_owned())
            .or_default();
        visits.time_spent += 1;
        visits.visits += 1;
    }
    days
}

pub struct BrowserSampler {
    source: Box<dyn HistorySource>,
    history: BTreeMap<NaiveDate, DomainMap>,
}

impl BrowserSampler {
    pub fn new(source: Box<dyn HistorySource>) -> Self {
        Self {
            source,
            history: BTreeMap::new(),
        }
    }

    /// Re-reads the whole browser history and returns the domains visited `today`.
    ///
    /// Every call recomputes the counters from scratch, so calling it repeatedly with an unchanged
    /// history gives the same result. A failing history source produces an empty result.
    pub fn sample(&mut self, today: NaiveDate) -> DomainMap {
        match self.source.fetch_history() {
            Ok(entries) => {
                self.history = bucket_history(&entries);
                debug!(
                    "Browser history has {} entries over {} days",
                    entries.len(),
                    self.history.len()
                );
                self.today(today)
            }
            Err(e) => {
                error!("Error fetching browser history {e:?}");
                DomainMap::new()
            }
        }
    }

    /// Domains for `today` from the last successful sample.
    pub fn today(&self, today: NaiveDate) -> DomainMap {
        self.history.get(&today).cloned().unwrap_or_default()
    }

    /// All days seen in the last successful sample.
    pub fn history(&self) -> &BTreeMap<NaiveDate, DomainMap> {
        &self.history
    }
}
