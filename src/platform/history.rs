//! Browser history extraction.
//!
//! Browsers keep their history databases open and locked while running, so every database is
//! first copied into a cache directory and only the copy is opened (read-only).

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, instrument, warn};

use super::{HistoryEntry, HistorySource};

/// Microseconds between 1601-01-01 (WebKit epoch) and 1970-01-01.
const WEBKIT_EPOCH_OFFSET_MICROS: i64 = 11_644_473_600_000_000;

const CHROMIUM_QUERY: &str = "SELECT urls.url, urls.title, visits.visit_time \
     FROM visits INNER JOIN urls ON visits.url = urls.id";

const FIREFOX_QUERY: &str = "SELECT moz_places.url, moz_places.title, moz_historyvisits.visit_date \
     FROM moz_historyvisits INNER JOIN moz_places ON moz_historyvisits.place_id = moz_places.id \
     WHERE moz_historyvisits.visit_date IS NOT NULL AND moz_places.url LIKE 'http%'";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserKind {
    Chromium,
    Firefox,
}

/// One history database on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserProfile {
    pub name: String,
    pub kind: BrowserKind,
    pub database: PathBuf,
}

pub struct BrowserHistory {
    profiles: Vec<BrowserProfile>,
    cache_dir: PathBuf,
}

impl BrowserHistory {
    pub fn new(profiles: Vec<BrowserProfile>, cache_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            profiles,
            cache_dir,
        })
    }

    /// Looks for the browsers installed for the current user in their default locations.
    pub fn discover(cache_dir: PathBuf) -> Result<Self> {
        let profiles = default_profiles();
        debug!("Discovered browser profiles {profiles:?}");
        Self::new(profiles, cache_dir)
    }

    fn read_profile(&self, index: usize, profile: &BrowserProfile) -> Result<Vec<HistoryEntry>> {
        let copy = self
            .cache_dir
            .join(format!("{}-{index}.sqlite", profile.name));
        fs::copy(&profile.database, &copy)
            .with_context(|| format!("Failed to copy {:?}", profile.database))?;

        let connection = Connection::open_with_flags(&copy, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let query = match profile.kind {
            BrowserKind::Chromium => CHROMIUM_QUERY,
            BrowserKind::Firefox => FIREFOX_QUERY,
        };
        let mut statement = connection.prepare(query)?;
        let rows = statement.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut entries = vec![];
        for row in rows {
            let (url, title, timestamp) = row?;
            let visited_at = match profile.kind {
                BrowserKind::Chromium => from_webkit_micros(timestamp),
                BrowserKind::Firefox => from_unix_micros(timestamp),
            };
            match visited_at {
                Some(visited_at) => entries.push(HistoryEntry {
                    visited_at,
                    url,
                    title,
                }),
                None => debug!("Skipping {url} with invalid timestamp {timestamp}"),
            }
        }
        Ok(entries)
    }
}

impl HistorySource for BrowserHistory {
    #[instrument(skip(self))]
    fn fetch_history(&mut self) -> Result<Vec<HistoryEntry>> {
        let mut entries = vec![];
        for (index, profile) in self.profiles.iter().enumerate() {
            if !profile.database.exists() {
                continue;
            }
            match self.read_profile(index, profile) {
                Ok(found) => {
                    debug!("Read {} visits from {}", found.len(), profile.name);
                    entries.extend(found);
                }
                Err(e) => warn!("Skipping history of {}: {e:?}", profile.name),
            }
        }
        Ok(entries)
    }
}

fn from_unix_micros(micros: i64) -> Option<DateTime<Local>> {
    DateTime::from_timestamp_micros(micros).map(|v| v.with_timezone(&Local))
}

fn from_webkit_micros(micros: i64) -> Option<DateTime<Local>> {
    from_unix_micros(micros.checked_sub(WEBKIT_EPOCH_OFFSET_MICROS)?)
}

fn chromium(name: &str, user_data: PathBuf) -> BrowserProfile {
    BrowserProfile {
        name: name.into(),
        kind: BrowserKind::Chromium,
        database: user_data.join("Default").join("History"),
    }
}

/// Every `places.sqlite` below a Firefox profiles directory.
fn firefox_profiles(profiles_dir: &Path) -> Vec<BrowserProfile> {
    let Ok(entries) = fs::read_dir(profiles_dir) else {
        return vec![];
    };
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path().join("places.sqlite"))
        .filter(|database| database.exists())
        .map(|database| BrowserProfile {
            name: "firefox".into(),
            kind: BrowserKind::Firefox,
            database,
        })
        .collect()
}

fn default_profiles() -> Vec<BrowserProfile> {
    let mut profiles = vec![];
    cfg_if::cfg_if! {
        if #[cfg(windows)] {
            if let Ok(local) = env::var("LOCALAPPDATA").map(PathBuf::from) {
                profiles.push(chromium("chrome", local.join("Google/Chrome/User Data")));
                profiles.push(chromium("edge", local.join("Microsoft/Edge/User Data")));
                profiles.push(chromium("brave", local.join("BraveSoftware/Brave-Browser/User Data")));
            }
            if let Ok(roaming) = env::var("APPDATA").map(PathBuf::from) {
                profiles.extend(firefox_profiles(&roaming.join("Mozilla/Firefox/Profiles")));
            }
        }
        else if #[cfg(target_os = "macos")] {
            if let Ok(home) = env::var("HOME").map(PathBuf::from) {
                let support = home.join("Library/Application Support");
                profiles.push(chromium("chrome", support.join("Google/Chrome")));
                profiles.push(chromium("edge", support.join("Microsoft Edge")));
                profiles.push(chromium("brave", support.join("BraveSoftware/Brave-Browser")));
                profiles.extend(firefox_profiles(&support.join("Firefox/Profiles")));
            }
        }
        else {
            if let Ok(home) = env::var("HOME").map(PathBuf::from) {
                let config = env::var("XDG_CONFIG_HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| home.join(".config"));
                profiles.push(chromium("chrome", config.join("google-chrome")));
                profiles.push(chromium("chromium", config.join("chromium")));
                profiles.push(chromium("edge", config.join("microsoft-edge")));
                profiles.push(chromium("brave", config.join("BraveSoftware/Brave-Browser")));
                profiles.extend(firefox_profiles(&home.join(".mozilla/firefox")));
            }
        }
    }
    profiles
}
