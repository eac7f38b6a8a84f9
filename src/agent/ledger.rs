//! The single owner of the mutable activity state.
//!
//! Both periodic loops and the key capture task share one [ActivityLedger]. The [LogStore] and the
//! idle accumulator sit behind one async mutex, so an aggregation pass and a checkpoint never
//! interleave. Pending keys have their own lock so that capture never waits for aggregation; they
//! are drained while the store lock is held.

use anyhow::Result;
use chrono::NaiveDate;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::platform::MachineIdentity;

use super::{
    aggregation::{aggregate, AggregationSummary, TickObservation},
    collection::{browser::DomainMap, idle::IdleTracker, keys::PendingKeyBuffer},
    reporting::{payload::MetricsPayload, Verification},
    storage::{
        entities::{LogStore, UNSET_EMP_ID},
        log_storage::LogStorage,
    },
};

/// Raw observations of one sampling tick.
#[derive(Debug, Clone, Default)]
pub struct TickSample {
    pub browser: DomainMap,
    pub applications: Vec<String>,
    /// Seconds since the last input, `None` when it couldn't be read.
    pub raw_idle: Option<f64>,
}

struct LedgerState {
    store: LogStore,
    idle: IdleTracker,
}

pub struct ActivityLedger {
    state: Mutex<LedgerState>,
    pending: PendingKeyBuffer,
}

impl ActivityLedger {
    /// Wraps a loaded store. Idle time already recorded for `today` keeps accumulating.
    pub fn new(mut store: LogStore, mut idle: IdleTracker, today: NaiveDate) -> Self {
        let discarded = store.discard_after(today);
        if !discarded.is_empty() {
            warn!("Discarding records dated in the future {discarded:?}");
        }
        if let Some(record) = store.day_logs.get(&today) {
            idle.resume(today, record.idle_time);
        }
        Self {
            state: Mutex::new(LedgerState { store, idle }),
            pending: PendingKeyBuffer::default(),
        }
    }

    pub fn record_key(&self, context: &str, key: String) {
        self.pending.append(context, key);
    }

    /// Folds a tick worth of observations into the record for `today`.
    pub async fn aggregate(&self, today: NaiveDate, sample: TickSample) -> AggregationSummary {
        let mut state = self.state.lock().await;
        let idle_time = match sample.raw_idle {
            Some(raw) => state.idle.check(today, raw),
            None => state.idle.current(today),
        };
        let observation = TickObservation {
            browser: sample.browser,
            applications: sample.applications,
            pending_keys: self.pending.drain(),
            idle_time,
        };
        aggregate(&mut state.store, today, observation)
    }

    /// Applies the result of an identity check, saves the store, and prepares the metrics for
    /// `today` when the identity check succeeded.
    ///
    /// Everything happens under one lock, so a reset caused by the check is part of the same
    /// write and is what the next aggregation sees.
    pub async fn checkpoint<S: LogStorage>(
        &self,
        storage: &S,
        identity: &MachineIdentity,
        today: NaiveDate,
        verification: Option<Verification>,
    ) -> Result<Option<MetricsPayload>> {
        let mut state = self.state.lock().await;

        match verification {
            Some(Verification::Unknown { status }) => {
                info!("Machine is not recognized ({status}), resetting logs");
                state.reset(UNSET_EMP_ID);
            }
            Some(Verification::Known { emp_id }) if emp_id != state.store.emp_id => {
                info!(
                    "Machine owner changed from {} to {emp_id}, resetting logs",
                    state.store.emp_id
                );
                state.reset(emp_id);
            }
            Some(Verification::Known { .. }) | None => {}
        }

        storage.save(&state.store).await?;

        let payload = match verification {
            Some(Verification::Known { .. }) => state
                .store
                .day_logs
                .get(&today)
                .and_then(|record| MetricsPayload::from_record(identity, today, record)),
            _ => None,
        };
        Ok(payload)
    }

    pub async fn snapshot(&self) -> LogStore {
        self.state.lock().await.store.clone()
    }
}

impl LedgerState {
    fn reset(&mut self, emp_id: i64) {
        self.store = LogStore::empty(emp_id);
        self.idle.reset();
    }
}
