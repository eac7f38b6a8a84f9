use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use crate::{platform::MachineIdentity, utils::clock::Clock};

use super::{
    ledger::ActivityLedger,
    reporting::RemoteService,
    storage::log_storage::LogStorage,
};

/// Represents the persistence loop. Every tick it checks who owns the machine, writes the logs to
/// disk and reports the filtered metrics of the day.
pub struct ProcessingModule<S> {
    ledger: Arc<ActivityLedger>,
    storage: S,
    remote: Arc<dyn RemoteService>,
    identity: MachineIdentity,
    shutdown: CancellationToken,
    persist_frequency: Duration,
    time_provider: Box<dyn Clock>,
}

impl<S: LogStorage> ProcessingModule<S> {
    pub fn new(
        ledger: Arc<ActivityLedger>,
        storage: S,
        remote: Arc<dyn RemoteService>,
        identity: MachineIdentity,
        shutdown: CancellationToken,
        persist_frequency: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            storage,
            remote,
            identity,
            shutdown,
            persist_frequency,
            time_provider,
        }
    }

    async fn process_tick(&self) -> Result<()> {
        let verification = match self
            .remote
            .verify_uuid(&self.identity)
            .instrument(info_span!("Verifying machine identity"))
            .await
        {
            Ok(verification) => {
                debug!("Identity check returned {verification:?}");
                Some(verification)
            }
            Err(e) => {
                error!("Failed to verify machine identity {e:?}");
                None
            }
        };

        let today = self.time_provider.today();
        let payload = self
            .ledger
            .checkpoint(&self.storage, &self.identity, today, verification)
            .await?;
        info!("Saved logs");

        if let Some(payload) = payload {
            match self
                .remote
                .push_metrics(&payload)
                .instrument(info_span!("Sending metrics"))
                .await
            {
                Ok(()) => info!("Sent metrics for {}", payload.date),
                Err(e) => error!("Error sending metrics {e:?}"),
            }
        }
        Ok(())
    }

    /// Writes the logs one last time without contacting the remote service.
    async fn finalize(&self) -> Result<()> {
        let today = self.time_provider.today();
        self.ledger
            .checkpoint(&self.storage, &self.identity, today, None)
            .await?;
        info!("Saved logs before shutdown");
        Ok(())
    }

    pub async fn run(self) -> Result<()> {
        let mut persist_point = self.time_provider.instant();
        loop {
            persist_point += self.persist_frequency;

            if let Err(e) = self.process_tick().await {
                error!("Error saving logs {e:?}");
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return self.finalize().await
                }
                _ = self.time_provider.sleep_until(persist_point) => ()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use anyhow::{anyhow, Result};
    use tempfile::tempdir;
    use tokio_util::sync::CancellationToken;

    use crate::{
        agent::{
            collection::idle::IdleTracker,
            ledger::{ActivityLedger, TickSample},
            reporting::{MockRemoteService, Verification},
            storage::{
                entities::LogStore,
                log_storage::{JsonLogStorage, LogStorage},
            },
        },
        platform::MachineIdentity,
        utils::clock::{Clock, DefaultClock},
    };

    use super::ProcessingModule;

    async fn ledger_with_activity() -> Arc<ActivityLedger> {
        let today = DefaultClock.today();
        let ledger = Arc::new(ActivityLedger::new(
            LogStore::empty(3),
            IdleTracker::from_seconds(60),
            today,
        ));
        ledger.record_key("Terminal", "x".into());
        ledger
            .aggregate(
                today,
                TickSample {
                    applications: vec!["Terminal".into()],
                    ..Default::default()
                },
            )
            .await;
        ledger
    }

    fn processing(
        ledger: Arc<ActivityLedger>,
        storage: JsonLogStorage,
        remote: MockRemoteService,
    ) -> ProcessingModule<JsonLogStorage> {
        ProcessingModule::new(
            ledger,
            storage,
            Arc::new(remote),
            MachineIdentity::new("machine-1").unwrap(),
            CancellationToken::new(),
            Duration::from_secs(10),
            Box::new(DefaultClock),
        )
    }

    #[tokio::test]
    async fn test_tick_saves_and_reports() -> Result<()> {
        let dir = tempdir()?;
        let mut remote = MockRemoteService::new();
        remote
            .expect_verify_uuid()
            .times(1)
            .returning(|_| Ok(Verification::Known { emp_id: 3 }));
        remote
            .expect_push_metrics()
            .withf(|payload| {
                payload.uuid == "machine-1" && payload.app_details.contains_key("Terminal")
            })
            .times(1)
            .returning(|_| Ok(()));
        let ledger = ledger_with_activity().await;

        let module = processing(ledger.clone(), JsonLogStorage::new(dir.path())?, remote);
        module.process_tick().await?;

        let saved = JsonLogStorage::new(dir.path())?.load().await?;
        assert_eq!(saved, ledger.snapshot().await);
        assert_eq!(saved.emp_id, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_report_failure_keeps_local_write() -> Result<()> {
        let dir = tempdir()?;
        let mut remote = MockRemoteService::new();
        remote
            .expect_verify_uuid()
            .returning(|_| Ok(Verification::Known { emp_id: 3 }));
        remote
            .expect_push_metrics()
            .times(1)
            .returning(|_| Err(anyhow!("connection refused")));

        let module = processing(
            ledger_with_activity().await,
            JsonLogStorage::new(dir.path())?,
            remote,
        );

        module.process_tick().await?;
        assert!(dir.path().join("productivity_logs.json").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_service_skips_report() -> Result<()> {
        let dir = tempdir()?;
        let mut remote = MockRemoteService::new();
        remote
            .expect_verify_uuid()
            .returning(|_| Err(anyhow!("connection refused")));
        remote.expect_push_metrics().never();
        let ledger = ledger_with_activity().await;

        let module = processing(ledger.clone(), JsonLogStorage::new(dir.path())?, remote);
        module.process_tick().await?;

        assert_eq!(ledger.snapshot().await.emp_id, 3);
        assert!(dir.path().join("productivity_logs.json").exists());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_writes_final_snapshot() -> Result<()> {
        let dir = tempdir()?;
        let mut remote = MockRemoteService::new();
        remote
            .expect_verify_uuid()
            .times(1)
            .returning(|_| Ok(Verification::Unknown { status: 404 }));
        remote.expect_push_metrics().never();
        let ledger = ledger_with_activity().await;

        let module = processing(ledger.clone(), JsonLogStorage::new(dir.path())?, remote);
        let shutdown = module.shutdown.clone();

        let (_, result) = tokio::join!(
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                ledger
                    .aggregate(
                        DefaultClock.today(),
                        TickSample {
                            applications: vec!["Editor".into()],
                            ..Default::default()
                        },
                    )
                    .await;
                shutdown.cancel();
            },
            module.run(),
        );
        result?;

        let raw = std::fs::read_to_string(dir.path().join("productivity_logs.json"))?;
        let saved = serde_json::from_str::<LogStore>(&raw)?;
        assert_eq!(saved.emp_id, -1);
        assert!(saved.day_logs[&DefaultClock.today()]
            .application_activity
            .contains_key("Editor"));
        Ok(())
    }
}
