use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    agent::ledger::{ActivityLedger, TickSample},
    platform::{IdleSource, SourceError},
    utils::clock::Clock,
};

use super::{browser::BrowserSampler, window::WindowSampler};

/// Samples every observation source once per tick and folds the result into the ledger.
pub struct SamplingModule {
    ledger: Arc<ActivityLedger>,
    window: WindowSampler,
    browser: BrowserSampler,
    idle: Box<dyn IdleSource>,
    idle_supported: bool,
    shutdown: CancellationToken,
    collection_frequency: Duration,
    time_provider: Box<dyn Clock>,
}

impl SamplingModule {
    pub fn new(
        ledger: Arc<ActivityLedger>,
        window: WindowSampler,
        browser: BrowserSampler,
        idle: Box<dyn IdleSource>,
        shutdown: CancellationToken,
        collection_frequency: Duration,
        time_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            window,
            browser,
            idle,
            idle_supported: true,
            shutdown,
            collection_frequency,
            time_provider,
        }
    }

    fn read_idle(&mut self) -> Option<f64> {
        if !self.idle_supported {
            return None;
        }
        match self.idle.idle_seconds() {
            Ok(seconds) => Some(seconds),
            Err(SourceError::Unsupported(what)) => {
                warn!("{what} is not supported, idle time won't be tracked");
                self.idle_supported = false;
                None
            }
            Err(SourceError::Query(e)) => {
                error!("Error calculating idle time {e:?}");
                None
            }
        }
    }

    fn collect_data(&mut self) -> TickSample {
        let today = self.time_provider.today();
        let browser = self.browser.sample(today);
        let application = self.window.sample();
        let raw_idle = self.read_idle();

        TickSample {
            browser,
            applications: vec![application],
            raw_idle,
        }
    }

    /// Executes the sampling event loop.
    pub async fn run(mut self) -> Result<()> {
        let mut collection_point = self.time_provider.instant();
        loop {
            collection_point += self.collection_frequency;

            let sample = self.collect_data();
            debug!("Collected {sample:?}");
            let today = self.time_provider.today();
            let summary = self
                .ledger
                .aggregate(today, sample)
                .instrument(info_span!("Aggregating collected data"))
                .await;
            info!("Aggregated tick for {today}: {summary:?}");

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.time_provider.sleep_until(collection_point) => ()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{mpsc as std_mpsc, Arc, Mutex},
        time::Duration,
    };

    use anyhow::{anyhow, Result};
    use tokio::sync::mpsc::UnboundedSender;
    use tokio_util::sync::CancellationToken;

    use crate::{
        agent::{
            collection::{
                browser::BrowserSampler,
                idle::IdleTracker,
                keys::{spawn_key_listener, KeyEvent},
                window::WindowSampler,
            },
            ledger::ActivityLedger,
            storage::entities::LogStore,
        },
        platform::{
            KeySource, MockHistorySource, MockIdleSource, MockWindowSource, SourceError,
        },
        utils::clock::{Clock, DefaultClock},
    };

    use super::SamplingModule;

    fn module(idle: MockIdleSource) -> (SamplingModule, Arc<ActivityLedger>) {
        let mut window = MockWindowSource::new();
        window
            .expect_active_window_title()
            .returning(|| Ok("Terminal".into()));
        let mut history = MockHistorySource::new();
        history
            .expect_fetch_history()
            .returning(|| Err(anyhow!("no browsers")));

        let ledger = Arc::new(ActivityLedger::new(
            LogStore::default(),
            IdleTracker::from_seconds(60),
            DefaultClock.today(),
        ));
        let module = SamplingModule::new(
            ledger.clone(),
            WindowSampler::new(Box::new(window)),
            BrowserSampler::new(Box::new(history)),
            Box::new(idle),
            CancellationToken::new(),
            Duration::from_secs(1),
            Box::new(DefaultClock),
        );
        (module, ledger)
    }

    #[test]
    fn test_unsupported_idle_is_queried_once() {
        let mut idle = MockIdleSource::new();
        idle.expect_idle_seconds()
            .times(1)
            .returning(|| Err(SourceError::Unsupported("idle time")));
        let (mut module, _) = module(idle);

        let first = module.collect_data();
        let second = module.collect_data();

        assert_eq!(first.raw_idle, None);
        assert_eq!(second.raw_idle, None);
        assert_eq!(second.applications, vec!["Terminal".to_string()]);
        assert!(second.browser.is_empty());
    }

    #[test]
    fn test_failed_idle_query_is_retried() {
        let mut idle = MockIdleSource::new();
        let mut calls = 0;
        idle.expect_idle_seconds().times(2).returning(move || {
            calls += 1;
            if calls == 1 {
                Err(SourceError::Query(anyhow!("screensaver extension missing")))
            } else {
                Ok(90.)
            }
        });
        let (mut module, _) = module(idle);

        assert_eq!(module.collect_data().raw_idle, None);
        assert_eq!(module.collect_data().raw_idle, Some(90.));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_aggregates_every_tick() {
        let mut idle = MockIdleSource::new();
        idle.expect_idle_seconds().returning(|| Ok(0.));
        let (module, ledger) = module(idle);
        let shutdown = module.shutdown.clone();

        let (_, result) = tokio::join!(
            async {
                tokio::time::sleep(Duration::from_millis(2500)).await;
                shutdown.cancel();
            },
            module.run(),
        );

        result.unwrap();
        let store = ledger.snapshot().await;
        let record = &store.day_logs[&DefaultClock.today()];
        assert_eq!(record.application_activity["Terminal"].time_spent, 3);
    }

    /// Forwards whatever the test types into the listener.
    struct TypedKeys(std_mpsc::Receiver<String>);

    impl KeySource for TypedKeys {
        fn listen(&mut self, sink: UnboundedSender<String>) -> Result<(), SourceError> {
            for key in self.0.iter() {
                if sink.send(key).is_err() {
                    break;
                }
            }
            Ok(())
        }
    }

    fn focused_window(focused: &Arc<Mutex<String>>) -> MockWindowSource {
        let focused = focused.clone();
        let mut window = MockWindowSource::new();
        window
            .expect_active_window_title()
            .returning(move || Ok(focused.lock().unwrap().clone()));
        window
    }

    #[test]
    fn test_keys_keep_their_window_during_slow_history_read() -> Result<()> {
        let focused = Arc::new(Mutex::new("Editor".to_string()));

        let (labeled, was_labeled) = std_mpsc::channel();
        let key_focus = focused.clone();
        let mut key_window = MockWindowSource::new();
        key_window.expect_active_window_title().returning(move || {
            let title = key_focus.lock().unwrap().clone();
            labeled.send(()).unwrap();
            Ok(title)
        });
        let (press, pressed) = std_mpsc::channel();
        let mut events = spawn_key_listener(
            Box::new(TypedKeys(pressed)),
            WindowSampler::new(Box::new(key_window)),
        )?;

        // The key is typed and the user switches windows while browser history is still read.
        let history_focus = focused.clone();
        let mut history = MockHistorySource::new();
        history.expect_fetch_history().times(1).returning(move || {
            press.send("k".to_string()).unwrap();
            was_labeled.recv_timeout(Duration::from_secs(5)).unwrap();
            *history_focus.lock().unwrap() = "Browser".into();
            Ok(vec![])
        });
        let mut idle = MockIdleSource::new();
        idle.expect_idle_seconds().returning(|| Ok(0.));

        let mut module = SamplingModule::new(
            Arc::new(ActivityLedger::new(
                LogStore::default(),
                IdleTracker::from_seconds(60),
                DefaultClock.today(),
            )),
            WindowSampler::new(Box::new(focused_window(&focused))),
            BrowserSampler::new(Box::new(history)),
            Box::new(idle),
            CancellationToken::new(),
            Duration::from_secs(1),
            Box::new(DefaultClock),
        );

        let sample = module.collect_data();

        assert_eq!(sample.applications, vec!["Browser".to_string()]);
        assert_eq!(
            events.blocking_recv(),
            Some(KeyEvent {
                context: "Editor".into(),
                key: "k".into(),
            })
        );
        Ok(())
    }
}
