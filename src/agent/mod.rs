use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use collection::{
    browser::BrowserSampler,
    collector::SamplingModule,
    idle::IdleTracker,
    keys::{spawn_key_listener, KeyCaptureModule, KeyEvent},
    window::WindowSampler,
};
use ledger::ActivityLedger;
use processing::ProcessingModule;
use reporting::{http::HttpRemoteService, RemoteService};
use storage::log_storage::{JsonLogStorage, LogStorage};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    platform::{
        history::BrowserHistory, identity::PlatformIdentity, keyboard::GlobalKeyListener,
        GenericPlatform, HistorySource, IdentitySource, IdleSource, MachineIdentity,
        WindowSource,
    },
    utils::clock::{Clock, DefaultClock},
};

pub mod aggregation;
pub mod args;
pub mod collection;
pub mod ledger;
pub mod processing;
pub mod reporting;
pub mod shutdown;
pub mod storage;

/// Settings the agent runs with.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub dir: PathBuf,
    pub host: String,
    pub interval: Duration,
    pub idle_threshold_s: u64,
}

/// Represents the starting point for the agent
pub async fn start_agent(config: AgentConfig) -> Result<()> {
    let identity = PlatformIdentity::new()
        .machine_identity()
        .context("Failed to resolve machine identity")?;
    info!("Running as machine {identity}");

    let storage = JsonLogStorage::new(&config.dir)?;
    let store = storage.load().await?;
    let ledger = Arc::new(ActivityLedger::new(
        store,
        IdleTracker::from_seconds(config.idle_threshold_s),
        DefaultClock.today(),
    ));

    let shutdown_token = CancellationToken::new();
    let remote = HttpRemoteService::new(&config.host)?;
    info!("Reporting to {}", remote.base());

    let key_events = spawn_key_listener(
        Box::new(GlobalKeyListener::new()),
        WindowSampler::new(Box::new(GenericPlatform::new()?)),
    )?;
    let capture = create_key_capture(key_events, ledger.clone(), &shutdown_token);

    let sampler = create_sampler(
        ledger.clone(),
        GenericPlatform::new()?,
        BrowserHistory::discover(config.dir.join("history-cache"))?,
        GenericPlatform::new()?,
        &shutdown_token,
        config.interval,
        DefaultClock,
    );

    let processor = create_processor(
        storage,
        ledger,
        Arc::new(remote),
        identity,
        &shutdown_token,
        config.interval,
        DefaultClock,
    );

    let (_, capture_result, sampling_result, processing_result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        capture.run(),
        sampler.run(),
        processor.run(),
    );

    if let Err(capture_result) = capture_result {
        error!("Key capture got an error {:?}", capture_result);
    }

    if let Err(sampling_result) = sampling_result {
        error!("Sampling module got an error {:?}", sampling_result);
    }

    if let Err(processing_result) = processing_result {
        error!("Processing module got an error {:?}", processing_result);
    }

    Ok(())
}

fn create_key_capture(
    events: mpsc::UnboundedReceiver<KeyEvent>,
    ledger: Arc<ActivityLedger>,
    shutdown_token: &CancellationToken,
) -> KeyCaptureModule {
    KeyCaptureModule::new(events, ledger, shutdown_token.clone())
}

fn create_sampler(
    ledger: Arc<ActivityLedger>,
    window: impl WindowSource + 'static,
    history: impl HistorySource + 'static,
    idle: impl IdleSource + 'static,
    shutdown_token: &CancellationToken,
    interval: Duration,
    clock: impl Clock,
) -> SamplingModule {
    SamplingModule::new(
        ledger,
        WindowSampler::new(Box::new(window)),
        BrowserSampler::new(Box::new(history)),
        Box::new(idle),
        shutdown_token.clone(),
        interval,
        Box::new(clock),
    )
}

fn create_processor<S: LogStorage>(
    storage: S,
    ledger: Arc<ActivityLedger>,
    remote: Arc<dyn RemoteService>,
    identity: MachineIdentity,
    shutdown_token: &CancellationToken,
    interval: Duration,
    clock: impl Clock,
) -> ProcessingModule<S> {
    ProcessingModule::new(
        ledger,
        storage,
        remote,
        identity,
        shutdown_token.clone(),
        interval,
        Box::new(clock),
    )
}
