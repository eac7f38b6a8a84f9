use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    thread,
};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::{
    agent::ledger::ActivityLedger,
    platform::{KeySource, SourceError},
};

use super::window::WindowSampler;

/// Longest run of one repeated key that still counts as typing.
pub const MAX_KEY_REPEAT: usize = 20;

/// Counts keystrokes that look like real typing.
///
/// Walks the sequence starting from the second key, tracking how many times in a row the same
/// symbol was seen. A key counts only while that run is at most `max_repeat`, which filters out
/// stuck keys and auto-repeat floods while still accepting short legitimate bursts.
pub fn count_valid_keystrokes(keys: &[String], max_repeat: usize) -> u64 {
    let Some((first, rest)) = keys.split_first() else {
        return 0;
    };

    let mut valid = 0;
    let mut run = 1usize;
    let mut last = first;
    for key in rest {
        if key == last {
            run += 1;
        } else {
            run = 1;
        }
        if run <= max_repeat {
            valid += 1;
        }
        last = key;
    }
    valid
}

/// Keys captured since the last aggregation, grouped by the context they were typed in.
#[derive(Default)]
pub struct PendingKeyBuffer {
    pending: Mutex<HashMap<String, Vec<String>>>,
}

impl PendingKeyBuffer {
    pub fn append(&self, context: &str, key: String) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        match pending.get_mut(context) {
            Some(keys) => keys.push(key),
            None => {
                pending.insert(context.to_owned(), vec![key]);
            }
        }
    }

    /// Takes every pending key out of the buffer. Each key is returned by exactly one drain.
    pub fn drain(&self) -> HashMap<String, Vec<String>> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// A key press together with the window that was in front when it happened.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyEvent {
    pub context: String,
    pub key: String,
}

/// Starts `source` on its own OS thread. Every key is labeled with the active window by a second
/// thread as soon as it arrives, so the label never depends on the async loops being polled.
/// The returned receiver is closed once the listener stops.
pub fn spawn_key_listener(
    mut source: Box<dyn KeySource>,
    mut resolver: WindowSampler,
) -> Result<mpsc::UnboundedReceiver<KeyEvent>> {
    let (key_sender, mut keys) = mpsc::unbounded_channel();
    let (sender, receiver) = mpsc::unbounded_channel();

    thread::Builder::new()
        .name("key-listener".into())
        .spawn(move || match source.listen(key_sender) {
            Ok(()) => info!("Key listener finished"),
            Err(SourceError::Unsupported(what)) => {
                warn!("{what} is not supported, keystrokes won't be recorded")
            }
            Err(e) => error!("Key listener failed {e:?}"),
        })?;

    thread::Builder::new()
        .name("key-labeler".into())
        .spawn(move || {
            while let Some(key) = keys.blocking_recv() {
                let context = resolver.sample();
                trace!("Key {key:?} in {context:?}");
                if sender.send(KeyEvent { context, key }).is_err() {
                    break;
                }
            }
            debug!("Key labeler finished");
        })?;

    Ok(receiver)
}

/// Moves labeled keys into the ledger until shutdown.
pub struct KeyCaptureModule {
    events: mpsc::UnboundedReceiver<KeyEvent>,
    ledger: Arc<ActivityLedger>,
    shutdown: CancellationToken,
}

impl KeyCaptureModule {
    pub fn new(
        events: mpsc::UnboundedReceiver<KeyEvent>,
        ledger: Arc<ActivityLedger>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            events,
            ledger,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                event = self.events.recv() => {
                    let Some(KeyEvent { context, key }) = event else {
                        debug!("Key event channel closed");
                        return Ok(());
                    };
                    self.ledger.record_key(&context, key);
                }
            }
        }
    }
}
