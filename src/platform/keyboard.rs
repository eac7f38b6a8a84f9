//! Global key-down capture.

use tokio::sync::mpsc::UnboundedSender;

use super::{KeySource, SourceError};

/// Listens to the global keyboard through `rdev`. Only available with the `keyboard` feature.
#[derive(Default)]
pub struct GlobalKeyListener;

impl GlobalKeyListener {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "keyboard")]
impl KeySource for GlobalKeyListener {
    fn listen(&mut self, sink: UnboundedSender<String>) -> Result<(), SourceError> {
        use rdev::{listen, EventType};

        listen(move |event| {
            if let EventType::KeyPress(key) = event.event_type {
                // Printable keys carry their text, everything else is recorded by name.
                let symbol = event
                    .name
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| format!("{key:?}"));
                // The receiver only goes away during shutdown.
                let _ = sink.send(symbol);
            }
        })
        .map_err(|e| SourceError::Query(anyhow::anyhow!("Keyboard listener failed {e:?}")))
    }
}

#[cfg(not(feature = "keyboard"))]
impl KeySource for GlobalKeyListener {
    fn listen(&mut self, _sink: UnboundedSender<String>) -> Result<(), SourceError> {
        Err(SourceError::Unsupported("keyboard capture"))
    }
}
