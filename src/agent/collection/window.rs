use tracing::warn;

use crate::platform::WindowSource;

/// Label used when the foreground window can't be determined.
pub const UNKNOWN_CONTEXT: &str = "Unknown";

pub struct WindowSampler {
    source: Box<dyn WindowSource>,
}

impl WindowSampler {
    pub fn new(source: Box<dyn WindowSource>) -> Self {
        Self { source }
    }

    /// Title of the foreground window. Never fails, errors are reported as [UNKNOWN_CONTEXT].
    pub fn sample(&mut self) -> String {
        match self.source.active_window_title() {
            Ok(title) => title,
            Err(e) => {
                warn!("Failed to get active window {e:?}");
                UNKNOWN_CONTEXT.into()
            }
        }
    }
}
