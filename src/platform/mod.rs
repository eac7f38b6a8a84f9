//! Contains logic for observing the host machine.
//! Every observation the agent needs is expressed as a small capability trait with one operation,
//! so that the collection code only ever talks to the trait. [GenericPlatform] is the main
//! artifact of this module: it picks the window and idle implementation for the current build.

pub mod history;
pub mod identity;
pub mod keyboard;
#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use std::{fmt::Display, sync::Arc};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

#[cfg(test)]
use mockall::automock;

/// Failure of a best-effort platform query.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The current platform (or build) has no way to answer the query at all.
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
    #[error(transparent)]
    Query(#[from] anyhow::Error),
}

/// Title of the foreground window. For example 'bash in hello' or 'Vibing in YouTube - Chrome'.
#[cfg_attr(test, automock)]
pub trait WindowSource: Send {
    fn active_window_title(&mut self) -> Result<String>;
}

#[cfg_attr(test, automock)]
pub trait IdleSource: Send {
    /// Seconds since the user last touched an input device.
    fn idle_seconds(&mut self) -> Result<f64, SourceError>;
}

/// A single visit recorded by a browser.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub visited_at: DateTime<Local>,
    pub url: String,
    pub title: Option<String>,
}

#[cfg_attr(test, automock)]
pub trait HistorySource: Send {
    /// Returns the complete browser history. There is no incremental variant.
    fn fetch_history(&mut self) -> Result<Vec<HistoryEntry>>;
}

/// Stable identifier of the physical machine. Remote reporting is keyed on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineIdentity(Arc<str>);

impl MachineIdentity {
    pub fn new(value: impl Into<Arc<str>>) -> Result<Self> {
        let value: Arc<str> = value.into();
        if value.trim().is_empty() {
            return Err(anyhow!("Machine identity can't be empty"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MachineIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg_attr(test, automock)]
pub trait IdentitySource {
    fn machine_identity(&self) -> Result<MachineIdentity>;
}

/// Produces key-down events. [KeySource::listen] blocks the calling thread for as long as the
/// listener lives, so it has to be run on a dedicated thread.
pub trait KeySource: Send {
    fn listen(&mut self, sink: UnboundedSender<String>) -> Result<(), SourceError>;
}

/// Serves as a cross-compatible window and idle implementation.
pub struct GenericPlatform {
    inner: Box<dyn PlatformSource>,
}

trait PlatformSource: WindowSource + IdleSource {}

impl<T: WindowSource + IdleSource> PlatformSource for T {}

impl GenericPlatform {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::WindowsPlatform;
                Ok(Self {
                    inner: Box::new(WindowsPlatform::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::X11Platform;
                Ok(Self {
                    inner: Box::new(X11Platform::new()?),
                })
            }
            else {
                Ok(Self {
                    inner: Box::new(HeadlessPlatform),
                })
            }
        }
    }
}

impl WindowSource for GenericPlatform {
    fn active_window_title(&mut self) -> Result<String> {
        self.inner.active_window_title()
    }
}

impl IdleSource for GenericPlatform {
    fn idle_seconds(&mut self) -> Result<f64, SourceError> {
        self.inner.idle_seconds()
    }
}

/// Used when the build has no window system backend enabled.
struct HeadlessPlatform;

impl WindowSource for HeadlessPlatform {
    fn active_window_title(&mut self) -> Result<String> {
        Err(anyhow!("No window system backend was enabled for this build"))
    }
}

impl IdleSource for HeadlessPlatform {
    fn idle_seconds(&mut self) -> Result<f64, SourceError> {
        Err(SourceError::Unsupported("idle time"))
    }
}
