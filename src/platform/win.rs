
use anyhow::{Result, anyhow};
use tracing::error;
use windows::Win32::{
    System::SystemInformation::GetTickCount64,
    UI::{
        Input::KeyboardAndMouse::{GetLastInputInfo, LASTINPUTINFO},
        WindowsAndMessaging::{GetForegroundWindow, GetWindowTextW},
    },
};

use super::{IdleSource, SourceError, WindowSource};

#[tracing::instrument]
pub fn get_active_title() -> Result<String> {
    let window = unsafe { GetForegroundWindow() };

    if window.is_invalid() {
        return Err(anyhow!("Failed to get foreground window"));
    }

    let mut text: [u16; 4096] = [0; 4096];
    let len = unsafe { GetWindowTextW(window, &mut text) };
    Ok(String::from_utf16_lossy(&text[..len as usize]))
}

/// Seconds since the last input event, as reported by `GetLastInputInfo`.
pub fn get_idle_seconds() -> Result<f64> {
    let mut last: LASTINPUTINFO = LASTINPUTINFO {
        cbSize: size_of::<LASTINPUTINFO>() as u32,
        dwTime: 0,
    };
    let is_success = unsafe { GetLastInputInfo(&mut last) };
    if !is_success.as_bool() {
        return Err(anyhow!("Failed to retrieve user idle time"));
    }

    // dwTime wraps every ~49 days while GetTickCount64 doesn't, so compare the low 32 bits only.
    let tick_count = unsafe { GetTickCount64() } as u32;
    let millis = tick_count.wrapping_sub(last.dwTime);
    Ok(millis as f64 / 1000.)
}

pub struct WindowsPlatform {}

impl WindowsPlatform {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for WindowsPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowSource for WindowsPlatform {
    fn active_window_title(&mut self) -> Result<String> {
        get_active_title().inspect_err(|e| error!("Failed to get active window {e:?}"))
    }
}

impl IdleSource for WindowsPlatform {
    fn idle_seconds(&mut self) -> Result<f64, SourceError> {
        Ok(get_idle_seconds().inspect_err(|e| error!("Failed to get idle time {e:?}"))?)
    }
}
