use std::{fs, path::PathBuf, process::Command};

use anyhow::{anyhow, Context, Result};
use tracing::{debug, instrument};

use super::{IdentitySource, MachineIdentity};

/// Reads the hardware/OS identifier the operating system exposes for this machine.
pub struct PlatformIdentity {
    /// Files that may contain the identifier, tried in order. Only used on unix-like systems
    /// without `ioreg`.
    candidates: Vec<PathBuf>,
}

impl PlatformIdentity {
    pub fn new() -> Self {
        Self {
            candidates: vec![
                "/etc/machine-id".into(),
                "/var/lib/dbus/machine-id".into(),
                "/sys/class/dmi/id/product_uuid".into(),
            ],
        }
    }

    #[cfg(test)]
    fn with_candidates(candidates: Vec<PathBuf>) -> Self {
        Self { candidates }
    }

    fn from_files(&self) -> Result<MachineIdentity> {
        for path in &self.candidates {
            match fs::read_to_string(path) {
                Ok(content) if !content.trim().is_empty() => {
                    debug!("Using machine identity from {path:?}");
                    return MachineIdentity::new(content.trim());
                }
                Ok(_) => debug!("{path:?} is empty"),
                Err(e) => debug!("Can't read {path:?}: {e}"),
            }
        }
        Err(anyhow!(
            "None of {:?} contained a machine identity",
            self.candidates
        ))
    }
}

impl Default for PlatformIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentitySource for PlatformIdentity {
    #[instrument(skip(self))]
    fn machine_identity(&self) -> Result<MachineIdentity> {
        cfg_if::cfg_if! {
            if #[cfg(windows)] {
                let output = run_command("wmic", &["csproduct", "get", "uuid"])?;
                parse_wmic_uuid(&output)
            }
            else if #[cfg(target_os = "macos")] {
                let output = run_command("ioreg", &["-rd1", "-c", "IOPlatformExpertDevice"])?;
                parse_ioreg_uuid(&output)
            }
            else {
                self.from_files()
            }
        }
    }
}

#[allow(dead_code)]
fn run_command(program: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("Failed to run {program}"))?;
    if !output.status.success() {
        return Err(anyhow!("{program} exited with {}", output.status));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// `wmic csproduct get uuid` prints a `UUID` header followed by the value.
#[allow(dead_code)]
fn parse_wmic_uuid(output: &str) -> Result<MachineIdentity> {
    output
        .split_whitespace()
        .find(|token| {
            token.contains('-') && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
        .ok_or_else(|| anyhow!("wmic output didn't contain a uuid: {output:?}"))
        .and_then(MachineIdentity::new)
}

/// Picks the value out of a line like `"IOPlatformUUID" = "564D1A2B-..."`.
#[allow(dead_code)]
fn parse_ioreg_uuid(output: &str) -> Result<MachineIdentity> {
    output
        .lines()
        .find(|line| line.contains("IOPlatformUUID"))
        .and_then(|line| line.split('"').nth(3))
        .ok_or_else(|| anyhow!("ioreg output didn't contain IOPlatformUUID"))
        .and_then(MachineIdentity::new)
}
