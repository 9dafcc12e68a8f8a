//! Platform detection utilities

use log::debug;
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

/// PulseAudio socket exposed by WSLg
pub const WSLG_PULSE_PATH: &str = "/mnt/wslg/PulseServer";

/// Detect if running in WSL (Windows Subsystem for Linux)
///
/// Checks for WSL-specific indicators in /proc/version and environment variables.
pub fn is_wsl() -> bool {
    if let Ok(contents) = fs::read_to_string("/proc/version") {
        let lower = contents.to_lowercase();
        if lower.contains("microsoft") || lower.contains("wsl") {
            return true;
        }
    }

    std::env::var("WSL_DISTRO_NAME").is_ok()
}

/// PulseAudio server child processes should use, when one must be set explicitly
///
/// `None` means the environment already points somewhere (or the default
/// socket should be used).
pub fn pulse_server_override() -> Option<&'static str> {
    if std::env::var("PULSE_SERVER").is_ok() {
        debug!("PULSE_SERVER already set via environment");
        return None;
    }
    if is_wsl() && Path::new(WSLG_PULSE_PATH).exists() {
        debug!("Using WSLg PulseAudio server at {}", WSLG_PULSE_PATH);
        return Some(WSLG_PULSE_PATH);
    }
    None
}

/// First candidate that runs successfully with `probe_args`
pub fn find_executable(candidates: &[&str], probe_args: &[&str]) -> Option<String> {
    candidates.iter().find_map(|path| {
        let ok = Command::new(path)
            .args(probe_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false);
        if ok {
            debug!("Found executable: {}", path);
            Some(path.to_string())
        } else {
            None
        }
    })
}
