//! Platform app-data paths.
//!
//! All durable per-session state lives under the platform app-data root:
//! `%APPDATA%\<app-id>` on Windows, `~/Library/Application Support/<app-id>`
//! on macOS, `$XDG_DATA_HOME/<app-id>` (or `~/.local/share/<app-id>`)
//! elsewhere. The layout matches what the desktop client expects.

use std::path::PathBuf;

use crate::error::{Error, Result};

pub const APP_ID: &str = "com.voco.engine";

/// The platform-specific app data directory for this app id.
pub fn app_data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let base = std::env::var("APPDATA").unwrap_or_default();
        PathBuf::from(base).join(APP_ID)
    }
    #[cfg(target_os = "macos")]
    {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Library")
            .join("Application Support")
            .join(APP_ID)
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let base = match std::env::var("XDG_DATA_HOME") {
            Ok(xdg) if !xdg.is_empty() => PathBuf::from(xdg),
            _ => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".local")
                .join("share"),
        };
        base.join(APP_ID)
    }
}

/// Directory holding a session's checkpoints and turn archives.
pub fn session_dir(session_id: &str) -> PathBuf {
    app_data_dir().join("sessions").join(session_id)
}

/// Create (if needed) and return the session directory.
pub fn ensure_session_dir(session_id: &str) -> Result<PathBuf> {
    let dir = session_dir(session_id);
    std::fs::create_dir_all(&dir).map_err(|e| Error::io("creating session directory", e))?;
    Ok(dir)
}

/// Path of the native config file.
pub fn config_file() -> PathBuf {
    app_data_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_dir_is_under_app_data() {
        let dir = session_dir("abc123");
        assert!(dir.ends_with("sessions/abc123") || dir.ends_with("sessions\\abc123"));
        assert!(dir.to_string_lossy().contains(APP_ID));
    }
}
