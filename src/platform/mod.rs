//! Per-OS locations for Glazyr's settings file and capture database.
//!
//! - **Linux**: `$XDG_CONFIG_HOME/glazyr` / `$XDG_DATA_HOME/glazyr`, falling
//!   back to `~/.config/glazyr` and `~/.local/share/glazyr`
//! - **macOS**: `~/Library/Application Support/Glazyr` for both
//! - **Windows**: `%APPDATA%\Glazyr` for both

use std::env;
use std::path::PathBuf;

/// Overrides [`get_data_dir`] when set.
pub const DATA_DIR_ENV: &str = "GLAZYR_DATA_DIR";

fn home() -> PathBuf {
    PathBuf::from(env::var("HOME").unwrap_or_else(|_| String::from("/tmp")))
}

#[cfg(target_os = "linux")]
fn xdg_dir(var: &str, fallback: &[&str]) -> PathBuf {
    match env::var(var) {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir).join("glazyr"),
        _ => fallback
            .iter()
            .fold(home(), |path, part| path.join(part))
            .join("glazyr"),
    }
}

#[cfg(target_os = "macos")]
fn app_support_dir() -> PathBuf {
    home().join("Library").join("Application Support").join("Glazyr")
}

#[cfg(target_os = "windows")]
fn app_data_dir() -> PathBuf {
    let base = env::var("APPDATA").map(PathBuf::from).unwrap_or_else(|_| home());
    base.join("Glazyr")
}

/// Directory holding `settings.json`.
pub fn get_config_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        xdg_dir("XDG_CONFIG_HOME", &[".config"])
    }
    #[cfg(target_os = "macos")]
    {
        app_support_dir()
    }
    #[cfg(target_os = "windows")]
    {
        app_data_dir()
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        home().join(".glazyr")
    }
}

/// Directory holding the capture database; `GLAZYR_DATA_DIR` wins when set.
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = env::var(DATA_DIR_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    #[cfg(target_os = "linux")]
    {
        xdg_dir("XDG_DATA_HOME", &[".local", "share"])
    }
    #[cfg(target_os = "macos")]
    {
        app_support_dir()
    }
    #[cfg(target_os = "windows")]
    {
        app_data_dir()
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        home().join(".glazyr")
    }
}
