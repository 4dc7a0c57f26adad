use std::path::{Path, PathBuf};

use karaoke_core::config::AppConfig;

pub const CONFIG_FILENAME: &str = "config.json";
pub const HISTORY_FILENAME: &str = "history.json";

pub const BACKEND_URL_ENV: &str = "KARAOKE_BACKEND_URL";
pub const DATA_DIR_ENV: &str = "KARAOKE_DATA_DIR";

pub fn default_app_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    apply_backend_override(&mut cfg, std::env::var(BACKEND_URL_ENV).ok());
    cfg
}

/// A non-blank override replaces the configured backend URL.
pub fn apply_backend_override(cfg: &mut AppConfig, value: Option<String>) {
    if let Some(url) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        cfg.backend_base_url = url;
    }
}

/// `$KARAOKE_DATA_DIR`, else `~/.karaoke`, else the working directory.
pub fn default_data_dir() -> PathBuf {
    resolve_data_dir(
        std::env::var_os(DATA_DIR_ENV).map(PathBuf::from),
        std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from),
    )
}

fn resolve_data_dir(explicit: Option<PathBuf>, home: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = explicit.filter(|d| !d.as_os_str().is_empty()) {
        return dir;
    }
    match home {
        Some(home) => home.join(".karaoke"),
        None => PathBuf::from("."),
    }
}

/// History lives beside the config file.
pub fn history_path_for(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .map(|p| p.join(HISTORY_FILENAME))
        .unwrap_or_else(|| PathBuf::from(HISTORY_FILENAME))
}
