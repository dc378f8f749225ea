// src/infra/paths.rs — Config path management
//
// All paths respect the ANALYST_HOME environment variable for isolation.
// When unset, config lives under ~/.analyst/.

use std::path::PathBuf;

/// Returns the ANALYST_HOME override, if set.
fn analyst_home() -> Option<PathBuf> {
    std::env::var_os("ANALYST_HOME").map(PathBuf::from)
}

/// Configuration directory: $ANALYST_HOME/ or ~/.analyst/
pub fn config_dir() -> PathBuf {
    if let Some(home) = analyst_home() {
        return home;
    }
    dirs_home().join(".analyst")
}

/// Home directory. Falls back to the current directory on hosts without one.
pub fn dirs_home() -> PathBuf {
    directories::BaseDirs::new()
        .map(|b| b.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Config file
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default prompt template directory (only used when it exists).
pub fn prompts_dir() -> PathBuf {
    config_dir().join("prompts")
}
