use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Application folder name under the platform config/data roots
const APP_DIR: &str = "curvedit";

/// Files whose presence in the working directory makes it the config dir
const LOCAL_MARKERS: [&str; 3] = ["curvedit.json", "curvedit_prefs.json", "curvedit.log"];

/// Configuration for overriding default application paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from caller or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: explicit dir -> ENV var (CURVEDIT_CONFIG_DIR) -> None (use defaults)
    pub fn from_env_or(dir: Option<PathBuf>) -> Self {
        let config_dir = dir.or_else(|| std::env::var("CURVEDIT_CONFIG_DIR").ok().map(PathBuf::from));
        Self { config_dir }
    }
}

/// Get path to a configuration file
///
/// Priority:
/// 1. Explicit config directory
/// 2. CURVEDIT_CONFIG_DIR environment variable
/// 3. Local folder IF any config files exist (curvedit.json, curvedit_prefs.json, curvedit.log)
/// 4. Platform-specific config directory from dirs-next (default)
///
/// Platform paths:
/// - Linux: ~/.config/curvedit/{name}
/// - macOS: ~/Library/Application Support/curvedit/{name}
/// - Windows: %APPDATA%\curvedit\{name}
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    get_config_dir(config).join(name)
}

/// Get path to a data file (logs, autosaves)
pub fn data_file(name: &str, config: &PathConfig) -> PathBuf {
    get_data_dir(config).join(name)
}

/// Ensure that configuration and data directories exist
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let config_dir = get_config_dir(config);
    let data_dir = get_data_dir(config);

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;
    }

    // Only create data_dir if it's different from config_dir
    if data_dir != config_dir && !data_dir.exists() {
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    }

    Ok(())
}

fn has_local_config_files(dir: &Path) -> bool {
    LOCAL_MARKERS.iter().any(|f| dir.join(f).exists())
}

fn resolve_dir(config: &PathConfig, platform_root: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }

    if let Ok(current_dir) = std::env::current_dir() {
        if has_local_config_files(&current_dir) {
            return current_dir;
        }
    }

    if let Some(dir) = platform_root {
        return dir.join(APP_DIR);
    }

    PathBuf::from(".")
}

fn get_config_dir(config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::config_dir())
}

fn get_data_dir(config: &PathConfig) -> PathBuf {
    resolve_dir(config, dirs_next::data_dir())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_with_custom_dir() {
        let config = PathConfig { config_dir: Some(PathBuf::from("/custom")) };
        assert_eq!(config_file("test.json", &config), PathBuf::from("/custom/test.json"));
        assert_eq!(data_file("curvedit.log", &config), PathBuf::from("/custom/curvedit.log"));
    }

    #[test]
    fn test_explicit_dir_beats_env() {
        let config = PathConfig::from_env_or(Some(PathBuf::from("/explicit")));
        assert_eq!(config.config_dir, Some(PathBuf::from("/explicit")));
    }

    #[test]
    fn test_ensure_dirs_creates_custom_dir() {
        let dir = std::env::temp_dir().join(format!("curvedit_paths_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let config = PathConfig { config_dir: Some(dir.clone()) };
        ensure_dirs(&config).unwrap();
        assert!(dir.is_dir());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
