//! Startup wiring: logging, config, the process-wide store and its siblings.
//!
//! The host creates one [`AppState`] on its UI thread and hands `Rc` clones of
//! the store to panels, the timeline and the renderer. Background work goes
//! through `dispatcher.sender()`; the host calls [`AppState::pump`] once per
//! event-loop tick.

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use log::info;

use crate::config::{load_store_config, StoreConfig};
use crate::core::{store, Dispatcher, Store};
use crate::paths::{config_file, data_file, ensure_dirs, PathConfig};
use crate::prefs::{UiPreferenceLayer, PREFS_FILE};

/// Initialize console logging (respects RUST_LOG, defaults to info).
pub fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}

/// Initialize logging to `curvedit.log` in the data dir at the given level.
pub fn init_file_logger(paths: &PathConfig, level: log::LevelFilter) -> Result<PathBuf> {
    let log_path = data_file("curvedit.log", paths);
    let file = std::fs::File::create(&log_path)
        .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_millis()
        .target(env_logger::Target::Pipe(Box::new(file)))
        .try_init()
        .context("Logger already initialized")?;

    info!("Logging to file: {} (level: {:?})", log_path.display(), level);
    Ok(log_path)
}

#[derive(Debug)]
pub struct AppState {
    pub store: Rc<Store>,
    pub prefs: UiPreferenceLayer,
    pub dispatcher: Dispatcher,
    paths: PathConfig,
}

impl AppState {
    /// Process startup: load config, create the process-wide store and load preferences.
    pub fn init(paths: PathConfig) -> Result<Self> {
        ensure_dirs(&paths)?;
        let config = load_store_config(&paths)?;
        let store = store::init(config).context("Failed to initialize store")?;
        Self::assemble(paths, store)
    }

    /// Same wiring around a private store (tools, tests); no process-wide state.
    pub fn standalone(paths: PathConfig, config: StoreConfig) -> Result<Self> {
        ensure_dirs(&paths)?;
        Self::assemble(paths, Rc::new(Store::new(config)))
    }

    fn assemble(paths: PathConfig, store: Rc<Store>) -> Result<Self> {
        info!("Config path: {}", config_file(PREFS_FILE, &paths).display());
        let prefs = UiPreferenceLayer::load_or_default(&config_file(PREFS_FILE, &paths))?;
        Ok(Self { store, prefs, dispatcher: Dispatcher::new(), paths })
    }

    /// Apply results delivered by background workers.
    pub fn pump(&self) -> crate::core::Result<usize> {
        self.dispatcher.pump(&self.store)
    }

    /// Persist preferences. Store data is in-memory only.
    pub fn save_preferences(&self) -> Result<()> {
        self.prefs.save(&config_file(PREFS_FILE, &self.paths))
    }
}
