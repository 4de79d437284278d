//! View, tool and window preferences.
//!
//! A sibling of the store, not part of it: nothing curve-shaped lives here
//! (originals belong to the store). The layer is thread-confined like the
//! store, has its own bus and batches, and persists to JSON.
//!
//! # Cross-layer transactions
//!
//! [`UiPreferenceLayer::transaction`] opens a preference batch, then a store
//! batch inside it. The store batch closes first, so store events always reach
//! subscribers before the preference event. On failure both layers roll back
//! and neither delivers anything.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result as AnyResult};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::prefs_events::{PendingPreferences, PreferencesChangedEvent};
use crate::core::batch::{BatchCoordinator, BatchEnd};
use crate::core::error::{Result, StoreError, ValidationError};
use crate::core::event_bus::{ChangeBus, SubscriptionId};
use crate::core::store::Store;
use crate::core::thread_guard::ThreadGuard;

pub const PREFS_FILE: &str = "curvedit_prefs.json";

/// Active editing tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Tool {
    #[default]
    Select,
    Move,
    AddPoint,
    Smooth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreferenceKey {
    ShowBackground,
    ShowGrid,
    ShowAllCurves,
    ShowFrameNumbers,
    PointRadius,
    Zoom,
    Pan,
    CurrentTool,
    WindowSize,
    DarkMode,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiPreferences {
    // View
    pub show_background: bool,
    pub show_grid: bool,
    pub show_all_curves: bool, // false = only the active curve is drawn
    pub show_frame_numbers: bool,
    pub point_radius: f32,
    pub zoom: f32,
    pub pan: [f32; 2],

    // Tool
    pub current_tool: Tool,

    // Window
    pub window_size: [u32; 2],
    pub dark_mode: bool,
}

impl Default for UiPreferences {
    fn default() -> Self {
        Self {
            show_background: true,
            show_grid: false,
            show_all_curves: true,
            show_frame_numbers: false,
            point_radius: 5.0,
            zoom: 1.0,
            pan: [0.0, 0.0],
            current_tool: Tool::Select,
            window_size: [1280, 800],
            dark_mode: true,
        }
    }
}

impl UiPreferences {
    pub fn load(path: &Path) -> AnyResult<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read preferences: {}", path.display()))?;
        let prefs: UiPreferences = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse preferences: {}", path.display()))?;
        if let Err(e) = prefs.validate() {
            warn!("Preferences in {} rejected ({}), using defaults", path.display(), e);
            return Ok(Self::default());
        }
        Ok(prefs)
    }

    pub fn save(&self, path: &Path) -> AnyResult<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize preferences")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write preferences: {}", path.display()))
    }

    fn validate(&self) -> std::result::Result<(), ValidationError> {
        let invalid = |key, reason| Err(ValidationError::InvalidPreference { key, reason });
        if !(self.zoom.is_finite() && self.zoom > 0.0) {
            return invalid("zoom", "must be finite and positive");
        }
        if !(self.point_radius.is_finite() && self.point_radius > 0.0) {
            return invalid("point_radius", "must be finite and positive");
        }
        if !self.pan.iter().all(|v| v.is_finite()) {
            return invalid("pan", "must be finite");
        }
        if self.window_size.contains(&0) {
            return invalid("window_size", "must be non-zero");
        }
        Ok(())
    }

    /// Keys whose values differ between `self` and `other`.
    pub fn changed_keys(&self, other: &Self) -> BTreeSet<PreferenceKey> {
        let mut keys = BTreeSet::new();
        let mut check = |differs: bool, key| {
            if differs {
                keys.insert(key);
            }
        };
        check(self.show_background != other.show_background, PreferenceKey::ShowBackground);
        check(self.show_grid != other.show_grid, PreferenceKey::ShowGrid);
        check(self.show_all_curves != other.show_all_curves, PreferenceKey::ShowAllCurves);
        check(self.show_frame_numbers != other.show_frame_numbers, PreferenceKey::ShowFrameNumbers);
        check(self.point_radius != other.point_radius, PreferenceKey::PointRadius);
        check(self.zoom != other.zoom, PreferenceKey::Zoom);
        check(self.pan != other.pan, PreferenceKey::Pan);
        check(self.current_tool != other.current_tool, PreferenceKey::CurrentTool);
        check(self.window_size != other.window_size, PreferenceKey::WindowSize);
        check(self.dark_mode != other.dark_mode, PreferenceKey::DarkMode);
        keys
    }
}

/// Thread-confined preference store with its own change bus.
#[derive(Debug)]
pub struct UiPreferenceLayer {
    guard: ThreadGuard,
    prefs: RefCell<UiPreferences>,
    batch: RefCell<BatchCoordinator<UiPreferences, PendingPreferences>>,
    bus: ChangeBus,
}

impl UiPreferenceLayer {
    pub fn new(prefs: UiPreferences) -> Self {
        Self {
            guard: ThreadGuard::current(),
            prefs: RefCell::new(prefs),
            batch: RefCell::new(BatchCoordinator::new()),
            bus: ChangeBus::new(),
        }
    }

    /// Load from `path`, or defaults if the file does not exist.
    pub fn load_or_default(path: &Path) -> AnyResult<Self> {
        let prefs = if path.exists() {
            info!("Loading preferences from {}", path.display());
            UiPreferences::load(path)?
        } else {
            UiPreferences::default()
        };
        Ok(Self::new(prefs))
    }

    pub fn save(&self, path: &Path) -> AnyResult<()> {
        self.guard.check()?;
        self.prefs.borrow().save(path)?;
        debug!("Preferences saved to {}", path.display());
        Ok(())
    }

    /// Copy of the current preferences.
    pub fn get(&self) -> Result<UiPreferences> {
        self.guard.check()?;
        Ok(self.prefs.borrow().clone())
    }

    pub fn subscribe<F>(&self, callback: F) -> Result<SubscriptionId>
    where
        F: Fn(&PreferencesChangedEvent) + 'static,
    {
        self.guard.check()?;
        Ok(self.bus.subscribe::<PreferencesChangedEvent, F>(callback))
    }

    /// Edit preferences in place; the result is validated before it is kept.
    pub fn update(&self, edit: impl FnOnce(&mut UiPreferences)) -> Result<()> {
        self.guard.check()?;
        let keys = {
            let mut current = self.prefs.borrow_mut();
            let mut next = current.clone();
            edit(&mut next);
            next.validate()?;
            let keys = current.changed_keys(&next);
            *current = next;
            keys
        };
        if keys.is_empty() {
            return Ok(());
        }

        {
            let mut batch = self.batch.borrow_mut();
            if batch.is_batching() {
                keys.into_iter().for_each(|k| batch.record(k));
                return Ok(());
            }
        }
        self.bus.emit(PreferencesChangedEvent { keys });
        Ok(())
    }

    pub fn set_tool(&self, tool: Tool) -> Result<()> {
        self.update(|p| p.current_tool = tool)
    }

    pub fn set_zoom(&self, zoom: f32) -> Result<()> {
        self.update(|p| p.zoom = zoom)
    }

    pub fn set_pan(&self, pan: [f32; 2]) -> Result<()> {
        self.update(|p| p.pan = pan)
    }

    /// Run `f` in a preference batch; one coalesced event on success, rollback on error or panic.
    pub fn batch<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        self.guard.check()?;
        self.batch.borrow_mut().begin(|| self.prefs.borrow().clone());
        let scope = PrefsBatchScope { layer: self, open: true };
        let result = f(self);
        scope.close(result)
    }

    fn end_batch(&self) -> Result<()> {
        let outcome = self.batch.borrow_mut().end()?;
        match outcome {
            BatchEnd::Nested => Ok(()),
            BatchEnd::Commit { pending, .. } => {
                if let Some(event) = pending.into_event() {
                    self.bus.emit(event);
                }
                Ok(())
            }
            BatchEnd::Poisoned { snapshot } => {
                warn!("Preference batch closed after nested failure, rolling back");
                *self.prefs.borrow_mut() = snapshot;
                Err(StoreError::BatchRollback { source: Box::new(StoreError::NestedBatchFailed) })
            }
        }
    }

    fn abort_batch(&self, cause: StoreError) -> StoreError {
        let restore = self.batch.borrow_mut().abort();
        if let Some(snapshot) = restore {
            warn!("Preference batch rolled back: {}", cause);
            *self.prefs.borrow_mut() = snapshot;
        }
        if cause.is_rollback() {
            cause
        } else {
            StoreError::BatchRollback { source: Box::new(cause) }
        }
    }

    fn is_poisoned(&self) -> bool {
        self.batch.borrow().is_poisoned()
    }

    /// Atomic update across the store and this layer.
    ///
    /// Store events flush when the inner store batch closes, before this
    /// layer's event. Any error rolls back both, including a failed nested
    /// preference batch whose error `f` swallowed.
    pub fn transaction<T>(&self, store: &Store, f: impl FnOnce(&Store, &Self) -> Result<T>) -> Result<T> {
        self.batch(|prefs| {
            store.batch(|s| {
                let value = f(s, prefs)?;
                if prefs.is_poisoned() {
                    return Err(StoreError::NestedBatchFailed);
                }
                Ok(value)
            })
        })
    }
}

/// Rolls the preference batch back if the closure panics.
struct PrefsBatchScope<'l> {
    layer: &'l UiPreferenceLayer,
    open: bool,
}

impl PrefsBatchScope<'_> {
    fn close<T>(mut self, result: Result<T>) -> Result<T> {
        self.open = false;
        match result {
            Ok(value) => self.layer.end_batch().map(|_| value),
            Err(e) => Err(self.layer.abort_batch(e)),
        }
    }
}

impl Drop for PrefsBatchScope<'_> {
    fn drop(&mut self) {
        if self.open {
            warn!("Preference batch closure panicked, rolling back");
            let _ = self.layer.abort_batch(StoreError::NotBatching);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::core::store_events::CurvesChangedEvent;
    use crate::entities::Point;
    use std::rc::Rc;

    fn layer() -> UiPreferenceLayer {
        let _ = env_logger::builder().is_test(true).try_init();
        UiPreferenceLayer::new(UiPreferences::default())
    }

    #[test]
    fn test_update_emits_changed_keys() {
        let prefs = layer();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        prefs.subscribe(move |e| s.borrow_mut().push(e.keys.clone())).unwrap();

        prefs.update(|p| {
            p.show_grid = true;
            p.zoom = 2.0;
        })
        .unwrap();
        prefs.set_zoom(2.0).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![BTreeSet::from([PreferenceKey::ShowGrid, PreferenceKey::Zoom])]
        );
    }

    #[test]
    fn test_invalid_update_rejected() {
        let prefs = layer();
        assert!(matches!(
            prefs.set_zoom(0.0),
            Err(StoreError::Validation(ValidationError::InvalidPreference { key: "zoom", .. }))
        ));
        assert!(prefs.set_pan([f32::NAN, 0.0]).is_err());
        assert_eq!(prefs.get().unwrap(), UiPreferences::default());
    }

    #[test]
    fn test_batch_coalesces() {
        let prefs = layer();
        let count = Rc::new(RefCell::new(0));
        let c = Rc::clone(&count);
        prefs.subscribe(move |e| {
            assert!(e.contains(PreferenceKey::CurrentTool));
            assert!(e.contains(PreferenceKey::Pan));
            *c.borrow_mut() += 1;
        })
        .unwrap();

        prefs
            .batch(|p| {
                p.set_tool(Tool::Move)?;
                p.set_pan([10.0, 5.0])?;
                p.set_tool(Tool::Smooth)
            })
            .unwrap();
        assert_eq!(*count.borrow(), 1);
        assert_eq!(prefs.get().unwrap().current_tool, Tool::Smooth);
    }

    #[test]
    fn test_transaction_store_events_first() {
        let _ = env_logger::builder().is_test(true).try_init();
        let store = Store::new(StoreConfig::default());
        let prefs = layer();
        let order = Rc::new(RefCell::new(Vec::new()));

        let o = Rc::clone(&order);
        store.subscribe::<CurvesChangedEvent, _>(move |_| o.borrow_mut().push("store")).unwrap();
        let o = Rc::clone(&order);
        prefs.subscribe(move |_| o.borrow_mut().push("prefs")).unwrap();

        prefs
            .transaction(&store, |s, p| {
                p.set_tool(Tool::AddPoint)?;
                s.set_curve_data("A", vec![Point::new(1, 1.0, 1.0)], None)?;
                p.update(|u| u.show_all_curves = false)
            })
            .unwrap();

        assert_eq!(*order.borrow(), vec!["store", "prefs"]);
    }

    #[test]
    fn test_transaction_failure_rolls_back_both() {
        let _ = env_logger::builder().is_test(true).try_init();
        let store = Store::new(StoreConfig::default());
        let prefs = layer();
        let events = Rc::new(RefCell::new(0));

        let e = Rc::clone(&events);
        store.subscribe::<CurvesChangedEvent, _>(move |_| *e.borrow_mut() += 1).unwrap();
        let e = Rc::clone(&events);
        prefs.subscribe(move |_| *e.borrow_mut() += 1).unwrap();

        let result = prefs.transaction(&store, |s, p| {
            p.set_tool(Tool::Move)?;
            s.set_curve_data("A", vec![Point::new(1, 1.0, 1.0)], None)?;
            s.set_curve_data("A", vec![Point::new(1, f64::NAN, 1.0)], None)
        });

        let err = result.unwrap_err();
        assert!(matches!(err.root_cause(), StoreError::Validation(ValidationError::NonFinite { .. })));
        assert_eq!(prefs.get().unwrap().current_tool, Tool::Select);
        assert_eq!(store.curve_count().unwrap(), 0);
        assert_eq!(*events.borrow(), 0);
    }

    #[test]
    fn test_batch_panic_rolls_back() {
        let prefs = layer();
        let count = Rc::new(RefCell::new(0));
        let c = Rc::clone(&count);
        prefs.subscribe(move |_| *c.borrow_mut() += 1).unwrap();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = prefs.batch(|p| -> Result<()> {
                p.set_tool(Tool::Move)?;
                panic!("collaborator bug");
            });
        }));
        assert!(outcome.is_err());
        assert_eq!(prefs.get().unwrap().current_tool, Tool::Select);

        // Updates after the panic are delivered again
        prefs.set_zoom(3.0).unwrap();
        assert_eq!(*count.borrow(), 1);
        assert_eq!(prefs.get().unwrap().zoom, 3.0);
    }

    #[test]
    fn test_transaction_swallowed_nested_failure_rolls_back_both() {
        let _ = env_logger::builder().is_test(true).try_init();
        let store = Store::new(StoreConfig::default());
        let prefs = layer();
        let events = Rc::new(RefCell::new(0));

        let e = Rc::clone(&events);
        store.subscribe::<CurvesChangedEvent, _>(move |_| *e.borrow_mut() += 1).unwrap();
        let e = Rc::clone(&events);
        prefs.subscribe(move |_| *e.borrow_mut() += 1).unwrap();

        let result = prefs.transaction(&store, |s, p| {
            s.set_curve_data("A", vec![Point::new(1, 1.0, 1.0)], None)?;
            let _ = p.batch(|p| {
                p.set_tool(Tool::Move)?;
                p.set_zoom(-1.0)
            });
            Ok(())
        });

        let err = result.unwrap_err();
        assert!(matches!(err.root_cause(), StoreError::NestedBatchFailed));
        assert_eq!(store.curve_count().unwrap(), 0);
        assert_eq!(prefs.get().unwrap().current_tool, Tool::Select);
        assert_eq!(*events.borrow(), 0);
        assert!(!store.is_batching().unwrap());
    }

    #[test]
    fn test_save_load() {
        let dir = std::env::temp_dir().join(format!("curvedit_prefs_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(PREFS_FILE);

        let prefs = layer();
        prefs.update(|p| {
            p.dark_mode = false;
            p.window_size = [1920, 1080];
        })
        .unwrap();
        prefs.save(&path).unwrap();

        let loaded = UiPreferenceLayer::load_or_default(&path).unwrap();
        assert_eq!(loaded.get().unwrap(), prefs.get().unwrap());

        // Out-of-range values on disk fall back to defaults
        std::fs::write(&path, r#"{ "zoom": -1.0 }"#).unwrap();
        assert_eq!(UiPreferences::load(&path).unwrap(), UiPreferences::default());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
