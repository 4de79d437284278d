//! Central application state: curves, selections, active curve, frame, images.
//!
//! **Ownership**: the store owns every curve-shaped piece of data, including the
//! "original" snapshots used by smoothing/undo collaborators. Getters return
//! copies; nothing hands out a live reference to a curve.
//!
//! **Threading**: thread-confined. Data lives in `RefCell`s with no lock; each
//! public entry point first runs [`ThreadGuard::check`]. The only other
//! mutable state, the batch flag plus pending-event accumulator, is likewise
//! confined to the owner thread.
//!
//! **Events**: every mutator collects the events it implies, releases its data
//! borrow, then either delivers them (no batch) or merges them into the batch.
//! Subscribers may therefore call back into the store from their callbacks.
//!
//! # Single-curve operations
//!
//! Operations that act on "the" curve take `Option<&str>`: `None` means the
//! active curve. With no active curve they fail with `NoActiveCurve`. There is
//! no implicit default curve.
//!
//! # Batches
//!
//! ```ignore
//! store.batch(|s| {
//!     s.set_curve_data("A", points_a, None)?;
//!     s.set_curve_data("B", points_b, None)?;
//!     s.set_active_curve(Some("A"))
//! })?; // one curves_changed {A, B}, then active_curve_changed
//! ```

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;
use std::thread::{self, ThreadId};

use indexmap::IndexMap;
use log::{debug, info, trace, warn};
use once_cell::sync::OnceCell;

use super::batch::{BatchCoordinator, BatchEnd, Baseline, Pending, PendingChanges};
use super::error::{Result, StoreError, ValidationError};
use super::event_bus::{ChangeBus, Event, SubscriptionId};
use super::legacy::LegacyFacade;
use super::store_events::StoreEvent;
use super::thread_guard::ThreadGuard;
use crate::config::StoreConfig;
use crate::entities::{normalize_points, CurveMetadata, ImageSequence, Point, PointStatus};

/// Thread that called [`init`]; set at most once per process.
static PROCESS_OWNER: OnceCell<ThreadId> = OnceCell::new();

/// Create the process-wide store. The calling thread becomes its owner.
///
/// Call once at startup and pass the returned handle to collaborators.
pub fn init(config: StoreConfig) -> Result<Rc<Store>> {
    let me = thread::current().id();
    if PROCESS_OWNER.set(me).is_err() {
        warn!("Store init called twice (owner {:?})", PROCESS_OWNER.get());
        return Err(StoreError::AlreadyInitialized);
    }
    info!("Store initialized on {:?} (max {} points/curve)", me, config.max_points_per_curve);
    Ok(Rc::new(Store::new(config)))
}

/// Owner thread of the process-wide store, if [`init`] has run.
pub fn process_owner() -> Option<ThreadId> {
    PROCESS_OWNER.get().copied()
}

/// Canonical data. Curve sequences are shared copy-on-write, so a snapshot
/// costs one refcount per curve rather than a copy of every point.
#[derive(Clone, Debug, Default)]
struct StoreData {
    curves: IndexMap<String, Rc<Vec<Point>>>,
    metadata: HashMap<String, CurveMetadata>,
    selections: HashMap<String, BTreeSet<usize>>,
    active_curve: Option<String>,
    current_frame: i32,
    images: ImageSequence,
    total_frames_override: Option<i32>,
    originals: HashMap<String, Rc<Vec<Point>>>,
}

impl StoreData {
    fn total_frames(&self) -> i32 {
        self.total_frames_override
            .unwrap_or_else(|| self.images.derived_total_frames())
            .max(1)
    }

    fn curve_len(&self, curve: &str) -> usize {
        self.curves.get(curve).map_or(0, |pts| pts.len())
    }

    /// Drop selected indices at or past `len`; reports whether anything went.
    fn clamp_selection(&mut self, curve: &str, len: usize) -> bool {
        match self.selections.get_mut(curve) {
            Some(sel) => {
                let before = sel.len();
                sel.retain(|&i| i < len);
                sel.len() != before
            }
            None => false,
        }
    }

    /// Re-clamp the frame after total frames moved; returns the event if it changed.
    fn clamp_frame(&mut self) -> Option<StoreEvent> {
        let clamped = self.current_frame.clamp(1, self.total_frames());
        if clamped != self.current_frame {
            self.current_frame = clamped;
            Some(StoreEvent::frame(clamped))
        } else {
            None
        }
    }

    fn baseline(&self) -> Baseline {
        Baseline {
            active_curve: self.active_curve.clone(),
            frame: self.current_frame,
            total_frames: self.total_frames(),
        }
    }
}

/// Full copy of store data taken when the outermost batch opens.
#[derive(Clone, Debug)]
pub struct BatchSnapshot(StoreData);

#[derive(Debug)]
pub struct Store {
    guard: ThreadGuard,
    config: StoreConfig,
    data: RefCell<StoreData>,
    batch: RefCell<BatchCoordinator<BatchSnapshot, PendingChanges>>,
    bus: ChangeBus,
}

impl Store {
    /// Standalone store owned by the calling thread.
    pub fn new(config: StoreConfig) -> Self {
        Self::with_guard(config, ThreadGuard::current())
    }

    /// Store owned by an explicit thread.
    pub fn with_guard(config: StoreConfig, guard: ThreadGuard) -> Self {
        let data = StoreData {
            current_frame: 1,
            total_frames_override: (config.default_total_frames > 1).then_some(config.default_total_frames),
            ..StoreData::default()
        };
        Self {
            guard,
            config,
            data: RefCell::new(data),
            batch: RefCell::new(BatchCoordinator::new()),
            bus: ChangeBus::new(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn guard(&self) -> &ThreadGuard {
        &self.guard
    }

    /// Single-curve convenience API over this store.
    pub fn legacy(&self) -> LegacyFacade<'_> {
        LegacyFacade::new(self)
    }

    // ========== Subscriptions ==========

    /// Subscribe to one event type (e.g. `CurvesChangedEvent`).
    pub fn subscribe<E, F>(&self, callback: F) -> Result<SubscriptionId>
    where
        E: Event,
        F: Fn(&E) + 'static,
    {
        self.guard.check()?;
        Ok(self.bus.subscribe::<E, F>(callback))
    }

    /// Subscribe to every store event.
    pub fn subscribe_any<F>(&self, callback: F) -> Result<SubscriptionId>
    where
        F: Fn(&dyn Event) + 'static,
    {
        self.guard.check()?;
        Ok(self.bus.subscribe_any(callback))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<bool> {
        self.guard.check()?;
        Ok(self.bus.unsubscribe(id))
    }

    pub fn unsubscribe_all<E: Event>(&self) -> Result<()> {
        self.guard.check()?;
        self.bus.unsubscribe_all::<E>();
        Ok(())
    }

    pub fn has_subscribers<E: Event>(&self) -> Result<bool> {
        self.guard.check()?;
        Ok(self.bus.has_subscribers::<E>())
    }

    /// Deliver now, or merge into the open batch.
    fn publish(&self, events: Vec<StoreEvent>) {
        if events.is_empty() {
            return;
        }
        {
            let mut batch = self.batch.borrow_mut();
            if batch.is_batching() {
                for event in events {
                    trace!("Deferred {}", event.name());
                    batch.record(event);
                }
                return;
            }
        }
        for event in events {
            event.deliver(&self.bus);
        }
    }

    // ========== Validation ==========

    fn validate_name(curve: &str) -> Result<()> {
        if curve.is_empty() {
            return Err(ValidationError::EmptyCurveName.into());
        }
        Ok(())
    }

    fn validate_points(&self, curve: &str, points: &[Point]) -> Result<()> {
        if points.len() > self.config.max_points_per_curve {
            warn!("Rejected {} points for '{}'", points.len(), curve);
            return Err(ValidationError::TooManyPoints {
                curve: curve.to_string(),
                count: points.len(),
                max: self.config.max_points_per_curve,
            }
            .into());
        }
        if let Some(bad) = points.iter().find(|p| !p.is_finite()) {
            warn!("Rejected non-finite point in '{}' at frame {}", curve, bad.frame);
            return Err(ValidationError::NonFinite {
                curve: curve.to_string(),
                frame: bad.frame,
                x: bad.x,
                y: bad.y,
            }
            .into());
        }
        Ok(())
    }

    fn validate_new_curve(&self, data: &StoreData, curve: &str) -> Result<()> {
        if !data.curves.contains_key(curve) && data.curves.len() >= self.config.max_curves {
            return Err(ValidationError::TooManyCurves { max: self.config.max_curves }.into());
        }
        Ok(())
    }

    /// Resolve an explicit-or-active curve name; never invents one.
    fn resolve_curve(&self, curve: Option<&str>, operation: &'static str) -> Result<String> {
        match curve {
            Some(name) => {
                Self::validate_name(name)?;
                Ok(name.to_string())
            }
            None => self
                .data
                .borrow()
                .active_curve
                .clone()
                .ok_or(StoreError::NoActiveCurve { operation }),
        }
    }

    fn existing_curve(data: &StoreData, curve: &str) -> Result<()> {
        if data.curves.contains_key(curve) {
            Ok(())
        } else {
            Err(ValidationError::UnknownCurve(curve.to_string()).into())
        }
    }

    // ========== Curves ==========

    /// Replace a curve's points wholesale, creating the curve if needed.
    ///
    /// Points are sorted by frame; for duplicate frames the later entry wins.
    /// `metadata` overwrites only when given; new curves start `{visible: true}`.
    /// Existing selection indices past the new length are dropped.
    pub fn set_curve_data(&self, curve: &str, points: Vec<Point>, metadata: Option<CurveMetadata>) -> Result<()> {
        self.guard.check()?;
        Self::validate_name(curve)?;
        self.validate_points(curve, &points)?;
        let points = normalize_points(points);

        let events = {
            let mut cell = self.data.borrow_mut();
            let data = &mut *cell;
            self.validate_new_curve(data, curve)?;

            let mut events = Vec::new();
            let points_changed = data.curves.get(curve).is_none_or(|old| **old != points);
            let meta_changed = match metadata {
                Some(meta) => data.metadata.insert(curve.to_string(), meta.clone()).as_ref() != Some(&meta),
                None => {
                    let fresh = !data.metadata.contains_key(curve);
                    data.metadata.entry(curve.to_string()).or_default();
                    fresh
                }
            };

            let len = points.len();
            if points_changed {
                data.curves.insert(curve.to_string(), Rc::new(points));
            }
            if points_changed || meta_changed {
                debug!("set_curve_data '{}': {} points", curve, len);
                events.push(StoreEvent::curves([curve]));
            }
            if data.clamp_selection(curve, len) {
                events.push(StoreEvent::selection(Some(curve)));
            }
            events
        };
        self.publish(events);
        Ok(())
    }

    /// Copy of a curve's points; empty for unknown curves.
    pub fn get_curve_data(&self, curve: &str) -> Result<Vec<Point>> {
        self.guard.check()?;
        Ok(self
            .data
            .borrow()
            .curves
            .get(curve)
            .map(|pts| pts.as_ref().clone())
            .unwrap_or_default())
    }

    /// Curve names in creation order.
    pub fn curve_names(&self) -> Result<Vec<String>> {
        self.guard.check()?;
        Ok(self.data.borrow().curves.keys().cloned().collect())
    }

    pub fn has_curve(&self, curve: &str) -> Result<bool> {
        self.guard.check()?;
        Ok(self.data.borrow().curves.contains_key(curve))
    }

    pub fn curve_count(&self) -> Result<usize> {
        self.guard.check()?;
        Ok(self.data.borrow().curves.len())
    }

    pub fn point_count(&self, curve: &str) -> Result<usize> {
        self.guard.check()?;
        Ok(self.data.borrow().curve_len(curve))
    }

    /// Remove a curve with its metadata, selection and original.
    ///
    /// Clears the active curve if it pointed here. Returns false for unknown curves.
    pub fn delete_curve(&self, curve: &str) -> Result<bool> {
        self.guard.check()?;
        let events = {
            let mut data = self.data.borrow_mut();
            if data.curves.shift_remove(curve).is_none() {
                return Ok(false);
            }
            data.metadata.remove(curve);
            data.originals.remove(curve);

            let mut events = vec![StoreEvent::curves([curve])];
            if data.selections.remove(curve).is_some_and(|sel| !sel.is_empty()) {
                events.push(StoreEvent::selection(Some(curve)));
            }
            if data.active_curve.as_deref() == Some(curve) {
                let old = data.active_curve.take();
                events.push(StoreEvent::active_curve(old, None));
            }
            debug!("delete_curve '{}'", curve);
            events
        };
        self.publish(events);
        Ok(true)
    }

    // ========== Metadata ==========

    pub fn curve_metadata(&self, curve: &str) -> Result<Option<CurveMetadata>> {
        self.guard.check()?;
        Ok(self.data.borrow().metadata.get(curve).cloned())
    }

    pub fn set_curve_metadata(&self, curve: &str, metadata: CurveMetadata) -> Result<()> {
        self.guard.check()?;
        let changed = {
            let mut data = self.data.borrow_mut();
            Self::existing_curve(&data, curve)?;
            data.metadata.insert(curve.to_string(), metadata.clone()).as_ref() != Some(&metadata)
        };
        if changed {
            self.publish(vec![StoreEvent::curves([curve])]);
        }
        Ok(())
    }

    pub fn set_curve_visible(&self, curve: &str, visible: bool) -> Result<()> {
        let mut meta = self
            .curve_metadata(curve)?
            .ok_or_else(|| ValidationError::UnknownCurve(curve.to_string()))?;
        meta.visible = visible;
        self.set_curve_metadata(curve, meta)
    }

    // ========== Point edits ==========

    /// Move one point. `curve = None` targets the active curve.
    pub fn update_point(&self, curve: Option<&str>, index: usize, x: f64, y: f64) -> Result<()> {
        self.guard.check()?;
        let name = self.resolve_curve(curve, "update_point")?;
        self.edit_point(&name, index, |p| {
            p.x = x;
            p.y = y;
        })
    }

    pub fn set_point_status(&self, curve: Option<&str>, index: usize, status: PointStatus) -> Result<()> {
        self.guard.check()?;
        let name = self.resolve_curve(curve, "set_point_status")?;
        trace!("Point {} of '{}' -> {}", index, name, status.as_str());
        self.edit_point(&name, index, |p| p.status = status)
    }

    fn edit_point(&self, curve: &str, index: usize, edit: impl FnOnce(&mut Point)) -> Result<()> {
        let changed = {
            let mut data = self.data.borrow_mut();
            let points = data
                .curves
                .get_mut(curve)
                .ok_or_else(|| ValidationError::UnknownCurve(curve.to_string()))?;
            let len = points.len();
            let mut edited = *points
                .get(index)
                .ok_or_else(|| ValidationError::IndexOutOfRange { curve: curve.to_string(), index, len })?;
            edit(&mut edited);
            if !edited.is_finite() {
                return Err(ValidationError::NonFinite {
                    curve: curve.to_string(),
                    frame: edited.frame,
                    x: edited.x,
                    y: edited.y,
                }
                .into());
            }
            if points[index] == edited {
                false
            } else {
                Rc::make_mut(points)[index] = edited;
                true
            }
        };
        if changed {
            trace!("Edited point {} of '{}'", index, curve);
            self.publish(vec![StoreEvent::curves([curve])]);
        }
        Ok(())
    }

    /// Insert a point in frame order, replacing any point on the same frame.
    ///
    /// Creates the curve if it does not exist yet. Returns the point's index.
    pub fn add_point(&self, curve: Option<&str>, point: Point) -> Result<usize> {
        self.guard.check()?;
        let name = self.resolve_curve(curve, "add_point")?;
        self.validate_points(&name, std::slice::from_ref(&point))?;

        let (index, events) = {
            let mut cell = self.data.borrow_mut();
            let data = &mut *cell;
            self.validate_new_curve(data, &name)?;

            let len = data.curve_len(&name);
            let existing = data.curves.get(&name).map(|pts| pts.binary_search_by_key(&point.frame, |p| p.frame));
            if matches!(existing, Some(Err(_)) | None) && len >= self.config.max_points_per_curve {
                return Err(ValidationError::TooManyPoints {
                    curve: name.clone(),
                    count: len + 1,
                    max: self.config.max_points_per_curve,
                }
                .into());
            }

            let mut events = Vec::new();
            let fresh = !data.metadata.contains_key(&name);
            data.metadata.entry(name.clone()).or_default();
            let points = Rc::make_mut(data.curves.entry(name.clone()).or_default());
            let index = match points.binary_search_by_key(&point.frame, |p| p.frame) {
                Ok(i) => {
                    if points[i] != point || fresh {
                        points[i] = point;
                        events.push(StoreEvent::curves([name.as_str()]));
                    }
                    i
                }
                Err(i) => {
                    points.insert(i, point);
                    events.push(StoreEvent::curves([name.as_str()]));
                    if let Some(sel) = data.selections.get_mut(&name) {
                        let shifted: BTreeSet<usize> = sel.iter().map(|&s| if s >= i { s + 1 } else { s }).collect();
                        if shifted != *sel {
                            *sel = shifted;
                            events.push(StoreEvent::selection(Some(name.as_str())));
                        }
                    }
                    i
                }
            };
            (index, events)
        };
        self.publish(events);
        Ok(index)
    }

    /// Remove one point; selection indices above it shift down.
    pub fn remove_point(&self, curve: Option<&str>, index: usize) -> Result<Point> {
        self.guard.check()?;
        let name = self.resolve_curve(curve, "remove_point")?;

        let (removed, events) = {
            let mut cell = self.data.borrow_mut();
            let data = &mut *cell;
            let points = data
                .curves
                .get_mut(&name)
                .ok_or_else(|| ValidationError::UnknownCurve(name.clone()))?;
            let len = points.len();
            if index >= len {
                return Err(ValidationError::IndexOutOfRange { curve: name.clone(), index, len }.into());
            }
            let removed = Rc::make_mut(points).remove(index);

            let mut events = vec![StoreEvent::curves([name.as_str()])];
            if let Some(sel) = data.selections.get_mut(&name) {
                let shifted: BTreeSet<usize> = sel
                    .iter()
                    .filter(|&&s| s != index)
                    .map(|&s| if s > index { s - 1 } else { s })
                    .collect();
                if shifted != *sel {
                    *sel = shifted;
                    events.push(StoreEvent::selection(Some(name.as_str())));
                }
            }
            (removed, events)
        };
        self.publish(events);
        Ok(removed)
    }

    // ========== Active curve ==========

    /// Set or clear the active curve. The curve need not exist yet.
    pub fn set_active_curve(&self, curve: Option<&str>) -> Result<()> {
        self.guard.check()?;
        if let Some(name) = curve {
            Self::validate_name(name)?;
        }
        let event = {
            let mut data = self.data.borrow_mut();
            if data.active_curve.as_deref() == curve {
                None
            } else {
                let old = std::mem::replace(&mut data.active_curve, curve.map(str::to_owned));
                debug!("Active curve {:?} -> {:?}", old, curve);
                Some(StoreEvent::active_curve(old, data.active_curve.clone()))
            }
        };
        self.publish(event.into_iter().collect());
        Ok(())
    }

    pub fn active_curve(&self) -> Result<Option<String>> {
        self.guard.check()?;
        Ok(self.data.borrow().active_curve.clone())
    }

    // ========== Selection ==========

    /// Replace a curve's selection. Out-of-range indices are silently dropped.
    pub fn set_selection<I>(&self, curve: &str, indices: I) -> Result<()>
    where
        I: IntoIterator<Item = usize>,
    {
        self.guard.check()?;
        Self::validate_name(curve)?;
        let changed = {
            let mut data = self.data.borrow_mut();
            let len = data.curve_len(curve);
            let selection: BTreeSet<usize> = indices.into_iter().filter(|&i| i < len).collect();
            let current = data.selections.get(curve);
            if current.map_or(selection.is_empty(), |sel| *sel == selection) {
                false
            } else {
                data.selections.insert(curve.to_string(), selection);
                true
            }
        };
        if changed {
            self.publish(vec![StoreEvent::selection(Some(curve))]);
        }
        Ok(())
    }

    pub fn get_selection(&self, curve: &str) -> Result<BTreeSet<usize>> {
        self.guard.check()?;
        Ok(self.data.borrow().selections.get(curve).cloned().unwrap_or_default())
    }

    /// Clear one curve's selection, or every curve's with a single event.
    pub fn clear_selection(&self, curve: Option<&str>) -> Result<()> {
        self.guard.check()?;
        let event = {
            let mut data = self.data.borrow_mut();
            match curve {
                Some(name) => data
                    .selections
                    .get_mut(name)
                    .filter(|sel| !sel.is_empty())
                    .map(|sel| {
                        sel.clear();
                        StoreEvent::selection(Some(name))
                    }),
                None => {
                    let any = data.selections.values().any(|sel| !sel.is_empty());
                    data.selections.clear();
                    any.then(|| StoreEvent::selection(None))
                }
            }
        };
        self.publish(event.into_iter().collect());
        Ok(())
    }

    // ========== Frame / image sequence ==========

    /// Move the playhead, clamped to `[1, total_frames]`.
    pub fn set_frame(&self, frame: i32) -> Result<()> {
        self.guard.check()?;
        let event = {
            let mut data = self.data.borrow_mut();
            let clamped = frame.clamp(1, data.total_frames());
            if clamped == data.current_frame {
                None
            } else {
                data.current_frame = clamped;
                Some(StoreEvent::frame(clamped))
            }
        };
        self.publish(event.into_iter().collect());
        Ok(())
    }

    pub fn current_frame(&self) -> Result<i32> {
        self.guard.check()?;
        Ok(self.data.borrow().current_frame)
    }

    pub fn total_frames(&self) -> Result<i32> {
        self.guard.check()?;
        Ok(self.data.borrow().total_frames())
    }

    /// Replace the background image list.
    ///
    /// Emits image_sequence_changed, then total_frames_changed and frame_changed
    /// if the derived total moved or the playhead had to be clamped.
    pub fn set_image_files(&self, files: Vec<String>, directory: Option<String>) -> Result<()> {
        self.guard.check()?;
        let events = {
            let mut data = self.data.borrow_mut();
            let old_total = data.total_frames();
            info!("Image sequence: {} files (dir {:?})", files.len(), directory);
            data.images = ImageSequence::new(files, directory);

            let mut events = vec![StoreEvent::image_sequence()];
            let total = data.total_frames();
            if total != old_total {
                events.push(StoreEvent::total_frames(total));
            }
            events.extend(data.clamp_frame());
            events
        };
        self.publish(events);
        Ok(())
    }

    pub fn image_files(&self) -> Result<Vec<String>> {
        self.guard.check()?;
        Ok(self.data.borrow().images.files.clone())
    }

    pub fn image_directory(&self) -> Result<Option<String>> {
        self.guard.check()?;
        Ok(self.data.borrow().images.directory.clone())
    }

    pub fn image_sequence(&self) -> Result<ImageSequence> {
        self.guard.check()?;
        Ok(self.data.borrow().images.clone())
    }

    /// Override the derived total frame count (`None` = derive from images).
    pub fn set_total_frames_override(&self, total: Option<i32>) -> Result<()> {
        self.guard.check()?;
        let events = {
            let mut data = self.data.borrow_mut();
            let old_total = data.total_frames();
            data.total_frames_override = total.map(|t| t.max(1));

            let mut events = Vec::new();
            let new_total = data.total_frames();
            if new_total != old_total {
                events.push(StoreEvent::total_frames(new_total));
            }
            events.extend(data.clamp_frame());
            events
        };
        self.publish(events);
        Ok(())
    }

    // ========== Originals ==========

    /// Remember the curve's current points as its original.
    ///
    /// An existing original is kept; returns false in that case.
    pub fn store_original(&self, curve: Option<&str>) -> Result<bool> {
        self.guard.check()?;
        let name = self.resolve_curve(curve, "store_original")?;
        let mut data = self.data.borrow_mut();
        let points = data
            .curves
            .get(&name)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownCurve(name.clone()))?;
        if data.originals.contains_key(&name) {
            return Ok(false);
        }
        debug!("Stored original for '{}' ({} points)", name, points.len());
        data.originals.insert(name, points);
        Ok(true)
    }

    /// Put the original points back and forget the original.
    ///
    /// Returns false when no original was stored.
    pub fn restore_original(&self, curve: Option<&str>) -> Result<bool> {
        self.guard.check()?;
        let name = self.resolve_curve(curve, "restore_original")?;
        let events = {
            let mut cell = self.data.borrow_mut();
            let data = &mut *cell;
            let Some(original) = data.originals.remove(&name) else {
                return Ok(false);
            };
            let len = original.len();
            let mut events = Vec::new();
            let changed = data.curves.get(&name).is_none_or(|cur| **cur != *original);
            if changed {
                data.metadata.entry(name.clone()).or_default();
                data.curves.insert(name.clone(), original);
                events.push(StoreEvent::curves([name.as_str()]));
            }
            if data.clamp_selection(&name, len) {
                events.push(StoreEvent::selection(Some(name.as_str())));
            }
            debug!("Restored original for '{}'", name);
            events
        };
        self.publish(events);
        Ok(true)
    }

    pub fn has_original(&self, curve: Option<&str>) -> Result<bool> {
        self.guard.check()?;
        let name = self.resolve_curve(curve, "has_original")?;
        Ok(self.data.borrow().originals.contains_key(&name))
    }

    /// Forget a stored original without restoring it.
    pub fn discard_original(&self, curve: Option<&str>) -> Result<bool> {
        self.guard.check()?;
        let name = self.resolve_curve(curve, "discard_original")?;
        Ok(self.data.borrow_mut().originals.remove(&name).is_some())
    }

    pub fn original_curve_names(&self) -> Result<Vec<String>> {
        self.guard.check()?;
        let mut names: Vec<String> = self.data.borrow().originals.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    // ========== Batches ==========

    pub fn is_batching(&self) -> Result<bool> {
        self.guard.check()?;
        Ok(self.batch.borrow().is_batching())
    }

    /// Open a batch; the outermost level snapshots the whole store.
    pub fn begin_batch(&self) -> Result<()> {
        self.guard.check()?;
        let mut batch = self.batch.borrow_mut();
        batch.begin(|| BatchSnapshot(self.data.borrow().clone()));
        Ok(())
    }

    /// Close a batch on the success path.
    ///
    /// The outermost level flushes merged events in canonical order. If an
    /// inner level was aborted, the whole batch is rolled back instead.
    pub fn end_batch(&self) -> Result<()> {
        self.guard.check()?;
        let outcome = self.batch.borrow_mut().end()?;
        match outcome {
            BatchEnd::Nested => Ok(()),
            BatchEnd::Commit { snapshot, pending } => {
                if pending.is_empty() {
                    trace!("Batch committed with no changes");
                    return Ok(());
                }
                let events = pending.into_events(&snapshot.0.baseline());
                debug!("Batch committed, flushing {} events", events.len());
                for event in events {
                    event.deliver(&self.bus);
                }
                Ok(())
            }
            BatchEnd::Poisoned { snapshot } => {
                warn!("Batch closed after nested failure, rolling back");
                *self.data.borrow_mut() = snapshot.0;
                Err(StoreError::BatchRollback { source: Box::new(StoreError::NestedBatchFailed) })
            }
        }
    }

    /// Close a batch on the failure path and return the error to re-raise.
    ///
    /// The outermost level restores the pre-batch snapshot and drops every
    /// pending event. An inner level marks the batch for rollback at the
    /// outermost `end_batch`.
    pub fn abort_batch(&self, cause: StoreError) -> StoreError {
        if let Err(e) = self.guard.check() {
            return e;
        }
        let restore = {
            let mut batch = self.batch.borrow_mut();
            if !batch.is_batching() {
                return cause;
            }
            batch.abort()
        };
        if let Some(snapshot) = restore {
            warn!("Batch rolled back: {}", cause);
            *self.data.borrow_mut() = snapshot.0;
        }
        if cause.is_rollback() {
            cause
        } else {
            StoreError::BatchRollback { source: Box::new(cause) }
        }
    }

    /// Run `f` inside a batch: commit on `Ok`, roll back on `Err` or panic.
    pub fn batch<T>(&self, f: impl FnOnce(&Store) -> Result<T>) -> Result<T> {
        self.begin_batch()?;
        let scope = BatchScope { store: self, open: true };
        let result = f(self);
        scope.close(result)
    }
}

/// Rolls the batch back if the closure panics.
struct BatchScope<'s> {
    store: &'s Store,
    open: bool,
}

impl BatchScope<'_> {
    fn close<T>(mut self, result: Result<T>) -> Result<T> {
        self.open = false;
        match result {
            Ok(value) => self.store.end_batch().map(|_| value),
            Err(e) => Err(self.store.abort_batch(e)),
        }
    }
}

impl Drop for BatchScope<'_> {
    fn drop(&mut self) {
        if self.open {
            warn!("Batch closure panicked, rolling back");
            let _ = self.store.abort_batch(StoreError::NotBatching);
        }
    }
}
