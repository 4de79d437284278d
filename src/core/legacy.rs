//! Single-curve ("current track") calling convention over the multi-curve store.
//!
//! Every method resolves the active curve and forwards to one canonical
//! mutator or getter. The facade holds no data and emits nothing itself; the
//! canonical call it forwards to is the single source of each event.

use std::collections::BTreeSet;

use super::error::{Result, StoreError};
use super::store::Store;
use crate::entities::Point;

#[derive(Clone, Copy, Debug)]
pub struct LegacyFacade<'s> {
    store: &'s Store,
}

impl<'s> LegacyFacade<'s> {
    pub fn new(store: &'s Store) -> Self {
        Self { store }
    }

    fn active(&self, operation: &'static str) -> Result<String> {
        self.store.active_curve()?.ok_or(StoreError::NoActiveCurve { operation })
    }

    /// Replace the active curve's points. Fails with `NoActiveCurve` when none is set.
    pub fn set_active_track_data(&self, points: Vec<Point>) -> Result<()> {
        let curve = self.active("set_active_track_data")?;
        self.store.set_curve_data(&curve, points, None)
    }

    /// Older name for [`LegacyFacade::set_active_track_data`].
    pub fn set_track_data(&self, points: Vec<Point>) -> Result<()> {
        self.set_active_track_data(points)
    }

    pub fn get_active_track_data(&self) -> Result<Vec<Point>> {
        let curve = self.active("get_active_track_data")?;
        self.store.get_curve_data(&curve)
    }

    /// Older name for [`LegacyFacade::get_active_track_data`].
    pub fn get_track_data(&self) -> Result<Vec<Point>> {
        self.get_active_track_data()
    }

    /// True when an active curve is set and holds at least one point.
    ///
    /// A predicate, so a missing active curve answers `false` rather than failing.
    pub fn has_track_data(&self) -> Result<bool> {
        match self.store.active_curve()? {
            Some(curve) => Ok(self.store.point_count(&curve)? > 0),
            None => Ok(false),
        }
    }

    pub fn set_track_selection<I>(&self, indices: I) -> Result<()>
    where
        I: IntoIterator<Item = usize>,
    {
        let curve = self.active("set_track_selection")?;
        self.store.set_selection(&curve, indices)
    }

    pub fn track_selection(&self) -> Result<BTreeSet<usize>> {
        let curve = self.active("track_selection")?;
        self.store.get_selection(&curve)
    }

    pub fn update_track_point(&self, index: usize, x: f64, y: f64) -> Result<()> {
        self.store.update_point(None, index, x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::core::event_bus::Event;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn store() -> Store {
        let _ = env_logger::builder().is_test(true).try_init();
        Store::new(StoreConfig::default())
    }

    #[test]
    fn test_load_then_edit_scenario() {
        let s = store();
        s.set_curve_data("T1", vec![Point::new(1, 0.0, 0.0)], None).unwrap();
        s.set_active_curve(Some("T1")).unwrap();
        s.legacy().set_track_data(vec![Point::new(1, 5.0, 5.0)]).unwrap();

        assert_eq!(s.get_curve_data("T1").unwrap(), vec![Point::new(1, 5.0, 5.0)]);
        assert_eq!(s.legacy().get_active_track_data().unwrap(), vec![Point::new(1, 5.0, 5.0)]);
        assert!(s.legacy().has_track_data().unwrap());
    }

    #[test]
    fn test_fail_fast_without_active_curve() {
        let s = store();
        s.set_active_curve(None).unwrap();

        let err = s.legacy().set_track_data(vec![Point::new(1, 2.0, 0.0)]).unwrap_err();
        assert!(matches!(err, StoreError::NoActiveCurve { operation: "set_active_track_data" }));
        assert!(s.curve_names().unwrap().is_empty());
        assert!(matches!(s.legacy().get_track_data(), Err(StoreError::NoActiveCurve { .. })));
        assert!(!s.legacy().has_track_data().unwrap());
    }

    #[test]
    fn test_facade_emits_exactly_the_canonical_events() {
        let s = store();
        s.set_active_curve(Some("T1")).unwrap();

        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        s.subscribe_any(move |e| l.borrow_mut().push(e.type_name())).unwrap();

        s.legacy().set_track_data(vec![Point::new(1, 1.0, 1.0), Point::new(2, 2.0, 2.0)]).unwrap();
        s.legacy().set_track_selection([1, 9]).unwrap();
        s.legacy().update_track_point(0, 3.0, 3.0).unwrap();

        assert_eq!(log.borrow().len(), 3);
        assert_eq!(s.legacy().track_selection().unwrap(), BTreeSet::from([1]));
        assert_eq!(s.get_curve_data("T1").unwrap()[0], Point::new(1, 3.0, 3.0));
    }

    #[test]
    fn test_has_track_data_empty_curve() {
        let s = store();
        s.set_curve_data("Empty", Vec::new(), None).unwrap();
        s.set_active_curve(Some("Empty")).unwrap();
        assert!(!s.legacy().has_track_data().unwrap());
    }
}
