//! Pub/Sub change bus for the owner thread.
//!
//! Architecture:
//! - Components subscribe to event types with callbacks
//! - emit() invokes callbacks synchronously, before returning
//! - Catch-all listeners (subscribe_any) see every event after typed subscribers
//!
//! Callback order: FIFO (first-subscribed, first-called) within same event type.
//! Cross-type order is decided by the emitter, not by the bus.
//!
//! The bus lives on the owner thread with the store, so callbacks are plain
//! `Rc<dyn Fn>` and may capture `Rc<Store>` to pull data back out. Callbacks
//! are snapshotted before delivery: a callback may subscribe, unsubscribe or
//! trigger further emits without invalidating the iteration in progress.

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt::Debug;
use std::rc::Rc;

use log::trace;

/// Marker trait for events.
pub trait Event: Any + Debug + 'static {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

// Blanket impl for all qualifying types
impl<T: Any + Debug + 'static> Event for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Handle returned by subscribe calls, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Type-erased callback
type Callback = Rc<dyn Fn(&dyn Any)>;
type AnyCallback = Rc<dyn Fn(&dyn Event)>;

#[derive(Default)]
pub struct ChangeBus {
    subscribers: RefCell<HashMap<TypeId, Vec<(SubscriptionId, Callback)>>>,
    any_subscribers: RefCell<Vec<(SubscriptionId, AnyCallback)>>,
    next_id: Cell<u64>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> SubscriptionId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        SubscriptionId(id)
    }

    /// Subscribe to events of type E.
    ///
    /// # Example
    /// ```ignore
    /// let store = Rc::clone(&store);
    /// bus.subscribe::<CurvesChangedEvent, _>(move |e| {
    ///     if e.contains("Track1") {
    ///         redraw(&store.get_curve_data("Track1"));
    ///     }
    /// });
    /// ```
    pub fn subscribe<E, F>(&self, callback: F) -> SubscriptionId
    where
        E: Event,
        F: Fn(&E) + 'static,
    {
        let id = self.allocate_id();
        let wrapped: Callback = Rc::new(move |any: &dyn Any| {
            if let Some(event) = any.downcast_ref::<E>() {
                callback(event);
            }
        });
        self.subscribers
            .borrow_mut()
            .entry(TypeId::of::<E>())
            .or_default()
            .push((id, wrapped));
        id
    }

    /// Subscribe to every event emitted on this bus.
    pub fn subscribe_any<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&dyn Event) + 'static,
    {
        let id = self.allocate_id();
        self.any_subscribers.borrow_mut().push((id, Rc::new(callback)));
        id
    }

    /// Deliver to typed subscribers of E, then to catch-all listeners.
    pub fn emit<E: Event>(&self, event: E) {
        trace!("ChangeBus emit {:?}", event);

        let typed: Vec<Callback> = self
            .subscribers
            .borrow()
            .get(&TypeId::of::<E>())
            .map(|cbs| cbs.iter().map(|(_, cb)| Rc::clone(cb)).collect())
            .unwrap_or_default();
        for cb in typed {
            cb(&event);
        }

        let any: Vec<AnyCallback> = self
            .any_subscribers
            .borrow()
            .iter()
            .map(|(_, cb)| Rc::clone(cb))
            .collect();
        for cb in any {
            cb(&event);
        }
    }

    /// Remove one subscription. Returns false if the id was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut found = false;
        for cbs in self.subscribers.borrow_mut().values_mut() {
            let before = cbs.len();
            cbs.retain(|(sid, _)| *sid != id);
            found |= cbs.len() != before;
        }
        let mut any = self.any_subscribers.borrow_mut();
        let before = any.len();
        any.retain(|(sid, _)| *sid != id);
        found || any.len() != before
    }

    /// Clear subscribers for type E
    pub fn unsubscribe_all<E: Event>(&self) {
        self.subscribers.borrow_mut().remove(&TypeId::of::<E>());
    }

    /// Check if there are subscribers for event type E
    pub fn has_subscribers<E: Event>(&self) -> bool {
        self.subscribers
            .borrow()
            .get(&TypeId::of::<E>())
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().values().map(Vec::len).sum::<usize>()
            + self.any_subscribers.borrow().len()
    }
}

impl std::fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeBus")
            .field("subscriber_types", &self.subscribers.borrow().len())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Helper: downcast a catch-all event to a concrete type
#[inline]
pub fn downcast_event<E: Event>(event: &dyn Event) -> Option<&E> {
    event.as_any().downcast_ref::<E>()
}
