//! Preference change events.

use std::collections::BTreeSet;

use super::prefs::PreferenceKey;
use crate::core::batch::Pending;

/// One or more preferences changed. Subscribers re-read the keys they care about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreferencesChangedEvent {
    pub keys: BTreeSet<PreferenceKey>,
}

impl PreferencesChangedEvent {
    pub fn contains(&self, key: PreferenceKey) -> bool {
        self.keys.contains(&key)
    }
}

/// Changed keys accumulated while a preference transaction is open.
#[derive(Debug, Default)]
pub struct PendingPreferences {
    keys: BTreeSet<PreferenceKey>,
}

impl Pending for PendingPreferences {
    type Event = PreferenceKey;

    fn record(&mut self, key: PreferenceKey) {
        self.keys.insert(key);
    }

    fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl PendingPreferences {
    pub fn into_event(self) -> Option<PreferencesChangedEvent> {
        (!self.is_empty()).then_some(PreferencesChangedEvent { keys: self.keys })
    }
}
