//! UI preference layer (view / tool / window settings).

pub mod prefs;
pub mod prefs_events;

pub use prefs::{PreferenceKey, Tool, UiPreferenceLayer, UiPreferences, PREFS_FILE};
pub use prefs_events::PreferencesChangedEvent;
