//! Per-curve metadata kept beside the point table.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurveMetadata {
    pub visible: bool,
    /// Locked curves are still writable through the store; the flag is for editors.
    pub locked: bool,
    /// RGBA display colour, `None` = palette default
    pub color: Option<[u8; 4]>,
}

impl Default for CurveMetadata {
    fn default() -> Self {
        Self { visible: true, locked: false, color: None }
    }
}
