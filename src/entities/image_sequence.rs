//! Background image sequence manifest.
//!
//! Only the file list is stored; decoding and caching belong to the
//! renderer. Frame numbers are 1-based: frame `n` shows `files[n - 1]`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageSequence {
    pub files: Vec<String>,
    pub directory: Option<String>,
}

impl ImageSequence {
    pub fn new(files: Vec<String>, directory: Option<String>) -> Self {
        Self { files, directory }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Derived frame count: `max(1, len)`.
    pub fn derived_total_frames(&self) -> i32 {
        i32::try_from(self.files.len()).unwrap_or(i32::MAX).max(1)
    }

    /// Full path of the image for a 1-based frame, joined with the directory if set.
    pub fn path_for_frame(&self, frame: i32) -> Option<PathBuf> {
        let idx = usize::try_from(frame.checked_sub(1)?).ok()?;
        let file = self.files.get(idx)?;
        Some(match &self.directory {
            Some(dir) => PathBuf::from(dir).join(file),
            None => PathBuf::from(file),
        })
    }
}
