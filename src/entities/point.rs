//! Tracked point: `frame -> (x, y, status)`.

use serde::{Deserialize, Serialize};

/// Per-point tracking status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointStatus {
    #[default]
    Normal,
    Interpolated,
    Keyframe,
    Endframe,
}

/// Older loaders store status as a bare "interpolated" flag.
impl From<bool> for PointStatus {
    fn from(interpolated: bool) -> Self {
        if interpolated {
            PointStatus::Interpolated
        } else {
            PointStatus::Normal
        }
    }
}

impl PointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointStatus::Normal => "normal",
            PointStatus::Interpolated => "interpolated",
            PointStatus::Keyframe => "keyframe",
            PointStatus::Endframe => "endframe",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub frame: i32,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub status: PointStatus,
}

impl Point {
    pub fn new(frame: i32, x: f64, y: f64) -> Self {
        Self { frame, x, y, status: PointStatus::Normal }
    }

    pub fn with_status(frame: i32, x: f64, y: f64, status: impl Into<PointStatus>) -> Self {
        Self { frame, x, y, status: status.into() }
    }

    /// NaN and infinities are never stored.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(i32, f64, f64)> for Point {
    fn from((frame, x, y): (i32, f64, f64)) -> Self {
        Point::new(frame, x, y)
    }
}

impl From<(i32, f64, f64, PointStatus)> for Point {
    fn from((frame, x, y, status): (i32, f64, f64, PointStatus)) -> Self {
        Point::with_status(frame, x, y, status)
    }
}

/// Sort by frame and keep the last point written for each frame.
///
/// Stable sort preserves input order within a frame, so the later write wins.
pub fn normalize_points(mut points: Vec<Point>) -> Vec<Point> {
    points.sort_by_key(|p| p.frame);
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for p in points {
        match out.last_mut() {
            Some(last) if last.frame == p.frame => *last = p,
            _ => out.push(p),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_status() {
        assert_eq!(PointStatus::from(true), PointStatus::Interpolated);
        assert_eq!(PointStatus::from(false), PointStatus::Normal);
        let p = Point::with_status(3, 1.0, 2.0, true);
        assert_eq!(p.status, PointStatus::Interpolated);
    }

    #[test]
    fn test_is_finite() {
        assert!(Point::new(1, 0.0, -5.5).is_finite());
        assert!(!Point::new(1, f64::NAN, 0.0).is_finite());
        assert!(!Point::new(1, 0.0, f64::INFINITY).is_finite());
    }

    #[test]
    fn test_normalize_sorts_and_later_frame_wins() {
        let pts = vec![
            Point::new(3, 3.0, 3.0),
            Point::new(1, 1.0, 1.0),
            Point::new(3, 9.0, 9.0),
            Point::new(2, 2.0, 2.0),
        ];
        let out = normalize_points(pts);
        let frames: Vec<i32> = out.iter().map(|p| p.frame).collect();
        assert_eq!(frames, vec![1, 2, 3]);
        assert_eq!(out[2].x, 9.0);
    }

    #[test]
    fn test_serde_status_lowercase() {
        let p = Point::with_status(7, 1.5, 2.5, PointStatus::Keyframe);
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains("\"keyframe\""));
        let back: Point = serde_json::from_str(r#"{"frame":7,"x":1.5,"y":2.5}"#).unwrap();
        assert_eq!(back.status, PointStatus::Normal);
    }
}
