//! Planar geometry over normalized landmark coordinates

use crate::models::Landmark;

/// Wrist-to-ear distance below which a hand counts as "up"
pub const GUARD_DISTANCE_THRESHOLD: f64 = 0.15;

/// Angle at vertex `b` formed by `a` and `c`, in degrees within `[0, 180]`
pub fn angle(a: Landmark, b: Landmark, c: Landmark) -> f64 {
    let radians = (c.y - b.y).atan2(c.x - b.x) - (a.y - b.y).atan2(a.x - b.x);
    let degrees = radians.to_degrees().abs();

    if degrees > 180.0 {
        360.0 - degrees
    } else {
        degrees
    }
}

/// Euclidean distance between two landmarks
pub fn distance(p1: Landmark, p2: Landmark) -> f64 {
    ((p1.x - p2.x).powi(2) + (p1.y - p2.y).powi(2)).sqrt()
}

/// A hand is up when the wrist sits close to the ear on the same side
pub fn is_guard_up(wrist: Landmark, ear: Landmark) -> bool {
    distance(wrist, ear) < GUARD_DISTANCE_THRESHOLD
}

/// Mean hip y-coordinate; smaller values mean higher hips
pub fn hip_height(left_hip: Landmark, right_hip: Landmark) -> f64 {
    (left_hip.y + right_hip.y) / 2.0
}
