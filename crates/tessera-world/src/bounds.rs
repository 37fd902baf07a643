//! Axis-aligned boxes on the discretized placement grid.
//!
//! Boxes live in *grid space*: `x` and `z` are tile coordinates (see
//! [`spatial::to_grid`](crate::spatial::to_grid)) and `y` is world height. All
//! comparisons are inclusive, so two boxes sharing a face count as
//! overlapping. That is what lets [`merge_all`] coalesce adjacent footprints.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Vector types
// ---------------------------------------------------------------------------

/// A 3-component float vector (world or grid space depending on context).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn add(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn sub(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn min(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    pub fn max(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Distance between the horizontal (`x`, `z`) projections.
    pub fn horizontal_distance(self, other: Vec3) -> f32 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }
}

/// A rotation quaternion. Stored verbatim, never interpreted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

/// An integer tile coordinate on the placement grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct GridCoord {
    pub x: i32,
    pub y: i32,
}

impl GridCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Shift by `by`, saturating at the edges of the grid.
    pub fn offset(self, by: GridCoord) -> GridCoord {
        GridCoord::new(self.x.saturating_add(by.x), self.y.saturating_add(by.y))
    }

    /// Shift by `by`, or `None` if either axis leaves the grid.
    pub fn checked_offset(self, by: GridCoord) -> Option<GridCoord> {
        Some(GridCoord::new(
            self.x.checked_add(by.x)?,
            self.y.checked_add(by.y)?,
        ))
    }
}

// ---------------------------------------------------------------------------
// Aabb
// ---------------------------------------------------------------------------

/// Axis-aligned bounding box with inclusive `min`/`max` corners.
///
/// Invariant: `min <= max` componentwise for every box that describes a real
/// footprint. The all-zero box is reserved to mean "no footprint".
#[derive(Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        debug_assert!(
            min.x <= max.x && min.y <= max.y && min.z <= max.z,
            "invalid Aabb: min > max"
        );
        Self { min, max }
    }

    /// A zero-volume box at `point`.
    pub fn point(point: Vec3) -> Self {
        Self {
            min: point,
            max: point,
        }
    }

    /// Box centred on `center` extending `half` on every horizontal side and
    /// `height` upward.
    pub fn around(center: Vec3, half: f32, height: f32) -> Self {
        Self {
            min: Vec3::new(center.x - half, center.y, center.z - half),
            max: Vec3::new(center.x + half, center.y + height, center.z + half),
        }
    }

    /// Whether this is the degenerate all-zero "no footprint" box.
    pub fn is_empty(&self) -> bool {
        self.min == Vec3::ZERO && self.max == Vec3::ZERO
    }

    /// Inclusive point containment.
    pub fn contains(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Inclusive overlap test; boxes that only touch on a face overlap.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        !(self.max.x < other.min.x
            || self.min.x > other.max.x
            || self.max.y < other.min.y
            || self.min.y > other.max.y
            || self.max.z < other.min.z
            || self.min.z > other.max.z)
    }

    /// Whether `other` lies entirely inside this box.
    pub fn encloses(&self, other: &Aabb) -> bool {
        self.contains(other.min) && self.contains(other.max)
    }

    /// Grow uniformly by `margin` on every side.
    pub fn expand(&mut self, margin: f32) {
        let delta = Vec3::new(margin, margin, margin);
        self.min = self.min.sub(delta);
        self.max = self.max.add(delta);
    }

    /// Grow to also cover `other`.
    pub fn include(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Smallest box covering both.
    pub fn union(&self, other: &Aabb) -> Aabb {
        let mut merged = *self;
        merged.include(other);
        merged
    }

    /// The same box shifted by `offset`.
    pub fn translated(&self, offset: Vec3) -> Aabb {
        Aabb {
            min: self.min.add(offset),
            max: self.max.add(offset),
        }
    }
}

impl fmt::Debug for Aabb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Aabb[({}, {}, {})..({}, {}, {})]",
            self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z
        )
    }
}

/// Coalesce every pair of overlapping or touching boxes into their union
/// until no two remaining boxes overlap.
///
/// A union can grow into a box that was previously disjoint from both halves,
/// so the scan repeats until a full pass merges nothing.
pub fn merge_all(boxes: &mut Vec<Aabb>) {
    loop {
        let mut merged_any = false;
        let mut i = 0;
        while i < boxes.len() {
            let mut j = i + 1;
            while j < boxes.len() {
                if boxes[i].overlaps(&boxes[j]) {
                    let other = boxes.swap_remove(j);
                    boxes[i].include(&other);
                    merged_any = true;
                    // The grown box may now reach boxes already skipped.
                    j = i + 1;
                } else {
                    j += 1;
                }
            }
            i += 1;
        }
        if !merged_any {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
