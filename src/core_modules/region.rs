// THEORY:
// The `region` module holds the spatial data containers of the engine. A
// `GridRect` is an axis-aligned rectangle in block-grid coordinates; candidate
// and merged regions wrap one with a per-frame id. Like `Block`, these are
// "dumb" values: they are recreated every classification frame and carry no
// identity across frames.

use serde::Serialize;

/// Axis-aligned rectangle in block-grid units. `x`/`y` is the top-left cell;
/// the rectangle covers `width * height` cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GridRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl GridRect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Builds a rectangle from inclusive corner cells.
    pub fn from_corners(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            x: left,
            y: top,
            width: right - left + 1,
            height: bottom - top + 1,
        }
    }

    /// One past the last covered column.
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    /// One past the last covered row.
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn area(&self) -> i64 {
        self.width as i64 * self.height as i64
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &GridRect) -> GridRect {
        let left = self.x.min(other.x);
        let top = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        GridRect::new(left, top, right - left, bottom - top)
    }

    /// Empty cells between the two rectangles along x and y. An axis on which
    /// the projections touch or overlap has a gap of zero.
    pub fn gap_to(&self, other: &GridRect) -> (i32, i32) {
        let gap_x = (self.x.max(other.x) - self.right().min(other.right())).max(0);
        let gap_y = (self.y.max(other.y) - self.bottom().min(other.bottom())).max(0);
        (gap_x, gap_y)
    }

    pub fn translate(&self, dx: i32, dy: i32) -> GridRect {
        GridRect::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

/// A rectangle found by the region extractor in the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateRegion {
    /// Sequential id within this frame, starting at 1. Not stable across frames.
    pub id: u32,
    pub rect: GridRect,
}

/// A final, de-duplicated rectangle after merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedRegion {
    pub id: u32,
    pub rect: GridRect,
}
