//! Geometry value types shared by the compositor modules
//!
//! `Geometry` mirrors what the X server reports for a window (origin plus
//! size), `Rect` is the half-open box used by the region algebra.

/// Window geometry (position and size, border excluded)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Bounding box including an X border of `border_width` on every side
    pub fn outer_rect(&self, border_width: u16) -> Rect {
        let bw = border_width as i32;
        Rect::new(
            self.x,
            self.y,
            self.width as i32 + bw * 2,
            self.height as i32 + bw * 2,
        )
    }
}

/// Half-open rectangle `[x1, x2) x [y1, y2)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Rect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Rect {
    /// Build from origin and size; negative sizes collapse to empty
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x1: x,
            y1: y,
            x2: x.saturating_add(width.max(0)),
            y2: y.saturating_add(height.max(0)),
        }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn is_empty(&self) -> bool {
        self.x2 <= self.x1 || self.y2 <= self.y1
    }

    pub fn intersect(&self, other: &Rect) -> Rect {
        let r = Rect {
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
            x2: self.x2.min(other.x2),
            y2: self.y2.min(other.y2),
        };
        if r.is_empty() { Rect::default() } else { r }
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Rect {
        Rect {
            x1: self.x1 + dx,
            y1: self.y1 + dy,
            x2: self.x2 + dx,
            y2: self.y2 + dy,
        }
    }
}
