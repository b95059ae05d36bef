//! Region algebra
//!
//! Client-side replacement for XFixes server regions. A `Region` is kept in
//! canonical y-x banded form: rectangles are sorted by `(y1, x1)`, never
//! overlap, every rectangle of a band shares `y1`/`y2`, and vertically
//! adjacent bands with identical spans are merged. Two regions covering the
//! same pixels therefore compare equal.

use crate::shared::Rect;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region {
    rects: Vec<Rect>,
}

impl Region {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rect(rect: Rect) -> Self {
        if rect.is_empty() {
            return Self::new();
        }
        Self { rects: vec![rect] }
    }

    /// Union of arbitrary (possibly overlapping) rectangles
    pub fn from_rects<I: IntoIterator<Item = Rect>>(rects: I) -> Self {
        let raw: Vec<Rect> = rects.into_iter().filter(|r| !r.is_empty()).collect();
        combine(&raw, &[], |a, _| a)
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    /// Smallest rectangle containing the whole region
    #[cfg(test)]
    pub fn extents(&self) -> Rect {
        let mut it = self.rects.iter();
        let Some(first) = it.next() else {
            return Rect::default();
        };
        it.fold(*first, |acc, r| Rect {
            x1: acc.x1.min(r.x1),
            y1: acc.y1.min(r.y1),
            x2: acc.x2.max(r.x2),
            y2: acc.y2.max(r.y2),
        })
    }

    #[cfg(test)]
    pub fn area(&self) -> u64 {
        self.rects
            .iter()
            .map(|r| r.width() as u64 * r.height() as u64)
            .sum()
    }

    pub fn union(&self, other: &Region) -> Region {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        combine(&self.rects, &other.rects, |a, b| a || b)
    }

    pub fn intersect(&self, other: &Region) -> Region {
        if self.is_empty() || other.is_empty() {
            return Region::new();
        }
        combine(&self.rects, &other.rects, |a, b| a && b)
    }

    pub fn subtract(&self, other: &Region) -> Region {
        if self.is_empty() || other.is_empty() {
            return self.clone();
        }
        combine(&self.rects, &other.rects, |a, b| a && !b)
    }

    pub fn union_rect(&self, rect: Rect) -> Region {
        self.union(&Region::from_rect(rect))
    }

    pub fn intersect_rect(&self, rect: Rect) -> Region {
        self.intersect(&Region::from_rect(rect))
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Region {
        Region {
            rects: self.rects.iter().map(|r| r.translate(dx, dy)).collect(),
        }
    }

    /// Whether every pixel of `other` is also in `self`
    #[cfg(test)]
    pub fn contains_region(&self, other: &Region) -> bool {
        other.subtract(self).is_empty()
    }

    #[cfg(test)]
    pub fn intersects(&self, other: &Region) -> bool {
        !self.intersect(other).is_empty()
    }
}

/// Band sweep shared by all boolean operations.
///
/// The y axis is cut at every rectangle edge; inside each band the x spans
/// of both operands are swept and `keep(in_a, in_b)` decides coverage.
fn combine(a: &[Rect], b: &[Rect], keep: fn(bool, bool) -> bool) -> Region {
    let mut ys: Vec<i32> = a
        .iter()
        .chain(b.iter())
        .flat_map(|r| [r.y1, r.y2])
        .collect();
    ys.sort_unstable();
    ys.dedup();

    let mut out: Vec<Rect> = Vec::new();
    let mut prev_band_start = 0;
    let mut prev_spans: Vec<(i32, i32)> = Vec::new();
    let mut prev_y2 = i32::MIN;
    let mut edges: Vec<(i32, i8, i8)> = Vec::new();
    let mut spans: Vec<(i32, i32)> = Vec::new();

    for band in ys.windows(2) {
        let (y1, y2) = (band[0], band[1]);
        edges.clear();
        for r in a.iter().filter(|r| r.y1 <= y1 && r.y2 >= y2) {
            edges.push((r.x1, 1, 0));
            edges.push((r.x2, -1, 0));
        }
        for r in b.iter().filter(|r| r.y1 <= y1 && r.y2 >= y2) {
            edges.push((r.x1, 0, 1));
            edges.push((r.x2, 0, -1));
        }
        if edges.is_empty() {
            continue;
        }
        edges.sort_unstable_by_key(|e| e.0);

        spans.clear();
        let (mut in_a, mut in_b) = (0i32, 0i32);
        let mut open: Option<i32> = None;
        let mut i = 0;
        while i < edges.len() {
            let x = edges[i].0;
            while i < edges.len() && edges[i].0 == x {
                in_a += edges[i].1 as i32;
                in_b += edges[i].2 as i32;
                i += 1;
            }
            let inside = keep(in_a > 0, in_b > 0);
            match (open, inside) {
                (None, true) => open = Some(x),
                (Some(start), false) => {
                    if x > start {
                        spans.push((start, x));
                    }
                    open = None;
                }
                _ => {}
            }
        }

        if spans.is_empty() {
            continue;
        }

        if prev_y2 == y1 && spans == prev_spans {
            for r in &mut out[prev_band_start..] {
                r.y2 = y2;
            }
        } else {
            prev_band_start = out.len();
            out.extend(spans.iter().map(|&(x1, x2)| Rect { x1, y1, x2, y2 }));
            prev_spans.clone_from(&spans);
        }
        prev_y2 = y2;
    }

    Region { rects: out }
}
