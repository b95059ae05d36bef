//! Screen damage accumulator
//!
//! Collects the screen areas that must be repainted before the next frame.
//! Everything is clipped to the screen; repeated additions are idempotent.

use tracing::trace;

use crate::compositor::region::Region;
use crate::shared::Rect;

#[derive(Debug, Default)]
pub struct DamageAccumulator {
    pending: Region,
    screen: Rect,
}

impl DamageAccumulator {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pending: Region::new(),
            screen: Rect::new(0, 0, width as i32, height as i32),
        }
    }

    /// Root window resized; pending damage outside the new bounds is dropped
    pub fn set_screen(&mut self, width: u32, height: u32) {
        self.screen = Rect::new(0, 0, width as i32, height as i32);
        self.pending = self.pending.intersect_rect(self.screen);
    }

    pub fn add_region(&mut self, region: &Region) {
        if region.is_empty() {
            return;
        }
        let clipped = region.intersect_rect(self.screen);
        self.pending = self.pending.union(&clipped);
    }

    pub fn add_rect(&mut self, rect: Rect) {
        self.add_region(&Region::from_rect(rect));
    }

    /// Mark the whole screen for repaint
    pub fn add_screen(&mut self) {
        self.pending = Region::from_rect(self.screen);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    #[cfg(test)]
    pub fn pending(&self) -> &Region {
        &self.pending
    }

    /// Hand the accumulated damage to the painter and start over
    pub fn take(&mut self) -> Region {
        let region = std::mem::take(&mut self.pending);
        if !region.is_empty() {
            trace!("damage: taking {} rects", region.rects().len());
        }
        region
    }
}
