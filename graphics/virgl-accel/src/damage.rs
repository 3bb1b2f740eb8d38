//! Primary framebuffer damage

use virgl_protocol::drm::ClipRect;

use crate::region::{Rect, Region};

/// Accumulated changes to the scanout surface
///
/// Rectangles are queued as they arrive and folded into the region in one
/// pass when it is read.
#[derive(Debug, Clone)]
pub struct Damage {
    region: Region,
    pending: Vec<Rect>,
    bounds: Rect,
}

impl Damage {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            region: Region::new(),
            pending: Vec::new(),
            bounds: Rect::from_size(0, 0, width, height),
        }
    }

    pub fn add(&mut self, rect: Rect) {
        if let Some(rect) = rect.intersect(&self.bounds) {
            self.pending.push(rect);
        }
    }

    pub fn add_region(&mut self, region: &Region) {
        self.pending.extend_from_slice(region.clip(self.bounds).rects());
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_empty() && self.pending.is_empty()
    }

    pub fn region(&mut self) -> &Region {
        if !self.pending.is_empty() {
            let pending = Region::from_rects(self.pending.drain(..));
            self.region = self.region.union(&pending);
        }
        &self.region
    }

    /// Empty the damage, returning what was recorded
    pub fn take(&mut self) -> Region {
        self.region();
        core::mem::take(&mut self.region)
    }
}

/// Dirty-rectangle form of `region`
pub fn clip_rects(region: &Region) -> Vec<ClipRect> {
    let clamp = |v: i32| v.clamp(0, u16::MAX as i32) as u16;
    region
        .rects()
        .iter()
        .map(|r| ClipRect {
            x1: clamp(r.x1),
            y1: clamp(r.y1),
            x2: clamp(r.x2),
            y2: clamp(r.y2),
        })
        .collect()
}
