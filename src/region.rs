//! Mouse regions
//!
//! Fixed-capacity table mapping window-local pointer coordinates to
//! application-defined click zones.

use tracing::debug;

use crate::error::{DockError, Result};

/// Number of slots in a region table
pub const MAX_MOUSE_REGIONS: usize = 16;

/// Rectangle in window-local pixels, inclusive on all four edges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl RegionRect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    /// Check if point is inside rectangle (edges included)
    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.left <= x && x <= self.right && self.top <= y && y <= self.bottom
    }
}

/// A registered click zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseRegion {
    pub index: usize,
    pub rect: RegionRect,
}

/// Region table
///
/// Slots are keyed by index. Lookups scan in ascending index order, so when
/// regions overlap the lowest index wins.
#[derive(Debug, Clone, Default)]
pub struct RegionTable {
    slots: [Option<RegionRect>; MAX_MOUSE_REGIONS],
}

impl RegionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the region at `index`
    ///
    /// The rectangle is stored as given. A degenerate or off-window rectangle is
    /// legal; it simply never matches a pointer position inside the window.
    pub fn add_mouse_region(
        &mut self,
        index: usize,
        left: i32,
        top: i32,
        right: i32,
        bottom: i32,
    ) -> Result<()> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(DockError::InvalidIndex { index })?;
        *slot = Some(RegionRect::new(left, top, right, bottom));
        debug!("Mouse region {} = ({}, {}, {}, {})", index, left, top, right, bottom);
        Ok(())
    }

    /// Register a region from its origin and size
    pub fn add_sized_region(
        &mut self,
        index: usize,
        left: i32,
        top: i32,
        width: i32,
        height: i32,
    ) -> Result<()> {
        self.add_mouse_region(
            index,
            left,
            top,
            left.saturating_add(width),
            top.saturating_add(height),
        )
    }

    /// Return the lowest-index region containing `(x, y)`, if any
    pub fn check_mouse_region(&self, x: i32, y: i32) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.is_some_and(|rect| rect.contains(x, y)))
    }

    /// Get the rectangle registered at `index`
    pub fn get(&self, index: usize) -> Option<RegionRect> {
        self.slots.get(index).copied().flatten()
    }

    /// Forget the region at `index`
    pub fn remove(&mut self, index: usize) -> Result<Option<RegionRect>> {
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(DockError::InvalidIndex { index })?;
        Ok(slot.take())
    }

    /// Forget every region
    pub fn clear(&mut self) {
        self.slots = [None; MAX_MOUSE_REGIONS];
    }

    /// Registered regions in ascending index order
    pub fn iter(&self) -> impl Iterator<Item = MouseRegion> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.map(|rect| MouseRegion { index, rect }))
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
