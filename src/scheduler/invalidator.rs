//! Invalidation coalescer.
//!
//! At most one compile pass is in flight. Invalidations arriving during a
//! pass collapse into exactly one follow-up pass.

#[derive(Debug, Default)]
pub struct Invalidator {
    building: bool,
    rebuild_pending: bool,
}

impl Invalidator {
    /// Request a pass. Returns `true` when the caller must signal the driver.
    pub fn invalidate(&mut self) -> bool {
        if self.building {
            self.rebuild_pending = true;
            return false;
        }
        self.building = true;
        true
    }

    /// The driver started a pass on its own.
    pub fn start_building(&mut self) {
        self.building = true;
    }

    /// The pass in flight finished. Returns `true` when a follow-up pass was
    /// pending and the caller must signal the driver again.
    pub fn done_building(&mut self) -> bool {
        self.building = false;
        if self.rebuild_pending {
            self.rebuild_pending = false;
            return self.invalidate();
        }
        false
    }

    /// Forget all state, used when the compiler is torn down.
    pub fn reset(&mut self) {
        self.building = false;
        self.rebuild_pending = false;
    }

    pub fn is_building(&self) -> bool {
        self.building
    }

    pub fn is_rebuild_pending(&self) -> bool {
        self.rebuild_pending
    }
}
