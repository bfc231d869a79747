//! Identifiers and simple allocators for core entities.

use serde::{Deserialize, Serialize};

/// Clip loaded into a controller's clip library.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ClipId(pub u32);

/// Stable per-target identifier; keys the mixer side-table.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TargetId(pub u32);

/// Index into the validated machine's state table.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct StateId(pub u32);

/// Handle returned when registering an observer.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ObserverId(pub u32);

impl ClipId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl TargetId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl StateId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Monotonic allocator for ClipId and TargetId.
/// Dense indices double as positions in the owning tables; IDs are opaque externally.
#[derive(Default, Debug)]
pub struct IdAllocator {
    next_clip: u32,
    next_target: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_clip(&mut self) -> ClipId {
        let id = ClipId(self.next_clip);
        self.next_clip = self.next_clip.wrapping_add(1);
        id
    }

    #[inline]
    pub fn alloc_target(&mut self) -> TargetId {
        let id = TargetId(self.next_target);
        self.next_target = self.next_target.wrapping_add(1);
        id
    }

    /// Forget all targets (clips survive a machine teardown).
    #[inline]
    pub fn reset_targets(&mut self) {
        self.next_target = 0;
    }

    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
