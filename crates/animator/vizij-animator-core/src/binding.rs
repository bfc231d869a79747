//! Target side-table, binding table and resolver trait.
//!
//! The host resolves transform paths once, at initialization. The controller then owns every
//! per-target record (rest pose, live pose, root-bone flag) keyed by a dense `TargetId`, and
//! each clip track is bound to at most one target.

use hashbrown::HashMap;

use crate::data::ClipLibrary;
use crate::ids::{ClipId, IdAllocator, TargetId};
use crate::math::Transform;

/// Opaque target handle (small string key echoed back in outputs).
pub type TargetHandle = String;

/// What the host reports about a resolved transform node.
#[derive(Clone, Debug)]
pub struct TargetDesc {
    pub handle: TargetHandle,
    /// Pose the node has before any animation is applied.
    pub rest: Transform,
    /// Morph influence before any animation is applied.
    pub rest_influence: f32,
    /// Node is flagged as the root bone (root-motion source).
    pub root_bone: bool,
}

impl TargetDesc {
    pub fn new(handle: impl Into<String>, rest: Transform) -> Self {
        Self {
            handle: handle.into(),
            rest,
            rest_influence: 0.0,
            root_bone: false,
        }
    }

    pub fn root(mut self) -> Self {
        self.root_bone = true;
        self
    }
}

/// Trait for resolving transform paths to host nodes.
/// Adapters implement this and pass it into `Controller::initialize()`.
pub trait TargetResolver {
    fn resolve(&mut self, path: &str) -> Option<TargetDesc>;
}

/// One row of the target side-table.
#[derive(Clone, Debug)]
pub struct TargetRow {
    pub id: TargetId,
    pub path: String,
    pub handle: TargetHandle,
    pub root_bone: bool,
    pub rest: Transform,
    /// Live pose written by the finalizer.
    pub pose: Transform,
    pub rest_influence: f32,
    pub influence: f32,
}

/// Controller-owned table of every animated target.
#[derive(Default, Debug)]
pub struct TargetTable {
    rows: Vec<TargetRow>,
    by_path: HashMap<String, TargetId>,
}

impl TargetTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a target by its transform path.
    pub fn find(&self, path: &str) -> Option<TargetId> {
        self.by_path.get(path).copied()
    }

    pub fn insert(&mut self, ids: &mut IdAllocator, path: &str, desc: TargetDesc) -> TargetId {
        let id = ids.alloc_target();
        debug_assert_eq!(id.index(), self.rows.len());
        self.by_path.insert(path.to_string(), id);
        self.rows.push(TargetRow {
            id,
            path: path.to_string(),
            handle: desc.handle,
            root_bone: desc.root_bone,
            rest: desc.rest,
            pose: desc.rest,
            rest_influence: desc.rest_influence,
            influence: desc.rest_influence,
        });
        id
    }

    #[inline]
    pub fn get(&self, id: TargetId) -> Option<&TargetRow> {
        self.rows.get(id.index())
    }

    #[inline]
    pub fn get_mut(&mut self, id: TargetId) -> Option<&mut TargetRow> {
        self.rows.get_mut(id.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TargetRow> {
        self.rows.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.by_path.clear();
    }
}

/// Per-clip track bindings: `tracks[clip][track]` is the bound target, if any.
#[derive(Default, Debug)]
pub struct BindingTable {
    tracks: Vec<Vec<Option<TargetId>>>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self { tracks: Vec::new() }
    }

    /// Resolve every track of every clip, inserting targets on first sight.
    /// Returns the paths the resolver could not find.
    pub fn bind_all(
        &mut self,
        clips: &ClipLibrary,
        targets: &mut TargetTable,
        ids: &mut IdAllocator,
        resolver: &mut dyn TargetResolver,
    ) -> Vec<String> {
        let mut unresolved: Vec<String> = Vec::new();
        self.tracks.clear();
        for clip in clips.iter() {
            let mut row = Vec::with_capacity(clip.tracks.len());
            for track in &clip.tracks {
                let bound = match targets.find(&track.target) {
                    Some(id) => Some(id),
                    None => match resolver.resolve(&track.target) {
                        Some(desc) => Some(targets.insert(ids, &track.target, desc)),
                        None => {
                            if !unresolved.contains(&track.target) {
                                unresolved.push(track.target.clone());
                            }
                            None
                        }
                    },
                };
                row.push(bound);
            }
            self.tracks.push(row);
        }
        unresolved
    }

    /// Target bound to a clip's track.
    #[inline]
    pub fn get(&self, clip: ClipId, track_idx: usize) -> Option<TargetId> {
        self.tracks
            .get(clip.index())
            .and_then(|row| row.get(track_idx).copied().flatten())
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }
}
