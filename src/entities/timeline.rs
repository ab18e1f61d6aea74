//! Timeline side of the asset/timeline contract.
//!
//! Assets never own timelines. They remember timeline *ids* and resolve them
//! through a [`TimelineDirectory`], which keeps weak references checked for
//! liveness at call time.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Timeline instance identifier
pub type TimelineId = Uuid;

/// Occurrence (timeline item) identifier, unique within a timeline
pub type ClipId = i32;

/// Which part of the asset a timeline occurrence plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClipState {
    AudioOnly,
    VideoOnly,
    Disabled,
}

/// Distinguishes the two parallel playlists sharing one track number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PlaylistSelector {
    #[default]
    Primary,
    Secondary,
}

/// Key of a per-track derived producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackKey {
    pub track_id: i32,
    pub stream_index: i32,
    pub playlist: PlaylistSelector,
}

impl TrackKey {
    pub fn new(track_id: i32, stream_index: i32) -> Self {
        Self {
            track_id,
            stream_index,
            playlist: PlaylistSelector::Primary,
        }
    }

    pub fn secondary(mut self) -> Self {
        self.playlist = PlaylistSelector::Secondary;
        self
    }
}

impl std::fmt::Display for TrackKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pl = match self.playlist {
            PlaylistSelector::Primary => "a",
            PlaylistSelector::Secondary => "b",
        };
        write!(f, "t{}s{}{}", self.track_id, self.stream_index, pl)
    }
}

/// Externally visible attribute that changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Name,
    Date,
    Duration,
    Status,
    Thumbnail,
    Tags,
    Description,
    Resource,
}

/// Undo/redo operation
pub type Fun = Box<dyn FnMut() -> bool + Send>;

/// Accumulates undo and redo operations of a compound edit.
#[derive(Default)]
pub struct UndoGroup {
    undo: Vec<Fun>,
    redo: Vec<Fun>,
}

impl UndoGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, undo: Fun, redo: Fun) {
        self.undo.push(undo);
        self.redo.push(redo);
    }

    pub fn len(&self) -> usize {
        self.redo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.redo.is_empty()
    }

    /// Run undo operations in reverse order. Stops at the first failure.
    pub fn undo(&mut self) -> bool {
        self.undo.iter_mut().rev().all(|f| f())
    }

    pub fn redo(&mut self) -> bool {
        self.redo.iter_mut().all(|f| f())
    }
}

/// Operations an asset may request from a timeline holding its occurrences.
pub trait TimelineInstance: Send + Sync {
    fn id(&self) -> TimelineId;

    /// Replace the occurrence's producer (asset was rebuilt).
    fn request_clip_reload(&self, clip_id: ClipId, new_duration: i32) -> bool;

    /// Refresh the given roles of an occurrence.
    fn request_clip_update(&self, clip_id: ClipId, roles: &[Role]);

    /// Delete an occurrence as part of a compound edit.
    fn request_item_deletion(&self, clip_id: ClipId, undo: &mut UndoGroup) -> bool;

    /// Purpose and track of an occurrence, `None` if unknown.
    fn clip_state(&self, clip_id: ClipId) -> Option<(ClipState, TrackKey)>;
}

/// Coordinator-owned lookup from timeline id to a live timeline.
#[derive(Default)]
pub struct TimelineDirectory {
    timelines: RwLock<HashMap<TimelineId, Weak<dyn TimelineInstance>>>,
    current: RwLock<Option<TimelineId>>,
}

impl std::fmt::Debug for TimelineDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimelineDirectory")
            .field("timelines", &self.timelines.read().map(|t| t.len()).unwrap_or(0))
            .field("current", &self.current())
            .finish()
    }
}

impl TimelineDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a timeline reachable. The first inserted becomes current.
    pub fn insert(&self, timeline: &Arc<dyn TimelineInstance>) {
        let id = timeline.id();
        self.timelines
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Arc::downgrade(timeline));
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        if current.is_none() {
            *current = Some(id);
        }
        debug!("Timeline {} registered in directory", id);
    }

    pub fn remove(&self, id: TimelineId) {
        self.timelines.write().unwrap_or_else(|e| e.into_inner()).remove(&id);
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        if *current == Some(id) {
            *current = None;
        }
    }

    /// Resolve a live timeline; `None` if never registered or already dropped.
    pub fn get(&self, id: TimelineId) -> Option<Arc<dyn TimelineInstance>> {
        self.timelines
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .and_then(|w| w.upgrade())
    }

    pub fn set_current(&self, id: Option<TimelineId>) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = id;
    }

    pub fn current(&self) -> Option<TimelineId> {
        *self.current.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Drop entries whose timeline no longer exists.
    pub fn prune(&self) -> usize {
        let mut map = self.timelines.write().unwrap_or_else(|e| e.into_inner());
        let before = map.len();
        map.retain(|_, w| w.strong_count() > 0);
        before - map.len()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording timeline used by tests across the crate.

    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingTimeline {
        pub id: TimelineId,
        pub reloads: Mutex<Vec<(ClipId, i32)>>,
        pub updates: Mutex<Vec<(ClipId, Vec<Role>)>>,
        pub deletions: Mutex<Vec<ClipId>>,
        pub states: Mutex<HashMap<ClipId, (ClipState, TrackKey)>>,
    }

    impl RecordingTimeline {
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                id: Uuid::new_v4(),
                ..Default::default()
            })
        }

        pub fn set_state(&self, clip_id: ClipId, state: ClipState, track: TrackKey) {
            self.states.lock().unwrap().insert(clip_id, (state, track));
        }
    }

    impl TimelineInstance for RecordingTimeline {
        fn id(&self) -> TimelineId {
            self.id
        }

        fn request_clip_reload(&self, clip_id: ClipId, new_duration: i32) -> bool {
            self.reloads.lock().unwrap().push((clip_id, new_duration));
            true
        }

        fn request_clip_update(&self, clip_id: ClipId, roles: &[Role]) {
            self.updates.lock().unwrap().push((clip_id, roles.to_vec()));
        }

        fn request_item_deletion(&self, clip_id: ClipId, undo: &mut UndoGroup) -> bool {
            self.deletions.lock().unwrap().push(clip_id);
            undo.push(Box::new(|| true), Box::new(|| true));
            true
        }

        fn clip_state(&self, clip_id: ClipId) -> Option<(ClipState, TrackKey)> {
            self.states.lock().unwrap().get(&clip_id).copied()
        }
    }
}
