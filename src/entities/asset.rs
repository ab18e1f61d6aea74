//! Asset: one imported media source in the bin.
//!
//! Locks:
//! - `state` guards the master producer, derived producer cache, registry
//!   and descriptor. Every mutation of those happens under it.
//! - `thumbs` guards only the pending thumbnail frame queue.
//!
//! Lock order is `state` then `thumbs`; neither is held while calling into
//! timelines or the project item model, since those may call back.
//!
//! Lifecycle operations (reload, producer replacement, property edits,
//! proxy handling) live in `entities::reload`.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, trace, warn};

use super::attrs::Attrs;
use super::clip_type::ClipType;
use super::effects::EffectStack;
use super::handle::Producer;
use super::keys::*;
use super::model::ProjectItemModel;
use super::producer_cache::{DeriveContext, ProducerCache, ProducerRequest};
use super::registry::Registry;
use super::status::{ClipStatus, Lifecycle};
use super::timeline::{ClipId, Role, TimelineDirectory, TimelineId, UndoGroup};
use crate::config::ProxyPolicy;
use crate::core::jobs::{JobKind, JobParams, TaskManager};
use crate::core::thumbs::{Thumbnail, ThumbnailService};

/// Shared collaborators of every asset in a bin.
#[derive(Clone)]
pub struct BinContext {
    pub tasks: Arc<dyn TaskManager>,
    pub timelines: Arc<TimelineDirectory>,
    pub model: Arc<dyn ProjectItemModel>,
    pub thumbs: Arc<dyn ThumbnailService>,
    pub policy: Arc<dyn ProxyPolicy>,
}

/// State guarded by the producer mutex.
pub(super) struct AssetState {
    pub(super) descriptor: Attrs,
    pub(super) clip_type: ClipType,
    pub(super) lifecycle: Lifecycle,
    pub(super) master: Option<Producer>,
    pub(super) cache: ProducerCache,
    pub(super) registry: Registry,
    pub(super) name: String,
    pub(super) date: Option<u64>,
    pub(super) duration: i32,
    /// Resource shown while a replacement is being prepared
    pub(super) temporary_url: Option<String>,
    /// Lazily derived from the master, reset on every rebuild
    pub(super) has_alpha: Option<bool>,
    pub(super) audio_channels: Option<u32>,
    pub(super) audio_levels: HashMap<i32, Vec<f32>>,
    pub(super) audio_thumb_created: bool,
    /// Hash dropped by an identity edit, kept until the rebuild stores a new one
    pub(super) previous_hash: Option<String>,
}

impl AssetState {
    pub(super) fn hash(&self) -> Option<&str> {
        self.descriptor.get_nonempty_str(A_FILE_HASH)
    }

    /// Proxy path set and not the "-" marker
    pub(super) fn proxy(&self) -> Option<&str> {
        self.descriptor.get_nonempty_str(A_PROXY).filter(|p| *p != "-")
    }

    pub(super) fn zone(&self) -> (i32, i32) {
        let zone_in = self.descriptor.get_i32_or(A_ZONE_IN, 0).max(0);
        let zone_out = self.descriptor.get_i32_or(A_ZONE_OUT, 0);
        if zone_out <= zone_in {
            (zone_in, (self.duration - 1).max(zone_in))
        } else {
            (zone_in, zone_out)
        }
    }
}

/// Kind of broadcast sent to every registered occurrence.
#[derive(Debug, Clone, Copy)]
pub(super) enum Broadcast<'a> {
    Reload(i32),
    Update(&'a [Role]),
}

pub struct Asset {
    pub(super) id: String,
    pub(super) state: Mutex<AssetState>,
    pub(super) thumbs: Mutex<VecDeque<i32>>,
    pub(super) effects: Arc<EffectStack>,
    pub(super) ctx: BinContext,
}

impl std::fmt::Debug for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Asset")
            .field("id", &self.id)
            .field("type", &state.clip_type)
            .field("status", &state.lifecycle.status())
            .field("occurrences", &state.registry.total_count())
            .finish()
    }
}

/// Display name derived from a resource path
fn name_from_resource(resource: Option<&str>) -> String {
    resource
        .and_then(|r| Path::new(r).file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl Asset {
    /// New asset in `Waiting` state. Nothing is loaded until `reload`.
    pub fn new(id: impl Into<String>, clip_type: ClipType, descriptor: Attrs, ctx: BinContext) -> Self {
        let name = descriptor
            .get_nonempty_str(A_CLIP_NAME)
            .map(str::to_string)
            .unwrap_or_else(|| name_from_resource(descriptor.get_str(A_RESOURCE)));
        let duration = descriptor
            .get_i32(A_DURATION)
            .or_else(|| descriptor.get_i32(A_LENGTH))
            .unwrap_or(0);
        Self {
            id: id.into(),
            state: Mutex::new(AssetState {
                descriptor,
                clip_type,
                lifecycle: Lifecycle::new(),
                master: None,
                cache: ProducerCache::new(),
                registry: Registry::new(),
                name,
                date: None,
                duration,
                temporary_url: None,
                has_alpha: None,
                audio_channels: None,
                audio_levels: HashMap::new(),
                audio_thumb_created: false,
                previous_hash: None,
            }),
            thumbs: Mutex::new(VecDeque::new()),
            effects: Arc::new(EffectStack::new()),
            ctx,
        }
    }

    pub(super) fn lock(&self) -> MutexGuard<'_, AssetState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- Accessors ---

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn clip_type(&self) -> ClipType {
        self.lock().clip_type
    }

    pub fn status(&self) -> ClipStatus {
        self.lock().lifecycle.status()
    }

    pub fn is_reloading(&self) -> bool {
        self.lock().lifecycle.is_reloading()
    }

    pub fn name(&self) -> String {
        self.lock().name.clone()
    }

    pub fn date(&self) -> Option<u64> {
        self.lock().date
    }

    /// Playable duration in frames
    pub fn duration(&self) -> i32 {
        self.lock().duration
    }

    pub fn temporary_url(&self) -> Option<String> {
        self.lock().temporary_url.clone()
    }

    /// Stored content hash, `None` until first computed
    pub fn hash(&self) -> Option<String> {
        self.lock().hash().map(str::to_string)
    }

    pub fn file_size(&self) -> Option<u64> {
        self.lock()
            .descriptor
            .get_str(A_FILE_SIZE)
            .and_then(|s| s.parse().ok())
    }

    pub fn proxy(&self) -> Option<String> {
        self.lock().proxy().map(str::to_string)
    }

    /// Snapshot of the descriptor
    pub fn descriptor(&self) -> Attrs {
        self.lock().descriptor.clone()
    }

    pub fn property(&self, key: &str) -> Option<String> {
        self.lock().descriptor.get(key).map(|v| v.to_prop_string())
    }

    /// Effect stack applied to every derived producer.
    pub fn effect_stack(&self) -> &Arc<EffectStack> {
        &self.effects
    }

    /// Number of derived producers currently cached
    pub fn cached_producer_count(&self) -> usize {
        self.lock().cache.len()
    }

    /// A cut of the master producer, `None` when not loaded.
    pub fn master_cut(&self) -> Option<Producer> {
        self.lock().master.as_ref().map(|m| m.cut())
    }

    /// Sub-clip zone `(in, out)`; an empty zone spans the whole clip.
    pub fn zone(&self) -> (i32, i32) {
        self.lock().zone()
    }

    /// Master has an alpha channel. Derived on first access after a rebuild.
    pub fn has_alpha(&self) -> bool {
        let mut state = self.lock();
        if let Some(v) = state.has_alpha {
            return v;
        }
        let alpha = state
            .master
            .as_ref()
            .and_then(|m| m.get_str(A_PIX_FMT))
            .is_some_and(|fmt| {
                let fmt = fmt.to_ascii_lowercase();
                fmt.contains("rgba") || fmt.contains("argb") || fmt.contains("bgra") || fmt.starts_with("yuva")
            });
        trace!("{}: has_alpha derived = {}", self.id, alpha);
        state.has_alpha = Some(alpha);
        alpha
    }

    /// Audio channel count. Derived on first access after a rebuild.
    pub fn audio_channels(&self) -> u32 {
        let mut state = self.lock();
        if let Some(v) = state.audio_channels {
            return v;
        }
        let channels = match &state.master {
            Some(m) if m.props().get_bool_or(A_HAS_AUDIO, false) => {
                m.get_i32(A_AUDIO_CHANNELS).map(|c| c.max(0) as u32).unwrap_or(2)
            }
            _ => 0,
        };
        state.audio_channels = Some(channels);
        channels
    }

    // --- Producer derivation ---

    /// Producer for a timeline occurrence. Assets that are not loaded serve
    /// the media-unavailable placeholder.
    pub fn get_timeline_producer(&self, req: &ProducerRequest) -> Producer {
        let mut guard = self.lock();
        let state = &mut *guard;
        if !state.lifecycle.status().is_loaded() {
            trace!("{}: {} asset, placeholder for clip {}", self.id, state.lifecycle.status(), req.clip_id);
            return ProducerCache::unavailable(state.duration);
        }
        let ctx = DeriveContext {
            clip_type: state.clip_type,
            duration: state.duration,
            descriptor: &state.descriptor,
            effects: self.effects.as_ref(),
        };
        state.cache.get_timeline_producer(state.master.as_ref(), &ctx, req)
    }

    /// Adopt a producer restored with a timeline. The first claimant of a
    /// parent keeps it as the cached derived producer and gets the handle
    /// back unchanged; later claimants receive an independent derivation
    /// trimmed like the handle they gave.
    pub fn adopt_timeline_producer(&self, handle: &Producer, req: &ProducerRequest) -> Producer {
        if !handle.is_valid() {
            return ProducerCache::unavailable(self.duration());
        }
        if handle.is_cut() {
            let mut state = self.lock();
            if state.cache.adopt(handle, req, self.effects.as_ref()) {
                return handle.clone();
            }
        }
        debug!("{}: producer for clip {} already claimed, deriving a new one", self.id, req.clip_id);
        let mut derived = self.get_timeline_producer(req);
        if handle.is_cut() && !derived.is_placeholder() {
            derived.set_in_and_out(handle.in_point(), handle.out_point());
        }
        derived
    }

    // --- Registration ---

    /// Record that `clip_id` on `timeline` uses this asset.
    ///
    /// # Panics
    /// If the occurrence is already registered.
    pub fn register_timeline_clip(&self, timeline: TimelineId, clip_id: ClipId) {
        let mut state = self.lock();
        state.registry.register(timeline, clip_id);
        debug_assert_eq!(state.registry.recount(), state.registry.total_count());
        trace!("{}: registered clip {} on {} (total {})", self.id, clip_id, timeline, state.registry.total_count());
    }

    /// Forget an occurrence and release the producers only it used.
    ///
    /// # Panics
    /// If the occurrence is not registered.
    pub fn deregister_timeline_clip(&self, timeline: TimelineId, clip_id: ClipId, was_audio: bool) {
        let mut state = self.lock();
        state.registry.deregister(timeline, clip_id);
        let evicted = state.cache.evict_clip((timeline, clip_id), was_audio, self.effects.as_ref());
        debug_assert_eq!(state.registry.recount(), state.registry.total_count());
        trace!("{}: deregistered clip {} on {} ({} producers released)", self.id, clip_id, timeline, evicted);
    }

    pub fn is_registered(&self, timeline: TimelineId, clip_id: ClipId) -> bool {
        self.lock().registry.contains(timeline, clip_id)
    }

    /// Occurrences in the current timeline
    pub fn current_count(&self) -> usize {
        match self.ctx.timelines.current() {
            Some(tl) => self.lock().registry.count(tl),
            None => 0,
        }
    }

    /// Occurrences across all timelines
    pub fn total_count(&self) -> usize {
        self.lock().registry.total_count()
    }

    pub fn timeline_count(&self, timeline: TimelineId) -> usize {
        self.lock().registry.count(timeline)
    }

    pub fn occurrences(&self) -> Vec<(TimelineId, ClipId)> {
        self.lock().registry.occurrences()
    }

    /// Drop every registration and derived producer. Used once timelines
    /// accepted deletion of all occurrences.
    pub(crate) fn release_all_occurrences(&self) {
        let mut state = self.lock();
        for (tl, clip_id) in state.registry.occurrences() {
            state.registry.deregister(tl, clip_id);
        }
        state.cache.clear_all(self.effects.as_ref());
    }

    // --- Broadcast ---

    /// Send `op` to every occurrence. Dead timelines are logged and skipped.
    /// Returns the number of occurrences reached.
    pub(super) fn broadcast(&self, occurrences: &[(TimelineId, ClipId)], op: Broadcast<'_>) -> usize {
        let mut reached = 0;
        for (tl_id, clip_id) in occurrences {
            let Some(timeline) = self.ctx.timelines.get(*tl_id) else {
                warn!("{}: timeline {} is gone, clip {} not notified", self.id, tl_id, clip_id);
                continue;
            };
            match op {
                Broadcast::Reload(duration) => {
                    if !timeline.request_clip_reload(*clip_id, duration) {
                        warn!("{}: timeline {} refused reload of clip {}", self.id, tl_id, clip_id);
                        continue;
                    }
                }
                Broadcast::Update(roles) => timeline.request_clip_update(*clip_id, roles),
            }
            reached += 1;
        }
        reached
    }

    /// Ask every timeline to replace its occurrences' producers.
    pub fn reload_in_timelines(&self) -> usize {
        let (occurrences, duration) = {
            let state = self.lock();
            (state.registry.occurrences(), state.duration)
        };
        self.broadcast(&occurrences, Broadcast::Reload(duration))
    }

    /// Ask every timeline to refresh `roles` of its occurrences.
    pub fn update_timeline_clips(&self, roles: &[Role]) -> usize {
        if roles.is_empty() {
            return 0;
        }
        let occurrences = self.lock().registry.occurrences();
        self.broadcast(&occurrences, Broadcast::Update(roles))
    }

    /// Notify model and timelines of changed roles.
    pub(super) fn notify_roles(&self, roles: &[Role]) {
        if roles.is_empty() {
            return;
        }
        self.ctx.model.on_item_updated(&self.id, roles);
        self.update_timeline_clips(roles);
    }

    /// Delete every occurrence through its timeline as one undoable edit.
    ///
    /// # Panics
    /// If a timeline holding an occurrence no longer exists: bulk deletion
    /// runs while the coordinator keeps all timelines alive.
    pub fn self_soft_delete(&self, undo: &mut UndoGroup) -> bool {
        let occurrences = self.occurrences();
        for (tl_id, clip_id) in &occurrences {
            let timeline = self.ctx.timelines.get(*tl_id).unwrap_or_else(|| {
                panic!("timeline {} unreachable while deleting clip {} of {}", tl_id, clip_id, self.id)
            });
            if !timeline.request_item_deletion(*clip_id, undo) {
                warn!("{}: deletion of clip {} refused by timeline {}", self.id, clip_id, tl_id);
                return false;
            }
        }
        debug!("{}: {} occurrences deleted", self.id, occurrences.len());
        true
    }

    // --- Thumbnails ---

    /// Queue frames for thumbnail extraction and submit a job for them.
    /// Already queued or cached frames are dropped. Returns frames queued.
    pub fn request_thumbnails(&self, frames: &[i32]) -> usize {
        let added = {
            let mut queue = self.thumbs.lock().unwrap_or_else(|e| e.into_inner());
            let mut added = 0;
            for frame in frames {
                if queue.contains(frame) || self.ctx.thumbs.has_thumbnail(&self.id, *frame) {
                    continue;
                }
                queue.push_back(*frame);
                added += 1;
            }
            added
        };
        if added > 0 {
            self.dispatch_thumbnails();
        }
        added
    }

    /// Drain the pending thumbnail frames.
    pub fn take_thumbnail_requests(&self) -> Vec<i32> {
        self.thumbs.lock().unwrap_or_else(|e| e.into_inner()).drain(..).collect()
    }

    /// Submit queued frames as one Thumb job once the asset is loaded.
    pub(super) fn dispatch_thumbnails(&self) {
        let params = {
            let state = self.lock();
            if !state.lifecycle.status().is_loaded() {
                return;
            }
            JobParams::new(state.descriptor.clone(), state.clip_type)
        };
        let frames = self.take_thumbnail_requests();
        if frames.is_empty() {
            return;
        }
        self.ctx.tasks.start_job(JobKind::Thumb, &self.id, params.with_frames(frames));
    }

    /// Thumbnail job result.
    pub fn on_thumbnail_ready(&self, frame: i32, image: Thumbnail) {
        self.ctx.thumbs.store_thumbnail(&self.id, frame, image);
        if frame == self.zone().0 {
            self.ctx.model.on_item_updated(&self.id, &[Role::Thumbnail]);
        }
    }

    pub fn thumbnail(&self, frame: i32) -> Option<Thumbnail> {
        self.ctx.thumbs.get_thumbnail(&self.id, frame)
    }

    // --- Audio levels ---

    pub fn on_audio_levels_ready(&self, stream: i32, levels: Vec<f32>) {
        {
            let mut state = self.lock();
            state.audio_levels.insert(stream, levels);
            state.audio_thumb_created = true;
        }
        self.ctx.model.on_item_updated(&self.id, &[Role::Thumbnail]);
    }

    pub fn audio_levels(&self, stream: i32) -> Option<Vec<f32>> {
        self.lock().audio_levels.get(&stream).cloned()
    }

    pub fn audio_thumb_created(&self) -> bool {
        self.lock().audio_thumb_created
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Asset wired to recording collaborators.

    use super::*;
    use crate::config::{BinSettings, DocumentPolicy};
    use crate::core::jobs::testing::RecordingTasks;
    use crate::core::thumbs::ThumbnailCache;
    use crate::entities::timeline::testing::RecordingTimeline;
    use crate::entities::timeline::TimelineInstance;
    use std::path::PathBuf;

    #[derive(Default)]
    pub struct RecordingModel {
        pub updates: Mutex<Vec<(String, Vec<Role>)>>,
        pub watched: Mutex<Vec<(String, Option<String>)>>,
    }

    impl RecordingModel {
        pub fn roles(&self) -> Vec<Role> {
            self.updates.lock().unwrap().iter().flat_map(|(_, r)| r.clone()).collect()
        }
    }

    impl ProjectItemModel for RecordingModel {
        fn on_item_updated(&self, asset_id: &str, roles: &[Role]) {
            self.updates.lock().unwrap().push((asset_id.to_string(), roles.to_vec()));
        }

        fn update_watcher(&self, asset_id: &str, resource: Option<&str>) {
            self.watched
                .lock()
                .unwrap()
                .push((asset_id.to_string(), resource.map(str::to_string)));
        }
    }

    pub struct Harness {
        pub tasks: Arc<RecordingTasks>,
        pub model: Arc<RecordingModel>,
        pub thumbs: Arc<ThumbnailCache>,
        pub timelines: Arc<TimelineDirectory>,
        pub ctx: BinContext,
    }

    impl Harness {
        pub fn new(cache_root: PathBuf) -> Self {
            Self::with_settings(BinSettings::default(), cache_root)
        }

        pub fn with_settings(settings: BinSettings, cache_root: PathBuf) -> Self {
            let tasks = Arc::new(RecordingTasks::default());
            let model = Arc::new(RecordingModel::default());
            let thumbs = Arc::new(ThumbnailCache::new(64));
            let timelines = Arc::new(TimelineDirectory::new());
            let ctx = BinContext {
                tasks: tasks.clone(),
                timelines: timelines.clone(),
                model: model.clone(),
                thumbs: thumbs.clone(),
                policy: Arc::new(DocumentPolicy::new(settings, cache_root)),
            };
            Self {
                tasks,
                model,
                thumbs,
                timelines,
                ctx,
            }
        }

        pub fn timeline(&self) -> Arc<RecordingTimeline> {
            let tl = RecordingTimeline::new();
            let as_dyn: Arc<dyn TimelineInstance> = tl.clone();
            self.timelines.insert(&as_dyn);
            tl
        }
    }
}
