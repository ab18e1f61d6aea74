//! Bin: the set of imported assets and the glue to background jobs.
//!
//! The bin owns the job manager and drains its events on the caller's
//! thread (`process_job_events`), so asset callbacks never run on workers.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use log::{debug, info, trace, warn};

use super::asset::{Asset, BinContext};
use super::attrs::Attrs;
use super::clip_type::ClipType;
use super::factory::ResourceProbe;
use super::keys::*;
use super::model::BusModel;
use super::timeline::{TimelineDirectory, TimelineInstance, UndoGroup};
use crate::config::{BinSettings, DocumentPolicy};
use crate::core::event_bus::EventBus;
use crate::core::jobs::{JobEvent, JobHandler, JobKind, JobManager, JobOutput, JobStatus, MediaJobHandler, TaskManager};
use crate::core::thumbs::ThumbnailCache;
use crate::core::workers::{WorkerPool, Workers};
use crate::entities::producer_cache::CacheStats;

/// Emitted after an asset was added to the bin
#[derive(Debug, Clone, PartialEq)]
pub struct AssetAddedEvent {
    pub asset_id: String,
    pub clip_type: ClipType,
}

/// Emitted after an asset left the bin
#[derive(Debug, Clone, PartialEq)]
pub struct AssetRemovedEvent {
    pub asset_id: String,
}

pub struct Bin {
    assets: RwLock<IndexMap<String, Arc<Asset>>>,
    ctx: BinContext,
    jobs: Arc<JobManager>,
    thumbs: Arc<ThumbnailCache>,
    bus: EventBus,
    next_id: AtomicU64,
}

impl std::fmt::Debug for Bin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bin")
            .field("assets", &self.len())
            .field("pending_jobs", &self.jobs.pending_count())
            .finish()
    }
}

impl Bin {
    /// Bin with a worker pool sized from `settings` and caches under `cache_root`.
    pub fn new(settings: BinSettings, cache_root: impl Into<std::path::PathBuf>) -> Result<Self> {
        let handler = Arc::new(MediaJobHandler::new(Arc::new(ResourceProbe::new())));
        Self::with_handler(settings, cache_root, handler)
    }

    /// Bin running its background jobs through `handler`.
    pub fn with_handler(
        settings: BinSettings,
        cache_root: impl Into<std::path::PathBuf>,
        handler: Arc<dyn JobHandler>,
    ) -> Result<Self> {
        let workers = Workers::new(settings.workers).context("Failed to start worker pool")?;
        let pool: Arc<dyn WorkerPool> = Arc::new(workers);
        let jobs = Arc::new(JobManager::new(pool, handler));
        let thumbs = Arc::new(ThumbnailCache::new(settings.thumb_cache_entries));
        let bus = EventBus::new();
        let ctx = BinContext {
            tasks: jobs.clone(),
            timelines: Arc::new(TimelineDirectory::new()),
            model: Arc::new(BusModel::new(bus.emitter())),
            thumbs: thumbs.clone(),
            policy: Arc::new(DocumentPolicy::new(settings, cache_root.into())),
        };
        info!("Bin created");
        Ok(Self {
            assets: RwLock::new(IndexMap::new()),
            ctx,
            jobs,
            thumbs,
            bus,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn timelines(&self) -> &Arc<TimelineDirectory> {
        &self.ctx.timelines
    }

    /// Make a timeline reachable for broadcasts.
    pub fn register_timeline(&self, timeline: &Arc<dyn TimelineInstance>) {
        self.ctx.timelines.insert(timeline);
    }

    pub fn thumbnail_stats(&self) -> &CacheStats {
        self.thumbs.stats()
    }

    pub fn pending_jobs(&self) -> usize {
        self.jobs.pending_count()
    }

    // --- Assets ---

    /// Import a media file and start loading it.
    pub fn import(&self, path: impl AsRef<Path>) -> Arc<Asset> {
        let path = path.as_ref();
        let mut descriptor = Attrs::new();
        descriptor.set_str(A_RESOURCE, path.to_string_lossy());
        self.add_asset(ClipType::from_path(path), descriptor)
    }

    /// Add an asset built from `descriptor` and start loading it.
    pub fn add_asset(&self, clip_type: ClipType, mut descriptor: Attrs) -> Arc<Asset> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        descriptor.set_str(A_TYPE, clip_type.as_tag().to_string());
        let asset = Arc::new(Asset::new(id.clone(), clip_type, descriptor, self.ctx.clone()));
        self.assets
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), asset.clone());
        debug!("asset {} added ({})", id, clip_type);
        self.bus.emit(AssetAddedEvent { asset_id: id, clip_type });
        asset.reload(false, false, false);
        asset
    }

    pub fn get(&self, id: &str) -> Option<Arc<Asset>> {
        self.assets.read().unwrap_or_else(|e| e.into_inner()).get(id).cloned()
    }

    /// Assets in insertion order
    pub fn assets(&self) -> Vec<Arc<Asset>> {
        self.assets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.assets.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delete an asset with all its timeline occurrences as one undoable edit.
    ///
    /// Returns false (and keeps the asset) if a timeline refused a deletion.
    pub fn remove(&self, id: &str, undo: &mut UndoGroup) -> bool {
        let Some(asset) = self.get(id) else {
            warn!("remove: unknown asset {}", id);
            return false;
        };
        if !asset.self_soft_delete(undo) {
            return false;
        }
        asset.release_all_occurrences();
        self.jobs.discard_jobs(id, None, true);
        self.thumbs_invalidate(id);
        self.assets
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .shift_remove(id);
        info!("asset {} removed", id);
        self.bus.emit(AssetRemovedEvent { asset_id: id.to_string() });
        true
    }

    fn thumbs_invalidate(&self, id: &str) {
        let dropped = self.ctx.thumbs.invalidate(id);
        trace!("{} thumbnails of {} dropped", dropped, id);
    }

    // --- Jobs ---

    /// Deliver finished job results to their assets. Returns events handled.
    pub fn process_job_events(&self) -> usize {
        let events = self.jobs.take_events();
        let count = events.len();
        for event in events {
            self.dispatch(event);
        }
        count
    }

    fn dispatch(&self, event: JobEvent) {
        let Some(asset) = self.get(&event.asset_id) else {
            debug!("job {} for removed asset {} ignored", event.kind, event.asset_id);
            return;
        };
        match (event.kind, event.status) {
            (_, JobStatus::Pending | JobStatus::Running) => {
                trace!("job {} {} for {} in progress", event.id, event.kind, event.asset_id);
            }
            (JobKind::Load, JobStatus::Done(JobOutput::Producer(producer))) => {
                asset.set_producer(producer, true);
            }
            (JobKind::Load, JobStatus::Failed(e)) => asset.on_load_failed(&e.to_string()),
            (JobKind::Load, JobStatus::Cancelled) => asset.on_load_cancelled(),
            (JobKind::Thumb | JobKind::Cache, JobStatus::Done(JobOutput::Thumbnails(images))) => {
                for (frame, image) in images {
                    asset.on_thumbnail_ready(frame, image);
                }
            }
            (JobKind::AudioLevels, JobStatus::Done(JobOutput::AudioLevels { stream, levels })) => {
                asset.on_audio_levels_ready(stream, levels);
            }
            (JobKind::Proxy, JobStatus::Done(JobOutput::Proxy(path))) => asset.on_proxy_ready(&path),
            (JobKind::Proxy, JobStatus::Failed(e)) => asset.on_proxy_failed(&e.to_string()),
            (kind, JobStatus::Failed(e)) => warn!("{} job for {} failed: {}", kind, event.asset_id, e),
            (kind, JobStatus::Cancelled) => debug!("{} job for {} cancelled", kind, event.asset_id),
            (kind, JobStatus::Done(output)) => {
                warn!("{} job for {} returned unexpected {:?}", kind, event.asset_id, output);
            }
        }
    }

    /// Process events until no job is left or `timeout` elapsed.
    /// Returns true when the bin went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            // Jobs report before leaving the pending set
            let idle = self.jobs.pending_count() == 0;
            let handled = self.process_job_events();
            if idle && handled == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                warn!("bin not idle after {:?}: {} jobs pending", timeout, self.jobs.pending_count());
                return false;
            }
            thread::sleep(Duration::from_millis(2));
        }
    }
}
