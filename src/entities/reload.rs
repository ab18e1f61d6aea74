//! Reload/replace orchestration of an [`Asset`].
//!
//! Flow:
//! - `reload` cancels background work and submits a Load job (or only
//!   refreshes thumbnails)
//! - the Load result arrives as `set_producer` or `on_load_failed`
//! - `set_producer` swaps the master, diffs visible roles and tells the
//!   model and every timeline
//!
//! The reloading flag is held from `reload` until the result is applied;
//! a second reload in that window is coalesced.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use log::{debug, info, warn};

use super::asset::{Asset, AssetState};
use super::attrs::{AttrValue, Attrs};
use super::clip_type::ClipType;
use super::handle::Producer;
use super::keys::*;
use super::status::{ClipStatus, StatusError};
use super::timeline::Role;
use crate::config::CacheKind;
use crate::core::jobs::{JobKind, JobParams};

/// Outcome of a property edit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyChange {
    /// Roles reported to the model
    pub roles: Vec<Role>,
    /// `Some(refresh_only)` when a reload was requested
    pub reload: Option<bool>,
    /// Pass-through keys forwarded to derived producers
    pub forwarded: Vec<String>,
    pub proxy_job: bool,
}

/// Proxy follow-up decided under the lock, run after it.
enum ProxyAction {
    None,
    /// Generate the proxy file at this path
    Generate(PathBuf),
    /// Use an existing proxy file
    Swap(PathBuf),
    /// Regenerate the current proxy over its old file
    Rebuild(PathBuf),
    /// Proxy dropped; pending generation is cancelled and, if the original
    /// was restored, the master rebuilt
    Restore { reload: bool },
}

/// Merge a reload request; a full rebuild wins over a refresh.
fn request_reload(current: &mut Option<bool>, refresh_only: bool) {
    *current = Some(current.is_none_or(|r| r) && refresh_only);
}

fn modification_date(resource: Option<&str>) -> Option<u64> {
    let meta = fs::metadata(resource?).ok()?;
    meta.modified()
        .ok()?
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}

impl Asset {
    /// Rebuild the master producer, or with `refresh_only` just its thumbnails.
    ///
    /// Returns false when the request was coalesced into a reload already in
    /// progress. A coalesced request cancels nothing.
    pub fn reload(&self, refresh_only: bool, is_proxy_swap: bool, force_audio_reload: bool) -> bool {
        if refresh_only {
            for kind in [JobKind::Thumb, JobKind::Cache] {
                self.ctx.tasks.discard_jobs(&self.id, Some(kind), true);
            }
            self.ctx.thumbs.invalidate(&self.id);
            let frame = self.zone().0;
            self.request_thumbnails(&[frame]);
            debug!("{}: thumbnails refreshed", self.id);
            return true;
        }

        let (params, status_changed, discard_audio) = {
            let mut state = self.lock();
            match state.lifecycle.begin_reload() {
                Ok(()) => {}
                Err(StatusError::AlreadyReloading) => {
                    debug!("{}: reload already in progress, coalesced", self.id);
                    return false;
                }
                Err(e) => {
                    warn!("{}: {}", self.id, e);
                    return false;
                }
            }

            let mut discard_audio = force_audio_reload;
            if state.clip_type.has_audio_stream() {
                let stale = match (state.hash(), state.previous_hash.as_deref()) {
                    // Identity edited since the last build
                    (None, Some(previous)) => self.fresh_hash(&state).as_deref() != Some(previous),
                    (Some(current), _) if !is_proxy_swap => {
                        self.fresh_hash(&state).is_some_and(|fresh| fresh != current)
                    }
                    _ => false,
                };
                if stale {
                    debug!("{}: content changed, audio thumbnails are stale", self.id);
                    discard_audio = true;
                }
            }

            // Missing stays Missing until the rebuild succeeds
            let prev = state.lifecycle.status();
            if prev != ClipStatus::Missing {
                let _ = state.lifecycle.transition(ClipStatus::Waiting);
            }
            let mut params = JobParams::new(state.descriptor.clone(), state.clip_type);
            params.force_audio_reload = force_audio_reload;
            (params, prev != state.lifecycle.status(), discard_audio)
        };

        // Work on the previous master is superseded
        for kind in [JobKind::Load, JobKind::Thumb, JobKind::Cache] {
            self.ctx.tasks.discard_jobs(&self.id, Some(kind), true);
        }
        if discard_audio {
            self.discard_audio_thumb();
        }
        self.ctx.tasks.start_job(JobKind::Load, &self.id, params);
        if status_changed {
            self.notify_roles(&[Role::Status]);
        }
        info!("{}: reload started (proxy swap: {})", self.id, is_proxy_swap);
        true
    }

    fn fresh_hash(&self, state: &AssetState) -> Option<String> {
        self.ctx
            .thumbs
            .compute_hash(state.clip_type, &state.descriptor)
            .map(|h| h.hex)
    }

    /// Install a freshly built master producer.
    ///
    /// With `clear_track_producers` every derived producer is dropped;
    /// otherwise only audio and warp producers are, since they carry data
    /// of the previous master.
    pub fn set_producer(&self, producer: Producer, clear_track_producers: bool) -> bool {
        if !producer.is_valid() {
            self.on_load_failed(&format!("invalid producer for {}", producer.resource().unwrap_or_default()));
            return false;
        }

        let (roles, resource, width, clip_type, auto_proxy_hash, has_levels, zone_in) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let old = (state.name.clone(), state.date, state.duration, state.lifecycle.status());

            // A new producer means the resource resolves again
            if !state.lifecycle.is_reloading() {
                let _ = state.lifecycle.begin_reload();
            }

            for key in [A_WIDTH, A_HEIGHT, A_HAS_AUDIO, A_HAS_VIDEO, A_AUDIO_CHANNELS, A_PIX_FMT, A_FPS] {
                if let Some(value) = producer.props().get(key)
                    && !state.descriptor.contains(key)
                {
                    state.descriptor.set(key, value.clone());
                }
            }
            state.duration = state
                .descriptor
                .get_i32(A_DURATION)
                .filter(|d| *d > 0)
                .unwrap_or_else(|| producer.length());
            if state.descriptor.get_nonempty_str(A_CLIP_NAME).is_none() {
                let resource = state
                    .descriptor
                    .get_nonempty_str(A_ORIGINAL_URL)
                    .or_else(|| state.descriptor.get_nonempty_str(A_RESOURCE))
                    .map(str::to_string);
                state.name = resource
                    .as_deref()
                    .and_then(|r| Path::new(r).file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| state.name.clone());
            }
            if state.clip_type.is_file_backed() {
                state.date = modification_date(state.descriptor.get_str(A_RESOURCE));
            }

            let status = Self::loaded_status(state);
            if let Err(e) = state.lifecycle.transition(status) {
                warn!("{}: {}", self.id, e);
            }
            state.lifecycle.end_reload();

            state.master = Some(producer);
            state.temporary_url = None;
            state.has_alpha = None;
            state.audio_channels = None;

            let evicted = if clear_track_producers {
                state.cache.clear_all(self.effects.as_ref())
            } else {
                state.cache.clear_audio_and_warp(self.effects.as_ref())
            };
            if evicted > 0 {
                debug!("{}: {} derived producers evicted", self.id, evicted);
            }

            // Failing to hash leaves the previous value in place
            if let Some(hash) = self.ctx.thumbs.compute_hash(state.clip_type, &state.descriptor) {
                state.previous_hash = None;
                state.descriptor.set_str(A_FILE_HASH, hash.hex);
                if let Some(size) = hash.file_size {
                    state.descriptor.set_str(A_FILE_SIZE, size.to_string());
                }
            }

            let mut roles = Vec::new();
            if old.0 != state.name {
                roles.push(Role::Name);
            }
            if old.1 != state.date {
                roles.push(Role::Date);
            }
            if old.2 != state.duration {
                roles.push(Role::Duration);
            }
            if old.3 != state.lifecycle.status() {
                roles.push(Role::Status);
            }

            let auto_proxy_hash = (state.proxy().is_none() && state.lifecycle.status() == ClipStatus::Ready)
                .then(|| state.hash().unwrap_or(self.id.as_str()).to_string());
            (
                roles,
                state.descriptor.get_str(A_RESOURCE).map(str::to_string),
                state.descriptor.get_u32(A_WIDTH).unwrap_or(0),
                state.clip_type,
                auto_proxy_hash,
                !state.audio_levels.is_empty(),
                state.zone().0,
            )
        };

        self.ctx.model.update_watcher(&self.id, resource.as_deref());
        self.reload_in_timelines();
        self.notify_roles(&roles);

        if let Some(hash) = auto_proxy_hash
            && self.ctx.policy.auto_generate_proxy(clip_type, width)
            && !self.ctx.tasks.has_pending_job(&self.id, Some(JobKind::Proxy))
        {
            let output = self.proxy_path(clip_type, &hash);
            info!("{}: generating proxy {}", self.id, output.display());
            let params = JobParams::new(self.descriptor(), clip_type).with_output(output);
            self.ctx.tasks.start_job(JobKind::Proxy, &self.id, params);
        }

        // Frames queued while loading go out with this request
        if self.request_thumbnails(&[zone_in]) == 0 {
            self.dispatch_thumbnails();
        }
        if clip_type.has_audio_stream()
            && !has_levels
            && !self.ctx.tasks.has_pending_job(&self.id, Some(JobKind::AudioLevels))
        {
            let params = JobParams::new(self.descriptor(), clip_type).with_stream(0);
            self.ctx.tasks.start_job(JobKind::AudioLevels, &self.id, params);
        }
        true
    }

    fn loaded_status(state: &AssetState) -> ClipStatus {
        let Some(proxy) = state.proxy() else {
            return ClipStatus::Ready;
        };
        if state.descriptor.get_str(A_RESOURCE) != Some(proxy) {
            return ClipStatus::Ready;
        }
        match state.descriptor.get_nonempty_str(A_ORIGINAL_URL) {
            Some(original) if Path::new(original).exists() || !state.clip_type.is_file_backed() => ClipStatus::Proxy,
            _ => ClipStatus::ProxyOnly,
        }
    }

    fn proxy_path(&self, clip_type: ClipType, hash: &str) -> PathBuf {
        let ext = if clip_type == ClipType::Image { "png" } else { "mkv" };
        self.ctx
            .policy
            .cache_dir(CacheKind::Proxy)
            .join(format!("{}.{}", hash, ext))
    }

    /// The master could not be built. An active proxy first falls back to
    /// the original resource; otherwise the asset becomes `Missing`.
    pub fn on_load_failed(&self, reason: &str) {
        let fallback = {
            let mut state = self.lock();
            let original = state.descriptor.get_nonempty_str(A_ORIGINAL_URL).map(str::to_string);
            match (state.proxy().map(str::to_string), original) {
                (Some(proxy), Some(original)) if state.descriptor.get_str(A_RESOURCE) == Some(proxy.as_str()) => {
                    warn!("{}: proxy {} unusable ({}), trying original {}", self.id, proxy, reason, original);
                    state.descriptor.set_str(A_RESOURCE, original.clone());
                    state.descriptor.remove(A_PROXY);
                    state.descriptor.remove(A_ORIGINAL_URL);
                    state.temporary_url = Some(original);
                    if !state.lifecycle.is_reloading() {
                        let _ = state.lifecycle.begin_reload();
                    }
                    Some(JobParams::new(state.descriptor.clone(), state.clip_type))
                }
                _ => {
                    warn!("{}: media missing: {}", self.id, reason);
                    let _ = state.lifecycle.transition(ClipStatus::Missing);
                    state.lifecycle.end_reload();
                    state.master = None;
                    state.cache.clear_all(self.effects.as_ref());
                    None
                }
            }
        };

        match fallback {
            Some(params) => {
                self.ctx.tasks.start_job(JobKind::Load, &self.id, params);
                self.notify_roles(&[Role::Resource]);
            }
            None => self.notify_roles(&[Role::Status]),
        }
    }

    /// A Load job was cancelled. The reloading flag is released unless a
    /// newer Load already replaced it.
    pub fn on_load_cancelled(&self) {
        if self.ctx.tasks.has_pending_job(&self.id, Some(JobKind::Load)) {
            return;
        }
        self.lock().lifecycle.end_reload();
    }

    /// Apply descriptor edits and trigger what they require.
    ///
    /// A proxied asset needing a reload rebuilds its proxy instead; the
    /// swap to the new proxy reloads it.
    pub fn set_properties(&self, props: &Attrs) -> PropertyChange {
        let mut change = PropertyChange::default();
        let mut proxy_action = ProxyAction::None;

        {
            let mut guard = self.lock();
            let state = &mut *guard;

            if props.iter().any(|(k, _)| IDENTITY_KEYS.contains(&k.as_str())) {
                if let Some(old) = state.descriptor.remove(A_FILE_HASH)
                    && state.previous_hash.is_none()
                {
                    state.previous_hash = Some(old.to_prop_string());
                }
                state.descriptor.remove(A_FILE_SIZE);
            }

            for (key, value) in props.iter() {
                let key = key.as_str();
                if key == A_PROXY {
                    proxy_action = self.proxy_edit(state, &value.to_prop_string());
                    continue;
                }
                match state.proxy().map(str::to_string) {
                    // New original of a proxied asset; the proxy keeps playing until rebuilt
                    Some(proxy) if key == A_RESOURCE => {
                        let playing_proxy = state.descriptor.get_str(A_RESOURCE) == Some(proxy.as_str());
                        state.descriptor.set(A_ORIGINAL_URL, value.clone());
                        if !playing_proxy {
                            state.descriptor.set(key, value.clone());
                        }
                    }
                    _ => state.descriptor.set(key, value.clone()),
                }

                if PASS_PROPERTIES.contains(&key) {
                    state.cache.apply_property(key, value);
                    if let Some(master) = &state.master {
                        master.set(key, value.clone());
                    }
                    change.forwarded.push(key.to_string());
                    request_reload(&mut change.reload, true);
                }
                if state.clip_type == ClipType::SlideShow && SLIDESHOW_RELOAD_KEYS.contains(&key) {
                    request_reload(&mut change.reload, false);
                }
                match key {
                    A_RESOURCE | A_TEMPLATE_TEXT | A_AUTOROTATE => {
                        // Color producers pick up a new color in place
                        if state.clip_type == ClipType::Color {
                            if let Some(master) = &state.master {
                                master.set(key, value.clone());
                            }
                            change.roles.push(Role::Resource);
                            request_reload(&mut change.reload, true);
                        } else {
                            request_reload(&mut change.reload, false);
                        }
                    }
                    A_XMLDATA => request_reload(&mut change.reload, false),
                    A_LENGTH | A_DURATION => {
                        if let Some(frames) = props.get_i32(key) {
                            state.duration = frames;
                        }
                        change.roles.push(Role::Duration);
                        request_reload(&mut change.reload, false);
                    }
                    A_CLIP_NAME => {
                        state.name = value.to_prop_string();
                        change.roles.push(Role::Name);
                    }
                    _ => {}
                }
            }

            if change.reload.is_some()
                && matches!(proxy_action, ProxyAction::None)
                && let Some(proxy) = state.proxy().map(PathBuf::from)
            {
                state.descriptor.set(A_OVERWRITE_PROXY, AttrValue::Bool(true));
                proxy_action = ProxyAction::Rebuild(proxy);
            }
        }
        change.roles.dedup();

        let mut reloaded = false;
        match proxy_action {
            ProxyAction::None => {}
            ProxyAction::Generate(output) => {
                let params = JobParams::new(self.descriptor(), self.clip_type()).with_output(output);
                self.ctx.tasks.start_job(JobKind::Proxy, &self.id, params);
                change.proxy_job = true;
            }
            ProxyAction::Rebuild(output) => {
                self.ctx.tasks.discard_jobs(&self.id, Some(JobKind::Proxy), true);
                info!("{}: rebuilding proxy {}", self.id, output.display());
                let params = JobParams::new(self.descriptor(), self.clip_type()).with_output(output);
                self.ctx.tasks.start_job(JobKind::Proxy, &self.id, params);
                change.proxy_job = true;
                reloaded = true;
            }
            ProxyAction::Swap(path) => {
                self.on_proxy_ready(&path);
                request_reload(&mut change.reload, false);
                reloaded = true;
            }
            ProxyAction::Restore { reload } => {
                self.ctx.tasks.discard_jobs(&self.id, Some(JobKind::Proxy), true);
                if reload {
                    self.reload(false, true, false);
                    request_reload(&mut change.reload, false);
                    reloaded = true;
                }
            }
        }

        self.notify_roles(&change.roles);
        if let Some(refresh_only) = change.reload
            && !reloaded
        {
            self.reload(refresh_only, false, false);
        }
        change
    }

    /// Decide what a `proxy` edit needs. Runs under the state lock.
    fn proxy_edit(&self, state: &mut AssetState, value: &str) -> ProxyAction {
        if value.is_empty() || value == "-" {
            state.descriptor.set_str(A_PROXY, "-");
            state.descriptor.remove(A_OVERWRITE_PROXY);
            let Some(original) = state.descriptor.get_nonempty_str(A_ORIGINAL_URL).map(str::to_string) else {
                return ProxyAction::Restore { reload: false };
            };
            info!("{}: proxy dropped, back to {}", self.id, original);
            state.descriptor.set_str(A_RESOURCE, original);
            state.descriptor.remove(A_ORIGINAL_URL);
            return ProxyAction::Restore { reload: true };
        }

        if !self.ctx.policy.proxy_enabled() || !state.clip_type.supports_proxy() {
            debug!("{}: proxy not allowed for {}", self.id, state.clip_type);
            return ProxyAction::None;
        }
        if state.descriptor.get_nonempty_str(A_ORIGINAL_URL).is_none()
            && let Some(resource) = state.descriptor.get_nonempty_str(A_RESOURCE).map(str::to_string)
        {
            state.descriptor.set_str(A_ORIGINAL_URL, resource);
        }
        state.descriptor.set_str(A_PROXY, value);
        let path = PathBuf::from(value);
        if path.exists() && !state.descriptor.get_bool_or(A_OVERWRITE_PROXY, false) {
            ProxyAction::Swap(path)
        } else {
            ProxyAction::Generate(path)
        }
    }

    /// Proxy file is ready: substitute it and rebuild.
    pub fn on_proxy_ready(&self, path: &Path) {
        {
            let mut state = self.lock();
            let proxy = path.to_string_lossy().into_owned();
            if state.descriptor.get_nonempty_str(A_ORIGINAL_URL).is_none()
                && let Some(resource) = state.descriptor.get_nonempty_str(A_RESOURCE).map(str::to_string)
            {
                state.descriptor.set_str(A_ORIGINAL_URL, resource);
            }
            state.descriptor.set_str(A_PROXY, proxy.clone());
            state.descriptor.set_str(A_RESOURCE, proxy);
            state.descriptor.remove(A_OVERWRITE_PROXY);
        }
        info!("{}: switching to proxy {}", self.id, path.display());
        self.reload(false, true, false);
    }

    /// Proxy generation failed; the asset keeps its current master.
    pub fn on_proxy_failed(&self, reason: &str) {
        warn!("{}: proxy generation failed: {}", self.id, reason);
    }

    /// Replace the resource, as after an external file swap.
    pub fn set_resource(&self, resource: &str) -> PropertyChange {
        let mut props = Attrs::new();
        props.set(A_RESOURCE, AttrValue::Str(resource.to_string()));
        self.set_properties(&props)
    }

    // --- Audio thumbnails ---

    /// Cache file of the audio thumbnail:
    /// `<cache>/audio/<hash>[_<stream>]_<fps>_audio.png`
    pub fn audio_thumb_path(&self, stream: Option<i32>) -> Option<PathBuf> {
        let state = self.lock();
        // Files of the content being replaced are named after its hash
        let hash = state.hash().or(state.previous_hash.as_deref())?;
        let fps = state.descriptor.get_f64(A_FPS).unwrap_or(25.0);
        let name = match stream {
            Some(s) => format!("{}_{}_{}_audio.png", hash, s, fps),
            None => format!("{}_{}_audio.png", hash, fps),
        };
        Some(self.ctx.policy.cache_dir(CacheKind::Audio).join(name))
    }

    /// Drop stale audio thumbnail data: levels, cache files and pending jobs.
    /// Returns the number of cache files removed.
    pub fn discard_audio_thumb(&self) -> usize {
        let streams: Vec<i32> = {
            let mut state = self.lock();
            state.audio_thumb_created = false;
            state.audio_levels.drain().map(|(s, _)| s).collect()
        };
        self.ctx.tasks.discard_jobs(&self.id, Some(JobKind::AudioLevels), false);

        let mut paths: Vec<PathBuf> = streams.iter().filter_map(|s| self.audio_thumb_path(Some(*s))).collect();
        paths.extend(self.audio_thumb_path(None));
        let removed = paths.iter().filter(|p| fs::remove_file(p).is_ok()).count();
        debug!("{}: audio thumbnails discarded ({} files)", self.id, removed);
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BinSettings;
    use crate::core::jobs::TaskManager;
    use crate::entities::asset::testing::Harness;
    use crate::entities::hash::digest_hex;
    use crate::entities::producer_cache::ProducerRequest;
    use crate::entities::timeline::{ClipState, TrackKey};
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn media_file(dir: &TempDir, name: &str, bytes: &[u8]) -> String {
        let path = dir.path().join(name);
        File::create(&path).unwrap().write_all(bytes).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn descriptor(resource: &str, length: i32) -> Attrs {
        let mut d = Attrs::new();
        d.set_str(A_RESOURCE, resource);
        d.set(A_LENGTH, AttrValue::Int(length));
        d
    }

    fn loaded(h: &Harness, clip_type: ClipType, d: Attrs) -> Asset {
        let asset = Asset::new("a1", clip_type, d.clone(), h.ctx.clone());
        assert!(asset.set_producer(Producer::new(d), false));
        h.tasks.clear();
        asset
    }

    #[test]
    fn test_refresh_only_keeps_hash_and_producers() {
        let dir = tempfile::tempdir().unwrap();
        let h = Harness::new(dir.path().to_path_buf());
        let file = media_file(&dir, "clip.mp4", b"frames");
        let asset = loaded(&h, ClipType::AV, descriptor(&file, 300));
        let hash = asset.hash();
        assert!(hash.is_some());
        asset.get_timeline_producer(&ProducerRequest::new(1, ClipState::VideoOnly, TrackKey::new(1, 0)));

        assert!(asset.reload(true, false, false));
        assert_eq!(asset.hash(), hash);
        assert_eq!(asset.cached_producer_count(), 1);
        assert_eq!(asset.status(), ClipStatus::Ready);
        assert!(!h.tasks.started_kinds().contains(&JobKind::Load));
        assert!(h.tasks.started_kinds().contains(&JobKind::Thumb));
    }

    #[test]
    fn test_second_reload_is_coalesced() {
        let h = Harness::new(std::env::temp_dir());
        let asset = loaded(&h, ClipType::Video, descriptor("/media/clip.mp4", 300));

        assert!(asset.reload(false, false, false));
        assert_eq!(asset.status(), ClipStatus::Waiting);
        assert!(asset.is_reloading());
        let discards = h.tasks.discarded.lock().unwrap().len();
        assert!(!asset.reload(false, false, false));
        // The running load is left alone
        assert_eq!(h.tasks.discarded.lock().unwrap().len(), discards);
        assert!(h.tasks.has_pending_job("a1", Some(JobKind::Load)));
        let loads = h.tasks.started_kinds().iter().filter(|k| **k == JobKind::Load).count();
        assert_eq!(loads, 1);
        assert!(h.model.roles().contains(&Role::Status));

        asset.set_producer(Producer::new(descriptor("/media/clip.mp4", 300)), false);
        assert!(!asset.is_reloading());
        assert_eq!(asset.status(), ClipStatus::Ready);
    }

    #[test]
    fn test_missing_until_rebuilt() {
        let h = Harness::new(std::env::temp_dir());
        let asset = loaded(&h, ClipType::Video, descriptor("/media/clip.mp4", 300));
        let req = ProducerRequest::new(1, ClipState::VideoOnly, TrackKey::new(1, 0));
        asset.get_timeline_producer(&req);

        asset.on_load_failed("file not found");
        assert_eq!(asset.status(), ClipStatus::Missing);
        assert_eq!(asset.cached_producer_count(), 0);
        assert!(asset.get_timeline_producer(&req).is_placeholder());

        assert!(asset.reload(false, false, false));
        assert_eq!(asset.status(), ClipStatus::Missing);
        asset.set_producer(Producer::new(descriptor("/media/clip.mp4", 300)), true);
        assert_eq!(asset.status(), ClipStatus::Ready);
    }

    #[test]
    fn test_broken_proxy_falls_back_to_original() {
        let dir = tempfile::tempdir().unwrap();
        let h = Harness::new(dir.path().to_path_buf());
        let original = media_file(&dir, "orig.mp4", b"original");
        let proxy = dir.path().join("proxy.mkv").to_string_lossy().into_owned();
        let mut d = descriptor(&proxy, 300);
        d.set_str(A_PROXY, proxy.clone());
        d.set_str(A_ORIGINAL_URL, original.clone());
        let asset = Asset::new("a1", ClipType::AV, d, h.ctx.clone());

        asset.on_load_failed("cannot open proxy");
        assert_ne!(asset.status(), ClipStatus::Missing);
        assert_eq!(asset.property(A_RESOURCE), Some(original.clone()));
        assert_eq!(asset.proxy(), None);
        assert_eq!(asset.property(A_ORIGINAL_URL), None);
        assert_eq!(asset.temporary_url(), Some(original.clone()));
        assert_eq!(h.tasks.started_kinds(), vec![JobKind::Load]);
        let req = ProducerRequest::new(1, ClipState::AudioOnly, TrackKey::new(1, 0));
        assert!(asset.get_timeline_producer(&req).is_placeholder());

        asset.set_producer(Producer::new(descriptor(&original, 300)), false);
        assert_eq!(asset.status(), ClipStatus::Ready);
        assert_eq!(asset.temporary_url(), None);
    }

    #[test]
    fn test_existing_proxy_is_swapped_in() {
        let dir = tempfile::tempdir().unwrap();
        let h = Harness::new(dir.path().to_path_buf());
        let original = media_file(&dir, "orig.mp4", b"original");
        let proxy = media_file(&dir, "orig.proxy.mkv", b"small");
        let asset = loaded(&h, ClipType::AV, descriptor(&original, 300));
        let hash = asset.hash();

        let mut props = Attrs::new();
        props.set_str(A_PROXY, proxy.clone());
        let change = asset.set_properties(&props);
        assert_eq!(change.reload, Some(false));
        assert!(!change.proxy_job);
        assert_eq!(asset.property(A_RESOURCE), Some(proxy.clone()));
        assert_eq!(asset.property(A_ORIGINAL_URL), Some(original.clone()));
        assert_eq!(h.tasks.started_kinds(), vec![JobKind::Load]);

        asset.set_producer(Producer::new(asset.descriptor()), false);
        assert_eq!(asset.status(), ClipStatus::Proxy);
        assert_eq!(asset.name(), "orig.mp4");
        // Hash follows the original file
        assert_eq!(asset.hash(), hash);
    }

    #[test]
    fn test_proxy_without_original_is_proxy_only() {
        let dir = tempfile::tempdir().unwrap();
        let h = Harness::new(dir.path().to_path_buf());
        let proxy = media_file(&dir, "clip.proxy.mkv", b"small");
        let mut d = descriptor(&proxy, 300);
        d.set_str(A_PROXY, proxy.clone());
        d.set_str(A_ORIGINAL_URL, "/gone/clip.mp4");
        let asset = Asset::new("a1", ClipType::AV, d.clone(), h.ctx.clone());

        asset.set_producer(Producer::new(d), false);
        assert_eq!(asset.status(), ClipStatus::ProxyOnly);
    }

    #[test]
    fn test_missing_proxy_file_is_generated() {
        let dir = tempfile::tempdir().unwrap();
        let h = Harness::new(dir.path().to_path_buf());
        let original = media_file(&dir, "orig.mp4", b"original");
        let asset = loaded(&h, ClipType::AV, descriptor(&original, 300));
        let target = dir.path().join("proxy").join("orig.mkv");

        let mut props = Attrs::new();
        props.set_str(A_PROXY, target.to_string_lossy());
        let change = asset.set_properties(&props);
        assert!(change.proxy_job);
        assert_eq!(change.reload, None);
        let started = h.tasks.started.lock().unwrap();
        assert_eq!(started[0].0, JobKind::Proxy);
        assert_eq!(started[0].2.output.as_deref(), Some(target.as_path()));
        drop(started);

        // Clearing the proxy cancels generation and restores the original
        let mut props = Attrs::new();
        props.set_str(A_PROXY, "-");
        asset.set_properties(&props);
        assert!(!h.tasks.has_pending_job("a1", Some(JobKind::Proxy)));
        assert_eq!(asset.property(A_RESOURCE), Some(original));
        assert_eq!(asset.proxy(), None);
    }

    #[test]
    fn test_property_edits() {
        let h = Harness::new(std::env::temp_dir());
        let mut d = descriptor("#ff0000ff", 100);
        d.set_str(A_FILE_HASH, "abc");
        let color = loaded(&h, ClipType::Color, d);
        let req = ProducerRequest::new(1, ClipState::VideoOnly, TrackKey::new(1, 0));
        let cut = color.get_timeline_producer(&req);

        let mut props = Attrs::new();
        props.set_str(A_RESOURCE, "#00ff00ff");
        let change = color.set_properties(&props);
        assert_eq!(change.roles, vec![Role::Resource]);
        assert_eq!(change.reload, Some(true));
        assert!(!h.tasks.started_kinds().contains(&JobKind::Load));
        assert_eq!(color.hash(), None);
        assert_eq!(cut.resource().as_deref(), Some("#00ff00ff"));

        let mut props = Attrs::new();
        props.set_str(A_CLIP_NAME, "Red");
        assert_eq!(color.set_properties(&props).roles, vec![Role::Name]);
        assert_eq!(color.name(), "Red");

        let video = loaded(&h, ClipType::Video, descriptor("/media/clip.mp4", 300));
        let vcut = video.get_timeline_producer(&req);
        let mut props = Attrs::new();
        props.set_str("force_aspect_ratio", "1.5");
        let change = video.set_properties(&props);
        assert_eq!(change.forwarded, vec!["force_aspect_ratio".to_string()]);
        assert_eq!(change.reload, Some(true));
        assert_eq!(vcut.get_str("force_aspect_ratio").as_deref(), Some("1.5"));
        assert!(!h.tasks.started_kinds().contains(&JobKind::Load));

        props.set_str(A_RESOURCE, "/media/other.mp4");
        assert_eq!(video.set_properties(&props).reload, Some(false));
        assert!(h.tasks.started_kinds().contains(&JobKind::Load));
    }

    #[test]
    fn test_xmldata_edit_rebuilds() {
        let h = Harness::new(std::env::temp_dir());
        let mut d = Attrs::new();
        d.set_str(A_XMLDATA, "<title><text>One</text></title>");
        d.set(A_LENGTH, AttrValue::Int(125));
        let title = loaded(&h, ClipType::Text, d);
        let hash = title.hash();
        assert!(hash.is_some());

        let mut props = Attrs::new();
        props.set_str(A_XMLDATA, "<title><text>Two</text></title>");
        assert_eq!(title.set_properties(&props).reload, Some(false));
        assert_eq!(h.tasks.started_kinds(), vec![JobKind::Load]);
        assert_eq!(title.status(), ClipStatus::Waiting);

        title.set_producer(Producer::new(title.descriptor()), false);
        assert!(title.hash().is_some());
        assert_ne!(title.hash(), hash);
    }

    #[test]
    fn test_reload_of_proxied_asset_rebuilds_proxy() {
        let dir = tempfile::tempdir().unwrap();
        let h = Harness::new(dir.path().to_path_buf());
        let original = media_file(&dir, "orig.mp4", b"original");
        let replacement = media_file(&dir, "new.mp4", b"replacement");
        let proxy = media_file(&dir, "orig.proxy.mkv", b"small");
        let mut d = descriptor(&proxy, 300);
        d.set_str(A_PROXY, proxy.clone());
        d.set_str(A_ORIGINAL_URL, original);
        let asset = loaded(&h, ClipType::AV, d);
        assert_eq!(asset.status(), ClipStatus::Proxy);

        let change = asset.set_resource(&replacement);
        assert!(change.proxy_job);
        assert_eq!(h.tasks.started_kinds(), vec![JobKind::Proxy]);
        assert!(h.tasks.discarded.lock().unwrap().contains(&("a1".to_string(), Some(JobKind::Proxy), true)));
        {
            let started = h.tasks.started.lock().unwrap();
            let params = &started[0].2;
            assert_eq!(params.output.as_deref(), Some(Path::new(&proxy)));
            assert_eq!(params.descriptor.get_str(A_ORIGINAL_URL), Some(replacement.as_str()));
            assert!(params.descriptor.get_bool_or(A_OVERWRITE_PROXY, false));
        }
        // The old proxy keeps playing until the new one lands
        assert_eq!(asset.property(A_RESOURCE), Some(proxy.clone()));
        assert_eq!(asset.status(), ClipStatus::Proxy);

        asset.on_proxy_ready(Path::new(&proxy));
        assert!(h.tasks.started_kinds().contains(&JobKind::Load));
        assert_eq!(asset.property(A_OVERWRITE_PROXY), None);
        asset.set_producer(Producer::new(asset.descriptor()), false);
        assert_eq!(asset.status(), ClipStatus::Proxy);
        assert_eq!(asset.hash(), Some(digest_hex(b"replacement")));
    }

    #[test]
    fn test_resource_swap_discards_stale_audio() {
        let dir = tempfile::tempdir().unwrap();
        let h = Harness::new(dir.path().to_path_buf());
        let first = media_file(&dir, "a.wav", b"first take");
        let second = media_file(&dir, "b.wav", b"second take");
        let asset = loaded(&h, ClipType::Audio, descriptor(&first, 300));
        asset.on_audio_levels_ready(0, vec![0.1; 4]);
        let old_thumb = asset.audio_thumb_path(Some(0)).unwrap();
        fs::create_dir_all(old_thumb.parent().unwrap()).unwrap();
        fs::write(&old_thumb, b"png").unwrap();

        asset.set_resource(&second);
        assert_eq!(asset.audio_levels(0), None);
        assert!(!asset.audio_thumb_created());
        assert!(!old_thumb.exists());

        asset.set_producer(Producer::new(descriptor(&second, 300)), false);
        assert_eq!(asset.hash(), Some(digest_hex(b"second take")));
        assert!(h.tasks.started_kinds().contains(&JobKind::AudioLevels));
    }

    #[test]
    fn test_resource_swap_to_identical_content_keeps_audio() {
        let dir = tempfile::tempdir().unwrap();
        let h = Harness::new(dir.path().to_path_buf());
        let first = media_file(&dir, "a.wav", b"same take");
        let copy = media_file(&dir, "copy.wav", b"same take");
        let asset = loaded(&h, ClipType::Audio, descriptor(&first, 300));
        asset.on_audio_levels_ready(0, vec![0.1; 4]);

        asset.set_resource(&copy);
        assert_eq!(asset.audio_levels(0), Some(vec![0.1; 4]));
    }

    #[test]
    fn test_audio_thumb_cache_files() {
        let dir = tempfile::tempdir().unwrap();
        let h = Harness::new(dir.path().to_path_buf());
        let mut d = descriptor("/media/song.wav", 300);
        d.set_str(A_FILE_HASH, "abc");
        d.set(A_FPS, AttrValue::Double(25.0));
        let asset = Asset::new("a1", ClipType::Audio, d, h.ctx.clone());

        let path = asset.audio_thumb_path(Some(1)).unwrap();
        assert_eq!(path, dir.path().join("audio").join("abc_1_25_audio.png"));
        assert_eq!(
            asset.audio_thumb_path(None).unwrap().file_name().unwrap(),
            "abc_25_audio.png"
        );

        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"png").unwrap();
        asset.on_audio_levels_ready(1, vec![0.5; 4]);
        assert!(asset.audio_thumb_created());

        assert_eq!(asset.discard_audio_thumb(), 1);
        assert!(!path.exists());
        assert_eq!(asset.audio_levels(1), None);
        assert!(!asset.audio_thumb_created());
    }

    #[test]
    fn test_auto_proxy_for_large_video() {
        let dir = tempfile::tempdir().unwrap();
        let settings = BinSettings {
            generate_proxy: true,
            proxy_min_size: 1000,
            ..Default::default()
        };
        let h = Harness::with_settings(settings, dir.path().to_path_buf());
        let file = media_file(&dir, "big.mp4", b"4k frames");
        let mut d = descriptor(&file, 300);
        d.set(A_WIDTH, AttrValue::UInt(3840));
        let asset = Asset::new("a1", ClipType::Video, d.clone(), h.ctx.clone());
        asset.set_producer(Producer::new(d), false);

        let started = h.tasks.started.lock().unwrap();
        let (_, _, params) = started.iter().find(|(k, _, _)| *k == JobKind::Proxy).unwrap();
        let output = params.output.clone().unwrap();
        assert_eq!(output.parent().unwrap(), dir.path().join("proxy"));
        assert_eq!(output.extension().unwrap(), "mkv");
        assert_eq!(output.file_stem().unwrap().to_string_lossy(), asset.hash().unwrap());
    }
}
