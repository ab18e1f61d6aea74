//! Derived producer cache of one asset.
//!
//! Structure:
//! - audio:    TrackKey -> Producer (audio on, video off)
//! - video:    TrackKey -> Producer (video on, audio off)
//! - disabled: single shared Producer (both off)
//! - timewarp: Occurrence -> Producer (speed/remap is per occurrence, not per track)
//!
//! At most one derived producer exists per (purpose, key). Callers only ever
//! receive cuts; the cached originals never leave this module except through
//! the read-only accessors.
//!
//! Every insertion/eviction is mirrored in the asset's [`EffectPipeline`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use log::{debug, trace};

use super::attrs::{AttrValue, Attrs};
use super::clip_type::ClipType;
use super::effects::EffectPipeline;
use super::handle::Producer;
use super::keys::A_STREAM_EFFECTS_PREFIX;
use super::timeline::{ClipId, ClipState, TimelineId, TrackKey};

/// One placement of the asset: clip ids are only unique within a timeline
pub type Occurrence = (TimelineId, ClipId);

/// Cache statistics for monitoring reuse
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 { 0.0 } else { self.hits() as f64 / total as f64 }
    }
}

/// A timeline occurrence asking for a producer.
#[derive(Debug, Clone, PartialEq)]
pub struct ProducerRequest {
    pub timeline: TimelineId,
    pub clip_id: ClipId,
    pub state: ClipState,
    pub track: TrackKey,
    pub speed: f64,
    /// Time remapping keyframes; forces a warp producer
    pub remap: Option<String>,
}

impl ProducerRequest {
    pub fn new(clip_id: ClipId, state: ClipState, track: TrackKey) -> Self {
        Self {
            timeline: TimelineId::nil(),
            clip_id,
            state,
            track,
            speed: 1.0,
            remap: None,
        }
    }

    pub fn on_timeline(mut self, timeline: TimelineId) -> Self {
        self.timeline = timeline;
        self
    }

    pub fn occurrence(&self) -> Occurrence {
        (self.timeline, self.clip_id)
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_remap(mut self, remap: impl Into<String>) -> Self {
        self.remap = Some(remap.into());
        self
    }

    /// Needs a per-occurrence warp producer
    pub fn is_warp(&self) -> bool {
        self.speed.to_bits() != 1.0f64.to_bits() || self.remap.is_some()
    }
}

/// Asset-side inputs for derivation.
pub struct DeriveContext<'a> {
    pub clip_type: ClipType,
    /// Playable duration in frames (0 = use producer length)
    pub duration: i32,
    pub descriptor: &'a Attrs,
    pub effects: &'a dyn EffectPipeline,
}

impl DeriveContext<'_> {
    fn out_point(&self, producer: &Producer) -> i32 {
        if self.duration > 0 {
            self.duration - 1
        } else {
            producer.length().saturating_sub(1)
        }
    }

    fn stream_effects(&self, stream_index: i32) -> Vec<String> {
        let key = format!("{}{}", A_STREAM_EFFECTS_PREFIX, stream_index);
        self.descriptor
            .get_list(&key)
            .map(|l| l.to_vec())
            .unwrap_or_default()
    }
}

#[derive(Debug, Default)]
pub struct ProducerCache {
    audio: IndexMap<TrackKey, Producer>,
    video: IndexMap<TrackKey, Producer>,
    disabled: Option<Producer>,
    timewarp: IndexMap<Occurrence, Producer>,
    /// Which occurrence last received which (purpose, track)
    consumers: HashMap<Occurrence, (ClipState, TrackKey)>,
    stats: CacheStats,
}

impl ProducerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Placeholder cut served when no usable master exists
    pub fn unavailable(duration: i32) -> Producer {
        let placeholder = Producer::media_unavailable();
        if duration > 0 {
            placeholder.cut_range(-1, duration - 1)
        } else {
            placeholder.cut()
        }
    }

    /// Serve a cut of the derived producer matching `req`, building and
    /// caching it when needed.
    pub fn get_timeline_producer(
        &mut self,
        master: Option<&Producer>,
        ctx: &DeriveContext<'_>,
        req: &ProducerRequest,
    ) -> Producer {
        let master = match master {
            Some(m) if m.is_valid() => m,
            _ => {
                debug!("producer request {} without a valid master, serving placeholder", req.clip_id);
                return Self::unavailable(ctx.duration);
            }
        };

        if req.is_warp() {
            // Warp producers are keyed by occurrence, not by track
            self.consumers.remove(&req.occurrence());
            return self.warp_producer(master, ctx, req);
        }
        self.consumers.insert(req.occurrence(), (req.state, req.track));

        // Normal speed never coexists with a warp producer for the same occurrence
        if let Some(old) = self.timewarp.shift_remove(&req.occurrence()) {
            ctx.effects.remove_service(&old);
            trace!("evicted warp producer of clip {}", req.clip_id);
        }

        match req.state {
            ClipState::AudioOnly => {
                let producer = match self.audio.get(&req.track) {
                    Some(p) => {
                        self.stats.record_hit();
                        p.clone()
                    }
                    None => {
                        self.stats.record_miss();
                        let p = master.clone_producer();
                        p.set_audio_enabled(true);
                        p.set_video_enabled(false);
                        for effect in ctx.stream_effects(req.track.stream_index) {
                            p.attach_effect(effect);
                        }
                        ctx.effects.add_service(&p);
                        debug!("audio producer created for {}", req.track);
                        self.audio.insert(req.track, p.clone());
                        p
                    }
                };
                producer.cut()
            }
            ClipState::VideoOnly => {
                if !ctx.clip_type.has_per_track_cache() {
                    return master.cut_range(-1, ctx.out_point(master));
                }
                let producer = match self.video.get(&req.track) {
                    Some(p) => {
                        self.stats.record_hit();
                        p.clone()
                    }
                    None => {
                        self.stats.record_miss();
                        let p = master.clone_producer();
                        p.set_video_enabled(true);
                        p.set_audio_enabled(false);
                        ctx.effects.add_service(&p);
                        debug!("video producer created for {}", req.track);
                        self.video.insert(req.track, p.clone());
                        p
                    }
                };
                producer.cut_range(-1, ctx.out_point(master))
            }
            ClipState::Disabled => {
                let producer = match &self.disabled {
                    Some(p) => {
                        self.stats.record_hit();
                        p.clone()
                    }
                    None => {
                        self.stats.record_miss();
                        let p = master.clone_producer();
                        p.set_audio_enabled(false);
                        p.set_video_enabled(false);
                        ctx.effects.add_service(&p);
                        self.disabled = Some(p.clone());
                        p
                    }
                };
                producer.cut_range(-1, ctx.out_point(master))
            }
        }
    }

    fn warp_producer(&mut self, master: &Producer, ctx: &DeriveContext<'_>, req: &ProducerRequest) -> Producer {
        let key = req.occurrence();
        let reusable = self.timewarp.get(&key).is_some_and(|p| match &req.remap {
            Some(map) => p.time_map().as_deref() == Some(map.as_str()),
            None => p.time_map().is_none() && p.warp_speed().to_bits() == req.speed.to_bits(),
        });

        let warp = if reusable {
            self.stats.record_hit();
            trace!("reusing warp producer of clip {}", req.clip_id);
            self.timewarp[&key].clone()
        } else {
            self.stats.record_miss();
            if let Some(old) = self.timewarp.shift_remove(&key) {
                ctx.effects.remove_service(&old);
            }
            let p = Producer::timewarp(master, req.speed, req.remap.as_deref());
            debug!("warp producer created for clip {}: speed={} length={}", req.clip_id, req.speed, p.length());
            ctx.effects.add_service(&p);
            self.timewarp.insert(key, p.clone());
            p
        };

        warp.set_audio_enabled(req.state == ClipState::AudioOnly);
        warp.set_video_enabled(req.state == ClipState::VideoOnly);
        warp.cut()
    }

    /// Take ownership of a restored timeline producer's parent. The first
    /// claimant wins; returns false when the parent was already claimed and
    /// the caller must derive its own producer instead.
    pub fn adopt(&mut self, parent: &Producer, req: &ProducerRequest, effects: &dyn EffectPipeline) -> bool {
        // A warp slot belongs to one occurrence and may be replaced
        let slot_taken = !req.is_warp()
            && match req.state {
                ClipState::AudioOnly => self.audio.contains_key(&req.track),
                ClipState::VideoOnly => self.video.contains_key(&req.track),
                ClipState::Disabled => self.disabled.is_some(),
            };
        if slot_taken || !parent.claim() {
            return false;
        }

        let original = parent.parent();
        if req.is_warp() {
            if let Some(old) = self.timewarp.insert(req.occurrence(), original.clone()) {
                effects.remove_service(&old);
            }
        } else {
            match req.state {
                ClipState::AudioOnly => {
                    self.audio.insert(req.track, original.clone());
                }
                ClipState::VideoOnly => {
                    self.video.insert(req.track, original.clone());
                }
                ClipState::Disabled => self.disabled = Some(original.clone()),
            }
            self.consumers.insert(req.occurrence(), (req.state, req.track));
        }
        effects.add_service(&original);
        debug!("adopted restored producer {} for clip {}", original.id(), req.clip_id);
        true
    }

    /// Release producers keyed by an occurrence. Track producers go only
    /// when no other occurrence still consumes the same (purpose, track).
    /// Returns the number of evicted producers.
    pub fn evict_clip(&mut self, occurrence: Occurrence, was_audio: bool, effects: &dyn EffectPipeline) -> usize {
        let mut evicted = 0;
        if let Some(p) = self.timewarp.shift_remove(&occurrence) {
            effects.remove_service(&p);
            evicted += 1;
        }

        let Some((state, track)) = self.consumers.remove(&occurrence) else {
            return evicted;
        };
        let purpose = if was_audio { ClipState::AudioOnly } else { state };
        let still_used = self
            .consumers
            .values()
            .any(|(s, t)| *s == purpose && *t == track);
        if still_used {
            return evicted;
        }

        let removed = match purpose {
            ClipState::AudioOnly => self.audio.shift_remove(&track),
            ClipState::VideoOnly => self.video.shift_remove(&track),
            ClipState::Disabled => None,
        };
        if let Some(p) = removed {
            effects.remove_service(&p);
            debug!("released {:?} producer for {} (last user {})", purpose, track, occurrence.1);
            evicted += 1;
        }
        evicted
    }

    /// Drop every derived producer. Occurrences re-derive on next request.
    pub fn clear_all(&mut self, effects: &dyn EffectPipeline) -> usize {
        let mut count = 0;
        for (_, p) in self.audio.drain(..) {
            effects.remove_service(&p);
            count += 1;
        }
        for (_, p) in self.video.drain(..) {
            effects.remove_service(&p);
            count += 1;
        }
        for (_, p) in self.timewarp.drain(..) {
            effects.remove_service(&p);
            count += 1;
        }
        if let Some(p) = self.disabled.take() {
            effects.remove_service(&p);
            count += 1;
        }
        self.consumers.clear();
        if count > 0 {
            debug!("cleared {} derived producers", count);
        }
        count
    }

    /// Drop audio and warp producers, which carry stream effects and warp
    /// parameters built from the previous master. Video and disabled
    /// producers survive.
    pub fn clear_audio_and_warp(&mut self, effects: &dyn EffectPipeline) -> usize {
        let audio = self.audio.drain(..).map(|(_, p)| p);
        let warp = self.timewarp.drain(..).map(|(_, p)| p);
        let mut count = 0;
        for p in audio.chain(warp) {
            effects.remove_service(&p);
            count += 1;
        }
        self.consumers.retain(|_, (state, _)| *state != ClipState::AudioOnly);
        count
    }

    /// Forward a property edit to every derived producer.
    pub fn apply_property(&self, key: &str, value: &AttrValue) {
        self.iter().for_each(|p| p.set(key, value.clone()));
    }

    /// All cached derived producers
    pub fn iter(&self) -> impl Iterator<Item = &Producer> {
        self.audio
            .values()
            .chain(self.video.values())
            .chain(self.timewarp.values())
            .chain(self.disabled.iter())
    }

    pub fn audio_producer(&self, track: &TrackKey) -> Option<&Producer> {
        self.audio.get(track)
    }

    pub fn video_producer(&self, track: &TrackKey) -> Option<&Producer> {
        self.video.get(track)
    }

    pub fn warp_producer_for(&self, occurrence: Occurrence) -> Option<&Producer> {
        self.timewarp.get(&occurrence)
    }

    pub fn disabled_producer(&self) -> Option<&Producer> {
        self.disabled.as_ref()
    }

    pub fn len(&self) -> usize {
        self.audio.len() + self.video.len() + self.timewarp.len() + usize::from(self.disabled.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::effects::EffectStack;
    use crate::entities::keys::{A_LENGTH, A_RESOURCE};

    fn make_master(length: i32) -> Producer {
        let mut props = Attrs::new();
        props.set_str(A_RESOURCE, "/media/clip.mp4");
        props.set(A_LENGTH, AttrValue::Int(length));
        Producer::new(props)
    }

    fn ctx<'a>(clip_type: ClipType, descriptor: &'a Attrs, effects: &'a EffectStack) -> DeriveContext<'a> {
        DeriveContext {
            clip_type,
            duration: 300,
            descriptor,
            effects,
        }
    }

    #[test]
    fn test_video_producer_reused_on_same_track() {
        let master = make_master(300);
        let desc = Attrs::new();
        let fx = EffectStack::new();
        let c = ctx(ClipType::AV, &desc, &fx);
        let mut cache = ProducerCache::new();
        let req = ProducerRequest::new(1, ClipState::VideoOnly, TrackKey::new(1, 0));

        let a = cache.get_timeline_producer(Some(&master), &c, &req);
        let b = cache.get_timeline_producer(Some(&master), &c, &req);

        assert_eq!((a.in_point(), a.out_point()), (-1, 299));
        assert!(a.shares_state_with(&b));
        assert!(!a.shares_state_with(&master));
        assert!(a.video_enabled());
        assert!(!a.audio_enabled());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().misses(), 1);
        assert_eq!(fx.service_count(), 1);
    }

    #[test]
    fn test_fixed_content_bypasses_track_cache() {
        let master = make_master(300);
        let desc = Attrs::new();
        let fx = EffectStack::new();
        let c = ctx(ClipType::Color, &desc, &fx);
        let mut cache = ProducerCache::new();
        let req = ProducerRequest::new(1, ClipState::VideoOnly, TrackKey::new(3, 0));

        let a = cache.get_timeline_producer(Some(&master), &c, &req);
        assert!(a.shares_state_with(&master));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_audio_keys_distinguish_stream_and_playlist() {
        let master = make_master(300);
        let mut desc = Attrs::new();
        desc.set("stream_effects.1", AttrValue::List(vec!["volume".into()]));
        let fx = EffectStack::new();
        let c = ctx(ClipType::AV, &desc, &fx);
        let mut cache = ProducerCache::new();

        let s0 = cache.get_timeline_producer(Some(&master), &c, &ProducerRequest::new(1, ClipState::AudioOnly, TrackKey::new(2, 0)));
        let s1 = cache.get_timeline_producer(Some(&master), &c, &ProducerRequest::new(2, ClipState::AudioOnly, TrackKey::new(2, 1)));
        let s1b = cache.get_timeline_producer(
            Some(&master),
            &c,
            &ProducerRequest::new(3, ClipState::AudioOnly, TrackKey::new(2, 1).secondary()),
        );

        assert!(!s0.shares_state_with(&s1));
        assert!(!s1.shares_state_with(&s1b));
        assert_eq!(cache.len(), 3);
        assert!(s1.audio_enabled() && !s1.video_enabled());
        assert!(s1.effects().contains(&"volume".to_string()));
        assert!(s0.effects().is_empty());
    }

    #[test]
    fn test_disabled_producer_is_shared() {
        let master = make_master(300);
        let desc = Attrs::new();
        let fx = EffectStack::new();
        let c = ctx(ClipType::AV, &desc, &fx);
        let mut cache = ProducerCache::new();

        let a = cache.get_timeline_producer(Some(&master), &c, &ProducerRequest::new(1, ClipState::Disabled, TrackKey::new(1, 0)));
        let b = cache.get_timeline_producer(Some(&master), &c, &ProducerRequest::new(2, ClipState::Disabled, TrackKey::new(4, 0)));
        assert!(a.shares_state_with(&b));
        assert!(!a.audio_enabled() && !a.video_enabled());
    }

    #[test]
    fn test_warp_reuse_and_rebuild() {
        let master = make_master(300);
        let desc = Attrs::new();
        let fx = EffectStack::new();
        let c = ctx(ClipType::AV, &desc, &fx);
        let mut cache = ProducerCache::new();
        let track = TrackKey::new(1, 0);

        let w2 = cache.get_timeline_producer(Some(&master), &c, &ProducerRequest::new(9, ClipState::AudioOnly, track).with_speed(2.0));
        assert_eq!(w2.parent().length(), 150);
        assert!(w2.audio_enabled() && !w2.video_enabled());

        let again = cache.get_timeline_producer(Some(&master), &c, &ProducerRequest::new(9, ClipState::AudioOnly, track).with_speed(2.0));
        assert!(again.shares_state_with(&w2));

        let w15 = cache.get_timeline_producer(Some(&master), &c, &ProducerRequest::new(9, ClipState::AudioOnly, track).with_speed(1.5));
        assert!(!w15.shares_state_with(&w2));
        assert_eq!(w15.parent().length(), 200);
        assert_eq!(cache.len(), 1);
        assert_eq!(fx.service_count(), 1);
    }

    #[test]
    fn test_normal_speed_evicts_warp() {
        let master = make_master(300);
        let desc = Attrs::new();
        let fx = EffectStack::new();
        let c = ctx(ClipType::AV, &desc, &fx);
        let mut cache = ProducerCache::new();
        let track = TrackKey::new(1, 0);

        cache.get_timeline_producer(Some(&master), &c, &ProducerRequest::new(4, ClipState::VideoOnly, track).with_speed(0.5));
        assert!(cache.warp_producer_for((TimelineId::nil(), 4)).is_some());

        cache.get_timeline_producer(Some(&master), &c, &ProducerRequest::new(4, ClipState::VideoOnly, track));
        assert!(cache.warp_producer_for((TimelineId::nil(), 4)).is_none());
        assert!(cache.video_producer(&track).is_some());
        assert_eq!(fx.service_count(), 1);
    }

    #[test]
    fn test_remap_forces_warp_and_compares_keyframes() {
        let master = make_master(300);
        let desc = Attrs::new();
        let fx = EffectStack::new();
        let c = ctx(ClipType::AV, &desc, &fx);
        let mut cache = ProducerCache::new();
        let track = TrackKey::new(1, 0);

        let a = cache.get_timeline_producer(Some(&master), &c, &ProducerRequest::new(2, ClipState::VideoOnly, track).with_remap("0=0;299=150"));
        let b = cache.get_timeline_producer(Some(&master), &c, &ProducerRequest::new(2, ClipState::VideoOnly, track).with_remap("0=0;299=150"));
        let d = cache.get_timeline_producer(Some(&master), &c, &ProducerRequest::new(2, ClipState::VideoOnly, track).with_remap("0=0;299=100"));
        assert!(a.shares_state_with(&b));
        assert!(!a.shares_state_with(&d));
    }

    #[test]
    fn test_missing_or_invalid_master_serves_placeholder() {
        let desc = Attrs::new();
        let fx = EffectStack::new();
        let c = ctx(ClipType::AV, &desc, &fx);
        let mut cache = ProducerCache::new();
        let req = ProducerRequest::new(1, ClipState::VideoOnly, TrackKey::new(1, 0));

        let p = cache.get_timeline_producer(None, &c, &req);
        assert!(p.is_placeholder());
        assert_eq!(p.out_point(), 299);

        let broken = Producer::invalid(Attrs::new());
        assert!(cache.get_timeline_producer(Some(&broken), &c, &req).is_placeholder());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_evict_clip_keeps_shared_track_producer() {
        let master = make_master(300);
        let desc = Attrs::new();
        let fx = EffectStack::new();
        let c = ctx(ClipType::AV, &desc, &fx);
        let mut cache = ProducerCache::new();
        let track = TrackKey::new(1, 0);

        cache.get_timeline_producer(Some(&master), &c, &ProducerRequest::new(1, ClipState::AudioOnly, track));
        cache.get_timeline_producer(Some(&master), &c, &ProducerRequest::new(2, ClipState::AudioOnly, track));

        assert_eq!(cache.evict_clip((TimelineId::nil(), 1), true, &fx), 0);
        assert!(cache.audio_producer(&track).is_some());

        assert_eq!(cache.evict_clip((TimelineId::nil(), 2), true, &fx), 1);
        assert!(cache.audio_producer(&track).is_none());
        assert_eq!(fx.service_count(), 0);
    }

    #[test]
    fn test_adopt_first_claimant_wins() {
        let master = make_master(300);
        let restored = master.clone_producer();
        let fx = EffectStack::new();
        let mut a = ProducerCache::new();
        let mut b = ProducerCache::new();
        let req = ProducerRequest::new(1, ClipState::VideoOnly, TrackKey::new(1, 0));

        assert!(a.adopt(&restored.cut(), &req, &fx));
        assert!(a.video_producer(&req.track).unwrap().shares_state_with(&restored));
        assert!(!b.adopt(&restored.cut(), &req, &fx));
        assert!(b.is_empty());
    }

    #[test]
    fn test_adopt_into_taken_slot_leaves_parent_unclaimed() {
        let master = make_master(300);
        let desc = Attrs::new();
        let fx = EffectStack::new();
        let c = ctx(ClipType::AV, &desc, &fx);
        let mut cache = ProducerCache::new();
        let req = ProducerRequest::new(1, ClipState::AudioOnly, TrackKey::new(2, 0));
        cache.get_timeline_producer(Some(&master), &c, &req);

        let restored = master.clone_producer();
        assert!(!cache.adopt(&restored.cut(), &req, &fx));
        assert!(!restored.is_claimed());

        let mut other = ProducerCache::new();
        assert!(other.adopt(&restored.cut(), &req, &fx));
        assert!(restored.is_claimed());
    }

    #[test]
    fn test_same_clip_id_on_two_timelines_keeps_separate_warps() {
        let master = make_master(300);
        let desc = Attrs::new();
        let fx = EffectStack::new();
        let c = ctx(ClipType::AV, &desc, &fx);
        let mut cache = ProducerCache::new();
        let track = TrackKey::new(1, 0);
        let (a, b) = (TimelineId::new_v4(), TimelineId::new_v4());
        let on_a = ProducerRequest::new(1, ClipState::VideoOnly, track).on_timeline(a).with_speed(2.0);
        let on_b = ProducerRequest::new(1, ClipState::VideoOnly, track).on_timeline(b).with_speed(0.5);

        let wa = cache.get_timeline_producer(Some(&master), &c, &on_a);
        let wb = cache.get_timeline_producer(Some(&master), &c, &on_b);
        assert!(!wa.shares_state_with(&wb));
        assert_eq!(cache.len(), 2);
        assert!(cache.get_timeline_producer(Some(&master), &c, &on_a).shares_state_with(&wa));

        assert_eq!(cache.evict_clip(on_a.occurrence(), false, &fx), 1);
        assert!(cache.warp_producer_for(on_a.occurrence()).is_none());
        assert!(cache.warp_producer_for(on_b.occurrence()).is_some());
        assert_eq!(fx.service_count(), 1);
    }

    #[test]
    fn test_clear_all_and_pass_properties() {
        let master = make_master(300);
        let desc = Attrs::new();
        let fx = EffectStack::new();
        let c = ctx(ClipType::AV, &desc, &fx);
        let mut cache = ProducerCache::new();

        let v = cache.get_timeline_producer(Some(&master), &c, &ProducerRequest::new(1, ClipState::VideoOnly, TrackKey::new(1, 0)));
        cache.get_timeline_producer(Some(&master), &c, &ProducerRequest::new(2, ClipState::AudioOnly, TrackKey::new(2, 0)));
        cache.get_timeline_producer(Some(&master), &c, &ProducerRequest::new(3, ClipState::Disabled, TrackKey::new(3, 0)));
        cache.get_timeline_producer(Some(&master), &c, &ProducerRequest::new(4, ClipState::VideoOnly, TrackKey::new(1, 0)).with_speed(3.0));

        cache.apply_property("force_fps", &AttrValue::Str("25".into()));
        assert_eq!(v.get_str("force_fps").as_deref(), Some("25"));

        assert_eq!(cache.clear_all(&fx), 4);
        assert!(cache.is_empty());
        assert_eq!(fx.service_count(), 0);
    }
}
