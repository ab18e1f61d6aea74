//! Producer: opaque playable resource handle.
//!
//! A `Producer` is either an *original* (owns its own decoder state) or a
//! *cut* of one. Cuts share the original's state through an `Arc` and only
//! carry their own in/out points, so a timeline can trim a cut without
//! touching anything shared. `clone_producer()` creates a new original with
//! a copy of the properties (independent decoder state).
//!
//! Identity: two handles "share state" iff they point at the same original,
//! see [`Producer::shares_state_with`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::trace;
use once_cell::sync::Lazy;
use uuid::Uuid;

use super::attrs::{AttrValue, Attrs};
use super::keys::*;

/// Service name of the placeholder served when media is unavailable
pub const UNAVAILABLE_SERVICE: &str = "media_unavailable";
/// Service name of speed-changed producers
pub const TIMEWARP_SERVICE: &str = "timewarp";
/// Property holding remap keyframes on a warp producer
pub const A_TIME_MAP: &str = "time_map";

static MEDIA_UNAVAILABLE: Lazy<Producer> = Lazy::new(|| {
    let mut props = Attrs::new();
    props.set_str(A_SERVICE, UNAVAILABLE_SERVICE);
    props.set_str(A_RESOURCE, "<media unavailable>");
    props.set(A_LENGTH, AttrValue::Int(i32::MAX));
    Producer::from_shared(Shared::new(props, true, true))
});

/// State shared by an original and all of its cuts.
struct Shared {
    id: Uuid,
    valid: bool,
    placeholder: bool,
    props: Mutex<Attrs>,
    effects: Mutex<Vec<String>>,
    /// First claimant of a restored timeline producer wins
    claimed: AtomicBool,
}

impl Shared {
    fn new(props: Attrs, valid: bool, placeholder: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            valid,
            placeholder,
            props: Mutex::new(props),
            effects: Mutex::new(Vec::new()),
            claimed: AtomicBool::new(false),
        }
    }
}

/// Playable resource handle (original or cut).
#[derive(Clone)]
pub struct Producer {
    shared: Arc<Shared>,
    /// (in, out) for cuts, `None` for originals
    trim: Option<(i32, i32)>,
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("id", &self.shared.id)
            .field("service", &self.service())
            .field("valid", &self.shared.valid)
            .field("trim", &self.trim)
            .finish()
    }
}

impl Producer {
    /// Create a valid original from a property snapshot.
    pub fn new(props: Attrs) -> Self {
        Self::from_shared(Shared::new(props, true, false))
    }

    /// Create an original that failed to open (kept for diagnostics).
    pub fn invalid(props: Attrs) -> Self {
        Self::from_shared(Shared::new(props, false, false))
    }

    fn from_shared(shared: Shared) -> Self {
        Self {
            shared: Arc::new(shared),
            trim: None,
        }
    }

    /// Shared "media unavailable" original. Hand out cuts of it, never the original.
    pub fn media_unavailable() -> Producer {
        MEDIA_UNAVAILABLE.clone()
    }

    /// Build a speed-changed producer over `source`.
    ///
    /// Length becomes `round(length / |speed|)`; a per-frame `ttl` is scaled the
    /// same way with a floor of 1. With `remap` the speed is ignored and the
    /// keyframes are stored for the engine to interpret.
    pub fn timewarp(source: &Producer, speed: f64, remap: Option<&str>) -> Producer {
        let mut props = source.props();
        let resource = source.resource().unwrap_or_default();
        let original_length = source.length();

        props.set_str(A_SERVICE, TIMEWARP_SERVICE);
        props.set_str(A_WARP_RESOURCE, resource.clone());
        props.remove(A_FILE_HASH);

        match remap {
            Some(map) => {
                props.set(A_WARP_SPEED, AttrValue::Double(1.0));
                props.set_str(A_TIME_MAP, map);
                props.set_str(A_RESOURCE, format!("timewarp:remap:{}", resource));
                props.set(A_LENGTH, AttrValue::Int(original_length));
            }
            None => {
                props.set(A_WARP_SPEED, AttrValue::Double(speed));
                props.remove(A_TIME_MAP);
                props.set_str(A_RESOURCE, format!("timewarp:{}:{}", speed, resource));
                props.set(A_LENGTH, AttrValue::Int(warped_length(original_length, speed)));
                if let Some(ttl) = source.get_i32(A_TTL) {
                    props.set(A_TTL, AttrValue::Int(warped_ttl(ttl, speed)));
                }
            }
        }

        trace!("timewarp producer: speed={} remap={} length {} -> {:?}",
            speed, remap.is_some(), original_length, props.get_i32(A_LENGTH));
        Producer::new(props)
    }

    // --- Identity ---

    /// Id of the underlying original (shared by all cuts)
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Parent original id, `None` when this handle is itself an original.
    pub fn parent_id(&self) -> Option<Uuid> {
        self.trim.map(|_| self.shared.id)
    }

    pub fn is_cut(&self) -> bool {
        self.trim.is_some()
    }

    pub fn is_valid(&self) -> bool {
        self.shared.valid
    }

    pub fn is_placeholder(&self) -> bool {
        self.shared.placeholder
    }

    /// True when both handles use the same underlying original.
    pub fn shares_state_with(&self, other: &Producer) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// The original behind a cut (same shared state, no trim).
    pub fn parent(&self) -> Producer {
        Producer {
            shared: Arc::clone(&self.shared),
            trim: None,
        }
    }

    // --- Cuts ---

    /// Cut covering the whole producer.
    pub fn cut(&self) -> Producer {
        self.cut_range(0, self.length().saturating_sub(1))
    }

    /// Cut with explicit in/out points. `-1` as in-point means "from start".
    pub fn cut_range(&self, in_point: i32, out_point: i32) -> Producer {
        Producer {
            shared: Arc::clone(&self.shared),
            trim: Some((in_point, out_point)),
        }
    }

    pub fn in_point(&self) -> i32 {
        self.trim.map(|(i, _)| i).unwrap_or(0)
    }

    pub fn out_point(&self) -> i32 {
        self.trim
            .map(|(_, o)| o)
            .unwrap_or_else(|| self.length().saturating_sub(1))
    }

    /// Set trim of a cut. Originals are never trimmed.
    pub fn set_in_and_out(&mut self, in_point: i32, out_point: i32) {
        if self.trim.is_some() {
            self.trim = Some((in_point, out_point));
        }
    }

    /// New original with the same properties and its own decoder state.
    pub fn clone_producer(&self) -> Producer {
        let props = self.props();
        if self.shared.valid {
            Producer::new(props)
        } else {
            Producer::invalid(props)
        }
    }

    // --- Claim flag ---

    /// Mark the original as owned by an asset cache. Returns false if another
    /// claimant got there first.
    pub fn claim(&self) -> bool {
        self.shared
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_claimed(&self) -> bool {
        self.shared.claimed.load(Ordering::Acquire)
    }

    // --- Properties ---

    /// Snapshot of all properties
    pub fn props(&self) -> Attrs {
        self.shared.props.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set(&self, key: &str, value: AttrValue) {
        self.shared
            .props
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .set(key, value);
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.shared
            .props
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_str(key)
            .map(|s| s.to_string())
    }

    pub fn get_i32(&self, key: &str) -> Option<i32> {
        self.shared.props.lock().unwrap_or_else(|e| e.into_inner()).get_i32(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.shared.props.lock().unwrap_or_else(|e| e.into_inner()).get_f64(key)
    }

    pub fn service(&self) -> String {
        self.get_str(A_SERVICE).unwrap_or_default()
    }

    pub fn resource(&self) -> Option<String> {
        self.get_str(A_RESOURCE)
    }

    /// Length in frames (0 when unknown)
    pub fn length(&self) -> i32 {
        self.get_i32(A_LENGTH).unwrap_or(0).max(0)
    }

    /// Warp speed; 1.0 for non-warp producers
    pub fn warp_speed(&self) -> f64 {
        self.get_f64(A_WARP_SPEED).unwrap_or(1.0)
    }

    pub fn time_map(&self) -> Option<String> {
        self.get_str(A_TIME_MAP)
    }

    pub fn set_audio_enabled(&self, enabled: bool) {
        self.set(A_AUDIO_OFF, AttrValue::Bool(!enabled));
    }

    pub fn set_video_enabled(&self, enabled: bool) {
        self.set(A_VIDEO_OFF, AttrValue::Bool(!enabled));
    }

    pub fn audio_enabled(&self) -> bool {
        !self.shared.props.lock().unwrap_or_else(|e| e.into_inner()).get_bool_or(A_AUDIO_OFF, false)
    }

    pub fn video_enabled(&self) -> bool {
        !self.shared.props.lock().unwrap_or_else(|e| e.into_inner()).get_bool_or(A_VIDEO_OFF, false)
    }

    // --- Effects ---

    pub fn attach_effect(&self, name: impl Into<String>) {
        self.shared.effects.lock().unwrap_or_else(|e| e.into_inner()).push(name.into());
    }

    pub fn effects(&self) -> Vec<String> {
        self.shared.effects.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Warped length: `round(length / |speed|)`.
pub fn warped_length(length: i32, speed: f64) -> i32 {
    let s = speed.abs();
    if s < f64::EPSILON {
        return length;
    }
    (length as f64 / s).round() as i32
}

/// Warped per-frame duration: `max(1, round(ttl / |speed|))`.
pub fn warped_ttl(ttl: i32, speed: f64) -> i32 {
    warped_length(ttl, speed).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_master(length: i32) -> Producer {
        let mut props = Attrs::new();
        props.set_str(A_RESOURCE, "/media/clip.mp4");
        props.set_str(A_SERVICE, "avformat");
        props.set(A_LENGTH, AttrValue::Int(length));
        Producer::new(props)
    }

    #[test]
    fn test_cut_shares_state_but_not_trim() {
        let master = make_master(300);
        let mut a = master.cut();
        let b = master.cut_range(10, 20);

        assert!(a.shares_state_with(&b));
        assert!(a.shares_state_with(&master));
        assert_eq!(a.parent_id(), Some(master.id()));
        assert_eq!(master.parent_id(), None);

        a.set_in_and_out(5, 6);
        assert_eq!((a.in_point(), a.out_point()), (5, 6));
        assert_eq!((b.in_point(), b.out_point()), (10, 20));
        assert_eq!(master.out_point(), 299);
    }

    #[test]
    fn test_clone_is_independent() {
        let master = make_master(300);
        let copy = master.clone_producer();
        assert!(!copy.shares_state_with(&master));
        assert_ne!(copy.id(), master.id());

        copy.set_audio_enabled(false);
        assert!(!copy.audio_enabled());
        assert!(master.audio_enabled());
    }

    #[test]
    fn test_claim_first_writer_wins() {
        let master = make_master(10);
        let cut = master.cut();
        assert!(!master.is_claimed());
        assert!(cut.claim());
        assert!(!master.claim());
        assert!(master.is_claimed());
    }

    #[test]
    fn test_timewarp_length_law() {
        let master = make_master(300);
        let fast = Producer::timewarp(&master, 2.0, None);
        assert_eq!(fast.length(), 150);
        assert_eq!(fast.warp_speed(), 2.0);
        assert_eq!(fast.service(), TIMEWARP_SERVICE);

        let slow = Producer::timewarp(&master, 1.5, None);
        assert_eq!(slow.length(), 200);

        let reverse = Producer::timewarp(&master, -2.0, None);
        assert_eq!(reverse.length(), 150);
    }

    #[test]
    fn test_timewarp_scales_ttl_with_floor() {
        let master = make_master(100);
        master.set(A_TTL, AttrValue::Int(25));
        assert_eq!(Producer::timewarp(&master, 2.0, None).get_i32(A_TTL), Some(13));
        assert_eq!(Producer::timewarp(&master, 100.0, None).get_i32(A_TTL), Some(1));
        assert_eq!(warped_ttl(1, 4.0), 1);
    }

    #[test]
    fn test_timewarp_remap_keeps_length() {
        let master = make_master(120);
        let warp = Producer::timewarp(&master, 1.0, Some("0=0;119=60"));
        assert_eq!(warp.length(), 120);
        assert_eq!(warp.time_map().as_deref(), Some("0=0;119=60"));
    }

    #[test]
    fn test_media_unavailable_is_shared_placeholder() {
        let a = Producer::media_unavailable();
        let b = Producer::media_unavailable();
        assert!(a.is_placeholder());
        assert!(a.shares_state_with(&b));
        assert_eq!(a.service(), UNAVAILABLE_SERVICE);
    }
}
