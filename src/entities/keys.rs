//! Property key constants for descriptor and producer `Attrs`.
//!
//! Avoid string typos, enable IDE autocomplete.
//! Usage: `descriptor.get_str(A_RESOURCE)`

// === Identity ===
/// Media resource (file path, color spec, or inline payload)
pub const A_RESOURCE: &str = "resource";
/// Engine service name used to open the resource
pub const A_SERVICE: &str = "mlt_service";
/// User-visible clip name
pub const A_CLIP_NAME: &str = "clipname";
/// Clip type tag (numeric `ClipType`)
pub const A_TYPE: &str = "type";
/// Modification date, seconds since epoch
pub const A_DATE: &str = "date";

// === Timing ===
/// Producer length in frames
pub const A_LENGTH: &str = "length";
/// Playable duration in frames (may be shorter than length)
pub const A_DURATION: &str = "duration";
/// Per-frame duration for image sequences / slideshows
pub const A_TTL: &str = "ttl";
/// Original frame rate
pub const A_FPS: &str = "fps";
/// Sub-clip zone start
pub const A_ZONE_IN: &str = "zone_in";
/// Sub-clip zone end
pub const A_ZONE_OUT: &str = "zone_out";

// === Media info ===
pub const A_WIDTH: &str = "width";
pub const A_HEIGHT: &str = "height";
pub const A_HAS_AUDIO: &str = "has_audio";
pub const A_HAS_VIDEO: &str = "has_video";
/// Number of audio channels reported by the probe
pub const A_AUDIO_CHANNELS: &str = "audio_channels";
/// Pixel format reported by the probe (alpha detection)
pub const A_PIX_FMT: &str = "pix_fmt";
/// Selected audio stream
pub const A_AUDIO_INDEX: &str = "audio_index";
/// Selected video stream
pub const A_VIDEO_INDEX: &str = "video_index";

// === Proxy ===
/// Proxy resource path; empty or "-" means no proxy
pub const A_PROXY: &str = "proxy";
/// Original resource kept while a proxy is substituted
pub const A_ORIGINAL_URL: &str = "original_url";
/// Force regeneration of an existing proxy file
pub const A_OVERWRITE_PROXY: &str = "_overwriteproxy";

// === Content hash ===
/// Cached content hash (hex)
pub const A_FILE_HASH: &str = "file_hash";
/// File size recorded alongside the hash
pub const A_FILE_SIZE: &str = "file_size";

// === Text / generated content ===
pub const A_XMLDATA: &str = "xmldata";
pub const A_TEXT: &str = "text";
pub const A_TEMPLATE_TEXT: &str = "templatetext";
pub const A_AUTOROTATE: &str = "autorotate";

// === Producer runtime flags ===
/// Audio rendering disabled when true
pub const A_AUDIO_OFF: &str = "set.test_audio";
/// Video rendering disabled when true
pub const A_VIDEO_OFF: &str = "set.test_image";
/// Timewarp speed on a warp producer
pub const A_WARP_SPEED: &str = "warp_speed";
/// Original resource wrapped by a warp producer
pub const A_WARP_RESOURCE: &str = "warp_resource";
/// Per-audio-stream effect names, `stream_effects.<index>` -> List
pub const A_STREAM_EFFECTS_PREFIX: &str = "stream_effects.";

/// Properties forwarded to every derived producer when edited.
pub const PASS_PROPERTIES: &[&str] = &[
    "force_aspect_ratio",
    A_VIDEO_INDEX,
    A_AUDIO_INDEX,
    "set.force_full_luma",
    "full_luma",
    "threads",
    "force_colorspace",
    "force_tff",
    "force_progressive",
    "force_fps",
];

/// Slideshow keys whose edit requires a full rebuild.
pub const SLIDESHOW_RELOAD_KEYS: &[&str] = &[
    "luma_duration",
    "luma_file",
    "fade",
    A_TTL,
    "softness",
    "crop",
    "animation",
];

/// Keys that change the content identity and so invalidate the hash.
pub const IDENTITY_KEYS: &[&str] = &[A_RESOURCE, A_XMLDATA, A_TEXT, A_TEMPLATE_TEXT, A_PROXY];

/// Descriptor keys that never take part in identity comparisons.
pub const RUNTIME_KEYS: &[&str] = &[A_FILE_HASH, A_FILE_SIZE, A_OVERWRITE_PROXY];
