//! Asset type tag and the capabilities the producer cache consults.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Kind of media an asset wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ClipType {
    AV,
    Video,
    Audio,
    Image,
    Color,
    Text,
    TextTemplate,
    QText,
    SlideShow,
    Playlist,
    Timeline,
    #[default]
    Unknown,
}

const VIDEO_EXT: &[&str] = &["mp4", "mov", "mkv", "avi", "webm", "mxf", "m4v", "mpg", "mpeg", "ts"];
const AUDIO_EXT: &[&str] = &["wav", "mp3", "flac", "ogg", "aac", "m4a", "opus", "aiff"];
const IMAGE_EXT: &[&str] = &["png", "jpg", "jpeg", "tif", "tiff", "exr", "bmp", "webp", "tga"];

impl ClipType {
    /// Guess type from a file extension. Videos default to AV since the
    /// probe only learns about missing audio after the first load.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            e if VIDEO_EXT.contains(&e) => ClipType::AV,
            e if AUDIO_EXT.contains(&e) => ClipType::Audio,
            e if IMAGE_EXT.contains(&e) => ClipType::Image,
            "mlt" | "kdenlive" => ClipType::Playlist,
            _ => ClipType::Unknown,
        }
    }

    /// Content is generated or static: one shared producer serves every track.
    pub fn is_fixed_content(self) -> bool {
        matches!(
            self,
            ClipType::Color | ClipType::Image | ClipType::Text | ClipType::TextTemplate | ClipType::QText
        )
    }

    /// Video producers are cached per track (and per playlist).
    pub fn has_per_track_cache(self) -> bool {
        !self.is_fixed_content()
    }

    /// A lower resolution substitute can be generated.
    pub fn supports_proxy(self) -> bool {
        matches!(
            self,
            ClipType::AV | ClipType::Video | ClipType::Image | ClipType::Playlist | ClipType::Timeline
        )
    }

    /// Type carries an audio stream (audio thumbnails apply).
    pub fn has_audio_stream(self) -> bool {
        matches!(self, ClipType::AV | ClipType::Audio | ClipType::Playlist | ClipType::Timeline)
    }

    /// Asset resource is a file on disk (hash reads file bytes).
    pub fn is_file_backed(self) -> bool {
        matches!(
            self,
            ClipType::AV
                | ClipType::Video
                | ClipType::Audio
                | ClipType::Image
                | ClipType::Playlist
                | ClipType::Unknown
        )
    }

    /// Clip can be split into separate audio and video timeline items.
    pub fn is_splittable(self) -> bool {
        matches!(self, ClipType::AV | ClipType::Playlist)
    }

    /// Numeric tag stored in descriptors.
    pub fn as_tag(self) -> i32 {
        match self {
            ClipType::Unknown => -1,
            ClipType::Audio => 1,
            ClipType::Video => 2,
            ClipType::AV => 3,
            ClipType::Color => 4,
            ClipType::Image => 5,
            ClipType::Text => 6,
            ClipType::SlideShow => 7,
            ClipType::Playlist => 9,
            ClipType::TextTemplate => 11,
            ClipType::QText => 12,
            ClipType::Timeline => 13,
        }
    }

    pub fn from_tag(tag: i32) -> Self {
        match tag {
            1 => ClipType::Audio,
            2 => ClipType::Video,
            3 => ClipType::AV,
            4 => ClipType::Color,
            5 => ClipType::Image,
            6 => ClipType::Text,
            7 => ClipType::SlideShow,
            9 => ClipType::Playlist,
            11 => ClipType::TextTemplate,
            12 => ClipType::QText,
            13 => ClipType::Timeline,
            _ => ClipType::Unknown,
        }
    }
}

impl std::fmt::Display for ClipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ClipType::AV => "av",
            ClipType::Video => "video",
            ClipType::Audio => "audio",
            ClipType::Image => "image",
            ClipType::Color => "color",
            ClipType::Text => "text",
            ClipType::TextTemplate => "text-template",
            ClipType::QText => "qtext",
            ClipType::SlideShow => "slideshow",
            ClipType::Playlist => "playlist",
            ClipType::Timeline => "timeline",
            ClipType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path() {
        assert_eq!(ClipType::from_path(Path::new("/a/b.MOV")), ClipType::AV);
        assert_eq!(ClipType::from_path(Path::new("x.flac")), ClipType::Audio);
        assert_eq!(ClipType::from_path(Path::new("x.png")), ClipType::Image);
        assert_eq!(ClipType::from_path(Path::new("noext")), ClipType::Unknown);
    }

    #[test]
    fn test_capabilities() {
        assert!(ClipType::Color.is_fixed_content());
        assert!(!ClipType::Color.has_per_track_cache());
        assert!(ClipType::AV.has_per_track_cache());
        assert!(ClipType::AV.supports_proxy());
        assert!(!ClipType::Audio.supports_proxy());
        assert!(ClipType::AV.is_splittable());
        assert!(!ClipType::Video.is_splittable());
    }

    #[test]
    fn test_tag_roundtrip_known_types() {
        for t in [ClipType::AV, ClipType::Color, ClipType::SlideShow, ClipType::Timeline] {
            assert_eq!(ClipType::from_tag(t.as_tag()), t);
        }
        assert_eq!(ClipType::from_tag(42), ClipType::Unknown);
    }
}
