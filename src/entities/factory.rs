//! Master producer construction.
//!
//! The engine behind a producer is opaque here: a factory turns a descriptor
//! snapshot into a [`Producer`] or explains why it could not.

use std::path::Path;

use log::{debug, trace};
use thiserror::Error;

use super::attrs::{AttrValue, Attrs};
use super::clip_type::ClipType;
use super::handle::Producer;
use super::keys::*;

/// Default length for generated content without an explicit duration
pub const DEFAULT_STILL_LENGTH: i32 = 250;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProducerError {
    #[error("descriptor has no resource")]
    EmptyResource,
    #[error("resource not found: {0}")]
    ResourceNotFound(String),
    #[error("cannot open {path}: {reason}")]
    OpenFailed { path: String, reason: String },
    #[error("job cancelled")]
    Cancelled,
}

/// Builds master producers from descriptors.
pub trait ProducerFactory: Send + Sync {
    fn build(&self, descriptor: &Attrs, clip_type: ClipType) -> Result<Producer, ProducerError>;
}

/// Factory that checks file-backed resources exist and copies the
/// descriptor into the producer properties.
#[derive(Debug, Default, Clone)]
pub struct ResourceProbe;

impl ResourceProbe {
    pub fn new() -> Self {
        Self
    }

    fn service_for(clip_type: ClipType) -> &'static str {
        match clip_type {
            ClipType::Color => "color",
            ClipType::Image | ClipType::SlideShow => "qimage",
            ClipType::Text | ClipType::TextTemplate => "kdenlivetitle",
            ClipType::QText => "qtext",
            ClipType::Playlist => "xml",
            ClipType::Timeline => "tractor",
            _ => "avformat",
        }
    }
}

impl ProducerFactory for ResourceProbe {
    fn build(&self, descriptor: &Attrs, clip_type: ClipType) -> Result<Producer, ProducerError> {
        let resource = descriptor.get_nonempty_str(A_RESOURCE);
        if clip_type.is_file_backed() {
            let resource = resource.ok_or(ProducerError::EmptyResource)?;
            let path = Path::new(resource);
            if !path.exists() {
                return Err(ProducerError::ResourceNotFound(resource.to_string()));
            }
            if path.is_dir() {
                return Err(ProducerError::OpenFailed {
                    path: resource.to_string(),
                    reason: "is a directory".into(),
                });
            }
        } else if resource.is_none()
            && descriptor.get_nonempty_str(A_XMLDATA).is_none()
            && descriptor.get_nonempty_str(A_TEXT).is_none()
        {
            return Err(ProducerError::EmptyResource);
        }

        let mut props = descriptor.clone();
        if !props.contains(A_SERVICE) {
            props.set_str(A_SERVICE, Self::service_for(clip_type));
        }
        let length = descriptor
            .get_i32(A_LENGTH)
            .or_else(|| descriptor.get_i32(A_DURATION))
            .unwrap_or(DEFAULT_STILL_LENGTH);
        props.set(A_LENGTH, AttrValue::Int(length));
        if !props.contains(A_HAS_AUDIO) {
            props.set(A_HAS_AUDIO, AttrValue::Bool(clip_type.has_audio_stream()));
        }
        if !props.contains(A_HAS_VIDEO) {
            props.set(A_HAS_VIDEO, AttrValue::Bool(clip_type != ClipType::Audio));
        }
        for key in RUNTIME_KEYS {
            props.remove(key);
        }

        trace!("probe: {} {:?} length={}", clip_type, resource, length);
        let producer = Producer::new(props);
        debug!("built {} producer {}", clip_type, producer.id());
        Ok(producer)
    }
}
