//! MEDIABIN - bin clip producer management for a non-linear editor
//!
//! Each imported asset owns a master producer and hands timelines derived
//! producers (per track, per purpose, per speed) from a cache. Assets track
//! where they are used, and notify those timelines when they are rebuilt.

// Core engine (events, jobs, thumbnails, workers)
pub mod core;

pub mod cli;
pub mod config;
pub mod entities;

pub use core::event_bus::{downcast_event, BoxedEvent, EventBus, EventEmitter};
pub use core::jobs::{JobKind, JobManager, TaskManager};

pub use entities::asset::{Asset, BinContext};
pub use entities::bin::Bin;
pub use entities::{Attrs, AttrValue, ClipStatus, ClipType, Producer, ProducerRequest};
