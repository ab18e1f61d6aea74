//! Core services independent of any asset: events, jobs, thumbnails, workers.

pub mod event_bus;
pub mod jobs;
pub mod thumbs;
pub mod workers;

pub use event_bus::EventBus;
pub use jobs::{JobManager, TaskManager};
pub use thumbs::ThumbnailCache;
pub use workers::Workers;
