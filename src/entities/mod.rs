//! Entities: assets, their producers and the bookkeeping around them.
//!
//! - `handle` / `factory`: playable producer handles and how they are built
//! - `producer_cache`: derived producers per track, purpose and speed
//! - `asset` / `reload`: one imported media source and its lifecycle
//! - `registry` / `timeline`: where an asset is used
//! - `bin`: the set of assets and the glue to background jobs

pub mod asset;
pub mod attrs;
pub mod bin;
pub mod clip_type;
pub mod effects;
pub mod factory;
pub mod handle;
pub mod hash;
pub mod keys;
pub mod model;
pub mod producer_cache;
pub mod registry;
pub mod reload;
pub mod status;
pub mod timeline;

pub use attrs::{AttrValue, Attrs};
pub use clip_type::ClipType;
pub use handle::Producer;
pub use producer_cache::{ProducerCache, ProducerRequest};
pub use reload::PropertyChange;
pub use status::ClipStatus;
pub use timeline::{ClipState, Role, TimelineInstance, TrackKey};
