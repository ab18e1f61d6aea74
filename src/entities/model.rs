//! Project item model collaborator.
//!
//! The bin tree shows name, duration, status and thumbnail of each asset;
//! assets notify the model of every externally visible change.

use log::trace;

use super::timeline::Role;
use crate::core::event_bus::EventEmitter;

pub trait ProjectItemModel: Send + Sync {
    /// Roles of an asset changed.
    fn on_item_updated(&self, asset_id: &str, roles: &[Role]);
    /// Resource of an asset changed; file watching must follow.
    fn update_watcher(&self, asset_id: &str, resource: Option<&str>);
}

/// Emitted when an asset's visible attributes changed
#[derive(Debug, Clone, PartialEq)]
pub struct ItemUpdatedEvent {
    pub asset_id: String,
    pub roles: Vec<Role>,
}

/// Emitted when the watched resource of an asset changed
#[derive(Debug, Clone, PartialEq)]
pub struct WatcherUpdatedEvent {
    pub asset_id: String,
    pub resource: Option<String>,
}

/// Model that forwards notifications to the event bus.
#[derive(Clone)]
pub struct BusModel {
    emitter: EventEmitter,
}

impl BusModel {
    pub fn new(emitter: EventEmitter) -> Self {
        Self { emitter }
    }
}

impl ProjectItemModel for BusModel {
    fn on_item_updated(&self, asset_id: &str, roles: &[Role]) {
        if roles.is_empty() {
            return;
        }
        trace!("model: {} updated {:?}", asset_id, roles);
        self.emitter.emit(ItemUpdatedEvent {
            asset_id: asset_id.to_string(),
            roles: roles.to_vec(),
        });
    }

    fn update_watcher(&self, asset_id: &str, resource: Option<&str>) {
        self.emitter.emit(WatcherUpdatedEvent {
            asset_id: asset_id.to_string(),
            resource: resource.map(str::to_string),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event_bus::{downcast_event, EventBus};

    #[test]
    fn test_bus_model_emits_events() {
        let bus = EventBus::new();
        let model = BusModel::new(bus.emitter());
        model.on_item_updated("a1", &[Role::Duration, Role::Status]);
        model.on_item_updated("a1", &[]);
        model.update_watcher("a1", Some("/m/clip.mp4"));

        let events = bus.poll();
        assert_eq!(events.len(), 2);
        let updated = downcast_event::<ItemUpdatedEvent>(&events[0]).unwrap();
        assert_eq!(updated.roles, vec![Role::Duration, Role::Status]);
        let watched = downcast_event::<WatcherUpdatedEvent>(&events[1]).unwrap();
        assert_eq!(watched.resource.as_deref(), Some("/m/clip.mp4"));
    }
}
