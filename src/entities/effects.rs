//! Shared effect pipeline of an asset.
//!
//! Bin-level effects apply to every derived producer, so each cache
//! insertion/eviction is mirrored here as `add_service`/`remove_service`.

use std::sync::Mutex;

use indexmap::IndexMap;
use log::trace;
use uuid::Uuid;

use super::handle::Producer;

/// Effect pipeline collaborator.
pub trait EffectPipeline: Send + Sync {
    /// Start applying the asset's effects to `producer`.
    fn add_service(&self, producer: &Producer);
    /// Stop tracking `producer`.
    fn remove_service(&self, producer: &Producer);
    /// Number of producers currently tracked
    fn service_count(&self) -> usize;
    fn has_service(&self, producer: &Producer) -> bool;
}

#[derive(Debug, Default)]
struct StackState {
    effects: Vec<String>,
    services: IndexMap<Uuid, Producer>,
    enabled: bool,
}

/// In-process effect stack: a list of effect names applied to every service.
#[derive(Debug)]
pub struct EffectStack {
    state: Mutex<StackState>,
}

impl Default for EffectStack {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectStack {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StackState {
                enabled: true,
                ..Default::default()
            }),
        }
    }

    /// Append an effect and push it to every tracked service.
    pub fn append_effect(&self, name: impl Into<String>) {
        let name = name.into();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.enabled {
            for service in state.services.values() {
                service.attach_effect(name.clone());
            }
        }
        state.effects.push(name);
    }

    pub fn effects(&self) -> Vec<String> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).effects.clone()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).enabled = enabled;
    }
}

impl EffectPipeline for EffectStack {
    fn add_service(&self, producer: &Producer) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.services.contains_key(&producer.id()) {
            return;
        }
        if state.enabled {
            let attached = producer.effects();
            for effect in &state.effects {
                if !attached.contains(effect) {
                    producer.attach_effect(effect.clone());
                }
            }
        }
        trace!("effect stack: add service {}", producer.id());
        state.services.insert(producer.id(), producer.parent());
    }

    fn remove_service(&self, producer: &Producer) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.services.shift_remove(&producer.id()).is_some() {
            trace!("effect stack: remove service {}", producer.id());
        }
    }

    fn service_count(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).services.len()
    }

    fn has_service(&self, producer: &Producer) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .services
            .contains_key(&producer.id())
    }
}
