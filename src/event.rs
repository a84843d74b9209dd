//! Added/Removed component event channels.
//!
//! The world keeps one channel per direction. Events are FIFO within a
//! frame; whatever is left at frame end is discarded unless a consumer
//! declared a subscription (which marks the channel retained).

use std::any::Any;

use crate::component::ComponentTypeId;
use crate::entity::Entity;

/// One component add or removal.
pub struct ComponentEvent {
    pub entity: Entity,
    pub type_id: ComponentTypeId,
    /// Removal events carry the removed value; add events carry nothing —
    /// the live value is readable from the world at drain time.
    pub payload: Option<Box<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for ComponentEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentEvent")
            .field("entity", &self.entity)
            .field("type_id", &self.type_id)
            .field("payload", &self.payload.is_some())
            .finish()
    }
}

/// FIFO event buffer for one direction.
#[derive(Default)]
pub struct EventChannel {
    events: Vec<ComponentEvent>,
    retained: bool,
    retained_types: Vec<ComponentTypeId>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: ComponentEvent) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Drain every pending event in FIFO order.
    pub fn drain(&mut self) -> Vec<ComponentEvent> {
        std::mem::take(&mut self.events)
    }

    /// Drain only events of one component type, keeping the rest queued.
    pub fn take_matching(&mut self, type_id: ComponentTypeId) -> Vec<ComponentEvent> {
        let mut taken = Vec::new();
        let mut kept = Vec::with_capacity(self.events.len());
        for event in self.events.drain(..) {
            if event.type_id == type_id {
                taken.push(event);
            } else {
                kept.push(event);
            }
        }
        self.events = kept;
        taken
    }

    /// A subscribed consumer keeps all residue alive across frame
    /// boundaries.
    pub fn set_retained(&mut self, retained: bool) {
        self.retained = retained;
    }

    pub fn is_retained(&self) -> bool {
        self.retained
    }

    /// Keep residue of one component type across frame boundaries without
    /// retaining the whole channel.
    pub fn retain_type(&mut self, type_id: ComponentTypeId) {
        if !self.retained_types.contains(&type_id) {
            self.retained_types.push(type_id);
        }
    }

    /// Frame-end policy: drop residue unless someone subscribed.
    pub(crate) fn end_frame(&mut self) {
        if self.retained {
            return;
        }
        if self.retained_types.is_empty() {
            self.events.clear();
        } else {
            let retained_types = &self.retained_types;
            self.events.retain(|e| retained_types.contains(&e.type_id));
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
