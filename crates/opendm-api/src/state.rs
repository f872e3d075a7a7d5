//! Application state injected into every handler.

use std::sync::Arc;

use opendm_events::MessageBus;
use opendm_store::{ComponentRepository, DeviceRepository};

use crate::registry::ConnectionRegistry;

/// The four collaborators of the northbound service. Constructed once at
/// startup and cloned into each handler; nothing here is lazily initialized.
#[derive(Clone)]
pub struct AppState {
    pub devices: Arc<DeviceRepository>,
    pub components: Arc<ComponentRepository>,
    pub registry: Arc<ConnectionRegistry>,
    pub bus: Arc<dyn MessageBus>,
}

impl AppState {
    pub fn new(
        devices: Arc<DeviceRepository>,
        components: Arc<ComponentRepository>,
        registry: Arc<ConnectionRegistry>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            devices,
            components,
            registry,
            bus,
        }
    }
}
