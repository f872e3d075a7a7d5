//! The adapter capability set and the make-keyed factory table.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use opendm_core::wire::{
    GetLogLevelRequest, GetLogLevelResponse, GetLoggableEntitiesRequest,
    GetLoggingEndpointResponse, HardwareId, HwComponentInfoGetRequest, HwComponentInfoGetResponse,
    HwComponentInfoSetRequest, HwComponentInfoSetResponse, ModifiableComponent,
    PhysicalInventoryResponse, SetLogLevelRequest, SetLogLevelResponse, SetLoggingEndpointRequest,
    SetRemoteEndpointResponse, StartManagingDeviceResponse, StopManagingDeviceRequest,
    StopManagingDeviceResponse,
};
use opendm_core::{DeviceRecord, HwCompRecord};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::AgentError;

/// Bounded forwarding channel toward the northbound caller. Capacity one:
/// the streaming loop never buffers more than a single frame.
pub type FrameSender<T> = mpsc::Sender<T>;

/// Capability set every southbound adapter implements.
///
/// Streaming calls take the northbound `FrameSender` directly so frames are
/// forwarded as they arrive; unary calls return the device's typed response
/// whether its status is OK or ERROR. Repository reconciliation happens
/// inside the adapter as the per-RPC side-effects fire.
#[async_trait]
pub trait Adapter: Send + Sync {
    async fn connect(&self) -> Result<(), AgentError>;

    async fn disconnect(&self) -> Result<(), AgentError>;

    /// Returns whether a managed connection was established, i.e. at least
    /// one success frame was seen.
    async fn start_managing_device(
        &self,
        rec: &mut DeviceRecord,
        req: &ModifiableComponent,
        tx: &FrameSender<StartManagingDeviceResponse>,
    ) -> Result<bool, AgentError>;

    async fn stop_managing_device(
        &self,
        rec: &DeviceRecord,
        req: &StopManagingDeviceRequest,
    ) -> Result<StopManagingDeviceResponse, AgentError>;

    async fn get_physical_inventory(
        &self,
        rec: &mut DeviceRecord,
        tx: &FrameSender<PhysicalInventoryResponse>,
    ) -> Result<(), AgentError>;

    async fn get_hw_component_info(
        &self,
        dev_uuid: &str,
        rec: &mut HwCompRecord,
        req: &HwComponentInfoGetRequest,
        tx: &FrameSender<HwComponentInfoGetResponse>,
    ) -> Result<(), AgentError>;

    async fn set_hw_component_info(
        &self,
        dev_uuid: &str,
        rec: &mut HwCompRecord,
        req: &HwComponentInfoSetRequest,
    ) -> Result<HwComponentInfoSetResponse, AgentError>;

    async fn set_logging_endpoint(
        &self,
        rec: &mut DeviceRecord,
        req: &SetLoggingEndpointRequest,
    ) -> Result<SetRemoteEndpointResponse, AgentError>;

    async fn get_logging_endpoint(
        &self,
        rec: &mut DeviceRecord,
        req: &HardwareId,
    ) -> Result<GetLoggingEndpointResponse, AgentError>;

    async fn get_loggable_entities(
        &self,
        rec: &mut DeviceRecord,
        req: &GetLoggableEntitiesRequest,
    ) -> Result<GetLogLevelResponse, AgentError>;

    async fn set_log_level(
        &self,
        rec: &mut DeviceRecord,
        req: &SetLogLevelRequest,
    ) -> Result<SetLogLevelResponse, AgentError>;

    async fn get_log_level(
        &self,
        rec: &mut DeviceRecord,
        req: &GetLogLevelRequest,
    ) -> Result<GetLogLevelResponse, AgentError>;
}

/// Builds an adapter for one device record.
pub trait AdapterFactory: Send + Sync {
    fn create(&self, rec: &DeviceRecord) -> Result<Arc<dyn Adapter>, AgentError>;
}

/// Registration table `make → factory`; unknown makes fall back to the
/// default factory.
pub struct AdapterTable {
    default: Arc<dyn AdapterFactory>,
    by_make: HashMap<String, Arc<dyn AdapterFactory>>,
}

impl AdapterTable {
    pub fn new(default: Arc<dyn AdapterFactory>) -> Self {
        Self {
            default,
            by_make: HashMap::new(),
        }
    }

    pub fn register(&mut self, make: impl Into<String>, factory: Arc<dyn AdapterFactory>) {
        self.by_make.insert(make.into(), factory);
    }

    pub fn create(&self, rec: &DeviceRecord) -> Result<Arc<dyn Adapter>, AgentError> {
        match self.by_make.get(&rec.make) {
            Some(factory) => factory.create(rec),
            None => {
                debug!(make = %rec.make, device = %rec.name, "using default adapter");
                self.default.create(rec)
            }
        }
    }
}

/// Forward one frame northbound. A closed receiver means the caller hung up.
pub(crate) async fn forward<T: Send>(tx: &FrameSender<T>, frame: T) -> Result<(), AgentError> {
    tx.send(frame).await.map_err(|_| AgentError::Cancelled)
}
