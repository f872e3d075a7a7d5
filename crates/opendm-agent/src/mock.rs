//! Scripted in-process adapter for service-layer tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use opendm_core::wire::{
    GetLogLevelRequest, GetLogLevelResponse, GetLoggableEntitiesRequest,
    GetLoggingEndpointResponse, Hardware, HardwareId, HwComponentInfoGetRequest,
    HwComponentInfoGetResponse, HwComponentInfoSetRequest, HwComponentInfoSetResponse,
    ModifiableComponent, PhysicalInventoryResponse, SetLogLevelRequest, SetLogLevelResponse,
    SetLoggingEndpointRequest, SetRemoteEndpointResponse, StartManagingDeviceResponse,
    StopManagingDeviceRequest, StopManagingDeviceResponse,
};
use opendm_core::{DeviceRecord, HwCompRecord};
use opendm_store::DeviceRepository;

use crate::adapter::{forward, Adapter, AdapterFactory, FrameSender};
use crate::error::AgentError;

/// Adapter whose behavior is fixed up front. Counts connect/disconnect
/// invocations for assertions against the registry lifecycle.
pub struct MockAdapter {
    device_uuid: String,
    fail_connect: bool,
    establish: bool,
    devices: Option<Arc<DeviceRepository>>,
    inventory: Option<Hardware>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl MockAdapter {
    pub fn new(device_uuid: impl Into<String>) -> Self {
        Self {
            device_uuid: device_uuid.into(),
            fail_connect: false,
            establish: true,
            devices: None,
            inventory: None,
            connects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// Persist uuid + lookup rows on a successful start, like the real
    /// adapter does.
    pub fn with_device_repo(mut self, devices: Arc<DeviceRepository>) -> Self {
        self.devices = Some(devices);
        self
    }

    /// Every `connect` fails.
    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    /// `start_managing_device` ends cleanly without a success frame.
    pub fn refusing_start(mut self) -> Self {
        self.establish = false;
        self
    }

    pub fn with_inventory(mut self, inventory: Hardware) -> Self {
        self.inventory = Some(inventory);
        self
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    async fn connect(&self) -> Result<(), AgentError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(AgentError::ConnectionFailed("scripted failure".into()));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), AgentError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn start_managing_device(
        &self,
        rec: &mut DeviceRecord,
        _req: &ModifiableComponent,
        tx: &FrameSender<StartManagingDeviceResponse>,
    ) -> Result<bool, AgentError> {
        if !self.establish {
            return Ok(false);
        }
        rec.uuid = self.device_uuid.clone();
        if let Some(devices) = &self.devices {
            let _ = devices.put_by_name(rec).await;
            let _ = devices.put_uuid_lookup(rec).await;
        }
        forward(tx, StartManagingDeviceResponse::ok(&self.device_uuid)).await?;
        Ok(true)
    }

    async fn stop_managing_device(
        &self,
        _rec: &DeviceRecord,
        _req: &StopManagingDeviceRequest,
    ) -> Result<StopManagingDeviceResponse, AgentError> {
        Ok(StopManagingDeviceResponse::ok())
    }

    async fn get_physical_inventory(
        &self,
        _rec: &mut DeviceRecord,
        tx: &FrameSender<PhysicalInventoryResponse>,
    ) -> Result<(), AgentError> {
        if let Some(hw) = &self.inventory {
            forward(tx, PhysicalInventoryResponse::ok(hw.clone())).await?;
        }
        Ok(())
    }

    async fn get_hw_component_info(
        &self,
        _dev_uuid: &str,
        rec: &mut HwCompRecord,
        _req: &HwComponentInfoGetRequest,
        tx: &FrameSender<HwComponentInfoGetResponse>,
    ) -> Result<(), AgentError> {
        let mut node = opendm_core::wire::Component::default();
        node.name = rec.name.clone();
        node.uuid = rec.uuid.clone();
        forward(tx, HwComponentInfoGetResponse::ok(node)).await?;
        Ok(())
    }

    async fn set_hw_component_info(
        &self,
        _dev_uuid: &str,
        rec: &mut HwCompRecord,
        req: &HwComponentInfoSetRequest,
    ) -> Result<HwComponentInfoSetResponse, AgentError> {
        rec.apply_changes(&req.changes);
        Ok(HwComponentInfoSetResponse::ok())
    }

    async fn set_logging_endpoint(
        &self,
        rec: &mut DeviceRecord,
        req: &SetLoggingEndpointRequest,
    ) -> Result<SetRemoteEndpointResponse, AgentError> {
        rec.logging.end_point = req.logging_endpoint.clone();
        rec.logging.protocol = req.logging_protocol.clone();
        Ok(SetRemoteEndpointResponse::ok())
    }

    async fn get_logging_endpoint(
        &self,
        rec: &mut DeviceRecord,
        _req: &HardwareId,
    ) -> Result<GetLoggingEndpointResponse, AgentError> {
        Ok(GetLoggingEndpointResponse::ok(
            rec.logging.end_point.clone(),
            rec.logging.protocol.clone(),
        ))
    }

    async fn get_loggable_entities(
        &self,
        rec: &mut DeviceRecord,
        req: &GetLoggableEntitiesRequest,
    ) -> Result<GetLogLevelResponse, AgentError> {
        let groups = rec.loggable_entities_view(&[]).unwrap_or_default();
        Ok(GetLogLevelResponse::ok(&req.device_uuid, groups))
    }

    async fn set_log_level(
        &self,
        rec: &mut DeviceRecord,
        req: &SetLogLevelRequest,
    ) -> Result<SetLogLevelResponse, AgentError> {
        rec.merge_loggable_entities(&req.loglevels);
        Ok(SetLogLevelResponse::ok(&req.device_uuid))
    }

    async fn get_log_level(
        &self,
        rec: &mut DeviceRecord,
        req: &GetLogLevelRequest,
    ) -> Result<GetLogLevelResponse, AgentError> {
        let groups = rec.loggable_entities_view(&req.entities).unwrap_or_default();
        Ok(GetLogLevelResponse::ok(&req.device_uuid, groups))
    }
}

/// Factory handing out one shared mock instance, so tests keep a handle on
/// its counters while the registry owns the adapter.
pub struct MockAdapterFactory {
    adapter: Arc<MockAdapter>,
}

impl MockAdapterFactory {
    pub fn new(adapter: Arc<MockAdapter>) -> Self {
        Self { adapter }
    }
}

impl AdapterFactory for MockAdapterFactory {
    fn create(&self, _rec: &DeviceRecord) -> Result<Arc<dyn Adapter>, AgentError> {
        Ok(self.adapter.clone())
    }
}
