//! Default adapter: the shared wire contract over HTTP, with repository
//! reconciliation applied per frame.

use std::sync::Arc;

use async_trait::async_trait;
use opendm_core::wire::{
    GetLogLevelRequest, GetLogLevelResponse, GetLoggableEntitiesRequest,
    GetLoggingEndpointResponse, HardwareId, HwComponentInfoGetRequest, HwComponentInfoGetResponse,
    HwComponentInfoSetRequest, HwComponentInfoSetResponse, ModifiableComponent,
    PhysicalInventoryResponse, Reason, SetLogLevelRequest, SetLogLevelResponse,
    SetLoggingEndpointRequest, SetRemoteEndpointResponse, StartManagingDeviceResponse, Status,
    StopManagingDeviceRequest, StopManagingDeviceResponse,
};
use opendm_core::{DeviceRecord, HwCompRecord};
use opendm_store::{ComponentRepository, DeviceRepository, StoreError};
use tracing::{debug, error, info, warn};

use crate::adapter::{forward, Adapter, AdapterFactory, FrameSender};
use crate::client::{AgentClient, AgentSettings};
use crate::error::AgentError;

/// Adapter for one device agent. The repositories are injected at
/// construction so streamed responses can be reconciled without the adapter
/// reaching back into the service layer.
pub struct HttpAdapter {
    client: AgentClient,
    devices: Arc<DeviceRepository>,
    components: Arc<ComponentRepository>,
}

impl HttpAdapter {
    pub fn new(
        uri: &str,
        settings: AgentSettings,
        devices: Arc<DeviceRepository>,
        components: Arc<ComponentRepository>,
    ) -> Result<Self, AgentError> {
        Ok(Self {
            client: AgentClient::new(uri, settings)?,
            devices,
            components,
        })
    }

    /// Persistence inside a streaming loop is best-effort: the frame still
    /// flows northbound and the next refresh converges the record.
    fn log_store_failure(op: &str, err: StoreError) {
        error!(op, error = %err, "repository update from southbound frame failed");
    }
}

#[async_trait]
impl Adapter for HttpAdapter {
    async fn connect(&self) -> Result<(), AgentError> {
        self.client.connect().await
    }

    async fn disconnect(&self) -> Result<(), AgentError> {
        debug!(agent = %self.client.base_url(), "disconnecting agent session");
        Ok(())
    }

    async fn start_managing_device(
        &self,
        rec: &mut DeviceRecord,
        req: &ModifiableComponent,
        tx: &FrameSender<StartManagingDeviceResponse>,
    ) -> Result<bool, AgentError> {
        let mut established = false;

        let mut stream = match self.client.start_managing_device(req).await {
            Ok(stream) => stream,
            Err(e) => {
                forward(
                    tx,
                    StartManagingDeviceResponse::error(Reason::InternalError, e.to_string()),
                )
                .await?;
                return Ok(false);
            }
        };

        loop {
            match stream.next().await {
                None => break,
                Some(Err(e)) => {
                    warn!(device = %rec.name, error = %e, "start stream broke");
                    forward(
                        tx,
                        StartManagingDeviceResponse::error(Reason::InternalError, e.to_string()),
                    )
                    .await?;
                    return Ok(established);
                }
                Some(Ok(frame)) => {
                    if frame.status == Status::Ok {
                        established = true;
                        rec.uuid = frame.device_uuid.clone();
                        if let Err(e) = self.devices.put_by_name(rec).await {
                            Self::log_store_failure("put_by_name", e);
                        }
                        if let Err(e) = self.devices.put_uuid_lookup(rec).await {
                            Self::log_store_failure("put_uuid_lookup", e);
                        }
                        info!(device = %rec.name, uuid = %rec.uuid, "device reported managed");
                        forward(tx, frame).await?;
                    } else {
                        warn!(device = %rec.name, detail = %frame.reason_detail, "device rejected start request");
                        forward(tx, frame).await?;
                        return Ok(established);
                    }
                }
            }
        }

        Ok(established)
    }

    async fn stop_managing_device(
        &self,
        _rec: &DeviceRecord,
        req: &StopManagingDeviceRequest,
    ) -> Result<StopManagingDeviceResponse, AgentError> {
        self.client.stop_managing_device(req).await
    }

    async fn get_physical_inventory(
        &self,
        rec: &mut DeviceRecord,
        tx: &FrameSender<PhysicalInventoryResponse>,
    ) -> Result<(), AgentError> {
        let mut stream = match self.client.get_physical_inventory(&rec.uuid).await {
            Ok(stream) => stream,
            Err(e) => {
                forward(
                    tx,
                    PhysicalInventoryResponse::error(Reason::InternalError, e.to_string()),
                )
                .await?;
                return Err(e);
            }
        };

        loop {
            match stream.next().await {
                None => break,
                Some(Err(e)) => return Err(e),
                Some(Ok(frame)) => {
                    if frame.status == Status::Ok {
                        if let Some(hw) = &frame.inventory {
                            if let Err(e) = self.devices.save_hardware_snapshot(rec, hw).await {
                                Self::log_store_failure("save_hardware_snapshot", e);
                            }
                            let mut names = std::collections::HashMap::new();
                            if let Err(e) = self
                                .components
                                .ingest_inventory_tree(&rec.uuid, &hw.root.children, &mut names)
                                .await
                            {
                                Self::log_store_failure("ingest_inventory_tree", e);
                            }
                            if !names.is_empty() {
                                if let Err(e) =
                                    self.components.put_name_index(&rec.uuid, &names).await
                                {
                                    Self::log_store_failure("put_name_index", e);
                                }
                            }
                        }
                        forward(tx, frame).await?;
                    } else {
                        let detail = frame.reason_detail.clone();
                        forward(tx, frame).await?;
                        return Err(AgentError::Device(detail));
                    }
                }
            }
        }

        Ok(())
    }

    async fn get_hw_component_info(
        &self,
        dev_uuid: &str,
        rec: &mut HwCompRecord,
        req: &HwComponentInfoGetRequest,
        tx: &FrameSender<HwComponentInfoGetResponse>,
    ) -> Result<(), AgentError> {
        let mut stream = match self.client.get_hw_component_info(req).await {
            Ok(stream) => stream,
            Err(e) => {
                forward(
                    tx,
                    HwComponentInfoGetResponse::error(Reason::InternalError, e.to_string()),
                )
                .await?;
                return Err(e);
            }
        };

        loop {
            match stream.next().await {
                None => break,
                Some(Err(e)) => return Err(e),
                Some(Ok(frame)) => {
                    if frame.status == Status::Ok {
                        if let Some(component) = &frame.component {
                            rec.merge_component(component);
                            if let Err(e) = self.components.put_by_uuid(dev_uuid, rec).await {
                                Self::log_store_failure("put_by_uuid", e);
                            }
                        }
                        forward(tx, frame).await?;
                    } else {
                        let detail = frame.reason_detail.clone();
                        forward(tx, frame).await?;
                        return Err(AgentError::Device(detail));
                    }
                }
            }
        }

        Ok(())
    }

    async fn set_hw_component_info(
        &self,
        dev_uuid: &str,
        rec: &mut HwCompRecord,
        req: &HwComponentInfoSetRequest,
    ) -> Result<HwComponentInfoSetResponse, AgentError> {
        let resp = self.client.set_hw_component_info(req).await?;
        if resp.status == Status::Ok {
            rec.apply_changes(&req.changes);
            if let Err(e) = self.components.put_by_uuid(dev_uuid, rec).await {
                Self::log_store_failure("put_by_uuid", e);
            }
        }
        Ok(resp)
    }

    async fn set_logging_endpoint(
        &self,
        rec: &mut DeviceRecord,
        req: &SetLoggingEndpointRequest,
    ) -> Result<SetRemoteEndpointResponse, AgentError> {
        let resp = self.client.set_logging_endpoint(req).await?;
        if resp.status == Status::Ok {
            rec.logging.end_point = req.logging_endpoint.clone();
            rec.logging.protocol = req.logging_protocol.clone();
            if let Err(e) = self.devices.put_by_name(rec).await {
                Self::log_store_failure("put_by_name", e);
            }
        }
        Ok(resp)
    }

    async fn get_logging_endpoint(
        &self,
        rec: &mut DeviceRecord,
        req: &HardwareId,
    ) -> Result<GetLoggingEndpointResponse, AgentError> {
        let resp = self.client.get_logging_endpoint(req).await?;
        if resp.status == Status::Ok {
            rec.logging.end_point = resp.logging_endpoint.clone();
            rec.logging.protocol = resp.logging_protocol.clone();
            if let Err(e) = self.devices.put_by_name(rec).await {
                Self::log_store_failure("put_by_name", e);
            }
        }
        Ok(resp)
    }

    async fn get_loggable_entities(
        &self,
        rec: &mut DeviceRecord,
        req: &GetLoggableEntitiesRequest,
    ) -> Result<GetLogLevelResponse, AgentError> {
        let resp = self.client.get_loggable_entities(req).await?;
        if resp.status == Status::Ok {
            rec.merge_loggable_entities(&resp.log_levels);
            if let Err(e) = self.devices.put_by_name(rec).await {
                Self::log_store_failure("put_by_name", e);
            }
        }
        Ok(resp)
    }

    async fn set_log_level(
        &self,
        rec: &mut DeviceRecord,
        req: &SetLogLevelRequest,
    ) -> Result<SetLogLevelResponse, AgentError> {
        let resp = self.client.set_log_level(req).await?;
        if resp.status == Status::Ok {
            rec.merge_loggable_entities(&req.loglevels);
            if let Err(e) = self.devices.put_by_name(rec).await {
                Self::log_store_failure("put_by_name", e);
            }
        }
        Ok(resp)
    }

    async fn get_log_level(
        &self,
        rec: &mut DeviceRecord,
        req: &GetLogLevelRequest,
    ) -> Result<GetLogLevelResponse, AgentError> {
        let resp = self.client.get_log_level(req).await?;
        if resp.status == Status::Ok {
            rec.merge_loggable_entities(&resp.log_levels);
            if let Err(e) = self.devices.put_by_name(rec).await {
                Self::log_store_failure("put_by_name", e);
            }
        }
        Ok(resp)
    }
}

/// Factory producing [`HttpAdapter`]s; the table's default.
pub struct HttpAdapterFactory {
    settings: AgentSettings,
    devices: Arc<DeviceRepository>,
    components: Arc<ComponentRepository>,
}

impl HttpAdapterFactory {
    pub fn new(
        settings: AgentSettings,
        devices: Arc<DeviceRepository>,
        components: Arc<ComponentRepository>,
    ) -> Self {
        Self {
            settings,
            devices,
            components,
        }
    }
}

impl AdapterFactory for HttpAdapterFactory {
    fn create(&self, rec: &DeviceRecord) -> Result<Arc<dyn Adapter>, AgentError> {
        let adapter = HttpAdapter::new(
            &rec.uri,
            self.settings.clone(),
            self.devices.clone(),
            self.components.clone(),
        )?;
        Ok(Arc::new(adapter))
    }
}
