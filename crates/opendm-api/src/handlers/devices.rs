//! Device lifecycle RPCs: start/stop managing and the managed-device listing.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::Json;
use futures::Stream;
use opendm_core::wire::{
    ManagedDevicesResponse, ModifiableComponent, Reason, StartManagingDeviceResponse,
    StopManagingDeviceRequest, StopManagingDeviceResponse,
};
use opendm_core::DeviceRecord;
use opendm_events::send_event;
use opendm_store::StoreError;
use tokio::sync::mpsc;
use tracing::{error, info, warn, Instrument};

use crate::error::{agent_reason, store_reason};
use crate::glue::rpc_span;
use crate::handlers::sse_channel;
use crate::state::AppState;
use crate::validate::validate_uri;

fn lifecycle_event(event_id: &str, rec: &DeviceRecord) -> opendm_core::wire::Event {
    opendm_core::wire::Event {
        event_id: event_id.to_string(),
        metadata: opendm_core::wire::EventMetadata {
            device_uuid: rec.uuid.clone(),
            component_name: rec.name.clone(),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// `StartManagingDevice` — server-streaming. Validates, tentatively inserts
/// the record, opens the southbound session and forwards its frames; a run
/// that never establishes a managed connection is rolled back completely.
pub async fn start_managing_device(
    State(state): State<AppState>,
    Json(req): Json<ModifiableComponent>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let (tx, sse) = sse_channel();
    tokio::spawn(run_start_managing(state, req, tx).instrument(rpc_span("StartManagingDevice")));
    sse
}

async fn run_start_managing(
    state: AppState,
    req: ModifiableComponent,
    tx: mpsc::Sender<StartManagingDeviceResponse>,
) {
    info!(device = %req.name, uri = %req.uri, "StartManagingDevice invoked");

    if req.name.is_empty() {
        let _ = tx
            .send(StartManagingDeviceResponse::error(
                Reason::InvalidParams,
                "name field is empty",
            ))
            .await;
        return;
    }
    if let Err(detail) = validate_uri(&req.uri).await {
        let _ = tx
            .send(StartManagingDeviceResponse::error(
                Reason::InvalidParams,
                detail,
            ))
            .await;
        return;
    }

    match state.devices.get_by_name(&req.name).await {
        Ok(existing) => {
            let _ = tx
                .send(StartManagingDeviceResponse::error(
                    Reason::DeviceAlreadyManaged,
                    format!(
                        "device already exists and managed with uuid {} and uri {}",
                        existing.uuid, existing.uri
                    ),
                ))
                .await;
            return;
        }
        Err(StoreError::NotFound) => {}
        Err(e) => {
            let _ = tx
                .send(StartManagingDeviceResponse::error(
                    store_reason(&e),
                    e.to_string(),
                ))
                .await;
            return;
        }
    }

    let mut rec = DeviceRecord::from_start_request(&req);
    let adapter = match state.registry.acquire(&rec).await {
        Ok(adapter) => adapter,
        Err(e) => {
            let _ = tx
                .send(StartManagingDeviceResponse::error(
                    agent_reason(&e),
                    e.to_string(),
                ))
                .await;
            return;
        }
    };

    // Tentative insert; rolled back below when the device never confirms.
    if let Err(e) = state.devices.put_by_name(&rec).await {
        warn!(device = %rec.name, error = %e, "tentative record insert failed");
    }

    match adapter.start_managing_device(&mut rec, &req, &tx).await {
        Ok(true) => {
            info!(device = %rec.name, uuid = %rec.uuid, "device is now managed");
            let _ = send_event(
                state.bus.as_ref(),
                &lifecycle_event("EVENT_DEVICE_MANAGED", &rec),
            )
            .await;
        }
        Ok(false) => {
            warn!(device = %rec.name, "no managed connection established, rolling back");
            if let Err(e) = state.devices.delete(&rec).await {
                warn!(device = %rec.name, error = %e, "rollback delete failed");
            }
            let _ = adapter.disconnect().await;
            state.registry.release(&rec.name).await;
            let _ = tx
                .send(StartManagingDeviceResponse::error(
                    Reason::UndefinedReason,
                    "device connection could not be established",
                ))
                .await;
        }
        Err(e) => {
            // Northbound caller went away mid-stream; clean up quietly.
            warn!(device = %rec.name, error = %e, "start aborted, rolling back");
            if let Err(e) = state.devices.delete(&rec).await {
                warn!(device = %rec.name, error = %e, "rollback delete failed");
            }
            let _ = adapter.disconnect().await;
            state.registry.release(&rec.name).await;
        }
    }
}

/// `StopManagingDevice` — idempotent teardown: the record and every
/// component row go away even when the device never finished starting or is
/// unreachable now.
pub async fn stop_managing_device(
    State(state): State<AppState>,
    Json(req): Json<StopManagingDeviceRequest>,
) -> Json<StopManagingDeviceResponse> {
    async move {
        info!(device = %req.name, "StopManagingDevice invoked");

        let rec = match state.devices.get_by_name(&req.name).await {
            Ok(rec) => rec,
            Err(e) => {
                return Json(StopManagingDeviceResponse::error(
                    store_reason(&e),
                    e.to_string(),
                ))
            }
        };

        let resp = match state.registry.acquire(&rec).await {
            Ok(adapter) => {
                let resp = match adapter.stop_managing_device(&rec, &req).await {
                    Ok(resp) => resp,
                    Err(e) => {
                        warn!(device = %rec.name, error = %e, "southbound stop failed, cleaning up anyway");
                        StopManagingDeviceResponse::ok()
                    }
                };
                if let Err(e) = adapter.disconnect().await {
                    warn!(device = %rec.name, error = %e, "adapter disconnect failed");
                }
                state.registry.release(&rec.name).await;
                resp
            }
            Err(e) => {
                warn!(device = %rec.name, error = %e, "device unreachable during stop, cleaning up locally");
                StopManagingDeviceResponse::ok()
            }
        };

        if !rec.uuid.is_empty() {
            if let Err(e) = state.components.delete_all(&rec.uuid).await {
                error!(device = %rec.name, error = %e, "component cleanup failed");
            }
        }
        if let Err(e) = state.devices.delete(&rec).await {
            error!(device = %rec.name, error = %e, "device record cleanup failed");
        }

        let _ = send_event(
            state.bus.as_ref(),
            &lifecycle_event("EVENT_DEVICE_UNMANAGED", &rec),
        )
        .await;

        Json(resp)
    }
    .instrument(rpc_span("StopManagingDevice"))
    .await
}

/// `GetManagedDevices` — the repository's view of every managed device.
pub async fn get_managed_devices(
    State(state): State<AppState>,
) -> Result<Json<ManagedDevicesResponse>, (StatusCode, String)> {
    async move {
        let records = state.devices.get_all().await.map_err(|e| {
            error!(error = %e, "listing managed devices failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;
        Ok(Json(ManagedDevicesResponse {
            devices: records.iter().map(DeviceRecord::to_modifiable).collect(),
        }))
    }
    .instrument(rpc_span("GetManagedDevices"))
    .await
}
