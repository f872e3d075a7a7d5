//! Physical inventory and per-component RPCs.

use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use axum::Json;
use futures::Stream;
use opendm_core::wire::{
    HwComponentInfoGetRequest, HwComponentInfoGetResponse, HwComponentInfoSetRequest,
    HwComponentInfoSetResponse, PhysicalInventoryResponse, Reason,
};
use tokio::sync::mpsc;
use tracing::{error, info, Instrument};

use crate::error::{agent_reason, store_reason};
use crate::glue::rpc_span;
use crate::handlers::sse_channel;
use crate::state::AppState;

/// `GetPhysicalInventory` — server-streaming; every OK frame reconciles the
/// device snapshot and component rows before being forwarded.
pub async fn get_physical_inventory(
    State(state): State<AppState>,
    Path(device_uuid): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let (tx, sse) = sse_channel();
    tokio::spawn(
        run_physical_inventory(state, device_uuid, tx).instrument(rpc_span("GetPhysicalInventory")),
    );
    sse
}

async fn run_physical_inventory(
    state: AppState,
    device_uuid: String,
    tx: mpsc::Sender<PhysicalInventoryResponse>,
) {
    info!(device_uuid, "GetPhysicalInventory invoked");

    let mut rec = match state.devices.get_by_uuid(&device_uuid).await {
        Ok(rec) => rec,
        Err(e) => {
            let _ = tx
                .send(PhysicalInventoryResponse::error(
                    store_reason(&e),
                    e.to_string(),
                ))
                .await;
            return;
        }
    };

    let adapter = match state.registry.acquire(&rec).await {
        Ok(adapter) => adapter,
        Err(e) => {
            let _ = tx
                .send(PhysicalInventoryResponse::error(
                    agent_reason(&e),
                    e.to_string(),
                ))
                .await;
            return;
        }
    };

    if let Err(e) = adapter.get_physical_inventory(&mut rec, &tx).await {
        error!(device = %rec.name, error = %e, "inventory stream failed");
    }
}

/// `GetHWComponentInfo` — server-streaming refresh of one component.
pub async fn get_hw_component_info(
    State(state): State<AppState>,
    Path((device_uuid, component_uuid)): Path<(String, String)>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let (tx, sse) = sse_channel();
    tokio::spawn(
        run_hw_component_info(state, device_uuid, component_uuid, tx)
            .instrument(rpc_span("GetHWComponentInfo")),
    );
    sse
}

async fn run_hw_component_info(
    state: AppState,
    device_uuid: String,
    component_uuid: String,
    tx: mpsc::Sender<HwComponentInfoGetResponse>,
) {
    info!(device_uuid, component_uuid, "GetHWComponentInfo invoked");

    let rec = match state.devices.get_by_uuid(&device_uuid).await {
        Ok(rec) => rec,
        Err(e) => {
            let _ = tx
                .send(HwComponentInfoGetResponse::error(
                    store_reason(&e),
                    e.to_string(),
                ))
                .await;
            return;
        }
    };

    // The southbound does not distinguish device from component absence.
    let mut comp = match state.components.get_by_uuid(&rec.uuid, &component_uuid).await {
        Ok(comp) => comp,
        Err(e) => {
            let _ = tx
                .send(HwComponentInfoGetResponse::error(
                    Reason::UnknownDevice,
                    e.to_string(),
                ))
                .await;
            return;
        }
    };

    let adapter = match state.registry.acquire(&rec).await {
        Ok(adapter) => adapter,
        Err(e) => {
            let _ = tx
                .send(HwComponentInfoGetResponse::error(
                    agent_reason(&e),
                    e.to_string(),
                ))
                .await;
            return;
        }
    };

    let req = HwComponentInfoGetRequest {
        device_uuid: rec.uuid.clone(),
        component_uuid,
        component_name: String::new(),
    };
    if let Err(e) = adapter
        .get_hw_component_info(&rec.uuid, &mut comp, &req, &tx)
        .await
    {
        error!(device = %rec.name, error = %e, "component info stream failed");
    }
}

/// `SetHWComponentInfo` — unary; accepted changes are folded into the
/// persisted record by the adapter.
pub async fn set_hw_component_info(
    State(state): State<AppState>,
    Path((device_uuid, component_uuid)): Path<(String, String)>,
    Json(mut req): Json<HwComponentInfoSetRequest>,
) -> Json<HwComponentInfoSetResponse> {
    async move {
        info!(device_uuid, component_uuid, "SetHWComponentInfo invoked");
        req.device_uuid = device_uuid;
        req.component_uuid = component_uuid;

        let rec = match state.devices.get_by_uuid(&req.device_uuid).await {
            Ok(rec) => rec,
            Err(e) => {
                return Json(HwComponentInfoSetResponse::error(
                    store_reason(&e),
                    e.to_string(),
                ))
            }
        };

        let mut comp = match state
            .components
            .get_by_uuid(&rec.uuid, &req.component_uuid)
            .await
        {
            Ok(comp) => comp,
            Err(e) => {
                return Json(HwComponentInfoSetResponse::error(
                    Reason::UnknownDevice,
                    e.to_string(),
                ))
            }
        };

        let adapter = match state.registry.acquire(&rec).await {
            Ok(adapter) => adapter,
            Err(e) => {
                return Json(HwComponentInfoSetResponse::error(
                    agent_reason(&e),
                    e.to_string(),
                ))
            }
        };

        match adapter.set_hw_component_info(&rec.uuid, &mut comp, &req).await {
            Ok(resp) => Json(resp),
            Err(e) => {
                error!(device = %rec.name, error = %e, "SetHWComponentInfo failed");
                Json(HwComponentInfoSetResponse::error(
                    Reason::InternalError,
                    e.to_string(),
                ))
            }
        }
    }
    .instrument(rpc_span("SetHWComponentInfo"))
    .await
}
