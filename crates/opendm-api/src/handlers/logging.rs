//! Logging RPCs: log-shipping endpoint and log-level policy.

use axum::extract::{Path, Query, State};
use axum::Json;
use opendm_core::wire::{
    GetLogLevelRequest, GetLogLevelResponse, GetLoggableEntitiesRequest,
    GetLoggingEndpointResponse, HardwareId, Reason, SetLogLevelRequest, SetLogLevelResponse,
    SetLoggingEndpointRequest, SetRemoteEndpointResponse,
};
use serde::Deserialize;
use tracing::{debug, error, info, Instrument};

use crate::error::{agent_reason, store_reason};
use crate::glue::rpc_span;
use crate::state::AppState;
use crate::validate::validate_set_log_level;

/// `SetLoggingEndpoint` — unary.
pub async fn set_logging_endpoint(
    State(state): State<AppState>,
    Path(device_uuid): Path<String>,
    Json(mut req): Json<SetLoggingEndpointRequest>,
) -> Json<SetRemoteEndpointResponse> {
    async move {
        info!(device_uuid, endpoint = %req.logging_endpoint, "SetLoggingEndpoint invoked");
        req.device_uuid = device_uuid;

        let mut rec = match state.devices.get_by_uuid(&req.device_uuid).await {
            Ok(rec) => rec,
            Err(e) => {
                return Json(SetRemoteEndpointResponse::error(
                    store_reason(&e),
                    e.to_string(),
                ))
            }
        };
        let adapter = match state.registry.acquire(&rec).await {
            Ok(adapter) => adapter,
            Err(e) => {
                return Json(SetRemoteEndpointResponse::error(
                    agent_reason(&e),
                    e.to_string(),
                ))
            }
        };

        match adapter.set_logging_endpoint(&mut rec, &req).await {
            Ok(resp) => Json(resp),
            Err(e) => {
                error!(device = %rec.name, error = %e, "SetLoggingEndpoint failed");
                Json(SetRemoteEndpointResponse::error(
                    Reason::InternalError,
                    e.to_string(),
                ))
            }
        }
    }
    .instrument(rpc_span("SetLoggingEndpoint"))
    .await
}

/// `GetLoggingEndpoint` — unary.
pub async fn get_logging_endpoint(
    State(state): State<AppState>,
    Path(device_uuid): Path<String>,
) -> Json<GetLoggingEndpointResponse> {
    async move {
        info!(device_uuid, "GetLoggingEndpoint invoked");
        let req = HardwareId {
            uuid: device_uuid.clone(),
        };

        let mut rec = match state.devices.get_by_uuid(&device_uuid).await {
            Ok(rec) => rec,
            Err(e) => {
                return Json(GetLoggingEndpointResponse::error(
                    store_reason(&e),
                    e.to_string(),
                ))
            }
        };
        let adapter = match state.registry.acquire(&rec).await {
            Ok(adapter) => adapter,
            Err(e) => {
                return Json(GetLoggingEndpointResponse::error(
                    agent_reason(&e),
                    e.to_string(),
                ))
            }
        };

        match adapter.get_logging_endpoint(&mut rec, &req).await {
            Ok(resp) => Json(resp),
            Err(e) => {
                error!(device = %rec.name, error = %e, "GetLoggingEndpoint failed");
                Json(GetLoggingEndpointResponse::error(
                    Reason::InternalError,
                    e.to_string(),
                ))
            }
        }
    }
    .instrument(rpc_span("GetLoggingEndpoint"))
    .await
}

/// `GetLoggableEntities` — answered from the cached policy when the record
/// already holds one, otherwise asked of the device.
pub async fn get_loggable_entities(
    State(state): State<AppState>,
    Path(device_uuid): Path<String>,
) -> Json<GetLogLevelResponse> {
    async move {
        info!(device_uuid, "GetLoggableEntities invoked");

        let mut rec = match state.devices.get_by_uuid(&device_uuid).await {
            Ok(rec) => rec,
            Err(e) => {
                return Json(GetLogLevelResponse::error(
                    &device_uuid,
                    store_reason(&e),
                    e.to_string(),
                ))
            }
        };

        if rec.logging.loggable_entities.is_some() {
            debug!(device = %rec.name, "serving loggable entities from record");
            let groups = rec.loggable_entities_view(&[]).unwrap_or_default();
            return Json(GetLogLevelResponse::ok(&device_uuid, groups));
        }

        let adapter = match state.registry.acquire(&rec).await {
            Ok(adapter) => adapter,
            Err(e) => {
                return Json(GetLogLevelResponse::error(
                    &device_uuid,
                    agent_reason(&e),
                    e.to_string(),
                ))
            }
        };

        let req = GetLoggableEntitiesRequest {
            device_uuid: device_uuid.clone(),
        };
        match adapter.get_loggable_entities(&mut rec, &req).await {
            Ok(resp) => Json(resp),
            Err(e) => {
                error!(device = %rec.name, error = %e, "GetLoggableEntities failed");
                Json(GetLogLevelResponse::error(
                    &device_uuid,
                    Reason::InternalError,
                    e.to_string(),
                ))
            }
        }
    }
    .instrument(rpc_span("GetLoggableEntities"))
    .await
}

/// `SetLogLevel` — unary; the accepted policy is folded into the record.
pub async fn set_log_level(
    State(state): State<AppState>,
    Path(device_uuid): Path<String>,
    Json(mut req): Json<SetLogLevelRequest>,
) -> Json<SetLogLevelResponse> {
    async move {
        info!(device_uuid, groups = req.loglevels.len(), "SetLogLevel invoked");
        req.device_uuid = device_uuid.clone();

        if let Err(detail) = validate_set_log_level(&req.loglevels) {
            return Json(SetLogLevelResponse::error(
                &device_uuid,
                Reason::UnknownLogEntity,
                detail,
            ));
        }

        let mut rec = match state.devices.get_by_uuid(&req.device_uuid).await {
            Ok(rec) => rec,
            Err(e) => {
                return Json(SetLogLevelResponse::error(
                    &device_uuid,
                    store_reason(&e),
                    e.to_string(),
                ))
            }
        };
        let adapter = match state.registry.acquire(&rec).await {
            Ok(adapter) => adapter,
            Err(e) => {
                return Json(SetLogLevelResponse::error(
                    &device_uuid,
                    agent_reason(&e),
                    e.to_string(),
                ))
            }
        };

        match adapter.set_log_level(&mut rec, &req).await {
            Ok(resp) => Json(resp),
            Err(e) => {
                error!(device = %rec.name, error = %e, "SetLogLevel failed");
                Json(SetLogLevelResponse::error(
                    &device_uuid,
                    Reason::InternalError,
                    e.to_string(),
                ))
            }
        }
    }
    .instrument(rpc_span("SetLogLevel"))
    .await
}

#[derive(Deserialize)]
pub struct LogLevelQuery {
    /// Comma-separated entity names; absent means the whole device.
    #[serde(default)]
    pub entities: Option<String>,
}

/// `GetLogLevel` — served from the cached policy when it can answer the
/// exact entities asked for, otherwise relayed to the device.
pub async fn get_log_level(
    State(state): State<AppState>,
    Path(device_uuid): Path<String>,
    Query(query): Query<LogLevelQuery>,
) -> Json<GetLogLevelResponse> {
    async move {
        let entities: Vec<String> = query
            .entities
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        info!(device_uuid, requested = entities.len(), "GetLogLevel invoked");

        let mut rec = match state.devices.get_by_uuid(&device_uuid).await {
            Ok(rec) => rec,
            Err(e) => {
                return Json(GetLogLevelResponse::error(
                    &device_uuid,
                    store_reason(&e),
                    e.to_string(),
                ))
            }
        };

        if rec.logging.loggable_entities.is_some() {
            if let Some(groups) = rec.loggable_entities_view(&entities) {
                debug!(device = %rec.name, "serving log levels from record");
                return Json(GetLogLevelResponse::ok(&device_uuid, groups));
            }
            // An entity the record does not know: ask the device.
        }

        let adapter = match state.registry.acquire(&rec).await {
            Ok(adapter) => adapter,
            Err(e) => {
                return Json(GetLogLevelResponse::error(
                    &device_uuid,
                    agent_reason(&e),
                    e.to_string(),
                ))
            }
        };

        let req = GetLogLevelRequest {
            device_uuid: device_uuid.clone(),
            entities,
        };
        match adapter.get_log_level(&mut rec, &req).await {
            Ok(resp) => Json(resp),
            Err(e) => {
                error!(device = %rec.name, error = %e, "GetLogLevel failed");
                Json(GetLogLevelResponse::error(
                    &device_uuid,
                    Reason::InternalError,
                    e.to_string(),
                ))
            }
        }
    }
    .instrument(rpc_span("GetLogLevel"))
    .await
}
