//! In-process device agent used by end-to-end tests and demos.
//!
//! Serves the same wire surface a real device agent does, answering from a
//! scripted hardware view instead of real hardware.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream};
use parking_lot::RwLock;
use serde::Deserialize;

use opendm_core::wire::{
    Component, EntitiesLogLevel, GetLogLevelResponse, GetLoggingEndpointResponse, Hardware,
    HwComponentInfoGetResponse, HwComponentInfoSetRequest, HwComponentInfoSetResponse,
    ModifiableComponent, PhysicalInventoryResponse, Reason, SetLogLevelRequest,
    SetLoggingEndpointRequest, SetRemoteEndpointResponse, StartManagingDeviceResponse,
    StopManagingDeviceRequest, StopManagingDeviceResponse,
};

/// Scripted device agent state.
pub struct SimAgent {
    device_uuid: String,
    inventory: RwLock<Option<Hardware>>,
    log_levels: RwLock<Vec<EntitiesLogLevel>>,
    logging_endpoint: RwLock<(String, String)>,
    start_rejection: RwLock<Option<(Reason, String)>>,
    stops: AtomicUsize,
}

impl SimAgent {
    pub fn new(device_uuid: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            device_uuid: device_uuid.into(),
            inventory: RwLock::new(None),
            log_levels: RwLock::new(Vec::new()),
            logging_endpoint: RwLock::new((String::new(), String::new())),
            start_rejection: RwLock::new(None),
            stops: AtomicUsize::new(0),
        })
    }

    pub fn set_inventory(&self, hw: Hardware) {
        *self.inventory.write() = Some(hw);
    }

    pub fn set_log_levels(&self, groups: Vec<EntitiesLogLevel>) {
        *self.log_levels.write() = groups;
    }

    /// Make `StartManagingDevice` answer with an ERROR frame.
    pub fn reject_start(&self, reason: Reason, detail: impl Into<String>) {
        *self.start_rejection.write() = Some((reason, detail.into()));
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Router serving the agent surface over this state.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route("/health", get(|| async { "OK" }))
            .route("/hwmgmt/v1/devices", post(start_managing))
            .route("/hwmgmt/v1/devices/stop", post(stop_managing))
            .route("/hwmgmt/v1/devices/:device_uuid/inventory", get(inventory))
            .route(
                "/hwmgmt/v1/devices/:device_uuid/components/:component_uuid",
                get(get_component).put(set_component),
            )
            .route(
                "/hwmgmt/v1/devices/:device_uuid/logging/endpoint",
                get(get_logging_endpoint).put(set_logging_endpoint),
            )
            .route(
                "/hwmgmt/v1/devices/:device_uuid/logging/entities",
                get(get_loggable_entities),
            )
            .route(
                "/hwmgmt/v1/devices/:device_uuid/logging/level",
                get(get_log_level).put(set_log_level),
            )
            .with_state(self.clone())
    }
}

fn one_frame<T: serde::Serialize>(
    frame: &T,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    Sse::new(stream::iter(vec![Event::default().json_data(frame)]))
}

fn find_component(node: &Component, uuid: &str) -> Option<Component> {
    if node.uuid == uuid {
        return Some(node.clone());
    }
    node.children
        .iter()
        .find_map(|child| find_component(child, uuid))
}

async fn start_managing(
    State(agent): State<Arc<SimAgent>>,
    Json(_req): Json<ModifiableComponent>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let frame = match agent.start_rejection.read().clone() {
        Some((reason, detail)) => StartManagingDeviceResponse::error(reason, detail),
        None => StartManagingDeviceResponse::ok(&agent.device_uuid),
    };
    one_frame(&frame)
}

async fn stop_managing(
    State(agent): State<Arc<SimAgent>>,
    Json(_req): Json<StopManagingDeviceRequest>,
) -> Json<StopManagingDeviceResponse> {
    agent.stops.fetch_add(1, Ordering::SeqCst);
    Json(StopManagingDeviceResponse::ok())
}

async fn inventory(
    State(agent): State<Arc<SimAgent>>,
    Path(_device_uuid): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let frame = match agent.inventory.read().clone() {
        Some(hw) => PhysicalInventoryResponse::ok(hw),
        None => PhysicalInventoryResponse::error(Reason::InternalError, "no inventory scripted"),
    };
    one_frame(&frame)
}

async fn get_component(
    State(agent): State<Arc<SimAgent>>,
    Path((_device_uuid, component_uuid)): Path<(String, String)>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let found = agent
        .inventory
        .read()
        .as_ref()
        .and_then(|hw| find_component(&hw.root, &component_uuid));
    let frame = match found {
        Some(component) => HwComponentInfoGetResponse::ok(component),
        None => HwComponentInfoGetResponse::error(
            Reason::UnknownDevice,
            format!("component {component_uuid} not found"),
        ),
    };
    one_frame(&frame)
}

async fn set_component(
    State(_agent): State<Arc<SimAgent>>,
    Path((_device_uuid, _component_uuid)): Path<(String, String)>,
    Json(_req): Json<HwComponentInfoSetRequest>,
) -> Json<HwComponentInfoSetResponse> {
    Json(HwComponentInfoSetResponse::ok())
}

async fn set_logging_endpoint(
    State(agent): State<Arc<SimAgent>>,
    Path(_device_uuid): Path<String>,
    Json(req): Json<SetLoggingEndpointRequest>,
) -> Json<SetRemoteEndpointResponse> {
    *agent.logging_endpoint.write() = (req.logging_endpoint, req.logging_protocol);
    Json(SetRemoteEndpointResponse::ok())
}

async fn get_logging_endpoint(
    State(agent): State<Arc<SimAgent>>,
    Path(_device_uuid): Path<String>,
) -> Json<GetLoggingEndpointResponse> {
    let (endpoint, protocol) = agent.logging_endpoint.read().clone();
    Json(GetLoggingEndpointResponse::ok(endpoint, protocol))
}

async fn get_loggable_entities(
    State(agent): State<Arc<SimAgent>>,
    Path(device_uuid): Path<String>,
) -> Json<GetLogLevelResponse> {
    Json(GetLogLevelResponse::ok(
        device_uuid,
        agent.log_levels.read().clone(),
    ))
}

async fn set_log_level(
    State(agent): State<Arc<SimAgent>>,
    Path(device_uuid): Path<String>,
    Json(req): Json<SetLogLevelRequest>,
) -> Json<opendm_core::wire::SetLogLevelResponse> {
    agent.log_levels.write().extend(req.loglevels);
    Json(opendm_core::wire::SetLogLevelResponse::ok(device_uuid))
}

#[derive(Deserialize)]
struct LevelQuery {
    #[serde(default)]
    entities: Option<String>,
}

async fn get_log_level(
    State(agent): State<Arc<SimAgent>>,
    Path(device_uuid): Path<String>,
    Query(query): Query<LevelQuery>,
) -> Json<GetLogLevelResponse> {
    let groups = agent.log_levels.read().clone();
    let groups = match query.entities {
        None => groups,
        Some(wanted) => {
            let wanted: Vec<&str> = wanted.split(',').collect();
            groups
                .into_iter()
                .map(|mut group| {
                    group.entities.retain(|e| wanted.contains(&e.as_str()));
                    group
                })
                .collect()
        }
    };
    Json(GetLogLevelResponse::ok(device_uuid, groups))
}

/// Serve the simulator on an ephemeral local port; returns its `host:port`.
pub async fn spawn(agent: &Arc<SimAgent>) -> std::io::Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let router = agent.router();
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    Ok(addr.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_component_walks_the_tree() {
        let root = Component {
            uuid: "c-0".into(),
            children: vec![Component {
                uuid: "c-1".into(),
                children: vec![Component {
                    uuid: "c-11".into(),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(find_component(&root, "c-11").is_some());
        assert!(find_component(&root, "c-99").is_none());
    }
}
