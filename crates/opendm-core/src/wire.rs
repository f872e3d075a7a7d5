//! Wire contract of the Native Hardware Management Service.
//!
//! The same message set is spoken in both directions: the gateway serves it
//! northbound to the NEM and consumes it southbound from each device agent.
//! Server-streaming RPCs are SSE streams whose `data:` payloads are the JSON
//! encodings of the response frames defined here.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome carried by every response frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error,
}

/// Why a request was rejected or a southbound exchange failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    #[default]
    UndefinedReason,
    /// Request-shape or semantic validation failed.
    InvalidParams,
    /// `StartManagingDevice` for a name that already has a record.
    DeviceAlreadyManaged,
    /// Device or component record not found in the repository.
    UnknownDevice,
    /// Adapter acquisition or southbound connect failed.
    DeviceUnreachable,
    /// Log-level request references an entity unknown to the device policy.
    UnknownLogEntity,
    /// Southbound RPC setup failed before any frame arrived.
    InternalError,
}

/// Log verbosity of a device or one of its loggable entities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Trace,
    #[default]
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// The five standard buckets, in severity order.
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
    ];
}

/// Kind of hardware component as reported by the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentType {
    #[default]
    Undefined,
    Chassis,
    Backplane,
    Container,
    PowerSupply,
    Fan,
    Sensor,
    Module,
    Port,
    Cpu,
    Battery,
    Storage,
    Memory,
    Transceiver,
    TransceiverCage,
}

/// Administrative state of a component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdminState {
    #[default]
    Undefined,
    Locked,
    ShuttingDown,
    Unlocked,
}

/// Operational state of a component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperState {
    #[default]
    Undefined,
    Enabled,
    Disabled,
    Testing,
}

/// Admin/oper state pair reported for a component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentState {
    #[serde(default)]
    pub admin_state: AdminState,
    #[serde(default)]
    pub oper_state: OperState,
}

/// One sensor reading attached to a component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentSensorData {
    pub value: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// One node of the inventory tree reported by a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    #[serde(default)]
    pub class: ComponentType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Name of the parent component.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent: String,
    #[serde(default)]
    pub parent_rel_pos: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Component>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hardware_rev: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub firmware_rev: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub software_rev: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub serial_num: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mfg_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alias: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub asset_id: String,
    #[serde(default)]
    pub is_fru: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mfg_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uri: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ComponentState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sensor_data: Vec<ComponentSensorData>,
    /// Opaque vendor-specific blob.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specific: Option<String>,
}

/// Full hardware view returned by `GetPhysicalInventory`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hardware {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_change: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_booted: Option<DateTime<Utc>>,
    pub root: Component,
}

/// Caller-settable view of a component; also the request body of
/// `StartManagingDevice`, where it describes the device root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModifiableComponent {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub make: String,
    #[serde(default)]
    pub class: ComponentType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent: String,
    #[serde(default)]
    pub parent_rel_pos: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alias: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub asset_id: String,
    /// `host:port` of the device agent.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uri: String,
    #[serde(default)]
    pub admin_state: AdminState,
}

/// Log level for a group of entities; an empty entity list means the level
/// applies to the whole device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitiesLogLevel {
    pub log_level: LogLevel,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<String>,
}

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StopManagingDeviceRequest {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HwComponentInfoGetRequest {
    pub device_uuid: String,
    pub component_uuid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub component_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HwComponentInfoSetRequest {
    pub device_uuid: String,
    pub component_uuid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub component_name: String,
    pub changes: ModifiableComponent,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetLoggingEndpointRequest {
    pub device_uuid: String,
    pub logging_endpoint: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub logging_protocol: String,
}

/// Identifies a device by uuid in logging RPCs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HardwareId {
    pub uuid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetLoggableEntitiesRequest {
    pub device_uuid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetLogLevelRequest {
    pub device_uuid: String,
    pub loglevels: Vec<EntitiesLogLevel>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetLogLevelRequest {
    pub device_uuid: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<String>,
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartManagingDeviceResponse {
    pub status: Status,
    #[serde(default)]
    pub reason: Reason,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason_detail: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device_uuid: String,
}

impl StartManagingDeviceResponse {
    pub fn ok(device_uuid: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            reason: Reason::UndefinedReason,
            reason_detail: String::new(),
            device_uuid: device_uuid.into(),
        }
    }

    pub fn error(reason: Reason, detail: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            reason,
            reason_detail: detail.into(),
            device_uuid: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopManagingDeviceResponse {
    pub status: Status,
    #[serde(default)]
    pub reason: Reason,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason_detail: String,
}

impl StopManagingDeviceResponse {
    pub fn ok() -> Self {
        Self {
            status: Status::Ok,
            reason: Reason::UndefinedReason,
            reason_detail: String::new(),
        }
    }

    pub fn error(reason: Reason, detail: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            reason,
            reason_detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagedDevicesResponse {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<ModifiableComponent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalInventoryResponse {
    pub status: Status,
    #[serde(default)]
    pub reason: Reason,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason_detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory: Option<Hardware>,
}

impl PhysicalInventoryResponse {
    pub fn ok(inventory: Hardware) -> Self {
        Self {
            status: Status::Ok,
            reason: Reason::UndefinedReason,
            reason_detail: String::new(),
            inventory: Some(inventory),
        }
    }

    pub fn error(reason: Reason, detail: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            reason,
            reason_detail: detail.into(),
            inventory: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HwComponentInfoGetResponse {
    pub status: Status,
    #[serde(default)]
    pub reason: Reason,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason_detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<Component>,
}

impl HwComponentInfoGetResponse {
    pub fn ok(component: Component) -> Self {
        Self {
            status: Status::Ok,
            reason: Reason::UndefinedReason,
            reason_detail: String::new(),
            component: Some(component),
        }
    }

    pub fn error(reason: Reason, detail: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            reason,
            reason_detail: detail.into(),
            component: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HwComponentInfoSetResponse {
    pub status: Status,
    #[serde(default)]
    pub reason: Reason,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason_detail: String,
}

impl HwComponentInfoSetResponse {
    pub fn ok() -> Self {
        Self {
            status: Status::Ok,
            reason: Reason::UndefinedReason,
            reason_detail: String::new(),
        }
    }

    pub fn error(reason: Reason, detail: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            reason,
            reason_detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetRemoteEndpointResponse {
    pub status: Status,
    #[serde(default)]
    pub reason: Reason,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason_detail: String,
}

impl SetRemoteEndpointResponse {
    pub fn ok() -> Self {
        Self {
            status: Status::Ok,
            reason: Reason::UndefinedReason,
            reason_detail: String::new(),
        }
    }

    pub fn error(reason: Reason, detail: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            reason,
            reason_detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetLoggingEndpointResponse {
    pub status: Status,
    #[serde(default)]
    pub reason: Reason,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason_detail: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub logging_endpoint: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub logging_protocol: String,
}

impl GetLoggingEndpointResponse {
    pub fn ok(endpoint: impl Into<String>, protocol: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            reason: Reason::UndefinedReason,
            reason_detail: String::new(),
            logging_endpoint: endpoint.into(),
            logging_protocol: protocol.into(),
        }
    }

    pub fn error(reason: Reason, detail: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            reason,
            reason_detail: detail.into(),
            logging_endpoint: String::new(),
            logging_protocol: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetLogLevelResponse {
    pub status: Status,
    #[serde(default)]
    pub reason: Reason,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason_detail: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device_uuid: String,
}

impl SetLogLevelResponse {
    pub fn ok(device_uuid: impl Into<String>) -> Self {
        Self {
            status: Status::Ok,
            reason: Reason::UndefinedReason,
            reason_detail: String::new(),
            device_uuid: device_uuid.into(),
        }
    }

    pub fn error(device_uuid: impl Into<String>, reason: Reason, detail: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            reason,
            reason_detail: detail.into(),
            device_uuid: device_uuid.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetLogLevelResponse {
    pub status: Status,
    #[serde(default)]
    pub reason: Reason,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason_detail: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device_uuid: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub log_levels: Vec<EntitiesLogLevel>,
}

impl GetLogLevelResponse {
    pub fn ok(device_uuid: impl Into<String>, log_levels: Vec<EntitiesLogLevel>) -> Self {
        Self {
            status: Status::Ok,
            reason: Reason::UndefinedReason,
            reason_detail: String::new(),
            device_uuid: device_uuid.into(),
            log_levels,
        }
    }

    pub fn error(device_uuid: impl Into<String>, reason: Reason, detail: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            reason,
            reason_detail: detail.into(),
            device_uuid: device_uuid.into(),
            log_levels: Vec::new(),
        }
    }
}

// =============================================================================
// Events and metrics
// =============================================================================

/// Where an event or metric originated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device_uuid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub component_uuid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub component_name: String,
}

/// Asynchronous domain event forwarded to the message bus.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    #[serde(default)]
    pub metadata: EventMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raised_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

/// Metric sample forwarded to the message bus; not persisted by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub metric_id: String,
    #[serde(default)]
    pub metadata: EventMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<ComponentSensorData>,
}

/// Bucket a level→entity mapping into the five standard groups, every bucket
/// present even when empty.
pub fn bucket_by_level(levels: &HashMap<String, LogLevel>) -> Vec<EntitiesLogLevel> {
    let mut buckets: Vec<EntitiesLogLevel> = LogLevel::ALL
        .iter()
        .map(|level| EntitiesLogLevel {
            log_level: *level,
            entities: Vec::new(),
        })
        .collect();
    for (entity, level) in levels {
        let idx = LogLevel::ALL.iter().position(|l| l == level).unwrap_or(1);
        buckets[idx].entities.push(entity.clone());
    }
    for bucket in &mut buckets {
        bucket.entities.sort();
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_and_reason_render_like_the_schema() {
        assert_eq!(serde_json::to_string(&Status::Ok).unwrap(), "\"OK\"");
        assert_eq!(serde_json::to_string(&Status::Error).unwrap(), "\"ERROR\"");
        assert_eq!(
            serde_json::to_string(&Reason::DeviceAlreadyManaged).unwrap(),
            "\"DEVICE_ALREADY_MANAGED\""
        );
        assert_eq!(
            serde_json::from_str::<LogLevel>("\"WARN\"").unwrap(),
            LogLevel::Warn
        );
    }

    #[test]
    fn component_round_trips_with_nested_children() {
        let root = Component {
            name: "chassis".into(),
            class: ComponentType::Chassis,
            uuid: "c-0".into(),
            children: vec![Component {
                name: "fan-1".into(),
                class: ComponentType::Fan,
                uuid: "c-1".into(),
                sensor_data: vec![ComponentSensorData {
                    value: 4200,
                    unit: Some("rpm".into()),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        };

        let json = serde_json::to_string(&root).unwrap();
        let back: Component = serde_json::from_str(&json).unwrap();
        assert_eq!(back, root);
    }

    #[test]
    fn bucket_by_level_covers_all_five_groups() {
        let mut levels = HashMap::new();
        levels.insert("sw".to_string(), LogLevel::Info);
        levels.insert("hw".to_string(), LogLevel::Info);
        levels.insert("api".to_string(), LogLevel::Error);

        let buckets = bucket_by_level(&levels);
        assert_eq!(buckets.len(), 5);
        let info = buckets.iter().find(|b| b.log_level == LogLevel::Info).unwrap();
        assert_eq!(info.entities, vec!["hw".to_string(), "sw".to_string()]);
        let trace = buckets.iter().find(|b| b.log_level == LogLevel::Trace).unwrap();
        assert!(trace.entities.is_empty());
    }
}
