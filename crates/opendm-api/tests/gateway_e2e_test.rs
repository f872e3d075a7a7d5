//! End-to-end tests: a real gateway over an in-memory store, talking to a
//! simulated device agent over the wire.

use std::sync::Arc;
use std::time::Duration;

use opendm_agent::{
    sim, AdapterFactory, AdapterTable, AgentSettings, HttpAdapterFactory, SimAgent,
};
use opendm_api::testing::TestServer;
use opendm_api::{create_router, AppState, ConnectionRegistry};
use opendm_core::wire::{
    AdminState, Component, ComponentType, EntitiesLogLevel, Hardware, HwComponentInfoGetRequest,
    HwComponentInfoSetRequest, LogLevel, ModifiableComponent, Reason, SetLogLevelRequest,
    SetLoggingEndpointRequest, StartManagingDeviceResponse, Status, StopManagingDeviceRequest,
};
use opendm_events::{MemoryBus, EVENTS_TOPIC};
use opendm_store::{ComponentRepository, DeviceRepository, MemStore, StoreError};

struct Fixture {
    store: Arc<MemStore>,
    devices: Arc<DeviceRepository>,
    components: Arc<ComponentRepository>,
    registry: Arc<ConnectionRegistry>,
    bus: Arc<MemoryBus>,
    agent: Arc<SimAgent>,
    agent_uri: String,
    server: TestServer,
}

async fn fixture() -> Fixture {
    let store = Arc::new(MemStore::new());
    let devices = Arc::new(DeviceRepository::new(store.clone()));
    let components = Arc::new(ComponentRepository::new(store.clone()));

    let agent = SimAgent::new("u-1");
    let agent_uri = sim::spawn(&agent).await.expect("sim agent spawn");

    let settings = AgentSettings {
        dial_timeout: Duration::from_millis(500),
        max_retries: 0,
        ..Default::default()
    };
    let factory: Arc<dyn AdapterFactory> = Arc::new(HttpAdapterFactory::new(
        settings,
        devices.clone(),
        components.clone(),
    ));
    let registry = Arc::new(ConnectionRegistry::new(AdapterTable::new(factory)));
    let bus = Arc::new(MemoryBus::new());

    let state = AppState::new(
        devices.clone(),
        components.clone(),
        registry.clone(),
        bus.clone(),
    );
    let server = TestServer::start(create_router(state))
        .await
        .expect("gateway server");

    Fixture {
        store,
        devices,
        components,
        registry,
        bus,
        agent,
        agent_uri,
        server,
    }
}

fn inventory() -> Hardware {
    Hardware {
        last_booted: None,
        last_change: None,
        root: Component {
            name: "chassis".into(),
            class: ComponentType::Chassis,
            uuid: "root-0".into(),
            serial_num: "SN-1".into(),
            children: vec![
                Component {
                    name: "slot-1".into(),
                    uuid: "c-1".into(),
                    class: ComponentType::Container,
                    children: vec![Component {
                        name: "port-1".into(),
                        uuid: "c-11".into(),
                        class: ComponentType::Port,
                        ..Default::default()
                    }],
                    ..Default::default()
                },
                Component {
                    name: "fan-1".into(),
                    uuid: "c-2".into(),
                    class: ComponentType::Fan,
                    ..Default::default()
                },
            ],
            ..Default::default()
        },
    }
}

async fn start_device(fx: &Fixture, name: &str) -> Vec<StartManagingDeviceResponse> {
    let req = ModifiableComponent {
        name: name.into(),
        uri: fx.agent_uri.clone(),
        ..Default::default()
    };
    start_with(fx, req).await
}

async fn start_with(fx: &Fixture, req: ModifiableComponent) -> Vec<StartManagingDeviceResponse> {
    let mut stream = fx
        .server
        .client
        .start_managing_device(&req)
        .await
        .expect("start stream");
    let mut frames = Vec::new();
    while let Some(frame) = stream.next().await {
        frames.push(frame.expect("frame decodes"));
    }
    frames
}

async fn ingest_inventory(fx: &Fixture) {
    fx.agent.set_inventory(inventory());
    let mut stream = fx
        .server
        .client
        .get_physical_inventory("u-1")
        .await
        .expect("inventory stream");
    while let Some(frame) = stream.next().await {
        let frame = frame.expect("frame decodes");
        assert_eq!(frame.status, Status::Ok);
    }
}

#[tokio::test]
async fn managing_a_device_persists_both_rows() {
    let fx = fixture().await;

    let frames = start_device(&fx, "olt-1").await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].status, Status::Ok);
    assert_eq!(frames[0].device_uuid, "u-1");

    let by_name = fx.devices.get_by_name("olt-1").await.unwrap();
    let by_uuid = fx.devices.get_by_uuid("u-1").await.unwrap();
    assert_eq!(by_name, by_uuid);
    assert_eq!(by_name.uri, fx.agent_uri);

    let managed = fx.server.client.get_managed_devices().await.unwrap();
    assert_eq!(managed.devices.len(), 1);
    assert_eq!(managed.devices[0].uri, fx.agent_uri);

    let events = fx.bus.published();
    assert!(events
        .iter()
        .any(|(topic, key, _)| topic == EVENTS_TOPIC && key == "EVENT_DEVICE_MANAGED"));
}

#[tokio::test]
async fn invalid_uri_is_rejected_without_writes() {
    let fx = fixture().await;

    let req = ModifiableComponent {
        name: "olt-bad".into(),
        uri: "notanip:port".into(),
        ..Default::default()
    };
    let frames = start_with(&fx, req).await;

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].status, Status::Error);
    assert_eq!(frames[0].reason, Reason::InvalidParams);
    assert_eq!(
        frames[0].reason_detail,
        "Port number port needs to be an integer"
    );
    assert!(fx.store.is_empty());
}

#[tokio::test]
async fn duplicate_name_reports_already_managed() {
    let fx = fixture().await;
    start_device(&fx, "olt-1").await;

    let frames = start_device(&fx, "olt-1").await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].reason, Reason::DeviceAlreadyManaged);
    assert_eq!(
        frames[0].reason_detail,
        format!(
            "device already exists and managed with uuid u-1 and uri {}",
            fx.agent_uri
        )
    );
}

#[tokio::test]
async fn rejected_start_rolls_back_completely() {
    let fx = fixture().await;
    fx.agent.reject_start(Reason::InternalError, "device says no");

    let frames = start_device(&fx, "olt-1").await;
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].status, Status::Error);
    assert_eq!(frames[0].reason_detail, "device says no");
    assert_eq!(frames[1].reason, Reason::UndefinedReason);

    assert!(matches!(
        fx.devices.get_by_name("olt-1").await,
        Err(StoreError::NotFound)
    ));
    assert!(!fx.registry.contains("olt-1").await);
}

#[tokio::test]
async fn inventory_ingest_materializes_component_rows() {
    let fx = fixture().await;
    start_device(&fx, "olt-1").await;
    ingest_inventory(&fx).await;

    for (name, uuid) in [("slot-1", "c-1"), ("fan-1", "c-2"), ("port-1", "c-11")] {
        let rec = fx.components.get_by_uuid("u-1", uuid).await.unwrap();
        assert_eq!(rec.name, name);
        assert_eq!(fx.components.get_by_name("u-1", name).await.unwrap(), rec);
    }

    let index = fx.components.name_index("u-1").await.unwrap();
    assert_eq!(index.len(), 3);

    let rec = fx.devices.get_by_uuid("u-1").await.unwrap();
    assert_eq!(rec.children, vec!["c-1".to_string(), "c-2".to_string()]);
    assert_eq!(rec.serial_num, "SN-1");
}

#[tokio::test]
async fn stop_cleans_up_rows_registry_and_agent_session() {
    let fx = fixture().await;
    start_device(&fx, "olt-1").await;
    ingest_inventory(&fx).await;
    assert!(!fx.store.is_empty());

    let resp = fx
        .server
        .client
        .stop_managing_device(&StopManagingDeviceRequest {
            name: "olt-1".into(),
        })
        .await
        .unwrap();
    assert_eq!(resp.status, Status::Ok);

    assert!(fx.store.is_empty());
    assert!(!fx.registry.contains("olt-1").await);
    assert_eq!(fx.agent.stop_count(), 1);
}

#[tokio::test]
async fn stop_on_unmanaged_device_is_an_error_without_side_effects() {
    let fx = fixture().await;

    let resp = fx
        .server
        .client
        .stop_managing_device(&StopManagingDeviceRequest {
            name: "ghost".into(),
        })
        .await
        .unwrap();

    assert_eq!(resp.status, Status::Error);
    assert_eq!(resp.reason, Reason::UnknownDevice);
    assert!(fx.store.is_empty());
    assert_eq!(fx.agent.stop_count(), 0);
}

#[tokio::test]
async fn set_log_level_on_unknown_device_fails() {
    let fx = fixture().await;

    let resp = fx
        .server
        .client
        .set_log_level(&SetLogLevelRequest {
            device_uuid: "u-x".into(),
            loglevels: vec![EntitiesLogLevel {
                log_level: LogLevel::Info,
                entities: vec!["e1".into()],
            }],
        })
        .await
        .unwrap();

    assert_eq!(resp.status, Status::Error);
    assert_eq!(resp.reason, Reason::UnknownDevice);
}

#[tokio::test]
async fn malformed_set_log_level_is_rejected_before_lookup() {
    let fx = fixture().await;

    let resp = fx
        .server
        .client
        .set_log_level(&SetLogLevelRequest {
            device_uuid: "u-x".into(),
            loglevels: Vec::new(),
        })
        .await
        .unwrap();

    assert_eq!(resp.reason, Reason::UnknownLogEntity);
}

#[tokio::test]
async fn log_levels_are_learned_and_then_served_from_the_record() {
    let fx = fixture().await;
    start_device(&fx, "olt-1").await;
    fx.agent.set_log_levels(vec![EntitiesLogLevel {
        log_level: LogLevel::Warn,
        entities: vec!["sw".into(), "hw".into()],
    }]);

    let first = fx
        .server
        .client
        .get_loggable_entities(&opendm_core::wire::GetLoggableEntitiesRequest {
            device_uuid: "u-1".into(),
        })
        .await
        .unwrap();
    assert_eq!(first.status, Status::Ok);

    // The device's answer is now part of the record.
    let rec = fx.devices.get_by_uuid("u-1").await.unwrap();
    let known = rec.logging.loggable_entities.as_ref().unwrap();
    assert_eq!(known.get("sw"), Some(&LogLevel::Warn));

    // A follow-up query is served from the record, bucketed by level.
    let second = fx
        .server
        .client
        .get_log_level(&opendm_core::wire::GetLogLevelRequest {
            device_uuid: "u-1".into(),
            entities: vec!["sw".into()],
        })
        .await
        .unwrap();
    assert_eq!(second.status, Status::Ok);
    let warn_group = second
        .log_levels
        .iter()
        .find(|g| g.log_level == LogLevel::Warn)
        .unwrap();
    assert_eq!(warn_group.entities, vec!["sw".to_string()]);
}

#[tokio::test]
async fn logging_endpoint_set_then_get_updates_the_record() {
    let fx = fixture().await;
    start_device(&fx, "olt-1").await;

    let resp = fx
        .server
        .client
        .set_logging_endpoint(&SetLoggingEndpointRequest {
            device_uuid: "u-1".into(),
            logging_endpoint: "logsink:514".into(),
            logging_protocol: "syslog".into(),
        })
        .await
        .unwrap();
    assert_eq!(resp.status, Status::Ok);

    let rec = fx.devices.get_by_uuid("u-1").await.unwrap();
    assert_eq!(rec.logging.end_point, "logsink:514");
    assert_eq!(rec.logging.protocol, "syslog");

    let got = fx
        .server
        .client
        .get_logging_endpoint(&opendm_core::wire::HardwareId { uuid: "u-1".into() })
        .await
        .unwrap();
    assert_eq!(got.logging_endpoint, "logsink:514");
}

#[tokio::test]
async fn component_refresh_and_update_flow() {
    let fx = fixture().await;
    start_device(&fx, "olt-1").await;
    ingest_inventory(&fx).await;

    // Streaming refresh of one component.
    let mut stream = fx
        .server
        .client
        .get_hw_component_info(&HwComponentInfoGetRequest {
            device_uuid: "u-1".into(),
            component_uuid: "c-2".into(),
            component_name: String::new(),
        })
        .await
        .unwrap();
    let frame = stream.next().await.unwrap().unwrap();
    assert_eq!(frame.status, Status::Ok);
    assert_eq!(frame.component.as_ref().unwrap().uuid, "c-2");

    // Accepted changes land in the persisted record.
    let resp = fx
        .server
        .client
        .set_hw_component_info(&HwComponentInfoSetRequest {
            device_uuid: "u-1".into(),
            component_uuid: "c-2".into(),
            component_name: String::new(),
            changes: ModifiableComponent {
                alias: "front-fan".into(),
                admin_state: AdminState::Locked,
                ..Default::default()
            },
        })
        .await
        .unwrap();
    assert_eq!(resp.status, Status::Ok);

    let rec = fx.components.get_by_uuid("u-1", "c-2").await.unwrap();
    assert_eq!(rec.alias, "front-fan");
    assert_eq!(rec.state.unwrap().admin_state, AdminState::Locked);
}

#[tokio::test]
async fn component_rpcs_on_unknown_component_report_unknown_device() {
    let fx = fixture().await;
    start_device(&fx, "olt-1").await;

    let resp = fx
        .server
        .client
        .set_hw_component_info(&HwComponentInfoSetRequest {
            device_uuid: "u-1".into(),
            component_uuid: "c-404".into(),
            component_name: String::new(),
            changes: ModifiableComponent::default(),
        })
        .await
        .unwrap();

    assert_eq!(resp.status, Status::Error);
    assert_eq!(resp.reason, Reason::UnknownDevice);
}
