//! opendm-api - Northbound RPC surface of the OpenDM gateway
//!
//! Axum handlers implementing the Native Hardware Management Service for the
//! NEM. Every handler follows the same skeleton: derive a request-scoped
//! correlation id, validate, resolve the target records, acquire a
//! southbound adapter from the connection registry, invoke it, and map
//! failures onto the typed response reasons.

pub mod error;
pub mod handlers;
pub mod registry;
pub mod state;
pub mod testing;
pub mod validate;

mod glue;

pub use registry::ConnectionRegistry;
pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Assemble the northbound router over the given application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route(
            "/hwmgmt/v1/devices",
            post(handlers::devices::start_managing_device)
                .get(handlers::devices::get_managed_devices),
        )
        .route(
            "/hwmgmt/v1/devices/stop",
            post(handlers::devices::stop_managing_device),
        )
        .route(
            "/hwmgmt/v1/devices/:device_uuid/inventory",
            get(handlers::inventory::get_physical_inventory),
        )
        .route(
            "/hwmgmt/v1/devices/:device_uuid/components/:component_uuid",
            get(handlers::inventory::get_hw_component_info)
                .put(handlers::inventory::set_hw_component_info),
        )
        .route(
            "/hwmgmt/v1/devices/:device_uuid/logging/endpoint",
            get(handlers::logging::get_logging_endpoint)
                .put(handlers::logging::set_logging_endpoint),
        )
        .route(
            "/hwmgmt/v1/devices/:device_uuid/logging/entities",
            get(handlers::logging::get_loggable_entities),
        )
        .route(
            "/hwmgmt/v1/devices/:device_uuid/logging/level",
            get(handlers::logging::get_log_level).put(handlers::logging::set_log_level),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
