//! opendm-core - Data model and wire contract for the OpenDM gateway
//!
//! This crate holds the two vocabularies everything else is written in:
//! the persisted records for managed devices and their hardware components
//! ([`models`]), and the message set of the Native Hardware Management
//! Service ([`wire`]) spoken northbound to the NEM and southbound to each
//! device agent.

pub mod models;
pub mod wire;

pub use models::{DeviceRecord, HwCompRecord, LoggingInfo};
pub use wire::{
    Component, ComponentState, EntitiesLogLevel, Hardware, LogLevel, ModifiableComponent, Reason,
    Status,
};
