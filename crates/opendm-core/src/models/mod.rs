//! Persisted records for managed devices and their hardware components.

mod component;
mod device;

pub use component::HwCompRecord;
pub use device::{DeviceRecord, LoggingInfo};
