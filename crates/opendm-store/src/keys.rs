//! Key layout of the `/OpenDevMgr` namespace.
//!
//! ```text
//! /OpenDevMgr/{v}/DevRec/DevName/{name}              -> JSON(DeviceRecord)
//! /OpenDevMgr/{v}/DevRec/DevUuid/{uuid}              -> name
//! /OpenDevMgr/{v}/HwCompRec/{devUuid}/Components     -> JSON(name -> uuid)
//! /OpenDevMgr/{v}/HwCompRec/{devUuid}/Uuid/{compUuid} -> JSON(HwCompRecord)
//! ```

/// Namespace root shared by every row the gateway writes.
pub const DB_PREFIX: &str = "/OpenDevMgr/";

/// Current schema version tag.
pub const DB_VERSION: &str = "v1";

pub fn device_name_key(name: &str) -> String {
    format!("{DB_PREFIX}{DB_VERSION}/DevRec/DevName/{name}")
}

pub fn device_name_prefix() -> String {
    device_name_key("")
}

pub fn device_uuid_key(uuid: &str) -> String {
    format!("{DB_PREFIX}{DB_VERSION}/DevRec/DevUuid/{uuid}")
}

pub fn component_prefix(dev_uuid: &str) -> String {
    format!("{DB_PREFIX}{DB_VERSION}/HwCompRec/{dev_uuid}/")
}

pub fn component_name_index_key(dev_uuid: &str) -> String {
    format!("{}Components", component_prefix(dev_uuid))
}

pub fn component_uuid_key(dev_uuid: &str, comp_uuid: &str) -> String {
    format!("{}Uuid/{comp_uuid}", component_prefix(dev_uuid))
}
