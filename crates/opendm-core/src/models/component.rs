//! Persisted record for one hardware component of a managed device.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::wire::{
    Component, ComponentSensorData, ComponentState, ComponentType, ModifiableComponent,
};

/// One physical or logical component of a managed device, keyed by
/// `(device uuid, component uuid)` with a per-device name index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HwCompRecord {
    /// Unique within the owning device.
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
    /// Uuids of the direct children.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
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
    /// Device-assigned, unique within the device.
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ComponentState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sensor_data: Vec<ComponentSensorData>,
    /// Opaque vendor-specific blob.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specific: Option<String>,
}

impl HwCompRecord {
    /// Materialize a record from one streamed inventory node. Grandchildren
    /// are flattened into their uuids; deeper levels get their own records.
    pub fn from_component(node: &Component) -> Self {
        Self {
            name: node.name.clone(),
            class: node.class,
            description: node.description.clone(),
            parent: node.parent.clone(),
            parent_rel_pos: node.parent_rel_pos,
            children: node.children.iter().map(|c| c.uuid.clone()).collect(),
            serial_num: node.serial_num.clone(),
            mfg_name: node.mfg_name.clone(),
            model_name: node.model_name.clone(),
            alias: node.alias.clone(),
            asset_id: node.asset_id.clone(),
            is_fru: node.is_fru,
            mfg_date: node.mfg_date,
            uri: node.uri.clone(),
            uuid: node.uuid.clone(),
            state: node.state,
            sensor_data: node.sensor_data.clone(),
            specific: node.specific.clone(),
        }
    }

    /// Refresh this record from a `GetHWComponentInfo` frame. Attributes the
    /// device reported win; the stored uuid is kept when the frame omits one,
    /// and a reported state overwrites the admin state specifically.
    pub fn merge_component(&mut self, node: &Component) {
        let uuid = if node.uuid.is_empty() {
            self.uuid.clone()
        } else {
            node.uuid.clone()
        };
        let mut refreshed = Self::from_component(node);
        refreshed.uuid = uuid;

        if let Some(reported) = node.state {
            let mut state = self.state.unwrap_or_default();
            state.admin_state = reported.admin_state;
            state.oper_state = reported.oper_state;
            refreshed.state = Some(state);
        } else {
            refreshed.state = self.state;
        }

        *self = refreshed;
    }

    /// Fold accepted `SetHWComponentInfo` changes into the record. Unset
    /// descriptive fields keep their stored values; the admin state always
    /// follows the request.
    pub fn apply_changes(&mut self, changes: &ModifiableComponent) {
        if !changes.name.is_empty() {
            self.name = changes.name.clone();
        }
        if changes.class != ComponentType::Undefined {
            self.class = changes.class;
        }
        if !changes.parent.is_empty() {
            self.parent = changes.parent.clone();
        }
        if changes.parent_rel_pos != 0 {
            self.parent_rel_pos = changes.parent_rel_pos;
        }
        if !changes.alias.is_empty() {
            self.alias = changes.alias.clone();
        }
        if !changes.asset_id.is_empty() {
            self.asset_id = changes.asset_id.clone();
        }
        if !changes.uri.is_empty() {
            self.uri = changes.uri.clone();
        }
        let mut state = self.state.unwrap_or_default();
        state.admin_state = changes.admin_state;
        self.state = Some(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::AdminState;

    fn fan_node() -> Component {
        Component {
            name: "fan-1".into(),
            class: ComponentType::Fan,
            uuid: "c-1".into(),
            parent: "chassis".into(),
            serial_num: "F-001".into(),
            is_fru: true,
            children: vec![Component {
                name: "fan-1-sensor".into(),
                uuid: "c-11".into(),
                class: ComponentType::Sensor,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn from_component_flattens_child_uuids() {
        let rec = HwCompRecord::from_component(&fan_node());
        assert_eq!(rec.uuid, "c-1");
        assert_eq!(rec.children, vec!["c-11".to_string()]);
        assert!(rec.is_fru);
    }

    #[test]
    fn merge_keeps_uuid_and_overwrites_admin_state() {
        let mut rec = HwCompRecord::from_component(&fan_node());
        let mut update = fan_node();
        update.uuid = String::new();
        update.serial_num = "F-002".into();
        update.state = Some(ComponentState {
            admin_state: AdminState::Locked,
            ..Default::default()
        });

        rec.merge_component(&update);
        assert_eq!(rec.uuid, "c-1");
        assert_eq!(rec.serial_num, "F-002");
        assert_eq!(rec.state.unwrap().admin_state, AdminState::Locked);
    }

    #[test]
    fn apply_changes_merges_only_set_fields() {
        let mut rec = HwCompRecord::from_component(&fan_node());
        rec.apply_changes(&ModifiableComponent {
            alias: "front-fan".into(),
            admin_state: AdminState::ShuttingDown,
            ..Default::default()
        });

        assert_eq!(rec.alias, "front-fan");
        assert_eq!(rec.name, "fan-1");
        assert_eq!(rec.serial_num, "F-001");
        assert_eq!(rec.state.unwrap().admin_state, AdminState::ShuttingDown);
    }

    #[test]
    fn record_round_trips_through_json() {
        let rec = HwCompRecord::from_component(&fan_node());
        let json = serde_json::to_string(&rec).unwrap();
        let back: HwCompRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rec);
    }
}
