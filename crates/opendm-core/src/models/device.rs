//! The authoritative record for a managed device.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::wire::{
    bucket_by_level, Component, ComponentState, ComponentType, EntitiesLogLevel, Hardware,
    LogLevel, ModifiableComponent,
};

/// Logging policy of a device: where its logs ship to and how verbose its
/// loggable entities are.
///
/// `loggable_entities` distinguishes "never learned from the device" (`None`)
/// from "learned, and the device has a single global level" (`Some` empty).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingInfo {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub end_point: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub protocol: String,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loggable_entities: Option<HashMap<String, LogLevel>>,
}

/// Persisted record of a managed device, keyed by `name` with a secondary
/// uuid lookup once the device has reported one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Assigned by the device on a successful `StartManagingDevice`; empty
    /// until discovery completes.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uuid: String,
    /// Caller-assigned primary key.
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub make: String,
    #[serde(default)]
    pub class: ComponentType,
    #[serde(default)]
    pub parent_rel_pos: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alias: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub asset_id: String,
    /// `host:port` of the device agent.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uri: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hardware_rev: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub firmware_rev: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub software_rev: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub serial_num: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mfg_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mfg_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ComponentState>,
    /// Uuids of the components directly attached to the hardware root.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
    #[serde(default)]
    pub logging: LoggingInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_change: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_booted: Option<DateTime<Utc>>,
}

impl DeviceRecord {
    /// Build the tentative record for a `StartManagingDevice` request.
    /// The uuid stays empty until the device reports one.
    pub fn from_start_request(req: &ModifiableComponent) -> Self {
        Self {
            name: req.name.clone(),
            make: req.make.clone(),
            class: req.class,
            parent_rel_pos: req.parent_rel_pos,
            alias: req.alias.clone(),
            asset_id: req.asset_id.clone(),
            uri: req.uri.clone(),
            state: Some(ComponentState {
                admin_state: req.admin_state,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// The northbound view of this record for `GetManagedDevices`.
    pub fn to_modifiable(&self) -> ModifiableComponent {
        ModifiableComponent {
            name: self.name.clone(),
            make: self.make.clone(),
            class: self.class,
            parent_rel_pos: self.parent_rel_pos,
            alias: self.alias.clone(),
            asset_id: self.asset_id.clone(),
            uri: self.uri.clone(),
            admin_state: self.state.map(|s| s.admin_state).unwrap_or_default(),
            ..Default::default()
        }
    }

    /// Copy root-level hardware attributes reported by the device into the
    /// record. `name` and `uuid` are ours, not the device's, and survive.
    /// `children` is replaced by the uuids of the root's direct children.
    pub fn apply_hardware_snapshot(&mut self, hw: &Hardware) {
        let root = &hw.root;
        self.class = root.class;
        self.parent_rel_pos = root.parent_rel_pos;
        if !root.alias.is_empty() {
            self.alias = root.alias.clone();
        }
        if !root.asset_id.is_empty() {
            self.asset_id = root.asset_id.clone();
        }
        self.hardware_rev = root.hardware_rev.clone();
        self.firmware_rev = root.firmware_rev.clone();
        self.software_rev = root.software_rev.clone();
        self.serial_num = root.serial_num.clone();
        self.model_name = root.model_name.clone();
        self.mfg_name = root.mfg_name.clone();
        self.mfg_date = root.mfg_date;
        if let Some(state) = root.state {
            self.state = Some(state);
        }
        self.children = root.children.iter().map(|c| c.uuid.clone()).collect();
        self.last_booted = hw.last_booted;
        self.last_change = hw.last_change;
    }

    /// Fold a level assignment reported by (or pushed to) the device into the
    /// record's logging policy.
    ///
    /// A single group with no entity list sets the device-global level when no
    /// per-entity policy has been learned yet; otherwise each listed entity
    /// gets the group's level.
    pub fn merge_loggable_entities(&mut self, groups: &[EntitiesLogLevel]) {
        if self.logging.loggable_entities.is_none()
            && groups.len() == 1
            && groups[0].entities.is_empty()
        {
            self.logging.log_level = groups[0].log_level;
            return;
        }

        let known = self.logging.loggable_entities.get_or_insert_with(HashMap::new);
        for group in groups {
            for entity in &group.entities {
                known.insert(entity.clone(), group.log_level);
            }
        }
    }

    /// Answer a log-level query from the cached policy.
    ///
    /// With an explicit entity list, every entity must be known or the query
    /// fails (`None`). With no entities requested, an empty policy collapses
    /// to one group carrying the global level; otherwise all known entities
    /// are bucketed by level.
    pub fn loggable_entities_view(&self, entities: &[String]) -> Option<Vec<EntitiesLogLevel>> {
        let known = self.logging.loggable_entities.as_ref();

        if !entities.is_empty() {
            let known = known?;
            let mut requested = HashMap::new();
            for entity in entities {
                let level = known.get(entity)?;
                requested.insert(entity.clone(), *level);
            }
            return Some(bucket_by_level(&requested));
        }

        match known {
            Some(known) if !known.is_empty() => Some(bucket_by_level(known)),
            _ => Some(vec![EntitiesLogLevel {
                log_level: self.logging.log_level,
                entities: Vec::new(),
            }]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::AdminState;

    fn start_request() -> ModifiableComponent {
        ModifiableComponent {
            name: "olt-1".into(),
            make: "ROLT".into(),
            uri: "10.0.0.1:50051".into(),
            admin_state: AdminState::Unlocked,
            ..Default::default()
        }
    }

    #[test]
    fn record_from_start_request_seeds_admin_state() {
        let rec = DeviceRecord::from_start_request(&start_request());
        assert_eq!(rec.name, "olt-1");
        assert_eq!(rec.uri, "10.0.0.1:50051");
        assert!(rec.uuid.is_empty());
        assert_eq!(rec.state.unwrap().admin_state, AdminState::Unlocked);
    }

    #[test]
    fn snapshot_preserves_identity_and_replaces_children() {
        let mut rec = DeviceRecord::from_start_request(&start_request());
        rec.uuid = "u-1".into();

        let hw = Hardware {
            last_booted: Some(Utc::now()),
            last_change: None,
            root: Component {
                name: "device-root".into(),
                class: ComponentType::Chassis,
                serial_num: "SN-7".into(),
                model_name: "X-4000".into(),
                children: vec![
                    Component {
                        uuid: "c-1".into(),
                        name: "slot-1".into(),
                        ..Default::default()
                    },
                    Component {
                        uuid: "c-2".into(),
                        name: "slot-2".into(),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            },
        };

        rec.apply_hardware_snapshot(&hw);
        assert_eq!(rec.name, "olt-1");
        assert_eq!(rec.uuid, "u-1");
        assert_eq!(rec.serial_num, "SN-7");
        assert_eq!(rec.children, vec!["c-1".to_string(), "c-2".to_string()]);
        assert!(rec.last_booted.is_some());
    }

    #[test]
    fn single_global_group_sets_device_level() {
        let mut rec = DeviceRecord::default();
        rec.merge_loggable_entities(&[EntitiesLogLevel {
            log_level: LogLevel::Warn,
            entities: Vec::new(),
        }]);
        assert_eq!(rec.logging.log_level, LogLevel::Warn);
        assert!(rec.logging.loggable_entities.is_none());
    }

    #[test]
    fn entity_groups_accumulate_per_entity_levels() {
        let mut rec = DeviceRecord::default();
        rec.merge_loggable_entities(&[
            EntitiesLogLevel {
                log_level: LogLevel::Info,
                entities: vec!["sw".into(), "hw".into()],
            },
            EntitiesLogLevel {
                log_level: LogLevel::Error,
                entities: vec!["api".into()],
            },
        ]);
        let known = rec.logging.loggable_entities.as_ref().unwrap();
        assert_eq!(known.get("sw"), Some(&LogLevel::Info));
        assert_eq!(known.get("api"), Some(&LogLevel::Error));
    }

    #[test]
    fn view_fails_on_unknown_entity() {
        let mut rec = DeviceRecord::default();
        rec.merge_loggable_entities(&[EntitiesLogLevel {
            log_level: LogLevel::Info,
            entities: vec!["sw".into()],
        }]);
        assert!(rec.loggable_entities_view(&["nope".to_string()]).is_none());
        assert!(rec.loggable_entities_view(&["sw".to_string()]).is_some());
    }

    #[test]
    fn view_collapses_empty_policy_to_global_level() {
        let mut rec = DeviceRecord::default();
        rec.logging.log_level = LogLevel::Error;
        let groups = rec.loggable_entities_view(&[]).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].log_level, LogLevel::Error);
        assert!(groups[0].entities.is_empty());
    }

    #[test]
    fn record_round_trips_through_json() {
        let mut rec = DeviceRecord::from_start_request(&start_request());
        rec.uuid = "u-1".into();
        rec.children = vec!["c-1".into()];
        rec.logging.end_point = "logsink:514".into();
        rec.merge_loggable_entities(&[EntitiesLogLevel {
            log_level: LogLevel::Debug,
            entities: vec!["sw".into()],
        }]);

        let json = serde_json::to_string(&rec).unwrap();
        let back: DeviceRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rec);
    }
}
