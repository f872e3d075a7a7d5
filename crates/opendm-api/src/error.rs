//! Mapping layer failures onto northbound response reasons.

use opendm_agent::AgentError;
use opendm_core::wire::Reason;
use opendm_store::StoreError;

/// A record that cannot be resolved is an unknown device; everything else
/// the store can fail with surfaces as an internal error.
pub(crate) fn store_reason(err: &StoreError) -> Reason {
    match err {
        StoreError::NotFound | StoreError::MissingField(_) => Reason::UnknownDevice,
        _ => Reason::InternalError,
    }
}

/// Adapter acquisition failures mean the device is unreachable; anything
/// that breaks after the session exists is internal.
pub(crate) fn agent_reason(err: &AgentError) -> Reason {
    match err {
        AgentError::ConnectionFailed(_) | AgentError::InvalidUri(_) => Reason::DeviceUnreachable,
        _ => Reason::InternalError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_records_map_to_unknown_device() {
        assert_eq!(store_reason(&StoreError::NotFound), Reason::UnknownDevice);
        assert_eq!(
            store_reason(&StoreError::MissingField("uuid")),
            Reason::UnknownDevice
        );
        assert_eq!(
            store_reason(&StoreError::ConnectionLost("gone".into())),
            Reason::InternalError
        );
    }

    #[test]
    fn connect_failures_map_to_device_unreachable() {
        assert_eq!(
            agent_reason(&AgentError::ConnectionFailed("refused".into())),
            Reason::DeviceUnreachable
        );
        assert_eq!(
            agent_reason(&AgentError::Transport("reset".into())),
            Reason::InternalError
        );
    }
}
