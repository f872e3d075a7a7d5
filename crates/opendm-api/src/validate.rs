//! Request validation shared by the handlers.

use opendm_core::wire::EntitiesLogLevel;
use tracing::debug;

/// Check that `uri` is `host:port` with a decimal port and a host that is
/// either a parseable IP or a resolvable name. The returned message becomes
/// the response's `reason_detail`.
pub async fn validate_uri(uri: &str) -> Result<(), String> {
    let Some((host, port)) = uri.rsplit_once(':') else {
        return Err("incorrect IP address format (<ip>:<port #>)".to_string());
    };

    if port.parse::<u16>().is_err() {
        return Err(format!("Port number {port} needs to be an integer"));
    }

    if host.parse::<std::net::IpAddr>().is_err() {
        // Not an IP literal; accept any resolvable hostname.
        let candidate = format!("{host}:{port}");
        if tokio::net::lookup_host(candidate).await.is_err() {
            return Err(format!("invalid IP address {host}"));
        }
    }

    debug!(uri, "uri validated");
    Ok(())
}

/// A set-log-level request needs at least one group, and any group in a
/// multi-group request must name its entities.
pub fn validate_set_log_level(groups: &[EntitiesLogLevel]) -> Result<(), String> {
    if groups.is_empty() {
        return Err("found empty entities".to_string());
    }
    if groups.len() > 1 && groups.iter().any(|g| g.entities.is_empty()) {
        return Err("set empty entries not allowed".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use opendm_core::wire::LogLevel;

    #[tokio::test]
    async fn ip_and_port_pass() {
        assert!(validate_uri("10.0.0.1:50051").await.is_ok());
        assert!(validate_uri("127.0.0.1:9292").await.is_ok());
    }

    #[tokio::test]
    async fn malformed_uris_are_rejected_with_details() {
        assert_eq!(
            validate_uri("10.0.0.1").await.unwrap_err(),
            "incorrect IP address format (<ip>:<port #>)"
        );
        assert_eq!(
            validate_uri("notanip:port").await.unwrap_err(),
            "Port number port needs to be an integer"
        );
        assert_eq!(
            validate_uri("998.0.0.1:50051").await.unwrap_err(),
            "invalid IP address 998.0.0.1"
        );
    }

    #[test]
    fn set_log_level_shape_rules() {
        assert!(validate_set_log_level(&[]).is_err());

        let global_only = vec![EntitiesLogLevel {
            log_level: LogLevel::Info,
            entities: Vec::new(),
        }];
        assert!(validate_set_log_level(&global_only).is_ok());

        let mixed = vec![
            EntitiesLogLevel {
                log_level: LogLevel::Info,
                entities: vec!["sw".into()],
            },
            EntitiesLogLevel {
                log_level: LogLevel::Warn,
                entities: Vec::new(),
            },
        ];
        assert!(validate_set_log_level(&mixed).is_err());
    }
}
