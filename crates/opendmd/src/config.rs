//! Environment-variable configuration with fixed defaults.

use std::time::Duration;

// Environment variable names.
const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
const ENV_MSGBUS_END_POINT: &str = "MSGBUS_END_POINT";
const ENV_MSGBUS_RETRY_INTERVAL: &str = "MSGBUS_RETRY_INTERVAL";
const ENV_DB_END_POINT: &str = "DB_END_POINT";
const ENV_DB_TIMEOUT: &str = "DB_TIMEOUT";
const ENV_GRPC_END_POINT: &str = "GRPC_END_POINT";
const ENV_GRPC_RETRY_INTERVAL: &str = "GRPC_RETRY_INTERVAL";
const ENV_GRPC_BACKOFF_MAX_DELAY: &str = "GRPC_BACKOFF_MAX_DELAY";
const ENV_GRPC_MAX_RETRY_COUNT: &str = "GRPC_MAX_RETRY_COUNT";
const ENV_SECURE_GRPC: &str = "SECURE_GRPC";

// Certificate material lives at fixed paths inside the pod.
pub const PATH_ROOT_CA_CRT: &str = "/etc/Root_CA.crt";
pub const PATH_SERVER_CRT: &str = "/etc/grpc_server.crt";
pub const PATH_SERVER_KEY: &str = "/etc/grpc_server.key";

/// Fixed name device agents present in their certificates.
pub const AGENT_TLS_SERVER_NAME: &str = "DMI";

/// Runtime configuration, defaults overridden from the environment.
#[derive(Debug, Clone)]
pub struct CoreFlags {
    pub log_level: String,
    pub msgbus_end_point: String,
    pub msgbus_retry_interval: Duration,
    pub db_end_point: String,
    pub db_timeout: Duration,
    /// Northbound listen address.
    pub listen_end_point: String,
    /// Southbound per-attempt dial timeout.
    pub dial_timeout: Duration,
    /// Southbound reconnect backoff cap.
    pub backoff_max_delay: Duration,
    /// Southbound dial retry budget.
    pub max_retry_count: u32,
    /// TLS on both directions.
    pub secure_connection: bool,
}

impl Default for CoreFlags {
    fn default() -> Self {
        Self {
            log_level: "DEBUG".to_string(),
            msgbus_end_point: "127.0.0.1:9092".to_string(),
            msgbus_retry_interval: Duration::from_secs(10),
            db_end_point: "127.0.0.1:2379".to_string(),
            db_timeout: Duration::from_secs(5),
            listen_end_point: "0.0.0.0:9292".to_string(),
            dial_timeout: Duration::from_secs(10),
            backoff_max_delay: Duration::from_secs(30),
            max_retry_count: 5,
            secure_connection: false,
        }
    }
}

impl CoreFlags {
    /// Read every known variable, keeping the default on absent or
    /// unparseable values. Runs before tracing is up, so complaints go to
    /// stderr directly.
    pub fn from_env() -> Self {
        let mut flags = Self::default();

        if let Ok(v) = std::env::var(ENV_LOG_LEVEL) {
            flags.log_level = v;
        }
        if let Ok(v) = std::env::var(ENV_MSGBUS_END_POINT) {
            flags.msgbus_end_point = v;
        }
        env_seconds(ENV_MSGBUS_RETRY_INTERVAL, &mut flags.msgbus_retry_interval);
        if let Ok(v) = std::env::var(ENV_DB_END_POINT) {
            flags.db_end_point = v;
        }
        env_seconds(ENV_DB_TIMEOUT, &mut flags.db_timeout);
        if let Ok(v) = std::env::var(ENV_GRPC_END_POINT) {
            flags.listen_end_point = v;
        }
        env_seconds(ENV_GRPC_RETRY_INTERVAL, &mut flags.dial_timeout);
        env_seconds(ENV_GRPC_BACKOFF_MAX_DELAY, &mut flags.backoff_max_delay);
        if let Ok(v) = std::env::var(ENV_GRPC_MAX_RETRY_COUNT) {
            match v.parse() {
                Ok(n) => flags.max_retry_count = n,
                Err(_) => eprintln!(
                    "Invalid value '{v}' passed for '{ENV_GRPC_MAX_RETRY_COUNT}'. Taking the default value."
                ),
            }
        }
        if let Ok(v) = std::env::var(ENV_SECURE_GRPC) {
            match v.parse() {
                Ok(b) => flags.secure_connection = b,
                Err(_) => eprintln!(
                    "Invalid value '{v}' passed for '{ENV_SECURE_GRPC}'. Taking the default value."
                ),
            }
        }

        flags
    }
}

fn env_seconds(name: &str, target: &mut Duration) {
    if let Ok(v) = std::env::var(name) {
        match v.parse::<u64>() {
            Ok(secs) => *target = Duration::from_secs(secs),
            Err(_) => {
                eprintln!("Invalid value '{v}' passed for '{name}'. Taking the default value.")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_deployment_contract() {
        let flags = CoreFlags::default();
        assert_eq!(flags.listen_end_point, "0.0.0.0:9292");
        assert_eq!(flags.db_end_point, "127.0.0.1:2379");
        assert_eq!(flags.msgbus_end_point, "127.0.0.1:9092");
        assert_eq!(flags.db_timeout, Duration::from_secs(5));
        assert_eq!(flags.backoff_max_delay, Duration::from_secs(30));
        assert_eq!(flags.max_retry_count, 5);
        assert!(!flags.secure_connection);
    }
}
