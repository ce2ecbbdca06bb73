use serde::{Deserialize, Serialize};

/// Stored configuration for a single remote instance.
/// Persisted by the configuration store; read-only to the connection code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// User-chosen short name, unique across remotes
    pub alias: String,
    /// Hostname or IP address of the remote instance
    pub host: String,
    pub port: u16,
    /// Bearer token sent in the `auth` handshake
    pub token: String,
    /// RFC 3339 time of the last successful authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_connected: Option<String>,
}

impl RemoteConfig {
    pub fn new(
        alias: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        token: impl Into<String>,
    ) -> Self {
        Self {
            alias: alias.into(),
            host: host.into(),
            port,
            token: token.into(),
            last_connected: None,
        }
    }

    /// `host:port`, for log lines and error messages.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_connected_is_optional_on_disk() {
        let json = r#"{"alias":"work","host":"10.0.0.2","port":19100,"token":"t"}"#;
        let config: RemoteConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config, RemoteConfig::new("work", "10.0.0.2", 19100, "t"));
        assert!(!serde_json::to_string(&config).unwrap().contains("last_connected"));
    }

    #[test]
    fn address_joins_host_and_port() {
        assert_eq!(RemoteConfig::new("a", "example.org", 8080, "t").address(), "example.org:8080");
    }
}
