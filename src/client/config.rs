//! Client configuration.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::cipher::CipherConfig;
use crate::ruleset::RulesetKind;

/// Configuration for the local SOCKS5 client, loaded from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Local SOCKS5 listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Relay server address (`host:port`)
    #[serde(default = "default_server_addr")]
    pub server_addr: String,

    /// Cipher for the client-to-server leg; must match the server's
    #[serde(default)]
    pub cipher: CipherConfig,

    /// Routing policy
    #[serde(default)]
    pub ruleset: RulesetKind,
}

fn default_listen_addr() -> String {
    crate::DEFAULT_CLIENT_ADDR.to_string()
}

fn default_server_addr() -> String {
    crate::DEFAULT_SERVER_ADDR.to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            server_addr: default_server_addr(),
            cipher: CipherConfig::default(),
            ruleset: RulesetKind::default(),
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given relay server.
    pub fn new(server_addr: impl Into<String>, cipher: CipherConfig) -> Self {
        Self {
            server_addr: server_addr.into(),
            cipher,
            ..Self::default()
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.listen_addr
            .parse::<SocketAddr>()
            .map_err(|e| format!("invalid listen_addr {:?}: {}", self.listen_addr, e))?;

        match self.server_addr.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
            _ => return Err(format!("server_addr {:?} must be host:port", self.server_addr)),
        }

        if !self.cipher.is_shareable() {
            return Err("table cipher needs a table or seed shared with the server".into());
        }
        self.cipher.validate().map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::CipherKind;

    #[test]
    fn test_defaults() {
        let config: ClientConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.listen_addr, "127.0.0.1:4444");
        assert_eq!(config.server_addr, "127.0.0.1:5555");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_json() {
        let config: ClientConfig = serde_json::from_str(
            r#"{
                "listen_addr": "127.0.0.1:1080",
                "server_addr": "relay.example.com:8388",
                "cipher": { "kind": "table", "seed": 42 },
                "ruleset": "direct"
            }"#,
        )
        .unwrap();

        assert_eq!(config.server_addr, "relay.example.com:8388");
        assert_eq!(config.cipher.kind, CipherKind::Table);
        assert_eq!(config.cipher.seed, Some(42));
        assert_eq!(config.ruleset, RulesetKind::Direct);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = ClientConfig::default();
        config.listen_addr = "localhost".into();
        assert!(config.validate().is_err());

        let config = ClientConfig::new("no-port", CipherConfig::default());
        assert!(config.validate().is_err());

        let config = ClientConfig::new(":5555", CipherConfig::default());
        assert!(config.validate().is_err());

        let mut cipher = CipherConfig::new(CipherKind::Nop);
        cipher.seed = Some(3);
        let config = ClientConfig::new("127.0.0.1:5555", cipher);
        assert!(config.validate().is_err());

        let config = ClientConfig::new("127.0.0.1:5555", CipherConfig::new(CipherKind::Table));
        assert!(config.validate().is_err());
    }
}
