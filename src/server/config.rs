//! Server configuration.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::cipher::CipherConfig;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen address
    pub listen_addr: String,
    /// Listen port
    pub listen_port: u16,
    /// Cipher shared with every client
    pub cipher: CipherConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1".into(),
            listen_port: crate::DEFAULT_SERVER_PORT,
            cipher: CipherConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a configuration with a freshly generated substitution table.
    pub fn new_random(listen_addr: impl Into<String>, listen_port: u16) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            listen_port,
            cipher: CipherConfig::random_table(),
        }
    }

    /// `addr:port` string to bind.
    pub fn bind_addr(&self) -> String {
        match self.listen_addr.parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => format!("[{}]:{}", ip, self.listen_port),
            _ => format!("{}:{}", self.listen_addr, self.listen_port),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_addr.is_empty() {
            return Err("listen_addr cannot be empty".into());
        }
        if !self.cipher.is_shareable() {
            return Err("table cipher needs a table or seed shared with clients".into());
        }
        self.cipher.validate().map_err(|e| e.to_string())
    }
}

/// Configuration file format for serialization.
#[derive(Debug, Serialize, Deserialize)]
pub struct ServerConfigFile {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Listen port
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Cipher section
    #[serde(default)]
    pub cipher: CipherConfig,
}

fn default_listen_addr() -> String {
    ServerConfig::default().listen_addr
}

fn default_listen_port() -> u16 {
    crate::DEFAULT_SERVER_PORT
}

impl ServerConfigFile {
    /// Convert to runtime configuration.
    pub fn to_config(&self) -> Result<ServerConfig, String> {
        self.cipher
            .validate()
            .map_err(|e| format!("Invalid cipher section: {}", e))?;

        Ok(ServerConfig {
            listen_addr: self.listen_addr.clone(),
            listen_port: self.listen_port,
            cipher: self.cipher.clone(),
        })
    }

    /// Create from runtime configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            listen_addr: config.listen_addr.clone(),
            listen_port: config.listen_port,
            cipher: config.cipher.clone(),
        }
    }
}
