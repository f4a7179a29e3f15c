//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via TLSCHAT_CONFIG)
//! 3. Environment variables

use crate::error::ServerError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// TLS configuration.
    pub tls: TlsConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ServerError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("TLSCHAT_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServerError::Config(format!("failed to read config file '{}': {}", path.display(), e))
        })?;
        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ServerError::Config(format!("failed to parse config file '{}': {}", path.display(), e))
        })?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        self.network.apply_env_overrides();
        self.tls.apply_env_overrides();
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ServerError> {
        self.tls.validate()
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to.
    #[serde(with = "socket_addr_serde")]
    pub bind_addr: SocketAddr,
    /// Greeting line sent to each client after the TLS handshake.
    pub greeting: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9000".parse().unwrap(),
            greeting: "Welcome to tlschat. Lines you send are echoed back.".to_string(),
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("TLSCHAT_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }

        if let Ok(greeting) = std::env::var("TLSCHAT_GREETING") {
            self.greeting = greeting;
        }
    }
}

/// TLS protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsVersion {
    Tls12,
    Tls13,
}

/// TLS configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Path to PEM-encoded server certificate file.
    #[serde(default)]
    pub cert_path: Option<PathBuf>,
    /// Path to PEM-encoded private key file.
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    /// Protocol versions offered during the handshake.
    pub protocol_versions: Vec<TlsVersion>,
    /// Require client certificate authentication (mTLS).
    #[serde(default)]
    pub require_client_cert: bool,
    /// Path to PEM-encoded CA certificate(s) for verifying client certs.
    /// Required if require_client_cert is true.
    #[serde(default)]
    pub client_ca_path: Option<PathBuf>,
    /// Check client certificates against revocation lists.
    #[serde(default)]
    pub check_revocation: bool,
    /// Path to PEM-encoded CRLs. Required if check_revocation is true.
    #[serde(default)]
    pub crl_path: Option<PathBuf>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: None,
            key_path: None,
            protocol_versions: vec![TlsVersion::Tls12, TlsVersion::Tls13],
            require_client_cert: false,
            client_ca_path: None,
            check_revocation: false,
            crl_path: None,
        }
    }
}

impl TlsConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("TLSCHAT_TLS_CERT") {
            self.cert_path = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("TLSCHAT_TLS_KEY") {
            self.key_path = Some(PathBuf::from(path));
        }
        if let Ok(versions) = std::env::var("TLSCHAT_TLS_VERSIONS") {
            let parsed: Vec<TlsVersion> = versions
                .split(',')
                .filter_map(|v| match v.trim().to_lowercase().as_str() {
                    "tls12" | "1.2" => Some(TlsVersion::Tls12),
                    "tls13" | "1.3" => Some(TlsVersion::Tls13),
                    _ => None,
                })
                .collect();
            if !parsed.is_empty() {
                self.protocol_versions = parsed;
            }
        }
        if let Ok(require) = std::env::var("TLSCHAT_TLS_REQUIRE_CLIENT_CERT") {
            self.require_client_cert = require == "1" || require.to_lowercase() == "true";
        }
        if let Ok(path) = std::env::var("TLSCHAT_TLS_CLIENT_CA") {
            self.client_ca_path = Some(PathBuf::from(path));
        }
        if let Ok(check) = std::env::var("TLSCHAT_TLS_CHECK_REVOCATION") {
            self.check_revocation = check == "1" || check.to_lowercase() == "true";
        }
        if let Ok(path) = std::env::var("TLSCHAT_TLS_CRL") {
            self.crl_path = Some(PathBuf::from(path));
        }
    }

    /// Validates TLS configuration.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.cert_path.is_none() {
            return Err(ServerError::Config("cert_path not set".to_string()));
        }
        if self.key_path.is_none() {
            return Err(ServerError::Config("key_path not set".to_string()));
        }
        if self.protocol_versions.is_empty() {
            return Err(ServerError::Config(
                "at least one TLS protocol version must be enabled".to_string(),
            ));
        }
        if self.require_client_cert && self.client_ca_path.is_none() {
            return Err(ServerError::Config(
                "client_ca_path not set for client certificate verification".to_string(),
            ));
        }
        if self.check_revocation && !self.require_client_cert {
            return Err(ServerError::Config(
                "check_revocation requires require_client_cert".to_string(),
            ));
        }
        if self.check_revocation && self.crl_path.is_none() {
            return Err(ServerError::Config(
                "crl_path not set for revocation checking".to_string(),
            ));
        }

        Ok(())
    }
}

/// Custom serde module for SocketAddr (to handle as string in YAML).
mod socket_addr_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::net::SocketAddr;

    pub fn serialize<S>(addr: &SocketAddr, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&addr.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SocketAddr, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.bind_addr.port(), 9000);
        assert_eq!(
            config.tls.protocol_versions,
            vec![TlsVersion::Tls12, TlsVersion::Tls13]
        );
        assert!(!config.tls.require_client_cert);
        assert!(!config.network.greeting.is_empty());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut config = Config::default();
        config.tls.cert_path = Some(PathBuf::from("/etc/tlschat/cert.pem"));
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.network.bind_addr, config.network.bind_addr);
        assert_eq!(parsed.tls.cert_path, config.tls.cert_path);
        assert_eq!(parsed.tls.protocol_versions, config.tls.protocol_versions);
    }

    #[test]
    fn test_validate_missing_cert() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cert_path not set"));
    }

    #[test]
    fn test_validate_mtls_missing_ca() {
        let mut config = Config::default();
        config.tls.cert_path = Some(PathBuf::from("/some/cert.pem"));
        config.tls.key_path = Some(PathBuf::from("/some/key.pem"));
        config.tls.require_client_cert = true;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("client_ca_path not set"));
    }

    #[test]
    fn test_validate_revocation_requires_mtls() {
        let mut config = Config::default();
        config.tls.cert_path = Some(PathBuf::from("/some/cert.pem"));
        config.tls.key_path = Some(PathBuf::from("/some/key.pem"));
        config.tls.check_revocation = true;

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("require_client_cert"));
    }

    #[test]
    fn test_validate_empty_versions() {
        let mut config = Config::default();
        config.tls.cert_path = Some(PathBuf::from("/some/cert.pem"));
        config.tls.key_path = Some(PathBuf::from("/some/key.pem"));
        config.tls.protocol_versions.clear();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("protocol version"));
    }
}
