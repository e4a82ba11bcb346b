//! Read-only access to the externally managed JSON config document

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Opaque token identifying one certificate/key generation
///
/// Only ever compared for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Marker(String);

impl Marker {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Certificate, key and marker as read from one load of the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    pub cert: String,
    pub key: String,
    pub marker: Marker,
}

/// Supplies the current certificate, key and marker
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Read the current state. Implementations must not cache.
    async fn load(&self) -> Result<ConfigSnapshot, ConfigError>;

    /// Human readable location for logging
    fn describe(&self) -> String;
}

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(rename = "HTTPConfig")]
    http_config: HttpConfig,
}

#[derive(Debug, Deserialize)]
struct HttpConfig {
    #[serde(rename = "TLSCert")]
    tls_cert: String,
    #[serde(rename = "TLSKey")]
    tls_key: String,
    #[serde(rename = "TLSValidUntil")]
    tls_valid_until: String,
}

/// Config source backed by the JSON document on disk
#[derive(Debug, Clone)]
pub struct JsonConfigSource {
    path: PathBuf,
}

impl JsonConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse document contents into a snapshot
    pub fn parse(path: &Path, contents: &str) -> Result<ConfigSnapshot, ConfigError> {
        let document: Document =
            serde_json::from_str(contents).map_err(|e| ConfigError::Malformed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let http = document.http_config;
        Ok(ConfigSnapshot {
            cert: http.tls_cert,
            key: http.tls_key,
            marker: Marker::new(http.tls_valid_until),
        })
    }
}

#[async_trait]
impl ConfigSource for JsonConfigSource {
    async fn load(&self) -> Result<ConfigSnapshot, ConfigError> {
        let contents =
            tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|source| ConfigError::Missing {
                    path: self.path.clone(),
                    source,
                })?;

        Self::parse(&self.path, &contents)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
