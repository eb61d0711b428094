//! Contextual configuration for a message exchange.
//!
//! Configuration is a flat key→value map using the `ws-security.*` keys below,
//! plus named tables of inline crypto properties. One `SecurityConfig` is
//! scoped to one exchange; callers clone a template per exchange.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Username for username tokens (and the default signing user)
pub const USERNAME: &str = "ws-security.username";
/// Password for username tokens
pub const PASSWORD: &str = "ws-security.password";
/// Alias of the signing key; falls back to [`USERNAME`]
pub const SIGNATURE_USERNAME: &str = "ws-security.signature.username";
/// Password of the signing key
pub const SIGNATURE_PASSWORD: &str = "ws-security.signature.password";
/// Alias of the encryption recipient, or [`USE_REQ_SIG_CERT`]
pub const ENCRYPT_USERNAME: &str = "ws-security.encryption.username";
/// Name of a crypto instance registered on the exchange, for signing
pub const SIGNATURE_CRYPTO: &str = "ws-security.signature.crypto";
/// Name of a crypto instance registered on the exchange, for encryption
pub const ENCRYPT_CRYPTO: &str = "ws-security.encryption.crypto";
/// Inline crypto table name or properties resource path, for signing
pub const SIGNATURE_PROPERTIES: &str = "ws-security.signature.properties";
/// Inline crypto table name or properties resource path, for encryption
pub const ENCRYPT_PROPERTIES: &str = "ws-security.encryption.properties";
/// Timestamp time-to-live in seconds
pub const TIMESTAMP_TTL: &str = "ws-security.timestamp.ttl";

/// Sentinel encryption user: encrypt for the certificate that signed the request
pub const USE_REQ_SIG_CERT: &str = "useReqSigCert";

/// Default timestamp time-to-live in seconds.
pub const DEFAULT_TIMESTAMP_TTL_SECS: u64 = 300;

/// Flat crypto configuration properties.
pub type CryptoProperties = BTreeMap<String, String>;

/// Per-exchange configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecurityConfig {
    /// `ws-security.*` values
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// Inline crypto property tables, referenced by name from
    /// [`SIGNATURE_PROPERTIES`] / [`ENCRYPT_PROPERTIES`]
    #[serde(default)]
    pub crypto: BTreeMap<String, CryptoProperties>,
}

impl SecurityConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Builder-style registration of an inline crypto table.
    pub fn with_crypto(mut self, name: impl Into<String>, properties: CryptoProperties) -> Self {
        self.crypto.insert(name.into(), properties);
        self
    }

    /// Set a value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Remove a value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.properties.remove(key)
    }

    /// Raw lookup.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Lookup that treats the empty string as absent.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    /// Timestamp time-to-live, defaulting to [`DEFAULT_TIMESTAMP_TTL_SECS`].
    pub fn timestamp_ttl(&self) -> CoreResult<u64> {
        match self.get_non_empty(TIMESTAMP_TTL) {
            None => Ok(DEFAULT_TIMESTAMP_TTL_SECS),
            Some(raw) => raw.trim().parse().map_err(|_| {
                CoreError::Config(format!("{} must be a number of seconds, got '{}'", TIMESTAMP_TTL, raw))
            }),
        }
    }

    /// Resolve crypto properties named by `key`.
    ///
    /// The value is first looked up among the inline tables; otherwise it is
    /// treated as a path to a `key=value` properties resource. Returns
    /// `Ok(None)` when `key` is unset.
    pub fn crypto_properties(&self, key: &str) -> CoreResult<Option<CryptoProperties>> {
        let Some(reference) = self.get_non_empty(key) else {
            return Ok(None);
        };
        if let Some(inline) = self.crypto.get(reference) {
            return Ok(Some(inline.clone()));
        }
        let path = Path::new(reference);
        if !path.is_file() {
            return Err(CoreError::ResourceNotFound(reference.to_string()));
        }
        load_properties_file(path).map(Some)
    }

    /// Load configuration from a TOML file.
    #[cfg(feature = "toml")]
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    #[cfg(feature = "toml")]
    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Load a `key=value` properties resource.
pub fn load_properties_file(path: &Path) -> CoreResult<CryptoProperties> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_properties(&content))
}

/// Parse `key=value` (or `key: value`) lines; `#` and `!` start comments.
pub fn parse_properties(content: &str) -> CryptoProperties {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let split = line.find(&['=', ':'][..])?;
            let (key, value) = line.split_at(split);
            Some((key.trim().to_string(), value[1..].trim().to_string()))
        })
        .collect()
}
