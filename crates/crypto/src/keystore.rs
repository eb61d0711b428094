//! Certificates and key stores backing the software provider.

use crate::error::{ProviderError, ProviderResult};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use wsbind_core::Password;

/// Validity of generated certificates (one year).
const VALIDITY_SECS: i64 = 365 * 24 * 60 * 60;

/// X.509-like certificate binding a subject to an Ed25519 public key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Certificate {
    /// Certificate serial number
    pub serial: String,
    /// Subject (identity being certified)
    pub subject: String,
    /// Issuer (certificate authority)
    pub issuer: String,
    /// Subject's public key
    pub public_key: Vec<u8>,
    /// Not valid before (Unix seconds)
    pub not_before: i64,
    /// Not valid after (Unix seconds)
    pub not_after: i64,
}

impl Certificate {
    /// Self-issued certificate for `key`.
    pub fn self_issued(subject: &str, key: &VerifyingKey) -> Self {
        let public_key = key.to_bytes().to_vec();
        let now = chrono::Utc::now().timestamp();
        Self {
            serial: hex::encode(&blake3::hash(&public_key).as_bytes()[..8]),
            subject: subject.to_string(),
            issuer: subject.to_string(),
            public_key,
            not_before: now,
            not_after: now + VALIDITY_SECS,
        }
    }

    /// Wire encoding embedded in binary security tokens.
    pub fn encoded(&self) -> ProviderResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ProviderError::Crypto(e.to_string()))
    }

    /// BLAKE3 digest of the encoded certificate.
    pub fn thumbprint(&self) -> ProviderResult<[u8; 32]> {
        Ok(*blake3::hash(&self.encoded()?).as_bytes())
    }

    /// First 20 bytes of the BLAKE3 digest of the public key.
    pub fn subject_key_identifier(&self) -> Vec<u8> {
        blake3::hash(&self.public_key).as_bytes()[..20].to_vec()
    }
}

/// One alias in a key store.
#[derive(Clone)]
pub struct KeyEntry {
    pub certificate: Certificate,
    signing_key: Option<SigningKey>,
    password: Option<Password>,
}

impl fmt::Debug for KeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyEntry")
            .field("certificate", &self.certificate)
            .field("has_private_key", &self.signing_key.is_some())
            .finish()
    }
}

impl KeyEntry {
    pub fn has_private_key(&self) -> bool {
        self.signing_key.is_some()
    }
}

/// Named collection of certificates and private keys.
#[derive(Debug, Clone, Default)]
pub struct KeyStore {
    name: String,
    entries: BTreeMap<String, KeyEntry>,
}

impl KeyStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a fresh random key pair under `alias`, protected by `password`.
    pub fn generate(&mut self, alias: &str, subject: &str, password: Option<Password>) -> &Certificate {
        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        self.insert_key(alias, subject, SigningKey::from_bytes(&secret), password)
    }

    /// Add a key pair derived deterministically from `seed`.
    pub fn derive(
        &mut self,
        alias: &str,
        subject: &str,
        seed: &str,
        password: Option<Password>,
    ) -> &Certificate {
        let secret = blake3::derive_key("wsbind keystore 2024 alias key", format!("{}:{}", seed, alias).as_bytes());
        self.insert_key(alias, subject, SigningKey::from_bytes(&secret), password)
    }

    fn insert_key(
        &mut self,
        alias: &str,
        subject: &str,
        key: SigningKey,
        password: Option<Password>,
    ) -> &Certificate {
        let certificate = Certificate::self_issued(subject, &key.verifying_key());
        let entry = self.entries.entry(alias.to_string()).or_insert(KeyEntry {
            certificate: certificate.clone(),
            signing_key: None,
            password: None,
        });
        entry.certificate = certificate;
        entry.signing_key = Some(key);
        entry.password = password;
        &entry.certificate
    }

    /// Trust a certificate without a private key.
    pub fn insert_certificate(&mut self, alias: &str, certificate: Certificate) {
        self.entries.insert(
            alias.to_string(),
            KeyEntry {
                certificate,
                signing_key: None,
                password: None,
            },
        );
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn entry(&self, alias: &str) -> ProviderResult<&KeyEntry> {
        self.entries
            .get(alias)
            .ok_or_else(|| ProviderError::UnknownAlias(alias.to_string()))
    }

    pub fn certificate(&self, alias: &str) -> ProviderResult<&Certificate> {
        Ok(&self.entry(alias)?.certificate)
    }

    /// Private key of `alias`, unlocked with `password`.
    pub fn signing_key(&self, alias: &str, password: &Password) -> ProviderResult<&SigningKey> {
        let entry = self.entry(alias)?;
        let key = entry
            .signing_key
            .as_ref()
            .ok_or_else(|| ProviderError::NoPrivateKey(alias.to_string()))?;
        match &entry.password {
            Some(expected) if expected != password => Err(ProviderError::KeyAccess(alias.to_string())),
            _ => Ok(key),
        }
    }
}
