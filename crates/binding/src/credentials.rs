//! Credential resolution: usernames, passwords, key material and the
//! encryption recipient.
//!
//! Configuration is consulted first and the exchange's callback second. The
//! resolver only reports failures; attributing them to an assertion is the
//! caller's job.

use crate::error::CredentialError;
use crate::exchange::{Exchange, SecurityResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use wsbind_core::config::{self, USE_REQ_SIG_CERT};
use wsbind_core::Password;
use wsbind_crypto::{Certificate, KeyStore};

/// What a credential is needed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialPurpose {
    UsernameToken,
    Signature,
    Encryption,
}

impl fmt::Display for CredentialPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CredentialPurpose::UsernameToken => "username token",
            CredentialPurpose::Signature => "signature",
            CredentialPurpose::Encryption => "encryption",
        })
    }
}

/// Question put to a [`CredentialCallback`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRequest {
    pub identity: String,
    pub purpose: CredentialPurpose,
}

/// Supplies secrets the configuration does not hold.
pub trait CredentialCallback: Send + Sync {
    /// `Ok(None)` when the callback has nothing for this request.
    fn resolve(&self, request: &CredentialRequest) -> anyhow::Result<Option<Password>>;
}

impl<F> CredentialCallback for F
where
    F: Fn(&CredentialRequest) -> anyhow::Result<Option<Password>> + Send + Sync,
{
    fn resolve(&self, request: &CredentialRequest) -> anyhow::Result<Option<Password>> {
        self(request)
    }
}

/// Who to encrypt for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptionUser {
    /// Alias in the encryption key store
    Alias(String),
    /// The certificate that signed the inbound request
    RequestCertificate {
        certificate: Certificate,
        username: Option<String>,
    },
}

/// Borrowed view of an [`Exchange`] answering credential questions.
#[derive(Clone, Copy)]
pub struct CredentialResolver<'a> {
    exchange: &'a Exchange,
}

impl<'a> CredentialResolver<'a> {
    pub fn new(exchange: &'a Exchange) -> Self {
        Self { exchange }
    }

    /// Configured username for `purpose`; empty values count as absent.
    pub fn resolve_username(&self, purpose: CredentialPurpose) -> Option<String> {
        let settings = self.exchange.config();
        let value = match purpose {
            CredentialPurpose::UsernameToken => settings.get_non_empty(config::USERNAME),
            CredentialPurpose::Signature => settings
                .get_non_empty(config::SIGNATURE_USERNAME)
                .or_else(|| settings.get_non_empty(config::USERNAME)),
            CredentialPurpose::Encryption => settings.get_non_empty(config::ENCRYPT_USERNAME),
        };
        value.map(str::to_string)
    }

    /// Password for `username`: configuration first, then the callback.
    pub fn resolve_password(
        &self,
        username: &str,
        purpose: CredentialPurpose,
    ) -> Result<Password, CredentialError> {
        let key = match purpose {
            CredentialPurpose::UsernameToken => Some(config::PASSWORD),
            CredentialPurpose::Signature => Some(config::SIGNATURE_PASSWORD),
            CredentialPurpose::Encryption => None,
        };
        if let Some(value) = key.and_then(|k| self.exchange.config().get_non_empty(k)) {
            return Ok(Password::new(value));
        }

        let unavailable = || CredentialError::NoCredentialAvailable {
            identity: username.to_string(),
            purpose,
        };
        let callback = self.exchange.callback().ok_or_else(unavailable)?;
        let request = CredentialRequest {
            identity: username.to_string(),
            purpose,
        };
        debug!(identity = %username, purpose = %purpose, "Asking credential callback");
        match callback.resolve(&request) {
            Ok(Some(password)) if !password.is_empty() => Ok(password),
            Ok(_) => Err(unavailable()),
            Err(e) => Err(CredentialError::Callback(format!("{:#}", e))),
        }
    }

    /// Key store for signing or encryption.
    ///
    /// A crypto instance registered on the exchange wins; otherwise the
    /// `*.properties` reference is resolved and handed to the material source.
    pub fn resolve_crypto(&self, purpose: CredentialPurpose) -> Result<Arc<KeyStore>, CredentialError> {
        let (crypto_key, properties_key) = match purpose {
            CredentialPurpose::Encryption => (config::ENCRYPT_CRYPTO, config::ENCRYPT_PROPERTIES),
            _ => (config::SIGNATURE_CRYPTO, config::SIGNATURE_PROPERTIES),
        };
        let settings = self.exchange.config();
        if let Some(name) = settings.get_non_empty(crypto_key) {
            return self.exchange.crypto(name).ok_or_else(|| {
                CredentialError::CryptoMaterial(format!("No crypto instance registered as '{}'", name))
            });
        }

        let properties = match settings.crypto_properties(properties_key) {
            Ok(Some(properties)) => properties,
            Ok(None) => {
                return Err(CredentialError::CryptoMaterial(format!(
                    "No {} crypto configured",
                    purpose
                )))
            }
            Err(e) => return Err(CredentialError::CryptoMaterial(e.to_string())),
        };
        let source = self.exchange.material_source().ok_or_else(|| {
            CredentialError::CryptoMaterial("No crypto material source configured".to_string())
        })?;
        source
            .load(&properties)
            .map_err(|e| CredentialError::CryptoMaterial(e.to_string()))
    }

    /// Recipient of encrypted keys.
    ///
    /// An absent or empty encryption username is a failure; no default
    /// identity is assumed.
    pub fn resolve_encryption_user(&self) -> Result<EncryptionUser, CredentialError> {
        let user = self.resolve_username(CredentialPurpose::Encryption).ok_or_else(|| {
            CredentialError::NoCredentialAvailable {
                identity: String::new(),
                purpose: CredentialPurpose::Encryption,
            }
        })?;
        if user != USE_REQ_SIG_CERT {
            return Ok(EncryptionUser::Alias(user));
        }

        let results = self
            .exchange
            .inbound_results()
            .ok_or(CredentialError::NoSecurityResultsAvailable)?;
        let certificate = results
            .iter()
            .find_map(|result| match result {
                SecurityResult::Signature { certificate, .. } => Some(certificate.clone()),
                SecurityResult::UsernameToken { .. } => None,
            })
            .flatten()
            .ok_or(CredentialError::NoSecurityResultsAvailable)?;
        let username = results.iter().find_map(|result| match result {
            SecurityResult::UsernameToken { username } => Some(username.clone()),
            SecurityResult::Signature { .. } => None,
        });
        Ok(EncryptionUser::RequestCertificate {
            certificate,
            username,
        })
    }
}
