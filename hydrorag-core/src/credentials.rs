//! API secret storage
//!
//! Secrets resolve from the environment first, then from a credential
//! store:
//! - KeyringStore: the system keychain (macOS Keychain, Windows Credential Manager, etc.)
//! - MemoryStore: in-memory storage for tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Keyring service name for every hydrorag secret
pub const KEYRING_SERVICE: &str = "hydrorag";

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Credential not found")]
    NotFound,
    #[error("Keyring error: {0}")]
    Keyring(String),
}

/// Secrets hydrorag knows how to look up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Secret {
    OpenAiApiKey,
    ErpPassword,
}

impl Secret {
    pub const ALL: [Secret; 2] = [Secret::OpenAiApiKey, Secret::ErpPassword];

    /// Keyring user name
    pub fn key(self) -> &'static str {
        match self {
            Secret::OpenAiApiKey => "openai-api-key",
            Secret::ErpPassword => "erp-password",
        }
    }

    /// Environment variable that overrides the stored value
    pub fn env_var(self) -> &'static str {
        match self {
            Secret::OpenAiApiKey => "OPENAI_API_KEY",
            Secret::ErpPassword => "ERP_PASSWORD",
        }
    }

    /// Service name used on the command line
    pub fn service(self) -> &'static str {
        match self {
            Secret::OpenAiApiKey => "openai",
            Secret::ErpPassword => "erp",
        }
    }

    /// Parse a CLI service name ("openai", "erp")
    pub fn from_service(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|secret| secret.service().eq_ignore_ascii_case(name))
    }
}

/// Trait for credential storage backends
pub trait CredentialStore: Send + Sync {
    fn get(&self, service: &str, user: &str) -> Result<String, CredentialError>;

    fn set(&self, service: &str, user: &str, password: &str) -> Result<(), CredentialError>;

    fn delete(&self, service: &str, user: &str) -> Result<(), CredentialError>;

    /// Stored value of `secret`
    fn secret(&self, secret: Secret) -> Result<String, CredentialError> {
        self.get(KEYRING_SERVICE, secret.key())
    }

    fn store_secret(&self, secret: Secret, value: &str) -> Result<(), CredentialError> {
        self.set(KEYRING_SERVICE, secret.key(), value)
    }
}

/// Value of `secret` from `env` (non-empty) or else from `store`
pub fn resolve_secret(
    secret: Secret,
    env: &HashMap<String, String>,
    store: &dyn CredentialStore,
) -> Option<String> {
    env.get(secret.env_var())
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .or_else(|| store.secret(secret).ok())
}

/// Keyring-backed credential store
pub struct KeyringStore;

impl KeyringStore {
    pub fn new() -> Self {
        Self
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringStore {
    fn get(&self, service: &str, user: &str) -> Result<String, CredentialError> {
        let entry = keyring::Entry::new(service, user)
            .map_err(|e| CredentialError::Keyring(e.to_string()))?;
        entry.get_password().map_err(|e| match e {
            keyring::Error::NoEntry => CredentialError::NotFound,
            _ => CredentialError::Keyring(e.to_string()),
        })
    }

    fn set(&self, service: &str, user: &str, password: &str) -> Result<(), CredentialError> {
        let entry = keyring::Entry::new(service, user)
            .map_err(|e| CredentialError::Keyring(e.to_string()))?;
        entry
            .set_password(password)
            .map_err(|e| CredentialError::Keyring(e.to_string()))
    }

    fn delete(&self, service: &str, user: &str) -> Result<(), CredentialError> {
        let entry = keyring::Entry::new(service, user)
            .map_err(|e| CredentialError::Keyring(e.to_string()))?;
        entry.delete_credential().map_err(|e| match e {
            keyring::Error::NoEntry => CredentialError::NotFound,
            _ => CredentialError::Keyring(e.to_string()),
        })
    }
}

/// In-memory credential store
#[derive(Clone, Default)]
pub struct MemoryStore {
    store: Arc<Mutex<HashMap<(String, String), String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given secrets
    pub fn with_secrets(secrets: &[(Secret, &str)]) -> Self {
        let map = secrets
            .iter()
            .map(|(secret, value)| {
                (
                    (KEYRING_SERVICE.to_string(), secret.key().to_string()),
                    value.to_string(),
                )
            })
            .collect();
        Self {
            store: Arc::new(Mutex::new(map)),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), String>> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CredentialStore for MemoryStore {
    fn get(&self, service: &str, user: &str) -> Result<String, CredentialError> {
        self.entries()
            .get(&(service.to_string(), user.to_string()))
            .cloned()
            .ok_or(CredentialError::NotFound)
    }

    fn set(&self, service: &str, user: &str, password: &str) -> Result<(), CredentialError> {
        self.entries().insert(
            (service.to_string(), user.to_string()),
            password.to_string(),
        );
        Ok(())
    }

    fn delete(&self, service: &str, user: &str) -> Result<(), CredentialError> {
        self.entries()
            .remove(&(service.to_string(), user.to_string()))
            .map(|_| ())
            .ok_or(CredentialError::NotFound)
    }
}

/// Get the default credential store (keyring for production)
pub fn default_store() -> Arc<dyn CredentialStore> {
    Arc::new(KeyringStore::new())
}
