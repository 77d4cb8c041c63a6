//! Named registration of encryptor factories.
//!
//! The host engine looks encryptors up by the `name` in an
//! `encryption=(name=...)` directive. Factories are registered once, before
//! any table is opened, and stay registered for the life of the registry.

use crate::config::EncryptionConfig;
use crate::encryptor::{Encryptor, EncryptorFactory, RotNEncryptor, ROTN_NAME};
use crate::error::Error;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Table of registered encryptor factories.
///
/// # Example
///
/// ```
/// use rotn::registry::EncryptorRegistry;
///
/// # fn main() -> Result<(), rotn::error::Error> {
/// let registry = EncryptorRegistry::with_rotn();
/// let log = registry
///     .open("log=(enabled=true),encryption=(name=rotn,keyid=system,secretkey=system_password)")?
///     .expect("encryption configured");
/// assert_eq!(log.sizing(), 20);
/// log.terminate();
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct EncryptorRegistry {
    factories: BTreeMap<String, Arc<dyn EncryptorFactory>>,
}

impl EncryptorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the rotation encryptor registered under
    /// [`ROTN_NAME`] using the built-in key table.
    #[must_use]
    pub fn with_rotn() -> Self {
        let mut registry = Self::new();
        registry.factories.insert(ROTN_NAME.to_string(), Arc::new(RotNEncryptor::with_default_policy()));
        registry
    }

    /// Registers `factory` under `name`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if `name` is empty or already taken.
    pub fn add_encryptor<F>(&mut self, name: impl Into<String>, factory: F) -> Result<(), Error>
    where
        F: EncryptorFactory + 'static,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::InvalidArgument("encryptor name must not be empty".to_string()));
        }
        if self.factories.contains_key(&name) {
            return Err(Error::InvalidArgument(format!("encryptor already registered: {name}")));
        }

        debug!(name = %name, "encryptor registered");
        self.factories.insert(name, Arc::new(factory));
        Ok(())
    }

    /// Returns `true` if an encryptor is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Returns the registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Customizes the encryptor named by `config`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if `config` names no encryptor or an
    /// unregistered one, and otherwise whatever the factory's `customize`
    /// returns.
    pub fn customize(&self, config: &EncryptionConfig) -> Result<Box<dyn Encryptor>, Error> {
        let name = config
            .name()
            .ok_or_else(|| Error::InvalidArgument("encryption requires a name".to_string()))?;
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown encryptor: {name}")))?;

        factory.customize(config)
    }

    /// Customizes the encryptor configured in an engine configuration string.
    ///
    /// Returns `Ok(None)` if the string has no `encryption=(...)` directive.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is malformed or the configuration is
    /// rejected; see [`customize`](Self::customize).
    pub fn open(&self, config: &str) -> Result<Option<Box<dyn Encryptor>>, Error> {
        EncryptionConfig::parse_directive(config)?
            .map(|config| self.customize(&config))
            .transpose()
    }
}

impl std::fmt::Debug for EncryptorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptorRegistry").field("names", &self.factories.keys()).finish()
    }
}
