//! Encryptor factory and the keyed instances it produces.
//!
//! The host engine registers one [`RotNEncryptor`] and customizes it once per
//! encryption configuration (each encrypted table, and the log). Each call to
//! [`RotNEncryptor::customize`] validates the key identifier and secret
//! against the key policy and returns a [`KeyedEncryptor`] bound to the
//! derived rotation. Encrypt, decrypt and sizing calls then go to that
//! instance until the host tears it down with [`KeyedEncryptor::terminate`].
//!
//! The factory itself has no teardown: it lives as long as the registration.

use crate::config::EncryptionConfig;
use crate::envelope;
use crate::error::{Error, KeyPolicyError};
use crate::key_policy::{KeyBinding, KeyPolicy, StaticKeyPolicy};
use crate::transform::Rotation;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Name under which the rotation encryptor is registered.
pub const ROTN_NAME: &str = "rotn";

/// Operations the host engine performs on a customized encryptor.
///
/// Implementations must be thread-safe (`Send + Sync`): concurrent sessions
/// share one instance per table.
pub trait Encryptor: Send + Sync {
    /// Returns the number of bytes encryption adds beyond the plaintext
    /// length.
    fn sizing(&self) -> usize;

    /// Encrypts `src` into `dst` and returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns `Error::InsufficientCapacity` if `dst` is smaller than
    /// `src.len() + sizing()`.
    fn encrypt(&self, src: Option<&[u8]>, dst: &mut [u8]) -> Result<usize, Error>;

    /// Decrypts `src` into `dst` and returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error if `src` is not a valid record or `dst` is too small.
    fn decrypt(&self, src: Option<&[u8]>, dst: &mut [u8]) -> Result<usize, Error>;

    /// Releases the instance and returns its final call count.
    fn terminate(self: Box<Self>) -> u64;
}

/// Creates customized encryptors from configuration.
pub trait EncryptorFactory: Send + Sync {
    /// Validates `config` and returns a bound encryptor.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` or `Error::PermissionDenied` if the
    /// configuration is rejected. No instance is produced on error.
    fn customize(&self, config: &EncryptionConfig) -> Result<Box<dyn Encryptor>, Error>;
}

/// Factory template for rotation encryptors.
///
/// # Example
///
/// ```
/// use rotn::config::EncryptionConfig;
/// use rotn::encryptor::RotNEncryptor;
///
/// # fn main() -> Result<(), rotn::error::Error> {
/// let factory = RotNEncryptor::with_default_policy();
/// let table = factory.customize(&EncryptionConfig::new().with_keyid("user1"))?;
///
/// let mut record = vec![0u8; 6 + table.sizing()];
/// let written = table.encrypt(Some(b"value0".as_slice()), &mut record)?;
///
/// let mut plaintext = vec![0u8; written - table.sizing()];
/// table.decrypt(Some(&record[..written]), &mut plaintext)?;
/// assert_eq!(plaintext, b"value0");
///
/// table.terminate();
/// # Ok(())
/// # }
/// ```
pub struct RotNEncryptor<P: KeyPolicy> {
    policy: Arc<P>,
    default_rotation: Rotation,
    calls: AtomicU64,
}

impl<P: KeyPolicy> RotNEncryptor<P> {
    /// Creates a factory resolving keys through `policy`.
    pub fn new(policy: P) -> Self {
        Self { policy: Arc::new(policy), default_rotation: Rotation::IDENTITY, calls: AtomicU64::new(0) }
    }

    /// Returns the rotation of the uncustomized template.
    #[must_use]
    pub const fn default_rotation(&self) -> Rotation {
        self.default_rotation
    }

    /// Returns the number of operations the template itself has served.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Returns the envelope expansion, counting the call against the template.
    pub fn sizing(&self) -> usize {
        self.calls.fetch_add(1, Ordering::Relaxed);
        envelope::sizing()
    }

    /// Binds the key named in `config` and returns a new instance.
    ///
    /// The instance's call counter starts at the template's counter plus one
    /// for this call.
    ///
    /// # Errors
    ///
    /// Returns:
    /// - `Error::InvalidArgument` if `keyid` is missing or unknown
    /// - `Error::PermissionDenied` if the key requires a secret and the one
    ///   supplied is missing or wrong
    /// - `Error::AllocationFailure` if the key material cannot be copied
    pub fn customize(&self, config: &EncryptionConfig) -> Result<KeyedEncryptor, Error> {
        let Some(key_id) = config.keyid() else {
            warn!("encryptor customize rejected: no key identifier");
            return Err(KeyPolicyError::MissingKeyId.into());
        };

        let key_id = try_copy(key_id)?;
        let secret = config
            .secretkey()
            .map(|s| try_copy(s.expose_secret()).map(SecretString::new))
            .transpose()?;

        // On rejection `key_id` and `secret` drop before the error is returned.
        let binding = match self.policy.resolve(&key_id, secret.as_ref()) {
            Ok(binding) => binding,
            Err(err) => {
                warn!(key_id = %key_id, error = %err, "encryptor customize rejected");
                return Err(err.into());
            }
        };

        let calls = self.calls.load(Ordering::Relaxed) + 1;
        debug!(
            key_id = %key_id,
            rotation = binding.rotation().distance(),
            system = binding.is_system(),
            "encryptor customized"
        );

        Ok(KeyedEncryptor { key_id, secret, binding, calls: AtomicU64::new(calls) })
    }
}

impl RotNEncryptor<StaticKeyPolicy> {
    /// Creates a factory with the built-in key table.
    #[must_use]
    pub fn with_default_policy() -> Self {
        Self::new(StaticKeyPolicy::default())
    }
}

impl<P: KeyPolicy> EncryptorFactory for RotNEncryptor<P> {
    fn customize(&self, config: &EncryptionConfig) -> Result<Box<dyn Encryptor>, Error> {
        Ok(Box::new(Self::customize(self, config)?))
    }
}

impl<P: KeyPolicy> fmt::Debug for RotNEncryptor<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotNEncryptor")
            .field("default_rotation", &self.default_rotation)
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

/// An encryptor bound to one key.
///
/// Owns its key identifier and secret until [`terminate`](Self::terminate).
/// The secret is zeroized when released.
pub struct KeyedEncryptor {
    key_id: String,
    secret: Option<SecretString>,
    binding: KeyBinding,
    calls: AtomicU64,
}

impl KeyedEncryptor {
    /// Returns the bound key identifier.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Returns `true` if a secret was supplied at customize time.
    #[must_use]
    pub const fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    /// Returns the policy binding this instance was created with.
    #[must_use]
    pub const fn binding(&self) -> KeyBinding {
        self.binding
    }

    /// Returns the derived rotation.
    #[must_use]
    pub const fn rotation(&self) -> Rotation {
        self.binding.rotation()
    }

    /// Returns the number of operations served so far.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Returns the envelope expansion.
    pub fn sizing(&self) -> usize {
        self.record_call();
        envelope::sizing()
    }

    /// Encrypts `src` into `dst` and returns the number of bytes written.
    ///
    /// `None` or an empty source writes nothing and returns `Ok(0)`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InsufficientCapacity` if `dst` is smaller than
    /// `src.len() + sizing()`. Nothing is written in that case.
    pub fn encrypt(&self, src: Option<&[u8]>, dst: &mut [u8]) -> Result<usize, Error> {
        self.record_call();
        envelope::wrap_into(src, &self.rotation(), dst)
    }

    /// Decrypts `src` into `dst` and returns the number of bytes written.
    ///
    /// `None` or an empty source writes nothing and returns `Ok(0)`.
    ///
    /// # Errors
    ///
    /// Returns:
    /// - `Error::InvalidEnvelope` if `src` is shorter than the envelope header
    /// - `Error::InsufficientCapacity` if `dst` is smaller than
    ///   `src.len() - sizing()`
    /// - `Error::IntegrityCheckFailed` if the record has been altered
    pub fn decrypt(&self, src: Option<&[u8]>, dst: &mut [u8]) -> Result<usize, Error> {
        self.record_call();
        envelope::unwrap_into(src, &self.rotation(), dst)
    }

    /// Tears the instance down and returns its final call count.
    ///
    /// Consumes the instance, so it runs exactly once. The key identifier and
    /// secret are released here; the factory that produced the instance is not
    /// affected.
    pub fn terminate(self) -> u64 {
        let calls = self.record_call();
        debug!(key_id = %self.key_id, calls, "encryptor terminated");
        calls
    }

    fn record_call(&self) -> u64 {
        self.calls.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Encryptor for KeyedEncryptor {
    fn sizing(&self) -> usize {
        Self::sizing(self)
    }

    fn encrypt(&self, src: Option<&[u8]>, dst: &mut [u8]) -> Result<usize, Error> {
        Self::encrypt(self, src, dst)
    }

    fn decrypt(&self, src: Option<&[u8]>, dst: &mut [u8]) -> Result<usize, Error> {
        Self::decrypt(self, src, dst)
    }

    fn terminate(self: Box<Self>) -> u64 {
        Self::terminate(*self)
    }
}

impl fmt::Debug for KeyedEncryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedEncryptor")
            .field("key_id", &self.key_id)
            .field("has_secret", &self.has_secret())
            .field("binding", &self.binding)
            .field("calls", &self.calls())
            .finish()
    }
}

/// Copies `s` into a freshly allocated string, reporting allocation failure
/// instead of aborting.
fn try_copy(s: &str) -> Result<String, Error> {
    let mut owned = String::new();
    owned.try_reserve_exact(s.len()).map_err(|_| Error::AllocationFailure)?;
    owned.push_str(s);
    Ok(owned)
}
