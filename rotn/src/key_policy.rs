//! Key policy abstraction: maps a key identifier and secret to a binding.

use crate::error::KeyPolicyError;
use crate::transform::Rotation;
use secrecy::{ExposeSecret, SecretString};

/// Reserved identifier for the system key.
pub const SYSTEM_KEY_ID: &str = "system";

/// Outcome of a successful policy check: which kind of key matched and the
/// transform parameter derived for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyBinding {
    /// The reserved system key, authorized by its secret.
    System {
        /// Derived rotation
        rotation: Rotation,
    },
    /// A named user key. No secret is required.
    User {
        /// Derived rotation
        rotation: Rotation,
    },
}

impl KeyBinding {
    /// Returns the rotation derived for this binding.
    #[must_use]
    pub const fn rotation(self) -> Rotation {
        match self {
            Self::System { rotation } | Self::User { rotation } => rotation,
        }
    }

    /// Returns `true` for the system key.
    #[must_use]
    pub const fn is_system(self) -> bool {
        matches!(self, Self::System { .. })
    }
}

/// Resolves key identifiers to bindings.
///
/// Implementations must be thread-safe (`Send + Sync`): the host may
/// customize encryptors from several sessions at once.
///
/// # Example
///
/// ```rust,ignore
/// use rotn::key_policy::{KeyBinding, KeyPolicy};
///
/// struct VaultPolicy { /* client for an external secret store */ }
///
/// impl KeyPolicy for VaultPolicy {
///     fn resolve(&self, key_id: &str, secret: Option<&SecretString>)
///         -> Result<KeyBinding, KeyPolicyError> {
///         // Look the key up remotely, compare secrets, derive the parameter
///     }
/// }
/// ```
pub trait KeyPolicy: Send + Sync {
    /// Checks `key_id` and `secret` and returns the binding to use.
    ///
    /// # Errors
    ///
    /// Returns:
    /// - `KeyPolicyError::MissingKeyId` if `key_id` is empty
    /// - `KeyPolicyError::UnknownKeyId` if the policy does not know the key
    /// - `KeyPolicyError::MissingSecret` or `KeyPolicyError::SecretMismatch`
    ///   if the key requires a secret and the one supplied does not match
    fn resolve(
        &self,
        key_id: &str,
        secret: Option<&SecretString>,
    ) -> Result<KeyBinding, KeyPolicyError>;
}

/// Fixed in-process key table: the system key plus two user keys.
///
/// | key id   | secret                    | rotation |
/// |----------|---------------------------|----------|
/// | `system` | provisioned password      | 13       |
/// | `user1`  | ignored                   | 4        |
/// | `user2`  | ignored                   | 19       |
pub struct StaticKeyPolicy {
    system_password: SecretString,
}

impl StaticKeyPolicy {
    /// Password the default policy expects for the system key.
    pub const DEFAULT_SYSTEM_PASSWORD: &'static str = "system_password";

    const SYSTEM_ROTATION: Rotation = rotation(13);
    const USER_KEYS: [(&'static str, Rotation); 2] = [("user1", rotation(4)), ("user2", rotation(19))];

    /// Creates a policy with a custom system password.
    #[must_use]
    pub const fn new(system_password: SecretString) -> Self {
        Self { system_password }
    }
}

impl Default for StaticKeyPolicy {
    fn default() -> Self {
        Self::new(SecretString::new(Self::DEFAULT_SYSTEM_PASSWORD.to_string()))
    }
}

impl KeyPolicy for StaticKeyPolicy {
    fn resolve(
        &self,
        key_id: &str,
        secret: Option<&SecretString>,
    ) -> Result<KeyBinding, KeyPolicyError> {
        if key_id.is_empty() {
            return Err(KeyPolicyError::MissingKeyId);
        }

        if key_id == SYSTEM_KEY_ID {
            let secret =
                secret.ok_or_else(|| KeyPolicyError::MissingSecret(key_id.to_string()))?;
            if secret.expose_secret() != self.system_password.expose_secret() {
                return Err(KeyPolicyError::SecretMismatch(key_id.to_string()));
            }
            return Ok(KeyBinding::System { rotation: Self::SYSTEM_ROTATION });
        }

        Self::USER_KEYS
            .iter()
            .find(|(id, _)| *id == key_id)
            .map(|&(_, rotation)| KeyBinding::User { rotation })
            .ok_or_else(|| KeyPolicyError::UnknownKeyId(key_id.to_string()))
    }
}

const fn rotation(distance: u8) -> Rotation {
    match Rotation::new(distance) {
        Some(rotation) => rotation,
        None => panic!("rotation out of range"),
    }
}
