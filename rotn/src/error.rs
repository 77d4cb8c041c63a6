//! Error types for `rotn` operations.

use std::fmt;

/// Main error type for `rotn` operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown or missing key identifier, unknown encryptor name, or a
    /// malformed configuration.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Privileged key identifier presented with a missing or wrong secret.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Destination buffer is smaller than the sizing contract requires.
    #[error("insufficient capacity: {required} bytes required, {available} available")]
    InsufficientCapacity {
        /// Bytes the operation needs to write
        required: usize,
        /// Capacity of the destination buffer
        available: usize,
    },

    /// Resource exhaustion while constructing an instance
    #[error("allocation failed")]
    AllocationFailure,

    /// Record is too short or otherwise malformed
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// Integrity tag does not match the record body (data may be corrupted or tampered)
    #[error("integrity check failed: record may be corrupted or tampered")]
    IntegrityCheckFailed,

    /// Key store backend failed
    #[error("key store error: {0}")]
    KeyStore(KeyPolicyError),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of an [`Error`], as seen by the host engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad configuration or input; supply a valid one.
    InvalidArgument,
    /// Authentication failure; the host must not open the resource.
    PermissionDenied,
    /// Host-side sizing contract violation.
    InsufficientCapacity,
    /// Resource exhaustion.
    AllocationFailure,
    /// Stored record failed to parse or verify.
    Corrupted,
    /// Key store or filesystem failure.
    Io,
}

impl ErrorKind {
    /// Whether repeating the same call could succeed.
    ///
    /// Nothing in this crate retries; every error is reported to the caller
    /// as-is and none of them resolve by repeating the identical request.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        false
    }
}

impl Error {
    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::InsufficientCapacity { .. } => ErrorKind::InsufficientCapacity,
            Self::AllocationFailure => ErrorKind::AllocationFailure,
            Self::InvalidEnvelope(_) | Self::IntegrityCheckFailed => ErrorKind::Corrupted,
            Self::KeyStore(_) | Self::Io(_) => ErrorKind::Io,
        }
    }
}

/// Errors specific to key policy resolution.
#[derive(Debug)]
pub enum KeyPolicyError {
    /// No key identifier was supplied
    MissingKeyId,

    /// Key identifier is not known to the policy
    UnknownKeyId(String),

    /// Key requires a secret and none was supplied
    MissingSecret(String),

    /// Supplied secret does not match the one provisioned for the key
    SecretMismatch(String),

    /// Key store content could not be interpreted
    Malformed(String),

    /// I/O operation failed
    Io(std::io::Error),
}

impl fmt::Display for KeyPolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKeyId => write!(f, "no key identifier supplied"),
            Self::UnknownKeyId(id) => write!(f, "unknown key identifier: {id}"),
            Self::MissingSecret(id) => write!(f, "secret required for key: {id}"),
            Self::SecretMismatch(id) => write!(f, "secret mismatch for key: {id}"),
            Self::Malformed(msg) => write!(f, "malformed key entry: {msg}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for KeyPolicyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for KeyPolicyError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<KeyPolicyError> for Error {
    fn from(err: KeyPolicyError) -> Self {
        match err {
            KeyPolicyError::MissingKeyId | KeyPolicyError::UnknownKeyId(_) => {
                Self::InvalidArgument(err.to_string())
            }
            KeyPolicyError::MissingSecret(_) | KeyPolicyError::SecretMismatch(_) => {
                Self::PermissionDenied(err.to_string())
            }
            KeyPolicyError::Malformed(_) | KeyPolicyError::Io(_) => Self::KeyStore(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_errors_map_to_kinds() {
        let err = Error::from(KeyPolicyError::MissingKeyId);
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = Error::from(KeyPolicyError::UnknownKeyId("userbad".to_string()));
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("userbad"));

        let err = Error::from(KeyPolicyError::MissingSecret("system".to_string()));
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        let err = Error::from(KeyPolicyError::SecretMismatch("system".to_string()));
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = Error::from(KeyPolicyError::from(io));
        assert!(matches!(err, Error::KeyStore(KeyPolicyError::Io(_))));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_capacity_error_display() {
        let err = Error::InsufficientCapacity { required: 25, available: 24 };
        assert_eq!(
            err.to_string(),
            "insufficient capacity: 25 bytes required, 24 available"
        );
        assert!(!err.kind().is_retryable());
    }

    #[test]
    fn test_key_policy_error_source() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert!(KeyPolicyError::Io(io).source().is_some());
        assert!(KeyPolicyError::MissingKeyId.source().is_none());
    }
}
