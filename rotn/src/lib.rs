//! # `rotn`
//!
//! Keyed record-transform interface for storage engine encryption.
//!
//! A storage engine registers one encryptor factory and asks it for a bound
//! instance per encryption configuration (one per table, one for the log).
//! Each instance encrypts records into a fixed envelope and reports how many
//! bytes that envelope adds so the engine can size its buffers.
//!
//! ## Features
//!
//! - Key policy seam ([`key_policy::KeyPolicy`]) for mapping key identifiers
//!   and secrets to transform parameters
//! - Typed record envelope with a per-record IV and integrity tag
//! - Caller-buffer encrypt/decrypt with a sizing contract
//! - Registry resolving `encryption=(name=...,keyid=...,secretkey=...)`
//!   directives
//!
//! The bundled rotation transform is a demonstration cipher. It hides nothing.
//!
//! ## Example
//!
//! ```rust
//! use rotn::prelude::*;
//!
//! # fn main() -> Result<(), Error> {
//! let registry = EncryptorRegistry::with_rotn();
//! let table = registry
//!     .open("encryption=(name=rotn,keyid=user1),key_format=S,value_format=S")?
//!     .expect("table is encrypted");
//!
//! let value = b"value0";
//! let mut record = vec![0u8; value.len() + table.sizing()];
//! let written = table.encrypt(Some(value.as_slice()), &mut record)?;
//!
//! let mut plaintext = vec![0u8; value.len()];
//! table.decrypt(Some(&record[..written]), &mut plaintext)?;
//! assert_eq!(&plaintext, value);
//!
//! table.terminate();
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod encryptor;
pub mod envelope;
pub mod error;
pub mod key_policy;
pub mod registry;
pub mod transform;

pub use encryptor::ROTN_NAME;

pub mod prelude {
    //! Convenience re-exports for common use.
    pub use crate::config::EncryptionConfig;
    pub use crate::encryptor::{Encryptor, EncryptorFactory, KeyedEncryptor, RotNEncryptor};
    pub use crate::error::{Error, ErrorKind, KeyPolicyError};
    pub use crate::key_policy::{KeyBinding, KeyPolicy, StaticKeyPolicy};
    pub use crate::registry::EncryptorRegistry;
    pub use crate::transform::{RecordTransform, Rotation};
    pub use secrecy::{ExposeSecret, SecretString};
}
