//! File-based key policy for `rotn`.
//!
//! This policy reads key bindings from a directory and is suitable for
//! development and testing environments.

#![warn(clippy::pedantic, clippy::nursery)]

use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use rotn::error::KeyPolicyError;
use rotn::key_policy::{KeyBinding, KeyPolicy, SYSTEM_KEY_ID};
use rotn::transform::Rotation;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zeroize::{Zeroize, Zeroizing};

/// Extension of key files.
const KEY_FILE_EXTENSION: &str = "key";

/// Length of generated system passwords.
const PASSWORD_LEN: usize = 32;

/// Key set written by [`FileKeyPolicy::init`]: system, then user keys.
const DEFAULT_KEYS: [(&str, u8); 3] = [(SYSTEM_KEY_ID, 13), ("user1", 4), ("user2", 19)];

/// File-based key policy for development and testing.
///
/// Keys are stored one TOML file per key:
/// ```text
/// keys/
/// ├── system.key   rotation = 13, secret = "<password>"  (0600 permissions)
/// ├── user1.key    rotation = 4
/// └── user2.key    rotation = 19
/// ```
///
/// A key file holding a non-empty `secret` binds like the system key: the
/// caller must present that secret. A key file without one binds like a user
/// key.
pub struct FileKeyPolicy {
    key_dir: PathBuf,
}

/// On-disk content of one key file.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct KeyFile {
    rotation: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    secret: Option<String>,
}

impl Drop for KeyFile {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

/// Validated content of one key file.
struct KeyEntry {
    rotation: Rotation,
    secret: Option<SecretString>,
}

impl FileKeyPolicy {
    /// Creates a new `FileKeyPolicy`.
    ///
    /// # Arguments
    ///
    /// * `key_dir` - Directory containing key files
    ///
    /// # Errors
    ///
    /// Returns error if the directory doesn't exist.
    pub fn new(key_dir: impl Into<PathBuf>) -> Result<Self, KeyPolicyError> {
        let key_dir = key_dir.into();
        if !key_dir.is_dir() {
            return Err(KeyPolicyError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("key directory does not exist: {}", key_dir.display()),
            )));
        }
        Ok(Self { key_dir })
    }

    /// Initializes a key directory with the default key set and returns the
    /// generated system password.
    ///
    /// Either every default key is written or none is: existing key files are
    /// detected before anything is written, and files written before a later
    /// failure are removed again.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created or if any of the key
    /// files already exists.
    pub fn init(key_dir: impl AsRef<Path>) -> Result<SecretString, KeyPolicyError> {
        let key_dir = key_dir.as_ref();
        fs::create_dir_all(key_dir)?;
        let policy = Self::new(key_dir)?;

        let targets = DEFAULT_KEYS
            .iter()
            .map(|(key_id, _)| policy.key_path(key_id))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(existing) = targets.iter().find(|path| path.exists()) {
            return Err(KeyPolicyError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("key file already exists: {}", existing.display()),
            )));
        }

        let password = generate_password();
        let mut written = Vec::with_capacity(targets.len());
        for ((key_id, distance), path) in DEFAULT_KEYS.into_iter().zip(targets) {
            let secret = (key_id == SYSTEM_KEY_ID).then_some(&password);
            let result = Rotation::new(distance)
                .ok_or_else(|| KeyPolicyError::Malformed(format!("rotation {distance}")))
                .and_then(|rotation| policy.add_key(key_id, rotation, secret));
            if let Err(err) = result {
                remove_key_files(&written);
                return Err(err);
            }
            written.push(path);
        }

        info!(key_dir = %key_dir.display(), "key directory initialized");
        Ok(password)
    }

    /// Writes a new key file.
    ///
    /// An empty secret is not stored; the key then binds as a user key.
    ///
    /// # Errors
    ///
    /// Returns `KeyPolicyError::UnknownKeyId` if `key_id` contains characters
    /// other than ASCII alphanumerics, `_` and `-`, and an I/O error if the key
    /// already exists or cannot be written.
    pub fn add_key(
        &self,
        key_id: &str,
        rotation: Rotation,
        secret: Option<&SecretString>,
    ) -> Result<(), KeyPolicyError> {
        let path = self.key_path(key_id)?;

        let key_file = KeyFile {
            rotation: rotation.distance(),
            secret: secret
                .map(|s| s.expose_secret().to_string())
                .filter(|s| !s.is_empty()),
        };
        let content = Zeroizing::new(
            toml::to_string_pretty(&key_file)
                .map_err(|e| KeyPolicyError::Malformed(format!("{key_id}: {e}")))?,
        );

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&path)?;
        if let Err(err) = file.write_all(content.as_bytes()).and_then(|()| file.sync_all()) {
            remove_key_files(&[path]);
            return Err(err.into());
        }

        debug!(key_id, path = %path.display(), "key file written");
        Ok(())
    }

    /// Returns the directory keys are read from.
    #[must_use]
    pub fn key_dir(&self) -> &Path {
        &self.key_dir
    }

    fn key_path(&self, key_id: &str) -> Result<PathBuf, KeyPolicyError> {
        if key_id.is_empty() {
            return Err(KeyPolicyError::MissingKeyId);
        }
        if !key_id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-') {
            return Err(KeyPolicyError::UnknownKeyId(key_id.to_string()));
        }
        Ok(self.key_dir.join(format!("{key_id}.{KEY_FILE_EXTENSION}")))
    }

    fn load(&self, key_id: &str) -> Result<KeyEntry, KeyPolicyError> {
        let path = self.key_path(key_id)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => Zeroizing::new(content),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(KeyPolicyError::UnknownKeyId(key_id.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        parse_key_file(key_id, &content)
    }
}

impl KeyPolicy for FileKeyPolicy {
    fn resolve(
        &self,
        key_id: &str,
        secret: Option<&SecretString>,
    ) -> Result<KeyBinding, KeyPolicyError> {
        let entry = self.load(key_id)?;

        let Some(expected) = entry.secret else {
            return Ok(KeyBinding::User { rotation: entry.rotation });
        };
        let secret = secret.ok_or_else(|| KeyPolicyError::MissingSecret(key_id.to_string()))?;
        if secret.expose_secret() != expected.expose_secret() {
            return Err(KeyPolicyError::SecretMismatch(key_id.to_string()));
        }
        Ok(KeyBinding::System { rotation: entry.rotation })
    }
}

fn parse_key_file(key_id: &str, content: &str) -> Result<KeyEntry, KeyPolicyError> {
    let mut key_file: KeyFile =
        toml::from_str(content).map_err(|e| KeyPolicyError::Malformed(format!("{key_id}: {e}")))?;

    let rotation = Rotation::new(key_file.rotation)
        .ok_or_else(|| KeyPolicyError::Malformed(format!("{key_id}: rotation must be 0-25")))?;
    let secret = key_file.secret.take().filter(|s| !s.is_empty()).map(SecretString::new);
    Ok(KeyEntry { rotation, secret })
}

fn remove_key_files(paths: &[PathBuf]) {
    for path in paths {
        if let Err(err) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %err, "failed to remove key file");
        }
    }
}

fn generate_password() -> SecretString {
    let password: String =
        OsRng.sample_iter(&Alphanumeric).take(PASSWORD_LEN).map(char::from).collect();
    SecretString::new(password)
}
