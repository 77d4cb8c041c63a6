//! Encryption configuration handed to an encryptor when it is customized.
//!
//! The host engine configures encryption per table (and once for its log)
//! with a directive of the form
//!
//! ```text
//! encryption=(name=rotn,keyid=system,secretkey=system_password)
//! ```
//!
//! embedded in a larger configuration string. Only `name`, `keyid` and
//! `secretkey` are read; other keys are ignored.

use crate::error::Error;
use secrecy::SecretString;

/// Configuration key naming the registered encryptor.
pub const NAME_KEY: &str = "name";

/// Configuration key carrying the key identifier.
pub const KEYID_KEY: &str = "keyid";

/// Configuration key carrying the secret.
pub const SECRETKEY_KEY: &str = "secretkey";

/// Top-level configuration item holding the encryption settings.
pub const ENCRYPTION_KEY: &str = "encryption";

/// Encryption settings for one table or log.
///
/// Empty values are treated as absent.
///
/// # Example
///
/// ```
/// use rotn::config::EncryptionConfig;
///
/// let config = EncryptionConfig::new()
///     .with_name("rotn")
///     .with_keyid("user1");
/// assert_eq!(config.keyid(), Some("user1"));
/// assert!(config.secretkey().is_none());
/// ```
#[derive(Debug, Default)]
pub struct EncryptionConfig {
    name: Option<String>,
    keyid: Option<String>,
    secretkey: Option<SecretString>,
}

impl EncryptionConfig {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the registered encryptor name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = non_empty(name.into());
        self
    }

    /// Sets the key identifier.
    #[must_use]
    pub fn with_keyid(mut self, keyid: impl Into<String>) -> Self {
        self.keyid = non_empty(keyid.into());
        self
    }

    /// Sets the secret.
    #[must_use]
    pub fn with_secretkey(mut self, secretkey: impl Into<String>) -> Self {
        self.secretkey = non_empty(secretkey.into()).map(SecretString::new);
        self
    }

    /// Builds a configuration from key/value pairs.
    ///
    /// Unknown keys are ignored; a later value for the same key wins.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        pairs.into_iter().fold(Self::new(), |config, (key, value)| match key.as_ref() {
            NAME_KEY => config.with_name(value),
            KEYID_KEY => config.with_keyid(value),
            SECRETKEY_KEY => config.with_secretkey(value),
            _ => config,
        })
    }

    /// Extracts the `encryption=(...)` directive from an engine configuration
    /// string.
    ///
    /// Returns `Ok(None)` if the string has no encryption directive.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if the string is malformed (unbalanced
    /// brackets or quotes) or if the directive's value is not parenthesized.
    ///
    /// # Example
    ///
    /// ```
    /// use rotn::config::EncryptionConfig;
    ///
    /// let config = EncryptionConfig::parse_directive(
    ///     "create,log=(enabled=true),encryption=(name=rotn,keyid=user2)",
    /// )
    /// .unwrap()
    /// .unwrap();
    /// assert_eq!(config.name(), Some("rotn"));
    /// assert_eq!(config.keyid(), Some("user2"));
    /// ```
    pub fn parse_directive(config: &str) -> Result<Option<Self>, Error> {
        let Some((_, value)) =
            parse_items(config)?.into_iter().rev().find(|(key, _)| *key == ENCRYPTION_KEY)
        else {
            return Ok(None);
        };

        let inner = value
            .strip_prefix('(')
            .and_then(|v| v.strip_suffix(')'))
            .ok_or_else(|| {
                Error::InvalidArgument(format!("{ENCRYPTION_KEY} must be a group: {value}"))
            })?;

        let pairs = parse_items(inner)?;
        Ok(Some(Self::from_pairs(pairs.into_iter().map(|(k, v)| (k, unquote(v))))))
    }

    /// Returns the encryptor name, if set.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the key identifier, if set.
    #[must_use]
    pub fn keyid(&self) -> Option<&str> {
        self.keyid.as_deref()
    }

    /// Returns the secret, if set.
    #[must_use]
    pub const fn secretkey(&self) -> Option<&SecretString> {
        self.secretkey.as_ref()
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Splits a configuration string into `(key, value)` items at top-level
/// commas. A bare key gets an empty value.
fn parse_items(config: &str) -> Result<Vec<(&str, &str)>, Error> {
    let mut items = Vec::new();
    let mut stack = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (pos, c) in config.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            _ if in_quotes => {}
            '(' | '[' => stack.push(c),
            ')' | ']' => {
                let open = if c == ')' { '(' } else { '[' };
                if stack.pop() != Some(open) {
                    return Err(Error::InvalidArgument(format!(
                        "unbalanced '{c}' at offset {pos} in configuration"
                    )));
                }
            }
            ',' if stack.is_empty() => {
                push_item(&mut items, &config[start..pos]);
                start = pos + 1;
            }
            _ => {}
        }
    }

    if in_quotes {
        return Err(Error::InvalidArgument("unterminated quote in configuration".to_string()));
    }
    if let Some(open) = stack.last() {
        return Err(Error::InvalidArgument(format!("unclosed '{open}' in configuration")));
    }
    push_item(&mut items, &config[start..]);

    Ok(items)
}

fn push_item<'a>(items: &mut Vec<(&'a str, &'a str)>, item: &'a str) {
    let item = item.trim();
    if item.is_empty() {
        return;
    }
    match item.split_once('=') {
        Some((key, value)) => items.push((key.trim(), value.trim())),
        None => items.push((item, "")),
    }
}
