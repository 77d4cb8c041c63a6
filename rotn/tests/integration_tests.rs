//! Integration tests for rotn driven the way a storage engine uses it.

use rotn::envelope;
use rotn::prelude::*;
use std::collections::BTreeMap;
use std::thread;

const SYSTEM_CONNECTION: &str = "create,cache_size=100MB,\
    extensions=[local=(entry=add_my_encryptors)],\
    log=(enabled=true),encryption=(name=rotn,keyid=system,secretkey=system_password)";

/// Minimal stand-in for an encrypted table: stores records as the engine
/// would write them to disk.
struct Table {
    encryptor: Option<Box<dyn Encryptor>>,
    rows: BTreeMap<String, Vec<u8>>,
}

impl Table {
    fn create(registry: &EncryptorRegistry, config: &str) -> Result<Self, Error> {
        Ok(Self { encryptor: registry.open(config)?, rows: BTreeMap::new() })
    }

    fn insert(&mut self, key: &str, value: &str) {
        let record = match &self.encryptor {
            Some(encryptor) => {
                let mut dst = vec![0u8; value.len() + encryptor.sizing()];
                let written = encryptor.encrypt(Some(value.as_bytes()), &mut dst).unwrap();
                dst.truncate(written);
                dst
            }
            None => value.as_bytes().to_vec(),
        };
        self.rows.insert(key.to_string(), record);
    }

    fn read(&self, key: &str) -> String {
        let record = &self.rows[key];
        let bytes = match &self.encryptor {
            Some(encryptor) => {
                let mut dst = vec![0u8; record.len().saturating_sub(encryptor.sizing())];
                let read = encryptor.decrypt(Some(record.as_slice()), &mut dst).unwrap();
                dst.truncate(read);
                dst
            }
            None => record.clone(),
        };
        String::from_utf8(bytes).unwrap()
    }

    fn close(self) {
        if let Some(encryptor) = self.encryptor {
            encryptor.terminate();
        }
    }
}

#[test]
fn test_tables_with_different_keys_agree_after_decryption() {
    let registry = EncryptorRegistry::with_rotn();
    let log = registry.open(SYSTEM_CONNECTION).expect("system key").expect("log encryption");

    let mut crypto1 = Table::create(
        &registry,
        "encryption=(name=rotn,keyid=user1),columns=(key0,value0),key_format=S,value_format=S",
    )
    .unwrap();
    let mut crypto2 =
        Table::create(&registry, "encryption=(name=rotn,keyid=user2),key_format=S,value_format=S")
            .unwrap();
    let mut nocrypto = Table::create(&registry, "key_format=S,value_format=S").unwrap();
    assert!(nocrypto.encryptor.is_none());

    let bad = Table::create(
        &registry,
        "encryption=(name=rotn,keyid=userbad),key_format=S,value_format=S",
    );
    assert!(matches!(bad, Err(Error::InvalidArgument(_))), "bad key id must be detected");

    for i in 0..20 {
        let key = format!("key{i}");
        let value = format!("value{i}");
        crypto1.insert(&key, &value);
        crypto2.insert(&key, &value);
        nocrypto.insert(&key, &value);
    }

    // Stored forms differ between keys; decrypted forms agree.
    assert_ne!(crypto1.rows["key3"], crypto2.rows["key3"]);
    assert_eq!(&crypto1.rows["key3"][envelope::EXPANSION..], b"zepyi3");
    assert_eq!(hex::encode(&crypto2.rows["key3"][envelope::EXPANSION..]), "6f74656e7833");
    for i in 0..20 {
        let key = format!("key{i}");
        let expected = format!("value{i}");
        assert_eq!(crypto1.read(&key), expected);
        assert_eq!(crypto2.read(&key), expected);
        assert_eq!(nocrypto.read(&key), expected);
    }

    let message = b"The quick brown fox jumps over the lazy dog ";
    let mut log_record = vec![0u8; message.len() + log.sizing()];
    let written = log.encrypt(Some(message.as_slice()), &mut log_record).unwrap();
    assert_eq!(written, message.len() + envelope::sizing());
    assert_eq!(&log_record[envelope::EXPANSION..written], b"Gur dhvpx oebja sbk whzcf bire gur ynml qbt ");

    let mut replay = vec![0u8; message.len()];
    log.decrypt(Some(&log_record[..written]), &mut replay).unwrap();
    assert_eq!(replay, message);

    crypto1.close();
    crypto2.close();
    nocrypto.close();
    log.terminate();
}

#[test]
fn test_reopen_detects_bad_and_missing_password() {
    let registry = EncryptorRegistry::with_rotn();

    let bad = registry.open(
        "create,log=(enabled=true,compressor=snappy),\
         encryption=(name=rotn,keyid=system,secretkey=bad_password)",
    );
    assert_eq!(bad.err().map(|e| e.kind()), Some(ErrorKind::PermissionDenied));

    let missing =
        registry.open("create,log=(enabled=true,compressor=snappy),encryption=(name=rotn,keyid=system)");
    assert_eq!(missing.err().map(|e| e.kind()), Some(ErrorKind::PermissionDenied));

    // The registry is unaffected by rejected attempts.
    let log = registry.open(SYSTEM_CONNECTION).unwrap().unwrap();
    log.terminate();
}

#[test]
fn test_records_survive_reopen() {
    let registry = EncryptorRegistry::with_rotn();
    let config = EncryptionConfig::new().with_name("rotn").with_keyid("user2");

    let writer = registry.customize(&config).unwrap();
    let mut record = vec![0u8; 7 + writer.sizing()];
    writer.encrypt(Some(b"value19".as_slice()), &mut record).unwrap();
    writer.terminate();

    let reader = registry.customize(&config).unwrap();
    let mut plain = [0u8; 7];
    reader.decrypt(Some(record.as_slice()), &mut plain).unwrap();
    assert_eq!(&plain, b"value19");
    reader.terminate();
}

#[test]
fn test_wrong_key_does_not_recover_plaintext() {
    let factory = RotNEncryptor::with_default_policy();
    let user1 = factory.customize(&EncryptionConfig::new().with_keyid("user1")).unwrap();
    let user2 = factory.customize(&EncryptionConfig::new().with_keyid("user2")).unwrap();

    let mut record = vec![0u8; 6 + user1.sizing()];
    user1.encrypt(Some(b"value5".as_slice()), &mut record).unwrap();

    let mut plain = [0u8; 6];
    user2.decrypt(Some(record.as_slice()), &mut plain).unwrap();
    assert_ne!(&plain, b"value5");
}

#[test]
fn test_concurrent_calls_are_all_counted() {
    const THREADS: u64 = 8;
    const ROUNDS: u64 = 500;

    let factory = RotNEncryptor::with_default_policy();
    let table = factory.customize(&EncryptionConfig::new().with_keyid("user1")).unwrap();

    thread::scope(|s| {
        for t in 0..THREADS {
            let table = &table;
            s.spawn(move || {
                for i in 0..ROUNDS {
                    let value = format!("value{t}-{i}");
                    let mut record = vec![0u8; value.len() + envelope::sizing()];
                    let written = table.encrypt(Some(value.as_bytes()), &mut record).unwrap();

                    let mut plain = vec![0u8; value.len()];
                    table.decrypt(Some(&record[..written]), &mut plain).unwrap();
                    assert_eq!(plain, value.as_bytes());
                }
            });
        }
    });

    // One count from customize plus an encrypt and a decrypt per round.
    assert_eq!(table.calls(), 1 + THREADS * ROUNDS * 2);
    assert_eq!(table.terminate(), 2 + THREADS * ROUNDS * 2);
}

#[test]
fn test_teardown_leaves_template_untouched() {
    let factory = RotNEncryptor::with_default_policy();
    assert_eq!(factory.sizing(), envelope::EXPANSION);
    let template_calls = factory.calls();
    assert_eq!(template_calls, 1);

    let table = factory.customize(&EncryptionConfig::new().with_keyid("user1")).unwrap();
    let mut record = vec![0u8; 6 + table.sizing()];
    table.encrypt(Some(b"value1".as_slice()), &mut record).unwrap();
    assert_eq!(table.terminate(), template_calls + 4);

    // The instance's calls and its teardown are not charged to the template.
    assert_eq!(factory.calls(), template_calls);
    assert_eq!(factory.default_rotation(), Rotation::IDENTITY);

    let again = factory.customize(&EncryptionConfig::new().with_keyid("user1")).unwrap();
    assert_eq!(again.calls(), template_calls + 1);
    again.terminate();
    assert_eq!(factory.calls(), template_calls);
}

#[test]
fn test_custom_policy_through_registry() {
    struct SingleKey;

    impl KeyPolicy for SingleKey {
        fn resolve(
            &self,
            key_id: &str,
            _secret: Option<&SecretString>,
        ) -> Result<KeyBinding, KeyPolicyError> {
            match key_id {
                "" => Err(KeyPolicyError::MissingKeyId),
                "archive" => Ok(KeyBinding::User { rotation: Rotation::new(1).unwrap() }),
                other => Err(KeyPolicyError::UnknownKeyId(other.to_string())),
            }
        }
    }

    let mut registry = EncryptorRegistry::new();
    registry.add_encryptor("archive", RotNEncryptor::new(SingleKey)).unwrap();

    let encryptor = registry
        .open("encryption=(name=archive,keyid=archive)")
        .unwrap()
        .expect("archive encryption");
    let mut record = [0u8; 3 + envelope::EXPANSION];
    encryptor.encrypt(Some(b"HAL".as_slice()), &mut record).unwrap();
    assert_eq!(&record[envelope::EXPANSION..], b"IBM");
    encryptor.terminate();

    assert!(matches!(
        registry.open("encryption=(name=archive,keyid=user1)"),
        Err(Error::InvalidArgument(_))
    ));
}
