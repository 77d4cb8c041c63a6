//! Record envelope surrounding a transformed payload.
//!
//! Every encrypted record carries a fixed-size header in front of the
//! transformed body:
//!
//! ```text
//! [tag:4][iv:16][payload:N]
//! ```
//!
//! The tag is the first four bytes of `SHA-256(iv || payload)` and is checked
//! before a record is decoded. It detects corruption, not forgery: anyone can
//! recompute it.

use crate::error::Error;
use crate::transform::RecordTransform;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

/// Integrity tag length in bytes.
pub const TAG_LEN: usize = 4;

/// Initialization vector length in bytes.
pub const IV_LEN: usize = 16;

/// Bytes the envelope adds in front of the payload.
pub const EXPANSION: usize = TAG_LEN + IV_LEN;

/// Returns the number of bytes the envelope adds to a plaintext.
///
/// Destination buffers for [`wrap_into`] must hold at least
/// `plaintext.len() + sizing()` bytes.
#[must_use]
pub const fn sizing() -> usize {
    EXPANSION
}

/// A parsed or freshly sealed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEnvelope {
    tag: [u8; TAG_LEN],
    iv: [u8; IV_LEN],
    payload: Vec<u8>,
}

impl RecordEnvelope {
    /// Transforms `plaintext` under a fresh random IV and tags the result.
    #[must_use]
    pub fn seal<T: RecordTransform + ?Sized>(plaintext: &[u8], transform: &T) -> Self {
        let iv = generate_iv();
        let mut payload = plaintext.to_vec();
        transform.encode_in_place(&iv, &mut payload);
        let tag = compute_tag(&iv, &payload);
        Self { tag, iv, payload }
    }

    /// Returns the integrity tag.
    #[must_use]
    pub const fn tag(&self) -> &[u8; TAG_LEN] {
        &self.tag
    }

    /// Returns the initialization vector.
    #[must_use]
    pub const fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    /// Returns the transformed payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Length of the serialized record.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        EXPANSION + self.payload.len()
    }

    /// Serializes the record.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_len());
        bytes.extend_from_slice(&self.tag);
        bytes.extend_from_slice(&self.iv);
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Parses a serialized record and checks its tag.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidEnvelope` if the record is shorter than the
    /// header, or `Error::IntegrityCheckFailed` if the tag does not match.
    pub fn from_bytes(data: &[u8]) -> Result<Self, Error> {
        let (tag, iv, payload) = split(data)?;
        let envelope = Self { tag, iv, payload: payload.to_vec() };
        envelope.verify()?;
        Ok(envelope)
    }

    /// Decodes the payload back to plaintext.
    #[must_use]
    pub fn open<T: RecordTransform + ?Sized>(mut self, transform: &T) -> Vec<u8> {
        transform.decode_in_place(&self.iv, &mut self.payload);
        self.payload
    }

    fn verify(&self) -> Result<(), Error> {
        if compute_tag(&self.iv, &self.payload) == self.tag {
            Ok(())
        } else {
            Err(Error::IntegrityCheckFailed)
        }
    }
}

/// Wraps `plaintext` into a new record.
///
/// An empty plaintext produces an empty record.
#[must_use]
pub fn wrap<T: RecordTransform + ?Sized>(plaintext: &[u8], transform: &T) -> Vec<u8> {
    if plaintext.is_empty() {
        return Vec::new();
    }
    RecordEnvelope::seal(plaintext, transform).to_bytes()
}

/// Unwraps a record produced by [`wrap`].
///
/// An empty record produces an empty plaintext.
///
/// # Errors
///
/// Returns `Error::InvalidEnvelope` if the record is shorter than the header,
/// or `Error::IntegrityCheckFailed` if the tag does not match.
pub fn unwrap<T: RecordTransform + ?Sized>(record: &[u8], transform: &T) -> Result<Vec<u8>, Error> {
    if record.is_empty() {
        return Ok(Vec::new());
    }
    Ok(RecordEnvelope::from_bytes(record)?.open(transform))
}

/// Wraps `src` directly into `dst` and returns the number of bytes written.
///
/// `None` or an empty source is a successful no-op. Nothing is written to
/// `dst` unless the whole record fits.
///
/// # Errors
///
/// Returns `Error::InsufficientCapacity` if `dst` is shorter than
/// `src.len() + sizing()`.
pub fn wrap_into<T: RecordTransform + ?Sized>(
    src: Option<&[u8]>,
    transform: &T,
    dst: &mut [u8],
) -> Result<usize, Error> {
    let Some(src) = src.filter(|s| !s.is_empty()) else {
        return Ok(0);
    };

    let required = src.len() + EXPANSION;
    if dst.len() < required {
        return Err(Error::InsufficientCapacity { required, available: dst.len() });
    }

    let iv = generate_iv();
    let (header, body) = dst[..required].split_at_mut(EXPANSION);
    body.copy_from_slice(src);
    transform.encode_in_place(&iv, body);

    let tag = compute_tag(&iv, body);
    header[..TAG_LEN].copy_from_slice(&tag);
    header[TAG_LEN..].copy_from_slice(&iv);

    Ok(required)
}

/// Unwraps the record in `src` directly into `dst` and returns the number of
/// plaintext bytes written.
///
/// `None` or an empty source is a successful no-op. Nothing is written to
/// `dst` unless the record parses, verifies and fits.
///
/// # Errors
///
/// Returns:
/// - `Error::InvalidEnvelope` if `src` is shorter than the header
/// - `Error::InsufficientCapacity` if `dst` is shorter than `src.len() - sizing()`
/// - `Error::IntegrityCheckFailed` if the tag does not match
pub fn unwrap_into<T: RecordTransform + ?Sized>(
    src: Option<&[u8]>,
    transform: &T,
    dst: &mut [u8],
) -> Result<usize, Error> {
    let Some(src) = src.filter(|s| !s.is_empty()) else {
        return Ok(0);
    };

    let (tag, iv, payload) = split(src)?;
    let required = payload.len();
    if dst.len() < required {
        return Err(Error::InsufficientCapacity { required, available: dst.len() });
    }
    if compute_tag(&iv, payload) != tag {
        return Err(Error::IntegrityCheckFailed);
    }

    let out = &mut dst[..required];
    out.copy_from_slice(payload);
    transform.decode_in_place(&iv, out);

    Ok(required)
}

fn split(data: &[u8]) -> Result<([u8; TAG_LEN], [u8; IV_LEN], &[u8]), Error> {
    if data.len() < EXPANSION {
        return Err(Error::InvalidEnvelope(format!(
            "record too short: {} bytes (min: {EXPANSION})",
            data.len()
        )));
    }

    let (header, payload) = data.split_at(EXPANSION);
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&header[..TAG_LEN]);
    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(&header[TAG_LEN..]);

    Ok((tag, iv, payload))
}

fn generate_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

fn compute_tag(iv: &[u8; IV_LEN], payload: &[u8]) -> [u8; TAG_LEN] {
    let digest = Sha256::new().chain_update(iv).chain_update(payload).finalize();
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&digest[..TAG_LEN]);
    tag
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Rotation;
    use proptest::prelude::*;

    fn rot13() -> Rotation {
        Rotation::new(13).unwrap()
    }

    #[test]
    fn test_sizing_is_header_length() {
        assert_eq!(sizing(), 20);
        assert_eq!(sizing(), TAG_LEN + IV_LEN);
    }

    #[test]
    fn test_wrap_layout() {
        let record = wrap(b"value0", &rot13());
        assert_eq!(record.len(), 6 + EXPANSION);
        assert_eq!(&record[EXPANSION..], b"inyhr0");

        let envelope = RecordEnvelope::from_bytes(&record).expect("Failed to parse record");
        assert_eq!(envelope.tag(), &record[..TAG_LEN]);
        assert_eq!(envelope.iv(), &record[TAG_LEN..EXPANSION]);
        assert_eq!(envelope.payload(), b"inyhr0");
    }

    #[test]
    fn test_wrap_unwrap_round_trip() {
        let record = wrap(b"The quick brown fox jumps over the lazy dog", &rot13());
        let plaintext = unwrap(&record, &rot13()).expect("Failed to unwrap");
        assert_eq!(plaintext, b"The quick brown fox jumps over the lazy dog");
    }

    #[test]
    fn test_fresh_iv_per_record() {
        let a = RecordEnvelope::seal(b"key1", &rot13());
        let b = RecordEnvelope::seal(b"key1", &rot13());
        assert_ne!(a.iv(), b.iv());
        assert_eq!(a.payload(), b.payload());
    }

    #[test]
    fn test_unwrap_too_short() {
        let result = unwrap(&[0u8; EXPANSION - 1], &rot13());
        assert!(matches!(result, Err(Error::InvalidEnvelope(_))));
    }

    #[test]
    fn test_header_only_record_is_valid() {
        let envelope = RecordEnvelope::seal(b"", &rot13());
        let record = envelope.to_bytes();
        assert_eq!(record.len(), EXPANSION);
        assert!(unwrap(&record, &rot13()).unwrap().is_empty());
    }

    #[test]
    fn test_corrupted_payload_detected() {
        let mut record = wrap(b"value1", &rot13());
        let last = record.len() - 1;
        record[last] ^= 0x01;

        assert!(matches!(unwrap(&record, &rot13()), Err(Error::IntegrityCheckFailed)));

        let mut dst = [0u8; 6];
        let result = unwrap_into(Some(record.as_slice()), &rot13(), &mut dst);
        assert!(matches!(result, Err(Error::IntegrityCheckFailed)));
        assert_eq!(dst, [0u8; 6]);
    }

    #[test]
    fn test_corrupted_iv_detected() {
        let mut record = wrap(b"value1", &rot13());
        record[TAG_LEN] ^= 0xFF;
        assert!(matches!(unwrap(&record, &rot13()), Err(Error::IntegrityCheckFailed)));
    }

    #[test]
    fn test_wrap_into_exact_capacity() {
        let mut dst = vec![0u8; 5 + EXPANSION];
        let written = wrap_into(Some(&b"key19"[..]), &rot13(), &mut dst).unwrap();
        assert_eq!(written, dst.len());
        assert_eq!(&dst[EXPANSION..], b"xrl19");
    }

    #[test]
    fn test_wrap_into_one_byte_short() {
        let mut dst = vec![0xEEu8; 5 + EXPANSION - 1];
        let result = wrap_into(Some(&b"key19"[..]), &rot13(), &mut dst);
        assert!(matches!(
            result,
            Err(Error::InsufficientCapacity { required: 25, available: 24 })
        ));
        assert!(dst.iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn test_unwrap_into_one_byte_short() {
        let record = wrap(b"key19", &rot13());
        let mut dst = vec![0xEEu8; 4];
        let result = unwrap_into(Some(record.as_slice()), &rot13(), &mut dst);
        assert!(matches!(
            result,
            Err(Error::InsufficientCapacity { required: 5, available: 4 })
        ));
        assert!(dst.iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn test_unwrap_into_larger_buffer() {
        let record = wrap(b"key19", &rot13());
        let mut dst = [0u8; 64];
        let written = unwrap_into(Some(record.as_slice()), &rot13(), &mut dst).unwrap();
        assert_eq!(&dst[..written], b"key19");
        assert!(dst[written..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_no_data_is_noop() {
        let mut dst = [0x11u8; 8];
        assert_eq!(wrap_into(None, &rot13(), &mut dst).unwrap(), 0);
        assert_eq!(wrap_into(Some(&b""[..]), &rot13(), &mut dst).unwrap(), 0);
        assert_eq!(unwrap_into(None, &rot13(), &mut dst).unwrap(), 0);
        assert_eq!(unwrap_into(Some(&b""[..]), &rot13(), &mut []).unwrap(), 0);
        assert_eq!(dst, [0x11u8; 8]);

        assert!(wrap(b"", &rot13()).is_empty());
        assert!(unwrap(b"", &rot13()).unwrap().is_empty());
    }

    #[test]
    fn test_tag_matches_sha256_prefix() {
        let envelope = RecordEnvelope::seal(b"abc", &Rotation::IDENTITY);
        let mut input = envelope.iv().to_vec();
        input.extend_from_slice(b"abc");
        let digest = Sha256::digest(&input);
        assert_eq!(hex::encode(envelope.tag()), hex::encode(&digest[..TAG_LEN]));
    }

    proptest! {
        #[test]
        fn prop_wrap_length(data in proptest::collection::vec(any::<u8>(), 1..256), n in 0u8..26) {
            let rotation = Rotation::new(n).unwrap();
            prop_assert_eq!(wrap(&data, &rotation).len(), data.len() + sizing());
        }

        #[test]
        fn prop_buffer_round_trip(data in proptest::collection::vec(any::<u8>(), 0..256), n in 0u8..26) {
            let rotation = Rotation::new(n).unwrap();
            let mut record = vec![0u8; data.len() + sizing()];
            let written = wrap_into(Some(data.as_slice()), &rotation, &mut record).unwrap();
            let mut plain = vec![0u8; data.len()];
            let read = unwrap_into(Some(&record[..written]), &rotation, &mut plain).unwrap();
            prop_assert_eq!(&plain[..read], &data[..]);
        }
    }
}
