//! Record transforms applied to the body of an encrypted record.
//!
//! The reference transform is a rotation cipher over ASCII letters. It is
//! illustrative only and provides no confidentiality.
//!
//! # Laws
//!
//! - `decode(encode(x, r), r) == x` for every byte sequence `x` and rotation `r`
//! - `encode(x, r).len() == x.len()`
//! - Non-alphabetic bytes are never changed and letter case is preserved

use crate::envelope::IV_LEN;

/// Size of the Latin alphabet the rotation operates on.
const ALPHABET_LEN: u8 = 26;

/// Rotation distance for the rotation transform, always in `0..26`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rotation(u8);

impl Rotation {
    /// Rotation that leaves every byte unchanged.
    pub const IDENTITY: Self = Self(0);

    /// Creates a rotation, returning `None` if `distance` is not below 26.
    #[must_use]
    pub const fn new(distance: u8) -> Option<Self> {
        if distance < ALPHABET_LEN {
            Some(Self(distance))
        } else {
            None
        }
    }

    /// Returns the rotation distance.
    #[must_use]
    pub const fn distance(self) -> u8 {
        self.0
    }

    /// Returns the rotation that undoes this one: `(26 - n) mod 26`.
    #[must_use]
    pub const fn inverse(self) -> Self {
        Self((ALPHABET_LEN - self.0) % ALPHABET_LEN)
    }
}

/// Rotates every ASCII letter in `buf` by `rotation`, in place.
pub fn rotate(buf: &mut [u8], rotation: Rotation) {
    let n = rotation.distance();
    for byte in buf.iter_mut() {
        let base = match *byte {
            b'a'..=b'z' => b'a',
            b'A'..=b'Z' => b'A',
            _ => continue,
        };
        *byte = (*byte - base + n) % ALPHABET_LEN + base;
    }
}

/// Encodes `plaintext` with the rotation transform.
#[must_use]
pub fn encode(plaintext: &[u8], rotation: Rotation) -> Vec<u8> {
    let mut out = plaintext.to_vec();
    rotate(&mut out, rotation);
    out
}

/// Decodes `ciphertext` produced by [`encode`] with the same rotation.
#[must_use]
pub fn decode(ciphertext: &[u8], rotation: Rotation) -> Vec<u8> {
    let mut out = ciphertext.to_vec();
    rotate(&mut out, rotation.inverse());
    out
}

/// A body transform usable inside a record envelope.
///
/// Implementations must satisfy `decode_in_place(iv, encode_in_place(iv, x)) == x`,
/// must preserve length (the envelope accounts for all expansion) and must not
/// keep state between calls: the same instance is used concurrently by every
/// session writing the same table.
///
/// The per-record IV is handed to the transform on both sides. Any transform
/// meant to provide confidentiality must mix it in.
pub trait RecordTransform: Send + Sync {
    /// Transforms `buf` from plaintext to ciphertext.
    fn encode_in_place(&self, iv: &[u8; IV_LEN], buf: &mut [u8]);

    /// Transforms `buf` from ciphertext back to plaintext.
    fn decode_in_place(&self, iv: &[u8; IV_LEN], buf: &mut [u8]);
}

// The rotation cipher has no use for the IV.
impl RecordTransform for Rotation {
    fn encode_in_place(&self, _iv: &[u8; IV_LEN], buf: &mut [u8]) {
        rotate(buf, *self);
    }

    fn decode_in_place(&self, _iv: &[u8; IV_LEN], buf: &mut [u8]) {
        rotate(buf, self.inverse());
    }
}
