//! A fixed-width nonce for the `crypto_secretbox` (XSalsa20-Poly1305) cipher.
//!
//! A dedicated type makes the zero-vs-initialized invariant explicit and localizes the
//! "generate on first save, reuse on load" policy described by the store engine.

use sodiumoxide::crypto::secretbox;

/// Width, in bytes, of a `crypto_secretbox` nonce.
pub const NONCE_BYTES: usize = secretbox::NONCEBYTES;

/// A `crypto_secretbox` nonce: either all-zero ("uninitialized") or random.
#[derive(Clone, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_BYTES]);

impl Nonce {
    /// A zero nonce.
    pub fn new() -> Self {
        Nonce([0u8; NONCE_BYTES])
    }

    /// Fill `self` with cryptographically strong random bytes.
    pub fn randomize(&mut self) {
        let sodium_nonce = secretbox::gen_nonce();
        self.0.copy_from_slice(sodium_nonce.as_ref());
    }

    /// True iff any byte is non-zero.
    pub fn is_initialized(&self) -> bool {
        self.0.iter().any(|&b| b != 0)
    }

    /// Lowercase hex encoding, always exactly `2 * NONCE_BYTES` characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a hex string into `self`, overwriting the previous value only on success.
    ///
    /// Fails when the text is longer than `2 * NONCE_BYTES` characters (mirroring the
    /// `nonce_str_len` guard in the original C implementation, which rejects a string whose
    /// length is `>= 2*N + 1`) or is not valid hex of exactly `NONCE_BYTES` bytes.
    pub fn from_hex(&mut self, s: &str) -> Result<(), hex::FromHexError> {
        if s.len() > 2 * NONCE_BYTES {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut buf = [0u8; NONCE_BYTES];
        hex::decode_to_slice(s, &mut buf)?;
        self.0 = buf;
        Ok(())
    }

    /// Borrowed view of the raw bytes.
    pub fn raw(&self) -> &[u8; NONCE_BYTES] {
        &self.0
    }

    pub(crate) fn as_sodium(&self) -> secretbox::Nonce {
        secretbox::Nonce(self.0)
    }
}

impl Default for Nonce {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Nonce {
    fn drop(&mut self) {
        self.0 = [0u8; NONCE_BYTES];
    }
}
