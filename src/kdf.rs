//! Password-based key derivation (PBKDF2-HMAC-SHA256)

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::envelope::SALT_LEN;

/// Length of derived key in bytes (AES-256)
pub const KEY_LEN: usize = 32;

/// PBKDF2 iteration count. Part of the envelope contract: changing it makes
/// existing envelopes undecryptable.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// A symmetric key derived from a password for a single operation.
///
/// The key bytes are wiped from memory when the value is dropped.
pub struct DerivedKey {
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

/// Derive a 32-byte key from a password and salt.
///
/// Deterministic for a given (password, salt). The empty password is accepted.
pub fn derive_key(password: &[u8], salt: &[u8; SALT_LEN]) -> DerivedKey {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(password, salt, PBKDF2_ITERATIONS, &mut *key);
    DerivedKey { key }
}
