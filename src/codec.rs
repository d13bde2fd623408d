//! Password-based envelope encryption using PBKDF2 + AES-256-GCM
//!
//! This module implements the envelope codec:
//! - PBKDF2-HMAC-SHA256 (100,000 rounds) derives a key from the password
//! - AES-256-GCM with no associated data seals the payload
//! - the salt, nonce and display name travel in the envelope header
//!
//! The functions here keep no state between calls and are safe to use from
//! several threads at once.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::debug;

use crate::envelope::{self, Envelope, NONCE_LEN, SALT_LEN};
use crate::error::{ErrorCategory, ErrorKind, LockboxError, Result};
use crate::kdf::{self, DerivedKey};

/// Display name stored for envelopes produced from text rather than a file.
pub const TEXT_DISPLAY_NAME: &str = "text.txt";

/// Message of the single error returned when an envelope cannot be opened.
const DECRYPTION_FAILED_MSG: &str = "incorrect password or corrupted file";

/// Plaintext and metadata recovered from an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decrypted {
    pub plaintext: Vec<u8>,
    /// Name recorded at encryption time. May be empty.
    pub display_name: String,
}

/// Encrypt `plaintext` with a password, using a random salt and nonce.
///
/// `display_name` is stored in clear in the envelope header and must encode
/// to at most 255 bytes of UTF-8.
pub fn encrypt(plaintext: &[u8], password: &[u8], display_name: &str) -> Result<Vec<u8>> {
    // Fail before spending time on key derivation.
    envelope::encoded_name_len(display_name)?;

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    encrypt_deterministic(plaintext, password, display_name, &salt, &nonce)
}

/// Encrypt with a caller-provided salt and nonce.
///
/// This function is ONLY for generating reproducible test vectors.
/// NEVER use this in production: reusing a nonce with the same key breaks
/// AES-GCM. Always use [`encrypt`], which generates a random salt and nonce.
#[doc(hidden)]
pub fn encrypt_deterministic(
    plaintext: &[u8],
    password: &[u8],
    display_name: &str,
    salt: &[u8; SALT_LEN],
    nonce: &[u8; NONCE_LEN],
) -> Result<Vec<u8>> {
    let key = kdf::derive_key(password, salt);
    let sealed = cipher(&key)
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| {
            LockboxError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::CipherFailure,
                "encryption failed",
            )
        })?;

    let output = Envelope {
        salt: *salt,
        nonce: *nonce,
        display_name,
        sealed: &sealed,
    }
    .to_bytes()?;

    debug!(
        payload_len = plaintext.len(),
        envelope_len = output.len(),
        "sealed envelope"
    );
    Ok(output)
}

/// Decrypt an envelope with a password.
///
/// Fails with [`ErrorKind::MalformedEnvelope`] if the bytes cannot be an
/// envelope and with [`ErrorKind::DecryptionFailed`] if authentication fails.
/// A wrong password and a tampered envelope produce the same error.
pub fn decrypt(envelope: &[u8], password: &[u8]) -> Result<Decrypted> {
    let parsed = Envelope::parse(envelope)?;

    let key = kdf::derive_key(password, &parsed.salt);
    let plaintext = cipher(&key)
        .decrypt(Nonce::from_slice(&parsed.nonce), parsed.sealed)
        .map_err(|_| {
            LockboxError::with_kind(
                ErrorCategory::User,
                ErrorKind::DecryptionFailed,
                DECRYPTION_FAILED_MSG,
            )
        })?;

    debug!(
        envelope_len = envelope.len(),
        payload_len = plaintext.len(),
        "opened envelope"
    );
    Ok(Decrypted {
        plaintext,
        display_name: parsed.display_name.to_owned(),
    })
}

/// Encrypt a string. The envelope records [`TEXT_DISPLAY_NAME`] as its name.
pub fn encrypt_text(text: &str, password: &[u8]) -> Result<Vec<u8>> {
    encrypt(text.as_bytes(), password, TEXT_DISPLAY_NAME)
}

/// Decrypt an envelope given as a binary string, one char per byte.
///
/// See [`envelope_from_binary_string`] for the accepted representation.
pub fn decrypt_text(encrypted: &str, password: &[u8]) -> Result<Decrypted> {
    let envelope = envelope_from_binary_string(encrypted)?;
    decrypt(&envelope, password)
}

/// Represent envelope bytes as a string holding one char (U+0000..=U+00FF)
/// per byte.
pub fn envelope_to_binary_string(envelope: &[u8]) -> String {
    envelope.iter().map(|&b| char::from(b)).collect()
}

/// Inverse of [`envelope_to_binary_string`].
///
/// A char above U+00FF does not denote a byte and makes the input malformed.
pub fn envelope_from_binary_string(encrypted: &str) -> Result<Vec<u8>> {
    encrypted
        .chars()
        .map(|c| {
            u8::try_from(c).map_err(|e| {
                LockboxError::with_kind_and_source(
                    ErrorCategory::User,
                    ErrorKind::MalformedEnvelope,
                    format!("character U+{:04X} cannot be part of an envelope", u32::from(c)),
                    e,
                )
            })
        })
        .collect()
}

fn cipher(key: &DerivedKey) -> Aes256Gcm {
    Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::HEADER_LEN;

    #[test]
    fn test_hello_world_scenario() {
        let envelope = encrypt(b"Hello World", b"correct-horse", "text.txt").unwrap();

        let decrypted = decrypt(&envelope, b"correct-horse").unwrap();
        assert_eq!(decrypted.plaintext, b"Hello World");
        assert_eq!(decrypted.display_name, "text.txt");

        let err = decrypt(&envelope, b"wrong-password").expect_err("expected failure");
        assert_eq!(err.kind, Some(ErrorKind::DecryptionFailed));
        assert_eq!(err.category, ErrorCategory::User);
        assert_eq!(err.to_string(), "incorrect password or corrupted file");
    }

    #[test]
    fn test_empty_plaintext() {
        let envelope = encrypt(b"", b"test", "empty.txt").unwrap();
        // Header, name, and the 16-byte tag of an empty payload.
        assert_eq!(envelope.len(), HEADER_LEN + "empty.txt".len() + 16);

        let decrypted = decrypt(&envelope, b"test").unwrap();
        assert!(decrypted.plaintext.is_empty());
    }

    #[test]
    fn test_empty_password() {
        let envelope = encrypt(b"weak but allowed", b"", "weak.txt").unwrap();
        let decrypted = decrypt(&envelope, b"").unwrap();
        assert_eq!(decrypted.plaintext, b"weak but allowed");

        let err = decrypt(&envelope, b" ").expect_err("expected failure");
        assert_eq!(err.kind, Some(ErrorKind::DecryptionFailed));
    }

    #[test]
    fn test_empty_display_name() {
        let envelope = encrypt(b"data", b"test", "").unwrap();
        let decrypted = decrypt(&envelope, b"test").unwrap();
        assert_eq!(decrypted.display_name, "");
        assert_eq!(decrypted.plaintext, b"data");
    }

    #[test]
    fn test_all_byte_values() {
        let plaintext: Vec<u8> = (0..=255).collect();
        let envelope = encrypt(&plaintext, b"test", "bytes.bin").unwrap();
        assert_eq!(decrypt(&envelope, b"test").unwrap().plaintext, plaintext);
    }

    #[test]
    fn test_large_plaintext() {
        let plaintext = vec![0x42u8; 128 * 1024]; // 128KB
        let envelope = encrypt(&plaintext, b"test", "large.bin").unwrap();
        assert_eq!(decrypt(&envelope, b"test").unwrap().plaintext, plaintext);
    }

    #[test]
    fn test_fresh_salt_and_nonce_per_call() {
        let e1 = encrypt(b"same input", b"test", "same.txt").unwrap();
        let e2 = encrypt(b"same input", b"test", "same.txt").unwrap();

        assert_ne!(e1[..SALT_LEN], e2[..SALT_LEN]);
        assert_ne!(
            e1[SALT_LEN..SALT_LEN + NONCE_LEN],
            e2[SALT_LEN..SALT_LEN + NONCE_LEN]
        );
        assert_ne!(e1, e2);

        assert_eq!(decrypt(&e1, b"test").unwrap().plaintext, b"same input");
        assert_eq!(decrypt(&e2, b"test").unwrap().plaintext, b"same input");
    }

    #[test]
    fn test_deterministic_encryption() {
        let salt = [1u8; SALT_LEN];
        let nonce = [2u8; NONCE_LEN];

        let e1 = encrypt_deterministic(b"hello", b"test", "h.txt", &salt, &nonce).unwrap();
        let e2 = encrypt_deterministic(b"hello", b"test", "h.txt", &salt, &nonce).unwrap();
        assert_eq!(e1, e2);
    }

    #[test]
    fn test_tampered_sealed_payload_fails() {
        let envelope = encrypt(b"Hello World", b"test", "text.txt").unwrap();
        let sealed_start = HEADER_LEN + "text.txt".len();

        // One flipped bit per byte of the sealed region, rotating through the
        // bit positions, covers both ciphertext and tag.
        for (i, pos) in (sealed_start..envelope.len()).enumerate() {
            let mut tampered = envelope.clone();
            tampered[pos] ^= 1 << (i % 8);
            let err = decrypt(&tampered, b"test").expect_err("tampering must be detected");
            assert_eq!(err.kind, Some(ErrorKind::DecryptionFailed), "byte {}", pos);
        }
    }

    #[test]
    fn test_tampered_salt_or_nonce_fails() {
        let envelope = encrypt(b"Hello World", b"test", "text.txt").unwrap();

        for pos in [0, SALT_LEN - 1, SALT_LEN, SALT_LEN + NONCE_LEN - 1] {
            let mut tampered = envelope.clone();
            tampered[pos] ^= 0x80;
            let err = decrypt(&tampered, b"test").expect_err("tampering must be detected");
            assert_eq!(err.kind, Some(ErrorKind::DecryptionFailed), "byte {}", pos);
        }
    }

    #[test]
    fn test_truncated_tag_fails() {
        let envelope = encrypt(b"Hello World", b"test", "text.txt").unwrap();
        let truncated = &envelope[..envelope.len() - 1];
        let err = decrypt(truncated, b"test").expect_err("expected failure");
        assert_eq!(err.kind, Some(ErrorKind::DecryptionFailed));
    }

    #[test]
    fn test_truncated_header_is_malformed() {
        let envelope = encrypt(b"Hello World", b"test", "text.txt").unwrap();
        let err = decrypt(&envelope[..HEADER_LEN - 1], b"test").expect_err("expected failure");
        assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope));
    }

    #[test]
    fn test_name_len_past_end_is_malformed() {
        let mut envelope = encrypt(b"", b"test", "").unwrap();
        envelope[SALT_LEN + NONCE_LEN] = 255;
        let err = decrypt(&envelope, b"test").expect_err("expected failure");
        assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope));
    }

    #[test]
    fn test_name_boundary() {
        let name = format!("{}.bin", "n".repeat(251));
        assert_eq!(name.len(), 255);
        let envelope = encrypt(b"boundary", b"test", &name).unwrap();
        assert_eq!(decrypt(&envelope, b"test").unwrap().display_name, name);

        let too_long = format!("{}.bin", "n".repeat(252));
        let err = encrypt(b"boundary", b"test", &too_long).expect_err("expected rejection");
        assert_eq!(err.kind, Some(ErrorKind::DisplayNameTooLong));
    }

    #[test]
    fn test_text_roundtrip() {
        let envelope = encrypt_text("Hello World", b"correct-horse").unwrap();
        let binary = envelope_to_binary_string(&envelope);
        assert_eq!(binary.chars().count(), envelope.len());

        let decrypted = decrypt_text(&binary, b"correct-horse").unwrap();
        assert_eq!(decrypted.plaintext, b"Hello World");
        assert_eq!(decrypted.display_name, TEXT_DISPLAY_NAME);

        let err = decrypt_text(&binary, b"wrong-password").expect_err("expected failure");
        assert_eq!(err.kind, Some(ErrorKind::DecryptionFailed));
    }

    #[test]
    fn test_text_payload_is_utf8_bytes() {
        let envelope = encrypt_text("snowman ☃", b"test").unwrap();
        let decrypted = decrypt(&envelope, b"test").unwrap();
        assert_eq!(decrypted.plaintext, "snowman ☃".as_bytes());
    }

    #[test]
    fn test_binary_string_rejects_wide_chars() {
        let err = envelope_from_binary_string("abc\u{0100}").expect_err("expected failure");
        assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope));

        let err = decrypt_text("☃", b"test").expect_err("expected failure");
        assert_eq!(err.kind, Some(ErrorKind::MalformedEnvelope));
    }

    #[test]
    fn test_binary_string_maps_high_bytes() {
        let bytes = [0x00, 0x7f, 0x80, 0xff];
        let s = envelope_to_binary_string(&bytes);
        assert_eq!(s, "\u{0}\u{7f}\u{80}\u{ff}");
        assert_eq!(envelope_from_binary_string(&s).unwrap(), bytes);
    }

    #[test]
    fn test_cipher_state_is_wiped_on_drop() {
        fn assert_zeroize_on_drop<T: zeroize::ZeroizeOnDrop>(_: &T) {}

        let salt = [7u8; SALT_LEN];
        let key = kdf::derive_key(b"pw", &salt);
        assert_zeroize_on_drop(&cipher(&key));
    }

    #[test]
    fn test_parallel_operations() {
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4u8)
                .map(|i| {
                    scope.spawn(move || {
                        let plaintext = vec![i; 64];
                        let password = [b'p', i];
                        let envelope = encrypt(&plaintext, &password, "p.bin").unwrap();
                        decrypt(&envelope, &password).unwrap().plaintext == plaintext
                    })
                })
                .collect();
            for handle in handles {
                assert!(handle.join().unwrap());
            }
        });
    }

    #[test]
    fn test_cross_implementation_compatibility() {
        let salt = [0x42u8; SALT_LEN];
        let nonce = [0x24u8; NONCE_LEN];

        let envelope =
            encrypt_deterministic(b"Hello World", b"correct-horse", "text.txt", &salt, &nonce)
                .unwrap();

        // Produced by an independent PBKDF2/AES-GCM implementation.
        #[rustfmt::skip]
        let expected: Vec<u8> = vec![
            0x42, 0x42, 0x42, 0x42, 0x42, 0x42, 0x42, 0x42, 0x42, 0x42, 0x42, 0x42, 0x42, 0x42, 0x42, 0x42,
            0x24, 0x24, 0x24, 0x24, 0x24, 0x24, 0x24, 0x24, 0x24, 0x24, 0x24, 0x24,
            0x08,
            0x74, 0x65, 0x78, 0x74, 0x2e, 0x74, 0x78, 0x74,
            0x72, 0x23, 0x92, 0xdb, 0xe3, 0x28, 0xd2, 0x24, 0xb1, 0xb2, 0xef,
            0x0b, 0xdb, 0x70, 0xaa, 0xc1, 0xd9, 0x3b, 0xde, 0xe8, 0x6b, 0xb2, 0x36, 0xbf, 0x94, 0xe4, 0x71,
        ];

        assert_eq!(envelope, expected);

        let decrypted = decrypt(&envelope, b"correct-horse").unwrap();
        assert_eq!(decrypted.plaintext, b"Hello World");
    }
}
