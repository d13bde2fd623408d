//! Envelope binary layout
//!
//! Every encrypted blob is a single self-describing byte sequence:
//! - salt: 16 bytes
//! - nonce: 12 bytes
//! - name length: 1 byte (unsigned)
//! - display name: `name length` bytes of UTF-8
//! - sealed payload: remainder (AES-256-GCM ciphertext followed by the 16-byte tag)
//!
//! Both directions go through [`Envelope`] so that encryption and decryption
//! can never disagree on the layout.

use crate::error::{ErrorCategory, ErrorKind, LockboxError, Result};

/// Length of salt in bytes
pub const SALT_LEN: usize = 16;

/// Length of nonce in bytes
pub const NONCE_LEN: usize = 12;

/// Salt, nonce and the name length byte.
pub const HEADER_LEN: usize = SALT_LEN + NONCE_LEN + 1;

/// Largest display name the one-byte length field can describe.
pub const MAX_DISPLAY_NAME_LEN: usize = u8::MAX as usize;

/// A borrowed view of the fields of one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope<'a> {
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
    pub display_name: &'a str,
    pub sealed: &'a [u8],
}

impl<'a> Envelope<'a> {
    /// Split raw envelope bytes into their fields.
    ///
    /// Only the layout is checked here; the sealed payload is not authenticated
    /// until it is opened.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(LockboxError::malformed(format!(
                "input too short to be an envelope ({} bytes, need at least {})",
                bytes.len(),
                HEADER_LEN
            )));
        }

        let mut pos = 0;
        let salt: [u8; SALT_LEN] = bytes[pos..pos + SALT_LEN]
            .try_into()
            .map_err(|_| LockboxError::malformed("failed to read salt"))?;
        pos += SALT_LEN;

        let nonce: [u8; NONCE_LEN] = bytes[pos..pos + NONCE_LEN]
            .try_into()
            .map_err(|_| LockboxError::malformed("failed to read nonce"))?;
        pos += NONCE_LEN;

        let name_len = usize::from(bytes[pos]);
        pos += 1;

        if bytes.len() < pos + name_len {
            return Err(LockboxError::malformed(format!(
                "truncated or corrupt input; display name length {} overruns the envelope",
                name_len
            )));
        }
        let display_name = std::str::from_utf8(&bytes[pos..pos + name_len]).map_err(|e| {
            LockboxError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::MalformedEnvelope,
                "display name is not valid UTF-8",
                e,
            )
        })?;
        pos += name_len;

        Ok(Self {
            salt,
            nonce,
            display_name,
            sealed: &bytes[pos..],
        })
    }

    /// Serialize the envelope into a fresh byte vector.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let name_len = encoded_name_len(self.display_name)?;

        let mut output = Vec::with_capacity(HEADER_LEN + self.display_name.len() + self.sealed.len());
        output.extend_from_slice(&self.salt);
        output.extend_from_slice(&self.nonce);
        output.push(name_len);
        output.extend_from_slice(self.display_name.as_bytes());
        output.extend_from_slice(self.sealed);

        Ok(output)
    }
}

/// Returns the value of the name length byte for `name`.
///
/// Names that do not fit in one byte are rejected rather than truncated.
pub fn encoded_name_len(name: &str) -> Result<u8> {
    u8::try_from(name.len()).map_err(|_| {
        LockboxError::with_kind(
            ErrorCategory::User,
            ErrorKind::DisplayNameTooLong,
            format!(
                "display name is {} bytes when encoded; at most {} are allowed",
                name.len(),
                MAX_DISPLAY_NAME_LEN
            ),
        )
    })
}
