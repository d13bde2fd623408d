//! Versioned armoring for envelopes
//!
//! Text mode needs something that survives being pasted into a chat window or
//! an email. The armored form is:
//! - `lockbox1:` followed by base64url without padding
//! - free of whitespace, safe to embed in URLs and POSIX shells
//!
//! The version in the prefix belongs to the armor only. The envelope inside is
//! the same binary layout that file mode writes.

use crate::error::{ErrorCategory, ErrorKind, LockboxError, Result};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

/// Magic prefix for all lockbox armor versions
pub(crate) const MAGIC_PREFIX: &str = "lockbox";

/// Version 1 magic marker
const V1_MAGIC: &str = "lockbox1:";

/// Wrap envelope bytes in armor.
pub fn wrap(body: &[u8]) -> String {
    let encoded = URL_SAFE_NO_PAD.encode(body);
    format!("{}{}", V1_MAGIC, encoded)
}

/// Unwrap an armored string, returning the envelope bytes.
///
/// Leading and trailing whitespace (such as the newline an editor appends) is
/// ignored.
pub fn unwrap(armored: &str) -> Result<Vec<u8>> {
    let armored = armored.trim();
    if armored.len() < V1_MAGIC.len() {
        return Err(LockboxError::with_kind(
            ErrorCategory::User,
            ErrorKind::ArmoringInvalid,
            "input size smaller than magic marker; likely truncated",
        ));
    }

    if let Some(encoded) = armored.strip_prefix(V1_MAGIC) {
        URL_SAFE_NO_PAD.decode(encoded).map_err(|e| {
            LockboxError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::ArmoringDecode,
                "base64 decoding failed",
                e,
            )
        })
    } else if armored.starts_with(MAGIC_PREFIX) {
        Err(LockboxError::with_kind(
            ErrorCategory::User,
            ErrorKind::ArmoringFromFuture,
            "input claims to be lockbox armor, but not a version we support",
        ))
    } else {
        Err(LockboxError::with_kind(
            ErrorCategory::User,
            ErrorKind::ArmoringInvalid,
            "input unrecognized as lockbox armor",
        ))
    }
}
