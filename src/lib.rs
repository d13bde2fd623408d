//! Lockbox - password-based file and text encryption
//!
//! Each encrypted blob is a self-contained envelope carrying the salt, nonce
//! and original file name next to the AES-256-GCM ciphertext. See
//! [`envelope`] for the layout and [`codec`] for the operations.

#![forbid(unsafe_code)]

pub mod codec;
pub mod envelope;
pub mod error;
pub mod file_ops;
pub mod kdf;
pub mod password;
pub mod varmor;
