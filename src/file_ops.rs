//! File and text operations
//!
//! This module sits between the command line and the envelope codec. It reads
//! inputs, obtains and checks the password, picks output names, and writes
//! results with restrictive permissions.

use crate::codec::{self, Decrypted};
use crate::error::{ErrorCategory, ErrorKind, LockboxError, Result};
use crate::password::{PasswordPolicy, PasswordReader};
use crate::varmor;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use zeroize::Zeroizing;

/// Suffix appended to the names of encrypted files.
pub const ENCRYPTED_SUFFIX: &str = ".encrypted";

/// Name used when neither the envelope nor the input file suggests one.
pub const DEFAULT_DECRYPTED_NAME: &str = "decrypted";

/// Encrypt a file with a password
///
/// The input's file name is recorded in the envelope. Without an explicit
/// `output`, the envelope is written to `<input>.encrypted`, which must not
/// exist yet. Returns the path written.
///
/// The output file is created with mode 0o600 (read/write for owner only) on Unix systems.
pub fn encrypt_file(
    input: &Path,
    output: Option<&Path>,
    password_reader: &mut dyn PasswordReader,
    policy: PasswordPolicy,
) -> Result<PathBuf> {
    let display_name = match input.file_name() {
        Some(name) => name.to_str().ok_or_else(|| {
            LockboxError::invalid_input(format!(
                "file name of {} is not valid UTF-8 and cannot be recorded",
                input.display()
            ))
        })?,
        None => "",
    };
    let plaintext = Zeroizing::new(fs::read(input).map_err(|e| read_error(input, e))?);

    let password = read_checked_password(password_reader, policy)?;
    let envelope = codec::encrypt(&plaintext, &password, display_name)
        .map_err(|e| e.with_context("encryption failed"))?;

    let (output, overwrite) = match output {
        Some(path) => (path.to_path_buf(), true),
        None => (default_encrypted_path(input), false),
    };
    write_file_secure(&output, &envelope, overwrite)
        .map_err(|e| e.with_context(format!("failed to write to {}", output.display())))?;

    info!(
        input = %input.display(),
        output = %output.display(),
        "encrypted file"
    );
    Ok(output)
}

/// Decrypt a file with a password
///
/// Without an explicit `output`, the plaintext is written next to the input
/// under the name recorded in the envelope (see [`decrypted_file_name`]); an
/// existing file of that name is never replaced. Returns the path written.
///
/// The output file is created with mode 0o600 (read/write for owner only) on Unix systems.
pub fn decrypt_file(
    input: &Path,
    output: Option<&Path>,
    password_reader: &mut dyn PasswordReader,
    policy: PasswordPolicy,
) -> Result<PathBuf> {
    let envelope = fs::read(input).map_err(|e| read_error(input, e))?;
    let password = read_checked_password(password_reader, policy)?;
    let decrypted =
        codec::decrypt(&envelope, &password).map_err(|e| e.with_context("failed to decrypt"))?;
    let plaintext = Zeroizing::new(decrypted.plaintext);

    let (output, overwrite) = match output {
        Some(path) => (path.to_path_buf(), true),
        None => {
            let name = decrypted_file_name(&decrypted.display_name, input);
            (sibling_path(input, &name), false)
        }
    };
    write_file_secure(&output, &plaintext, overwrite)
        .map_err(|e| e.with_context(format!("failed to write to {}", output.display())))?;

    info!(
        input = %input.display(),
        output = %output.display(),
        "decrypted file"
    );
    Ok(output)
}

/// Encrypt text and return the armored envelope.
pub fn encrypt_text_to_armor(
    text: &str,
    password_reader: &mut dyn PasswordReader,
    policy: PasswordPolicy,
) -> Result<String> {
    let password = read_checked_password(password_reader, policy)?;
    let envelope =
        codec::encrypt_text(text, &password).map_err(|e| e.with_context("encryption failed"))?;
    Ok(varmor::wrap(&envelope))
}

/// Decrypt a textual envelope.
///
/// Accepts either the armored form produced by [`encrypt_text_to_armor`] or a
/// binary string holding one char per envelope byte.
pub fn decrypt_text_input(
    encrypted: &str,
    password_reader: &mut dyn PasswordReader,
    policy: PasswordPolicy,
) -> Result<Decrypted> {
    let armored = encrypted.trim_start().starts_with(varmor::MAGIC_PREFIX);
    let envelope = if armored {
        Some(varmor::unwrap(encrypted).map_err(|e| e.with_context("failed to unarmor"))?)
    } else {
        None
    };

    let password = read_checked_password(password_reader, policy)?;
    let decrypted = match envelope {
        Some(bytes) => codec::decrypt(&bytes, &password),
        None => codec::decrypt_text(encrypted, &password),
    };
    decrypted.map_err(|e| e.with_context("failed to decrypt"))
}

/// Read a text file that must contain UTF-8.
pub fn read_text_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| read_error(path, e))?;
    String::from_utf8(bytes).map_err(|e| {
        LockboxError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::InvalidInput,
            format!("{} is not valid UTF-8", path.display()),
            e,
        )
    })
}

/// Default output path for encrypting `input`: the same path with
/// [`ENCRYPTED_SUFFIX`] appended.
pub fn default_encrypted_path(input: &Path) -> PathBuf {
    let mut name = input.as_os_str().to_os_string();
    name.push(ENCRYPTED_SUFFIX);
    PathBuf::from(name)
}

/// Choose the file name for decrypted output.
///
/// The envelope's display name is used when it is a plain file name. An empty
/// name, or one that could escape the output directory, falls back to the
/// input's name with [`ENCRYPTED_SUFFIX`] removed, and finally to
/// [`DEFAULT_DECRYPTED_NAME`].
pub fn decrypted_file_name(display_name: &str, input: &Path) -> String {
    if is_plain_file_name(display_name) {
        return display_name.to_owned();
    }

    let input_name = input.file_name().and_then(|name| name.to_str()).unwrap_or("");
    let stripped = input_name
        .strip_suffix(ENCRYPTED_SUFFIX)
        .unwrap_or(input_name);
    if is_plain_file_name(stripped) && stripped != input_name {
        stripped.to_owned()
    } else {
        DEFAULT_DECRYPTED_NAME.to_owned()
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

fn sibling_path(input: &Path, name: &str) -> PathBuf {
    match input.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

fn read_checked_password(
    password_reader: &mut dyn PasswordReader,
    policy: PasswordPolicy,
) -> Result<Zeroizing<Vec<u8>>> {
    let password = password_reader.read_password()?;
    policy.check(&password)?;
    Ok(password)
}

/// Write `contents` to `path` atomically with secure permissions (0o600 on Unix).
///
/// The data goes to a temporary file in the target directory, is synced, and
/// is then renamed into place, so readers see either nothing or the complete
/// file. With `overwrite` false an existing `path` makes the write fail.
pub fn write_file_secure(path: &Path, contents: &[u8], overwrite: bool) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    if !overwrite && path.exists() {
        return Err(LockboxError::with_kind(
            ErrorCategory::User,
            ErrorKind::InvalidInput,
            format!("refusing to overwrite existing file {}", path.display()),
        ));
    }

    let mut temp_file = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        LockboxError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to create tempfile",
            e,
        )
    })?;

    temp_file.write_all(contents).map_err(|e| {
        LockboxError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to write to tempfile",
            e,
        )
    })?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a complete file.
    temp_file.flush().map_err(|e| {
        LockboxError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to flush tempfile",
            e,
        )
    })?;
    temp_file.as_file().sync_all().map_err(|e| {
        LockboxError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to sync file prior to rename",
            e,
        )
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = temp_file
            .as_file()
            .metadata()
            .map_err(|e| {
                LockboxError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    "failed to get tempfile metadata",
                    e,
                )
            })?
            .permissions();
        perms.set_mode(0o600);
        temp_file.as_file().set_permissions(perms).map_err(|e| {
            LockboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to set tempfile permissions",
                e,
            )
        })?;
    }

    let persisted = if overwrite {
        temp_file.persist(path)
    } else {
        temp_file.persist_noclobber(path)
    };
    persisted.map_err(|e| {
        let category = if e.error.kind() == io::ErrorKind::AlreadyExists {
            ErrorCategory::User
        } else {
            ErrorCategory::Internal
        };
        LockboxError::with_kind_and_source(
            category,
            ErrorKind::Io,
            format!("failed to rename to target file {}", path.display()),
            e,
        )
    })?;
    Ok(())
}

fn read_error(path: &Path, err: io::Error) -> LockboxError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    LockboxError::with_kind_and_source(
        category,
        ErrorKind::Io,
        format!("failed to read from {}", path.display()),
        err,
    )
}
