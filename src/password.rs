//! Password reading and the password policy applied at the file/CLI boundary

use crate::error::{ErrorCategory, ErrorKind, LockboxError, Result};
use std::io::{self, IsTerminal, Read, Write};
use zeroize::Zeroizing;

/// Trait for reading passwords from various sources
pub trait PasswordReader {
    /// Read a password as arbitrary bytes (not necessarily UTF-8)
    ///
    /// Returns the password wrapped in `Zeroizing` to ensure it is securely
    /// wiped from memory when dropped.
    fn read_password(&mut self) -> Result<Zeroizing<Vec<u8>>>;
}

/// Returns a fixed password (for testing)
pub struct ConstantPasswordReader {
    password: Zeroizing<Vec<u8>>,
}

impl ConstantPasswordReader {
    pub fn new(password: Vec<u8>) -> Self {
        Self {
            password: Zeroizing::new(password),
        }
    }
}

impl PasswordReader for ConstantPasswordReader {
    fn read_password(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new((*self.password).clone()))
    }
}

/// Reads a password from any io::Read source
///
/// One trailing line terminator (`\n` or `\r\n`) is removed, so that
/// `echo secret | lockbox --password-stdin ...` uses `secret` as the password.
pub struct ReaderPasswordReader {
    reader: Box<dyn Read>,
}

impl ReaderPasswordReader {
    pub fn new(reader: Box<dyn Read>) -> Self {
        Self { reader }
    }
}

impl PasswordReader for ReaderPasswordReader {
    fn read_password(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        let mut data = Zeroizing::new(Vec::new());
        self.reader.read_to_end(&mut data).map_err(|e| {
            LockboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "error reading password",
                e,
            )
        })?;
        if data.ends_with(b"\n") {
            data.pop();
            if data.ends_with(b"\r") {
                data.pop();
            }
        }
        Ok(data)
    }
}

/// Reads a password from the terminal with no echo
pub struct TerminalPasswordReader {
    prompt: &'static str,
}

impl TerminalPasswordReader {
    pub fn new() -> Self {
        Self::with_prompt("Password (lockbox): ")
    }

    pub fn with_prompt(prompt: &'static str) -> Self {
        Self { prompt }
    }
}

impl Default for TerminalPasswordReader {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordReader for TerminalPasswordReader {
    /// Read password from terminal.
    ///
    /// Note: Terminal input is limited to UTF-8 due to rpassword library constraints.
    /// For non-UTF-8 passwords, use --password-stdin instead.
    fn read_password(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        if !io::stdin().is_terminal() {
            return Err(LockboxError::with_kind(
                ErrorCategory::User,
                ErrorKind::PasswordUnavailable,
                "cannot read password from terminal - stdin is not a terminal",
            ));
        }

        io::stderr().write_all(self.prompt.as_bytes()).map_err(|e| {
            LockboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to write prompt",
                e,
            )
        })?;
        io::stderr().flush().map_err(|e| {
            LockboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to flush prompt",
                e,
            )
        })?;

        // rpassword returns a plain String; move it into a zeroizing buffer
        // right away.
        let password = Zeroizing::new(rpassword::read_password().map_err(|e| {
            LockboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::PasswordUnavailable,
                "failure reading password",
                e,
            )
        })?);

        Ok(Zeroizing::new(password.as_bytes().to_vec()))
    }
}

/// Reads a password twice from the upstream readers and requires both entries
/// to match.
///
/// Used when encrypting interactively, where a typo would otherwise produce an
/// envelope nobody can open.
pub struct ConfirmingPasswordReader {
    first: Box<dyn PasswordReader>,
    confirm: Box<dyn PasswordReader>,
}

impl ConfirmingPasswordReader {
    pub fn new(first: Box<dyn PasswordReader>, confirm: Box<dyn PasswordReader>) -> Self {
        Self { first, confirm }
    }

    /// Terminal prompts for the password and its confirmation.
    pub fn terminal() -> Self {
        Self::new(
            Box::new(TerminalPasswordReader::new()),
            Box::new(TerminalPasswordReader::with_prompt(
                "Confirm password (lockbox): ",
            )),
        )
    }
}

impl PasswordReader for ConfirmingPasswordReader {
    fn read_password(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        let password = self.first.read_password()?;
        let confirmation = self.confirm.read_password()?;
        if *password != *confirmation {
            return Err(LockboxError::invalid_input("passwords do not match"));
        }
        Ok(password)
    }
}

/// Password requirements enforced before any file or text operation.
///
/// The codec itself accepts any password, including the empty one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PasswordPolicy {
    /// Permit the empty password. Off by default.
    pub allow_empty: bool,
}

impl PasswordPolicy {
    pub fn check(&self, password: &[u8]) -> Result<()> {
        if password.is_empty() && !self.allow_empty {
            return Err(LockboxError::invalid_input("password must not be empty"));
        }
        Ok(())
    }
}
