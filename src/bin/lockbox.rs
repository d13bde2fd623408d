//! Lockbox CLI - password-based file and text encryption
//!
//! Command-line interface for encrypting and decrypting files and text using
//! AES-256-GCM with PBKDF2-HMAC-SHA256 key derivation.

use clap::{ArgGroup, Parser, Subcommand};
use std::error::Error as StdError;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::{EnvFilter, fmt};

use lockbox::error::{ErrorCategory, ErrorKind, LockboxError, Result};
use lockbox::file_ops;
use lockbox::password::{
    ConfirmingPasswordReader, PasswordPolicy, PasswordReader, ReaderPasswordReader,
    TerminalPasswordReader,
};

#[derive(Parser)]
#[command(name = "lockbox")]
#[command(version)]
#[command(about = "Password-based file and text encryption.", long_about = None)]
struct Cli {
    /// Read password from stdin instead of from terminal
    #[arg(long, global = true, env = "LOCKBOX_PASSWORD_STDIN")]
    password_stdin: bool,

    /// Accept an empty password (weak; off by default)
    #[arg(long, global = true)]
    allow_empty_password: bool,

    /// Log filter, e.g. "warn", "info" or "lockbox=debug"
    #[arg(long, global = true, env = "LOCKBOX_LOG", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a file
    #[command(alias = "e")]
    Encrypt {
        /// Path to the file whose contents is to be encrypted
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to write the envelope to [default: <input>.encrypted]
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Decrypt a file
    #[command(alias = "d")]
    Decrypt {
        /// Path to the encrypted file
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Path to write the plaintext to [default: the original file name,
        /// next to the input]
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Encrypt text into an armored envelope
    #[command(alias = "et")]
    #[command(group(ArgGroup::new("source").required(true).args(["text", "input"])))]
    EncryptText {
        /// Text to encrypt
        #[arg(short, long)]
        text: Option<String>,

        /// UTF-8 file holding the text to encrypt
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,

        /// Path to write the armored envelope to [default: stdout]
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Decrypt an armored envelope back into text
    #[command(alias = "dt")]
    #[command(group(ArgGroup::new("source").required(true).args(["armored", "input"])))]
    DecryptText {
        /// Armored envelope
        #[arg(short, long)]
        armored: Option<String>,

        /// File holding the armored envelope
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,

        /// Path to write the plaintext to [default: stdout]
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    let policy = PasswordPolicy {
        allow_empty: cli.allow_empty_password,
    };

    let result = match cli.command {
        Commands::Encrypt { input, output } => {
            let mut reader = encrypt_password_reader(cli.password_stdin);
            file_ops::encrypt_file(&input, output.as_deref(), &mut *reader, policy)
                .map(|path| println!("{}", path.display()))
        }
        Commands::Decrypt { input, output } => {
            let mut reader = decrypt_password_reader(cli.password_stdin);
            file_ops::decrypt_file(&input, output.as_deref(), &mut *reader, policy)
                .map(|path| println!("{}", path.display()))
        }
        Commands::EncryptText {
            text,
            input,
            output,
        } => {
            let mut reader = encrypt_password_reader(cli.password_stdin);
            run_encrypt_text(text, input, output, &mut *reader, policy)
        }
        Commands::DecryptText {
            armored,
            input,
            output,
        } => {
            let mut reader = decrypt_password_reader(cli.password_stdin);
            run_decrypt_text(armored, input, output, &mut *reader, policy)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", render_chain(&e));
        process::exit(1);
    }
}

fn run_encrypt_text(
    text: Option<String>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    reader: &mut dyn PasswordReader,
    policy: PasswordPolicy,
) -> Result<()> {
    let text = match (text, input) {
        (Some(text), _) => text,
        (None, Some(path)) => file_ops::read_text_file(&path)?,
        (None, None) => return Err(missing_source()),
    };
    let armored = file_ops::encrypt_text_to_armor(&text, reader, policy)?;
    match output {
        Some(path) => file_ops::write_file_secure(&path, armored.as_bytes(), true),
        None => write_stdout(format!("{}\n", armored).as_bytes()),
    }
}

fn run_decrypt_text(
    armored: Option<String>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    reader: &mut dyn PasswordReader,
    policy: PasswordPolicy,
) -> Result<()> {
    let armored = match (armored, input) {
        (Some(armored), _) => armored,
        (None, Some(path)) => file_ops::read_text_file(&path)?,
        (None, None) => return Err(missing_source()),
    };
    let decrypted = file_ops::decrypt_text_input(&armored, reader, policy)?;
    match output {
        Some(path) => file_ops::write_file_secure(&path, &decrypted.plaintext, true),
        None => write_stdout(&decrypted.plaintext),
    }
}

fn missing_source() -> LockboxError {
    LockboxError::with_kind(
        ErrorCategory::User,
        ErrorKind::InvalidInput,
        "no input given",
    )
}

fn write_stdout(bytes: &[u8]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(bytes)
        .and_then(|()| stdout.flush())
        .map_err(|e| {
            LockboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to write to stdout",
                e,
            )
        })
}

fn encrypt_password_reader(use_stdin: bool) -> Box<dyn PasswordReader> {
    if use_stdin {
        Box::new(ReaderPasswordReader::new(Box::new(io::stdin())))
    } else {
        Box::new(ConfirmingPasswordReader::terminal())
    }
}

fn decrypt_password_reader(use_stdin: bool) -> Box<dyn PasswordReader> {
    if use_stdin {
        Box::new(ReaderPasswordReader::new(Box::new(io::stdin())))
    } else {
        Box::new(TerminalPasswordReader::new())
    }
}

/// Joins the messages of an error and its sources, outermost first.
fn render_chain(err: &LockboxError) -> String {
    let mut rendered = err.to_string();
    let mut current = err.source();
    while let Some(source) = current {
        rendered.push_str(": ");
        rendered.push_str(&source.to_string());
        current = source.source();
    }
    rendered
}

fn setup_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|e| {
        eprintln!("Warning: ignoring invalid log filter {:?}: {}", log_level, e);
        EnvFilter::new("warn")
    });

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Warning: failed to install log subscriber: {}", e);
    }
}
