//! Error types for tgsc

use std::path::PathBuf;

use crate::formats::SessionFormat;

/// Result type alias for tgsc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading, converting or validating sessions
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error while reading or writing session artifacts
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite error from a session database
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The session artifact does not exist
    #[error("session not found: {path}")]
    SessionNotFound { path: PathBuf },

    /// The artifact exists but does not hold a usable session
    #[error("corrupt or unreadable session: {message}")]
    CorruptSession { message: String },

    /// Unexpected end of data while parsing a binary stream
    #[error("unexpected end of data at offset {offset}")]
    UnexpectedEof { offset: u64 },

    /// Embedded checksum does not match the data
    #[error("checksum mismatch: data may be corrupted")]
    ChecksumMismatch,

    /// Local key decryption failed, the passcode is wrong or missing
    #[error("decryption failed: wrong or missing passcode")]
    WrongPasscode,

    /// Required file is missing from a tdata folder
    #[error("required file not found: {file} in {folder}")]
    FileNotFound { file: String, folder: PathBuf },

    /// No accounts found in a tdata folder
    #[error("no accounts found in tdata")]
    NoAccounts,

    /// Account index out of range for a tdata folder
    #[error("account index {index} out of range (found {found} accounts)")]
    AccountIndexOutOfRange { index: usize, found: usize },

    /// No auth key stored for the account's main datacenter
    #[error("no auth key found for main DC {dc_id}")]
    AuthKeyMissing { dc_id: i32 },

    /// Datacenter id outside the known address table
    #[error("invalid DC ID: {dc_id}. Must be an integer between 1 and 5")]
    UnknownDc { dc_id: i32 },

    /// A field the target format requires is absent from the record
    #[error("unsupported field for {target} target: {field} is required but absent")]
    MissingField {
        field: &'static str,
        target: SessionFormat,
    },

    /// The requested target format cannot be written
    #[error("unsupported target format: {format}")]
    UnsupportedTarget { format: SessionFormat },

    /// An output path is needed for a file target
    #[error("an output path is required for the {format} target")]
    OutputRequired { format: SessionFormat },

    /// The artifact could not be classified as any known session format
    #[error("could not detect session format of {artifact}")]
    UnknownFormat { artifact: String },

    /// Authentication failed while talking to Telegram
    #[error("authentication failed: {reason}")]
    AuthFailed { reason: String },

    /// Error reported by the Telegram client library
    #[error("telegram error: {message}")]
    Telegram { message: String },

    /// No API id/hash available from flags, environment or config file
    #[error("API credentials missing: pass --api-id/--api-hash, set TG_API_ID/TG_API_HASH or run `tgsc config`")]
    ConfigMissing,

    /// The credentials file could not be parsed
    #[error("invalid config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The credentials file could not be serialized
    #[error("could not write config file: {0}")]
    ConfigWrite(#[from] toml::ser::Error),
}

impl Error {
    /// Create a corrupt session error with a message
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptSession {
            message: msg.into(),
        }
    }

    /// Create an authentication failure with a reason
    pub fn auth(reason: impl Into<String>) -> Self {
        Self::AuthFailed {
            reason: reason.into(),
        }
    }

    /// Create a Telegram client error with a message
    pub fn telegram(msg: impl std::fmt::Display) -> Self {
        Self::Telegram {
            message: msg.to_string(),
        }
    }
}
