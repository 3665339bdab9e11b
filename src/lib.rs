//! # tgsc
//!
//! A pure Rust library and CLI for converting Telegram session artifacts
//! between client formats: Telethon and Pyrogram `.session` SQLite files,
//! their portable string encodings, and Telegram Desktop `tdata` folders.
//!
//! ## Features
//!
//! - Read Telethon and Pyrogram session files and string sessions
//! - Parse `tdata` folders from Telegram Desktop, passcode-protected included
//! - Write any readable session back out as a file or string format
//! - Check a session against the live network and report the account
//! - Log in with a phone number to mint a fresh session
//!
//! ## Example
//!
//! ```rust,no_run
//! use tgsc::{Artifact, ReadOptions, SessionFormat};
//!
//! fn main() -> Result<(), tgsc::Error> {
//!     // Read a Telethon session file
//!     let record = tgsc::read_session("my.session", SessionFormat::Telethon, &ReadOptions::default())?;
//!     println!("DC ID: {}", record.dc_id);
//!
//!     // Re-encode it as a portable string session
//!     if let Artifact::Text(session) = tgsc::write_session(&record, SessionFormat::TelethonString, None)? {
//!         println!("{session}");
//!     }
//!     Ok(())
//! }
//! ```

mod error;
mod qdatastream;
mod crypto;

pub mod client;
pub mod config;
pub mod formats;
pub mod login;
pub mod pyrogram;
pub mod session;
pub mod tdata;
pub mod telethon;
pub mod validate;

pub use error::{Error, Result};
pub use formats::{
    detect_format, read_session, write_session, Artifact, ReadOptions, SessionFormat,
};
pub use session::SessionRecord;

/// Auth key size in bytes (256 bytes = 2048 bits)
pub const AUTH_KEY_SIZE: usize = 256;
